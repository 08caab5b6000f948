//! Router guard.
//!
//! Navigation to a protected route while unauthenticated becomes a login
//! with the route stashed as redirect. The navigation itself only happens
//! once the login completes.

use tracing::info;

use crate::effects::SessionEffect;
use crate::login;
use crate::state::{LoginRequest, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    RequireLogin,
}

#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    protected: Vec<String>,
}

impl RouteGuard {
    pub fn new(routes: impl IntoIterator<Item = String>) -> Self {
        let protected = routes
            .into_iter()
            .map(|r| {
                let r = if r.starts_with('/') { r } else { format!("/{r}") };
                match r.trim_end_matches('/') {
                    "" => "/".to_string(),
                    trimmed => trimmed.to_string(),
                }
            })
            .collect();
        Self { protected }
    }

    /// Matches whole path segments; query and fragment are ignored.
    pub fn is_protected(&self, route: &str) -> bool {
        let path = route.split(['?', '#']).next().unwrap_or_default();
        self.protected.iter().any(|prefix| {
            prefix == "/"
                || path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn check(&self, route: &str, authenticated: bool) -> GuardDecision {
        if authenticated || !self.is_protected(route) {
            GuardDecision::Proceed
        } else {
            GuardDecision::RequireLogin
        }
    }
}

pub fn on_navigate(state: &mut SessionState, route: String) -> Vec<SessionEffect> {
    match state.guard.check(&route, state.is_authenticated()) {
        GuardDecision::Proceed => vec![SessionEffect::Navigate { route }],
        GuardDecision::RequireLogin => {
            info!(%route, "protected route, login required");
            login::start_login(state, LoginRequest::default().redirect_to(route))
        }
    }
}
