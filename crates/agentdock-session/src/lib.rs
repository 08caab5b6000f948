//! Authentication and wallet-session orchestrator for the agentdock console.
//!
//! The orchestrator follows an Elm-like split: [`update`] is a pure reducer
//! over [`state::SessionState`] that returns [`effects::SessionEffect`]s, and
//! [`runtime::SessionRuntime`] executes them against the collaborator ports
//! defined in `agentdock-types`.

pub mod bus;
pub mod config;
pub mod disconnect;
pub mod effects;
pub mod error;
pub mod events;
pub mod guard;
pub mod latest;
pub mod login;
pub mod reconcile;
pub mod runtime;
pub mod sim;
pub mod state;
pub mod status;
pub mod store;
pub mod task;
pub mod teardown;
pub mod update;

pub use bus::{SessionLoss, SessionLossBus};
pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use latest::{LatestSnapshot, LatestValues};
pub use runtime::{Collaborators, SessionHandle, SessionRuntime};
pub use state::{DisconnectCallback, DisconnectReason, LoginRequest, SessionView};
pub use status::AuthStatus;
