use thiserror::Error;

/// Failure reported by a collaborator adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("flow cancelled by the user")]
    UserCancelled,
    #[error("identity provider: {0}")]
    Provider(String),
    #[error("wallet connectivity: {0}")]
    Connectivity(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("navigation: {0}")]
    Navigation(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;
