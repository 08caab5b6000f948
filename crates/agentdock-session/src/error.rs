use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session runtime is not running")]
    RuntimeStopped,
}

pub type SessionResult<T> = Result<T, SessionError>;
