use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("state not found: {0}")]
    StateNotFound(String),

    #[error("transition '{transition}' not found in state '{state}'")]
    TransitionNotFound { state: String, transition: String },

    #[error("subject '{0}' has no current state")]
    UnknownCurrentState(String),

    #[error("unknown predicate '{predicate}' referenced by action '{action}'")]
    UnknownPredicate { action: String, predicate: String },

    #[error("invalid identifier '{0}': must be alphanumeric with '_', '.', ':' or '-'")]
    InvalidIdentifier(String),

    #[error("adapter error: {0}")]
    Adapter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
