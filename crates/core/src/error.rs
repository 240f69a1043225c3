/// Result alias that carries the custom [`ConfettiError`] type.
pub type Result<T> = std::result::Result<T, ConfettiError>;

/// Common error type for the core crate.
///
/// Only the edges of the crate produce these: parsing JSON text, reading
/// settings from disk and loading the engine. Firing an effect never fails.
#[derive(Debug, thiserror::Error)]
pub enum ConfettiError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// The engine behind the event bridge could not be loaded.
    #[error("failed to load confetti engine: {0}")]
    EngineLoad(String),
    /// Wrapper around JSON syntax errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ConfettiError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates an engine load failure with the provided reason.
    pub fn engine_load<T: Into<String>>(reason: T) -> Self {
        Self::EngineLoad(reason.into())
    }
}

impl From<&str> for ConfettiError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ConfettiError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
