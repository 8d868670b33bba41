use thiserror::Error;

/// A rejected piece of user input.
///
/// The display text is the exact message returned to API clients, so it is
/// kept free of prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
