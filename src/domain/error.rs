use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error("experiment `{name}` is not offered")]
    UnknownExperiment { name: String },
    #[error("generated text is missing the `{marker}` marker")]
    MissingMarker { marker: &'static str },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unknown_experiment(name: impl Into<String>) -> Self {
        Self::UnknownExperiment { name: name.into() }
    }
}
