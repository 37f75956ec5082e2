//! Error handling for the comment sentiment pipeline
//!
//! Every failure in ingestion, training, evaluation and serving is one of
//! these variants. Nothing is retried and nothing falls back to a default
//! model: errors propagate to the caller as soon as they occur.

use thiserror::Error;

/// Main error type for the sentiment pipeline
#[derive(Error, Debug)]
pub enum SentimentError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Data source error: {source_name} - {message}")]
    DataSource {
        source_name: String,
        message: String,
    },

    #[error("Empty dataset: {message}")]
    EmptyDataset { message: String },

    #[error("Empty input: no comments provided")]
    EmptyInput,

    #[error("Artifact not found: {id}")]
    ArtifactNotFound { id: String },

    #[error("Invalid artifact: {message}")]
    Artifact { message: String },

    #[error("Registry operation failed: {operation} - {source}")]
    Registry {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },
}

pub type SentimentResult<T> = Result<T, SentimentError>;

impl SentimentError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a data source error
    pub fn data_source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataSource {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn empty_dataset(message: impl Into<String>) -> Self {
        Self::EmptyDataset {
            message: message.into(),
        }
    }

    /// Create an artifact-not-found error for a path or run id
    pub fn artifact_not_found(id: impl Into<String>) -> Self {
        Self::ArtifactNotFound { id: id.into() }
    }

    pub fn artifact(message: impl Into<String>) -> Self {
        Self::Artifact {
            message: message.into(),
        }
    }

    /// Create a registry error
    pub fn registry(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Registry {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Convert from sled errors
impl From<sled::Error> for SentimentError {
    fn from(err: sled::Error) -> Self {
        SentimentError::registry("sled_operation", err)
    }
}

/// Convert from serde_json errors
impl From<serde_json::Error> for SentimentError {
    fn from(err: serde_json::Error) -> Self {
        SentimentError::serialization("json_operation", err)
    }
}

/// Convert from std::io errors
impl From<std::io::Error> for SentimentError {
    fn from(err: std::io::Error) -> Self {
        SentimentError::io("io_operation", err)
    }
}

impl From<figment::Error> for SentimentError {
    fn from(err: figment::Error) -> Self {
        SentimentError::configuration(err.to_string())
    }
}
