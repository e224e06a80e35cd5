//! Error types for person removal operations

use thiserror::Error;

/// Result type alias for person removal operations
pub type Result<T> = std::result::Result<T, PersonRemovalError>;

/// Error taxonomy for the detection, separation and inpainting pipeline
#[derive(Error, Debug)]
pub enum PersonRemovalError {
    /// Both the primary segmentation and the fallback detector chain failed
    #[error("Detection failed: {0}")]
    Detection(String),

    /// No confident person detections were found in the image
    #[error("No people detected: {0}")]
    NoPeopleDetected(String),

    /// The fill-region mask could not be produced
    #[error("Mask generation failed: {0}")]
    MaskGeneration(String),

    /// Every configured inpainting back-end failed
    #[error("Inpainting failed: {0}")]
    Inpainting(String),

    /// The inpainted result did not pass the sanity check
    #[error("Result validation failed: {0}")]
    Validation(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transport-level failures talking to a remote capability
    #[error("Network error: {0}")]
    Network(String),

    /// A remote call exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The run was cancelled by the caller
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Malformed payloads from or to a remote capability
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input/output errors (config files, mask encoding)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used in results and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Detection,
    NoPeopleDetected,
    MaskGeneration,
    Inpainting,
    Validation,
    InvalidConfig,
    Network,
    Timeout,
    Cancelled,
    Serialization,
    Io,
    Internal,
}

impl PersonRemovalError {
    /// Create a new detection error
    pub fn detection<S: Into<String>>(msg: S) -> Self {
        Self::Detection(msg.into())
    }

    /// Create a new "no people" error
    pub fn no_people<S: Into<String>>(msg: S) -> Self {
        Self::NoPeopleDetected(msg.into())
    }

    /// Create a new mask generation error
    pub fn mask_generation<S: Into<String>>(msg: S) -> Self {
        Self::MaskGeneration(msg.into())
    }

    /// Create a new inpainting error
    pub fn inpainting<S: Into<String>>(msg: S) -> Self {
        Self::Inpainting(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap a transport error with the operation that produced it
    pub fn network_error(operation: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(format!("{}: {}", operation, error))
        } else {
            Self::Network(format!("{}: {}", operation, error))
        }
    }

    /// Create an error for a named back-end failing a specific operation
    pub fn backend_failure(backend: &str, operation: &str, error: &str) -> Self {
        Self::Network(format!(
            "{} failed on back-end '{}': {}",
            operation, backend, error
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Detection(_) => ErrorKind::Detection,
            Self::NoPeopleDetected(_) => ErrorKind::NoPeopleDetected,
            Self::MaskGeneration(_) => ErrorKind::MaskGeneration,
            Self::Inpainting(_) => ErrorKind::Inpainting,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Io(_) => ErrorKind::Io,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a whole-pipeline retry could plausibly change the outcome
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidConfig(_) | Self::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PersonRemovalError::invalid_config("test config error");
        assert!(matches!(err, PersonRemovalError::InvalidConfig(_)));

        let err = PersonRemovalError::no_people("empty frame");
        assert_eq!(err.kind(), ErrorKind::NoPeopleDetected);
    }

    #[test]
    fn test_error_display() {
        let err = PersonRemovalError::inpainting("all back-ends failed");
        assert_eq!(err.to_string(), "Inpainting failed: all back-ends failed");
    }

    #[test]
    fn test_contextual_errors() {
        let err = PersonRemovalError::backend_failure("lama", "fill", "503 Service Unavailable");
        let message = err.to_string();
        assert!(message.contains("lama"));
        assert!(message.contains("fill"));
        assert!(message.contains("503"));

        let err = PersonRemovalError::config_value_error("maxRetries", 0, "1-10", Some(2));
        let message = err.to_string();
        assert!(message.contains("maxRetries"));
        assert!(message.contains("1-10"));
        assert!(message.contains("Recommended: 2"));
    }

    #[test]
    fn test_retryability() {
        assert!(PersonRemovalError::detection("down").is_retryable());
        assert!(PersonRemovalError::no_people("none").is_retryable());
        assert!(!PersonRemovalError::invalid_config("bad").is_retryable());
        assert!(!PersonRemovalError::cancelled("stop").is_retryable());
    }
}
