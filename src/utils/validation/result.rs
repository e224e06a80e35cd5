//! Sanity checks on inpainting output

use crate::error::{PersonRemovalError, Result};
use reqwest::Url;

/// Decides whether an inpainting back-end's output is usable
pub trait ResultValidator: Send + Sync {
    /// # Errors
    /// - `Validation` when the result must not be returned to the caller
    fn validate(&self, source_url: &str, result_url: &str) -> Result<()>;
}

/// Accepts well-formed absolute `http`, `https` or `data` URLs
///
/// A result identical to the source image is rejected unless
/// [`allow_unchanged`](Self::allow_unchanged) is set, since it means the
/// back-end returned its input untouched.
#[derive(Debug, Clone, Default)]
pub struct UrlResultValidator {
    allow_unchanged: bool,
}

impl UrlResultValidator {
    const ALLOWED_SCHEMES: &'static [&'static str] = &["http", "https", "data"];

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allow_unchanged(mut self, allow: bool) -> Self {
        self.allow_unchanged = allow;
        self
    }
}

impl ResultValidator for UrlResultValidator {
    fn validate(&self, source_url: &str, result_url: &str) -> Result<()> {
        let trimmed = result_url.trim();
        if trimmed.is_empty() {
            return Err(PersonRemovalError::validation("Inpainting returned an empty URL"));
        }

        let parsed = Url::parse(trimmed).map_err(|e| {
            PersonRemovalError::validation(format!("Malformed result URL '{}': {}", trimmed, e))
        })?;

        if !Self::ALLOWED_SCHEMES.contains(&parsed.scheme()) {
            return Err(PersonRemovalError::validation(format!(
                "Unsupported result URL scheme '{}'",
                parsed.scheme()
            )));
        }

        if !self.allow_unchanged && trimmed == source_url.trim() {
            return Err(PersonRemovalError::validation(
                "Inpainting returned the source image unchanged",
            ));
        }

        Ok(())
    }
}

/// Validator that accepts every result
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

impl ResultValidator for AcceptAllValidator {
    fn validate(&self, _source_url: &str, _result_url: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "https://images.example.com/beach.jpg";

    #[test]
    fn test_accepts_supported_schemes() {
        let validator = UrlResultValidator::new();
        assert!(validator.validate(SOURCE, "https://cdn.example.com/out.png").is_ok());
        assert!(validator.validate(SOURCE, "http://cdn.example.com/out.png").is_ok());
        assert!(validator.validate(SOURCE, "data:image/png;base64,iVBORw0KGgo=").is_ok());
    }

    #[test]
    fn test_rejects_bad_results() {
        let validator = UrlResultValidator::new();
        for bad in ["", "   ", "not a url", "ftp://cdn.example.com/out.png", "/relative/out.png"] {
            let err = validator.validate(SOURCE, bad).unwrap_err();
            assert!(matches!(err, PersonRemovalError::Validation(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_unchanged_result() {
        assert!(UrlResultValidator::new().validate(SOURCE, SOURCE).is_err());
        assert!(UrlResultValidator::new()
            .allow_unchanged(true)
            .validate(SOURCE, SOURCE)
            .is_ok());
    }
}
