//! Numeric validation utilities
//!
//! Range checks shared by option validation and response decoding.

use crate::error::{PersonRemovalError, Result};

/// Validator for numeric options
pub struct NumericValidator;

impl NumericValidator {
    /// Validate a probability-like value in `[0, 1]`
    pub fn validate_unit_interval(value: f64, name: &str) -> Result<f64> {
        if !value.is_finite() {
            return Err(PersonRemovalError::invalid_config(format!(
                "{} must be finite, got {}",
                name, value
            )));
        }

        if !(0.0..=1.0).contains(&value) {
            return Err(PersonRemovalError::config_value_error(name, value, "0.0-1.0", None));
        }

        Ok(value)
    }

    /// Validate numeric range (inclusive)
    pub fn validate_range<T>(value: T, min: T, max: T, name: &str) -> Result<T>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            return Err(PersonRemovalError::invalid_config(format!(
                "{} must be between {} and {}, got {}",
                name, min, max, value
            )));
        }
        Ok(value)
    }

    /// Validate that a value is positive
    pub fn validate_positive<T>(value: T, name: &str) -> Result<T>
    where
        T: PartialOrd + std::fmt::Display + Copy + Default,
    {
        if value <= T::default() {
            return Err(PersonRemovalError::invalid_config(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_unit_interval() {
        assert_eq!(NumericValidator::validate_unit_interval(0.25, "threshold").unwrap(), 0.25);
        assert!(NumericValidator::validate_unit_interval(0.0, "threshold").is_ok());
        assert!(NumericValidator::validate_unit_interval(1.0, "threshold").is_ok());
        assert!(NumericValidator::validate_unit_interval(1.01, "threshold").is_err());
        assert!(NumericValidator::validate_unit_interval(f64::NAN, "threshold").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(NumericValidator::validate_range(5u32, 1, 10, "maxRetries").is_ok());
        let err = NumericValidator::validate_range(11u32, 1, 10, "maxRetries").unwrap_err();
        assert!(err.to_string().contains("maxRetries must be between 1 and 10"));
    }

    #[test]
    fn test_validate_positive() {
        assert!(NumericValidator::validate_positive(1u64, "timeout").is_ok());
        assert!(NumericValidator::validate_positive(0u64, "timeout").is_err());
    }
}
