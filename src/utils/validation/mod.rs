//! Validation utilities
//!
//! - Numeric range checks for options
//! - Sanity checks for inpainting results

pub mod numeric;
pub mod result;

pub use numeric::NumericValidator;
pub use result::{AcceptAllValidator, ResultValidator, UrlResultValidator};
