//! Shared utilities

pub mod validation;

pub use validation::{AcceptAllValidator, NumericValidator, ResultValidator, UrlResultValidator};
