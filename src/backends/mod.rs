//! Capability back-end implementations
//!
//! This module provides the concrete clients the pipeline can be wired with:
//! - HTTP clients for remotely hosted models
//! - Scripted mock back-ends for tests and dry runs

pub mod http;
pub mod mock;

pub use self::http::{
    HttpInpainter, HttpMaskRefiner, HttpPersonDetector, HttpSegmenter, HttpServiceFactory,
};
pub use self::mock::{
    MockInpainter, MockMaskRefiner, MockPersonDetector, MockSegmenter, MockServiceFactory,
};
