//! Service layer for cross-cutting concerns
//!
//! Services here sit beside the pipeline rather than inside it, so different
//! frontends can plug in their own implementations.

pub mod progress;

pub use progress::{
    progress_for, ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate, StageProgress,
};
