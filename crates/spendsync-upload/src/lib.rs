//! spendsync-upload: Resumable batch upload engine
//!
//! Partitions records into per-owner batches, uploads them one at a time
//! under a single session token and records every outcome in the run
//! directory. A later invocation can resume the run, replaying only the
//! failed batches, provided the configuration has not drifted.

pub mod engine;
pub mod error;
pub mod report;
pub mod settings;

pub use engine::{BATCH_PATH, UploadEngine, preview};
pub use error::UploadError;
pub use report::{FailedBatch, RunMode, RunReport, RunStatus};
pub use settings::{SourceIdentity, UploadSettings};
