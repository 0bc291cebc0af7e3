//! spendsync-store: Durable request log for batch uploads
//!
//! Every batch leaves a payload file before it is sent and an outcome file
//! after, so the state of a run can always be rebuilt by scanning its
//! directory. A fingerprint of the run configuration sits beside them and
//! guards resumes against configuration drift.

pub mod artifact;
pub mod fingerprint;
pub mod hash;
pub mod request_log;
pub mod run_config;

pub use artifact::{
    ArtifactIndex, ArtifactName, BatchArtifacts, BatchState, PendingBatch, UnrecoverableGap,
};
pub use fingerprint::{BATCHES_FACT, FINGERPRINT_FILE, RunFingerprint};
pub use hash::{hash_bytes, short_hash};
pub use request_log::RequestLog;
pub use run_config::RunConfig;
