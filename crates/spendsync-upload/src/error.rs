//! Run-level errors. Every variant aborts the run; per-batch failures are
//! recorded in the run directory instead (see [`spendsync_core::BatchFailure`]).

use std::path::PathBuf;

use spendsync_core::AuthError;

#[derive(Debug)]
pub enum UploadError {
    /// Session token could not be acquired; no batch was uploaded
    Auth(AuthError),
    /// Stored fingerprint differs from the current configuration
    ConfigDrift {
        run_dir: PathBuf,
        differences: Vec<String>,
    },
    /// A previous run left unfinished batches and resume was not requested
    PriorRunPending {
        run_dir: PathBuf,
        failed: usize,
        /// Batches the previous run never reached
        unsent: usize,
        gaps: usize,
    },
    /// Batch body could not be serialized
    Payload(serde_json::Error),
    /// Run directory could not be read or written
    Storage(anyhow::Error),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(e) => write!(f, "{e}"),
            Self::ConfigDrift {
                run_dir,
                differences,
            } => write!(
                f,
                "configuration changed since the run in {} was started ({}); \
                 revert the configuration or discard the run directory",
                run_dir.display(),
                differences.join("; ")
            ),
            Self::PriorRunPending {
                run_dir,
                failed,
                unsent,
                gaps,
            } => {
                write!(
                    f,
                    "{} holds {failed} failed batches from a previous run",
                    run_dir.display()
                )?;
                if *unsent > 0 {
                    write!(f, ", {unsent} never sent")?;
                }
                if *gaps > 0 {
                    write!(f, " and {gaps} outcomes without payload")?;
                }
                write!(f, "; rerun with --resume or clear the directory")
            }
            Self::Payload(e) => write!(f, "failed to serialize batch payload: {e}"),
            Self::Storage(e) => write!(f, "run directory: {e:#}"),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Auth(e) => Some(e),
            Self::Payload(e) => Some(e),
            Self::Storage(e) => Some(&**e),
            Self::ConfigDrift { .. } | Self::PriorRunPending { .. } => None,
        }
    }
}

impl From<AuthError> for UploadError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<anyhow::Error> for UploadError {
    fn from(e: anyhow::Error) -> Self {
        Self::Storage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_lists_differences() {
        let e = UploadError::ConfigDrift {
            run_dir: PathBuf::from("/runs/fy26"),
            differences: vec!["endpoint: 'a' -> 'b'".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("/runs/fy26"));
        assert!(msg.contains("endpoint: 'a' -> 'b'"));
    }

    #[test]
    fn pending_mentions_gaps_only_when_present() {
        let e = UploadError::PriorRunPending {
            run_dir: PathBuf::from("r"),
            failed: 2,
            unsent: 0,
            gaps: 0,
        };
        assert!(!e.to_string().contains("without payload"));
        assert!(!e.to_string().contains("never sent"));
        let e = UploadError::PriorRunPending {
            run_dir: PathBuf::from("r"),
            failed: 0,
            unsent: 4,
            gaps: 1,
        };
        assert!(e.to_string().contains("4 never sent"));
        assert!(e.to_string().contains("1 outcomes without payload"));
    }

    #[test]
    fn storage_error_keeps_context_chain() {
        let inner = std::io::Error::other("disk gone");
        let e: UploadError = anyhow::Error::new(inner)
            .context("failed to write batch1.json")
            .into();
        let msg = e.to_string();
        assert!(msg.contains("failed to write batch1.json"));
        assert!(msg.contains("disk gone"));
    }
}
