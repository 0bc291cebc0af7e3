//! Authentication and per-batch failure types

use crate::http::{HttpReply, TransportError};

/// Credential acquisition failed. Fatal to the whole run.
#[derive(Debug)]
pub struct AuthError {
    pub user: String,
    pub reason: String,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "authentication as '{}' failed: {}", self.user, self.reason)
    }
}

impl std::error::Error for AuthError {}

/// Why a single batch did not succeed.
///
/// Both kinds are recorded the same way and never stop the run; they
/// differ only in the outcome status and body written to disk.
#[derive(Debug)]
pub enum BatchFailure {
    /// No response at all
    Transport(TransportError),
    /// Service answered with a non-success status
    Rejected { status: u16, body: String },
}

impl std::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::Rejected { status, .. } => write!(f, "rejected with HTTP {status}"),
        }
    }
}

impl std::error::Error for BatchFailure {}

impl BatchFailure {
    /// Status recorded in the outcome filename. Transport failures have no
    /// status and record 0.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Transport(_) => 0,
            Self::Rejected { status, .. } => *status,
        }
    }

    /// Body written to the outcome artifact.
    pub fn outcome_body(&self) -> String {
        match self {
            Self::Transport(e) => serde_json::json!({
                "error": "no response received",
                "detail": e.to_string(),
            })
            .to_string(),
            Self::Rejected { body, .. } => body.clone(),
        }
    }

    /// Classify a send result: `Ok` only for a 200 reply.
    pub fn classify(result: Result<HttpReply, TransportError>) -> Result<HttpReply, Self> {
        match result {
            Ok(reply) if reply.is_success() => Ok(reply),
            Ok(reply) => Err(Self::Rejected {
                status: reply.status,
                body: reply.body,
            }),
            Err(e) => Err(Self::Transport(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failure_records_status_zero() {
        let f = BatchFailure::Transport(TransportError::NoResponse("reset".into()));
        assert_eq!(f.status_code(), 0);
        let body: serde_json::Value = serde_json::from_str(&f.outcome_body()).unwrap();
        assert_eq!(body["error"], "no response received");
        assert!(body["detail"].as_str().unwrap().contains("reset"));
    }

    #[test]
    fn rejection_keeps_raw_body() {
        let f = BatchFailure::Rejected {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(f.status_code(), 500);
        assert_eq!(f.outcome_body(), "boom");
        assert_eq!(f.to_string(), "rejected with HTTP 500");
    }

    #[test]
    fn classify_only_accepts_200() {
        assert!(BatchFailure::classify(Ok(HttpReply::new(200, "{}"))).is_ok());
        let err = BatchFailure::classify(Ok(HttpReply::new(404, "nope"))).unwrap_err();
        assert_eq!(err.status_code(), 404);
        let err =
            BatchFailure::classify(Err(TransportError::NoResponse("x".into()))).unwrap_err();
        assert_eq!(err.status_code(), 0);
    }

    #[test]
    fn auth_error_display() {
        let e = AuthError {
            user: "p123".into(),
            reason: "missing header".into(),
        };
        assert_eq!(e.to_string(), "authentication as 'p123' failed: missing header");
    }
}
