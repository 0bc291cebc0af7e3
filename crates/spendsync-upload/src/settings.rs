//! Upload settings and the fingerprint derived from them

use spendsync_core::Identity;
use spendsync_store::{BATCHES_FACT, RunFingerprint};

/// Names an input source and pins its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    /// Human-readable origin, e.g. the file name
    pub label: String,
    /// Content digest (blake3 hex)
    pub digest: String,
}

impl SourceIdentity {
    pub fn new(label: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            digest: digest.into(),
        }
    }
}

/// Everything the engine needs to know about the target and the inputs.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Service base URL without trailing slash
    pub endpoint: String,
    pub identity: Identity,
    pub proxy: Option<String>,
    /// Stamped onto every item; the identity user when unset
    pub approver: Option<String>,
    pub batch_size: usize,
    pub owner_source: SourceIdentity,
    pub record_source: SourceIdentity,
}

impl UploadSettings {
    /// Approver stamped on uploaded items.
    pub fn approver(&self) -> &str {
        self.approver.as_deref().unwrap_or(&self.identity.user)
    }

    /// Facts that decide what a run of `batches` batches uploads. The
    /// password is left out.
    pub fn fingerprint(&self, batches: usize) -> RunFingerprint {
        RunFingerprint::new()
            .fact("endpoint", self.endpoint.trim_end_matches('/'))
            .fact("user", &self.identity.user)
            .fact("proxy", self.proxy.as_deref().unwrap_or(""))
            .fact("approver", self.approver())
            .fact("batch_size", self.batch_size.to_string())
            .fact("owners", &self.owner_source.label)
            .fact("owners_hash", &self.owner_source.digest)
            .fact("records", &self.record_source.label)
            .fact("records_hash", &self.record_source.digest)
            .fact(BATCHES_FACT, batches.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> UploadSettings {
        UploadSettings {
            endpoint: "https://budget.example.com/api".into(),
            identity: Identity {
                user: "p123".into(),
                password: "secret".into(),
            },
            proxy: None,
            approver: Some("p999".into()),
            batch_size: 1000,
            owner_source: SourceIdentity::new("owners.json", "aaaa"),
            record_source: SourceIdentity::new("expenses.json", "bbbb"),
        }
    }

    #[test]
    fn fingerprint_excludes_password() {
        let text = settings().fingerprint(3).render();
        assert!(text.contains("user=p123\n"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn trailing_slash_does_not_change_fingerprint() {
        let mut s = settings();
        let before = s.fingerprint(3);
        s.endpoint.push('/');
        assert_eq!(before, s.fingerprint(3));
    }

    #[test]
    fn every_fact_is_sensitive() {
        let base = settings().fingerprint(3);
        let variants: Vec<Box<dyn Fn(&mut UploadSettings)>> = vec![
            Box::new(|s| s.endpoint = "https://other.example.com/api".into()),
            Box::new(|s| s.identity.user = "p456".into()),
            Box::new(|s| s.proxy = Some("proxy:8080".into())),
            Box::new(|s| s.approver = None),
            Box::new(|s| s.batch_size = 500),
            Box::new(|s| s.owner_source.digest = "cccc".into()),
            Box::new(|s| s.record_source.label = "other.json".into()),
            Box::new(|s| s.record_source.digest = "dddd".into()),
        ];
        for change in variants {
            let mut s = settings();
            change(&mut s);
            assert_ne!(base.render(), s.fingerprint(3).render());
        }
    }

    #[test]
    fn approver_defaults_to_user() {
        let mut s = settings();
        assert_eq!(s.approver(), "p999");
        s.approver = None;
        assert_eq!(s.approver(), "p123");
        assert!(s.fingerprint(1).render().contains("approver=p123\n"));
    }

    #[test]
    fn batch_count_is_recorded() {
        let fp = settings().fingerprint(7);
        assert_eq!(fp.batch_count(), Some(7));
        assert_ne!(fp, settings().fingerprint(8));
    }

    #[test]
    fn password_change_keeps_fingerprint() {
        let mut s = settings();
        let before = s.fingerprint(3);
        s.identity.password = "rotated".into();
        assert_eq!(before, s.fingerprint(3));
    }
}
