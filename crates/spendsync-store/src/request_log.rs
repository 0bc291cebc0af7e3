//! Directory-backed request log
//!
//! The payload of a batch is durably on disk before the request is sent,
//! so a crash between send and outcome write never loses what is needed
//! to retry. Single writer: nothing here locks the directory.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::artifact::{ArtifactIndex, ArtifactName, PendingBatch};
use crate::fingerprint::{FINGERPRINT_FILE, RunFingerprint};

/// Log rooted at one run directory.
#[derive(Debug, Clone)]
pub struct RequestLog {
    dir: PathBuf,
}

impl RequestLog {
    /// Handle on `dir` without touching the filesystem (for inspection).
    pub fn open(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Ensure the run directory exists and drop stale `.tmp` files left by
    /// an interrupted write.
    pub fn begin(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create run dir: {}", dir.display()))?;
        cleanup_tmp_files(dir)
            .with_context(|| format!("failed to clean tmp files in {}", dir.display()))?;
        Ok(Self::open(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn payload_path(&self, batch_id: u64) -> PathBuf {
        self.dir
            .join(ArtifactName::Payload { batch_id }.file_name())
    }

    pub fn outcome_path(&self, batch_id: u64, status: u16) -> PathBuf {
        self.dir
            .join(ArtifactName::Outcome { batch_id, status }.file_name())
    }

    pub fn write_fingerprint(&self, fingerprint: &RunFingerprint) -> Result<()> {
        let path = self.dir.join(FINGERPRINT_FILE);
        write_durable(&path, fingerprint.render().as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Raw stored fingerprint text, `None` if the file is absent.
    pub fn read_fingerprint(&self) -> Result<Option<String>> {
        let path = self.dir.join(FINGERPRINT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("failed to read {}", path.display()))
    }

    /// Persist the exact request body for `batch_id`, overwriting any
    /// previous payload. Returns once the bytes are synced to disk.
    pub fn write_payload(&self, batch_id: u64, payload: &str) -> Result<PathBuf> {
        let path = self.payload_path(batch_id);
        write_durable(&path, payload.as_bytes())
            .with_context(|| format!("failed to write payload {}", path.display()))?;
        Ok(path)
    }

    pub fn read_payload(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read payload {}", path.display()))
    }

    /// Record the response (or synthetic transport failure) for `batch_id`.
    pub fn write_outcome(&self, batch_id: u64, status: u16, body: &str) -> Result<PathBuf> {
        let path = self.outcome_path(batch_id, status);
        write_durable(&path, body.as_bytes())
            .with_context(|| format!("failed to write outcome {}", path.display()))?;
        Ok(path)
    }

    /// Delete outcome markers (failure markers after a successful replay).
    pub fn remove_markers(&self, markers: &[PathBuf]) -> Result<()> {
        for path in markers {
            match fs::remove_file(path) {
                Ok(()) => log::debug!("removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to remove {}", path.display()));
                }
            }
        }
        Ok(())
    }

    /// Build the typed index of everything in the directory.
    pub fn scan(&self) -> Result<ArtifactIndex> {
        ArtifactIndex::scan(&self.dir)
    }

    /// Replayable batches in ascending id order.
    pub fn list_failed_batches(&self) -> Result<Vec<PendingBatch>> {
        Ok(self.scan()?.failed_batches())
    }

    /// Delete the fingerprint and every batch artifact, then the directory
    /// itself once nothing else is left in it. Returns the files that were
    /// not recognised and were kept.
    pub fn clear(&self) -> Result<Vec<PathBuf>> {
        let mut kept = Vec::new();
        if !self.dir.exists() {
            return Ok(kept);
        }
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to read {}", self.dir.display()))?
                .path();
            let is_run_file = path.is_file()
                && path
                    .file_name()
                    .is_some_and(|n| is_run_file_name(&n.to_string_lossy()));
            if is_run_file {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
            } else {
                log::warn!("keeping unrecognised {}", path.display());
                kept.push(path);
            }
        }
        if kept.is_empty() {
            fs::remove_dir(&self.dir)
                .with_context(|| format!("failed to remove {}", self.dir.display()))?;
        }
        log::info!("cleared run dir {}", self.dir.display());
        Ok(kept)
    }
}

/// `config.txt`, a batch artifact, or an interrupted write of either.
fn is_run_file_name(name: &str) -> bool {
    let name = name.strip_suffix(".tmp").unwrap_or(name);
    name == FINGERPRINT_FILE || ArtifactName::parse(name).is_some()
}

/// Write to `<path>.tmp`, fsync, then rename over `path`.
fn write_durable(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

/// Remove `.tmp` files left behind by an interrupted write.
fn cleanup_tmp_files(dir: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_creates_nested_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("runs").join("fy26");
        let log = RequestLog::begin(&dir).unwrap();
        assert!(log.dir().is_dir());
    }

    #[test]
    fn begin_fails_when_path_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("taken");
        std::fs::write(&file, b"x").unwrap();
        assert!(RequestLog::begin(&file).is_err());
    }

    #[test]
    fn begin_removes_stale_tmp() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("batch1.json.tmp"), b"half").unwrap();
        std::fs::write(root.path().join("batch1.json"), b"{}").unwrap();
        RequestLog::begin(root.path()).unwrap();
        assert!(!root.path().join("batch1.json.tmp").exists());
        assert!(root.path().join("batch1.json").exists());
    }

    #[test]
    fn payload_and_outcome_layout() {
        let root = tempfile::tempdir().unwrap();
        let log = RequestLog::begin(root.path()).unwrap();
        let p = log.write_payload(2, r#"{"owner":"a","items":[]}"#).unwrap();
        let o = log.write_outcome(2, 500, "boom").unwrap();
        assert_eq!(p, root.path().join("batch2.json"));
        assert_eq!(o, root.path().join("batch2_500.json"));
        assert_eq!(log.read_payload(&p).unwrap(), r#"{"owner":"a","items":[]}"#);
        assert_eq!(std::fs::read_to_string(&o).unwrap(), "boom");
    }

    #[test]
    fn payload_overwrites_previous() {
        let root = tempfile::tempdir().unwrap();
        let log = RequestLog::begin(root.path()).unwrap();
        log.write_payload(1, "old").unwrap();
        let p = log.write_payload(1, "new").unwrap();
        assert_eq!(log.read_payload(&p).unwrap(), "new");
    }

    #[test]
    fn fingerprint_roundtrip_and_absence() {
        let root = tempfile::tempdir().unwrap();
        let log = RequestLog::begin(root.path()).unwrap();
        assert_eq!(log.read_fingerprint().unwrap(), None);
        let fp = RunFingerprint::new().fact("endpoint", "https://x");
        log.write_fingerprint(&fp).unwrap();
        assert_eq!(log.read_fingerprint().unwrap(), Some(fp.render()));
    }

    #[test]
    fn list_failed_and_remove_markers() {
        let root = tempfile::tempdir().unwrap();
        let log = RequestLog::begin(root.path()).unwrap();
        log.write_payload(1, "a").unwrap();
        log.write_outcome(1, 200, "ok").unwrap();
        log.write_payload(2, "b").unwrap();
        log.write_outcome(2, 500, "err").unwrap();

        let failed = log.list_failed_batches().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].batch_id, 2);

        log.write_outcome(2, 200, "ok").unwrap();
        log.remove_markers(&failed[0].failure_markers).unwrap();
        assert!(!root.path().join("batch2_500.json").exists());
        assert!(log.list_failed_batches().unwrap().is_empty());
        // Removing again is not an error
        log.remove_markers(&failed[0].failure_markers).unwrap();
    }

    #[test]
    fn clear_removes_run_files_and_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("run");
        let log = RequestLog::begin(&dir).unwrap();
        log.write_fingerprint(&RunFingerprint::new()).unwrap();
        log.write_payload(1, "a").unwrap();
        log.write_outcome(1, 200, "ok").unwrap();
        std::fs::write(dir.join("batch2.json.tmp"), "half").unwrap();
        assert!(log.clear().unwrap().is_empty());
        assert!(!dir.exists());
        // Clearing a missing dir is a no-op
        assert!(log.clear().unwrap().is_empty());
    }

    #[test]
    fn clear_keeps_unrecognised_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("run");
        let log = RequestLog::begin(&dir).unwrap();
        log.write_payload(1, "a").unwrap();
        std::fs::write(dir.join("notes.md"), "keep").unwrap();
        std::fs::write(dir.join("batch_final.json"), "keep").unwrap();
        std::fs::create_dir(dir.join("exports")).unwrap();

        let mut kept = log.clear().unwrap();
        kept.sort();
        assert_eq!(
            kept,
            vec![
                dir.join("batch_final.json"),
                dir.join("exports"),
                dir.join("notes.md")
            ]
        );
        assert!(!dir.join("batch1.json").exists());
        assert!(dir.join("notes.md").exists());
    }
}
