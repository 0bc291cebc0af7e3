//! Upload engine: fresh runs and resumes over one run directory
//!
//! ```text
//! partition, scan run dir ─┬─ nothing there ─────────────────────────► fresh
//!                          ├─ last run fully succeeded ─── clear ────► fresh
//!                          ├─ unfinished, no resume ─────────────────► abort (PriorRunPending)
//!                          └─ unfinished, resume ─ fingerprint equal? ┬► resume
//!                                                                     └► abort (ConfigDrift)
//! ```
//!
//! A batch is unfinished when it failed, was never answered, or was never
//! reached. The last kind leaves no artifact, so the fingerprint records
//! how many batches the run was partitioned into. Resume replays persisted
//! payloads verbatim and sends unreached batches from the same partition.
//!
//! Every abort happens before any network call. Once sending starts, a
//! batch failure is recorded and the loop moves on; only storage errors
//! stop it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use indicatif::ProgressBar;
use serde_json::json;
use spendsync_core::{
    AUTH_TOKEN_HEADER, Batch, BatchFailure, Credential, HttpRequest, OwnerLookup, Partition,
    Partitioner, ProgressContext, Record, TokenProvider, Transport, join_url,
};
use spendsync_store::{FINGERPRINT_FILE, PendingBatch, RequestLog, RunFingerprint, UnrecoverableGap};

use crate::error::UploadError;
use crate::report::{FailedBatch, RunMode, RunReport};
use crate::settings::UploadSettings;

/// Resource path batches are posted to, relative to the endpoint.
pub const BATCH_PATH: &str = "batch-resource";

enum Plan {
    Fresh,
    Resume {
        pending: Vec<PendingBatch>,
        unsent: Vec<u64>,
        gaps: Vec<UnrecoverableGap>,
        carried_over: usize,
    },
}

/// One unit of resume work.
enum ResumeItem<'p> {
    /// Persisted payload, sent verbatim
    Replay(PendingBatch),
    /// Never reached by the interrupted run
    Unsent(&'p Batch),
}

impl ResumeItem<'_> {
    fn batch_id(&self) -> u64 {
        match self {
            Self::Replay(pending) => pending.batch_id,
            Self::Unsent(batch) => batch.id,
        }
    }
}

pub struct UploadEngine<'a> {
    transport: &'a dyn Transport,
    settings: &'a UploadSettings,
    log: RequestLog,
    progress: Option<&'a ProgressContext>,
}

impl<'a> UploadEngine<'a> {
    pub fn new(transport: &'a dyn Transport, settings: &'a UploadSettings, run_dir: &Path) -> Self {
        Self {
            transport,
            settings,
            log: RequestLog::open(run_dir),
            progress: None,
        }
    }

    /// Draw a batch bar and handshake spinner on this context.
    pub fn with_progress(mut self, progress: &'a ProgressContext) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn run_dir(&self) -> &Path {
        self.log.dir()
    }

    /// Upload `records` partitioned by `owners`, or with `resume` finish
    /// the unfinished batches of the previous run in this directory.
    pub fn run(
        &self,
        records: &[Record],
        owners: &dyn OwnerLookup,
        resume: bool,
    ) -> Result<RunReport, UploadError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let partition = Partitioner::new(self.settings.batch_size).partition(records, owners);
        let fingerprint = self.settings.fingerprint(partition.batches.len());

        let mut report = match self.plan(resume, &fingerprint)? {
            Plan::Fresh => {
                let report =
                    RunReport::new(RunMode::Fresh, self.run_dir().to_path_buf(), started_at);
                self.run_fresh(&partition, &fingerprint, report)?
            }
            Plan::Resume {
                pending,
                unsent,
                gaps,
                carried_over,
            } => {
                let mut report =
                    RunReport::new(RunMode::Resume, self.run_dir().to_path_buf(), started_at);
                report.carried_over = carried_over;
                report.gaps = gaps;
                let unsent = partition
                    .batches
                    .iter()
                    .filter(|b| unsent.contains(&b.id))
                    .collect();
                self.run_resume(pending, unsent, report)?
            }
        };
        report.unmatched_records = partition.unmatched_records;
        report.skipped_owners = partition.skipped_owners;
        report.elapsed = start.elapsed();
        Ok(report)
    }

    fn plan(&self, resume: bool, current: &RunFingerprint) -> Result<Plan, UploadError> {
        let index = self.log.scan()?;
        let dir = self.run_dir();

        if !index.has_artifacts() {
            if resume {
                log::info!("nothing to resume in {}, starting fresh", dir.display());
            }
            return Ok(Plan::Fresh);
        }

        let stored = self.log.read_fingerprint()?;
        let pending = index.failed_batches();
        let gaps = index.gaps();
        // Without a recorded batch count only artifacts can be judged
        let expected = stored
            .as_deref()
            .and_then(|text| RunFingerprint::parse(text).batch_count())
            .unwrap_or(0);
        let unsent = index.unsent(expected);
        if pending.is_empty() && gaps.is_empty() && unsent.is_empty() {
            log::info!(
                "previous run in {} completed ({} batches), starting over",
                dir.display(),
                index.len()
            );
            self.log.clear()?;
            return Ok(Plan::Fresh);
        }

        if !resume {
            return Err(UploadError::PriorRunPending {
                run_dir: dir.to_path_buf(),
                failed: pending.len(),
                unsent: unsent.len(),
                gaps: gaps.len(),
            });
        }

        let differences = match stored {
            Some(stored) if stored == current.render() => Vec::new(),
            Some(stored) => RunFingerprint::parse(&stored).differences(current),
            None => vec![format!("{FINGERPRINT_FILE} is missing")],
        };
        if !differences.is_empty() {
            return Err(UploadError::ConfigDrift {
                run_dir: dir.to_path_buf(),
                differences,
            });
        }

        log::debug!(
            "resuming {}: {} to replay, {} never sent, {} gaps, fingerprint {}",
            dir.display(),
            pending.len(),
            unsent.len(),
            gaps.len(),
            current.digest()
        );
        Ok(Plan::Resume {
            pending,
            unsent,
            gaps,
            carried_over: index.succeeded().len(),
        })
    }

    fn run_fresh(
        &self,
        partition: &Partition,
        fingerprint: &RunFingerprint,
        mut report: RunReport,
    ) -> Result<RunReport, UploadError> {
        let log = RequestLog::begin(self.run_dir())?;
        log.write_fingerprint(fingerprint)?;

        if partition.batches.is_empty() {
            log::info!("no records matched any owner, nothing to upload");
            return Ok(report);
        }
        log::info!(
            "uploading {} records in {} batches",
            partition.total_records(),
            partition.batches.len()
        );

        let token = self.acquire_token()?;
        let bar = self.batch_bar("upload", partition.batches.len());
        for batch in &partition.batches {
            bar.set_message(batch.owner.clone());
            self.upload_batch(&log, &token, batch, &mut report)?;
            bar.inc(1);
        }
        bar.finish_and_clear();
        Ok(report)
    }

    fn run_resume(
        &self,
        pending: Vec<PendingBatch>,
        unsent: Vec<&Batch>,
        mut report: RunReport,
    ) -> Result<RunReport, UploadError> {
        let log = RequestLog::begin(self.run_dir())?;
        for gap in &report.gaps {
            log::error!(
                "batch {} has outcomes but no payload, skipping",
                gap.batch_id
            );
        }
        if pending.is_empty() && unsent.is_empty() {
            return Ok(report);
        }
        log::info!(
            "resuming: {} batches to replay, {} never sent",
            pending.len(),
            unsent.len()
        );

        let mut work: Vec<ResumeItem<'_>> = pending
            .into_iter()
            .map(ResumeItem::Replay)
            .chain(unsent.into_iter().map(ResumeItem::Unsent))
            .collect();
        work.sort_by_key(ResumeItem::batch_id);

        let token = self.acquire_token()?;
        let bar = self.batch_bar("resume", work.len());
        for item in work {
            match item {
                ResumeItem::Replay(batch) => {
                    let payload = log.read_payload(&batch.payload)?;
                    let items = item_count(&payload);
                    let id = batch.batch_id;
                    if self.send_batch(&log, &token, id, batch.payload, payload, &mut report)? {
                        log.remove_markers(&batch.failure_markers)?;
                        report.records_uploaded += items;
                    }
                }
                ResumeItem::Unsent(batch) => {
                    bar.set_message(batch.owner.clone());
                    self.upload_batch(&log, &token, batch, &mut report)?;
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();
        Ok(report)
    }

    /// Persist a freshly built payload for `batch`, then send it.
    fn upload_batch(
        &self,
        log: &RequestLog,
        token: &Credential,
        batch: &Batch,
        report: &mut RunReport,
    ) -> Result<(), UploadError> {
        let payload = batch
            .payload(self.settings.approver())
            .map_err(UploadError::Payload)?;
        let payload_path = log.write_payload(batch.id, &payload)?;
        if self.send_batch(log, token, batch.id, payload_path, payload, report)? {
            report.records_uploaded += batch.len();
        }
        Ok(())
    }

    /// Send one persisted payload and record its outcome. Returns whether
    /// the service accepted it.
    fn send_batch(
        &self,
        log: &RequestLog,
        token: &Credential,
        batch_id: u64,
        payload_path: PathBuf,
        payload: String,
        report: &mut RunReport,
    ) -> Result<bool, UploadError> {
        let request = HttpRequest::post_json(join_url(&self.settings.endpoint, BATCH_PATH), payload)
            .header(AUTH_TOKEN_HEADER, token.as_str());
        report.attempted += 1;

        match BatchFailure::classify(self.transport.send(&request)) {
            Ok(reply) => {
                log.write_outcome(batch_id, reply.status, &reply.body)?;
                log::info!("batch {batch_id} accepted");
                report.succeeded.push(batch_id);
                Ok(true)
            }
            Err(failure) => {
                let status = failure.status_code();
                let outcome = log.write_outcome(batch_id, status, &failure.outcome_body())?;
                log::error!("batch {batch_id} failed: {failure}");
                report.failed.push(FailedBatch {
                    batch_id,
                    status,
                    reason: failure.to_string(),
                    payload: payload_path,
                    outcome,
                });
                Ok(false)
            }
        }
    }

    fn acquire_token(&self) -> Result<Credential, UploadError> {
        let spinner = match self.progress {
            Some(p) => p.stage_line("auth"),
            None => ProgressBar::hidden(),
        };
        spinner.set_message(format!("requesting token as {}", self.settings.identity.user));
        let mut provider = TokenProvider::new(
            self.transport,
            &self.settings.endpoint,
            self.settings.identity.clone(),
        );
        let token = provider.acquire();
        spinner.finish_and_clear();
        Ok(token?)
    }

    fn batch_bar(&self, label: &str, total: usize) -> ProgressBar {
        match self.progress {
            Some(p) => p.batch_bar(label, total as u64),
            None => ProgressBar::hidden(),
        }
    }
}

/// Batches `records` would be uploaded as, with their exact request
/// bodies. Nothing is sent and nothing is written.
pub fn preview(
    settings: &UploadSettings,
    records: &[Record],
    owners: &dyn OwnerLookup,
) -> Result<serde_json::Value, UploadError> {
    let partition = Partitioner::new(settings.batch_size).partition(records, owners);
    let batches = partition
        .batches
        .iter()
        .map(|batch| -> serde_json::Result<serde_json::Value> {
            Ok(json!({
                "id": batch.id,
                "owner": batch.owner,
                "count": batch.len(),
                "body": batch.payload_value(settings.approver())?,
            }))
        })
        .collect::<serde_json::Result<Vec<_>>>()
        .map_err(UploadError::Payload)?;
    Ok(json!({
        "batches": batches,
        "records": partition.total_records(),
        "unmatched_records": partition.unmatched_records,
        "skipped_owners": partition.skipped_owners,
    }))
}

/// Number of items in a persisted payload, 0 if it cannot be read as one.
fn item_count(payload: &str) -> usize {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v.get("items").and_then(|i| i.as_array()).map(Vec::len))
        .unwrap_or(0)
}
