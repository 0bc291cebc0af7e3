//! End-of-run summary

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use spendsync_core::fmt_num;
use spendsync_store::UnrecoverableGap;

/// How the run directory was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Fresh,
    Resume,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

/// Overall verdict. Aborted runs never produce a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    /// Failed batches or gaps remain; rerun with resume
    PartiallyFailed,
}

/// A batch whose latest attempt did not return 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatch {
    pub batch_id: u64,
    /// 0 when no response was received
    pub status: u16,
    pub reason: String,
    pub payload: PathBuf,
    pub outcome: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    pub run_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Batches sent during this invocation
    pub attempted: usize,
    /// Batch ids that returned 200 in this invocation
    pub succeeded: Vec<u64>,
    pub failed: Vec<FailedBatch>,
    pub gaps: Vec<UnrecoverableGap>,
    /// Batches that had already succeeded before a resume
    pub carried_over: usize,
    /// Records sent in succeeded batches during this invocation
    pub records_uploaded: usize,
    pub skipped_owners: Vec<String>,
    pub unmatched_records: usize,
}

impl RunReport {
    pub(crate) fn new(mode: RunMode, run_dir: PathBuf, started_at: DateTime<Utc>) -> Self {
        Self {
            mode,
            run_dir,
            started_at,
            elapsed: Duration::ZERO,
            attempted: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
            gaps: Vec::new(),
            carried_over: 0,
            records_uploaded: 0,
            skipped_owners: Vec::new(),
            unmatched_records: 0,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.failed.is_empty() && self.gaps.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::PartiallyFailed
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Succeeded
    }

    /// Succeeded batches including those carried over from the prior run.
    pub fn total_succeeded(&self) -> usize {
        self.carried_over + self.succeeded.len()
    }

    /// Every batch known to this run, whatever its state.
    pub fn total_batches(&self) -> usize {
        self.total_succeeded() + self.failed.len() + self.gaps.len()
    }

    /// Artifact paths an operator should look at, in batch order.
    pub fn artifacts_to_inspect(&self) -> Vec<PathBuf> {
        let mut paths: Vec<(u64, PathBuf)> = Vec::new();
        for f in &self.failed {
            paths.push((f.batch_id, f.payload.clone()));
            paths.push((f.batch_id, f.outcome.clone()));
        }
        for g in &self.gaps {
            paths.extend(g.outcomes.iter().map(|p| (g.batch_id, p.clone())));
        }
        paths.sort_by_key(|(id, _)| *id);
        paths.into_iter().map(|(_, p)| p).collect()
    }

    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(format!("Upload ({})", self.mode))
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        table.add_row(vec![
            Cell::new("Run dir"),
            Cell::new(self.run_dir.display()),
        ]);
        table.add_row(vec![
            Cell::new("Started"),
            Cell::new(self.started_at.format("%Y-%m-%d %H:%M:%S UTC")),
        ]);
        table.add_row(vec![
            Cell::new("Attempted"),
            Cell::new(fmt_num(self.attempted)),
        ]);

        let ok_color = if self.is_success() {
            Color::Green
        } else {
            Color::Yellow
        };
        table.add_row(vec![
            Cell::new("Succeeded").fg(ok_color),
            Cell::new(format!(
                "{}/{}",
                fmt_num(self.total_succeeded()),
                fmt_num(self.total_batches())
            ))
            .fg(ok_color),
        ]);
        if self.carried_over > 0 {
            table.add_row(vec![
                Cell::new("  from prior run"),
                Cell::new(fmt_num(self.carried_over)),
            ]);
        }
        if !self.failed.is_empty() {
            table.add_row(vec![
                Cell::new("Still failing").fg(Color::Red),
                Cell::new(fmt_num(self.failed.len())).fg(Color::Red),
            ]);
        }
        if !self.gaps.is_empty() {
            table.add_row(vec![
                Cell::new("Unrecoverable").fg(Color::Red),
                Cell::new(fmt_num(self.gaps.len())).fg(Color::Red),
            ]);
        }
        table.add_row(vec![
            Cell::new("Records uploaded"),
            Cell::new(fmt_num(self.records_uploaded)),
        ]);
        if self.mode == RunMode::Fresh {
            table.add_row(vec![
                Cell::new("Unmatched records"),
                Cell::new(fmt_num(self.unmatched_records)),
            ]);
            table.add_row(vec![
                Cell::new("Owners without records"),
                Cell::new(fmt_num(self.skipped_owners.len())),
            ]);
        }
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())),
        ]);

        let mut out = format!("\n{table}");
        let paths = self.artifacts_to_inspect();
        if !paths.is_empty() {
            out.push_str("\nArtifacts to inspect:\n");
            for p in paths {
                out.push_str(&format!("  {}\n", p.display()));
            }
        }
        out
    }

    /// Print the summary table to stderr.
    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }

    /// Log the summary (non-TTY mode).
    pub fn log(&self) {
        log::info!(
            "{} run complete: {}/{} batches succeeded ({} attempted, {} carried over) [{:.1}s]",
            self.mode,
            self.total_succeeded(),
            self.total_batches(),
            self.attempted,
            self.carried_over,
            self.elapsed.as_secs_f64()
        );
        for f in &self.failed {
            log::error!(
                "batch {} still failing ({}): {} {}",
                f.batch_id,
                f.reason,
                f.payload.display(),
                f.outcome.display()
            );
        }
        for g in &self.gaps {
            let paths: Vec<String> = g.outcomes.iter().map(|p| p.display().to_string()).collect();
            log::error!(
                "batch {} has no payload and needs manual intervention: {}",
                g.batch_id,
                paths.join(", ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport::new(RunMode::Resume, PathBuf::from("/runs/fy26"), Utc::now())
    }

    #[test]
    fn empty_report_is_success() {
        let r = report();
        assert_eq!(r.status(), RunStatus::Succeeded);
        assert_eq!(r.total_batches(), 0);
        assert!(r.artifacts_to_inspect().is_empty());
    }

    #[test]
    fn carried_over_counts_toward_total() {
        let mut r = report();
        r.carried_over = 2;
        r.succeeded = vec![2];
        r.attempted = 1;
        assert_eq!(r.total_succeeded(), 3);
        assert_eq!(r.total_batches(), 3);
        assert!(r.format_table().contains("3/3"));
    }

    #[test]
    fn failures_list_artifacts_in_batch_order() {
        let mut r = report();
        r.failed.push(FailedBatch {
            batch_id: 5,
            status: 500,
            reason: "rejected with HTTP 500".into(),
            payload: PathBuf::from("/runs/fy26/batch5.json"),
            outcome: PathBuf::from("/runs/fy26/batch5_500.json"),
        });
        r.gaps.push(UnrecoverableGap {
            batch_id: 2,
            outcomes: vec![PathBuf::from("/runs/fy26/batch2_0.json")],
        });
        assert_eq!(r.status(), RunStatus::PartiallyFailed);
        assert_eq!(
            r.artifacts_to_inspect(),
            vec![
                PathBuf::from("/runs/fy26/batch2_0.json"),
                PathBuf::from("/runs/fy26/batch5.json"),
                PathBuf::from("/runs/fy26/batch5_500.json"),
            ]
        );
        let table = r.format_table();
        assert!(table.contains("Still failing"));
        assert!(table.contains("batch5_500.json"));
    }
}
