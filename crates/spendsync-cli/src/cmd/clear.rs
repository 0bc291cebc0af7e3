//! `spendsync clear` - discard the artifacts of a run directory

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use spendsync_store::{RequestLog, RunFingerprint};

#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Run directory to clear
    pub run_dir: PathBuf,

    /// Also discard failed batches that were never resumed
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: ClearArgs) -> Result<()> {
    let log = RequestLog::open(&args.run_dir);
    let index = log.scan()?;

    if !index.has_artifacts() {
        eprintln!("Nothing to clear in {}.", args.run_dir.display());
        return Ok(());
    }

    let expected = log
        .read_fingerprint()?
        .and_then(|text| RunFingerprint::parse(&text).batch_count())
        .unwrap_or(0);
    let unsent = index.unsent(expected).len();
    if (!index.all_succeeded() || unsent > 0) && !args.force {
        anyhow::bail!(
            "{} has {} failed batches, {} never sent and {} outcomes without payload; \
             resume it first or pass --force to discard them",
            args.run_dir.display(),
            index.failed_batches().len(),
            unsent,
            index.gaps().len()
        );
    }

    let kept = log.clear()?;
    if kept.is_empty() {
        eprintln!("Cleared {}", args.run_dir.display());
    } else {
        eprintln!(
            "Cleared run artifacts in {}, kept {} unrelated entries",
            args.run_dir.display(),
            kept.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendsync_store::BATCHES_FACT;

    fn failed_run(dir: &std::path::Path) {
        let log = RequestLog::begin(dir).unwrap();
        log.write_payload(1, "{}").unwrap();
        log.write_outcome(1, 500, "err").unwrap();
    }

    #[test]
    fn refuses_failed_run_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("run");
        failed_run(&dir);
        let err = run(ClearArgs {
            run_dir: dir.clone(),
            force: false,
        })
        .unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert!(dir.join("batch1_500.json").exists());
    }

    #[test]
    fn refuses_interrupted_run_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("run");
        let log = RequestLog::begin(&dir).unwrap();
        log.write_fingerprint(&RunFingerprint::new().fact(BATCHES_FACT, "2"))
            .unwrap();
        log.write_payload(1, "{}").unwrap();
        log.write_outcome(1, 200, "ok").unwrap();

        let err = run(ClearArgs {
            run_dir: dir.clone(),
            force: false,
        })
        .unwrap_err();
        assert!(err.to_string().contains("1 never sent"));
        assert!(dir.join("batch1_200.json").exists());
    }

    #[test]
    fn force_discards_failed_run() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("run");
        failed_run(&dir);
        run(ClearArgs {
            run_dir: dir.clone(),
            force: true,
        })
        .unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn force_keeps_files_that_are_not_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("run");
        failed_run(&dir);
        std::fs::write(dir.join("notes.txt"), "keep").unwrap();
        run(ClearArgs {
            run_dir: dir.clone(),
            force: true,
        })
        .unwrap();
        assert!(dir.join("notes.txt").exists());
        assert!(!dir.join("batch1.json").exists());
        assert!(!dir.join("batch1_500.json").exists());
    }

    #[test]
    fn leaves_unrelated_directory_alone() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "keep").unwrap();
        run(ClearArgs {
            run_dir: tmp.path().to_path_buf(),
            force: true,
        })
        .unwrap();
        assert!(tmp.path().join("notes.txt").exists());
    }
}
