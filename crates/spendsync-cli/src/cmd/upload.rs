//! `spendsync upload` - partition records and upload them, resume a run,
//! or print the batches without sending anything

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use spendsync_core::{HttpTransport, Identity, SharedProgress};
use spendsync_store::RunConfig;
use spendsync_upload::{UploadEngine, UploadSettings, preview};

use crate::config::{Config, PASSWORD_ENV};
use crate::input;

/// Exit code for a run that finished with failed batches left to resume.
pub const EXIT_PARTIAL: u8 = 2;

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Path to upload.toml
    pub run_config: PathBuf,

    /// Replay failed batches of the previous run instead of starting over
    #[arg(long)]
    pub resume: bool,

    /// Run directory (overrides upload.toml and [runs] base_dir)
    #[arg(long)]
    pub run_dir: Option<PathBuf>,

    /// Print the batches as JSON on stdout; no request is sent and the run
    /// directory is not touched
    #[arg(long, conflicts_with = "resume")]
    pub dry_run: bool,
}

pub fn run(args: UploadArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let run_config = RunConfig::from_file(&args.run_config)?;
    let run_dir = args
        .run_dir
        .clone()
        .unwrap_or_else(|| run_config.run_dir(&config.runs.base_dir));

    let user = run_config
        .target
        .user
        .clone()
        .or_else(|| config.target.user.clone())
        .context("no user configured: set target.user in upload.toml or the global config")?;
    // A dry run sends nothing, so it needs no password
    let password = match run_config
        .target
        .password
        .clone()
        .or_else(|| config.target.password.clone())
    {
        Some(password) => password,
        None if args.dry_run => String::new(),
        None => anyhow::bail!("no password configured: set target.password or {PASSWORD_ENV}"),
    };
    let proxy = run_config
        .target
        .proxy
        .clone()
        .or_else(|| config.http.proxy.clone());

    let inputs = input::load(&run_config)?;
    let settings = UploadSettings {
        endpoint: run_config.endpoint().to_string(),
        identity: Identity { user, password },
        proxy,
        approver: run_config.target.approver.clone(),
        batch_size: run_config.partition.batch_size,
        owner_source: inputs.owner_source,
        record_source: inputs.record_source,
    };

    if args.dry_run {
        let batches = preview(&settings, &inputs.records, &inputs.owners)?;
        println!("{}", serde_json::to_string_pretty(&batches)?);
        return Ok(ExitCode::SUCCESS);
    }

    let transport = HttpTransport::new(settings.proxy.as_deref())?;
    log::info!(
        "{} {} -> {} (run dir {})",
        if args.resume { "resuming" } else { "uploading" },
        run_config.name,
        settings.endpoint,
        run_dir.display()
    );

    let report = UploadEngine::new(&transport, &settings, &run_dir)
        .with_progress(progress)
        .run(&inputs.records, &inputs.owners, args.resume)?;

    if progress.is_tty() {
        report.print();
    } else {
        report.log();
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "Some batches failed. Rerun with --resume to replay them: spendsync upload --resume {}",
            args.run_config.display()
        );
        Ok(ExitCode::from(EXIT_PARTIAL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    use spendsync_core::ProgressContext;

    fn write_inputs(dir: &Path) -> PathBuf {
        std::fs::write(
            dir.join("expenses.json"),
            r#"[{"cost-center":"0100","amount":5},{"cost-center":"200","amount":7}]"#,
        )
        .unwrap();
        std::fs::write(dir.join("owners.json"), r#"{"p123":["100"]}"#).unwrap();
        let path = dir.join("upload.toml");
        std::fs::write(
            &path,
            r#"
name = "fy26"

[target]
endpoint = "http://127.0.0.1:1/api"
user = "p123"

[input]
records = "expenses.json"
owners = "owners.json"
"#,
        )
        .unwrap();
        path
    }

    fn args(run_config: PathBuf, run_dir: &Path, dry_run: bool) -> UploadArgs {
        UploadArgs {
            run_config,
            resume: false,
            run_dir: Some(run_dir.to_path_buf()),
            dry_run,
        }
    }

    fn no_password() -> Config {
        let mut config = Config::default();
        config.target.password = None;
        config
    }

    #[test]
    fn dry_run_needs_no_password_and_leaves_run_dir_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let run_config = write_inputs(tmp.path());
        let run_dir = tmp.path().join("run");
        let progress = Arc::new(ProgressContext::new());

        run(args(run_config, &run_dir, true), &no_password(), &progress).unwrap();
        assert!(!run_dir.exists());
    }

    #[test]
    fn upload_without_password_fails_before_touching_run_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let run_config = write_inputs(tmp.path());
        let run_dir = tmp.path().join("run");
        let progress = Arc::new(ProgressContext::new());

        let err = run(args(run_config, &run_dir, false), &no_password(), &progress).unwrap_err();
        assert!(err.to_string().contains(PASSWORD_ENV));
        assert!(!run_dir.exists());
    }
}
