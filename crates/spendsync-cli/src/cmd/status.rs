//! `spendsync status` - inspect a run directory without touching the network

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use spendsync_store::{BatchState, RequestLog, RunFingerprint};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Run directory to inspect
    pub run_dir: PathBuf,
}

fn state_cell(state: &BatchState) -> Cell {
    match state {
        BatchState::Succeeded => Cell::new("ok").fg(Color::Green),
        BatchState::Failed { statuses } => {
            let codes: Vec<String> = statuses.iter().map(u16::to_string).collect();
            Cell::new(format!("failed ({})", codes.join(", "))).fg(Color::Red)
        }
        BatchState::Pending => Cell::new("no outcome").fg(Color::Yellow),
        BatchState::Gap => Cell::new("payload missing").fg(Color::Red),
    }
}

pub fn run(args: StatusArgs) -> Result<()> {
    let log = RequestLog::open(&args.run_dir);
    let index = log.scan()?;

    if !index.has_artifacts() {
        eprintln!("No run in {}.", args.run_dir.display());
        return Ok(());
    }

    if !index.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Batch").fg(Color::Cyan),
                Cell::new("State").fg(Color::Cyan),
                Cell::new("Files").fg(Color::Cyan),
            ]);

        for (id, artifacts) in index.iter() {
            let mut files: Vec<String> = artifacts
                .payload
                .iter()
                .chain(artifacts.outcomes.values())
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            files.sort();
            table.add_row(vec![
                Cell::new(id),
                state_cell(&artifacts.state()),
                Cell::new(files.join(" ")),
            ]);
        }
        eprintln!("\n{table}");
    }

    let fingerprint = log.read_fingerprint()?.map(|text| RunFingerprint::parse(&text));
    let expected = fingerprint.as_ref().and_then(RunFingerprint::batch_count);
    let unsent = index.unsent(expected.unwrap_or(0)).len();
    eprintln!(
        "{} batches: {} succeeded, {} resumable ({} never sent), {} need manual intervention",
        expected.map_or(index.len(), |n| n as usize),
        index.succeeded().len(),
        index.failed_batches().len() + unsent,
        unsent,
        index.gaps().len()
    );

    match fingerprint {
        Some(fingerprint) => {
            eprintln!("Fingerprint {}:", fingerprint.digest());
            for (key, value) in fingerprint.facts() {
                eprintln!("  {key} = {value}");
            }
        }
        None => eprintln!("No fingerprint: this run cannot be resumed."),
    }
    Ok(())
}
