//! Record and owner file loading

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use spendsync_core::{OwnerDirectory, Record};
use spendsync_store::{hash_bytes, RunConfig};
use spendsync_upload::SourceIdentity;

/// Everything read from disk for one upload.
pub struct Inputs {
    pub records: Vec<Record>,
    pub owners: OwnerDirectory,
    pub record_source: SourceIdentity,
    pub owner_source: SourceIdentity,
}

pub fn load(run_config: &RunConfig) -> Result<Inputs> {
    let (records, record_source) = load_records(&run_config.records_path())?;
    let (owners, owner_source) =
        load_owners(&run_config.owners_path(), &run_config.input.owner_field)?;
    log::info!(
        "loaded {} records ({}) and {} owners ({})",
        records.len(),
        record_source.label,
        owners.len(),
        owner_source.label
    );
    Ok(Inputs {
        records,
        owners,
        record_source,
        owner_source,
    })
}

fn label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// JSON array of objects. Identity pins the exact bytes that were parsed.
fn load_records(path: &Path) -> Result<(Vec<Record>, SourceIdentity)> {
    let content = std::fs::read(path)
        .with_context(|| format!("failed to read records: {}", path.display()))?;
    let digest = hash_bytes(&content);
    let records: Vec<Record> = serde_json::from_slice(&content)
        .with_context(|| format!("records must be a JSON array of objects: {}", path.display()))?;
    Ok((
        records,
        SourceIdentity::new(label(path), digest.to_hex().to_string()),
    ))
}

/// JSON object `{ "<owner>": ["<key>", ...] }`. Identity is taken over the
/// normalized directory, so reformatting the file does not count as a change.
fn load_owners(path: &Path, field: &str) -> Result<(OwnerDirectory, SourceIdentity)> {
    let content = std::fs::read(path)
        .with_context(|| format!("failed to read owners: {}", path.display()))?;
    let map: BTreeMap<String, Vec<String>> = serde_json::from_slice(&content).with_context(|| {
        format!(
            "owners must map each owner to a list of keys: {}",
            path.display()
        )
    })?;
    let owners = OwnerDirectory::from_map(field, map);
    let digest = hash_bytes(owners.canonical().as_bytes());
    Ok((
        owners,
        SourceIdentity::new(label(path), digest.to_hex().to_string()),
    ))
}
