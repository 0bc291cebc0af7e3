//! Artifact naming and the typed index built from a run directory scan
//!
//! ```text
//! {run_dir}/
//! ├── config.txt            # run fingerprint
//! ├── batch1.json           # payload, written before send
//! ├── batch1_200.json       # outcome: accepted
//! ├── batch2.json
//! ├── batch2_500.json       # outcome: rejected, resumable
//! ├── batch3.json           # no outcome: crashed mid-flight, resumable
//! └── batch4_0.json         # outcome without payload: unrecoverable gap
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use spendsync_core::SUCCESS_STATUS;

use crate::fingerprint::FINGERPRINT_FILE;

const PREFIX: &str = "batch";
const SUFFIX: &str = ".json";

/// Parsed artifact filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactName {
    /// `batch<N>.json`
    Payload { batch_id: u64 },
    /// `batch<N>_<status>.json`
    Outcome { batch_id: u64, status: u16 },
}

fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl ArtifactName {
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
        match stem.split_once('_') {
            Some((id, status)) => Some(Self::Outcome {
                batch_id: parse_digits(id)?,
                status: parse_digits(status)?,
            }),
            None => Some(Self::Payload {
                batch_id: parse_digits(stem)?,
            }),
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            Self::Payload { batch_id } => format!("{PREFIX}{batch_id}{SUFFIX}"),
            Self::Outcome { batch_id, status } => format!("{PREFIX}{batch_id}_{status}{SUFFIX}"),
        }
    }

    pub fn batch_id(&self) -> u64 {
        match self {
            Self::Payload { batch_id } | Self::Outcome { batch_id, .. } => *batch_id,
        }
    }
}

/// Derived state of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    /// A 200 outcome exists
    Succeeded,
    /// Payload present, only non-success outcomes
    Failed { statuses: Vec<u16> },
    /// Payload present, no outcome at all (never answered)
    Pending,
    /// Outcomes without a payload; cannot be replayed
    Gap,
}

/// Files belonging to one batch id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchArtifacts {
    pub payload: Option<PathBuf>,
    pub outcomes: BTreeMap<u16, PathBuf>,
}

impl BatchArtifacts {
    pub fn state(&self) -> BatchState {
        if self.outcomes.contains_key(&SUCCESS_STATUS) {
            BatchState::Succeeded
        } else if self.payload.is_none() {
            BatchState::Gap
        } else if self.outcomes.is_empty() {
            BatchState::Pending
        } else {
            BatchState::Failed {
                statuses: self.outcomes.keys().copied().collect(),
            }
        }
    }

    /// Paths of every non-success outcome.
    pub fn failure_markers(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter(|(status, _)| **status != SUCCESS_STATUS)
            .map(|(_, path)| path.clone())
            .collect()
    }
}

/// A batch that can be replayed from its persisted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    pub batch_id: u64,
    pub payload: PathBuf,
    /// Non-success outcomes to remove once the replay succeeds
    pub failure_markers: Vec<PathBuf>,
}

/// Outcome artifacts whose payload is gone. Needs manual intervention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecoverableGap {
    pub batch_id: u64,
    pub outcomes: Vec<PathBuf>,
}

/// Snapshot of a run directory, built once per checkpoint.
#[derive(Debug, Clone, Default)]
pub struct ArtifactIndex {
    has_fingerprint: bool,
    batches: BTreeMap<u64, BatchArtifacts>,
}

impl ArtifactIndex {
    /// Scan `dir`. A missing directory yields an empty index.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut index = Self::default();
        if !dir.exists() {
            return Ok(index);
        }
        index.has_fingerprint = dir.join(FINGERPRINT_FILE).is_file();

        // Escape the directory so brackets or stars in it match literally
        let pattern = format!(
            "{}/{PREFIX}*{SUFFIX}",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        log::debug!("scanning {pattern}");

        for entry in glob::glob(&pattern).context("invalid glob pattern")? {
            let path = entry.with_context(|| format!("failed to read {}", dir.display()))?;
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if !path.is_file() {
                continue;
            }
            let Some(artifact) = ArtifactName::parse(&name) else {
                log::debug!("ignoring unrecognised file {}", path.display());
                continue;
            };
            let slot = index.batches.entry(artifact.batch_id()).or_default();
            match artifact {
                ArtifactName::Payload { .. } => slot.payload = Some(path),
                ArtifactName::Outcome { status, .. } => {
                    slot.outcomes.insert(status, path);
                }
            }
        }
        Ok(index)
    }

    /// No batch artifacts (a lone fingerprint does not count).
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Anything at all from a previous run, fingerprint included.
    pub fn has_artifacts(&self) -> bool {
        self.has_fingerprint || !self.batches.is_empty()
    }

    #[cfg(test)]
    fn has_fingerprint(&self) -> bool {
        self.has_fingerprint
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn get(&self, batch_id: u64) -> Option<&BatchArtifacts> {
        self.batches.get(&batch_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &BatchArtifacts)> {
        self.batches.iter().map(|(id, a)| (*id, a))
    }

    pub fn succeeded(&self) -> Vec<u64> {
        self.iter()
            .filter(|(_, a)| a.state() == BatchState::Succeeded)
            .map(|(id, _)| id)
            .collect()
    }

    /// Replayable batches in ascending id: failed outcome or no outcome,
    /// payload still on disk.
    pub fn failed_batches(&self) -> Vec<PendingBatch> {
        self.iter()
            .filter_map(|(id, a)| match a.state() {
                BatchState::Failed { .. } | BatchState::Pending => Some(PendingBatch {
                    batch_id: id,
                    payload: a.payload.clone()?,
                    failure_markers: a.failure_markers(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Outcome-only batches in ascending id.
    pub fn gaps(&self) -> Vec<UnrecoverableGap> {
        self.iter()
            .filter(|(_, a)| a.state() == BatchState::Gap)
            .map(|(id, a)| UnrecoverableGap {
                batch_id: id,
                outcomes: a.outcomes.values().cloned().collect(),
            })
            .collect()
    }

    /// Ids in `1..=expected` that left no artifact at all: the run never
    /// reached them.
    pub fn unsent(&self, expected: u64) -> Vec<u64> {
        (1..=expected)
            .filter(|id| !self.batches.contains_key(id))
            .collect()
    }

    /// Every recorded batch succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.batches
            .values()
            .all(|a| a.state() == BatchState::Succeeded)
    }
}
