//! Run fingerprint: the configuration facts that decide what a run uploads
//!
//! Rendered as one `key=value` fact per line into `config.txt`. A resume is
//! only allowed when the stored text equals the current rendering byte for
//! byte.

use crate::hash;

/// File holding the fingerprint inside a run directory.
pub const FINGERPRINT_FILE: &str = "config.txt";

/// Fact holding the number of batches the run was partitioned into.
pub const BATCHES_FACT: &str = "batches";

/// Bumped when the set or meaning of facts changes.
pub const FINGERPRINT_FORMAT: u32 = 1;

/// Ordered list of configuration facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFingerprint {
    facts: Vec<(String, String)>,
}

impl Default for RunFingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl RunFingerprint {
    /// Empty fingerprint carrying only the format fact.
    pub fn new() -> Self {
        Self {
            facts: vec![("format".to_string(), FINGERPRINT_FORMAT.to_string())],
        }
    }

    /// Append a fact. Line breaks in the value are escaped so every fact
    /// stays on one line.
    pub fn fact(mut self, key: &str, value: impl AsRef<str>) -> Self {
        let value = value.as_ref().replace('\r', "\\r").replace('\n', "\\n");
        self.facts.push((key.to_string(), value));
        self
    }

    pub fn facts(&self) -> &[(String, String)] {
        &self.facts
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.facts
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Batch count of the run, if recorded.
    pub fn batch_count(&self) -> Option<u64> {
        self.get(BATCHES_FACT)?.parse().ok()
    }

    /// Canonical text written to `config.txt`.
    pub fn render(&self) -> String {
        self.facts
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect()
    }

    /// Parse stored text. Lenient: a line without `=` becomes a key with an
    /// empty value so differences can still be reported.
    pub fn parse(text: &str) -> Self {
        let facts = text
            .lines()
            .filter(|l| !l.is_empty())
            .map(|line| match line.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (line.to_string(), String::new()),
            })
            .collect();
        Self { facts }
    }

    /// Short blake3 digest of the rendered text, for display.
    pub fn digest(&self) -> String {
        hash::short_hash(&hash::hash_bytes(self.render().as_bytes()))
    }

    /// Human-readable list of facts that differ from `current`.
    pub fn differences(&self, current: &Self) -> Vec<String> {
        let mut out = Vec::new();
        for (key, old) in &self.facts {
            match current.get(key) {
                Some(new) if new == old => {}
                Some(new) => out.push(format!("{key}: '{old}' -> '{new}'")),
                None => out.push(format!("{key}: '{old}' -> (absent)")),
            }
        }
        for (key, new) in &current.facts {
            if self.get(key).is_none() {
                out.push(format!("{key}: (absent) -> '{new}'"));
            }
        }
        if out.is_empty() && self.render() != current.render() {
            out.push("fact order or formatting changed".to_string());
        }
        out
    }
}
