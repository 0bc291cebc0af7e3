//! Line items and the owner directory that routes them

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Record field matched against owner keys unless configured otherwise.
pub const DEFAULT_OWNER_FIELD: &str = "cost-center";

/// A single line item read from the upstream source.
///
/// Kept as the raw JSON object so the payload sent upstream carries
/// every field exactly as it was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Field value as text. Numbers are rendered as their JSON form,
    /// anything else (objects, arrays, null) yields `None`.
    pub fn field_str(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Copy of this record with `name` set to `value`.
    pub fn with_field(&self, name: &str, value: impl Into<Value>) -> Self {
        let mut fields = self.0.clone();
        fields.insert(name.to_string(), value.into());
        Self(fields)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Resolves which owners a record is uploaded to.
pub trait OwnerLookup {
    /// Every owner known to the lookup.
    fn owners(&self) -> Vec<String>;

    /// Whether `record` belongs to `owner`.
    fn owns(&self, owner: &str, record: &Record) -> bool;
}

/// Normalise an owner key: trim, strip leading zeros (a key made only of
/// zeros keeps one), lowercase.
pub fn normalize_key(key: &str) -> String {
    let trimmed = key.trim();
    let stripped = trimmed.trim_start_matches('0');
    if stripped.is_empty() && !trimmed.is_empty() {
        "0".to_string()
    } else {
        stripped.to_lowercase()
    }
}

/// Owner → set of keys, matched against one field of each record.
///
/// Built once from upstream configuration and never mutated while a run
/// is in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerDirectory {
    field: String,
    keys: BTreeMap<String, BTreeSet<String>>,
}

impl OwnerDirectory {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            keys: BTreeMap::new(),
        }
    }

    /// Build from an owner → keys map (the `owners.json` shape).
    pub fn from_map(field: impl Into<String>, map: BTreeMap<String, Vec<String>>) -> Self {
        let mut dir = Self::new(field);
        for (owner, keys) in map {
            dir.insert(owner, keys);
        }
        dir
    }

    /// Add keys for `owner`, merging with any keys already present.
    pub fn insert<I, S>(&mut self, owner: impl Into<String>, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.keys.entry(owner.into()).or_default();
        entry.extend(keys.into_iter().map(|k| normalize_key(k.as_ref())));
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Canonical text form: the match field, then one `owner=k1,k2` line
    /// per owner in key order. Used to fingerprint the owner source.
    pub fn canonical(&self) -> String {
        let mut out = format!("field={}\n", self.field);
        for (owner, keys) in &self.keys {
            let joined: Vec<&str> = keys.iter().map(String::as_str).collect();
            out.push_str(&format!("{owner}={}\n", joined.join(",")));
        }
        out
    }
}

impl OwnerLookup for OwnerDirectory {
    fn owners(&self) -> Vec<String> {
        self.keys.keys().cloned().collect()
    }

    fn owns(&self, owner: &str, record: &Record) -> bool {
        let Some(keys) = self.keys.get(owner) else {
            return false;
        };
        record
            .field_str(&self.field)
            .is_some_and(|value| keys.contains(&normalize_key(&value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: serde_json::Value) -> Record {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn normalize_strips_leading_zeros() {
        assert_eq!(normalize_key("0001000"), "1000");
        assert_eq!(normalize_key("000"), "0");
        assert_eq!(normalize_key(" CC-7 "), "cc-7");
        assert_eq!(normalize_key(""), "");
    }

    #[test]
    fn owns_is_case_and_zero_insensitive() {
        let mut dir = OwnerDirectory::new(DEFAULT_OWNER_FIELD);
        dir.insert("alice", ["0000001234", "ABC"]);

        assert!(dir.owns("alice", &record(json!({"cost-center": "1234"}))));
        assert!(dir.owns("alice", &record(json!({"cost-center": "abc"}))));
        assert!(dir.owns("alice", &record(json!({"cost-center": 1234}))));
        assert!(!dir.owns("alice", &record(json!({"cost-center": "999"}))));
        assert!(!dir.owns("bob", &record(json!({"cost-center": "1234"}))));
    }

    #[test]
    fn owns_missing_field_is_false() {
        let mut dir = OwnerDirectory::new("cost-center");
        dir.insert("alice", ["1"]);
        assert!(!dir.owns("alice", &record(json!({"account": "1"}))));
        assert!(!dir.owns("alice", &record(json!({"cost-center": null}))));
    }

    #[test]
    fn canonical_is_order_independent() {
        let a = OwnerDirectory::from_map(
            "cost-center",
            BTreeMap::from([
                ("bob".into(), vec!["2".into(), "1".into()]),
                ("alice".into(), vec!["3".into()]),
            ]),
        );
        let mut b = OwnerDirectory::new("cost-center");
        b.insert("alice", ["003"]);
        b.insert("bob", ["1", "2"]);
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), "field=cost-center\nalice=3\nbob=1,2\n");
    }

    #[test]
    fn with_field_leaves_original_untouched() {
        let r = record(json!({"amount": 10}));
        let stamped = r.with_field("approver", "p123");
        assert!(r.fields().get("approver").is_none());
        assert_eq!(stamped.field_str("approver").as_deref(), Some("p123"));
    }
}
