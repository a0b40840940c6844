//! Reconciliation primitives.
//!
//! This library provides helpers for implementing reconcilers that
//! converge a remote cluster toward a declared configuration. Key concepts:
//!
//! - **Desired state**: What the configuration document declares.
//! - **Current state**: What the cluster reports over its API.
//! - **Plan**: The create/update/delete buckets that close the gap.
//!
//! # Invariants
//!
//! - Records are matched by name, case-insensitively
//! - Planning is deterministic given the same inputs
//! - A name present on both sides is never both created and deleted

use std::collections::HashMap;
use std::fmt;
use std::ops::AddAssign;

use sha2::{Digest, Sha256};

/// A case-folded record name used for matching desired and current records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameKey(String);

impl NameKey {
    /// Fold a name into its matching key.
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    /// Get the folded form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NameKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<&String> for NameKey {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Case-insensitive string equality, the comparison used for names and free text.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Order-independent equality of two collections.
pub fn same_members<T, A, B>(a: A, b: B) -> bool
where
    T: Ord,
    A: IntoIterator<Item = T>,
    B: IntoIterator<Item = T>,
{
    let mut a: Vec<T> = a.into_iter().collect();
    let mut b: Vec<T> = b.into_iter().collect();
    a.sort();
    a.dedup();
    b.sort();
    b.dedup();
    a == b
}

/// The outcome of diffing desired records against current records by name.
#[derive(Debug)]
pub struct Plan<D, C> {
    /// Desired records with no current counterpart.
    pub create: Vec<D>,

    /// Pairs present on both sides; the caller decides whether they differ.
    pub update: Vec<(D, C)>,

    /// Current records with no desired counterpart.
    pub delete: Vec<C>,

    /// Current records whose declared name folds onto an earlier current
    /// record.
    ///
    /// These are left alone: picking which copy to drop would be a guess.
    /// Extra copies of an undeclared name land in `delete` instead.
    pub duplicates: Vec<C>,
}

impl<D, C> Plan<D, C> {
    /// Returns true if nothing needs to be created or deleted.
    pub fn is_balanced(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

/// Diff desired against current records by case-folded name.
///
/// Desired names are assumed unique (configuration validation guarantees
/// it); a later desired duplicate is dropped. Output order follows input
/// order on each side.
pub fn plan_by_name<D, C, FD, FC>(
    desired: impl IntoIterator<Item = D>,
    current: impl IntoIterator<Item = C>,
    desired_name: FD,
    current_name: FC,
) -> Plan<D, C>
where
    FD: Fn(&D) -> &str,
    FC: Fn(&C) -> &str,
{
    let mut slots: Vec<Option<C>> = Vec::new();
    let mut index: HashMap<NameKey, usize> = HashMap::new();
    let mut extra: Vec<(NameKey, C)> = Vec::new();

    for record in current {
        let key = NameKey::new(current_name(&record));
        if index.contains_key(&key) {
            extra.push((key, record));
        } else {
            index.insert(key, slots.len());
            slots.push(Some(record));
        }
    }

    let mut create = Vec::new();
    let mut update = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for record in desired {
        let key = NameKey::new(desired_name(&record));
        if !seen.insert(key.clone()) {
            continue;
        }
        match index.get(&key).and_then(|&i| slots[i].take()) {
            Some(existing) => update.push((record, existing)),
            None => create.push(record),
        }
    }

    let mut delete: Vec<C> = slots.into_iter().flatten().collect();
    let mut duplicates = Vec::new();
    for (key, record) in extra {
        if seen.contains(&key) {
            duplicates.push(record);
        } else {
            delete.push(record);
        }
    }

    Plan {
        create,
        update,
        delete,
        duplicates,
    }
}

/// What a reconciler did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Record was created remotely.
    Created,

    /// Record existed and was changed.
    Updated,

    /// Record was removed remotely.
    Deleted,

    /// Record already matched.
    Unchanged,

    /// Work was skipped because a prerequisite could not be resolved.
    Skipped,

    /// The cluster rejected the operation.
    Failed,
}

/// Per-resource tally of reconciler actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub unchanged: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl SyncReport {
    /// Record one action.
    pub fn record(&mut self, action: Action) {
        match action {
            Action::Created => self.created += 1,
            Action::Updated => self.updated += 1,
            Action::Deleted => self.deleted += 1,
            Action::Unchanged => self.unchanged += 1,
            Action::Skipped => self.skipped += 1,
            Action::Failed => self.failed += 1,
        }
    }

    /// Number of records the reconciler changed remotely.
    pub fn mutations(&self) -> u32 {
        self.created + self.updated + self.deleted
    }

    /// Returns true if every record ended up matching the desired state.
    pub fn is_converged(&self) -> bool {
        self.skipped == 0 && self.failed == 0
    }
}

impl AddAssign for SyncReport {
    fn add_assign(&mut self, rhs: Self) {
        self.created += rhs.created;
        self.updated += rhs.updated;
        self.deleted += rhs.deleted;
        self.unchanged += rhs.unchanged;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} updated={} deleted={} unchanged={} skipped={} failed={}",
            self.created, self.updated, self.deleted, self.unchanged, self.skipped, self.failed
        )
    }
}

/// A content hash for deterministic comparison of documents.
///
/// Used to detect when a configuration document has actually changed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecHash(String);

impl SpecHash {
    /// Compute a spec hash from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16]))) // First 16 bytes (128 bits)
    }

    /// Get the hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpecHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\":{}", escape_json_string(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(arr) => {
            let inner: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::String(s) => format!("\"{}\"", escape_json_string(s)),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}
