//! Validity gate: requested arguments against the known set.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::ValidityPolicy;

/// Authoritative arguments for one invocation (repository labels or CI jobs)
///
/// Lookups are case-insensitive; matches resolve to the canonical spelling
/// the system of record uses.
#[derive(Debug, Clone, Default)]
pub struct KnownSet {
    entries: Vec<String>,
    index: HashMap<String, usize>,
}

impl KnownSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for name in names {
            let name = name.into();
            let folded = fold(&name);
            if folded.is_empty() || set.index.contains_key(&folded) {
                continue;
            }
            set.index.insert(folded, set.entries.len());
            set.entries.push(name);
        }
        set
    }

    /// Canonical spelling of `name`, if known.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.index
            .get(&fold(name))
            .map(|&position| self.entries[position].as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn names(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn fold(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Outcome of the validity gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidityVerdict {
    /// Proceed with `arguments` (canonical names); `dropped` were unknown.
    /// Under the lenient policy `arguments` may be empty.
    Actionable {
        arguments: Vec<String>,
        dropped: Vec<String>,
    },
    /// Strict policy and nothing requested is known
    Rejected {
        requested: Vec<String>,
        supported: Vec<String>,
    },
}

/// Intersect `requested` with `known` under `policy`.
pub fn apply_validity(
    policy: &ValidityPolicy,
    requested: &[String],
    known: &KnownSet,
) -> ValidityVerdict {
    if let ValidityPolicy::Strict { expand_token } = policy {
        if requested.iter().any(|arg| arg.eq_ignore_ascii_case(expand_token)) {
            debug!(count = known.len(), "Expanding to every known argument");
            return ValidityVerdict::Actionable {
                arguments: known.names().to_vec(),
                dropped: Vec::new(),
            };
        }
    }

    let mut arguments: Vec<String> = Vec::new();
    let mut dropped = Vec::new();
    for arg in requested {
        match known.resolve(arg) {
            Some(canonical) => {
                if !arguments.iter().any(|a| a == canonical) {
                    arguments.push(canonical.to_string());
                }
            }
            None => dropped.push(arg.clone()),
        }
    }

    if !dropped.is_empty() {
        debug!(dropped = ?dropped, "Ignoring unknown arguments");
    }

    match policy {
        ValidityPolicy::Strict { .. } if arguments.is_empty() => {
            warn!(requested = ?requested, "None of the requested arguments are supported");
            ValidityVerdict::Rejected {
                requested: requested.to_vec(),
                supported: known.names().to_vec(),
            }
        }
        _ => ValidityVerdict::Actionable { arguments, dropped },
    }
}
