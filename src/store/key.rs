//! Keys for the distributed store.

use std::fmt;

/// Immutable (label, owner index) pair. Two keys are equal when both the
/// label and the owner index match; the owner index decides which node's
/// local map holds the value and never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    label: String,
    owner: usize,
}

impl Key {
    pub fn new(label: impl Into<String>, owner: usize) -> Self {
        Self {
            label: label.into(),
            owner,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Index of the node that owns this key's value.
    pub fn owner(&self) -> usize {
        self.owner
    }

    /// Hash used by the local map: sum of the label bytes plus the owner
    /// index.
    pub fn table_hash(&self) -> usize {
        self.label
            .bytes()
            .fold(self.owner, |acc, b| acc.wrapping_add(b as usize))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.label, self.owner)
    }
}
