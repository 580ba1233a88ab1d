//! Unordered comparison keys
//!
//! A key remembers the orientation it was built with (the first label is the
//! group coded 1 by the indicator), but equality and hashing ignore it, so a
//! map keyed by `PairKey` answers `(a, b)` and `(b, a)` identically.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Unordered pair of distinct group labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairKey {
    focal: String,
    reference: String,
}

impl PairKey {
    /// Build a key; `focal` is coded 1 by the group indicator
    ///
    /// Returns `None` when both labels are equal.
    pub fn new(focal: impl Into<String>, reference: impl Into<String>) -> Option<Self> {
        let focal = focal.into();
        let reference = reference.into();
        if focal == reference {
            return None;
        }
        Some(Self { focal, reference })
    }

    pub fn focal(&self) -> &str {
        &self.focal
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Labels in lexicographic order, the identity used for hashing
    fn canonical(&self) -> (&str, &str) {
        if self.focal <= self.reference {
            (&self.focal, &self.reference)
        } else {
            (&self.reference, &self.focal)
        }
    }

    /// True when `(a, b)` names this pair in either order
    pub fn matches(&self, a: &str, b: &str) -> bool {
        (self.focal == a && self.reference == b) || (self.focal == b && self.reference == a)
    }
}

impl PartialEq for PairKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for PairKey {}

impl Hash for PairKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.focal, self.reference)
    }
}
