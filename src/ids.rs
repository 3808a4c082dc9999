//! Dual identifier space.
//!
//! The store addresses documents by an opaque string; the domain uses a
//! 32-bit integer derived from that string with [`stable_hash`]. Both are kept
//! on every document written by this crate.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Deterministic 32-bit hash of an opaque document id.
///
/// Polynomial base 31 over UTF-16 code units with wrapping arithmetic. The
/// output depends only on the input text, so the same document id maps to the
/// same numeric id in every process, on every platform, and in the legacy
/// application that wrote the first generation of documents.
pub fn stable_hash(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0i32, |acc, unit| acc.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Identifier carrying both the numeric domain id and the opaque document id.
///
/// Equality, ordering and hashing use the numeric id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityId {
    value: i32,
    document_id: String,
}

impl EntityId {
    pub fn new(value: i32, document_id: impl Into<String>) -> Self {
        Self {
            value,
            document_id: document_id.into(),
        }
    }

    /// Derives the numeric id from a freshly allocated document id.
    pub fn from_document_id(document_id: impl Into<String>) -> Self {
        let document_id = document_id.into();
        Self {
            value: stable_hash(&document_id),
            document_id,
        }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }
}

impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for EntityId {}

impl PartialEq<i32> for EntityId {
    fn eq(&self, other: &i32) -> bool {
        self.value == *other
    }
}

impl Hash for EntityId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<&EntityId> for i32 {
    fn from(id: &EntityId) -> Self {
        id.value
    }
}
