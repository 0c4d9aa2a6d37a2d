//! Diary record model
//!
//! The unit of reconciliation. The engine does not own the diary schema, so
//! record bodies are a tagged union over the kinds it understands plus an
//! opaque fallback that is carried through untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Identifier of a logical diary record, assigned by the diary store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap a record identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A diary entry as written by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiaryEntry {
    /// Entry title
    #[serde(default)]
    pub title: String,
    /// Entry text
    #[serde(default)]
    pub body: String,
    /// Optional mood label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DiaryEntry {
    /// Entry with only a title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Entry with only a body
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }
}

/// Record payload: a known record kind or opaque bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordBody {
    /// Diary entry
    Diary(DiaryEntry),
    /// Unknown record kind, preserved byte for byte
    Opaque {
        /// Raw serialized record
        bytes: Vec<u8>,
    },
}

/// Snapshot of a diary record on one side of a sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Logical record identifier
    pub id: RecordId,
    /// Record payload
    pub body: RecordBody,
    /// Last modification timestamp (Unix ms)
    pub updated_at: i64,
    /// Tombstone flag for deletes
    #[serde(default)]
    pub deleted: bool,
}

impl Record {
    /// Diary record stamped with the current time
    pub fn diary(id: impl Into<RecordId>, entry: DiaryEntry) -> Self {
        Self {
            id: id.into(),
            body: RecordBody::Diary(entry),
            updated_at: crate::util::unix_millis_now(),
            deleted: false,
        }
    }

    /// Opaque record stamped with the current time
    pub fn opaque(id: impl Into<RecordId>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            body: RecordBody::Opaque { bytes },
            updated_at: crate::util::unix_millis_now(),
            deleted: false,
        }
    }

    /// Override the modification timestamp
    #[must_use]
    pub const fn with_updated_at(mut self, updated_at: i64) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Tombstone of this record, keeping the last known body
    #[must_use]
    pub fn tombstone(&self, deleted_at: i64) -> Self {
        Self {
            deleted: true,
            updated_at: deleted_at,
            ..self.clone()
        }
    }

    /// Diary payload, if this record is a diary entry
    pub const fn as_diary(&self) -> Option<&DiaryEntry> {
        match &self.body {
            RecordBody::Diary(entry) => Some(entry),
            RecordBody::Opaque { .. } => None,
        }
    }

    /// Canonical serialized form used for equality checks
    pub fn fingerprint(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialized size in bytes
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(serde_json::to_vec(self)?.len())
    }
}
