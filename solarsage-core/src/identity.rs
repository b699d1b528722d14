//! Identity types for SolarSage records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 hash of a captured frame, used as an audit reference.
pub type FrameHash = [u8; 32];

/// Compute SHA-256 hash of raw frame bytes.
pub fn compute_frame_hash(content: &[u8]) -> FrameHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Render a frame hash as an image reference (`sha256:<hex>`).
pub fn frame_ref(hash: &FrameHash) -> String {
    format!("sha256:{}", hex::encode(hash))
}

// ============================================================================
// RECORD IDENTIFIERS
// ============================================================================

/// Common behaviour of the UUIDv7-backed record identifiers.
pub trait RecordId: Copy + Eq + fmt::Display {
    /// Wrap an existing UUID.
    fn new(uuid: Uuid) -> Self;

    /// Generate a fresh, timestamp-sortable identifier.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// Access the underlying UUID.
    fn as_uuid(&self) -> Uuid;
}

macro_rules! define_record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl RecordId for $name {
            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_record_id!(
    /// Identifies one pipeline run. UUIDv7: millisecond timestamp prefix plus a random suffix.
    DecisionId
);

define_record_id!(
    /// Identifies one classification of one panel.
    ObservationId
);

define_record_id!(
    /// Identifies one system log entry.
    LogId
);

// ============================================================================
// PANEL IDENTITY
// ============================================================================

/// Error when a panel identifier is empty or contains a separator byte.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid panel id {0:?}: must be non-empty, without control characters or path separators")]
pub struct PanelIdError(pub String);

/// Panel identifier as configured in the roster (e.g. `panel_01`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PanelId(String);

impl PanelId {
    /// Create a panel id, rejecting empty strings, control characters and
    /// path separators.
    ///
    /// Control characters are reserved as key separators by the stores. Ids
    /// also name frame files, so they must stay a single path component.
    pub fn new(id: impl Into<String>) -> Result<Self, PanelIdError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty()
            || trimmed
                .chars()
                .any(|c| c.is_control() || c == '/' || c == '\\')
        {
            return Err(PanelIdError(id));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PanelId {
    type Err = PanelIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PanelId {
    type Error = PanelIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PanelId> for String {
    fn from(id: PanelId) -> Self {
        id.0
    }
}

impl AsRef<str> for PanelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
