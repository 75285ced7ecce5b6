//! Data models for gdocs-sync.
//!
//! Result structs mirror the JSON the worker returns for each method and
//! use serde for decoding. Session-side types (`DocumentHandle`,
//! `SyncState`) never leave the process.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use url::Url;

/// Host serving document edit URLs.
const DOCS_HOST: &str = "docs.google.com";

/// Identifier of a remote document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a bare id or a `https://docs.google.com/document/d/<id>/...` URL.
    ///
    /// Returns `None` for empty input, a URL on another host, or a URL that
    /// does not contain an id.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let Ok(url) = Url::parse(input) else {
            let valid = input
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            return valid.then(|| Self::new(input));
        };

        if url.host_str() != Some(DOCS_HOST) {
            return None;
        }
        let mut segments = url.path_segments()?;
        while let Some(segment) = segments.next() {
            if segment == "d" {
                return segments
                    .next()
                    .filter(|id| !id.is_empty())
                    .map(Self::new);
            }
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Browser URL for editing the document.
    pub fn url(&self) -> String {
        format!("https://{}/document/d/{}/edit", DOCS_HOST, self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opaque server-side revision marker. Only compared for equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionToken(String);

impl RevisionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short form for status bars.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

/// Last known synced state of a remote document bound to a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub doc_id: DocumentId,
    pub title: String,
    pub revision: RevisionToken,
}

/// Presentation-level outcome of the last sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Synced,
    Syncing,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
        }
    }
}

/// Per-surface sync bookkeeping.
#[derive(Debug, Clone)]
pub struct SyncState {
    /// Local edits exist that have not been pushed.
    pub dirty: bool,
    pub status: SyncStatus,
    /// A push or pull for this surface is awaiting its response.
    pub in_flight: bool,
    /// Bumped on every local edit; a push only clears `dirty` if no edit
    /// landed after its content was read.
    pub edits: u64,
    /// Monotonic time of the last successful push or pull (or registration).
    pub last_sync: Option<Instant>,
    /// Wall-clock time of the last successful push or pull, for display.
    pub last_synced_at: Option<DateTime<Local>>,
}

impl SyncState {
    /// State for a surface whose content was just loaded from the remote.
    pub fn fresh(now: Instant) -> Self {
        Self {
            dirty: false,
            status: SyncStatus::Synced,
            in_flight: false,
            edits: 0,
            last_sync: Some(now),
            last_synced_at: Some(Local::now()),
        }
    }

    /// Record a local edit.
    pub fn record_edit(&mut self) {
        self.dirty = true;
        self.edits += 1;
    }

    /// Record a successful push or pull.
    pub fn mark_synced(&mut self, now: Instant) {
        self.dirty = false;
        self.status = SyncStatus::Synced;
        self.in_flight = false;
        self.last_sync = Some(now);
        self.last_synced_at = Some(Local::now());
    }

    /// Record a failed attempt. `dirty` is left as it was.
    pub fn mark_failed(&mut self) {
        self.status = SyncStatus::Error;
        self.in_flight = false;
    }

    /// Format the last sync time for display.
    pub fn last_synced_display(&self) -> String {
        match self.last_synced_at {
            Some(at) => at.format("%H:%M:%S").to_string(),
            None => "never".to_string(),
        }
    }
}

// =============================================================================
// Worker result payloads
// =============================================================================

/// One entry of a `list` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub name: String,
    /// RFC 3339 modification time, when the worker reports one.
    #[serde(default)]
    pub modified: Option<String>,
}

impl DocumentSummary {
    /// Modification time rendered in local time, or the raw value if it
    /// does not parse.
    pub fn modified_display(&self) -> String {
        match self.modified.as_deref() {
            None | Some("") => String::new(),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|_| raw.to_string()),
        }
    }
}

/// Full document as returned by `get`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteDocument {
    pub id: DocumentId,
    #[serde(default)]
    pub title: String,
    /// Markdown rendering of the document body.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub revision: RevisionToken,
}

/// Result of `create`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedDocument {
    pub id: DocumentId,
    pub title: String,
}

/// Result of `auth`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthOutcome {
    #[serde(default)]
    pub message: Option<String>,
}
