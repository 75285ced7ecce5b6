//! The editor side of document sync.
//!
//! The sync controller never touches text buffers or the screen directly.
//! Everything it needs from the editor goes through [`EditorHost`], which the
//! TUI implements over its text areas and tests implement in memory.

use std::fmt;

use crate::models::{DocumentHandle, SyncStatus};

/// Identifier of an editing surface (buffer) owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warn,
    Error,
}

/// Operations the controller needs from the editor.
pub trait EditorHost {
    /// Create a surface holding `content` for the given document.
    fn create_surface(&mut self, handle: &DocumentHandle, content: &str) -> SurfaceId;

    /// Current text of a surface, or `None` if it no longer exists.
    fn surface_content(&self, surface: SurfaceId) -> Option<String>;

    /// Replace the whole text of a surface.
    fn replace_content(&mut self, surface: SurfaceId, content: &str);

    /// Set or clear the surface's unsaved-changes marker.
    fn set_modified(&mut self, surface: SurfaceId, modified: bool);

    /// Show the sync status tag for a surface.
    fn set_sync_status(&mut self, surface: SurfaceId, status: SyncStatus);

    /// Bring an already open surface to the front.
    fn focus_surface(&mut self, surface: SurfaceId);

    fn notify(&mut self, level: NotifyLevel, message: &str);
}
