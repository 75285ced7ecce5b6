//! Mapping between remote documents and editor surfaces.
//!
//! Each live document is bound to exactly one surface. The registry keeps
//! both directions of that mapping together with the document's last known
//! synced metadata, its sync state and its auto-sync timer. State is
//! in-memory only and lives as long as the session.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::models::{DocumentHandle, DocumentId, RevisionToken, SyncState};
use crate::sync::{AutoSyncTimer, SurfaceId};

#[derive(Debug)]
struct Entry {
    handle: DocumentHandle,
    state: SyncState,
    timer: Option<AutoSyncTimer>,
}

#[derive(Debug, Default)]
pub struct DocumentRegistry {
    by_doc: HashMap<DocumentId, SurfaceId>,
    by_surface: HashMap<SurfaceId, Entry>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `doc_id` to `surface`.
    ///
    /// If the document is already bound, the existing surface is returned
    /// and nothing changes; the caller should use that surface instead.
    pub fn register(
        &mut self,
        doc_id: DocumentId,
        surface: SurfaceId,
        title: impl Into<String>,
        revision: RevisionToken,
    ) -> SurfaceId {
        if let Some(existing) = self.by_doc.get(&doc_id) {
            debug!("{} already bound to surface {}", doc_id, existing);
            return *existing;
        }

        self.by_doc.insert(doc_id.clone(), surface);
        self.by_surface.insert(
            surface,
            Entry {
                handle: DocumentHandle {
                    doc_id,
                    title: title.into(),
                    revision,
                },
                state: SyncState::fresh(Instant::now()),
                timer: None,
            },
        );
        surface
    }

    pub fn lookup_by_surface(&self, surface: SurfaceId) -> Option<&DocumentId> {
        self.by_surface.get(&surface).map(|e| &e.handle.doc_id)
    }

    pub fn lookup_by_doc(&self, doc_id: &DocumentId) -> Option<SurfaceId> {
        self.by_doc.get(doc_id).copied()
    }

    pub fn handle(&self, surface: SurfaceId) -> Option<&DocumentHandle> {
        self.by_surface.get(&surface).map(|e| &e.handle)
    }

    pub fn handle_mut(&mut self, surface: SurfaceId) -> Option<&mut DocumentHandle> {
        self.by_surface.get_mut(&surface).map(|e| &mut e.handle)
    }

    pub fn state(&self, surface: SurfaceId) -> Option<&SyncState> {
        self.by_surface.get(&surface).map(|e| &e.state)
    }

    pub fn state_mut(&mut self, surface: SurfaceId) -> Option<&mut SyncState> {
        self.by_surface.get_mut(&surface).map(|e| &mut e.state)
    }

    /// Store a new revision for the surface's document. Returns `false` if
    /// the surface is not bound.
    pub fn update_revision(&mut self, surface: SurfaceId, revision: RevisionToken) -> bool {
        match self.by_surface.get_mut(&surface) {
            Some(entry) => {
                entry.handle.revision = revision;
                true
            }
            None => false,
        }
    }

    /// Whether `surface` is still bound to `doc_id`.
    pub fn is_bound_to(&self, surface: SurfaceId, doc_id: &DocumentId) -> bool {
        self.lookup_by_surface(surface) == Some(doc_id)
    }

    pub fn timer(&self, surface: SurfaceId) -> Option<&AutoSyncTimer> {
        self.by_surface.get(&surface).and_then(|e| e.timer.as_ref())
    }

    pub fn timer_mut(&mut self, surface: SurfaceId) -> Option<&mut AutoSyncTimer> {
        self.by_surface.get_mut(&surface).and_then(|e| e.timer.as_mut())
    }

    /// Install or clear the surface's timer. A previous timer is dropped.
    pub fn set_timer(&mut self, surface: SurfaceId, timer: Option<AutoSyncTimer>) {
        if let Some(entry) = self.by_surface.get_mut(&surface) {
            entry.timer = timer;
        }
    }

    /// Surfaces whose timer is due at `now`.
    pub fn due_surfaces(&self, now: Instant) -> Vec<SurfaceId> {
        let mut due: Vec<SurfaceId> = self
            .by_surface
            .iter()
            .filter(|(_, e)| e.timer.as_ref().is_some_and(|t| t.is_due(now)))
            .map(|(s, _)| *s)
            .collect();
        due.sort();
        due
    }

    /// Remove both mappings and stop the surface's timer.
    pub fn unregister(&mut self, surface: SurfaceId) -> Option<DocumentHandle> {
        let entry = self.by_surface.remove(&surface)?;
        self.by_doc.remove(&entry.handle.doc_id);
        Some(entry.handle)
    }

    /// Bound surfaces in ascending order.
    pub fn surfaces(&self) -> Vec<SurfaceId> {
        let mut surfaces: Vec<SurfaceId> = self.by_surface.keys().copied().collect();
        surfaces.sort();
        surfaces
    }

    pub fn len(&self) -> usize {
        self.by_surface.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_surface.is_empty()
    }
}
