//! Push, pull and auto-sync for bound surfaces.

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bridge::{DocsBridge, DocsError};
use crate::config::Config;
use crate::ipc::RpcService;
use crate::models::{
    AuthOutcome, CreatedDocument, DocumentHandle, DocumentId, DocumentSummary, RemoteDocument,
    RevisionToken, SyncState, SyncStatus,
};
use crate::registry::DocumentRegistry;
use crate::sync::host::{EditorHost, NotifyLevel, SurfaceId};
use crate::sync::timer::AutoSyncTimer;

/// Errors from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The surface is not bound to a remote document.
    #[error("Not a Google Docs surface")]
    NotBound,

    /// Required input was empty.
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    #[error(transparent)]
    Docs(#[from] DocsError),
}

/// Something the front end may want to react to, reported by
/// [`SyncController::poll_events`].
#[derive(Debug)]
pub enum SyncOutcome {
    Opened {
        surface: SurfaceId,
        doc_id: DocumentId,
        /// The document was already open and its surface was reused.
        reused: bool,
    },
    Pushed {
        surface: SurfaceId,
    },
    Pulled {
        surface: SurfaceId,
    },
    Failed {
        surface: Option<SurfaceId>,
        error: SyncError,
    },
    Listed(Vec<DocumentSummary>),
    Authenticated(bool),
    RemoteChanged {
        surface: SurfaceId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Manual,
    Auto,
}

/// Where the answer to a remote revision check goes.
enum RemoteReply {
    Callback(Box<dyn FnOnce(bool) + Send>),
    /// Warn the user if the document changed.
    Advisory,
}

/// RPC completions, queued for the main loop.
enum SyncEvent {
    Fetched {
        doc_id: DocumentId,
        result: Result<RemoteDocument, DocsError>,
    },
    Created {
        result: Result<CreatedDocument, DocsError>,
    },
    Pushed {
        surface: SurfaceId,
        doc_id: DocumentId,
        trigger: Trigger,
        /// Edit count when the content was read.
        edits: u64,
        result: Result<(), DocsError>,
    },
    RevisionRefreshed {
        surface: SurfaceId,
        doc_id: DocumentId,
        result: Result<RevisionToken, DocsError>,
    },
    Pulled {
        surface: SurfaceId,
        doc_id: DocumentId,
        result: Result<RemoteDocument, DocsError>,
    },
    RemoteChecked {
        surface: SurfaceId,
        doc_id: DocumentId,
        result: Result<RevisionToken, DocsError>,
        reply: RemoteReply,
    },
    Listed {
        result: Result<Vec<DocumentSummary>, DocsError>,
    },
    AuthFinished {
        result: Result<AuthOutcome, DocsError>,
    },
    AuthStatus {
        result: Result<bool, DocsError>,
    },
}

/// Owns the document registry and drives every sync operation.
///
/// All methods are called from the main loop. RPC results come back through
/// [`SyncController::poll_events`], which must be called regularly.
pub struct SyncController<H: EditorHost> {
    docs: DocsBridge,
    registry: DocumentRegistry,
    host: H,
    config: Config,
    /// Documents with a `get` in flight for opening.
    opening: HashSet<DocumentId>,
    events_tx: Sender<SyncEvent>,
    events_rx: Receiver<SyncEvent>,
    outcomes: Vec<SyncOutcome>,
}

impl<H: EditorHost> SyncController<H> {
    pub fn new(rpc: Arc<dyn RpcService>, host: H, config: Config) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            docs: DocsBridge::new(rpc),
            registry: DocumentRegistry::new(),
            host,
            config,
            opening: HashSet::new(),
            events_tx,
            events_rx,
            outcomes: Vec::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn handle(&self, surface: SurfaceId) -> Option<&DocumentHandle> {
        self.registry.handle(surface)
    }

    pub fn state(&self, surface: SurfaceId) -> Option<&SyncState> {
        self.registry.state(surface)
    }

    /// Whether an open of `doc_id` is waiting for the worker.
    pub fn is_opening(&self, doc_id: &DocumentId) -> bool {
        self.opening.contains(doc_id)
    }

    /// Wrap `make` so the callback queues its event for the main loop.
    fn emit<T, F>(&self, make: F) -> impl FnOnce(T) + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce(T) -> SyncEvent + Send + 'static,
    {
        let tx = self.events_tx.clone();
        move |value| {
            if tx.send(make(value)).is_err() {
                debug!("Sync controller gone; dropping result");
            }
        }
    }

    fn notify(&mut self, level: NotifyLevel, message: &str) {
        self.host.notify(level, message);
    }

    fn not_bound(&mut self) -> SyncError {
        let err = SyncError::NotBound;
        self.notify(NotifyLevel::Warn, &err.to_string());
        err
    }

    fn title_of(&self, surface: SurfaceId) -> String {
        self.registry
            .handle(surface)
            .map(|h| h.title.clone())
            .unwrap_or_default()
    }

    // =========================================================================
    // Opening and creating
    // =========================================================================

    /// Open `doc_id` in a surface.
    ///
    /// A document that is already open is focused instead, and a second
    /// request while the first is still loading is ignored.
    pub fn open_document(&mut self, doc_id: DocumentId) {
        if let Some(surface) = self.registry.lookup_by_doc(&doc_id) {
            self.host.focus_surface(surface);
            self.outcomes.push(SyncOutcome::Opened {
                surface,
                doc_id,
                reused: true,
            });
            return;
        }

        if !self.opening.insert(doc_id.clone()) {
            debug!("Open of {} already in progress", doc_id);
            return;
        }

        info!("Opening document {}", doc_id);
        let id = doc_id.clone();
        self.docs
            .get(&doc_id, self.emit(move |result| SyncEvent::Fetched { doc_id: id, result }));
    }

    /// Create a remote document and open it.
    pub fn create_document(&mut self, title: &str) -> Result<(), SyncError> {
        let title = title.trim();
        if title.is_empty() {
            let err = SyncError::EmptyInput("Document title");
            self.notify(NotifyLevel::Warn, &err.to_string());
            return Err(err);
        }

        info!("Creating document {:?}", title);
        self.docs
            .create(title, self.emit(|result| SyncEvent::Created { result }));
        Ok(())
    }

    fn finish_open(&mut self, doc_id: DocumentId, result: Result<RemoteDocument, DocsError>) {
        self.opening.remove(&doc_id);

        let doc = match result {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Failed to open {}: {}", doc_id, e);
                self.notify(NotifyLevel::Error, &format!("Failed to open {}: {}", doc_id, e));
                self.outcomes.push(SyncOutcome::Failed {
                    surface: None,
                    error: e.into(),
                });
                return;
            }
        };

        if let Some(surface) = self.registry.lookup_by_doc(&doc_id) {
            self.host.focus_surface(surface);
            self.outcomes.push(SyncOutcome::Opened {
                surface,
                doc_id,
                reused: true,
            });
            return;
        }

        let handle = DocumentHandle {
            doc_id: doc_id.clone(),
            title: doc.title,
            revision: doc.revision,
        };
        let surface = self.host.create_surface(&handle, &doc.content);
        let surface = self
            .registry
            .register(handle.doc_id, surface, handle.title.clone(), handle.revision);
        self.host.set_modified(surface, false);
        self.host.set_sync_status(surface, SyncStatus::Synced);
        self.start_timer(surface, Instant::now());

        info!("Opened {} as surface {}", doc_id, surface);
        self.notify(NotifyLevel::Info, &format!("Opened '{}'", handle.title));
        self.outcomes.push(SyncOutcome::Opened {
            surface,
            doc_id,
            reused: false,
        });
    }

    // =========================================================================
    // Push / pull
    // =========================================================================

    /// Send the surface's content to its remote document.
    pub fn push(&mut self, surface: SurfaceId) -> Result<(), SyncError> {
        self.start_push(surface, Trigger::Manual)
    }

    fn start_push(&mut self, surface: SurfaceId, trigger: Trigger) -> Result<(), SyncError> {
        let Some(doc_id) = self.registry.lookup_by_surface(surface).cloned() else {
            return Err(self.not_bound());
        };
        let Some(content) = self.host.surface_content(surface) else {
            return Err(self.not_bound());
        };

        let edits = self.registry.state(surface).map_or(0, |s| s.edits);

        self.begin(surface);
        debug!("Pushing {} ({} bytes, {:?})", doc_id, content.len(), trigger);

        let id = doc_id.clone();
        self.docs.update(
            &doc_id,
            content,
            self.emit(move |result| SyncEvent::Pushed {
                surface,
                doc_id: id,
                trigger,
                edits,
                result,
            }),
        );
        Ok(())
    }

    /// Replace the surface's content with the remote document.
    ///
    /// Local edits are overwritten; the remote always wins.
    pub fn pull(&mut self, surface: SurfaceId) -> Result<(), SyncError> {
        let Some(doc_id) = self.registry.lookup_by_surface(surface).cloned() else {
            return Err(self.not_bound());
        };

        self.begin(surface);
        debug!("Pulling {}", doc_id);

        let id = doc_id.clone();
        self.docs.get(
            &doc_id,
            self.emit(move |result| SyncEvent::Pulled {
                surface,
                doc_id: id,
                result,
            }),
        );
        Ok(())
    }

    fn begin(&mut self, surface: SurfaceId) {
        if let Some(state) = self.registry.state_mut(surface) {
            state.in_flight = true;
            state.status = SyncStatus::Syncing;
        }
        self.host.set_sync_status(surface, SyncStatus::Syncing);
    }

    fn fail(&mut self, surface: SurfaceId, action: &str, error: DocsError) {
        if let Some(state) = self.registry.state_mut(surface) {
            state.mark_failed();
        }
        self.host.set_sync_status(surface, SyncStatus::Error);

        warn!("{} failed for surface {}: {}", action, surface, error);
        self.notify(NotifyLevel::Error, &format!("{} failed: {}", action, error));
        self.outcomes.push(SyncOutcome::Failed {
            surface: Some(surface),
            error: error.into(),
        });
    }

    fn succeed(&mut self, surface: SurfaceId, now: Instant) {
        if let Some(state) = self.registry.state_mut(surface) {
            state.mark_synced(now);
        }
        self.host.set_modified(surface, false);
        self.host.set_sync_status(surface, SyncStatus::Synced);
    }

    fn finish_push(
        &mut self,
        surface: SurfaceId,
        doc_id: DocumentId,
        trigger: Trigger,
        edits: u64,
        result: Result<(), DocsError>,
        now: Instant,
    ) {
        if let Err(e) = result {
            self.fail(surface, "Push", e);
            return;
        }

        let edited_since = self
            .registry
            .state(surface)
            .is_some_and(|s| s.edits != edits);
        if edited_since {
            // The pushed snapshot is stale; keep the newer text dirty so the
            // next push or tick sends it.
            if let Some(state) = self.registry.state_mut(surface) {
                state.mark_synced(now);
                state.dirty = true;
            }
            self.host.set_sync_status(surface, SyncStatus::Synced);
        } else {
            self.succeed(surface, now);
        }

        // Best effort: a failure leaves the old revision in place.
        let id = doc_id.clone();
        self.docs.revision(
            &doc_id,
            self.emit(move |result| SyncEvent::RevisionRefreshed {
                surface,
                doc_id: id,
                result,
            }),
        );

        info!("Pushed {} ({:?})", doc_id, trigger);
        if trigger == Trigger::Manual {
            let title = self.title_of(surface);
            self.notify(NotifyLevel::Info, &format!("Pushed '{}'", title));
        }
        self.outcomes.push(SyncOutcome::Pushed { surface });
    }

    fn finish_pull(
        &mut self,
        surface: SurfaceId,
        result: Result<RemoteDocument, DocsError>,
        now: Instant,
    ) {
        let doc = match result {
            Ok(doc) => doc,
            Err(e) => {
                self.fail(surface, "Pull", e);
                return;
            }
        };

        self.host.replace_content(surface, &doc.content);
        if let Some(handle) = self.registry.handle_mut(surface) {
            handle.revision = doc.revision;
            if !doc.title.is_empty() {
                handle.title = doc.title;
            }
        }
        self.succeed(surface, now);

        info!("Pulled {}", doc.id);
        let title = self.title_of(surface);
        self.notify(NotifyLevel::Info, &format!("Pulled '{}'", title));
        self.outcomes.push(SyncOutcome::Pulled { surface });
    }

    // =========================================================================
    // Remote change detection
    // =========================================================================

    /// Ask whether the remote document changed since the last sync.
    ///
    /// `callback(true)` only when the worker reports a revision different
    /// from the stored one; any failure reports `false`.
    pub fn check_remote_changes(
        &mut self,
        surface: SurfaceId,
        callback: impl FnOnce(bool) + Send + 'static,
    ) {
        self.request_revision_check(surface, RemoteReply::Callback(Box::new(callback)));
    }

    fn request_revision_check(&mut self, surface: SurfaceId, reply: RemoteReply) {
        let Some(doc_id) = self.registry.lookup_by_surface(surface).cloned() else {
            if let RemoteReply::Callback(callback) = reply {
                callback(false);
            }
            return;
        };

        let id = doc_id.clone();
        self.docs.revision(
            &doc_id,
            self.emit(move |result| SyncEvent::RemoteChecked {
                surface,
                doc_id: id,
                result,
                reply,
            }),
        );
    }

    fn finish_remote_check(
        &mut self,
        surface: SurfaceId,
        doc_id: DocumentId,
        result: Result<RevisionToken, DocsError>,
        reply: RemoteReply,
    ) {
        let changed = match result {
            Ok(remote) => self
                .registry
                .handle(surface)
                .filter(|h| h.doc_id == doc_id)
                .is_some_and(|h| h.revision != remote),
            Err(e) => {
                debug!("Revision check for {} failed: {}", doc_id, e);
                false
            }
        };

        match reply {
            RemoteReply::Callback(callback) => callback(changed),
            RemoteReply::Advisory if changed => {
                let title = self.title_of(surface);
                self.notify(
                    NotifyLevel::Warn,
                    &format!("'{}' was changed remotely; pull to get the latest version", title),
                );
                self.outcomes.push(SyncOutcome::RemoteChanged { surface });
            }
            RemoteReply::Advisory => {}
        }
    }

    // =========================================================================
    // Surface lifecycle
    // =========================================================================

    /// Record a local edit. Returns `false` for unbound surfaces.
    pub fn on_local_edit(&mut self, surface: SurfaceId) -> bool {
        match self.registry.state_mut(surface) {
            Some(state) => {
                state.record_edit();
                self.host.set_modified(surface, true);
                true
            }
            None => false,
        }
    }

    /// The surface gained focus: start its auto-sync timer and check for
    /// remote changes.
    ///
    /// The check is skipped while a push or pull is in flight, since the
    /// stored revision predates our own write until that completes.
    pub fn activate(&mut self, surface: SurfaceId) {
        let Some(state) = self.registry.state(surface) else {
            return;
        };
        let in_flight = state.in_flight;
        self.start_timer(surface, Instant::now());
        if in_flight {
            debug!("Skipping remote check for surface {} while syncing", surface);
            return;
        }
        self.request_revision_check(surface, RemoteReply::Advisory);
    }

    /// The surface lost focus: stop its auto-sync timer.
    pub fn deactivate(&mut self, surface: SurfaceId) {
        self.registry.set_timer(surface, None);
    }

    fn start_timer(&mut self, surface: SurfaceId, now: Instant) {
        if self.registry.timer(surface).is_none() {
            self.registry
                .set_timer(surface, AutoSyncTimer::start(self.config.sync_interval, now));
        }
    }

    /// Unbind the surface. Results still in flight for it are discarded.
    pub fn close(&mut self, surface: SurfaceId) -> Option<DocumentHandle> {
        let dirty = self.registry.state(surface).is_some_and(|s| s.dirty);
        let handle = self.registry.unregister(surface)?;

        if dirty {
            self.notify(
                NotifyLevel::Warn,
                &format!("Closed '{}' with unpushed changes", handle.title),
            );
        }
        info!("Closed {} (surface {})", handle.doc_id, surface);
        Some(handle)
    }

    // =========================================================================
    // Auto-sync
    // =========================================================================

    /// Fire due auto-sync timers. Returns the number of pushes started.
    pub fn tick(&mut self) -> usize {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> usize {
        let mut started = 0;

        for surface in self.registry.due_surfaces(now) {
            if let Some(timer) = self.registry.timer_mut(surface) {
                timer.reschedule(now);
            }
            if self.should_auto_push(surface, now) && self.start_push(surface, Trigger::Auto).is_ok() {
                started += 1;
            }
        }

        started
    }

    fn should_auto_push(&self, surface: SurfaceId, now: Instant) -> bool {
        let Some(state) = self.registry.state(surface) else {
            return false;
        };
        if !state.dirty || state.in_flight {
            return false;
        }
        state
            .last_sync
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.sync_interval)
    }

    // =========================================================================
    // Account and listing
    // =========================================================================

    /// Fetch the user's documents; the result arrives as [`SyncOutcome::Listed`].
    pub fn list_documents(&mut self) {
        self.docs.list(
            self.config.list_limit,
            self.emit(|result| SyncEvent::Listed { result }),
        );
    }

    /// Run the worker's authorization flow.
    pub fn authenticate(&mut self) {
        self.notify(NotifyLevel::Info, "Authenticating; follow the browser prompt");
        self.docs
            .auth(self.emit(|result| SyncEvent::AuthFinished { result }));
    }

    /// Query whether the worker holds valid credentials.
    pub fn check_authenticated(&mut self) {
        self.docs
            .is_authenticated(self.emit(|result| SyncEvent::AuthStatus { result }));
    }

    // =========================================================================
    // Event pump
    // =========================================================================

    /// Apply every queued RPC completion and return what happened.
    pub fn poll_events(&mut self) -> Vec<SyncOutcome> {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event, Instant::now());
        }
        std::mem::take(&mut self.outcomes)
    }

    fn handle_event(&mut self, event: SyncEvent, now: Instant) {
        match event {
            SyncEvent::Fetched { doc_id, result } => self.finish_open(doc_id, result),
            SyncEvent::Created { result } => match result {
                Ok(created) => {
                    info!("Created {} ({:?})", created.id, created.title);
                    self.notify(NotifyLevel::Info, &format!("Created '{}'", created.title));
                    self.open_document(created.id);
                }
                Err(e) => {
                    self.notify(NotifyLevel::Error, &format!("Create failed: {}", e));
                    self.outcomes.push(SyncOutcome::Failed {
                        surface: None,
                        error: e.into(),
                    });
                }
            },
            SyncEvent::Pushed {
                surface,
                doc_id,
                trigger,
                edits,
                result,
            } => {
                if self.registry.is_bound_to(surface, &doc_id) {
                    self.finish_push(surface, doc_id, trigger, edits, result, now);
                } else {
                    debug!("Discarding push result for closed surface {}", surface);
                }
            }
            SyncEvent::RevisionRefreshed {
                surface,
                doc_id,
                result,
            } => match result {
                Ok(revision) if self.registry.is_bound_to(surface, &doc_id) => {
                    self.registry.update_revision(surface, revision);
                }
                Ok(_) => {}
                Err(e) => debug!("Revision refresh for {} failed: {}", doc_id, e),
            },
            SyncEvent::Pulled {
                surface,
                doc_id,
                result,
            } => {
                if self.registry.is_bound_to(surface, &doc_id) {
                    self.finish_pull(surface, result, now);
                } else {
                    debug!("Discarding pull result for closed surface {}", surface);
                }
            }
            SyncEvent::RemoteChecked {
                surface,
                doc_id,
                result,
                reply,
            } => self.finish_remote_check(surface, doc_id, result, reply),
            SyncEvent::Listed { result } => match result {
                Ok(documents) => {
                    if documents.is_empty() {
                        self.notify(NotifyLevel::Info, "No documents found");
                    }
                    self.outcomes.push(SyncOutcome::Listed(documents));
                }
                Err(e) => {
                    self.notify(NotifyLevel::Error, &format!("Failed to list documents: {}", e));
                    self.outcomes.push(SyncOutcome::Failed {
                        surface: None,
                        error: e.into(),
                    });
                }
            },
            SyncEvent::AuthFinished { result } => match result {
                Ok(outcome) => {
                    let message = outcome
                        .message
                        .unwrap_or_else(|| "Authentication successful".to_string());
                    self.notify(NotifyLevel::Info, &message);
                    self.outcomes.push(SyncOutcome::Authenticated(true));
                }
                Err(e) => {
                    self.notify(NotifyLevel::Error, &format!("Authentication failed: {}", e));
                    self.outcomes.push(SyncOutcome::Failed {
                        surface: None,
                        error: e.into(),
                    });
                }
            },
            SyncEvent::AuthStatus { result } => match result {
                Ok(authenticated) => self.outcomes.push(SyncOutcome::Authenticated(authenticated)),
                Err(e) => debug!("Authentication check failed: {}", e),
            },
        }
    }
}
