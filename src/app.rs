//! Application state management.
//!
//! `App` owns the sync controller and the `Workspace`, the TUI's
//! implementation of the editor host. Input handlers in `main.rs` call the
//! methods here; rendering in `ui` only reads.

use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ratatui::style::{Color, Modifier, Style};
use tracing::{debug, info};
use tui_textarea::{Input, TextArea};

use gdocs_sync::config::Config;
use gdocs_sync::ipc::RpcService;
use gdocs_sync::models::{DocumentHandle, DocumentId, DocumentSummary, SyncState, SyncStatus};
use gdocs_sync::sync::{EditorHost, NotifyLevel, SurfaceId, SyncController, SyncOutcome};

/// How long a notification stays in the status bar.
const NOTIFICATION_DURATION: Duration = Duration::from_secs(5);

/// Top-level screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Documents,
    Editor,
}

/// What to do once the TUI is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartAction {
    List,
    Open(DocumentId),
    Create(String),
}

// =============================================================================
// Workspace (editor host)
// =============================================================================

/// One open document.
pub struct EditorSurface {
    pub doc_id: DocumentId,
    pub title: String,
    pub textarea: TextArea<'static>,
    pub modified: bool,
    pub status: SyncStatus,
    /// The textarea stores lines only; the final newline is kept here.
    trailing_newline: bool,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotifyLevel,
    pub message: String,
    shown_at: Instant,
}

/// Text areas for every open document plus the status line.
#[derive(Default)]
pub struct Workspace {
    surfaces: BTreeMap<SurfaceId, EditorSurface>,
    active: Option<SurfaceId>,
    next_id: u64,
    notification: Option<Notification>,
    needs_redraw: bool,
}

fn new_textarea(content: &str) -> TextArea<'static> {
    let mut textarea = TextArea::from(content.lines().map(str::to_string));
    textarea.set_line_number_style(Style::default().fg(Color::DarkGray));
    textarea.set_cursor_line_style(Style::default().add_modifier(Modifier::UNDERLINED));
    textarea
}

impl Workspace {
    pub fn active(&self) -> Option<SurfaceId> {
        self.active
    }

    pub fn surface(&self, surface: SurfaceId) -> Option<&EditorSurface> {
        self.surfaces.get(&surface)
    }

    /// Open surfaces in creation order.
    pub fn surfaces(&self) -> impl Iterator<Item = (SurfaceId, &EditorSurface)> {
        self.surfaces.iter().map(|(id, s)| (*id, s))
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    /// Feed a key to the active text area. Returns the surface if its text
    /// changed.
    fn input(&mut self, input: Input) -> Option<SurfaceId> {
        let id = self.active?;
        let surface = self.surfaces.get_mut(&id)?;
        self.needs_redraw = true;
        surface.textarea.input(input).then_some(id)
    }

    /// Move focus to the next (or previous) open surface.
    fn cycle(&mut self, forward: bool) {
        let ids: Vec<SurfaceId> = self.surfaces.keys().copied().collect();
        let Some(current) = self.active.and_then(|a| ids.iter().position(|id| *id == a)) else {
            self.active = ids.first().copied();
            return;
        };
        let next = if forward {
            (current + 1) % ids.len()
        } else {
            (current + ids.len() - 1) % ids.len()
        };
        self.active = Some(ids[next]);
        self.needs_redraw = true;
    }

    /// Drop a surface, focusing a neighbour if it was active.
    fn remove(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface);
        if self.active == Some(surface) {
            self.active = self
                .surfaces
                .range(surface..)
                .next()
                .or_else(|| self.surfaces.iter().next_back())
                .map(|(id, _)| *id);
        }
        self.needs_redraw = true;
    }

    fn maybe_clear_notification(&mut self) {
        if self
            .notification
            .as_ref()
            .is_some_and(|n| n.shown_at.elapsed() > NOTIFICATION_DURATION)
        {
            self.notification = None;
            self.needs_redraw = true;
        }
    }
}

impl EditorHost for Workspace {
    fn create_surface(&mut self, handle: &DocumentHandle, content: &str) -> SurfaceId {
        self.next_id += 1;
        let id = SurfaceId(self.next_id);
        self.surfaces.insert(
            id,
            EditorSurface {
                doc_id: handle.doc_id.clone(),
                title: handle.title.clone(),
                textarea: new_textarea(content),
                modified: false,
                status: SyncStatus::Synced,
                trailing_newline: content.ends_with('\n'),
            },
        );
        self.active = Some(id);
        self.needs_redraw = true;
        id
    }

    fn surface_content(&self, surface: SurfaceId) -> Option<String> {
        self.surfaces
            .get(&surface)
            .map(|s| {
                let mut content = s.textarea.lines().join("\n");
                if s.trailing_newline {
                    content.push('\n');
                }
                content
            })
    }

    fn replace_content(&mut self, surface: SurfaceId, content: &str) {
        if let Some(s) = self.surfaces.get_mut(&surface) {
            s.textarea = new_textarea(content);
            s.trailing_newline = content.ends_with('\n');
            self.needs_redraw = true;
        }
    }

    fn set_modified(&mut self, surface: SurfaceId, modified: bool) {
        if let Some(s) = self.surfaces.get_mut(&surface) {
            s.modified = modified;
            self.needs_redraw = true;
        }
    }

    fn set_sync_status(&mut self, surface: SurfaceId, status: SyncStatus) {
        if let Some(s) = self.surfaces.get_mut(&surface) {
            s.status = status;
            self.needs_redraw = true;
        }
    }

    fn focus_surface(&mut self, surface: SurfaceId) {
        if self.surfaces.contains_key(&surface) {
            self.active = Some(surface);
            self.needs_redraw = true;
        }
    }

    fn notify(&mut self, level: NotifyLevel, message: &str) {
        self.notification = Some(Notification {
            level,
            message: message.to_string(),
            shown_at: Instant::now(),
        });
        self.needs_redraw = true;
    }
}

// =============================================================================
// App
// =============================================================================

/// Main application state.
pub struct App {
    /// Flag to exit the application.
    pub should_quit: bool,

    pub view: View,

    controller: SyncController<Workspace>,

    /// Surface whose auto-sync timer is running.
    focused: Option<SurfaceId>,

    // ===== Document list =====
    pub documents: Vec<DocumentSummary>,
    pub selected_document: Option<usize>,
    pub documents_loading: bool,

    /// Title prompt for a new document; `Some` while the prompt is open.
    pub new_document: Option<TextArea<'static>>,

    /// Last known authentication state.
    pub authenticated: Option<bool>,

    /// Abnormal worker exits reported by the RPC client.
    worker_exits: Option<Receiver<Option<i32>>>,

    /// Dirty flag - set when UI needs to be redrawn.
    needs_redraw: bool,
}

impl App {
    pub fn new(rpc: Arc<dyn RpcService>, config: Config) -> Self {
        Self {
            should_quit: false,
            view: View::Documents,
            controller: SyncController::new(rpc, Workspace::default(), config),
            focused: None,
            documents: Vec::new(),
            selected_document: None,
            documents_loading: false,
            new_document: None,
            authenticated: None,
            worker_exits: None,
            needs_redraw: true,
        }
    }

    /// Report worker crashes received on `exits` in the status bar.
    pub fn watch_worker_exits(&mut self, exits: Receiver<Option<i32>>) {
        self.worker_exits = Some(exits);
    }

    pub fn workspace(&self) -> &Workspace {
        self.controller.host()
    }

    pub fn sync_state(&self, surface: SurfaceId) -> Option<&SyncState> {
        self.controller.state(surface)
    }

    pub fn handle(&self, surface: SurfaceId) -> Option<&DocumentHandle> {
        self.controller.handle(surface)
    }

    pub fn start(&mut self, action: StartAction) {
        self.controller.check_authenticated();
        match action {
            StartAction::List => self.refresh_documents(),
            StartAction::Open(doc_id) => self.open_document(doc_id),
            StartAction::Create(title) => self.create_document(&title),
        }
    }

    // ===== Dirty Flag (Rendering Optimization) =====

    pub fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    /// Check if redraw is needed and reset the flag.
    pub fn take_needs_redraw(&mut self) -> bool {
        let host = std::mem::take(&mut self.controller.host_mut().needs_redraw);
        std::mem::take(&mut self.needs_redraw) || host
    }

    // ===== Notifications =====

    pub fn set_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.controller.host_mut().notify(NotifyLevel::Error, &message);
    }

    pub fn maybe_clear_notification(&mut self) {
        self.controller.host_mut().maybe_clear_notification();
    }

    // ===== Event pump =====

    /// Apply completed sync operations (non-blocking).
    pub fn poll_sync_events(&mut self) {
        let exits: Vec<Option<i32>> = self
            .worker_exits
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();
        for code in exits {
            let detail = code.map_or_else(|| "a signal".to_string(), |c| format!("code {}", c));
            self.set_error(format!("Worker exited with {}; it restarts on the next request", detail));
        }

        for outcome in self.controller.poll_events() {
            self.handle_outcome(outcome);
        }
        self.sync_focus();
    }

    fn handle_outcome(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Opened { surface, .. } => {
                debug!("Surface {} opened", surface);
                self.view = View::Editor;
            }
            SyncOutcome::Listed(documents) => {
                self.documents = documents;
                self.documents_loading = false;
                self.selected_document = (!self.documents.is_empty()).then_some(0);
            }
            SyncOutcome::Authenticated(authenticated) => {
                self.authenticated = Some(authenticated);
            }
            SyncOutcome::Failed { surface: None, .. } => {
                self.documents_loading = false;
            }
            SyncOutcome::Pushed { .. }
            | SyncOutcome::Pulled { .. }
            | SyncOutcome::Failed { .. }
            | SyncOutcome::RemoteChanged { .. } => {}
        }
        self.mark_dirty();
    }

    /// Move the auto-sync timer to whichever surface the workspace shows.
    fn sync_focus(&mut self) {
        let active = self.controller.host().active();
        if active == self.focused {
            return;
        }
        if let Some(previous) = self.focused {
            self.controller.deactivate(previous);
        }
        if let Some(surface) = active {
            self.controller.activate(surface);
        }
        self.focused = active;
    }

    /// Called each frame to fire due auto-sync timers.
    pub fn tick(&mut self) {
        let started = self.controller.tick();
        if started > 0 {
            debug!("Auto-sync started {} push(es)", started);
        }
    }

    // ===== Documents =====

    pub fn refresh_documents(&mut self) {
        self.documents_loading = true;
        self.controller.list_documents();
        self.mark_dirty();
    }

    pub fn show_documents(&mut self) {
        self.view = View::Documents;
        self.refresh_documents();
    }

    /// Return to the editor if any document is open.
    pub fn show_editor(&mut self) {
        if self.workspace().active().is_some() {
            self.view = View::Editor;
            self.mark_dirty();
        }
    }

    pub fn select_next_document(&mut self) {
        if self.documents.is_empty() {
            return;
        }
        let next = self
            .selected_document
            .map_or(0, |i| (i + 1).min(self.documents.len() - 1));
        self.selected_document = Some(next);
        self.mark_dirty();
    }

    pub fn select_prev_document(&mut self) {
        if let Some(i) = self.selected_document {
            self.selected_document = Some(i.saturating_sub(1));
            self.mark_dirty();
        }
    }

    pub fn selected_summary(&self) -> Option<&DocumentSummary> {
        self.selected_document.and_then(|i| self.documents.get(i))
    }

    pub fn open_selected_document(&mut self) {
        if let Some(summary) = self.selected_summary() {
            let doc_id = summary.id.clone();
            self.open_document(doc_id);
        }
    }

    pub fn open_document(&mut self, doc_id: DocumentId) {
        info!("Opening {}", doc_id);
        self.controller.open_document(doc_id);
        self.mark_dirty();
    }

    // ===== New document prompt =====

    pub fn is_new_document_prompt_active(&self) -> bool {
        self.new_document.is_some()
    }

    pub fn open_new_document_prompt(&mut self) {
        let mut input = TextArea::default();
        input.set_cursor_line_style(Style::default());
        input.set_placeholder_text("Document title");
        self.new_document = Some(input);
        self.mark_dirty();
    }

    pub fn close_new_document_prompt(&mut self) {
        self.new_document = None;
        self.mark_dirty();
    }

    pub fn new_document_input(&mut self, input: Input) {
        if let Some(prompt) = self.new_document.as_mut() {
            prompt.input(input);
            self.mark_dirty();
        }
    }

    /// Create a document titled with the prompt's text.
    pub fn submit_new_document(&mut self) {
        let Some(prompt) = self.new_document.as_ref() else {
            return;
        };
        let title = prompt.lines().join(" ");
        if self.controller.create_document(&title).is_ok() {
            self.new_document = None;
        }
        self.mark_dirty();
    }

    pub fn create_document(&mut self, title: &str) {
        // Rejections are already reported through the status line.
        let _ = self.controller.create_document(title);
        self.mark_dirty();
    }

    // ===== Editor =====

    /// Forward a key to the active editor, recording the edit if the text
    /// changed.
    pub fn editor_input(&mut self, input: impl Into<Input>) {
        if let Some(surface) = self.controller.host_mut().input(input.into()) {
            self.controller.on_local_edit(surface);
        }
    }

    pub fn push_active(&mut self) {
        if let Some(surface) = self.workspace().active() {
            let _ = self.controller.push(surface);
        }
    }

    pub fn pull_active(&mut self) {
        if let Some(surface) = self.workspace().active() {
            let _ = self.controller.pull(surface);
        }
    }

    pub fn next_surface(&mut self) {
        self.controller.host_mut().cycle(true);
        self.sync_focus();
    }

    pub fn prev_surface(&mut self) {
        self.controller.host_mut().cycle(false);
        self.sync_focus();
    }

    /// Close the active document.
    pub fn close_active(&mut self) {
        let Some(surface) = self.workspace().active() else {
            return;
        };
        self.controller.close(surface);
        self.controller.host_mut().remove(surface);
        if self.focused == Some(surface) {
            self.focused = None;
        }
        self.sync_focus();

        if self.workspace().active().is_none() {
            self.show_documents();
        }
    }

    pub fn authenticate(&mut self) {
        self.controller.authenticate();
        self.mark_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use gdocs_sync::ipc::{RpcCallback, RpcResult};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Records requests; tests resolve them by method name.
    #[derive(Default)]
    struct MockRpc {
        calls: Mutex<Vec<(String, Value, RpcCallback)>>,
    }

    impl MockRpc {
        fn methods(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(m, _, _)| m.clone())
                .collect()
        }

        fn respond(&self, method: &str, result: RpcResult) {
            let callback = {
                let mut calls = self.calls.lock().unwrap();
                let index = calls
                    .iter()
                    .position(|(m, _, _)| m == method)
                    .unwrap_or_else(|| panic!("no pending `{}` call", method));
                calls.remove(index).2
            };
            callback(result);
        }

        fn params(&self, method: &str) -> Value {
            let calls = self.calls.lock().unwrap();
            calls
                .iter()
                .find(|(m, _, _)| m == method)
                .map(|(_, p, _)| p.clone())
                .unwrap_or_else(|| panic!("no pending `{}` call", method))
        }
    }

    impl RpcService for MockRpc {
        fn call(&self, method: &str, params: Value, callback: RpcCallback) {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params, callback));
        }
    }

    fn app() -> (App, Arc<MockRpc>) {
        let rpc = Arc::new(MockRpc::default());
        (App::new(rpc.clone(), Config::default()), rpc)
    }

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    /// Open `id` and answer the follow-up revision check.
    fn open(app: &mut App, rpc: &MockRpc, id: &str, content: &str) -> SurfaceId {
        app.open_document(DocumentId::new(id));
        rpc.respond(
            "get",
            Ok(json!({"success": true, "id": id, "title": id.to_uppercase(), "content": content, "revision": "r1"})),
        );
        app.poll_sync_events();
        rpc.respond("revision", Ok(json!({"success": true, "revision": "r1"})));
        app.poll_sync_events();
        app.workspace().active().expect("opened surface is active")
    }

    #[test]
    fn test_start_lists_documents() {
        let (mut app, rpc) = app();

        app.start(StartAction::List);
        assert_eq!(app.view, View::Documents);
        assert!(app.documents_loading);
        assert_eq!(rpc.methods(), vec!["is_authenticated", "list"]);

        rpc.respond("is_authenticated", Ok(json!({"authenticated": true})));
        rpc.respond(
            "list",
            Ok(json!({"success": true, "documents": [
                {"id": "a", "name": "Alpha"},
                {"id": "b", "name": "Beta"}
            ]})),
        );
        app.poll_sync_events();

        assert!(!app.documents_loading);
        assert_eq!(app.authenticated, Some(true));
        assert_eq!(app.documents.len(), 2);
        assert_eq!(app.selected_document, Some(0));

        app.select_next_document();
        app.select_next_document();
        assert_eq!(app.selected_summary().unwrap().name, "Beta");
    }

    #[test]
    fn test_open_switches_to_editor() {
        let (mut app, rpc) = app();

        let surface = open(&mut app, &rpc, "doc1", "# Title\nbody");

        assert_eq!(app.view, View::Editor);
        let editor = app.workspace().surface(surface).unwrap();
        assert_eq!(editor.title, "DOC1");
        assert_eq!(editor.textarea.lines(), &["# Title".to_string(), "body".to_string()]);
        assert_eq!(editor.status, SyncStatus::Synced);
    }

    #[test]
    fn test_typing_marks_dirty_and_push_sends_content() {
        let (mut app, rpc) = app();
        let surface = open(&mut app, &rpc, "doc1", "");

        app.editor_input(key('h'));
        app.editor_input(key('i'));

        assert!(app.sync_state(surface).unwrap().dirty);
        assert!(app.workspace().surface(surface).unwrap().modified);

        app.push_active();
        assert_eq!(rpc.params("update"), json!({"doc_id": "doc1", "markdown": "hi"}));
        assert_eq!(
            app.workspace().surface(surface).unwrap().status,
            SyncStatus::Syncing
        );
    }

    #[test]
    fn test_push_keeps_trailing_newline() {
        let (mut app, rpc) = app();
        let surface = open(&mut app, &rpc, "doc1", "x\n");
        assert_eq!(app.workspace().surface(surface).unwrap().textarea.lines(), &["x".to_string()]);

        app.editor_input(key('y'));
        app.push_active();

        assert_eq!(rpc.params("update"), json!({"doc_id": "doc1", "markdown": "yx\n"}));
    }

    #[test]
    fn test_new_document_prompt() {
        let (mut app, rpc) = app();

        app.open_new_document_prompt();
        assert!(app.is_new_document_prompt_active());

        // Empty title is refused and the prompt stays open.
        app.submit_new_document();
        assert!(app.is_new_document_prompt_active());
        assert!(rpc.methods().is_empty());

        for c in "Plan".chars() {
            app.new_document_input(key(c).into());
        }
        app.submit_new_document();

        assert!(!app.is_new_document_prompt_active());
        assert_eq!(rpc.params("create"), json!({"title": "Plan"}));
    }

    #[test]
    fn test_switching_surfaces_moves_timer() {
        let (mut app, rpc) = app();
        let first = open(&mut app, &rpc, "doc1", "one");
        let second = open(&mut app, &rpc, "doc2", "two");
        assert_eq!(app.workspace().active(), Some(second));

        app.prev_surface();

        assert_eq!(app.workspace().active(), Some(first));
        assert!(app.controller.registry().timer(first).is_some());
        assert!(app.controller.registry().timer(second).is_none());
        // Focusing runs a remote-change check.
        assert_eq!(rpc.methods(), vec!["revision"]);
    }

    #[test]
    fn test_close_last_surface_returns_to_list() {
        let (mut app, rpc) = app();
        let surface = open(&mut app, &rpc, "doc1", "text");

        app.close_active();

        assert!(app.workspace().surface(surface).is_none());
        assert!(app.handle(surface).is_none());
        assert_eq!(app.view, View::Documents);
        assert_eq!(rpc.methods(), vec!["list"]);
    }

    #[test]
    fn test_worker_exit_is_reported() {
        let (mut app, _rpc) = app();
        let (tx, rx) = std::sync::mpsc::channel();
        app.watch_worker_exits(rx);

        tx.send(Some(2)).unwrap();
        app.poll_sync_events();

        let notification = app.workspace().notification().unwrap();
        assert_eq!(notification.level, NotifyLevel::Error);
        assert!(notification.message.contains("code 2"));
        assert!(app.take_needs_redraw());
        assert!(!app.take_needs_redraw());
    }
}
