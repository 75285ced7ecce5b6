//! Shared doubles for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::{json, Value};

use gdocs_sync::ipc::{RpcCallback, RpcError, RpcService, METHOD_NOT_FOUND};
use gdocs_sync::models::{DocumentHandle, SyncStatus};
use gdocs_sync::sync::{EditorHost, NotifyLevel, SurfaceId};

// =============================================================================
// Remote side
// =============================================================================

#[derive(Debug, Clone)]
pub struct RemoteDoc {
    pub title: String,
    pub content: String,
    pub revision: u64,
}

/// Answers every request immediately from an in-memory document store.
#[derive(Default)]
pub struct FakeDocs {
    docs: Mutex<BTreeMap<String, RemoteDoc>>,
    log: Mutex<Vec<String>>,
    next_id: Mutex<u64>,
    failing: Mutex<Option<String>>,
}

impl FakeDocs {
    pub fn with_doc(self, id: &str, title: &str, content: &str) -> Self {
        self.docs.lock().unwrap().insert(
            id.to_string(),
            RemoteDoc {
                title: title.to_string(),
                content: content.to_string(),
                revision: 1,
            },
        );
        self
    }

    pub fn doc(&self, id: &str) -> RemoteDoc {
        self.docs.lock().unwrap()[id].clone()
    }

    /// Simulate an edit made by someone else.
    pub fn edit_remotely(&self, id: &str, content: &str) {
        let mut docs = self.docs.lock().unwrap();
        let doc = docs.get_mut(id).expect("known document");
        doc.content = content.to_string();
        doc.revision += 1;
    }

    /// Reject every subsequent `update` with `error`.
    pub fn fail_updates(&self, error: &str) {
        *self.failing.lock().unwrap() = Some(error.to_string());
    }

    pub fn calls(&self, method: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|m| *m == method).count()
    }

    fn answer(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        let doc_id = params["doc_id"].as_str().unwrap_or_default().to_string();
        let mut docs = self.docs.lock().unwrap();

        let missing = || json!({"success": false, "error": format!("Document not found: {}", doc_id)});

        let reply = match method {
            "is_authenticated" => json!({"authenticated": true}),
            "list" => {
                let limit = params["max_results"].as_u64().unwrap_or(50) as usize;
                let documents: Vec<Value> = docs
                    .iter()
                    .take(limit)
                    .map(|(id, d)| json!({"id": id, "name": d.title}))
                    .collect();
                json!({"success": true, "documents": documents})
            }
            "get" => match docs.get(&doc_id) {
                Some(d) => json!({
                    "success": true,
                    "id": doc_id,
                    "title": d.title,
                    "content": d.content,
                    "revision": format!("r{}", d.revision),
                }),
                None => missing(),
            },
            "revision" => match docs.get(&doc_id) {
                Some(d) => json!({"success": true, "revision": format!("r{}", d.revision)}),
                None => missing(),
            },
            "update" => {
                if let Some(error) = self.failing.lock().unwrap().clone() {
                    return Ok(json!({"success": false, "error": error}));
                }
                match docs.get_mut(&doc_id) {
                    Some(d) => {
                        d.content = params["markdown"].as_str().unwrap_or_default().to_string();
                        d.revision += 1;
                        json!({"success": true})
                    }
                    None => missing(),
                }
            }
            "create" => {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                let id = format!("new{}", next);
                let title = params["title"].as_str().unwrap_or_default().to_string();
                docs.insert(
                    id.clone(),
                    RemoteDoc {
                        title: title.clone(),
                        content: String::new(),
                        revision: 1,
                    },
                );
                json!({"success": true, "id": id, "title": title})
            }
            other => {
                return Err(RpcError::Server {
                    code: Some(METHOD_NOT_FOUND),
                    message: format!("Method not found: {}", other),
                })
            }
        };
        Ok(reply)
    }
}

impl RpcService for FakeDocs {
    fn call(&self, method: &str, params: Value, callback: RpcCallback) {
        self.log.lock().unwrap().push(method.to_string());
        let result = self.answer(method, &params);
        callback(result);
    }
}

// =============================================================================
// Editor side
// =============================================================================

#[derive(Debug, Default, Clone)]
pub struct Buffer {
    pub title: String,
    pub content: String,
    pub modified: bool,
    pub status: Option<SyncStatus>,
}

/// Editor host that keeps buffers in memory and records notifications.
#[derive(Default)]
pub struct RecordingHost {
    next_id: u64,
    pub buffers: BTreeMap<SurfaceId, Buffer>,
    pub focused: Option<SurfaceId>,
    pub notes: Vec<(NotifyLevel, String)>,
}

impl RecordingHost {
    pub fn type_text(&mut self, surface: SurfaceId, content: &str) {
        self.buffers.get_mut(&surface).expect("open buffer").content = content.to_string();
    }

    pub fn buffer(&self, surface: SurfaceId) -> &Buffer {
        &self.buffers[&surface]
    }

    pub fn has_note(&self, level: NotifyLevel, needle: &str) -> bool {
        self.notes
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl EditorHost for RecordingHost {
    fn create_surface(&mut self, handle: &DocumentHandle, content: &str) -> SurfaceId {
        self.next_id += 1;
        let id = SurfaceId(self.next_id);
        self.buffers.insert(
            id,
            Buffer {
                title: handle.title.clone(),
                content: content.to_string(),
                ..Default::default()
            },
        );
        self.focused = Some(id);
        id
    }

    fn surface_content(&self, surface: SurfaceId) -> Option<String> {
        self.buffers.get(&surface).map(|b| b.content.clone())
    }

    fn replace_content(&mut self, surface: SurfaceId, content: &str) {
        if let Some(b) = self.buffers.get_mut(&surface) {
            b.content = content.to_string();
        }
    }

    fn set_modified(&mut self, surface: SurfaceId, modified: bool) {
        if let Some(b) = self.buffers.get_mut(&surface) {
            b.modified = modified;
        }
    }

    fn set_sync_status(&mut self, surface: SurfaceId, status: SyncStatus) {
        if let Some(b) = self.buffers.get_mut(&surface) {
            b.status = Some(status);
        }
    }

    fn focus_surface(&mut self, surface: SurfaceId) {
        self.focused = Some(surface);
    }

    fn notify(&mut self, level: NotifyLevel, message: &str) {
        self.notes.push((level, message.to_string()));
    }
}
