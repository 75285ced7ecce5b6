//! Typed access to the document worker's methods.
//!
//! The worker answers every document method with an envelope:
//!
//! ```text
//! {"success": true,  ...payload fields...}
//! {"success": false, "error": "Not authenticated. Run auth first."}
//! ```
//!
//! `DocsBridge` turns those envelopes into `Result<T, DocsError>` for the
//! callback-driven sync controller. One-shot commands use [`call_sync`] on
//! an [`RpcClient`] instead, which applies the client's timeout.

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::ipc::{RpcClient, RpcError, RpcService};
use crate::models::{
    AuthOutcome, CreatedDocument, DocumentId, DocumentSummary, RemoteDocument, RevisionToken,
};

/// Fallback when a rejection carries no message.
const UNKNOWN_ERROR: &str = "Unknown error";

/// Errors from a document method.
#[derive(Debug, Error)]
pub enum DocsError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The worker answered `{"success": false, "error": ...}`.
    #[error("{0}")]
    Rejected(String),

    /// The result did not have the expected shape.
    #[error("Unexpected `{method}` result: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Completion callback for a typed document method.
pub type DocsCallback<T> = Box<dyn FnOnce(Result<T, DocsError>) + Send + 'static>;

// =============================================================================
// Requests
// =============================================================================

/// A document method together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocsRequest {
    Auth,
    IsAuthenticated,
    List { max_results: usize },
    Get { doc_id: DocumentId },
    Create { title: String },
    Update { doc_id: DocumentId, markdown: String },
    Revision { doc_id: DocumentId },
    DataDir,
    Ping,
}

impl DocsRequest {
    /// Wire method name.
    pub fn method(&self) -> &'static str {
        match self {
            DocsRequest::Auth => "auth",
            DocsRequest::IsAuthenticated => "is_authenticated",
            DocsRequest::List { .. } => "list",
            DocsRequest::Get { .. } => "get",
            DocsRequest::Create { .. } => "create",
            DocsRequest::Update { .. } => "update",
            DocsRequest::Revision { .. } => "revision",
            DocsRequest::DataDir => "data_dir",
            DocsRequest::Ping => "ping",
        }
    }

    /// Named parameters for the request.
    pub fn params(&self) -> Value {
        match self {
            DocsRequest::Auth
            | DocsRequest::IsAuthenticated
            | DocsRequest::DataDir
            | DocsRequest::Ping => json!({}),
            DocsRequest::List { max_results } => json!({ "max_results": max_results }),
            DocsRequest::Get { doc_id } | DocsRequest::Revision { doc_id } => {
                json!({ "doc_id": doc_id })
            }
            DocsRequest::Create { title } => json!({ "title": title }),
            DocsRequest::Update { doc_id, markdown } => {
                json!({ "doc_id": doc_id, "markdown": markdown })
            }
        }
    }
}

// =============================================================================
// Reply payloads
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListReply {
    #[serde(default)]
    pub documents: Vec<DocumentSummary>,
}

#[derive(Debug, Deserialize)]
pub struct RevisionReply {
    pub revision: RevisionToken,
}

#[derive(Debug, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
}

#[derive(Debug, Deserialize)]
pub struct DataDirReply {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct PingReply {
    pub pong: bool,
}

/// Accepts any successful result.
#[derive(Debug, Deserialize)]
pub struct Ack {}

/// Interpret a raw result from `method` as `T`.
///
/// `success: false` becomes [`DocsError::Rejected`]; a missing `success`
/// field is treated as success, since `is_authenticated`, `data_dir` and
/// `ping` do not use the envelope.
pub fn decode<T: DeserializeOwned>(method: &'static str, value: Value) -> Result<T, DocsError> {
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_ERROR)
            .to_string();
        debug!("`{}` rejected: {}", method, message);
        return Err(DocsError::Rejected(message));
    }

    serde_json::from_value(value).map_err(|source| DocsError::Decode { method, source })
}

/// Send `request` on `client` and wait for its typed result, bounded by the
/// client's timeout.
pub async fn call_sync<T: DeserializeOwned>(
    client: &RpcClient,
    request: DocsRequest,
) -> Result<T, DocsError> {
    let method = request.method();
    let value = client.call_sync(method, request.params()).await?;
    decode(method, value)
}

// =============================================================================
// Callback bridge
// =============================================================================

/// Callback-driven document methods over any [`RpcService`].
#[derive(Clone)]
pub struct DocsBridge {
    rpc: Arc<dyn RpcService>,
}

impl DocsBridge {
    pub fn new(rpc: Arc<dyn RpcService>) -> Self {
        Self { rpc }
    }

    /// Send `request` and decode its result as `T` before invoking `callback`.
    pub fn send<T, F>(&self, request: DocsRequest, callback: F)
    where
        T: DeserializeOwned,
        F: FnOnce(Result<T, DocsError>) + Send + 'static,
    {
        let method = request.method();
        self.rpc.call(
            method,
            request.params(),
            Box::new(move |result| {
                callback(result.map_err(DocsError::from).and_then(|v| decode(method, v)))
            }),
        );
    }

    pub fn auth(&self, callback: impl FnOnce(Result<AuthOutcome, DocsError>) + Send + 'static) {
        self.send(DocsRequest::Auth, callback);
    }

    pub fn is_authenticated(&self, callback: impl FnOnce(Result<bool, DocsError>) + Send + 'static) {
        self.send::<AuthStatus, _>(DocsRequest::IsAuthenticated, move |r| {
            callback(r.map(|s| s.authenticated))
        });
    }

    pub fn list(
        &self,
        max_results: usize,
        callback: impl FnOnce(Result<Vec<DocumentSummary>, DocsError>) + Send + 'static,
    ) {
        self.send::<ListReply, _>(DocsRequest::List { max_results }, move |r| {
            callback(r.map(|l| l.documents))
        });
    }

    pub fn get(
        &self,
        doc_id: &DocumentId,
        callback: impl FnOnce(Result<RemoteDocument, DocsError>) + Send + 'static,
    ) {
        self.send(
            DocsRequest::Get {
                doc_id: doc_id.clone(),
            },
            callback,
        );
    }

    pub fn create(
        &self,
        title: &str,
        callback: impl FnOnce(Result<CreatedDocument, DocsError>) + Send + 'static,
    ) {
        self.send(
            DocsRequest::Create {
                title: title.to_string(),
            },
            callback,
        );
    }

    /// Replace the document body with `markdown`.
    pub fn update(
        &self,
        doc_id: &DocumentId,
        markdown: String,
        callback: impl FnOnce(Result<(), DocsError>) + Send + 'static,
    ) {
        let request = DocsRequest::Update {
            doc_id: doc_id.clone(),
            markdown,
        };
        self.send::<Ack, _>(request, move |r| callback(r.map(|_| ())));
    }

    pub fn revision(
        &self,
        doc_id: &DocumentId,
        callback: impl FnOnce(Result<RevisionToken, DocsError>) + Send + 'static,
    ) {
        let request = DocsRequest::Revision {
            doc_id: doc_id.clone(),
        };
        self.send::<RevisionReply, _>(request, move |r| callback(r.map(|rev| rev.revision)));
    }

    pub fn data_dir(&self, callback: impl FnOnce(Result<PathBuf, DocsError>) + Send + 'static) {
        self.send::<DataDirReply, _>(DocsRequest::DataDir, move |r| callback(r.map(|d| d.path)));
    }
}
