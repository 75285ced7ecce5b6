//! RPC plumbing between the editor and the document worker process.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     stdin: request lines      ┌──────────────────────┐
//! │    RpcClient     │ ─────────────────────────────►│   worker process     │
//! │ (pending table)  │ ◄─────────────────────────────│  (gdocs_server.py)   │
//! └──────────────────┘  stdout: JSON message stream  └──────────────────────┘
//! ```
//!
//! # Protocol
//!
//! ```text
//! {"id": 1, "method": "get", "params": {"doc_id": "abc"}}\n
//! {"id": 1, "result": {"success": true, "title": "Notes", ...}}\n
//! ```
//!
//! Responses may arrive in any order and are matched by `id`.

mod client;
mod framing;
mod protocol;
mod worker;

pub use client::{RpcCallback, RpcClient, RpcError, RpcResult, RpcService, DEFAULT_TIMEOUT_MS};
pub use framing::{read_messages, write_message, FramingError, MessageFramer, MAX_MESSAGE_SIZE};
pub use protocol::{
    RpcErrorObject, RpcRequest, RpcResponse, INTERNAL_ERROR, METHOD_NOT_FOUND, PARSE_ERROR,
};
pub use worker::{WorkerCommand, WorkerLocator, WorkerState, WORKER_SCRIPT_NAME};
