//! gdocs-sync library
//!
//! Core components for editing Google Docs as local Markdown:
//!
//! - `ipc` - RPC client for the document worker process
//! - `bridge` - typed wrappers for the worker's document methods
//! - `registry` - document ↔ surface bindings and per-surface sync state
//! - `sync` - push / pull / auto-sync controller and the editor host seam
//! - `models` - data models shared with the worker
//!
//! # Example
//!
//! ```ignore
//! use gdocs_sync::ipc::{RpcClient, WorkerLocator};
//!
//! let client = RpcClient::new(WorkerLocator::new(None, "python3"), handle);
//! let latency = client.ping().await?;
//! let doc = client.call_sync("get", serde_json::json!({"doc_id": "abc"})).await?;
//! ```

pub mod bridge;
pub mod config;
pub mod credentials;
pub mod health;
pub mod ipc;
pub mod models;
pub mod registry;
pub mod sync;
