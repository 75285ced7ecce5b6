//! Document synchronization.
//!
//! # Architecture
//!
//! ```text
//!  key/edit ──► SyncController ──► DocsBridge ──► RpcService ──► worker
//!                  ▲    │                                           │
//!                  │    └── DocumentRegistry (handle, state, timer) │
//!                  │                                                │
//!   poll_events() ◄┴──────── mpsc::Receiver<SyncEvent> ◄── callbacks
//! ```
//!
//! RPC callbacks run on the runtime's reader task. They only queue an event;
//! the controller applies it on the main loop, so the registry, timers and
//! editor surfaces are touched from a single thread.

mod controller;
mod host;
mod timer;

pub use controller::{SyncController, SyncError, SyncOutcome};
pub use host::{EditorHost, NotifyLevel, SurfaceId};
pub use timer::AutoSyncTimer;
