//! boardsync-core - Local-first storage for whiteboard boards
//!
//! This crate contains the board models, the SQLite-backed local store, the
//! encrypted cloud store, the durable offline queue, the sync engine and the
//! hybrid facade that routes every call between them.

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod crypto;
pub mod db;
pub mod error;
pub mod hybrid;
pub mod local;
pub mod models;
pub mod queue;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use auth::{StaticToken, TokenSource};
pub use config::{RemoteConfig, SyncSettings};
pub use connectivity::{ConnectivityProbe, ManualConnectivity};
pub use context::SyncContext;
pub use error::{Error, ErrorKind, Result};
pub use hybrid::{HybridStorage, SaveOutcome, StorageMode};
pub use local::LocalStore;
pub use models::{Board, BoardContent, BoardData, BoardFile, BoardId, BoardPatch, QueuedOperation};
pub use queue::{DrainReport, OfflineQueue, QueueEvent};
pub use remote::{CloudStore, HttpRemoteApi, MemoryRemoteApi, RemoteApi};
pub use services::DatabaseService;
pub use state::{SyncState, SyncStatus};
pub use sync::{PullReport, SyncEngine};
