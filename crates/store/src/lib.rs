//! # Findings Store
//!
//! Persistence port for the findings engine and its backends.
//!
//! ## Layout
//!
//! ```text
//! RecordStore (port)
//!     │
//!     ├──> FileStore    one JSON file per record, lock file per application
//!     ├──> SqliteStore  one row per record, JSON payload, batch = transaction
//!     └──> MemoryStore  in-process map, for tests and embedding
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use findings_store::{FileStore, RecordKey, RecordStore};
//!
//! #[tokio::main]
//! async fn main() -> findings_store::Result<()> {
//!     let store = FileStore::new("/tmp/findings");
//!     let _guard = store.lock_app("support-bot").await?;
//!     store
//!         .put(&RecordKey::app("support-bot"), serde_json::json!({"name": "support-bot"}))
//!         .await?;
//!     Ok(())
//! }
//! ```

mod app_lock;
mod error;
mod file_store;
mod memory_store;
mod paths;
mod record_store;
mod sqlite_store;
mod types;

pub use app_lock::{app_lock_wait_ms_last, app_lock_wait_ms_max, LockOptions};
pub use error::{Result, StoreError};
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use paths::{default_store_root, expand_home, DEFAULT_STORE_DIR_NAME};
pub use record_store::{AppGuard, RecordStore};
pub use sqlite_store::SqliteStore;
pub use types::{Filter, RecordKey, RecordKind, StoredRecord, WriteBatch, WriteOp};
