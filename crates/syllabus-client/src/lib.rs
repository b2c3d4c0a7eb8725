//! Syllabus client
//!
//! Keeps a [`syllabus_tree::CourseTree`] in sync with the course backend:
//!
//! - [`RemoteStore`] is the backend seam, implemented over HTTP by
//!   [`HttpStore`] and in memory by [`MemoryStore`];
//! - [`unwrap_envelope`] normalizes the backend's response shapes into
//!   `Result<T, RemoteFailure>`;
//! - [`EditSession`] applies local edits, syncs positions with rollback,
//!   sends deep upserts and publishes [`SyncEvent`]s;
//! - [`Config`] loads `syllabus.json`.

pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod http;
pub mod memory;
pub mod queue;
pub mod session;
pub mod store;

pub use config::{Config, CONFIG_FILE_NAME};
pub use envelope::{unwrap_envelope, NormalizedResponse};
pub use error::{FailureKind, RemoteFailure, Result, SyncError};
pub use events::{EventBroadcaster, SyncEvent, SyncStatus};
pub use http::HttpStore;
pub use memory::MemoryStore;
pub use queue::{SyncQueue, SyncTicket};
pub use session::EditSession;
pub use store::{RemoteResult, RemoteStore};
