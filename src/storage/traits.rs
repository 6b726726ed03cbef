//! Storage trait definitions

use crate::model::{
    Message, MessageId, MessageType, Node, NodeId, NodeUpdate, Property, PropertyId, Tag, TagId,
    Url, UrlId,
};
use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store could not be reached or is refusing work (open failure,
    /// busy/locked database, I/O failure).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness or foreign-key constraint rejected a write
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, detail) = &err {
            let detail = detail.clone().unwrap_or_else(|| failure.to_string());
            match failure.code {
                ErrorCode::ConstraintViolation => return Self::ConstraintViolation(detail),
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure => return Self::Unavailable(detail),
                _ => {}
            }
        }
        Self::Database(err)
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Row counts for every table, used for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub properties: usize,
    pub urls: usize,
    pub messages: usize,
    pub tags: usize,
    pub nodes: usize,
    pub node_updates: usize,
    pub message_nodes: usize,
    pub message_tags: usize,
    pub message_urls: usize,
    pub node_urls: usize,
    pub message_properties: usize,
}

/// Operations available inside one unit of work.
///
/// Every method runs against the same open transaction; nothing is visible to
/// other connections until the enclosing [`ScanStore::atomically`] commits.
/// `insert_*` methods fail with [`StorageError::ConstraintViolation`] when the
/// natural key already exists. `link_*` methods are idempotent and return
/// whether a new edge row was written.
pub trait StoreTx {
    // === Properties ===

    fn create_property(&self, name: &str) -> StorageResult<PropertyId>;

    fn property_exists(&self, id: PropertyId) -> StorageResult<bool>;

    fn list_properties(&self) -> StorageResult<Vec<Property>>;

    // === Entity lookup / creation by natural key ===

    fn find_message(&self, text: &str, message_type: MessageType) -> StorageResult<Option<MessageId>>;

    fn insert_message(&self, text: &str, message_type: MessageType) -> StorageResult<MessageId>;

    fn find_tag(&self, text: &str) -> StorageResult<Option<TagId>>;

    fn insert_tag(&self, text: &str) -> StorageResult<TagId>;

    fn find_node(&self, html: &str) -> StorageResult<Option<NodeId>>;

    /// Create a node with `equalified = false`
    fn insert_node(&self, html: &str, targets: &[String]) -> StorageResult<NodeId>;

    fn find_url(&self, url: &str, property: PropertyId) -> StorageResult<Option<UrlId>>;

    fn insert_url(&self, url: &str, property: PropertyId) -> StorageResult<UrlId>;

    fn load_node(&self, id: NodeId) -> StorageResult<Option<Node>>;

    fn load_tag(&self, id: TagId) -> StorageResult<Option<Tag>>;

    fn load_message(&self, id: MessageId) -> StorageResult<Option<Message>>;

    fn load_url(&self, id: UrlId) -> StorageResult<Option<Url>>;

    // === Message edges diffed per scan ===

    fn message_node_ids(&self, message: MessageId) -> StorageResult<BTreeSet<NodeId>>;

    fn link_message_node(&self, message: MessageId, node: NodeId) -> StorageResult<bool>;

    fn unlink_message_node(&self, message: MessageId, node: NodeId) -> StorageResult<bool>;

    fn message_tag_ids(&self, message: MessageId) -> StorageResult<BTreeSet<TagId>>;

    fn link_message_tag(&self, message: MessageId, tag: TagId) -> StorageResult<bool>;

    fn unlink_message_tag(&self, message: MessageId, tag: TagId) -> StorageResult<bool>;

    // === Append-only edges ===

    fn link_message_url(&self, message: MessageId, url: UrlId) -> StorageResult<bool>;

    fn link_message_property(&self, message: MessageId, property: PropertyId) -> StorageResult<bool>;

    fn link_node_url(&self, node: NodeId, url: UrlId) -> StorageResult<bool>;

    /// Nodes linked to a URL through the node/url edge set
    fn node_ids_for_url(&self, url: UrlId) -> StorageResult<BTreeSet<NodeId>>;

    // === Node status history ===

    /// Most recent history entry of a node
    fn latest_node_update(&self, node: NodeId) -> StorageResult<Option<NodeUpdate>>;

    /// Full history of a node, oldest first
    fn node_updates(&self, node: NodeId) -> StorageResult<Vec<NodeUpdate>>;

    /// Append a history entry and return it as written.
    ///
    /// The per-node log is strictly time-ordered: if `at` is not after the
    /// node's latest entry, the entry is stamped one microsecond after it.
    fn append_node_update(
        &self,
        node: NodeId,
        equalified: bool,
        at: DateTime<Utc>,
    ) -> StorageResult<NodeUpdate>;

    fn set_node_equalified(&self, node: NodeId, equalified: bool) -> StorageResult<()>;

    // === Orphan checks ===

    /// Number of message edges pointing at a tag
    fn tag_reference_count(&self, tag: TagId) -> StorageResult<usize>;

    /// Number of message edges pointing at a node
    fn node_reference_count(&self, node: NodeId) -> StorageResult<usize>;

    fn delete_tag(&self, tag: TagId) -> StorageResult<bool>;
}

/// A store that can run a closure as one atomic unit of work.
///
/// Implementations must be thread-safe (Send + Sync) so independent scans
/// can be reconciled from several threads; racing writers are arbitrated by
/// the store's uniqueness constraints.
pub trait ScanStore: Send + Sync {
    /// Run `work` inside a transaction.
    ///
    /// Commits when `work` returns `Ok`; rolls back every effect when it
    /// returns `Err` or when the commit itself fails.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn StoreTx) -> Result<T, E>,
        E: From<StorageError>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: ScanStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
