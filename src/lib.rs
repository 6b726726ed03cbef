//! Equalify Reconcile: scan result reconciliation engine
//!
//! Folds accessibility scan documents into a relational store. Each document
//! describes the findings for one URL; reconciling it deduplicates entities by
//! content, makes message edges match the latest scan, and keeps an
//! append-only history of when each offending node was flagged or fixed.
//!
//! # Core Concepts
//!
//! - **Messages**: Findings (violations, errors) keyed by text and type
//! - **Nodes**: Offending page elements keyed by their HTML snippet
//! - **Equalified**: A node that no longer appears in a scan of its URL
//!
//! # Example
//!
//! ```
//! use equalify_reconcile::{MessageType, OpenStore, Reconciler, ScanDocument, ScanStore, SqliteStore};
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let property = store.atomically(|tx| tx.create_property("docs")).unwrap();
//! let reconciler = Reconciler::new(store);
//!
//! let doc = ScanDocument::new("https://example.com/")
//!     .with_tag(1, "wcag2aa")
//!     .with_node(1, "<img src=\"logo.png\">", ["header img"])
//!     .with_message("Images must have alternate text", MessageType::Violation, [1], [1]);
//!
//! let report = reconciler.reconcile(doc, property).unwrap();
//! assert_eq!(report.counts.entities.nodes.created, 1);
//! ```

pub mod config;
pub mod model;
pub mod reconcile;
pub mod scan;
pub mod storage;

pub use config::{ConfigError, EngineConfig};
pub use model::{
    Message, MessageId, MessageType, Node, NodeId, NodeStatus, NodeUpdate, Property, PropertyId,
    Tag, TagId, Url, UrlId,
};
pub use reconcile::{BatchSummary, PassCounts, ReconcileError, ReconcileReport, ReconcileResult, Reconciler};
pub use scan::{DocumentError, LocalId, ScanDocument};
pub use storage::{OpenStore, ScanStore, SqliteStore, StorageError, StorageResult, StoreTx};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
