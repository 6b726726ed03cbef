//! Storage backends for scan reconciliation
//!
//! The engine talks to persistence through the `ScanStore` and `StoreTx`
//! traits. The primary implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{OpenStore, ScanStore, StorageError, StorageResult, StoreCounts, StoreTx};
