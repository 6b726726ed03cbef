//! Scan reconciliation
//!
//! The [`Reconciler`] folds one scan document into the store per pass:
//!
//! 1. `resolver` finds or creates messages, tags, nodes and the URL
//! 2. `relations` makes each message's node/tag edges match the scan
//! 3. `equalify` records flagged/equalified transitions for the URL's nodes
//! 4. `cleanup` deletes tags no message references any more
//!
//! All four run inside one store transaction.

pub mod cleanup;
mod engine;
pub mod equalify;
pub mod relations;
mod report;
pub mod resolver;

pub use engine::{ReconcileError, ReconcileResult, Reconciler};
pub use report::{
    BatchSummary, CleanupCounts, EdgeCounts, EdgeTally, EntityCounts, EntityTally, PassCounts,
    ReconcileReport, TransitionCounts,
};
