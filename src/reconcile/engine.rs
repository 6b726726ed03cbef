//! Reconciler: the pipeline coordinator
//!
//! One call reconciles one scan document: preprocess, resolve, diff edges,
//! track equalification, sweep orphans, commit. Everything after
//! preprocessing runs inside a single unit of work; any failure rolls the
//! whole pass back.

use super::cleanup::sweep_orphans;
use super::equalify::track_equalification;
use super::relations::reconcile_relations;
use super::report::{PassCounts, ReconcileReport};
use super::resolver::resolve_scan;
use crate::model::PropertyId;
use crate::scan::{strip_passes, DocumentError, ScanDocument};
use crate::storage::{ScanStore, StorageError};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// Errors that abort a reconciliation pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    #[error("Malformed document: {0}")]
    MalformedDocument(#[from] DocumentError),

    #[error("Property not found: {0}")]
    UnknownProperty(PropertyId),
}

/// Result type for reconciliation
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Reconciles scan documents into a store
#[derive(Debug)]
pub struct Reconciler<S> {
    store: S,
}

impl<S: ScanStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconcile a document filed under `property`, stamping history now
    pub fn reconcile(
        &self,
        doc: ScanDocument,
        property: PropertyId,
    ) -> ReconcileResult<ReconcileReport> {
        self.reconcile_at(doc, property, Utc::now())
    }

    /// Reconcile a document, stamping history entries with `at`
    pub fn reconcile_at(
        &self,
        doc: ScanDocument,
        property: PropertyId,
        at: DateTime<Utc>,
    ) -> ReconcileResult<ReconcileReport> {
        let pass_id = Uuid::new_v4();
        let span = info_span!("reconcile", pass = %pass_id, url = %doc.url, property = %property);
        let _entered = span.enter();

        doc.validate()?;
        let (doc, pruned) = strip_passes(doc);

        let outcome = self.store.atomically(|tx| -> ReconcileResult<_> {
            if !tx.property_exists(property)? {
                return Err(ReconcileError::UnknownProperty(property));
            }

            let scan = resolve_scan(tx, &doc, property, at)?;

            let relations = reconcile_relations(tx, &scan)?;
            debug!(
                edge_changes = relations.edges.changes(),
                detached_tags = relations.detached_tags.len(),
                detached_nodes = relations.detached_nodes.len(),
                "relations reconciled"
            );

            let transitions =
                track_equalification(tx, scan.url_id, &scan.nodes, &scan.fresh_nodes, at)?;

            let cleanup = sweep_orphans(tx, &relations.detached_tags, &relations.detached_nodes)?;

            let counts = PassCounts {
                documents_processed: 1,
                pruned,
                entities: scan.counts,
                edges: relations.edges,
                transitions,
                cleanup,
            };
            Ok((scan.url_id, counts))
        });

        match outcome {
            Ok((url_id, counts)) => {
                info!(
                    url_id = %url_id,
                    messages_created = counts.entities.messages.created,
                    nodes_created = counts.entities.nodes.created,
                    edges_added = counts.edges.message_nodes.added + counts.edges.message_tags.added,
                    edges_removed = counts.edges.message_nodes.removed + counts.edges.message_tags.removed,
                    nodes_equalified = counts.transitions.equalified,
                    nodes_flagged = counts.transitions.flagged,
                    tags_deleted = counts.cleanup.tags_deleted,
                    "pass committed"
                );
                Ok(ReconcileReport {
                    pass_id,
                    url_id,
                    counts,
                })
            }
            Err(err) => {
                warn!(error = %err, "pass rolled back");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageType;
    use crate::storage::{OpenStore, SqliteStore, StoreTx};

    fn reconciler() -> (Reconciler<SqliteStore>, PropertyId) {
        let store = SqliteStore::open_in_memory().unwrap();
        let property = store.atomically(|tx| tx.create_property("site")).unwrap();
        (Reconciler::new(store), property)
    }

    fn sample() -> ScanDocument {
        ScanDocument::new("https://example.com/")
            .with_tag(1, "wcag2a")
            .with_tag(2, "best-practice")
            .with_node(10, "<img src=\"hero.png\">", ["#hero img"])
            .with_message("Images must have alternate text", MessageType::Violation, [1], [10])
            .with_message("Page has a main landmark", MessageType::Pass, [2], Vec::<i64>::new())
    }

    #[test]
    fn test_first_pass_creates_everything() {
        let (reconciler, property) = reconciler();
        let report = reconciler.reconcile(sample(), property).unwrap();
        let counts = report.counts;

        assert_eq!(counts.documents_processed, 1);
        assert_eq!(counts.pruned.messages_dropped, 1);
        assert_eq!(counts.pruned.tags_pruned, 1);
        assert_eq!(counts.entities.messages.created, 1);
        assert_eq!(counts.entities.tags.created, 1);
        assert_eq!(counts.entities.nodes.created, 1);
        assert_eq!(counts.entities.urls.created, 1);
        assert_eq!(counts.edges.message_nodes.added, 1);
        assert_eq!(counts.edges.message_tags.added, 1);
        assert_eq!(counts.edges.node_urls.added, 1);
        assert_eq!(counts.transitions, Default::default());

        let stored = reconciler.store().counts().unwrap();
        assert_eq!(stored.messages, 1);
        assert_eq!(stored.tags, 1);
        assert_eq!(stored.node_updates, 1);
    }

    #[test]
    fn test_unknown_property_rolls_back() {
        let (reconciler, _) = reconciler();
        let err = reconciler
            .reconcile(sample(), PropertyId::from_raw(404))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownProperty(_)));
        assert_eq!(reconciler.store().counts().unwrap().messages, 0);
    }

    #[test]
    fn test_malformed_document_never_reaches_store() {
        let (reconciler, property) = reconciler();
        let doc = ScanDocument::new("https://example.com/").with_message(
            "m",
            MessageType::Violation,
            [5],
            Vec::<i64>::new(),
        );
        let err = reconciler.reconcile(doc, property).unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedDocument(_)));
        assert_eq!(reconciler.store().counts().unwrap().urls, 0);
    }

    #[test]
    fn test_same_message_across_properties_shares_id() {
        let (reconciler, first) = reconciler();
        let second = reconciler
            .store()
            .atomically(|tx: &dyn StoreTx| tx.create_property("other"))
            .unwrap();

        reconciler.reconcile(sample(), first).unwrap();
        let report = reconciler.reconcile(sample(), second).unwrap();

        assert_eq!(report.counts.entities.messages.matched, 1);
        assert_eq!(report.counts.entities.messages.created, 0);
        assert_eq!(report.counts.entities.urls.created, 1);
        assert_eq!(reconciler.store().counts().unwrap().messages, 1);
        assert_eq!(reconciler.store().counts().unwrap().message_properties, 2);
    }
}
