//! Per-pass counters
//!
//! Each stage returns its own counts; the coordinator folds them into a
//! [`ReconcileReport`]. Batches of passes are summed with `+=`.

use crate::model::UrlId;
use crate::scan::PruneStats;
use serde::Serialize;
use std::ops::AddAssign;
use uuid::Uuid;

/// How many entities of one kind were created versus found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityTally {
    pub created: usize,
    pub matched: usize,
}

impl EntityTally {
    pub fn record(&mut self, created: bool) {
        if created {
            self.created += 1;
        } else {
            self.matched += 1;
        }
    }
}

/// Edge rows written and deleted for one relation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EdgeTally {
    pub added: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub messages: EntityTally,
    pub tags: EntityTally,
    pub nodes: EntityTally,
    pub urls: EntityTally,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EdgeCounts {
    pub message_nodes: EdgeTally,
    pub message_tags: EdgeTally,
    pub message_urls: EdgeTally,
    pub node_urls: EdgeTally,
    pub message_properties: EdgeTally,
}

impl EdgeCounts {
    /// Total rows written or deleted across every relation
    pub fn changes(&self) -> usize {
        [
            self.message_nodes,
            self.message_tags,
            self.message_urls,
            self.node_urls,
            self.message_properties,
        ]
        .iter()
        .map(|t| t.added + t.removed)
        .sum()
    }
}

/// Node status changes, by direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransitionCounts {
    /// flagged -> equalified
    pub equalified: usize,
    /// equalified -> flagged
    pub flagged: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupCounts {
    pub tags_deleted: usize,
    /// Nodes left without message edges; kept for their history
    pub nodes_orphaned: usize,
}

/// Every counter a pass produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassCounts {
    pub documents_processed: usize,
    pub pruned: PruneStats,
    pub entities: EntityCounts,
    pub edges: EdgeCounts,
    pub transitions: TransitionCounts,
    pub cleanup: CleanupCounts,
}

/// Result of one committed pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Correlates log lines of one pass
    pub pass_id: Uuid,
    pub url_id: UrlId,
    pub counts: PassCounts,
}

/// Totals over several documents, each reconciled in its own pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub documents_failed: usize,
    #[serde(flatten)]
    pub counts: PassCounts,
}

impl BatchSummary {
    pub fn record_success(&mut self, report: &ReconcileReport) {
        self.counts += report.counts;
    }

    pub fn record_failure(&mut self) {
        self.documents_failed += 1;
    }

    pub fn has_failures(&self) -> bool {
        self.documents_failed > 0
    }
}

impl AddAssign for EntityTally {
    fn add_assign(&mut self, rhs: Self) {
        self.created += rhs.created;
        self.matched += rhs.matched;
    }
}

impl AddAssign for EdgeTally {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.removed += rhs.removed;
    }
}

impl AddAssign for EntityCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.messages += rhs.messages;
        self.tags += rhs.tags;
        self.nodes += rhs.nodes;
        self.urls += rhs.urls;
    }
}

impl AddAssign for EdgeCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.message_nodes += rhs.message_nodes;
        self.message_tags += rhs.message_tags;
        self.message_urls += rhs.message_urls;
        self.node_urls += rhs.node_urls;
        self.message_properties += rhs.message_properties;
    }
}

impl AddAssign for TransitionCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.equalified += rhs.equalified;
        self.flagged += rhs.flagged;
    }
}

impl AddAssign for CleanupCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.tags_deleted += rhs.tags_deleted;
        self.nodes_orphaned += rhs.nodes_orphaned;
    }
}

impl AddAssign for PruneStats {
    fn add_assign(&mut self, rhs: Self) {
        self.messages_dropped += rhs.messages_dropped;
        self.tags_pruned += rhs.tags_pruned;
        self.nodes_pruned += rhs.nodes_pruned;
    }
}

impl AddAssign for PassCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.documents_processed += rhs.documents_processed;
        self.pruned += rhs.pruned;
        self.entities += rhs.entities;
        self.edges += rhs.edges;
        self.transitions += rhs.transitions;
        self.cleanup += rhs.cleanup;
    }
}
