//! Relation reconciliation
//!
//! After a pass, each message's node and tag edges equal exactly what the
//! latest scan reports for it. URL and property edges only accumulate.

use super::report::EdgeCounts;
use super::resolver::ResolvedScan;
use crate::model::{NodeId, TagId};
use crate::storage::{StorageResult, StoreTx};
use std::collections::BTreeSet;
use tracing::debug;

/// Edge changes needed to turn `current` into `desired`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDiff<T> {
    pub to_add: BTreeSet<T>,
    pub to_remove: BTreeSet<T>,
}

impl<T> EdgeDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// `to_add = desired - current`, `to_remove = current - desired`
pub fn diff_edges<T: Ord + Copy>(desired: &BTreeSet<T>, current: &BTreeSet<T>) -> EdgeDiff<T> {
    EdgeDiff {
        to_add: desired.difference(current).copied().collect(),
        to_remove: current.difference(desired).copied().collect(),
    }
}

/// What the reconciler changed, plus cleanup candidates
#[derive(Debug, Clone, Default)]
pub struct RelationOutcome {
    pub edges: EdgeCounts,
    /// Tags that lost an edge to some message. Another message may still
    /// reference them.
    pub detached_tags: BTreeSet<TagId>,
    /// Nodes that lost an edge to some message
    pub detached_nodes: BTreeSet<NodeId>,
}

/// Apply node/tag diffs for every message and insert the append-only
/// message/url, message/property and node/url edges.
pub fn reconcile_relations(tx: &dyn StoreTx, scan: &ResolvedScan) -> StorageResult<RelationOutcome> {
    let mut outcome = RelationOutcome::default();
    let edges = &mut outcome.edges;

    for message in &scan.messages {
        let node_diff = diff_edges(&message.nodes, &tx.message_node_ids(message.id)?);
        for &node in &node_diff.to_add {
            if tx.link_message_node(message.id, node)? {
                edges.message_nodes.added += 1;
            }
        }
        for &node in &node_diff.to_remove {
            if tx.unlink_message_node(message.id, node)? {
                edges.message_nodes.removed += 1;
            }
        }

        let tag_diff = diff_edges(&message.tags, &tx.message_tag_ids(message.id)?);
        for &tag in &tag_diff.to_add {
            if tx.link_message_tag(message.id, tag)? {
                edges.message_tags.added += 1;
            }
        }
        for &tag in &tag_diff.to_remove {
            if tx.unlink_message_tag(message.id, tag)? {
                edges.message_tags.removed += 1;
            }
        }

        if !node_diff.is_empty() || !tag_diff.is_empty() {
            debug!(
                message_id = %message.id,
                nodes_added = node_diff.to_add.len(),
                nodes_removed = node_diff.to_remove.len(),
                tags_added = tag_diff.to_add.len(),
                tags_removed = tag_diff.to_remove.len(),
                "message edges changed"
            );
        }

        outcome.detached_nodes.extend(node_diff.to_remove);
        outcome.detached_tags.extend(tag_diff.to_remove);

        if tx.link_message_url(message.id, scan.url_id)? {
            edges.message_urls.added += 1;
        }
        if tx.link_message_property(message.id, scan.property_id)? {
            edges.message_properties.added += 1;
        }
    }

    for &node in &scan.nodes {
        if tx.link_node_url(node, scan.url_id)? {
            edges.node_urls.added += 1;
        }
    }

    Ok(outcome)
}
