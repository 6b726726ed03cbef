//! Orphan cleanup
//!
//! Tags that no message references any more are deleted. Nodes are never
//! deleted: their status history outlives their edges.

use super::report::CleanupCounts;
use crate::model::{NodeId, TagId};
use crate::storage::{StorageResult, StoreTx};
use std::collections::BTreeSet;
use tracing::debug;

/// Delete orphaned tags among `detached_tags` and count orphaned nodes among
/// `detached_nodes`.
///
/// Candidates come from this pass's diffs, but membership is re-read from the
/// store: a message outside the current scan may still reference a
/// candidate.
pub fn sweep_orphans(
    tx: &dyn StoreTx,
    detached_tags: &BTreeSet<TagId>,
    detached_nodes: &BTreeSet<NodeId>,
) -> StorageResult<CleanupCounts> {
    let mut counts = CleanupCounts::default();

    for &tag in detached_tags {
        if tx.tag_reference_count(tag)? == 0 && tx.delete_tag(tag)? {
            counts.tags_deleted += 1;
            debug!(tag_id = %tag, "deleted orphaned tag");
        }
    }

    for &node in detached_nodes {
        if tx.node_reference_count(node)? == 0 {
            counts.nodes_orphaned += 1;
            debug!(node_id = %node, "node has no message edges; history retained");
        }
    }

    Ok(counts)
}
