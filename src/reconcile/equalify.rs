//! Equalification tracking
//!
//! Every node linked to the scanned URL is either reported by the current
//! scan or not. A flagged node that is no longer reported becomes equalified;
//! an equalified node that is reported again becomes flagged. Only changes
//! are written to the node's history, so unchanged scans leave it alone.

use super::report::TransitionCounts;
use crate::model::{NodeId, NodeStatus, UrlId};
use crate::storage::{StorageError, StorageResult, StoreTx};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::debug;

/// Status a node moves to, or `None` when it keeps its status
pub fn next_status(last: NodeStatus, present: bool) -> Option<NodeStatus> {
    match (last, present) {
        (NodeStatus::Flagged, false) => Some(NodeStatus::Equalified),
        (NodeStatus::Equalified, true) => Some(NodeStatus::Flagged),
        _ => None,
    }
}

/// Last known status: the newest history entry, falling back to the node's
/// mirrored flag for nodes without history.
pub fn current_status(tx: &dyn StoreTx, node: NodeId) -> StorageResult<NodeStatus> {
    if let Some(update) = tx.latest_node_update(node)? {
        return Ok(update.status());
    }
    tx.load_node(node)?
        .map(|n| n.status())
        .ok_or_else(|| StorageError::Corrupt(format!("node {node} is linked but missing")))
}

/// Append a history entry and mirror it onto the node
pub fn record_status(
    tx: &dyn StoreTx,
    node: NodeId,
    status: NodeStatus,
    at: DateTime<Utc>,
) -> StorageResult<()> {
    tx.append_node_update(node, status.is_equalified(), at)?;
    tx.set_node_equalified(node, status.is_equalified())
}

/// Evaluate every node linked to `url` against the scan's node set.
///
/// `fresh` nodes were created this pass and already carry their initial
/// flagged entry, so they are skipped.
pub fn track_equalification(
    tx: &dyn StoreTx,
    url: UrlId,
    present: &BTreeSet<NodeId>,
    fresh: &BTreeSet<NodeId>,
    at: DateTime<Utc>,
) -> StorageResult<TransitionCounts> {
    let mut counts = TransitionCounts::default();

    for node in tx.node_ids_for_url(url)? {
        if fresh.contains(&node) {
            continue;
        }

        let last = current_status(tx, node)?;
        let Some(next) = next_status(last, present.contains(&node)) else {
            continue;
        };

        record_status(tx, node, next, at)?;
        match next {
            NodeStatus::Equalified => counts.equalified += 1,
            NodeStatus::Flagged => counts.flagged += 1,
        }
        debug!(node_id = %node, from = %last, to = %next, "node status changed");
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenStore, ScanStore, SqliteStore};
    use chrono::Duration;

    #[test]
    fn test_transition_table() {
        assert_eq!(next_status(NodeStatus::Flagged, false), Some(NodeStatus::Equalified));
        assert_eq!(next_status(NodeStatus::Equalified, true), Some(NodeStatus::Flagged));
        assert_eq!(next_status(NodeStatus::Flagged, true), None);
        assert_eq!(next_status(NodeStatus::Equalified, false), None);
    }

    /// A URL with two linked nodes, both seeded as flagged
    fn linked_pair(store: &SqliteStore, at: DateTime<Utc>) -> (UrlId, NodeId, NodeId) {
        store
            .atomically(|tx| -> StorageResult<_> {
                let property = tx.create_property("site")?;
                let url = tx.insert_url("https://example.com/", property)?;
                let a = tx.insert_node("<a>", &[])?;
                let b = tx.insert_node("<b>", &[])?;
                for node in [a, b] {
                    tx.append_node_update(node, false, at)?;
                    tx.link_node_url(node, url)?;
                }
                Ok((url, a, b))
            })
            .unwrap()
    }

    #[test]
    fn test_absent_node_equalified_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let t0 = Utc::now();
        let (url, a, b) = linked_pair(&store, t0);
        let present = BTreeSet::from([a]);

        for (round, expected) in [(1, 1), (2, 0)] {
            let counts = store
                .atomically(|tx| {
                    track_equalification(tx, url, &present, &BTreeSet::new(), t0 + Duration::hours(round))
                })
                .unwrap();
            assert_eq!(counts.equalified, expected, "round {round}");
            assert_eq!(counts.flagged, 0);
        }

        store
            .atomically(|tx| -> StorageResult<()> {
                let history = tx.node_updates(b)?;
                assert_eq!(history.iter().map(|u| u.equalified).collect::<Vec<_>>(), vec![false, true]);
                assert!(tx.load_node(b)?.unwrap().equalified);
                assert_eq!(tx.node_updates(a)?.len(), 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_resurfacing_node_flagged_again() {
        let store = SqliteStore::open_in_memory().unwrap();
        let t0 = Utc::now();
        let (url, a, b) = linked_pair(&store, t0);

        store
            .atomically(|tx| track_equalification(tx, url, &BTreeSet::from([a]), &BTreeSet::new(), t0))
            .unwrap();
        let counts = store
            .atomically(|tx| {
                track_equalification(tx, url, &BTreeSet::from([a, b]), &BTreeSet::new(), t0)
            })
            .unwrap();

        assert_eq!(counts, TransitionCounts { equalified: 0, flagged: 1 });
        store
            .atomically(|tx| -> StorageResult<()> {
                let status = current_status(tx, b)?;
                assert_eq!(status, NodeStatus::Flagged);
                assert!(!tx.load_node(b)?.unwrap().equalified);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_fresh_nodes_are_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (url, a, b) = linked_pair(&store, Utc::now());

        let counts = store
            .atomically(|tx| {
                track_equalification(tx, url, &BTreeSet::new(), &BTreeSet::from([a, b]), Utc::now())
            })
            .unwrap();
        assert_eq!(counts, TransitionCounts::default());
    }

    #[test]
    fn test_status_falls_back_to_flag_without_history() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .atomically(|tx| -> StorageResult<()> {
                let node = tx.insert_node("<legacy>", &[])?;
                tx.set_node_equalified(node, true)?;
                assert_eq!(current_status(tx, node)?, NodeStatus::Equalified);
                assert!(current_status(tx, NodeId::from_raw(999)).is_err());
                Ok(())
            })
            .unwrap();
    }
}
