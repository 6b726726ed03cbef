//! Pass stripping
//!
//! Passing findings are never stored. A node's passing state is inferred from
//! its absence in a later scan, so a pass message, and any tag or node only a
//! pass message refers to, is removed before resolution.

use super::document::{LocalId, ScanDocument, ScanMessage};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// What preprocessing removed from a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneStats {
    pub messages_dropped: usize,
    pub tags_pruned: usize,
    pub nodes_pruned: usize,
}

/// Drop pass messages, then shrink tags and nodes to exactly those still
/// referenced by a surviving message.
///
/// A tag or node referenced by both a pass message and a surviving message is
/// kept: the needed set is computed from the survivors only after the passes
/// are gone.
pub fn strip_passes(doc: ScanDocument) -> (ScanDocument, PruneStats) {
    let ScanDocument {
        url,
        messages,
        mut tags,
        mut nodes,
    } = doc;

    let (kept, passes): (Vec<ScanMessage>, Vec<ScanMessage>) = messages
        .into_iter()
        .partition(|m| m.message_type.is_actionable());

    let pass_tags: HashSet<&LocalId> = passes.iter().flat_map(|m| &m.related_tag_ids).collect();
    let pass_nodes: HashSet<&LocalId> = passes.iter().flat_map(|m| &m.related_node_ids).collect();
    let needed_tags: HashSet<&LocalId> = kept.iter().flat_map(|m| &m.related_tag_ids).collect();
    let needed_nodes: HashSet<&LocalId> = kept.iter().flat_map(|m| &m.related_node_ids).collect();

    let tags_before = tags.len();
    let nodes_before = nodes.len();
    tags.retain(|t| needed_tags.contains(&t.tag_id));
    nodes.retain(|n| needed_nodes.contains(&n.node_id));

    let stats = PruneStats {
        messages_dropped: passes.len(),
        tags_pruned: tags_before - tags.len(),
        nodes_pruned: nodes_before - nodes.len(),
    };

    debug!(
        messages_dropped = stats.messages_dropped,
        tags_pruned = stats.tags_pruned,
        nodes_pruned = stats.nodes_pruned,
        pass_only_tags = pass_tags.difference(&needed_tags).count(),
        pass_only_nodes = pass_nodes.difference(&needed_nodes).count(),
        "stripped pass findings"
    );

    let doc = ScanDocument {
        url,
        messages: kept,
        tags,
        nodes,
    };
    (doc, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageType;

    fn no_ids() -> Vec<i64> {
        Vec::new()
    }

    #[test]
    fn test_tag_only_on_pass_message_is_removed() {
        let doc = ScanDocument::new("https://example.com/")
            .with_tag(1, "wcag2a")
            .with_tag(2, "best-practice")
            .with_node(10, "<img>", ["img"])
            .with_message("Images need alt", MessageType::Violation, [1], [10])
            .with_message("Page has landmarks", MessageType::Pass, [2], no_ids());

        let (doc, stats) = strip_passes(doc);

        assert_eq!(doc.messages.len(), 1);
        assert_eq!(doc.messages[0].message_type, MessageType::Violation);
        assert_eq!(doc.tags.len(), 1);
        assert_eq!(doc.tags[0].tag, "wcag2a");
        assert!(!doc.tags.iter().any(|t| t.tag == "best-practice"));
        assert_eq!(
            stats,
            PruneStats {
                messages_dropped: 1,
                tags_pruned: 1,
                nodes_pruned: 0,
            }
        );
    }

    #[test]
    fn test_shared_references_survive() {
        let doc = ScanDocument::new("u")
            .with_tag(1, "shared")
            .with_node(10, "<button>", ["button"])
            .with_node(11, "<a>", ["a"])
            .with_message("passes here", MessageType::Pass, [1], [10, 11])
            .with_message("fails here", MessageType::Error, [1], [10]);

        let (doc, stats) = strip_passes(doc);

        assert_eq!(doc.tags.len(), 1);
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.nodes[0].html, "<button>");
        assert_eq!(stats.nodes_pruned, 1);
    }

    #[test]
    fn test_unreferenced_entries_are_pruned() {
        let doc = ScanDocument::new("u")
            .with_tag(1, "floating")
            .with_node(10, "<span>", Vec::<String>::new())
            .with_message("m", MessageType::Violation, no_ids(), no_ids());

        let (doc, stats) = strip_passes(doc);

        assert!(doc.tags.is_empty());
        assert!(doc.nodes.is_empty());
        assert_eq!(stats.tags_pruned, 1);
        assert_eq!(stats.nodes_pruned, 1);
        assert_eq!(stats.messages_dropped, 0);
    }

    #[test]
    fn test_all_pass_document_becomes_empty() {
        let doc = ScanDocument::new("u")
            .with_tag(1, "t")
            .with_node(10, "<p>", ["p"])
            .with_message("ok", MessageType::Pass, [1], [10]);

        let (doc, stats) = strip_passes(doc);

        assert!(doc.messages.is_empty());
        assert!(doc.tags.is_empty());
        assert!(doc.nodes.is_empty());
        assert_eq!(doc.url, "u");
        assert_eq!(stats.messages_dropped, 1);
    }
}
