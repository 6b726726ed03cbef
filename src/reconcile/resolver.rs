//! Entity resolution: content-based find-or-create
//!
//! Messages, tags, nodes and URLs are deduplicated by natural key. The
//! resolver also builds the translation table that maps the document's local
//! tag/node IDs to store IDs, and rewrites every message's references through
//! it.

use super::engine::ReconcileResult;
use super::report::EntityCounts;
use crate::model::{MessageId, MessageType, NodeId, PropertyId, TagId, UrlId};
use crate::scan::{DocumentError, LocalId, ScanDocument};
use crate::storage::{StorageResult, StoreTx};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Outcome of a find-or-create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<Id> {
    /// An existing row had the natural key
    Matched(Id),
    /// A new row was written
    Created(Id),
}

impl<Id: Copy> Resolved<Id> {
    pub fn id(&self) -> Id {
        match self {
            Self::Matched(id) | Self::Created(id) => *id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Look up by natural key and create when absent.
///
/// A create that fails on a uniqueness constraint means another writer
/// inserted the same key first; the lookup is retried once and its result
/// returned as a match. Any other failure propagates.
pub fn find_or_create<Id: Copy>(
    kind: &'static str,
    find: impl Fn() -> StorageResult<Option<Id>>,
    create: impl FnOnce() -> StorageResult<Id>,
) -> StorageResult<Resolved<Id>> {
    if let Some(id) = find()? {
        return Ok(Resolved::Matched(id));
    }

    match create() {
        Ok(id) => Ok(Resolved::Created(id)),
        Err(err) if err.is_constraint_violation() => {
            warn!(kind, error = %err, "create lost a uniqueness race, looking up again");
            match find()? {
                Some(id) => Ok(Resolved::Matched(id)),
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

pub fn resolve_message(
    tx: &dyn StoreTx,
    text: &str,
    message_type: MessageType,
) -> StorageResult<Resolved<MessageId>> {
    find_or_create(
        "message",
        || tx.find_message(text, message_type),
        || tx.insert_message(text, message_type),
    )
}

pub fn resolve_tag(tx: &dyn StoreTx, text: &str) -> StorageResult<Resolved<TagId>> {
    find_or_create("tag", || tx.find_tag(text), || tx.insert_tag(text))
}

/// Resolve a node by its HTML.
///
/// A newly created node gets its first history entry, `equalified = false`,
/// stamped `at`. Targets are stored on creation only; they are not part of
/// the node's identity.
pub fn resolve_node(
    tx: &dyn StoreTx,
    html: &str,
    targets: &[String],
    at: DateTime<Utc>,
) -> StorageResult<Resolved<NodeId>> {
    let resolved = find_or_create("node", || tx.find_node(html), || tx.insert_node(html, targets))?;
    if let Resolved::Created(id) = resolved {
        tx.append_node_update(id, false, at)?;
    }
    Ok(resolved)
}

pub fn resolve_url(
    tx: &dyn StoreTx,
    url: &str,
    property: PropertyId,
) -> StorageResult<Resolved<UrlId>> {
    find_or_create(
        "url",
        || tx.find_url(url, property),
        || tx.insert_url(url, property),
    )
}

/// Document-local ID to store ID mapping for one pass
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    tags: HashMap<LocalId, TagId>,
    nodes: HashMap<LocalId, NodeId>,
}

impl TranslationTable {
    pub fn tag(&self, local: &LocalId) -> Option<TagId> {
        self.tags.get(local).copied()
    }

    pub fn node(&self, local: &LocalId) -> Option<NodeId> {
        self.nodes.get(local).copied()
    }
}

/// A message and the edges the current scan wants it to have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMessage {
    pub id: MessageId,
    pub nodes: BTreeSet<NodeId>,
    pub tags: BTreeSet<TagId>,
}

/// A scan document rewritten in store IDs
#[derive(Debug, Clone)]
pub struct ResolvedScan {
    pub property_id: PropertyId,
    pub url_id: UrlId,
    /// One entry per distinct message; repeated records are merged
    pub messages: Vec<ResolvedMessage>,
    /// Every node the scan reports
    pub nodes: BTreeSet<NodeId>,
    /// Nodes created during this pass
    pub fresh_nodes: BTreeSet<NodeId>,
    pub translation: TranslationTable,
    pub counts: EntityCounts,
}

/// Resolve every entity of a preprocessed document.
///
/// Records of the same message (same text and type) are merged and their
/// desired node and tag sets unioned, so the diff sees one desired set per
/// message.
pub fn resolve_scan(
    tx: &dyn StoreTx,
    doc: &ScanDocument,
    property: PropertyId,
    at: DateTime<Utc>,
) -> ReconcileResult<ResolvedScan> {
    let mut counts = EntityCounts::default();

    let url = resolve_url(tx, &doc.url, property)?;
    counts.urls.record(url.was_created());

    let mut translation = TranslationTable::default();
    for tag in &doc.tags {
        let resolved = resolve_tag(tx, &tag.tag)?;
        counts.tags.record(resolved.was_created());
        translation.tags.insert(tag.tag_id.clone(), resolved.id());
    }

    let mut nodes = BTreeSet::new();
    let mut fresh_nodes = BTreeSet::new();
    for node in &doc.nodes {
        let resolved = resolve_node(tx, &node.html, &node.targets, at)?;
        counts.nodes.record(resolved.was_created());
        if resolved.was_created() {
            fresh_nodes.insert(resolved.id());
        }
        nodes.insert(resolved.id());
        translation.nodes.insert(node.node_id.clone(), resolved.id());
    }

    let mut messages: BTreeMap<MessageId, ResolvedMessage> = BTreeMap::new();
    for (index, message) in doc.messages.iter().enumerate() {
        let resolved = resolve_message(tx, &message.message, message.message_type)?;
        counts.messages.record(resolved.was_created());

        let entry = messages
            .entry(resolved.id())
            .or_insert_with(|| ResolvedMessage {
                id: resolved.id(),
                nodes: BTreeSet::new(),
                tags: BTreeSet::new(),
            });

        for local in &message.related_tag_ids {
            let id = translation
                .tag(local)
                .ok_or_else(|| DocumentError::UnknownTagRef { index, id: local.clone() })?;
            entry.tags.insert(id);
        }
        for local in &message.related_node_ids {
            let id = translation
                .node(local)
                .ok_or_else(|| DocumentError::UnknownNodeRef { index, id: local.clone() })?;
            entry.nodes.insert(id);
        }
    }

    debug!(
        url_id = %url.id(),
        messages = messages.len(),
        tags = translation.tags.len(),
        nodes = nodes.len(),
        fresh_nodes = fresh_nodes.len(),
        "resolved scan entities"
    );

    Ok(ResolvedScan {
        property_id: property,
        url_id: url.id(),
        messages: messages.into_values().collect(),
        nodes,
        fresh_nodes,
        translation,
        counts,
    })
}
