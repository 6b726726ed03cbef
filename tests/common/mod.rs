//! Common test utilities for reconciliation scenarios
//!
//! Provides a seeded store, scan document builders, and `FaultyStore`, a
//! `ScanStore` wrapper that injects failures and stale lookups.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use equalify_reconcile::model::{
    Message, MessageId, MessageType, Node, NodeId, NodeUpdate, Property, PropertyId, Tag, TagId,
    Url, UrlId,
};
use equalify_reconcile::{OpenStore, ScanDocument, ScanStore, SqliteStore, StorageError, StorageResult, StoreTx};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const PAGE: &str = "https://shop.example.com/checkout";

/// A raw scan document as the scanner emits it
pub const CHECKOUT_SCAN_JSON: &str = r##"{
  "url": "https://shop.example.com/checkout",
  "messages": [
    {
      "message": "Form elements must have labels",
      "type": "violation",
      "relatedTagIds": [1, 2],
      "relatedNodeIds": ["n1", "n2"]
    },
    {
      "message": "Document has a title",
      "type": "pass",
      "relatedTagIds": [3],
      "relatedNodeIds": []
    },
    {
      "message": "Color contrast could not be computed",
      "type": "error",
      "relatedNodeIds": ["n3"]
    }
  ],
  "tags": [
    { "tagId": 1, "tag": "wcag2a" },
    { "tagId": 2, "tag": "cat.forms" },
    { "tagId": 3, "tag": "cat.semantics" }
  ],
  "nodes": [
    { "nodeId": "n1", "html": "<input id=\"email\">", "targets": ["#email"] },
    { "nodeId": "n2", "html": "<input id=\"zip\">", "targets": ["#zip"] },
    { "nodeId": "n3", "html": "<span class=\"total\">$12</span>" }
  ]
}"##;

/// Fixed clock for scan N
pub fn scan_time(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().unwrap_or_else(Utc::now) + Duration::days(n)
}

pub fn store_with_property(name: &str) -> (SqliteStore, PropertyId) {
    let store = SqliteStore::open_in_memory().expect("in-memory store");
    let property = store
        .atomically(|tx| tx.create_property(name))
        .expect("create property");
    (store, property)
}

/// One violation per node, each tagged with `wcag2a`
pub fn violations_on(nodes: &[&str]) -> ScanDocument {
    let mut doc = ScanDocument::new(PAGE).with_tag(1, "wcag2a");
    for (i, html) in nodes.iter().enumerate() {
        let local = i as i64 + 1;
        doc = doc.with_node(local, *html, [format!("#node-{local}")]).with_message(
            format!("Violation on {html}"),
            MessageType::Violation,
            [1],
            [local],
        );
    }
    doc
}

/// One message reporting every node in `nodes`
pub fn message_on(text: &str, nodes: &[&str]) -> ScanDocument {
    let mut doc = ScanDocument::new(PAGE);
    let mut ids = Vec::new();
    for (i, html) in nodes.iter().enumerate() {
        let local = i as i64 + 1;
        doc = doc.with_node(local, *html, Vec::<String>::new());
        ids.push(local);
    }
    doc.with_message(text, MessageType::Violation, Vec::<i64>::new(), ids)
}

/// Read-only helper: run `f` in its own transaction
pub fn read<T>(store: &impl ScanStore, f: impl FnOnce(&dyn StoreTx) -> StorageResult<T>) -> T {
    store.atomically(f).expect("read transaction")
}

pub fn node_id(store: &impl ScanStore, html: &str) -> NodeId {
    read(store, |tx| tx.find_node(html)).expect("node exists")
}

pub fn history(store: &impl ScanStore, html: &str) -> Vec<bool> {
    let node = node_id(store, html);
    read(store, |tx| tx.node_updates(node))
        .into_iter()
        .map(|u| u.equalified)
        .collect()
}

/// Faults injected by [`FaultyStore`]
#[derive(Debug, Default)]
pub struct Faults {
    /// Fail the equalification stage's node listing
    pub fail_tracking: AtomicBool,
    /// Report "not found" for this many tag lookups, as if another writer
    /// inserted the tag between our lookup and our insert
    pub stale_tag_lookups: AtomicUsize,
}

/// Wraps a store and injects [`Faults`] into every transaction
pub struct FaultyStore {
    pub inner: SqliteStore,
    pub faults: Faults,
}

impl FaultyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            faults: Faults::default(),
        }
    }
}

impl ScanStore for FaultyStore {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn StoreTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        self.inner.atomically(|tx| {
            let faulty = FaultyTx {
                inner: tx,
                faults: &self.faults,
            };
            work(&faulty)
        })
    }
}

struct FaultyTx<'a> {
    inner: &'a dyn StoreTx,
    faults: &'a Faults,
}

impl StoreTx for FaultyTx<'_> {
    fn create_property(&self, name: &str) -> StorageResult<PropertyId> {
        self.inner.create_property(name)
    }

    fn property_exists(&self, id: PropertyId) -> StorageResult<bool> {
        self.inner.property_exists(id)
    }

    fn list_properties(&self) -> StorageResult<Vec<Property>> {
        self.inner.list_properties()
    }

    fn find_message(&self, text: &str, message_type: MessageType) -> StorageResult<Option<MessageId>> {
        self.inner.find_message(text, message_type)
    }

    fn insert_message(&self, text: &str, message_type: MessageType) -> StorageResult<MessageId> {
        self.inner.insert_message(text, message_type)
    }

    fn find_tag(&self, text: &str) -> StorageResult<Option<TagId>> {
        let stale = self
            .faults
            .stale_tag_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_tag(text)
    }

    fn insert_tag(&self, text: &str) -> StorageResult<TagId> {
        self.inner.insert_tag(text)
    }

    fn find_node(&self, html: &str) -> StorageResult<Option<NodeId>> {
        self.inner.find_node(html)
    }

    fn insert_node(&self, html: &str, targets: &[String]) -> StorageResult<NodeId> {
        self.inner.insert_node(html, targets)
    }

    fn find_url(&self, url: &str, property: PropertyId) -> StorageResult<Option<UrlId>> {
        self.inner.find_url(url, property)
    }

    fn insert_url(&self, url: &str, property: PropertyId) -> StorageResult<UrlId> {
        self.inner.insert_url(url, property)
    }

    fn load_node(&self, id: NodeId) -> StorageResult<Option<Node>> {
        self.inner.load_node(id)
    }

    fn load_tag(&self, id: TagId) -> StorageResult<Option<Tag>> {
        self.inner.load_tag(id)
    }

    fn load_message(&self, id: MessageId) -> StorageResult<Option<Message>> {
        self.inner.load_message(id)
    }

    fn load_url(&self, id: UrlId) -> StorageResult<Option<Url>> {
        self.inner.load_url(id)
    }

    fn message_node_ids(&self, message: MessageId) -> StorageResult<BTreeSet<NodeId>> {
        self.inner.message_node_ids(message)
    }

    fn link_message_node(&self, message: MessageId, node: NodeId) -> StorageResult<bool> {
        self.inner.link_message_node(message, node)
    }

    fn unlink_message_node(&self, message: MessageId, node: NodeId) -> StorageResult<bool> {
        self.inner.unlink_message_node(message, node)
    }

    fn message_tag_ids(&self, message: MessageId) -> StorageResult<BTreeSet<TagId>> {
        self.inner.message_tag_ids(message)
    }

    fn link_message_tag(&self, message: MessageId, tag: TagId) -> StorageResult<bool> {
        self.inner.link_message_tag(message, tag)
    }

    fn unlink_message_tag(&self, message: MessageId, tag: TagId) -> StorageResult<bool> {
        self.inner.unlink_message_tag(message, tag)
    }

    fn link_message_url(&self, message: MessageId, url: UrlId) -> StorageResult<bool> {
        self.inner.link_message_url(message, url)
    }

    fn link_message_property(&self, message: MessageId, property: PropertyId) -> StorageResult<bool> {
        self.inner.link_message_property(message, property)
    }

    fn link_node_url(&self, node: NodeId, url: UrlId) -> StorageResult<bool> {
        self.inner.link_node_url(node, url)
    }

    fn node_ids_for_url(&self, url: UrlId) -> StorageResult<BTreeSet<NodeId>> {
        if self.faults.fail_tracking.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected fault".to_string()));
        }
        self.inner.node_ids_for_url(url)
    }

    fn latest_node_update(&self, node: NodeId) -> StorageResult<Option<NodeUpdate>> {
        self.inner.latest_node_update(node)
    }

    fn node_updates(&self, node: NodeId) -> StorageResult<Vec<NodeUpdate>> {
        self.inner.node_updates(node)
    }

    fn append_node_update(
        &self,
        node: NodeId,
        equalified: bool,
        at: DateTime<Utc>,
    ) -> StorageResult<NodeUpdate> {
        self.inner.append_node_update(node, equalified, at)
    }

    fn set_node_equalified(&self, node: NodeId, equalified: bool) -> StorageResult<()> {
        self.inner.set_node_equalified(node, equalified)
    }

    fn tag_reference_count(&self, tag: TagId) -> StorageResult<usize> {
        self.inner.tag_reference_count(tag)
    }

    fn node_reference_count(&self, node: NodeId) -> StorageResult<usize> {
        self.inner.node_reference_count(node)
    }

    fn delete_tag(&self, tag: TagId) -> StorageResult<bool> {
        self.inner.delete_tag(tag)
    }
}
