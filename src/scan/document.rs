//! Scan document: one URL's findings as delivered by the scanner
//!
//! Tags and nodes are listed once per document under document-local IDs;
//! messages refer to them by those IDs. Local IDs mean nothing outside the
//! document and are replaced by store IDs during resolution.

use crate::model::MessageType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use thiserror::Error;

/// Why a document was rejected before any store work
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid scan document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("document url is empty")]
    EmptyUrl,

    #[error("message #{index} has empty text")]
    EmptyMessage { index: usize },

    #[error("tag {id} has empty text")]
    EmptyTag { id: LocalId },

    #[error("node {id} has empty html")]
    EmptyNode { id: LocalId },

    #[error("tag id {0} is listed more than once")]
    DuplicateTagId(LocalId),

    #[error("node id {0} is listed more than once")]
    DuplicateNodeId(LocalId),

    #[error("message #{index} references unknown tag id {id}")]
    UnknownTagRef { index: usize, id: LocalId },

    #[error("message #{index} references unknown node id {id}")]
    UnknownNodeRef { index: usize, id: LocalId },
}

/// Document-local identifier of a tag or node.
///
/// Scanners emit either integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalId {
    Number(i64),
    Text(String),
}

impl From<i64> for LocalId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for LocalId {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for LocalId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// One finding reported for the document's URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMessage {
    pub message: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub related_tag_ids: Vec<LocalId>,
    #[serde(default)]
    pub related_node_ids: Vec<LocalId>,
}

/// A rule-category label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTag {
    pub tag_id: LocalId,
    pub tag: String,
}

/// A DOM node the findings concern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanNode {
    pub node_id: LocalId,
    pub html: String,
    #[serde(default)]
    pub targets: Vec<String>,
}

/// A parsed scan of one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDocument {
    pub url: String,
    pub messages: Vec<ScanMessage>,
    pub tags: Vec<ScanTag>,
    pub nodes: Vec<ScanNode>,
}

impl ScanDocument {
    /// Create an empty document for a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            messages: Vec::new(),
            tags: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let doc: Self = serde_json::from_str(json)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Parse and validate a JSON document from a reader
    pub fn from_reader(reader: impl Read) -> Result<Self, DocumentError> {
        let doc: Self = serde_json::from_reader(reader)?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn with_tag(mut self, id: impl Into<LocalId>, tag: impl Into<String>) -> Self {
        self.tags.push(ScanTag {
            tag_id: id.into(),
            tag: tag.into(),
        });
        self
    }

    pub fn with_node<S: Into<String>>(
        mut self,
        id: impl Into<LocalId>,
        html: impl Into<String>,
        targets: impl IntoIterator<Item = S>,
    ) -> Self {
        self.nodes.push(ScanNode {
            node_id: id.into(),
            html: html.into(),
            targets: targets.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn with_message<T, N>(
        mut self,
        text: impl Into<String>,
        message_type: MessageType,
        tag_ids: T,
        node_ids: N,
    ) -> Self
    where
        T: IntoIterator,
        T::Item: Into<LocalId>,
        N: IntoIterator,
        N::Item: Into<LocalId>,
    {
        self.messages.push(ScanMessage {
            message: text.into(),
            message_type,
            related_tag_ids: tag_ids.into_iter().map(Into::into).collect(),
            related_node_ids: node_ids.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Check the shape rules serde cannot express.
    ///
    /// Local IDs must be unique within their list and every message reference
    /// must name a listed tag or node, otherwise the local-to-store ID
    /// translation would be ambiguous.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.url.trim().is_empty() {
            return Err(DocumentError::EmptyUrl);
        }

        let mut tag_ids = HashSet::new();
        for tag in &self.tags {
            if tag.tag.is_empty() {
                return Err(DocumentError::EmptyTag { id: tag.tag_id.clone() });
            }
            if !tag_ids.insert(&tag.tag_id) {
                return Err(DocumentError::DuplicateTagId(tag.tag_id.clone()));
            }
        }

        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if node.html.is_empty() {
                return Err(DocumentError::EmptyNode { id: node.node_id.clone() });
            }
            if !node_ids.insert(&node.node_id) {
                return Err(DocumentError::DuplicateNodeId(node.node_id.clone()));
            }
        }

        for (index, message) in self.messages.iter().enumerate() {
            if message.message.is_empty() {
                return Err(DocumentError::EmptyMessage { index });
            }
            if let Some(id) = message.related_tag_ids.iter().find(|id| !tag_ids.contains(id)) {
                return Err(DocumentError::UnknownTagRef { index, id: id.clone() });
            }
            if let Some(id) = message.related_node_ids.iter().find(|id| !node_ids.contains(id)) {
                return Err(DocumentError::UnknownNodeRef { index, id: id.clone() });
            }
        }

        Ok(())
    }
}
