//! Stored entity records

use super::ids::{MessageId, NodeId, PropertyId, TagId, UrlId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of finding a message reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Violation,
    Pass,
    Error,
}

impl MessageType {
    /// Column value used by the store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Violation => "violation",
            Self::Pass => "pass",
            Self::Error => "error",
        }
    }

    /// Parse a stored column value
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "violation" => Some(Self::Violation),
            "pass" => Some(Self::Pass),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether the finding is persisted as a standalone fact.
    ///
    /// Passing findings are not: a node passes when a later scan stops
    /// reporting it.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::Pass)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equalification status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// The node still exhibits a reported condition
    Flagged,
    /// The node is no longer reported
    Equalified,
}

impl NodeStatus {
    pub fn from_equalified(equalified: bool) -> Self {
        if equalified {
            Self::Equalified
        } else {
            Self::Flagged
        }
    }

    pub fn is_equalified(&self) -> bool {
        matches!(self, Self::Equalified)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flagged => f.write_str("flagged"),
            Self::Equalified => f.write_str("equalified"),
        }
    }
}

/// A scanned web property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
}

/// A URL belonging to exactly one property; unique by `(url, property_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Url {
    pub id: UrlId,
    pub url: String,
    pub property_id: PropertyId,
}

/// A finding template; unique by `(text, message_type)` across all properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub message_type: MessageType,
}

/// A rule-category label; unique by text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub text: String,
}

/// A DOM node signature; unique by HTML snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub html: String,
    /// Target selectors reported with the node. Not part of its identity.
    pub targets: Vec<String>,
    /// Mirror of the status of the node's latest [`NodeUpdate`]
    pub equalified: bool,
}

impl Node {
    pub fn status(&self) -> NodeStatus {
        NodeStatus::from_equalified(self.equalified)
    }
}

/// One entry of a node's append-only status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_id: NodeId,
    pub equalified: bool,
    pub timestamp: DateTime<Utc>,
}

impl NodeUpdate {
    pub fn status(&self) -> NodeStatus {
        NodeStatus::from_equalified(self.equalified)
    }
}
