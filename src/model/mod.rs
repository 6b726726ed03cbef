//! Entity records and identifiers
//!
//! Every stored entity has a surrogate integer ID assigned by the store and a
//! natural key used for deduplication (see [`crate::reconcile::resolver`]).

mod entity;
mod ids;

pub use entity::{Message, MessageType, Node, NodeStatus, NodeUpdate, Property, Tag, Url};
pub use ids::{MessageId, NodeId, PropertyId, TagId, UrlId};
