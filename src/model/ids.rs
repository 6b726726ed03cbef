//! Surrogate identifiers for stored entities

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw row ID
            pub fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw row ID
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

entity_id!(
    /// Identifier of a scanned web property
    PropertyId
);
entity_id!(
    /// Identifier of a URL within a property
    UrlId
);
entity_id!(
    /// Identifier of a deduplicated finding template
    MessageId
);
entity_id!(
    /// Identifier of a rule-category label
    TagId
);
entity_id!(
    /// Identifier of a DOM node signature
    NodeId
);
