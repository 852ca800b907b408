//! Marketplace records as the core hands them out.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text value that does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct ParseValueError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseValueError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $(stringify!($variant) => Ok($name::$variant),)+
                    other => Err(ParseValueError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum!(
    /// Created -> Published -> Closed
    TenderStatus, "tender status" { Created, Published, Closed }
);

string_enum!(
    /// Created -> Published -> {Approved, Rejected}; Canceled by the author
    BidStatus, "bid status" { Created, Published, Canceled, Approved, Rejected }
);

string_enum!(ServiceType, "service type" { Construction, Delivery, Manufacture });

string_enum!(AuthorType, "author type" { Organization, User });

string_enum!(OrganizationType, "organization type" { IE, LLC, JSC });

impl BidStatus {
    /// Statuses only the decision workflow may set
    pub fn is_decision(&self) -> bool {
        matches!(self, BidStatus::Approved | BidStatus::Rejected)
    }

    /// Statuses from which the author may still move the bid
    pub const AUTHOR_MUTABLE: &'static [BidStatus] = &[BidStatus::Created, BidStatus::Published];
}

/// Outcome chosen by an organization member for a published bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn bid_status(&self) -> BidStatus {
        match self {
            Decision::Approve => BidStatus::Approved,
            Decision::Reject => BidStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(Decision::Approve),
            "reject" | "rejected" => Ok(Decision::Reject),
            _ => Err(ParseValueError {
                kind: "decision",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderContent {
    pub name: String,
    pub description: String,
    pub service_type: ServiceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tender {
    pub id: String,
    pub status: TenderStatus,
    pub organization_id: String,
    pub creator_id: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub content: TenderContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidContent {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: String,
    pub status: BidStatus,
    pub tender_id: String,
    pub author_type: AuthorType,
    pub author_id: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub content: BidContent,
}

/// Relational fields fixed when a bid is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBid {
    pub tender_id: String,
    pub author_type: AuthorType,
    pub author_id: String,
}

/// Immutable snapshot of an entity's editable fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentVersion<C> {
    pub entity_id: String,
    pub version: i64,
    #[serde(flatten)]
    pub content: C,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub bid_id: String,
    pub content: String,
    pub author_id: String,
    pub receiver_id: String,
    pub created_at: DateTime<Utc>,
}

/// Offset/limit window over an ordered listing.
///
/// Negative offsets are clamped to zero; a limit of zero or less means
/// "everything from offset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    offset: i64,
    limit: Option<i64>,
}

impl Page {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self {
            offset: offset.max(0),
            limit: (limit > 0).then_some(limit),
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    /// SQLite spells "no limit" as a negative LIMIT
    pub(crate) fn sql_limit(&self) -> i64 {
        self.limit.unwrap_or(-1)
    }
}
