use std::fmt;
use thiserror::Error;

/// Kinds of identity-bearing records the marketplace knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Tender,
    Bid,
    User,
    Organization,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Tender => "tender",
            EntityKind::Bid => "bid",
            EntityKind::User => "user",
            EntityKind::Organization => "organization",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the marketplace core.
///
/// Everything except `StorageUnavailable` and `DeadlineExceeded` is permanent
/// for the given input and should be reported to the actor unchanged.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("{kind} '{id}' does not exist")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} '{id}' has no content version {version}")]
    InvalidVersion {
        kind: EntityKind,
        id: String,
        version: i64,
    },

    #[error("user '{username}' is not the author of bid '{bid_id}'")]
    NotAuthor { username: String, bid_id: String },

    #[error("user '{username}' is not responsible for organization '{organization_id}'")]
    NotResponsible {
        username: String,
        organization_id: String,
    },

    #[error("transition of {kind} '{id}' to {status} is not allowed here")]
    ForbiddenTransition {
        kind: EntityKind,
        id: String,
        status: String,
    },

    #[error("bid '{bid_id}' is not published")]
    BidNotPublished { bid_id: String },

    #[error("tender '{tender_id}' is not published")]
    TenderNotPublished { tender_id: String },

    #[error("'{username}' is not the author of tender '{tender_id}'")]
    AuthorMismatch { username: String, tender_id: String },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: EntityKind, key: String },

    #[error("referenced {kind} does not exist")]
    ReferentialIntegrity { kind: EntityKind },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("operation '{operation}' exceeded its deadline of {timeout_ms}ms")]
    DeadlineExceeded { operation: String, timeout_ms: u64 },

    #[error("transaction handle is still referenced after the callback returned")]
    TransactionInUse,
}

impl MarketError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        MarketError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether a caller may reasonably retry the same call
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MarketError::StorageUnavailable(_) | MarketError::DeadlineExceeded { .. }
        )
    }

    /// Map an insert failure, turning foreign-key violations into
    /// `ReferentialIntegrity` for the given referenced kind.
    pub(crate) fn from_insert(err: sqlx::Error, referenced: EntityKind) -> Self {
        let is_fk = err
            .as_database_error()
            .map(|db_err| db_err.is_foreign_key_violation())
            .unwrap_or(false);
        if is_fk {
            MarketError::ReferentialIntegrity { kind: referenced }
        } else {
            MarketError::StorageUnavailable(err)
        }
    }
}

/// Map a failed insert of a uniquely keyed row
pub(crate) fn unique_or_storage(err: sqlx::Error, kind: EntityKind, key: &str) -> MarketError {
    let is_unique = err
        .as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false);
    if is_unique {
        MarketError::AlreadyExists {
            kind,
            key: key.to_string(),
        }
    } else {
        MarketError::StorageUnavailable(err)
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
