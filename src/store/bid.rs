use chrono::{DateTime, Utc};
use sqlx::query_builder::Separated;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use super::{decode_text, Versioned, VersionedStore};
use crate::cache::{Caches, ExistenceCache};
use crate::error::{EntityKind, MarketError, Result};
use crate::model::{AuthorType, Bid, BidContent, BidStatus, NewBid, Page};

pub type BidStore = VersionedStore<Bid>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidFilter {
    /// Bids on a tender, excluding ones still in `Created`
    Tender { tender_id: String },
    /// Every bid by an author, whatever its status
    Author { author_id: String },
}

impl Versioned for Bid {
    type Status = BidStatus;
    type Content = BidContent;
    type New = NewBid;
    type Filter = BidFilter;

    const KIND: EntityKind = EntityKind::Bid;
    const TABLE: &'static str = "bid";
    const CONTENT_TABLE: &'static str = "bid_content";
    const OWNER_COLUMN: &'static str = "bid_id";
    const CONTENT_COLUMNS: &'static [&'static str] = &["name", "description"];
    const SELECT: &'static str = "SELECT e.id, e.status, e.tender_id, e.author_type, e.author_id, e.version, e.created_at, \
         c.name, c.description \
         FROM bid e JOIN bid_content c ON c.bid_id = e.id AND c.version = e.version";
    const REFERENCED: EntityKind = EntityKind::Tender;
    const INITIAL: BidStatus = BidStatus::Created;
    const OPEN: BidStatus = BidStatus::Published;

    fn ids(caches: &Caches) -> &ExistenceCache {
        &caches.bid_ids
    }

    fn bind_insert<'args>(
        builder: &mut QueryBuilder<'args, Sqlite>,
        id: &str,
        new: &NewBid,
        created_at: DateTime<Utc>,
    ) {
        builder.push(
            "INSERT INTO bid (id, status, tender_id, author_type, author_id, version, created_at) VALUES (",
        );
        let mut values = builder.separated(", ");
        values.push_bind(id.to_string());
        values.push_bind(Self::INITIAL.as_str());
        values.push_bind(new.tender_id.clone());
        values.push_bind(new.author_type.as_str());
        values.push_bind(new.author_id.clone());
        values.push_bind(1_i64);
        values.push_bind(created_at);
        values.push_unseparated(")");
    }

    fn bind_content<'qb, 'args>(
        values: &mut Separated<'qb, 'args, Sqlite, &'static str>,
        content: &BidContent,
    ) {
        values.push_bind(content.name.clone());
        values.push_bind(content.description.clone());
    }

    fn push_filter<'args>(builder: &mut QueryBuilder<'args, Sqlite>, filter: &BidFilter) {
        match filter {
            BidFilter::Tender { tender_id } => {
                builder.push("e.tender_id = ");
                builder.push_bind(tender_id.clone());
                builder.push(" AND e.status <> ");
                builder.push_bind(BidStatus::Created.as_str());
            }
            BidFilter::Author { author_id } => {
                builder.push("e.author_id = ");
                builder.push_bind(author_id.clone());
            }
        }
    }

    fn content_from_row(row: &SqliteRow) -> Result<BidContent> {
        Ok(BidContent {
            name: row.try_get("name")?,
            description: row.try_get("description")?,
        })
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Bid {
            id: row.try_get("id")?,
            status: decode_text(row, "status")?,
            tender_id: row.try_get("tender_id")?,
            author_type: decode_text(row, "author_type")?,
            author_id: row.try_get("author_id")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            content: Self::content_from_row(row)?,
        })
    }
}

impl BidStore {
    /// Create a bid in `Created` status; a missing tender surfaces as
    /// `ReferentialIntegrity`.
    pub async fn create(&self, new: &NewBid, content: &BidContent) -> Result<String> {
        self.insert(new, content).await
    }

    pub async fn list_by_tender(&self, tender_id: &str, page: Page) -> Result<Vec<Bid>> {
        let filter = BidFilter::Tender {
            tender_id: tender_id.to_string(),
        };
        self.list_paged(&filter, page).await
    }

    pub async fn list_by_author(&self, author_id: &str, page: Page) -> Result<Vec<Bid>> {
        let filter = BidFilter::Author {
            author_id: author_id.to_string(),
        };
        self.list_paged(&filter, page).await
    }

    /// The tender a bid was placed on
    pub async fn tender_id_of(&self, bid_id: &str) -> Result<String> {
        self.ensure_exists(bid_id)?;

        let mut conn = self.db.acquire().await?;
        let tender_id: Option<String> = sqlx::query_scalar("SELECT tender_id FROM bid WHERE id = ?")
            .bind(bid_id)
            .fetch_optional(&mut *conn)
            .await?;
        tender_id.ok_or_else(|| MarketError::not_found(EntityKind::Bid, bid_id))
    }

    pub async fn author_of(&self, bid_id: &str) -> Result<(AuthorType, String)> {
        self.ensure_exists(bid_id)?;

        let mut conn = self.db.acquire().await?;
        let row = sqlx::query("SELECT author_type, author_id FROM bid WHERE id = ?")
            .bind(bid_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| MarketError::not_found(EntityKind::Bid, bid_id))?;
        Ok((decode_text(&row, "author_type")?, row.try_get("author_id")?))
    }

    /// Compare-and-swap a `Published` bid to a decision status, returning the
    /// bid's tender id when the row changed.
    pub async fn decide_if_published(&self, bid_id: &str, decision: BidStatus) -> Result<Option<String>> {
        self.ensure_exists(bid_id)?;

        let mut conn = self.db.acquire().await?;
        let tender_id: Option<String> = sqlx::query_scalar(
            "UPDATE bid SET status = ? WHERE id = ? AND status = ? RETURNING tender_id",
        )
        .bind(decision.as_str())
        .bind(bid_id)
        .bind(BidStatus::Published.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        debug!(bid_id = %bid_id, decision = %decision, changed = tender_id.is_some(), "Bid decision CAS");
        Ok(tender_id)
    }
}
