//! Authorization predicates spanning users, organizations, tenders and bids.
//!
//! Read-only; usable with pool or transaction handles.

use tracing::debug;

use crate::cache::LookupCache;
use crate::database::DbHandle;
use crate::error::{EntityKind, MarketError, Result};
use crate::model::AuthorType;
use crate::store::{BidStore, TenderStore};

#[derive(Debug, Clone)]
pub struct RelationshipQueries {
    db: DbHandle,
    tenders: TenderStore,
    bids: BidStore,
    usernames: LookupCache,
}

impl RelationshipQueries {
    pub fn new(db: DbHandle, tenders: TenderStore, bids: BidStore, usernames: LookupCache) -> Self {
        Self {
            db,
            tenders,
            bids,
            usernames,
        }
    }

    fn user_id(&self, username: &str) -> Result<String> {
        self.usernames
            .get(username)
            .ok_or_else(|| MarketError::not_found(EntityKind::User, username))
    }

    pub async fn is_user_responsible_for_org(&self, username: &str, organization_id: &str) -> Result<bool> {
        let user_id = self.user_id(username)?;

        let mut conn = self.db.acquire().await?;
        let responsible: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM organization_responsible WHERE organization_id = ? AND user_id = ?)",
        )
        .bind(organization_id)
        .bind(&user_id)
        .fetch_one(&mut *conn)
        .await?;

        debug!(username = %username, organization_id = %organization_id, responsible, "Responsibility check");
        Ok(responsible)
    }

    /// Username of the employee who created the tender
    pub async fn author_username_of(&self, tender_id: &str) -> Result<String> {
        self.tenders.ensure_exists(tender_id)?;

        let mut conn = self.db.acquire().await?;
        let username: Option<String> = sqlx::query_scalar(
            "SELECT u.username FROM tender t JOIN employee u ON u.id = t.user_id WHERE t.id = ?",
        )
        .bind(tender_id)
        .fetch_optional(&mut *conn)
        .await?;
        username.ok_or_else(|| MarketError::not_found(EntityKind::Tender, tender_id))
    }

    pub async fn org_id_of_tender(&self, tender_id: &str) -> Result<String> {
        self.tenders.ensure_exists(tender_id)?;

        let mut conn = self.db.acquire().await?;
        let organization_id: Option<String> =
            sqlx::query_scalar("SELECT organization_id FROM tender WHERE id = ?")
                .bind(tender_id)
                .fetch_optional(&mut *conn)
                .await?;
        organization_id.ok_or_else(|| MarketError::not_found(EntityKind::Tender, tender_id))
    }

    /// Organization owning the tender the bid was placed on
    pub async fn org_id_of_bid(&self, bid_id: &str) -> Result<String> {
        self.bids.ensure_exists(bid_id)?;

        let mut conn = self.db.acquire().await?;
        let organization_id: Option<String> = sqlx::query_scalar(
            "SELECT t.organization_id FROM bid b JOIN tender t ON t.id = b.tender_id WHERE b.id = ?",
        )
        .bind(bid_id)
        .fetch_optional(&mut *conn)
        .await?;
        organization_id.ok_or_else(|| MarketError::not_found(EntityKind::Bid, bid_id))
    }

    pub async fn user_belongs_to_tender_org(&self, username: &str, tender_id: &str) -> Result<bool> {
        let organization_id = self.org_id_of_tender(tender_id).await?;
        self.is_user_responsible_for_org(username, &organization_id).await
    }

    /// User-authored bids match on user id; organization-authored bids match
    /// any user responsible for that organization.
    pub async fn is_bid_author(&self, username: &str, bid_id: &str) -> Result<bool> {
        let (author_type, author_id) = self.bids.author_of(bid_id).await?;
        match author_type {
            AuthorType::User => Ok(self.user_id(username)? == author_id),
            AuthorType::Organization => self.is_user_responsible_for_org(username, &author_id).await,
        }
    }
}
