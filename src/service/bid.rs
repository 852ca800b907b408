use tracing::{info, warn};

use crate::error::{EntityKind, MarketError, Result};
use crate::model::{AuthorType, Bid, BidContent, BidStatus, ContentVersion, Decision, Feedback, NewBid, Page};
use crate::relationships::RelationshipQueries;
use crate::store::{BidStore, FeedbackStore, OrganizationStore, UserStore};
use crate::workflows::DecisionWorkflow;

#[derive(Clone)]
pub struct BidService {
    bids: BidStore,
    users: UserStore,
    organizations: OrganizationStore,
    feedback: FeedbackStore,
    relationships: RelationshipQueries,
    workflow: DecisionWorkflow,
}

impl BidService {
    pub fn new(
        bids: BidStore,
        users: UserStore,
        organizations: OrganizationStore,
        feedback: FeedbackStore,
        relationships: RelationshipQueries,
        workflow: DecisionWorkflow,
    ) -> Self {
        Self {
            bids,
            users,
            organizations,
            feedback,
            relationships,
            workflow,
        }
    }

    async fn require_author(&self, actor: &str, bid_id: &str) -> Result<()> {
        if self.relationships.is_bid_author(actor, bid_id).await? {
            Ok(())
        } else {
            warn!(actor = %actor, bid_id = %bid_id, "Actor is not the bid author");
            Err(MarketError::NotAuthor {
                username: actor.to_string(),
                bid_id: bid_id.to_string(),
            })
        }
    }

    /// A missing tender or author fails `ReferentialIntegrity`
    pub async fn create(&self, new: &NewBid, content: &BidContent) -> Result<Bid> {
        let (author_exists, kind) = match new.author_type {
            AuthorType::User => (self.users.exists(&new.author_id).await?, EntityKind::User),
            AuthorType::Organization => (
                self.organizations.exists(&new.author_id).await?,
                EntityKind::Organization,
            ),
        };
        if !author_exists {
            warn!(author_id = %new.author_id, author_type = %new.author_type, "Bid author does not exist");
            return Err(MarketError::ReferentialIntegrity { kind });
        }

        let id = self.bids.create(new, content).await?;
        info!(bid_id = %id, tender_id = %new.tender_id, "Bid created");
        self.bids.get_by_id(&id).await
    }

    /// Every bid the user authored, whatever its status
    pub async fn list_by_author(&self, username: &str, page: Page) -> Result<Vec<Bid>> {
        let user_id = self.users.id_of(username)?;
        self.bids.list_by_author(&user_id, page).await
    }

    /// Bids on a tender past `Created`, for members of its organization
    pub async fn list_by_tender(&self, actor: &str, tender_id: &str, page: Page) -> Result<Vec<Bid>> {
        if !self
            .relationships
            .user_belongs_to_tender_org(actor, tender_id)
            .await?
        {
            let organization_id = self.relationships.org_id_of_tender(tender_id).await?;
            return Err(MarketError::NotResponsible {
                username: actor.to_string(),
                organization_id,
            });
        }
        self.bids.list_by_tender(tender_id, page).await
    }

    pub async fn get(&self, bid_id: &str) -> Result<Bid> {
        self.bids.get_by_id(bid_id).await
    }

    pub async fn status(&self, bid_id: &str) -> Result<BidStatus> {
        self.bids.status(bid_id).await
    }

    /// Author-driven transitions. Decisions go through `submit_decision`, and
    /// decided or canceled bids stay where they are.
    pub async fn set_status(&self, actor: &str, bid_id: &str, status: BidStatus) -> Result<Bid> {
        self.require_author(actor, bid_id).await?;

        let forbidden = || MarketError::ForbiddenTransition {
            kind: EntityKind::Bid,
            id: bid_id.to_string(),
            status: status.to_string(),
        };
        if status.is_decision() {
            return Err(forbidden());
        }
        if !self
            .bids
            .set_status_from(bid_id, BidStatus::AUTHOR_MUTABLE, status)
            .await?
        {
            return Err(forbidden());
        }

        self.bids.get_by_id(bid_id).await
    }

    pub async fn edit(&self, actor: &str, bid_id: &str, content: &BidContent) -> Result<Bid> {
        self.require_author(actor, bid_id).await?;
        self.bids.edit(bid_id, content).await
    }

    pub async fn rollback(&self, actor: &str, bid_id: &str, version: i64) -> Result<Bid> {
        self.require_author(actor, bid_id).await?;
        self.bids.rollback(bid_id, version).await
    }

    pub async fn history(&self, bid_id: &str) -> Result<Vec<ContentVersion<BidContent>>> {
        self.bids.versions(bid_id).await
    }

    pub async fn submit_decision(&self, actor: &str, bid_id: &str, decision: Decision) -> Result<Bid> {
        self.workflow.submit_decision(actor, bid_id, decision).await
    }

    /// Leave feedback on a bid; the bid's author receives it
    pub async fn submit_feedback(&self, actor: &str, bid_id: &str, content: &str) -> Result<Feedback> {
        let organization_id = self.relationships.org_id_of_bid(bid_id).await?;
        if !self
            .relationships
            .is_user_responsible_for_org(actor, &organization_id)
            .await?
        {
            return Err(MarketError::NotResponsible {
                username: actor.to_string(),
                organization_id,
            });
        }

        let author_id = self.users.id_of(actor)?;
        let (_, receiver_id) = self.bids.author_of(bid_id).await?;
        self.feedback
            .submit(bid_id, content, &author_id, &receiver_id)
            .await
    }

    /// Feedback received by the tender's author, directly or through an
    /// organization they are responsible for
    pub async fn reviews(
        &self,
        requester: &str,
        tender_id: &str,
        author: &str,
        page: Page,
    ) -> Result<Vec<Feedback>> {
        if !self
            .relationships
            .user_belongs_to_tender_org(requester, tender_id)
            .await?
        {
            let organization_id = self.relationships.org_id_of_tender(tender_id).await?;
            return Err(MarketError::NotResponsible {
                username: requester.to_string(),
                organization_id,
            });
        }

        if self.relationships.author_username_of(tender_id).await? != author {
            return Err(MarketError::AuthorMismatch {
                username: author.to_string(),
                tender_id: tender_id.to_string(),
            });
        }

        let user_id = self.users.id_of(author)?;
        self.feedback.reviews_for(&user_id, page).await
    }
}
