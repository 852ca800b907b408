use tracing::{info, warn};

use crate::error::{MarketError, Result};
use crate::model::{ContentVersion, Page, ServiceType, Tender, TenderContent, TenderStatus};
use crate::relationships::RelationshipQueries;
use crate::store::TenderStore;

#[derive(Debug, Clone)]
pub struct TenderService {
    tenders: TenderStore,
    relationships: RelationshipQueries,
}

impl TenderService {
    pub fn new(tenders: TenderStore, relationships: RelationshipQueries) -> Self {
        Self {
            tenders,
            relationships,
        }
    }

    async fn require_member(&self, actor: &str, tender_id: &str) -> Result<()> {
        let organization_id = self.relationships.org_id_of_tender(tender_id).await?;
        if self
            .relationships
            .is_user_responsible_for_org(actor, &organization_id)
            .await?
        {
            Ok(())
        } else {
            warn!(actor = %actor, tender_id = %tender_id, "Actor outside tender organization");
            Err(MarketError::NotResponsible {
                username: actor.to_string(),
                organization_id,
            })
        }
    }

    /// Create a tender for an organization the actor is responsible for
    pub async fn create(&self, actor: &str, organization_id: &str, content: &TenderContent) -> Result<Tender> {
        if !self
            .relationships
            .is_user_responsible_for_org(actor, organization_id)
            .await?
        {
            return Err(MarketError::NotResponsible {
                username: actor.to_string(),
                organization_id: organization_id.to_string(),
            });
        }

        let id = self.tenders.create(organization_id, actor, content).await?;
        info!(tender_id = %id, actor = %actor, "Tender created");
        self.tenders.get_by_id(&id).await
    }

    pub async fn list_published(&self, service_types: &[ServiceType], page: Page) -> Result<Vec<Tender>> {
        self.tenders.list_published(service_types, page).await
    }

    pub async fn list_by_creator(&self, username: &str, page: Page) -> Result<Vec<Tender>> {
        self.tenders.list_by_creator(username, page).await
    }

    pub async fn get(&self, tender_id: &str) -> Result<Tender> {
        self.tenders.get_by_id(tender_id).await
    }

    pub async fn status(&self, tender_id: &str) -> Result<TenderStatus> {
        self.tenders.status(tender_id).await
    }

    pub async fn set_status(&self, actor: &str, tender_id: &str, status: TenderStatus) -> Result<Tender> {
        self.require_member(actor, tender_id).await?;
        self.tenders.set_status(tender_id, status).await
    }

    pub async fn edit(&self, actor: &str, tender_id: &str, content: &TenderContent) -> Result<Tender> {
        self.require_member(actor, tender_id).await?;
        self.tenders.edit(tender_id, content).await
    }

    pub async fn rollback(&self, actor: &str, tender_id: &str, version: i64) -> Result<Tender> {
        self.require_member(actor, tender_id).await?;
        self.tenders.rollback(tender_id, version).await
    }

    pub async fn history(&self, tender_id: &str) -> Result<Vec<ContentVersion<TenderContent>>> {
        self.tenders.versions(tender_id).await
    }
}
