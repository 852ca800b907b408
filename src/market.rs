//! Wiring of the whole core.
//!
//! Caches are built first and warmed from storage; every store, the
//! transaction manager and the services receive them by constructor.

use std::sync::Arc;

use tracing::info;

use crate::cache::Caches;
use crate::clock::{Clock, SystemClock};
use crate::config::MarketConfig;
use crate::database::Database;
use crate::error::Result;
use crate::relationships::RelationshipQueries;
use crate::service::{BidService, TenderService};
use crate::store::{BidStore, FeedbackStore, OrganizationStore, TenderStore, UserStore};
use crate::transaction::TxManager;
use crate::workflows::DecisionWorkflow;

#[derive(Clone)]
pub struct Market {
    pub caches: Caches,
    pub users: UserStore,
    pub organizations: OrganizationStore,
    pub relationships: RelationshipQueries,
    pub tenders: TenderService,
    pub bids: BidService,
}

impl Market {
    pub async fn assemble(database: &Database, config: &MarketConfig) -> Result<Self> {
        Self::assemble_with_clock(database, config, Arc::new(SystemClock)).await
    }

    pub async fn assemble_with_clock(
        database: &Database,
        config: &MarketConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let caches = Caches::new();
        let db = database.handle();

        let tender_store = TenderStore::new(db.clone(), &caches, clock.clone());
        let bid_store = BidStore::new(db.clone(), &caches, clock.clone());
        let users = UserStore::new(db.clone(), caches.user_ids.clone(), clock.clone());
        let organizations = OrganizationStore::new(db.clone(), caches.user_ids.clone(), clock.clone());
        let feedback = FeedbackStore::new(db.clone(), clock.clone());

        caches.tender_ids.warm_up(tender_store.load_ids().await?);
        caches.bid_ids.warm_up(bid_store.load_ids().await?);
        caches.user_ids.warm_up(users.load_usernames().await?);
        info!(
            tenders = caches.tender_ids.len(),
            bids = caches.bid_ids.len(),
            users = caches.user_ids.len(),
            "Caches warmed up"
        );

        let relationships = RelationshipQueries::new(
            db,
            tender_store.clone(),
            bid_store.clone(),
            caches.user_ids.clone(),
        );
        let transactions = TxManager::new(database.pool().clone(), caches.clone(), clock)
            .with_timeout(config.workflow.decision_timeout());
        let workflow = DecisionWorkflow::new(relationships.clone(), bid_store.clone(), transactions);

        let tenders = TenderService::new(tender_store, relationships.clone());
        let bids = BidService::new(
            bid_store,
            users.clone(),
            organizations.clone(),
            feedback,
            relationships.clone(),
            workflow,
        );

        Ok(Self {
            caches,
            users,
            organizations,
            relationships,
            tenders,
            bids,
        })
    }
}
