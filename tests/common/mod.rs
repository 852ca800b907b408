// Shared fixtures for integration tests
#![allow(dead_code)]

use tender_market::config::DatabaseConfig;
use tender_market::{
    AuthorType, Bid, BidContent, BidStatus, Database, Market, MarketConfig, NewBid,
    OrganizationType, ServiceType, Tender, TenderContent, TenderStatus,
};

/// Organization member who owns the tender
pub const OWNER: &str = "alice";
/// Second member of the same organization
pub const COLLEAGUE: &str = "dave";
/// Bidder from outside the organization
pub const BIDDER: &str = "bob";
/// User with no relationship to anything
pub const OUTSIDER: &str = "carol";

pub struct Fixture {
    pub database: Database,
    pub market: Market,
    pub organization_id: String,
}

pub async fn market_on(database: Database) -> Fixture {
    let market = Market::assemble(&database, &MarketConfig::default())
        .await
        .expect("assemble market");

    for (username, first, last) in [
        (OWNER, "Alice", "Owner"),
        (COLLEAGUE, "Dave", "Colleague"),
        (BIDDER, "Bob", "Bidder"),
        (OUTSIDER, "Carol", "Outsider"),
    ] {
        market.users.create(username, first, last).await.expect("create user");
    }

    let organization_id = market
        .organizations
        .create("Acme", "Builds bridges", OrganizationType::LLC)
        .await
        .expect("create organization");
    for member in [OWNER, COLLEAGUE] {
        market
            .organizations
            .make_responsible(&organization_id, member)
            .await
            .expect("add responsible");
    }

    Fixture {
        database,
        market,
        organization_id,
    }
}

pub async fn fixture() -> Fixture {
    let database = Database::connect(&DatabaseConfig::in_memory())
        .await
        .expect("open in-memory database");
    market_on(database).await
}

pub fn tender_content(name: &str) -> TenderContent {
    TenderContent {
        name: name.to_string(),
        description: format!("{name} description"),
        service_type: ServiceType::Construction,
    }
}

pub fn bid_content(name: &str) -> BidContent {
    BidContent {
        name: name.to_string(),
        description: format!("{name} offer"),
    }
}

impl Fixture {
    pub async fn tender(&self, name: &str) -> Tender {
        self.market
            .tenders
            .create(OWNER, &self.organization_id, &tender_content(name))
            .await
            .expect("create tender")
    }

    pub async fn published_tender(&self, name: &str) -> Tender {
        let tender = self.tender(name).await;
        self.market
            .tenders
            .set_status(OWNER, &tender.id, TenderStatus::Published)
            .await
            .expect("publish tender")
    }

    pub async fn bid(&self, tender_id: &str, name: &str) -> Bid {
        let author_id = self.market.users.id_of(BIDDER).expect("bidder id");
        self.market
            .bids
            .create(
                &NewBid {
                    tender_id: tender_id.to_string(),
                    author_type: AuthorType::User,
                    author_id,
                },
                &bid_content(name),
            )
            .await
            .expect("create bid")
    }

    pub async fn published_bid(&self, tender_id: &str, name: &str) -> Bid {
        let bid = self.bid(tender_id, name).await;
        self.market
            .bids
            .set_status(BIDDER, &bid.id, BidStatus::Published)
            .await
            .expect("publish bid")
    }
}
