// Authorization predicates
mod common;

use common::{fixture, BIDDER, COLLEAGUE, OUTSIDER, OWNER};
use tender_market::{AuthorType, EntityKind, MarketError, NewBid};

#[tokio::test]
async fn test_membership_and_tender_authorship() {
    let fx = fixture().await;
    let tender = fx.tender("Bridge").await;
    let relationships = &fx.market.relationships;

    assert!(relationships
        .is_user_responsible_for_org(OWNER, &fx.organization_id)
        .await
        .unwrap());
    assert!(!relationships
        .is_user_responsible_for_org(BIDDER, &fx.organization_id)
        .await
        .unwrap());

    assert!(relationships
        .user_belongs_to_tender_org(COLLEAGUE, &tender.id)
        .await
        .unwrap());
    assert!(!relationships
        .user_belongs_to_tender_org(OUTSIDER, &tender.id)
        .await
        .unwrap());

    assert_eq!(
        relationships.author_username_of(&tender.id).await.unwrap(),
        OWNER
    );
}

#[tokio::test]
async fn test_bid_resolves_to_its_tender_organization() {
    let fx = fixture().await;
    let tender = fx.published_tender("Bridge").await;
    let bid = fx.bid(&tender.id, "Offer").await;
    let relationships = &fx.market.relationships;

    assert_eq!(
        relationships.org_id_of_bid(&bid.id).await.unwrap(),
        fx.organization_id
    );
    assert!(relationships.is_bid_author(BIDDER, &bid.id).await.unwrap());
    assert!(!relationships.is_bid_author(OWNER, &bid.id).await.unwrap());
}

#[tokio::test]
async fn test_organization_authored_bids_belong_to_its_members() {
    let fx = fixture().await;
    let tender = fx.published_tender("Bridge").await;
    let bid = fx
        .market
        .bids
        .create(
            &NewBid {
                tender_id: tender.id.clone(),
                author_type: AuthorType::Organization,
                author_id: fx.organization_id.clone(),
            },
            &common::bid_content("In-house"),
        )
        .await
        .unwrap();

    let relationships = &fx.market.relationships;
    assert!(relationships.is_bid_author(OWNER, &bid.id).await.unwrap());
    assert!(relationships.is_bid_author(COLLEAGUE, &bid.id).await.unwrap());
    assert!(!relationships.is_bid_author(BIDDER, &bid.id).await.unwrap());
}

#[tokio::test]
async fn test_missing_references_fail_not_found() {
    let fx = fixture().await;
    let relationships = &fx.market.relationships;

    let err = relationships
        .is_user_responsible_for_org("nobody", &fx.organization_id)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::NotFound { kind: EntityKind::User, .. }));

    let err = relationships.author_username_of("missing").await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound { kind: EntityKind::Tender, .. }));

    let err = relationships.org_id_of_bid("missing").await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound { kind: EntityKind::Bid, .. }));
}

#[tokio::test]
async fn test_duplicate_username_is_rejected() {
    let fx = fixture().await;
    let err = fx.market.users.create(OWNER, "Again", "Alice").await.unwrap_err();
    assert!(matches!(err, MarketError::AlreadyExists { kind: EntityKind::User, .. }));
}
