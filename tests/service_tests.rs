// Service-level rules: listings, author transitions, feedback
mod common;

use common::{bid_content, fixture, tender_content, BIDDER, COLLEAGUE, OUTSIDER, OWNER};
use tender_market::{AuthorType, BidStatus, Decision, MarketError, NewBid, Page, ServiceType};

#[tokio::test]
async fn test_only_members_create_tenders() {
    let fx = fixture().await;
    let err = fx
        .market
        .tenders
        .create(BIDDER, &fx.organization_id, &tender_content("Sneaky"))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::NotResponsible { .. }));
}

#[tokio::test]
async fn test_published_listing_filters_by_service_type() {
    let fx = fixture().await;
    let bridge = fx.published_tender("Bridge").await;
    fx.tender("Draft").await;

    let mut delivery = tender_content("Trucks");
    delivery.service_type = ServiceType::Delivery;
    let trucks = fx
        .market
        .tenders
        .create(OWNER, &fx.organization_id, &delivery)
        .await
        .unwrap();
    fx.market
        .tenders
        .set_status(OWNER, &trucks.id, tender_market::TenderStatus::Published)
        .await
        .unwrap();

    let all = fx.market.tenders.list_published(&[], Page::all()).await.unwrap();
    let names: Vec<_> = all.iter().map(|t| t.content.name.as_str()).collect();
    assert_eq!(names, vec!["Bridge", "Trucks"]);

    let construction = fx
        .market
        .tenders
        .list_published(&[ServiceType::Construction], Page::all())
        .await
        .unwrap();
    assert_eq!(construction.len(), 1);
    assert_eq!(construction[0].id, bridge.id);

    let mine = fx
        .market
        .tenders
        .list_by_creator(OWNER, Page::all())
        .await
        .unwrap();
    assert_eq!(mine.len(), 3);
}

#[tokio::test]
async fn test_pages_are_disjoint_and_ordered() {
    let fx = fixture().await;
    for name in ["Delta", "Alpha", "Echo", "Charlie", "Bravo"] {
        fx.published_tender(name).await;
    }

    let tenders = &fx.market.tenders;
    let first = tenders.list_published(&[], Page::new(0, 2)).await.unwrap();
    let second = tenders.list_published(&[], Page::new(2, 2)).await.unwrap();
    let both = tenders.list_published(&[], Page::new(0, 4)).await.unwrap();

    let ids = |list: &[tender_market::Tender]| list.iter().map(|t| t.id.clone()).collect::<Vec<_>>();
    let mut joined = ids(&first);
    joined.extend(ids(&second));
    assert_eq!(joined, ids(&both));
    assert_eq!(both[0].content.name, "Alpha");

    let clamped = tenders.list_published(&[], Page::new(-3, 0)).await.unwrap();
    assert_eq!(clamped.len(), 5);
}

#[tokio::test]
async fn test_created_bids_are_hidden_from_tender_listing() {
    let fx = fixture().await;
    let tender = fx.published_tender("Bridge").await;
    let draft = fx.bid(&tender.id, "Draft").await;
    let public = fx.published_bid(&tender.id, "Public").await;

    let listed = fx
        .market
        .bids
        .list_by_tender(OWNER, &tender.id, Page::all())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, public.id);

    let mine = fx
        .market
        .bids
        .list_by_author(BIDDER, Page::all())
        .await
        .unwrap();
    let ids: Vec<_> = mine.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&draft.id.as_str()));

    let err = fx
        .market
        .bids
        .list_by_tender(OUTSIDER, &tender.id, Page::all())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::NotResponsible { .. }));
}

#[tokio::test]
async fn test_authors_cannot_decide_or_revive_bids() {
    let fx = fixture().await;
    let tender = fx.published_tender("Bridge").await;
    let bid = fx.published_bid(&tender.id, "Offer").await;

    let err = fx
        .market
        .bids
        .set_status(BIDDER, &bid.id, BidStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::ForbiddenTransition { .. }));

    let err = fx
        .market
        .bids
        .set_status(OWNER, &bid.id, BidStatus::Canceled)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::NotAuthor { .. }));

    let canceled = fx
        .market
        .bids
        .set_status(BIDDER, &bid.id, BidStatus::Canceled)
        .await
        .unwrap();
    assert_eq!(canceled.status, BidStatus::Canceled);

    let err = fx
        .market
        .bids
        .set_status(BIDDER, &bid.id, BidStatus::Published)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::ForbiddenTransition { .. }));
}

#[tokio::test]
async fn test_only_authors_edit_bids() {
    let fx = fixture().await;
    let tender = fx.published_tender("Bridge").await;
    let bid = fx.bid(&tender.id, "Offer").await;

    let err = fx
        .market
        .bids
        .edit(OUTSIDER, &bid.id, &bid_content("Hijack"))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::NotAuthor { .. }));
}

#[tokio::test]
async fn test_feedback_reaches_the_bid_author() {
    let fx = fixture().await;
    let tender = fx.published_tender("Bridge").await;
    let bid = fx.published_bid(&tender.id, "Offer").await;
    let bidder_id = fx.market.users.id_of(BIDDER).unwrap();

    for (actor, text) in [(OWNER, "Solid offer"), (COLLEAGUE, "Too expensive")] {
        let feedback = fx
            .market
            .bids
            .submit_feedback(actor, &bid.id, text)
            .await
            .unwrap();
        assert_eq!(feedback.receiver_id, bidder_id);
        assert_eq!(feedback.bid_id, bid.id);
    }

    let err = fx
        .market
        .bids
        .submit_feedback(OUTSIDER, &bid.id, "Spam")
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::NotResponsible { .. }));
}

#[tokio::test]
async fn test_reviews_require_the_tender_author() {
    let fx = fixture().await;
    let tender = fx.published_tender("Bridge").await;
    fx.published_bid(&tender.id, "Offer").await;

    let err = fx
        .market
        .bids
        .reviews(OWNER, &tender.id, BIDDER, Page::all())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::AuthorMismatch { .. }));

    let err = fx
        .market
        .bids
        .reviews(BIDDER, &tender.id, OWNER, Page::all())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::NotResponsible { .. }));

    let author = fx
        .market
        .relationships
        .author_username_of(&tender.id)
        .await
        .unwrap();
    let reviews = fx
        .market
        .bids
        .reviews(COLLEAGUE, &tender.id, &author, Page::all())
        .await
        .unwrap();
    assert!(reviews.is_empty());
}

#[tokio::test]
async fn test_reviews_include_feedback_on_organization_bids() {
    let fx = fixture().await;
    let tender = fx.published_tender("Bridge").await;
    let owner_id = fx.market.users.id_of(OWNER).unwrap();

    let personal = fx
        .market
        .bids
        .create(
            &NewBid {
                tender_id: tender.id.clone(),
                author_type: AuthorType::User,
                author_id: owner_id.clone(),
            },
            &bid_content("Personal"),
        )
        .await
        .unwrap();
    let in_house = fx
        .market
        .bids
        .create(
            &NewBid {
                tender_id: tender.id.clone(),
                author_type: AuthorType::Organization,
                author_id: fx.organization_id.clone(),
            },
            &bid_content("In-house"),
        )
        .await
        .unwrap();
    let outside = fx.published_bid(&tender.id, "Outside").await;

    fx.market
        .bids
        .submit_feedback(COLLEAGUE, &personal.id, "Keep it")
        .await
        .unwrap();
    let org_feedback = fx
        .market
        .bids
        .submit_feedback(COLLEAGUE, &in_house.id, "Cheaper in-house")
        .await
        .unwrap();
    assert_eq!(org_feedback.receiver_id, fx.organization_id);
    fx.market
        .bids
        .submit_feedback(COLLEAGUE, &outside.id, "Not for alice")
        .await
        .unwrap();

    let reviews = fx
        .market
        .bids
        .reviews(COLLEAGUE, &tender.id, OWNER, Page::all())
        .await
        .unwrap();
    let mut receivers: Vec<_> = reviews.iter().map(|r| r.receiver_id.clone()).collect();
    receivers.sort();
    let mut expected = vec![owner_id, fx.organization_id.clone()];
    expected.sort();
    assert_eq!(receivers, expected);
    assert!(reviews.iter().all(|r| r.bid_id != outside.id));

    let page = fx
        .market
        .bids
        .reviews(COLLEAGUE, &tender.id, OWNER, Page::new(1, 1))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, reviews[1].id);
}

#[tokio::test]
async fn test_caches_warm_from_existing_rows() {
    let fx = fixture().await;
    let tender = fx.published_tender("Bridge").await;
    let bid = fx.published_bid(&tender.id, "Offer").await;
    fx.market
        .bids
        .submit_decision(OWNER, &bid.id, Decision::Reject)
        .await
        .unwrap();

    let reassembled = tender_market::Market::assemble(
        &fx.database,
        &tender_market::MarketConfig::default(),
    )
    .await
    .unwrap();
    assert!(reassembled.caches.tender_ids.exists(&tender.id));
    assert!(reassembled.caches.bid_ids.exists(&bid.id));
    assert_eq!(reassembled.caches.user_ids.len(), 4);
    assert_eq!(
        reassembled.bids.status(&bid.id).await.unwrap(),
        BidStatus::Rejected
    );
}
