// Tender Market Library - tender/bid marketplace core
// Exposes the stores, workflows and services for the binary and tests

pub mod cache;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod market;
pub mod model;
pub mod observability;
pub mod relationships;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod transaction;
pub mod workflows;

// Re-export key types for easy access
pub use cache::{Caches, ExistenceCache, LookupCache};
pub use clock::{Clock, SystemClock};
pub use config::{config, MarketConfig};
pub use database::{Database, DbHandle, TxHandle};
pub use error::{EntityKind, MarketError, Result};
pub use market::Market;
pub use model::{
    AuthorType, Bid, BidContent, BidStatus, ContentVersion, Decision, Feedback, NewBid,
    OrganizationType, Page, ServiceType, Tender, TenderContent, TenderStatus,
};
pub use observability::{create_workflow_span, CacheStats, OperationTimer};
pub use relationships::RelationshipQueries;
pub use service::{BidService, TenderService};
pub use store::{
    BidStore, FeedbackStore, OrganizationStore, TenderStore, UserStore, Versioned, VersionedStore,
};
pub use telemetry::{generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use transaction::{DecisionTx, TxManager};
pub use workflows::DecisionWorkflow;
