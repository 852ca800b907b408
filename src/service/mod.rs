// Business-facing entry points
// Authorization rules layered over the stores and the decision workflow

pub mod bid;
pub mod tender;

pub use bid::BidService;
pub use tender::TenderService;
