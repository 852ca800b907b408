// Workflow orchestration modules
// Cross-entity transitions that must commit or roll back as one unit

pub mod decision;

pub use decision::DecisionWorkflow;
