pub mod config;
pub mod errors;
pub mod executor;
pub mod observability;
pub mod orchestrator;
pub mod phase;
pub mod predict;
pub mod scheduler;
pub mod scorer;
pub mod store;
pub mod triggers;
