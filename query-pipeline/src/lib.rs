pub mod context;
pub mod generator;
pub mod log_store;
pub mod orchestrator;
