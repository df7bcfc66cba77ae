pub mod endpoint;
pub mod engine;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod task;
