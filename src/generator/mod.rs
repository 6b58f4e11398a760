pub mod agent_executor;
pub mod context;
pub mod outlet;
pub mod outline;
pub mod research;
pub mod workflow;
pub mod writing;
