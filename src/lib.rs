pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod llm;
pub mod sink;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tools;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::PipelineError;
pub use generator::workflow::{LaunchRequest, launch};
