//! ratefeed Node
//!
//! Configuration and wiring for the `ratefeed` binary.

pub mod config;
pub mod pipeline;

pub use config::NodeConfig;
pub use pipeline::Pipeline;
