//! Pipeline assembly for era-blocks.
//!
//! Chains pre- and post-processors into an instrumented [`Pipeline`],
//! either programmatically or from a JSON [`PipelineConfig`].

pub mod config;
pub mod pipeline;
pub mod telemetry;

pub use config::{PipelineConfig, StageConfig};
pub use pipeline::Pipeline;
