//! Compression Pipeline and Engine: folds older messages into checkpoints
//! when the Context Manager's threshold policy decides the Active Context
//! has grown too large.

pub mod engine;
pub mod pipeline;

pub use engine::{estimate_compression, recommend_strategy, CompressionEstimate, Strategy, StrategyParams};
pub use pipeline::{run, PipelineOutcome, ProgressCallback, ProgressEvent, Stage};
