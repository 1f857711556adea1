//! Core types for the era-blocks processing pipeline.
//!
//! This crate provides what every processor crate builds on:
//! - The in-memory `Dataset` and its derived column sets
//! - The `Processor` contract and stage instrumentation
//! - Cross-sectional statistics (ranks, gaussianization, moments)
//! - Common error types and defaults

pub mod config;
pub mod dataset;
pub mod error;
pub mod processor;
pub mod stats;

pub use dataset::{Dataset, Group, Metadata, Series};
pub use error::{Error, ErrorKind, Result};
pub use processor::{FnProcessor, Instrumented, ObservabilitySink, Processor, StageReport, TracingSink};
