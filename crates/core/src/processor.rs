//! Processor contract and stage instrumentation.
//!
//! A processor reads a [`Dataset`] and returns a new one. Timing and shape
//! reporting is layered on by wrapping a processor in [`Instrumented`], so
//! individual processors never deal with it.

use crate::dataset::Dataset;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single pipeline stage.
pub trait Processor: Send + Sync {
    /// Stage name used in reports and error context.
    fn name(&self) -> &str;

    /// Transform a dataset into a new one.
    ///
    /// The input is never modified; unrelated columns and metadata are
    /// carried forward into the output.
    fn transform(&self, dataset: &Dataset) -> Result<Dataset>;
}

impl<P: Processor + ?Sized> Processor for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        (**self).transform(dataset)
    }
}

/// Outcome of one instrumented stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    /// Stage name.
    pub stage: String,
    /// Output row count.
    pub rows: usize,
    /// Output column count.
    pub cols: usize,
    /// Wall-clock duration of the transform.
    pub elapsed: Duration,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
}

/// Receiver of stage reports.
pub trait ObservabilitySink: Send + Sync {
    /// Record a finished stage.
    fn report(&self, report: &StageReport);
}

/// Sink that emits one `tracing` event per stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn report(&self, report: &StageReport) {
        tracing::info!(
            stage = %report.stage,
            rows = report.rows,
            cols = report.cols,
            elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
            "finished step"
        );
    }
}

/// Wraps a processor with timing, shape reporting and error context.
pub struct Instrumented<P> {
    inner: P,
    sink: Arc<dyn ObservabilitySink>,
}

impl<P: Processor> Instrumented<P> {
    /// Wrap a processor, reporting to `tracing`.
    pub fn new(inner: P) -> Self {
        Self::with_sink(inner, Arc::new(TracingSink))
    }

    /// Wrap a processor with an explicit sink.
    pub fn with_sink(inner: P, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self { inner, sink }
    }

    /// The wrapped processor.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: Processor> Processor for Instrumented<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let started_at = Utc::now();
        let tic = Instant::now();

        let result = self.inner.transform(dataset);
        let elapsed = tic.elapsed();

        match result {
            Ok(output) => {
                let (rows, cols) = output.shape();
                self.sink.report(&StageReport {
                    stage: self.name().to_string(),
                    rows,
                    cols,
                    elapsed,
                    started_at,
                });
                Ok(output)
            }
            Err(err) => {
                tracing::warn!(stage = %self.name(), error = %err, "step failed");
                Err(err.in_stage(self.name()))
            }
        }
    }
}

type TransformFn = dyn Fn(&Dataset) -> Result<Dataset> + Send + Sync;

/// Turns a closure into a named processor.
///
/// The input's metadata is restored on the output, so closures that rebuild
/// the table from scratch still carry era column and version forward.
pub struct FnProcessor {
    name: String,
    func: Box<TransformFn>,
}

impl FnProcessor {
    /// Create a processor from a closure.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Dataset) -> Result<Dataset> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl Processor for FnProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let output = (self.func)(dataset)?;
        Ok(output.with_meta(dataset.meta().clone()))
    }
}
