//! Ordered chain of instrumented processors.

use std::sync::Arc;
use std::time::Instant;

use blocks_core::{Dataset, Instrumented, ObservabilitySink, Processor, Result, TracingSink};

/// Runs processors in order, feeding each stage's output to the next.
///
/// Every stage is wrapped in [`Instrumented`] when added, so all stages
/// report to the pipeline's sink and errors carry the failing stage name.
pub struct Pipeline {
    stages: Vec<Box<dyn Processor>>,
    sink: Arc<dyn ObservabilitySink>,
}

impl Pipeline {
    /// Empty pipeline reporting through `tracing`.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    /// Empty pipeline reporting to `sink`.
    pub fn with_sink(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            stages: Vec::new(),
            sink,
        }
    }

    /// Append a stage.
    pub fn add_stage<P: Processor + 'static>(mut self, processor: P) -> Self {
        self.push(Box::new(processor));
        self
    }

    /// Append an already boxed stage.
    pub fn push(&mut self, processor: Box<dyn Processor>) {
        let stage = Instrumented::with_sink(processor, Arc::clone(&self.sink));
        self.stages.push(Box::new(stage));
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run all stages. Stops at the first failing stage.
    pub fn run(&self, dataset: &Dataset) -> Result<Dataset> {
        let start = Instant::now();
        let mut current = dataset.clone();
        for stage in &self.stages {
            current = stage.transform(&current)?;
        }
        tracing::info!(
            stages = self.stages.len(),
            rows = current.n_rows(),
            cols = current.n_cols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        Ok(current)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Pipeline {
    fn name(&self) -> &str {
        "Pipeline"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.run(dataset)
    }
}
