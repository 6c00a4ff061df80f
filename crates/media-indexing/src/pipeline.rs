//! Sequential sweep driver.
//!
//! Runs every registered indexer's sweep on the calling thread: iterate,
//! handle, checkpoint, repeat. A checkpoint is written only after its batch
//! was handled, so a crash replays at most one batch. The worker pool in the
//! scheduler is the parallel counterpart.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use media_storage::Storage;

use crate::checkpoint::IndexCheckpoint;
use crate::error::IndexingError;
use crate::indexer::EntityIndexer;

/// Outcome of one sweep step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// A batch of this many ids was handled
    Handled(usize),
    /// The sweep has no more batches; its checkpoint was removed
    Exhausted,
}

/// Sweep progress of one indexer within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub batches: usize,
    pub processed: usize,
    /// Whether the sweep reached its end during this run
    pub completed: bool,
}

/// Result of a pipeline run.
#[derive(Debug, Default)]
pub struct ProcessResult {
    /// Results per indexer name
    pub by_indexer: HashMap<String, SweepResult>,
    /// Total ids handled across all indexers
    pub total_processed: usize,
}

impl ProcessResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every indexer finished its sweep.
    pub fn all_completed(&self) -> bool {
        self.by_indexer.values().all(|r| r.completed)
    }
}

/// Configuration for the sweep pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound of batches per indexer in one run
    pub max_batches: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batches: usize::MAX,
        }
    }
}

impl PipelineConfig {
    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.max_batches = max_batches.max(1);
        self
    }
}

/// Drives full sweeps of registered indexers with checkpointing.
pub struct IndexingPipeline {
    storage: Arc<Storage>,
    indexers: Vec<Arc<dyn EntityIndexer>>,
    checkpoints: HashMap<String, IndexCheckpoint>,
    config: PipelineConfig,
}

impl IndexingPipeline {
    pub fn new(storage: Arc<Storage>, config: PipelineConfig) -> Self {
        Self {
            storage,
            indexers: Vec::new(),
            checkpoints: HashMap::new(),
            config,
        }
    }

    pub fn add_indexer(&mut self, indexer: Arc<dyn EntityIndexer>) {
        self.indexers.push(indexer);
    }

    /// Load stored checkpoints of all registered indexers.
    pub fn load_checkpoints(&mut self) -> Result<(), IndexingError> {
        for indexer in &self.indexers {
            match IndexCheckpoint::load(&self.storage, indexer.name())? {
                Some(checkpoint) => {
                    info!(
                        indexer = %indexer.name(),
                        processed = checkpoint.processed_count,
                        "Resuming sweep from checkpoint"
                    );
                    self.checkpoints.insert(indexer.name().to_string(), checkpoint);
                }
                None => {
                    debug!(indexer = %indexer.name(), "No checkpoint, sweep starts fresh");
                }
            }
        }
        Ok(())
    }

    /// Run one sweep step of the named indexer.
    pub fn process_batch(&mut self, name: &str) -> Result<BatchOutcome, IndexingError> {
        let indexer = self
            .indexers
            .iter()
            .find(|i| i.name() == name)
            .cloned()
            .ok_or_else(|| IndexingError::UnknownIndexer(name.to_string()))?;

        let offset = self
            .checkpoints
            .get(name)
            .and_then(|checkpoint| checkpoint.offset.clone());

        let Some(message) = indexer.iterate(offset)? else {
            IndexCheckpoint::clear(&self.storage, name)?;
            if let Some(checkpoint) = self.checkpoints.remove(name) {
                info!(
                    indexer = %name,
                    processed = checkpoint.processed_count,
                    "Sweep complete"
                );
            }
            return Ok(BatchOutcome::Exhausted);
        };

        indexer.handle(&message)?;

        let count = message.ids().len();
        let checkpoint = self
            .checkpoints
            .entry(name.to_string())
            .or_insert_with(|| IndexCheckpoint::new(name));
        checkpoint.update(message.offset().cloned(), count as u64);
        checkpoint.save(&self.storage)?;

        debug!(indexer = %name, count = count, "Handled sweep batch");
        Ok(BatchOutcome::Handled(count))
    }

    /// Sweep every indexer until it is exhausted or `max_batches` is hit.
    pub fn process_until_caught_up(&mut self) -> Result<ProcessResult, IndexingError> {
        let names: Vec<String> = self.indexer_names().iter().map(|n| n.to_string()).collect();
        let mut result = ProcessResult::new();

        for name in names {
            let mut sweep = SweepResult::default();
            while sweep.batches < self.config.max_batches {
                match self.process_batch(&name)? {
                    BatchOutcome::Handled(count) => {
                        sweep.batches += 1;
                        sweep.processed += count;
                    }
                    BatchOutcome::Exhausted => {
                        sweep.completed = true;
                        break;
                    }
                }
            }
            if !sweep.completed {
                info!(indexer = %name, batches = sweep.batches, "Reached max batches");
            }
            result.total_processed += sweep.processed;
            result.by_indexer.insert(name, sweep);
        }

        Ok(result)
    }

    /// Drop the checkpoint of one indexer, or of all when `name` is `None`.
    pub fn reset(&mut self, name: Option<&str>) -> Result<usize, IndexingError> {
        let names: Vec<String> = match name {
            Some(name) => {
                if !self.indexers.iter().any(|i| i.name() == name) {
                    return Err(IndexingError::UnknownIndexer(name.to_string()));
                }
                vec![name.to_string()]
            }
            None => self.indexer_names().iter().map(|n| n.to_string()).collect(),
        };
        for name in &names {
            IndexCheckpoint::clear(&self.storage, name)?;
            self.checkpoints.remove(name);
        }
        info!(count = names.len(), "Reset sweep checkpoints");
        Ok(names.len())
    }

    pub fn get_checkpoint(&self, name: &str) -> Option<&IndexCheckpoint> {
        self.checkpoints.get(name)
    }

    pub fn indexer_names(&self) -> Vec<&str> {
        self.indexers.iter().map(|i| i.name()).collect()
    }

    pub fn indexer_count(&self) -> usize {
        self.indexers.len()
    }
}
