//! Asynchronous batch processing strategy
//!
//! Replays the command log in batches on a multi-threaded tokio runtime.
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     └── BatchProcessor (listing partitioning + tokio tasks)
//!         └── ReplayContext (shared in-memory backend)
//! ```
//!
//! Batches run one after another so a listing whose commands span several
//! batches is still replayed in log order. Within a batch, listings run in
//! parallel.

use crate::core::{BatchProcessor, ReplayReport};
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::write_balances_csv;
use crate::strategy::{load_context, ProcessingStrategy};
use crate::types::EngineConfig;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Configuration for batch processing
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of commands per batch
    pub batch_size: usize,
    /// Number of runtime worker threads
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig; zero values fall back to the defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                batch_size,
                default = default.batch_size,
                "invalid batch_size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                max_concurrent_batches,
                default = default.max_concurrent_batches,
                "invalid max_concurrent_batches, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Asynchronous batch processing strategy
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    batch: BatchConfig,
    config: EngineConfig,
}

impl AsyncProcessingStrategy {
    pub fn new(batch: BatchConfig, config: EngineConfig) -> Self {
        Self { batch, config }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    fn process(
        &self,
        listings_path: &Path,
        commands_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplayReport, String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.batch.max_concurrent_batches)
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let context = load_context(&self.config, listings_path)?;
            let processor = BatchProcessor::new(Arc::clone(&context));

            let file = tokio::fs::File::open(commands_path).await.map_err(|e| {
                format!("Failed to open file '{}': {}", commands_path.display(), e)
            })?;
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            loop {
                let batch = reader.read_batch(self.batch.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                let results = processor.process_batch(batch).await;
                let failed = results.iter().filter(|r| r.result.is_err()).count();
                debug!(commands = results.len(), failed, "batch replayed");
            }

            let report = context.report().map_err(|e| e.to_string())?;
            write_balances_csv(&report.balances, output)?;

            Ok(report)
        })
    }
}
