//! Processing strategy module for command replay
//!
//! This module defines the Strategy pattern for complete replay pipelines,
//! covering CSV parsing, engine processing and report output. Different
//! implementations (synchronous, asynchronous batch) can be selected at runtime.

use crate::cli::StrategyType;
use crate::core::ReplayContext;
use crate::core::ReplayReport;
use crate::io::read_listings;
use crate::types::EngineConfig;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for complete replay pipelines
pub trait ProcessingStrategy: Send + Sync {
    /// Replay a command log and write the owner balances to output
    ///
    /// # Arguments
    ///
    /// * `listings_path` - CSV file with the listings commands refer to
    /// * `commands_path` - CSV file with the command log
    /// * `output` - Writer receiving the `owner,balance` report
    ///
    /// # Returns
    ///
    /// * `Ok(ReplayReport)` with the final state, for the optional reports
    /// * `Err(String)` if a fatal error occurred (file not found, bad listings
    ///   file, output not writable)
    ///
    /// Individual command failures are logged and do not stop the replay.
    fn process(
        &self,
        listings_path: &Path,
        commands_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplayReport, String>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - Sync or Async
/// * `batch` - Optional batch configuration (ignored for sync)
/// * `engine` - Engine configuration shared by both strategies
pub fn create_strategy(
    strategy_type: StrategyType,
    batch: Option<BatchConfig>,
    engine: EngineConfig,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(engine)),
        StrategyType::Async => {
            let batch = batch.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(batch, engine))
        }
    }
}

/// Build a replay context and load the listings file into it
pub(crate) fn load_context(
    config: &EngineConfig,
    listings_path: &Path,
) -> Result<Arc<ReplayContext>, String> {
    let context = ReplayContext::new(config.clone()).map_err(|e| e.to_string())?;
    let listings = read_listings(listings_path).map_err(|e| e.to_string())?;
    let loaded = context.load_listings(listings);
    info!(listings = loaded, "listings loaded");
    Ok(Arc::new(context))
}
