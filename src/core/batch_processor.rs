//! Batch processing with listing-based partitioning for async replay
//!
//! This module provides the `BatchProcessor` struct, which replays batches of
//! commands concurrently while keeping the commands of each listing in order.
//!
//! # Design
//!
//! Every command touches exactly one listing, and every reservation and
//! payment hangs off one listing. Partitioning a batch by listing therefore
//! lets unrelated listings proceed in parallel while the lifecycle of each
//! reservation is replayed in log order.
//!
//! ```text
//! BatchProcessor
//!     └── Arc<ReplayContext>   (shared backend and aliases)
//!           └── Replayer per partition (own clock, shared state)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::replay::ReplayContext;
use crate::types::{BookingError, CommandRecord, ListingId};
use tracing::{error, warn};

/// Result of replaying a single command
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The command that was replayed
    pub record: CommandRecord,

    /// The result of replaying it (success or error)
    pub result: Result<(), BookingError>,
}

/// Batch processor with listing-based partitioning
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    context: Arc<ReplayContext>,
}

impl BatchProcessor {
    /// Create a new BatchProcessor
    ///
    /// # Arguments
    ///
    /// * `context` - Replay state shared by every partition
    pub fn new(context: Arc<ReplayContext>) -> Self {
        Self { context }
    }

    /// Partition a batch of commands by listing
    ///
    /// # Guarantees
    ///
    /// - Each command appears in exactly one sub-batch
    /// - Commands for each listing keep their original order
    pub fn partition_by_listing(
        &self,
        batch: Vec<CommandRecord>,
    ) -> HashMap<ListingId, Vec<CommandRecord>> {
        let mut listing_batches: HashMap<ListingId, Vec<CommandRecord>> = HashMap::new();

        for record in batch {
            listing_batches
                .entry(record.listing.clone())
                .or_default()
                .push(record);
        }

        listing_batches
    }

    /// Replay the commands of one listing sequentially
    ///
    /// Every command is attempted; failures are logged and captured in the
    /// results, which keep the input order.
    pub async fn process_listing_commands(
        &self,
        commands: Vec<CommandRecord>,
    ) -> Vec<ProcessingResult> {
        let replayer = match self.context.replayer() {
            Ok(replayer) => replayer,
            Err(e) => {
                error!(error = %e, "could not start replayer");
                return commands
                    .into_iter()
                    .map(|record| ProcessingResult {
                        record,
                        result: Err(e.clone()),
                    })
                    .collect();
            }
        };

        let mut results = Vec::with_capacity(commands.len());
        for record in commands {
            let result = replayer.apply(&record);
            if let Err(e) = &result {
                warn!(
                    command = %record.kind,
                    listing = %record.listing,
                    alias = %record.reservation,
                    error = %e,
                    "command failed"
                );
            }
            results.push(ProcessingResult { record, result });
        }

        results
    }

    /// Replay a batch with listing-based partitioning
    ///
    /// Partitions run as concurrent tokio tasks; the call returns once all
    /// of them finished. Results of different listings may interleave.
    pub async fn process_batch(&self, batch: Vec<CommandRecord>) -> Vec<ProcessingResult> {
        let listing_batches = self.partition_by_listing(batch);

        let mut tasks = Vec::new();
        for (_listing, commands) in listing_batches {
            let processor = self.clone();
            let task =
                tokio::spawn(async move { processor.process_listing_commands(commands).await });
            tasks.push(task);
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(listing_results) => results.extend(listing_results),
                Err(e) => error!(error = %e, "replay task panicked"),
            }
        }

        results
    }
}
