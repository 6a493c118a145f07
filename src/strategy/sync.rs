//! Synchronous processing strategy
//!
//! Replays the command log on the calling thread, one command at a time,
//! with a single replayer. Commands are streamed from the file; memory use
//! grows with the number of reservations, not with the length of the log.

use crate::core::ReplayReport;
use crate::io::csv_format::write_balances_csv;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{load_context, ProcessingStrategy};
use crate::types::EngineConfig;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Synchronous processing strategy
#[derive(Debug, Clone)]
pub struct SyncProcessingStrategy {
    config: EngineConfig,
}

impl SyncProcessingStrategy {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(
        &self,
        listings_path: &Path,
        commands_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplayReport, String> {
        let context = load_context(&self.config, listings_path)?;
        let replayer = context.replayer().map_err(|e| e.to_string())?;
        let reader = SyncReader::new(commands_path).map_err(|e| e.to_string())?;

        for result in reader {
            match result {
                Ok(command) => {
                    if let Err(e) = replayer.apply(&command) {
                        warn!(
                            command = %command.kind,
                            alias = %command.reservation,
                            error = %e,
                            "command failed"
                        );
                    }
                }
                Err(e) => warn!(error = %e, "skipping command row"),
            }
        }

        let report = context.report().map_err(|e| e.to_string())?;
        write_balances_csv(&report.balances, output)?;

        Ok(report)
    }
}
