//! Asynchronous CSV reader with batch interface
//!
//! Reads command records in batches for the async replay strategy.
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of CommandRecords
//!                  ↓
//!           csv_format module
//!           (CommandCsvRecord, convert_command_record)
//! ```
//!
//! Rows that fail to parse are logged and skipped.

use crate::io::csv_format::{convert_command_record, CommandCsvRecord};
use crate::types::CommandRecord;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader }
    }

    /// Read up to `batch_size` valid commands
    ///
    /// An empty batch means the end of the input.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<CommandRecord> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CommandCsvRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(csv_record)) => match convert_command_record(csv_record) {
                    Ok(command) => batch.push(command),
                    Err(e) => warn!(error = %e, "skipping command row"),
                },
                Some(Err(e)) => warn!(error = %e, "CSV parse error"),
                None => break,
            }
        }

        batch
    }
}
