//! Synchronous CSV readers
//!
//! `SyncReader` streams command records from a CSV file one at a time;
//! `read_listings` loads the (small) listings file eagerly. Both delegate
//! format concerns to the csv_format module.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual record errors are yielded as `Err` items with their line number

use crate::io::csv_format::{
    convert_command_record, convert_listing_record, CommandCsvRecord, ListingCsvRecord,
};
use crate::types::{BookingError, CommandRecord, Listing};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

fn open(path: &Path) -> Result<csv::Reader<File>, BookingError> {
    let file = File::open(path).map_err(|e| BookingError::Io {
        message: format!("Failed to open file '{}': {}", path.display(), e),
    })?;

    Ok(ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .buffer_capacity(8 * 1024)
        .from_reader(file))
}

fn at_line(line: u64, error: BookingError) -> BookingError {
    BookingError::Parse {
        line: Some(line),
        message: error.to_string(),
    }
}

/// Streaming reader of command records
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: u64,
}

impl SyncReader {
    /// Open a command file
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Io` if the file cannot be opened.
    pub fn new(path: &Path) -> Result<Self, BookingError> {
        Ok(Self {
            reader: open(path)?,
            line_num: 1,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<CommandRecord, BookingError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CommandCsvRecord>();
        let item = deserializer.next()?;
        self.line_num += 1;

        Some(match item {
            Ok(record) => convert_command_record(record).map_err(|e| at_line(self.line_num, e)),
            Err(e) => Err(e.into()),
        })
    }
}

/// Load every listing of a listings file
///
/// # Errors
///
/// Returns `BookingError::Io` if the file cannot be opened, or the first
/// malformed row as `BookingError::Parse`.
pub fn read_listings(path: &Path) -> Result<Vec<Listing>, BookingError> {
    let mut reader = open(path)?;
    let mut listings = Vec::new();

    for (index, row) in reader.deserialize::<ListingCsvRecord>().enumerate() {
        let line = index as u64 + 2;
        let listing = convert_listing_record(row?).map_err(|e| at_line(line, e))?;
        listings.push(listing);
    }

    Ok(listings)
}
