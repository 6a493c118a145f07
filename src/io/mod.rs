//! I/O module
//!
//! Handles CSV parsing of the replay inputs and the report output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, report serialization)
//! - `sync_reader` - Synchronous command reader with iterator interface, listings loader
//! - `async_reader` - Asynchronous command reader with batch reading interface

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use csv_format::{
    convert_command_record, convert_listing_record, write_balances_csv, write_payments_csv,
    write_reservations_csv, CommandCsvRecord, ListingCsvRecord, PaymentRow, ReservationRow,
};
pub use sync_reader::{read_listings, SyncReader};
