//! CSV format handling for replay input and reports
//!
//! This module centralizes all CSV format concerns, providing:
//! - `ListingCsvRecord` / `CommandCsvRecord` structures for deserialization
//! - Conversion from CSV records to domain types
//! - Balance, reservation and payment report serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{
    BookingError, CommandKind, CommandRecord, CommissionPolicy, Listing, OwnerBalance,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::str::FromStr;

/// Listing row: `listing,owner,title,period,price,min_day,commission`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ListingCsvRecord {
    pub listing: String,
    pub owner: String,
    #[serde(default)]
    pub title: Option<String>,
    pub period: String,
    pub price: String,
    #[serde(default)]
    pub min_day: Option<String>,
    #[serde(default)]
    pub commission: Option<String>,
}

/// Command row: `at,command,listing,reservation,user,start,end,identity,event,installment`
///
/// Columns that a command does not use may be left empty.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommandCsvRecord {
    pub at: String,
    pub command: String,
    pub listing: String,
    pub reservation: String,
    pub user: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub installment: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: &str, column: &str) -> Result<String, BookingError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BookingError::validation(format!("column '{}' is required", column)));
    }
    Ok(value.to_string())
}

fn parse_date(value: Option<String>, column: &str) -> Result<Option<NaiveDate>, BookingError> {
    non_empty(value)
        .map(|v| {
            NaiveDate::parse_from_str(&v, "%Y-%m-%d").map_err(|_| {
                BookingError::validation(format!("invalid {} date '{}', expected YYYY-MM-DD", column, v))
            })
        })
        .transpose()
}

/// Convert a listing row into a `Listing`
///
/// # Errors
///
/// Returns `BookingError::Validation` for a missing id or owner, an unknown
/// period or commission policy, or an unparseable number.
pub fn convert_listing_record(record: ListingCsvRecord) -> Result<Listing, BookingError> {
    let id = required(&record.listing, "listing")?;
    let owner = required(&record.owner, "owner")?;
    let rent_period = record.period.parse()?;

    let unit_price = Decimal::from_str(record.price.trim()).map_err(|_| {
        BookingError::validation(format!("invalid price '{}' for listing {}", record.price, id))
    })?;

    let min_day = match non_empty(record.min_day) {
        Some(v) => v.parse::<i64>().map_err(|_| {
            BookingError::validation(format!("invalid min_day '{}' for listing {}", v, id))
        })?,
        None => 0,
    };

    let commission = match non_empty(record.commission) {
        Some(v) => v.parse()?,
        None => CommissionPolicy::None,
    };

    Ok(Listing {
        title: non_empty(record.title).unwrap_or_else(|| id.clone()),
        id,
        owner,
        rent_period,
        unit_price,
        min_day,
        commission,
    })
}

/// Convert a command row into a `CommandRecord`
///
/// # Errors
///
/// Returns `BookingError::Validation` for a bad timestamp, command, date or
/// installment index, or when a command is missing a column it needs
/// (`book` needs dates and an identity number, `webhook` needs an event).
pub fn convert_command_record(record: CommandCsvRecord) -> Result<CommandRecord, BookingError> {
    let at = DateTime::parse_from_rfc3339(record.at.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            BookingError::validation(format!("invalid timestamp '{}', expected RFC 3339", record.at))
        })?;
    let kind: CommandKind = record.command.parse()?;

    let installment = match non_empty(record.installment) {
        Some(v) => v.parse::<usize>().map_err(|_| {
            BookingError::validation(format!("invalid installment '{}'", v))
        })?,
        None => 0,
    };

    let command = CommandRecord {
        at,
        kind,
        listing: required(&record.listing, "listing")?,
        reservation: required(&record.reservation, "reservation")?,
        user: required(&record.user, "user")?,
        start: parse_date(record.start, "start")?,
        end: parse_date(record.end, "end")?,
        identity: non_empty(record.identity),
        event: non_empty(record.event),
        installment,
    };

    match kind {
        CommandKind::Book
            if command.start.is_none() || command.end.is_none() || command.identity.is_none() =>
        {
            Err(BookingError::validation(
                "book requires start, end and identity",
            ))
        }
        CommandKind::Webhook if command.event.is_none() => {
            Err(BookingError::validation("webhook requires an event type"))
        }
        _ => Ok(command),
    }
}

/// Reservation report row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationRow {
    pub reservation: String,
    pub id: String,
    pub listing: String,
    pub renter: String,
    pub period: String,
    pub start: String,
    pub end: String,
    pub total_price: String,
    pub status: String,
}

/// Payment report row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRow {
    pub reservation: String,
    pub installment: usize,
    pub id: String,
    pub start: String,
    pub end: String,
    pub amount: String,
    pub amount_gross: String,
    pub status: String,
    pub first: bool,
}

/// Money column, always two fractional digits
pub fn format_money(value: Decimal) -> String {
    format!("{:.2}", value)
}

/// Write owner balances as `owner,balance`, ordered by owner
///
/// # Errors
///
/// Returns a description of the write failure.
pub fn write_balances_csv(balances: &[OwnerBalance], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["owner", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = balances.to_vec();
    sorted.sort_by(|a, b| a.owner.cmp(&b.owner));

    for balance in sorted {
        writer
            .write_record([balance.owner.as_str(), format_money(balance.balance).as_str()])
            .map_err(|e| format!("Failed to write balance record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))
}

fn write_rows<T: Serialize>(rows: &[T], output: &mut dyn Write, what: &str) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| format!("Failed to write {} record: {}", what, e))?;
    }
    writer
        .flush()
        .map_err(|e| format!("Failed to flush {} report: {}", what, e))
}

/// Write the reservation report
pub fn write_reservations_csv(rows: &[ReservationRow], output: &mut dyn Write) -> Result<(), String> {
    write_rows(rows, output, "reservation")
}

/// Write the payment report
pub fn write_payments_csv(rows: &[PaymentRow], output: &mut dyn Write) -> Result<(), String> {
    write_rows(rows, output, "payment")
}
