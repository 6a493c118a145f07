//! Rental Booking Engine CLI
//!
//! Replays a log of booking, payment, webhook, accept, reject and cancel
//! commands against a fresh in-memory engine.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --listings listings.csv commands.csv > balances.csv
//! cargo run -- --strategy sync --listings listings.csv commands.csv
//! cargo run -- --listings listings.csv --reservations-out reservations.csv \
//!     --payments-out payments.csv commands.csv
//! ```
//!
//! Owner balances go to stdout as CSV; logs go to stderr (`RUST_LOG`
//! controls the level, default `info`).
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not writable, etc.)

use rental_booking_engine::cli;
use rental_booking_engine::io::{write_payments_csv, write_reservations_csv};
use rental_booking_engine::strategy;
use std::fs::File;
use std::path::Path;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn write_report(
    path: &Path,
    write: impl FnOnce(&mut dyn std::io::Write) -> Result<(), String>,
) -> Result<(), String> {
    let mut file = File::create(path)
        .map_err(|e| format!("Failed to create '{}': {}", path.display(), e))?;
    write(&mut file)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();

    let strategy = {
        let batch = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy.clone(), batch, args.to_engine_config())
    };

    let mut output = std::io::stdout();
    let report = match strategy.process(&args.listings_file, &args.commands_file, &mut output) {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if let Some(path) = &args.reservations_out {
        if let Err(e) = write_report(path, |out| write_reservations_csv(&report.reservations, out)) {
            error!("{}", e);
            process::exit(1);
        }
    }
    if let Some(path) = &args.payments_out {
        if let Err(e) = write_report(path, |out| write_payments_csv(&report.payments, out)) {
            error!("{}", e);
            process::exit(1);
        }
    }
}
