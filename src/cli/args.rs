use crate::strategy::BatchConfig;
use crate::types::EngineConfig;
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rental-booking-engine")]
#[command(about = "Replay rental reservation and payment commands", long_about = None)]
pub struct CliArgs {
    #[arg(value_name = "COMMANDS", help = "Path to the command log CSV file")]
    pub commands_file: PathBuf,

    #[arg(
        long = "listings",
        value_name = "FILE",
        help = "Path to the listings CSV file"
    )]
    pub listings_file: PathBuf,

    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Replay strategy: 'sync' for sequential or 'async' for listing-parallel"
    )]
    pub strategy: StrategyType,

    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of commands per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Number of worker threads (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    #[arg(
        long = "webhook-secret",
        value_name = "SECRET",
        env = "WEBHOOK_SECRET",
        default_value = "whsec_replay",
        hide_env_values = true,
        help = "Shared secret used to sign and verify processor events"
    )]
    pub webhook_secret: String,

    #[arg(
        long = "fixed-fee",
        value_name = "AMOUNT",
        help = "Fixed processor fee per charge (default: 6.29)"
    )]
    pub fixed_fee: Option<Decimal>,

    #[arg(
        long = "fee-percent",
        value_name = "PERCENT",
        help = "Percentage processor fee per charge (default: 2.9)"
    )]
    pub fee_percent: Option<Decimal>,

    #[arg(
        long = "utc-offset-hours",
        value_name = "HOURS",
        allow_negative_numbers = true,
        help = "Offset of the reference timezone from UTC (default: 3)"
    )]
    pub utc_offset_hours: Option<i32>,

    #[arg(
        long = "reservations-out",
        value_name = "FILE",
        help = "Write the reservation report to this file"
    )]
    pub reservations_out: Option<PathBuf>,

    #[arg(
        long = "payments-out",
        value_name = "FILE",
        help = "Write the payment report to this file"
    )]
    pub payments_out: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Engine configuration with command-line overrides applied
    pub fn to_engine_config(&self) -> EngineConfig {
        let default = EngineConfig::default();
        EngineConfig {
            fixed_fee: self.fixed_fee.unwrap_or(default.fixed_fee),
            fee_percent: self.fee_percent.unwrap_or(default.fee_percent),
            utc_offset_hours: self.utc_offset_hours.unwrap_or(default.utc_offset_hours),
            webhook_secret: self.webhook_secret.clone(),
            ..default
        }
    }
}
