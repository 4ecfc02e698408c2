//! ratefeed Binary
//!
//! Keeps a multi-currency rate table fresh and converts amounts with it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ratefeed_common::CurrencyCode;
use ratefeed_fx::{FeedFormat, FeedParser, ManualRefresh};
use rust_decimal::Decimal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratefeed_node::{NodeConfig, Pipeline};

/// ratefeed CLI
#[derive(Parser, Debug)]
#[command(name = "ratefeed")]
#[command(about = "Multi-currency exchange rate acquisition and conversion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep the rate table fresh until Ctrl+C
    Run,
    /// Refresh once and print the table
    Refresh,
    /// Refresh once and convert an amount
    Convert {
        amount: Decimal,
        from: String,
        to: String,
    },
    /// Parse a saved feed file and print the rows as JSON
    Parse {
        file: PathBuf,
        /// Decimal separator used in the file
        #[arg(long, default_value = ",")]
        separator: char,
    },
}

fn init_logging(default_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = NodeConfig::from_env();
    init_logging(&config.log_level, matches!(cli.command, Command::Run));

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    match cli.command {
        Command::Run => run(config).await,
        Command::Refresh => {
            let pipeline = Pipeline::build(config)?;
            let refresh = pipeline.refresh_once().await;
            print_notice(&refresh);

            let current = pipeline.cache().current();
            let table = current.table();
            println!(
                "{} rates as of {} (source: {})",
                table.len(),
                table.snapshot_date(),
                table.source()
            );
            for rate in table.iter() {
                println!(
                    "{:<4} {:>12} {:>12}",
                    rate.currency_code,
                    display(rate.forex_buying),
                    display(rate.forex_selling)
                );
            }
            Ok(())
        }
        Command::Convert { amount, from, to } => {
            let from: CurrencyCode = from.parse()?;
            let to: CurrencyCode = to.parse()?;

            let pipeline = Pipeline::build(config)?;
            let refresh = pipeline.refresh_once().await;
            print_notice(&refresh);

            let engine = pipeline.engine();
            let converted = engine.convert_and_format(amount, &from, &to)?;
            println!("{} = {}", engine.format(amount, &from), converted);
            Ok(())
        }
        Command::Parse { file, separator } => {
            let payload = tokio::fs::read(&file).await?;
            let parser = FeedParser::new(FeedFormat {
                decimal_separator: separator,
                ..FeedFormat::default()
            });
            let rates = parser.parse(&payload)?;
            println!("{}", serde_json::to_string_pretty(&rates)?);
            Ok(())
        }
    }
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    info!(
        feed_url = %config.feed.url,
        aggregator_url = %config.aggregator.url,
        poll_interval_secs = config.scheduler.poll_interval.as_secs(),
        "Starting ratefeed"
    );

    let pipeline = Pipeline::build(config)?;
    if let Err(e) = pipeline.prepare_store().await {
        error!(error = %e, "Could not prepare rate store schema");
    }

    let handle = pipeline.start().await;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    handle.stop().await;
    pipeline.finish_warmups().await;

    info!("ratefeed shutdown complete");
    Ok(())
}

fn print_notice(refresh: &ManualRefresh) {
    if let Some(notice) = refresh.degraded_notice() {
        eprintln!("warning: {}", notice);
    }
}

fn display(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
