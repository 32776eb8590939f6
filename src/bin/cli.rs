//! wg-watch CLI
//!
//! Local and container entry point for the listing watcher.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wg_watch::{
    error::Result,
    models::Config,
    pipeline::{self, scheduler},
    storage::{SeenSetStore, SeenStore},
};

/// wg-watch - WG-Gesucht listing notifications over Telegram
#[derive(Parser, Debug)]
#[command(
    name = "wg-watch",
    version,
    about = "Watches housing listings and notifies Telegram chats"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the bot: fetch loop, command loop and health endpoint
    Run,

    /// Fetch once and print matching listings as JSON
    Fetch {
        /// Print every parsed listing, ignoring filters
        #[arg(long)]
        all: bool,
    },

    /// Validate the configuration
    Validate,

    /// Show seen-set info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    config.apply_env();
    log::debug!("Configuration loaded from {}", cli.config.display());

    match cli.command {
        Command::Run => {
            log::info!("wg-watch starting...");
            pipeline::run_bot(config).await?;
        }

        Command::Fetch { all } => {
            let bot = scheduler::build(&config)?;
            let listings = if all {
                bot.watcher.fetch_all().await?
            } else {
                let settings = bot.state.config.snapshot();
                let matches = bot.watcher.collect(&settings).await?;
                log::info!(
                    "{} of {} listings match (≤ €{})",
                    matches.listings.len(),
                    matches.fetched,
                    settings.max_price
                );
                matches.listings
            };
            println!("{}", serde_json::to_string_pretty(&listings)?);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} search URLs, {} chats, ceiling €{})",
                config.source.search_urls.len(),
                config.telegram.chat_ids.len(),
                config.filter.max_price
            );
        }

        Command::Info => {
            let path = &config.storage.seen_file;
            log::info!("Seen file: {}", path.display());
            if path.exists() {
                let seen = SeenSetStore::load(path).await;
                log::info!("Seen listings: {}", seen.len());
            } else {
                log::info!("No seen file yet.");
            }
        }
    }

    Ok(())
}
