// src/pipeline/scheduler.rs

//! Long-running bot: fetch loop, command loop and health endpoint.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::deliver::Notifier;
use crate::pipeline::{FilterChain, Watcher};
use crate::services::{
    CommandHandler, CommuteEstimator, DistanceMatrixEstimator, TelegramClient, WgGesuchtSource,
};
use crate::state::{BotState, FilterSettings, RuntimeConfig};
use crate::storage::{SeenSetStore, SeenStore};
use crate::utils::http;

/// Everything the loops need, built from a validated config.
pub struct Bot {
    pub watcher: Watcher,
    pub telegram: TelegramClient,
    pub state: Arc<BotState>,
}

/// Wire the source, filters and notifier for `config`.
pub fn build(config: &Config) -> Result<Bot> {
    let client = http::create_async_client(&config.crawler)?;

    let source = WgGesuchtSource::new(client.clone(), &config.source, &config.crawler)?;
    let telegram = TelegramClient::new(client.clone(), &config.telegram);
    let chain = FilterChain::from_config(&config.filter)?;

    let commute: Option<Arc<dyn CommuteEstimator>> =
        if config.filter.commute_range_enabled() && config.commute.api_key.is_some() {
            Some(Arc::new(DistanceMatrixEstimator::new(client, &config.commute)?))
        } else {
            None
        };

    let notifier = Notifier::new(
        Arc::new(telegram.clone()),
        config.telegram.chat_ids.clone(),
        config.message.clone(),
    );
    let state = Arc::new(BotState::new(RuntimeConfig::new(FilterSettings::from(
        &config.filter,
    ))));

    Ok(Bot {
        watcher: Watcher::new(Arc::new(source), chain, commute, notifier),
        telegram,
        state,
    })
}

/// Run a cycle immediately, then once per `interval`.
pub async fn offers_loop(
    watcher: Watcher,
    state: Arc<BotState>,
    mut seen: SeenSetStore,
    interval: Duration,
) {
    loop {
        if let Err(e) = watcher.run_cycle(&state, &mut seen).await {
            log::error!("Fetch cycle failed: {}", e);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Poll for operator commands every `interval`.
pub async fn commands_loop(mut handler: CommandHandler, telegram: TelegramClient, interval: Duration) {
    loop {
        if let Err(e) = handler.poll(&telegram).await {
            log::warn!("Command poll failed: {}", e);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Start the bot and block until shutdown.
pub async fn run_bot(config: Config) -> Result<()> {
    config.validate()?;
    let Bot {
        watcher,
        telegram,
        state,
    } = build(&config)?;

    let seen = SeenSetStore::load(&config.storage.seen_file).await;
    state.set_seen_count(seen.len());

    let handler = CommandHandler::new(
        watcher.clone(),
        Arc::clone(&state),
        config.schedule.clone(),
        config.telegram.chat_ids.clone(),
    );
    handler.announce().await;

    let check_interval = Duration::from_secs(config.schedule.check_interval_secs);
    let poll_interval = Duration::from_secs(config.schedule.command_poll_secs);

    let offers = tokio::spawn(offers_loop(watcher, Arc::clone(&state), seen, check_interval));
    let commands = tokio::spawn(commands_loop(handler, telegram, poll_interval));

    let result = wait_for_shutdown(&config, Arc::clone(&state)).await;
    log::info!("Shutting down");
    offers.abort();
    commands.abort();
    result
}

/// Serve the health endpoint until Ctrl-C. A bind failure is returned.
#[cfg(feature = "server")]
async fn wait_for_shutdown(config: &Config, state: Arc<BotState>) -> Result<()> {
    if !config.server.enabled {
        return Ok(tokio::signal::ctrl_c().await?);
    }
    tokio::select! {
        result = crate::server::serve(&config.server, state) => result,
        signal = tokio::signal::ctrl_c() => Ok(signal?),
    }
}

#[cfg(not(feature = "server"))]
async fn wait_for_shutdown(_config: &Config, _state: Arc<BotState>) -> Result<()> {
    Ok(tokio::signal::ctrl_c().await?)
}
