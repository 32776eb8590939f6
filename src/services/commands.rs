// src/services/commands.rs

//! Operator commands received over Telegram.
//!
//! The handler is the only writer of the runtime price ceiling.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::models::ScheduleConfig;
use crate::pipeline::Watcher;
use crate::services::telegram::{TelegramClient, Update};
use crate::state::BotState;

/// Maximum number of listings sent in reply to `/all`.
pub const DUMP_LIMIT: usize = 10;

const HELP_TEXT: &str = "🤖 Commands:\n\
    /all — show current listings matching the filters (up to 10)\n\
    /setprice N — set the price ceiling, e.g. /setprice 900\n\
    /status — show current settings\n\
    /debug — show how many listings were parsed\n\
    /help — this list";

const SETPRICE_USAGE: &str = "Give a number, e.g. /setprice 900";

/// A recognized operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    /// `None` when the argument is missing or not a number
    SetPrice(Option<u32>),
    All,
    Debug,
    Unknown(String),
}

impl Command {
    /// Parse a message; returns None for text that is not a command.
    ///
    /// Matching is case-insensitive and tolerates a `@botname` suffix.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let mut parts = text.split_whitespace();
        let head = parts.next()?.to_lowercase();
        let name = head.split('@').next().unwrap_or_default();

        Some(match name {
            "/help" | "/start" => Command::Help,
            "/status" => Command::Status,
            "/setprice" => Command::SetPrice(parts.next().and_then(leading_number)),
            "/all" => Command::All,
            "/debug" => Command::Debug,
            _ => Command::Unknown(name.to_string()),
        })
    }
}

/// Leading digits of a command argument, e.g. `900` from `900€`.
fn leading_number(arg: &str) -> Option<u32> {
    let end = arg
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(arg.len());
    arg[..end].parse().ok()
}

/// Executes commands from authorized chats and tracks the update offset.
pub struct CommandHandler {
    watcher: Watcher,
    state: Arc<BotState>,
    schedule: ScheduleConfig,
    allowed_chats: HashSet<String>,
    last_update_id: Option<i64>,
}

impl CommandHandler {
    pub fn new(
        watcher: Watcher,
        state: Arc<BotState>,
        schedule: ScheduleConfig,
        allowed_chats: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            watcher,
            state,
            schedule,
            allowed_chats: allowed_chats.into_iter().collect(),
            last_update_id: None,
        }
    }

    /// Highest update id processed so far.
    pub fn last_update_id(&self) -> Option<i64> {
        self.last_update_id
    }

    /// Tell every destination the bot is up.
    pub async fn announce(&self) {
        let text = format!(
            "🔔 wg-watch started (ceiling ≤ €{}). Send /help for commands.",
            self.state.config.max_price()
        );
        self.watcher.notifier().broadcast(&text).await;
    }

    /// Fetch pending updates once and handle them.
    pub async fn poll(&mut self, telegram: &TelegramClient) -> Result<usize> {
        let offset = self.last_update_id.map(|id| id + 1);
        let updates = telegram.get_updates(offset).await?;
        Ok(self.process_updates(updates).await)
    }

    /// Handle a batch of updates, returning how many commands ran.
    pub async fn process_updates(&mut self, updates: Vec<Update>) -> usize {
        let mut handled = 0;
        for update in updates {
            self.last_update_id = Some(
                self.last_update_id
                    .map_or(update.update_id, |last| last.max(update.update_id)),
            );

            let Some(message) = update.message else {
                continue;
            };
            let chat_id = message.chat.id.to_string();
            if !self.allowed_chats.contains(&chat_id) {
                log::debug!("Ignoring update {} from chat {}", update.update_id, chat_id);
                continue;
            }
            let Some(command) = message.text.as_deref().and_then(Command::parse) else {
                continue;
            };

            log::info!("Command {:?} from chat {}", command, chat_id);
            self.execute(&chat_id, command).await;
            handled += 1;
        }
        handled
    }

    /// Run a single command and reply to `chat_id`.
    pub async fn execute(&self, chat_id: &str, command: Command) {
        let notifier = self.watcher.notifier();
        match command {
            Command::Help => notifier.reply(chat_id, HELP_TEXT).await,
            Command::Status => notifier.reply(chat_id, &self.status_text()).await,
            Command::SetPrice(Some(price)) => {
                self.state.config.set_max_price(price);
                log::info!("Price ceiling set to €{}", price);
                notifier
                    .reply(chat_id, &format!("✅ Price ceiling updated: now ≤ €{price}"))
                    .await;
            }
            Command::SetPrice(None) => notifier.reply(chat_id, SETPRICE_USAGE).await,
            Command::All => self.dump(chat_id).await,
            Command::Debug => self.debug(chat_id).await,
            Command::Unknown(name) => {
                notifier
                    .reply(chat_id, &format!("Unknown command {name}. Send /help."))
                    .await
            }
        }
    }

    fn status_text(&self) -> String {
        let settings = self.state.config.snapshot();
        let mut lines = vec![
            "⚙️ Settings:".to_string(),
            format!("MAX_PRICE: €{}", settings.max_price),
        ];
        if settings.commute_range_enabled() {
            lines.push(format!(
                "COMMUTE: {}–{} min",
                settings.min_commute.unwrap_or(0),
                settings
                    .max_commute
                    .map_or_else(|| "∞".to_string(), |m| m.to_string())
            ));
        }
        lines.push(format!(
            "CHECK_INTERVAL: {} s",
            self.schedule.check_interval_secs
        ));
        lines.push(format!("CMD_POLL_SEC: {} s", self.schedule.command_poll_secs));
        lines.push(format!("Seen listings: {}", self.state.seen_count()));
        match self.state.last_cycle() {
            Some(report) => lines.push(format!(
                "Last cycle: {} fetched, {} matched, {} new at {}",
                report.fetched,
                report.matched,
                report.delivered,
                report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            None => lines.push("Last cycle: not run yet".to_string()),
        }
        lines.join("\n")
    }

    /// Send current matches without consulting or updating the seen set.
    async fn dump(&self, chat_id: &str) {
        let notifier = self.watcher.notifier();
        let settings = self.state.config.snapshot();
        match self.watcher.collect(&settings).await {
            Ok(matches) if matches.listings.is_empty() => {
                notifier
                    .reply(chat_id, "⚠️ No listings match your filters right now.")
                    .await
            }
            Ok(matches) => {
                for listing in matches.listings.iter().take(DUMP_LIMIT) {
                    notifier.send_to(chat_id, listing).await;
                }
            }
            Err(e) => {
                log::warn!("/all fetch failed: {}", e);
                notifier.reply(chat_id, &format!("⚠️ Fetch failed: {e}")).await;
            }
        }
    }

    async fn debug(&self, chat_id: &str) {
        let notifier = self.watcher.notifier();
        let settings = self.state.config.snapshot();
        let listings = match self.watcher.fetch_all().await {
            Ok(listings) => listings,
            Err(e) => {
                log::warn!("/debug fetch failed: {}", e);
                notifier.reply(chat_id, &format!("⚠️ Fetch failed: {e}")).await;
                return;
            }
        };

        let total = listings.len();
        let matching = self.watcher.filter(listings, &settings).await.len();
        notifier
            .reply(
                chat_id,
                &format!(
                    "🔎 DEBUG:\nParsed: {total}\nMatching filters (≤ €{}): {matching}",
                    settings.max_price
                ),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterConfig, Listing};
    use crate::pipeline::cycle::tests::{Outbox, listing, state, watcher};
    use crate::services::telegram::{Chat, Message};
    use crate::storage::{SeenSetStore, SeenStore};

    fn update(update_id: i64, chat: i64, text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message {
                chat: Chat { id: chat },
                text: Some(text.to_string()),
            }),
        }
    }

    fn handler(batch: Vec<Listing>, outbox: Arc<Outbox>, max_price: u32) -> CommandHandler {
        CommandHandler::new(
            watcher(batch, outbox, &FilterConfig::default()),
            Arc::new(state(max_price)),
            ScheduleConfig::default(),
            vec!["42".to_string()],
        )
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("  /STATUS  "), Some(Command::Status));
        assert_eq!(Command::parse("/all@wg_watch_bot"), Some(Command::All));
        assert_eq!(Command::parse("/setprice 900"), Some(Command::SetPrice(Some(900))));
        assert_eq!(Command::parse("/setprice"), Some(Command::SetPrice(None)));
        assert_eq!(Command::parse("/setprice abc"), Some(Command::SetPrice(None)));
        assert_eq!(Command::parse("/setprice -5"), Some(Command::SetPrice(None)));
        assert_eq!(Command::parse("/setprice 900€"), Some(Command::SetPrice(Some(900))));
        assert_eq!(
            Command::parse("/setprice 950abc"),
            Some(Command::SetPrice(Some(950)))
        );
        assert_eq!(
            Command::parse("/foo"),
            Some(Command::Unknown("/foo".to_string()))
        );
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[tokio::test]
    async fn test_setprice_updates_runtime_config() {
        let outbox = Arc::new(Outbox::default());
        let mut handler = handler(Vec::new(), Arc::clone(&outbox), 800);

        handler.process_updates(vec![update(1, 42, "/setprice 1000")]).await;

        assert_eq!(handler.state.config.max_price(), 1000);
        assert!(outbox.texts()[0].contains("1000"));
    }

    #[tokio::test]
    async fn test_setprice_then_cycle_delivers_at_new_ceiling() {
        let outbox = Arc::new(Outbox::default());
        let mut handler = handler(vec![listing("1", 950)], Arc::clone(&outbox), 800);
        let dir = tempfile::TempDir::new().unwrap();
        let mut seen = SeenSetStore::new(dir.path().join("seen.json"));

        handler.process_updates(vec![update(1, 42, "/setprice 1000")]).await;
        let report = handler
            .watcher
            .run_cycle(&handler.state, &mut seen)
            .await
            .unwrap();

        assert_eq!(report.delivered, 1);
        assert!(seen.contains("1"));
        assert_eq!(outbox.texts().last().map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_setprice_rejects_non_numeric() {
        let outbox = Arc::new(Outbox::default());
        let mut handler = handler(Vec::new(), Arc::clone(&outbox), 800);

        handler.process_updates(vec![update(1, 42, "/setprice cheap")]).await;

        assert_eq!(handler.state.config.max_price(), 800);
        assert_eq!(outbox.texts(), vec![SETPRICE_USAGE]);
    }

    #[tokio::test]
    async fn test_foreign_chats_are_ignored_but_offset_advances() {
        let outbox = Arc::new(Outbox::default());
        let mut handler = handler(Vec::new(), Arc::clone(&outbox), 800);

        let handled = handler
            .process_updates(vec![update(7, 99, "/setprice 1"), update(5, 42, "just text")])
            .await;

        assert_eq!(handled, 0);
        assert_eq!(handler.last_update_id(), Some(7));
        assert_eq!(handler.state.config.max_price(), 800);
        assert!(outbox.texts().is_empty());
    }

    #[tokio::test]
    async fn test_all_is_capped_and_bypasses_seen() {
        let outbox = Arc::new(Outbox::default());
        let batch: Vec<_> = (0..15).map(|i| listing(&format!("l{i}"), 500)).collect();
        let mut handler = handler(batch, Arc::clone(&outbox), 800);

        handler.process_updates(vec![update(1, 42, "/all")]).await;
        handler.process_updates(vec![update(2, 42, "/all")]).await;

        let texts = outbox.texts();
        assert_eq!(texts.len(), 2 * DUMP_LIMIT);
        assert_eq!(texts[0], "l0");
        assert_eq!(texts[DUMP_LIMIT], "l0");
        assert_eq!(handler.state.seen_count(), 0);
    }

    #[tokio::test]
    async fn test_all_with_no_matches() {
        let outbox = Arc::new(Outbox::default());
        let mut handler = handler(vec![listing("1", 2000)], Arc::clone(&outbox), 800);

        handler.process_updates(vec![update(1, 42, "/all")]).await;

        assert!(outbox.texts()[0].contains("No listings"));
    }

    #[tokio::test]
    async fn test_status_and_debug() {
        let outbox = Arc::new(Outbox::default());
        let batch = vec![listing("1", 500), listing("2", 900)];
        let mut handler = handler(batch, Arc::clone(&outbox), 800);

        handler
            .process_updates(vec![update(1, 42, "/status"), update(2, 42, "/debug")])
            .await;

        let texts = outbox.texts();
        assert!(texts[0].contains("MAX_PRICE: €800"));
        assert!(texts[0].contains("not run yet"));
        assert!(texts[1].contains("Parsed: 2"));
        assert!(texts[1].contains("): 1"));
    }
}
