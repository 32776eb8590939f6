//! Service layer for the bot.
//!
//! This module contains the external collaborators of the delivery pipeline:
//! - Listing source (`WgGesuchtSource`, parsing in `parser`)
//! - Notification sink and command transport (`TelegramClient`)
//! - Commute enrichment (`DistanceMatrixEstimator`)
//! - Operator command handling (`CommandHandler`)

pub mod commands;
pub mod commute;
mod listings;
pub mod parser;
pub mod telegram;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Listing;

pub use commands::{Command, CommandHandler};
pub use commute::DistanceMatrixEstimator;
pub use listings::{WgGesuchtSource, dedup_by_id};
pub use telegram::TelegramClient;

/// Produces normalized listings from an external site.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch the current listings in source order.
    async fn fetch(&self) -> Result<Vec<Listing>>;
}

/// URL button attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAction {
    pub text: String,
    pub url: String,
}

impl InlineAction {
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
        }
    }
}

/// Best-effort message delivery.
///
/// Failures are returned so callers can log them, never to abort a batch.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, destination: &str, text: &str, actions: &[InlineAction]) -> Result<()>;
}

/// Looks up commute time from an origin to the configured destination.
#[async_trait]
pub trait CommuteEstimator: Send + Sync {
    /// Minutes of travel, `None` when no route exists.
    async fn minutes(&self, origin: &str) -> Result<Option<u32>>;
}
