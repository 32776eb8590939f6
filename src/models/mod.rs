// src/models/mod.rs

//! Domain models for the bot.
//!
//! This module contains the data structures shared between the listing
//! source, the filter chain and the delivery pipeline.

mod config;
mod listing;

// Re-export all public types
pub use config::{
    CommuteConfig, Config, CrawlerConfig, FilterConfig, MessageConfig, ScheduleConfig,
    ServerConfig, SourceConfig, StorageConfig, TelegramConfig,
};
pub use listing::{Listing, escape_html};
