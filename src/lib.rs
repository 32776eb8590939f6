// src/lib.rs

//! wg-watch: housing listing watcher with Telegram notifications

pub mod error;
pub mod models;
pub mod pipeline;
#[cfg(feature = "server")]
pub mod server;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;
