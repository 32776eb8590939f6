//! Pipeline entry points for the bot.
//!
//! - `FilterChain`: accept/reject rules over normalized listings
//! - `deliver_new`: at-most-once delivery against the seen set
//! - `Watcher`: one fetch-filter-deliver cycle
//! - `run_bot`: the long-running fetch and command loops

pub mod cycle;
pub mod deliver;
pub mod filter;
pub mod scheduler;

pub use cycle::{Matches, Watcher};
pub use deliver::{Notifier, deliver_new};
pub use filter::{FilterChain, Predicate};
pub use scheduler::run_bot;
