// src/state.rs

//! Runtime state shared between the fetch loop, the command loop and the
//! health endpoint.
//!
//! Writers are serialized by construction: only the command handler changes
//! the filter settings and only the fetch loop records cycle reports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::FilterConfig;

/// Filter bounds read once at the start of each fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterSettings {
    /// Price ceiling in whole euros
    pub max_price: u32,
    /// Lower commute bound in minutes
    pub min_commute: Option<u32>,
    /// Upper commute bound in minutes
    pub max_commute: Option<u32>,
}

impl FilterSettings {
    /// Whether a commute range is active.
    pub fn commute_range_enabled(&self) -> bool {
        self.min_commute.is_some() || self.max_commute.is_some()
    }
}

impl From<&FilterConfig> for FilterSettings {
    fn from(config: &FilterConfig) -> Self {
        Self {
            max_price: config.max_price,
            min_commute: config.min_commute,
            max_commute: config.max_commute,
        }
    }
}

/// Cloneable handle to the mutable filter settings.
///
/// Last writer wins; there is no versioning.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    inner: Arc<RwLock<FilterSettings>>,
}

impl RuntimeConfig {
    pub fn new(settings: FilterSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> FilterSettings {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current price ceiling.
    pub fn max_price(&self) -> u32 {
        self.snapshot().max_price
    }

    /// Replace the price ceiling.
    pub fn set_max_price(&self, max_price: u32) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .max_price = max_price;
    }
}

/// Outcome of one fetch-and-deliver cycle.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CycleReport {
    /// Listings parsed from all search pages
    pub fetched: usize,
    /// Listings that passed the filter chain
    pub matched: usize,
    /// Listings delivered for the first time
    pub delivered: usize,
    /// When the cycle finished
    pub finished_at: DateTime<Utc>,
}

/// State readable by `/status` and the health endpoint.
#[derive(Debug)]
pub struct BotState {
    pub config: RuntimeConfig,
    pub started_at: DateTime<Utc>,
    last_cycle: RwLock<Option<CycleReport>>,
    seen_count: AtomicUsize,
}

impl BotState {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            started_at: Utc::now(),
            last_cycle: RwLock::new(None),
            seen_count: AtomicUsize::new(0),
        }
    }

    /// Record the outcome of a finished cycle.
    pub fn record_cycle(&self, report: CycleReport, seen_count: usize) {
        *self
            .last_cycle
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(report);
        self.seen_count.store(seen_count, Ordering::Relaxed);
    }

    /// Publish the seen-set size without a cycle report (e.g. after load).
    pub fn set_seen_count(&self, seen_count: usize) {
        self.seen_count.store(seen_count, Ordering::Relaxed);
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn seen_count(&self) -> usize {
        self.seen_count.load(Ordering::Relaxed)
    }

    /// Seconds since the process started.
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_price: u32) -> FilterSettings {
        FilterSettings {
            max_price,
            min_commute: None,
            max_commute: None,
        }
    }

    #[test]
    fn test_write_is_visible_to_clones() {
        let config = RuntimeConfig::new(settings(800));
        let reader = config.clone();

        config.set_max_price(1000);
        assert_eq!(reader.max_price(), 1000);
        assert_eq!(reader.snapshot(), settings(1000));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let config = RuntimeConfig::new(settings(800));
        let before = config.snapshot();
        config.set_max_price(500);
        assert_eq!(before.max_price, 800);
    }

    #[test]
    fn test_record_cycle() {
        let state = BotState::new(RuntimeConfig::new(settings(800)));
        assert!(state.last_cycle().is_none());

        let report = CycleReport {
            fetched: 10,
            matched: 4,
            delivered: 2,
            finished_at: Utc::now(),
        };
        state.record_cycle(report.clone(), 17);

        assert_eq!(state.last_cycle(), Some(report));
        assert_eq!(state.seen_count(), 17);
    }

    #[test]
    fn test_filter_settings_from_config() {
        let config = FilterConfig {
            max_price: 700,
            station_pattern: None,
            min_commute: None,
            max_commute: Some(30),
        };
        let settings = FilterSettings::from(&config);
        assert_eq!(settings.max_price, 700);
        assert!(settings.commute_range_enabled());
    }
}
