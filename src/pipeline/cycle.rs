// src/pipeline/cycle.rs

//! One fetch-and-deliver cycle.

use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::models::Listing;
use crate::pipeline::deliver::{Notifier, deliver_new};
use crate::pipeline::filter::FilterChain;
use crate::services::commute::enrich;
use crate::services::{CommuteEstimator, ListingSource};
use crate::state::{BotState, CycleReport, FilterSettings};
use crate::storage::SeenStore;

/// Fetched listings together with the subset that passed the filters.
#[derive(Debug, Clone, Default)]
pub struct Matches {
    /// Listings parsed from the source
    pub fetched: usize,
    /// Listings accepted by the filter chain, in source order
    pub listings: Vec<Listing>,
}

/// Source, filters and notifier wired together.
#[derive(Clone)]
pub struct Watcher {
    source: Arc<dyn ListingSource>,
    chain: FilterChain,
    commute: Option<Arc<dyn CommuteEstimator>>,
    notifier: Notifier,
}

impl Watcher {
    pub fn new(
        source: Arc<dyn ListingSource>,
        chain: FilterChain,
        commute: Option<Arc<dyn CommuteEstimator>>,
        notifier: Notifier,
    ) -> Self {
        Self {
            source,
            chain,
            commute,
            notifier,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Fetch every listing without filtering.
    pub async fn fetch_all(&self) -> Result<Vec<Listing>> {
        self.source.fetch().await
    }

    /// Fetch and filter against `settings`, without touching the seen set.
    pub async fn collect(&self, settings: &FilterSettings) -> Result<Matches> {
        let listings = self.source.fetch().await?;
        let fetched = listings.len();
        Ok(Matches {
            fetched,
            listings: self.filter(listings, settings).await,
        })
    }

    /// Apply the filter chain, enriching commute times when required.
    pub async fn filter(&self, listings: Vec<Listing>, settings: &FilterSettings) -> Vec<Listing> {
        if !self.chain.needs_commute() {
            return self.chain.apply(listings, settings);
        }

        let mut candidates = self.chain.prefilter(listings, settings);
        match &self.commute {
            Some(estimator) => enrich(estimator.as_ref(), &mut candidates).await,
            None => log::warn!("Commute range is set but no estimator is configured"),
        }
        self.chain.apply(candidates, settings)
    }

    /// Run one cycle: read settings once, fetch, filter, deliver new listings.
    pub async fn run_cycle(&self, state: &BotState, seen: &mut dyn SeenStore) -> Result<CycleReport> {
        let settings = state.config.snapshot();
        let matches = self.collect(&settings).await?;

        let delivered = deliver_new(&matches.listings, seen, &self.notifier).await;
        let report = CycleReport {
            fetched: matches.fetched,
            matched: matches.listings.len(),
            delivered,
            finished_at: Utc::now(),
        };
        state.record_cycle(report.clone(), seen.len());

        log::info!(
            "Cycle done: {} fetched, {} matched (≤ €{}), {} delivered",
            report.fetched,
            report.matched,
            settings.max_price,
            report.delivered
        );
        Ok(report)
    }
}
