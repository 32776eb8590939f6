// src/services/listings.rs

//! WG-Gesucht listing source.
//!
//! Fetches the configured search pages in order and normalizes them into
//! [`Listing`] records.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::error::Result;
use crate::models::{CrawlerConfig, Listing, SourceConfig};
use crate::services::ListingSource;
use crate::services::parser::parse_listings;
use crate::utils::http::fetch_text;

/// Listing source backed by WG-Gesucht search pages.
pub struct WgGesuchtSource {
    client: Client,
    base_url: Url,
    search_urls: Vec<String>,
    delay: Duration,
}

impl WgGesuchtSource {
    /// Create a source for the configured search pages.
    pub fn new(client: Client, source: &SourceConfig, crawler: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(&source.base_url)?,
            search_urls: source.search_urls.clone(),
            delay: Duration::from_millis(crawler.request_delay_ms),
        })
    }

    /// Visit the site root so consent cookies are set. Failures are ignored.
    async fn prime_session(&self) {
        if let Err(e) = fetch_text(&self.client, self.base_url.as_str()).await {
            log::debug!("Session priming failed for {}: {}", self.base_url, e);
        }
    }

    /// Fetch and parse a single search page.
    async fn fetch_page(&self, url: &str) -> Result<Vec<Listing>> {
        let html = fetch_text(&self.client, url).await?;
        parse_listings(&html, &self.base_url)
    }
}

#[async_trait]
impl ListingSource for WgGesuchtSource {
    async fn fetch(&self) -> Result<Vec<Listing>> {
        self.prime_session().await;

        let mut pages = Vec::with_capacity(self.search_urls.len());
        for (i, url) in self.search_urls.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.fetch_page(url).await {
                Ok(listings) => {
                    log::info!("Parsed {} listings from {}", listings.len(), url);
                    pages.push(listings);
                }
                Err(e) => log::warn!("Failed to fetch search page {}: {}", url, e),
            }
        }

        Ok(dedup_by_id(pages.into_iter().flatten()))
    }
}

/// Drop repeated ids, keeping the first occurrence and the original order.
pub fn dedup_by_id(listings: impl IntoIterator<Item = Listing>) -> Vec<Listing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|listing| seen.insert(listing.id.clone()))
        .collect()
}
