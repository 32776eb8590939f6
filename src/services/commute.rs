// src/services/commute.rs

//! Commute-time enrichment via the Google Distance Matrix API.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{CommuteConfig, Listing};
use crate::services::CommuteEstimator;

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    #[serde(default)]
    duration: Option<MatrixDuration>,
}

#[derive(Debug, Deserialize)]
struct MatrixDuration {
    /// Seconds
    value: u64,
}

/// Distance Matrix client with a per-origin cache.
pub struct DistanceMatrixEstimator {
    client: Client,
    api_url: String,
    api_key: String,
    destination: String,
    mode: String,
    cache: Mutex<HashMap<String, Option<u32>>>,
}

impl DistanceMatrixEstimator {
    pub fn new(client: Client, config: &CommuteConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::config("commute.api_key is not set"))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            destination: config.destination.clone(),
            mode: config.mode.clone(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, origin: &str) -> Option<Option<u32>> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(origin)
            .copied()
    }

    async fn lookup(&self, origin: &str) -> Result<Option<u32>> {
        let body = self
            .client
            .get(&self.api_url)
            .query(&[
                ("origins", origin),
                ("destinations", self.destination.as_str()),
                ("mode", self.mode.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        minutes_from_response(&body)
    }
}

/// Extract commute minutes from a Distance Matrix response body.
///
/// A route-level failure (`NOT_FOUND`, `ZERO_RESULTS`) is `Ok(None)`; a
/// request-level failure is an error.
fn minutes_from_response(body: &str) -> Result<Option<u32>> {
    let response: MatrixResponse = serde_json::from_str(body)?;
    if response.status != "OK" {
        return Err(AppError::commute(format!(
            "{}{}",
            response.status,
            response
                .error_message
                .map(|m| format!(": {m}"))
                .unwrap_or_default()
        )));
    }

    let element = response
        .rows
        .into_iter()
        .next()
        .and_then(|row| row.elements.into_iter().next());

    Ok(element
        .filter(|e| e.status == "OK")
        .and_then(|e| e.duration)
        .map(|d| d.value.div_ceil(60) as u32))
}

#[async_trait]
impl CommuteEstimator for DistanceMatrixEstimator {
    async fn minutes(&self, origin: &str) -> Result<Option<u32>> {
        if let Some(hit) = self.cached(origin) {
            return Ok(hit);
        }

        let minutes = self.lookup(origin).await?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(origin.to_string(), minutes);
        Ok(minutes)
    }
}

/// Lookups in flight at once during enrichment.
const LOOKUP_CONCURRENCY: usize = 4;

/// Fill in `commute_minutes` for each listing.
///
/// A failed lookup leaves the field empty, which the commute predicate
/// treats as a rejection.
pub async fn enrich(estimator: &dyn CommuteEstimator, listings: &mut [Listing]) {
    let lookups: Vec<_> = listings
        .iter()
        .map(|listing| estimator.minutes(listing.commute_origin()))
        .collect();
    let results: Vec<Result<Option<u32>>> = stream::iter(lookups)
        .buffered(LOOKUP_CONCURRENCY)
        .collect()
        .await;

    for (listing, result) in listings.iter_mut().zip(results) {
        listing.commute_minutes = match result {
            Ok(minutes) => minutes,
            Err(e) => {
                log::warn!("Commute lookup failed for {}: {}", listing.id, e);
                None
            }
        };
    }
}
