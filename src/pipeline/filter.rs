//! Filter chain applied to normalized listings.
//!
//! Predicates are combined with logical AND. A predicate whose input is
//! missing rejects the listing instead of letting it through.

use regex::{Regex, RegexBuilder};

use crate::error::Result;
use crate::models::{FilterConfig, Listing};
use crate::state::FilterSettings;

/// A single accept/reject rule.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// `price <= settings.max_price`
    PriceCeiling,
    /// Case-insensitive match against title, URL and address
    Pattern(Regex),
    /// Commute minutes within `[settings.min_commute, settings.max_commute]`
    CommuteRange,
}

impl Predicate {
    fn accepts(&self, listing: &Listing, settings: &FilterSettings) -> bool {
        match self {
            Predicate::PriceCeiling => listing.price <= settings.max_price,
            Predicate::Pattern(regex) => regex.is_match(&listing.search_text()),
            Predicate::CommuteRange => match listing.commute_minutes {
                Some(minutes) => {
                    settings.min_commute.is_none_or(|min| minutes >= min)
                        && settings.max_commute.is_none_or(|max| minutes <= max)
                }
                None => false,
            },
        }
    }
}

/// Ordered set of predicates.
#[derive(Debug, Clone)]
pub struct FilterChain {
    predicates: Vec<Predicate>,
}

impl FilterChain {
    /// Create a chain from explicit predicates.
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    /// Build the chain for a deployment.
    ///
    /// The price ceiling is always active; the pattern and commute range are
    /// added only when configured.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let mut predicates = vec![Predicate::PriceCeiling];

        if let Some(pattern) = config.station_pattern.as_deref().filter(|p| !p.is_empty()) {
            let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
            predicates.push(Predicate::Pattern(regex));
        }
        if config.commute_range_enabled() {
            predicates.push(Predicate::CommuteRange);
        }

        Ok(Self::new(predicates))
    }

    /// Whether the chain needs commute minutes to decide.
    pub fn needs_commute(&self) -> bool {
        self.predicates
            .iter()
            .any(|p| matches!(p, Predicate::CommuteRange))
    }

    /// Pure accept/reject decision for one listing.
    pub fn accepts(&self, listing: &Listing, settings: &FilterSettings) -> bool {
        self.predicates.iter().all(|p| p.accepts(listing, settings))
    }

    /// Keep listings that pass every predicate except the commute range.
    ///
    /// Used to avoid commute lookups for listings that fail on price or
    /// pattern anyway.
    pub fn prefilter(&self, listings: Vec<Listing>, settings: &FilterSettings) -> Vec<Listing> {
        listings
            .into_iter()
            .filter(|listing| {
                self.predicates
                    .iter()
                    .filter(|p| !matches!(p, Predicate::CommuteRange))
                    .all(|p| p.accepts(listing, settings))
            })
            .collect()
    }

    /// Keep accepted listings, preserving order.
    pub fn apply(&self, listings: Vec<Listing>, settings: &FilterSettings) -> Vec<Listing> {
        listings
            .into_iter()
            .filter(|listing| self.accepts(listing, settings))
            .collect()
    }
}
