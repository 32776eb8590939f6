// src/services/parser.rs

//! Search-page parser for WG-Gesucht.
//!
//! Several layouts are tried in order and the first one that yields any
//! listing wins. Rows missing an id, title, link or price are dropped.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::Listing;
use crate::utils::{normalize_whitespace, parse_price, parse_price_value, resolve_url};

static CARD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^liste-details-ad-\d+$").expect("card id regex is valid"));

static OFFER_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(wg-zimmer|1-zimmer-wohnungen?|wohnungen)").expect("offer href regex is valid")
});

/// Title used when an anchor carries no text.
const FALLBACK_TITLE: &str = "Angebot";

/// Compiled selectors for every supported layout.
struct Selectors {
    cards: Selector,
    data_id: Selector,
    anchors: Selector,
    json_ld: Selector,
    h3: Selector,
    h2_h3: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            cards: parse_selector(r#"div[id^="liste-details-ad-"]"#)?,
            data_id: parse_selector("article[data-id], div[data-id]")?,
            anchors: parse_selector("a[href]")?,
            json_ld: parse_selector(r#"script[type="application/ld+json"]"#)?,
            h3: parse_selector("h3")?,
            h2_h3: parse_selector("h3, h2")?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Parse every listing on a search page.
pub fn parse_listings(html: &str, base_url: &Url) -> Result<Vec<Listing>> {
    let selectors = Selectors::new()?;
    let document = Html::parse_document(html);

    let strategies: [(&str, fn(&Html, &Selectors, &Url) -> Vec<Listing>); 4] = [
        ("cards", parse_cards),
        ("data-id", parse_data_id),
        ("anchors", parse_anchors),
        ("json-ld", parse_json_ld),
    ];

    for (name, strategy) in strategies {
        let listings = strategy(&document, &selectors, base_url);
        if !listings.is_empty() {
            log::debug!("Parsed {} listings using {} layout", listings.len(), name);
            return Ok(listings);
        }
    }
    Ok(Vec::new())
}

fn element_text(element: &ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn first_href(element: &ElementRef, anchors: &Selector) -> Option<String> {
    element
        .select(anchors)
        .find_map(|a| a.value().attr("href"))
        .map(String::from)
}

/// Build a listing from a container holding a heading, a link and a price.
fn parse_container(
    container: &ElementRef,
    id: &str,
    title_sel: &Selector,
    selectors: &Selectors,
    base_url: &Url,
) -> Option<Listing> {
    let title = container
        .select(title_sel)
        .next()
        .map(|t| element_text(&t))
        .filter(|t| !t.is_empty())?;
    let href = first_href(container, &selectors.anchors)?;
    let price = parse_price(&element_text(container))?;

    Some(Listing::new(id, title, price, resolve_url(base_url, &href)))
}

fn parse_cards(document: &Html, selectors: &Selectors, base_url: &Url) -> Vec<Listing> {
    document
        .select(&selectors.cards)
        .filter_map(|card| {
            let id = card.value().id().filter(|id| CARD_ID_RE.is_match(id))?;
            parse_container(&card, id, &selectors.h3, selectors, base_url)
        })
        .collect()
}

fn parse_data_id(document: &Html, selectors: &Selectors, base_url: &Url) -> Vec<Listing> {
    document
        .select(&selectors.data_id)
        .filter_map(|ad| {
            let id = ad.value().attr("data-id").filter(|id| !id.trim().is_empty())?;
            parse_container(&ad, id.trim(), &selectors.h2_h3, selectors, base_url)
        })
        .collect()
}

fn parse_anchors(document: &Html, selectors: &Selectors, base_url: &Url) -> Vec<Listing> {
    document
        .select(&selectors.anchors)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            if !OFFER_HREF_RE.is_match(href) {
                return None;
            }
            let context = a
                .parent()
                .and_then(ElementRef::wrap)
                .map(|parent| element_text(&parent))
                .unwrap_or_else(|| element_text(&a));
            let price = parse_price(&context)?;

            let text = element_text(&a);
            let title = if text.is_empty() {
                FALLBACK_TITLE.to_string()
            } else {
                text
            };
            let url = resolve_url(base_url, href);
            Some(Listing::new(url.clone(), title, price, url))
        })
        .collect()
}

fn parse_json_ld(document: &Html, selectors: &Selectors, base_url: &Url) -> Vec<Listing> {
    let mut listings = Vec::new();
    for script in document.select(&selectors.json_ld) {
        let raw: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        let items = match data {
            Value::Array(items) => items,
            Value::Object(ref map) if map.get("@graph").is_some_and(Value::is_array) => {
                map["@graph"].as_array().cloned().unwrap_or_default()
            }
            other => vec![other],
        };
        listings.extend(items.iter().filter_map(|item| json_ld_listing(item, base_url)));
    }
    listings
}

fn json_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn json_price(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_f64().filter(|p| *p >= 0.0).map(|p| p as u32),
        Value::String(s) => parse_price_value(s),
        _ => None,
    }
}

fn json_ld_listing(item: &Value, base_url: &Url) -> Option<Listing> {
    let title = json_str(item, "name").or_else(|| json_str(item, "headline"))?;
    let url = resolve_url(base_url, json_str(item, "url")?);

    let price = match item.get("offers") {
        Some(offers @ Value::Object(_)) => offers
            .get("price")
            .or_else(|| offers.get("priceSpecification").and_then(|s| s.get("price"))),
        _ => item.get("price"),
    }
    .and_then(json_price)?;

    let mut listing = Listing::new(url.clone(), normalize_whitespace(title), price, url);
    listing.published = json_str(item, "datePublished").map(String::from);
    listing.address = item.get("address").and_then(json_address);
    Some(listing)
}

fn json_address(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(normalize_whitespace(s)),
        Value::Object(_) => {
            let parts: Vec<&str> = ["streetAddress", "postalCode", "addressLocality"]
                .iter()
                .filter_map(|key| json_str(value, key))
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.wg-gesucht.de/").unwrap()
    }

    fn ids(listings: &[Listing]) -> Vec<&str> {
        listings.iter().map(|l| l.id.as_str()).collect()
    }

    #[test]
    fn test_cards_layout() {
        let html = r#"
            <div id="liste-details-ad-111" class="wgg_card">
                <h3><a href="/wg-zimmer-in-Muenchen-Maxvorstadt.111.html">Zimmer  in Maxvorstadt</a></h3>
                <div>18 m² | <b>650&nbsp;€</b></div>
            </div>
            <div id="liste-details-ad-222">
                <h3>Ohne Preis</h3>
                <a href="/x.222.html">link</a>
            </div>
            <div id="liste-details-ad-333">
                <h3>Teuer</h3>
                <a href="https://www.wg-gesucht.de/x.333.html">link</a>
                1.200 €
            </div>
        "#;

        let listings = parse_listings(html, &base()).unwrap();
        assert_eq!(ids(&listings), vec!["liste-details-ad-111", "liste-details-ad-333"]);
        assert_eq!(listings[0].title, "Zimmer in Maxvorstadt");
        assert_eq!(listings[0].price, 650);
        assert_eq!(
            listings[0].url,
            "https://www.wg-gesucht.de/wg-zimmer-in-Muenchen-Maxvorstadt.111.html"
        );
        assert_eq!(listings[1].price, 1200);
    }

    #[test]
    fn test_card_price_with_decimal_comma() {
        let html = r#"
            <div id="liste-details-ad-7">
                <h3>Loft</h3>
                <a href="/x.7.html">x</a> 1.150,00 €
            </div>
            <div id="liste-details-ad-8">
                <h3>Studio</h3>
                <a href="/x.8.html">x</a> 650,00&nbsp;€
            </div>
        "#;

        let listings = parse_listings(html, &base()).unwrap();
        let prices: Vec<_> = listings.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![1150, 650]);
    }

    #[test]
    fn test_data_id_fallback() {
        let html = r#"
            <article data-id="9001">
                <h2>Wohnung am Ostbahnhof</h2>
                <a href="/1-zimmer-wohnungen-in-Muenchen.9001.html">ansehen</a>
                <span>780 €</span>
            </article>
        "#;

        let listings = parse_listings(html, &base()).unwrap();
        assert_eq!(ids(&listings), vec!["9001"]);
        assert_eq!(listings[0].title, "Wohnung am Ostbahnhof");
    }

    #[test]
    fn test_anchor_fallback_uses_url_as_id() {
        let html = r#"
            <ul>
                <li><a href="/wg-zimmer-in-Muenchen.55.html"></a> 540 €</li>
                <li><a href="/impressum.html">Impressum</a> 10 €</li>
                <li><a href="/wohnungen-in-Muenchen.56.html">Altbau</a> keine Angabe</li>
            </ul>
        "#;

        let listings = parse_listings(html, &base()).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].id, "https://www.wg-gesucht.de/wg-zimmer-in-Muenchen.55.html");
        assert_eq!(listings[0].id, listings[0].url);
        assert_eq!(listings[0].title, FALLBACK_TITLE);
        assert_eq!(listings[0].price, 540);
    }

    #[test]
    fn test_json_ld_fallback() {
        let html = r#"
            <script type="application/ld+json">
            [
                {"name": "Sonniges Zimmer", "url": "/wg-zimmer.1.html",
                 "offers": {"price": "610.00"}, "datePublished": "2024-05-01",
                 "address": {"streetAddress": "Leopoldstr. 5", "addressLocality": "München"}},
                {"headline": "Spec price", "url": "https://example.com/2",
                 "offers": {"priceSpecification": {"price": 720}}},
                {"name": "Kein Preis", "url": "https://example.com/3"}
            ]
            </script>
            <script type="application/ld+json">{ broken</script>
        "#;

        let listings = parse_listings(html, &base()).unwrap();
        assert_eq!(
            ids(&listings),
            vec!["https://www.wg-gesucht.de/wg-zimmer.1.html", "https://example.com/2"]
        );
        assert_eq!(listings[0].price, 610);
        assert_eq!(listings[0].published.as_deref(), Some("2024-05-01"));
        assert_eq!(listings[0].address.as_deref(), Some("Leopoldstr. 5, München"));
        assert_eq!(listings[1].price, 720);
    }

    #[test]
    fn test_cards_win_over_json_ld() {
        let html = r#"
            <div id="liste-details-ad-1"><h3>Karte</h3><a href="/a.1.html">a</a> 500 €</div>
            <script type="application/ld+json">{"name": "LD", "url": "/b", "price": 400}</script>
        "#;

        let listings = parse_listings(html, &base()).unwrap();
        assert_eq!(ids(&listings), vec!["liste-details-ad-1"]);
    }

    #[test]
    fn test_empty_page() {
        let listings = parse_listings("<html><body>Keine Treffer</body></html>", &base()).unwrap();
        assert!(listings.is_empty());
    }
}
