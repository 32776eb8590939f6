//! Listing record structure.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// One rental offer observed on the listing site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    /// Dedup key, stable across fetches of the same offer
    pub id: String,

    /// Display title
    pub title: String,

    /// Monthly rent in whole euros
    pub price: u32,

    /// Absolute link to the offer
    pub url: String,

    /// Publication date as shown by the site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,

    /// Street address or district
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Commute time to the configured destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commute_minutes: Option<u32>,
}

impl Listing {
    /// Create a listing with no enrichment fields.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        price: u32,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            price,
            url: url.into(),
            published: None,
            address: None,
            commute_minutes: None,
        }
    }

    /// Text the pattern predicate is matched against.
    pub fn search_text(&self) -> String {
        match &self.address {
            Some(address) => format!("{} {} {}", self.title, self.url, address),
            None => format!("{} {}", self.title, self.url),
        }
    }

    /// Origin used for commute lookups.
    pub fn commute_origin(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.title)
    }

    /// Format the listing as Telegram HTML using a template.
    ///
    /// Supported placeholders:
    /// - `{title}`, `{price}`, `{url}`
    /// - `{address}`, `{commute}`, `{published}` (empty when unknown)
    pub fn format(&self, template: &str, max_title_length: usize) -> String {
        let title = truncate_graphemes(&self.title, max_title_length);
        let commute = self
            .commute_minutes
            .map(|m| format!("{m} min"))
            .unwrap_or_default();

        template
            .replace("{title}", &escape_html(&title))
            .replace("{price}", &self.price.to_string())
            .replace("{url}", &escape_html(&self.url))
            .replace(
                "{address}",
                &escape_html(self.address.as_deref().unwrap_or_default()),
            )
            .replace("{commute}", &commute)
            .replace(
                "{published}",
                &escape_html(self.published.as_deref().unwrap_or_default()),
            )
    }
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn truncate_graphemes(text: &str, max: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        format!("{}…", head.trim_end())
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_listing() -> Listing {
        Listing::new(
            "liste-details-ad-123",
            "Helles Zimmer <nahe> U6",
            650,
            "https://www.wg-gesucht.de/wg-zimmer-in-Muenchen.123.html",
        )
    }

    #[test]
    fn test_format_escapes_html() {
        let listing = sample_listing();
        let result = listing.format("<b>{title}</b> {price} €", 200);
        assert_eq!(result, "<b>Helles Zimmer &lt;nahe&gt; U6</b> 650 €");
    }

    #[test]
    fn test_format_optional_fields() {
        let mut listing = sample_listing();
        assert_eq!(listing.format("[{address}|{commute}]", 200), "[|]");

        listing.address = Some("Leopoldstr. 1".to_string());
        listing.commute_minutes = Some(18);
        assert_eq!(
            listing.format("[{address}|{commute}]", 200),
            "[Leopoldstr. 1|18 min]"
        );
    }

    #[test]
    fn test_format_truncates_long_titles() {
        let mut listing = sample_listing();
        listing.title = "Zimmer in Schwabing".to_string();
        assert_eq!(listing.format("{title}", 6), "Zimmer…");
        assert_eq!(listing.format("{title}", 100), "Zimmer in Schwabing");
    }

    #[test]
    fn test_search_text_includes_address() {
        let mut listing = sample_listing();
        assert!(!listing.search_text().contains("Giesing"));
        listing.address = Some("Obergiesing".to_string());
        assert!(listing.search_text().contains("Obergiesing"));
        assert_eq!(listing.commute_origin(), "Obergiesing");
    }
}
