// src/pipeline/deliver.rs

//! Offer delivery pipeline.
//!
//! Turns a filtered batch into at-most-once notifications: each id is marked
//! seen before it is handed to the sink, so neither a duplicate later in the
//! batch nor a failed send can cause it to be delivered again.

use std::sync::Arc;

use crate::models::{Listing, MessageConfig};
use crate::services::{InlineAction, NotificationSink};
use crate::storage::SeenStore;

/// Label of the inline button linking to the listing.
const OPEN_LISTING: &str = "Open listing";

/// Formats listings and fans them out to every destination.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    destinations: Vec<String>,
    message: MessageConfig,
}

impl Notifier {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        destinations: Vec<String>,
        message: MessageConfig,
    ) -> Self {
        Self {
            sink,
            destinations,
            message,
        }
    }

    /// Destinations every notification goes to.
    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// Render the message text for a listing.
    pub fn render(&self, listing: &Listing) -> String {
        listing.format(&self.message.template, self.message.max_title_length)
    }

    fn actions(&self, listing: &Listing) -> Vec<InlineAction> {
        if self.message.inline_button {
            vec![InlineAction::url(OPEN_LISTING, &listing.url)]
        } else {
            Vec::new()
        }
    }

    /// Send one listing to a single chat.
    pub async fn send_to(&self, destination: &str, listing: &Listing) -> bool {
        let text = self.render(listing);
        match self
            .sink
            .send(destination, &text, &self.actions(listing))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Failed to deliver {} to {}: {}",
                    listing.id,
                    destination,
                    e
                );
                false
            }
        }
    }

    /// Send one listing to every destination.
    ///
    /// Returns true if at least one destination accepted it.
    pub async fn notify(&self, listing: &Listing) -> bool {
        let mut accepted = false;
        for destination in &self.destinations {
            accepted |= self.send_to(destination, listing).await;
        }
        accepted
    }

    /// Send a plain text message to every destination, logging failures.
    pub async fn broadcast(&self, text: &str) {
        for destination in &self.destinations {
            if let Err(e) = self.sink.send(destination, text, &[]).await {
                log::warn!("Failed to send message to {}: {}", destination, e);
            }
        }
    }

    /// Send a plain text reply to one chat, logging failures.
    pub async fn reply(&self, destination: &str, text: &str) {
        if let Err(e) = self.sink.send(destination, text, &[]).await {
            log::warn!("Failed to reply to {}: {}", destination, e);
        }
    }
}

/// Deliver every listing in `batch` whose id has not been seen.
///
/// Listings are sent in batch order. The seen store is flushed once at the
/// end if it holds unpersisted marks, either from this batch or left over
/// from an earlier failed flush. Returns the number of listings that reached
/// at least one destination.
pub async fn deliver_new(
    batch: &[Listing],
    seen: &mut dyn SeenStore,
    notifier: &Notifier,
) -> usize {
    let mut marked = 0;
    let mut delivered = 0;

    for listing in batch {
        if seen.contains(&listing.id) {
            continue;
        }
        seen.mark(&listing.id);
        marked += 1;

        if notifier.notify(listing).await {
            delivered += 1;
        }
    }

    if seen.is_dirty() {
        seen.flush().await;
    }
    if marked > delivered {
        log::warn!(
            "{} new listings could not be delivered and will not be retried",
            marked - delivered
        );
    }

    delivered
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{AppError, Result};

    /// Sink that records sends and fails for configured ids.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
        fail_containing: Option<String>,
    }

    impl RecordingSink {
        fn failing_on(fragment: &str) -> Self {
            Self {
                fail_containing: Some(fragment.to_string()),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, destination: &str, text: &str, _: &[InlineAction]) -> Result<()> {
            if let Some(fragment) = &self.fail_containing {
                if text.contains(fragment.as_str()) {
                    return Err(AppError::telegram("sendMessage", "Too Many Requests"));
                }
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), text.to_string()));
            Ok(())
        }
    }

    /// In-memory store counting flushes; `fail_flush` simulates a full disk.
    #[derive(Default)]
    struct MemoryStore {
        ids: HashSet<String>,
        flushes: usize,
        dirty: bool,
        fail_flush: bool,
    }

    #[async_trait]
    impl SeenStore for MemoryStore {
        fn contains(&self, id: &str) -> bool {
            self.ids.contains(id)
        }
        fn mark(&mut self, id: &str) -> bool {
            let inserted = self.ids.insert(id.to_string());
            self.dirty |= inserted;
            inserted
        }
        fn len(&self) -> usize {
            self.ids.len()
        }
        fn is_dirty(&self) -> bool {
            self.dirty
        }
        async fn flush(&mut self) -> bool {
            self.flushes += 1;
            if self.fail_flush {
                return false;
            }
            self.dirty = false;
            true
        }
    }

    fn listing(id: &str, price: u32) -> Listing {
        Listing::new(id, format!("title-{id}"), price, format!("https://example.com/{id}"))
    }

    fn notifier(sink: Arc<RecordingSink>, destinations: &[&str]) -> Notifier {
        let message = MessageConfig {
            template: "{title}".to_string(),
            ..MessageConfig::default()
        };
        Notifier::new(
            sink,
            destinations.iter().map(|d| d.to_string()).collect(),
            message,
        )
    }

    fn texts(sink: &RecordingSink) -> Vec<String> {
        sink.sent().into_iter().map(|(_, text)| text).collect()
    }

    #[tokio::test]
    async fn test_delivers_unseen_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(Arc::clone(&sink), &["42"]);
        let mut seen = MemoryStore::default();

        let batch = vec![listing("3", 700), listing("1", 500), listing("2", 600)];
        let delivered = deliver_new(&batch, &mut seen, &notifier).await;

        assert_eq!(delivered, 3);
        assert_eq!(texts(&sink), vec!["title-3", "title-1", "title-2"]);
        assert_eq!(seen.flushes, 1);
    }

    #[tokio::test]
    async fn test_seen_ids_are_skipped() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(Arc::clone(&sink), &["42"]);
        let mut seen = MemoryStore::default();
        seen.mark("1");

        let batch = vec![listing("1", 500), listing("2", 600)];
        assert_eq!(deliver_new(&batch, &mut seen, &notifier).await, 1);
        assert_eq!(texts(&sink), vec!["title-2"]);
        assert!(seen.contains("1") && seen.contains("2"));
    }

    #[tokio::test]
    async fn test_duplicates_within_batch_delivered_once() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(Arc::clone(&sink), &["42"]);
        let mut seen = MemoryStore::default();

        let mut drifted = listing("1", 450);
        drifted.title = "title-1 (reduced)".to_string();
        let batch = vec![listing("1", 500), listing("2", 600), drifted];

        assert_eq!(deliver_new(&batch, &mut seen, &notifier).await, 2);
        assert_eq!(texts(&sink), vec!["title-1", "title-2"]);
    }

    #[tokio::test]
    async fn test_redelivery_across_batches_is_suppressed() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(Arc::clone(&sink), &["42"]);
        let mut seen = MemoryStore::default();

        let batch = vec![listing("1", 500)];
        assert_eq!(deliver_new(&batch, &mut seen, &notifier).await, 1);
        assert_eq!(deliver_new(&batch, &mut seen, &notifier).await, 0);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_no_flush_without_new_ids() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(Arc::clone(&sink), &["42"]);
        let mut seen = MemoryStore::default();
        seen.mark("1");
        seen.dirty = false;

        assert_eq!(deliver_new(&[listing("1", 500)], &mut seen, &notifier).await, 0);
        assert_eq!(deliver_new(&[], &mut seen, &notifier).await, 0);
        assert_eq!(seen.flushes, 0);
    }

    #[tokio::test]
    async fn test_failed_flush_is_retried_on_next_batch() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(Arc::clone(&sink), &["42"]);
        let mut seen = MemoryStore {
            fail_flush: true,
            ..MemoryStore::default()
        };

        assert_eq!(deliver_new(&[listing("1", 500)], &mut seen, &notifier).await, 1);
        assert_eq!(seen.flushes, 1);
        assert!(seen.is_dirty());

        // Nothing new, but the earlier marks are still unpersisted.
        seen.fail_flush = false;
        assert_eq!(deliver_new(&[listing("1", 500)], &mut seen, &notifier).await, 0);
        assert_eq!(seen.flushes, 2);
        assert!(!seen.is_dirty());

        // Clean store and no new ids: no write.
        assert_eq!(deliver_new(&[listing("1", 500)], &mut seen, &notifier).await, 0);
        assert_eq!(seen.flushes, 2);
    }

    #[tokio::test]
    async fn test_failed_send_is_marked_and_batch_continues() {
        let sink = Arc::new(RecordingSink::failing_on("title-1"));
        let notifier = notifier(Arc::clone(&sink), &["42"]);
        let mut seen = MemoryStore::default();

        let batch = vec![listing("1", 500), listing("2", 600)];
        assert_eq!(deliver_new(&batch, &mut seen, &notifier).await, 1);
        assert_eq!(texts(&sink), vec!["title-2"]);
        assert!(seen.contains("1"));
        assert_eq!(seen.flushes, 1);

        // Not retried on the next cycle.
        assert_eq!(deliver_new(&batch, &mut seen, &notifier).await, 0);
    }

    #[tokio::test]
    async fn test_fans_out_to_every_destination() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(Arc::clone(&sink), &["1", "2"]);
        let mut seen = MemoryStore::default();

        assert_eq!(deliver_new(&[listing("a", 500)], &mut seen, &notifier).await, 1);
        let destinations: Vec<_> = sink.sent().into_iter().map(|(d, _)| d).collect();
        assert_eq!(destinations, vec!["1", "2"]);
    }
}
