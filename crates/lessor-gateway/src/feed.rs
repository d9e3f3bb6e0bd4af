//! In-process marketplace event queue
//!
//! The marketplace bridge pushes events over IPC (`SubmitEvent`); the daemon
//! enqueues them here and the marketplace worker drains them on each poll.

use async_trait::async_trait;
use lessor_api::MarketplaceEvent;
use lessor_gateway_api::{GatewayError, GatewayResult, MarketplaceFeed};
use tokio::sync::{Mutex, mpsc};

/// Receiving half, handed to the marketplace worker
pub struct QueuedFeed {
    rx: Mutex<mpsc::UnboundedReceiver<MarketplaceEvent>>,
}

/// Sending half, cloned into every producer
#[derive(Clone)]
pub struct FeedSender {
    tx: mpsc::UnboundedSender<MarketplaceEvent>,
}

impl QueuedFeed {
    pub fn channel() -> (FeedSender, QueuedFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            FeedSender { tx },
            QueuedFeed { rx: Mutex::new(rx) },
        )
    }
}

impl FeedSender {
    pub fn submit(&self, event: MarketplaceEvent) -> GatewayResult<()> {
        self.tx
            .send(event)
            .map_err(|_| GatewayError::Internal("marketplace queue closed".into()))
    }
}

#[async_trait]
impl MarketplaceFeed for QueuedFeed {
    async fn poll(&self) -> GatewayResult<Vec<MarketplaceEvent>> {
        let mut rx = self.rx.lock().await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(text: &str) -> MarketplaceEvent {
        MarketplaceEvent::NewFeedback { text: text.into() }
    }

    #[tokio::test]
    async fn poll_drains_in_arrival_order() {
        let (sender, feed) = QueuedFeed::channel();
        sender.submit(feedback("first")).unwrap();
        sender.clone().submit(feedback("second")).unwrap();

        let events = feed.poll().await.unwrap();
        assert_eq!(events, vec![feedback("first"), feedback("second")]);
        assert!(feed.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_after_feed_dropped_fails() {
        let (sender, feed) = QueuedFeed::channel();
        drop(feed);
        assert!(matches!(
            sender.submit(feedback("late")),
            Err(GatewayError::Internal(_))
        ));
    }
}
