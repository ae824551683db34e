use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{AssetId, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for lifecycle facts, per asset plus one firehose.
///
/// Delivery is the subscriber's concern; a slow subscriber lags and loses
/// the oldest facts rather than blocking the engine.
pub struct NotifyHub {
    channels: DashMap<AssetId, broadcast::Sender<Event>>,
    all: broadcast::Sender<Event>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY * 4).0,
        }
    }

    /// Subscribe to one asset. Creates the channel if needed.
    pub fn subscribe(&self, asset_id: AssetId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(asset_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to every asset.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    /// Publish a fact. No-op if nobody is listening.
    pub fn send(&self, asset_id: AssetId, event: &Event) {
        if let Some(sender) = self.channels.get(&asset_id) {
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn released(asset_id: AssetId) -> Event {
        Event::IntervalReleased {
            id: Ulid::new(),
            asset_id,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let asset = Ulid::new();
        let mut rx = hub.subscribe(asset);
        let mut all = hub.subscribe_all();

        let event = released(asset);
        hub.send(asset, &event);

        assert_eq!(rx.recv().await.unwrap(), event);
        assert_eq!(all.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn other_assets_are_not_delivered() {
        let hub = NotifyHub::new();
        let mine = Ulid::new();
        let mut rx = hub.subscribe(mine);
        let other = Ulid::new();
        hub.send(other, &released(other));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let asset = Ulid::new();
        hub.send(asset, &released(asset));
    }
}
