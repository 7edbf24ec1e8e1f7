//! Ordered change notifications for rendering and minimap collaborators.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use mapforge_core::Position;
use tracing::warn;

/// Events a subscriber may leave unread before it is cut off.
pub const DEFAULT_FEED_CAPACITY: usize = 16_384;

/// Something observable changed in a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent {
    /// The tile at a position was replaced, created or erased.
    TileChanged(Position),
    /// A house's exit moved.
    HouseExitMoved { house_id: u32 },
    /// A waypoint moved.
    WaypointMoved { name: String },
    /// The whole map was replaced (load finished, reload).
    MapReloaded,
}

/// Fan-out of map events to any number of subscribers.
///
/// Events are delivered in emission order. Each subscriber has a bounded
/// queue; emitting never blocks the editing thread.
#[derive(Debug)]
pub struct ChangeFeed {
    subscribers: Vec<SyncSender<MapEvent>>,
    capacity: usize,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed whose subscribers may fall at most `capacity` events behind.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open a new receiver.
    ///
    /// A subscriber is dropped from the feed when its receiver is dropped or
    /// when its queue is full at emit time. Events already queued stay
    /// readable, after which the receiver reports disconnection; a consumer
    /// that sees that has missed events and should resynchronise from the map.
    pub fn subscribe(&mut self) -> Receiver<MapEvent> {
        let (tx, rx) = mpsc::sync_channel(self.capacity);
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn emit(&mut self, event: MapEvent) {
        let capacity = self.capacity;
        self.subscribers
            .retain(|subscriber| match subscriber.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(capacity, "change subscriber fell behind, disconnecting it");
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let mut feed = ChangeFeed::new();
        let rx = feed.subscribe();
        feed.emit(MapEvent::TileChanged(Position::new(1, 1, 7)));
        feed.emit(MapEvent::MapReloaded);
        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                MapEvent::TileChanged(Position::new(1, 1, 7)),
                MapEvent::MapReloaded
            ]
        );
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut feed = ChangeFeed::new();
        let keep = feed.subscribe();
        drop(feed.subscribe());
        feed.emit(MapEvent::MapReloaded);
        assert_eq!(feed.subscriber_count(), 1);
        assert_eq!(keep.try_recv(), Ok(MapEvent::MapReloaded));
    }

    #[test]
    fn subscribers_that_fall_behind_are_cut_off() {
        let mut feed = ChangeFeed::with_capacity(2);
        let slow = feed.subscribe();
        for x in 0..3 {
            feed.emit(MapEvent::TileChanged(Position::new(x, 0, 7)));
        }
        assert_eq!(feed.subscriber_count(), 0);

        let queued: Vec<_> = slow.try_iter().collect();
        assert_eq!(
            queued,
            vec![
                MapEvent::TileChanged(Position::new(0, 0, 7)),
                MapEvent::TileChanged(Position::new(1, 0, 7))
            ]
        );
        assert_eq!(slow.try_recv(), Err(mpsc::TryRecvError::Disconnected));
    }
}
