use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    broadcaster::Broadcaster,
    connection::{Connection, ConnectionId, EnqueueError},
    error::{HubError, Result},
    Frame,
};

/// Requests serialized through the hub's control loop.
enum HubEvent {
    Register(Connection),
    Unregister(ConnectionId),
    Broadcast(Frame),
    Stats(oneshot::Sender<HubStats>),
}

/// Point-in-time counters, answered by the control loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Connections currently registered.
    pub viewers: usize,
    /// Connections registered since start.
    pub registered: u64,
    /// Connections dropped because their queue was full.
    pub evicted: u64,
    /// Frames fanned out since start.
    pub broadcasts: u64,
}

/// Owner of the live connection set.
///
/// Only [`Hub::run`] reads or mutates `connections`; every other task goes
/// through a [`HubHandle`]. No locks are needed on membership.
pub struct Hub {
    connections: HashMap<ConnectionId, Connection>,
    events: mpsc::Receiver<HubEvent>,
    stats: HubStats,
}

impl Hub {
    /// Create a hub and the first handle to it.
    ///
    /// `event_capacity` bounds the control loop's inbox; producers wait when
    /// it is full, viewers never make the loop wait.
    pub fn new(event_capacity: usize) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(event_capacity.max(1));
        let hub = Self {
            connections: HashMap::new(),
            events: rx,
            stats: HubStats::default(),
        };
        (hub, HubHandle { events: tx })
    }

    /// Create a hub and run its control loop on a background task.
    pub fn spawn(event_capacity: usize) -> HubHandle {
        let (hub, handle) = Self::new(event_capacity);
        tokio::spawn(hub.run());
        handle
    }

    /// Control loop. Returns once every [`HubHandle`] has been dropped; the
    /// remaining connections are dropped with it, closing their queues.
    pub async fn run(mut self) {
        info!("broadcast hub started");
        while let Some(event) = self.events.recv().await {
            self.handle(event);
        }
        info!(viewers = self.connections.len(), "broadcast hub stopped");
    }

    fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register(conn) => {
                let id = conn.id();
                self.connections.insert(id, conn);
                self.stats.registered += 1;
                debug!(conn_id = %id, viewers = self.connections.len(), "viewer registered");
            }
            HubEvent::Unregister(id) => {
                // Dropping the connection drops the queue sender, which ends its write pump.
                if self.connections.remove(&id).is_some() {
                    debug!(conn_id = %id, viewers = self.connections.len(), "viewer unregistered");
                }
            }
            HubEvent::Broadcast(frame) => self.fan_out(&frame),
            HubEvent::Stats(reply) => {
                let _ = reply.send(HubStats {
                    viewers: self.connections.len(),
                    ..self.stats
                });
            }
        }
    }

    /// Non-blocking enqueue onto every registered connection.
    fn fan_out(&mut self, frame: &Frame) {
        let Hub {
            connections, stats, ..
        } = self;
        stats.broadcasts += 1;

        connections.retain(|id, conn| match conn.try_enqueue(Arc::clone(frame)) {
            Ok(()) => true,
            Err(EnqueueError::Full) => {
                stats.evicted += 1;
                warn!(conn_id = %id, "evicting slow viewer (outbound queue full)");
                false
            }
            Err(EnqueueError::Closed) => {
                debug!(conn_id = %id, "dropping viewer with closed queue");
                false
            }
        });
    }
}

/// Cloneable entry point into a running [`Hub`].
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    /// Add a connection to the live set.
    pub async fn register(&self, connection: Connection) {
        let id = connection.id();
        if self.events.send(HubEvent::Register(connection)).await.is_err() {
            warn!(conn_id = %id, "hub stopped, connection not registered");
        }
    }

    /// Remove a connection and close its queue. No-op if it is already gone.
    pub async fn unregister(&self, id: ConnectionId) {
        let _ = self.events.send(HubEvent::Unregister(id)).await;
    }

    /// Snapshot of the hub's counters.
    pub async fn stats(&self) -> Result<HubStats> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(HubEvent::Stats(tx))
            .await
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }
}

#[async_trait]
impl Broadcaster for HubHandle {
    async fn broadcast_raw(&self, frame: Frame) {
        if self.events.send(HubEvent::Broadcast(frame)).await.is_err() {
            debug!("hub stopped, frame dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowly_protocol::{Edge, Message};
    use std::time::Duration;

    fn frame(text: &str) -> Frame {
        Frame::from(text)
    }

    async fn connect(hub: &HubHandle, capacity: usize) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let (conn, rx) = Connection::new(capacity);
        let id = conn.id();
        hub.register(conn).await;
        (id, rx)
    }

    #[tokio::test]
    async fn register_then_broadcast_delivers() {
        let hub = Hub::spawn(16);
        let (_, mut rx) = connect(&hub, 4).await;

        hub.broadcast_raw(frame("hello")).await;

        let got = rx.recv().await.expect("frame");
        assert_eq!(&*got, "hello");
        assert_eq!(hub.stats().await.unwrap().viewers, 1);
    }

    #[tokio::test]
    async fn full_queues_are_evicted_without_blocking_others() {
        let hub = Hub::spawn(16);
        let mut healthy = Vec::new();
        let mut stalled = Vec::new();

        for i in 0..6 {
            let (conn, rx) = Connection::new(1);
            if i % 3 == 0 {
                // fill the queue up front; nobody drains it
                conn.try_enqueue(frame("stale")).unwrap();
                stalled.push(rx);
            } else {
                healthy.push(rx);
            }
            hub.register(conn).await;
        }

        tokio::time::timeout(Duration::from_secs(1), hub.broadcast_raw(frame("fresh")))
            .await
            .expect("broadcast must not block on stalled viewers");

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.viewers, healthy.len());
        assert_eq!(stats.evicted, stalled.len() as u64);

        for rx in &mut healthy {
            assert_eq!(&*rx.recv().await.unwrap(), "fresh");
        }
        for rx in &mut stalled {
            assert_eq!(&*rx.recv().await.unwrap(), "stale");
            assert!(rx.recv().await.is_none(), "evicted queue must be closed");
        }
    }

    #[tokio::test]
    async fn per_viewer_order_is_preserved() {
        let hub = Hub::spawn(16);
        let (_, mut a) = connect(&hub, 128).await;
        let (_, mut b) = connect(&hub, 128).await;

        for i in 0..100 {
            hub.broadcast_raw(Frame::from(i.to_string())).await;
        }

        for rx in [&mut a, &mut b] {
            for i in 0..100 {
                assert_eq!(&*rx.recv().await.unwrap(), i.to_string());
            }
        }
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = Hub::spawn(16);
        let (gone, mut gone_rx) = connect(&hub, 4).await;
        let (_, mut kept_rx) = connect(&hub, 4).await;
        let (never_registered, _rx) = Connection::new(1);

        hub.unregister(gone).await;
        hub.unregister(gone).await;
        hub.unregister(never_registered.id()).await;

        hub.broadcast_raw(frame("still here")).await;

        assert!(gone_rx.recv().await.is_none());
        assert_eq!(&*kept_rx.recv().await.unwrap(), "still here");
        assert_eq!(hub.stats().await.unwrap().viewers, 1);
    }

    #[tokio::test]
    async fn late_viewer_sees_only_later_frames() {
        let hub = Hub::spawn(16);
        let message = Message::traffic(vec![Edge::new("node-10", "node-21", 2, 500)]);

        hub.broadcast_message(&message).await.unwrap();
        let (_, mut rx) = connect(&hub, 4).await;
        hub.broadcast_message(&message).await.unwrap();

        // round trip through the loop so the second frame has been fanned out
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.broadcasts, 2);

        let got = rx.try_recv().expect("one frame");
        assert!(rx.try_recv().is_err(), "exactly one frame expected");

        let decoded = Message::decode(got.as_bytes()).unwrap();
        assert_eq!(decoded.kind(), "traffic");
        let Message::Traffic { pings } = decoded else {
            panic!("expected traffic");
        };
        assert_eq!(pings, vec![Edge::new("node-10", "node-21", 2, 500)]);
    }

    #[tokio::test]
    async fn stalled_viewer_is_evicted_on_overflow() {
        let hub = Hub::spawn(16);
        let (_, mut rx) = connect(&hub, 1).await;

        hub.broadcast_raw(frame("first")).await;
        assert_eq!(hub.stats().await.unwrap().viewers, 1);

        hub.broadcast_raw(frame("second")).await;
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.viewers, 0);
        assert_eq!(stats.evicted, 1);

        // the pump was paused: it still finds the first frame, then a closed queue
        assert_eq!(&*rx.recv().await.unwrap(), "first");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_queue_is_dropped_silently() {
        let hub = Hub::spawn(16);
        let (_, rx) = connect(&hub, 4).await;
        drop(rx);

        hub.broadcast_raw(frame("x")).await;
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.viewers, 0);
        assert_eq!(stats.evicted, 0);
    }

    #[tokio::test]
    async fn encoding_failure_is_reported_and_nothing_is_sent() {
        let hub = Hub::spawn(16);
        let (_, mut rx) = connect(&hub, 4).await;

        // JSON object keys must be strings
        let unencodable: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);
        let err = hub.broadcast_object(&unencodable).await.unwrap_err();
        assert!(matches!(err, HubError::Encode(_)));

        assert_eq!(hub.stats().await.unwrap().broadcasts, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_loop() {
        let (hub, handle) = Hub::new(4);
        let task = tokio::spawn(hub.run());
        let (_, mut rx) = connect(&handle, 4).await;

        drop(handle);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop ends")
            .unwrap();
        assert!(rx.recv().await.is_none());
    }
}
