//! Demo traffic over a fixed five-layer topology.
//!
//! Each [`TrafficLane`] and each [`MappingLayer`] runs as its own task on its
//! own timer. Tasks share nothing and only call the hub's public entry points.

use std::collections::BTreeMap;
use std::time::Duration;

use flowly_core::config::SyntheticConfig;
use flowly_hub::Broadcaster;
use flowly_protocol::{Edge, Message};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const LAYER_CS: u32 = 1;
pub const LAYER_NGINX: u32 = 2;
pub const LAYER_GAME: u32 = 3;
pub const LAYER_DATABASE: u32 = 4;
pub const LAYER_KAFKA: u32 = 5;

/// Node slots reserved per layer: layer `n` owns `node-{n*10}..node-{n*10+9}`.
pub const NODES_PER_LAYER: u32 = 10;
pub const EDGE_DURATION_MS: u32 = 500;
const MAX_EDGE_COUNT: u32 = 3;
const MAPPING_PROBABILITY: f64 = 0.25;

pub fn node_id(layer: u32, index: u32) -> String {
    format!("node-{}", layer * NODES_PER_LAYER + index)
}

/// Random edges from one layer to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficLane {
    pub source_layer: u32,
    pub source_count: u32,
    pub target_layer: u32,
    pub target_count: u32,
}

impl TrafficLane {
    pub const fn new(source_layer: u32, source_count: u32, target_layer: u32, target_count: u32) -> Self {
        Self {
            source_layer,
            source_count,
            target_layer,
            target_count,
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Edge {
        let source = node_id(self.source_layer, rng.random_range(0..self.source_count.max(1)));
        let target = node_id(self.target_layer, rng.random_range(0..self.target_count.max(1)));
        Edge::new(source, target, rng.random_range(1..=MAX_EDGE_COUNT), EDGE_DURATION_MS)
    }
}

/// Periodic aliases for a random subset of one layer's nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingLayer {
    pub layer: u32,
    pub alias_prefix: String,
}

impl MappingLayer {
    pub fn new(layer: u32, alias_prefix: impl Into<String>) -> Self {
        Self {
            layer,
            alias_prefix: alias_prefix.into(),
        }
    }

    /// `node-{layer*10+i}` → `{prefix}{i+1:02}`, each node kept with p = 0.25.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> BTreeMap<String, String> {
        (0..NODES_PER_LAYER)
            .filter(|_| rng.random_bool(MAPPING_PROBABILITY))
            .map(|idx| {
                (
                    node_id(self.layer, idx),
                    format!("{}{:02}", self.alias_prefix, idx + 1),
                )
            })
            .collect()
    }
}

/// The lanes and mapping layers the generator drives.
#[derive(Debug, Clone)]
pub struct Topology {
    pub lanes: Vec<TrafficLane>,
    pub mappings: Vec<MappingLayer>,
}

impl Default for Topology {
    /// Clients → load balancers → game servers → databases, with everything
    /// also talking to Kafka.
    fn default() -> Self {
        Self {
            lanes: vec![
                TrafficLane::new(LAYER_CS, 4, LAYER_NGINX, 2),
                TrafficLane::new(LAYER_NGINX, 2, LAYER_GAME, 8),
                TrafficLane::new(LAYER_GAME, 8, LAYER_DATABASE, 3),
                TrafficLane::new(LAYER_DATABASE, 3, LAYER_DATABASE, 3),
                TrafficLane::new(LAYER_KAFKA, 3, LAYER_KAFKA, 3),
                TrafficLane::new(LAYER_CS, 4, LAYER_KAFKA, 3),
                TrafficLane::new(LAYER_GAME, 8, LAYER_KAFKA, 3),
            ],
            mappings: vec![
                MappingLayer::new(LAYER_CS, "cs-"),
                MappingLayer::new(LAYER_NGINX, "iwg-lb-"),
                MappingLayer::new(LAYER_GAME, "iwg-game-"),
                MappingLayer::new(LAYER_DATABASE, "iwg-cassandra-"),
                MappingLayer::new(LAYER_KAFKA, "kafka-"),
            ],
        }
    }
}

/// Timer-driven producer of demo traffic.
pub struct SyntheticGenerator {
    topology: Topology,
    traffic_interval: Duration,
    mapping_interval: Duration,
}

impl SyntheticGenerator {
    pub fn new(config: &SyntheticConfig) -> Self {
        Self::with_topology(Topology::default(), config)
    }

    pub fn with_topology(topology: Topology, config: &SyntheticConfig) -> Self {
        Self {
            topology,
            traffic_interval: Duration::from_millis(config.traffic_interval_ms.max(1)),
            mapping_interval: Duration::from_millis(config.mapping_interval_ms.max(1)),
        }
    }

    /// Start one task per lane and per mapping layer. Every task stops when
    /// `shutdown` flips to `true` or its sender is dropped.
    pub fn spawn<B>(self, hub: B, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>>
    where
        B: Broadcaster + Clone + 'static,
    {
        info!(
            lanes = self.topology.lanes.len(),
            mapping_layers = self.topology.mappings.len(),
            "starting synthetic traffic generator"
        );

        let mut tasks = Vec::new();
        for lane in self.topology.lanes {
            let hub = hub.clone();
            let shutdown = shutdown.clone();
            let period = self.traffic_interval;
            tasks.push(tokio::spawn(async move {
                every(period, shutdown, |rng| {
                    let hub = hub.clone();
                    let message = Message::traffic(vec![lane.sample(rng)]);
                    async move { publish(&hub, &message).await }
                })
                .await;
            }));
        }
        for layer in self.topology.mappings {
            let hub = hub.clone();
            let shutdown = shutdown.clone();
            let period = self.mapping_interval;
            tasks.push(tokio::spawn(async move {
                every(period, shutdown, |rng| {
                    let hub = hub.clone();
                    let mapping = layer.sample(rng);
                    async move {
                        if !mapping.is_empty() {
                            publish(&hub, &Message::Mapping { mapping }).await;
                        }
                    }
                })
                .await;
            }));
        }
        tasks
    }
}

/// Run `tick` on a fixed period until shutdown, with a task-local RNG.
async fn every<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut(&mut StdRng) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut rng = StdRng::from_os_rng();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => tick(&mut rng).await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("synthetic task stopping");
                    break;
                }
            }
        }
    }
}

async fn publish<B: Broadcaster>(hub: &B, message: &Message) {
    if let Err(e) = hub.broadcast_message(message).await {
        warn!(kind = message.kind(), error = %e, "could not broadcast synthetic message");
    }
}
