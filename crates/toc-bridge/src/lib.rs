//! The Bridge: process-wide typed message router (spec §4.1).
//!
//! Generalizes the teacher's `AgentBus` (per-agent channel map, broadcast
//! channel, lag-policy receive loop) from an in-process pub/sub primitive to
//! the Bridge's specific contract: validate, rate-limit, sign, route to a
//! single target or broadcast, append to history, dead-letter on failure.

pub mod metrics;
pub mod server;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use toc_kernel::bus::{BusError, LagPolicy};
use toc_kernel::model::{is_valid_component_id, ComponentRegistration, DeadLetter, RingBuffer};
use toc_kernel::ratelimit::RateLimiterRegistry;
use toc_kernel::wire::{Message, MessageTarget, MessageType};

use crate::metrics::{BridgeMetrics, BridgeMetricsSnapshot};

pub const DEFAULT_HISTORY_CAP: usize = 1000;
pub const DEFAULT_DEAD_LETTER_CAP: usize = 1000;
pub const DEFAULT_INBOX_CAP: usize = 256;
pub const DEFAULT_TOKENS_PER_SECOND: f64 = 100.0;
pub const DEFAULT_TRANSPORT_ATTEMPTS: u32 = 3;
pub const DEFAULT_HEARTBEAT_CADENCE_MS: u64 = 1000;
pub const DEFAULT_MISSED_HEARTBEAT_THRESHOLD: u32 = 3;

pub struct BridgeConfig {
    pub bridge_secret: Option<Vec<u8>>,
    pub history_cap: usize,
    pub dead_letter_cap: usize,
    pub inbox_cap: usize,
    pub tokens_per_second: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_secret: None,
            history_cap: DEFAULT_HISTORY_CAP,
            dead_letter_cap: DEFAULT_DEAD_LETTER_CAP,
            inbox_cap: DEFAULT_INBOX_CAP,
            tokens_per_second: DEFAULT_TOKENS_PER_SECOND,
        }
    }
}

struct ComponentLink {
    registration: ComponentRegistration,
    inbox: mpsc::Sender<Message>,
}

/// Filter for `history()` queries (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub message_type: Option<MessageType>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub since_ms: Option<u64>,
    pub limit: usize,
}

pub struct Bridge {
    config: BridgeConfig,
    components: DashMap<String, ComponentLink>,
    history: Mutex<RingBuffer<Message>>,
    dead_letters: Mutex<RingBuffer<DeadLetter>>,
    rate_limiter: RateLimiterRegistry,
    broadcast_tx: broadcast::Sender<Message>,
    metrics: BridgeMetrics,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let (broadcast_tx, _rx) = broadcast::channel(DEFAULT_INBOX_CAP);
        Self {
            rate_limiter: RateLimiterRegistry::new(config.tokens_per_second, config.tokens_per_second * 2.0),
            history: Mutex::new(RingBuffer::new(config.history_cap)),
            dead_letters: Mutex::new(RingBuffer::new(config.dead_letter_cap)),
            components: DashMap::new(),
            broadcast_tx,
            metrics: BridgeMetrics::new(),
            config,
        }
    }

    pub fn metrics(&self) -> BridgeMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Register a component and hand back its inbox receiver. Fails if the
    /// id is structurally invalid or already registered.
    pub fn register(
        &self,
        component_id: &str,
        declared_version: &str,
    ) -> Result<mpsc::Receiver<Message>, BusError> {
        if !is_valid_component_id(component_id) {
            return Err(BusError::UnknownTarget(component_id.to_string()));
        }
        if self.components.contains_key(component_id) {
            return Err(BusError::UnknownTarget(format!(
                "{component_id} already registered"
            )));
        }
        let (tx, rx) = mpsc::channel(self.config.inbox_cap);
        self.components.insert(
            component_id.to_string(),
            ComponentLink {
                registration: ComponentRegistration::new(component_id, declared_version),
                inbox: tx,
            },
        );

        let announce = Message::new(
            "bridge",
            MessageTarget::Broadcast,
            MessageType::ComponentRegister,
            serde_json::json!({"componentId": component_id, "version": declared_version}),
        );
        let _ = self.broadcast_tx.send(announce.clone());
        self.push_history(announce);
        Ok(rx)
    }

    pub fn unregister(&self, component_id: &str) {
        if self.components.remove(component_id).is_some() {
            let announce = Message::new(
                "bridge",
                MessageTarget::Broadcast,
                MessageType::ComponentUnregister,
                serde_json::json!({"componentId": component_id}),
            );
            let _ = self.broadcast_tx.send(announce.clone());
            self.push_history(announce);
        }
    }

    pub fn heartbeat(&self, component_id: &str) -> bool {
        if let Some(mut link) = self.components.get_mut(component_id) {
            link.registration.last_heartbeat_ms = now_ms();
            true
        } else {
            false
        }
    }

    /// Validate, rate-limit, sign, and route a message (spec §4.1, §3).
    pub async fn publish(&self, mut message: Message) -> Result<(), BusError> {
        if !is_valid_component_id(&message.source) {
            return Err(BusError::UnknownTarget(message.source.clone()));
        }
        if message
            .exceeds_size_bound()
            .map_err(|_| BusError::TooLarge)?
        {
            return Err(BusError::TooLarge);
        }
        if !self.rate_limiter.check(&message.source) {
            self.metrics.record_rate_limited();
            return Err(BusError::RateLimited);
        }
        if let Some(secret) = &self.config.bridge_secret {
            message
                .sign(secret)
                .map_err(|_| BusError::BadSignature)?;
        }

        let source = message.source.clone();
        match message.target.clone() {
            MessageTarget::Component(target_id) => {
                self.deliver_to(&target_id, message.clone()).await;
            }
            MessageTarget::Broadcast => {
                let _ = self.broadcast_tx.send(message.clone());
                let targets: Vec<String> = self
                    .components
                    .iter()
                    .map(|e| e.key().clone())
                    .filter(|id| id != &message.source)
                    .collect();
                for target in targets {
                    self.deliver_to(&target, message.clone()).await;
                }
            }
        }

        self.metrics.record_published();
        self.heartbeat(&source);
        self.push_history(message);
        Ok(())
    }

    async fn deliver_to(&self, target_id: &str, message: Message) {
        let inbox = self.components.get(target_id).map(|l| l.inbox.clone());
        match inbox {
            Some(tx) => {
                if let Err(e) = tx.try_send(message.clone()) {
                    warn!(target = target_id, "inbox full, dead-lettering: {e}");
                    self.dead_letter(message, target_id, "transport-failed");
                } else {
                    self.metrics.record_delivered();
                }
            }
            None => {
                debug!(target = target_id, "no such target, dead-lettering");
                self.dead_letter(message, target_id, "no-such-target");
            }
        }
    }

    fn dead_letter(&self, message: Message, target: &str, reason: &str) {
        self.metrics.record_dead_lettered();
        let original = serde_json::to_value(&message).unwrap_or(serde_json::Value::Null);
        let dl = DeadLetter {
            id: message.id,
            original_message: original,
            target_component: target.to_string(),
            reason: reason.to_string(),
            timestamp_ms: now_ms(),
            retry_count: 0,
            last_retry_at_ms: None,
        };
        let mut ring = self.dead_letters.lock().unwrap();
        ring.push(dl);
    }

    fn push_history(&self, message: Message) {
        let mut history = self.history.lock().unwrap();
        history.push(message);
    }

    pub fn history(&self, filter: &HistoryFilter) -> Vec<Message> {
        let history = self.history.lock().unwrap();
        let limit = if filter.limit == 0 {
            DEFAULT_HISTORY_CAP
        } else {
            filter.limit
        };
        history
            .iter()
            .filter(|m| {
                filter.message_type.map(|t| t == m.message_type).unwrap_or(true)
                    && filter
                        .source
                        .as_ref()
                        .map(|s| s == &m.source)
                        .unwrap_or(true)
                    && filter
                        .target
                        .as_ref()
                        .map(|t| matches!(&m.target, MessageTarget::Component(id) if id == t))
                        .unwrap_or(true)
                    && filter.since_ms.map(|since| m.timestamp >= since).unwrap_or(true)
            })
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .take(limit)
            .collect()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().unwrap().iter().cloned().collect()
    }

    pub fn is_registered(&self, component_id: &str) -> bool {
        self.components.contains_key(component_id)
    }

    /// Evict components that have missed their heartbeat budget.
    pub fn sweep_dead_components(&self, cadence_ms: u64, missed_threshold: u32) -> Vec<String> {
        let dead: Vec<String> = self
            .components
            .iter()
            .filter(|e| e.value().registration.is_dead(cadence_ms, missed_threshold))
            .map(|e| e.key().clone())
            .collect();
        for id in &dead {
            self.unregister(id);
        }
        dead
    }

    /// Periodic explicit `heartbeat` publish (spec §3 lifecycle) for a
    /// registered component. Any successful `publish` already refreshes
    /// liveness, but a component idle between calls still needs this to
    /// avoid being swept as dead.
    pub fn spawn_heartbeat(self: &Arc<Self>, component_id: impl Into<String>, cadence: Duration) -> JoinHandle<()> {
        let bridge = self.clone();
        let component_id = component_id.into();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(cadence).await;
                let message = Message::new(
                    component_id.clone(),
                    MessageTarget::Broadcast,
                    MessageType::Heartbeat,
                    serde_json::json!({}),
                );
                if let Err(e) = bridge.publish(message).await {
                    warn!(component = component_id.as_str(), error = %e, "heartbeat publish failed");
                }
            }
        })
    }

    /// Periodic `sweep_dead_components` caller (spec §3: "dead after 3
    /// misses").
    pub fn spawn_sweep(self: &Arc<Self>, cadence_ms: u64, missed_threshold: u32) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(cadence_ms)).await;
                let dead = bridge.sweep_dead_components(cadence_ms, missed_threshold);
                for id in dead {
                    warn!(component = id, "swept dead component");
                }
            }
        })
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Lag policy applied when a subscriber's broadcast receiver falls behind
/// (spec §5 backpressure). The Bridge defaults to dropping and
/// dead-lettering rather than silently skipping, so a starved subscriber is
/// visible in `dead_letters()`.
pub const DEFAULT_LAG_POLICY: LagPolicy = LagPolicy::DropAndDeadLetter;

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> Bridge {
        Bridge::new(BridgeConfig::default())
    }

    #[tokio::test]
    async fn register_then_publish_delivers() {
        let bridge = bridge();
        let mut rx = bridge.register("igor-1", "0.1.0").unwrap();
        let msg = Message::new(
            "bridge",
            MessageTarget::component("igor-1"),
            MessageType::Heartbeat,
            serde_json::json!({}),
        );
        bridge.publish(msg).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.message_type, MessageType::Heartbeat);
    }

    #[tokio::test]
    async fn unknown_target_is_dead_lettered() {
        let bridge = bridge();
        let msg = Message::new(
            "igor-1",
            MessageTarget::component("nonexistent"),
            MessageType::Heartbeat,
            serde_json::json!({}),
        );
        bridge.publish(msg).await.unwrap();
        assert_eq!(bridge.dead_letters().len(), 1);
        assert_eq!(bridge.dead_letters()[0].reason, "no-such-target");
    }

    #[tokio::test]
    async fn invalid_source_is_rejected() {
        let bridge = bridge();
        let msg = Message::new(
            "not-a-valid-id!",
            MessageTarget::Broadcast,
            MessageType::Heartbeat,
            serde_json::json!({}),
        );
        assert!(matches!(
            bridge.publish(msg).await,
            Err(BusError::UnknownTarget(_))
        ));
    }

    #[tokio::test]
    async fn rate_limited_source_is_rejected() {
        let mut config = BridgeConfig::default();
        config.tokens_per_second = 1.0;
        let bridge = Bridge::new(config);
        let _rx = bridge.register("igor-1", "0.1.0").unwrap();
        for _ in 0..2 {
            let _ = bridge
                .publish(Message::new(
                    "igor-1",
                    MessageTarget::Broadcast,
                    MessageType::Heartbeat,
                    serde_json::json!({}),
                ))
                .await;
        }
        let result = bridge
            .publish(Message::new(
                "igor-1",
                MessageTarget::Broadcast,
                MessageType::Heartbeat,
                serde_json::json!({}),
            ))
            .await;
        assert!(matches!(result, Err(BusError::RateLimited)));
    }

    #[tokio::test]
    async fn signing_round_trips_when_secret_configured() {
        let mut config = BridgeConfig::default();
        config.bridge_secret = Some(b"super-secret-bridge-key".to_vec());
        let bridge = Bridge::new(config);
        let mut rx = bridge.register("igor-1", "0.1.0").unwrap();
        bridge
            .publish(Message::new(
                "bridge",
                MessageTarget::component("igor-1"),
                MessageType::Heartbeat,
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        let received = rx.recv().await.unwrap();
        assert!(received.signature.is_some());
        assert!(received.verify(b"super-secret-bridge-key").unwrap());
    }
}
