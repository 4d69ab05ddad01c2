//! Streaming ingestion of live sensor readings over MQTT.
//!
//! One task per water-level sensor topic runs [`maintain`]: if its [`Link`]
//! is down it reconnects and resubscribes, then waits for the
//! [`ReconnectPolicy`] delay before checking again, until cancelled.
//! Delivered payloads go through [`dispatch_message`], which parses them and
//! hands the reading to a [`ReadingSink`] (the alert engine in production).
//!
//! The connection check and the reconnect policy are traits so the fixed
//! interval can be replaced (e.g. by backoff) without touching alerting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::IngestError;
use crate::models::{SensorReading, Tank};
use crate::registry::Registry;

/// Sub-topic that carries the raw reading.
pub const VALUE_SUBTOPIC: &str = "value";

/// Fixed wait between connection checks.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes buffered per topic while the consumer is busy evaluating.
const READING_QUEUE_DEPTH: usize = 64;

// ---

/// Subscription filter for one sensor: `devices/{tank}/sensors/{sensor}/#`.
pub fn subscription_topic(tank_id: &str, sensor_id: &str) -> String {
    format!("devices/{tank_id}/sensors/{sensor_id}/#")
}

/// Subscription filters for every water-level sensor of every tank.
pub fn water_level_topics(tanks: &[Tank]) -> Vec<String> {
    tanks
        .iter()
        .flat_map(|t| {
            t.water_level_sensors()
                .map(move |s| subscription_topic(&t.id, &s.id))
        })
        .collect()
}

/// Extract `(tank_id, sensor_id)` from `devices/{tank}/sensors/{sensor}/value`.
pub fn parse_reading_topic(topic: &str) -> Option<(&str, &str)> {
    let mut parts = topic.split('/');
    match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some("devices"), Some(tank), Some("sensors"), Some(sensor), Some(VALUE_SUBTOPIC), None)
            if !tank.is_empty() && !sensor.is_empty() =>
        {
            Some((tank, sensor))
        }
        _ => None,
    }
}

/// Parse a payload serialized as a plain decimal string.
pub fn parse_payload(topic: &str, payload: &[u8]) -> Result<f64, IngestError> {
    // ---
    let text = std::str::from_utf8(payload).map_err(|e| IngestError::Payload {
        topic: topic.to_string(),
        reason: e.to_string(),
    })?;

    let value = text.trim().parse::<f64>().map_err(|e| IngestError::Payload {
        topic: topic.to_string(),
        reason: format!("{e}: {text:?}"),
    })?;

    if !value.is_finite() {
        return Err(IngestError::Payload {
            topic: topic.to_string(),
            reason: format!("non-finite value {text:?}"),
        });
    }
    Ok(value)
}

/// Consumer of parsed readings.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn on_reading(&self, reading: SensorReading);
}

/// Route one delivered message to the sink. Returns whether it was consumed.
///
/// Other sub-topics are ignored and bad payloads are dropped; neither is an
/// error for the caller.
pub async fn dispatch_message(sink: &dyn ReadingSink, topic: &str, payload: &[u8]) -> bool {
    // ---
    let Some((tank_id, sensor_id)) = parse_reading_topic(topic) else {
        debug!(topic, "Ignoring message on non-value topic");
        return false;
    };

    match parse_payload(topic, payload) {
        Ok(raw_value) => {
            let reading = SensorReading {
                tank_id: tank_id.to_string(),
                sensor_id: sensor_id.to_string(),
                raw_value,
                timestamp: Utc::now(),
            };
            sink.on_reading(reading).await;
            true
        }
        Err(e) => {
            warn!("Dropping message: {}", e);
            false
        }
    }
}

// ---

/// A (re)connectable subscription to one topic.
#[async_trait]
pub trait Link: Send {
    fn topic(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Connect and subscribe, replacing any previous connection.
    async fn connect(&mut self) -> Result<(), IngestError>;

    async fn disconnect(&mut self);
}

/// Decides how long to wait before the next connection check.
pub trait ReconnectPolicy: Send {
    /// `connected` is the link state after this round.
    fn next_delay(&mut self, connected: bool) -> Duration;
}

/// Same delay every round, whether connected or not.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval(pub Duration);

impl Default for FixedInterval {
    fn default() -> Self {
        FixedInterval(DEFAULT_RECONNECT_INTERVAL)
    }
}

impl ReconnectPolicy for FixedInterval {
    fn next_delay(&mut self, _connected: bool) -> Duration {
        self.0
    }
}

/// Keep `link` connected until `cancel` fires, then disconnect it.
pub async fn maintain<L, P>(mut link: L, mut policy: P, cancel: CancellationToken)
where
    L: Link,
    P: ReconnectPolicy,
{
    // ---
    loop {
        if !link.is_connected() {
            info!(topic = link.topic(), "Connecting to broker");
            match link.connect().await {
                Ok(()) => info!(topic = link.topic(), "Subscribed"),
                Err(e) => warn!(topic = link.topic(), "Connect failed: {}", e),
            }
        }

        let delay = policy.next_delay(link.is_connected());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    link.disconnect().await;
    info!(topic = link.topic(), "Subscription stopped");
}

// ---

/// Broker connection parameters shared by every topic link.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
}

/// [`Link`] backed by a `rumqttc` client. Each connect builds a fresh client
/// and event loop. A poller task keeps the event loop turning and forwards
/// publishes to a consumer task, which evaluates them in arrival order. The
/// event loop is never blocked on an evaluation, so keep-alive pings go out
/// on time however slow the registry or the notification endpoints are.
pub struct MqttLink {
    settings: MqttSettings,
    topic: String,
    sink: Arc<dyn ReadingSink>,
    connected: Arc<AtomicBool>,
    client: Option<AsyncClient>,
    poller: Option<JoinHandle<()>>,
}

impl MqttLink {
    pub fn new(
        settings: MqttSettings,
        topic: impl Into<String>,
        sink: Arc<dyn ReadingSink>,
    ) -> Self {
        Self {
            settings,
            topic: topic.into(),
            sink,
            connected: Arc::new(AtomicBool::new(false)),
            client: None,
            poller: None,
        }
    }

    fn options(&self) -> MqttOptions {
        let client_id = format!("tankflow-{}", Uuid::new_v4().simple());
        let mut opts = MqttOptions::new(client_id, self.settings.host.clone(), self.settings.port);
        opts.set_keep_alive(self.settings.keep_alive);
        opts
    }

    fn teardown(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.client = None;
    }
}

/// Clears a connection's flag when its poller ends, however it ends.
struct ConnectionGuard(Arc<AtomicBool>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<(), IngestError> {
    // ---
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => continue,
            Err(e) => return Err(IngestError::Connect(e.to_string())),
        }
    }
}

/// Queue a publish for the consumer without waiting. A full queue drops the
/// message; `false` means the consumer is gone.
fn forward(queue: &mpsc::Sender<Publish>, publish: Publish) -> bool {
    // ---
    match queue.try_send(publish) {
        Ok(()) => true,
        Err(TrySendError::Full(p)) => {
            warn!(topic = %p.topic, "Reading queue full, dropping message");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

async fn poll_messages(
    mut eventloop: EventLoop,
    topic: String,
    queue: mpsc::Sender<Publish>,
    connected: Arc<AtomicBool>,
) {
    // ---
    let _guard = ConnectionGuard(connected);
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                if !forward(&queue, p) {
                    error!(topic = %topic, "Reading consumer stopped, dropping connection");
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(topic = %topic, "Connection lost: {:?}", e);
                break;
            }
        }
    }
}

/// Evaluate queued publishes one at a time until the poller goes away.
async fn consume_messages(mut queue: mpsc::Receiver<Publish>, sink: Arc<dyn ReadingSink>) {
    // ---
    while let Some(p) = queue.recv().await {
        dispatch_message(sink.as_ref(), &p.topic, &p.payload).await;
    }
}

#[async_trait]
impl Link for MqttLink {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&mut self) -> Result<(), IngestError> {
        // ---
        self.teardown();
        debug!(
            "mqtt://{}:{} for {}",
            self.settings.host, self.settings.port, self.topic
        );

        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);
        tokio::time::timeout(CONNACK_TIMEOUT, await_connack(&mut eventloop))
            .await
            .map_err(|_| IngestError::Connect("timed out waiting for CONNACK".into()))??;

        client.subscribe(self.topic.clone(), QoS::AtLeastOnce).await?;

        // A fresh flag per connection, so a stale poller can only clear its own
        let connected = Arc::new(AtomicBool::new(true));
        let (queue, pending) = mpsc::channel(READING_QUEUE_DEPTH);

        tokio::spawn(consume_messages(pending, self.sink.clone()));
        self.poller = Some(tokio::spawn(poll_messages(
            eventloop,
            self.topic.clone(),
            queue,
            connected.clone(),
        )));
        self.connected = connected;
        self.client = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(client) = self.client.as_ref() {
            if let Err(e) = client.disconnect().await {
                debug!(topic = %self.topic, "Disconnect: {}", e);
            }
        }
        self.teardown();
    }
}

// ---

/// Discovers water-level topics and runs one [`maintain`] task per topic.
pub struct Supervisor {
    registry: Arc<dyn Registry>,
    sink: Arc<dyn ReadingSink>,
    settings: MqttSettings,
    interval: Duration,
}

impl Supervisor {
    pub fn new(
        registry: Arc<dyn Registry>,
        sink: Arc<dyn ReadingSink>,
        settings: MqttSettings,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            sink,
            settings,
            interval,
        }
    }

    /// List topics from the registry, retrying every interval until it
    /// answers. `None` if cancelled first.
    pub async fn discover_topics(&self, cancel: &CancellationToken) -> Option<Vec<String>> {
        // ---
        loop {
            match self.registry.tanks().await {
                Ok(tanks) => {
                    let topics = water_level_topics(&tanks);
                    info!(
                        "Discovered {} water-level topics across {} tanks",
                        topics.len(),
                        tanks.len()
                    );
                    return Some(topics);
                }
                Err(e) => warn!("Topic discovery failed, retrying: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Run MQTT subscriptions until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        // ---
        let settings = self.settings.clone();
        let sink = self.sink.clone();
        self.run_with(cancel, move |topic| {
            MqttLink::new(settings.clone(), topic, sink.clone())
        })
        .await;
    }

    /// Discover topics, then keep one link per topic built by `make_link`
    /// maintained until `cancel` fires.
    pub async fn run_with<L, F>(self, cancel: CancellationToken, mut make_link: F)
    where
        L: Link + 'static,
        F: FnMut(String) -> L,
    {
        // ---
        let Some(topics) = self.discover_topics(&cancel).await else {
            return;
        };

        let tasks: Vec<_> = topics
            .into_iter()
            .map(|topic| {
                let link = make_link(topic);
                tokio::spawn(maintain(link, FixedInterval(self.interval), cancel.clone()))
            })
            .collect();

        for task in tasks {
            if let Err(e) = task.await {
                error!("Subscription task ended abnormally: {}", e);
            }
        }
    }
}
