//! MQTT event subscriber with auto-reconnect.
//!
//! Connects to the hub's local broker, subscribes to the network's report
//! topic, and forwards decoded [`DeviceEvent`]s over an `mpsc` channel.
//! Every connection attempt authenticates with a freshly obtained access
//! token, so a token that expired while disconnected is never replayed.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use yolocal_api::{EventSubscriber, ReconnectConfig};
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(1024);
//! let subscriber = EventSubscriber::start(credentials, token_manager, ReconnectConfig::default(), tx);
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{} {:?}", event.device_id, event.data);
//! }
//!
//! subscriber.stop().await;
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, SubscribeReasonCode};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{HubCredentials, TokenManager};
use crate::error::Error;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CHANNEL_CAPACITY: usize = 10;
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// Topic carrying every device report for one hub network.
pub fn report_topic(net_id: &str) -> String {
    format!("ylsubnet/{net_id}/+/report")
}

// ── DeviceEvent ──────────────────────────────────────────────────────

/// A device report decoded from an MQTT publish.
///
/// `data` holds only the attributes the report carried; merging them into
/// a full device state is the consumer's job.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub device_id: String,
    /// Event name as sent by the hub, e.g. `"DoorSensor.Alert"`. Empty if absent.
    pub event: String,
    pub data: Map<String, Value>,
    /// Hub clock at the time of the report.
    pub timestamp: Option<DateTime<Utc>>,
    /// Local clock when the publish was received.
    pub received_at: DateTime<Utc>,
}

/// Decode a report payload into a [`DeviceEvent`].
///
/// The hub uses several payload shapes; changed attributes are taken from
/// `data`, then `params.data` or `params`, then a bare top-level `state`.
pub fn decode_event(payload: &[u8], received_at: DateTime<Utc>) -> Result<DeviceEvent, Error> {
    let value: Value = serde_json::from_slice(payload).map_err(|e| Error::MalformedEvent {
        reason: format!("invalid JSON: {e}"),
    })?;

    let Value::Object(mut root) = value else {
        return Err(Error::MalformedEvent {
            reason: "payload is not a JSON object".into(),
        });
    };

    let device_id = match root.get("deviceId") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        _ => {
            return Err(Error::MalformedEvent {
                reason: "missing deviceId".into(),
            });
        }
    };

    let event = root
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let raw = match root.remove("data").filter(|v| !v.is_null()) {
        Some(data) => Some(data),
        None => match root.remove("params") {
            Some(Value::Object(mut params)) => Some(
                params
                    .remove("data")
                    .unwrap_or_else(|| Value::Object(params)),
            ),
            _ => root.get("state").map(|s| {
                let mut wrapped = Map::new();
                wrapped.insert("state".into(), s.clone());
                Value::Object(wrapped)
            }),
        },
    };

    let mut data = match raw {
        Some(Value::Object(map)) => map,
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            let mut wrapped = Map::new();
            wrapped.insert("state".into(), other);
            wrapped
        }
    };

    let time = root.get("time").filter(|t| !t.is_null()).cloned();
    let timestamp = time
        .as_ref()
        .and_then(Value::as_i64)
        .and_then(DateTime::from_timestamp_millis);

    if let Some(time) = time {
        data.entry("reportAt").or_insert(time);
    }
    if let Some(online) = root.get("online") {
        data.entry("online").or_insert_with(|| online.clone());
    }

    Ok(DeviceEvent {
        device_id,
        event,
        data,
        timestamp,
        received_at,
    })
}

// ── SubscriptionState ────────────────────────────────────────────────

/// Lifecycle of the broker subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not started, stopped, or gave up after `max_retries`.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Subscribed and receiving reports.
    Connected,
    /// Lost the connection; reconnecting with backoff.
    Degraded,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
        })
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for broker reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay, jitter included. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── EventSubscriber ──────────────────────────────────────────────────

/// Handle to the running subscriber task.
pub struct EventSubscriber {
    cancel: CancellationToken,
    state_rx: watch::Receiver<SubscriptionState>,
    malformed: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl EventSubscriber {
    /// Spawn the subscriber task and return immediately.
    ///
    /// The first connection attempt happens in the background; watch
    /// [`watch_state`](Self::watch_state) to observe it.
    pub fn start(
        credentials: HubCredentials,
        auth: Arc<TokenManager>,
        reconnect: ReconnectConfig,
        events: mpsc::Sender<DeviceEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Connecting);
        let malformed = Arc::new(AtomicU64::new(0));

        let session = Session {
            credentials,
            auth,
            reconnect,
            events,
            state: state_tx,
            malformed: Arc::clone(&malformed),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(subscriber_loop(session));

        Self {
            cancel,
            state_rx,
            malformed,
            task,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state_rx.clone()
    }

    /// Number of publishes dropped because they could not be decoded.
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Cancel the task, close the connection, and wait for the task to end.
    ///
    /// No event is sent on the channel after this returns.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "MQTT subscriber task ended abnormally");
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

struct Session {
    credentials: HubCredentials,
    auth: Arc<TokenManager>,
    reconnect: ReconnectConfig,
    events: mpsc::Sender<DeviceEvent>,
    state: watch::Sender<SubscriptionState>,
    malformed: Arc<AtomicU64>,
    cancel: CancellationToken,
}

/// Main loop: connect → subscribe → read → on loss, backoff → reconnect.
async fn subscriber_loop(session: Session) {
    let mut attempt: u32 = 0;

    while !session.cancel.is_cancelled() {
        match connect_and_read(&session, &mut attempt).await {
            Ok(()) => break,
            Err(e) => {
                session.state.send_replace(SubscriptionState::Degraded);
                tracing::warn!(error = %e, attempt, "MQTT connection lost");

                if let Some(max) = session.reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(max_retries = max, "MQTT reconnection limit reached, giving up");
                        break;
                    }
                }

                let delay = calculate_backoff(attempt, &session.reconnect, jitter_sample());
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "Waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = session.cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt = attempt.saturating_add(1);
            }
        }
    }

    session.state.send_replace(SubscriptionState::Disconnected);
    tracing::debug!("MQTT subscriber exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Run one broker connection until it drops (`Err`) or the subscriber is
/// cancelled (`Ok`). `attempt` is reset once the subscription is confirmed.
async fn connect_and_read(session: &Session, attempt: &mut u32) -> Result<(), Error> {
    let token = tokio::select! {
        biased;
        () = session.cancel.cancelled() => return Ok(()),
        token = session.auth.get_token() => token?,
    };

    let client_id = format!("yolocal-{}", uuid::Uuid::new_v4().simple());
    let mut options = MqttOptions::new(
        client_id,
        session.credentials.host.clone(),
        session.credentials.mqtt_port,
    );
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    options.set_credentials(
        session.auth.client_id(),
        token.secret().expose_secret(),
    );

    let topic = report_topic(&session.credentials.net_id);
    tracing::info!(
        host = %session.credentials.host,
        port = session.credentials.mqtt_port,
        "Connecting to MQTT broker"
    );

    let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

    loop {
        let polled = tokio::select! {
            biased;
            () = session.cancel.cancelled() => {
                let _ = client.try_disconnect();
                let _ = tokio::time::timeout(DISCONNECT_GRACE, eventloop.poll()).await;
                return Ok(());
            }
            polled = eventloop.poll() => polled,
        };

        let packet = match polled {
            Ok(Event::Incoming(packet)) => packet,
            Ok(Event::Outgoing(_)) => continue,
            Err(e) => return Err(Error::MqttConnect(e.to_string())),
        };

        match packet {
            Packet::ConnAck(_) => {
                tracing::debug!(topic = %topic, "MQTT connected, subscribing");
                client
                    .try_subscribe(topic.clone(), QoS::AtMostOnce)
                    .map_err(|e| Error::MqttConnect(e.to_string()))?;
            }
            Packet::SubAck(ack) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|c| matches!(c, SubscribeReasonCode::Failure))
                {
                    return Err(Error::MqttSubscribe { topic });
                }
                tracing::info!(topic = %topic, "MQTT subscribed");
                session.state.send_replace(SubscriptionState::Connected);
                *attempt = 0;
            }
            Packet::Publish(publish) => match decode_event(&publish.payload, Utc::now()) {
                Ok(event) => {
                    tracing::trace!(device_id = %event.device_id, event = %event.event, "device report");
                    tokio::select! {
                        biased;
                        () = session.cancel.cancelled() => return Ok(()),
                        sent = session.events.send(event) => {
                            if sent.is_err() {
                                tracing::debug!("event receiver dropped, stopping subscriber");
                                return Ok(());
                            }
                        }
                    }
                }
                Err(e) => {
                    session.malformed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(error = %e, topic = %publish.topic, "dropping malformed report");
                }
            },
            Packet::Disconnect => {
                return Err(Error::MqttConnect("broker sent DISCONNECT".into()));
            }
            _ => {}
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter, hard-capped at `max_delay`.
///
/// `delay = min(initial * 2^attempt * (1 + 0.25 * jitter), max)` where
/// `jitter` lies in `[-1, 1]`.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig, jitter: f64) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);

    let jitter_factor = 1.0 + 0.25 * jitter.clamp(-1.0, 1.0);
    let with_jitter = (base * jitter_factor)
        .min(config.max_delay.as_secs_f64())
        .max(0.0);

    Duration::from_secs_f64(with_jitter)
}

/// Uniform sample in `[-1, 1]`, drawn from the random bits of a v4 uuid so
/// clients restarted together do not reconnect in lockstep.
fn jitter_sample() -> f64 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    f64::from(raw) / f64::from(u32::MAX) * 2.0 - 1.0
}

// ── Tests ────────────────────────────────────────────────────────────
