// ── Coordinator ──
//
// Full lifecycle management for one hub: authentication, discovery,
// initial state sync, the MQTT event stream, periodic refresh, and command
// routing. All device state lives in the `DeviceTable`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use yolocal_api::{
    DeviceEvent, EventSubscriber, HubClient, SubscriptionState, TokenManager, TransportConfig,
};

use crate::config::CoordinatorConfig;
use crate::convert;
use crate::error::CoreError;
use crate::model::{
    CommandResult, DeviceCommand, DeviceDescriptor, DeviceId, DeviceState, StateChange,
    SyncStatus,
};
use crate::registry;
use crate::store::{DeviceTable, DiscoveryDiff, MergeOutcome};
use crate::stream::EntityStream;

const EVENT_CHANNEL_SIZE: usize = 1024;

// ── ConnectionState ──────────────────────────────────────────────

/// Coordinator lifecycle state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

// ── Diagnostics ──────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    events_received: AtomicU64,
    events_applied: AtomicU64,
    events_duplicate: AtomicU64,
    events_outdated: AtomicU64,
    events_without_baseline: AtomicU64,
    events_unknown_device: AtomicU64,
    attributes_rejected: AtomicU64,
    fetch_failures: AtomicU64,
    refresh_cycles: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time counters for dropped, merged, and refreshed data.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub subscription: String,
    pub devices: usize,
    pub events_received: u64,
    pub events_applied: u64,
    pub events_duplicate: u64,
    pub events_outdated: u64,
    pub events_without_baseline: u64,
    pub events_unknown_device: u64,
    pub events_malformed: u64,
    pub attributes_rejected: u64,
    pub fetch_failures: u64,
    pub refresh_cycles: u64,
    pub last_discovery: Option<DateTime<Utc>>,
    pub last_event: Option<DateTime<Utc>>,
}

// ── Coordinator ──────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`. Consumers read state
/// from the device table and send commands straight to the hub; cached
/// state changes only when the hub reports it.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    table: Arc<DeviceTable>,
    client: ArcSwapOption<HubClient>,
    subscriber: Mutex<Option<EventSubscriber>>,
    /// Mirrors the live subscriber's state; stays valid across reconnects.
    subscription_state: watch::Sender<SubscriptionState>,
    connection_state: watch::Sender<ConnectionState>,
    counters: Counters,
    cancel: CancellationToken,
    /// Child token for the current session, replaced on reconnect.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    /// Held across `connect` and `disconnect` so sessions never overlap.
    lifecycle: Mutex<()>,
}

impl Coordinator {
    /// Create a coordinator. Does NOT connect; call
    /// [`connect()`](Self::connect) to sync and start background tasks.
    pub fn new(config: CoordinatorConfig) -> Self {
        let (subscription_state, _) = watch::channel(SubscriptionState::Disconnected);
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                table: Arc::new(DeviceTable::new()),
                client: ArcSwapOption::empty(),
                subscriber: Mutex::new(None),
                subscription_state,
                connection_state,
                counters: Counters::default(),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn table(&self) -> &Arc<DeviceTable> {
        &self.inner.table
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect to the hub.
    ///
    /// Authenticates, discovers devices, and fetches every supported
    /// device's state. Only once that baseline exists are the event
    /// subscriber and the refresh task started.
    ///
    /// A no-op while already connected; call [`disconnect()`](Self::disconnect)
    /// first to start a fresh session.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _session = self.inner.lifecycle.lock().await;
        if *self.inner.connection_state.borrow() == ConnectionState::Connected {
            debug!("connect ignored, session already running");
            return Ok(());
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Connecting);

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        if let Err(e) = self.initial_sync().await {
            self.inner.client.store(None);
            self.inner
                .connection_state
                .send_replace(ConnectionState::Failed);
            return Err(e);
        }

        let mut handles = self.inner.task_handles.lock().await;

        if self.inner.config.events_enabled {
            handles.extend(self.start_events(&child).await?);
        }

        if self.inner.config.refresh_interval_secs > 0 {
            let coordinator = self.clone();
            let interval = self.inner.config.refresh_interval_secs;
            let cancel = child.clone();
            handles.push(tokio::spawn(async move {
                refresh_task(coordinator, interval, cancel).await;
            }));
        }
        drop(handles);

        self.inner
            .connection_state
            .send_replace(ConnectionState::Connected);
        info!(
            devices = self.inner.table.device_count(),
            events = self.inner.config.events_enabled,
            "connected to hub"
        );
        Ok(())
    }

    /// Authenticate, discover, and fetch the initial snapshot of every
    /// supported device.
    async fn initial_sync(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;
        let credentials = &config.credentials;

        let transport = TransportConfig::with_timeout(config.timeout);
        let http = transport.build_client()?;
        let auth = Arc::new(
            TokenManager::new(http.clone(), credentials)?
                .with_expiry_margin(Duration::from_secs(config.token_expiry_margin_secs)),
        );
        let client = HubClient::with_client(http, &credentials.http_base_url()?, auth)?;

        client
            .token_manager()
            .get_token()
            .await
            .map_err(|e| CoreError::AuthUnavailable {
                message: e.to_string(),
            })?;
        debug!("hub token acquired");

        self.inner.client.store(Some(Arc::new(client)));
        let (_, fetched) = self.discover_and_fetch_new().await?;

        // Devices kept from an earlier session still need a fresh snapshot.
        let ids: Vec<DeviceId> = self
            .inner
            .table
            .supported_ids()
            .into_iter()
            .filter(|id| !fetched.contains(id))
            .collect();
        let synced = self.fetch_all(&ids).await;
        debug!(
            synced,
            new = fetched.len(),
            "initial state sync complete"
        );
        Ok(())
    }

    /// Start the MQTT subscriber and the task that merges its events.
    async fn start_events(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>, CoreError> {
        let client = self.client()?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        let subscriber = EventSubscriber::start(
            self.inner.config.credentials.clone(),
            Arc::clone(client.token_manager()),
            self.inner.config.reconnect.clone(),
            tx,
        );
        let state_rx = subscriber.watch_state();
        *self.inner.subscriber.lock().await = Some(subscriber);

        let delta = {
            let coordinator = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                delta_task(coordinator, rx, cancel).await;
            })
        };
        let mirror = {
            let coordinator = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                subscription_mirror_task(coordinator, state_rx, cancel).await;
            })
        };

        Ok(vec![delta, mirror])
    }

    /// Stop background tasks and the event subscriber.
    pub async fn disconnect(&self) {
        let _session = self.inner.lifecycle.lock().await;
        self.inner.cancel_child.lock().await.cancel();

        if let Some(subscriber) = self.inner.subscriber.lock().await.take() {
            subscriber.stop().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.inner.client.store(None);
        self.inner
            .subscription_state
            .send_replace(SubscriptionState::Disconnected);
        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// Connect without events or background refresh, run `f`, disconnect.
    pub async fn oneshot<F, Fut, T>(config: CoordinatorConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Coordinator) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.events_enabled = false;
        cfg.refresh_interval_secs = 0;
        cfg.rediscovery_interval_secs = 0;

        let coordinator = Coordinator::new(cfg);
        coordinator.connect().await?;
        let result = f(coordinator.clone()).await;
        coordinator.disconnect().await;
        result
    }

    // ── Refresh ──────────────────────────────────────────────────

    /// Re-run discovery and fetch a baseline for every supported device
    /// that was added or changed type.
    pub async fn rediscover(&self) -> Result<DiscoveryDiff, CoreError> {
        self.discover_and_fetch_new().await.map(|(diff, _)| diff)
    }

    /// Discovery plus baseline fetch. Also returns the ids that were fetched.
    async fn discover_and_fetch_new(&self) -> Result<(DiscoveryDiff, Vec<DeviceId>), CoreError> {
        let client = self.client()?;
        let devices = client.discover().await.map_err(CoreError::discovery)?;

        let descriptors: Vec<DeviceDescriptor> =
            devices.into_iter().map(DeviceDescriptor::from).collect();
        let diff = self.inner.table.apply_discovery(descriptors);

        if !diff.added.is_empty() || !diff.removed.is_empty() || !diff.updated.is_empty() {
            info!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                updated = diff.updated.len(),
                "device list changed"
            );
        }

        let needs_baseline: Vec<DeviceId> = diff
            .added
            .iter()
            .chain(&diff.updated)
            .filter(|id| {
                self.inner
                    .table
                    .state(id)
                    .is_some_and(|s| s.status == SyncStatus::Unknown)
            })
            .cloned()
            .collect();
        if !needs_baseline.is_empty() {
            let synced = self.fetch_all(&needs_baseline).await;
            debug!(synced, total = needs_baseline.len(), "baseline fetched for new devices");
        }
        Ok((diff, needs_baseline))
    }

    /// Fetch one device's full state and apply it as a snapshot.
    pub async fn refresh_device(&self, id: &DeviceId) -> Result<Arc<DeviceState>, CoreError> {
        let client = self.client()?;
        let descriptor = self.descriptor(id)?;
        if !registry::is_supported(&descriptor.device_type) {
            return Err(CoreError::Unsupported {
                operation: "state fetch".into(),
                device_type: descriptor.device_type.to_string(),
            });
        }

        let reply = match client.fetch_state(&descriptor.hub).await {
            Ok(reply) => reply,
            Err(e) => {
                bump(&self.inner.counters.fetch_failures);
                return Err(CoreError::fetch(id.as_str(), e));
            }
        };

        let (snapshot, rejected) =
            convert::snapshot_from_reply(&descriptor.device_type, &reply, Utc::now());
        self.count_rejected(id, &rejected);
        self.inner.table.apply_snapshot(id, snapshot);

        self.inner
            .table
            .state(id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: id.to_string(),
            })
    }

    /// One refresh cycle: mark expired devices stale, then re-fetch every
    /// device that needs it. While the event subscription is down every
    /// supported device is re-fetched. Returns how many were synced.
    pub async fn refresh_stale(&self) -> Result<usize, CoreError> {
        self.client()?;
        bump(&self.inner.counters.refresh_cycles);

        let window = chrono::Duration::from_std(self.inner.config.freshness_window())
            .unwrap_or(chrono::Duration::MAX);
        let marked = self.inner.table.sweep_stale(Utc::now(), window);
        if !marked.is_empty() {
            debug!(count = marked.len(), "devices marked stale");
        }

        let ids = if self.subscription_state() == SubscriptionState::Connected {
            self.inner.table.refresh_candidates()
        } else {
            self.inner.table.supported_ids()
        };

        Ok(self.fetch_all(&ids).await)
    }

    async fn fetch_all(&self, ids: &[DeviceId]) -> usize {
        let results = join_all(ids.iter().map(|id| self.refresh_device(id))).await;

        let mut synced = 0;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(_) => synced += 1,
                Err(e) => warn!(device_id = %id, error = %e, "state fetch failed"),
            }
        }
        synced
    }

    // ── Events ───────────────────────────────────────────────────

    /// Merge one decoded event into the device table.
    ///
    /// Returns `None` if the event names a device that is not discovered
    /// or not supported.
    pub fn apply_event(&self, event: &DeviceEvent) -> Option<MergeOutcome> {
        let counters = &self.inner.counters;
        bump(&counters.events_received);

        let id = DeviceId::from(event.device_id.as_str());
        let Some(descriptor) = self.inner.table.descriptor(&id) else {
            bump(&counters.events_unknown_device);
            debug!(device_id = %id, "event for unknown device dropped");
            return None;
        };

        let (delta, rejected) = convert::delta_from_event(&descriptor.device_type, event);
        self.count_rejected(&id, &rejected);

        let Some(outcome) = self.inner.table.apply_delta(&id, delta) else {
            bump(&counters.events_unknown_device);
            return None;
        };

        match &outcome {
            MergeOutcome::Applied { changed } => {
                bump(&counters.events_applied);
                trace!(device_id = %id, ?changed, "event applied");
            }
            MergeOutcome::Duplicate => bump(&counters.events_duplicate),
            MergeOutcome::Outdated => {
                bump(&counters.events_outdated);
                debug!(device_id = %id, "out-of-order event ignored");
            }
            MergeOutcome::NoBaseline => {
                bump(&counters.events_without_baseline);
                debug!(device_id = %id, "event before first snapshot dropped");
            }
        }
        Some(outcome)
    }

    fn count_rejected(&self, id: &DeviceId, rejected: &[String]) {
        if rejected.is_empty() {
            return;
        }
        self.inner
            .counters
            .attributes_rejected
            .fetch_add(u64::try_from(rejected.len()).unwrap_or(u64::MAX), Ordering::Relaxed);
        trace!(device_id = %id, ?rejected, "attributes dropped by schema");
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Send a command straight to the hub. The cached state is not touched;
    /// the new state arrives through an event or the next refresh.
    pub async fn send_command(
        &self,
        id: &DeviceId,
        command: DeviceCommand,
    ) -> Result<CommandResult, CoreError> {
        let descriptor = self.descriptor(id)?;
        if !registry::supports_command(&descriptor.device_type, command) {
            return Err(CoreError::Unsupported {
                operation: command.to_string(),
                device_type: descriptor.device_type.to_string(),
            });
        }
        let client = self.client()?;

        debug!(device_id = %id, %command, "dispatching command");
        let reply = client
            .send_command(&descriptor.hub, command.params())
            .await
            .map_err(|e| CoreError::command(id.as_str(), e))?;

        Ok(CommandResult {
            device_id: id.clone(),
            command,
            method: reply.method,
            hub_time: reply.hub_time,
            data: reply.data,
        })
    }

    // ── State observation ────────────────────────────────────────

    /// Supported devices only.
    pub fn devices(&self) -> Vec<Arc<DeviceDescriptor>> {
        self.inner.table.supported_descriptors()
    }

    /// Every discovered device, including unsupported types.
    pub fn all_devices(&self) -> Arc<Vec<Arc<DeviceDescriptor>>> {
        self.inner.table.descriptors_snapshot()
    }

    /// Look up a device by id or, failing that, by name.
    pub fn find_device(&self, id_or_name: &str) -> Result<Arc<DeviceDescriptor>, CoreError> {
        self.inner
            .table
            .find_descriptor(id_or_name)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: id_or_name.to_owned(),
            })
    }

    pub fn state(&self, id: &DeviceId) -> Option<Arc<DeviceState>> {
        self.inner.table.state(id)
    }

    pub fn states(&self) -> EntityStream<DeviceState> {
        self.inner.table.subscribe_states()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<StateChange> {
        self.inner.table.subscribe_changes()
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        *self.inner.subscription_state.borrow()
    }

    pub fn watch_subscription(&self) -> watch::Receiver<SubscriptionState> {
        self.inner.subscription_state.subscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        let c = &self.inner.counters;
        let events_malformed = self
            .inner
            .subscriber
            .lock()
            .await
            .as_ref()
            .map_or(0, EventSubscriber::malformed_count);

        Diagnostics {
            subscription: self.subscription_state().to_string(),
            devices: self.inner.table.device_count(),
            events_received: c.events_received.load(Ordering::Relaxed),
            events_applied: c.events_applied.load(Ordering::Relaxed),
            events_duplicate: c.events_duplicate.load(Ordering::Relaxed),
            events_outdated: c.events_outdated.load(Ordering::Relaxed),
            events_without_baseline: c.events_without_baseline.load(Ordering::Relaxed),
            events_unknown_device: c.events_unknown_device.load(Ordering::Relaxed),
            events_malformed,
            attributes_rejected: c.attributes_rejected.load(Ordering::Relaxed),
            fetch_failures: c.fetch_failures.load(Ordering::Relaxed),
            refresh_cycles: c.refresh_cycles.load(Ordering::Relaxed),
            last_discovery: self.inner.table.last_discovery(),
            last_event: self.inner.table.last_event(),
        }
    }

    // ── Private helpers ──────────────────────────────────────────

    fn client(&self) -> Result<Arc<HubClient>, CoreError> {
        self.inner.client.load_full().ok_or(CoreError::Disconnected)
    }

    fn descriptor(&self, id: &DeviceId) -> Result<Arc<DeviceDescriptor>, CoreError> {
        self.inner
            .table
            .descriptor(id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: id.to_string(),
            })
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Drain decoded events into the device table.
async fn delta_task(
    coordinator: Coordinator,
    mut rx: mpsc::Receiver<DeviceEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                coordinator.apply_event(&event);
            }
        }
    }
}

/// Copy the live subscriber's state into the coordinator's own channel.
async fn subscription_mirror_task(
    coordinator: Coordinator,
    mut rx: watch::Receiver<SubscriptionState>,
    cancel: CancellationToken,
) {
    let target = &coordinator.inner.subscription_state;
    loop {
        let state = *rx.borrow_and_update();
        if *target.borrow() != state {
            info!(%state, "event subscription state changed");
            target.send_replace(state);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    target.send_replace(*rx.borrow());
                    break;
                }
            }
        }
    }
}

/// Periodic refresh cycle, with optional rediscovery.
async fn refresh_task(coordinator: Coordinator, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // consume the immediate first tick

    let rediscovery = coordinator.inner.config.rediscovery_interval_secs;
    let mut last_discovery = tokio::time::Instant::now();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if rediscovery > 0
                    && last_discovery.elapsed() >= Duration::from_secs(rediscovery)
                {
                    last_discovery = tokio::time::Instant::now();
                    if let Err(e) = coordinator.rediscover().await {
                        warn!(error = %e, "periodic rediscovery failed");
                    }
                }
                match coordinator.refresh_stale().await {
                    Ok(synced) => trace!(synced, "refresh cycle complete"),
                    Err(e) => warn!(error = %e, "periodic refresh failed"),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use secrecy::SecretString;
    use serde_json::json;
    use yolocal_api::HubCredentials;

    fn coordinator_with(devices: &[(&str, &str)]) -> Coordinator {
        let credentials = HubCredentials::new(
            "127.0.0.1",
            "client",
            SecretString::from("secret".to_string()),
            "net",
        );
        let coordinator = Coordinator::new(CoordinatorConfig::new(credentials));
        let descriptors = devices
            .iter()
            .map(|(id, device_type)| {
                let hub: yolocal_api::HubDevice = serde_json::from_value(json!({
                    "deviceId": id,
                    "name": id,
                    "token": "t",
                    "type": device_type
                }))
                .unwrap();
                DeviceDescriptor::from(hub)
            })
            .collect();
        coordinator.inner.table.apply_discovery(descriptors);
        coordinator
    }

    fn event(device_id: &str, data: serde_json::Value, ms: i64) -> DeviceEvent {
        DeviceEvent {
            device_id: device_id.into(),
            event: String::new(),
            data: data.as_object().cloned().unwrap(),
            timestamp: DateTime::from_timestamp_millis(ms),
            received_at: Utc::now(),
        }
    }

    fn baseline(coordinator: &Coordinator, id: &str) {
        let mut attributes = IndexMap::new();
        attributes.insert(
            "state".to_string(),
            crate::model::AttributeValue::Text("closed".into()),
        );
        coordinator.inner.table.apply_snapshot(
            &id.into(),
            crate::model::StateSnapshot {
                attributes,
                hub_time: DateTime::from_timestamp_millis(1_000),
                received_at: Utc::now(),
            },
        );
    }

    #[tokio::test]
    async fn events_are_counted_by_outcome() {
        let coordinator = coordinator_with(&[("door-1", "DoorSensor"), ("hub-1", "Hub")]);

        // No baseline yet.
        let outcome = coordinator.apply_event(&event("door-1", json!({"state": "open"}), 2_000));
        assert_eq!(outcome, Some(MergeOutcome::NoBaseline));

        baseline(&coordinator, "door-1");
        assert!(matches!(
            coordinator.apply_event(&event("door-1", json!({"state": "open"}), 2_000)),
            Some(MergeOutcome::Applied { .. })
        ));
        assert_eq!(
            coordinator.apply_event(&event("door-1", json!({"state": "open"}), 2_000)),
            Some(MergeOutcome::Duplicate)
        );
        assert_eq!(
            coordinator.apply_event(&event("door-1", json!({"state": "closed"}), 1_500)),
            Some(MergeOutcome::Outdated)
        );
        assert!(coordinator.apply_event(&event("ghost", json!({"state": "open"}), 3_000)).is_none());
        assert!(coordinator.apply_event(&event("hub-1", json!({"state": "on"}), 3_000)).is_none());

        let diag = coordinator.diagnostics().await;
        assert_eq!(diag.events_received, 6);
        assert_eq!(diag.events_applied, 1);
        assert_eq!(diag.events_duplicate, 1);
        assert_eq!(diag.events_outdated, 1);
        assert_eq!(diag.events_without_baseline, 1);
        assert_eq!(diag.events_unknown_device, 2);
        assert_eq!(diag.devices, 2);
        assert_eq!(diag.subscription, "disconnected");
    }

    #[tokio::test]
    async fn rejected_attributes_are_counted() {
        let coordinator = coordinator_with(&[("door-1", "DoorSensor")]);
        baseline(&coordinator, "door-1");

        coordinator.apply_event(&event(
            "door-1",
            json!({"state": "open", "alertType": "normal", "battery": "low"}),
            2_000,
        ));
        let diag = coordinator.diagnostics().await;
        assert_eq!(diag.attributes_rejected, 2);

        let state = coordinator.state(&"door-1".into()).unwrap();
        assert_eq!(state.status, SyncStatus::Synced);
        assert_eq!(state.get("state").unwrap().as_str(), Some("open"));
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let coordinator = coordinator_with(&[("lock-1", "Lock"), ("door-1", "DoorSensor")]);

        let err = coordinator
            .send_command(&"lock-1".into(), DeviceCommand::Lock)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Disconnected));

        let err = coordinator
            .send_command(&"door-1".into(), DeviceCommand::Lock)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { .. }));

        let err = coordinator
            .send_command(&"nope".into(), DeviceCommand::Lock)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DeviceNotFound { .. }));

        assert!(matches!(
            coordinator.refresh_stale().await,
            Err(CoreError::Disconnected)
        ));
    }

    #[test]
    fn devices_excludes_unsupported_types() {
        let coordinator = coordinator_with(&[("door-1", "DoorSensor"), ("hub-1", "Hub")]);
        assert_eq!(coordinator.devices().len(), 1);
        assert_eq!(coordinator.all_devices().len(), 2);
        assert!(coordinator.find_device("hub-1").is_ok());
    }
}
