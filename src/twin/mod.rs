// The twin store: per-node merge, node-local and fleet-wide derivation passes,
// subscriber fan-out and the bounded migration log.

pub mod authority;
pub mod domains;
pub mod enrich;
pub mod linker;
pub mod ports;
pub mod validate;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;

use crate::bundles;
use crate::error::TwinError;
use crate::models::{
    GatewayState, MigrationEvent, NodeTwin, ProxyState, ServiceBundle, TwinSnapshot, now_millis,
};
use validate::{NodePartial, ShapeWarning, validate_partial};

pub const DEFAULT_MIGRATION_LOG_CAPACITY: usize = 25;

type Listener = Arc<dyn Fn(&TwinSnapshot) + Send + Sync>;

#[derive(Default)]
struct TwinState {
    nodes: BTreeMap<String, NodeTwin>,
    gateway: GatewayState,
    proxy: ProxyState,
    migrations: HashMap<String, VecDeque<MigrationEvent>>,
    /// Bumped on every change; orders snapshots for delivery.
    version: u64,
}

impl TwinState {
    fn node_entry(&mut self, node_id: &str) -> &mut NodeTwin {
        if !self.nodes.contains_key(node_id) {
            tracing::info!(node_id, "registering node");
        }
        self.nodes.entry(node_id.to_string()).or_default()
    }

    fn reconcile_node(&mut self, node_id: &str) {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        linker::link(&mut node.services, &node.containers, &node.files);
        authority::resolve(&mut node.services, &node.containers, &node.files);
        enrich::enrich_node(node);
    }

    fn reconcile_fleet(&mut self) {
        self.proxy.routes = domains::aggregate_routes(&self.nodes);
        domains::map_domains(&mut self.nodes, &self.proxy.routes);
    }

    /// Stamp a change and take the snapshot subscribers will see for it.
    fn publish(&mut self) -> (u64, TwinSnapshot) {
        self.version += 1;
        (self.version, self.snapshot())
    }

    fn snapshot(&self) -> TwinSnapshot {
        TwinSnapshot {
            nodes: self.nodes.clone(),
            gateway: self.gateway.clone(),
            proxy: self.proxy.clone(),
        }
    }
}

struct Subscribers {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

struct Inner {
    state: Mutex<TwinState>,
    subscribers: Subscribers,
    /// Version of the last snapshot handed to listeners. Held while delivering.
    delivered: Mutex<u64>,
    migration_log_capacity: usize,
}

/// Counters for the periodic stats log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwinStats {
    pub nodes: usize,
    pub connected: usize,
    pub services: usize,
    pub containers: usize,
    pub routes: usize,
    pub subscribers: usize,
}

/// Handle to the in-memory fleet model. Clones share the same state.
#[derive(Clone)]
pub struct TwinStore {
    inner: Arc<Inner>,
}

impl Default for TwinStore {
    fn default() -> Self {
        Self::new(DEFAULT_MIGRATION_LOG_CAPACITY)
    }
}

/// Registration returned by [`TwinStore::subscribe`].
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            lock_listeners(&inner.subscribers).retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock_listeners(subscribers: &Subscribers) -> MutexGuard<'_, Vec<(u64, Listener)>> {
    subscribers.listeners.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("subscriber list lock poisoned; recovering");
        poisoned.into_inner()
    })
}

fn apply_partial(node: &mut NodeTwin, partial: NodePartial) {
    if let Some(containers) = partial.containers {
        node.containers = containers;
    }
    if let Some(mut services) = partial.services {
        linker::carry_over(&node.services, &mut services);
        node.services = services;
    }
    if let Some(volumes) = partial.volumes {
        node.volumes = volumes;
    }
    if let Some(files) = partial.files {
        node.files = files;
    }
    if let Some(routes) = partial.proxy_routes {
        node.proxy_routes = routes;
    }
    if let Some(resources) = partial.resources {
        node.resources = Some(resources);
    }
    if let Some(done) = partial.initial_sync_complete {
        node.initial_sync_complete = done;
    }
}

impl TwinStore {
    pub fn new(migration_log_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(TwinState::default()),
                subscribers: Subscribers {
                    next_id: AtomicU64::new(0),
                    listeners: Mutex::new(Vec::new()),
                },
                delivered: Mutex::new(0),
                migration_log_capacity: migration_log_capacity.max(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TwinState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("twin state lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Merge a loosely-typed partial snapshot into `node_id` and re-derive everything.
    /// Never fails; dropped fields are returned as warnings.
    pub fn update_node(&self, node_id: &str, partial: &Value) -> Vec<ShapeWarning> {
        let (partial, warnings) = validate_partial(node_id, partial);
        let (version, snapshot) = {
            let mut state = self.lock();
            let node = state.node_entry(node_id);
            apply_partial(node, partial);
            node.connected = true;
            node.last_sync = now_millis();

            state.reconcile_node(node_id);
            state.reconcile_fleet();
            state.publish()
        };
        tracing::debug!(
            node_id,
            operation = "update_node",
            dropped_fields = warnings.len(),
            "node updated"
        );
        self.notify(version, &snapshot);
        warnings
    }

    /// Make `node_id` known without marking it connected. Idempotent.
    pub fn register_node(&self, node_id: &str) {
        let (version, snapshot) = {
            let mut state = self.lock();
            if state.nodes.contains_key(node_id) {
                return;
            }
            state.node_entry(node_id);
            state.publish()
        };
        self.notify(version, &snapshot);
    }

    /// Flip the connection flag. Disconnected nodes keep their state but leave the route table.
    pub fn set_node_connection(&self, node_id: &str, connected: bool) {
        let (version, snapshot) = {
            let mut state = self.lock();
            let known = state.nodes.contains_key(node_id);
            let node = state.node_entry(node_id);
            if known && node.connected == connected {
                return;
            }
            node.connected = connected;
            state.reconcile_fleet();
            state.publish()
        };
        tracing::info!(node_id, connected, "node connection changed");
        self.notify(version, &snapshot);
    }

    pub fn update_gateway(&self, mut gateway: GatewayState) {
        gateway.last_updated.get_or_insert_with(now_millis);
        let (version, snapshot) = {
            let mut state = self.lock();
            state.gateway = gateway;
            state.publish()
        };
        self.notify(version, &snapshot);
    }

    pub fn get_snapshot(&self) -> TwinSnapshot {
        self.lock().snapshot()
    }

    pub fn get_node(&self, node_id: &str) -> Result<NodeTwin, TwinError> {
        self.lock()
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| TwinError::NodeNotFound(node_id.to_string()))
    }

    pub fn check_connection(&self, node_id: &str) -> Result<bool, TwinError> {
        self.lock()
            .nodes
            .get(node_id)
            .map(|n| n.connected)
            .ok_or_else(|| TwinError::NodeNotFound(node_id.to_string()))
    }

    /// Bundles are computed on a clone, outside the lock.
    pub fn bundles(&self, node_id: &str) -> Result<Vec<ServiceBundle>, TwinError> {
        let node = self.get_node(node_id)?;
        Ok(bundles::build_bundles(node_id, &node))
    }

    /// Append to the node's migration log, evicting the oldest entry past capacity.
    pub fn record_migration(
        &self,
        node_id: &str,
        mut event: MigrationEvent,
    ) -> Result<(), TwinError> {
        if event.timestamp == 0 {
            event.timestamp = now_millis();
        }
        let capacity = self.inner.migration_log_capacity;
        let mut state = self.lock();
        if !state.nodes.contains_key(node_id) {
            return Err(TwinError::NodeNotFound(node_id.to_string()));
        }
        let log = state.migrations.entry(node_id.to_string()).or_default();
        log.push_front(event);
        log.truncate(capacity);
        Ok(())
    }

    /// Newest first.
    pub fn migration_history(&self, node_id: &str) -> Result<Vec<MigrationEvent>, TwinError> {
        let state = self.lock();
        if !state.nodes.contains_key(node_id) {
            return Err(TwinError::NodeNotFound(node_id.to_string()));
        }
        Ok(state
            .migrations
            .get(node_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Register a listener called with a fresh snapshot after every change.
    /// Deliveries never go backwards: a snapshot older than one already delivered is
    /// skipped. Listeners may read the twin but must not write to it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TwinSnapshot) + Send + Sync + 'static,
    {
        let subscribers = &self.inner.subscribers;
        let id = subscribers.next_id.fetch_add(1, Ordering::Relaxed);
        lock_listeners(subscribers).push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn stats(&self) -> TwinStats {
        let subscribers = lock_listeners(&self.inner.subscribers).len();
        let state = self.lock();
        TwinStats {
            nodes: state.nodes.len(),
            connected: state.nodes.values().filter(|n| n.connected).count(),
            services: state.nodes.values().map(|n| n.services.len()).sum(),
            containers: state.nodes.values().map(|n| n.containers.len()).sum(),
            routes: state.proxy.routes.len(),
            subscribers,
        }
    }

    fn notify(&self, version: u64, snapshot: &TwinSnapshot) {
        let mut delivered = self.inner.delivered.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("delivery lock poisoned; recovering");
            poisoned.into_inner()
        });
        if version <= *delivered {
            tracing::debug!(version, delivered = *delivered, "skipping superseded snapshot");
            return;
        }
        *delivered = version;

        let listeners: Vec<(u64, Listener)> = lock_listeners(&self.inner.subscribers).clone();
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
                tracing::warn!(subscriber = id, "twin subscriber panicked");
            }
        }
    }
}
