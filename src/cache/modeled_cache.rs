//! Watch-driven mirror of a store subtree
//!
//! # Concurrency
//!
//! Every mutation of the node map happens on one writer task. Watch
//! callbacks and connection transitions are forwarded into a single channel
//! in the order the store delivers them, so the writer sees one totally
//! ordered stream. Readers take a shared lock and never touch the network.
//!
//! # Snapshot epochs
//!
//! The watch is registered before the subtree is enumerated. Each snapshot
//! records the store transaction it reflects; queued notifications at or
//! below that watermark are already contained in the snapshot and are
//! dropped. The same rule applies to the resync after a reconnect.

use crate::cache::event::{CacheEvent, CachePhase};
use crate::cache::listener::Listenable;
use crate::error::{CanopyError, CanopyResult};
use crate::model::{ModelSpec, ZNode, ZPath};
use crate::store::{
    ConnectionCallback, ConnectionListenerId, ConnectionState, RemoteStore, StoreNode,
    SubtreeSnapshot, WatchCallback, WatchEvent, WatchEventKind, WatchId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

type NodeMap<T> = BTreeMap<ZPath, ZNode<T>>;

enum Command {
    Remote(WatchEvent),
    Connection(ConnectionState),
    Shutdown,
}

#[derive(Default)]
struct Registrations {
    commands: Option<mpsc::UnboundedSender<Command>>,
    watch: Option<WatchId>,
    connection: Option<ConnectionListenerId>,
    task: Option<JoinHandle<()>>,
}

/// In-memory mirror of the subtree under a model spec's path
pub struct ModeledCache<T> {
    spec: ModelSpec<T>,
    store: Arc<dyn RemoteStore>,
    nodes: RwLock<NodeMap<T>>,
    phase: watch::Sender<CachePhase>,
    listeners: Listenable<T>,
    registrations: Mutex<Registrations>,
    // Held for each dispatched batch; close() takes it to wait out delivery
    delivery: Mutex<()>,
}

impl<T> ModeledCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cache for the subtree at `spec.path()`; call `start` to fill it
    pub fn new(store: Arc<dyn RemoteStore>, spec: ModelSpec<T>) -> Arc<Self> {
        let (phase, _) = watch::channel(CachePhase::NotStarted);
        Arc::new(Self {
            spec,
            store,
            nodes: RwLock::new(BTreeMap::new()),
            phase,
            listeners: Listenable::new(),
            registrations: Mutex::new(Registrations::default()),
            delivery: Mutex::new(()),
        })
    }

    /// Root of the mirrored subtree
    pub fn root(&self) -> &ZPath {
        self.spec.path()
    }

    pub fn phase(&self) -> CachePhase {
        *self.phase.borrow()
    }

    pub fn listenable(&self) -> &Listenable<T> {
        &self.listeners
    }

    /// Begin mirroring
    ///
    /// Returns immediately; the snapshot is fetched on the writer task and
    /// `Initialized` is emitted once it is installed. Calling `start` again
    /// is a no-op. Must be called from within a tokio runtime.
    ///
    /// The store's watch and connection callbacks keep the writer task alive
    /// until `close` is called. `CachedModeledFramework` closes its cache
    /// when the last handle is dropped; direct users must call `close`.
    pub fn start(self: &Arc<Self>) -> CanopyResult<()> {
        self.spec.path().ensure_resolved()?;

        let mut registrations = self.registrations.lock();
        match self.phase() {
            CachePhase::Closed => return Err(CanopyError::Closed),
            CachePhase::Initializing | CachePhase::Initialized => return Ok(()),
            CachePhase::NotStarted => {}
        }
        self.phase.send_replace(CachePhase::Initializing);

        let (commands, receiver) = mpsc::unbounded_channel();
        let forward = commands.clone();
        let on_connection: ConnectionCallback = Arc::new(move |state| {
            // The receiver is gone once the cache is closed
            let _ = forward.send(Command::Connection(state));
        });
        registrations.connection = Some(self.store.add_connection_listener(on_connection));

        let writer = Writer {
            cache: self.clone(),
            commands: commands.clone(),
            watermark: 0,
        };
        registrations.task = Some(tokio::spawn(writer.run(receiver)));
        registrations.commands = Some(commands);

        info!("Started cache at {} ({})", self.root(), self.store.store_name());
        Ok(())
    }

    /// Stop mirroring and drop all cached nodes
    ///
    /// Safe to call concurrently with in-flight notifications: anything the
    /// writer has not applied yet is discarded, and no listener is invoked
    /// once this returns. Idempotent.
    pub async fn close(&self) {
        let registrations = {
            let mut registrations = self.registrations.lock();
            if self.phase() == CachePhase::Closed {
                return;
            }
            self.phase.send_replace(CachePhase::Closed);
            std::mem::take(&mut *registrations)
        };
        // Wait for a batch that started before the phase flipped
        drop(self.delivery.lock());

        if let Some(id) = registrations.connection {
            self.store.remove_connection_listener(id);
        }
        if let Some(commands) = registrations.commands {
            let _ = commands.send(Command::Shutdown);
        }
        if let Some(id) = registrations.watch {
            if let Err(e) = self.store.unwatch(id).await {
                warn!("Failed to remove watch on {}: {}", self.root(), e);
            }
        }
        self.nodes.write().clear();
        self.listeners.clear();
        info!("Closed cache at {}", self.root());
    }

    /// Wait until the first snapshot is installed
    pub async fn await_initialized(&self, timeout: Option<Duration>) -> CanopyResult<()> {
        let mut phase = self.phase.subscribe();
        let wait = phase.wait_for(|p| matches!(p, CachePhase::Initialized | CachePhase::Closed));
        let reached = match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| CanopyError::Timeout(format!("cache at {}", self.root())))?,
            None => wait.await,
        };
        match reached.map(|p| *p) {
            Ok(CachePhase::Initialized) => Ok(()),
            _ => Err(CanopyError::Closed),
        }
    }

    fn ensure_open(&self) -> CanopyResult<()> {
        if self.phase() == CachePhase::Closed {
            Err(CanopyError::Closed)
        } else {
            Ok(())
        }
    }

    /// Cached node at `path`
    pub fn current_data(&self, path: &ZPath) -> CanopyResult<Option<ZNode<T>>> {
        self.ensure_open()?;
        Ok(self.nodes.read().get(path).cloned())
    }

    /// Cached direct children of `path`, in path order
    pub fn current_children(&self, path: &ZPath) -> CanopyResult<Vec<ZNode<T>>> {
        self.ensure_open()?;
        let nodes = self.nodes.read();
        Ok(subtree(&*nodes, path)
            .filter(|(candidate, _)| candidate.is_child_of(path))
            .map(|(_, node)| node.clone())
            .collect())
    }

    /// Paths of the cached direct children of `path`
    pub fn current_children_paths(&self, path: &ZPath) -> CanopyResult<Vec<ZPath>> {
        self.ensure_open()?;
        let nodes = self.nodes.read();
        Ok(subtree(&*nodes, path)
            .filter(|(candidate, _)| candidate.is_child_of(path))
            .map(|(candidate, _)| candidate.clone())
            .collect())
    }

    /// Every cached node at or under `path`
    pub fn current_subtree(&self, path: &ZPath) -> CanopyResult<Vec<ZNode<T>>> {
        self.ensure_open()?;
        let nodes = self.nodes.read();
        Ok(subtree(&*nodes, path).map(|(_, node)| node.clone()).collect())
    }

    /// Number of cached nodes
    pub fn size(&self) -> usize {
        self.nodes.read().len()
    }

    fn dispatch(&self, events: Vec<CacheEvent<T>>) {
        let _delivery = self.delivery.lock();
        for event in events {
            let phase = self.phase();
            if phase == CachePhase::Closed {
                return;
            }
            trace!("Dispatching {} event", event.kind());
            self.listeners.notify(&event, phase);
        }
    }

    /// Apply `op` to the map unless the cache closed in the meantime
    fn mutate<R>(&self, op: impl FnOnce(&mut NodeMap<T>) -> R) -> Option<R> {
        let mut nodes = self.nodes.write();
        // Checked under the write lock so close() cannot interleave
        if self.phase() == CachePhase::Closed {
            return None;
        }
        Some(op(&mut *nodes))
    }
}

fn subtree<'a, T>(
    nodes: &'a NodeMap<T>,
    path: &'a ZPath,
) -> impl Iterator<Item = (&'a ZPath, &'a ZNode<T>)> + 'a {
    nodes
        .range(path.clone()..)
        .take_while(move |(candidate, _)| candidate.starts_with(path))
}

/// Owns every mutation of the cache
struct Writer<T> {
    cache: Arc<ModeledCache<T>>,
    commands: mpsc::UnboundedSender<Command>,
    watermark: u64,
}

impl<T> Writer<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        match self.synchronize().await {
            Ok(()) | Err(CanopyError::Closed) => {}
            Err(e) => warn!(
                "Could not initialize cache at {}, retrying on reconnect: {}",
                self.cache.root(),
                e
            ),
        }

        while let Some(command) = receiver.recv().await {
            if self.cache.phase() == CachePhase::Closed {
                debug!("Cache at {} closed, discarding pending work", self.cache.root());
                break;
            }
            match command {
                Command::Remote(event) => self.apply(event),
                Command::Connection(state) => self.on_connection(state).await,
                Command::Shutdown => break,
            }
        }
        trace!("Writer for {} stopped", self.cache.root());
    }

    async fn on_connection(&mut self, state: ConnectionState) {
        let event = match state {
            ConnectionState::Connected => return,
            ConnectionState::Suspended => CacheEvent::ConnectionSuspended,
            ConnectionState::Lost => {
                info!(
                    "Connection lost; serving {} cached node(s) from {}",
                    self.cache.size(),
                    self.cache.root()
                );
                CacheEvent::ConnectionLost
            }
            ConnectionState::Reconnected => {
                match self.synchronize().await {
                    Ok(()) => {}
                    Err(CanopyError::Closed) => return,
                    Err(e) => {
                        warn!(
                            "Resync of {} deferred to the next reconnect: {}",
                            self.cache.root(),
                            e
                        );
                        return;
                    }
                }
                CacheEvent::ConnectionReconnected
            }
        };
        self.cache.dispatch(vec![event]);
    }

    async fn ensure_watch(&mut self) -> CanopyResult<()> {
        if self.cache.registrations.lock().watch.is_some() {
            return Ok(());
        }
        let commands = self.commands.clone();
        let callback: WatchCallback = Arc::new(move |event| {
            let _ = commands.send(Command::Remote(event));
        });
        let id = self.cache.store.watch(self.cache.root(), callback).await?;

        let closed = {
            let mut registrations = self.cache.registrations.lock();
            if self.cache.phase() == CachePhase::Closed {
                true
            } else {
                registrations.watch = Some(id);
                false
            }
        };
        if closed {
            self.cache.store.unwatch(id).await?;
            return Err(CanopyError::Closed);
        }
        Ok(())
    }

    /// Fetch a fresh snapshot and reconcile the map with it
    ///
    /// On failure the map is left as it was.
    async fn synchronize(&mut self) -> CanopyResult<()> {
        let root = self.cache.root().clone();
        let snapshot = self.fetch(&root).await?;

        let initial = self.cache.phase() == CachePhase::Initializing;
        let fresh = self.decode(snapshot.nodes);
        let Some(events) = self.cache.mutate(|nodes| reconcile(nodes, fresh)) else {
            return Err(CanopyError::Closed);
        };
        self.watermark = snapshot.zxid;

        if initial {
            self.cache.phase.send_if_modified(|phase| {
                if *phase == CachePhase::Initializing {
                    *phase = CachePhase::Initialized;
                    true
                } else {
                    false
                }
            });
            info!(
                "Cache at {} initialized with {} node(s)",
                root,
                self.cache.size()
            );
            self.cache.dispatch(vec![CacheEvent::Initialized]);
        } else {
            info!(
                "Resynchronized cache at {}: {} change(s) since last snapshot",
                root,
                events.len()
            );
            self.cache.dispatch(events);
        }
        Ok(())
    }

    async fn fetch(&mut self, root: &ZPath) -> CanopyResult<SubtreeSnapshot> {
        self.ensure_watch().await?;
        self.cache.store.enumerate_subtree(root).await
    }

    fn decode(&self, nodes: Vec<StoreNode>) -> NodeMap<T> {
        let mut decoded = BTreeMap::new();
        for node in nodes {
            if node.data.is_empty() {
                continue;
            }
            match self.cache.spec.decode(&node.path, &node.data) {
                Ok(model) => {
                    decoded.insert(node.path.clone(), ZNode::new(node.path, node.stat, model));
                }
                Err(e) => warn!("Skipping node: {}", e),
            }
        }
        decoded
    }

    fn apply(&mut self, event: WatchEvent) {
        if event.zxid <= self.watermark {
            trace!("Dropping {} already in snapshot", event.path);
            return;
        }
        if self.cache.phase() != CachePhase::Initialized {
            // The snapshot that completes initialization will include it
            return;
        }

        let path = event.path;
        let model = match (event.kind, event.data) {
            (WatchEventKind::Deleted, _) => None,
            (_, Some(data)) if !data.is_empty() => match self.cache.spec.decode(&path, &data) {
                Ok(model) => Some(model),
                Err(e) => {
                    warn!("Skipping node: {}", e);
                    None
                }
            },
            _ => None,
        };

        let events = match model {
            Some(model) => {
                let node = ZNode::new(path.clone(), event.stat, model);
                self.cache.mutate(|nodes| match nodes.insert(path, node.clone()) {
                    Some(_) => vec![CacheEvent::NodeUpdated(node)],
                    None => vec![CacheEvent::NodeAdded(node)],
                })
            }
            None if event.kind == WatchEventKind::Deleted => {
                self.cache.mutate(|nodes| remove_subtree(nodes, &path))
            }
            // Structural or undecodable payload; drop any stale model
            None => self.cache.mutate(|nodes| {
                nodes
                    .remove(&path)
                    .map(CacheEvent::NodeRemoved)
                    .into_iter()
                    .collect()
            }),
        };
        if let Some(events) = events {
            self.cache.dispatch(events);
        }
    }
}

/// Remove `path` and its cached descendants, deepest first
fn remove_subtree<T>(nodes: &mut NodeMap<T>, path: &ZPath) -> Vec<CacheEvent<T>> {
    let doomed: Vec<ZPath> = subtree(nodes, path)
        .map(|(candidate, _)| candidate.clone())
        .collect();
    doomed
        .iter()
        .rev()
        .filter_map(|candidate| nodes.remove(candidate))
        .map(CacheEvent::NodeRemoved)
        .collect()
}

/// Replace `nodes` with `fresh`, returning the events that describe the change
///
/// Removals come first (deepest first), then additions and updates in path
/// order. Nodes whose modification transaction is unchanged produce nothing.
fn reconcile<T: Clone>(nodes: &mut NodeMap<T>, fresh: NodeMap<T>) -> Vec<CacheEvent<T>> {
    let mut events: Vec<CacheEvent<T>> = nodes
        .iter()
        .rev()
        .filter(|(path, _)| !fresh.contains_key(*path))
        .map(|(_, node)| CacheEvent::NodeRemoved(node.clone()))
        .collect();

    for (path, node) in &fresh {
        match nodes.get(path) {
            None => events.push(CacheEvent::NodeAdded(node.clone())),
            Some(old) if old.stat.mzxid != node.stat.mzxid => {
                events.push(CacheEvent::NodeUpdated(node.clone()))
            }
            Some(_) => {}
        }
    }

    *nodes = fresh;
    events
}
