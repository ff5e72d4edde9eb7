//! In-process store
//!
//! A complete `RemoteStore` living in memory: versioned nodes, transaction
//! ids, recursive watches and a simulated connection. Used by the CLI demo
//! and by tests that need to cut the connection and mutate the "server"
//! behind the client's back.

use crate::error::{CanopyError, CanopyResult};
use crate::model::ZPath;
use crate::store::remote::{
    ConnectionCallback, ConnectionListenerId, ConnectionState, CreateMode, CreateOptions,
    DeleteOptions, RemoteStore, Stat, StoreNode, SubtreeSnapshot, WatchCallback, WatchEvent,
    WatchEventKind, WatchId,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    stat: Stat,
    mode: CreateMode,
}

struct Inner {
    nodes: BTreeMap<ZPath, Entry>,
    zxid: u64,
    state: ConnectionState,
    session_id: Uuid,
    next_id: u64,
    watches: BTreeMap<WatchId, (ZPath, WatchCallback)>,
    connection_listeners: BTreeMap<ConnectionListenerId, ConnectionCallback>,
}

type Delivery = (WatchCallback, WatchEvent);

impl Inner {
    fn new() -> Self {
        let now = Utc::now();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ZPath::root(),
            Entry {
                data: Vec::new(),
                stat: Stat {
                    czxid: 0,
                    mzxid: 0,
                    version: 0,
                    ctime: now,
                    mtime: now,
                    num_children: 0,
                    data_length: 0,
                    ephemeral_owner: None,
                },
                mode: CreateMode::Persistent,
            },
        );
        Self {
            nodes,
            zxid: 0,
            state: ConnectionState::Connected,
            session_id: Uuid::new_v4(),
            next_id: 1,
            watches: BTreeMap::new(),
            connection_listeners: BTreeMap::new(),
        }
    }

    fn ensure_connected(&self) -> CanopyResult<()> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(CanopyError::Connectivity(format!(
                "connection {}",
                self.state
            )))
        }
    }

    fn next_zxid(&mut self) -> u64 {
        self.zxid += 1;
        self.zxid
    }

    fn adjust_children(&mut self, parent: &ZPath, delta: i64) {
        if let Some(entry) = self.nodes.get_mut(parent) {
            let count = i64::from(entry.stat.num_children) + delta;
            entry.stat.num_children = count.max(0) as u32;
        }
    }

    fn create(
        &mut self,
        path: &ZPath,
        data: Vec<u8>,
        mode: CreateMode,
        events: &mut Vec<WatchEvent>,
    ) -> Stat {
        let zxid = self.next_zxid();
        let now = Utc::now();
        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            version: 0,
            ctime: now,
            mtime: now,
            num_children: 0,
            data_length: data.len() as u32,
            ephemeral_owner: (mode == CreateMode::Ephemeral).then_some(self.session_id),
        };
        if let Some(parent) = path.parent() {
            self.adjust_children(&parent, 1);
        }
        self.nodes.insert(
            path.clone(),
            Entry {
                data: data.clone(),
                stat: stat.clone(),
                mode,
            },
        );
        events.push(WatchEvent {
            kind: WatchEventKind::Created,
            path: path.clone(),
            data: Some(data),
            stat: stat.clone(),
            zxid,
        });
        stat
    }

    fn set_data(
        &mut self,
        path: &ZPath,
        data: Vec<u8>,
        version: Option<i32>,
        events: &mut Vec<WatchEvent>,
    ) -> CanopyResult<Stat> {
        let current = self
            .nodes
            .get(path)
            .map(|entry| entry.stat.version)
            .ok_or_else(|| CanopyError::NotFound(path.to_string()))?;
        if let Some(expected) = version {
            if expected != current {
                return Err(CanopyError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual: current,
                });
            }
        }
        let zxid = self.next_zxid();
        let entry = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| CanopyError::NotFound(path.to_string()))?;
        entry.stat.version += 1;
        entry.stat.mzxid = zxid;
        entry.stat.mtime = Utc::now();
        entry.stat.data_length = data.len() as u32;
        entry.data = data.clone();
        let stat = entry.stat.clone();
        events.push(WatchEvent {
            kind: WatchEventKind::Changed,
            path: path.clone(),
            data: Some(data),
            stat: stat.clone(),
            zxid,
        });
        Ok(stat)
    }

    fn create_or_set(
        &mut self,
        path: &ZPath,
        data: Vec<u8>,
        options: &CreateOptions,
        events: &mut Vec<WatchEvent>,
    ) -> CanopyResult<Stat> {
        path.ensure_resolved()?;
        if path.is_root() {
            return Err(CanopyError::invalid_path("/", "the root cannot be written"));
        }
        if self.nodes.contains_key(path) {
            if !options.set_data_if_exists {
                return Err(CanopyError::NodeExists(path.to_string()));
            }
            return self.set_data(path, data, None, events);
        }

        let mut missing = Vec::new();
        let mut cursor = path.parent();
        while let Some(ancestor) = cursor {
            if self.nodes.contains_key(&ancestor) {
                break;
            }
            cursor = ancestor.parent();
            missing.push(ancestor);
        }
        if !missing.is_empty() && !options.create_parents {
            let parent = path.parent().unwrap_or_default();
            return Err(CanopyError::NotFound(parent.to_string()));
        }
        for ancestor in missing.iter().rev() {
            self.create(ancestor, Vec::new(), CreateMode::Persistent, events);
        }
        Ok(self.create(path, data, options.mode, events))
    }

    fn remove(&mut self, path: &ZPath, events: &mut Vec<WatchEvent>) {
        let Some(entry) = self.nodes.remove(path) else {
            return;
        };
        let zxid = self.next_zxid();
        let parent = path.parent();
        if let Some(parent) = &parent {
            self.adjust_children(parent, -1);
        }
        events.push(WatchEvent {
            kind: WatchEventKind::Deleted,
            path: path.clone(),
            data: None,
            stat: entry.stat,
            zxid,
        });

        if let Some(parent) = parent {
            let reap = self.nodes.get(&parent).is_some_and(|p| {
                p.mode == CreateMode::Container && p.stat.num_children == 0
            });
            if reap {
                trace!("Reaping empty container {}", parent);
                self.remove(&parent, events);
            }
        }
    }

    fn descendants(&self, path: &ZPath) -> Vec<ZPath> {
        self.nodes
            .range(path.clone()..)
            .skip(1)
            .take_while(|(candidate, _)| candidate.starts_with(path))
            .map(|(candidate, _)| candidate.clone())
            .collect()
    }

    fn delete(
        &mut self,
        path: &ZPath,
        version: Option<i32>,
        options: &DeleteOptions,
        events: &mut Vec<WatchEvent>,
    ) -> CanopyResult<()> {
        if path.is_root() {
            return Err(CanopyError::invalid_path("/", "the root cannot be deleted"));
        }
        let Some(entry) = self.nodes.get(path) else {
            if options.quietly {
                return Ok(());
            }
            return Err(CanopyError::NotFound(path.to_string()));
        };
        if let Some(expected) = version {
            if expected != entry.stat.version {
                return Err(CanopyError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual: entry.stat.version,
                });
            }
        }
        let descendants = self.descendants(path);
        if !descendants.is_empty() && !options.delete_children {
            return Err(CanopyError::NotEmpty(path.to_string()));
        }
        // Deepest first so every deletion leaves a consistent tree behind
        for descendant in descendants.iter().rev() {
            self.remove(descendant, events);
        }
        self.remove(path, events);
        Ok(())
    }

    fn route(&self, events: Vec<WatchEvent>) -> Vec<Delivery> {
        if !self.state.is_connected() {
            if !events.is_empty() {
                debug!(
                    "Dropping {} watch notification(s) while {}",
                    events.len(),
                    self.state
                );
            }
            return Vec::new();
        }
        let mut deliveries = Vec::new();
        for event in events {
            for (root, callback) in self.watches.values() {
                if event.path.starts_with(root) {
                    deliveries.push((callback.clone(), event.clone()));
                }
            }
        }
        deliveries
    }
}

/// In-memory hierarchical store with a simulated client connection
pub struct MemoryStore {
    inner: Mutex<Inner>,
    // Held across a mutation and its callback deliveries so callbacks observe
    // transactions in order. Callbacks must not write back into the store.
    delivery: Mutex<()>,
}

impl MemoryStore {
    /// Create an empty, connected store
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            delivery: Mutex::new(()),
        }
    }

    fn mutate<R>(
        &self,
        out_of_band: bool,
        op: impl FnOnce(&mut Inner, &mut Vec<WatchEvent>) -> CanopyResult<R>,
    ) -> CanopyResult<R> {
        let _delivery = self.delivery.lock();
        let (result, deliveries) = {
            let mut inner = self.inner.lock();
            if !out_of_band {
                inner.ensure_connected()?;
            }
            let mut events = Vec::new();
            let result = op(&mut inner, &mut events);
            (result, inner.route(events))
        };
        for (callback, event) in deliveries {
            callback(event);
        }
        result
    }

    fn transition(&self, states: &[ConnectionState], settled: ConnectionState) {
        let _delivery = self.delivery.lock();
        let listeners: Vec<ConnectionCallback> = {
            let mut inner = self.inner.lock();
            inner.state = settled;
            inner.connection_listeners.values().cloned().collect()
        };
        for state in states {
            debug!("Memory store connection {}", state);
            for listener in &listeners {
                listener(*state);
            }
        }
    }

    /// Simulate a dropped connection that may still recover
    pub fn suspend(&self) {
        if self.connection_state() == ConnectionState::Suspended {
            return;
        }
        self.transition(&[ConnectionState::Suspended], ConnectionState::Suspended);
    }

    /// Simulate a connection given up for lost
    pub fn lose(&self) {
        match self.connection_state() {
            ConnectionState::Lost => {}
            ConnectionState::Suspended => {
                self.transition(&[ConnectionState::Lost], ConnectionState::Lost)
            }
            _ => self.transition(
                &[ConnectionState::Suspended, ConnectionState::Lost],
                ConnectionState::Lost,
            ),
        }
    }

    /// Restore the connection
    pub fn reconnect(&self) {
        if self.connection_state().is_connected() {
            return;
        }
        self.transition(&[ConnectionState::Reconnected], ConnectionState::Connected);
    }

    /// Expire the client session, removing its ephemeral nodes
    pub fn expire_session(&self) -> CanopyResult<()> {
        self.mutate(true, |inner, events| {
            let owner = inner.session_id;
            let ephemerals: Vec<ZPath> = inner
                .nodes
                .iter()
                .filter(|(_, entry)| entry.stat.ephemeral_owner == Some(owner))
                .map(|(path, _)| path.clone())
                .collect();
            for path in ephemerals {
                inner.remove(&path, events);
            }
            inner.session_id = Uuid::new_v4();
            Ok(())
        })
    }

    /// Direct access to the server side, bypassing the client connection
    pub fn server(&self) -> ServerView<'_> {
        ServerView { store: self }
    }

    /// Last assigned transaction id
    pub fn last_zxid(&self) -> u64 {
        self.inner.lock().zxid
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-side mutations that work regardless of connection state
///
/// Changes made while the client is disconnected are not delivered to
/// watches, just as a real client would miss them.
pub struct ServerView<'a> {
    store: &'a MemoryStore,
}

impl ServerView<'_> {
    /// Create or overwrite a node, creating parents as needed
    pub fn set(&self, path: &ZPath, data: Vec<u8>) -> CanopyResult<Stat> {
        self.store.mutate(true, |inner, events| {
            inner.create_or_set(path, data, &CreateOptions::default(), events)
        })
    }

    /// Delete a node and its descendants
    pub fn delete(&self, path: &ZPath) -> CanopyResult<()> {
        let options = DeleteOptions {
            delete_children: true,
            quietly: true,
        };
        self.store
            .mutate(true, |inner, events| inner.delete(path, None, &options, events))
    }

    /// Payload currently stored at `path`
    pub fn get(&self, path: &ZPath) -> Option<Vec<u8>> {
        self.store
            .inner
            .lock()
            .nodes
            .get(path)
            .map(|entry| entry.data.clone())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn create_or_set(
        &self,
        path: &ZPath,
        data: Vec<u8>,
        options: &CreateOptions,
    ) -> CanopyResult<Stat> {
        self.mutate(false, |inner, events| {
            inner.create_or_set(path, data, options, events)
        })
    }

    async fn set_data(
        &self,
        path: &ZPath,
        data: Vec<u8>,
        version: Option<i32>,
    ) -> CanopyResult<Stat> {
        self.mutate(false, |inner, events| {
            inner.set_data(path, data, version, events)
        })
    }

    async fn read(&self, path: &ZPath) -> CanopyResult<(Vec<u8>, Stat)> {
        let inner = self.inner.lock();
        inner.ensure_connected()?;
        inner
            .nodes
            .get(path)
            .map(|entry| (entry.data.clone(), entry.stat.clone()))
            .ok_or_else(|| CanopyError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &ZPath) -> CanopyResult<Option<Stat>> {
        let inner = self.inner.lock();
        inner.ensure_connected()?;
        Ok(inner.nodes.get(path).map(|entry| entry.stat.clone()))
    }

    async fn children(&self, path: &ZPath) -> CanopyResult<Vec<ZPath>> {
        let inner = self.inner.lock();
        inner.ensure_connected()?;
        if !inner.nodes.contains_key(path) {
            return Err(CanopyError::NotFound(path.to_string()));
        }
        Ok(inner
            .nodes
            .range(path.clone()..)
            .skip(1)
            .take_while(|(candidate, _)| candidate.starts_with(path))
            .filter(|(candidate, _)| candidate.is_child_of(path))
            .map(|(candidate, _)| candidate.clone())
            .collect())
    }

    async fn delete(
        &self,
        path: &ZPath,
        version: Option<i32>,
        options: &DeleteOptions,
    ) -> CanopyResult<()> {
        self.mutate(false, |inner, events| {
            inner.delete(path, version, options, events)
        })
    }

    async fn enumerate_subtree(&self, path: &ZPath) -> CanopyResult<SubtreeSnapshot> {
        let inner = self.inner.lock();
        inner.ensure_connected()?;
        let nodes = inner
            .nodes
            .range(path.clone()..)
            .take_while(|(candidate, _)| candidate.starts_with(path))
            .map(|(candidate, entry)| StoreNode {
                path: candidate.clone(),
                data: entry.data.clone(),
                stat: entry.stat.clone(),
            })
            .collect();
        Ok(SubtreeSnapshot {
            zxid: inner.zxid,
            nodes,
        })
    }

    async fn watch(&self, path: &ZPath, callback: WatchCallback) -> CanopyResult<WatchId> {
        let mut inner = self.inner.lock();
        inner.ensure_connected()?;
        let id = WatchId(inner.next_id);
        inner.next_id += 1;
        inner.watches.insert(id, (path.clone(), callback));
        debug!("Registered watch {:?} on {}", id, path);
        Ok(id)
    }

    async fn unwatch(&self, id: WatchId) -> CanopyResult<()> {
        if self.inner.lock().watches.remove(&id).is_some() {
            debug!("Removed watch {:?}", id);
        }
        Ok(())
    }

    fn add_connection_listener(&self, callback: ConnectionCallback) -> ConnectionListenerId {
        let mut inner = self.inner.lock();
        let id = ConnectionListenerId(inner.next_id);
        inner.next_id += 1;
        inner.connection_listeners.insert(id, callback);
        id
    }

    fn remove_connection_listener(&self, id: ConnectionListenerId) {
        self.inner.lock().connection_listeners.remove(&id);
    }

    fn connection_state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn path(raw: &str) -> ZPath {
        ZPath::parse(raw).unwrap()
    }

    fn recorder() -> (WatchCallback, Arc<Mutex<Vec<WatchEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: WatchCallback = Arc::new(move |event| sink.lock().push(event));
        (callback, seen)
    }

    #[tokio::test]
    async fn create_parents_and_read() {
        let store = MemoryStore::new();
        let stat = store
            .create_or_set(&path("/a/b/c"), b"x".to_vec(), &CreateOptions::default())
            .await
            .unwrap();
        assert_eq!(stat.version, 0);

        let (data, _) = store.read(&path("/a/b/c")).await.unwrap();
        assert_eq!(data, b"x");
        let (parent, parent_stat) = store.read(&path("/a/b")).await.unwrap();
        assert!(parent.is_empty());
        assert_eq!(parent_stat.num_children, 1);
    }

    #[tokio::test]
    async fn create_without_parents_fails() {
        let store = MemoryStore::new();
        let options = CreateOptions {
            create_parents: false,
            ..CreateOptions::default()
        };
        let err = store
            .create_or_set(&path("/a/b"), b"x".to_vec(), &options)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn overwrite_bumps_version() {
        let store = MemoryStore::new();
        let p = path("/v");
        store.create_or_set(&p, b"1".to_vec(), &CreateOptions::default()).await.unwrap();
        let stat = store.create_or_set(&p, b"2".to_vec(), &CreateOptions::default()).await.unwrap();
        assert_eq!(stat.version, 1);

        let err = store.set_data(&p, b"3".to_vec(), Some(0)).await.unwrap_err();
        assert!(matches!(err, CanopyError::BadVersion { expected: 0, actual: 1, .. }));
    }

    #[tokio::test]
    async fn delete_requires_delete_children() {
        let store = MemoryStore::new();
        store
            .create_or_set(&path("/p/c"), b"c".to_vec(), &CreateOptions::default())
            .await
            .unwrap();
        let err = store
            .delete(&path("/p"), None, &DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CanopyError::NotEmpty(_)));

        let options = DeleteOptions {
            delete_children: true,
            quietly: false,
        };
        store.delete(&path("/p"), None, &options).await.unwrap();
        assert!(store.exists(&path("/p/c")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn watches_are_recursive_and_ordered() {
        let store = MemoryStore::new();
        let (callback, seen) = recorder();
        store.watch(&path("/w"), callback).await.unwrap();

        store.create_or_set(&path("/w/a"), b"1".to_vec(), &CreateOptions::default()).await.unwrap();
        store.create_or_set(&path("/w/a"), b"2".to_vec(), &CreateOptions::default()).await.unwrap();
        store.create_or_set(&path("/other"), b"x".to_vec(), &CreateOptions::default()).await.unwrap();
        store.delete(&path("/w/a"), None, &DeleteOptions::default()).await.unwrap();

        let seen = seen.lock();
        let kinds: Vec<_> = seen.iter().map(|e| (e.kind, e.path.to_string())).collect();
        assert_eq!(
            kinds,
            vec![
                (WatchEventKind::Created, "/w".to_string()),
                (WatchEventKind::Created, "/w/a".to_string()),
                (WatchEventKind::Changed, "/w/a".to_string()),
                (WatchEventKind::Deleted, "/w/a".to_string()),
            ]
        );
        assert!(seen.windows(2).all(|pair| pair[0].zxid < pair[1].zxid));
    }

    #[tokio::test]
    async fn disconnected_client_fails_and_misses_events() {
        let store = MemoryStore::new();
        let (callback, seen) = recorder();
        store.watch(&path("/w"), callback).await.unwrap();

        store.lose();
        let err = store.read(&path("/w")).await.unwrap_err();
        assert!(err.is_retryable());

        store.server().set(&path("/w/x"), b"1".to_vec()).unwrap();
        assert!(seen.lock().is_empty());

        store.reconnect();
        assert_eq!(store.connection_state(), ConnectionState::Connected);
        let (data, _) = store.read(&path("/w/x")).await.unwrap();
        assert_eq!(data, b"1");
    }

    #[tokio::test]
    async fn connection_listener_sees_transitions() {
        let store = MemoryStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.add_connection_listener(Arc::new(move |state| sink.lock().push(state)));

        store.lose();
        store.reconnect();
        assert_eq!(
            *seen.lock(),
            vec![
                ConnectionState::Suspended,
                ConnectionState::Lost,
                ConnectionState::Reconnected
            ]
        );
    }

    #[tokio::test]
    async fn containers_and_ephemerals() {
        let store = MemoryStore::new();
        let container = CreateOptions {
            mode: CreateMode::Container,
            ..CreateOptions::default()
        };
        store.create_or_set(&path("/box"), Vec::new(), &container).await.unwrap();
        store
            .create_or_set(&path("/box/item"), b"i".to_vec(), &CreateOptions::default())
            .await
            .unwrap();
        store
            .delete(&path("/box/item"), None, &DeleteOptions::default())
            .await
            .unwrap();
        assert!(store.exists(&path("/box")).await.unwrap().is_none());

        let ephemeral = CreateOptions {
            mode: CreateMode::Ephemeral,
            ..CreateOptions::default()
        };
        store.create_or_set(&path("/e"), b"e".to_vec(), &ephemeral).await.unwrap();
        store.expire_session().unwrap();
        assert!(store.exists(&path("/e")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enumerate_subtree_is_path_ordered() {
        let store = MemoryStore::new();
        for p in ["/t/b", "/t/a/x", "/t/a", "/u"] {
            store.create_or_set(&path(p), b"v".to_vec(), &CreateOptions::default()).await.unwrap();
        }
        let snapshot = store.enumerate_subtree(&path("/t")).await.unwrap();
        let paths: Vec<_> = snapshot.nodes.iter().map(|n| n.path.to_string()).collect();
        assert_eq!(paths, vec!["/t", "/t/a", "/t/a/x", "/t/b"]);
        assert_eq!(snapshot.zxid, store.last_zxid());

        let missing = store.enumerate_subtree(&path("/nope")).await.unwrap();
        assert!(missing.nodes.is_empty());
    }
}
