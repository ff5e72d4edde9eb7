//! Integration tests for Canopy

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn canopy(config_dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("canopy");
        cmd.env("CANOPY_CONFIG", config_dir.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        canopy(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("reactive local cache"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        canopy(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("canopy"));
    }

    #[test]
    fn config_path_follows_env() {
        let dir = TempDir::new().unwrap();
        canopy(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let dir = TempDir::new().unwrap();
        canopy(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("root = \"/canopy\""));
    }

    #[test]
    fn config_init_then_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        canopy(&dir).args(["config", "init"]).assert().success();
        assert!(dir.path().join("config.toml").exists());

        canopy(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_reports_hint() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[cache\nroot = 1").unwrap();
        canopy(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("config init --force"));
    }

    #[test]
    fn unusable_settings_are_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");

        std::fs::write(&file, "[general]\nlog_format = \"yaml\"\n").unwrap();
        canopy(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));

        std::fs::write(&file, "[cache]\nroot = \"relative\"\n").unwrap();
        canopy(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cache.root"));
    }

    #[test]
    fn demo_plain_reports_resync() {
        let dir = TempDir::new().unwrap();
        canopy(&dir)
            .args(["demo", "--children", "2", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("added /canopy/item-2"))
            .stdout(predicate::str::contains("lost"))
            .stdout(predicate::str::contains("removed /canopy/seed"))
            .stdout(predicate::str::contains("updated /canopy/item-1"))
            .stdout(predicate::str::contains("reconnected"))
            .stdout(predicate::str::contains("added /canopy/seed").not());
    }

    #[test]
    fn demo_json_lines() {
        let dir = TempDir::new().unwrap();
        canopy(&dir)
            .args(["demo", "--children", "1", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"kind\":\"added\""))
            .stdout(predicate::str::contains("\"count\":101"));
    }

    #[test]
    fn demo_rejects_zero_children() {
        let dir = TempDir::new().unwrap();
        canopy(&dir)
            .args(["demo", "--children", "0"])
            .assert()
            .failure();
    }
}

mod cache_tests {
    use canopy::cache::{CacheEvent, CacheEventKind, CachePhase, ListenerExt};
    use canopy::error::{CanopyError, CanopyResult};
    use canopy::framework::{CachedModeledFramework, ModeledFramework};
    use canopy::model::{JsonModelSerializer, ModelSpec, ZPath};
    use canopy::store::MemoryStore;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        name: String,
        age: u32,
    }

    fn person(name: &str, age: u32) -> Person {
        Person {
            name: name.to_string(),
            age,
        }
    }

    fn path(raw: &str) -> ZPath {
        ZPath::parse(raw).unwrap()
    }

    fn cached(store: &Arc<MemoryStore>, root: &str) -> CachedModeledFramework<Person> {
        let spec = ModelSpec::builder(path(root), JsonModelSerializer::new()).build();
        ModeledFramework::wrap(store.clone(), spec).cached()
    }

    type Log = Arc<Mutex<Vec<(CacheEventKind, Option<String>)>>>;

    fn recorder(log: &Log) -> impl Fn(&CacheEvent<Person>) -> CanopyResult<()> + Send + Sync {
        let log = log.clone();
        move |event: &CacheEvent<Person>| -> CanopyResult<()> {
            let path = event.node().map(|n| n.path.to_string());
            log.lock().push((event.kind(), path));
            Ok(())
        }
    }

    async fn eventually(condition: impl Fn() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn started(framework: &CachedModeledFramework<Person>) {
        framework.start().unwrap();
        framework.await_initialized(Some(WAIT)).await.unwrap();
    }

    #[tokio::test]
    async fn children_reflect_sets() {
        let store = Arc::new(MemoryStore::new());
        let people = cached(&store, "/p");
        started(&people).await;

        people.child("c1").unwrap().set(&person("one", 1)).await.unwrap();
        people.child("c2").unwrap().set(&person("two", 2)).await.unwrap();
        eventually(|| people.cache().size() == 2).await;

        let children = people.children().await.unwrap();
        assert_eq!(children, vec![path("/p/c1"), path("/p/c2")]);

        let mut nodes = people.children_as_nodes().await.unwrap();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].model, person("one", 1));
        assert_eq!(nodes[1].model, person("two", 2));

        people.close().await;
    }

    #[tokio::test]
    async fn post_initialized_listener_ignores_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let people = cached(&store, "/p");
        people.child("a").unwrap().set(&person("a", 1)).await.unwrap();
        people.child("b").unwrap().set(&person("b", 2)).await.unwrap();

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        people
            .listenable()
            .add_listener(recorder(&log).post_initialized_only());
        started(&people).await;
        assert_eq!(people.cache().size(), 2);
        assert!(log.lock().is_empty());

        people.child("c").unwrap().set(&person("c", 3)).await.unwrap();
        eventually(|| !log.lock().is_empty()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            *log.lock(),
            vec![(CacheEventKind::NodeAdded, Some("/p/c".to_string()))]
        );
        people.close().await;
    }

    #[tokio::test]
    async fn unfiltered_listener_sees_initialized_without_node_events() {
        let store = Arc::new(MemoryStore::new());
        let people = cached(&store, "/p");
        people.child("a").unwrap().set(&person("a", 1)).await.unwrap();

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        people.listenable().add_listener(recorder(&log));
        started(&people).await;
        eventually(|| !log.lock().is_empty()).await;

        assert_eq!(*log.lock(), vec![(CacheEventKind::Initialized, None)]);
        people.close().await;
    }

    #[tokio::test]
    async fn reads_survive_lost_and_refresh_after_reconnect() {
        let store = Arc::new(MemoryStore::new());
        let people = cached(&store, "/p");
        let alice = people.child("alice").unwrap();
        alice.set(&person("alice", 30)).await.unwrap();
        started(&people).await;

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        people.listenable().add_listener(recorder(&log));

        store.lose();
        eventually(|| {
            log.lock()
                .iter()
                .any(|(kind, _)| *kind == CacheEventKind::ConnectionLost)
        })
        .await;
        assert_eq!(alice.read().await.unwrap(), person("alice", 30));

        let uncached = alice.uncached().read().await.unwrap_err();
        assert!(matches!(uncached, CanopyError::Connectivity(_)));

        let encoded = people.model_spec().encode(&person("alice", 31)).unwrap();
        store.server().set(alice.path(), encoded).unwrap();
        store.reconnect();
        eventually(|| {
            log.lock()
                .iter()
                .any(|(kind, _)| *kind == CacheEventKind::ConnectionReconnected)
        })
        .await;

        assert_eq!(alice.read().await.unwrap(), person("alice", 31));
        people.close().await;
    }

    #[tokio::test]
    async fn cache_matches_store_after_disconnected_mutations() {
        let store = Arc::new(MemoryStore::new());
        let people = cached(&store, "/p");
        for (name, age) in [("a", 1), ("b", 2), ("c", 3)] {
            people.child(name).unwrap().set(&person(name, age)).await.unwrap();
        }
        started(&people).await;

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        people.listenable().add_listener(recorder(&log));

        store.lose();
        let spec = people.model_spec();
        store.server().delete(&path("/p/a")).unwrap();
        store
            .server()
            .set(&path("/p/b"), spec.encode(&person("b", 20)).unwrap())
            .unwrap();
        store
            .server()
            .set(&path("/p/d"), spec.encode(&person("d", 4)).unwrap())
            .unwrap();
        store.reconnect();
        eventually(|| {
            log.lock()
                .iter()
                .any(|(kind, _)| *kind == CacheEventKind::ConnectionReconnected)
        })
        .await;

        let cached: Vec<(String, u32)> = people
            .list()
            .unwrap()
            .into_iter()
            .map(|n| (n.path.to_string(), n.model.age))
            .collect();
        assert_eq!(
            cached,
            vec![
                ("/p/b".to_string(), 20),
                ("/p/c".to_string(), 3),
                ("/p/d".to_string(), 4),
            ]
        );

        let node_events: Vec<_> = log
            .lock()
            .iter()
            .filter(|(_, path)| path.is_some())
            .cloned()
            .collect();
        assert_eq!(
            node_events,
            vec![
                (CacheEventKind::NodeRemoved, Some("/p/a".to_string())),
                (CacheEventKind::NodeUpdated, Some("/p/b".to_string())),
                (CacheEventKind::NodeAdded, Some("/p/d".to_string())),
            ]
        );
        people.close().await;
    }

    #[tokio::test]
    async fn events_for_one_path_keep_mutation_order() {
        let store = Arc::new(MemoryStore::new());
        let people = cached(&store, "/p");
        started(&people).await;

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        people.listenable().add_listener(recorder(&log));

        let bob = people.child("bob").unwrap();
        bob.set(&person("bob", 1)).await.unwrap();
        bob.set(&person("bob", 2)).await.unwrap();
        bob.delete(None).await.unwrap();
        bob.set(&person("bob", 3)).await.unwrap();
        eventually(|| log.lock().len() == 4).await;

        let kinds: Vec<_> = log.lock().iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                CacheEventKind::NodeAdded,
                CacheEventKind::NodeUpdated,
                CacheEventKind::NodeRemoved,
                CacheEventKind::NodeAdded,
            ]
        );
        assert_eq!(bob.read_cached().unwrap().model.age, 3);
        people.close().await;
    }

    #[tokio::test]
    async fn failing_listener_does_not_stop_others() {
        let store = Arc::new(MemoryStore::new());
        let people = cached(&store, "/p");
        started(&people).await;

        people
            .listenable()
            .add_listener(|_: &CacheEvent<Person>| -> CanopyResult<()> {
                panic!("listener bug")
            });
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        people.listenable().add_listener(recorder(&log));

        people.child("x").unwrap().set(&person("x", 1)).await.unwrap();
        people.child("y").unwrap().set(&person("y", 2)).await.unwrap();
        eventually(|| log.lock().len() == 2).await;
        assert_eq!(people.phase(), CachePhase::Initialized);
        people.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let store = Arc::new(MemoryStore::new());
        let people = cached(&store, "/p");
        started(&people).await;

        people.close().await;
        people.close().await;
        assert_eq!(people.phase(), CachePhase::Closed);
        assert!(matches!(people.start(), Err(CanopyError::Closed)));
        assert!(matches!(people.read_cached(), Err(CanopyError::Closed)));
        assert!(matches!(
            people.await_initialized(Some(WAIT)).await,
            Err(CanopyError::Closed)
        ));
    }
}
