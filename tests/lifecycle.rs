//! Load, unload, reload and full reload behavior of the engine.

use std::sync::Arc;

use config_engine::config::ConfigurationEntry;
use config_engine::engine::{ConfigurationEngine, ConfigurationState};
use config_engine::error::EngineError;
use config_engine::loader::store::ConfigStore;
use config_engine::observability::{Level, ALL};
use tempfile::TempDir;

mod common;
use common::{
    count_level, engine, engine_with_store, oversized_bundle, record, texts, write, ControlledStore,
};

fn orders_store() -> Arc<ControlledStore> {
    let store = ControlledStore::new();
    store.publish(record(
        "X",
        "1",
        &[
            ("X/Configuration.toml", b"name = \"X\"\n".as_slice()),
            ("X/route.xsl", b"route-v1".as_slice()),
        ],
    ));
    store
}

fn store_engine(store: &Arc<ControlledStore>) -> ConfigurationEngine {
    engine_with_store(
        vec![ConfigurationEntry::database("X")],
        store.clone() as Arc<dyn ConfigStore>,
    )
}

#[tokio::test]
async fn reload_builds_a_new_instance_with_equal_content() {
    let store = orders_store();
    let engine = store_engine(&store);
    assert!(engine.init(false).await);

    let before = engine.configuration("X").unwrap();
    assert_eq!(engine.reload("X").await.unwrap(), ConfigurationState::Started);
    let after = engine.configuration("X").unwrap();

    assert_ne!(before.instance_id(), after.instance_id());
    assert_eq!(before.resources(), after.resources());
    assert_eq!(engine.handle_constructions("X"), 1);

    let log = engine.log("X");
    let texts = texts(&log);
    assert!(texts.iter().any(|t| t.starts_with("unload in")));
    assert_eq!(texts.iter().filter(|t| t.starts_with("startup in")).count(), 2);
}

#[tokio::test]
async fn reload_picks_up_new_store_content() {
    let store = orders_store();
    let engine = store_engine(&store);
    engine.init(false).await;

    store.publish(record(
        "X",
        "2",
        &[
            ("X/Configuration.toml", b"name = \"X\"\n".as_slice()),
            ("X/route.xsl", b"route-v2".as_slice()),
        ],
    ));
    engine.reload("X").await.unwrap();

    assert_eq!(engine.configuration("X").unwrap().version(), Some("2"));
    assert_eq!(engine.resolve("X", "X/route.xsl").unwrap().bytes(), b"route-v2");
}

#[tokio::test]
async fn failed_store_reload_keeps_last_good_content() {
    let store = orders_store();
    let engine = store_engine(&store);
    engine.init(false).await;
    let before = engine.resolve("X", "X/route.xsl").unwrap();

    store.set_failing(true);
    assert_eq!(engine.reload("X").await.unwrap(), ConfigurationState::Started);

    let log = engine.log("X");
    assert_eq!(count_level(&log, Level::Error), 1);
    let error = log.iter().find(|e| e.level == Level::Error).unwrap();
    assert_eq!(error.text, "could not reload resources, keeping last-good content");
    assert!(error.cause.as_deref().unwrap().contains("connection refused"));

    let after = engine.resolve("X", "X/route.xsl").unwrap();
    assert_eq!(before.bytes(), after.bytes());
    assert_eq!(engine.configuration("X").unwrap().version(), Some("1"));
}

#[tokio::test]
async fn failed_directory_reload_fails_the_load() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    write(&root, "A/Configuration.toml", "");
    let engine = engine(vec![ConfigurationEntry::directory("A", &root)]);
    engine.init(false).await;
    assert_eq!(engine.state("A"), ConfigurationState::Started);

    std::fs::remove_dir_all(&root).unwrap();
    assert_eq!(
        engine.reload("A").await.unwrap(),
        ConfigurationState::FailedToLoad
    );
    assert!(engine.resource_loader("A").unwrap().is_failed());

    write(&root, "A/Configuration.toml", "");
    assert_eq!(engine.reload("A").await.unwrap(), ConfigurationState::Started);
    assert!(!engine.resource_loader("A").unwrap().is_failed());
}

#[tokio::test]
async fn one_failure_does_not_affect_the_others() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "A/Configuration.toml", "");
    write(dir.path(), "B/Configuration.toml", "this is = = not toml");
    write(dir.path(), "C/Configuration.toml", "");
    let engine = engine(vec![
        ConfigurationEntry::directory("A", dir.path()),
        ConfigurationEntry::directory("B", dir.path()),
        ConfigurationEntry::directory("C", dir.path()).with_parent("ghost"),
        ConfigurationEntry::database("D"),
    ]);

    assert!(engine.init(false).await);
    assert_eq!(engine.state("A"), ConfigurationState::Started);
    assert_eq!(engine.state("B"), ConfigurationState::FailedToLoad);
    assert_eq!(engine.state("C"), ConfigurationState::FailedToLoad);
    assert_eq!(engine.state("D"), ConfigurationState::FailedToLoad);

    assert_eq!(count_level(&engine.log("A"), Level::Error), 0);
    for name in ["B", "C", "D"] {
        let log = engine.log(name);
        assert_eq!(count_level(&log, Level::Error), 1, "{name}");
        assert_eq!(log.last().unwrap().text, "failed to load");
    }
    assert!(engine
        .configuration("C")
        .unwrap()
        .last_error()
        .unwrap()
        .contains("ghost"));

    let status = engine.status();
    assert_eq!(status.configurations.len(), 4);
    assert_eq!(status.configurations[0].name, "A");
}

#[tokio::test]
async fn bundle_with_huge_declared_entry_fails_only_its_configuration() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "A/Configuration.toml", "");
    let archive = dir.path().join("orders.tar.gz");
    std::fs::write(&archive, oversized_bundle(1 << 44)).unwrap();

    let store = ControlledStore::new();
    store.publish(config_engine::loader::store::ConfigRecord {
        bundle: oversized_bundle(1 << 44),
        ..record("X", "1", &[])
    });
    let engine = engine_with_store(
        vec![
            ConfigurationEntry::directory("A", dir.path()),
            ConfigurationEntry::database("X"),
            ConfigurationEntry::archive("Orders", &archive),
        ],
        store.clone() as Arc<dyn ConfigStore>,
    );

    assert!(engine.init(false).await);
    assert_eq!(engine.state("A"), ConfigurationState::Started);
    assert_eq!(engine.state("X"), ConfigurationState::FailedToLoad);
    assert_eq!(engine.state("Orders"), ConfigurationState::FailedToLoad);
    for name in ["X", "Orders"] {
        let configuration = engine.configuration(name).unwrap();
        assert!(configuration.last_error().unwrap().contains("invalid bundle"));
    }
}

#[tokio::test]
async fn reload_of_huge_declared_bundle_keeps_last_good_content() {
    let store = orders_store();
    let engine = store_engine(&store);
    engine.init(false).await;

    store.publish(config_engine::loader::store::ConfigRecord {
        bundle: oversized_bundle(1 << 44),
        ..record("X", "2", &[])
    });
    assert_eq!(engine.reload("X").await.unwrap(), ConfigurationState::Started);
    assert_eq!(count_level(&engine.log("X"), Level::Error), 1);
    assert_eq!(engine.resolve("X", "X/route.xsl").unwrap().bytes(), b"route-v1");
}

#[tokio::test]
async fn unload_releases_the_configuration() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "A/Configuration.toml",
        "[[adapters]]\nname = \"in\"\nlisteners = [\"orders-in\"]\n",
    );
    write(
        dir.path(),
        "B/Configuration.toml",
        "[[adapters]]\nname = \"in\"\nlisteners = [\"orders-in\"]\n",
    );
    let engine = engine(vec![
        ConfigurationEntry::directory("A", dir.path()),
        ConfigurationEntry::directory("B", dir.path()),
    ]);
    engine.init(false).await;
    assert_eq!(engine.state("B"), ConfigurationState::FailedToLoad);

    assert!(engine.unload("A").await.unwrap());
    assert_eq!(engine.state("A"), ConfigurationState::Unloaded);
    assert!(engine.configuration("A").is_none());

    // the endpoint is free again
    assert_eq!(engine.load("B").await.unwrap(), ConfigurationState::Started);
}

#[tokio::test]
async fn concurrent_loads_construct_one_handle() {
    let store = ControlledStore::new();
    let engine = store_engine(&store);
    engine.init(false).await;
    assert_eq!(engine.state("X"), ConfigurationState::FailedToLoad);
    assert_eq!(engine.handle_constructions("X"), 0);

    store.publish(record(
        "X",
        "1",
        &[("X/Configuration.toml", b"name = \"X\"\n".as_slice())],
    ));
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.load("X").await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), ConfigurationState::Started);
    }

    assert_eq!(engine.handle_constructions("X"), 1);
    assert_eq!(engine.state("X"), ConfigurationState::Started);
}

#[tokio::test]
async fn full_reload_is_refused_while_loading() {
    let store = orders_store();
    let engine = store_engine(&store);
    engine.init(false).await;
    let before = engine.configuration("X").unwrap().instance_id();

    store.block();
    let loading = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.reload("X").await })
    };
    store.wait_entered().await;
    assert_eq!(engine.state("X"), ConfigurationState::Loading);

    match engine.full_reload().await {
        Err(EngineError::Busy { loading }) => assert_eq!(loading, vec!["X".to_string()]),
        other => panic!("expected busy refusal, got {other:?}"),
    }
    assert!(engine.is_initialized());
    assert!(texts(&engine.log(ALL))
        .iter()
        .any(|t| t.starts_with("full reload refused")));

    store.release();
    assert_eq!(loading.await.unwrap().unwrap(), ConfigurationState::Started);
    assert_ne!(engine.configuration("X").unwrap().instance_id(), before);
    assert_eq!(engine.handle_constructions("X"), 1);
}

#[tokio::test]
async fn full_reload_rebuilds_from_empty() {
    let store = orders_store();
    let engine = store_engine(&store);
    engine.init(false).await;
    let before = engine.configuration("X").unwrap().instance_id();
    let handle_before = engine.resource_loader("X").unwrap();

    engine.full_reload().await.unwrap();

    let after = engine.configuration("X").unwrap();
    assert_eq!(after.state(), ConfigurationState::Started);
    assert_ne!(after.instance_id(), before);
    assert!(!Arc::ptr_eq(&handle_before, &engine.resource_loader("X").unwrap()));

    let all = engine.log(ALL);
    let texts = texts(&all);
    let shutdown = texts.iter().position(|t| t.starts_with("shutdown in")).unwrap();
    let reload = texts.iter().position(|t| t.starts_with("full reload in")).unwrap();
    assert!(shutdown < reload);

    // message streams survive the rebuild
    assert!(engine.log("X").len() > 2);
}

#[tokio::test]
async fn destroy_unloads_everything() {
    let store = orders_store();
    let engine = store_engine(&store);
    engine.init(false).await;

    engine.destroy().await;
    assert!(!engine.is_initialized());
    assert_eq!(engine.state("X"), ConfigurationState::Unloaded);
    assert!(matches!(
        engine.load("X").await,
        Err(EngineError::NotInitialized)
    ));

    assert!(engine.init(false).await);
    assert_eq!(engine.state("X"), ConfigurationState::Started);
}
