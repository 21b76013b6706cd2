use serial_test::serial;
use stash_storage::{
    BackendKind, ConfigSource, StorageConfig, StorageExt, StorageRegistry, UpdateError,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, thiserror::Error)]
#[error("rejected")]
struct Rejected;

fn config(temp_dir: &TempDir) -> StorageConfig {
    StorageConfig::builder()
        .data_dir(temp_dir.path())
        .store_name("app")
        .coalesce_delay(Duration::from_millis(20))
        .build()
}

#[tokio::test]
async fn second_instance_sees_flushed_data() {
    let temp_dir = TempDir::new().unwrap();

    let a = StorageRegistry::new(config(&temp_dir));
    let storage = a.get(BackendKind::File).unwrap();
    storage.set_item("x", "y").await.unwrap();
    storage.flush().await.unwrap();

    let b = StorageRegistry::new(config(&temp_dir));
    let reader = b.get(BackendKind::File).unwrap();
    assert_eq!(reader.get_item("x").await.unwrap().as_deref(), Some("y"));
    assert!(temp_dir.path().join("app.json").exists());
}

#[tokio::test]
async fn host_backend_persists_between_registries() {
    let temp_dir = TempDir::new().unwrap();

    let first = StorageRegistry::new(config(&temp_dir));
    first
        .get(BackendKind::Host)
        .unwrap()
        .set_json("theme", &"dark")
        .await
        .unwrap();

    let second = StorageRegistry::new(config(&temp_dir));
    let host = second.get(BackendKind::Host).unwrap();
    assert_eq!(host.get_json::<String>("theme").await.unwrap().as_deref(), Some("dark"));
    assert!(second.host_dir().is_dir());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn host_updates_are_serialized_by_the_registry() {
    let temp_dir = TempDir::new().unwrap();
    let registry = StorageRegistry::new(config(&temp_dir));
    let host = registry.get(BackendKind::Host).unwrap();

    let tasks: Vec<_> = (0..24)
        .map(|_| {
            let host = Arc::clone(&host);
            tokio::spawn(async move {
                host.update_data("visits", |v: Option<u32>| Ok::<_, Rejected>(v.unwrap_or(0) + 1))
                    .await
                    .unwrap()
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(host.get_json::<u32>("visits").await.unwrap(), Some(24));
}

#[tokio::test]
async fn rejections_pass_through_every_backend() {
    let temp_dir = TempDir::new().unwrap();
    let registry = StorageRegistry::new(config(&temp_dir));

    for kind in BackendKind::ALL {
        let storage = registry.get(kind).unwrap();
        storage.set_item("k", "1").await.unwrap();
        let err = storage
            .update_data("k", |_: Option<u32>| Err::<u32, _>(Rejected))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Rejected(Rejected)), "{kind}");
        assert_eq!(storage.get_item("k").await.unwrap().as_deref(), Some("1"), "{kind}");
    }
}

#[test]
#[serial]
fn environment_overrides_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("stash.json");
    std::fs::write(&file, r#"{"store_name": "from-file", "flush_retries": 5}"#).unwrap();

    std::env::set_var("STASH_STORE_NAME", "from-env");
    std::env::set_var("STASH_FLUSH_TIMEOUT_MS", "250");
    let resolved = StorageConfig::resolve(Some(&file));
    std::env::remove_var("STASH_STORE_NAME");
    std::env::remove_var("STASH_FLUSH_TIMEOUT_MS");

    let (config, sources) = resolved.unwrap();
    assert_eq!(config.store_name, "from-env");
    assert_eq!(config.flush_retries, 5);
    assert_eq!(config.flush_timeout(), Duration::from_millis(250));
    assert_eq!(sources[0], ConfigSource::Default);
    assert_eq!(sources[1], ConfigSource::ConfigFile(file));
    assert!(sources.contains(&ConfigSource::EnvironmentVariable(
        "STASH_STORE_NAME".to_string()
    )));
}

#[test]
#[serial]
fn invalid_environment_number_fails_resolution() {
    std::env::set_var("STASH_COALESCE_MS", "fast");
    let resolved = StorageConfig::resolve(None);
    std::env::remove_var("STASH_COALESCE_MS");

    let err = resolved.unwrap_err();
    assert!(err.to_string().contains("STASH_COALESCE_MS"));
}
