use crate::Error;
use crate::source::SourceAdapter;
use crate::test_helpers::{FakeAdapter, create_test_manager, entry, test_config};
use crate::types::SourceKind;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};


async fn serve_file(server: &MockServer, file: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/files/{}", file)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_version_stores_artifact_and_record() {
    let dir = tempdir().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "demo-v1.0.bin", b"demo artifact".to_vec()).await;

    let config = test_config(&dir);
    let adapter = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    let manager = create_test_manager(&config, vec![adapter as Arc<dyn SourceAdapter>]).await;

    let demo = entry("demo", SourceKind::Github);
    let outcome = manager.fetch_version(&demo, "v1.0").await.unwrap();

    let path = outcome.path.clone().unwrap();
    assert_eq!(outcome.version, "v1.0");
    assert_eq!(path, manager.cache_dir().join("demo-linux-amd64-v1.0.bin"));
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"demo artifact");
    assert!(
        !manager.cache_dir().join(".demo-linux-amd64-v1.0.bin.part").exists(),
        "partial file must be renamed away"
    );

    let record = manager.db().lookup("demo", "linux", "amd64").await.unwrap().unwrap();
    assert_eq!(record.version, "v1.0");
    assert_eq!(record.path(), path);
}

#[tokio::test]
async fn test_new_version_replaces_previous_file() {
    let dir = tempdir().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "demo-v1.0.bin", b"one".to_vec()).await;
    serve_file(&server, "demo-v1.1.bin", b"two".to_vec()).await;

    let config = test_config(&dir);
    let adapter = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    let manager = create_test_manager(&config, vec![adapter as Arc<dyn SourceAdapter>]).await;
    let demo = entry("demo", SourceKind::Github);

    let first = manager.fetch_version(&demo, "v1.0").await.unwrap().path.unwrap();
    let second = manager.fetch_version(&demo, "v1.1").await.unwrap().path.unwrap();

    assert!(!first.exists(), "superseded artifact must be removed");
    assert!(second.exists());
    assert_eq!(manager.db().count_cache_records().await.unwrap(), 1);
    assert_eq!(
        manager.db().lookup("demo", "linux", "amd64").await.unwrap().unwrap().version,
        "v1.1"
    );
}

#[tokio::test]
async fn test_rejected_link_yields_empty_outcome() {
    let dir = tempdir().unwrap();
    let server = MockServer::start().await;

    let config = test_config(&dir);
    let adapter = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()).with_invalid_links());
    let manager = create_test_manager(&config, vec![adapter as Arc<dyn SourceAdapter>]).await;

    let outcome = manager
        .fetch_version(&entry("demo", SourceKind::Github), "v1.0")
        .await
        .unwrap();

    assert!(!outcome.is_fetched());
    assert_eq!(outcome.version, "v1.0");
    assert!(manager.db().lookup("demo", "linux", "amd64").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_link_is_an_invalid_link_error() {
    let adapter = FakeAdapter::new(SourceKind::Github, "http://unused").with_invalid_links();

    let err = super::checked_link(&adapter, "http://unused/files/demo.bin".to_string())
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::InvalidLink { url } if url == "http://unused/files/demo.bin"));
    assert!(err.is_item_level());
}

#[tokio::test]
async fn test_failed_download_leaves_no_partial_file() {
    let dir = tempdir().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "demo-v1.0.bin", b"old".to_vec()).await;
    Mock::given(method("GET"))
        .and(path("/files/demo-v2.0.bin"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = test_config(&dir);
    let adapter = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    let manager = create_test_manager(&config, vec![adapter as Arc<dyn SourceAdapter>]).await;
    let demo = entry("demo", SourceKind::Github);

    let old = manager.fetch_version(&demo, "v1.0").await.unwrap().path.unwrap();
    let outcome = manager.fetch_version(&demo, "v2.0").await.unwrap();

    assert!(!outcome.is_fetched());
    assert!(old.exists(), "previous artifact must survive a failed refresh");
    let leftovers: Vec<_> = std::fs::read_dir(manager.cache_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty(), "found partial files: {:?}", leftovers);
    assert_eq!(
        manager.db().lookup("demo", "linux", "amd64").await.unwrap().unwrap().version,
        "v1.0"
    );
}

#[tokio::test]
async fn test_resolve_path_drops_record_of_missing_file() {
    let dir = tempdir().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "demo-v1.0.bin", b"demo".to_vec()).await;

    let config = test_config(&dir);
    let adapter = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    let manager = create_test_manager(&config, vec![adapter as Arc<dyn SourceAdapter>]).await;
    let demo = entry("demo", SourceKind::Github);

    let path = manager.fetch_version(&demo, "v1.0").await.unwrap().path.unwrap();
    assert_eq!(manager.resolve_path(&demo).await.unwrap(), Some(path.clone()));

    std::fs::remove_file(&path).unwrap();

    assert_eq!(manager.resolve_path(&demo).await.unwrap(), None);
    assert!(
        manager.db().lookup("demo", "linux", "amd64").await.unwrap().is_none(),
        "record of a vanished file must be deleted"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_path_keeps_record() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let manager = create_test_manager(&config, vec![]).await;
    let demo = entry("demo", SourceKind::Github);

    // A regular file used as a directory: stat fails with ENOTDIR, not ENOENT
    let not_a_dir = manager.cache_dir().join("plain.bin");
    std::fs::write(&not_a_dir, b"x").unwrap();
    manager
        .db()
        .upsert("demo", "linux", "amd64", "v1.0", &not_a_dir.join("demo.bin"))
        .await
        .unwrap();

    let result = manager.resolve_path(&demo).await;

    assert!(matches!(result, Err(Error::Io(_))), "got {:?}", result);
    assert!(
        manager.db().lookup("demo", "linux", "amd64").await.unwrap().is_some(),
        "record must survive an inconclusive existence check"
    );
}

#[tokio::test]
async fn test_stale_record_is_a_miss_but_kept() {
    let dir = tempdir().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "demo-v1.0.bin", b"demo".to_vec()).await;

    let config = test_config(&dir);
    let adapter = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    let manager = create_test_manager(&config, vec![adapter as Arc<dyn SourceAdapter>]).await;

    let mut demo = entry("demo", SourceKind::Github);
    demo.stale_duration_days = Some(1);
    manager.fetch_version(&demo, "v1.0").await.unwrap();
    assert!(manager.resolve_path(&demo).await.unwrap().is_some());

    let record = manager.db().lookup("demo", "linux", "amd64").await.unwrap().unwrap();
    let two_days_ago = chrono::Utc::now().timestamp() - 2 * 24 * 60 * 60;
    manager.db().set_last_modified(record.id, two_days_ago).await.unwrap();

    assert!(manager.resolve_path(&demo).await.unwrap().is_none());
    assert!(record.path().exists());
    assert!(manager.db().lookup("demo", "linux", "amd64").await.unwrap().is_some());

    // Entries without a stale duration never expire
    demo.stale_duration_days = None;
    assert!(manager.resolve_path(&demo).await.unwrap().is_some());
}

#[tokio::test]
async fn test_lookup_path_requires_catalog_entry() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let manager = create_test_manager(&config, vec![]).await;

    assert!(matches!(
        manager.lookup_path("ghost", "linux", "amd64").await,
        Err(Error::NotFound(_))
    ));

    manager
        .db()
        .reload_catalog(&[entry("demo", SourceKind::Github)])
        .await
        .unwrap();
    assert_eq!(manager.lookup_path("demo", "linux", "amd64").await.unwrap(), None);
}

#[tokio::test]
async fn test_missing_adapter_is_unknown_source() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let manager = create_test_manager(&config, vec![]).await;

    assert!(matches!(
        manager.refresh(&entry("demo", SourceKind::Fdroid)).await,
        Err(Error::UnknownSource(_))
    ));
}

#[tokio::test]
async fn test_get_file_refreshes_on_miss_then_hits() {
    let dir = tempdir().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "demo-v1.0.bin", b"demo".to_vec()).await;

    let config = test_config(&dir);
    let adapter = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    adapter.version("demo", "v1.0");
    let manager =
        create_test_manager(&config, vec![adapter.clone() as Arc<dyn SourceAdapter>]).await;
    manager
        .db()
        .reload_catalog(&[entry("demo", SourceKind::Github)])
        .await
        .unwrap();

    let first = manager.get_file("demo", "linux", "amd64").await.unwrap();
    assert!(first.as_ref().is_some_and(|p| p.exists()));
    assert_eq!(adapter.lookups.load(Ordering::SeqCst), 1);

    let second = manager.get_file("demo", "linux", "amd64").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        adapter.lookups.load(Ordering::SeqCst),
        1,
        "a cache hit must not consult the adapter"
    );
}

#[tokio::test]
async fn test_get_file_times_out_but_refresh_completes() {
    let dir = tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/demo-v1.0.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"slow".to_vec())
                .set_delay(Duration::from_millis(600)),
        )
        .mount(&server)
        .await;

    let mut config = test_config(&dir);
    config.cache.on_demand_timeout = Duration::from_millis(100);
    let adapter = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    adapter.version("demo", "v1.0");
    let manager = create_test_manager(&config, vec![adapter as Arc<dyn SourceAdapter>]).await;
    manager
        .db()
        .reload_catalog(&[entry("demo", SourceKind::Github)])
        .await
        .unwrap();

    assert_eq!(manager.get_file("demo", "linux", "amd64").await.unwrap(), None);

    // The background refresh keeps going
    let mut cached = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cached = manager.lookup_path("demo", "linux", "amd64").await.unwrap();
        if cached.is_some() {
            break;
        }
    }
    assert!(cached.is_some(), "background refresh should have cached the file");
}
