use super::*;
use crate::Error;
use crate::config::Config;
use crate::source::SourceAdapter;
use crate::test_helpers::{Answer, FakeAdapter, create_test_manager, entry, test_config};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};


/// Uploader remembering every call
#[derive(Default)]
pub(super) struct RecordingUploader {
    pub(super) uploads: StdMutex<Vec<(String, String)>>,
    pub(super) deletes: StdMutex<Vec<(String, String)>>,
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(
        &self,
        paths: &[PathBuf],
        name: &str,
        version: &str,
    ) -> Result<HashMap<String, Vec<String>>> {
        self.uploads
            .lock()
            .unwrap()
            .push((name.to_string(), version.to_string()));
        let links = paths
            .iter()
            .map(|p| format!("http://mirror/{}/{}", name, p.file_name().unwrap().to_string_lossy()))
            .collect();
        Ok(HashMap::from([(name.to_string(), links)]))
    }

    async fn delete_version(&self, name: &str, version: &str) -> Result<()> {
        self.deletes
            .lock()
            .unwrap()
            .push((name.to_string(), version.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Notifier remembering every report
#[derive(Default)]
pub(super) struct RecordingNotifier {
    pub(super) reports: StdMutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn report(&self, title: &str, body: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}

pub(super) struct Harness {
    pub(super) dir: TempDir,
    pub(super) config: Config,
    pub(super) orchestrator: BatchOrchestrator,
    pub(super) uploader: Arc<RecordingUploader>,
    pub(super) notifier: Arc<RecordingNotifier>,
}

/// Server answering every `/files/...` download with a small body
pub(super) async fn file_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/files/.+"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"artifact".to_vec()))
        .mount(&server)
        .await;
    server
}

pub(super) async fn harness(
    adapters: Vec<Arc<dyn SourceAdapter>>,
    configure: impl FnOnce(&mut Config),
) -> Harness {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    configure(&mut config);

    let manager = create_test_manager(&config, adapters).await;
    let uploader = Arc::new(RecordingUploader::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = BatchOrchestrator::new(
        Arc::new(config.clone()),
        manager,
        uploader.clone(),
        notifier.clone(),
    );

    Harness {
        dir,
        config,
        orchestrator,
        uploader,
        notifier,
    }
}

impl Harness {
    pub(super) async fn load(&self, entries: &[CatalogEntry]) {
        self.orchestrator
            .manager()
            .db()
            .reload_catalog(entries)
            .await
            .unwrap();
    }

    pub(super) fn uploads(&self) -> Vec<(String, String)> {
        self.uploader.uploads.lock().unwrap().clone()
    }

    pub(super) fn deletes(&self) -> Vec<(String, String)> {
        self.uploader.deletes.lock().unwrap().clone()
    }
}

fn id(name: &str) -> Identity {
    Identity::new(name, "linux", "amd64")
}

#[tokio::test]
async fn test_rounds_never_exceed_concurrent_amount() {
    let adapter = Arc::new(
        FakeAdapter::new(SourceKind::Github, "http://unused").with_lookup_delay(Duration::from_millis(100)),
    );
    let h = harness(vec![adapter.clone() as Arc<dyn SourceAdapter>], |c| {
        c.fetch.concurrent_amount = 2;
    })
    .await;

    let names = ["a", "b", "c", "d", "e"];
    let entries: Vec<_> = names.iter().map(|n| entry(n, SourceKind::Github)).collect();
    h.load(&entries).await;

    let report = h.orchestrator.run_catalog().await.unwrap();

    assert_eq!(adapter.max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(adapter.lookups.load(Ordering::SeqCst), 5);
    assert_eq!(report.items.len(), 5);
    for name in names {
        assert!(matches!(report.outcome(&id(name)), Some(ItemOutcome::Skipped(_))));
    }

    // A round starts only once every lookup of the previous round finished
    let finished = |names: &[&str]| names.iter().map(|n| adapter.span(n).1).max().unwrap();
    let started = |names: &[&str]| names.iter().map(|n| adapter.span(n).0).min().unwrap();
    assert!(started(&["c", "d"]) >= finished(&["a", "b"]));
    assert!(started(&["e"]) >= finished(&["a", "b", "c", "d"]));

    // Round order follows the catalog order
    let attempted = adapter.attempted();
    let first_round: Vec<_> = attempted[..2].iter().map(String::as_str).collect();
    assert!(first_round.contains(&"a") && first_round.contains(&"b"));
    assert_eq!(attempted[4], "e");
}

#[tokio::test]
async fn test_rate_limit_stops_only_its_source() {
    let server = file_server().await;
    let github = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    github.answer("a", Answer::RateLimited);
    github.version("b", "v1");
    let fdroid = Arc::new(FakeAdapter::new(SourceKind::Fdroid, &server.uri()));
    fdroid.version("c", "100");

    let h = harness(
        vec![
            github.clone() as Arc<dyn SourceAdapter>,
            fdroid.clone() as Arc<dyn SourceAdapter>,
        ],
        |c| c.fetch.concurrent_amount = 1,
    )
    .await;
    h.load(&[
        entry("a", SourceKind::Github),
        entry("b", SourceKind::Github),
        entry("c", SourceKind::Fdroid),
    ])
    .await;

    let report = h.orchestrator.run_catalog().await.unwrap();

    assert_eq!(github.attempted(), vec!["a"], "b must not be attempted");
    assert_eq!(report.outcome(&id("a")), Some(&ItemOutcome::RateLimited));
    assert_eq!(report.outcome(&id("b")), None);
    assert_eq!(
        report.outcome(&id("c")),
        Some(&ItemOutcome::Refreshed {
            version: "100".to_string(),
            uploaded: true
        })
    );
    assert_eq!(report.rate_limited_sources, vec![SourceKind::Github]);
    assert!(h.notifier.reports.lock().unwrap().is_empty());
    assert!(h.config.mirror.version_path().exists(), "successful run must flush");
}

#[tokio::test]
async fn test_fatal_error_reports_and_skips_flush() {
    let server = file_server().await;
    let github = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    github.answer("broken", Answer::Fatal);
    let fdroid = Arc::new(FakeAdapter::new(SourceKind::Fdroid, &server.uri()));
    fdroid.version("fine", "7");

    let h = harness(
        vec![
            github as Arc<dyn SourceAdapter>,
            fdroid as Arc<dyn SourceAdapter>,
        ],
        |_| {},
    )
    .await;
    h.load(&[
        entry("broken", SourceKind::Github),
        entry("fine", SourceKind::Fdroid),
    ])
    .await;

    let result = h.orchestrator.run_catalog().await;

    assert!(matches!(result, Err(Error::Other(msg)) if msg.contains("exploded")));
    let reports = h.notifier.reports.lock().unwrap().clone();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].1.contains("exploded"));
    assert!(
        !h.config.mirror.version_path().exists(),
        "a failed run must not flush mirror state"
    );
    // The other partition still ran to completion
    assert!(
        h.orchestrator
            .manager()
            .db()
            .lookup("fine", "linux", "amd64")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_same_version_is_skipped_on_next_run() {
    let server = file_server().await;
    let github = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    github.version("demo", "v1.0");

    let h = harness(vec![github as Arc<dyn SourceAdapter>], |_| {}).await;
    h.load(&[entry("demo", SourceKind::Github)]).await;

    let first = h.orchestrator.run_catalog().await.unwrap();
    assert_eq!(first.refreshed_count(), 1);

    let second = h.orchestrator.run_catalog().await.unwrap();
    assert_eq!(second.outcome(&id("demo")), Some(&ItemOutcome::UpToDate));
    assert_eq!(h.uploads(), vec![("demo".to_string(), "v1.0".to_string())]);
}

#[tokio::test]
async fn test_missing_file_is_fetched_again_without_upload() {
    let server = file_server().await;
    let github = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    github.version("demo", "v1.0");

    let h = harness(vec![github as Arc<dyn SourceAdapter>], |_| {}).await;
    h.load(&[entry("demo", SourceKind::Github)]).await;

    h.orchestrator.run_catalog().await.unwrap();
    let record = h
        .orchestrator
        .manager()
        .db()
        .lookup("demo", "linux", "amd64")
        .await
        .unwrap()
        .unwrap();
    std::fs::remove_file(record.path()).unwrap();

    let report = h.orchestrator.run_catalog().await.unwrap();

    assert_eq!(
        report.outcome(&id("demo")),
        Some(&ItemOutcome::Refreshed {
            version: "v1.0".to_string(),
            uploaded: false
        })
    );
    assert!(record.path().exists());
    assert_eq!(h.uploads().len(), 1);
}

#[tokio::test]
async fn test_rejected_links_are_unavailable() {
    let github = Arc::new(FakeAdapter::new(SourceKind::Github, "http://unused").with_invalid_links());
    github.version("demo", "v1.0");

    let h = harness(vec![github as Arc<dyn SourceAdapter>], |_| {}).await;
    h.load(&[entry("demo", SourceKind::Github)]).await;

    let report = h.orchestrator.run_catalog().await.unwrap();

    assert_eq!(report.outcome(&id("demo")), Some(&ItemOutcome::Unavailable));
    assert!(h.uploads().is_empty());
}

#[tokio::test]
async fn test_run_reloads_catalog_document() {
    let server = file_server().await;
    let github = Arc::new(FakeAdapter::new(SourceKind::Github, &server.uri()));
    github.version("demo", "v2.0");

    let h = harness(vec![github as Arc<dyn SourceAdapter>], |_| {}).await;
    std::fs::write(
        &h.config.catalog_path,
        r#"
demo:
  website: github
  project_name: owner/demo
  sample_url: "~/${tag}/demo-${system}-${ARCHITECTURE}${suffix_name}"
  system:
    linux: [linux, .bin]
  architecture:
    amd64: x64
"#,
    )
    .unwrap();

    let report = h.orchestrator.run().await.unwrap();

    assert_eq!(report.refreshed_count(), 1);
    let path = h
        .orchestrator
        .manager()
        .lookup_path("demo", "linux", "amd64")
        .await
        .unwrap()
        .unwrap();
    assert!(path.ends_with("demo-linux-amd64-v2.0.bin"));
    assert!(path.starts_with(h.dir.path().canonicalize().unwrap()));
}

#[tokio::test]
async fn test_unreadable_catalog_is_reported() {
    let h = harness(vec![], |_| {}).await;

    let result = h.orchestrator.run().await;

    assert!(result.is_err());
    assert_eq!(h.notifier.reports.lock().unwrap().len(), 1);
}
