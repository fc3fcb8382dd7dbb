//! End-to-end flow: events → handler → worker → in-memory backend → state.

use async_trait::async_trait;
use chrono::Utc;
use esview::app::{search_action, Action, Event, StateEngine};
use esview::domain::{BackendError, BackendErrorKind, Document, FieldMetadata, IndexStats, IndexSummary};
use esview::query::CompiledQuery;
use esview::ui::TableViewModel;
use esview::worker::{SearchBackend, SearchWorker};
use esview::{handle_event, initialize, Config};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Index whose searches never answer.
const SLOW_INDEX: &str = "slow";

struct MemoryBackend {
    documents: Vec<Document>,
    fields: BTreeMap<String, FieldMetadata>,
    indices: Vec<IndexSummary>,
    failures_left: AtomicUsize,
    failure_kind: BackendErrorKind,
    search_calls: AtomicUsize,
    queries: parking_lot::Mutex<Vec<(String, Json)>>,
}

impl MemoryBackend {
    fn new(documents: Vec<Json>) -> Self {
        Self {
            documents: documents.into_iter().map(Document::from_json).collect(),
            fields: BTreeMap::from([
                ("host".to_string(), FieldMetadata::new("keyword", true, true)),
                ("level".to_string(), FieldMetadata::new("keyword", true, true)),
                ("latency_ms".to_string(), FieldMetadata::new("long", true, true)),
                ("trace_id".to_string(), FieldMetadata::new("keyword", true, true)),
            ]),
            indices: vec![
                IndexSummary::new(
                    "logs-2024.01",
                    IndexStats {
                        doc_count: 40,
                        store_size_bytes: 4_000,
                        health: "green".into(),
                    },
                ),
                IndexSummary::new(
                    "logs-2024.02",
                    IndexStats {
                        doc_count: 60,
                        store_size_bytes: 6_000,
                        health: "yellow".into(),
                    },
                ),
            ],
            failures_left: AtomicUsize::new(0),
            failure_kind: BackendErrorKind::Unavailable,
            search_calls: AtomicUsize::new(0),
            queries: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, times: usize, kind: BackendErrorKind) -> Self {
        self.failures_left = AtomicUsize::new(times);
        self.failure_kind = kind;
        self
    }

    fn last_query(&self) -> Json {
        self.queries.lock().last().map(|(_, q)| q.clone()).unwrap()
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn search(&self, index: &str, query: &CompiledQuery) -> Result<Vec<Document>, BackendError> {
        if index == SLOW_INDEX {
            std::future::pending::<()>().await;
        }
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BackendError::new(self.failure_kind, "simulated failure"));
        }
        self.queries.lock().push((index.to_string(), query.to_json()));
        Ok(self.documents.clone())
    }

    async fn field_caps(&self, _index: &str, _pattern: &str) -> Result<BTreeMap<String, FieldMetadata>, BackendError> {
        Ok(self.fields.clone())
    }

    async fn list_indices(&self, _pattern: &str) -> Result<Vec<IndexSummary>, BackendError> {
        Ok(self.indices.clone())
    }
}

fn log_lines(n: usize) -> Vec<Json> {
    (0..n)
        .map(|i| {
            json!({
                "host": format!("web-{}", i % 3),
                "level": if i % 10 == 0 { "error" } else { "info" },
                "latency_ms": i * 10,
            })
        })
        .collect()
}

fn setup(backend: MemoryBackend) -> (Arc<StateEngine>, Config, Arc<MemoryBackend>, SearchWorker) {
    let config = Config::default();
    let engine = initialize(&config);
    let backend = Arc::new(backend);
    let worker = SearchWorker::new(backend.clone(), Arc::clone(&engine));
    (engine, config, backend, worker)
}

async fn send(engine: &StateEngine, config: &Config, worker: &SearchWorker, event: Event) -> esview::Result<bool> {
    let (render, actions) = handle_event(engine, config, &event, Utc::now())?;
    Ok(worker.dispatch(actions).await? || render)
}

#[tokio::test(start_paused = true)]
async fn switching_index_loads_everything() {
    let (engine, config, backend, worker) = setup(MemoryBackend::new(log_lines(120)));

    engine.field_cache().insert("stale", FieldMetadata::new("keyword", true, true));
    assert!(send(&engine, &config, &worker, Event::SetIndex("logs-2024*".into())).await.unwrap());

    let snapshot = engine.get_snapshot();
    assert_eq!(snapshot.search.current_index, "logs-2024*");
    assert!(engine.field_cache().get("stale").is_none());
    assert_eq!(snapshot.data.fields, vec!["host", "latency_ms", "level", "trace_id"]);
    assert_eq!(snapshot.search.matching_indices, vec!["logs-2024.01", "logs-2024.02"]);
    assert_eq!(snapshot.search.index_stats.as_ref().unwrap().health, "yellow");
    assert_eq!(snapshot.data.current_results.len(), 120);
    assert_eq!(snapshot.pagination.total_pages, 3);
    assert!(!snapshot.ui.loading);

    assert_eq!(
        engine.field_cache().active_names(),
        vec!["host", "latency_ms", "level"],
        "trace_id never occurs in the results"
    );

    let vm = TableViewModel::compute(&snapshot, engine.field_cache());
    assert_eq!(vm.columns, vec!["host", "level", "latency_ms"]);
    assert_eq!(vm.rows.len(), 50);
    assert_eq!(vm.rows[0], vec!["web-0", "error", "0"]);
    assert_eq!(vm.footer.page_indicator, "Page 1/3");
    assert_eq!(backend.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn filters_flow_into_the_query() {
    let (engine, config, backend, worker) = setup(MemoryBackend::new(log_lines(5)));

    send(&engine, &config, &worker, Event::AddFilter("level=error".into())).await.unwrap();
    send(&engine, &config, &worker, Event::AddFilter("latency_ms>=250".into())).await.unwrap();

    let body = backend.last_query();
    let must = body["query"]["bool"]["must"].as_array().unwrap();
    assert_eq!(must.len(), 3);
    assert!(must[0]["bool"]["should"].is_array(), "time window first");
    assert_eq!(must[1], json!({"match": {"level": "error"}}));
    assert_eq!(must[2], json!({"range": {"latency_ms": {"gte": 250.0}}}));
    assert_eq!(body["size"], json!(500));

    send(&engine, &config, &worker, Event::RemoveFilter(0)).await.unwrap();
    let must = backend.last_query()["query"]["bool"]["must"].as_array().unwrap().clone();
    assert_eq!(must.len(), 2);
    assert_eq!(must[1], json!({"range": {"latency_ms": {"gte": 250.0}}}));
}

#[tokio::test(start_paused = true)]
async fn bad_filter_never_reaches_the_backend() {
    let (engine, config, backend, worker) = setup(MemoryBackend::new(log_lines(5)));

    let err = send(&engine, &config, &worker, Event::AddFilter("price>abc".into()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid numeric value in range query"));
    assert_eq!(backend.search_calls.load(Ordering::SeqCst), 0);
    assert!(engine
        .get_misc_state()
        .status_message
        .unwrap()
        .contains("invalid numeric value in range query"));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_transparently() {
    let backend = MemoryBackend::new(log_lines(3)).failing(2, BackendErrorKind::RateLimited);
    let (engine, config, backend, worker) = setup(backend);

    send(&engine, &config, &worker, Event::Refresh).await.unwrap();

    assert_eq!(backend.search_calls.load(Ordering::SeqCst), 3);
    assert_eq!(engine.get_data_state().current_results.len(), 3);
    assert_eq!(engine.get_misc_state().status_message, None);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_in_the_status_line() {
    let backend = MemoryBackend::new(log_lines(3)).failing(10, BackendErrorKind::Transport);
    let (engine, config, backend, worker) = setup(backend);

    send(&engine, &config, &worker, Event::Refresh).await.unwrap();

    assert_eq!(backend.search_calls.load(Ordering::SeqCst), 4, "first attempt plus three retries");
    let status = engine.get_misc_state().status_message.unwrap();
    assert!(status.contains("simulated failure"), "{status}");
    assert!(!engine.get_ui_state().loading);
    assert!(engine.get_data_state().current_results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn permission_errors_are_not_retried() {
    let backend = MemoryBackend::new(log_lines(3)).failing(1, BackendErrorKind::Permission);
    let (engine, config, backend, worker) = setup(backend);

    send(&engine, &config, &worker, Event::Refresh).await.unwrap();

    assert_eq!(backend.search_calls.load(Ordering::SeqCst), 1);
    assert!(engine.get_misc_state().status_message.is_some());
}

#[tokio::test(start_paused = true)]
async fn newer_search_supersedes_older_one() {
    let (engine, _config, _backend, worker) = setup(MemoryBackend::new(log_lines(4)));

    let query = match search_action(&engine, Utc::now()).unwrap() {
        Action::Search { query, .. } => query,
        other => panic!("unexpected action {other:?}"),
    };
    let stale = Action::Search {
        index: SLOW_INDEX.into(),
        query: query.clone(),
    };
    let fresh = Action::Search {
        index: "logs-*".into(),
        query,
    };

    // Poll the stale search once so it registers and parks on the backend.
    let old_report = worker.execute(stale);
    tokio::pin!(old_report);
    tokio::select! {
        biased;
        _ = &mut old_report => panic!("slow search answered"),
        () = tokio::task::yield_now() => {}
    }

    let new_report = worker.execute(fresh).await;
    let old_report = old_report.await;
    assert!(matches!(old_report, Event::SearchFailed { ref message, .. } if message.contains("cancelled")));
    assert!(matches!(new_report, Event::SearchCompleted { .. }));

    let config = engine.config().clone();
    let (applied_old, _) = handle_event(&engine, &config, &old_report, Utc::now()).unwrap();
    let (applied_new, _) = handle_event(&engine, &config, &new_report, Utc::now()).unwrap();
    assert!(!applied_old, "stale failure must not touch the state");
    assert!(applied_new);
    assert_eq!(engine.get_data_state().current_results.len(), 4);
    assert_eq!(engine.get_misc_state().status_message, None);
}

#[tokio::test(start_paused = true)]
async fn paging_and_columns() {
    let (engine, config, _backend, worker) = setup(MemoryBackend::new(log_lines(120)));
    send(&engine, &config, &worker, Event::Refresh).await.unwrap();

    assert!(send(&engine, &config, &worker, Event::NextPage).await.unwrap());
    assert!(send(&engine, &config, &worker, Event::NextPage).await.unwrap());
    assert!(!send(&engine, &config, &worker, Event::NextPage).await.unwrap());
    assert_eq!(engine.get_data_state().displayed_results.len(), 20);

    send(&engine, &config, &worker, Event::ToggleField("host".into())).await.unwrap();
    let vm = TableViewModel::compute(&engine.get_snapshot(), engine.field_cache());
    assert_eq!(vm.columns, vec!["host"]);
    assert_eq!(vm.rows.len(), 20);
    assert_eq!(vm.footer.page_indicator, "Page 3/3");
}
