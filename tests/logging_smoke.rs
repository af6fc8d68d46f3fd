use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use arena_mock::{
    engine_router, generate, log_app_bind, log_app_start, log_mode_selected, ConfigModel,
    ConfigPatch, MemoryConfigStore, MockEngine, ServerSettings,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::util::ServiceExt;
use tracing::Level;

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("log buffer lock should not be poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// Runs `f` under a JSON subscriber and returns the `fields` object of every event.
fn captured_events(max_level: Level, f: impl FnOnce()) -> Vec<Value> {
    let buffer = LogBuffer::default();
    let sink = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(move || sink.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().expect("log buffer lock should not be poisoned");
    String::from_utf8_lossy(&bytes)
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .map(|line| line["fields"].clone())
        .collect()
}

fn event<'a>(events: &'a [Value], name: &str) -> Option<&'a Value> {
    events.iter().find(|fields| fields["event"] == name)
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("single-thread runtime should build")
        .block_on(future)
}

async fn get(app: axum::Router, uri: &str) -> StatusCode {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request should build"),
    )
    .await
    .expect("request should succeed")
    .status()
}

#[test]
fn server_lifecycle_events_describe_settings() {
    let settings = ServerSettings::from_lookup(|key| match key {
        "ARENA_MOCK_ENABLED" => Some("yes".to_string()),
        "ARENA_MOCK_UPSTREAM_URL" => Some("http://127.0.0.1:9000".to_string()),
        _ => None,
    })
    .expect("settings should parse");

    let events = captured_events(Level::INFO, || {
        log_app_start(&settings);
        log_mode_selected(true, &settings);
        log_app_bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));
    });

    let start = event(&events, "app.start").expect("app.start should be logged");
    assert_eq!(start["component"], "mock_server");
    assert_eq!(start["upstream"], "http://127.0.0.1:9000");
    assert_eq!(start["upstream_timeout_ms"], 15_000);

    let mode = event(&events, "mode.selected").expect("mode.selected should be logged");
    assert_eq!(mode["enabled"], true);
    assert_eq!(mode["reason"], "ARENA_MOCK_ENABLED");

    let bind = event(&events, "app.bind").expect("app.bind should be logged");
    assert_eq!(bind["bind_addr"], "127.0.0.1:8080");
    assert_eq!(bind["route"], "/api/");
    assert_eq!(bind["control_route"], "/__mock/");
}

#[test]
fn persisted_mode_is_reported_without_upstream() {
    let settings = ServerSettings::from_lookup(|_| None).expect("defaults should parse");
    let events = captured_events(Level::INFO, || log_mode_selected(false, &settings));

    let mode = event(&events, "mode.selected").expect("mode.selected should be logged");
    assert_eq!(mode["enabled"], false);
    assert_eq!(mode["reason"], "persisted");
    assert_eq!(mode["upstream"], "none");
}

#[test]
fn config_changes_and_generation_are_logged() {
    let events = captured_events(Level::INFO, || {
        let mut model = ConfigModel::load(Arc::new(MemoryConfigStore::new()));
        model.apply(&ConfigPatch {
            size: Some(12),
            ..ConfigPatch::default()
        });
        generate(model.current());
        model.reset();
    });

    assert!(event(&events, "config.load").is_some());
    assert!(event(&events, "config.apply").is_some());
    assert!(event(&events, "config.reset").is_some());
    let generated = event(&events, "dataset.generate").expect("dataset.generate should be logged");
    assert_eq!(generated["size"], 12);
    assert_eq!(generated["seed"], 1337);
}

#[test]
fn mocked_route_emits_intercept_event() {
    let events = captured_events(Level::INFO, || {
        block_on(async {
            let engine = Arc::new(MockEngine::in_memory());
            engine.set_enabled(true);
            let status = get(engine_router(engine, None), "/api/overview").await;
            assert_eq!(status, StatusCode::OK);
        });
    });

    assert!(event(&events, "mode.toggle").is_some());
    let intercept = event(&events, "http.intercept").expect("http.intercept should be logged");
    assert_eq!(intercept["endpoint"], "overview");
}

#[test]
fn pass_through_without_upstream_logs_upstream_error() {
    let events = captured_events(Level::INFO, || {
        block_on(async {
            let engine = Arc::new(MockEngine::in_memory());
            let status = get(engine_router(engine, None), "/api/overview").await;
            assert_eq!(status, StatusCode::BAD_GATEWAY);
        });
    });

    assert!(event(&events, "request.passthrough").is_some());
    assert!(event(&events, "upstream.error").is_some());
}

#[test]
fn injected_fault_is_logged_as_warning() {
    let events = captured_events(Level::WARN, || {
        block_on(async {
            let engine = Arc::new(MockEngine::in_memory());
            engine.set_enabled(true);
            engine.apply_config(&ConfigPatch {
                failure_rate_percent: Some(100.0),
                ..ConfigPatch::default()
            });
            let status = get(engine_router(engine, None), "/api/tokens").await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        });
    });

    let fault = event(&events, "network.fault_injected").expect("fault should be logged");
    assert_eq!(fault["failure_rate_percent"], 100.0);
    assert!(event(&events, "config.apply").is_none());
}
