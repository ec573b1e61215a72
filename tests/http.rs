mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::{config, started_pool, FakeFactory};
use pdfvisor::dispatcher::{self, ProxyState};
use pdfvisor::monitor::MonitorConfig;
use pdfvisor::rpc::{self, HttpWorkerClient, WorkerState};
use pdfvisor::{
    Bus, ConnectivityMonitor, Dispatcher, ProblemDetails, RetryPolicy, ShutdownConfig, ShutdownHost,
};
use tower::ServiceExt;

async fn worker_state(delay: Duration, pool_size: usize, queue: usize) -> WorkerState {
    let bus = Bus::new(256);
    let factory = FakeFactory::with_delay(delay);
    let pool = started_pool(&factory, config(pool_size, queue), bus.clone()).await;
    WorkerState {
        pool,
        host: ShutdownHost::new(ShutdownConfig::local(), bus),
        worker_id: Arc::from("worker-test"),
    }
}

fn generate(body: &str) -> Request<Body> {
    Request::post("/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn worker_generates_pdf_with_identity_headers() {
    let app = rpc::router(worker_state(Duration::ZERO, 1, 0).await);

    let resp = app
        .oneshot(generate(r##"{"url":"https://example.com","waitFor":"#ready"}"##))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(resp.headers()["x-worker-id"], "worker-test");
    assert_eq!(resp.headers()["x-browser-version"], "FakeChrome/1.0 (@1)");
    assert!(body_text(resp).await.starts_with("%PDF 0"));
}

#[tokio::test]
async fn worker_maps_errors_to_status_codes() {
    let app = rpc::router(worker_state(Duration::ZERO, 1, 0).await);

    let resp = app.clone().oneshot(generate(r#"{"url":"ftp://x"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));

    let resp = app.oneshot(generate("{not json")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn worker_readiness_follows_shutdown() {
    let state = worker_state(Duration::ZERO, 1, 0).await;
    let host = state.host.clone();
    let app = rpc::router(state);

    let get = |path: &str| Request::get(path).body(Body::empty()).unwrap();
    assert_eq!(app.clone().oneshot(get("/health/ready")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(app.clone().oneshot(get("/health/startup")).await.unwrap().status(), StatusCode::OK);

    host.trigger();
    let resp = app.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_text(resp).await, "Shutting down");
    assert_eq!(app.oneshot(get("/health/live")).await.unwrap().status(), StatusCode::OK);
}

/// Serves the worker router on an ephemeral port and returns its base URL.
async fn serve_worker(state: WorkerState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, rpc::router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

async fn proxy(
    worker: &str,
    retry: RetryPolicy,
) -> (axum::Router, ShutdownHost, ConnectivityMonitor) {
    let bus = Bus::new(256);
    let client = Arc::new(HttpWorkerClient::new(worker, Duration::from_secs(35)).unwrap());
    let monitor = ConnectivityMonitor::new(client.clone(), MonitorConfig::default(), bus.clone());
    let host = ShutdownHost::new(ShutdownConfig::local(), bus.clone());
    let dispatcher = Arc::new(Dispatcher::new(client, retry, bus));
    let app = dispatcher::router(ProxyState {
        dispatcher,
        monitor: monitor.clone(),
        host: host.clone(),
    });
    (app, host, monitor)
}

fn pdf(body: &str) -> Request<Body> {
    Request::post("/pdf")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn problem(resp: axum::response::Response) -> ProblemDetails {
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/problem+json");
    serde_json::from_str(&body_text(resp).await).unwrap()
}

#[tokio::test]
async fn proxy_rejects_malformed_requests() {
    let (app, _, _) = proxy("http://127.0.0.1:9", RetryPolicy::default()).await;

    let resp = app
        .clone()
        .oneshot(Request::get("/pdf").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let resp = app
        .clone()
        .oneshot(
            Request::post("/pdf")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let big = format!(
        r#"{{"url":"https://example.com","options":{{"headerTemplate":"{}"}}}}"#,
        "x".repeat(70_000)
    );
    let resp = app.clone().oneshot(pdf(&big)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let resp = app.clone().oneshot(pdf("[1,2")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(problem(resp).await.detail.starts_with("Invalid JSON payload"));

    let body = r#"{"url":"https://example.com","cookies":[{"name":"a","value":"b","sameSite":"None"}]}"#;
    let resp = app.oneshot(pdf(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(problem(resp).await.detail.starts_with("Validation error"));
}

#[tokio::test]
async fn proxy_reports_transport_failures_without_addresses() {
    let retry = RetryPolicy {
        deadline: Duration::from_secs(5),
        ..RetryPolicy::default()
    };
    let (app, _, monitor) = proxy("http://127.0.0.1:9", retry).await;

    assert_eq!(monitor.probe_once().await, pdfvisor::ConnectivityState::Broken);
    let resp = app
        .clone()
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_text(resp).await, "No connectivity");

    let resp = app.oneshot(pdf(r#"{"url":"https://example.com"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let p = problem(resp).await;
    assert!(!p.detail.contains("127.0.0.1"), "{}", p.detail);
}

#[tokio::test]
async fn end_to_end_two_slots_no_queue() {
    let worker = serve_worker(worker_state(Duration::from_millis(300), 2, 0).await).await;
    let retry = RetryPolicy {
        max_attempts: 1,
        ..RetryPolicy::default()
    };
    let (app, _, monitor) = proxy(&worker, retry).await;
    assert!(monitor.probe_once().await == pdfvisor::ConnectivityState::Healthy);

    let calls = (0..3).map(|i| {
        let app = app.clone();
        async move {
            app.oneshot(pdf(&format!(r#"{{"url":"https://example.com/{i}"}}"#)))
                .await
                .unwrap()
                .status()
        }
    });
    let mut statuses = futures::future::join_all(calls).await;
    statuses.sort();
    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );

    let resp = app.oneshot(pdf(r#"{"url":"https://example.com/again"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
}

#[tokio::test]
async fn end_to_end_retries_absorb_a_burst() {
    let worker = serve_worker(worker_state(Duration::from_millis(50), 1, 0).await).await;
    let (app, _, _) = proxy(&worker, RetryPolicy::default()).await;

    let calls = (0..3).map(|i| {
        let app = app.clone();
        async move {
            app.oneshot(pdf(&format!(r#"{{"url":"https://example.com/{i}"}}"#)))
                .await
                .unwrap()
                .status()
        }
    });
    let statuses = futures::future::join_all(calls).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::OK), "{statuses:?}");
}
