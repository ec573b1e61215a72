mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{config, request, wait_until, FakeFactory};
use pdfvisor::{Bus, EventKind, ShutdownConfig, ShutdownHost, ShutdownPhase, WorkerPool};
use tokio_util::sync::CancellationToken;

fn timing() -> ShutdownConfig {
    ShutdownConfig {
        readiness_drain_delay: Duration::from_secs(5),
        shutdown_period: Duration::from_secs(45),
        shutdown_hard_period: Duration::from_secs(3),
    }
}

#[tokio::test(start_paused = true)]
async fn pool_health_tracks_shutdown_phases() {
    let bus = Bus::new(256);
    let mut events = bus.subscribe();
    let host = ShutdownHost::new(timing(), bus.clone());
    let driver = host.spawn_manual();

    let factory = FakeFactory::default();
    let pool = WorkerPool::new(Arc::new(factory), config(1, 0), bus, Some(host.clone()));
    pool.start().await.unwrap();
    assert!(pool.health());

    host.trigger();
    assert!(host.is_shutting_down());
    assert!(pool.health(), "still healthy while readiness drains");

    host.stop_accepting().cancelled().await;
    assert!(host.phase() >= ShutdownPhase::ShuttingDownServer);
    assert!(!pool.health());

    pool.shutdown(Duration::from_secs(1)).await.unwrap();
    host.server_stopped();
    host.terminated().cancelled().await;
    driver.await.unwrap();

    let phases: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|ev| ev.kind == EventKind::ShutdownPhaseChanged)
        .filter_map(|ev| ev.reason.map(|r| r.to_string()))
        .collect();
    assert_eq!(
        phases,
        vec![
            ShutdownPhase::SignalReceived.as_label(),
            ShutdownPhase::DrainingReadiness.as_label(),
            ShutdownPhase::ShuttingDownServer.as_label(),
            ShutdownPhase::Terminated.as_label(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn hard_window_cancels_in_flight_renders() {
    let bus = Bus::new(256);
    let host = ShutdownHost::new(timing(), bus.clone());
    let driver = host.spawn_manual();
    let mut phases = host.subscribe();

    let factory = FakeFactory::with_delay(Duration::from_secs(600));
    let cfg = pdfvisor::pool::PoolConfig {
        render_timeout: Duration::from_secs(900),
        ..config(1, 1)
    };
    let pool = WorkerPool::new(Arc::new(factory), cfg, bus, Some(host.clone()));
    pool.start().await.unwrap();

    let render = {
        let pool = pool.clone();
        let cancel: CancellationToken = host.server_context().child_token();
        tokio::spawn(async move { pool.submit(request("https://a.test/forever"), cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let queued = {
        let pool = pool.clone();
        let cancel = host.server_context().child_token();
        tokio::spawn(async move { pool.submit(request("https://a.test/queued"), cancel).await })
    };
    wait_until(|| pool.stats().queued == 1, 100).await;

    let started = tokio::time::Instant::now();
    host.trigger();
    let err = render.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), pdfvisor::ErrorKind::ShuttingDown);
    assert_eq!(err.status_code(), 503);
    let err = queued.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), pdfvisor::ErrorKind::ShuttingDown);
    assert_eq!(started.elapsed(), Duration::from_secs(50));
    assert_eq!(host.phase(), ShutdownPhase::HardShutdownWindow);

    host.terminated().cancelled().await;
    assert_eq!(started.elapsed(), Duration::from_secs(53));
    driver.await.unwrap();

    let mut last = ShutdownPhase::Running;
    while phases.has_changed().unwrap_or(false) {
        let seen = *phases.borrow_and_update();
        assert!(seen >= last);
        last = seen;
    }
    assert_eq!(*phases.borrow(), ShutdownPhase::Terminated);
}
