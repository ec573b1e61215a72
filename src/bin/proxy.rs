//! Proxy process: validates requests and forwards them to a worker.

use std::sync::Arc;

use anyhow::Context;
use pdfvisor::config::ProxyConfig;
use pdfvisor::dispatcher::{self, ProxyState};
use pdfvisor::rpc::HttpWorkerClient;
use pdfvisor::{
    default_subscribers, spawn_listener, Bus, ConnectivityMonitor, Dispatcher, ShutdownHost,
    SubscriberSet,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pdfvisor::logging::init_logging();
    let cfg = ProxyConfig::from_env().context("invalid proxy configuration")?;

    let bus = Bus::new(cfg.bus_capacity);
    let subs = Arc::new(SubscriberSet::new(default_subscribers(), bus.clone()));
    let listener_task = spawn_listener(&bus, subs.clone());

    let host = ShutdownHost::new(cfg.shutdown.clone(), bus.clone());
    let driver = host.spawn();

    let client = Arc::new(
        HttpWorkerClient::new(cfg.worker_addr.clone(), cfg.worker_request_timeout)
            .context("failed to build worker client")?,
    );
    let monitor = ConnectivityMonitor::new(client.clone(), cfg.monitor, bus.clone());
    let monitor_task = monitor.spawn(host.terminated());
    let dispatcher = Arc::new(Dispatcher::new(client, cfg.retry, bus.clone()));

    let app = dispatcher::router(ProxyState {
        dispatcher,
        monitor,
        host: host.clone(),
    });
    let listener = TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    info!(addr = %cfg.listen_addr, worker = %cfg.worker_addr, "starting proxy http server");

    let stop = host.stop_accepting();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
    });

    host.stop_accepting().cancelled().await;
    info!("shutting down http server");

    let server_ctx = host.server_context();
    tokio::select! {
        res = &mut server => {
            match res {
                Ok(Ok(())) => info!("gracefully shut down http server"),
                Ok(Err(err)) => warn!(error = %err, "http server stopped with an error"),
                Err(err) => warn!(error = %err, "http server task failed"),
            }
            host.server_stopped();
        }
        _ = server_ctx.cancelled() => {
            warn!("in-flight requests did not finish, waiting for forced cancellation");
        }
    }

    host.terminated().cancelled().await;
    let _ = driver.await;
    let _ = monitor_task.await;

    listener_task.abort();
    let _ = listener_task.await;
    if let Ok(set) = Arc::try_unwrap(subs) {
        set.shutdown().await;
    }
    info!("proxy shut down");
    Ok(())
}
