//! Worker process: browser pool behind the `/generate` RPC endpoint.

use std::sync::Arc;

use anyhow::Context;
use pdfvisor::browser::ChromeFactory;
use pdfvisor::config::WorkerConfig;
use pdfvisor::rpc::{self, WorkerState};
use pdfvisor::{default_subscribers, spawn_listener, Bus, ShutdownHost, SubscriberSet, WorkerPool};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pdfvisor::logging::init_logging();
    let cfg = WorkerConfig::from_env().context("invalid worker configuration")?;

    let bus = Bus::new(cfg.bus_capacity);
    let subs = Arc::new(SubscriberSet::new(default_subscribers(), bus.clone()));
    let listener_task = spawn_listener(&bus, subs.clone());

    let host = ShutdownHost::new(cfg.shutdown.clone(), bus.clone());
    let driver = host.spawn();

    let factory = Arc::new(ChromeFactory::new(cfg.browser.clone()));
    let pool = WorkerPool::new(factory, cfg.pool.clone(), bus.clone(), Some(host.clone()));

    let app = rpc::router(WorkerState {
        pool: pool.clone(),
        host: host.clone(),
        worker_id: Arc::from(cfg.worker_id.as_str()),
    });
    let listener = TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    info!(
        addr = %cfg.listen_addr,
        worker = %cfg.worker_id,
        slots = cfg.pool.slots(),
        queue_capacity = cfg.pool.queue_capacity,
        "starting worker http server"
    );

    let stop = host.stop_accepting();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
    });

    let shutting_down = host.shutting_down();
    tokio::select! {
        res = pool.start() => {
            if let Err(err) = res {
                error!(error = %err, "worker pool failed to start");
                let _ = pool.shutdown(cfg.shutdown.shutdown_hard_period).await;
                return Err(err).context("worker pool failed to start");
            }
        }
        _ = shutting_down.cancelled() => {}
    }

    host.stop_accepting().cancelled().await;
    info!("shutting down http server");

    let server_ctx = host.server_context();
    let drained = tokio::select! {
        res = &mut server => {
            match res {
                Ok(Ok(())) => info!("gracefully shut down http server"),
                Ok(Err(err)) => warn!(error = %err, "http server stopped with an error"),
                Err(err) => warn!(error = %err, "http server task failed"),
            }
            true
        }
        _ = server_ctx.cancelled() => {
            warn!("in-flight requests did not finish, waiting for forced cancellation");
            false
        }
    };

    let grace = if drained {
        cfg.shutdown.shutdown_period
    } else {
        cfg.shutdown.shutdown_hard_period
    };
    let terminated = host.terminated();
    tokio::select! {
        res = pool.shutdown(grace) => {
            if let Err(err) = res {
                warn!(error = %err, "worker pool did not stop cleanly");
            }
        }
        _ = terminated.cancelled() => {
            warn!("hard shutdown deadline reached before the pool stopped")
        }
    }
    if drained {
        host.server_stopped();
    }
    host.terminated().cancelled().await;
    let _ = driver.await;

    listener_task.abort();
    let _ = listener_task.await;
    if let Ok(set) = Arc::try_unwrap(subs) {
        set.shutdown().await;
    }
    info!("worker shut down");
    Ok(())
}
