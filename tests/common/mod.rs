#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pdfvisor::pool::{PoolConfig, RenderContext, Session, WorkerPool};
use pdfvisor::types::{BrowserVersion, RenderRequest, RenderResult};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use pdfvisor::{Bus, ErrorKind, RenderError, Renderer, RendererFactory};

/// Shared knobs and counters of a [`FakeFactory`].
#[derive(Default)]
pub struct FakeShared {
    pub render_delay: Mutex<Duration>,
    pub fail_with: Mutex<Option<ErrorKind>>,
    pub fail_cleanups: AtomicU32,
    pub fail_starts: AtomicU32,
    pub starts: Mutex<Vec<i32>>,
    pub closes: AtomicU32,
    pub busy: Mutex<HashSet<i32>>,
    pub overlaps: AtomicU32,
}

impl FakeShared {
    pub fn starts_of(&self, id: i32) -> usize {
        self.starts.lock().iter().filter(|s| **s == id).count()
    }
}

/// Renderer factory whose slots sleep instead of driving a browser.
#[derive(Clone, Default)]
pub struct FakeFactory {
    pub shared: Arc<FakeShared>,
}

impl FakeFactory {
    pub fn with_delay(delay: Duration) -> Self {
        let f = Self::default();
        *f.shared.render_delay.lock() = delay;
        f
    }
}

#[async_trait]
impl RendererFactory for FakeFactory {
    async fn start(&self, id: i32) -> Result<Box<dyn Renderer>, RenderError> {
        if id >= 0 {
            let left = self.shared.fail_starts.load(Ordering::SeqCst);
            if left > 0 {
                self.shared.fail_starts.store(left - 1, Ordering::SeqCst);
                return Err(
                    RenderError::new(ErrorKind::UnhandledEngineFault).with_detail("launch failed")
                );
            }
        }
        self.shared.starts.lock().push(id);
        Ok(Box::new(FakeRenderer {
            id,
            shared: self.shared.clone(),
            closed: false,
        }))
    }
}

struct FakeRenderer {
    id: i32,
    shared: Arc<FakeShared>,
    closed: bool,
}

#[async_trait]
impl Renderer for FakeRenderer {
    fn id(&self) -> i32 {
        self.id
    }

    async fn generate(
        &mut self,
        session: &Arc<Session>,
        request: &RenderRequest,
        ctx: &RenderContext,
    ) -> Result<Vec<u8>, RenderError> {
        ctx.check()?;
        if !self.shared.busy.lock().insert(self.id) {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        session.mark_touched();

        let delay = *self.shared.render_delay.lock();
        let res = ctx.sleep(delay).await;
        self.shared.busy.lock().remove(&self.id);
        res?;

        if let Some(kind) = *self.shared.fail_with.lock() {
            return Err(RenderError::new(kind).with_detail("scripted failure"));
        }
        Ok(format!("%PDF {} {}", self.id, request.url).into_bytes())
    }

    async fn cleanup(&mut self, _session: &Session) -> Result<(), RenderError> {
        let left = self.shared.fail_cleanups.load(Ordering::SeqCst);
        if left > 0 {
            self.shared.fail_cleanups.store(left - 1, Ordering::SeqCst);
            return Err(
                RenderError::new(ErrorKind::UnhandledEngineFault).with_detail("cleanup failed")
            );
        }
        Ok(())
    }

    async fn version(&mut self) -> Result<BrowserVersion, RenderError> {
        Ok(BrowserVersion {
            product: "FakeChrome/1.0".into(),
            revision: "@1".into(),
            ..BrowserVersion::default()
        })
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn config(pool_size: usize, queue_capacity: usize) -> PoolConfig {
    PoolConfig {
        pool_size,
        queue_capacity,
        browser_restart_interval: Duration::ZERO,
        ..PoolConfig::default()
    }
}

pub async fn started_pool(factory: &FakeFactory, config: PoolConfig, bus: Bus) -> WorkerPool {
    let pool = WorkerPool::new(Arc::new(factory.clone()), config, bus, None);
    pool.start().await.expect("fake pool starts");
    pool
}

pub fn request(url: &str) -> Arc<RenderRequest> {
    Arc::new(RenderRequest::new(url))
}

/// Submits `url` from a separate task with a token nobody cancels.
pub fn spawn_submit(
    pool: &WorkerPool,
    url: &str,
) -> JoinHandle<Result<RenderResult, RenderError>> {
    let pool = pool.clone();
    let request = request(url);
    tokio::spawn(async move { pool.submit(request, CancellationToken::new()).await })
}

/// Polls `cond` on a 1ms tick, panicking after `limit` ticks.
pub async fn wait_until(mut cond: impl FnMut() -> bool, limit: u32) {
    for _ in 0..limit {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached after {limit} ticks");
}
