//! # Chrome-backed render slot.
//!
//! [`ChromeFactory`] launches a [`BrowserProcess`], attaches a
//! [`CdpConnection`] to its blank page and enables the `Page`, `Runtime` and
//! `Log` domains. [`ChromeRenderer`] then drives one render at a time:
//!
//! ```text
//! generate:  check ctx ─► Network.setCookies ─► Page.navigate ─► wait ─► Page.printToPDF ─► base64
//!            (ClientDropped)  (CookieInjection)    (Generation)  (ElementWait) (Generation)
//! cleanup:   Page.navigate(about:blank) ×3 ─► [Storage.clearDataForOrigin, Network.clearBrowserCache,
//!                                               Page.resetNavigationHistory]
//! ```
//!
//! Console errors and browser log errors raised while a session is active are
//! counted into that session.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, RenderError};
use crate::pool::{RenderContext, Renderer, RendererFactory, Session};
use crate::types::{BrowserVersion, RenderRequest, WaitFor, MAX_TIMEOUT_MS};

use super::devtools::{CdpConnection, DevtoolsError, EventHandler};
use super::pdf::print_params;
use super::process::BrowserProcess;
use super::wait::{wait_expression, Visibility};
use super::BrowserConfig;

const BLANK_NAVIGATION_TRIES: usize = 3;

type ActiveSession = Arc<Mutex<Option<Arc<Session>>>>;

/// Routes browser events into `session` until dropped, including when the
/// render future is abandoned mid-flight.
struct ActiveGuard(ActiveSession);

impl ActiveGuard {
    fn activate(active: &ActiveSession, session: &Arc<Session>) -> Self {
        *active.lock() = Some(Arc::clone(session));
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

fn event_handler(slot: i32, active: ActiveSession) -> EventHandler {
    Arc::new(move |method: &str, params: &Value| {
        let session = active.lock().clone();
        match method {
            "Runtime.consoleAPICalled" if params["type"] == "error" => {
                if let Some(s) = &session {
                    s.record_console_error();
                }
                debug!(
                    slot,
                    session = ?session.as_ref().map(|s| s.id()),
                    args = %params["args"],
                    "console error"
                );
            }
            "Log.entryAdded" if params["entry"]["level"] == "error" => {
                if let Some(s) = &session {
                    s.record_browser_error();
                }
                debug!(
                    slot,
                    session = ?session.as_ref().map(|s| s.id()),
                    entry = %params["entry"],
                    "browser log error"
                );
            }
            _ => {}
        }
    })
}

/// Starts [`ChromeRenderer`]s.
#[derive(Debug, Clone)]
pub struct ChromeFactory {
    config: BrowserConfig,
}

impl ChromeFactory {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RendererFactory for ChromeFactory {
    async fn start(&self, id: i32) -> Result<Box<dyn Renderer>, RenderError> {
        let startup = |e: DevtoolsError| {
            RenderError::new(ErrorKind::UnhandledEngineFault)
                .with_detail("failed to connect to browser")
                .with_source(e)
                .with_slot(id)
        };

        let mut process = BrowserProcess::start(&self.config, id).map_err(|e| {
            RenderError::new(ErrorKind::UnhandledEngineFault)
                .with_detail(format!(
                    "failed to start browser {}",
                    self.config.executable.display()
                ))
                .with_source(e)
                .with_slot(id)
        })?;

        let active: ActiveSession = Arc::new(Mutex::new(None));
        let conn = CdpConnection::connect(
            &process.debug_base_url(),
            self.config.startup_timeout,
            self.config.command_timeout,
            event_handler(id, Arc::clone(&active)),
        )
        .await;
        let mut conn = match conn {
            Ok(conn) => conn,
            Err(e) => {
                process.close().await;
                return Err(startup(e));
            }
        };

        for domain in ["Page.enable", "Runtime.enable", "Log.enable"] {
            if let Err(e) = conn.send(domain, Value::Null, None).await {
                conn.close().await;
                process.close().await;
                return Err(startup(e));
            }
        }

        info!(slot = id, "browser slot initialized");
        Ok(Box::new(ChromeRenderer {
            id,
            process,
            conn,
            active,
        }))
    }
}

/// One browser process plus its devtools connection.
pub struct ChromeRenderer {
    id: i32,
    process: BrowserProcess,
    conn: CdpConnection,
    active: ActiveSession,
}

impl ChromeRenderer {
    async fn render(
        &mut self,
        session: &Arc<Session>,
        request: &RenderRequest,
        ctx: &RenderContext,
    ) -> Result<Vec<u8>, RenderError> {
        ctx.check()?;

        if !request.cookies.is_empty() {
            let cookies: Vec<Value> = request.cookies.iter().map(cookie_param).collect();
            session.mark_touched();
            self.conn
                .send("Network.setCookies", json!({ "cookies": cookies }), Some(ctx))
                .await
                .map_err(|e| e.classify(ErrorKind::CookieInjectionFailure, None))?;
        }

        ctx.check()?;
        session.mark_touched();
        let nav = self
            .conn
            .send("Page.navigate", json!({ "url": request.url }), Some(ctx))
            .await
            .map_err(|e| e.classify(ErrorKind::GenerationFailure, None))?;
        if let Some(error_text) = nav["errorText"].as_str() {
            warn!(
                slot = self.id,
                session = session.id(),
                url = %request.url,
                error_text,
                "navigation reported an error"
            );
        }

        match &request.wait_for {
            None => {}
            Some(WaitFor::Timeout(ms)) => {
                ctx.sleep(std::time::Duration::from_millis(u64::from(*ms)))
                    .await?
            }
            Some(WaitFor::Selector(selector)) => {
                self.wait_for_element(selector, MAX_TIMEOUT_MS, Visibility::Present, ctx)
                    .await?
            }
            Some(WaitFor::Options(opts)) => {
                let visibility = match (opts.visible, opts.hidden) {
                    (Some(true), _) => Visibility::Visible,
                    (_, Some(true)) => Visibility::Hidden,
                    _ => Visibility::Present,
                };
                let timeout = opts.timeout.unwrap_or(MAX_TIMEOUT_MS);
                self.wait_for_element(&opts.selector, timeout, visibility, ctx)
                    .await?
            }
        }

        ctx.check()?;
        let printed = self
            .conn
            .send("Page.printToPDF", print_params(&request.options), Some(ctx))
            .await
            .map_err(|e| e.classify(ErrorKind::GenerationFailure, None))?;

        let data = printed["data"].as_str().ok_or_else(|| {
            RenderError::new(ErrorKind::GenerationFailure).with_detail("no PDF data in response")
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| RenderError::new(ErrorKind::GenerationFailure).with_source(e))
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout_ms: u32,
        visibility: Visibility,
        ctx: &RenderContext,
    ) -> Result<(), RenderError> {
        let detail = format!("element {selector:?}");
        let expression = wait_expression(selector, timeout_ms, visibility);
        let resp = self
            .conn
            .send(
                "Runtime.evaluate",
                json!({ "expression": expression, "awaitPromise": true, "returnByValue": true }),
                Some(ctx),
            )
            .await
            .map_err(|e| e.classify(ErrorKind::ElementWaitFailure, Some(detail.clone())))?;

        if let Some(exception) = resp.get("exceptionDetails") {
            return Err(RenderError::new(ErrorKind::ElementWaitFailure)
                .with_detail(format!("{detail}: {}", exception["text"])));
        }
        match resp["result"]["value"].as_bool() {
            Some(true) => Ok(()),
            Some(false) => Err(RenderError::new(ErrorKind::ElementWaitFailure)
                .with_detail(format!("{detail}: not ready within {timeout_ms}ms"))),
            None => {
                warn!(slot = self.id, selector, "unexpected wait result type");
                Ok(())
            }
        }
    }
}

fn cookie_param(cookie: &crate::types::Cookie) -> Value {
    let mut c = json!({
        "name": cookie.name,
        "value": cookie.value,
        "sameSite": cookie.same_site.as_str(),
    });
    if !cookie.domain.is_empty() {
        c["domain"] = json!(cookie.domain);
    }
    if !cookie.path.is_empty() {
        c["path"] = json!(cookie.path);
    }
    if let Some(secure) = cookie.secure {
        c["secure"] = json!(secure);
    }
    if let Some(http_only) = cookie.http_only {
        c["httpOnly"] = json!(http_only);
    }
    if !cookie.url.is_empty() {
        c["url"] = json!(cookie.url);
    }
    c
}

#[async_trait]
impl Renderer for ChromeRenderer {
    fn id(&self) -> i32 {
        self.id
    }

    async fn generate(
        &mut self,
        session: &Arc<Session>,
        request: &RenderRequest,
        ctx: &RenderContext,
    ) -> Result<Vec<u8>, RenderError> {
        let _active = ActiveGuard::activate(&self.active, session);
        self.render(session, request, ctx).await
    }

    async fn cleanup(&mut self, session: &Session) -> Result<(), RenderError> {
        let mut nav = Err(DevtoolsError::Closed);
        for attempt in 1..=BLANK_NAVIGATION_TRIES {
            nav = self
                .conn
                .send("Page.navigate", json!({ "url": "about:blank" }), None)
                .await;
            if nav.is_ok() {
                break;
            }
            debug!(slot = self.id, attempt, "navigation to about:blank failed, retrying");
        }
        nav.map_err(|e| {
            e.classify(ErrorKind::UnhandledEngineFault, Some("navigate to about:blank".into()))
        })?;

        let results = self
            .conn
            .send_batch(vec![
                (
                    "Storage.clearDataForOrigin",
                    json!({ "origin": session.origin(), "storageTypes": "all" }),
                ),
                ("Network.clearBrowserCache", Value::Null),
                ("Page.resetNavigationHistory", Value::Null),
            ])
            .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RenderError::new(ErrorKind::UnhandledEngineFault)
                .with_detail(format!("cleanup failed: {}", failures.join("; "))))
        }
    }

    async fn version(&mut self) -> Result<BrowserVersion, RenderError> {
        let v = self
            .conn
            .send("Browser.getVersion", Value::Null, None)
            .await
            .map_err(|e| {
                e.classify(ErrorKind::UnhandledEngineFault, Some("Browser.getVersion".into()))
            })?;
        serde_json::from_value(v).map_err(|e| {
            RenderError::new(ErrorKind::UnhandledEngineFault)
                .with_detail("malformed Browser.getVersion response")
                .with_source(e)
        })
    }

    async fn close(&mut self) {
        if self.process.is_closed() {
            return;
        }
        self.conn.close().await;
        self.process.close().await;
        info!(slot = self.id, "browser slot closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cookie, SameSite};

    #[test]
    fn cookie_params_skip_empty_fields() {
        let cookie = Cookie {
            name: "session".into(),
            value: "abc".into(),
            domain: "app.example".into(),
            path: String::new(),
            same_site: SameSite::None,
            secure: Some(true),
            http_only: None,
            url: String::new(),
        };
        let v = cookie_param(&cookie);
        assert_eq!(v["sameSite"], "None");
        assert_eq!(v["domain"], "app.example");
        assert_eq!(v["secure"], true);
        assert!(v.get("path").is_none());
        assert!(v.get("httpOnly").is_none());
    }

    #[test]
    fn console_errors_count_into_the_active_session() {
        let active: ActiveSession = Arc::new(Mutex::new(None));
        let handler = event_handler(0, Arc::clone(&active));
        handler("Runtime.consoleAPICalled", &json!({ "type": "error" }));

        let session = Arc::new(Session::new(1, 0, "https://a.example/", "https://a.example"));
        *active.lock() = Some(Arc::clone(&session));
        handler("Runtime.consoleAPICalled", &json!({ "type": "error" }));
        handler("Runtime.consoleAPICalled", &json!({ "type": "log" }));
        handler("Log.entryAdded", &json!({ "entry": { "level": "error" } }));

        assert_eq!(session.console_errors(), 1);
        assert_eq!(session.browser_errors(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_render_detaches_its_session() {
        let active: ActiveSession = Arc::new(Mutex::new(None));
        let handler = event_handler(0, Arc::clone(&active));
        let session = Arc::new(Session::new(2, 0, "https://a.example/", "https://a.example"));

        let render = async {
            let _active = ActiveGuard::activate(&active, &session);
            handler("Runtime.consoleAPICalled", &json!({ "type": "error" }));
            std::future::pending::<()>().await
        };
        let timed_out = tokio::time::timeout(std::time::Duration::from_secs(1), render).await;
        assert!(timed_out.is_err());
        assert!(active.lock().is_none());

        handler("Runtime.consoleAPICalled", &json!({ "type": "error" }));
        assert_eq!(session.console_errors(), 1);
    }
}
