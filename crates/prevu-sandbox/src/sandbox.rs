//! Sandboxed bundle execution.
//!
//! Each mount builds a fresh V8 isolate (`deno_core::JsRuntime`) — a
//! genuinely separate JavaScript realm. The bootstrap script installs the
//! sandbox environment, the bundle executes as a script, and a driven event
//! loop settles whatever async work it scheduled, under one overall
//! deadline. Ops are the only doorway back to the host: structured
//! messages, module/API-route resolution against the bundle's registered
//! path set, passthrough fetch, and the persistent store.
//!
//! There is no graceful in-place teardown: cancelling a running program
//! means dropping the isolate and mounting a new one.

use deno_core::{extension, op2, JsRuntime, OpState, RuntimeOptions};
use prevu_core::bundle::Bundle;
use prevu_core::resolver::ModuleSet;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::messages::{Envelope, SandboxMessage};
use crate::store::SharedStore;

/// Sandbox error.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    #[error("Sandbox initialization failed: {0}")]
    Init(String),
}

/// Host-side state reachable from ops.
struct HostState {
    sandbox_id: u64,
    modules: ModuleSet,
    tx: mpsc::UnboundedSender<Envelope>,
    store: Option<SharedStore>,
}

/// Environment installed before the bundle runs.
const BOOTSTRAP_JS: &str = include_str!("bootstrap.js");

extension!(
    prevu_sandbox_ext,
    ops = [
        op_prevu_post,
        op_prevu_resolve_module,
        op_prevu_resolve_api,
        op_prevu_fetch,
        op_prevu_store_available,
        op_prevu_store_get,
        op_prevu_store_set,
        op_prevu_store_remove,
        op_prevu_store_keys,
    ],
);

/// Post a structured message to the host, stamped with the posting
/// sandbox's instance id.
#[op2]
fn op_prevu_post(state: &mut OpState, #[serde] message: SandboxMessage) {
    let host = state.borrow::<HostState>();
    let _ = host.tx.send(Envelope {
        sandbox_id: host.sandbox_id,
        message,
    });
}

/// Resolve a `require(spec)` from `base` against the bundle's registered
/// module paths. Returns the registry key, or null for a miss (the registry
/// throws its module-not-found error in-sandbox).
#[op2]
#[string]
fn op_prevu_resolve_module(
    state: &mut OpState,
    #[string] base: &str,
    #[string] spec: &str,
) -> Option<String> {
    state.borrow::<HostState>().modules.resolve_module(base, spec)
}

/// Resolve an intercepted `/api/*` request path to a registered handler
/// module.
#[op2]
#[string]
fn op_prevu_resolve_api(state: &mut OpState, #[string] path: &str) -> Option<String> {
    state.borrow::<HostState>().modules.resolve_api_route(path)
}

/// Whether the host attached a persistent store to this sandbox.
#[op2(fast)]
fn op_prevu_store_available(state: &mut OpState) -> bool {
    state.borrow::<HostState>().store.is_some()
}

#[op2]
#[serde]
fn op_prevu_store_get(state: &mut OpState, #[string] key: &str) -> serde_json::Value {
    match &state.borrow::<HostState>().store {
        Some(store) => store.borrow().get(key).unwrap_or(serde_json::Value::Null),
        None => serde_json::Value::Null,
    }
}

#[op2]
fn op_prevu_store_set(state: &mut OpState, #[string] key: &str, #[serde] value: serde_json::Value) {
    if let Some(store) = &state.borrow::<HostState>().store {
        store.borrow_mut().set(key, value);
    }
}

#[op2(fast)]
fn op_prevu_store_remove(state: &mut OpState, #[string] key: &str) -> bool {
    match &state.borrow::<HostState>().store {
        Some(store) => store.borrow_mut().remove(key),
        None => false,
    }
}

#[op2]
#[serde]
fn op_prevu_store_keys(state: &mut OpState) -> Vec<String> {
    match &state.borrow::<HostState>().store {
        Some(store) => store.borrow().keys(),
        None => Vec::new(),
    }
}

/// Response shape handed back to the bootstrap's passthrough wrapper.
#[derive(serde::Serialize)]
pub struct FetchResponse {
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    pub headers: std::collections::HashMap<String, String>,
    pub body: String,
}

/// Request options accepted from the bootstrap.
#[derive(serde::Deserialize, Default)]
pub struct FetchOptions {
    pub method: Option<String>,
    pub headers: Option<std::collections::HashMap<String, String>>,
    pub body: Option<String>,
}

/// Passthrough fetch for requests the router does not intercept.
/// Blocking reqwest on a helper thread; the op itself stays async.
#[op2(async)]
#[serde]
async fn op_prevu_fetch(
    #[string] url: String,
    #[serde] options: Option<FetchOptions>,
) -> Result<FetchResponse, deno_core::error::AnyError> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    std::thread::spawn(move || {
        let result = (|| {
            let client = reqwest::blocking::Client::new();
            let opts = options.unwrap_or_default();

            let method = opts.method.as_deref().unwrap_or("GET").to_uppercase();
            let mut request = match method.as_str() {
                "GET" => client.get(&url),
                "POST" => client.post(&url),
                "PUT" => client.put(&url),
                "DELETE" => client.delete(&url),
                "PATCH" => client.patch(&url),
                "HEAD" => client.head(&url),
                _ => {
                    return Err(deno_core::error::AnyError::msg(format!(
                        "Unsupported method: {method}"
                    )))
                }
            };

            if let Some(headers) = opts.headers {
                for (key, value) in headers {
                    request = request.header(&key, &value);
                }
            }
            if let Some(body) = opts.body {
                request = request.body(body);
            }

            let response = request.send()?;
            let status = response.status();

            let mut headers = std::collections::HashMap::new();
            for (key, value) in response.headers() {
                headers.insert(key.to_string(), value.to_str().unwrap_or("").to_string());
            }

            let body = response.text()?;

            Ok(FetchResponse {
                ok: status.is_success(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                headers,
                body,
            })
        })();

        let _ = tx.send(result);
    });

    rx.await
        .map_err(|_| deno_core::error::AnyError::msg("Fetch cancelled"))?
}

/// One mounted sandbox instance.
pub struct Sandbox {
    js_runtime: JsRuntime,
    id: u64,
    code: String,
    timeout: Duration,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Sandbox {
    /// Build the isolate, attach host state, and install the bootstrap
    /// environment. The bundle does not run yet.
    pub fn new(
        bundle: &Bundle,
        store: Option<SharedStore>,
        tx: mpsc::UnboundedSender<Envelope>,
        id: u64,
        timeout_ms: u64,
    ) -> Result<Self, SandboxError> {
        let mut js_runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![prevu_sandbox_ext::init_ops()],
            ..Default::default()
        });

        js_runtime.op_state().borrow_mut().put(HostState {
            sandbox_id: id,
            modules: bundle.module_set(),
            tx: tx.clone(),
            store,
        });

        js_runtime
            .execute_script("<prevu:bootstrap>", BOOTSTRAP_JS.to_string())
            .map_err(|e| SandboxError::Init(format!("Bootstrap failed: {e}")))?;

        Ok(Self {
            js_runtime,
            id,
            code: bundle.code.clone(),
            timeout: Duration::from_millis(timeout_ms),
            tx,
        })
    }

    /// Instance id (equals the session's remount key at mount time).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Execute the bundle and drive the event loop until it settles or the
    /// deadline expires. Uncaught errors — a top-level throw, an
    /// event-loop fault, or the deadline itself — are reported through the
    /// preview-error path rather than returned: the sandbox stays mounted
    /// and its last rendered state stays inspectable.
    pub async fn execute(&mut self) {
        let code = self.code.clone();
        if let Err(e) = self.js_runtime.execute_script("<prevu:bundle>", code) {
            self.post_error(e.to_string());
            return;
        }
        self.settle().await;
    }

    /// Drive pending async work (timers, handler promises) to completion
    /// under the configured deadline.
    pub async fn settle(&mut self) {
        let result = tokio::time::timeout(
            self.timeout,
            self.js_runtime.run_event_loop(Default::default()),
        )
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.post_error(e.to_string()),
            Err(_) => self.post_error(format!(
                "Preview timed out after {} ms",
                self.timeout.as_millis()
            )),
        }
    }

    /// Serialized HTML of the sandbox's rendered output. The screenshot
    /// trigger: used for project thumbnails.
    pub fn capture_html(&mut self) -> Result<String, SandboxError> {
        self.eval_string("<prevu:capture>", "__prevu_host.captureHtml()".to_string())
    }

    /// Toggle visual-selection mode.
    pub fn set_visual_edit(&mut self, enabled: bool) -> Result<(), SandboxError> {
        self.js_runtime
            .execute_script(
                "<prevu:visual-edit>",
                format!("__prevu_host.setVisualEdit({enabled});"),
            )
            .map_err(|e| SandboxError::JavaScript(e.to_string()))?;
        Ok(())
    }

    /// Dispatch a synthetic pointer-over at the element matching
    /// `selector`. Returns false if nothing matched.
    pub fn pointer_over(&mut self, selector: &str) -> Result<bool, SandboxError> {
        self.dispatch_pointer("over", selector)
    }

    /// Dispatch a synthetic click at the element matching `selector`.
    /// Returns false if nothing matched.
    pub fn click(&mut self, selector: &str) -> Result<bool, SandboxError> {
        self.dispatch_pointer("click", selector)
    }

    fn dispatch_pointer(&mut self, kind: &str, selector: &str) -> Result<bool, SandboxError> {
        let selector = serde_json::to_string(selector)
            .map_err(|e| SandboxError::JavaScript(e.to_string()))?;
        let result = self.eval_string(
            "<prevu:pointer>",
            format!("String(__prevu_host.dispatchPointer(\"{kind}\", {selector}))"),
        )?;
        Ok(result == "true")
    }

    /// Evaluate an expression and coerce the result to a Rust string.
    pub fn eval_string(
        &mut self,
        name: &'static str,
        code: String,
    ) -> Result<String, SandboxError> {
        let value = self
            .js_runtime
            .execute_script(name, code)
            .map_err(|e| SandboxError::JavaScript(e.to_string()))?;
        let scope = &mut self.js_runtime.handle_scope();
        let local = deno_core::v8::Local::new(scope, value);
        Ok(local.to_rust_string_lossy(scope))
    }

    fn post_error(&self, message: String) {
        let _ = self.tx.send(Envelope {
            sandbox_id: self.id,
            message: SandboxMessage::PreviewError {
                message,
                stack: None,
            },
        });
    }
}
