use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::boundary::{BoxError, Failure};
use crate::bus::EventContext;
use crate::config::BridgeConfig;

use super::binding::{ArgumentError, Binding, MethodTable};
use super::error::BridgeError;
use super::queue::CallQueue;
use super::script::{self, ScriptChannel};

/// RPC dispatcher pairing one bound object with one UI script channel.
///
/// Cheap to clone; clones share the binding and the result cache.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    name: String,
    bound: OnceLock<MethodTable>,
    /// Encoded payloads awaiting retrieval, keyed by request id.
    results: DashMap<String, String>,
    queue: CallQueue,
    scripts: Arc<dyn ScriptChannel>,
    context: EventContext,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("name", &self.inner.name)
            .field("bound", &self.inner.bound.get())
            .field("pending_results", &self.inner.results.len())
            .finish()
    }
}

impl BridgeInner {
    fn table(&self) -> Result<&MethodTable, BridgeError> {
        self.bound.get().ok_or(BridgeError::NotBound)
    }

    fn store(&self, request_id: String, payload: String) {
        if self.results.insert(request_id.clone(), payload).is_some() {
            tracing::warn!(request_id = %request_id, "request id reused, replacing unread result");
        }
    }

    fn notify(&self, script: &str) {
        if let Err(e) = self.scripts.execute_script(script) {
            tracing::warn!("failed to execute notification script: {e}");
        }
    }
}

impl Bridge {
    pub fn new(config: &BridgeConfig, scripts: Arc<dyn ScriptChannel>, context: EventContext) -> Self {
        let queue = CallQueue::new(context.thread.runtime().clone(), config.call_concurrency());
        Self {
            inner: Arc::new(BridgeInner {
                name: config.bound_name.clone(),
                bound: OnceLock::new(),
                results: DashMap::new(),
                queue,
                scripts,
                context,
            }),
        }
    }

    pub fn bound_name(&self) -> &str {
        &self.inner.name
    }

    pub fn context(&self) -> &EventContext {
        &self.inner.context
    }

    pub fn is_bound(&self) -> bool {
        self.inner.bound.get().is_some()
    }

    /// Bind `binding`. Allowed exactly once, and only for an object that
    /// names this bridge.
    pub fn bind<B: Binding + ?Sized>(&self, binding: Arc<B>) -> Result<(), BridgeError> {
        if binding.bridge_name() != self.inner.name {
            return Err(BridgeError::ForeignBinding {
                bridge: self.inner.name.clone(),
                binding: binding.bridge_name().to_string(),
            });
        }
        if self.is_bound() {
            return Err(BridgeError::AlreadyBound);
        }

        let table = binding.methods();
        let methods = table.len();
        self.inner
            .bound
            .set(table)
            .map_err(|_| BridgeError::AlreadyBound)?;

        tracing::info!(bridge = %self.inner.name, methods, "binding attached");
        Ok(())
    }

    /// Every method the UI may call, sorted.
    pub fn get_bindings_method_names(&self) -> Result<Vec<String>, BridgeError> {
        Ok(self.inner.table()?.names())
    }

    /// Queue a call to `method`.
    ///
    /// `args_json` is a JSON array of JSON-encoded argument strings; an empty
    /// string means no arguments. Lookup and decoding errors are returned
    /// here. Anything the method itself raises ends up in the result cache
    /// under `request_id` as a failure payload, followed by a `responseReady`
    /// notification either way. A fatal panic produces neither; it is
    /// rethrown on the main thread instead.
    pub fn run_method(&self, method: &str, request_id: &str, args_json: &str) -> Result<(), BridgeError> {
        let table = self.inner.table()?;
        if !table.contains(method) {
            return Err(BridgeError::MethodNotFound(method.to_string()));
        }

        let args: Vec<String> = if args_json.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(args_json).map_err(|e| BridgeError::InvalidArguments {
                method: method.to_string(),
                source: ArgumentError::Envelope(e),
            })?
        };
        let call = table.prepare(method, &args)?;

        tracing::debug!(method, request_id, "call queued");

        let inner = Arc::clone(&self.inner);
        let method = method.to_string();
        let request_id = request_id.to_string();
        let queued = self.inner.queue.submit(async move {
            let payload = match inner.context.boundary.run_async(call).await {
                Ok(value) => value.to_string(),
                Err(failure) => {
                    tracing::debug!(method = %method, request_id = %request_id, "call failed");
                    failure.to_payload().to_string()
                }
            };
            inner.store(request_id.clone(), payload);
            inner.notify(&script::response_ready(&inner.name, &request_id));
        });
        self.rethrow_on_main(queued);
        Ok(())
    }

    /// Carry a panic that escaped a queued call over to the main thread, where
    /// it unwinds through the host's loop.
    fn rethrow_on_main(&self, queued: JoinHandle<()>) {
        let thread = self.inner.context.thread.clone();
        drop(self.inner.context.thread.spawn(async move {
            let Err(e) = queued.await else {
                return;
            };
            if !e.is_panic() {
                return;
            }
            let payload = e.into_panic();
            tracing::error!(severity = "critical", "queued call unwound, rethrowing on main thread");
            thread.run_on_main(Box::new(move || {
                std::panic::resume_unwind(payload);
            }));
        }));
    }

    /// Remove and return the payload stored under `request_id`.
    ///
    /// Each id can be read once; a second read fails.
    pub fn get_call_result(&self, request_id: &str) -> Result<String, BridgeError> {
        self.inner.table()?;
        self.inner
            .results
            .remove(request_id)
            .map(|(_, payload)| payload)
            .ok_or_else(|| BridgeError::UnknownRequest(request_id.to_string()))
    }

    pub fn pending_results(&self) -> usize {
        self.inner.results.len()
    }

    /// Queue `action` on the main thread. Failures are logged, not returned.
    pub fn run_on_main_thread<F>(&self, action: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        let boundary = self.inner.context.boundary.clone();
        self.inner
            .context
            .thread
            .run_on_main(Box::new(move || boundary.fire_and_forget(action)));
    }

    /// Run `action` on the main thread and wait for its outcome.
    ///
    /// Runs inline when already on the main thread, since waiting on a job
    /// queued behind the caller would never finish.
    pub async fn run_on_main_thread_async<T, F>(&self, action: F) -> Result<T, Failure>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
    {
        let context = &self.inner.context;
        if context.thread.is_main_thread() {
            return context.boundary.run(action);
        }

        let (tx, rx) = oneshot::channel();
        let boundary = context.boundary.clone();
        context.thread.run_on_main(Box::new(move || {
            let _ = tx.send(boundary.run(action));
        }));

        rx.await
            .unwrap_or_else(|_| Err(Failure::new("main thread dropped the job before it ran")))
    }

    /// Ask the UI to fire `event` with no payload.
    pub fn send(&self, event: &str) -> Result<(), BridgeError> {
        self.inner.table()?;
        tracing::debug!(event, "emitting event");
        self.inner.notify(&script::emit(&self.inner.name, event));
        Ok(())
    }

    /// Ask the UI to fire `event` carrying `data`.
    ///
    /// `data` goes into the result cache under a fresh id, which the UI pulls
    /// with [`Bridge::get_call_result`] like any call result. Returns that id.
    pub fn send_with<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> Result<String, BridgeError> {
        self.inner.table()?;
        let payload = serde_json::to_string(data)?;
        let request_id = Uuid::new_v4().to_string();

        tracing::debug!(event, request_id = %request_id, "emitting event with payload");
        self.inner.store(request_id.clone(), payload);
        self.inner.notify(&script::emit_response_ready(
            &self.inner.name,
            event,
            &request_id,
        ));
        Ok(request_id)
    }
}
