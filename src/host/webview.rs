use std::sync::Arc;
use std::thread::{self, ThreadId};

use tauri::{AppHandle, Manager, Runtime, WebviewWindow};

use crate::boundary::ExceptionBoundary;
use crate::bridge::{Bridge, ScriptChannel, ScriptError};
use crate::bus::EventContext;
use crate::config::BridgeConfig;
use crate::threading::{DispatchError, MainThreadDispatcher, MainThreadJob, ThreadContext};

impl<R: Runtime> ScriptChannel for WebviewWindow<R> {
    fn execute_script(&self, script: &str) -> Result<(), ScriptError> {
        self.eval(script).map_err(|e| ScriptError::Failed(e.to_string()))
    }
}

/// Main-thread dispatcher backed by Tauri's event loop.
pub struct TauriMainThread<R: Runtime> {
    app: AppHandle<R>,
    main: ThreadId,
}

impl<R: Runtime> TauriMainThread<R> {
    /// Must be called on the main thread, e.g. from the builder's `setup` hook.
    pub fn capture(app: AppHandle<R>) -> Self {
        Self {
            app,
            main: thread::current().id(),
        }
    }
}

impl<R: Runtime> MainThreadDispatcher for TauriMainThread<R> {
    fn dispatch(&self, job: MainThreadJob) -> Result<(), DispatchError> {
        self.app.run_on_main_thread(job).map_err(|e| {
            tracing::warn!("run_on_main_thread failed: {e}");
            DispatchError
        })
    }

    fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main
    }
}

/// Build a bridge that talks to `window`, on Tauri's async runtime.
///
/// Call from the main thread; that thread becomes the bridge's main thread.
pub fn attach<R: Runtime>(window: &WebviewWindow<R>, config: &BridgeConfig) -> Bridge {
    let main = Arc::new(TauriMainThread::capture(window.app_handle().clone()));
    let runtime = tauri::async_runtime::handle().inner().clone();
    let thread = ThreadContext::new(main, runtime);
    let context = EventContext::new(thread, ExceptionBoundary::new(&config.bound_name));

    tracing::info!(bridge = %config.bound_name, window = window.label(), "attaching bridge to webview");
    Bridge::new(config, Arc::new(window.clone()), context)
}
