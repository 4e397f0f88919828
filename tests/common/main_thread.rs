// tests/common/main_thread.rs
//! A real main thread for tests, pumping a `MainLoop`.

use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle, ThreadId};

use uibridge::{EventContext, ExceptionBoundary, MainLoop, MainLoopHandle, ThreadContext};

pub const MAIN_THREAD_NAME: &str = "ui-main";

/// Handle to a running main loop. Stops and joins the thread on drop.
pub struct MainThread {
    pub handle: MainLoopHandle,
    pub id: ThreadId,
    join: Option<JoinHandle<()>>,
}

impl Drop for MainThread {
    fn drop(&mut self) {
        self.handle.stop();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Start a thread named `ui-main` that captures itself as the main thread and
/// runs the loop until dropped.
pub fn spawn_main_loop() -> MainThread {
    let (tx, rx) = mpsc::channel();
    let join = thread::Builder::new()
        .name(MAIN_THREAD_NAME.into())
        .spawn(move || {
            let (main_loop, handle) = MainLoop::capture();
            tx.send((handle, thread::current().id())).unwrap();
            main_loop.run();
        })
        .unwrap();

    let (handle, id) = rx.recv().unwrap();
    MainThread {
        handle,
        id,
        join: Some(join),
    }
}

/// Event context on the current tokio runtime, marshaling to `main`.
pub fn test_context(main: &MainThread) -> EventContext {
    let thread = ThreadContext::with_current_runtime(Arc::new(main.handle.clone())).unwrap();
    EventContext::new(thread, ExceptionBoundary::new("integration"))
}
