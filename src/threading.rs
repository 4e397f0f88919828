//! Thread affinity and main-thread marshaling.
//!
//! A host has exactly one main (UI) thread, captured once at startup, plus the
//! tokio runtime used for worker and async work. [`ThreadContext`] bundles the
//! two so subscribers and bridge calls can be routed to the right place.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A unit of work marshaled onto the main thread.
pub type MainThreadJob = Box<dyn FnOnce() + Send + 'static>;

/// Where a subscriber's callback must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreadAffinity {
    /// Inline, on whichever thread called `publish`.
    #[default]
    PublisherThread,
    /// On the runtime's blocking pool.
    WorkerThread,
    /// On the captured main thread, in order with other main-thread work.
    MainThread,
}

#[derive(Debug, thiserror::Error)]
#[error("main thread is no longer accepting work")]
pub struct DispatchError;

/// Host hook for running work on the main thread.
pub trait MainThreadDispatcher: Send + Sync {
    /// Queue `job` behind any main-thread work already pending.
    fn dispatch(&self, job: MainThreadJob) -> Result<(), DispatchError>;

    fn is_main_thread(&self) -> bool;
}

enum LoopMessage {
    Job(MainThreadJob),
    Stop,
}

/// Built-in main-thread queue for hosts without their own dispatcher.
///
/// The thread that calls [`MainLoop::capture`] becomes the main thread and
/// must pump the loop with [`MainLoop::run_pending`] or [`MainLoop::run`].
pub struct MainLoop {
    rx: mpsc::UnboundedReceiver<LoopMessage>,
    thread: ThreadId,
}

/// Cloneable sender side of a [`MainLoop`].
#[derive(Clone)]
pub struct MainLoopHandle {
    tx: mpsc::UnboundedSender<LoopMessage>,
    thread: ThreadId,
}

impl MainLoop {
    /// Capture the current thread as the main thread.
    pub fn capture() -> (Self, MainLoopHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::current().id();
        (Self { rx, thread }, MainLoopHandle { tx, thread })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }

    /// Run every job queued so far without blocking. Returns how many ran.
    ///
    /// A pending stop request is ignored here; only [`MainLoop::run`] honors it.
    pub fn run_pending(&mut self) -> usize {
        debug_assert_eq!(thread::current().id(), self.thread, "main loop pumped off-thread");
        let mut ran = 0;
        while let Ok(message) = self.rx.try_recv() {
            if let LoopMessage::Job(job) = message {
                job();
                ran += 1;
            }
        }
        ran
    }

    /// Block the main thread running jobs until [`MainLoopHandle::stop`] is
    /// called or every handle is dropped.
    pub fn run(mut self) {
        while let Some(message) = self.rx.blocking_recv() {
            match message {
                LoopMessage::Job(job) => job(),
                LoopMessage::Stop => break,
            }
        }
        tracing::debug!("main loop stopped");
    }
}

impl MainLoopHandle {
    /// Ask a blocking [`MainLoop::run`] to return once earlier jobs finish.
    pub fn stop(&self) {
        let _ = self.tx.send(LoopMessage::Stop);
    }
}

impl MainThreadDispatcher for MainLoopHandle {
    fn dispatch(&self, job: MainThreadJob) -> Result<(), DispatchError> {
        self.tx.send(LoopMessage::Job(job)).map_err(|_| DispatchError)
    }

    fn is_main_thread(&self) -> bool {
        thread::current().id() == self.thread
    }
}

/// The main-thread dispatcher plus the runtime used for everything else.
#[derive(Clone)]
pub struct ThreadContext {
    main: Arc<dyn MainThreadDispatcher>,
    runtime: Handle,
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("runtime", &self.runtime.runtime_flavor())
            .finish_non_exhaustive()
    }
}

impl ThreadContext {
    pub fn new(main: Arc<dyn MainThreadDispatcher>, runtime: Handle) -> Self {
        Self { main, runtime }
    }

    /// Build a context on the runtime the caller is running inside.
    pub fn with_current_runtime(
        main: Arc<dyn MainThreadDispatcher>,
    ) -> Result<Self, tokio::runtime::TryCurrentError> {
        Ok(Self::new(main, Handle::try_current()?))
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn is_main_thread(&self) -> bool {
        self.main.is_main_thread()
    }

    /// Queue `job` on the main thread. Always enqueues, even when already on
    /// the main thread, so ordering with earlier main-thread work holds.
    pub fn run_on_main(&self, job: MainThreadJob) {
        if let Err(e) = self.main.dispatch(job) {
            tracing::warn!("dropping main-thread job: {e}");
        }
    }

    pub fn spawn_worker<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        drop(self.runtime.spawn_blocking(job));
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future)
    }

    /// Run `job` affine to `affinity`.
    pub fn execute<F>(&self, affinity: ThreadAffinity, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match affinity {
            ThreadAffinity::PublisherThread => job(),
            ThreadAffinity::WorkerThread => self.spawn_worker(job),
            ThreadAffinity::MainThread => self.run_on_main(Box::new(job)),
        }
    }
}
