//! Idle-tick coalescing.
//!
//! Native hosts often raise the same notification many times in a burst
//! (selection changed, document modified). Instead of reacting to each one,
//! callers register a named action; the latest registration per name runs
//! once on the host's next idle notification.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::boundary::BoxError;
use crate::config::IdleHookMode;

use super::EventContext;

/// Callback the coalescer hands to the host's idle source.
pub type IdleHook = Arc<dyn Fn() + Send + Sync + 'static>;

/// Host adapter for the native "application is idle" notification.
pub trait IdleSource: Send + Sync {
    /// Start calling `on_idle` on each idle notification.
    ///
    /// Called with the coalescer's lock held: `on_idle` must not be invoked
    /// synchronously from inside this method.
    fn hook(&self, on_idle: IdleHook);

    fn unhook(&self);
}

type SyncAction = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;
type AsyncAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send + 'static>;

enum IdleAction {
    Sync(SyncAction),
    Async(AsyncAction),
}

struct IdleState {
    pending: HashMap<String, IdleAction>,
    hooked: bool,
}

struct IdleInner {
    state: Mutex<IdleState>,
    source: Arc<dyn IdleSource>,
    context: EventContext,
    mode: IdleHookMode,
}

/// Named zero-arg callbacks deferred to the next idle tick.
#[derive(Clone)]
pub struct IdleCallCoalescer {
    inner: Arc<IdleInner>,
}

impl fmt::Debug for IdleCallCoalescer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("IdleCallCoalescer")
            .field("pending", &state.pending.len())
            .field("hooked", &state.hooked)
            .field("mode", &self.inner.mode)
            .finish()
    }
}

impl IdleCallCoalescer {
    pub fn new(source: Arc<dyn IdleSource>, context: EventContext, mode: IdleHookMode) -> Self {
        Self {
            inner: Arc::new(IdleInner {
                state: Mutex::new(IdleState {
                    pending: HashMap::new(),
                    hooked: false,
                }),
                source,
                context,
                mode,
            }),
        }
    }

    /// Run `action` on the next idle tick. A later registration under the
    /// same `id` before that tick replaces this one.
    pub fn subscribe_to_idle<F>(&self, id: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.register(id.into(), IdleAction::Sync(Box::new(action)));
    }

    /// Async flavor of [`IdleCallCoalescer::subscribe_to_idle`]. The future is
    /// spawned on the runtime when the tick arrives.
    pub fn subscribe_to_idle_async<F, Fut>(&self, id: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.register(
            id.into(),
            IdleAction::Async(Box::new(move || action().boxed())),
        );
    }

    /// Run everything pending. Normally invoked by the idle source.
    pub fn on_idle(&self) {
        self.inner.on_idle();
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_hooked(&self) -> bool {
        self.inner.lock().hooked
    }

    fn register(&self, id: String, action: IdleAction) {
        let mut state = self.inner.lock();
        if state.pending.insert(id.clone(), action).is_some() {
            tracing::debug!(idle_id = %id, "coalesced idle action");
        }

        if !state.hooked {
            let inner = Arc::downgrade(&self.inner);
            self.inner.source.hook(Arc::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.on_idle();
                }
            }));
            state.hooked = true;
            tracing::debug!("hooked idle source");
        }
    }
}

impl IdleInner {
    fn lock(&self) -> MutexGuard<'_, IdleState> {
        self.state.lock().expect("idle registry mutex poisoned")
    }

    fn on_idle(&self) {
        let pending = {
            let mut state = self.lock();
            let pending = mem::take(&mut state.pending);
            if self.mode == IdleHookMode::UnhookWhenDrained && state.hooked {
                self.source.unhook();
                state.hooked = false;
                tracing::debug!("unhooked idle source");
            }
            pending
        };

        for (id, action) in pending {
            match action {
                IdleAction::Sync(action) => {
                    if self.context.boundary.run(action).is_err() {
                        tracing::warn!(idle_id = %id, "idle action failed");
                    }
                }
                IdleAction::Async(action) => {
                    let boundary = self.context.boundary.clone();
                    drop(self.context.thread.spawn(async move {
                        if boundary.run_async(async move { action().await }).await.is_err() {
                            tracing::warn!(idle_id = %id, "async idle action failed");
                        }
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    use super::*;
    use crate::bus::test_helpers::make_test_context;

    /// Idle source that records hook calls and lets the test fire ticks.
    #[derive(Default)]
    struct ManualIdle {
        hook: Mutex<Option<IdleHook>>,
        hooks: AtomicUsize,
        unhooks: AtomicUsize,
        /// Widens the window in which a second caller could also hook.
        hook_delay: Duration,
    }

    impl ManualIdle {
        fn tick(&self) {
            let hook = self.hook.lock().unwrap().clone();
            if let Some(hook) = hook {
                hook();
            }
        }
    }

    impl IdleSource for ManualIdle {
        fn hook(&self, on_idle: IdleHook) {
            std::thread::sleep(self.hook_delay);
            self.hooks.fetch_add(1, Ordering::SeqCst);
            *self.hook.lock().unwrap() = Some(on_idle);
        }

        fn unhook(&self) {
            self.unhooks.fetch_add(1, Ordering::SeqCst);
            *self.hook.lock().unwrap() = None;
        }
    }

    fn coalescer(mode: IdleHookMode) -> (crate::threading::MainLoop, Arc<ManualIdle>, IdleCallCoalescer) {
        let (main_loop, context) = make_test_context();
        let source = Arc::new(ManualIdle::default());
        let coalescer = IdleCallCoalescer::new(source.clone(), context, mode);
        (main_loop, source, coalescer)
    }

    #[tokio::test]
    async fn same_id_collapses_to_latest() {
        let (_main_loop, source, coalescer) = coalescer(IdleHookMode::UnhookWhenDrained);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let seen = seen.clone();
            coalescer.subscribe_to_idle("selection", move || {
                seen.lock().unwrap().push(label);
                Ok(())
            });
        }
        assert_eq!(coalescer.pending_count(), 1);

        source.tick();
        assert_eq!(*seen.lock().unwrap(), vec!["second"]);
        assert_eq!(coalescer.pending_count(), 0);
    }

    #[tokio::test]
    async fn hooks_once_and_rehooks_after_drain() {
        let (_main_loop, source, coalescer) = coalescer(IdleHookMode::UnhookWhenDrained);

        coalescer.subscribe_to_idle("a", || Ok(()));
        coalescer.subscribe_to_idle("b", || Ok(()));
        assert_eq!(source.hooks.load(Ordering::SeqCst), 1);
        assert!(coalescer.is_hooked());

        source.tick();
        assert_eq!(source.unhooks.load(Ordering::SeqCst), 1);
        assert!(!coalescer.is_hooked());

        coalescer.subscribe_to_idle("a", || Ok(()));
        assert_eq!(source.hooks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_first_registrations_hook_once() {
        let (_main_loop, context) = make_test_context();
        let source = Arc::new(ManualIdle {
            hook_delay: Duration::from_millis(20),
            ..ManualIdle::default()
        });
        let coalescer =
            IdleCallCoalescer::new(source.clone(), context, IdleHookMode::UnhookWhenDrained);
        let start = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|n| {
                let coalescer = coalescer.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    coalescer.subscribe_to_idle(format!("view-{n}"), || Ok(()));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(source.hooks.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.pending_count(), 16);
        assert!(coalescer.is_hooked());
    }

    #[tokio::test]
    async fn persistent_mode_stays_hooked() {
        let (_main_loop, source, coalescer) = coalescer(IdleHookMode::Persistent);

        coalescer.subscribe_to_idle("a", || Ok(()));
        source.tick();
        coalescer.subscribe_to_idle("a", || Ok(()));
        source.tick();

        assert_eq!(source.hooks.load(Ordering::SeqCst), 1);
        assert_eq!(source.unhooks.load(Ordering::SeqCst), 0);
        assert!(coalescer.is_hooked());
    }

    #[tokio::test]
    async fn failing_action_does_not_block_others() {
        let (_main_loop, source, coalescer) = coalescer(IdleHookMode::UnhookWhenDrained);
        let hits = Arc::new(AtomicUsize::new(0));

        coalescer.subscribe_to_idle("broken", || Err("host object went away".into()));
        coalescer.subscribe_to_idle("panics", || panic!("bad state"));
        let counter = hits.clone();
        coalescer.subscribe_to_idle("fine", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        source.tick();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_action_runs_on_runtime() {
        let (_main_loop, source, coalescer) = coalescer(IdleHookMode::UnhookWhenDrained);
        let (tx, rx) = tokio::sync::oneshot::channel();

        coalescer.subscribe_to_idle_async("refresh", move || async move {
            tokio::task::yield_now().await;
            let _ = tx.send("refreshed");
            Ok(())
        });

        source.tick();
        assert_eq!(rx.await.unwrap(), "refreshed");
    }

    #[tokio::test]
    async fn tick_after_coalescer_dropped_is_harmless() {
        let (_main_loop, source, coalescer) = coalescer(IdleHookMode::Persistent);
        coalescer.subscribe_to_idle("a", || Ok(()));
        drop(coalescer);
        source.tick();
    }
}
