use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Execution queue for inbound calls, decoupled from the caller.
///
/// Each call gets its own task; with a bound, at most that many run at once
/// and the rest wait for a permit. No ordering holds between calls.
#[derive(Debug, Clone)]
pub struct CallQueue {
    runtime: Handle,
    permits: Option<Arc<Semaphore>>,
    max_concurrent: Option<usize>,
}

impl CallQueue {
    pub fn new(runtime: Handle, max_concurrent: Option<usize>) -> Self {
        let max_concurrent = max_concurrent.filter(|&n| n > 0);
        Self {
            runtime,
            permits: max_concurrent.map(|n| Arc::new(Semaphore::new(n))),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> Option<usize> {
        self.max_concurrent
    }

    pub fn submit<F>(&self, call: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.runtime.spawn(async move {
            let _permit = match permits {
                // The semaphore is never closed.
                Some(permits) => permits.acquire_owned().await.ok(),
                None => None,
            };
            call.await;
        })
    }
}
