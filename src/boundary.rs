//! Exception boundary.
//!
//! Every unit of user work (bound methods, subscriber callbacks, idle actions,
//! main-thread jobs) runs through an [`ExceptionBoundary`]. Two classes of
//! failure exist:
//!
//! - **Recoverable**: an `Err` returned by the work, or an ordinary panic.
//!   Logged at error level and handed back as a [`Failure`].
//! - **Fatal**: a panic whose payload is [`Fatal`]. Logged as critical and
//!   re-raised unchanged with [`std::panic::resume_unwind`] so the host decides
//!   whether to terminate.
//!
//! Genuine out-of-memory and stack overflow abort the process before any
//! unwinding happens, so they never reach this module.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;

/// Error type accepted from user work.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

const DEFAULT_SCOPE: &str = "uibridge";

/// Panic payload marking an unrecoverable condition.
#[derive(Debug, Clone)]
pub struct Fatal {
    reason: String,
}

impl Fatal {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal: {}", self.reason)
    }
}

/// Abort the current unit of work with a [`Fatal`] payload.
///
/// Boundaries rethrow this instead of converting it into a [`Failure`].
pub fn raise_fatal(reason: impl Into<String>) -> ! {
    panic::panic_any(Fatal::new(reason))
}

/// Returns true if a caught panic payload carries a [`Fatal`] marker.
pub fn is_fatal(payload: &(dyn Any + Send)) -> bool {
    payload.is::<Fatal>()
}

/// A recoverable failure captured by the boundary.
///
/// Carries three levels of detail so the UI can choose how much to show.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    /// Short, top-level message.
    pub message: String,
    /// The full `source()` chain, outermost first.
    pub details: String,
    /// Captured backtrace, or the error's debug form when backtraces are off.
    pub stack_trace: String,
    pub occurred_at: String,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            details: message.clone(),
            stack_trace: capture_trace(|| message.clone()),
            message,
            occurred_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut chain = vec![err.to_string()];
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        Self {
            message: err.to_string(),
            details: chain.join("\n  caused by: "),
            stack_trace: capture_trace(|| format!("{err:?}")),
            occurred_at: Utc::now().to_rfc3339(),
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = panic_message(payload);
        Self {
            details: format!("panicked: {message}"),
            stack_trace: capture_trace(|| format!("panic payload: {message}")),
            message,
            occurred_at: Utc::now().to_rfc3339(),
        }
    }

    /// Encode as the call-failure payload delivered to the UI.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({ "error": self })
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Failure {}

fn capture_trace(fallback: impl FnOnce() -> String) -> String {
    let trace = Backtrace::capture();
    match trace.status() {
        BacktraceStatus::Captured => trace.to_string(),
        _ => fallback(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Wraps units of work and classifies how they fail.
#[derive(Debug, Clone)]
pub struct ExceptionBoundary {
    scope: Arc<str>,
}

impl Default for ExceptionBoundary {
    fn default() -> Self {
        Self::new(DEFAULT_SCOPE)
    }
}

impl ExceptionBoundary {
    /// `scope` tags every log line this boundary emits.
    pub fn new(scope: &str) -> Self {
        Self {
            scope: Arc::from(scope),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Run synchronous work.
    pub fn run<T, F>(&self, work: F) -> Result<T, Failure>
    where
        F: FnOnce() -> Result<T, BoxError>,
    {
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(self.recoverable(Failure::from_error(err.as_ref()))),
            Err(payload) => Err(self.unwound(payload)),
        }
    }

    /// Run asynchronous work, catching panics raised while it is polled.
    pub async fn run_async<T, Fut>(&self, work: Fut) -> Result<T, Failure>
    where
        Fut: Future<Output = Result<T, BoxError>>,
    {
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(self.recoverable(Failure::from_error(err.as_ref()))),
            Err(payload) => Err(self.unwound(payload)),
        }
    }

    /// Run work whose caller has nowhere to put a `Result` (event handlers).
    ///
    /// Recoverable failures are logged and dropped; fatal ones still unwind.
    pub fn fire_and_forget<F>(&self, work: F)
    where
        F: FnOnce() -> Result<(), BoxError>,
    {
        let _ = self.run(work);
    }

    fn recoverable(&self, failure: Failure) -> Failure {
        tracing::error!(
            scope = %self.scope,
            error = %failure.details,
            "recoverable failure captured"
        );
        failure
    }

    fn unwound(&self, payload: Box<dyn Any + Send>) -> Failure {
        if let Some(fatal) = payload.downcast_ref::<Fatal>() {
            tracing::error!(
                scope = %self.scope,
                severity = "critical",
                reason = %fatal.reason(),
                "unrecoverable failure, rethrowing"
            );
            panic::resume_unwind(payload);
        }
        self.recoverable(Failure::from_panic(payload.as_ref()))
    }
}
