//! Native-side messaging core for plugin UIs backed by an embedded web view.
//!
//! This crate handles the two generic problems every host integration has:
//! - Invoking native operations from the UI and returning results asynchronously
//! - Broadcasting native state changes to many listeners, each with its own
//!   thread affinity, without keeping those listeners alive forever
//!
//! # Architecture
//!
//! - `boundary`: Exception boundary separating recoverable failures from fatal ones
//! - `threading`: Main-thread capture, worker dispatch, thread affinity
//! - `bus`: Event channels, aggregator, one-time/periodic events, idle coalescing
//! - `bridge`: RPC dispatcher exposing one binding's methods to the UI
//! - `config`: Environment/JSON configuration
//! - `host`: Tauri adapters (behind the `tauri` feature)
//!
//! Calls flow UI → `Bridge::run_method` → call queue → binding method →
//! result cache → `responseReady` script → UI pulls `get_call_result`.

pub mod boundary;
pub mod bridge;
pub mod bus;
pub mod config;
#[cfg(feature = "tauri")]
pub mod host;
pub mod threading;

use serde::Serialize;

pub use boundary::{raise_fatal, BoxError, ExceptionBoundary, Failure, Fatal};
pub use bridge::{
    Binding, Bridge, BridgeError, CallQueue, ErrorKind, MethodTable, MethodTableBuilder,
    ScriptChannel, ScriptError,
};
pub use bus::{
    BusError, Delegate, DelegateReference, Event, EventAggregator, EventChannel, EventContext,
    IdleCallCoalescer, IdleHook, IdleSource, OneTimeEvent, PeriodicEvent, SubscriptionOptions,
    SubscriptionToken,
};
pub use config::{BridgeConfig, ConfigError, IdleHookMode};
pub use threading::{MainLoop, MainLoopHandle, MainThreadDispatcher, ThreadAffinity, ThreadContext};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Bus(#[from] BusError),
    #[error("{0}")]
    Bridge(#[from] BridgeError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Serialize for Error {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used. Safe to call
/// more than once: later calls are ignored.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
