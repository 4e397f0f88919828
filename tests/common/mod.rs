// tests/common/mod.rs
//! Common test utilities for bridge and event bus integration tests.

pub mod main_thread;
pub mod recording;

pub use main_thread::{spawn_main_loop, test_context, MainThread};
pub use recording::RecordingScripts;
