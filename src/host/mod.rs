//! Tauri host adapters.
//!
//! - `webview`: script channel and main-thread dispatcher over a Tauri app
//! - `commands`: `#[tauri::command]` entry points the UI invokes
//!
//! A host wires them up in `setup`:
//!
//! ```ignore
//! tauri::Builder::default()
//!     .setup(|app| {
//!         let window = app.get_webview_window("main").expect("main window");
//!         let bridge = uibridge::host::attach(&window, &uibridge::BridgeConfig::from_env()?);
//!         bridge.bind(std::sync::Arc::new(MyBinding))?;
//!         app.manage(bridge);
//!         Ok(())
//!     })
//!     .invoke_handler(tauri::generate_handler![
//!         uibridge::host::commands::get_bindings_method_names,
//!         uibridge::host::commands::run_method,
//!         uibridge::host::commands::get_call_result,
//!     ])
//! ```

pub mod commands;
mod webview;

pub use webview::{attach, TauriMainThread};
