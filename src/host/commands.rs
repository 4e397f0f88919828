//! UI-facing bridge commands

use crate::bridge::{Bridge, BridgeError};

#[tauri::command]
pub fn get_bindings_method_names(state: tauri::State<'_, Bridge>) -> Result<Vec<String>, BridgeError> {
    state.get_bindings_method_names()
}

#[tauri::command]
pub fn run_method(
    state: tauri::State<'_, Bridge>,
    method_name: String,
    request_id: String,
    args_json: String,
) -> Result<(), BridgeError> {
    state.run_method(&method_name, &request_id, &args_json)
}

#[tauri::command]
pub fn get_call_result(state: tauri::State<'_, Bridge>, request_id: String) -> Result<String, BridgeError> {
    state.get_call_result(&request_id)
}
