//! Outbound scripts executed in the embedded UI.
//!
//! The bridge never pushes payloads through the script channel. It only runs
//! one of three fixed notification shapes, and the UI pulls the payload back
//! with `get_call_result`.

/// Host hook that runs a script inside the embedded web view.
pub trait ScriptChannel: Send + Sync {
    fn execute_script(&self, script: &str) -> Result<(), ScriptError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("web view is not available")]
    Unavailable,
    #[error("script execution failed: {0}")]
    Failed(String),
}

/// `{bound}.responseReady('{request_id}')`
pub fn response_ready(bound: &str, request_id: &str) -> String {
    format!("{bound}.responseReady('{}')", escape(request_id))
}

/// `{bound}.emitResponseReady('{event}', '{request_id}')`
pub fn emit_response_ready(bound: &str, event: &str, request_id: &str) -> String {
    format!(
        "{bound}.emitResponseReady('{}', '{}')",
        escape(event),
        escape(request_id)
    )
}

/// `{bound}.emit('{event}')`
pub fn emit(bound: &str, event: &str) -> String {
    format!("{bound}.emit('{}')", escape(event))
}

/// Escape a value for a single-quoted script string literal.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}
