//! RPC bridge between the native host and the embedded UI.
//!
//! # Call flow
//!
//! 1. UI calls `run_method(method, request_id, args_json)`
//! 2. The method table decodes arguments and the call is queued
//! 3. The call runs under the exception boundary; the encoded outcome lands
//!    in the result cache under `request_id`
//! 4. `{bound}.responseReady('{request_id}')` runs in the web view
//! 5. UI pulls the payload once with `get_call_result(request_id)`
//!
//! Native-initiated events reuse steps 3-5 through `Bridge::send_with`.

mod binding;
mod dispatcher;
mod error;
mod queue;
pub mod script;

pub use binding::{ArgumentError, Binding, CallFuture, FromArgs, MethodTable, MethodTableBuilder};
pub use dispatcher::Bridge;
pub use error::{BridgeError, ErrorKind};
pub use queue::CallQueue;
pub use script::{ScriptChannel, ScriptError};
