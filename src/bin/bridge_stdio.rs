//! Host-less bridge harness.
//!
//! Reads one request per line on stdin and plays the UI side against a
//! demo calculator binding:
//!
//! ```text
//! add r1 ["3","4"]
//! divide r2 ["1","0"]
//! echo r3 ["\"hello\""]
//! :methods
//! :emit saved {"id":7}
//! :main
//! ```
//!
//! Every script the bridge would run in the web view is printed, and every
//! `responseReady` is answered with `get_call_result`.

use std::io::BufRead;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use uibridge::{
    Binding, BoxError, Bridge, BridgeConfig, EventContext, ExceptionBoundary, MainLoop,
    MainLoopHandle, MethodTable, MethodTableBuilder, ScriptChannel, ScriptError, ThreadContext,
};

struct Calculator {
    bridge: String,
}

impl Calculator {
    fn divide(&self, a: f64, b: f64) -> Result<f64, BoxError> {
        if b == 0.0 {
            return Err("division by zero".into());
        }
        Ok(a / b)
    }
}

impl Binding for Calculator {
    fn bridge_name(&self) -> &str {
        &self.bridge
    }

    fn methods(self: Arc<Self>) -> MethodTable {
        MethodTableBuilder::new(self)
            .method("add", |_: &Calculator, (a, b): (i64, i64)| Ok(a + b))
            .method("divide", |calc: &Calculator, (a, b): (f64, f64)| calc.divide(a, b))
            .async_method("echo", |_: Arc<Calculator>, (text,): (String,)| async move {
                tokio::task::yield_now().await;
                Ok(text)
            })
            .build()
    }
}

/// Prints scripts and forwards ready ids to the result printer.
struct StdoutScripts {
    ready: Mutex<mpsc::Sender<String>>,
}

impl ScriptChannel for StdoutScripts {
    fn execute_script(&self, script: &str) -> Result<(), ScriptError> {
        println!("script {script}");
        if let Some(id) = ready_id(script) {
            self.ready
                .lock()
                .expect("script sender mutex poisoned")
                .send(id)
                .map_err(|_| ScriptError::Unavailable)?;
        }
        Ok(())
    }
}

/// Last single-quoted argument of a `responseReady`/`emitResponseReady` call.
fn ready_id(script: &str) -> Option<String> {
    if !script.contains(".responseReady(") && !script.contains(".emitResponseReady(") {
        return None;
    }
    let end = script.rfind('\'')?;
    let start = script[..end].rfind('\'')? + 1;
    Some(script[start..end].to_string())
}

fn main() -> ExitCode {
    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("bridge_stdio: {e}");
            return ExitCode::FAILURE;
        }
    };
    uibridge::init_tracing(&config.log_filter);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bridge_stdio failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: BridgeConfig) -> Result<(), uibridge::Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let (main_loop, main_handle) = MainLoop::capture();
    let thread = ThreadContext::new(Arc::new(main_handle.clone()), runtime.handle().clone());
    let context = EventContext::new(thread, ExceptionBoundary::new("bridge_stdio"));

    let (ready_tx, ready_rx) = mpsc::channel();
    let scripts = Arc::new(StdoutScripts {
        ready: Mutex::new(ready_tx),
    });
    let bridge = Bridge::new(&config, scripts, context);
    bridge.bind(Arc::new(Calculator {
        bridge: config.bound_name.clone(),
    }))?;

    let outstanding = Arc::new(AtomicUsize::new(0));

    // Detached: the bridge it holds keeps the ready channel open.
    {
        let bridge = bridge.clone();
        let outstanding = outstanding.clone();
        thread::Builder::new()
            .name("result-printer".into())
            .spawn(move || {
                for id in ready_rx {
                    match bridge.get_call_result(&id) {
                        Ok(payload) => println!("result {id} {payload}"),
                        Err(e) => println!("error {id} {e}"),
                    }
                    outstanding.fetch_sub(1, Ordering::SeqCst);
                }
            })?;
    }

    let reader = {
        let bridge = bridge.clone();
        let outstanding = outstanding.clone();
        thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || read_requests(&bridge, &outstanding, &main_handle))?
    };

    main_loop.run();

    let _ = reader.join();
    drop(bridge);
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}

fn read_requests(bridge: &Bridge, outstanding: &AtomicUsize, main: &MainLoopHandle) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("failed to read stdin: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        handle_line(bridge, outstanding, line);
    }

    while outstanding.load(Ordering::SeqCst) > 0 {
        thread::sleep(Duration::from_millis(10));
    }
    main.stop();
}

fn handle_line(bridge: &Bridge, outstanding: &AtomicUsize, line: &str) {
    let mut parts = line.splitn(3, ' ');
    let head = parts.next().unwrap_or_default();

    match head {
        ":methods" => match bridge.get_bindings_method_names() {
            Ok(names) => println!("methods {}", names.join(",")),
            Err(e) => println!("error - {e}"),
        },
        ":main" => bridge.run_on_main_thread(|| {
            let name = thread::current().name().unwrap_or("unnamed").to_string();
            println!("main {name}");
            Ok(())
        }),
        ":emit" => {
            let event = parts.next().unwrap_or("event");
            let sent = match parts.next() {
                Some(raw) => {
                    outstanding.fetch_add(1, Ordering::SeqCst);
                    let sent = serde_json::from_str::<serde_json::Value>(raw)
                        .map_err(uibridge::BridgeError::from)
                        .and_then(|data| bridge.send_with(event, &data))
                        .map(drop);
                    if sent.is_err() {
                        outstanding.fetch_sub(1, Ordering::SeqCst);
                    }
                    sent
                }
                None => bridge.send(event),
            };
            if let Err(e) = sent {
                println!("error {event} {e}");
            }
        }
        method => {
            let request_id = parts.next().unwrap_or("0");
            let args = parts.next().unwrap_or("");
            outstanding.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = bridge.run_method(method, request_id, args) {
                outstanding.fetch_sub(1, Ordering::SeqCst);
                println!("error {request_id} {e}");
            }
        }
    }
}
