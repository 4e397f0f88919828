// tests/common/recording.rs
//! Script channel that records what the bridge asks the web view to run.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use uibridge::{ScriptChannel, ScriptError};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct RecordingScripts {
    scripts: Mutex<Vec<String>>,
    notify: Notify,
}

impl RecordingScripts {
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    /// Wait until a script containing `needle` has been executed.
    pub async fn wait_for(&self, needle: &str) -> String {
        let waiting = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(found) = self.find(needle) {
                    return found;
                }
                notified.await;
            }
        };

        tokio::time::timeout(WAIT_TIMEOUT, waiting)
            .await
            .unwrap_or_else(|_| panic!("no script containing {needle:?} within {WAIT_TIMEOUT:?}"))
    }

    fn find(&self, needle: &str) -> Option<String> {
        self.scripts
            .lock()
            .unwrap()
            .iter()
            .find(|script| script.contains(needle))
            .cloned()
    }
}

impl ScriptChannel for RecordingScripts {
    fn execute_script(&self, script: &str) -> Result<(), ScriptError> {
        self.scripts.lock().unwrap().push(script.to_string());
        self.notify.notify_waiters();
        Ok(())
    }
}
