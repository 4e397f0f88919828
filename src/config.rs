use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const BOUND_NAME_ENV: &str = "UIBRIDGE_BOUND_NAME";
pub const MAX_CONCURRENT_CALLS_ENV: &str = "UIBRIDGE_MAX_CONCURRENT_CALLS";
pub const IDLE_HOOK_ENV: &str = "UIBRIDGE_IDLE_HOOK";
pub const LOG_FILTER_ENV: &str = "UIBRIDGE_LOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

/// What the idle coalescer does with the host's idle hook after a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdleHookMode {
    /// Detach once the pending map drains; reattach on the next registration.
    #[default]
    UnhookWhenDrained,
    /// Attach on first registration and stay attached.
    Persistent,
}

impl IdleHookMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnhookWhenDrained => "unhook-when-drained",
            Self::Persistent => "persistent",
        }
    }
}

impl std::fmt::Display for IdleHookMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IdleHookMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unhook-when-drained" | "unhook_when_drained" | "unhook" => Ok(Self::UnhookWhenDrained),
            "persistent" | "keep" => Ok(Self::Persistent),
            _ => Err(format!("unsupported idle hook mode: {value}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Name of the UI-side object that scripts address.
    #[serde(default = "default_bound_name")]
    pub bound_name: String,
    /// Upper bound on bridge calls running at once. `0` means unbounded.
    #[serde(default)]
    pub max_concurrent_calls: usize,
    #[serde(default)]
    pub idle_hook_mode: IdleHookMode,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bound_name: default_bound_name(),
            max_concurrent_calls: 0,
            idle_hook_mode: IdleHookMode::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by any non-blank `UIBRIDGE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();

        if let Some(value) = read(BOUND_NAME_ENV) {
            config.bound_name = value;
        }
        if let Some(value) = read(MAX_CONCURRENT_CALLS_ENV) {
            config.max_concurrent_calls =
                value.parse().map_err(|e| ConfigError::InvalidValue {
                    key: MAX_CONCURRENT_CALLS_ENV,
                    message: format!("{value:?}: {e}"),
                })?;
        }
        if let Some(value) = read(IDLE_HOOK_ENV) {
            config.idle_hook_mode = value
                .parse()
                .map_err(|message| ConfigError::InvalidValue {
                    key: IDLE_HOOK_ENV,
                    message,
                })?;
        }
        if let Some(value) = read(LOG_FILTER_ENV) {
            config.log_filter = value;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !is_script_path(&self.bound_name) {
            return Err(ConfigError::InvalidValue {
                key: "boundName",
                message: format!("{:?} is not a script identifier path", self.bound_name),
            });
        }
        Ok(())
    }

    /// The call queue's concurrency bound, `None` when unbounded.
    pub fn call_concurrency(&self) -> Option<usize> {
        (self.max_concurrent_calls > 0).then_some(self.max_concurrent_calls)
    }
}

/// `foo`, `window.bridge`, `_app.$api`: dot-separated identifiers only, so
/// the name can be spliced into generated scripts unquoted.
fn is_script_path(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}

fn default_bound_name() -> String {
    "bridge".to_string()
}

fn default_log_filter() -> String {
    "uibridge=debug,info".to_string()
}
