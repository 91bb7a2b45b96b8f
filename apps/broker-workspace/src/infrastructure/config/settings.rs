//! Process Settings
//!
//! Settings for the workspace binary, loaded from environment variables.
//! These override the matching keys of the configuration tree.

use super::{AssemblyConfig, ReplSetting};

/// Process-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceSettings {
    /// Force the shell on or off (`WORKSPACE_REPL`).
    pub repl: Option<bool>,
    /// Force frozen market data on or off (`WORKSPACE_FROZEN`).
    pub frozen: Option<bool>,
    /// Install the Prometheus recorder (`WORKSPACE_METRICS`).
    pub metrics: bool,
}

impl WorkspaceSettings {
    /// Create settings from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            repl: parse_env_bool("WORKSPACE_REPL"),
            frozen: parse_env_bool("WORKSPACE_FROZEN"),
            metrics: parse_env_bool("WORKSPACE_METRICS").unwrap_or(false),
        }
    }

    /// Apply the overrides to a configuration tree.
    pub fn apply(&self, config: &mut AssemblyConfig) {
        if let Some(frozen) = self.frozen {
            config.frozen = frozen;
        }
        match self.repl {
            Some(false) => config.repl = Some(ReplSetting::Flag(false)),
            Some(true) if config.repl == Some(ReplSetting::Flag(false)) => {
                config.repl = Some(ReplSetting::Flag(true));
            }
            _ => {}
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| parse_bool(&v))
}
