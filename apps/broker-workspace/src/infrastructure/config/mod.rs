//! Configuration Module
//!
//! The JSON configuration tree, command-line flags and process settings for
//! the workspace.

mod assembly;
mod cli;
mod settings;

pub use assembly::{
    AssemblyConfig, ChartsSetting, ConfigError, DEFAULT_PROMPT, DepthSetting, FeedSetting,
    OneOrMany, PaperSettings, QuoteSetting, ReplSetting, merge,
};
pub use cli::Cli;
pub use settings::WorkspaceSettings;
