//! Assembly Configuration
//!
//! The JSON configuration tree describing what to subscribe. Each key
//! accepts a few shapes (flag, single value, list, options object); they
//! are normalized into an [`AssemblyPlan`] before assembly runs.
//!
//! Multiple files are deep-merged left to right: objects merge key by key,
//! anything else in a later file replaces the earlier value.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::application::ports::{FeedOptions, Study};
use crate::application::services::{
    AssemblyPlan, ChartOptions, DepthOptions, FanoutOptions, QuoteOptions,
};

/// Prompt used when `repl` is `true` or absent.
pub const DEFAULT_PROMPT: &str = "> ";

// =============================================================================
// Shapes
// =============================================================================

/// A single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    /// One value.
    One(String),
    /// Several values.
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl OneOrMany {
    /// Normalize into a list.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// Session parameter a bare feed id is passed as.
const FEED_ID_PARAM: &str = "id";

/// `true`, `false`, an account id or a feed options object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedSetting {
    /// Enable with defaults, or disable.
    Flag(bool),
    /// Enable for one account id.
    Id(String),
    /// Enable with options.
    Options(FeedOptions),
}

impl FeedSetting {
    fn into_options(self) -> Option<FeedOptions> {
        match self {
            Self::Flag(true) => Some(FeedOptions::default()),
            Self::Flag(false) => None,
            Self::Id(id) => {
                let mut options = FeedOptions::default();
                options
                    .params
                    .insert(FEED_ID_PARAM.to_string(), Value::String(id));
                Some(options)
            }
            Self::Options(options) => Some(options),
        }
    }
}

/// Quote configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuoteSetting {
    /// Enable with defaults, or disable.
    Flag(bool),
    /// Extra field types.
    Fields(Vec<String>),
    /// Tick types and field types.
    Options {
        /// Tick types to enable.
        #[serde(default)]
        types: Vec<String>,
        /// Field types to add.
        #[serde(default)]
        fields: Vec<String>,
    },
}

/// Depth configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DepthSetting {
    /// Enable with defaults, or disable.
    Flag(bool),
    /// Number of rows at the default exchange.
    Rows(u32),
    /// Exchanges and rows.
    Options {
        /// Exchanges to stream.
        #[serde(default)]
        exchanges: OneOrMany,
        /// Book rows.
        #[serde(default)]
        rows: Option<u32>,
    },
}

/// Charts configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartsSetting {
    /// Enable with defaults, or disable.
    Flag(bool),
    /// Studies and historicals.
    Options {
        /// Studies as `[name, args...]` arrays.
        #[serde(default)]
        studies: Vec<Study>,
        /// Bar sizes whose history is fetched.
        #[serde(default)]
        historicals: OneOrMany,
    },
}

/// Shell configuration: on/off or a custom prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplSetting {
    /// Enable with the default prompt, or disable.
    Flag(bool),
    /// Enable with this prompt.
    Prompt(String),
}

/// Settings for the paper session adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaperSettings {
    /// Whether markets are open when the session starts.
    pub markets_open: bool,
    /// Open closed markets this many seconds after start.
    pub opens_in_secs: Option<u64>,
    /// Symbols whose lookup fails.
    pub unknown: Vec<String>,
    /// Fundamental report names that fail.
    pub failing_reports: Vec<String>,
    /// Simulated latency per request.
    pub latency_ms: u64,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            markets_open: true,
            opens_in_secs: None,
            unknown: Vec::new(),
            failing_reports: Vec::new(),
            latency_ms: 0,
        }
    }
}

// =============================================================================
// Configuration Tree
// =============================================================================

/// The full configuration tree as written in JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssemblyConfig {
    /// Account feed.
    pub account: Option<FeedSetting>,
    /// Account summary feed.
    pub account_summary: Option<FeedSetting>,
    /// Positions feed.
    pub positions: Option<FeedSetting>,
    /// Stream order updates.
    pub orders: bool,
    /// Trades feed.
    pub trades: Option<FeedSetting>,
    /// Security descriptions.
    pub securities: Option<OneOrMany>,
    /// Curve symbols.
    pub curves: Option<OneOrMany>,
    /// Option chain underlyings.
    pub option_chains: Option<OneOrMany>,
    /// Quote subscription.
    pub quote: Option<QuoteSetting>,
    /// Depth subscription.
    pub depth: Option<DepthSetting>,
    /// Chart subscription.
    pub charts: Option<ChartsSetting>,
    /// Fundamental report names.
    pub fundamentals: Option<OneOrMany>,
    /// Serve frozen market data.
    pub frozen: bool,
    /// Interactive shell.
    pub repl: Option<ReplSetting>,
    /// Paper session adapter settings.
    pub paper: PaperSettings,
}

impl AssemblyConfig {
    /// Parse a configuration tree from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Shape`] if a key has an unsupported shape.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(ConfigError::Shape)
    }

    /// Load and deep-merge configuration files, left to right.
    ///
    /// No files yields the default (empty) configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read, is not a JSON object, or
    /// the merged tree has an unsupported shape.
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        Self::load_layers(Value::Object(Map::new()), paths)
    }

    /// Deep-merge configuration files over `base`, left to right.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read, is not a JSON object, or
    /// the merged tree has an unsupported shape.
    pub fn load_layers<P: AsRef<Path>>(base: Value, paths: &[P]) -> Result<Self, ConfigError> {
        let mut merged = base;
        for path in paths {
            let path = path.as_ref();
            let overlay = read_object(path)?;
            tracing::debug!(path = %path.display(), keys = overlay.len(), "Config file loaded");
            merge(&mut merged, Value::Object(overlay));
        }
        Self::from_value(merged)
    }

    /// Normalize into the plan the assembler runs.
    #[must_use]
    pub fn plan(&self) -> AssemblyPlan {
        let cloned = self.clone();
        AssemblyPlan {
            account: cloned.account.and_then(FeedSetting::into_options),
            account_summary: cloned.account_summary.and_then(FeedSetting::into_options),
            positions: cloned.positions.and_then(FeedSetting::into_options),
            orders: cloned.orders,
            trades: cloned.trades.and_then(FeedSetting::into_options),
            securities: list(cloned.securities),
            curves: list(cloned.curves),
            option_chains: list(cloned.option_chains),
            frozen: cloned.frozen,
            fanout: FanoutOptions {
                charts: cloned.charts.and_then(chart_options),
                quote: cloned.quote.and_then(quote_options),
                depth: cloned.depth.and_then(depth_options),
                fundamentals: list(cloned.fundamentals),
            },
        }
    }

    /// Shell prompt, or `None` when the shell is disabled.
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        match &self.repl {
            None | Some(ReplSetting::Flag(true)) => Some(DEFAULT_PROMPT),
            Some(ReplSetting::Flag(false)) => None,
            Some(ReplSetting::Prompt(prompt)) => Some(prompt.as_str()),
        }
    }
}

fn list(value: Option<OneOrMany>) -> Vec<String> {
    value.map(OneOrMany::into_vec).unwrap_or_default()
}

fn quote_options(setting: QuoteSetting) -> Option<QuoteOptions> {
    match setting {
        QuoteSetting::Flag(false) => None,
        QuoteSetting::Flag(true) => Some(QuoteOptions::default()),
        QuoteSetting::Fields(fields) => Some(QuoteOptions {
            types: Vec::new(),
            fields,
        }),
        QuoteSetting::Options { types, fields } => Some(QuoteOptions { types, fields }),
    }
}

fn depth_options(setting: DepthSetting) -> Option<DepthOptions> {
    match setting {
        DepthSetting::Flag(false) => None,
        DepthSetting::Flag(true) => Some(DepthOptions::default()),
        DepthSetting::Rows(rows) => Some(DepthOptions {
            exchanges: Vec::new(),
            rows: Some(rows),
        }),
        DepthSetting::Options { exchanges, rows } => Some(DepthOptions {
            exchanges: exchanges.into_vec(),
            rows,
        }),
    }
}

fn chart_options(setting: ChartsSetting) -> Option<ChartOptions> {
    match setting {
        ChartsSetting::Flag(false) => None,
        ChartsSetting::Flag(true) => Some(ChartOptions::default()),
        ChartsSetting::Options {
            studies,
            historicals,
        } => Some(ChartOptions {
            studies,
            historicals: historicals.into_vec(),
        }),
    }
}

// =============================================================================
// Loading
// =============================================================================

fn read_object(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str(&text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ConfigError::NotAnObject(path.to_path_buf())),
        Err(source) => Err(ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Deep-merge `overlay` into `base`.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// I/O error.
        source: std::io::Error,
    },
    /// A configuration file is not valid JSON.
    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// JSON error.
        source: serde_json::Error,
    },
    /// A configuration file's root is not a JSON object.
    #[error("{} must contain a JSON object", .0.display())]
    NotAnObject(PathBuf),
    /// A key has an unsupported shape.
    #[error("invalid configuration: {0}")]
    Shape(#[source] serde_json::Error),
}

// =============================================================================
// Tests
// =============================================================================
