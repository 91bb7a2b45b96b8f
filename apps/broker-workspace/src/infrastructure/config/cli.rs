//! Command-Line Flags
//!
//! Flags describe a configuration tree of their own. Files named on the
//! command line are deep-merged over it left to right, so a file wins over
//! a flag for the same key.
//!
//! ```bash
//! broker-workspace -a -e AAPL,MSFT -q -d 10 --norepl base.json
//! ```
//!
//! Flags with an optional value (`-a`, `-q`, `-u`, `-d`) take the next word
//! when it does not start with `-`; put files before them or after `--`.

use std::path::PathBuf;

use clap::Parser;
use serde_json::{Map, Value};

use super::{AssemblyConfig, ConfigError};

/// Report fetched by a bare `-u`.
const DEFAULT_REPORT: &str = "snapshot";

/// Broker workspace command line.
#[derive(Debug, Default, Parser)]
#[command(
    name = "broker-workspace",
    version,
    about = "Broker session workspace",
    override_usage = "broker-workspace [OPTIONS] [FILES]..."
)]
pub struct Cli {
    /// Configuration files, deep-merged left to right over the flags
    pub files: Vec<PathBuf>,

    /// Stream account [id] or the first account found
    #[arg(short = 'a', long, num_args = 0..=1, value_name = "ID")]
    pub account: Option<Option<String>>,

    /// Stream account summary
    #[arg(short = 's', long)]
    pub summary: bool,

    /// Stream trades
    #[arg(short = 'x', long)]
    pub trades: bool,

    /// Stream orders
    #[arg(short = 'o', long)]
    pub orders: bool,

    /// Stream positions
    #[arg(short = 'b', long)]
    pub positions: bool,

    /// Load securities
    #[arg(short = 'e', long, value_name = "LIST")]
    pub securities: Option<String>,

    /// Load curves
    #[arg(short = 'c', long, value_name = "LIST")]
    pub curves: Option<String>,

    /// Load option chains
    #[arg(short = 'p', long, value_name = "LIST")]
    pub chains: Option<String>,

    /// Use frozen quote data
    #[arg(short = 'f', long)]
    pub frozen: bool,

    /// Stream quote with [list] of field types
    #[arg(short = 'q', long, num_args = 0..=1, value_name = "LIST")]
    pub quote: Option<Option<String>>,

    /// Load fundamental reports [list]
    #[arg(short = 'u', long, num_args = 0..=1, value_name = "LIST")]
    pub fundamentals: Option<Option<String>>,

    /// Load level2 quotes with [rows]
    #[arg(short = 'd', long, num_args = 0..=1, value_name = "ROWS")]
    pub depth: Option<Option<u32>>,

    /// Stream real-time bars
    #[arg(short = 'w', long)]
    pub charts: bool,

    /// No terminal interface
    #[arg(long)]
    pub norepl: bool,
}

impl Cli {
    /// The configuration tree the flags describe. Unset flags are absent.
    #[must_use]
    pub fn overrides(&self) -> Value {
        let mut tree = Map::new();
        let mut set = |key: &str, value: Value| {
            tree.insert(key.to_string(), value);
        };

        match &self.account {
            Some(Some(id)) => set("account", Value::String(id.clone())),
            Some(None) => set("account", Value::Bool(true)),
            None => {}
        }
        for (key, enabled) in [
            ("accountSummary", self.summary),
            ("trades", self.trades),
            ("orders", self.orders),
            ("positions", self.positions),
            ("frozen", self.frozen),
            ("charts", self.charts),
        ] {
            if enabled {
                set(key, Value::Bool(true));
            }
        }
        for (key, value) in [
            ("securities", &self.securities),
            ("curves", &self.curves),
            ("optionChains", &self.chains),
        ] {
            if let Some(items) = value.as_deref().map(list).filter(|items| !items.is_empty()) {
                set(key, Value::from(items));
            }
        }

        match self.quote.as_ref().map(|fields| fields.as_deref().map(list).unwrap_or_default()) {
            Some(fields) if !fields.is_empty() => set("quote", Value::from(fields)),
            Some(_) => set("quote", Value::Bool(true)),
            None => {}
        }
        if let Some(reports) = &self.fundamentals {
            let reports = list(reports.as_deref().unwrap_or(DEFAULT_REPORT));
            set("fundamentals", Value::from(reports));
        }
        match self.depth {
            Some(Some(rows)) => set("depth", Value::from(rows)),
            Some(None) => set("depth", Value::Bool(true)),
            None => {}
        }
        if self.norepl {
            set("repl", Value::Bool(false));
        }

        Value::Object(tree)
    }

    /// Build the configuration: flags first, then each file over them.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or the merged
    /// tree has an unsupported shape.
    pub fn load(&self) -> Result<AssemblyConfig, ConfigError> {
        AssemblyConfig::load_layers(self.overrides(), &self.files)
    }
}

/// Split `"a, b,,c"` into `["a", "b", "c"]`.
fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
