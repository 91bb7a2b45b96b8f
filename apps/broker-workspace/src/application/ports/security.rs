//! Security handle and its streaming capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BrokerResult;
use crate::domain::market::Contract;

/// A chart study: a study name followed by its positional arguments.
///
/// Deserializes from a JSON array such as `["SMA", 20]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct Study {
    /// Study name.
    pub name: String,
    /// Positional study arguments.
    pub args: Vec<Value>,
}

impl TryFrom<Vec<Value>> for Study {
    type Error = String;

    fn try_from(params: Vec<Value>) -> Result<Self, Self::Error> {
        let mut params = params.into_iter();
        match params.next() {
            Some(Value::String(name)) => Ok(Self {
                name,
                args: params.collect(),
            }),
            Some(other) => Err(format!("study name must be a string, got {other}")),
            None => Err("study must name at least the study".to_string()),
        }
    }
}

impl From<Study> for Vec<Value> {
    fn from(study: Study) -> Self {
        std::iter::once(Value::String(study.name))
            .chain(study.args)
            .collect()
    }
}

/// Top-of-book quote capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Quote: Send + Sync {
    /// Enable an additional quote tick type (e.g. `"ticks"`, `"volatility"`).
    fn enable(&self, tick_type: &str) -> BrokerResult<()>;

    /// Request additional generic field types.
    fn add_field_types(&self, fields: &[String]);

    /// Start streaming; resolves on the first load or error.
    async fn stream(&self) -> BrokerResult<()>;

    /// One-shot snapshot query.
    async fn query(&self) -> BrokerResult<()>;
}

/// Market depth (order book) capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Depth: Send + Sync {
    /// Start streaming depth; resolves on the first update or error.
    async fn stream(&self, exchanges: &[String], rows: Option<u32>) -> BrokerResult<()>;
}

/// Bar chart capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Charts: Send + Sync {
    /// Apply a study to every existing bar-size bucket.
    fn study(&self, study: &Study);

    /// Start streaming bars; resolves on the first update or error.
    async fn stream(&self) -> BrokerResult<()>;

    /// Fetch history for one bar size (e.g. `"5 mins"`).
    async fn history(&self, bar_size: &str) -> BrokerResult<()>;
}

/// Fundamental data reports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fundamentals: Send + Sync {
    /// Fetch one named report (e.g. `"snapshot"`, `"statements"`).
    async fn report(&self, name: &str) -> BrokerResult<()>;
}

/// A resolved, tradable instrument.
///
/// Capabilities are optional; a security that does not support one
/// returns `None` and the subscription fan-out skips it.
pub trait Security: Send + Sync {
    /// Contract metadata and market hours.
    fn contract(&self) -> &Contract;

    /// Quote capability.
    fn quote(&self) -> Option<Arc<dyn Quote>>;

    /// Depth capability.
    fn depth(&self) -> Option<Arc<dyn Depth>>;

    /// Charts capability.
    fn charts(&self) -> Option<Arc<dyn Charts>>;

    /// Fundamentals capability.
    fn fundamentals(&self) -> Option<Arc<dyn Fundamentals>>;

    /// Cancel every live subscription held by this security.
    fn cancel(&self) -> Option<BrokerResult<()>>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn study_from_array() {
        let study: Study = serde_json::from_value(json!(["SMA", 20, "close"])).unwrap();
        assert_eq!(study.name, "SMA");
        assert_eq!(study.args, vec![json!(20), json!("close")]);
    }

    #[test]
    fn study_requires_name() {
        assert!(serde_json::from_value::<Study>(json!([])).is_err());
        assert!(serde_json::from_value::<Study>(json!([20])).is_err());
    }

    #[test]
    fn study_serializes_back_to_array() {
        let study = Study {
            name: "EMA".to_string(),
            args: vec![json!(9)],
        };
        assert_eq!(serde_json::to_value(study).unwrap(), json!(["EMA", 9]));
    }
}
