//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Scheduler`: coalesces timed callbacks by timestamp
//! - `Environment`: workspace registry façade over a session
//! - `SubscriptionAssembler`: ordered assembly of a configuration plan
//! - `Fanout`: concurrent per-security subscriptions
//! - `setup`: session flags, environment and assembly in one call

mod assembler;
mod environment;
mod fanout;
mod scheduler;
mod setup;

pub use assembler::{AssemblyPlan, AssemblySummary, SubscriptionAssembler};
pub use environment::Environment;
pub use fanout::{ChartOptions, DepthOptions, Fanout, FanoutOptions, QuoteOptions};
pub use scheduler::{Deadline, Scheduler};
pub use setup::setup;
