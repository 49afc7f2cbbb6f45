//! # Configuration
//!
//! - [`OrchestratorConfig`]: process-level knobs read from the environment
//! - [`E2eConfig`]: the YAML e2e configuration (variables and intervals)
//! - [`SpecConfig`]: explicit per-spec configuration handed to setup, the test
//!   body and teardown

mod duration;
mod e2e;
mod orchestrator;
mod spec;

pub use duration::parse_kubernetes_duration;
pub use e2e::{E2eConfig, Intervals, IntervalsGetter};
pub use orchestrator::OrchestratorConfig;
pub use spec::{random_suffix, SpecConfig};
