//! CPU micro-benchmarks for cross-language performance comparison.
//!
//! Two workloads share one fan-out/fan-in harness:
//!
//! - [`sensor`]: Monte Carlo risk scoring over synthetic sensor readings
//! - [`telemetry`]: JSON parse, validate and aggregate over synthetic IoT events
//!
//! A run splits its units into shards ([`split`]), executes them on parallel
//! workers ([`fanout`]) and merges the partial results into one JSON line
//! ([`reduce`]).
//!
//! ```rust,no_run
//! use iot_bench::fanout::{fan_out, Executor};
//! use iot_bench::sensor::{RiskWorkload, SensorIndexing};
//! use iot_bench::split::{RemainderPolicy, ShardPlan};
//!
//! let plan = ShardPlan::new(100, 4, RemainderPolicy::Drop);
//! let workload = RiskWorkload {
//!     iterations: 50_000,
//!     tag_workers: true,
//!     indexing: SensorIndexing::Local,
//! };
//! let partials = fan_out(Executor::Threads, None, &workload, plan.into_shards()).unwrap();
//! assert_eq!(partials.len(), 4);
//! ```

#![warn(clippy::all)]

pub mod checksum;
pub mod config;
pub mod error;
pub mod fanout;
pub mod prng;
pub mod reduce;
pub mod sensor;
pub mod split;
pub mod telemetry;

pub use error::{BenchError, Result};

/// Installs the stderr logger. `RUST_LOG` overrides the default `warn` filter.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}
