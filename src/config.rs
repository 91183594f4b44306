//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through its environment variable,
//! so `WORKERS=4 bench_algo` behaves like `bench_algo --workers 4`.

use crate::fanout::{Executor, SHARD_SUBCOMMAND};
use crate::sensor::{SensorIndexing, DEFAULT_ITERATIONS, DEFAULT_SENSORS};
use crate::split::{RemainderPolicy, MAX_WORKERS};
use crate::telemetry::{DeviceCounting, DEFAULT_BATCH, DEFAULT_DEVICES, DEFAULT_TOTAL};
use clap::{Args, Parser, Subcommand};
use std::convert::Infallible;
use std::path::PathBuf;

/// Worker count from a loosely-typed value.
///
/// Anything that is not a positive integer falls back to one worker, and
/// counts above [`MAX_WORKERS`] are capped.
pub fn parse_workers(raw: &str) -> Result<usize, Infallible> {
    Ok(raw
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|&n| n > 0)
        .map_or(1, |n| usize::try_from(n).map_or(MAX_WORKERS, |n| n.min(MAX_WORKERS))))
}

/// Options shared by both benchmarks.
#[derive(Debug, Clone, Args)]
pub struct Parallelism {
    /// Number of parallel workers (invalid or non-positive values mean 1)
    #[arg(long, env = "WORKERS", default_value = "1", value_parser = parse_workers)]
    pub workers: usize,

    /// How workers are scheduled
    #[arg(long, env = "BENCH_EXECUTOR", value_enum, default_value_t = Executor::Threads)]
    pub executor: Executor,

    /// Leftover units when the total does not divide evenly; `drop` skips
    /// them like the reference benchmarks do
    #[arg(long, env = "REMAINDER", value_enum, default_value_t = RemainderPolicy::Drop)]
    pub remainder: RemainderPolicy,

    /// Binary the `processes` executor launches for each shard (defaults to
    /// the running binary); it must accept the hidden `shard` subcommand
    #[arg(long, env = "BENCH_WORKER_PROGRAM")]
    pub worker_program: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum WorkerCommand {
    /// Run a single shard from a JSON task and print its partial result
    #[command(name = SHARD_SUBCOMMAND, hide = true)]
    Shard { task: String },
}

/// Whether this process coordinates a run or executes one shard of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Coordinate,
    RunShard(String),
}

impl From<Option<WorkerCommand>> for RunMode {
    fn from(command: Option<WorkerCommand>) -> Self {
        match command {
            Some(WorkerCommand::Shard { task }) => RunMode::RunShard(task),
            None => RunMode::Coordinate,
        }
    }
}

/// Monte Carlo sensor risk benchmark
#[derive(Debug, Parser)]
#[command(name = "bench_algo", version)]
pub struct AlgoCli {
    #[command(subcommand)]
    pub command: Option<WorkerCommand>,

    /// Number of simulated sensors
    #[arg(long, env = "SENSORS", default_value_t = DEFAULT_SENSORS)]
    pub sensors: u64,

    /// Monte Carlo iterations per sensor
    #[arg(
        long,
        env = "ITERATIONS",
        default_value_t = DEFAULT_ITERATIONS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub iterations: u32,

    /// Which generator indices each worker draws sensors from; `local`
    /// restarts at 0 in every worker like the reference benchmarks do
    #[arg(long, env = "SENSOR_INDEX", value_enum, default_value_t = SensorIndexing::Local)]
    pub sensor_index: SensorIndexing,

    /// Untimed warmup rounds before the measured run
    #[arg(long, env = "WARMUP", default_value_t = 0)]
    pub warmup: u32,

    #[command(flatten)]
    pub parallel: Parallelism,
}

/// JSON telemetry parse/validate/aggregate benchmark
#[derive(Debug, Parser)]
#[command(name = "bench_telemetry", version)]
pub struct TelemetryCli {
    #[command(subcommand)]
    pub command: Option<WorkerCommand>,

    /// Total records to generate and process
    #[arg(long, env = "TOTAL", default_value_t = DEFAULT_TOTAL)]
    pub total: u64,

    /// Records generated and parsed per batch
    #[arg(
        long,
        env = "BATCH",
        default_value_t = DEFAULT_BATCH,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub batch: u64,

    /// Size of the device id space (`dev-0` .. `dev-{n-1}`)
    #[arg(
        long,
        env = "DEVICES",
        default_value_t = DEFAULT_DEVICES,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub devices: u64,

    /// How devices are counted across workers; `per-shard` sums each
    /// worker's count like the reference benchmarks do
    #[arg(long, env = "DEVICE_COUNT", value_enum, default_value_t = DeviceCounting::PerShard)]
    pub device_count: DeviceCounting,

    #[command(flatten)]
    pub parallel: Parallelism,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definitions_are_valid() {
        AlgoCli::command().debug_assert();
        TelemetryCli::command().debug_assert();
    }

    #[test]
    fn test_parse_workers_guards_bad_values() {
        assert_eq!(parse_workers("4"), Ok(4));
        assert_eq!(parse_workers(" 2 "), Ok(2));
        assert_eq!(parse_workers("0"), Ok(1));
        assert_eq!(parse_workers("-3"), Ok(1));
        assert_eq!(parse_workers("lots"), Ok(1));
        assert_eq!(parse_workers(""), Ok(1));
    }

    #[test]
    fn test_parse_workers_caps_huge_values() {
        assert_eq!(parse_workers("9223372036854775807"), Ok(MAX_WORKERS));
        assert_eq!(parse_workers("1025"), Ok(MAX_WORKERS));
        assert_eq!(parse_workers("1024"), Ok(1024));
        // Beyond i64 is not a number at all.
        assert_eq!(parse_workers("99999999999999999999"), Ok(1));
    }

    #[test]
    fn test_algo_flags() {
        let cli = AlgoCli::try_parse_from([
            "bench_algo",
            "--sensors",
            "8",
            "--iterations",
            "10",
            "--workers",
            "3",
            "--executor",
            "tasks",
            "--remainder",
            "spread",
        ])
        .unwrap();
        assert_eq!(cli.sensors, 8);
        assert_eq!(cli.iterations, 10);
        assert_eq!(cli.parallel.workers, 3);
        assert_eq!(cli.parallel.executor, Executor::Tasks);
        assert_eq!(cli.parallel.remainder, RemainderPolicy::Spread);
        assert_eq!(cli.sensor_index, SensorIndexing::Local);
        assert_eq!(cli.parallel.worker_program, None);
        assert_eq!(RunMode::from(cli.command), RunMode::Coordinate);
    }

    #[test]
    fn test_global_indexing_and_worker_program_flags() {
        let cli = AlgoCli::try_parse_from([
            "bench_algo",
            "--sensor-index",
            "global",
            "--worker-program",
            "/usr/local/bin/bench_algo",
        ])
        .unwrap();
        assert_eq!(cli.sensor_index, SensorIndexing::Global);
        assert_eq!(
            cli.parallel.worker_program,
            Some(PathBuf::from("/usr/local/bin/bench_algo"))
        );
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(AlgoCli::try_parse_from(["bench_algo", "--iterations", "0"]).is_err());
        assert!(TelemetryCli::try_parse_from(["bench_telemetry", "--batch", "0"]).is_err());
    }

    #[test]
    fn test_shard_subcommand() {
        let cli = TelemetryCli::try_parse_from(["bench_telemetry", "shard", "{}"]).unwrap();
        assert_eq!(RunMode::from(cli.command), RunMode::RunShard("{}".to_string()));
    }

    #[test]
    fn test_telemetry_flags() {
        let cli = TelemetryCli::try_parse_from([
            "bench_telemetry",
            "--total",
            "500",
            "--device-count",
            "distinct",
        ])
        .unwrap();
        assert_eq!(cli.total, 500);
        assert_eq!(cli.device_count, DeviceCounting::Distinct);
    }
}
