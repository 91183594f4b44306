// Telemetry Benchmark: JSON parse / validate / enrich / aggregate / checksum
// Usage:
//   bench_telemetry                             # single thread
//   WORKERS=4 bench_telemetry                   # 4 workers on a rayon pool
//   WORKERS=4 DEVICE_COUNT=distinct bench_telemetry
//
// Per record: serde_json parse, type checks on required fields, alarm
// flag, per-device counters, FNV-1a over the raw line.

use clap::Parser;
use iot_bench::config::{RunMode, TelemetryCli};
use iot_bench::fanout::{self, fan_out};
use iot_bench::reduce::{self, RunShape};
use iot_bench::split::ShardPlan;
use iot_bench::telemetry::TelemetryWorkload;
use iot_bench::Result;
use log::warn;
use std::process;
use std::time::Instant;

fn coordinate(cli: &TelemetryCli) -> Result<String> {
    let parallel = &cli.parallel;
    let plan = ShardPlan::new(cli.total, parallel.workers, parallel.remainder);
    if plan.dropped() > 0 {
        warn!(
            "{} of {} records dropped: not divisible across {} workers",
            plan.dropped(),
            cli.total,
            plan.workers()
        );
    }

    let shape = RunShape {
        workers: plan.workers(),
        executor: parallel.executor,
    };
    let workload = TelemetryWorkload {
        batch: cli.batch,
        devices: cli.devices,
        counting: cli.device_count,
    };

    let start = Instant::now();
    let partials = fan_out(
        parallel.executor,
        parallel.worker_program.as_deref(),
        &workload,
        plan.into_shards(),
    )?;
    let elapsed = start.elapsed();

    reduce::to_line(&reduce::reduce_telemetry(&partials, shape, cli.device_count, elapsed))
}

fn main() {
    iot_bench::init_logging();
    let mut cli = TelemetryCli::parse();

    let result = match RunMode::from(cli.command.take()) {
        RunMode::Coordinate => coordinate(&cli),
        RunMode::RunShard(task) => fanout::run_shard_task::<TelemetryWorkload>(&task),
    };

    match result {
        Ok(line) => println!("{line}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
