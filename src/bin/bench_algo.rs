// Algorithmic Benchmark: Monte Carlo simulation of IoT sensor failure risk
// Usage:
//   bench_algo                                  # single thread
//   WORKERS=4 bench_algo                        # 4 workers on a rayon pool
//   WORKERS=4 BENCH_EXECUTOR=processes bench_algo
//
// Prints one JSON line to stdout; diagnostics go to stderr.

use clap::Parser;
use iot_bench::config::{AlgoCli, RunMode};
use iot_bench::fanout::{self, fan_out};
use iot_bench::reduce::{self, RunShape};
use iot_bench::sensor::{self, RiskWorkload};
use iot_bench::split::ShardPlan;
use iot_bench::Result;
use log::{info, warn};
use std::process;
use std::time::Instant;

fn coordinate(cli: &AlgoCli) -> Result<String> {
    if cli.warmup > 0 {
        info!("warming up ({} rounds)", cli.warmup);
        sensor::warmup(cli.warmup);
        info!("warmup complete, starting benchmark");
    }

    let parallel = &cli.parallel;
    let plan = ShardPlan::new(cli.sensors, parallel.workers, parallel.remainder);
    if plan.dropped() > 0 {
        warn!(
            "{} of {} sensors dropped: not divisible across {} workers",
            plan.dropped(),
            cli.sensors,
            plan.workers()
        );
    }

    let shape = RunShape {
        workers: plan.workers(),
        executor: parallel.executor,
    };
    let workload = RiskWorkload {
        iterations: cli.iterations,
        tag_workers: plan.workers() > 1,
        indexing: cli.sensor_index,
    };

    let start = Instant::now();
    let partials = fan_out(
        parallel.executor,
        parallel.worker_program.as_deref(),
        &workload,
        plan.into_shards(),
    )?;
    let elapsed = start.elapsed();

    reduce::to_line(&reduce::reduce_risk(&partials, shape, cli.iterations, elapsed))
}

fn main() {
    iot_bench::init_logging();
    let mut cli = AlgoCli::parse();

    let result = match RunMode::from(cli.command.take()) {
        RunMode::Coordinate => coordinate(&cli),
        RunMode::RunShard(task) => fanout::run_shard_task::<RiskWorkload>(&task),
    };

    match result {
        Ok(line) => println!("{line}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
