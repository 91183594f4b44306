//! Fan-out/fan-in of shards over parallel workers.
//!
//! Every executor spawns all workers up front and waits until each has
//! reported or the first one fails. A failure aborts the whole run; no
//! partial results are salvaged.

use crate::error::{BenchError, Result};
use crate::split::Shard;
use clap::ValueEnum;
use log::debug;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;

/// Subcommand name the process executor invokes on its own binary.
pub const SHARD_SUBCOMMAND: &str = "shard";

/// Per-shard work of one benchmark.
///
/// A workload value holds only read-only run parameters. It is cloned or
/// serialized into every worker; workers never share mutable state.
pub trait Workload: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Summary a worker hands back when its shard is done.
    type Partial: Serialize + DeserializeOwned + Send + 'static;

    fn run_shard(&self, shard: &Shard) -> Result<Self::Partial>;
}

/// Payload passed to a worker running in its own process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardTask<W> {
    pub shard: Shard,
    pub workload: W,
}

/// How workers are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Executor {
    /// Rayon thread pool with one thread per worker
    #[default]
    Threads,
    /// Tokio blocking tasks
    Tasks,
    /// One child process per worker
    Processes,
}

/// Runs every shard and returns the partials ordered by shard ordinal.
///
/// A single shard runs inline on the calling thread. `worker_program` is the
/// binary the process executor launches; it defaults to the running one.
pub fn fan_out<W: Workload>(
    executor: Executor,
    worker_program: Option<&Path>,
    workload: &W,
    shards: Vec<Shard>,
) -> Result<Vec<W::Partial>> {
    if let [shard] = shards.as_slice() {
        return Ok(vec![workload.run_shard(shard)?]);
    }

    debug!("fanning out {} shards via {:?}", shards.len(), executor);
    match executor {
        Executor::Threads => run_threads(workload, shards),
        Executor::Tasks => run_tasks(workload, shards),
        Executor::Processes => {
            let program = match worker_program {
                Some(path) => path.to_path_buf(),
                None => std::env::current_exe().map_err(BenchError::Spawn)?,
            };
            run_processes(&program, workload, shards)
        }
    }
}

/// Entry point of the `shard` run mode: decode a task, run it, encode the
/// partial as a single JSON line.
pub fn run_shard_task<W: Workload>(payload: &str) -> Result<String> {
    let task: ShardTask<W> = serde_json::from_str(payload).map_err(BenchError::InvalidTask)?;
    let partial = task.workload.run_shard(&task.shard)?;
    serde_json::to_string(&partial).map_err(BenchError::Encode)
}

fn run_threads<W: Workload>(workload: &W, shards: Vec<Shard>) -> Result<Vec<W::Partial>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(shards.len())
        .thread_name(|i| format!("shard-{i}"))
        .build()?;

    pool.install(|| {
        shards
            .into_par_iter()
            .map(|shard| {
                let partial = workload.run_shard(&shard)?;
                debug!("worker {} done", shard.ordinal);
                Ok(partial)
            })
            .collect()
    })
}

type Report<T> = (usize, Result<T>);

fn run_tasks<W: Workload>(workload: &W, shards: Vec<Shard>) -> Result<Vec<W::Partial>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(BenchError::Runtime)?;

    let expected = shards.len();
    let result = runtime.block_on(async {
        let (tx, rx) = mpsc::unbounded_channel::<Report<W::Partial>>();
        for shard in shards {
            let tx = tx.clone();
            let workload = workload.clone();
            tokio::task::spawn_blocking(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| workload.run_shard(&shard)))
                    .unwrap_or_else(|_| {
                        Err(BenchError::WorkerPanicked {
                            ordinal: shard.ordinal,
                        })
                    });
                let _ = tx.send((shard.ordinal, outcome));
            });
        }
        drop(tx);
        gather(rx, expected).await
    });

    // Blocking workers still running after a failure are abandoned, not awaited.
    runtime.shutdown_background();
    result
}

fn run_processes<W: Workload>(
    program: &Path,
    workload: &W,
    shards: Vec<Shard>,
) -> Result<Vec<W::Partial>> {
    debug!("launching workers from {}", program.display());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(BenchError::Runtime)?;

    let expected = shards.len();
    let result = runtime.block_on(async {
        let (tx, rx) = mpsc::unbounded_channel::<Report<W::Partial>>();
        for shard in shards {
            let task = ShardTask {
                shard,
                workload: workload.clone(),
            };
            let payload = serde_json::to_string(&task).map_err(BenchError::Encode)?;
            let tx = tx.clone();
            let program = program.to_path_buf();
            tokio::spawn(async move {
                let outcome = run_child::<W::Partial>(program, shard.ordinal, payload).await;
                let _ = tx.send((shard.ordinal, outcome));
            });
        }
        drop(tx);
        gather(rx, expected).await
    });

    // Dropping the runtime cancels outstanding waits; kill_on_drop reaps the children.
    runtime.shutdown_background();
    result
}

async fn run_child<P: DeserializeOwned>(
    program: PathBuf,
    ordinal: usize,
    payload: String,
) -> Result<P> {
    let output = Command::new(program)
        .arg(SHARD_SUBCOMMAND)
        .arg(payload)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(BenchError::Spawn)?
        .wait_with_output()
        .await
        .map_err(|e| BenchError::WorkerFailed {
            ordinal,
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(BenchError::WorkerFailed {
            ordinal,
            reason: format!("exited with {}", output.status),
        });
    }

    serde_json::from_slice(&output.stdout).map_err(|e| BenchError::WorkerFailed {
        ordinal,
        reason: format!("unreadable result: {e}"),
    })
}

/// Collects `expected` reports in completion order, stopping at the first error.
async fn gather<T>(mut rx: mpsc::UnboundedReceiver<Report<T>>, expected: usize) -> Result<Vec<T>> {
    let mut slots: Vec<Option<T>> = (0..expected).map(|_| None).collect();
    let mut received = 0;

    while received < expected {
        let Some((ordinal, outcome)) = rx.recv().await else {
            break;
        };
        slots[ordinal] = Some(outcome?);
        received += 1;
        debug!("worker {ordinal} done ({received}/{expected})");
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(ordinal, slot)| {
            slot.ok_or_else(|| BenchError::WorkerFailed {
                ordinal,
                reason: "exited without reporting".to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::{RemainderPolicy, ShardPlan};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct SumWorkload {
        fail_on: Option<usize>,
    }

    impl Workload for SumWorkload {
        type Partial = (usize, u64);

        fn run_shard(&self, shard: &Shard) -> Result<Self::Partial> {
            if self.fail_on == Some(shard.ordinal) {
                return Err(BenchError::WorkerFailed {
                    ordinal: shard.ordinal,
                    reason: "boom".to_string(),
                });
            }
            Ok((shard.ordinal, shard.indices().sum()))
        }
    }

    fn shards(total: u64, workers: usize) -> Vec<Shard> {
        ShardPlan::new(total, workers, RemainderPolicy::Spread).into_shards()
    }

    #[test]
    fn test_threads_and_tasks_agree() {
        let workload = SumWorkload { fail_on: None };
        let expected: u64 = (0..1000).sum();

        for executor in [Executor::Threads, Executor::Tasks] {
            let partials = fan_out(executor, None, &workload, shards(1000, 4)).unwrap();
            let ordinals: Vec<usize> = partials.iter().map(|p| p.0).collect();
            assert_eq!(ordinals, vec![0, 1, 2, 3]);
            assert_eq!(partials.iter().map(|p| p.1).sum::<u64>(), expected);
        }
    }

    #[test]
    fn test_single_shard_runs_inline() {
        let workload = SumWorkload { fail_on: None };
        // Inline path never touches the process executor's current_exe lookup.
        let partials = fan_out(Executor::Processes, None, &workload, shards(10, 1)).unwrap();
        assert_eq!(partials, vec![(0, 45)]);
    }

    #[test]
    fn test_one_failure_fails_the_run() {
        let workload = SumWorkload { fail_on: Some(2) };
        for executor in [Executor::Threads, Executor::Tasks] {
            let err = fan_out(executor, None, &workload, shards(100, 4)).unwrap_err();
            assert!(matches!(err, BenchError::WorkerFailed { ordinal: 2, .. }));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_child_process_fails_the_run() {
        let workload = SumWorkload { fail_on: None };
        let program = Path::new("false");
        let err = fan_out(Executor::Processes, Some(program), &workload, shards(100, 3))
            .unwrap_err();
        match err {
            BenchError::WorkerFailed { reason, .. } => {
                assert!(reason.starts_with("exited with"), "{reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_child_output_fails_the_run() {
        let workload = SumWorkload { fail_on: None };
        // echo exits 0 but prints its arguments instead of a partial.
        let program = Path::new("echo");
        let err = fan_out(Executor::Processes, Some(program), &workload, shards(100, 2))
            .unwrap_err();
        match err {
            BenchError::WorkerFailed { reason, .. } => {
                assert!(reason.starts_with("unreadable result"), "{reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_worker_program_is_a_spawn_error() {
        let workload = SumWorkload { fail_on: None };
        let program = Path::new("/nonexistent/iot-bench-worker");
        let err = fan_out(Executor::Processes, Some(program), &workload, shards(10, 2))
            .unwrap_err();
        assert!(matches!(err, BenchError::Spawn(_)), "{err}");
    }

    #[test]
    fn test_shard_task_round_trip() {
        let task = ShardTask {
            shard: Shard {
                ordinal: 1,
                start: 10,
                count: 5,
            },
            workload: SumWorkload { fail_on: None },
        };
        let payload = serde_json::to_string(&task).unwrap();
        let line = run_shard_task::<SumWorkload>(&payload).unwrap();
        assert_eq!(line, "[1,60]");
    }

    #[test]
    fn test_garbage_task_is_rejected() {
        let err = run_shard_task::<SumWorkload>("not json").unwrap_err();
        assert!(matches!(err, BenchError::InvalidTask(_)));
    }
}
