//! Final reduction of worker partials into the one-line run summary.

use crate::checksum::{merge_mod, merge_wrapping, RISK_CHECKSUM_MODULUS};
use crate::error::{BenchError, Result};
use crate::fanout::Executor;
use crate::sensor::RiskPartial;
use crate::telemetry::{merge_tables, DeviceCounting, TelemetryPartial};
use serde::Serialize;
use std::time::Duration;

pub const LANG: &str = "rust";

/// Worker layout of a run. `workers` and `executor` are reported only when
/// more than one worker ran.
#[derive(Debug, Clone, Copy)]
pub struct RunShape {
    pub workers: usize,
    pub executor: Executor,
}

impl RunShape {
    fn workers(&self) -> Option<usize> {
        (self.workers > 1).then_some(self.workers)
    }

    fn executor(&self) -> Option<Executor> {
        (self.workers > 1).then_some(self.executor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgoSummary {
    pub lang: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<Executor>,
    pub sensors: u64,
    pub iterations: u32,
    pub ms: f64,
    pub ops_per_sec: u64,
    pub avg_risk: f64,
    pub checksum: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySummary {
    pub lang: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<Executor>,
    pub total: u64,
    pub devices: u64,
    pub alarms: u64,
    pub ms: f64,
    pub rps: u64,
    pub checksum: u32,
}

/// Serializes a summary as a single JSON line.
pub fn to_line<S: Serialize>(summary: &S) -> Result<String> {
    serde_json::to_string(summary).map_err(BenchError::Encode)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Units per second over `elapsed`, rounded; zero when no time elapsed.
pub fn throughput(units: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (units as f64 / secs).round() as u64
    } else {
        0
    }
}

/// Merges risk partials. `avg_risk` is weighted by each worker's sensor count.
pub fn reduce_risk(
    partials: &[RiskPartial],
    shape: RunShape,
    iterations: u32,
    elapsed: Duration,
) -> AlgoSummary {
    let sensors: u64 = partials.iter().map(|p| p.sensors).sum();
    let weighted: f64 = partials.iter().map(|p| p.avg_risk * p.sensors as f64).sum();
    let avg_risk = if sensors > 0 {
        weighted / sensors as f64
    } else {
        0.0
    };

    AlgoSummary {
        lang: LANG,
        kind: "algorithmic",
        workers: shape.workers(),
        executor: shape.executor(),
        sensors,
        iterations,
        ms: round_to(elapsed.as_secs_f64() * 1000.0, 1),
        ops_per_sec: throughput(sensors, elapsed),
        avg_risk: round_to(avg_risk, 6),
        checksum: merge_mod(partials.iter().map(|p| p.checksum), RISK_CHECKSUM_MODULUS),
    }
}

/// Merges telemetry partials.
///
/// Under [`DeviceCounting::PerShard`] device counts are summed, so a device
/// seen by several shards is counted once per shard.
pub fn reduce_telemetry(
    partials: &[TelemetryPartial],
    shape: RunShape,
    counting: DeviceCounting,
    elapsed: Duration,
) -> TelemetrySummary {
    let total: u64 = partials.iter().map(|p| p.total).sum();
    let devices = match counting {
        DeviceCounting::PerShard => partials.iter().map(|p| p.devices).sum(),
        DeviceCounting::Distinct => {
            merge_tables(partials.iter().filter_map(|p| p.device_table.as_ref())).len() as u64
        }
    };

    TelemetrySummary {
        lang: LANG,
        kind: "telemetry",
        workers: shape.workers(),
        executor: shape.executor(),
        total,
        devices,
        alarms: partials.iter().map(|p| p.alarms).sum(),
        ms: round_to(elapsed.as_secs_f64() * 1000.0, 1),
        rps: throughput(total, elapsed),
        checksum: merge_wrapping(partials.iter().map(|p| p.checksum)),
    }
}
