//! Monte Carlo sensor risk benchmark: generator, kernel and batch reducer.

use crate::checksum::{merge_mod, RISK_CHECKSUM_MODULUS};
use crate::error::Result;
use crate::fanout::Workload;
use crate::prng::Lcg;
use crate::split::Shard;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_SENSORS: u64 = 100;
pub const DEFAULT_ITERATIONS: u32 = 50_000;

const HARMONIC_EVERY: u32 = 1000;
const HARMONICS: u32 = 10;

const WARMUP_SENSORS: u64 = 10;
const WARMUP_ITERATIONS: u32 = 1000;

/// One synthetic sensor sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub vibration: f64,
}

impl SensorReading {
    /// Deterministic reading for generator index `index`.
    pub fn generate(index: u64, prefix: &str) -> Self {
        let i = index as f64;
        Self {
            device_id: format!("{prefix}-{index}"),
            temperature: 20.0 + (index % 60) as f64 + (i * 0.1).sin() * 5.0,
            humidity: 40.0 + (index % 40) as f64 + (i * 0.05).cos() * 10.0,
            pressure: 1000.0 + (index % 50) as f64 + (i * 0.02).sin() * 15.0,
            // Clamped: sqrt of a negative vibration would poison the whole batch with NaN.
            vibration: (1.0 + (index % 10) as f64 + (i * 0.03).cos() * 2.0).max(0.0),
        }
    }
}

/// Readings for every index in `indices`.
pub fn generate_sensors(indices: std::ops::Range<u64>, prefix: &str) -> Vec<SensorReading> {
    indices.map(|i| SensorReading::generate(i, prefix)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorRiskResult {
    pub risk_score: f64,
    pub failure_probability: f64,
    /// `floor(raw risk sum * 1e6) mod 1e6`
    pub checksum: u64,
}

/// Runs the Monte Carlo risk simulation for one reading.
pub fn calculate_risk(reading: &SensorReading, iterations: u32) -> SensorRiskResult {
    if iterations == 0 {
        return SensorRiskResult {
            risk_score: 0.0,
            failure_probability: 0.0,
            checksum: 0,
        };
    }

    let SensorReading {
        temperature: t,
        humidity: h,
        pressure: p,
        vibration: v,
        ..
    } = *reading;

    let mut rng = Lcg::for_device(&reading.device_id);
    let mut risk = 0.0f64;
    let mut failure = 0.0f64;

    for i in 0..iterations {
        let x = f64::from(i);
        let temp_stress = ((t - 25.0) / 15.0).exp() * (1.0 + 0.1 * (x * 0.01).sin());
        let humidity_stress = (h / 100.0).powi(2) * (1.0 + 0.05 * (x * 0.02).cos());
        let pressure_stress = (p - 1013.25).abs() / 50.0 * (1.0 + 0.03 * (x * 0.015).sin());
        let vibration_stress = v.sqrt() * (1.0 + 0.08 * (x * 0.008).cos());

        let (r, next) = rng.next();
        rng = next;

        let stress = temp_stress * humidity_stress + pressure_stress * vibration_stress;
        let threshold = 2.5 + r * 0.5;

        // Weibull CDF with shape and scale jittered by the random draw
        let shape = 1.5 + r * 0.3;
        let scale = 100.0 + r * 20.0;
        let weibull = 1.0 - (-(stress / scale).powf(shape)).exp();

        if weibull > threshold / 10.0 {
            failure += weibull;
        }

        risk += stress.powf(1.8) * (1.0 + weibull).ln();

        if i % HARMONIC_EVERY == 0 {
            for k in 1..=HARMONICS {
                let k = f64::from(k);
                risk += (k * stress).sin() * (k * failure).cos() / k;
            }
        }
    }

    let n = f64::from(iterations);
    SensorRiskResult {
        risk_score: risk / n,
        failure_probability: failure / n,
        checksum: ((risk * 1_000_000.0).floor() as i64)
            .rem_euclid(RISK_CHECKSUM_MODULUS as i64) as u64,
    }
}

/// Averages of a batch of kernel results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchRisk {
    pub avg_risk: f64,
    pub avg_failure_prob: f64,
    pub checksum: u64,
}

pub fn process_batch(sensors: &[SensorReading], iterations: u32) -> BatchRisk {
    let mut total_risk = 0.0;
    let mut total_failure = 0.0;
    let mut checksums = Vec::with_capacity(sensors.len());

    for sensor in sensors {
        let result = calculate_risk(sensor, iterations);
        total_risk += result.risk_score;
        total_failure += result.failure_probability;
        checksums.push(result.checksum);
    }

    let n = sensors.len().max(1) as f64;
    BatchRisk {
        avg_risk: total_risk / n,
        avg_failure_prob: total_failure / n,
        checksum: merge_mod(checksums, RISK_CHECKSUM_MODULUS),
    }
}

/// Runs `rounds` small untimed batches before the measured run.
pub fn warmup(rounds: u32) {
    let sensors = generate_sensors(0..WARMUP_SENSORS, "warmup");
    for _ in 0..rounds {
        std::hint::black_box(process_batch(&sensors, WARMUP_ITERATIONS));
    }
}

/// Which generator indices a worker's sensors are built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorIndexing {
    /// Every worker starts at index 0, like the Node and Java benchmarks.
    #[default]
    Local,
    /// Workers take their slice of `0..sensors`, so any worker count
    /// simulates the same sensors as a single worker.
    Global,
}

/// Risk simulation parameters shipped to every worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWorkload {
    pub iterations: u32,
    /// Prefix device ids with the worker ordinal (`sensor-w{n}`).
    pub tag_workers: bool,
    #[serde(default)]
    pub indexing: SensorIndexing,
}

/// What one risk worker reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPartial {
    pub sensors: u64,
    pub ms: f64,
    pub avg_risk: f64,
    pub avg_failure_prob: f64,
    pub checksum: u64,
}

impl RiskWorkload {
    fn indices(&self, shard: &Shard) -> std::ops::Range<u64> {
        match self.indexing {
            SensorIndexing::Local => 0..shard.count,
            SensorIndexing::Global => shard.indices(),
        }
    }

    fn prefix(&self, shard: &Shard) -> String {
        if self.tag_workers {
            format!("sensor-w{}", shard.ordinal)
        } else {
            "sensor".to_string()
        }
    }
}

impl Workload for RiskWorkload {
    type Partial = RiskPartial;

    fn run_shard(&self, shard: &Shard) -> Result<RiskPartial> {
        let start = Instant::now();
        let sensors = generate_sensors(self.indices(shard), &self.prefix(shard));
        let batch = process_batch(&sensors, self.iterations);

        Ok(RiskPartial {
            sensors: shard.count,
            ms: start.elapsed().as_secs_f64() * 1000.0,
            avg_risk: batch.avg_risk,
            avg_failure_prob: batch.avg_failure_prob,
            checksum: batch.checksum,
        })
    }
}
