//! JSON telemetry benchmark: record generator, parse/validate/aggregate
//! kernel and per-shard device aggregates.

use crate::checksum::{merge_wrapping, Fnv1a};
use crate::error::{BenchError, Result};
use crate::fanout::Workload;
use crate::split::Shard;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub const DEFAULT_TOTAL: u64 = 1_000_000;
pub const DEFAULT_BATCH: u64 = 10_000;
pub const DEFAULT_DEVICES: u64 = 1_000;

const PAYLOAD_SIZE: usize = 64;
const ALARM_TEMP: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Alarm,
}

/// One synthetic telemetry event, as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub ts: u64,
    pub temp: u64,
    pub status: Status,
    pub payload: String,
}

impl TelemetryRecord {
    pub fn generate(index: u64, devices: u64, ts: u64) -> Self {
        let temp = index % 120;
        let status = if temp > 95 && index % 7 == 0 {
            Status::Alarm
        } else {
            Status::Ok
        };
        Self {
            device_id: format!("dev-{}", index % devices.max(1)),
            ts,
            temp,
            status,
            payload: "x".repeat(PAYLOAD_SIZE),
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(BenchError::Encode)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Serialized records for every index in `indices`, stamped with the wall clock.
pub fn generate_payloads(indices: Range<u64>, devices: u64) -> Result<Vec<String>> {
    indices
        .map(|i| TelemetryRecord::generate(i, devices, now_millis()).encode())
        .collect()
}

/// Borrowed view used for validation; unknown fields are skipped.
#[derive(Deserialize)]
struct WireRecord<'a> {
    #[serde(rename = "deviceId", borrow)]
    device_id: Cow<'a, str>,
    #[serde(borrow)]
    ts: &'a RawValue,
    temp: f64,
    #[serde(borrow)]
    status: Cow<'a, str>,
}

/// FNV-1a of `line` with the bytes of the `ts` value left out.
fn line_checksum(line: &str, ts: &RawValue) -> u32 {
    let bytes = line.as_bytes();
    let raw = ts.get();

    // `ts` borrows from `line`; its offset locates the timestamp bytes.
    let mut h = Fnv1a::new();
    if bytes.as_ptr_range().contains(&raw.as_ptr()) {
        let start = raw.as_ptr() as usize - bytes.as_ptr() as usize;
        h.update(&bytes[..start]);
        h.update(&bytes[start + raw.len()..]);
    } else {
        h.update(bytes);
    }
    h.finish()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub count: u64,
    pub alarms: u64,
    pub checksum: u32,
}

impl DeviceStats {
    fn absorb(&mut self, other: &DeviceStats) {
        self.count += other.count;
        self.alarms += other.alarms;
        self.checksum = self.checksum.wrapping_add(other.checksum);
    }
}

/// Totals of an aggregate at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub devices: u64,
    pub alarms: u64,
    pub checksum: u32,
}

/// Per-device counters for one shard. Never shared between workers.
#[derive(Debug, Clone, Default)]
pub struct DeviceAggregate {
    devices: HashMap<String, DeviceStats>,
    alarms: u64,
}

impl DeviceAggregate {
    /// Parses, validates and folds one serialized record.
    ///
    /// `index` is only used to label errors.
    pub fn ingest(&mut self, line: &str, index: u64) -> Result<()> {
        let record: WireRecord<'_> =
            serde_json::from_str(line).map_err(|e| BenchError::InvalidRecord {
                index,
                reason: e.to_string(),
            })?;

        if serde_json::from_str::<serde_json::Number>(record.ts.get()).is_err() {
            return Err(BenchError::InvalidRecord {
                index,
                reason: format!("`ts` is not a number: {}", record.ts.get()),
            });
        }

        let is_alarm = record.temp > ALARM_TEMP || record.status == "ALARM";
        if is_alarm {
            self.alarms += 1;
        }

        let checksum = line_checksum(line, record.ts);
        let stats = match self.devices.get_mut(record.device_id.as_ref()) {
            Some(stats) => stats,
            None => self.devices.entry(record.device_id.into_owned()).or_default(),
        };
        stats.count += 1;
        if is_alarm {
            stats.alarms += 1;
        }
        stats.checksum = stats.checksum.wrapping_add(checksum);
        Ok(())
    }

    /// Ingests a batch whose first line has global index `first_index`.
    /// The first bad record aborts the batch.
    pub fn ingest_batch(&mut self, lines: &[String], first_index: u64) -> Result<()> {
        for (offset, line) in lines.iter().enumerate() {
            self.ingest(line, first_index + offset as u64)?;
        }
        Ok(())
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            devices: self.devices.len() as u64,
            alarms: self.alarms,
            checksum: merge_wrapping(self.devices.values().map(|d| d.checksum)),
        }
    }

    pub fn into_table(self) -> BTreeMap<String, DeviceStats> {
        self.devices.into_iter().collect()
    }
}

/// Runs the telemetry kernel over one batch with a fresh aggregate.
pub fn process_batch(lines: &[String], first_index: u64) -> Result<BatchSummary> {
    let mut agg = DeviceAggregate::default();
    agg.ingest_batch(lines, first_index)?;
    Ok(agg.summary())
}

/// Merges per-shard device tables by key.
pub fn merge_tables<'a, I>(tables: I) -> BTreeMap<String, DeviceStats>
where
    I: IntoIterator<Item = &'a BTreeMap<String, DeviceStats>>,
{
    let mut merged: BTreeMap<String, DeviceStats> = BTreeMap::new();
    for table in tables {
        for (id, stats) in table {
            merged.entry(id.clone()).or_default().absorb(stats);
        }
    }
    merged
}

/// How the final device count is formed across shards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceCounting {
    /// Sum of per-shard device counts; a device seen by two shards counts twice.
    #[default]
    PerShard,
    /// Distinct devices across all shards, merged by id.
    Distinct,
}

/// Telemetry parameters shipped to every worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryWorkload {
    pub batch: u64,
    pub devices: u64,
    pub counting: DeviceCounting,
}

/// What one telemetry worker reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPartial {
    pub total: u64,
    pub ms: f64,
    pub devices: u64,
    pub alarms: u64,
    pub checksum: u32,
    /// Present only under [`DeviceCounting::Distinct`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_table: Option<BTreeMap<String, DeviceStats>>,
}

impl Workload for TelemetryWorkload {
    type Partial = TelemetryPartial;

    fn run_shard(&self, shard: &Shard) -> Result<TelemetryPartial> {
        let start = Instant::now();
        let batch = self.batch.max(1);
        let Range { start: first, end } = shard.indices();

        let mut agg = DeviceAggregate::default();
        let mut next = first;
        while next < end {
            let upto = end.min(next + batch);
            let payloads = generate_payloads(next..upto, self.devices)?;
            agg.ingest_batch(&payloads, next)?;
            next = upto;
        }

        let summary = agg.summary();
        let device_table = match self.counting {
            DeviceCounting::Distinct => Some(agg.into_table()),
            DeviceCounting::PerShard => None,
        };

        Ok(TelemetryPartial {
            total: shard.count,
            ms: start.elapsed().as_secs_f64() * 1000.0,
            devices: summary.devices,
            alarms: summary.alarms,
            checksum: summary.checksum,
            device_table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::fnv1a32;

    fn line(s: &str) -> Vec<String> {
        vec![s.to_string()]
    }

    #[test]
    fn test_generated_record_wire_format() {
        let record = TelemetryRecord::generate(98, 1000, 1_700_000_000_000);
        let json = record.encode().unwrap();
        assert_eq!(
            json,
            format!(
                concat!(
                    r#"{{"deviceId":"dev-98","ts":1700000000000,"#,
                    r#""temp":98,"status":"ALARM","payload":"{}"}}"#,
                ),
                "x".repeat(64)
            )
        );
    }

    #[test]
    fn test_status_rule() {
        // temp > 95 but index not a multiple of 7
        assert_eq!(TelemetryRecord::generate(96, 1000, 0).status, Status::Ok);
        // multiple of 7 but temp too low
        assert_eq!(TelemetryRecord::generate(7, 1000, 0).status, Status::Ok);
        assert_eq!(TelemetryRecord::generate(105, 1000, 0).status, Status::Alarm);
    }

    #[test]
    fn test_alarm_from_temperature_or_status() {
        let lines = vec![
            r#"{"deviceId":"a","ts":1,"temp":96,"status":"OK"}"#.to_string(),
            r#"{"deviceId":"a","ts":1,"temp":10,"status":"ALARM"}"#.to_string(),
            r#"{"deviceId":"b","ts":1,"temp":95,"status":"OK"}"#.to_string(),
        ];
        let summary = process_batch(&lines, 0).unwrap();
        assert_eq!(summary.devices, 2);
        assert_eq!(summary.alarms, 2);
    }

    #[test]
    fn test_rejects_numeric_device_id() {
        let lines = line(r#"{"deviceId":5,"ts":1,"temp":1,"status":"OK"}"#);
        let err = process_batch(&lines, 0).unwrap_err();
        assert!(matches!(err, BenchError::InvalidRecord { index: 0, .. }));
    }

    #[test]
    fn test_rejects_string_timestamp() {
        let lines = line(r#"{"deviceId":"d","ts":"now","temp":1,"status":"OK"}"#);
        let err = process_batch(&lines, 3).unwrap_err();
        match err {
            BenchError::InvalidRecord { index, reason } => {
                assert_eq!(index, 3);
                assert!(reason.contains("ts"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_missing_status() {
        let err = process_batch(&line(r#"{"deviceId":"d","ts":1,"temp":1}"#), 0).unwrap_err();
        assert!(err.to_string().contains("status"));
    }

    #[test]
    fn test_rejects_non_numeric_temp_and_garbage() {
        let hot = line(r#"{"deviceId":"d","ts":1,"temp":"hot","status":"OK"}"#);
        assert!(process_batch(&hot, 0).is_err());
        assert!(process_batch(&line("{not json"), 0).is_err());
    }

    #[test]
    fn test_bad_record_aborts_whole_batch() {
        let lines = vec![
            r#"{"deviceId":"a","ts":1,"temp":1,"status":"OK"}"#.to_string(),
            r#"{"deviceId":"a","ts":1,"temp":1}"#.to_string(),
        ];
        let mut agg = DeviceAggregate::default();
        let err = agg.ingest_batch(&lines, 100).unwrap_err();
        assert!(matches!(err, BenchError::InvalidRecord { index: 101, .. }));
    }

    #[test]
    fn test_checksum_ignores_timestamp() {
        let a = line(r#"{"deviceId":"d","ts":1700000000000,"temp":1,"status":"OK"}"#);
        let b = line(r#"{"deviceId":"d","ts":1800000000123,"temp":1,"status":"OK"}"#);
        let c = line(r#"{"deviceId":"d","ts":1700000000000,"temp":2,"status":"OK"}"#);
        let sa = process_batch(&a, 0).unwrap();
        let sb = process_batch(&b, 0).unwrap();
        let sc = process_batch(&c, 0).unwrap();
        assert_eq!(sa.checksum, sb.checksum);
        assert_ne!(sa.checksum, sc.checksum);
        assert_eq!(sa.checksum, fnv1a32(br#"{"deviceId":"d","ts":,"temp":1,"status":"OK"}"#));
    }

    #[test]
    fn test_checksums_fold_per_device() {
        let lines = vec![
            r#"{"deviceId":"a","ts":1,"temp":1,"status":"OK"}"#.to_string(),
            r#"{"deviceId":"a","ts":1,"temp":2,"status":"OK"}"#.to_string(),
        ];
        let mut agg = DeviceAggregate::default();
        agg.ingest_batch(&lines, 0).unwrap();
        let table = agg.into_table();
        let stats = table["a"];
        assert_eq!(stats.count, 2);
        let expected = fnv1a32(br#"{"deviceId":"a","ts":,"temp":1,"status":"OK"}"#)
            .wrapping_add(fnv1a32(br#"{"deviceId":"a","ts":,"temp":2,"status":"OK"}"#));
        assert_eq!(stats.checksum, expected);
    }

    #[test]
    fn test_shard_covers_all_devices() {
        let workload = TelemetryWorkload {
            batch: 1_000,
            devices: 100,
            counting: DeviceCounting::Distinct,
        };
        let shard = Shard {
            ordinal: 0,
            start: 0,
            count: 2_500,
        };
        let partial = workload.run_shard(&shard).unwrap();
        assert_eq!(partial.total, 2_500);
        assert_eq!(partial.devices, 100);
        let table = partial.device_table.unwrap();
        assert_eq!(table.values().map(|d| d.count).sum::<u64>(), 2_500);
    }

    #[test]
    fn test_merge_tables_by_key() {
        let mut left = BTreeMap::new();
        left.insert("a".to_string(), DeviceStats { count: 1, alarms: 0, checksum: u32::MAX });
        let mut right = BTreeMap::new();
        right.insert("a".to_string(), DeviceStats { count: 2, alarms: 1, checksum: 2 });
        right.insert("b".to_string(), DeviceStats { count: 1, alarms: 0, checksum: 5 });

        let merged = merge_tables([&left, &right]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["a"], DeviceStats { count: 3, alarms: 1, checksum: 1 });
    }
}
