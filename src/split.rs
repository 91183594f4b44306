//! Work splitting: divide a unit count into contiguous per-worker shards.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Upper bound on workers in one run.
pub const MAX_WORKERS: usize = 1024;

/// What to do with `total % workers` leftover units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemainderPolicy {
    /// Every shard gets `total / workers`; leftovers are not processed.
    #[default]
    Drop,
    /// The first `total % workers` shards take one extra unit each.
    Spread,
}

/// A contiguous range of unit indices owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub ordinal: usize,
    pub start: u64,
    pub count: u64,
}

impl Shard {
    /// Global indices covered by this shard.
    pub fn indices(&self) -> std::ops::Range<u64> {
        self.start..self.start + self.count
    }
}

/// The full set of shards for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPlan {
    shards: Vec<Shard>,
    requested: u64,
}

impl ShardPlan {
    /// `workers` is clamped to `1..=MAX_WORKERS`.
    pub fn new(total: u64, workers: usize, policy: RemainderPolicy) -> Self {
        let workers = workers.clamp(1, MAX_WORKERS);
        let w = workers as u64;
        let per = total / w;
        let rem = total % w;

        let mut shards = Vec::with_capacity(workers);
        let mut start = 0;
        for ordinal in 0..workers {
            let extra = match policy {
                RemainderPolicy::Spread if (ordinal as u64) < rem => 1,
                _ => 0,
            };
            let count = per + extra;
            shards.push(Shard {
                ordinal,
                start,
                count,
            });
            start += count;
        }

        Self {
            shards,
            requested: total,
        }
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn into_shards(self) -> Vec<Shard> {
        self.shards
    }

    pub fn workers(&self) -> usize {
        self.shards.len()
    }

    /// Units that will actually be processed.
    pub fn planned(&self) -> u64 {
        self.shards.iter().map(|s| s.count).sum()
    }

    /// Units lost to truncation under [`RemainderPolicy::Drop`].
    pub fn dropped(&self) -> u64 {
        self.requested - self.planned()
    }
}
