//! FNV-1a (32-bit) and the modular checksum merges used by the reducers.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Modulus of per-sensor and merged risk checksums.
pub const RISK_CHECKSUM_MODULUS: u64 = 1_000_000;

/// Streaming FNV-1a hasher.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a {
    hash: u32,
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

impl Fnv1a {
    pub const fn new() -> Self {
        Self {
            hash: FNV_OFFSET_BASIS,
        }
    }

    #[inline]
    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.hash ^= u32::from(b);
            self.hash = self.hash.wrapping_mul(FNV_PRIME);
        }
    }

    pub const fn finish(&self) -> u32 {
        self.hash
    }
}

/// One-shot FNV-1a over `bytes`.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut h = Fnv1a::new();
    h.update(bytes);
    h.finish()
}

/// Sum of 32-bit checksums modulo 2^32.
pub fn merge_wrapping<I: IntoIterator<Item = u32>>(parts: I) -> u32 {
    parts.into_iter().fold(0u32, u32::wrapping_add)
}

/// Sum of checksums modulo `modulus`.
pub fn merge_mod<I: IntoIterator<Item = u64>>(parts: I, modulus: u64) -> u64 {
    parts
        .into_iter()
        .fold(0u64, |acc, c| (acc + c % modulus) % modulus)
}
