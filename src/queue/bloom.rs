use crate::queue::work_queue::ExistenceHook;
use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Capacity used when the job's total size is unbounded.
pub const UNBOUNDED_FILTER_CAPACITY: usize = 10_000;

const BITS_PER_ENTRY: usize = 10;
const HASH_ROUNDS: u32 = 7;
const SECOND_HASH_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// File-backed bloom filter serving as the queue's existence hook.
///
/// Sized from the job's configured total size (roughly twice it) or a fixed
/// default when unbounded. An existing artifact of the same geometry is
/// reloaded on open so a restarted worker keeps its dedup history; the bit
/// array is persisted again when the queue shuts down.
pub struct FileBloomFilter {
    path: PathBuf,
    bits: Mutex<Vec<u8>>,
    bit_count: u64,
}

impl FileBloomFilter {
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        let byte_len = Self::byte_len(capacity);
        let bits = match Self::load_existing(&path, byte_len)? {
            Some(bits) => bits,
            None => vec![0u8; byte_len],
        };

        Ok(Self {
            path,
            bit_count: (byte_len as u64) * 8,
            bits: Mutex::new(bits),
        })
    }

    /// Filter capacity for a job's total-size limit: twice the size when
    /// bounded, a fixed default otherwise.
    pub fn capacity_for(size: i64) -> usize {
        if size > 0 {
            (size as usize).saturating_mul(2)
        } else {
            UNBOUNDED_FILTER_CAPACITY
        }
    }

    pub fn persist(&self) -> Result<()> {
        let bits = self.bits.lock().expect("bloom filter mutex poisoned");
        std::fs::write(&self.path, bits.as_slice())
            .with_context(|| format!("failed to persist bloom filter to {}", self.path.display()))
    }

    fn byte_len(capacity: usize) -> usize {
        let bit_count = capacity.max(1).saturating_mul(BITS_PER_ENTRY).max(64);
        bit_count.div_ceil(8)
    }

    fn load_existing(path: &Path, byte_len: usize) -> Result<Option<Vec<u8>>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read bloom filter {}", path.display()))?;
        if bytes.len() == byte_len {
            Ok(Some(bytes))
        } else {
            // Geometry changed (job was reconfigured); start over.
            Ok(None)
        }
    }

    fn bit_positions(&self, key: &str) -> impl Iterator<Item = u64> {
        let mut first = DefaultHasher::new();
        key.hash(&mut first);
        let h1 = first.finish();

        let mut second = DefaultHasher::new();
        SECOND_HASH_SEED.hash(&mut second);
        key.hash(&mut second);
        let h2 = second.finish() | 1;

        let bit_count = self.bit_count;
        (0..HASH_ROUNDS as u64).map(move |round| h1.wrapping_add(round.wrapping_mul(h2)) % bit_count)
    }
}

impl ExistenceHook for FileBloomFilter {
    fn check_and_record(&self, key: &str) -> bool {
        let positions: Vec<u64> = self.bit_positions(key).collect();
        let mut bits = self.bits.lock().expect("bloom filter mutex poisoned");

        let mut seen = true;
        for position in positions {
            let byte = (position / 8) as usize;
            let mask = 1u8 << (position % 8);
            if bits[byte] & mask == 0 {
                seen = false;
                bits[byte] |= mask;
            }
        }
        seen
    }

    fn persist(&self) -> Result<()> {
        FileBloomFilter::persist(self)
    }
}
