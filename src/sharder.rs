//! Sharder implementation.
use sha1::{Digest, Sha1};

/// Size of the bucket space used by percentage rollouts.
pub const BUCKET_SIZE: u64 = 10_000;

/// Maps an input to one of `total_shards` buckets.
pub(crate) trait Sharder {
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64;
}

/// The default (and only) sharder. Must stay bit-compatible with every other FeatureProbe SDK:
/// the last 4 bytes of the SHA-1 digest, read as a big-endian `u32`, modulo `total_shards`.
pub struct Sha1Sharder;

impl Sharder for Sha1Sharder {
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64 {
        let hash = Sha1::digest(input);
        let mut tail = [0u8; 4];
        tail.copy_from_slice(&hash[hash.len() - 4..]);
        (u32::from_be_bytes(tail) as u64) % total_shards
    }
}
