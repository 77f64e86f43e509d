//! Memory-hard proof-of-work function.
//!
//! The evaluation fills a 128 MiB buffer from a ChaCha20 stream seeded with the
//! 256-bit input, performs a chain of 1024 data-dependent swaps, hashes the
//! whole buffer to 128 bits (XXH3-128 seeded with the buffer's CRC-32) and
//! reduces that through `ripemd160(sha512(..))` to a 10-byte [`MiniPow`].
//!
//! Buffer size, round count and every primitive are consensus parameters.
use crate::core::hash160;
use crate::error::Error;
use crate::types::Uint256;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use xxhash_rust::xxh3::Xxh3;

pub const WORK_BUFFER_BYTES: usize = 128 * 1024 * 1024;
pub const WORK_BUFFER_WORDS: usize = WORK_BUFFER_BYTES / std::mem::size_of::<u64>();
pub const SWAP_ROUNDS: u32 = 1024;
pub const MINI_POW_SIZE: usize = 10;

// Words converted to little-endian bytes per hashing step.
const HASH_CHUNK_WORDS: usize = 8 * 1024;

/// Fixed-width output of the work function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MiniPow(pub [u8; MINI_POW_SIZE]);

impl MiniPow {
    /// Difficulty achieved by this value: `u64::MAX / (lead + 1)` where `lead`
    /// is the first eight bytes read big-endian, floored at 1. Smaller values
    /// are harder; every value meets difficulty 1.
    pub fn difficulty(&self) -> u64 {
        let mut lead = [0u8; 8];
        lead.copy_from_slice(&self.0[..8]);
        let lead = u64::from_be_bytes(lead);
        let achieved = u128::from(u64::MAX) / (u128::from(lead) + 1);
        (achieved as u64).max(1)
    }

    pub fn meets(&self, required: u64) -> bool {
        self.difficulty() >= required
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for MiniPow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Scratch memory for one evaluation at a time.
///
/// A worker that evaluates many nonces keeps one of these and passes it to
/// [`proof_of_work_with`]; concurrent evaluations each need their own.
pub struct WorkBuffer {
    words: Vec<u64>,
}

impl WorkBuffer {
    /// Reserve the full consensus-sized buffer.
    pub fn new() -> Result<Self, Error> {
        Self::with_words(WORK_BUFFER_WORDS)
    }

    fn with_words(len: usize) -> Result<Self, Error> {
        let mut words = Vec::new();
        words
            .try_reserve_exact(len)
            .map_err(|_| Error::Allocation {
                bytes: len * std::mem::size_of::<u64>(),
            })?;
        words.resize(len, 0);
        Ok(Self { words })
    }

    pub fn len_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }
}

impl std::fmt::Debug for WorkBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkBuffer")
            .field("bytes", &self.len_bytes())
            .finish()
    }
}

/// Evaluate the work function with a freshly allocated buffer.
///
/// Fails only if the 128 MiB buffer cannot be reserved.
pub fn proof_of_work(input: &Uint256) -> Result<MiniPow, Error> {
    let mut buffer = WorkBuffer::new()?;
    Ok(proof_of_work_with(input, &mut buffer))
}

/// Evaluate the work function reusing `buffer`. The previous contents are
/// overwritten in full.
pub fn proof_of_work_with(input: &Uint256, buffer: &mut WorkBuffer) -> MiniPow {
    evaluate(input, &mut buffer.words)
}

pub(crate) fn evaluate(input: &Uint256, buf: &mut [u64]) -> MiniPow {
    fill(input, buf);
    scramble(buf);
    let wide = hash_buffer(buf);
    let digest = hash160(&wide.to_le_bytes());
    let mut out = [0u8; MINI_POW_SIZE];
    out.copy_from_slice(&digest.0[..MINI_POW_SIZE]);
    MiniPow(out)
}

fn fill(input: &Uint256, buf: &mut [u64]) {
    let mut rng = ChaCha20Rng::from_seed(input.0);
    for word in buf.iter_mut() {
        *word = rng.next_u64();
    }
}

fn scramble(buf: &mut [u64]) {
    let len = buf.len() as u64;
    // The last generated word seeds the swap chain.
    let mut data = buf[buf.len() - 1];
    for round in 0..SWAP_ROUNDS {
        let d = (data % len) as usize;
        let tmp = data ^ buf[d];
        buf.swap((tmp % len) as usize, d);
        data = tmp.wrapping_mul(u64::from(round) + 17);
    }
}

fn hash_buffer(buf: &[u64]) -> u128 {
    let mut crc = crc32fast::Hasher::new();
    for_each_le_chunk(buf, |bytes| crc.update(bytes));
    let mut xxh = Xxh3::with_seed(u64::from(crc.finalize()));
    for_each_le_chunk(buf, |bytes| xxh.update(bytes));
    xxh.digest128()
}

fn for_each_le_chunk(buf: &[u64], mut f: impl FnMut(&[u8])) {
    let mut bytes = Vec::with_capacity(HASH_CHUNK_WORDS * 8);
    for chunk in buf.chunks(HASH_CHUNK_WORDS) {
        bytes.clear();
        for word in chunk {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        f(&bytes);
    }
}
