use crate::types::{Uint160, Uint224, Uint256};
use bincode::Options;
use ripemd::Ripemd160;
use serde::Serialize;
use sha2::{Digest, Sha224, Sha256, Sha512};

/// Canonical wire encoding shared by every hashed structure.
///
/// bincode's default options: little-endian varint integers and
/// length-prefixed sequences, fields in declaration order.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    // Writing to a Vec with no size limit only fails for sequences of
    // unknown length, and every hashed type here has derived Serialize over
    // Vecs and fixed arrays.
    bincode::DefaultOptions::new()
        .serialize(value)
        .expect("in-memory encoding of plain data cannot fail")
}

/// `ripemd160(sha512(data))`.
pub fn hash160(data: &[u8]) -> Uint160 {
    let wide = Sha512::digest(data);
    let mut hasher = Ripemd160::new();
    hasher.update(wide);
    Uint160(hasher.finalize().into())
}

/// `hash160` over the concatenation of two digests, used for tree nodes.
pub fn hash160_pair(left: &Uint160, right: &Uint160) -> Uint160 {
    let mut buf = [0u8; 2 * Uint160::LEN];
    buf[..Uint160::LEN].copy_from_slice(left.as_bytes());
    buf[Uint160::LEN..].copy_from_slice(right.as_bytes());
    hash160(&buf)
}

pub fn hash224(data: &[u8]) -> Uint224 {
    Uint224(Sha224::digest(data).into())
}

pub fn hash256(data: &[u8]) -> Uint256 {
    Uint256(Sha256::digest(data).into())
}
