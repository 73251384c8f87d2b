//! Hashing helpers built on `blake3`.
//!
//! # Usage
//!
//! ```ignore
//! use crate::utils::hash;
//!
//! let dir = hash::fingerprint(key.as_os_str().as_encoded_bytes()); // -> "a1b2c3d4e5f60718"
//! let name = hash::random_hex(16); // -> 32 hex chars
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable 16-char hex fingerprint of `data`.
#[inline]
pub fn fingerprint<T: AsRef<[u8]> + ?Sized>(data: &T) -> String {
    let hash = blake3::hash(data.as_ref());
    hex::encode(&hash.as_bytes()[..8])
}

/// `len` bytes of unpredictable-enough hex for temp file names.
///
/// Mixes wall clock, process id and a process-wide counter, so two calls in
/// the same process never collide.
pub fn random_hex(len: usize) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = blake3::Hasher::new();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());

    let mut bytes = vec![0u8; len];
    hasher.finalize_xof().fill(&mut bytes);
    hex::encode(bytes)
}
