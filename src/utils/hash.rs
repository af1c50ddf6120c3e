//! Content digests used for cache keys.

use xxhash_rust::xxh3::xxh3_128;

/// Returns the 128-bit xxh3 digest of `text` as 32 lowercase hex characters.
#[must_use]
pub fn text_digest(text: &str) -> String {
    format!("{:032x}", xxh3_128(text.as_bytes()))
}
