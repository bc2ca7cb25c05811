//! SimHash content fingerprinting for duplicate detection.
//!
//! Token hashes must be stable across process restarts — `DefaultHasher`
//! is not (HashDoS randomization), so tokens go through SHA-256 and the
//! first 8 bytes become the 64-bit token hash.

use sha2::{Digest, Sha256};

pub const HASH_BITS: usize = 64;

/// Split text into lowercase word tokens, punctuation stripped.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// Hash a single token to a 64-bit integer.
fn hash_token(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Compute a SimHash fingerprint for the given text, hex-encoded to
/// `HASH_BITS / 4` characters. Empty input hashes to all zeros.
pub fn simhash(text: &str) -> String {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return "0".repeat(HASH_BITS / 4);
    }

    let mut vector = [0i64; HASH_BITS];
    for token in &tokens {
        let token_hash = hash_token(token);
        for (i, weight) in vector.iter_mut().enumerate() {
            if token_hash & (1 << i) != 0 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }

    let mut fingerprint: u64 = 0;
    for (i, weight) in vector.iter().enumerate() {
        if *weight > 0 {
            fingerprint |= 1 << i;
        }
    }

    format!("{fingerprint:0width$x}", width = HASH_BITS / 4)
}

/// Hamming distance between two hex fingerprints of equal width.
pub fn hamming_distance(hash_a: &str, hash_b: &str) -> u32 {
    let a = u64::from_str_radix(hash_a, 16).unwrap_or(0);
    let b = u64::from_str_radix(hash_b, 16).unwrap_or(0);
    (a ^ b).count_ones()
}

/// Similarity in [0.0, 1.0] between two SimHash fingerprints.
pub fn similarity(hash_a: &str, hash_b: &str) -> f64 {
    1.0 - (hamming_distance(hash_a, hash_b) as f64 / HASH_BITS as f64)
}

/// Whether two fingerprints are similar enough to be duplicates.
pub fn is_duplicate(hash_a: &str, hash_b: &str, threshold: f64) -> bool {
    similarity(hash_a, hash_b) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simhash_deterministic() {
        let h1 = simhash("Hello world, this is a test article about Niseko");
        let h2 = simhash("Hello world, this is a test article about Niseko");
        assert_eq!(h1, h2);
    }

    #[test]
    fn simhash_width_is_sixteen_hex_chars() {
        assert_eq!(simhash("powder day").len(), HASH_BITS / 4);
        assert_eq!(simhash("").len(), HASH_BITS / 4);
    }

    #[test]
    fn simhash_empty_text_is_zero() {
        assert_eq!(simhash(""), "0".repeat(16));
        assert_eq!(simhash("!!! ..."), "0".repeat(16));
    }

    #[test]
    fn simhash_similar_text_is_similar() {
        let h1 = simhash("Heavy snowfall expected in Niseko area tonight with 30cm forecast");
        let h2 = simhash("Heavy snowfall expected in Niseko region tonight with 30cm predicted");
        assert!(similarity(&h1, &h2) > 0.7);
    }

    #[test]
    fn simhash_different_text_diverges() {
        let h1 = simhash("Heavy snowfall expected in Niseko area tonight");
        let h2 = simhash("Local restaurant opens new branch in Hirafu village");
        assert!(similarity(&h1, &h2) < 0.9);
    }

    #[test]
    fn similarity_bounds_and_identity() {
        let h = simhash("Road closure on Route 5 due to heavy snow");
        assert!((similarity(&h, &h) - 1.0).abs() < f64::EPSILON);

        let other = simhash("Completely unrelated municipal budget meeting agenda");
        let s = similarity(&h, &other);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn hamming_distance_hex() {
        assert_eq!(hamming_distance("ff", "ff"), 0);
        assert_eq!(hamming_distance("ff", "00"), 8);
        assert_eq!(hamming_distance("f0", "0f"), 8);
    }

    #[test]
    fn is_duplicate_near_identical() {
        let h1 = simhash("Breaking: Road closure on Route 5 due to heavy snow");
        let h2 = simhash("Breaking: Road closure on Route 5 due to heavy snowfall");
        assert!(is_duplicate(&h1, &h2, 0.8));
    }

    #[test]
    fn tokenize_strips_punctuation_and_case() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
        assert_eq!(tokenize("  "), Vec::<String>::new());
    }
}
