//! Deterministic feature hashing of text into a fixed-size vector.

use ahash::RandomState;
use std::collections::HashSet;

// Fixed seeds keep vectors stable across runs of the same build.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Hash a string to a fixed-size, L2-normalized vector
///
/// Character trigrams add 1.0 to their bucket, whole words add 2.0.
pub fn hash_text_to_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dim];
    if dim == 0 {
        return vector;
    }
    let state = RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]);
    let normalized = text.to_lowercase();

    for trigram in generate_trigrams(&normalized) {
        let pos = (state.hash_one(trigram.as_str()) as usize) % dim;
        vector[pos] += 1.0;
    }

    for word in normalized.split_whitespace() {
        let pos = (state.hash_one(word) as usize) % dim;
        vector[pos] += 2.0;
    }

    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for v in &mut vector {
            *v /= magnitude;
        }
    }

    vector
}

/// Generate character trigrams from a string
fn generate_trigrams(s: &str) -> HashSet<String> {
    let padded = format!("  {}  ", s);
    let chars: Vec<char> = padded.chars().collect();

    chars.windows(3).map(|w| w.iter().collect::<String>()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_text_to_vector() {
        let vec1 = hash_text_to_vector("hello world", 64);
        let vec2 = hash_text_to_vector("hello world", 64);
        let vec3 = hash_text_to_vector("goodbye moon", 64);

        assert_eq!(vec1.len(), 64);
        assert_eq!(vec1, vec2);
        assert_ne!(vec1, vec3);

        let magnitude: f32 = vec1.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(hash_text_to_vector("Rust", 32), hash_text_to_vector("rust", 32));
    }

    #[test]
    fn test_trigram_generation() {
        let trigrams = generate_trigrams("hello");
        assert!(trigrams.contains("hel"));
        assert!(trigrams.contains("ell"));
        assert!(trigrams.contains("llo"));
    }
}
