//! Byte-statistics integrity evaluation.
//!
//! The evaluator judges raw evidence bytes without parsing them. It computes
//! Shannon entropy, the dominance of the most frequent byte and the ratio of
//! distinct byte values, raises flags for out-of-band values, and composes a
//! score in `[0, 1]`:
//!
//! ```text
//! score = 0.5 * entropy_component + 0.3 * (1 - repetition_ratio) + 0.2 * uniqueness_component
//! ```
//!
//! - `entropy_component` is `1.0` inside the healthy band `[3.5, 7.5]`, falls
//!   linearly to `0.0` at `0` bits below it and at `8` bits above it.
//! - `uniqueness_component` is `unique_byte_ratio / 0.08`, capped at `1.0`.
//!
//! Evidence is usable only when the score clears [`MIN_SCORE`] and no flag
//! was raised.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const VALIDATOR_VERSION: &str = "integrity_v1";

pub const MIN_SCORE: f64 = 0.45;
pub const MAX_REPETITION_RATIO: f64 = 0.35;
pub const MIN_UNIQUE_RATIO: f64 = 0.08;
pub const ENTROPY_BAND: (f64, f64) = (3.5, 7.5);

const MAX_ENTROPY: f64 = 8.0;
const ENTROPY_WEIGHT: f64 = 0.5;
const REPETITION_WEIGHT: f64 = 0.3;
const UNIQUENESS_WEIGHT: f64 = 0.2;

pub const FLAG_EMPTY: &str = "empty_content";
pub const FLAG_LOW_ENTROPY: &str = "low_entropy_template_like";
pub const FLAG_HIGH_ENTROPY: &str = "high_entropy_noise_like";
pub const FLAG_REPETITION: &str = "excessive_repetition";
pub const FLAG_LOW_UNIQUE: &str = "low_unique_content";

/// Deterministic integrity assessment of a byte sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityResult {
    pub integrity_score: f64,
    pub usable_for_reasoning: bool,
    pub flags: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub validator_version: String,
}

/// Evaluate raw bytes. Pure and deterministic.
pub fn evaluate(raw: &[u8]) -> IntegrityResult {
    let mut metrics = BTreeMap::new();
    let length = raw.len();
    metrics.insert("byte_length".to_string(), length as f64);

    if length == 0 {
        return IntegrityResult {
            integrity_score: 0.0,
            usable_for_reasoning: false,
            flags: vec![FLAG_EMPTY.to_string()],
            metrics,
            validator_version: VALIDATOR_VERSION.to_string(),
        };
    }

    let histogram = byte_histogram(raw);
    let mut flags = Vec::new();

    let entropy = shannon_entropy(&histogram, length);
    metrics.insert("entropy".to_string(), entropy);
    if entropy < ENTROPY_BAND.0 {
        flags.push(FLAG_LOW_ENTROPY.to_string());
    }
    if entropy > ENTROPY_BAND.1 {
        flags.push(FLAG_HIGH_ENTROPY.to_string());
    }

    let repetition_ratio = repetition_ratio(&histogram, length);
    metrics.insert("repetition_ratio".to_string(), repetition_ratio);
    if repetition_ratio > MAX_REPETITION_RATIO {
        flags.push(FLAG_REPETITION.to_string());
    }

    let unique_ratio = unique_byte_ratio(&histogram, length);
    metrics.insert("unique_byte_ratio".to_string(), unique_ratio);
    if unique_ratio < MIN_UNIQUE_RATIO {
        flags.push(FLAG_LOW_UNIQUE.to_string());
    }

    let integrity_score = compose_score(entropy, repetition_ratio, unique_ratio);
    let usable_for_reasoning = integrity_score >= MIN_SCORE && flags.is_empty();

    IntegrityResult {
        integrity_score,
        usable_for_reasoning,
        flags,
        metrics,
        validator_version: VALIDATOR_VERSION.to_string(),
    }
}

fn byte_histogram(raw: &[u8]) -> [u64; 256] {
    let mut counts = [0u64; 256];
    for byte in raw {
        counts[usize::from(*byte)] += 1;
    }
    counts
}

/// Bits per byte.
fn shannon_entropy(histogram: &[u64; 256], length: usize) -> f64 {
    let total = length as f64;
    histogram
        .iter()
        .filter(|count| **count > 0)
        .map(|count| {
            let p = *count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

fn repetition_ratio(histogram: &[u64; 256], length: usize) -> f64 {
    let most_common = histogram.iter().copied().max().unwrap_or(0);
    most_common as f64 / length as f64
}

fn unique_byte_ratio(histogram: &[u64; 256], length: usize) -> f64 {
    let distinct = histogram.iter().filter(|count| **count > 0).count();
    distinct as f64 / length as f64
}

fn compose_score(entropy: f64, repetition_ratio: f64, unique_ratio: f64) -> f64 {
    let (low, high) = ENTROPY_BAND;
    let entropy_component = if entropy < low {
        entropy / low
    } else if entropy > high {
        (MAX_ENTROPY - entropy) / (MAX_ENTROPY - high)
    } else {
        1.0
    };
    let repetition_component = 1.0 - repetition_ratio;
    let uniqueness_component = unique_ratio / MIN_UNIQUE_RATIO;

    let score = ENTROPY_WEIGHT * entropy_component.clamp(0.0, 1.0)
        + REPETITION_WEIGHT * repetition_component.clamp(0.0, 1.0)
        + UNIQUENESS_WEIGHT * uniqueness_component.clamp(0.0, 1.0);
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 600 bytes cycling through the 95 printable ASCII characters.
    fn healthy_bytes() -> Vec<u8> {
        (0..600u32).map(|i| 32 + (i % 95) as u8).collect()
    }

    #[test]
    fn empty_input_short_circuits() {
        let result = evaluate(b"");
        assert_eq!(result.integrity_score, 0.0);
        assert!(!result.usable_for_reasoning);
        assert_eq!(result.flags, vec![FLAG_EMPTY.to_string()]);
        assert_eq!(result.metrics.get("byte_length"), Some(&0.0));
        assert!(!result.metrics.contains_key("entropy"));
    }

    #[test]
    fn healthy_bytes_are_usable() {
        let result = evaluate(&healthy_bytes());
        assert!(result.flags.is_empty(), "flags: {:?}", result.flags);
        assert!(result.usable_for_reasoning);
        assert!(result.integrity_score > 0.9);
        assert_eq!(result.validator_version, VALIDATOR_VERSION);
        let entropy = result.metrics["entropy"];
        assert!(entropy > 6.5 && entropy < 6.6, "entropy {entropy}");
    }

    #[test]
    fn single_repeated_byte_is_flagged() {
        let result = evaluate(&[b'a'; 64]);
        assert!(result.flags.contains(&FLAG_LOW_ENTROPY.to_string()));
        assert!(result.flags.contains(&FLAG_REPETITION.to_string()));
        assert!(result.flags.contains(&FLAG_LOW_UNIQUE.to_string()));
        assert_eq!(result.metrics["entropy"], 0.0);
        assert_eq!(result.metrics["repetition_ratio"], 1.0);
        assert!(!result.usable_for_reasoning);
    }

    #[test]
    fn uniform_bytes_are_flagged_as_noise() {
        let raw: Vec<u8> = (0..=255u8).collect();
        let result = evaluate(&raw);
        assert_eq!(result.flags, vec![FLAG_HIGH_ENTROPY.to_string()]);
        assert!(!result.usable_for_reasoning);
        assert!((result.metrics["entropy"] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn any_flag_vetoes_usability_even_with_high_score() {
        // Healthy entropy and repetition, but too few distinct values for the length.
        let raw: Vec<u8> = (0..2_000u32).map(|i| 32 + (i % 95) as u8).collect();
        let result = evaluate(&raw);
        assert_eq!(result.flags, vec![FLAG_LOW_UNIQUE.to_string()]);
        assert!(result.integrity_score >= MIN_SCORE);
        assert!(!result.usable_for_reasoning);
    }

    #[test]
    fn score_is_clipped_to_unit_interval() {
        for raw in [healthy_bytes(), vec![0u8; 10], (0..=255u8).collect()] {
            let score = evaluate(&raw).integrity_score;
            assert!((0.0..=1.0).contains(&score), "score {score}");
        }
    }

    #[test]
    fn score_penalizes_repetition() {
        let clean = compose_score(5.0, 0.1, 0.2);
        let repetitive = compose_score(5.0, 0.3, 0.2);
        assert!(clean > repetitive);
        let sparse = compose_score(5.0, 0.1, 0.02);
        assert!(clean > sparse);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let raw = healthy_bytes();
        assert_eq!(evaluate(&raw), evaluate(&raw));
    }
}
