//! Case scoring.
//!
//! `score = round(BASE_SCORE / (minutes + 1) / attempts * multiplier)`: faster
//! solves, fewer attempts and harder cases score higher. The functions here
//! never panic; invalid inputs score zero.

use crate::case::Difficulty;

/// Score of an instant first-attempt solve on an easy case
pub const BASE_SCORE: f64 = 1000.0;

const MS_PER_MINUTE: f64 = 60_000.0;

/// Score for a solved case.
///
/// `duration_ms` is the elapsed duration including penalties. Zero attempts
/// is not a valid solve and scores 0.
pub fn case_score(duration_ms: u64, attempts: u32, difficulty: Difficulty) -> u64 {
    if attempts == 0 {
        return 0;
    }

    let minutes = duration_ms as f64 / MS_PER_MINUTE;
    let time_factor = BASE_SCORE / (minutes + 1.0);
    let attempt_factor = 1.0 / f64::from(attempts);

    sanitize_score(time_factor * attempt_factor * difficulty.multiplier())
}

/// Round a raw score, coercing NaN, infinities and negatives to 0
pub fn sanitize_score(raw: f64) -> u64 {
    if raw.is_finite() && raw >= 0.0 {
        raw.round() as u64
    } else {
        0
    }
}

/// Sum of case scores
pub fn total_score(scores: &[u64]) -> u64 {
    scores.iter().fold(0u64, |acc, s| acc.saturating_add(*s))
}

/// Mean duration in milliseconds, rounded; 0 for no durations
pub fn average_time_ms(durations: &[u64]) -> u64 {
    if durations.is_empty() {
        return 0;
    }
    let sum: u128 = durations.iter().map(|d| u128::from(*d)).sum();
    let len = durations.len() as u128;
    ((sum + len / 2) / len) as u64
}
