//! Exponential backoff with jitter.
//!
//! The delay for attempt `k` (1-based) is centered on `base * 2^(k-1)` and
//! spread uniformly by `±jitter_fraction` of that center, then clamped into
//! `[0, max]`.

use rand::Rng;
use std::time::Duration;

/// Unjittered delay for `attempt`, clamped to `max_ms`.
pub fn backoff_center_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    if attempt == 0 {
        return 0;
    }
    exponential_ms(attempt, base_ms).min(max_ms)
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, jitter_fraction: f64) -> Duration {
    calculate_backoff_with(attempt, base_ms, max_ms, jitter_fraction, &mut rand::thread_rng())
}

/// Same as [`calculate_backoff`] with an explicit random source.
pub fn calculate_backoff_with<R: Rng + ?Sized>(
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    jitter_fraction: f64,
    rng: &mut R,
) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential = exponential_ms(attempt, base_ms) as f64;
    let spread = exponential * jitter_fraction.clamp(0.0, 1.0);
    let jitter = if spread > 0.0 {
        rng.gen_range(-spread..=spread)
    } else {
        0.0
    };

    // Jitter may push below zero or past the cap; both ends are clamped.
    let delay = (exponential + jitter).clamp(0.0, max_ms as f64);
    Duration::from_millis(delay.round() as u64)
}

fn exponential_ms(attempt: u32, base_ms: u64) -> u64 {
    let exponential_base = 2u64.saturating_pow(attempt - 1);
    base_ms.saturating_mul(exponential_base)
}
