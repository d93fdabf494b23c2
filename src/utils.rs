//! Utility functions for the meeting matcher

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Generate a new unique session ID
pub fn generate_session_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique matching attempt ID
pub fn generate_attempt_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// How long a participant has been waiting since `joined_at`
pub fn wait_duration(joined_at: DateTime<Utc>) -> Duration {
    (current_timestamp() - joined_at)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Number of `k`-element subsets of an `n`-element set.
///
/// Returns `u128::MAX` when the count does not fit.
pub fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        // C(n, i + 1) = C(n, i) * (n - i) / (i + 1), divided out first so
        // only a count that really overflows saturates
        let divisor = i as u128 + 1;
        let g = gcd(result, divisor);
        let factor = (n - i) as u128 / (divisor / g);
        match (result / g).checked_mul(factor) {
            Some(next) => result = next,
            None => return u128::MAX,
        }
    }
    result
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
