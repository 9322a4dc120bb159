//! Fibonacci backoff for re-creating failed service guard tasks.
//!
//! Each failure of a (scope, minute) window pushes the next task further
//! out. The delay is `backoff_count * BACKOFF_UNIT`, where the count walks a
//! capped Fibonacci-like table: 1, 2, 3, 5, 8, ...

use std::sync::LazyLock;

use chrono::{DateTime, Duration, DurationRound, Utc};

/// Number of terms in the backoff table.
pub const BACKOFF_LIMIT: usize = 10;

/// Wall-clock length of one backoff step.
pub const BACKOFF_UNIT_MINUTES: i64 = 5;

static FIBONACCI: LazyLock<[u32; BACKOFF_LIMIT]> = LazyLock::new(|| {
    let mut table = [1u32; BACKOFF_LIMIT];
    table[1] = 2;
    for i in 2..BACKOFF_LIMIT {
        table[i] = table[i - 1] + table[i - 2];
    }
    table
});

/// The full backoff table.
pub fn backoff_sequence() -> &'static [u32] {
    FIBONACCI.as_slice()
}

/// Largest backoff count ever handed out.
pub fn max_backoff_count() -> u32 {
    FIBONACCI[BACKOFF_LIMIT - 1]
}

/// Next backoff count after `previous`: the smallest table term greater than
/// it, or the last term once the table is exhausted.
pub fn next_backoff_count(previous: u32) -> u32 {
    FIBONACCI
        .iter()
        .copied()
        .find(|&term| term > previous)
        .unwrap_or_else(max_backoff_count)
}

/// Earliest instant a task may be re-created after a fork last touched at
/// `last_updated` with `backoff_count`.
pub fn next_schedulable_time(last_updated: DateTime<Utc>, backoff_count: u32) -> DateTime<Utc> {
    last_updated + Duration::minutes(i64::from(backoff_count) * BACKOFF_UNIT_MINUTES)
}

/// Whether `now`, floored to the minute, has reached the next schedulable time.
pub fn is_past_backoff(last_updated: DateTime<Utc>, backoff_count: u32, now: DateTime<Utc>) -> bool {
    let current_minute = now.duration_trunc(Duration::minutes(1)).unwrap_or(now);
    next_schedulable_time(last_updated, backoff_count) <= current_minute
}
