//! Window arithmetic for collection and analysis scheduling.
//!
//! Every function here is pure: callers pass the current time explicitly
//! (as a `DateTime<Utc>` or as whole epoch minutes) so the same inputs always
//! produce the same window. Minutes are absolute minutes since the Unix epoch.

use chrono::{DateTime, Duration, DurationRound, Utc};

use crate::domain::models::BaselineWindow;
use crate::domain::ports::minute_to_datetime;

/// Length of one analysis window and of the scheduler's poll cadence.
pub const ANALYSIS_WINDOW_MINUTES: i64 = 15;

/// Width of one collection request.
pub const COLLECTION_INTERVAL_MINUTES: i64 = 15;

/// History kept for predictive analysis; also the catch-up horizon.
pub const HISTORY_MINUTES: i64 = 120;

/// Providers lag behind real time by this much.
pub const COLLECTION_DELAY_MINUTES: i64 = 2;

/// Slack added to the two hour horizon for analysis catch-up.
pub const ANALYSIS_BUFFER_MINUTES: i64 = 2 * ANALYSIS_WINDOW_MINUTES;

/// How close to `now` a grid point must be for a throttled collection to run.
pub const COLLECTION_TOLERANCE_SECS: i64 = 150;

/// Round `minute` down to a multiple of the analysis window.
pub const fn floor_to_window(minute: i64) -> i64 {
    minute - minute.rem_euclid(ANALYSIS_WINDOW_MINUTES)
}

/// Round `minute - offset` up to a multiple of the analysis window.
pub const fn ceil_to_window(minute: i64, offset: i64) -> i64 {
    let m = minute - offset;
    let rem = m.rem_euclid(ANALYSIS_WINDOW_MINUTES);
    if rem == 0 {
        m
    } else {
        m + ANALYSIS_WINDOW_MINUTES - rem
    }
}

/// `now - offset` moved back onto the collection grid, whose windows start
/// one minute past each 15 minute boundary.
pub const fn floored_collection_start(now_minute: i64, offset: i64) -> i64 {
    let start = now_minute - offset;
    start - (start - 1).rem_euclid(ANALYSIS_WINDOW_MINUTES)
}

/// Whether `minute` lies more than two hours (plus the analysis buffer when
/// `include_buffer`) before `now_minute`.
pub const fn is_before_two_hours(minute: i64, include_buffer: bool, now_minute: i64) -> bool {
    let buffer = if include_buffer { ANALYSIS_BUFFER_MINUTES } else { 0 };
    minute + HISTORY_MINUTES + buffer < now_minute
}

/// Step `minute` forward in whole windows until it is inside the catch-up
/// horizon. Keeps the 15 minute alignment of the input.
pub const fn first_analysis_minute_in_past_two_hours(minute: i64, now_minute: i64) -> i64 {
    let horizon = now_minute - HISTORY_MINUTES - ANALYSIS_BUFFER_MINUTES;
    if minute >= horizon {
        return minute;
    }
    let gap = horizon - minute;
    let steps = (gap + ANALYSIS_WINDOW_MINUTES - 1) / ANALYSIS_WINDOW_MINUTES;
    minute + steps * ANALYSIS_WINDOW_MINUTES
}

/// Collection throttle for a given time since the last collection: `None`
/// means collect on every tick, otherwise collect on an N minute grid.
pub fn collection_interval(elapsed: Duration) -> Option<i64> {
    if elapsed <= Duration::minutes(10) {
        None
    } else if elapsed < Duration::minutes(30) {
        Some(5)
    } else if elapsed < Duration::minutes(60) {
        Some(10)
    } else {
        Some(15)
    }
}

/// Grid point at or before `now` that is within the tolerance of `now`,
/// stepping from `last_collection` by `interval_minutes`.
pub fn next_allowed_time(
    now: DateTime<Utc>,
    last_collection: DateTime<Utc>,
    interval_minutes: i64,
) -> Option<DateTime<Utc>> {
    if last_collection > now || interval_minutes <= 0 {
        return None;
    }
    let step_ms = interval_minutes * 60_000;
    let elapsed_ms = (now - last_collection).num_milliseconds();
    let candidate = last_collection + Duration::milliseconds(elapsed_ms / step_ms * step_ms);
    (candidate + Duration::seconds(COLLECTION_TOLERANCE_SECS) > now).then_some(candidate)
}

/// Whether the graduated collection backoff admits a collection at `now`.
pub fn is_collection_due(last_collection: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let current = now.duration_trunc(Duration::minutes(1)).unwrap_or(now);
    match collection_interval(current - last_collection) {
        None => true,
        Some(interval) => next_allowed_time(current, last_collection, interval).is_some(),
    }
}

/// Inclusive time range handed to a data collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CollectionWindow {
    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

/// End minute of the next metric collection: two minutes behind `now`,
/// floored to the collection grid.
pub const fn metric_collection_end_minute(now_minute: i64) -> i64 {
    let end = now_minute - COLLECTION_DELAY_MINUTES;
    end - end.rem_euclid(COLLECTION_INTERVAL_MINUTES)
}

/// Next metric collection window, if at least one collection interval wide.
///
/// The first collection reaches back over the full history. After a gap of
/// more than two hours the window restarts at four hours back, so the
/// restarted analysis still has two hours of history behind it.
pub fn metric_collection_window(now_minute: i64, max_collection_minute: Option<i64>) -> Option<CollectionWindow> {
    let end_minute = metric_collection_end_minute(now_minute);
    let end = minute_to_datetime(end_minute);
    let start = match max_collection_minute.filter(|m| *m > 0) {
        None => end - Duration::minutes(HISTORY_MINUTES + ANALYSIS_WINDOW_MINUTES),
        Some(max) if end_minute - max > HISTORY_MINUTES => end - Duration::minutes(2 * HISTORY_MINUTES),
        Some(max) => minute_to_datetime(max),
    };
    (end - start >= Duration::minutes(COLLECTION_INTERVAL_MINUTES)).then_some(CollectionWindow { start, end })
}

/// First minute of the next log collection.
pub const fn log_collection_start_minute(
    now_minute: i64,
    max_collection_minute: Option<i64>,
    baseline: BaselineWindow,
) -> i64 {
    let Some(max) = max_collection_minute else {
        return baseline.start_minute;
    };
    if max <= 0 {
        return baseline.start_minute;
    }
    if max == baseline.end_minute {
        if is_before_two_hours(baseline.end_minute, false, now_minute) {
            return floored_collection_start(now_minute, HISTORY_MINUTES);
        }
        return max + 1;
    }
    if baseline.strictly_contains(max) || !is_before_two_hours(max, false, now_minute) {
        max + 1
    } else {
        floored_collection_start(now_minute, HISTORY_MINUTES)
    }
}

/// Outcome of planning the next log collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCollectionPlan {
    Collect(CollectionWindow),
    /// The next window has not fully elapsed yet.
    NotYet,
    /// A bounded predictive run has collected everything it needs.
    Complete,
}

/// Plan the next log collection for a configuration.
///
/// Predictive configurations past their baseline collect one minute at a
/// time; with a `predictive_duration` they stop once that many minutes past
/// the baseline have been collected.
pub fn log_collection_plan(
    now: DateTime<Utc>,
    max_collection_minute: Option<i64>,
    baseline: BaselineWindow,
    predictive: bool,
    predictive_duration: Option<i64>,
) -> LogCollectionPlan {
    let now_minute = now.timestamp().div_euclid(60);
    let start_minute = log_collection_start_minute(now_minute, max_collection_minute, baseline);
    let start = minute_to_datetime(start_minute);
    let mut end = start + Duration::minutes(COLLECTION_INTERVAL_MINUTES) - Duration::milliseconds(1);

    let past_baseline = max_collection_minute.is_some_and(|max| max >= baseline.end_minute);
    if predictive && past_baseline {
        end = start + Duration::minutes(1);
        let collected_through = max_collection_minute.unwrap_or(i64::MIN);
        if predictive_duration.is_some_and(|d| collected_through >= baseline.end_minute + d) {
            return LogCollectionPlan::Complete;
        }
    }

    if end < minute_to_datetime(now_minute - COLLECTION_DELAY_MINUTES) {
        LogCollectionPlan::Collect(CollectionWindow { start, end })
    } else {
        LogCollectionPlan::NotYet
    }
}

/// Where the next time-series analysis resumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStart {
    /// No analysis yet: one window behind the last collected minute.
    First(i64),
    /// Continue directly after the last analysed minute.
    Continue(i64),
    /// The last analysis is older than two hours; resume two hours back,
    /// keeping the previous 15 minute alignment.
    Restart(i64),
}

impl AnalysisStart {
    pub const fn minute(&self) -> i64 {
        match self {
            Self::First(m) | Self::Continue(m) | Self::Restart(m) => *m,
        }
    }
}

pub const fn time_series_analysis_start(
    last_collection_minute: i64,
    last_analysis_minute: Option<i64>,
    now_minute: i64,
) -> AnalysisStart {
    let last = match last_analysis_minute {
        Some(m) if m > 0 => m,
        _ => return AnalysisStart::First(last_collection_minute - ANALYSIS_WINDOW_MINUTES),
    };
    if last + HISTORY_MINUTES < now_minute {
        let restart = now_minute - HISTORY_MINUTES;
        return AnalysisStart::Restart(restart - (restart - last).rem_euclid(ANALYSIS_WINDOW_MINUTES));
    }
    AnalysisStart::Continue(last)
}

/// Earliest minute whose in-flight tasks block a restarted analysis.
pub const fn restart_guard_minute(restart_minute: i64) -> i64 {
    restart_minute - HISTORY_MINUTES - 60
}

/// Whether L1 clustering has nothing to do: no fresh collection in the last
/// two hours (plus buffer) or no fresh H0 heartbeats. Never true while the
/// last collection is inside the baseline.
pub const fn is_l1_stale(
    last_collection_minute: i64,
    max_h0_minute: i64,
    baseline: BaselineWindow,
    now_minute: i64,
) -> bool {
    if last_collection_minute > baseline.start_minute && last_collection_minute <= baseline.end_minute {
        return false;
    }
    is_before_two_hours(last_collection_minute, true, now_minute) || is_before_two_hours(max_h0_minute, false, now_minute)
}

/// First minute to cluster at L1. A stale start outside the baseline jumps
/// forward to the window boundary two hours back.
pub const fn l1_start_minute(min_h0_minute: i64, baseline: BaselineWindow, now_minute: i64) -> i64 {
    if is_before_two_hours(min_h0_minute, false, now_minute) && !baseline.contains(min_h0_minute) {
        ceil_to_window(now_minute, HISTORY_MINUTES)
    } else {
        min_h0_minute
    }
}

/// Heartbeat extents the L2 minute is chosen from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct L2Inputs {
    pub min_h1: Option<i64>,
    pub max_h1: Option<i64>,
    pub last_h2: Option<i64>,
    pub last_hf: Option<i64>,
}

/// Minute ending the next L2 clustering window, if one is due.
pub fn l2_clustering_minute(inputs: L2Inputs, baseline: BaselineWindow, now_minute: i64) -> Option<i64> {
    let min_h1 = inputs.min_h1.filter(|m| *m > 0)?;
    let max_h1 = inputs.max_h1.unwrap_or(min_h1);
    if max_h1 - min_h1 < ANALYSIS_WINDOW_MINUTES - 1 {
        return None;
    }

    let candidate = match (inputs.last_h2, inputs.last_hf) {
        (None, None) => min_h1 + ANALYSIS_WINDOW_MINUTES - 1,
        (h2, Some(hf)) if hf > h2.unwrap_or(i64::MIN) => hf + ANALYSIS_WINDOW_MINUTES,
        (Some(h2), _) => h2 + ANALYSIS_WINDOW_MINUTES,
        (None, Some(hf)) => hf + ANALYSIS_WINDOW_MINUTES,
    };
    if candidate > now_minute {
        return None;
    }

    let aligned = ceil_to_window(candidate, 0);
    if !baseline.contains(aligned) && is_before_two_hours(aligned, true, now_minute) {
        return Some(first_analysis_minute_in_past_two_hours(aligned, now_minute));
    }
    Some(aligned)
}

/// Inputs for choosing the next log-ML analysis minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogMlInputs {
    pub min_h2: Option<i64>,
    pub max_h2: Option<i64>,
    pub last_analysis: Option<i64>,
}

/// Minute ending the next log-ML analysis window, if one is due.
pub fn log_ml_analysis_end_minute(inputs: LogMlInputs, baseline: BaselineWindow, now_minute: i64) -> Option<i64> {
    let min_h2 = inputs.min_h2?;
    let max_h2 = inputs.max_h2?;

    let end = match inputs.last_analysis.filter(|m| *m > 0 && *m >= baseline.start_minute) {
        None => min_h2 + ANALYSIS_WINDOW_MINUTES - 1,
        Some(last) if baseline.strictly_contains(last) => last + ANALYSIS_WINDOW_MINUTES,
        Some(last) if is_before_two_hours(last, true, now_minute) => {
            first_analysis_minute_in_past_two_hours(last, now_minute)
        }
        Some(last) => last + ANALYSIS_WINDOW_MINUTES,
    };

    if end > now_minute || end < baseline.start_minute || end > max_h2 {
        return None;
    }
    Some(ceil_to_window(end, 0))
}

/// Next feedback analysis minute.
///
/// `candidate_has_log_ml` reports whether a log-ML record exists at
/// `last_feedback + 15`.
pub fn next_feedback_minute(
    last_log_ml: Option<i64>,
    last_feedback: Option<i64>,
    candidate_has_log_ml: bool,
) -> Option<i64> {
    let last_log_ml = last_log_ml.filter(|m| *m > 0)?;
    let Some(last_feedback) = last_feedback.filter(|m| *m > 0) else {
        return Some(last_log_ml);
    };
    if candidate_has_log_ml {
        Some(last_feedback + ANALYSIS_WINDOW_MINUTES)
    } else if last_log_ml > last_feedback {
        Some(last_log_ml)
    } else {
        None
    }
}
