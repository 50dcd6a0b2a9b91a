//! Bulk schedule computation
//!
//! Turns "N items plus a distribution policy" into N absolute dispatch
//! timestamps. This is a pure function of its inputs (item count, policy,
//! current time, timezone offset) with no side effects, so the whole
//! algorithm is testable in isolation; persisting the resulting entries is
//! the orchestrator's job.
//!
//! Policies:
//! - **Fixed interval**: `t_i = now + i * interval`.
//! - **Once daily**: anchor today at a fixed local time-of-day, then one
//!   item per calendar day.
//! - **Bounded window**: spread the items across a local time-of-day window
//!   (e.g., "morning 06:00-09:00"), starting no earlier than now and
//!   wrapping to the next day's window whenever the cursor walks past the
//!   end. The step is the full window span divided by N; the wrap restarts
//!   at the next day's window start with no interpolated carry, so spacing
//!   across the wrap boundary may be uneven.

use crate::config::SchedulingWindow;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// How a batch of deferred jobs is distributed over time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulePolicy {
    /// One item every `interval_minutes`, starting now
    Every {
        /// Minutes between consecutive items
        interval_minutes: u32,
    },
    /// One item per day, anchored to a local time-of-day
    OnceDaily {
        /// Local time-of-day each item runs at
        #[serde(with = "naive_time_format")]
        at: NaiveTime,
    },
    /// Items spread across a bounded local time-of-day window, wrapping to
    /// the next day when the window is exhausted
    Window(SchedulingWindow),
}

/// Compute the absolute run times for a batch of `count` deferred jobs
///
/// `now` is the reference instant; `offset` is the local timezone used to
/// anchor daily and windowed policies. The returned sequence always has
/// exactly `count` entries and is monotonically non-decreasing.
///
/// # Errors
///
/// Returns [`Error::InvalidPolicy`] when `count` is zero, when a window has
/// `end <= start`, or when the fixed interval is zero.
pub fn compute_run_times(
    count: usize,
    policy: &SchedulePolicy,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Vec<DateTime<Utc>>> {
    if count == 0 {
        return Err(Error::InvalidPolicy(
            "item count must be at least 1".to_string(),
        ));
    }

    match policy {
        SchedulePolicy::Every { interval_minutes } => {
            if *interval_minutes == 0 {
                return Err(Error::InvalidPolicy(
                    "fixed interval must be at least one minute".to_string(),
                ));
            }
            let interval = Duration::minutes(i64::from(*interval_minutes));
            Ok((0..count as i64).map(|i| now + interval * i as i32).collect())
        }

        SchedulePolicy::OnceDaily { at } => {
            let local_now = now.with_timezone(&offset).naive_local();
            let anchor = local_now.date().and_time(*at);
            (0..count as i64)
                .map(|i| to_utc(anchor + Duration::days(i), offset))
                .collect()
        }

        SchedulePolicy::Window(window) => compute_window_times(count, *window, now, offset),
    }
}

/// Bounded-window distribution with day wraparound
///
/// The interval is the configured window span divided by N, computed before
/// the cursor is advanced to `now`. When the cursor walks past the window
/// end it restarts at the next day's window start; the overflow remainder is
/// dropped rather than carried forward.
fn compute_window_times(
    count: usize,
    window: SchedulingWindow,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Vec<DateTime<Utc>>> {
    if window.end <= window.start {
        return Err(Error::InvalidPolicy(format!(
            "scheduling window is empty: start {} end {}",
            window.start, window.end
        )));
    }

    let span = window.end - window.start;
    let interval = Duration::seconds(span.num_seconds() / count as i64);

    let local_now = now.with_timezone(&offset).naive_local();
    let today = local_now.date();
    let window_start = today.and_time(window.start);
    let mut window_end = today.and_time(window.end);

    let mut cursor = window_start.max(local_now);

    let mut run_times = Vec::with_capacity(count);
    for _ in 0..count {
        if cursor > window_end {
            let next_day = window_end.date() + Duration::days(1);
            cursor = next_day.and_time(window.start);
            window_end = next_day.and_time(window.end);
        }
        run_times.push(to_utc(cursor, offset)?);
        cursor += interval;
    }

    Ok(run_times)
}

/// Interpret a naive local datetime in the given fixed offset
fn to_utc(local: NaiveDateTime, offset: FixedOffset) -> Result<DateTime<Utc>> {
    local
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::Internal(format!("unrepresentable local time: {}", local)))
}

/// Build a `FixedOffset` from a configured offset in minutes east of UTC
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
    FixedOffset::east_opt(minutes * 60).ok_or_else(|| Error::Config {
        message: format!("invalid UTC offset: {} minutes", minutes),
        key: Some("utc_offset_minutes".to_string()),
    })
}

/// Serde module for NaiveTime as HH:MM:SS strings
mod naive_time_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M"))
            .map_err(serde::de::Error::custom)
    }
}
