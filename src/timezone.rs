//! DST-safe conversion from a civil (year/month/day/hour/minute/second)
//! wall-clock reading in a named zone to a UTC instant.
//!
//! `chrono_tz::Tz::with_ymd_and_hms`/`from_local_datetime` return
//! `LocalResult::None` for a local time that never occurred (the hour
//! skipped when clocks spring forward) and `LocalResult::Ambiguous` for one
//! that occurred twice (the hour repeated when clocks fall back). Both are
//! reachable with an entirely valid `anchor_hour`/`timezone` configuration,
//! so resolution here never panics.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Resolve a local wall-clock reading in `tz` to UTC.
///
/// An ambiguous reading resolves to its earlier offset. A reading that
/// doesn't exist (a DST gap) retries one hour later, which always has a
/// valid mapping on the far side of the gap; if even that is somehow
/// unresolvable, falls back to treating the wall-clock reading as UTC
/// directly rather than panicking.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _latest) => earliest.with_timezone(&Utc),
        LocalResult::None => match tz.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _latest) => earliest.with_timezone(&Utc),
            LocalResult::None => DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc),
        },
    }
}
