use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::timezone::resolve_local;

/// A fixed-length 5-hour window anchored at a user-configured hour of day,
/// carrying an optional token budget for progress display.
///
/// `Block` is a pure presentation-facing value object: the server assigns
/// no storage or RPC behavior to it, only the dashboard's progress display
/// consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub token_limit: Option<u64>,
}

/// Window length is an invariant of the type, not configurable.
const WINDOW_HOURS: i64 = 5;

impl Block {
    /// Resolve the block containing `now`, or the next upcoming block if
    /// `now` precedes today's anchor instant.
    ///
    /// `anchor_hour` is 0..=23 in `tz`. The reference instant is
    /// `anchor_hour:00` today in `tz`. If `now` is at or after that
    /// instant, the block is found by walking the periodic 5h grid
    /// forward from the reference. If `now` precedes it, the next
    /// upcoming block is today's anchor window itself (not yet active).
    pub fn resolve(now: DateTime<Utc>, anchor_hour: u32, tz: Tz, token_limit: Option<u64>) -> Self {
        let local_now = now.with_timezone(&tz);
        let naive_anchor = NaiveDate::from_ymd_opt(local_now.year(), local_now.month(), local_now.day())
            .and_then(|d| d.and_hms_opt(anchor_hour.min(23), 0, 0))
            .expect("year/month/day from an existing local DateTime and an hour clamped to 0..=23 are always valid");
        let reference = resolve_local(tz, naive_anchor);

        let start_at = if now >= reference {
            let elapsed_hours = (now - reference).num_seconds() / 3600;
            let block_index = elapsed_hours / WINDOW_HOURS;
            reference + Duration::hours(block_index * WINDOW_HOURS)
        } else {
            reference
        };

        Block {
            start_at,
            end_at: start_at + Duration::hours(WINDOW_HOURS),
            token_limit,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now < self.end_at
    }

    pub fn seconds_until_reset(&self, now: DateTime<Utc>) -> i64 {
        (self.end_at - now).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::UTC;

    #[test]
    fn resolves_window_containing_now_after_anchor() {
        // Anchor 9am UTC; "now" is 11am same day -> block is [9am, 2pm).
        let now = Utc.with_ymd_and_hms(2024, 6, 29, 11, 0, 0).unwrap();
        let block = Block::resolve(now, 9, UTC, None);
        assert_eq!(block.start_at, Utc.with_ymd_and_hms(2024, 6, 29, 9, 0, 0).unwrap());
        assert_eq!(block.end_at, Utc.with_ymd_and_hms(2024, 6, 29, 14, 0, 0).unwrap());
        assert!(block.is_active(now));
    }

    #[test]
    fn advances_through_successive_five_hour_windows() {
        let now = Utc.with_ymd_and_hms(2024, 6, 29, 16, 30, 0).unwrap();
        let block = Block::resolve(now, 9, UTC, None);
        // 9-14, 14-19 -> now falls in the second window.
        assert_eq!(block.start_at, Utc.with_ymd_and_hms(2024, 6, 29, 14, 0, 0).unwrap());
        assert_eq!(block.end_at, Utc.with_ymd_and_hms(2024, 6, 29, 19, 0, 0).unwrap());
    }

    #[test]
    fn next_upcoming_window_when_now_precedes_todays_anchor() {
        // now = 3am, anchor = 9am -> next upcoming block starts at 9am today, not active.
        let now = Utc.with_ymd_and_hms(2024, 6, 29, 3, 0, 0).unwrap();
        let block = Block::resolve(now, 9, UTC, None);
        assert_eq!(block.start_at, Utc.with_ymd_and_hms(2024, 6, 29, 9, 0, 0).unwrap());
        assert!(!block.is_active(now));
        assert!(block.seconds_until_reset(now) > 0);
    }

    #[test]
    fn window_length_is_five_hours() {
        let now = Utc::now();
        let block = Block::resolve(now, 0, UTC, Some(7_000));
        assert_eq!((block.end_at - block.start_at).num_hours(), WINDOW_HOURS);
        assert_eq!(block.token_limit, Some(7_000));
    }

    #[test]
    fn anchor_hour_inside_a_dst_gap_does_not_panic() {
        // 2024-03-10 America/New_York: clocks jump 2:00am -> 3:00am, so a
        // 2am anchor never occurs as a local wall-clock time that day.
        use chrono_tz::America::New_York;
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let block = Block::resolve(now, 2, New_York, None);
        assert_eq!((block.end_at - block.start_at).num_hours(), WINDOW_HOURS);
    }
}
