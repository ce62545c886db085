use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed half-open UTC time interval `[start_at, end_at)`.
///
/// The all-time sentinel is represented by a zero `start_at`
/// (`DateTime::UNIX_EPOCH` semantics — `start_at == DateTime::<Utc>::from_timestamp(0,0)`)
/// and matches everything regardless of `end_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl Period {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self { start_at, end_at }
    }

    /// The distinguished all-time period: matches every timestamp.
    pub fn all_time() -> Self {
        Self {
            start_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            end_at: Utc::now(),
        }
    }

    pub fn is_all_time(&self) -> bool {
        self.start_at.timestamp() == 0
    }

    /// Left-inclusive, right-exclusive membership test.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        if self.is_all_time() {
            return true;
        }
        self.start_at <= t && t < self.end_at
    }

    /// Build a period from optional wire bounds: absent start maps to
    /// all-time's zero epoch, absent end maps to "now".
    pub fn from_bounds(start_at: Option<DateTime<Utc>>, end_at: Option<DateTime<Utc>>) -> Self {
        match (start_at, end_at) {
            (None, None) => Period::all_time(),
            (start, end) => Period::new(
                start.unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap()),
                end.unwrap_or_else(Utc::now),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn all_time_contains_everything() {
        let p = Period::all_time();
        assert!(p.contains(Utc::now()));
        assert!(p.contains(DateTime::<Utc>::from_timestamp(0, 0).unwrap()));
    }

    #[test]
    fn boundary_is_left_inclusive_right_exclusive() {
        let start = Utc::now();
        let end = start + Duration::hours(1);
        let p = Period::new(start, end);
        assert!(p.contains(start));
        assert!(!p.contains(end));
        assert!(p.contains(start + Duration::minutes(1)));
    }

    #[test]
    fn absent_bounds_map_to_all_time_and_now() {
        let p = Period::from_bounds(None, None);
        assert!(p.is_all_time());
    }
}
