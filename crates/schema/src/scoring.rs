//! Promotion priority scoring
//!
//! Priority is a weighted sum of three factors, each in `0.0..=1.0`, scaled
//! to `0.0..=100.0`:
//!
//! | Factor  | Weight | Shape |
//! |---------|--------|-------|
//! | usage   | 0.5    | `1 - threshold / usage_count`, approaching 1 well above the threshold |
//! | recency | 0.3    | seen within a day 1.0, within a week 0.5, older 0.1 |
//! | type    | 0.2    | number/boolean 1.0, string/datetime 0.9, array 0.3, object 0.2 |

use chrono::{DateTime, Duration, Utc};
use silt_protocol::{FieldStatistic, FieldType};

pub const USAGE_WEIGHT: f64 = 0.5;
pub const RECENCY_WEIGHT: f64 = 0.3;
pub const TYPE_WEIGHT: f64 = 0.2;

/// Upper bound of the priority scale
pub const MAX_PRIORITY: f64 = 100.0;

/// How far `usage` exceeds `threshold`, in `0.0..=1.0`
pub fn usage_score(usage: u64, threshold: u64) -> f64 {
    if usage == 0 {
        return 0.0;
    }
    (1.0 - threshold as f64 / usage as f64).clamp(0.0, 1.0)
}

pub fn recency_score(last_seen_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = now - last_seen_at;
    if age <= Duration::days(1) {
        1.0
    } else if age <= Duration::days(7) {
        0.5
    } else {
        0.1
    }
}

/// Scalars map cleanly onto relational columns; containers do not
pub fn type_score(field_type: FieldType) -> f64 {
    match field_type {
        FieldType::Number | FieldType::Boolean => 1.0,
        FieldType::String | FieldType::Datetime => 0.9,
        FieldType::Array => 0.3,
        FieldType::Object => 0.2,
    }
}

/// Combined priority in `0.0..=100.0`
pub fn priority(stat: &FieldStatistic, threshold: u64, now: DateTime<Utc>) -> f64 {
    let score = USAGE_WEIGHT * usage_score(stat.usage_count, threshold)
        + RECENCY_WEIGHT * recency_score(stat.last_seen_at, now)
        + TYPE_WEIGHT * type_score(stat.inferred_type);
    (score * MAX_PRIORITY).clamp(0.0, MAX_PRIORITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(usage: u64, ty: FieldType, last_seen_at: DateTime<Utc>) -> FieldStatistic {
        FieldStatistic {
            name: "f".into(),
            inferred_type: ty,
            usage_count: usage,
            first_seen_at: last_seen_at,
            last_seen_at,
            promoted: false,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert!((USAGE_WEIGHT + RECENCY_WEIGHT + TYPE_WEIGHT - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_usage_score() {
        assert_eq!(usage_score(0, 10), 0.0);
        assert_eq!(usage_score(10, 10), 0.0);
        assert_eq!(usage_score(5, 10), 0.0);
        assert!((usage_score(20, 10) - 0.5).abs() < 1e-9);
        assert!(usage_score(10_000, 10) > 0.99);
        assert_eq!(usage_score(7, 0), 1.0);
    }

    #[test]
    fn test_recency_bands() {
        let now = Utc::now();
        assert_eq!(recency_score(now - Duration::hours(3), now), 1.0);
        assert_eq!(recency_score(now - Duration::days(3), now), 0.5);
        assert_eq!(recency_score(now - Duration::days(30), now), 0.1);
    }

    #[test]
    fn test_scalars_outrank_containers() {
        assert!(type_score(FieldType::Number) > type_score(FieldType::String));
        assert!(type_score(FieldType::String) > type_score(FieldType::Array));
        assert!(type_score(FieldType::Array) > type_score(FieldType::Object));
        assert_eq!(type_score(FieldType::Datetime), type_score(FieldType::String));
    }

    #[test]
    fn test_priority_range() {
        let now = Utc::now();
        let best = priority(&stat(u64::MAX, FieldType::Number, now), 1, now);
        let worst = priority(&stat(1, FieldType::Object, now - Duration::days(365)), 1, now);

        assert!(best <= MAX_PRIORITY && best > 99.0);
        assert!(worst >= 0.0);
        assert!((worst - 7.0).abs() < 1e-9);
    }
}
