//! Raw rating accumulator to half-star display conversion.
//!
//! The server stores ratings as integers in hundredths of a star, doubled, so a
//! perfect average arrives as `1000`. The panel only ever shows half stars.

use std::fmt;

use shared::protocol::{RatingStats, ReviewRecord};

const MAX_HALF_STARS: u8 = 10;

/// A rating snapped to the nearest half star, held as a count of half stars in `0..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DisplayRating(u8);

impl DisplayRating {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(MAX_HALF_STARS);

    /// Converts a raw accumulator: `stars = round(raw) / 2 / 100`, then snaps.
    pub fn from_raw(raw: f64) -> Self {
        if !raw.is_finite() {
            return Self::ZERO;
        }
        Self::snap(raw.round() / 2.0 / 100.0)
    }

    /// Snaps a star value to the nearest half, clamped into `[0, 5]`.
    pub fn snap(stars: f64) -> Self {
        if !stars.is_finite() {
            return Self::ZERO;
        }
        let half_stars = (stars * 2.0).round().clamp(0.0, f64::from(MAX_HALF_STARS));
        Self(half_stars as u8)
    }

    pub fn half_stars(self) -> u8 {
        self.0
    }

    pub fn value(self) -> f64 {
        f64::from(self.0) / 2.0
    }
}

impl fmt::Display for DisplayRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.value())
    }
}

/// Aggregate as last reported by the server, with the derived display value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RatingSnapshot {
    pub raw_accumulator: i64,
    pub count: u64,
}

impl RatingSnapshot {
    pub fn new(raw_accumulator: f64, count: u64) -> Self {
        let raw_accumulator = if raw_accumulator.is_finite() {
            raw_accumulator.round() as i64
        } else {
            0
        };
        Self {
            raw_accumulator,
            count,
        }
    }

    pub fn display_rating(&self) -> DisplayRating {
        DisplayRating::from_raw(self.raw_accumulator as f64)
    }

    /// `true` when no review contributed; a zero display rating alone cannot tell.
    pub fn is_unrated(&self) -> bool {
        self.count == 0
    }
}

impl From<&RatingStats> for RatingSnapshot {
    fn from(stats: &RatingStats) -> Self {
        Self::new(stats.avg_rating, stats.review_count)
    }
}

/// Holds the panel's current aggregate. Only the pagination controller mutates it.
#[derive(Debug, Clone, Default)]
pub struct RatingAggregator {
    snapshot: RatingSnapshot,
}

impl RatingAggregator {
    pub fn ingest(&mut self, raw_accumulator: f64, count: u64) -> DisplayRating {
        self.snapshot = RatingSnapshot::new(raw_accumulator, count);
        self.snapshot.display_rating()
    }

    pub fn reset(&mut self) {
        self.snapshot = RatingSnapshot::default();
    }

    /// Optimistic removal; the accumulator is left for the reconciling fetch to correct.
    pub fn decrement_count(&mut self) {
        self.snapshot.count = self.snapshot.count.saturating_sub(1);
    }

    pub fn snapshot(&self) -> RatingSnapshot {
        self.snapshot
    }

    pub fn display_rating(&self) -> DisplayRating {
        self.snapshot.display_rating()
    }
}

pub fn review_display_rating(review: &ReviewRecord) -> DisplayRating {
    DisplayRating::from_raw(review.rating as f64)
}

#[cfg(test)]
#[path = "tests/rating_tests.rs"]
mod tests;
