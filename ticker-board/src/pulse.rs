//! Time-decaying highlight triggered by price changes.
//!
//! A price change sets the peak intensity at event time; every render tick recomputes the
//! intensity from the elapsed time alone: `max(0, 1 - elapsed / decay)`.

use derive_more::Display;
use std::{cmp::Ordering, time::Duration};
use tokio::time::Instant;

/// Direction of the last price change.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum Direction {
    #[display("up")]
    Up,
    #[display("down")]
    Down,
}

impl Direction {
    /// Direction from `previous` to `current`, `None` if unchanged.
    pub fn of<T: Ord>(previous: &T, current: &T) -> Option<Self> {
        match current.cmp(previous) {
            Ordering::Greater => Some(Direction::Up),
            Ordering::Less => Some(Direction::Down),
            Ordering::Equal => None,
        }
    }
}

/// Pulse state owned by a single instrument.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Pulse {
    direction: Option<Direction>,
    started: Option<Instant>,
    intensity: f32,
}

impl Pulse {
    /// Price moved: highlight at full intensity from `now`.
    pub fn trigger(&mut self, direction: Direction, now: Instant) {
        self.direction = Some(direction);
        self.started = Some(now);
        self.intensity = 1.0;
    }

    /// Recompute intensity for `now`. A `decay` of `None` disables highlights.
    pub fn decay(&mut self, now: Instant, decay: Option<Duration>) {
        let (Some(started), Some(decay)) = (self.started, decay) else {
            *self = Self::default();
            return;
        };

        self.intensity = intensity(now.saturating_duration_since(started), decay);
        if self.intensity <= 0.0 {
            *self = Self::default();
        }
    }

    /// Direction of the active highlight, `None` when neutral.
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Highlight strength in `[0, 1]`.
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn is_neutral(&self) -> bool {
        self.direction.is_none()
    }
}

/// `max(0, 1 - elapsed / decay)`, exactly 0 once `elapsed >= decay`.
pub fn intensity(elapsed: Duration, decay: Duration) -> f32 {
    if decay.is_zero() || elapsed >= decay {
        return 0.0;
    }
    (1.0 - elapsed.as_secs_f64() / decay.as_secs_f64()).clamp(0.0, 1.0) as f32
}
