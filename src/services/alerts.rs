//! Per-dimension alert state with change detection
//!
//! Each poll produces a level for distance and angle. Only changed levels are
//! published. A critical episode begins when the combined level (the max of
//! both dimensions) rises to CRITICAL and ends when it drops below; exactly one
//! negligence report belongs to each episode.

use crate::domain::types::{AlertLevel, AlertType};

/// What one classification round changed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlertUpdate {
    /// Dimensions whose level changed, in (distance, angle) order
    pub changed: Vec<(AlertType, AlertLevel)>,
    /// Some dimension changed to CRITICAL this round
    pub escalated: bool,
    /// The combined level entered CRITICAL this round
    pub episode_started: bool,
}

impl AlertUpdate {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertTracker {
    distance: AlertLevel,
    angle: AlertLevel,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, distance: AlertLevel, angle: AlertLevel) -> AlertUpdate {
        let was_critical = self.combined() == AlertLevel::Critical;
        let mut update = AlertUpdate::default();

        for (kind, slot, level) in [
            (AlertType::Distance, &mut self.distance, distance),
            (AlertType::Angle, &mut self.angle, angle),
        ] {
            if *slot != level {
                *slot = level;
                update.changed.push((kind, level));
                update.escalated |= level == AlertLevel::Critical;
            }
        }

        update.episode_started = !was_critical && self.combined() == AlertLevel::Critical;
        update
    }

    pub fn level(&self, kind: AlertType) -> AlertLevel {
        match kind {
            AlertType::Distance => self.distance,
            AlertType::Angle => self.angle,
        }
    }

    pub fn combined(&self) -> AlertLevel {
        self.distance.max(self.angle)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
