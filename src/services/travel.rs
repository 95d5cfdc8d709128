//! Pausable travel countdown for one leg of a delivery
//!
//! The simulator is a plain value: the owner calls `tick(now, is_moving)` on
//! every travel tick and acts on the returned [`TravelTick`]. Time only counts
//! while the drone is moving, so total moving time before arrival equals the
//! configured duration no matter how often the leg is halted.

use std::time::{Duration, Instant};

/// Outcome of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelTick {
    /// Running, not arrived yet
    Moving,
    /// First halted tick: elapsed progress was banked and the countdown paused
    Paused,
    /// Still halted
    Halted,
    /// First moving tick after a pause: countdown re-anchored
    Resumed,
    /// Destination reached; reported exactly once
    Arrived,
    /// Leg already completed
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone)]
pub struct TravelSimulator {
    remaining: Duration,
    anchor: Instant,
    phase: Phase,
}

impl TravelSimulator {
    /// Start a leg of `duration`, running from `now`
    pub fn start(duration: Duration, now: Instant) -> Self {
        Self { remaining: duration, anchor: now, phase: Phase::Running }
    }

    pub fn tick(&mut self, now: Instant, is_moving: bool) -> TravelTick {
        match (self.phase, is_moving) {
            (Phase::Completed, _) => TravelTick::Finished,
            (Phase::Paused, true) => {
                self.anchor = now;
                self.phase = Phase::Running;
                TravelTick::Resumed
            }
            (Phase::Paused, false) => TravelTick::Halted,
            (Phase::Running, true) => {
                if now >= self.anchor + self.remaining {
                    self.remaining = Duration::ZERO;
                    self.phase = Phase::Completed;
                    TravelTick::Arrived
                } else {
                    TravelTick::Moving
                }
            }
            (Phase::Running, false) => {
                let elapsed = now.saturating_duration_since(self.anchor);
                self.remaining = self.remaining.saturating_sub(elapsed);
                self.phase = Phase::Paused;
                TravelTick::Paused
            }
        }
    }

    /// Moving time still needed as of `now`
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.phase {
            Phase::Running => {
                self.remaining.saturating_sub(now.saturating_duration_since(self.anchor))
            }
            Phase::Paused => self.remaining,
            Phase::Completed => Duration::ZERO,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.phase == Phase::Paused
    }

    pub fn is_completed(&self) -> bool {
        self.phase == Phase::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(50);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Drive a leg on a fixed tick, halted inside each `[halt, resume)` window; returns arrival offset
    fn run_leg(duration: Duration, halts: &[(Duration, Duration)]) -> (Duration, Vec<TravelTick>) {
        let t0 = Instant::now();
        let mut travel = TravelSimulator::start(duration, t0);
        let mut offset = Duration::ZERO;
        let mut seen = Vec::new();
        loop {
            offset += TICK;
            let moving = !halts.iter().any(|&(from, to)| offset >= from && offset < to);
            let tick = travel.tick(t0 + offset, moving);
            if !matches!(tick, TravelTick::Moving | TravelTick::Halted) {
                seen.push(tick);
            }
            if tick == TravelTick::Arrived {
                return (offset, seen);
            }
            assert!(offset < ms(60_000), "leg never arrived");
        }
    }

    #[test]
    fn test_uninterrupted_leg_arrives_after_duration() {
        let (arrival, seen) = run_leg(ms(6000), &[]);
        assert_eq!(arrival, ms(6000));
        assert_eq!(seen, vec![TravelTick::Arrived]);
    }

    #[test]
    fn test_pause_and_resume_preserves_progress() {
        // 6000 ms leg halted at 2000 ms and resumed at 3000 ms arrives at 7000 ms
        let (arrival, seen) = run_leg(ms(6000), &[(ms(2000), ms(3000))]);
        assert!(arrival >= ms(7000) && arrival <= ms(7000) + TICK, "arrived at {arrival:?}");
        assert_eq!(seen, vec![TravelTick::Paused, TravelTick::Resumed, TravelTick::Arrived]);
    }

    #[test]
    fn test_repeated_halts_add_only_halted_time() {
        let halts = [(ms(1000), ms(1500)), (ms(2500), ms(4000)), (ms(4200), ms(4250))];
        let halted: Duration = halts.iter().map(|&(from, to)| to - from).sum();
        let expected = ms(6000) + halted;

        let (arrival, seen) = run_leg(ms(6000), &halts);
        assert!(arrival >= expected && arrival <= expected + TICK, "arrived at {arrival:?}");
        assert_eq!(
            seen,
            vec![
                TravelTick::Paused,
                TravelTick::Resumed,
                TravelTick::Paused,
                TravelTick::Resumed,
                TravelTick::Paused,
                TravelTick::Resumed,
                TravelTick::Arrived,
            ]
        );
    }

    #[test]
    fn test_completion_fires_once() {
        let t0 = Instant::now();
        let mut travel = TravelSimulator::start(ms(100), t0);
        assert_eq!(travel.tick(t0 + ms(100), true), TravelTick::Arrived);
        assert_eq!(travel.tick(t0 + ms(150), true), TravelTick::Finished);
        assert_eq!(travel.tick(t0 + ms(200), false), TravelTick::Finished);
        assert!(travel.is_completed());
    }

    #[test]
    fn test_remaining_only_decreases_while_running() {
        let t0 = Instant::now();
        let mut travel = TravelSimulator::start(ms(1000), t0);
        assert_eq!(travel.remaining(t0 + ms(400)), ms(600));

        assert_eq!(travel.tick(t0 + ms(400), false), TravelTick::Paused);
        assert_eq!(travel.tick(t0 + ms(900), false), TravelTick::Halted);
        assert_eq!(travel.remaining(t0 + ms(5000)), ms(600));
        assert!(travel.is_paused());

        assert_eq!(travel.tick(t0 + ms(5000), true), TravelTick::Resumed);
        assert_eq!(travel.tick(t0 + ms(5599), true), TravelTick::Moving);
        assert_eq!(travel.tick(t0 + ms(5600), true), TravelTick::Arrived);
    }

    #[test]
    fn test_halt_after_full_duration_saturates() {
        let t0 = Instant::now();
        let mut travel = TravelSimulator::start(ms(100), t0);
        assert_eq!(travel.tick(t0 + ms(500), false), TravelTick::Paused);
        assert_eq!(travel.remaining(t0 + ms(500)), Duration::ZERO);
        assert_eq!(travel.tick(t0 + ms(600), true), TravelTick::Resumed);
        assert_eq!(travel.tick(t0 + ms(600), true), TravelTick::Arrived);
    }
}
