//! Timing targets a repetition should land on, and the score for hitting them.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const MAX_TIMING_SCORE: u32 = 100;

/// Base pattern replicated across cycles to produce target times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmPattern {
    /// Seconds from session start for the first cycle.
    pub base: Vec<f64>,
    /// Pause appended after the last target of each cycle.
    pub gap: f64,
    /// Width of the linear score falloff, in seconds.
    pub window: f64,
    /// Cycles generated each time the schedule runs dry.
    pub cycles_per_batch: u32,
}

impl Default for RhythmPattern {
    fn default() -> Self {
        Self {
            base: vec![12.3, 15.6, 18.1, 20.5, 23.2],
            gap: 2.0,
            window: 1.0,
            cycles_per_batch: 5,
        }
    }
}

impl RhythmPattern {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base.is_empty() {
            return Err(ConfigError::EmptyPattern);
        }
        if let Some(bad) = self.base.iter().find(|t| !t.is_finite() || **t < 0.0) {
            return Err(ConfigError::InvalidPatternTime(*bad));
        }
        if !(self.gap.is_finite() && self.gap > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "rhythm gap",
                value: self.gap,
            });
        }
        if !(self.window.is_finite() && self.window > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "rhythm window",
                value: self.window,
            });
        }
        if self.cycles_per_batch == 0 {
            return Err(ConfigError::NonPositive {
                name: "cycles per batch",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Distance between the starts of consecutive cycles.
    pub fn cycle_period(&self) -> f64 {
        let last = self.base.iter().copied().fold(0.0, f64::max);
        last + self.gap
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RhythmOutcome {
    pub score: u32,
    /// The target consumed by this repetition, if any.
    pub matched: Option<f64>,
}

#[derive(Debug, Clone)]
enum Source {
    Cycling { pattern: RhythmPattern, next_cycle: u64 },
    Fixed { initial: Vec<f64> },
}

/// Sorted, shrinking list of target times for one player.
#[derive(Debug, Clone)]
pub struct RhythmSchedule {
    source: Source,
    window: f64,
    pending: Vec<f64>,
}

impl RhythmSchedule {
    /// Endless schedule, extended one batch of cycles at a time.
    pub fn new(pattern: RhythmPattern) -> Result<Self, ConfigError> {
        pattern.validate()?;
        let mut schedule = Self {
            window: pattern.window,
            source: Source::Cycling {
                pattern,
                next_cycle: 0,
            },
            pending: Vec::new(),
        };
        schedule.extend_past(f64::NEG_INFINITY);
        Ok(schedule)
    }

    /// Finite schedule over exactly `targets`.
    pub fn from_targets(mut targets: Vec<f64>, window: f64) -> Result<Self, ConfigError> {
        if let Some(bad) = targets.iter().find(|t| !t.is_finite()) {
            return Err(ConfigError::InvalidPatternTime(*bad));
        }
        if !(window.is_finite() && window > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "rhythm window",
                value: window,
            });
        }
        targets.sort_by(f64::total_cmp);
        Ok(Self {
            source: Source::Fixed {
                initial: targets.clone(),
            },
            window,
            pending: targets,
        })
    }

    pub fn pending(&self) -> &[f64] {
        &self.pending
    }

    pub fn next_target(&self) -> Option<f64> {
        self.pending.first().copied()
    }

    /// Score a repetition finished at `at` and retire the target it matched.
    pub fn score(&mut self, at: f64) -> RhythmOutcome {
        self.extend_past(at - self.window);

        let nearest = self
            .pending
            .iter()
            .enumerate()
            .map(|(i, t)| (i, (t - at).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((index, diff)) if diff < self.window => {
                let matched = self.pending.remove(index);
                let score = (MAX_TIMING_SCORE as f64 * (1.0 - diff / self.window)).round() as u32;
                RhythmOutcome {
                    score,
                    matched: Some(matched),
                }
            }
            _ => RhythmOutcome {
                score: 0,
                matched: None,
            },
        }
    }

    pub fn reset(&mut self) {
        match &mut self.source {
            Source::Cycling { next_cycle, .. } => {
                *next_cycle = 0;
                self.pending.clear();
                self.extend_past(f64::NEG_INFINITY);
            }
            Source::Fixed { initial } => self.pending = initial.clone(),
        }
    }

    /// Cycling schedules only: once no pending target can still be reached
    /// from `horizon` on, drop the missed ones and generate batches starting
    /// at the first cycle that can reach it.
    fn extend_past(&mut self, horizon: f64) {
        let Source::Cycling {
            pattern,
            next_cycle,
        } = &mut self.source
        else {
            return;
        };
        if horizon.is_nan() || self.pending.iter().any(|t| *t >= horizon) {
            return;
        }

        self.pending.clear();
        let period = pattern.cycle_period();
        let last = pattern.base.iter().copied().fold(0.0, f64::max);
        // Saturating cast: -inf maps to cycle 0, +inf to u64::MAX. One cycle
        // of slack absorbs rounding in the division.
        let first_reachable = (((horizon - last) / period).floor() as u64).saturating_sub(1);
        *next_cycle = (*next_cycle).max(first_reachable);
        let batch = u64::from(pattern.cycles_per_batch);
        while self.pending.is_empty() && *next_cycle < u64::MAX {
            let end = next_cycle.saturating_add(batch);
            for cycle in *next_cycle..end {
                let offset = cycle as f64 * period;
                self.pending.extend(
                    pattern
                        .base
                        .iter()
                        .map(|t| t + offset)
                        .filter(|t| *t >= horizon),
                );
            }
            *next_cycle = end;
        }
        self.pending.sort_by(f64::total_cmp);
        log::debug!(
            "rhythm schedule extended to cycle {} ({} targets pending)",
            next_cycle,
            self.pending.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(base: Vec<f64>, batch: u32) -> RhythmPattern {
        RhythmPattern {
            base,
            gap: 2.0,
            window: 1.0,
            cycles_per_batch: batch,
        }
    }

    #[test]
    fn test_near_target_scores_and_consumes() {
        let mut schedule = RhythmSchedule::from_targets(vec![5.0, 10.0], 1.0).unwrap();
        let outcome = schedule.score(5.2);
        assert_eq!(outcome.score, 80);
        assert_eq!(outcome.matched, Some(5.0));
        assert_eq!(schedule.pending(), &[10.0]);
    }

    #[test]
    fn test_far_repetition_leaves_schedule_untouched() {
        let mut schedule = RhythmSchedule::from_targets(vec![5.0, 10.0], 1.0).unwrap();
        let outcome = schedule.score(20.0);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.matched, None);
        assert_eq!(schedule.pending(), &[5.0, 10.0]);
    }

    #[test]
    fn test_exact_window_edge_scores_zero() {
        let mut schedule = RhythmSchedule::from_targets(vec![5.0], 1.0).unwrap();
        assert_eq!(schedule.score(6.0).score, 0);
        assert_eq!(schedule.pending(), &[5.0]);
        assert_eq!(schedule.score(5.0).score, 100);
        assert!(schedule.pending().is_empty());
    }

    #[test]
    fn test_consumed_target_is_not_reused() {
        let mut schedule = RhythmSchedule::from_targets(vec![5.0, 7.0], 1.0).unwrap();
        assert_eq!(schedule.score(5.1).matched, Some(5.0));
        // Second rep right after: 5.0 is gone and 7.0 is out of reach.
        let outcome = schedule.score(5.3);
        assert_eq!(outcome.matched, None);
        assert_eq!(schedule.pending(), &[7.0]);
    }

    #[test]
    fn test_cycles_are_generated_in_order() {
        let schedule = RhythmSchedule::new(pattern(vec![2.0, 1.0], 2)).unwrap();
        // period = max(base) + gap = 4.0
        assert_eq!(schedule.pending(), &[1.0, 2.0, 5.0, 6.0]);
        assert_eq!(schedule.next_target(), Some(1.0));
    }

    #[test]
    fn test_exhausted_schedule_extends_lazily() {
        let mut schedule = RhythmSchedule::new(pattern(vec![1.0, 2.0], 1)).unwrap();
        assert_eq!(schedule.score(1.0).score, 100);
        assert_eq!(schedule.score(2.0).score, 100);
        assert!(schedule.pending().is_empty());
        // Next cycle starts at 4.0 (period 4.0).
        let outcome = schedule.score(5.1);
        assert_eq!(outcome.matched, Some(5.0));
        assert_eq!(outcome.score, 90);
        assert_eq!(schedule.pending(), &[6.0]);
    }

    #[test]
    fn test_missed_targets_roll_over() {
        let mut schedule = RhythmSchedule::new(pattern(vec![1.0, 2.0], 1)).unwrap();
        // Player sat out the first two cycles.
        let outcome = schedule.score(9.0);
        assert_eq!(outcome.matched, Some(9.0));
        assert_eq!(schedule.pending(), &[10.0]);
    }

    #[test]
    fn test_late_repetition_jumps_to_the_current_cycle() {
        let pattern = RhythmPattern::default();
        let period = pattern.cycle_period();
        let mut schedule = RhythmSchedule::new(pattern).unwrap();
        let cycle = 1_000_000_000u64;
        let target = 12.3 + cycle as f64 * period;
        let outcome = schedule.score(target);
        assert_eq!(outcome.matched, Some(target));
        assert_eq!(outcome.score, 100);
        assert!(schedule.pending().iter().all(|t| *t > target));
    }

    #[test]
    fn test_far_future_repetition_stays_bounded() {
        // Past the u32 cycle range.
        let at = 1.0e12;
        let mut schedule = RhythmSchedule::new(RhythmPattern::default()).unwrap();
        let outcome = schedule.score(at);
        assert!(outcome.score <= MAX_TIMING_SCORE);
        let next = schedule.next_target().unwrap();
        assert!(next >= at - 1.0);
        assert!(next < at + 26.0 * 5.0);

        let mut stalled = RhythmSchedule::new(RhythmPattern::default()).unwrap();
        assert_eq!(stalled.score(f64::NAN).matched, None);
        assert_eq!(stalled.score(f64::INFINITY).score, 0);
    }

    #[test]
    fn test_reset_regenerates_initial_schedule() {
        let mut schedule = RhythmSchedule::new(pattern(vec![1.0, 2.0], 1)).unwrap();
        let fresh = schedule.pending().to_vec();
        schedule.score(1.0);
        schedule.score(9.0);
        schedule.reset();
        assert_eq!(schedule.pending(), fresh.as_slice());

        let mut fixed = RhythmSchedule::from_targets(vec![10.0, 5.0], 1.0).unwrap();
        fixed.score(5.0);
        fixed.reset();
        assert_eq!(fixed.pending(), &[5.0, 10.0]);
    }

    #[test]
    fn test_pattern_validation() {
        assert!(matches!(
            RhythmSchedule::new(pattern(vec![], 1)),
            Err(ConfigError::EmptyPattern)
        ));
        let mut bad_gap = pattern(vec![1.0], 1);
        bad_gap.gap = 0.0;
        assert!(RhythmSchedule::new(bad_gap).is_err());
        assert!(RhythmSchedule::new(pattern(vec![-1.0], 1)).is_err());
        assert!(RhythmSchedule::from_targets(vec![1.0], 0.0).is_err());
    }
}
