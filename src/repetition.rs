use crate::{
    profile::{AngleDirection, AngleThresholds},
    types::Phase,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedRep {
    /// 1-based count after this repetition.
    pub number: u32,
    /// Posture verdict captured when the contraction began.
    pub form_ok: bool,
    /// Seconds since session start.
    pub at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    None,
    Contracted { form_ok: bool },
    Completed(CompletedRep),
}

/// Two-threshold phase tracker for one player.
///
/// A repetition is counted only on the contracted -> extended edge, so the
/// counter moves by one per full cycle however many samples land in between.
#[derive(Debug, Clone)]
pub struct RepetitionCounter {
    thresholds: AngleThresholds,
    direction: AngleDirection,
    phase: Phase,
    count: u32,
    locked_form: bool,
    last_rep_at: Option<f64>,
}

impl RepetitionCounter {
    pub fn new(thresholds: AngleThresholds, direction: AngleDirection) -> Self {
        Self {
            thresholds,
            direction,
            phase: Phase::Extended,
            count: 0,
            locked_form: true,
            last_rep_at: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn last_rep_at(&self) -> Option<f64> {
        self.last_rep_at
    }

    /// Posture flag locked in for the repetition currently in progress.
    pub fn locked_form(&self) -> bool {
        self.locked_form
    }

    pub fn update(&mut self, angle: f32, form_ok: bool, at: f64) -> Transition {
        match self.phase {
            Phase::Extended if self.thresholds.reaches_contracted(self.direction, angle) => {
                self.phase = Phase::Contracted;
                self.locked_form = form_ok;
                Transition::Contracted { form_ok }
            }
            Phase::Contracted if self.thresholds.reaches_extended(self.direction, angle) => {
                self.phase = Phase::Extended;
                self.count += 1;
                self.last_rep_at = Some(at);
                Transition::Completed(CompletedRep {
                    number: self.count,
                    form_ok: self.locked_form,
                    at,
                })
            }
            _ => Transition::None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.thresholds, self.direction);
    }
}
