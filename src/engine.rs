//! Per-session detection engine: owns every player's phase tracker, timing
//! source and running score, and turns assigned joint frames into state.

use crate::{
    assign::Assignment,
    error::ConfigError,
    pose::JointFrame,
    profile::{ExerciseProfile, Measurement},
    repetition::{CompletedRep, RepetitionCounter, Transition},
    rhythm::{RhythmPattern, RhythmSchedule},
    scoring::{RepScore, ScoringMode, ZoneGate, score_repetition},
    types::{FrameSide, Phase, PlayerSlot, PlayerSnapshot, SessionSnapshot},
};

pub const DEFAULT_STALE_AFTER_SECS: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub profile: ExerciseProfile,
    pub scoring: ScoringMode,
    /// Only consulted in [`ScoringMode::Rhythm`].
    pub rhythm: RhythmPattern,
    /// A player unseen for longer than this is reported as absent.
    pub stale_after: f64,
}

impl EngineSettings {
    pub fn new(profile: ExerciseProfile) -> Self {
        Self {
            profile,
            scoring: ScoringMode::default(),
            rhythm: RhythmPattern::default(),
            stale_after: DEFAULT_STALE_AFTER_SECS,
        }
    }

    pub fn with_scoring(mut self, scoring: ScoringMode) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_rhythm(mut self, rhythm: RhythmPattern) -> Self {
        self.rhythm = rhythm;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.profile.validate()?;
        if self.scoring == ScoringMode::Rhythm {
            self.rhythm.validate()?;
        }
        if !(self.stale_after.is_finite() && self.stale_after > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "stale_after",
                value: self.stale_after,
            });
        }
        Ok(())
    }
}

/// Writes into the engine from outside the detection thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// An on-screen target overlaps (or stopped overlapping) the player's
    /// scoring zone.
    TargetZone { slot: PlayerSlot, in_zone: bool },
    /// "Play again": every player back to the initial state.
    Reset,
}

/// What happened to one player on one tick, for the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEvaluation {
    pub slot: PlayerSlot,
    pub joints: JointFrame,
    pub measurement: Measurement,
    pub phase: Phase,
    /// Coaching line while the posture check fails.
    pub feedback: Option<&'static str>,
    pub completed: Option<RepScore>,
    pub zone_hit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub slot: PlayerSlot,
    pub side: FrameSide,
    pub rep_count: u32,
    pub phase: Phase,
    pub form_correct: bool,
    pub score: f64,
    pub last_rep_at: Option<f64>,
    pub last_rep_score: Option<f64>,
    pub rhythm_hits: u32,
    pub last_rhythm_score: Option<u32>,
    pub zone_hits: u32,
    pub last_detected_at: Option<f64>,
}

impl PlayerState {
    fn new(slot: PlayerSlot) -> Self {
        Self {
            slot,
            side: slot.side(),
            rep_count: 0,
            phase: Phase::Extended,
            form_correct: true,
            score: 0.0,
            last_rep_at: None,
            last_rep_score: None,
            rhythm_hits: 0,
            last_rhythm_score: None,
            zone_hits: 0,
            last_detected_at: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Timing {
    None,
    Rhythm(RhythmSchedule),
    Zone(ZoneGate),
}

#[derive(Debug, Clone)]
struct PlayerTracker {
    state: PlayerState,
    counter: RepetitionCounter,
    timing: Timing,
}

impl PlayerTracker {
    fn finish_rep(&mut self, rep: CompletedRep) -> RepScore {
        let timing = match &mut self.timing {
            Timing::None => None,
            Timing::Rhythm(schedule) => {
                let outcome = schedule.score(rep.at);
                if outcome.matched.is_some() {
                    self.state.rhythm_hits += 1;
                }
                self.state.last_rhythm_score = Some(outcome.score);
                Some(outcome.score)
            }
            Timing::Zone(gate) => Some(gate.take_hit()),
        };

        let score = score_repetition(rep.form_ok, timing);
        self.state.rep_count = rep.number;
        self.state.last_rep_at = Some(rep.at);
        self.state.last_rep_score = Some(score.total);
        self.state.score += score.total;

        log::info!(
            "{} rep {} at {:.2}s: form {} timing {} (+{:.1}, total {:.1})",
            self.state.slot.label(),
            rep.number,
            rep.at,
            score.form,
            score.timing,
            score.total,
            self.state.score
        );
        score
    }

    fn snapshot(&self, at: f64, stale_after: f64) -> PlayerSnapshot {
        let s = &self.state;
        let next_target_at = match &self.timing {
            Timing::Rhythm(schedule) => schedule.next_target(),
            _ => None,
        };
        PlayerSnapshot {
            slot: s.slot,
            side: s.side,
            rep_count: s.rep_count,
            phase: s.phase,
            form_correct: s.form_correct,
            score: s.score,
            last_rep_at: s.last_rep_at,
            last_rep_score: s.last_rep_score,
            next_target_at,
            rhythm_hits: s.rhythm_hits,
            last_rhythm_score: s.last_rhythm_score,
            zone_hits: s.zone_hits,
            last_detected_at: s.last_detected_at,
            present: s
                .last_detected_at
                .is_some_and(|seen| at - seen <= stale_after),
        }
    }
}

pub struct DetectionEngine {
    settings: EngineSettings,
    players: [PlayerTracker; 2],
    initial: [PlayerTracker; 2],
    device_available: bool,
}

impl DetectionEngine {
    pub fn new(settings: EngineSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let tracker = |slot: PlayerSlot| -> Result<PlayerTracker, ConfigError> {
            let timing = match settings.scoring {
                ScoringMode::Rhythm => Timing::Rhythm(RhythmSchedule::new(settings.rhythm.clone())?),
                ScoringMode::TargetZone => Timing::Zone(ZoneGate::default()),
                ScoringMode::FormOnly => Timing::None,
            };
            Ok(PlayerTracker {
                state: PlayerState::new(slot),
                counter: RepetitionCounter::new(
                    settings.profile.thresholds,
                    settings.profile.direction,
                ),
                timing,
            })
        };
        let initial = [tracker(PlayerSlot::Player1)?, tracker(PlayerSlot::Player2)?];

        log::info!(
            "detection engine ready: {} ({:?} side), bounds {:.0}°/{:.0}°, scoring {:?}",
            settings.profile.kind.name(),
            settings.profile.side,
            settings.profile.thresholds.contracted,
            settings.profile.thresholds.extended,
            settings.scoring
        );

        Ok(Self {
            players: initial.clone(),
            initial,
            settings,
            device_available: true,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn profile(&self) -> &ExerciseProfile {
        &self.settings.profile
    }

    pub fn player(&self, slot: PlayerSlot) -> &PlayerState {
        &self.players[slot.index()].state
    }

    pub fn set_device_available(&mut self, available: bool) {
        if available != self.device_available {
            log::info!("camera device available: {available}");
        }
        self.device_available = available;
    }

    /// Feed one tick of assigned detections taken `at` seconds into the session.
    pub fn process(&mut self, assignment: &Assignment, at: f64) -> Vec<PlayerEvaluation> {
        let mut evaluations = Vec::new();

        for (slot, joints) in assignment.iter() {
            let tracker = &mut self.players[slot.index()];
            tracker.state.last_detected_at = Some(at);

            let Some(measurement) = self.settings.profile.measure(joints) else {
                log::debug!("{}: degenerate joint geometry, tick skipped", slot.label());
                continue;
            };

            let mut completed = None;
            let mut zone_hit = false;
            if let Transition::Completed(rep) =
                tracker
                    .counter
                    .update(measurement.primary_angle, measurement.form_ok, at)
            {
                completed = Some(tracker.finish_rep(rep));
            }

            let phase = tracker.counter.phase();
            if phase == Phase::Contracted {
                if let Timing::Zone(gate) = &mut tracker.timing {
                    zone_hit = gate.on_contracted_tick();
                    if zone_hit {
                        tracker.state.zone_hits += 1;
                    }
                }
            }
            tracker.state.phase = phase;
            tracker.state.form_correct = match phase {
                Phase::Contracted => tracker.counter.locked_form(),
                Phase::Extended => measurement.form_ok,
            };

            evaluations.push(PlayerEvaluation {
                slot,
                joints: joints.clone(),
                measurement,
                phase,
                feedback: (!measurement.form_ok)
                    .then(|| self.settings.profile.kind.form_feedback()),
                completed,
                zone_hit,
            });
        }

        evaluations
    }

    pub fn apply(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::TargetZone { slot, in_zone } => {
                if let Timing::Zone(gate) = &mut self.players[slot.index()].timing {
                    gate.set_in_zone(in_zone);
                }
            }
            EngineCommand::Reset => self.reset(),
        }
    }

    /// Every player returns to the state it had at construction in one step.
    pub fn reset(&mut self) {
        self.players = self.initial.clone();
        log::info!("session reset");
    }

    pub fn snapshot(&self, at: f64) -> SessionSnapshot {
        let stale_after = self.settings.stale_after;
        SessionSnapshot {
            taken_at: at,
            device_available: self.device_available,
            players: [
                self.players[0].snapshot(at, stale_after),
                self.players[1].snapshot(at, stale_after),
            ],
        }
    }
}
