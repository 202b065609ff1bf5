//! Offline sessions driven by recorded joint frames instead of a camera.
//!
//! Input is JSON lines, one tick per line:
//!
//! ```text
//! {"at": 0.033, "person": {"landmarks": [...], "width": 640, "height": 480}}
//! {"at": 0.066, "left": {...}, "right": null, "zone": [{"slot": "player1", "in_zone": true}]}
//! ```
//!
//! `person` is used with midpoint assignment, `left`/`right` (already in
//! full-frame coordinates) with split-screen assignment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;

use crate::{
    assign::{AssignMode, Assignment, PlayerAssigner},
    engine::{DetectionEngine, EngineCommand},
    pose::JointFrame,
    types::{PlayerSlot, SessionSnapshot},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneEvent {
    pub slot: PlayerSlot,
    pub in_zone: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    /// Seconds since session start.
    pub at: f64,
    #[serde(default)]
    pub person: Option<JointFrame>,
    #[serde(default)]
    pub left: Option<JointFrame>,
    #[serde(default)]
    pub right: Option<JointFrame>,
    /// Applied before the detections of this tick.
    #[serde(default)]
    pub zone: Vec<ZoneEvent>,
    #[serde(default)]
    pub reset: bool,
}

impl ReplayRecord {
    fn assignment(self, assigner: &PlayerAssigner, mode: AssignMode) -> Assignment {
        match mode {
            AssignMode::Midpoint { midpoint } => assigner.by_midpoint(self.person, midpoint),
            AssignMode::SplitScreen => assigner.by_halves(self.left, self.right),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub ticks: usize,
    pub completed_reps: usize,
    pub snapshot: SessionSnapshot,
}

pub fn run_replay<R: BufRead>(
    reader: R,
    engine: &mut DetectionEngine,
    assigner: &PlayerAssigner,
    mode: AssignMode,
) -> Result<ReplayReport> {
    let mut ticks = 0;
    let mut completed_reps = 0;
    let mut last_at = 0.0;

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read replay line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplayRecord = serde_json::from_str(&line)
            .with_context(|| format!("malformed replay record on line {}", index + 1))?;

        if record.reset {
            engine.apply(EngineCommand::Reset);
        }
        for event in &record.zone {
            engine.apply(EngineCommand::TargetZone {
                slot: event.slot,
                in_zone: event.in_zone,
            });
        }

        let at = record.at;
        let assignment = record.assignment(assigner, mode);
        completed_reps += engine
            .process(&assignment, at)
            .iter()
            .filter(|eval| eval.completed.is_some())
            .count();
        ticks += 1;
        last_at = at;
    }

    log::info!("replayed {ticks} ticks, {completed_reps} repetitions completed");
    Ok(ReplayReport {
        ticks,
        completed_reps,
        snapshot: engine.snapshot(last_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::EngineSettings,
        pose::{BodySide, Joint, Landmark},
        profile::{ExerciseKind, ExerciseProfile},
        scoring::ScoringMode,
    };
    use std::io::Cursor;

    /// Squat pose at `x`: shoulder-hip-knee kept straight, knee bent to
    /// roughly 180° (`deep = false`) or 45° (`deep = true`).
    fn pose(x: f32, deep: bool) -> JointFrame {
        let mut frame = JointFrame::empty(100, 100);
        let ankle = if deep { (x + 0.1, 0.5) } else { (x, 0.8) };
        for (joint, (px, py)) in [
            (Joint::Nose, (x, 0.1)),
            (Joint::LeftShoulder, (x, 0.2)),
            (Joint::LeftHip, (x, 0.4)),
            (Joint::LeftKnee, (x, 0.6)),
            (Joint::LeftAnkle, ankle),
        ] {
            frame.set(joint, Landmark::new(px, py, 0.9));
        }
        frame
    }

    fn record(at: f64, person: Option<JointFrame>) -> String {
        serde_json::to_string(&ReplayRecord {
            at,
            person,
            left: None,
            right: None,
            zone: Vec::new(),
            reset: false,
        })
        .unwrap()
    }

    fn setup(scoring: ScoringMode) -> (DetectionEngine, PlayerAssigner) {
        let profile = ExerciseProfile::preset(ExerciseKind::Squat, BodySide::Left);
        let assigner = PlayerAssigner::new(profile.required_joints(), 0.5);
        let engine =
            DetectionEngine::new(EngineSettings::new(profile).with_scoring(scoring)).unwrap();
        (engine, assigner)
    }

    #[test]
    fn test_replay_counts_both_players() {
        let lines = [
            record(0.0, Some(pose(0.2, false))),
            record(0.1, Some(pose(0.2, true))),
            String::new(),
            record(0.2, None),
            record(0.3, Some(pose(0.2, false))),
            record(0.4, Some(pose(0.8, true))),
            record(0.5, Some(pose(0.8, false))),
        ]
        .join("\n");

        let (mut engine, assigner) = setup(ScoringMode::FormOnly);
        let report = run_replay(
            Cursor::new(lines),
            &mut engine,
            &assigner,
            AssignMode::default(),
        )
        .unwrap();
        assert_eq!(report.ticks, 6);
        assert_eq!(report.completed_reps, 2);
        assert_eq!(report.snapshot.player(PlayerSlot::Player1).rep_count, 1);
        assert_eq!(report.snapshot.player(PlayerSlot::Player2).rep_count, 1);
        assert_eq!(report.snapshot.player(PlayerSlot::Player1).score, 50.0);
        assert_eq!(report.snapshot.taken_at, 0.5);
    }

    #[test]
    fn test_split_records_and_zone_events() {
        let (mut engine, assigner) = setup(ScoringMode::TargetZone);
        let lines = [
            r#"{"at": 0.0, "zone": [{"slot": "player2", "in_zone": true}]}"#.to_string(),
            serde_json::to_string(&ReplayRecord {
                at: 0.1,
                person: None,
                left: None,
                right: Some(pose(0.7, true)),
                zone: Vec::new(),
                reset: false,
            })
            .unwrap(),
            serde_json::to_string(&ReplayRecord {
                at: 0.2,
                person: None,
                left: None,
                right: Some(pose(0.7, false)),
                zone: Vec::new(),
                reset: false,
            })
            .unwrap(),
        ]
        .join("\n");

        let report = run_replay(
            Cursor::new(lines),
            &mut engine,
            &assigner,
            AssignMode::SplitScreen,
        )
        .unwrap();
        let p2 = report.snapshot.player(PlayerSlot::Player2);
        assert_eq!(p2.rep_count, 1);
        assert_eq!(p2.zone_hits, 1);
        assert_eq!(p2.score, 100.0);
    }

    #[test]
    fn test_reset_record() {
        let (mut engine, assigner) = setup(ScoringMode::FormOnly);
        let lines = [
            record(0.0, Some(pose(0.2, true))),
            record(0.1, Some(pose(0.2, false))),
            r#"{"at": 0.2, "reset": true}"#.to_string(),
        ]
        .join("\n");
        let report =
            run_replay(Cursor::new(lines), &mut engine, &assigner, AssignMode::default()).unwrap();
        assert_eq!(report.completed_reps, 1);
        assert_eq!(report.snapshot.total_reps(), 0);
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let (mut engine, assigner) = setup(ScoringMode::FormOnly);
        let lines = format!("{}\nnot json\n", record(0.0, None));
        let err = run_replay(Cursor::new(lines), &mut engine, &assigner, AssignMode::default())
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
