use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    geometry::{centroid, joint_angle},
    pose::{BodySide, Joint, JointFrame},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    Squat,
    BicepCurl,
    LateralRaise,
    TricepsExtension,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 4] = [
        ExerciseKind::Squat,
        ExerciseKind::BicepCurl,
        ExerciseKind::LateralRaise,
        ExerciseKind::TricepsExtension,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExerciseKind::Squat => "squat",
            ExerciseKind::BicepCurl => "bicep_curl",
            ExerciseKind::LateralRaise => "lateral_raise",
            ExerciseKind::TricepsExtension => "triceps_extension",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExerciseKind::Squat => "Squats",
            ExerciseKind::BicepCurl => "Curls",
            ExerciseKind::LateralRaise => "Raises",
            ExerciseKind::TricepsExtension => "Extensions",
        }
    }

    pub fn form_feedback(&self) -> &'static str {
        match self {
            ExerciseKind::Squat => "Leaning too far forward!",
            ExerciseKind::BicepCurl => "Keep your elbow tucked in!",
            ExerciseKind::LateralRaise => "Keep your arms straight!",
            ExerciseKind::TricepsExtension => "Lift your elbow above your head!",
        }
    }
}

/// Whether contracting the tracked joint shrinks or widens its angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleDirection {
    /// Knee flexion, elbow flexion: contracted below the lower bound.
    Closing,
    /// Shoulder abduction: contracted above the upper bound.
    Opening,
}

/// The two phase bounds. The gap between them is the hysteresis band in which
/// no transition happens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleThresholds {
    pub contracted: f32,
    pub extended: f32,
}

impl AngleThresholds {
    pub fn new(contracted: f32, extended: f32) -> Self {
        Self {
            contracted,
            extended,
        }
    }

    pub fn reaches_contracted(&self, direction: AngleDirection, angle: f32) -> bool {
        match direction {
            AngleDirection::Closing => angle < self.contracted,
            AngleDirection::Opening => angle > self.contracted,
        }
    }

    pub fn reaches_extended(&self, direction: AngleDirection, angle: f32) -> bool {
        match direction {
            AngleDirection::Closing => angle > self.extended,
            AngleDirection::Opening => angle < self.extended,
        }
    }
}

/// Which limbs a repetition is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limbs {
    /// Only the configured side.
    #[default]
    Single,
    /// Whichever side is further into the movement, e.g. alternating curls.
    Either,
    /// Both sides in sync: the side lagging behind decides the phase, and
    /// form must hold on both.
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointTriple {
    pub a: Joint,
    pub vertex: Joint,
    pub c: Joint,
}

impl JointTriple {
    pub fn new(a: Joint, vertex: Joint, c: Joint) -> Self {
        Self { a, vertex, c }
    }

    pub fn joints(&self) -> [Joint; 3] {
        [self.a, self.vertex, self.c]
    }

    pub fn mirrored(&self) -> Self {
        Self::new(self.a.mirrored(), self.vertex.mirrored(), self.c.mirrored())
    }

    pub fn angle(&self, frame: &JointFrame) -> Option<f32> {
        joint_angle(
            frame.pixel(self.a),
            frame.pixel(self.vertex),
            frame.pixel(self.c),
        )
    }
}

/// Posture check evaluated alongside the repetition angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormCheck {
    /// Correct while the angle stays at or above `bound`.
    MinAngle { joints: JointTriple, bound: f32 },
    /// Correct while the angle stays at or below `bound`.
    MaxAngle { joints: JointTriple, bound: f32 },
    /// Correct while `joint` sits above the centre of the face.
    AboveFace { joint: Joint },
}

impl FormCheck {
    pub fn bound(&self) -> Option<f32> {
        match self {
            FormCheck::MinAngle { bound, .. } | FormCheck::MaxAngle { bound, .. } => Some(*bound),
            FormCheck::AboveFace { .. } => None,
        }
    }

    pub fn mirrored(&self) -> Self {
        match *self {
            FormCheck::MinAngle { joints, bound } => FormCheck::MinAngle {
                joints: joints.mirrored(),
                bound,
            },
            FormCheck::MaxAngle { joints, bound } => FormCheck::MaxAngle {
                joints: joints.mirrored(),
                bound,
            },
            FormCheck::AboveFace { joint } => FormCheck::AboveFace {
                joint: joint.mirrored(),
            },
        }
    }

    fn with_bound(self, new_bound: f32) -> Self {
        match self {
            FormCheck::MinAngle { joints, .. } => FormCheck::MinAngle {
                joints,
                bound: new_bound,
            },
            FormCheck::MaxAngle { joints, .. } => FormCheck::MaxAngle {
                joints,
                bound: new_bound,
            },
            other => other,
        }
    }

    fn joints(&self) -> Vec<Joint> {
        match self {
            FormCheck::MinAngle { joints, .. } | FormCheck::MaxAngle { joints, .. } => {
                joints.joints().to_vec()
            }
            FormCheck::AboveFace { joint } => {
                vec![*joint, Joint::Nose, Joint::LeftEye, Joint::RightEye]
            }
        }
    }
}

/// Angles and posture verdict for one player on one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub primary_angle: f32,
    pub form_angle: Option<f32>,
    pub form_ok: bool,
}

/// Everything that distinguishes one exercise from another: which joints are
/// tracked, which way the angle moves and where the phase bounds lie.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseProfile {
    pub kind: ExerciseKind,
    pub side: BodySide,
    pub primary: JointTriple,
    pub direction: AngleDirection,
    pub thresholds: AngleThresholds,
    pub form: FormCheck,
    pub limbs: Limbs,
}

impl ExerciseProfile {
    pub fn preset(kind: ExerciseKind, side: BodySide) -> Self {
        let s = side;
        match kind {
            ExerciseKind::Squat => Self {
                kind,
                side,
                primary: JointTriple::new(s.hip(), s.knee(), s.ankle()),
                direction: AngleDirection::Closing,
                thresholds: AngleThresholds::new(70.0, 160.0),
                form: FormCheck::MinAngle {
                    joints: JointTriple::new(s.shoulder(), s.hip(), s.knee()),
                    bound: 90.0,
                },
                limbs: Limbs::Single,
            },
            ExerciseKind::BicepCurl => Self {
                kind,
                side,
                primary: JointTriple::new(s.shoulder(), s.elbow(), s.wrist()),
                direction: AngleDirection::Closing,
                thresholds: AngleThresholds::new(40.0, 160.0),
                form: FormCheck::MaxAngle {
                    joints: JointTriple::new(s.hip(), s.shoulder(), s.elbow()),
                    bound: 35.0,
                },
                limbs: Limbs::Single,
            },
            ExerciseKind::LateralRaise => Self {
                kind,
                side,
                primary: JointTriple::new(s.hip(), s.shoulder(), s.elbow()),
                direction: AngleDirection::Opening,
                thresholds: AngleThresholds::new(80.0, 30.0),
                form: FormCheck::MinAngle {
                    joints: JointTriple::new(s.shoulder(), s.elbow(), s.wrist()),
                    bound: 150.0,
                },
                limbs: Limbs::Single,
            },
            ExerciseKind::TricepsExtension => Self {
                kind,
                side,
                primary: JointTriple::new(s.shoulder(), s.elbow(), s.wrist()),
                direction: AngleDirection::Closing,
                thresholds: AngleThresholds::new(60.0, 170.0),
                form: FormCheck::AboveFace { joint: s.elbow() },
                limbs: Limbs::Single,
            },
        }
    }

    pub fn with_thresholds(mut self, thresholds: AngleThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_limbs(mut self, limbs: Limbs) -> Self {
        self.limbs = limbs;
        self
    }

    /// Tracked triple and posture check per limb, configured side first.
    pub fn tracked_limbs(&self) -> Vec<(JointTriple, FormCheck)> {
        let own = (self.primary, self.form);
        match self.limbs {
            Limbs::Single => vec![own],
            Limbs::Either | Limbs::Both => vec![own, (self.primary.mirrored(), self.form.mirrored())],
        }
    }

    /// Replace the posture bound. Ignored for checks without an angle.
    pub fn with_form_bound(mut self, bound: f32) -> Self {
        self.form = self.form.with_bound(bound);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let AngleThresholds {
            contracted,
            extended,
        } = self.thresholds;
        check_degrees("contracted bound", contracted)?;
        check_degrees("extended bound", extended)?;
        if let Some(bound) = self.form.bound() {
            check_degrees("form bound", bound)?;
        }

        let (ordered, relation) = match self.direction {
            AngleDirection::Closing => (contracted < extended, "below"),
            AngleDirection::Opening => (contracted > extended, "above"),
        };
        if !ordered {
            return Err(ConfigError::BoundOrder {
                exercise: self.kind.name(),
                contracted,
                extended,
                relation,
            });
        }
        Ok(())
    }

    /// Joints that must all be visible before a detection is trusted.
    pub fn required_joints(&self) -> Vec<Joint> {
        let mut joints = Vec::new();
        for (primary, form) in self.tracked_limbs() {
            for joint in primary.joints().into_iter().chain(form.joints()) {
                if !joints.contains(&joint) {
                    joints.push(joint);
                }
            }
        }
        joints
    }

    /// `None` when any angle is degenerate; the tick is skipped for this player.
    pub fn measure(&self, frame: &JointFrame) -> Option<Measurement> {
        let own = measure_limb(&self.primary, &self.form, frame)?;
        if self.limbs == Limbs::Single {
            return Some(own);
        }
        let other = measure_limb(&self.primary.mirrored(), &self.form.mirrored(), frame)?;

        let own_deeper = match self.direction {
            AngleDirection::Closing => own.primary_angle <= other.primary_angle,
            AngleDirection::Opening => own.primary_angle >= other.primary_angle,
        };
        let (deeper, lagging) = if own_deeper { (own, other) } else { (other, own) };

        Some(match self.limbs {
            Limbs::Either => deeper,
            _ => Measurement {
                form_ok: own.form_ok && other.form_ok,
                ..lagging
            },
        })
    }
}

fn measure_limb(primary: &JointTriple, form: &FormCheck, frame: &JointFrame) -> Option<Measurement> {
    let primary_angle = primary.angle(frame)?;
    let (form_angle, form_ok) = match *form {
        FormCheck::MinAngle { joints, bound } => {
            let angle = joints.angle(frame)?;
            (Some(angle), angle >= bound)
        }
        FormCheck::MaxAngle { joints, bound } => {
            let angle = joints.angle(frame)?;
            (Some(angle), angle <= bound)
        }
        FormCheck::AboveFace { joint } => {
            let face = centroid(&[
                frame.pixel(Joint::Nose),
                frame.pixel(Joint::LeftEye),
                frame.pixel(Joint::RightEye),
            ])?;
            (None, frame.pixel(joint).1 < face.1)
        }
    };

    Some(Measurement {
        primary_angle,
        form_angle,
        form_ok,
    })
}

fn check_degrees(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=180.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::AngleRange { name, value })
    }
}
