use crate::{
    pose::{Joint, JointFrame},
    types::PlayerSlot,
};

pub const DEFAULT_MIN_VISIBILITY: f32 = 0.5;

/// How detections are mapped to player slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignMode {
    /// One inference over the whole frame; the nose decides the side.
    Midpoint { midpoint: f32 },
    /// Each half of the frame is inferred separately and owns its slot.
    SplitScreen,
}

impl Default for AssignMode {
    fn default() -> Self {
        AssignMode::Midpoint { midpoint: 0.5 }
    }
}

/// Per-tick mapping from slot to the joints seen for it. `None` means "no
/// update for this slot", never "joint at origin".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    frames: [Option<JointFrame>; 2],
}

impl Assignment {
    pub fn get(&self, slot: PlayerSlot) -> Option<&JointFrame> {
        self.frames[slot.index()].as_ref()
    }

    pub fn set(&mut self, slot: PlayerSlot, frame: Option<JointFrame>) {
        self.frames[slot.index()] = frame;
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlayerSlot, &JointFrame)> {
        PlayerSlot::ALL
            .into_iter()
            .filter_map(move |slot| self.get(slot).map(|frame| (slot, frame)))
    }

    pub fn is_empty(&self) -> bool {
        self.frames.iter().all(Option::is_none)
    }
}

#[derive(Debug, Clone)]
pub struct PlayerAssigner {
    required: Vec<Joint>,
    min_visibility: f32,
}

impl PlayerAssigner {
    pub fn new(required: Vec<Joint>, min_visibility: f32) -> Self {
        Self {
            required,
            min_visibility,
        }
    }

    pub fn min_visibility(&self) -> f32 {
        self.min_visibility
    }

    /// A detection is trusted only when the nose and every required joint
    /// clear the visibility threshold.
    pub fn is_valid(&self, frame: &JointFrame) -> bool {
        frame.get(Joint::Nose).is_visible(self.min_visibility)
            && frame.all_visible(&self.required, self.min_visibility)
    }

    pub fn by_midpoint(&self, frame: Option<JointFrame>, midpoint: f32) -> Assignment {
        let mut assignment = Assignment::default();
        let Some(frame) = frame else {
            return assignment;
        };
        if !self.is_valid(&frame) {
            log::debug!("detection failed visibility gate, skipping tick");
            return assignment;
        }

        let slot = if frame.get(Joint::Nose).x < midpoint {
            PlayerSlot::Player1
        } else {
            PlayerSlot::Player2
        };
        assignment.set(slot, Some(frame));
        assignment
    }

    /// Split-screen halves map straight onto their slots without looking at
    /// the content.
    pub fn split_screen(left: Option<JointFrame>, right: Option<JointFrame>) -> Assignment {
        Assignment {
            frames: [left, right],
        }
    }

    /// Split-screen halves, each still subject to the visibility gate.
    pub fn by_halves(&self, left: Option<JointFrame>, right: Option<JointFrame>) -> Assignment {
        let gate = |frame: Option<JointFrame>| frame.filter(|f| self.is_valid(f));
        Self::split_screen(gate(left), gate(right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pose::{BodySide, Landmark},
        profile::{ExerciseKind, ExerciseProfile},
    };

    fn squat_assigner() -> PlayerAssigner {
        let profile = ExerciseProfile::preset(ExerciseKind::Squat, BodySide::Left);
        PlayerAssigner::new(profile.required_joints(), DEFAULT_MIN_VISIBILITY)
    }

    fn person_at(nose_x: f32, visibility: f32) -> JointFrame {
        let mut frame = JointFrame::empty(640, 480);
        frame.set(Joint::Nose, Landmark::new(nose_x, 0.2, visibility));
        frame.set(Joint::LeftShoulder, Landmark::new(nose_x, 0.3, visibility));
        frame.set(Joint::LeftHip, Landmark::new(nose_x, 0.5, visibility));
        frame.set(Joint::LeftKnee, Landmark::new(nose_x, 0.7, visibility));
        frame.set(Joint::LeftAnkle, Landmark::new(nose_x, 0.9, visibility));
        frame
    }

    #[test]
    fn test_left_of_midpoint_goes_to_player1() {
        let assignment = squat_assigner().by_midpoint(Some(person_at(0.3, 0.5)), 0.5);
        assert!(assignment.get(PlayerSlot::Player1).is_some());
        assert!(assignment.get(PlayerSlot::Player2).is_none());
    }

    #[test]
    fn test_right_of_midpoint_goes_to_player2() {
        let assignment = squat_assigner().by_midpoint(Some(person_at(0.5, 0.9)), 0.5);
        assert!(assignment.get(PlayerSlot::Player1).is_none());
        assert!(assignment.get(PlayerSlot::Player2).is_some());
    }

    #[test]
    fn test_one_hidden_joint_rejects_detection() {
        let mut frame = person_at(0.3, 0.9);
        frame.set(Joint::LeftKnee, Landmark::new(0.3, 0.7, 0.3));
        let assignment = squat_assigner().by_midpoint(Some(frame), 0.5);
        assert!(assignment.is_empty());
    }

    #[test]
    fn test_no_detection_assigns_nothing() {
        let assignment = squat_assigner().by_midpoint(None, 0.5);
        assert!(assignment.is_empty());
        assert_eq!(assignment.iter().count(), 0);
    }

    #[test]
    fn test_split_screen_ignores_content() {
        // Nose on the "wrong" side and nothing visible: still mapped by half.
        let left = person_at(0.9, 0.0);
        let assignment = PlayerAssigner::split_screen(Some(left.clone()), None);
        assert_eq!(assignment.get(PlayerSlot::Player1), Some(&left));
        assert!(assignment.get(PlayerSlot::Player2).is_none());
        let slots: Vec<PlayerSlot> = assignment.iter().map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![PlayerSlot::Player1]);
    }

    #[test]
    fn test_halves_keep_side_but_apply_gate() {
        let assigner = squat_assigner();
        // Nose position is irrelevant, hidden joints are not.
        let assignment = assigner.by_halves(Some(person_at(0.9, 0.9)), Some(person_at(0.1, 0.2)));
        assert!(assignment.get(PlayerSlot::Player1).is_some());
        assert!(assignment.get(PlayerSlot::Player2).is_none());
    }
}
