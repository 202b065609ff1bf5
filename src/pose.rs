use serde::{Deserialize, Serialize};

/// COCO 17-keypoint skeleton, the order MoveNet emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum Joint {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Joint {
    pub const COUNT: usize = 17;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Same joint on the other side of the body. The nose maps to itself.
    pub fn mirrored(self) -> Self {
        match self {
            Joint::Nose => Joint::Nose,
            Joint::LeftEye => Joint::RightEye,
            Joint::RightEye => Joint::LeftEye,
            Joint::LeftEar => Joint::RightEar,
            Joint::RightEar => Joint::LeftEar,
            Joint::LeftShoulder => Joint::RightShoulder,
            Joint::RightShoulder => Joint::LeftShoulder,
            Joint::LeftElbow => Joint::RightElbow,
            Joint::RightElbow => Joint::LeftElbow,
            Joint::LeftWrist => Joint::RightWrist,
            Joint::RightWrist => Joint::LeftWrist,
            Joint::LeftHip => Joint::RightHip,
            Joint::RightHip => Joint::LeftHip,
            Joint::LeftKnee => Joint::RightKnee,
            Joint::RightKnee => Joint::LeftKnee,
            Joint::LeftAnkle => Joint::RightAnkle,
            Joint::RightAnkle => Joint::LeftAnkle,
        }
    }
}

/// Which half of the body an exercise profile tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySide {
    Left,
    Right,
}

impl BodySide {
    pub fn shoulder(self) -> Joint {
        match self {
            BodySide::Left => Joint::LeftShoulder,
            BodySide::Right => Joint::RightShoulder,
        }
    }

    pub fn elbow(self) -> Joint {
        match self {
            BodySide::Left => Joint::LeftElbow,
            BodySide::Right => Joint::RightElbow,
        }
    }

    pub fn wrist(self) -> Joint {
        match self {
            BodySide::Left => Joint::LeftWrist,
            BodySide::Right => Joint::RightWrist,
        }
    }

    pub fn hip(self) -> Joint {
        match self {
            BodySide::Left => Joint::LeftHip,
            BodySide::Right => Joint::RightHip,
        }
    }

    pub fn knee(self) -> Joint {
        match self {
            BodySide::Left => Joint::LeftKnee,
            BodySide::Right => Joint::RightKnee,
        }
    }

    pub fn ankle(self) -> Joint {
        match self {
            BodySide::Left => Joint::LeftAnkle,
            BodySide::Right => Joint::RightAnkle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    /// Normalized x (0.0..=1.0, left to right).
    pub x: f32,
    /// Normalized y (0.0..=1.0, top to bottom).
    pub y: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// One inference result: every joint of a single person plus the size of the
/// image the coordinates are normalized against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointFrame {
    pub landmarks: [Landmark; Joint::COUNT],
    pub width: u32,
    pub height: u32,
}

impl JointFrame {
    pub fn new(landmarks: [Landmark; Joint::COUNT], width: u32, height: u32) -> Self {
        Self {
            landmarks,
            width,
            height,
        }
    }

    /// All joints at the origin with zero visibility.
    pub fn empty(width: u32, height: u32) -> Self {
        Self::new([Landmark::default(); Joint::COUNT], width, height)
    }

    pub fn get(&self, joint: Joint) -> &Landmark {
        &self.landmarks[joint as usize]
    }

    pub fn set(&mut self, joint: Joint, landmark: Landmark) {
        self.landmarks[joint as usize] = landmark;
    }

    pub fn pixel(&self, joint: Joint) -> (f32, f32) {
        self.get(joint).to_pixel(self.width, self.height)
    }

    pub fn all_visible(&self, joints: &[Joint], threshold: f32) -> bool {
        joints.iter().all(|&j| self.get(j).is_visible(threshold))
    }

    /// Re-express coordinates inferred on a column strip starting at
    /// `offset_px` relative to the full frame of width `full_width`.
    pub fn remap_columns(&self, offset_px: u32, full_width: u32) -> JointFrame {
        if full_width == 0 {
            return self.clone();
        }
        let scale = self.width as f32 / full_width as f32;
        let offset = offset_px as f32 / full_width as f32;
        let mut landmarks = self.landmarks;
        for lm in landmarks.iter_mut() {
            lm.x = lm.x * scale + offset;
        }
        JointFrame::new(landmarks, full_width, self.height)
    }

    pub fn average_visibility(&self) -> f32 {
        let sum: f32 = self.landmarks.iter().map(|l| l.visibility).sum();
        sum / Joint::COUNT as f32
    }
}
