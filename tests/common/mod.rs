#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use squativa::{
    error::CameraError,
    pipeline::{PoseEngine, camera::CameraSource},
    pose::{Joint, JointFrame, Landmark},
    types::Frame,
};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

/// Left-side squat pose centred at `x`. Standing puts the knee near 180°,
/// `deep` bends it to roughly 45°. The torso stays upright either way.
pub fn squat(x: f32, deep: bool) -> JointFrame {
    let mut frame = JointFrame::empty(WIDTH, HEIGHT);
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

/// Camera that alternates standing and deep frames while `moving` is set,
/// and only standing frames otherwise. The first byte of each frame marks
/// the pose for [`MarkerPose`].
pub struct SquatCamera {
    pub moving: Arc<AtomicBool>,
    pub reads: Arc<AtomicUsize>,
    pub interval: Duration,
}

impl CameraSource for SquatCamera {
    fn read(&mut self) -> Result<Frame, CameraError> {
        thread::sleep(self.interval);
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        let deep = self.moving.load(Ordering::SeqCst) && (n / 3) % 2 == 1;
        let mut rgba = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
        rgba[0] = u8::from(deep);
        Ok(Frame::new(rgba, WIDTH, HEIGHT))
    }
}

/// Reads the marker written by [`SquatCamera`] back into a pose.
pub struct MarkerPose {
    pub x: f32,
}

impl PoseEngine for MarkerPose {
    fn infer(&mut self, frame: &Frame) -> anyhow::Result<Option<JointFrame>> {
        let deep = frame.rgba.first().copied().unwrap_or(0) == 1;
        Ok(Some(squat(self.x, deep)))
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}
