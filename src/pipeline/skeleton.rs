use rayon::prelude::*;

use crate::{
    engine::PlayerEvaluation,
    pose::{Joint, JointFrame},
    profile::{ExerciseProfile, FormCheck, JointTriple},
    types::{Frame, FrameSide, Phase},
};

pub type Rgba = [u8; 4];

/// Bones drawn for every detected person.
pub const SKELETON_CONNECTIONS: [(Joint, Joint); 16] = [
    // face
    (Joint::LeftEar, Joint::LeftEye),
    (Joint::LeftEye, Joint::Nose),
    (Joint::Nose, Joint::RightEye),
    (Joint::RightEye, Joint::RightEar),
    // arms
    (Joint::LeftShoulder, Joint::RightShoulder),
    (Joint::LeftShoulder, Joint::LeftElbow),
    (Joint::LeftElbow, Joint::LeftWrist),
    (Joint::RightShoulder, Joint::RightElbow),
    (Joint::RightElbow, Joint::RightWrist),
    // torso
    (Joint::LeftShoulder, Joint::LeftHip),
    (Joint::RightShoulder, Joint::RightHip),
    (Joint::LeftHip, Joint::RightHip),
    // legs
    (Joint::LeftHip, Joint::LeftKnee),
    (Joint::LeftKnee, Joint::LeftAnkle),
    (Joint::RightHip, Joint::RightKnee),
    (Joint::RightKnee, Joint::RightAnkle),
];

pub const SKELETON_COLOR: Rgba = [255, 255, 0, 255];
pub const JOINT_COLOR: Rgba = [255, 255, 255, 255];
pub const GOOD_FORM_COLOR: Rgba = [0, 220, 0, 255];
pub const BAD_FORM_COLOR: Rgba = [230, 30, 30, 255];
const SPLIT_LINE_COLOR: Rgba = [255, 255, 255, 255];
const GAUGE_COLOR: Rgba = [0, 200, 255, 255];
/// Alpha in the last channel.
const CONTRACTED_TINT: Rgba = [0, 120, 255, 60];
const BAD_FORM_TINT: Rgba = [255, 0, 0, 60];

const JOINT_RADIUS: i32 = 3;
const LIMB_RADIUS: i32 = 2;
const GAUGE_RADIUS: f32 = 28.0;

/// Mutable view over a tightly packed RGBA buffer.
pub struct Canvas<'a> {
    rgba: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> Canvas<'a> {
    /// `None` when the buffer is too small for the given size.
    pub fn new(rgba: &'a mut [u8], width: u32, height: u32) -> Option<Self> {
        if rgba.len() < width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            rgba,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let mut out = [0; 4];
        out.copy_from_slice(&self.rgba[i..i + 4]);
        Some(out)
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: Rgba) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            let i = (y as usize * self.width as usize + x as usize) * 4;
            self.rgba[i..i + 4].copy_from_slice(&color);
        }
    }

    /// Bresenham line.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba) {
        self.draw_thick_line(x0, y0, x1, y1, 0, color);
    }

    /// Line stamped with a filled disc of `radius` at every step.
    pub fn draw_thick_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, radius: i32, color: Rgba) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            if radius > 0 {
                self.fill_circle(x, y, radius, color);
            } else {
                self.set_pixel(x, y, color);
            }

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Rgba) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    pub fn draw_vertical_line(&mut self, x: u32, color: Rgba) {
        let x = x.min(self.width.saturating_sub(1)) as i32;
        self.draw_line(x, 0, x, self.height as i32 - 1, color);
    }

    /// Arc centred on (cx, cy), `sweep_deg` long, starting at `start_deg`
    /// (screen coordinates, 0° pointing right, positive clockwise).
    pub fn draw_arc(&mut self, cx: f32, cy: f32, radius: f32, start_deg: f32, sweep_deg: f32, color: Rgba) {
        let steps = (sweep_deg.abs() / 2.0).ceil().max(1.0) as i32;
        for step in 0..=steps {
            let theta = (start_deg + sweep_deg * step as f32 / steps as f32).to_radians();
            let x = cx + radius * theta.cos();
            let y = cy + radius * theta.sin();
            self.fill_circle(x.round() as i32, y.round() as i32, 1, color);
        }
    }

    /// Alpha-blend `tint` over the column range `[x0, x1)`.
    pub fn tint_columns(&mut self, x0: u32, x1: u32, tint: Rgba) {
        let x0 = x0.min(self.width) as usize;
        let x1 = (x1.min(self.width) as usize).max(x0);
        let alpha = u32::from(tint[3]);
        let stride = self.width as usize * 4;
        if stride == 0 {
            return;
        }

        self.rgba
            .par_chunks_mut(stride)
            .take(self.height as usize)
            .for_each(|row| {
                for px in row[x0 * 4..x1 * 4].chunks_exact_mut(4) {
                    for c in 0..3 {
                        let blended =
                            (u32::from(px[c]) * (255 - alpha) + u32::from(tint[c]) * alpha) / 255;
                        px[c] = blended as u8;
                    }
                }
            });
    }
}

fn to_screen(joints: &JointFrame, joint: Joint) -> (i32, i32) {
    let (x, y) = joints.pixel(joint);
    (x.round() as i32, y.round() as i32)
}

pub fn draw_skeleton(canvas: &mut Canvas<'_>, joints: &JointFrame, min_visibility: f32) {
    for (start, end) in SKELETON_CONNECTIONS {
        if joints.get(start).is_visible(min_visibility) && joints.get(end).is_visible(min_visibility)
        {
            let (x0, y0) = to_screen(joints, start);
            let (x1, y1) = to_screen(joints, end);
            canvas.draw_line(x0, y0, x1, y1, SKELETON_COLOR);
        }
    }

    for joint in Joint::ALL {
        if joints.get(joint).is_visible(min_visibility) {
            let (x, y) = to_screen(joints, joint);
            canvas.fill_circle(x, y, JOINT_RADIUS, JOINT_COLOR);
        }
    }
}

fn draw_triple(canvas: &mut Canvas<'_>, joints: &JointFrame, triple: &JointTriple, color: Rgba) {
    let (ax, ay) = to_screen(joints, triple.a);
    let (bx, by) = to_screen(joints, triple.vertex);
    let (cx, cy) = to_screen(joints, triple.c);
    canvas.draw_thick_line(ax, ay, bx, by, LIMB_RADIUS, color);
    canvas.draw_thick_line(bx, by, cx, cy, LIMB_RADIUS, color);
}

/// Arc at the tracked vertex whose length is the current angle.
fn draw_angle_gauge(canvas: &mut Canvas<'_>, joints: &JointFrame, triple: &JointTriple, angle: f32) {
    let (vx, vy) = joints.pixel(triple.vertex);
    let (ax, ay) = joints.pixel(triple.a);
    let start = (ay - vy).atan2(ax - vx).to_degrees();
    canvas.draw_arc(vx, vy, GAUGE_RADIUS, start, angle, GAUGE_COLOR);
}

/// Everything drawn on a camera frame for one tick: the split line, a tint
/// over each player's half while contracted (red when form is off), every
/// skeleton, the tracked limbs coloured by form and an angle gauge.
pub fn draw_overlay(
    frame: &mut Frame,
    profile: &ExerciseProfile,
    split_x: u32,
    min_visibility: f32,
    evaluations: &[PlayerEvaluation],
) {
    let (width, height) = (frame.width, frame.height);
    let Some(mut canvas) = Canvas::new(&mut frame.rgba, width, height) else {
        log::warn!("frame buffer does not match {width}x{height}, overlay skipped");
        return;
    };

    for eval in evaluations {
        let tint = if !eval.measurement.form_ok {
            Some(BAD_FORM_TINT)
        } else if eval.phase == Phase::Contracted {
            Some(CONTRACTED_TINT)
        } else {
            None
        };
        if let Some(tint) = tint {
            match eval.slot.side() {
                FrameSide::Left => canvas.tint_columns(0, split_x, tint),
                FrameSide::Right => canvas.tint_columns(split_x, width, tint),
            }
        }
    }

    canvas.draw_vertical_line(split_x, SPLIT_LINE_COLOR);

    for eval in evaluations {
        draw_skeleton(&mut canvas, &eval.joints, min_visibility);

        let color = if eval.measurement.form_ok {
            GOOD_FORM_COLOR
        } else {
            BAD_FORM_COLOR
        };
        for (primary, form) in profile.tracked_limbs() {
            match form {
                FormCheck::MinAngle { joints, .. } | FormCheck::MaxAngle { joints, .. } => {
                    draw_triple(&mut canvas, &eval.joints, &joints, color)
                }
                FormCheck::AboveFace { joint } => {
                    let (x, y) = to_screen(&eval.joints, joint);
                    canvas.fill_circle(x, y, JOINT_RADIUS + 2, color);
                }
            }
            draw_triple(&mut canvas, &eval.joints, &primary, color);
        }
        draw_angle_gauge(
            &mut canvas,
            &eval.joints,
            &profile.primary,
            eval.measurement.primary_angle,
        );
    }
}
