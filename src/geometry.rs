//! Planar joint geometry on pixel-space points.

const MIN_RAY_LENGTH: f32 = 1e-4;

/// Angle at vertex `b` between rays `b -> a` and `b -> c`, in degrees within
/// `0.0..=180.0`.
///
/// Returns `None` when either ray has no length (or inputs are not finite);
/// callers skip the tick instead of feeding NaN into the phase tracker.
pub fn joint_angle(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> Option<f32> {
    if ray_length(a, b) < MIN_RAY_LENGTH || ray_length(c, b) < MIN_RAY_LENGTH {
        return None;
    }

    let radians = (c.1 - b.1).atan2(c.0 - b.0) - (a.1 - b.1).atan2(a.0 - b.0);
    let mut angle = radians.to_degrees().abs();
    if angle > 180.0 {
        angle = 360.0 - angle;
    }

    angle.is_finite().then_some(angle)
}

pub fn centroid(points: &[(f32, f32)]) -> Option<(f32, f32)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
    Some((sx / n, sy / n))
}

fn ray_length(p: (f32, f32), vertex: (f32, f32)) -> f32 {
    let len = ((p.0 - vertex.0).powi(2) + (p.1 - vertex.1).powi(2)).sqrt();
    if len.is_finite() { len } else { 0.0 }
}
