use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::PoseEngine;
use crate::{
    config::ModelConfig,
    model_download::ensure_model_ready,
    pose::{Joint, JointFrame, Landmark},
    types::Frame,
};

/// Below this mean keypoint score the output is treated as "nobody there".
const MIN_PERSON_SCORE: f32 = 0.15;
/// y, x, score per keypoint.
const VALUES_PER_KEYPOINT: usize = 3;

/// Single-person MoveNet estimator. Input is a square RGB image with values
/// in 0..=255, output `[1, 1, 17, 3]` as (y, x, score).
pub struct MoveNetEngine {
    session: Session,
    input_size: u32,
    resizer: Resizer,
}

impl MoveNetEngine {
    /// Fetch the model if needed and build the session.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let path = Path::new(&config.path);
        ensure_model_ready(path, config.url.as_deref())?;
        let engine = Self::new(path, config.input_size)?;
        log::info!(
            "MoveNet ORT backend ready using {} ({}px input)",
            path.display(),
            config.input_size
        );
        Ok(engine)
    }

    pub fn new(model_path: &Path, input_size: u32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;

        Ok(Self {
            session,
            input_size,
            resizer: Resizer::new(),
        })
    }

    fn preprocess(&mut self, frame: &Frame) -> Result<Array4<f32>> {
        let size = self.input_size;
        let src = ImageRef::new(frame.width, frame.height, &frame.rgba, PixelType::U8x4)?;
        let mut dst = Image::new(size, size, PixelType::U8x4);
        self.resizer.resize(
            &src,
            &mut dst,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        let side = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, side, side, 3));
        for (i, px) in dst.buffer().chunks_exact(4).enumerate() {
            let (y, x) = (i / side, i % side);
            for c in 0..3 {
                tensor[[0, y, x, c]] = f32::from(px[c]);
            }
        }
        Ok(tensor)
    }
}

impl PoseEngine for MoveNetEngine {
    fn infer(&mut self, frame: &Frame) -> Result<Option<JointFrame>> {
        if frame.width == 0 || frame.height == 0 {
            return Ok(None);
        }

        let input = self.preprocess(frame)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }
        let raw = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = raw.iter().copied().collect();

        let joints = decode_keypoints(&flattened, frame.width, frame.height)?;
        if joints.average_visibility() < MIN_PERSON_SCORE {
            return Ok(None);
        }
        Ok(Some(joints))
    }
}

/// Turn the flat (y, x, score) triples into a joint frame for an image of
/// `width` x `height`.
pub fn decode_keypoints(values: &[f32], width: u32, height: u32) -> Result<JointFrame> {
    let expected = Joint::COUNT * VALUES_PER_KEYPOINT;
    if values.len() < expected {
        return Err(anyhow!(
            "expected {expected} keypoint values, model returned {}",
            values.len()
        ));
    }

    let mut joints = JointFrame::empty(width, height);
    for (joint, chunk) in Joint::ALL
        .iter()
        .zip(values.chunks_exact(VALUES_PER_KEYPOINT))
    {
        let (y, x, score) = (chunk[0], chunk[1], chunk[2]);
        joints.set(
            *joint,
            Landmark::new(x.clamp(0.0, 1.0), y.clamp(0.0, 1.0), score.clamp(0.0, 1.0)),
        );
    }
    Ok(joints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_swaps_axes() {
        let mut values = vec![0.0; 51];
        // Left knee: y = 0.7, x = 0.25
        let i = Joint::LeftKnee as usize * 3;
        values[i..i + 3].copy_from_slice(&[0.7, 0.25, 0.9]);
        let joints = decode_keypoints(&values, 640, 480).unwrap();
        let knee = joints.get(Joint::LeftKnee);
        assert_eq!((knee.x, knee.y, knee.visibility), (0.25, 0.7, 0.9));
        let (px, py) = joints.pixel(Joint::LeftKnee);
        assert!((px - 160.0).abs() < 1e-3 && (py - 336.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_rejects_short_output() {
        assert!(decode_keypoints(&[0.0; 50], 10, 10).is_err());
    }

    #[test]
    fn test_decode_clamps_out_of_range() {
        let mut values = vec![0.5; 51];
        values[0..3].copy_from_slice(&[-0.2, 1.3, 1.5]);
        let joints = decode_keypoints(&values, 10, 10).unwrap();
        let nose = joints.get(Joint::Nose);
        assert_eq!((nose.x, nose.y, nose.visibility), (1.0, 0.0, 1.0));
    }
}
