//! SimCC whole-body pose backend (RTMPose/RTMW family) via ONNX Runtime.
//!
//! Decodes the two SimCC classification heads (`simcc_x`, `simcc_y`) by
//! argmax and converts the COCO-133 whole-body layout to the unified joint
//! set. The model is 2D: world coordinates are synthesized by centering and
//! Y-flipping normalized image coordinates at a configured metric scale, so
//! depth-dependent bones (feet) gate themselves out rather than guessing.

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use crate::error::DetectorError;
use crate::pose::{JointId, UnifiedJoint, UnifiedPose};

use super::{Detector, RawFrame};

/// SimCC bin resolution relative to input pixels
const SIMCC_SPLIT_RATIO: f32 = 2.0;
/// RTMPose input normalization (ImageNet mean/std, BGR->RGB order applied)
const MEAN: [f32; 3] = [123.675, 116.28, 103.53];
const STD: [f32; 3] = [58.395, 57.12, 57.375];
/// COCO-WholeBody keypoint count
const KPT_COUNT: usize = 133;

/// COCO-133 index -> unified joint. Body 0-16, feet 17-22, hands 91-132
/// (21 points per hand: root, thumb1-4, forefinger1-4, middle, ring, pinky;
/// the finger-tip points drive the hand plane).
const COCO133_MAP: [(usize, JointId); 20] = [
    (5, JointId::LeftShoulder),
    (6, JointId::RightShoulder),
    (7, JointId::LeftElbow),
    (8, JointId::RightElbow),
    (9, JointId::LeftWrist),
    (10, JointId::RightWrist),
    (11, JointId::LeftHip),
    (12, JointId::RightHip),
    (13, JointId::LeftKnee),
    (14, JointId::RightKnee),
    (15, JointId::LeftAnkle),
    (16, JointId::RightAnkle),
    (17, JointId::LeftToe),
    (20, JointId::RightToe),
    (95, JointId::LeftThumb),    // left thumb4 (tip)
    (99, JointId::LeftIndex),    // left forefinger4
    (111, JointId::LeftPinky),   // left pinky4
    (116, JointId::RightThumb),  // right thumb4
    (120, JointId::RightIndex),  // right forefinger4
    (132, JointId::RightPinky),  // right pinky4
];

fn build_session(model_path: &str) -> Result<Session, DetectorError> {
    let builder = Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .map_err(|e| DetectorError::Init(e.to_string()))?;

    #[cfg(feature = "cuda")]
    let builder = builder
        .with_execution_providers([ort::execution_providers::CUDAExecutionProvider::default().build()])
        .map_err(|e| DetectorError::Init(e.to_string()))?;

    builder
        .commit_from_file(model_path)
        .map_err(|e| DetectorError::Init(format!("failed to load ONNX model: {}", e)))
}

pub struct RtmPoseDetector {
    session: Session,
    input_width: u32,
    input_height: u32,
    world_scale: f32,
}

impl RtmPoseDetector {
    pub fn new(
        model_path: &str,
        input_width: u32,
        input_height: u32,
        world_scale: f32,
    ) -> Result<Self, DetectorError> {
        let session = build_session(model_path)?;
        Ok(Self {
            session,
            input_width,
            input_height,
            world_scale,
        })
    }

    fn preprocess(&self, frame: &RawFrame) -> Result<Array4<f32>, DetectorError> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| {
                DetectorError::Inference(format!(
                    "frame buffer size mismatch: {}x{} with {} bytes",
                    frame.width,
                    frame.height,
                    frame.data.len()
                ))
            })?;
        let resized = image::imageops::resize(
            &image,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );

        let (w, h) = (self.input_width as usize, self.input_height as usize);
        let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - MEAN[c]) / STD[c];
            }
        }
        Ok(tensor)
    }

    fn decode(&self, frame: &RawFrame, timestamp_ms: u64, raw: &[(f32, f32, f32)]) -> UnifiedPose {
        let mut pose = UnifiedPose::empty(timestamp_ms);
        let aspect = frame.width as f32 / frame.height.max(1) as f32;

        for &(idx, joint) in COCO133_MAP.iter() {
            let (x, y, confidence) = raw[idx];
            // 2D model: position z unknown, pseudo-metric world with z=0
            let world = [
                (x - 0.5) * self.world_scale * aspect,
                (0.5 - y) * self.world_scale,
                0.0,
            ];
            pose.set(
                joint,
                UnifiedJoint::new([x, y, 0.0], world, confidence, confidence),
            );
        }

        pose.derive_midpoints();
        if let Some(hip) = pose.get(JointId::HipCentre) {
            pose.root_position = hip.world;
        }
        pose
    }
}

impl Detector for RtmPoseDetector {
    fn process_frame(
        &mut self,
        frame: &RawFrame,
        timestamp_ms: u64,
    ) -> Result<UnifiedPose, DetectorError> {
        let input = self.preprocess(frame)?;
        let input_tensor =
            Tensor::from_array(input).map_err(|e| DetectorError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs!["input" => input_tensor])
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        let simcc_x: ndarray::ArrayViewD<f32> = outputs["simcc_x"]
            .try_extract_array()
            .map_err(|e| DetectorError::Inference(format!("failed to extract simcc_x: {}", e)))?;
        let simcc_y: ndarray::ArrayViewD<f32> = outputs["simcc_y"]
            .try_extract_array()
            .map_err(|e| DetectorError::Inference(format!("failed to extract simcc_y: {}", e)))?;

        let bins_x = (self.input_width as f32 * SIMCC_SPLIT_RATIO) as usize;
        let bins_y = (self.input_height as f32 * SIMCC_SPLIT_RATIO) as usize;

        let mut raw = vec![(0.0f32, 0.0f32, 0.0f32); KPT_COUNT];
        for (i, slot) in raw.iter_mut().enumerate() {
            let mut mx_val = f32::NEG_INFINITY;
            let mut mx_idx = 0usize;
            for j in 0..bins_x {
                let v = simcc_x[[0, i, j]];
                if v > mx_val {
                    mx_val = v;
                    mx_idx = j;
                }
            }
            let mut my_val = f32::NEG_INFINITY;
            let mut my_idx = 0usize;
            for j in 0..bins_y {
                let v = simcc_y[[0, i, j]];
                if v > my_val {
                    my_val = v;
                    my_idx = j;
                }
            }
            let x = mx_idx as f32 / SIMCC_SPLIT_RATIO / self.input_width as f32;
            let y = my_idx as f32 / SIMCC_SPLIT_RATIO / self.input_height as f32;
            let avg_logit = (mx_val + my_val) / 2.0;
            let confidence = 1.0 / (1.0 + (-avg_logit).exp());
            *slot = (x, y, confidence);
        }

        Ok(self.decode(frame, timestamp_ms, &raw))
    }
}
