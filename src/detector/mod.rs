//! Detector plugin boundary.
//!
//! A detector turns raw frames into Unified Skeleton poses. Backends are a
//! closed, tagged set selected through [`DetectorConfig`]; the orchestrator
//! only sees `Box<dyn Detector>` and may swap it per session at runtime.

pub mod synthetic;

#[cfg(feature = "onnx")]
pub mod rtmpose;

use serde::Deserialize;

use crate::error::DetectorError;
use crate::pose::UnifiedPose;

pub use synthetic::SyntheticDetector;

/// 1フレーム分の生画像。RGB8パック、行優先。
/// キャプチャ・デコードはスコープ外（呼び出し側の責務）。
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// テスト・デモ用の黒塗りフレーム
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width * height * 3) as usize],
        }
    }
}

/// Frame origin, recorded per session. Live sources tolerate frame drops;
/// video sources are offline replays where the caller paces submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Live,
    Video,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Live => "live",
            SourceKind::Video => "video",
        }
    }
}

/// Pose estimation backend contract.
///
/// `process_frame` must be safe to call repeatedly without re-initialization
/// and should return within bounded time; a hung detector stalls only its own
/// session (single-flight), never the pool. Construction doubles as warm-up:
/// `create` returning Ok means the backend is ready for frames.
pub trait Detector: Send {
    fn process_frame(
        &mut self,
        frame: &RawFrame,
        timestamp_ms: u64,
    ) -> Result<UnifiedPose, DetectorError>;

    /// Release model resources. Called once, after the last frame.
    fn shutdown(&mut self) {}
}

/// Closed set of detector backends. Selecting one in config:
/// `{ kind = "synthetic" }` or
/// `{ kind = "rtmpose", model_path = "rtmw-x.onnx" }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorConfig {
    /// 決定論的な合成ポーズ（テスト・ベンチ・デモ用）
    Synthetic,
    /// SimCC系ONNX全身モデル (RTMPose/RTMW)
    #[serde(rename = "rtmpose")]
    RtmPose {
        model_path: String,
        #[serde(default = "default_input_width")]
        input_width: u32,
        #[serde(default = "default_input_height")]
        input_height: u32,
        /// 正規化画像座標→擬似メートル座標の変換スケール
        #[serde(default = "default_world_scale")]
        world_scale: f32,
    },
}

fn default_input_width() -> u32 { 288 }
fn default_input_height() -> u32 { 384 }
fn default_world_scale() -> f32 { 2.0 }

impl DetectorConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            DetectorConfig::Synthetic => "synthetic",
            DetectorConfig::RtmPose { .. } => "rtmpose",
        }
    }
}

/// Build and warm up the backend described by `config`.
pub fn create(config: &DetectorConfig) -> Result<Box<dyn Detector>, DetectorError> {
    match config {
        DetectorConfig::Synthetic => Ok(Box::new(SyntheticDetector::new())),
        #[cfg(feature = "onnx")]
        DetectorConfig::RtmPose {
            model_path,
            input_width,
            input_height,
            world_scale,
        } => {
            let detector =
                rtmpose::RtmPoseDetector::new(model_path, *input_width, *input_height, *world_scale)?;
            Ok(Box::new(detector))
        }
        #[cfg(not(feature = "onnx"))]
        DetectorConfig::RtmPose { .. } => Err(DetectorError::UnsupportedConfig(
            "rtmpose requires the `onnx` feature".to_string(),
        )),
    }
}
