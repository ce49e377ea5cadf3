use std::fs;
use std::path::Path;

use log::warn;
use serde::Deserialize;

use crate::detector::DetectorConfig;
use crate::error::EngineError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub retarget: RetargetConfig,
    #[serde(default)]
    pub rig: RigConfig,
    /// デモ・単体起動時に使う既定の検出器
    #[serde(default = "default_detector")]
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// 同時に存在できるストリームセッション数の上限
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// ワーカースレッド数。0 = min(論理コア数, 16)
    #[serde(default)]
    pub worker_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetargetConfig {
    /// この可視度未満の関節はボーン出力から除外される
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
    /// SLERPブレンド係数（新しい値へ寄せる割合/フレーム）
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: f32,
    /// コンシューマ側で結果を破棄すべき経過時間
    #[serde(default = "default_stale_result_ms")]
    pub stale_result_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RigConfig {
    /// ターゲットリグアセット(JSON)のパス。空なら組み込みヒューマノイド。
    #[serde(default)]
    pub path: String,
}

fn default_max_sessions() -> usize { 10 }
fn default_visibility_threshold() -> f32 { 0.8 }
fn default_smoothing_factor() -> f32 { 0.3 }
fn default_stale_result_ms() -> u64 { 2500 }
fn default_detector() -> DetectorConfig { DetectorConfig::Synthetic }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            worker_threads: 0,
        }
    }
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
            smoothing_factor: default_smoothing_factor(),
            stale_result_ms: default_stale_result_ms(),
        }
    }
}

impl Default for RigConfig {
    fn default() -> Self {
        Self { path: String::new() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            retarget: RetargetConfig::default(),
            rig: RigConfig::default(),
            detector: default_detector(),
        }
    }
}

impl EngineConfig {
    /// 実際に起動するワーカー数
    pub fn effective_workers(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        parallelism.min(16)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// 設定ファイルが無い・壊れている場合はデフォルトで起動する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "config {} not loaded ({}), using defaults",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }
}
