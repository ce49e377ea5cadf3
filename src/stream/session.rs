//! ストリームセッション: 1論理ストリーム分の状態
//!
//! ライフサイクル: Created → Loading → Active → (Error | Closed)
//! Errorのセッションは照会可能なままフレームを受け付けず、closeして
//! 作り直すことで回復する。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::detector::{Detector, RawFrame, SourceKind};
use crate::retarget::PoseSmoother;

/// メトリクスのローリングウィンドウ長（フレーム数）
const METRICS_WINDOW: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Created,
    Loading,
    Active,
    Error(String),
    Closed,
}

impl SessionState {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Loading => "loading",
            SessionState::Active => "active",
            SessionState::Error(_) => "error",
            SessionState::Closed => "closed",
        }
    }
}

/// 処理待ちフレーム。深さは常に1（最新フレームが置き換える）。
pub(crate) struct QueuedFrame {
    pub frame: RawFrame,
    pub timestamp_ms: u64,
}

#[derive(Default)]
pub(crate) struct PendingSlot {
    pub frame: Option<QueuedFrame>,
    /// 受理済みの最大キャプチャ時刻。これより古いフレームは破棄する
    /// （単一飛行と合わせて結果の時刻順序を保証する）
    pub last_accepted_ms: Option<u64>,
}

/// fps・処理レイテンシのローリング集計
pub(crate) struct RollingMetrics {
    completions: VecDeque<Instant>,
    latencies: VecDeque<f32>,
    pub dropped: u64,
}

impl RollingMetrics {
    pub fn new() -> Self {
        Self {
            completions: VecDeque::with_capacity(METRICS_WINDOW),
            latencies: VecDeque::with_capacity(METRICS_WINDOW),
            dropped: 0,
        }
    }

    pub fn record(&mut self, latency: Duration) {
        if self.completions.len() == METRICS_WINDOW {
            self.completions.pop_front();
            self.latencies.pop_front();
        }
        self.completions.push_back(Instant::now());
        self.latencies.push_back(latency.as_secs_f32() * 1000.0);
    }

    pub fn fps(&self) -> f32 {
        if self.completions.len() < 2 {
            return 0.0;
        }
        let span = self
            .completions
            .back()
            .unwrap()
            .duration_since(*self.completions.front().unwrap())
            .as_secs_f32();
        if span <= 0.0 {
            return 0.0;
        }
        (self.completions.len() - 1) as f32 / span
    }

    pub fn avg_latency_ms(&self) -> f32 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        self.latencies.iter().sum::<f32>() / self.latencies.len() as f32
    }
}

/// 読み取り専用のセッション統計（外部観測用）
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub id: String,
    pub state: String,
    pub error: Option<String>,
    pub detector: String,
    pub source: SourceKind,
    pub fps: f32,
    pub avg_latency_ms: f32,
    pub last_timestamp_ms: Option<u64>,
    pub dropped_frames: u64,
}

pub(crate) struct SessionHandle {
    pub id: String,
    pub source: SourceKind,
    pub detector_kind: Mutex<String>,
    pub state: Mutex<SessionState>,
    pub detector: Mutex<Option<Box<dyn Detector>>>,
    pub pending: Mutex<PendingSlot>,
    /// このセッションのフレームが処理中またはキュー済みか（単一飛行）
    pub in_flight: AtomicBool,
    pub closed: AtomicBool,
    pub smoother: Mutex<PoseSmoother>,
    pub metrics: Mutex<RollingMetrics>,
}

impl SessionHandle {
    pub fn new(id: String, source: SourceKind, detector_kind: &str, smoother: PoseSmoother) -> Self {
        Self {
            id,
            source,
            detector_kind: Mutex::new(detector_kind.to_string()),
            state: Mutex::new(SessionState::Created),
            detector: Mutex::new(None),
            pending: Mutex::new(PendingSlot::default()),
            in_flight: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            smoother: Mutex::new(smoother),
            metrics: Mutex::new(RollingMetrics::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().unwrap().clone()
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.state.lock().unwrap(), SessionState::Active)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// フレームを受理して保留スロットへ。古いタイムスタンプは破棄。
    /// 戻り値は受理したかどうか。
    pub fn push_frame(&self, frame: RawFrame, timestamp_ms: u64) -> bool {
        let mut slot = self.pending.lock().unwrap();
        if let Some(last) = slot.last_accepted_ms {
            if timestamp_ms < last {
                self.metrics.lock().unwrap().dropped += 1;
                return false;
            }
        }
        slot.last_accepted_ms = Some(timestamp_ms);
        if slot.frame.replace(QueuedFrame { frame, timestamp_ms }).is_some() {
            // 未処理のフレームを最新で置き換えた（バックプレッシャ）
            self.metrics.lock().unwrap().dropped += 1;
        }
        true
    }

    pub fn take_pending(&self) -> Option<QueuedFrame> {
        self.pending.lock().unwrap().frame.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap().frame.is_some()
    }

    pub fn clear_pending(&self) {
        self.pending.lock().unwrap().frame = None;
    }

    /// デタッチされた検出器を停止する。二重呼び出しは無害。
    pub fn shutdown_detector(&self) {
        if let Some(mut detector) = self.detector.lock().unwrap().take() {
            detector.shutdown();
        }
    }

    pub fn stats(&self) -> SessionStats {
        let state = self.state();
        // ロックは順にひとつずつ取得する（push_frameとの順序逆転を避ける）
        let last_timestamp_ms = self.pending.lock().unwrap().last_accepted_ms;
        let detector = self.detector_kind.lock().unwrap().clone();
        let metrics = self.metrics.lock().unwrap();
        SessionStats {
            id: self.id.clone(),
            state: state.kind().to_string(),
            error: match &state {
                SessionState::Error(message) => Some(message.clone()),
                _ => None,
            },
            detector,
            source: self.source,
            fps: metrics.fps(),
            avg_latency_ms: metrics.avg_latency_ms(),
            last_timestamp_ms,
            dropped_frames: metrics.dropped,
        }
    }
}
