//! Stream orchestrator: admission control and dispatch across all sessions.
//!
//! A bounded worker pool is shared by every session (many sessions, few
//! workers). Backpressure is per session: a pending slot of depth one holds
//! the freshest unstarted frame, and at most one frame per session is in
//! processing at any instant (single-flight). Under sustained overload the
//! pipeline always works on the newest data and drops the rest.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::Config;
use crate::detector::{self, Detector, DetectorConfig, RawFrame, SourceKind};
use crate::error::{DetectorError, EngineError};
use crate::retarget::{BonePose, PoseSmoother, Retargeter};
use crate::rig::{MappingEntry, Rig};

use super::session::{SessionHandle, SessionState, SessionStats};

/// 処理済みフレームの結果（リザルトシンクへ渡る単位）。
/// コンシューマは now − timestamp_ms が閾値を超えた結果を破棄すること。
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub session_id: String,
    pub bones: HashMap<String, BonePose>,
    pub root_translation: [f32; 3],
    pub timestamp_ms: u64,
}

/// Orchestrator event channel payload. Loading/Switching precede the final
/// Ready/InitFailed/Switched/SwitchFailed because model warm-up can take
/// seconds; callers must treat session creation and detector switching as
/// asynchronous.
#[derive(Debug)]
pub enum EngineEvent {
    Loading { session_id: String, message: String },
    Ready { session_id: String },
    InitFailed { session_id: String, cause: String },
    Switching { session_id: String, message: String },
    Switched { session_id: String },
    SwitchFailed { session_id: String, cause: String },
    ProcessingFailed { session_id: String, cause: String },
    Frame(FrameResult),
}

/// Detector construction seam. The default is [`detector::create`] over the
/// closed config set; tests inject deterministic backends here.
pub type DetectorFactory =
    dyn Fn(&DetectorConfig) -> Result<Box<dyn Detector>, DetectorError> + Send + Sync;

enum Job {
    Drive(Arc<SessionHandle>),
    Shutdown,
}

struct Shared {
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
    work_tx: Sender<Job>,
    events_tx: Sender<EngineEvent>,
    retargeter: Retargeter,
    factory: Box<DetectorFactory>,
    max_sessions: usize,
    smoothing_factor: f32,
}

pub struct Orchestrator {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// ワーカープールを起動し、(orchestrator, イベント受信側) を返す
    pub fn new(
        config: &Config,
        rig: Rig,
        mappings: Vec<MappingEntry>,
    ) -> Result<(Self, Receiver<EngineEvent>), EngineError> {
        Self::with_factory(config, rig, mappings, Box::new(|cfg| detector::create(cfg)))
    }

    pub fn with_factory(
        config: &Config,
        rig: Rig,
        mappings: Vec<MappingEntry>,
        factory: Box<DetectorFactory>,
    ) -> Result<(Self, Receiver<EngineEvent>), EngineError> {
        let retargeter = Retargeter::new(&rig, &mappings, &config.retarget)?;
        let (work_tx, work_rx) = mpsc::channel::<Job>();
        let (events_tx, events_rx) = mpsc::channel::<EngineEvent>();

        let shared = Arc::new(Shared {
            sessions: Mutex::new(HashMap::new()),
            work_tx,
            events_tx,
            retargeter,
            factory,
            max_sessions: config.engine.max_sessions,
            smoothing_factor: config.retarget.smoothing_factor,
        });

        let worker_count = config.engine.effective_workers();
        let work_rx = Arc::new(Mutex::new(work_rx));
        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = Arc::clone(&work_rx);
            let shared = Arc::clone(&shared);
            workers.push(
                thread::Builder::new()
                    .name(format!("rigstream-worker-{}", i))
                    .spawn(move || worker_loop(rx, shared))
                    .map_err(EngineError::Io)?,
            );
        }
        info!("orchestrator started with {} workers", worker_count);

        Ok((Self { shared, workers }, events_rx))
    }

    /// セッションを作成する。同期エラーは上限超過と重複IDのみ。
    /// 検出器のウォームアップは別スレッドで走り、完了は
    /// Ready / InitFailed イベントで通知される。
    pub fn create_session(
        &self,
        id: &str,
        detector_config: DetectorConfig,
        source: SourceKind,
    ) -> Result<(), EngineError> {
        let session = {
            let mut sessions = self.shared.sessions.lock().unwrap();
            if sessions.len() >= self.shared.max_sessions {
                return Err(EngineError::SessionLimitExceeded {
                    live: sessions.len(),
                    max: self.shared.max_sessions,
                });
            }
            if sessions.contains_key(id) {
                return Err(EngineError::DuplicateSessionId(id.to_string()));
            }
            let smoother = PoseSmoother::new(
                self.shared.retargeter.bone_count(),
                self.shared.smoothing_factor,
            );
            let session = Arc::new(SessionHandle::new(
                id.to_string(),
                source,
                detector_config.kind_name(),
                smoother,
            ));
            sessions.insert(id.to_string(), Arc::clone(&session));
            session
        };

        info!("session {} created ({})", id, detector_config.kind_name());
        let shared = Arc::clone(&self.shared);
        thread::spawn(move || warm_up(shared, session, detector_config));
        Ok(())
    }

    /// フレームを投入する。非ブロッキング:
    /// - セッションが無ければ UnknownSession
    /// - Active以外の状態なら静かに破棄（Loading/Errorは一時状態）
    /// - 受理済み最大時刻より古ければ静かに破棄
    /// - 保留スロットにあった未処理フレームは置き換えられる
    pub fn submit_frame(
        &self,
        id: &str,
        frame: RawFrame,
        timestamp_ms: u64,
    ) -> Result<(), EngineError> {
        let session = self
            .session(id)
            .ok_or_else(|| EngineError::UnknownSession(id.to_string()))?;

        if !session.is_active() {
            debug!("session {}: dropping frame ({})", id, session.state().kind());
            return Ok(());
        }
        if !session.push_frame(frame, timestamp_ms) {
            debug!("session {}: dropping stale frame @{}", id, timestamp_ms);
            return Ok(());
        }
        if !session.in_flight.swap(true, Ordering::AcqRel) {
            let _ = self.shared.work_tx.send(Job::Drive(session));
        }
        Ok(())
    }

    /// 検出器をホットスワップする。新検出器のウォームアップ完了まで旧検出器が
    /// 使われ続け、スワップは処理中フレームの完了を待ってから行われる。
    /// 失敗時は旧検出器がそのまま残る。SmoothingStateは保持される。
    pub fn switch_detector(
        &self,
        id: &str,
        detector_config: DetectorConfig,
    ) -> Result<(), EngineError> {
        let session = self
            .session(id)
            .ok_or_else(|| EngineError::UnknownSession(id.to_string()))?;
        if !session.is_active() {
            return Err(EngineError::DetectorInitFailed(format!(
                "session {} is not active ({})",
                id,
                session.state().kind()
            )));
        }

        let shared = Arc::clone(&self.shared);
        thread::spawn(move || switch(shared, session, detector_config));
        Ok(())
    }

    /// セッションを破棄する。未知のIDはno-op。処理中のフレームは完了を待たず、
    /// ワーカー側が完了後に結果を破棄して検出器を停止する。
    pub fn close_session(&self, id: &str) {
        let Some(session) = self.shared.sessions.lock().unwrap().remove(id) else {
            debug!("close_session: {} not found (already closed?)", id);
            return;
        };
        session.closed.store(true, Ordering::Release);
        session.set_state(SessionState::Closed);
        session.clear_pending();
        session.smoother.lock().unwrap().reset();
        if !session.in_flight.load(Ordering::Acquire) {
            session.shutdown_detector();
        }
        info!("session {} closed", id);
    }

    /// 全セッションの統計。読み取り専用でパイプライン状態を変更しない。
    pub fn stats(&self) -> Vec<SessionStats> {
        let sessions = self.shared.sessions.lock().unwrap();
        let mut stats: Vec<SessionStats> = sessions.values().map(|s| s.stats()).collect();
        stats.sort_by(|a, b| a.id.cmp(&b.id));
        stats
    }

    pub fn session_stats(&self, id: &str) -> Option<SessionStats> {
        self.session(id).map(|s| s.stats())
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions.lock().unwrap().len()
    }

    fn session(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.shared.sessions.lock().unwrap().get(id).cloned()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        let ids: Vec<String> = {
            let sessions = self.shared.sessions.lock().unwrap();
            sessions.keys().cloned().collect()
        };
        for id in ids {
            self.close_session(&id);
        }
        for _ in &self.workers {
            let _ = self.shared.work_tx.send(Job::Shutdown);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// 検出器ウォームアップ（作成スレッド）
fn warm_up(shared: Arc<Shared>, session: Arc<SessionHandle>, config: DetectorConfig) {
    session.set_state(SessionState::Loading);
    let _ = shared.events_tx.send(EngineEvent::Loading {
        session_id: session.id.clone(),
        message: format!("loading {} detector...", config.kind_name()),
    });

    match (shared.factory)(&config) {
        Ok(detector) => {
            if session.is_closed() {
                let mut detector = detector;
                detector.shutdown();
                return;
            }
            *session.detector.lock().unwrap() = Some(detector);
            session.set_state(SessionState::Active);
            info!("session {} active", session.id);
            let _ = shared.events_tx.send(EngineEvent::Ready {
                session_id: session.id.clone(),
            });
        }
        Err(e) => {
            warn!("session {} detector init failed: {}", session.id, e);
            session.set_state(SessionState::Error(e.to_string()));
            let _ = shared.events_tx.send(EngineEvent::InitFailed {
                session_id: session.id.clone(),
                cause: e.to_string(),
            });
        }
    }
}

/// 検出器ホットスワップ（切替スレッド）
fn switch(shared: Arc<Shared>, session: Arc<SessionHandle>, config: DetectorConfig) {
    let _ = shared.events_tx.send(EngineEvent::Switching {
        session_id: session.id.clone(),
        message: format!("switching to {} detector...", config.kind_name()),
    });

    match (shared.factory)(&config) {
        Ok(new_detector) => {
            if session.is_closed() {
                let mut new_detector = new_detector;
                new_detector.shutdown();
                return;
            }
            // ロックは処理中フレームがあればその完了を待つ。
            // 旧検出器の停止はスワップ成立後。
            let old = session.detector.lock().unwrap().replace(new_detector);
            if let Some(mut old) = old {
                old.shutdown();
            }
            *session.detector_kind.lock().unwrap() = config.kind_name().to_string();
            info!("session {} switched to {}", session.id, config.kind_name());
            let _ = shared.events_tx.send(EngineEvent::Switched {
                session_id: session.id.clone(),
            });
        }
        Err(e) => {
            warn!("session {} switch failed (keeping previous): {}", session.id, e);
            let _ = shared.events_tx.send(EngineEvent::SwitchFailed {
                session_id: session.id.clone(),
                cause: e.to_string(),
            });
        }
    }
}

fn worker_loop(rx: Arc<Mutex<Receiver<Job>>>, shared: Arc<Shared>) {
    loop {
        let job = {
            let guard = rx.lock().unwrap();
            guard.recv()
        };
        match job {
            Ok(Job::Drive(session)) => drive(&shared, session),
            Ok(Job::Shutdown) | Err(_) => break,
        }
    }
}

/// 1ディスパッチにつき最大1フレームを処理する。保留が補充されていれば
/// キューの末尾へ再投入し、ワーカーがホットなセッションを独占しないよう
/// にする（公平なタイムシェア）。
fn drive(shared: &Shared, session: Arc<SessionHandle>) {
    match session.take_pending() {
        Some(queued) => {
            if !session.is_closed() && session.is_active() {
                process(shared, &session, queued.frame, queued.timestamp_ms);
            }
            if session.has_pending() {
                let _ = shared.work_tx.send(Job::Drive(session));
            } else {
                release(shared, session);
            }
        }
        None => release(shared, session),
    }
}

/// in_flightを解除する。解除とsubmitの競合でフレームが取り残されないよう、
/// 解除後に保留スロットを再確認して必要なら自分で再投入する。
fn release(shared: &Shared, session: Arc<SessionHandle>) {
    session.in_flight.store(false, Ordering::Release);
    if session.has_pending() && !session.in_flight.swap(true, Ordering::AcqRel) {
        let _ = shared.work_tx.send(Job::Drive(session));
        return;
    }
    if session.is_closed() {
        session.shutdown_detector();
    }
}

fn process(shared: &Shared, session: &Arc<SessionHandle>, frame: RawFrame, timestamp_ms: u64) {
    let started = Instant::now();
    let result = {
        let mut guard = session.detector.lock().unwrap();
        match guard.as_mut() {
            Some(detector) => detector.process_frame(&frame, timestamp_ms),
            // Activeだが検出器が無い状態は起こらない想定だが、静かに捨てる
            None => return,
        }
    };

    match result {
        Ok(pose) => {
            let output = {
                let mut smoother = session.smoother.lock().unwrap();
                shared.retargeter.retarget(&pose, &mut smoother)
            };
            session.metrics.lock().unwrap().record(started.elapsed());
            if !session.is_closed() {
                let _ = shared.events_tx.send(EngineEvent::Frame(FrameResult {
                    session_id: session.id.clone(),
                    bones: output.bones,
                    root_translation: output.root_translation,
                    timestamp_ms,
                }));
            }
        }
        Err(e) => {
            // 検出器クラッシュはこのセッションに封じ込める。
            // 他セッションとワーカープールには波及しない。
            warn!("session {} processing failed: {}", session.id, e);
            session.set_state(SessionState::Error(e.to_string()));
            session.clear_pending();
            let _ = shared.events_tx.send(EngineEvent::ProcessingFailed {
                session_id: session.id.clone(),
                cause: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::synthetic::standing_pose;
    use crate::pose::UnifiedPose;
    use crate::rig;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// テスト側がprocess_frameの開始と完了を制御できる検出器
    struct GatedDetector {
        started_tx: Sender<u64>,
        gate_rx: Receiver<()>,
    }

    impl Detector for GatedDetector {
        fn process_frame(
            &mut self,
            _frame: &RawFrame,
            timestamp_ms: u64,
        ) -> Result<UnifiedPose, DetectorError> {
            let _ = self.started_tx.send(timestamp_ms);
            let _ = self.gate_rx.recv();
            Ok(standing_pose(timestamp_ms))
        }
    }

    struct InstantDetector;

    impl Detector for InstantDetector {
        fn process_frame(
            &mut self,
            _frame: &RawFrame,
            timestamp_ms: u64,
        ) -> Result<UnifiedPose, DetectorError> {
            Ok(standing_pose(timestamp_ms))
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn process_frame(
            &mut self,
            _frame: &RawFrame,
            _timestamp_ms: u64,
        ) -> Result<UnifiedPose, DetectorError> {
            Err(DetectorError::Inference("synthetic failure".to_string()))
        }
    }

    /// 事前にキューした検出器を順に払い出すファクトリ
    fn queue_factory() -> (Sender<Box<dyn Detector>>, Box<DetectorFactory>) {
        let (tx, rx) = mpsc::channel::<Box<dyn Detector>>();
        let rx = Mutex::new(rx);
        let factory: Box<DetectorFactory> = Box::new(move |_cfg| {
            rx.lock()
                .unwrap()
                .try_recv()
                .map_err(|_| DetectorError::Init("no detector queued".to_string()))
        });
        (tx, factory)
    }

    fn test_config(max_sessions: usize) -> Config {
        let mut config = Config::default();
        config.engine.max_sessions = max_sessions;
        config.engine.worker_threads = 2;
        config
    }

    fn orchestrator_with(
        max_sessions: usize,
        factory: Box<DetectorFactory>,
    ) -> (Orchestrator, Receiver<EngineEvent>) {
        let (rig, mappings) = rig::default_humanoid();
        Orchestrator::with_factory(&test_config(max_sessions), rig, mappings, factory).unwrap()
    }

    fn wait_ready(events: &Receiver<EngineEvent>, id: &str) {
        loop {
            match events.recv_timeout(TIMEOUT).expect("event before timeout") {
                EngineEvent::Ready { session_id } if session_id == id => return,
                EngineEvent::InitFailed { session_id, cause } if session_id == id => {
                    panic!("init failed for {}: {}", session_id, cause)
                }
                _ => continue,
            }
        }
    }

    fn collect_frame_timestamps(events: &Receiver<EngineEvent>, count: usize) -> Vec<u64> {
        let mut timestamps = Vec::new();
        while timestamps.len() < count {
            match events.recv_timeout(TIMEOUT).expect("frame before timeout") {
                EngineEvent::Frame(result) => timestamps.push(result.timestamp_ms),
                _ => continue,
            }
        }
        timestamps
    }

    #[test]
    fn test_inflight_replacement_drops_middle_frame() {
        let (det_tx, factory) = queue_factory();
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        det_tx
            .send(Box::new(GatedDetector { started_tx, gate_rx }))
            .unwrap();

        let (orch, events) = orchestrator_with(10, factory);
        orch.create_session("s1", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap();
        wait_ready(&events, "s1");

        // A開始を待ってから、A処理中にBとCを投入する
        orch.submit_frame("s1", RawFrame::blank(2, 2), 100).unwrap();
        assert_eq!(started_rx.recv_timeout(TIMEOUT).unwrap(), 100);
        orch.submit_frame("s1", RawFrame::blank(2, 2), 110).unwrap();
        orch.submit_frame("s1", RawFrame::blank(2, 2), 120).unwrap();

        gate_tx.send(()).unwrap(); // Aを完了させる
        // Bは開始されずCに置き換えられている
        assert_eq!(started_rx.recv_timeout(TIMEOUT).unwrap(), 120);
        gate_tx.send(()).unwrap();

        assert_eq!(collect_frame_timestamps(&events, 2), vec![100, 120]);
        assert_eq!(orch.session_stats("s1").unwrap().dropped_frames, 1);
    }

    #[test]
    fn test_out_of_order_submission() {
        let (det_tx, factory) = queue_factory();
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        det_tx
            .send(Box::new(GatedDetector { started_tx, gate_rx }))
            .unwrap();

        let (orch, events) = orchestrator_with(10, factory);
        orch.create_session("s1", DetectorConfig::Synthetic, SourceKind::Video)
            .unwrap();
        wait_ready(&events, "s1");

        // [100, 80, 120]: 80は受理済み最大時刻100より古く破棄される
        orch.submit_frame("s1", RawFrame::blank(2, 2), 100).unwrap();
        assert_eq!(started_rx.recv_timeout(TIMEOUT).unwrap(), 100);
        orch.submit_frame("s1", RawFrame::blank(2, 2), 80).unwrap();
        orch.submit_frame("s1", RawFrame::blank(2, 2), 120).unwrap();
        gate_tx.send(()).unwrap();
        assert_eq!(started_rx.recv_timeout(TIMEOUT).unwrap(), 120);
        gate_tx.send(()).unwrap();

        // 観測される結果は時刻の単調非減少順
        assert_eq!(collect_frame_timestamps(&events, 2), vec![100, 120]);
    }

    #[test]
    fn test_duplicate_id_and_session_limit() {
        let (det_tx, factory) = queue_factory();
        det_tx.send(Box::new(InstantDetector)).unwrap();
        det_tx.send(Box::new(InstantDetector)).unwrap();

        let (orch, events) = orchestrator_with(2, factory);
        orch.create_session("a", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap();
        wait_ready(&events, "a");

        let err = orch
            .create_session("a", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSessionId(_)));

        orch.create_session("b", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap();
        wait_ready(&events, "b");

        let err = orch
            .create_session("c", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::SessionLimitExceeded { live: 2, max: 2 }
        ));

        // 既存セッションは無傷のまま
        let stats = orch.stats();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.state == "active"));
    }

    #[test]
    fn test_unknown_session_submit() {
        let (_det_tx, factory) = queue_factory();
        let (orch, _events) = orchestrator_with(10, factory);
        let err = orch
            .submit_frame("ghost", RawFrame::blank(2, 2), 0)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSession(_)));
    }

    #[test]
    fn test_close_unknown_is_noop_and_recreate_works() {
        let (det_tx, factory) = queue_factory();
        det_tx.send(Box::new(InstantDetector)).unwrap();
        det_tx.send(Box::new(InstantDetector)).unwrap();

        let (orch, events) = orchestrator_with(10, factory);
        // 未知IDのcloseはエラーでも状態変化でもない
        orch.close_session("ghost");
        assert_eq!(orch.session_count(), 0);

        orch.create_session("a", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap();
        wait_ready(&events, "a");
        orch.close_session("a");
        assert_eq!(orch.session_count(), 0);

        // 同じIDで即座に作り直せる
        orch.create_session("a", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap();
        wait_ready(&events, "a");
        assert_eq!(orch.session_count(), 1);
    }

    #[test]
    fn test_processing_failure_is_isolated() {
        let (det_tx, factory) = queue_factory();
        det_tx.send(Box::new(FailingDetector)).unwrap();
        det_tx.send(Box::new(InstantDetector)).unwrap();

        let (orch, events) = orchestrator_with(10, factory);
        orch.create_session("bad", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap();
        wait_ready(&events, "bad");
        orch.create_session("good", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap();
        wait_ready(&events, "good");

        orch.submit_frame("bad", RawFrame::blank(2, 2), 100).unwrap();
        loop {
            match events.recv_timeout(TIMEOUT).expect("event") {
                EngineEvent::ProcessingFailed { session_id, cause } => {
                    assert_eq!(session_id, "bad");
                    assert!(cause.contains("synthetic failure"));
                    break;
                }
                _ => continue,
            }
        }
        assert_eq!(orch.session_stats("bad").unwrap().state, "error");

        // Errorセッションへの投入は静かに破棄される
        orch.submit_frame("bad", RawFrame::blank(2, 2), 200).unwrap();

        // 他セッションは影響を受けず処理を続ける
        orch.submit_frame("good", RawFrame::blank(2, 2), 300).unwrap();
        assert_eq!(collect_frame_timestamps(&events, 1), vec![300]);
        assert_eq!(orch.session_stats("good").unwrap().state, "active");
    }

    #[test]
    fn test_init_failure_reported_and_recoverable() {
        let (_det_tx, factory) = queue_factory(); // 何もキューしない→initが失敗
        let (orch, events) = orchestrator_with(10, factory);
        orch.create_session("a", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap();

        loop {
            match events.recv_timeout(TIMEOUT).expect("event") {
                EngineEvent::InitFailed { session_id, .. } => {
                    assert_eq!(session_id, "a");
                    break;
                }
                _ => continue,
            }
        }
        assert_eq!(orch.session_stats("a").unwrap().state, "error");

        // Errorセッションへの投入はエラーではない（静かに破棄）
        orch.submit_frame("a", RawFrame::blank(2, 2), 0).unwrap();

        // close→再作成が回復経路
        orch.close_session("a");
        orch.create_session("a", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap();
    }

    #[test]
    fn test_switch_detector_success_and_failure() {
        let (det_tx, factory) = queue_factory();
        det_tx.send(Box::new(InstantDetector)).unwrap();
        det_tx.send(Box::new(InstantDetector)).unwrap();

        let (orch, events) = orchestrator_with(10, factory);
        orch.create_session("a", DetectorConfig::Synthetic, SourceKind::Live)
            .unwrap();
        wait_ready(&events, "a");

        // 成功: Switching → Switched
        orch.switch_detector("a", DetectorConfig::Synthetic).unwrap();
        loop {
            match events.recv_timeout(TIMEOUT).expect("event") {
                EngineEvent::Switched { session_id } => {
                    assert_eq!(session_id, "a");
                    break;
                }
                EngineEvent::SwitchFailed { cause, .. } => panic!("switch failed: {}", cause),
                _ => continue,
            }
        }

        // 失敗: ファクトリが払い出せない → SwitchFailed、セッションはActiveのまま
        orch.switch_detector("a", DetectorConfig::Synthetic).unwrap();
        loop {
            match events.recv_timeout(TIMEOUT).expect("event") {
                EngineEvent::SwitchFailed { session_id, .. } => {
                    assert_eq!(session_id, "a");
                    break;
                }
                EngineEvent::Switched { .. } => panic!("switch should have failed"),
                _ => continue,
            }
        }
        assert_eq!(orch.session_stats("a").unwrap().state, "active");

        // 旧検出器のままフレームが流れ続ける
        orch.submit_frame("a", RawFrame::blank(2, 2), 50).unwrap();
        assert_eq!(collect_frame_timestamps(&events, 1), vec![50]);

        // 未知IDのswitchは同期エラー
        let err = orch
            .switch_detector("ghost", DetectorConfig::Synthetic)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSession(_)));
    }

    #[test]
    fn test_concurrent_sessions_produce_results() {
        let (det_tx, factory) = queue_factory();
        for _ in 0..3 {
            det_tx.send(Box::new(InstantDetector)).unwrap();
        }

        let (orch, events) = orchestrator_with(10, factory);
        for id in ["a", "b", "c"] {
            orch.create_session(id, DetectorConfig::Synthetic, SourceKind::Live)
                .unwrap();
            wait_ready(&events, id);
        }
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            orch.submit_frame(id, RawFrame::blank(2, 2), 1000 + i as u64)
                .unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        while seen.len() < 3 {
            match events.recv_timeout(TIMEOUT).expect("frame") {
                EngineEvent::Frame(result) => {
                    assert!(!result.bones.is_empty());
                    seen.insert(result.session_id);
                }
                _ => continue,
            }
        }
    }
}
