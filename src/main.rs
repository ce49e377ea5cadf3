use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use anyhow::Result;
use rigstream::config::Config;
use rigstream::detector::{RawFrame, SourceKind};
use rigstream::rig;
use rigstream::stream::{EngineEvent, Orchestrator};

const CONFIG_PATH: &str = "rigstream.toml";
const SESSION_ID: &str = "demo";
const FRAME_INTERVAL_MS: u64 = 66; // ~15Hz
const RUN_FRAMES: u64 = 90;

fn main() -> Result<()> {
    env_logger::init();

    let config = Config::load_or_default(CONFIG_PATH);
    let (target_rig, mappings) = rig::load_or_default(&config.rig.path)?;
    let stale_ms = config.retarget.stale_result_ms;
    let detector_config = config.detector.clone();

    println!("=== rigstream demo (git {}) ===", env!("GIT_VERSION"));
    println!("rig: {} bones, {} mappings", target_rig.len(), mappings.len());
    println!("detector: {}", detector_config.kind_name());
    println!();

    let (orchestrator, events) = Orchestrator::new(&config, target_rig, mappings)?;
    orchestrator.create_session(SESSION_ID, detector_config, SourceKind::Live)?;

    // ウォームアップ完了待ち
    loop {
        match events.recv_timeout(Duration::from_secs(30))? {
            EngineEvent::Loading { message, .. } => println!("[loading] {}", message),
            EngineEvent::Ready { .. } => {
                println!("[ready]");
                break;
            }
            EngineEvent::InitFailed { cause, .. } => {
                anyhow::bail!("detector init failed: {}", cause);
            }
            _ => {}
        }
    }

    let started = Instant::now();
    let mut printed = 0u32;
    for i in 0..RUN_FRAMES {
        let timestamp_ms = i * FRAME_INTERVAL_MS;
        orchestrator.submit_frame(SESSION_ID, RawFrame::blank(640, 480), timestamp_ms)?;

        // 次フレームまでの間、結果を排出する
        let deadline = Instant::now() + Duration::from_millis(FRAME_INTERVAL_MS);
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            let event = match events.recv_timeout(remaining) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => anyhow::bail!("event channel closed"),
            };
            match event {
                EngineEvent::Frame(result) => {
                    // コンシューマ側のスタレネス破棄
                    let age_ms =
                        (started.elapsed().as_millis() as u64).saturating_sub(result.timestamp_ms);
                    if age_ms > stale_ms {
                        continue;
                    }
                    if printed % 15 == 0 {
                        let root = result.root_translation;
                        println!(
                            "t={:5}ms bones={:2} root=[{:+.2} {:+.2} {:+.2}]",
                            result.timestamp_ms,
                            result.bones.len(),
                            root[0],
                            root[1],
                            root[2],
                        );
                    }
                    printed += 1;
                }
                EngineEvent::ProcessingFailed { cause, .. } => {
                    eprintln!("[error] {}", cause);
                }
                _ => {}
            }
        }
    }

    println!();
    for stats in orchestrator.stats() {
        println!(
            "session {}: state={} fps={:.1} latency={:.2}ms dropped={}",
            stats.id, stats.state, stats.fps, stats.avg_latency_ms, stats.dropped_frames,
        );
    }

    orchestrator.close_session(SESSION_ID);
    Ok(())
}
