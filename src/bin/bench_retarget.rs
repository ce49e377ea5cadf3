use std::time::Instant;

use anyhow::Result;
use rigstream::config::RetargetConfig;
use rigstream::detector::synthetic::standing_pose_with_swing;
use rigstream::retarget::{PoseSmoother, Retargeter};
use rigstream::rig;

fn main() -> Result<()> {
    let (target_rig, mappings) = rig::default_humanoid();
    let config = RetargetConfig::default();
    let retargeter = Retargeter::new(&target_rig, &mappings, &config)?;
    let mut smoother = PoseSmoother::new(retargeter.bone_count(), config.smoothing_factor);

    // リターゲティングのみを計測（検出器は含まない）
    let iterations = 10_000u64;
    let start = Instant::now();
    for i in 0..iterations {
        let pose = standing_pose_with_swing(i * 33, (i as f32 * 0.01).sin() * 0.4);
        let output = retargeter.retarget(&pose, &mut smoother);
        assert!(!output.bones.is_empty());
    }
    let elapsed = start.elapsed();

    let avg_us = elapsed.as_micros() as f64 / iterations as f64;
    println!(
        "Retarget: {:.2}us/frame = {:.0}k poses/sec",
        avg_us,
        1000.0 / avg_us
    );

    Ok(())
}
