//! 合成ポーズ検出器
//!
//! 画素を見ずにタイムスタンプから決定論的な直立ポーズを生成する。
//! 腕はタイムスタンプに応じて前後にスイングする（amplitude=0の場合は
//! 厳密なTポーズ）。テスト・ベンチ・パイプラインのデモ用。

use crate::error::DetectorError;
use crate::pose::{JointId, UnifiedJoint, UnifiedPose};

use super::{Detector, RawFrame};

/// 腕スイング周期
const SWING_PERIOD_MS: f32 = 2000.0;

pub struct SyntheticDetector {
    amplitude: f32,
}

impl SyntheticDetector {
    pub fn new() -> Self {
        Self { amplitude: 0.35 }
    }

    /// スイングなし（毎フレーム厳密に同じTポーズを返す）
    pub fn rest_only() -> Self {
        Self { amplitude: 0.0 }
    }
}

impl Default for SyntheticDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for SyntheticDetector {
    fn process_frame(
        &mut self,
        _frame: &RawFrame,
        timestamp_ms: u64,
    ) -> Result<UnifiedPose, DetectorError> {
        let phase = (timestamp_ms as f32 / SWING_PERIOD_MS) * std::f32::consts::TAU;
        Ok(standing_pose_with_swing(timestamp_ms, self.amplitude * phase.sin()))
    }
}

fn joint(world: [f32; 3]) -> UnifiedJoint {
    // 正規化画像座標はワールド座標の素朴な射影（テスト用途には十分）
    let position = [0.5 + world[0] * 0.3, 0.5 - (world[1] - 0.9) * 0.3, world[2] * 0.1];
    UnifiedJoint::new(position, world, 1.0, 1.0)
}

/// 直立Tポーズ（腕は水平、足は揃えて立つ）。ワールド座標はY上、Z前方。
pub fn standing_pose(timestamp_ms: u64) -> UnifiedPose {
    standing_pose_with_swing(timestamp_ms, 0.0)
}

/// Tポーズに腕スイング角（ラジアン、XZ平面内で前方へ）を加えたポーズ
pub fn standing_pose_with_swing(timestamp_ms: u64, swing: f32) -> UnifiedPose {
    let mut pose = UnifiedPose::empty(timestamp_ms);
    pose.root_position = [0.0, 0.9, 0.0];

    pose.set(JointId::HipCentre, joint([0.0, 0.9, 0.0]));
    pose.set(JointId::LeftHip, joint([0.1, 0.9, 0.0]));
    pose.set(JointId::RightHip, joint([-0.1, 0.9, 0.0]));
    pose.set(JointId::Neck, joint([0.0, 1.4, 0.0]));

    pose.set(JointId::LeftKnee, joint([0.1, 0.5, 0.0]));
    pose.set(JointId::RightKnee, joint([-0.1, 0.5, 0.0]));
    pose.set(JointId::LeftAnkle, joint([0.1, 0.1, 0.0]));
    pose.set(JointId::RightAnkle, joint([-0.1, 0.1, 0.0]));
    pose.set(JointId::LeftToe, joint([0.1, 0.1, 0.15]));
    pose.set(JointId::RightToe, joint([-0.1, 0.1, 0.15]));

    let (sin_a, cos_a) = swing.sin_cos();
    for side in [1.0f32, -1.0f32] {
        let shoulder = [0.2 * side, 1.4, 0.0];
        // 腕は肩からXZ平面内に伸びる。swing=0で真横（Tポーズ）。
        let dir = [cos_a * side, 0.0, sin_a];
        let elbow = [
            shoulder[0] + dir[0] * 0.25,
            shoulder[1],
            shoulder[2] + dir[2] * 0.25,
        ];
        let wrist = [
            shoulder[0] + dir[0] * 0.5,
            shoulder[1],
            shoulder[2] + dir[2] * 0.5,
        ];
        let index = [wrist[0] + dir[0] * 0.1, wrist[1], wrist[2] + dir[2] * 0.1];
        // 親指は手のひら平面内で前方へ（dirと直交するXZ内の前向き成分）
        let thumb = [
            wrist[0] + dir[0] * 0.05 - dir[2] * 0.05 * side,
            wrist[1],
            wrist[2] + dir[2] * 0.05 + dir[0] * 0.05 * side,
        ];
        let pinky = [index[0], index[1], index[2] - 0.05 * side];

        let (sh, el, wr, th, ix, pk) = if side > 0.0 {
            (
                JointId::LeftShoulder,
                JointId::LeftElbow,
                JointId::LeftWrist,
                JointId::LeftThumb,
                JointId::LeftIndex,
                JointId::LeftPinky,
            )
        } else {
            (
                JointId::RightShoulder,
                JointId::RightElbow,
                JointId::RightWrist,
                JointId::RightThumb,
                JointId::RightIndex,
                JointId::RightPinky,
            )
        };
        pose.set(sh, joint(shoulder));
        pose.set(el, joint(elbow));
        pose.set(wr, joint(wrist));
        pose.set(th, joint(thumb));
        pose.set(ix, joint(index));
        pose.set(pk, joint(pinky));
    }

    pose
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_joints_present() {
        let pose = standing_pose(0);
        assert_eq!(pose.joint_count(), JointId::COUNT);
        for id in JointId::ALL {
            let j = pose.get(id).unwrap();
            assert_eq!(j.visibility, 1.0);
            assert_eq!(j.presence, 1.0);
        }
    }

    #[test]
    fn test_hip_centre_is_midpoint() {
        let pose = standing_pose(0);
        let hip = pose.get(JointId::HipCentre).unwrap();
        let left = pose.get(JointId::LeftHip).unwrap();
        let right = pose.get(JointId::RightHip).unwrap();
        for axis in 0..3 {
            let mid = (left.world[axis] + right.world[axis]) / 2.0;
            assert!((hip.world[axis] - mid).abs() < 1e-6);
        }
    }

    #[test]
    fn test_deterministic() {
        let mut d1 = SyntheticDetector::new();
        let mut d2 = SyntheticDetector::new();
        let frame = RawFrame::blank(2, 2);
        let a = d1.process_frame(&frame, 500).unwrap();
        let b = d2.process_frame(&frame, 500).unwrap();
        for id in JointId::ALL {
            assert_eq!(a.get(id), b.get(id));
        }
    }

    #[test]
    fn test_swing_moves_wrist() {
        let mut detector = SyntheticDetector::new();
        let frame = RawFrame::blank(2, 2);
        // 周期の1/4時点でスイング角が最大になる
        let a = detector.process_frame(&frame, 0).unwrap();
        let b = detector.process_frame(&frame, 500).unwrap();
        let wa = a.get(JointId::LeftWrist).unwrap().world;
        let wb = b.get(JointId::LeftWrist).unwrap().world;
        assert!((wa[2] - wb[2]).abs() > 0.05, "wrist should swing forward");
    }

    #[test]
    fn test_rest_only_is_static() {
        let mut detector = SyntheticDetector::rest_only();
        let frame = RawFrame::blank(2, 2);
        let a = detector.process_frame(&frame, 0).unwrap();
        let b = detector.process_frame(&frame, 777).unwrap();
        for id in JointId::ALL {
            assert_eq!(a.get(id).unwrap().world, b.get(id).unwrap().world);
        }
    }
}
