//! ボーン単位の時間平滑化フィルタ
//!
//! 回転: 最短経路SLERP（固定ブレンド係数、指数平滑）
//! ルート平行移動: 成分ごとのEMA（同じ係数）
//!
//! 前回値が無いボーンはブレンドせずそのまま採用する。可視度ゲートで
//! 値が来なかったボーンは前回値を破棄し、復帰時にスナップする
//! （ギャップをまたいだ古いポーズ経由のスイングを防ぐ）。

use nalgebra::{UnitQuaternion, Vector3};

#[derive(Debug, Clone, Default)]
struct BoneState {
    prev: Option<UnitQuaternion<f32>>,
}

#[derive(Debug, Clone)]
pub struct PoseSmoother {
    factor: f32,
    bones: Vec<BoneState>,
    root: Option<Vector3<f32>>,
}

impl PoseSmoother {
    pub fn new(bone_count: usize, factor: f32) -> Self {
        Self {
            factor: factor.clamp(0.0, 1.0),
            bones: vec![BoneState::default(); bone_count],
            root: None,
        }
    }

    /// 全状態を未設定に戻す（ストリーム再初期化時）
    pub fn reset(&mut self) {
        for state in &mut self.bones {
            state.prev = None;
        }
        self.root = None;
    }

    /// 新しいローカル回転をブレンドして返す
    pub fn smooth_bone(&mut self, index: usize, rotation: UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let state = &mut self.bones[index];

        let prev = match state.prev {
            Some(prev) => prev,
            None => {
                state.prev = Some(rotation);
                return rotation;
            }
        };

        // shortest path: dot < 0 なら新しい側を反転
        let mut target = rotation;
        if prev.coords.dot(&target.coords) < 0.0 {
            target = UnitQuaternion::from_quaternion(-target.into_inner());
        }

        let blended = prev
            .try_slerp(&target, self.factor, 1e-6)
            .unwrap_or(target);
        state.prev = Some(blended);
        blended
    }

    /// このフレームでボーンがゲートされた。状態を破棄し、復帰時の値は
    /// ブレンドなしで採用される（ギャップをまたいだブレンドをしない）。
    pub fn mark_missing(&mut self, index: usize) {
        self.bones[index].prev = None;
    }

    /// ルート平行移動のEMA
    pub fn smooth_root(&mut self, position: [f32; 3]) -> [f32; 3] {
        let new = Vector3::new(position[0], position[1], position[2]);
        let smoothed = match self.root {
            Some(prev) => prev + (new - prev) * self.factor,
            None => new,
        };
        self.root = Some(smoothed);
        [smoothed.x, smoothed.y, smoothed.z]
    }
}
