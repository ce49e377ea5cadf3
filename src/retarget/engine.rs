//! キネマティックリターゲティングエンジン
//!
//! UnifiedPoseの3D関節座標からボーンローカル回転を復元する。
//! 処理は関節ごとに独立で、手順は常に:
//!   1. ボディ基準フレームでの向き復元（最短弧 or フレーム構成）
//!   2. 可視度・サポートランドマークのゲート
//!   3. 祖先T-pose回転による共役でターゲットのボーンローカル系へ
//!   4. 軸反転フラグ適用
//!   5. SLERP平滑化
//! ゲートされたボーンはそのフレームの出力から除外される。コンシューマは
//! 欠けたボーンをrestポーズへフォールバックさせる（劣化クォータニオンや
//! 古い値を受け取ることはない）。

use std::collections::HashMap;

use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};

use crate::config::RetargetConfig;
use crate::error::EngineError;
use crate::pose::{JointId, UnifiedPose};
use crate::rig::mapping::{AxisFlip, Reconstruction, RetargetMap};
use crate::rig::{MappingEntry, Rig};

use super::smooth::PoseSmoother;

const EPS: f32 = 1e-6;

/// 1ボーン分の出力。rotationは (x, y, z, w)。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonePose {
    pub rotation: [f32; 4],
    /// リグのスケールをそのまま通す（リターゲットはスケールを変えない）
    pub scale: [f32; 3],
}

/// 1フレーム分のリターゲット結果
#[derive(Debug, Clone)]
pub struct RetargetOutput {
    pub bones: HashMap<String, BonePose>,
    pub root_translation: [f32; 3],
    pub timestamp_ms: u64,
}

pub struct Retargeter {
    map: RetargetMap,
    visibility_threshold: f32,
}

impl Retargeter {
    pub fn new(
        rig: &Rig,
        entries: &[MappingEntry],
        config: &RetargetConfig,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            map: RetargetMap::derive(rig, entries)?,
            visibility_threshold: config.visibility_threshold,
        })
    }

    /// 平滑化バンクのサイズ（マッピングエントリ数）
    pub fn bone_count(&self) -> usize {
        self.map.len()
    }

    /// 1フレームをリターゲットする。smootherは呼び出し側（セッション）が
    /// 排他的に所有する前提で、このフレームの分だけ更新される。
    pub fn retarget(&self, pose: &UnifiedPose, smoother: &mut PoseSmoother) -> RetargetOutput {
        let mut pose = pose.clone();
        pose.derive_midpoints();

        let body = self.body_frame(&pose);

        let mut bones = HashMap::with_capacity(self.map.len());
        for (index, entry) in self.map.entries.iter().enumerate() {
            let observed = self.reconstruct(&pose, body.as_ref(), &entry.recon);
            let Some(observed) = observed else {
                smoother.mark_missing(index);
                continue;
            };

            // localRotation = A⁻¹ ∘ observed ∘ A ∘ restLocal
            let a = entry.ancestor;
            let local = a.inverse() * observed * a * entry.rest_local;
            let corrected = apply_flip(local, entry.flip);
            let smoothed = smoother.smooth_bone(index, corrected);

            bones.insert(
                entry.bone_name.clone(),
                BonePose {
                    rotation: quat_to_xyzw(smoothed),
                    scale: entry.scale,
                },
            );
        }

        // ルート平行移動は共役しない（回転フレーム不一致の問題は回転のみ）
        let root_translation = smoother.smooth_root(pose.root_position);

        RetargetOutput {
            bones,
            root_translation,
            timestamp_ms: pose.timestamp_ms,
        }
    }

    /// 可視度閾値を満たす関節のワールド座標
    fn joint_world(&self, pose: &UnifiedPose, joint: JointId) -> Option<Vector3<f32>> {
        let j = pose.get(joint)?;
        if !j.is_valid(self.visibility_threshold) {
            return None;
        }
        Some(Vector3::new(j.world[0], j.world[1], j.world[2]))
    }

    /// ボディ基準フレーム:
    /// X = hipCentre−rightHip（本人の左）, Y = neck−hipCentre（直交化）,
    /// Z = X×Y（前方）。軸が縮退した場合は標準軸へフォールバック。
    fn body_frame(&self, pose: &UnifiedPose) -> Option<UnitQuaternion<f32>> {
        let hip = self.joint_world(pose, JointId::HipCentre)?;
        let right_hip = self.joint_world(pose, JointId::RightHip)?;
        let neck = self.joint_world(pose, JointId::Neck)?;

        let u = (hip - right_hip)
            .try_normalize(EPS)
            .unwrap_or_else(Vector3::x);
        let v_raw = neck - hip;
        let v = (v_raw - u * v_raw.dot(&u))
            .try_normalize(EPS)
            .unwrap_or_else(Vector3::y);
        let w = u.cross(&v);

        let m = Matrix3::from_columns(&[u, v, w]);
        Some(UnitQuaternion::from_rotation_matrix(
            &Rotation3::from_matrix_unchecked(m),
        ))
    }

    fn reconstruct(
        &self,
        pose: &UnifiedPose,
        body: Option<&UnitQuaternion<f32>>,
        recon: &Reconstruction,
    ) -> Option<UnitQuaternion<f32>> {
        let body = body?;
        let inv_body = body.inverse();

        match recon {
            Reconstruction::Root => Some(*body),

            Reconstruction::Hinge { from, to, rest_dir } => {
                let from = self.joint_world(pose, *from)?;
                let to = self.joint_world(pose, *to)?;
                let dir = (inv_body * (to - from)).try_normalize(EPS)?;
                // 反平行（回転が一意に定まらない）場合もNone→ゲート
                UnitQuaternion::rotation_between(rest_dir, &dir)
            }

            Reconstruction::HandPlane {
                wrist,
                index,
                thumb,
                finger_rest,
                thumb_rest,
            } => {
                let wrist = self.joint_world(pose, *wrist)?;
                let index = self.joint_world(pose, *index)?;
                let thumb = self.joint_world(pose, *thumb)?;

                let finger = inv_body * (index - wrist);
                let aux = inv_body * (thumb - wrist);
                let observed = hand_frame(&finger, &aux)?;
                let rest = hand_frame(finger_rest, thumb_rest)?;
                Some(UnitQuaternion::from_rotation_matrix(
                    &Rotation3::from_matrix_unchecked(observed * rest.transpose()),
                ))
            }

            Reconstruction::FootFrame { knee, ankle, toe } => {
                let knee = self.joint_world(pose, *knee)?;
                let ankle = self.joint_world(pose, *ankle)?;
                let toe = self.joint_world(pose, *toe)?;

                let up = (inv_body * (knee - ankle)).try_normalize(EPS)?;
                // つま先は前方へ射影する（下方向成分は常在のため、残すと
                // 一定の偽底屈バイアスになる）
                let mut fwd = inv_body * (toe - ankle);
                fwd.y = 0.0;
                let fwd = (fwd - up * fwd.dot(&up)).try_normalize(EPS)?;
                let x = up.cross(&fwd);
                // restフレームは恒等（Y=すね上方向, Z=前方）
                let m = Matrix3::from_columns(&[x, up, fwd]);
                Some(UnitQuaternion::from_rotation_matrix(
                    &Rotation3::from_matrix_unchecked(m),
                ))
            }
        }
    }
}

/// 手のひら平面の正規直交フレーム。列 = [指方向, 面内直交, 手のひら法線]
fn hand_frame(finger: &Vector3<f32>, aux: &Vector3<f32>) -> Option<Matrix3<f32>> {
    let x = finger.try_normalize(EPS)?;
    let normal = x.cross(aux).try_normalize(EPS)?;
    let y = normal.cross(&x);
    Some(Matrix3::from_columns(&[x, y, normal]))
}

fn apply_flip(q: UnitQuaternion<f32>, flip: AxisFlip) -> UnitQuaternion<f32> {
    if !flip.any() {
        return q;
    }
    let c = q.coords;
    let x = if flip.x { -c.x } else { c.x };
    let y = if flip.y { -c.y } else { c.y };
    let z = if flip.z { -c.z } else { c.z };
    UnitQuaternion::from_quaternion(Quaternion::new(c.w, x, y, z))
}

fn quat_to_xyzw(q: UnitQuaternion<f32>) -> [f32; 4] {
    let c = q.coords;
    [c.x, c.y, c.z, c.w]
}
