//! Retarget mapping: which unified joint drives which target bone, and how
//! the observed rotation is carried into that bone's local frame.
//!
//! The conjugation strategy and axis-correction flags are rig asset data,
//! not algorithm: they encode rig-specific axis conventions and are derived
//! once into quaternions here. The reconstruction recipe per joint is fixed
//! by anatomy (which landmarks exist around it) and lives in this module's
//! table.

use nalgebra::{UnitQuaternion, Vector3};
use serde::Deserialize;

use crate::error::EngineError;
use crate::pose::JointId;

use super::bone::{BoneId, Rig};

/// 共役の基準フレームの選択（リグアセット側で指定する）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConjugationSpec {
    /// 共役なし（体幹など、ボディ基準フレームのまま適用できるボーン）
    #[default]
    None,
    /// マップ先ボーンの祖先チェーン全体の累積T-pose回転
    Ancestors,
    /// 指定ボーンの累積T-poseワールド回転（肩のような中間ボーン用）
    Via(String),
}

/// ローカル回転の軸反転フラグ
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AxisFlip {
    #[serde(default)]
    pub x: bool,
    #[serde(default)]
    pub y: bool,
    #[serde(default)]
    pub z: bool,
}

impl AxisFlip {
    pub fn any(&self) -> bool {
        self.x || self.y || self.z
    }
}

/// リグアセット内の1マッピング
#[derive(Debug, Clone, Deserialize)]
pub struct MappingEntry {
    pub joint: String,
    pub bone: String,
    #[serde(default)]
    pub conjugation: ConjugationSpec,
    #[serde(default)]
    pub flip: AxisFlip,
}

/// 関節ごとの向き復元レシピ
#[derive(Debug, Clone)]
pub enum Reconstruction {
    /// ボディ基準フレームそのもの（腰ボーン）
    Root,
    /// 2点間の最短弧回転（ヒンジ的関節）
    Hinge {
        from: JointId,
        to: JointId,
        rest_dir: Vector3<f32>,
    },
    /// 手のひら平面から3自由度を構成
    HandPlane {
        wrist: JointId,
        index: JointId,
        thumb: JointId,
        finger_rest: Vector3<f32>,
        thumb_rest: Vector3<f32>,
    },
    /// 足フレーム: つま先オフセットを前方へ射影 + すね方向を上軸に
    FootFrame {
        knee: JointId,
        ankle: JointId,
        toe: JointId,
    },
}

/// どの関節がどのレシピで向きを復元するか。
/// rest方向はTポーズのボディ基準フレーム（X=本人の左, Y=上, Z=前方）。
fn reconstruction_for(joint: JointId) -> Option<Reconstruction> {
    use JointId::*;
    let recon = match joint {
        HipCentre => Reconstruction::Root,
        Neck => Reconstruction::Hinge {
            from: HipCentre,
            to: Neck,
            rest_dir: Vector3::new(0.0, 1.0, 0.0),
        },
        LeftShoulder => Reconstruction::Hinge {
            from: LeftShoulder,
            to: LeftElbow,
            rest_dir: Vector3::new(1.0, 0.0, 0.0),
        },
        LeftElbow => Reconstruction::Hinge {
            from: LeftElbow,
            to: LeftWrist,
            rest_dir: Vector3::new(1.0, 0.0, 0.0),
        },
        RightShoulder => Reconstruction::Hinge {
            from: RightShoulder,
            to: RightElbow,
            rest_dir: Vector3::new(-1.0, 0.0, 0.0),
        },
        RightElbow => Reconstruction::Hinge {
            from: RightElbow,
            to: RightWrist,
            rest_dir: Vector3::new(-1.0, 0.0, 0.0),
        },
        LeftHip => Reconstruction::Hinge {
            from: LeftHip,
            to: LeftKnee,
            rest_dir: Vector3::new(0.0, -1.0, 0.0),
        },
        LeftKnee => Reconstruction::Hinge {
            from: LeftKnee,
            to: LeftAnkle,
            rest_dir: Vector3::new(0.0, -1.0, 0.0),
        },
        RightHip => Reconstruction::Hinge {
            from: RightHip,
            to: RightKnee,
            rest_dir: Vector3::new(0.0, -1.0, 0.0),
        },
        RightKnee => Reconstruction::Hinge {
            from: RightKnee,
            to: RightAnkle,
            rest_dir: Vector3::new(0.0, -1.0, 0.0),
        },
        LeftWrist => Reconstruction::HandPlane {
            wrist: LeftWrist,
            index: LeftIndex,
            thumb: LeftThumb,
            finger_rest: Vector3::new(1.0, 0.0, 0.0),
            thumb_rest: Vector3::new(0.0, 0.0, 1.0),
        },
        RightWrist => Reconstruction::HandPlane {
            wrist: RightWrist,
            index: RightIndex,
            thumb: RightThumb,
            finger_rest: Vector3::new(-1.0, 0.0, 0.0),
            thumb_rest: Vector3::new(0.0, 0.0, 1.0),
        },
        LeftAnkle => Reconstruction::FootFrame {
            knee: LeftKnee,
            ankle: LeftAnkle,
            toe: LeftToe,
        },
        RightAnkle => Reconstruction::FootFrame {
            knee: RightKnee,
            ankle: RightAnkle,
            toe: RightToe,
        },
        // 指先・つま先・左右腰は他の関節のサポートランドマーク専用
        _ => return None,
    };
    Some(recon)
}

/// 導出済みマッピング: 共役フレームを解決し毎フレームの祖先走査を不要にする
#[derive(Debug, Clone)]
pub struct DerivedMapping {
    pub joint: JointId,
    pub bone: BoneId,
    pub bone_name: String,
    pub rest_local: UnitQuaternion<f32>,
    /// 共役に使う累積T-pose回転（Noneの場合は恒等）
    pub ancestor: UnitQuaternion<f32>,
    pub flip: AxisFlip,
    pub recon: Reconstruction,
    pub scale: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct RetargetMap {
    pub entries: Vec<DerivedMapping>,
}

impl RetargetMap {
    pub fn derive(rig: &Rig, entries: &[MappingEntry]) -> Result<Self, EngineError> {
        let mut derived = Vec::with_capacity(entries.len());
        for entry in entries {
            let joint = JointId::parse(&entry.joint).ok_or_else(|| {
                EngineError::InvalidRig(format!("unknown joint in mapping: {}", entry.joint))
            })?;
            let recon = reconstruction_for(joint).ok_or_else(|| {
                EngineError::InvalidRig(format!(
                    "joint {} is a support landmark and cannot drive a bone",
                    entry.joint
                ))
            })?;
            let bone = rig.id(&entry.bone).ok_or_else(|| {
                EngineError::InvalidRig(format!("unknown bone in mapping: {}", entry.bone))
            })?;

            let ancestor = match &entry.conjugation {
                ConjugationSpec::None => UnitQuaternion::identity(),
                ConjugationSpec::Ancestors => rig.ancestor_rest(bone),
                ConjugationSpec::Via(name) => {
                    let via = rig.id(name).ok_or_else(|| {
                        EngineError::InvalidRig(format!(
                            "unknown conjugation bone: {}",
                            name
                        ))
                    })?;
                    rig.world_rest(via)
                }
            };

            let definition = rig.bone(bone);
            derived.push(DerivedMapping {
                joint,
                bone,
                bone_name: definition.name.clone(),
                rest_local: definition.rest_rotation,
                ancestor,
                flip: entry.flip,
                recon,
                scale: definition.scale,
            });
        }
        Ok(Self { entries: derived })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::bone::BoneDefinition;
    use std::f32::consts::FRAC_PI_2;

    fn two_bone_rig(root_rest: UnitQuaternion<f32>) -> Rig {
        Rig::new(vec![
            BoneDefinition {
                name: "hips".to_string(),
                parent: None,
                rest_rotation: root_rest,
                scale: [1.0, 1.0, 1.0],
            },
            BoneDefinition {
                name: "thigh".to_string(),
                parent: Some(BoneId(0)),
                rest_rotation: UnitQuaternion::identity(),
                scale: [1.0, 1.0, 1.0],
            },
        ])
        .unwrap()
    }

    fn entry(joint: &str, bone: &str, conjugation: ConjugationSpec) -> MappingEntry {
        MappingEntry {
            joint: joint.to_string(),
            bone: bone.to_string(),
            conjugation,
            flip: AxisFlip::default(),
        }
    }

    #[test]
    fn test_derive_ancestors() {
        let ry90 = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);
        let rig = two_bone_rig(ry90);
        let map = RetargetMap::derive(
            &rig,
            &[entry("leftHip", "thigh", ConjugationSpec::Ancestors)],
        )
        .unwrap();
        assert_eq!(map.len(), 1);
        // thighの祖先 = hipsのrest回転
        assert!(map.entries[0].ancestor.angle_to(&ry90) < 1e-5);
    }

    #[test]
    fn test_derive_none_is_identity() {
        let ry90 = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);
        let rig = two_bone_rig(ry90);
        let map = RetargetMap::derive(
            &rig,
            &[entry("leftHip", "thigh", ConjugationSpec::None)],
        )
        .unwrap();
        assert!(map.entries[0]
            .ancestor
            .angle_to(&UnitQuaternion::identity())
            < 1e-7);
    }

    #[test]
    fn test_derive_via_includes_named_bone() {
        let ry90 = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);
        let rig = Rig::new(vec![
            BoneDefinition {
                name: "chest".to_string(),
                parent: None,
                rest_rotation: ry90,
                scale: [1.0, 1.0, 1.0],
            },
            BoneDefinition {
                name: "shoulder".to_string(),
                parent: Some(BoneId(0)),
                rest_rotation: ry90,
                scale: [1.0, 1.0, 1.0],
            },
            BoneDefinition {
                name: "upper_arm".to_string(),
                parent: Some(BoneId(1)),
                rest_rotation: UnitQuaternion::identity(),
                scale: [1.0, 1.0, 1.0],
            },
        ])
        .unwrap();
        let map = RetargetMap::derive(
            &rig,
            &[entry(
                "leftShoulder",
                "upper_arm",
                ConjugationSpec::Via("shoulder".to_string()),
            )],
        )
        .unwrap();
        // via: chest * shoulder = 180°
        let expected = ry90 * ry90;
        assert!(map.entries[0].ancestor.angle_to(&expected) < 1e-5);
    }

    #[test]
    fn test_derive_rejects_unknown_names() {
        let rig = two_bone_rig(UnitQuaternion::identity());
        assert!(RetargetMap::derive(
            &rig,
            &[entry("leftElbow2", "thigh", ConjugationSpec::None)]
        )
        .is_err());
        assert!(RetargetMap::derive(
            &rig,
            &[entry("leftHip", "shin", ConjugationSpec::None)]
        )
        .is_err());
        assert!(RetargetMap::derive(
            &rig,
            &[entry(
                "leftHip",
                "thigh",
                ConjugationSpec::Via("missing".to_string())
            )]
        )
        .is_err());
    }

    #[test]
    fn test_support_joints_cannot_drive() {
        let rig = two_bone_rig(UnitQuaternion::identity());
        let err = RetargetMap::derive(
            &rig,
            &[entry("leftThumb", "thigh", ConjugationSpec::None)],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRig(_)));
    }
}
