//! Target rig: bone hierarchy asset, loaded once at startup and immutable
//! for the process lifetime.

pub mod bone;
pub mod mapping;

use std::fs;
use std::path::Path;

use nalgebra::{Quaternion, UnitQuaternion};
use serde::Deserialize;

use crate::error::EngineError;

pub use bone::{BoneDefinition, BoneId, Rig};
pub use mapping::{AxisFlip, ConjugationSpec, MappingEntry, RetargetMap};

/// リグアセット(JSON)のトップレベル構造
#[derive(Debug, Clone, Deserialize)]
pub struct RigFile {
    pub bones: Vec<BoneData>,
    pub mappings: Vec<MappingEntry>,
}

/// アセット内の1ボーン。親は名前参照（定義済みの名前のみ）。
#[derive(Debug, Clone, Deserialize)]
pub struct BoneData {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// T-poseローカル回転 (x, y, z, w)
    #[serde(default = "default_rest_rotation")]
    pub rest_rotation: [f32; 4],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
}

fn default_rest_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn quat_from_xyzw(q: [f32; 4]) -> Result<UnitQuaternion<f32>, EngineError> {
    let raw = Quaternion::new(q[3], q[0], q[1], q[2]);
    if raw.norm() < 1e-6 {
        return Err(EngineError::InvalidRig(format!(
            "degenerate rest rotation: {:?}",
            q
        )));
    }
    Ok(UnitQuaternion::from_quaternion(raw))
}

/// JSON文字列からリグとマッピングを構築
pub fn load_from_str(json: &str) -> Result<(Rig, Vec<MappingEntry>), EngineError> {
    let file: RigFile =
        serde_json::from_str(json).map_err(|e| EngineError::InvalidRig(e.to_string()))?;

    let mut bones = Vec::with_capacity(file.bones.len());
    let mut rig_so_far: Vec<(String, usize)> = Vec::new();
    for data in &file.bones {
        let parent = match &data.parent {
            Some(name) => {
                let idx = rig_so_far
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, i)| *i)
                    .ok_or_else(|| {
                        EngineError::InvalidRig(format!(
                            "bone {} references undefined parent {}",
                            data.name, name
                        ))
                    })?;
                Some(BoneId(idx))
            }
            None => None,
        };
        rig_so_far.push((data.name.clone(), bones.len()));
        bones.push(BoneDefinition {
            name: data.name.clone(),
            parent,
            rest_rotation: quat_from_xyzw(data.rest_rotation)?,
            scale: data.scale,
        });
    }

    let rig = Rig::new(bones)?;
    Ok((rig, file.mappings))
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<(Rig, Vec<MappingEntry>), EngineError> {
    let content = fs::read_to_string(path)?;
    load_from_str(&content)
}

/// 組み込みのVRM風ヒューマノイドリグ。
/// T-poseローカル回転は恒等（正規化済みVRMの慣例）。
/// 脚・手は祖先チェーン共役 + 脚はZ反転、腕は肩ボーン経由の共役、
/// 体幹は共役なし。この割り当てはこのリグ固有の経験則であり、
/// 別のリグでは再導出が必要（アセット側のデータとして扱う）。
pub fn default_humanoid() -> (Rig, Vec<MappingEntry>) {
    let identity = default_rest_rotation();
    let bone = |name: &str, parent: Option<&str>| BoneData {
        name: name.to_string(),
        parent: parent.map(|p| p.to_string()),
        rest_rotation: identity,
        scale: default_scale(),
    };

    let bones = vec![
        bone("J_Bip_C_Hips", None),
        bone("J_Bip_C_Spine", Some("J_Bip_C_Hips")),
        bone("J_Bip_C_Chest", Some("J_Bip_C_Spine")),
        bone("J_Bip_C_Neck", Some("J_Bip_C_Chest")),
        bone("J_Bip_L_Shoulder", Some("J_Bip_C_Chest")),
        bone("J_Bip_L_UpperArm", Some("J_Bip_L_Shoulder")),
        bone("J_Bip_L_LowerArm", Some("J_Bip_L_UpperArm")),
        bone("J_Bip_L_Hand", Some("J_Bip_L_LowerArm")),
        bone("J_Bip_R_Shoulder", Some("J_Bip_C_Chest")),
        bone("J_Bip_R_UpperArm", Some("J_Bip_R_Shoulder")),
        bone("J_Bip_R_LowerArm", Some("J_Bip_R_UpperArm")),
        bone("J_Bip_R_Hand", Some("J_Bip_R_LowerArm")),
        bone("J_Bip_L_UpperLeg", Some("J_Bip_C_Hips")),
        bone("J_Bip_L_LowerLeg", Some("J_Bip_L_UpperLeg")),
        bone("J_Bip_L_Foot", Some("J_Bip_L_LowerLeg")),
        bone("J_Bip_L_ToeBase", Some("J_Bip_L_Foot")),
        bone("J_Bip_R_UpperLeg", Some("J_Bip_C_Hips")),
        bone("J_Bip_R_LowerLeg", Some("J_Bip_R_UpperLeg")),
        bone("J_Bip_R_Foot", Some("J_Bip_R_LowerLeg")),
        bone("J_Bip_R_ToeBase", Some("J_Bip_R_Foot")),
    ];

    let entry = |joint: &str, bone: &str, conjugation: ConjugationSpec, flip_z: bool| MappingEntry {
        joint: joint.to_string(),
        bone: bone.to_string(),
        conjugation,
        flip: AxisFlip {
            x: false,
            y: false,
            z: flip_z,
        },
    };

    let mappings = vec![
        entry("hipCentre", "J_Bip_C_Hips", ConjugationSpec::None, false),
        entry("neck", "J_Bip_C_Spine", ConjugationSpec::None, false),
        entry(
            "leftShoulder",
            "J_Bip_L_UpperArm",
            ConjugationSpec::Via("J_Bip_L_Shoulder".to_string()),
            false,
        ),
        entry(
            "leftElbow",
            "J_Bip_L_LowerArm",
            ConjugationSpec::Via("J_Bip_L_Shoulder".to_string()),
            false,
        ),
        entry("leftWrist", "J_Bip_L_Hand", ConjugationSpec::Ancestors, false),
        entry(
            "rightShoulder",
            "J_Bip_R_UpperArm",
            ConjugationSpec::Via("J_Bip_R_Shoulder".to_string()),
            false,
        ),
        entry(
            "rightElbow",
            "J_Bip_R_LowerArm",
            ConjugationSpec::Via("J_Bip_R_Shoulder".to_string()),
            false,
        ),
        entry("rightWrist", "J_Bip_R_Hand", ConjugationSpec::Ancestors, false),
        entry("leftHip", "J_Bip_L_UpperLeg", ConjugationSpec::Ancestors, true),
        entry("leftKnee", "J_Bip_L_LowerLeg", ConjugationSpec::Ancestors, true),
        entry("leftAnkle", "J_Bip_L_Foot", ConjugationSpec::Ancestors, true),
        entry("rightHip", "J_Bip_R_UpperLeg", ConjugationSpec::Ancestors, true),
        entry("rightKnee", "J_Bip_R_LowerLeg", ConjugationSpec::Ancestors, true),
        entry("rightAnkle", "J_Bip_R_Foot", ConjugationSpec::Ancestors, true),
    ];

    let rig = Rig::new(
        bones
            .iter()
            .map(|b| BoneDefinition {
                name: b.name.clone(),
                parent: b.parent.as_ref().map(|p| {
                    BoneId(bones.iter().position(|x| &x.name == p).expect("parent exists"))
                }),
                rest_rotation: UnitQuaternion::identity(),
                scale: b.scale,
            })
            .collect(),
    )
    .expect("built-in rig is valid");

    (rig, mappings)
}

/// 設定のパスが空なら組み込みリグ、指定があればファイルから
pub fn load_or_default(path: &str) -> Result<(Rig, Vec<MappingEntry>), EngineError> {
    if path.is_empty() {
        Ok(default_humanoid())
    } else {
        load(path)
    }
}
