//! ターゲットリグのボーン階層
//!
//! ボーンは整数IDのアリーナに格納し、親は常に子より前に並ぶよう
//! ロード時に検証する。T-pose累積ワールド回転もロード時に一度だけ
//! 前計算し、フレーム処理中の親ポインタ走査を排除する。

use std::collections::HashMap;

use nalgebra::UnitQuaternion;

use crate::error::EngineError;

/// ボーンのアリーナインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoneId(pub usize);

/// リグアセットから読み込まれた1ボーン分の定義。ロード後は不変。
#[derive(Debug, Clone)]
pub struct BoneDefinition {
    pub name: String,
    pub parent: Option<BoneId>,
    /// T-pose時のローカル回転
    pub rest_rotation: UnitQuaternion<f32>,
    pub scale: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct Rig {
    bones: Vec<BoneDefinition>,
    by_name: HashMap<String, BoneId>,
    /// ボーンごとの累積ワールドT-pose回転（root..=自分）
    world_rest: Vec<UnitQuaternion<f32>>,
    root: BoneId,
}

impl Rig {
    pub fn new(bones: Vec<BoneDefinition>) -> Result<Self, EngineError> {
        if bones.is_empty() {
            return Err(EngineError::InvalidRig("rig has no bones".to_string()));
        }

        let mut by_name = HashMap::new();
        let mut root = None;
        for (i, bone) in bones.iter().enumerate() {
            if by_name.insert(bone.name.clone(), BoneId(i)).is_some() {
                return Err(EngineError::InvalidRig(format!(
                    "duplicate bone name: {}",
                    bone.name
                )));
            }
            match bone.parent {
                None => {
                    if root.is_some() {
                        return Err(EngineError::InvalidRig(format!(
                            "multiple root bones (second: {})",
                            bone.name
                        )));
                    }
                    root = Some(BoneId(i));
                }
                Some(BoneId(p)) => {
                    // 親が先行していれば累積回転を1パスで計算できる
                    if p >= i {
                        return Err(EngineError::InvalidRig(format!(
                            "bone {} listed before its parent",
                            bone.name
                        )));
                    }
                }
            }
        }
        let root = root
            .ok_or_else(|| EngineError::InvalidRig("rig has no root bone".to_string()))?;

        let mut world_rest = Vec::with_capacity(bones.len());
        for (i, bone) in bones.iter().enumerate() {
            let world = match bone.parent {
                Some(BoneId(p)) => world_rest[p] * bone.rest_rotation,
                None => bone.rest_rotation,
            };
            world_rest.push(world);
            debug_assert_eq!(world_rest.len(), i + 1);
        }

        Ok(Self {
            bones,
            by_name,
            world_rest,
            root,
        })
    }

    pub fn bone(&self, id: BoneId) -> &BoneDefinition {
        &self.bones[id.0]
    }

    pub fn id(&self, name: &str) -> Option<BoneId> {
        self.by_name.get(name).copied()
    }

    pub fn root(&self) -> BoneId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// root..=id のT-poseローカル回転の積（root→親順）
    pub fn world_rest(&self, id: BoneId) -> UnitQuaternion<f32> {
        self.world_rest[id.0]
    }

    /// 祖先チェーンの累積T-pose回転（自分自身は含まない）
    pub fn ancestor_rest(&self, id: BoneId) -> UnitQuaternion<f32> {
        match self.bones[id.0].parent {
            Some(parent) => self.world_rest[parent.0],
            None => UnitQuaternion::identity(),
        }
    }
}
