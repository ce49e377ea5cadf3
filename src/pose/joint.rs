//! Unified Skeleton: 検出器に依存しない正規化された関節語彙
//!
//! 全ての検出器バックエンドはこの22関節セットに変換して出力する。
//! 下流（リターゲティングエンジン）は検出器の種類を一切知らない。

/// 正規化された関節インデックス（22関節）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum JointId {
    HipCentre = 0,
    Neck = 1,
    LeftShoulder = 2,
    RightShoulder = 3,
    LeftElbow = 4,
    RightElbow = 5,
    LeftWrist = 6,
    RightWrist = 7,
    LeftThumb = 8,
    RightThumb = 9,
    LeftIndex = 10,
    RightIndex = 11,
    LeftPinky = 12,
    RightPinky = 13,
    LeftHip = 14,
    RightHip = 15,
    LeftKnee = 16,
    RightKnee = 17,
    LeftAnkle = 18,
    RightAnkle = 19,
    LeftToe = 20,
    RightToe = 21,
}

impl JointId {
    pub const COUNT: usize = 22;

    pub const ALL: [JointId; JointId::COUNT] = [
        JointId::HipCentre,
        JointId::Neck,
        JointId::LeftShoulder,
        JointId::RightShoulder,
        JointId::LeftElbow,
        JointId::RightElbow,
        JointId::LeftWrist,
        JointId::RightWrist,
        JointId::LeftThumb,
        JointId::RightThumb,
        JointId::LeftIndex,
        JointId::RightIndex,
        JointId::LeftPinky,
        JointId::RightPinky,
        JointId::LeftHip,
        JointId::RightHip,
        JointId::LeftKnee,
        JointId::RightKnee,
        JointId::LeftAnkle,
        JointId::RightAnkle,
        JointId::LeftToe,
        JointId::RightToe,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        JointId::ALL.get(index).copied()
    }

    /// リグアセット内で使う関節名（camelCase）
    pub fn name(&self) -> &'static str {
        match self {
            JointId::HipCentre => "hipCentre",
            JointId::Neck => "neck",
            JointId::LeftShoulder => "leftShoulder",
            JointId::RightShoulder => "rightShoulder",
            JointId::LeftElbow => "leftElbow",
            JointId::RightElbow => "rightElbow",
            JointId::LeftWrist => "leftWrist",
            JointId::RightWrist => "rightWrist",
            JointId::LeftThumb => "leftThumb",
            JointId::RightThumb => "rightThumb",
            JointId::LeftIndex => "leftIndex",
            JointId::RightIndex => "rightIndex",
            JointId::LeftPinky => "leftPinky",
            JointId::RightPinky => "rightPinky",
            JointId::LeftHip => "leftHip",
            JointId::RightHip => "rightHip",
            JointId::LeftKnee => "leftKnee",
            JointId::RightKnee => "rightKnee",
            JointId::LeftAnkle => "leftAnkle",
            JointId::RightAnkle => "rightAnkle",
            JointId::LeftToe => "leftToe",
            JointId::RightToe => "rightToe",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        JointId::ALL.iter().copied().find(|j| j.name() == name)
    }
}

/// 単一の関節観測値。検出器がフレームごとに生成し、生成後は不変。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnifiedJoint {
    /// 正規化画像座標 (0.0〜1.0, zは検出器依存の相対深度)
    pub position: [f32; 3],
    /// メートル単位のワールド座標 (X=本人の左, Y=上, Z=前方)
    pub world: [f32; 3],
    /// フレーム内に写っている信頼度 (0.0〜1.0)
    pub visibility: f32,
    /// 関節が存在する信頼度 (0.0〜1.0)
    pub presence: f32,
}

impl UnifiedJoint {
    pub fn new(position: [f32; 3], world: [f32; 3], visibility: f32, presence: f32) -> Self {
        Self {
            position,
            world,
            visibility,
            presence,
        }
    }

    /// 可視度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }
}

/// 1フレーム分の姿勢。各関節は検出できなかった場合 None。
#[derive(Debug, Clone)]
pub struct UnifiedPose {
    pub joints: [Option<UnifiedJoint>; JointId::COUNT],
    /// 骨盤中心のワールド座標
    pub root_position: [f32; 3],
    /// キャプチャ時刻
    pub timestamp_ms: u64,
}

impl UnifiedPose {
    pub fn empty(timestamp_ms: u64) -> Self {
        Self {
            joints: [None; JointId::COUNT],
            root_position: [0.0; 3],
            timestamp_ms,
        }
    }

    pub fn get(&self, id: JointId) -> Option<&UnifiedJoint> {
        self.joints[id as usize].as_ref()
    }

    pub fn set(&mut self, id: JointId, joint: UnifiedJoint) {
        self.joints[id as usize] = Some(joint);
    }

    /// 検出済み関節の数
    pub fn joint_count(&self) -> usize {
        self.joints.iter().filter(|j| j.is_some()).count()
    }

    /// hipCentre / neck が無い場合、左右の腰・肩の中点から導出する
    /// 可視度は左右の低い方を採用（片側が怪しければ中点も怪しい）
    pub fn derive_midpoints(&mut self) {
        if self.get(JointId::HipCentre).is_none() {
            if let Some(mid) = Self::midpoint(self.get(JointId::LeftHip), self.get(JointId::RightHip)) {
                self.set(JointId::HipCentre, mid);
            }
        }
        if self.get(JointId::Neck).is_none() {
            if let Some(mid) = Self::midpoint(
                self.get(JointId::LeftShoulder),
                self.get(JointId::RightShoulder),
            ) {
                self.set(JointId::Neck, mid);
            }
        }
    }

    fn midpoint(a: Option<&UnifiedJoint>, b: Option<&UnifiedJoint>) -> Option<UnifiedJoint> {
        let (a, b) = (a?, b?);
        Some(UnifiedJoint::new(
            [
                (a.position[0] + b.position[0]) / 2.0,
                (a.position[1] + b.position[1]) / 2.0,
                (a.position[2] + b.position[2]) / 2.0,
            ],
            [
                (a.world[0] + b.world[0]) / 2.0,
                (a.world[1] + b.world[1]) / 2.0,
                (a.world[2] + b.world[2]) / 2.0,
            ],
            a.visibility.min(b.visibility),
            a.presence.min(b.presence),
        ))
    }
}
