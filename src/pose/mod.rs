pub mod joint;

pub use joint::{JointId, UnifiedJoint, UnifiedPose};
