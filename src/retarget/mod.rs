pub mod engine;
pub mod smooth;

pub use engine::{BonePose, RetargetOutput, Retargeter};
pub use smooth::PoseSmoother;
