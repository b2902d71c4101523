/// Clustering inference, segment tiering and offline training

pub mod clustering;
pub mod segmentation;
pub mod training;

pub use clustering::CentroidModel;
pub use segmentation::{Condition, GroupProfile, SegmentStrategist, TierRule, TierRules};
pub use training::{fit_artifacts, TrainedArtifacts, TrainingParams};
