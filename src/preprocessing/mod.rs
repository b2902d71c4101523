/// Data preparation: schema normalization, RFM aggregation, log features, scaling

pub mod feature_engineering;
pub mod normalization;
pub mod rfm;
pub mod schema;

pub use feature_engineering::{FeatureEngineer, FeatureMatrix};
pub use normalization::StandardScaler;
pub use rfm::RfmAggregator;
pub use schema::{NormalizedTransactions, SchemaNormalizer};
