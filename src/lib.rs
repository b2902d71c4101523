//! RFM segmentation library
//!
//! Raw transaction rows are normalized, aggregated into per-customer
//! Recency/Frequency/Monetary features, log-transformed and scaled with a
//! frozen scaler, assigned to clusters of a frozen K-means model and finally
//! mapped to marketing tiers.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod preprocessing;
pub mod server;
pub mod tabular;
pub mod types;

pub use engine::SegmentationEngine;
pub use error::{ErrorKind, Result, SegmentError};
pub use models::*;
pub use preprocessing::*;
pub use types::*;
