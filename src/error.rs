//! Errors raised by the segmentation pipeline

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SegmentError>;

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("column mapping is incomplete: `{0}` is not set")]
    EmptyColumnSelection(&'static str),

    #[error("column `{0}` not found in dataset")]
    MissingColumn(String),

    #[error("no usable rows after normalization ({dropped} of {total} rows dropped)")]
    NoUsableRows { total: usize, dropped: usize },

    #[error("scaler expects {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("feature columns {actual:?} do not match the fitted order {expected:?}")]
    FeatureOrderMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("no customers with positive monetary value")]
    EmptyResult,

    #[error("artifact `{path}` is unavailable: {reason}")]
    ArtifactMissing { path: String, reason: String },

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("invalid pipeline option: {0}")]
    InvalidOption(String),

    #[error("as-of instant {as_of} is not after the latest transaction {latest}")]
    InvalidSnapshot {
        as_of: chrono::NaiveDateTime,
        latest: chrono::NaiveDateTime,
    },

    #[error("training failed: {0}")]
    Training(String),

    #[error("csv export failed: {0}")]
    Export(#[from] csv::Error),
}

/// Stable tag for rendering a failure without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Schema,
    DimensionMismatch,
    EmptyResult,
    ArtifactMissing,
    InvalidArtifact,
    Training,
    Export,
    /// Request body could not be decoded; never produced by the pipeline itself.
    InvalidRequest,
    /// Requested segment has no members.
    NotFound,
}

impl SegmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SegmentError::EmptyColumnSelection(_)
            | SegmentError::MissingColumn(_)
            | SegmentError::NoUsableRows { .. }
            | SegmentError::InvalidOption(_)
            | SegmentError::InvalidSnapshot { .. } => ErrorKind::Schema,
            SegmentError::DimensionMismatch { .. } | SegmentError::FeatureOrderMismatch { .. } => {
                ErrorKind::DimensionMismatch
            }
            SegmentError::EmptyResult => ErrorKind::EmptyResult,
            SegmentError::ArtifactMissing { .. } => ErrorKind::ArtifactMissing,
            SegmentError::InvalidArtifact(_) => ErrorKind::InvalidArtifact,
            SegmentError::Training(_) => ErrorKind::Training,
            SegmentError::Export(_) => ErrorKind::Export,
        }
    }
}
