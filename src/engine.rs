//! Immutable inference context and the end-to-end segmentation run

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SegmentError};
use crate::models::{CentroidModel, SegmentStrategist};
use crate::preprocessing::{FeatureEngineer, RfmAggregator, SchemaNormalizer, StandardScaler};
use crate::types::{
    ClusteredCustomer, ColumnMapping, FrequencyBasis, PipelineOptions, PopulationSummary, RawTable,
    ReportMetadata, SegmentationReport,
};

/// Scaler and clustering model, loaded once and only ever read afterwards.
///
/// Share it behind an `Arc` across callers; no run mutates it.
#[derive(Debug, Clone)]
pub struct SegmentationEngine {
    model: CentroidModel,
    scaler: StandardScaler,
}

impl SegmentationEngine {
    /// Pair a model with a scaler, refusing artifacts fitted on different features.
    pub fn new(model: CentroidModel, scaler: StandardScaler) -> Result<Self> {
        if model.dimensions() != scaler.expected_dimensions() {
            return Err(SegmentError::DimensionMismatch {
                expected: scaler.expected_dimensions(),
                actual: model.dimensions(),
            });
        }
        if !model.feature_names().is_empty()
            && !scaler.feature_names().is_empty()
            && model.feature_names() != scaler.feature_names()
        {
            return Err(SegmentError::FeatureOrderMismatch {
                expected: scaler.feature_names().to_vec(),
                actual: model.feature_names().to_vec(),
            });
        }
        Ok(Self { model, scaler })
    }

    pub fn load(model_path: impl AsRef<Path>, scaler_path: impl AsRef<Path>) -> Result<Self> {
        let model: CentroidModel = load_artifact(model_path.as_ref())?;
        let scaler: StandardScaler = load_artifact(scaler_path.as_ref())?;
        let engine = Self::new(model, scaler)?;

        tracing::info!(
            clusters = engine.model.cluster_count(),
            features = ?engine.scaler.feature_names(),
            "Segmentation artifacts loaded"
        );
        Ok(engine)
    }

    pub fn model(&self) -> &CentroidModel {
        &self.model
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Raw table -> clustered customers + segment recommendations.
    ///
    /// Either the whole report is produced or an error is returned; no
    /// partial tables leak out.
    pub fn run(
        &self,
        table: &RawTable,
        mapping: &ColumnMapping,
        options: &PipelineOptions,
    ) -> Result<SegmentationReport> {
        options.validate()?;
        let normalized =
            SchemaNormalizer::normalize(table, mapping, options.cancelled_invoice_prefix.as_deref())?;
        tracing::info!(
            rows = normalized.audit.total_rows,
            kept = normalized.audit.kept_rows,
            "Transactions normalized"
        );

        let basis = if normalized.has_invoice {
            FrequencyBasis::Invoices
        } else {
            tracing::warn!("No invoice column mapped; Frequency counts transaction rows");
            FrequencyBasis::TransactionRows
        };

        let rfm = RfmAggregator::aggregate(&normalized.transactions, basis, options.as_of)?;
        let features = FeatureEngineer::extract_rfm_features(&rfm);
        let scaled = self.scaler.transform(&features)?;
        let labels = self.model.predict(&scaled)?;
        let distribution = self.model.cluster_sizes(&labels);

        let customers: Vec<ClusteredCustomer> = rfm
            .rows
            .into_iter()
            .zip(labels.iter())
            .map(|(row, &cluster)| ClusteredCustomer {
                customer_id: row.customer_id,
                recency: row.recency,
                frequency: row.frequency,
                monetary: row.monetary,
                cluster,
            })
            .collect();

        let strategist = SegmentStrategist::from_options(options);
        let segments = strategist.recommend(&customers);
        let summary = summarize(&customers);

        tracing::info!(
            customers = customers.len(),
            segments = segments.len(),
            "Segmentation complete"
        );

        Ok(SegmentationReport {
            customers,
            segments,
            distribution,
            summary,
            metadata: ReportMetadata {
                snapshot_date: rfm.snapshot,
                frequency_basis: basis,
                threshold_policy: strategist.policy(),
                cluster_count: self.model.cluster_count(),
                feature_names: features.names,
                normalization: normalized.audit,
            },
        })
    }
}

/// Headline figures over all clustered customers.
pub fn summarize(customers: &[ClusteredCustomer]) -> PopulationSummary {
    let total_customers = customers.len();
    let gross_revenue: f64 = customers.iter().map(|c| c.monetary).sum();
    let total_recency: f64 = customers.iter().map(|c| c.recency as f64).sum();
    let (mean_spend, mean_recency_days) = if total_customers == 0 {
        (0.0, 0.0)
    } else {
        (
            gross_revenue / total_customers as f64,
            total_recency / total_customers as f64,
        )
    };

    PopulationSummary {
        total_customers,
        gross_revenue,
        mean_spend,
        mean_recency_days,
    }
}

pub fn load_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|e| SegmentError::ArtifactMissing {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&contents)
        .map_err(|e| SegmentError::InvalidArtifact(format!("{}: {e}", path.display())))
}

pub fn save_artifact<T: Serialize>(path: &Path, artifact: &T) -> Result<()> {
    let unavailable = |e: std::io::Error| SegmentError::ArtifactMissing {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(unavailable)?;
    }
    let json = serde_json::to_string_pretty(artifact)
        .map_err(|e| SegmentError::InvalidArtifact(e.to_string()))?;
    fs::write(path, json).map_err(unavailable)
}
