//! Offline fitting of the scaler and clustering artifacts

use linfa::prelude::*;
use linfa_clustering::KMeans;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Result, SegmentError};
use crate::models::CentroidModel;
use crate::preprocessing::{FeatureMatrix, StandardScaler};

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingParams {
    pub n_clusters: usize,
    pub max_iterations: u64,
    pub tolerance: f64,
    pub n_runs: usize,
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            n_clusters: 4,
            max_iterations: 300,
            tolerance: 1e-4,
            n_runs: 10,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainedArtifacts {
    pub scaler: StandardScaler,
    pub model: CentroidModel,
    /// Within-cluster sum of squares on the training data.
    pub inertia: f64,
}

/// Fit the scaler on log features, then K-means on the scaled features.
pub fn fit_artifacts(features: &FeatureMatrix, params: &TrainingParams) -> Result<TrainedArtifacts> {
    if params.n_clusters == 0 {
        return Err(SegmentError::Training("number of clusters must be positive".into()));
    }
    if features.nrows() < params.n_clusters {
        return Err(SegmentError::Training(format!(
            "number of customers ({}) must be at least the number of clusters ({})",
            features.nrows(),
            params.n_clusters
        )));
    }

    let scaler = StandardScaler::fit(features)?;
    let scaled = scaler.transform(features)?;

    let dataset = DatasetBase::from(scaled.clone());
    let rng = StdRng::seed_from_u64(params.seed);
    let kmeans: KMeans<f64, _> = KMeans::params_with_rng(params.n_clusters, rng)
        .max_n_iterations(params.max_iterations)
        .tolerance(params.tolerance)
        .n_runs(params.n_runs)
        .fit(&dataset)
        .map_err(|e| SegmentError::Training(e.to_string()))?;

    let model = CentroidModel::new(features.names.clone(), kmeans.centroids().clone())?;
    let labels = model.predict(&scaled)?;
    let inertia = scaled
        .outer_iter()
        .zip(labels.iter())
        .map(|(row, &label)| {
            row.iter()
                .zip(model.centroids().row(label).iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
        })
        .sum();

    tracing::info!(
        clusters = params.n_clusters,
        customers = features.nrows(),
        inertia,
        "K-means fitted"
    );

    Ok(TrainedArtifacts {
        scaler,
        model,
        inertia,
    })
}
