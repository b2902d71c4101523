//! Frozen K-means partition: nearest-centroid assignment

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelArtifact {
    #[serde(default)]
    feature_names: Vec<String>,
    centroids: Vec<Vec<f64>>,
}

/// `k` centroids in scaled-feature space, labelled `0..k` by row index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelArtifact", into = "ModelArtifact")]
pub struct CentroidModel {
    feature_names: Vec<String>,
    centroids: Array2<f64>,
}

impl CentroidModel {
    pub fn new(feature_names: Vec<String>, centroids: Array2<f64>) -> Result<Self> {
        if centroids.nrows() == 0 || centroids.ncols() == 0 {
            return Err(SegmentError::InvalidArtifact("model has no centroids".into()));
        }
        if centroids.iter().any(|v| !v.is_finite()) {
            return Err(SegmentError::InvalidArtifact("centroid is not finite".into()));
        }
        if !feature_names.is_empty() && feature_names.len() != centroids.ncols() {
            return Err(SegmentError::InvalidArtifact(format!(
                "model names {} features but centroids have {}",
                feature_names.len(),
                centroids.ncols()
            )));
        }
        Ok(Self {
            feature_names,
            centroids,
        })
    }

    pub fn from_rows(feature_names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_clusters = rows.len();
        let n_features = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != n_features) {
            return Err(SegmentError::InvalidArtifact(
                "centroids have inconsistent widths".into(),
            ));
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let centroids = Array2::from_shape_vec((n_clusters, n_features), flat)
            .map_err(|e| SegmentError::InvalidArtifact(e.to_string()))?;
        Self::new(feature_names, centroids)
    }

    pub fn cluster_count(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn dimensions(&self) -> usize {
        self.centroids.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    /// Label of the nearest centroid under Euclidean distance.
    /// Equidistant centroids resolve to the lowest label.
    pub fn predict_one(&self, features: ArrayView1<f64>) -> Result<usize> {
        if features.len() != self.dimensions() {
            return Err(SegmentError::DimensionMismatch {
                expected: self.dimensions(),
                actual: features.len(),
            });
        }

        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = squared_distance(&features, &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        Ok(closest_cluster)
    }

    pub fn predict(&self, features: &Array2<f64>) -> Result<Array1<usize>> {
        if features.ncols() != self.dimensions() {
            return Err(SegmentError::DimensionMismatch {
                expected: self.dimensions(),
                actual: features.ncols(),
            });
        }
        features
            .outer_iter()
            .map(|row| self.predict_one(row))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from)
    }

    /// Customer count per label; labels with no members report zero.
    pub fn cluster_sizes(&self, labels: &Array1<usize>) -> Vec<usize> {
        let mut sizes = vec![0; self.cluster_count()];
        for &label in labels.iter() {
            if label < sizes.len() {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

impl TryFrom<ModelArtifact> for CentroidModel {
    type Error = SegmentError;

    fn try_from(artifact: ModelArtifact) -> Result<Self> {
        Self::from_rows(artifact.feature_names, artifact.centroids)
    }
}

impl From<CentroidModel> for ModelArtifact {
    fn from(model: CentroidModel) -> Self {
        Self {
            feature_names: model.feature_names,
            centroids: model.centroids.outer_iter().map(|row| row.to_vec()).collect(),
        }
    }
}
