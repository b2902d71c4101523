//! Frozen standard scaler: (x - mean) / scale per feature

#![allow(non_snake_case)]

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};
use crate::preprocessing::FeatureMatrix;

/// On-disk form of the scaler.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerArtifact {
    #[serde(default)]
    feature_names: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

/// Per-feature mean/scale pair learned offline and never refitted at inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScalerArtifact", into = "ScalerArtifact")]
pub struct StandardScaler {
    feature_names: Vec<String>,
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Build a scaler from stored parameters. `feature_names` may be empty
    /// when the artifact does not record column identity.
    pub fn from_parts(feature_names: Vec<String>, mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        if mean.is_empty() {
            return Err(SegmentError::InvalidArtifact("scaler has no features".into()));
        }
        if mean.len() != scale.len() {
            return Err(SegmentError::InvalidArtifact(format!(
                "scaler has {} means but {} scales",
                mean.len(),
                scale.len()
            )));
        }
        if !feature_names.is_empty() && feature_names.len() != mean.len() {
            return Err(SegmentError::InvalidArtifact(format!(
                "scaler names {} features but stores {}",
                feature_names.len(),
                mean.len()
            )));
        }
        if mean.iter().any(|m| !m.is_finite()) {
            return Err(SegmentError::InvalidArtifact("scaler mean is not finite".into()));
        }
        if scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(SegmentError::InvalidArtifact(
                "scaler scale must be finite and positive".into(),
            ));
        }

        Ok(Self {
            feature_names,
            mean: Array1::from(mean),
            scale: Array1::from(scale),
        })
    }

    /// Offline fit: population standard deviation, zero variance scales by 1.
    pub fn fit(features: &FeatureMatrix) -> Result<Self> {
        let X = &features.values;
        if X.nrows() == 0 {
            return Err(SegmentError::Training("empty dataset".into()));
        }

        let mean = X
            .mean_axis(Axis(0))
            .ok_or_else(|| SegmentError::Training("failed to compute mean".into()))?;
        let mut scale = X.std_axis(Axis(0), 0.0);

        // Avoid division by zero on constant features
        for val in scale.iter_mut() {
            if *val < 1e-10 {
                *val = 1.0;
            }
        }

        Ok(Self {
            feature_names: features.names.clone(),
            mean,
            scale,
        })
    }

    pub fn expected_dimensions(&self) -> usize {
        self.mean.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Scale a log-feature matrix. Column count must match the fit, and so
    /// must column names when the scaler recorded them.
    pub fn transform(&self, features: &FeatureMatrix) -> Result<Array2<f64>> {
        if features.ncols() != self.expected_dimensions() {
            return Err(SegmentError::DimensionMismatch {
                expected: self.expected_dimensions(),
                actual: features.ncols(),
            });
        }
        if !self.feature_names.is_empty() && features.names != self.feature_names {
            return Err(SegmentError::FeatureOrderMismatch {
                expected: self.feature_names.clone(),
                actual: features.names.clone(),
            });
        }

        let mut normalized = features.values.clone();
        for mut row in normalized.rows_mut() {
            for (i, val) in row.iter_mut().enumerate() {
                *val = (*val - self.mean[i]) / self.scale[i];
            }
        }

        Ok(normalized)
    }
}

impl TryFrom<ScalerArtifact> for StandardScaler {
    type Error = SegmentError;

    fn try_from(artifact: ScalerArtifact) -> Result<Self> {
        Self::from_parts(artifact.feature_names, artifact.mean, artifact.scale)
    }
}

impl From<StandardScaler> for ScalerArtifact {
    fn from(scaler: StandardScaler) -> Self {
        Self {
            feature_names: scaler.feature_names,
            mean: scaler.mean.to_vec(),
            scale: scaler.scale.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn rfm_names() -> Vec<String> {
        vec!["Recency".into(), "Frequency".into(), "Monetary".into()]
    }

    fn scaler() -> StandardScaler {
        StandardScaler::from_parts(rfm_names(), vec![1.0, 2.0, 3.0], vec![0.5, 1.0, 2.0]).unwrap()
    }

    #[test]
    fn transforms_with_frozen_parameters() {
        let features = FeatureMatrix::new(rfm_names(), array![[1.0, 2.0, 3.0], [2.0, 4.0, 7.0]]);
        let scaled = scaler().transform(&features).unwrap();
        assert_eq!(scaled, array![[0.0, 0.0, 0.0], [2.0, 2.0, 2.0]]);
    }

    #[test]
    fn repeated_transform_is_identical() {
        let features = FeatureMatrix::new(rfm_names(), array![[0.3, 1.7, 9.1], [4.2, 0.7, 5.5]]);
        let scaler = scaler();
        let first = scaler.transform(&features).unwrap();
        let second = scaler.transform(&features).unwrap();
        let first_bits: Vec<u64> = first.iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u64> = second.iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn rejects_wrong_column_count() {
        let features = FeatureMatrix::new(
            vec!["Recency".into(), "Monetary".into()],
            array![[1.0, 2.0]],
        );
        let err = scaler().transform(&features).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn rejects_reordered_columns() {
        let features = FeatureMatrix::new(
            vec!["Monetary".into(), "Frequency".into(), "Recency".into()],
            array![[1.0, 2.0, 3.0]],
        );
        let err = scaler().transform(&features).unwrap_err();
        assert!(matches!(err, SegmentError::FeatureOrderMismatch { .. }));
    }

    #[test]
    fn unnamed_scaler_checks_only_dimensions() {
        let scaler = StandardScaler::from_parts(vec![], vec![0.0; 3], vec![1.0; 3]).unwrap();
        let features = FeatureMatrix::new(
            vec!["a".into(), "b".into(), "c".into()],
            array![[1.0, 2.0, 3.0]],
        );
        assert!(scaler.transform(&features).is_ok());
    }

    #[test]
    fn fit_matches_population_statistics() {
        let features = FeatureMatrix::new(rfm_names(), array![[1.0, 5.0, 2.0], [3.0, 5.0, 6.0]]);
        let scaler = StandardScaler::fit(&features).unwrap();
        assert_eq!(scaler.mean(), &array![2.0, 5.0, 4.0]);
        // Constant column falls back to a unit scale.
        assert_eq!(scaler.scale(), &array![1.0, 1.0, 2.0]);
        assert_eq!(scaler.feature_names(), rfm_names().as_slice());
    }

    #[test]
    fn rejects_malformed_parameters() {
        assert!(StandardScaler::from_parts(vec![], vec![], vec![]).is_err());
        assert!(StandardScaler::from_parts(vec![], vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(StandardScaler::from_parts(vec![], vec![0.0], vec![0.0]).is_err());
        assert!(StandardScaler::from_parts(vec!["x".into()], vec![0.0, 0.0], vec![1.0, 1.0]).is_err());
    }

    #[test]
    fn artifact_round_trips_through_json() {
        let json = serde_json::to_string(&scaler()).unwrap();
        let parsed: StandardScaler = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, scaler());

        let bad = r#"{"mean": [0.0, 1.0], "scale": [1.0, -1.0]}"#;
        assert!(serde_json::from_str::<StandardScaler>(bad).is_err());
    }
}
