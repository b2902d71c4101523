//! Feature engineering for the clustering model

use ndarray::Array2;

use crate::types::{RfmTable, RFM_FEATURES};

/// Named feature matrix, one row per customer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Self {
        Self { names, values }
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }
}

pub struct FeatureEngineer;

impl FeatureEngineer {
    /// log1p of Recency, Frequency, Monetary in that column order.
    ///
    /// RFM data is heavily right-skewed; the log pulls the tails in before
    /// scaling. Inputs are never negative (recency >= 1, frequency >= 1,
    /// monetary > 0).
    pub fn extract_rfm_features(table: &RfmTable) -> FeatureMatrix {
        let n_samples = table.len();
        let mut values = Array2::zeros((n_samples, RFM_FEATURES.len()));

        for (i, row) in table.rows.iter().enumerate() {
            values[[i, 0]] = (row.recency as f64).ln_1p();
            values[[i, 1]] = (row.frequency as f64).ln_1p();
            values[[i, 2]] = row.monetary.ln_1p();
        }

        FeatureMatrix {
            names: RFM_FEATURES.iter().map(|n| n.to_string()).collect(),
            values,
        }
    }
}
