/// Data types shared by the pipeline stages, the HTTP surface and the CLI

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};

/// Feature order the scaler and the clustering model are fitted on.
pub const RFM_FEATURES: [&str; 3] = ["Recency", "Frequency", "Monetary"];

/// A single cell of an uploaded dataset before coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    /// Any other JSON value (booleans, arrays, objects); coerces to missing.
    Other(serde_json::Value),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

/// In-memory tabular dataset as handed over by the caller.
///
/// Rows shorter than `columns` are padded with missing cells on access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTable {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Option<RawValue>>>,
}

impl RawTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Option<RawValue>>) {
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&RawValue> {
        self.rows.get(row)?.get(column)?.as_ref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Which dataset columns play which role in the transaction schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(alias = "identity_col")]
    pub identity: String,
    #[serde(alias = "quantity_col")]
    pub quantity: String,
    #[serde(alias = "price_col")]
    pub price: String,
    #[serde(alias = "timestamp_col")]
    pub timestamp: String,
    /// Order/invoice identifier. Without it Frequency counts transaction rows.
    #[serde(default, alias = "invoice_col")]
    pub invoice: Option<String>,
}

impl ColumnMapping {
    pub fn new(
        identity: impl Into<String>,
        quantity: impl Into<String>,
        price: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            quantity: quantity.into(),
            price: price.into(),
            timestamp: timestamp.into(),
            invoice: None,
        }
    }

    pub fn with_invoice(mut self, invoice: impl Into<String>) -> Self {
        self.invoice = Some(invoice.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub customer_id: String,
    pub invoice: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub timestamp: NaiveDateTime,
}

impl Transaction {
    pub fn amount(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// Per-reason counts of rows removed by the schema normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationAudit {
    pub total_rows: usize,
    pub kept_rows: usize,
    pub missing_identity: usize,
    pub missing_quantity: usize,
    pub missing_price: usize,
    pub missing_timestamp: usize,
    pub non_positive_quantity: usize,
    pub non_positive_price: usize,
    pub cancelled_invoice: usize,
    /// Quantity times price overflowed to a non-finite amount.
    #[serde(default)]
    pub non_finite_amount: usize,
}

impl NormalizationAudit {
    pub fn dropped(&self) -> usize {
        self.total_rows - self.kept_rows
    }
}

/// How the Frequency column was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyBasis {
    /// Distinct invoice identifiers per customer.
    Invoices,
    /// No invoice column mapped: every transaction row counts once.
    TransactionRows,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRfm {
    pub customer_id: String,
    pub recency: i64,
    pub frequency: u64,
    pub monetary: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmTable {
    pub rows: Vec<CustomerRfm>,
    pub snapshot: NaiveDateTime,
    pub frequency_basis: FrequencyBasis,
}

impl RfmTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredCustomer {
    pub customer_id: String,
    pub recency: i64,
    pub frequency: u64,
    pub monetary: f64,
    pub cluster: usize,
}

/// Aggregate used for both the population reference and per-cluster figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    #[default]
    Mean,
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    HighValue,
    Loyal,
    Growth,
    AtRisk,
}

impl Tier {
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::HighValue => "Tier 1: High-Performance",
            Tier::Loyal => "Tier 2: Loyal",
            Tier::Growth => "Tier 2-3: Stable",
            Tier::AtRisk => "Tier 4: At-Risk",
        }
    }

    pub fn default_action(&self) -> &'static str {
        match self {
            Tier::HighValue => "Primary revenue drivers. Apply exclusive retention perks.",
            Tier::Loyal => "Frequent repeat buyers. Cross-sell complementary products.",
            Tier::Growth => "Steady activity. Target for upselling and a first repeat purchase.",
            Tier::AtRisk => "Significant churn risk. Trigger re-engagement campaign.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecommendation {
    pub cluster: usize,
    pub tier: Tier,
    pub tier_name: String,
    pub recommended_action: String,
    pub customer_count: usize,
    pub representative_monetary: f64,
    pub representative_recency: f64,
    pub representative_frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSummary {
    pub total_customers: usize,
    pub gross_revenue: f64,
    pub mean_spend: f64,
    pub mean_recency_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub snapshot_date: NaiveDateTime,
    pub frequency_basis: FrequencyBasis,
    pub threshold_policy: ThresholdPolicy,
    pub cluster_count: usize,
    pub feature_names: Vec<String>,
    pub normalization: NormalizationAudit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationReport {
    pub customers: Vec<ClusteredCustomer>,
    pub segments: Vec<SegmentRecommendation>,
    /// Customer count per cluster label, `0..cluster_count`, empty labels included.
    pub distribution: Vec<usize>,
    pub summary: PopulationSummary,
    pub metadata: ReportMetadata,
}

impl SegmentationReport {
    pub fn segment_members(&self, cluster: usize) -> impl Iterator<Item = &ClusteredCustomer> {
        self.customers.iter().filter(move |c| c.cluster == cluster)
    }

    pub fn segment(&self, cluster: usize) -> Option<&SegmentRecommendation> {
        self.segments.iter().find(|s| s.cluster == cluster)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub threshold_policy: ThresholdPolicy,
    /// Multiplier on the reference recency above which a cluster is at risk.
    pub at_risk_margin: f64,
    pub include_loyal_rule: bool,
    /// Invoices starting with this prefix are cancellations and get dropped.
    pub cancelled_invoice_prefix: Option<String>,
    /// Explicit snapshot instant; defaults to the latest transaction + 1 day.
    pub as_of: Option<NaiveDateTime>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            threshold_policy: ThresholdPolicy::Mean,
            at_risk_margin: default_at_risk_margin(),
            include_loyal_rule: false,
            cancelled_invoice_prefix: Some("C".to_string()),
            as_of: None,
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.at_risk_margin.is_finite() && self.at_risk_margin > 0.0) {
            return Err(SegmentError::InvalidOption(format!(
                "at_risk_margin must be a positive number, got {}",
                self.at_risk_margin
            )));
        }
        Ok(())
    }
}

pub fn default_at_risk_margin() -> f64 {
    1.4
}
