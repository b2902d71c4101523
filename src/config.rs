//! Command-line and environment configuration for the binary

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::TrainingParams;
use crate::types::{ColumnMapping, PipelineOptions, ThresholdPolicy};

#[derive(Parser, Debug)]
#[command(name = "rfm-segments")]
#[command(about = "RFM customer segmentation with a pre-trained clustering model", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the segmentation API
    Serve {
        #[arg(long, env = "RFM_BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
        #[command(flatten)]
        artifacts: ArtifactArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Segment a CSV file and write the report plus per-segment CSVs
    Segment {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "segments")]
        out_dir: PathBuf,
        #[command(flatten)]
        columns: ColumnArgs,
        #[command(flatten)]
        artifacts: ArtifactArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Offline: fit the scaler and K-means model on a CSV file
    Train {
        #[arg(long)]
        input: PathBuf,
        #[arg(short = 'k', long, default_value_t = 4)]
        clusters: usize,
        #[arg(long, default_value_t = 300)]
        max_iters: u64,
        #[arg(long, default_value_t = 1e-4)]
        tolerance: f64,
        #[arg(long, default_value_t = 10)]
        n_runs: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[command(flatten)]
        columns: ColumnArgs,
        #[command(flatten)]
        artifacts: ArtifactArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ArtifactArgs {
    #[arg(long, env = "RFM_MODEL_PATH", default_value = "models/kmeans_model.json")]
    pub model: PathBuf,
    #[arg(long, env = "RFM_SCALER_PATH", default_value = "models/scaler.json")]
    pub scaler: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ColumnArgs {
    #[arg(long = "id-col", default_value = "Customer ID")]
    pub identity: String,
    #[arg(long = "quantity-col", default_value = "Quantity")]
    pub quantity: String,
    #[arg(long = "price-col", default_value = "Price")]
    pub price: String,
    #[arg(long = "date-col", default_value = "InvoiceDate")]
    pub timestamp: String,
    /// Order identifier column; omit to count Frequency in transaction rows
    #[arg(long = "invoice-col")]
    pub invoice: Option<String>,
}

impl From<ColumnArgs> for ColumnMapping {
    fn from(args: ColumnArgs) -> Self {
        ColumnMapping {
            identity: args.identity,
            quantity: args.quantity,
            price: args.price,
            timestamp: args.timestamp,
            invoice: args.invoice,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    #[arg(long, value_enum, env = "RFM_THRESHOLD_POLICY", default_value_t = ThresholdPolicy::Mean)]
    pub threshold_policy: ThresholdPolicy,
    #[arg(long, default_value_t = crate::types::default_at_risk_margin())]
    pub at_risk_margin: f64,
    #[arg(long)]
    pub loyal_rule: bool,
    /// Prefix marking cancelled invoices; pass an empty string to keep them
    #[arg(long, default_value = "C")]
    pub cancelled_prefix: String,
}

impl From<PipelineArgs> for PipelineOptions {
    fn from(args: PipelineArgs) -> Self {
        PipelineOptions {
            threshold_policy: args.threshold_policy,
            at_risk_margin: args.at_risk_margin,
            include_loyal_rule: args.loyal_rule,
            cancelled_invoice_prefix: (!args.cancelled_prefix.is_empty())
                .then_some(args.cancelled_prefix),
            as_of: None,
        }
    }
}

impl Commands {
    pub fn training_params(&self) -> Option<TrainingParams> {
        match self {
            Commands::Train {
                clusters,
                max_iters,
                tolerance,
                n_runs,
                seed,
                ..
            } => Some(TrainingParams {
                n_clusters: *clusters,
                max_iterations: *max_iters,
                tolerance: *tolerance,
                n_runs: *n_runs,
                seed: *seed,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segment_command() {
        let cli = Cli::try_parse_from([
            "rfm-segments",
            "segment",
            "--input",
            "uk_boutique.csv",
            "--id-col",
            "CustomerID",
            "--invoice-col",
            "Invoice",
            "--threshold-policy",
            "median",
            "--loyal-rule",
        ])
        .unwrap();

        let Commands::Segment { columns, pipeline, .. } = cli.command else {
            panic!("expected segment command");
        };
        let mapping = ColumnMapping::from(columns);
        assert_eq!(mapping.identity, "CustomerID");
        assert_eq!(mapping.invoice.as_deref(), Some("Invoice"));

        let options = PipelineOptions::from(pipeline);
        assert_eq!(options.threshold_policy, ThresholdPolicy::Median);
        assert!(options.include_loyal_rule);
        assert_eq!(options.at_risk_margin, 1.4);
        assert_eq!(options.cancelled_invoice_prefix.as_deref(), Some("C"));
    }

    #[test]
    fn train_command_yields_params() {
        let cli = Cli::try_parse_from(["rfm-segments", "train", "--input", "retail.csv", "-k", "5"]).unwrap();
        let params = cli.command.training_params().unwrap();
        assert_eq!(params.n_clusters, 5);
        assert_eq!(params.seed, 42);
    }

    #[test]
    fn empty_prefix_disables_cancellation_filter() {
        let cli = Cli::try_parse_from([
            "rfm-segments",
            "segment",
            "--input",
            "a.csv",
            "--cancelled-prefix",
            "",
        ])
        .unwrap();
        let Commands::Segment { pipeline, .. } = cli.command else {
            panic!("expected segment command");
        };
        assert_eq!(PipelineOptions::from(pipeline).cancelled_invoice_prefix, None);
    }
}
