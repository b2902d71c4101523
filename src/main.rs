/// RFM segmentation: API server, batch segmentation and offline training

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rfm_segments::{
    config::{Cli, Commands},
    engine::{save_artifact, SegmentationEngine},
    fit_artifacts,
    preprocessing::{FeatureEngineer, RfmAggregator, SchemaNormalizer},
    server::{self, AppState},
    tabular,
    types::{ColumnMapping, FrequencyBasis, PipelineOptions, RawTable},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let training_params = cli.command.training_params();

    match cli.command {
        Commands::Serve {
            bind,
            artifacts,
            pipeline,
        } => {
            let engine = SegmentationEngine::load(&artifacts.model, &artifacts.scaler)
                .context("segmentation artifacts must be present before serving")?;
            let state = AppState {
                engine: Arc::new(engine),
                defaults: Arc::new(PipelineOptions::from(pipeline)),
            };

            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            tracing::info!("Server listening on http://{}", bind);
            axum::serve(listener, server::router(state)).await?;
        }
        Commands::Segment {
            input,
            out_dir,
            columns,
            artifacts,
            pipeline,
        } => {
            let engine = SegmentationEngine::load(&artifacts.model, &artifacts.scaler)?;
            let table = read_table(&input)?;
            let report = engine.run(
                &table,
                &ColumnMapping::from(columns),
                &PipelineOptions::from(pipeline),
            )?;

            fs::create_dir_all(&out_dir)
                .with_context(|| format!("failed to create {}", out_dir.display()))?;
            fs::write(
                out_dir.join("segments.json"),
                serde_json::to_string_pretty(&report)?,
            )?;
            for segment in &report.segments {
                if let Some(csv) = tabular::segment_csv(&report, segment.cluster)? {
                    fs::write(out_dir.join(format!("segment_{}.csv", segment.cluster)), csv)?;
                }
                println!(
                    "SEGMENT {} | {} | {} customers | avg value {:.2}",
                    segment.cluster,
                    segment.tier_name,
                    segment.customer_count,
                    segment.representative_monetary
                );
                println!("  Recommended action: {}", segment.recommended_action);
            }
            println!("Report written to {}.", out_dir.display());
        }
        Commands::Train {
            input,
            columns,
            artifacts,
            pipeline,
            ..
        } => {
            let params = training_params.context("training parameters")?;
            let table = read_table(&input)?;
            let mapping = ColumnMapping::from(columns);
            let options = PipelineOptions::from(pipeline);

            let normalized = SchemaNormalizer::normalize(
                &table,
                &mapping,
                options.cancelled_invoice_prefix.as_deref(),
            )?;
            let basis = if normalized.has_invoice {
                FrequencyBasis::Invoices
            } else {
                FrequencyBasis::TransactionRows
            };
            let rfm = RfmAggregator::aggregate(&normalized.transactions, basis, None)?;
            let features = FeatureEngineer::extract_rfm_features(&rfm);
            let trained = fit_artifacts(&features, &params)?;

            save_artifact(&artifacts.model, &trained.model)?;
            save_artifact(&artifacts.scaler, &trained.scaler)?;
            println!(
                "Model ({} clusters, inertia {:.2}) and scaler saved to {} and {}.",
                trained.model.cluster_count(),
                trained.inertia,
                artifacts.model.display(),
                artifacts.scaler.display()
            );
        }
    }

    Ok(())
}

fn read_table(path: &Path) -> anyhow::Result<RawTable> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let table = tabular::read_csv(file)
        .with_context(|| format!("failed to read CSV {}", path.display()))?;
    tracing::info!(rows = table.len(), columns = ?table.columns, "Dataset loaded");
    Ok(table)
}
