//! market-snapshot: build the daily market snapshot in two phases.
//!
//! Usage:
//!   market-snapshot fetch      # upstream data -> data/data_raw.json
//!   market-snapshot generate   # data_raw.json + AI narrative -> data/data.json

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use snapshot_pipeline::{run_generate, ArtifactStore, NarrativePhase, PipelineConfig, PipelineContext, PipelineOrchestrator};

const USAGE: &str = "Usage: market-snapshot [fetch|generate]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_snapshot=info,snapshot_pipeline=info,market_sources=info,text_generation=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("fetch") => fetch().await,
        Some("generate") => generate().await,
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

async fn fetch() -> anyhow::Result<()> {
    let ctx = PipelineContext::from_env().context("failed to build pipeline context")?;
    let now = ctx.now();
    let orchestrator = PipelineOrchestrator::new(ctx);

    let (_, report) = orchestrator.run_fetch(now).await?;
    for (task, outcome) in &report.outcomes {
        tracing::debug!("{}: {:?}", task.name(), outcome);
    }
    Ok(())
}

async fn generate() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let now = Utc::now().with_timezone(&config.timezone);
    let artifacts = ArtifactStore::new(config.data_dir.clone(), config.retention_days);
    let phase = NarrativePhase::new(text_generation::generator_from_env());

    match run_generate(&artifacts, &phase, now).await {
        Ok((_, path)) => {
            tracing::info!("Published {}", path.display());
            Ok(())
        }
        Err(e) => {
            match e.code() {
                Some(code) => tracing::error!("{}", code.message(&e)),
                None => tracing::error!("Report generation failed: {}", e),
            }
            Err(e.into())
        }
    }
}
