//! Two-phase daily snapshot pipeline.
//!
//! `fetch` runs every data task in a fixed order and writes `data_raw.json`;
//! `generate` reads it back, adds the AI narrative and publishes the dated
//! artifact plus `data.json`.

pub mod artifacts;
pub mod config;
pub mod context;
pub mod error;
pub mod gauge;
pub mod heatmap;
pub mod narrative;
pub mod orchestrator;

pub use artifacts::{latest_artifact, ArtifactStore, CleanupReport, LATEST_FILE, RAW_FILE};
pub use config::PipelineConfig;
pub use context::{PipelineContext, PipelineSources};
pub use error::{ArtifactError, SnapshotError, SnapshotResult};
pub use gauge::{GaugeRenderer, NoopGaugeRenderer, SvgGaugeRenderer};
pub use heatmap::{HeatmapAggregator, HeatmapConfig, HeatmapReport};
pub use narrative::{run_generate, NarrativePhase};
pub use orchestrator::{FetchReport, FetchTask, PipelineOrchestrator, TaskOutcome};
