//! Write the caption track of a manifest.

use std::path::PathBuf;
use std::sync::Arc;

use reelsmith_common::config::AppConfig;
use reelsmith_render_engine::{CancelSignal, PipelineSettings, RenderPipeline, SystemToolRunner};

pub async fn run(config: &AppConfig, manifest: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let loaded = super::load_manifest(&manifest)?;
    let job = loaded.to_job(None);
    let settings = PipelineSettings::from_app_config(config)?;
    let pipeline = RenderPipeline::new(Arc::new(SystemToolRunner::new()), settings);

    let timeline = pipeline
        .build_captions(&job, &output, &CancelSignal::never())
        .await?;

    println!("Captions written: {}", output.display());
    println!("  Cues: {}", timeline.cues.len());
    println!("  Ends at: {:.2}s", timeline.end());
    if !timeline.repairs.is_empty() {
        println!("  Repairs: {}", timeline.repairs.len());
    }
    Ok(())
}
