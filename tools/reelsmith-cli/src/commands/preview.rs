//! Caption preview over a plain background.

use std::path::PathBuf;
use std::sync::Arc;

use reelsmith_common::config::AppConfig;
use reelsmith_render_engine::{
    require_tools, CancelSignal, PipelineSettings, RenderPipeline, SystemToolRunner,
};

pub async fn run(
    config: &AppConfig,
    manifest: PathBuf,
    output: PathBuf,
    duration: f64,
) -> anyhow::Result<()> {
    require_tools()?;
    let loaded = super::load_manifest(&manifest)?;
    let mut job = loaded.to_job(None);
    job.temp.keep_on_success = config.render.keep_temp;
    job.temp.keep_on_failure = config.render.keep_temp_on_failure;

    let settings = PipelineSettings::from_app_config(config)?;
    let pipeline = RenderPipeline::new(Arc::new(SystemToolRunner::new()), settings);
    let timeline = pipeline
        .preview(&job, &output, duration, &CancelSignal::never())
        .await?;

    let shown = timeline.cues.iter().filter(|c| c.start < duration).count();
    println!("Preview written: {}", output.display());
    println!("  Length: {duration:.1}s");
    println!("  Cues shown: {shown} of {}", timeline.cues.len());
    Ok(())
}
