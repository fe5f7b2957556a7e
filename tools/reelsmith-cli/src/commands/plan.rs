//! Dry-run a manifest: scene timing and cues, no tools run.

use std::path::PathBuf;
use std::sync::Arc;

use reelsmith_common::config::AppConfig;
use reelsmith_common::timecode::format_srt_timestamp;
use reelsmith_render_engine::{PipelineSettings, RenderPipeline, SystemToolRunner};
use reelsmith_timeline_model::config::CompositionMode;

pub fn run(
    config: &AppConfig,
    manifest: PathBuf,
    narration_secs: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    let loaded = super::load_manifest(&manifest)?;
    let job = loaded.to_job(None);
    let settings = PipelineSettings::from_app_config(config)?;
    let pipeline = RenderPipeline::new(Arc::new(SystemToolRunner::new()), settings);

    let plan = pipeline.plan(&job, narration_secs)?;

    if json {
        let value = serde_json::json!({
            "narration_secs": plan.narration_secs,
            "mode": plan.mode,
            "scenes": plan.scenes,
            "cues": plan.cues.cues,
            "repairs": plan.cues.repairs,
            "graph": plan.graph,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Plan for: {}", manifest.display());
    println!("{}", "=".repeat(50));
    println!("  Narration: {:.2}s", plan.narration_secs);
    match plan.mode {
        CompositionMode::Sequential => println!("  Joins: hard cuts"),
        CompositionMode::Crossfade { duration } => println!("  Joins: {duration:.2}s crossfade"),
    }
    println!();
    println!("  Scenes ({}):", plan.scenes.len());
    for scene in &plan.scenes {
        let asset = scene
            .asset
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<no asset>".to_string());
        println!(
            "    #{:<3} {:>7.2}s - {:>7.2}s  ({:.2}s)  {}",
            scene.id, scene.start_time, scene.end_time, scene.duration, asset
        );
    }
    println!();
    println!("  Cues ({}):", plan.cues.cues.len());
    for cue in &plan.cues.cues {
        println!(
            "    {} --> {}  [{}] {}",
            format_srt_timestamp(cue.start),
            format_srt_timestamp(cue.end),
            cue.style.name(),
            cue.text.replace('\n', " / ")
        );
    }
    if !plan.cues.repairs.is_empty() {
        println!();
        println!("  [WARN] {} cue(s) repaired", plan.cues.repairs.len());
    }
    println!();
    println!("  Filter graph ({:.2}s):", plan.graph.expected_duration);
    for stage in plan.graph.filter_complex.split(';') {
        println!("    {stage}");
    }
    Ok(())
}
