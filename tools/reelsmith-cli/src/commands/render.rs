//! Render a manifest to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use reelsmith_common::config::AppConfig;
use reelsmith_render_engine::{
    require_tools, CancelSignal, PipelineSettings, RenderPipeline, RenderProgress, RenderStage,
    SystemToolRunner,
};
use reelsmith_timeline_model::scene::VisualEffect;

/// Command-line overrides of the configured defaults.
pub struct RenderOptions {
    pub output: Option<PathBuf>,
    pub effect: Option<String>,
    pub crossfade: Option<f64>,
    pub encoder: Option<String>,
    pub keep_temp: bool,
    pub timeout: Option<u64>,
    pub jobs: Option<usize>,
}

pub async fn run(mut config: AppConfig, manifest: PathBuf, options: RenderOptions) -> anyhow::Result<()> {
    println!("Rendering manifest: {}", manifest.display());
    require_tools()?;

    if let Some(crossfade) = options.crossfade {
        config.render.crossfade_secs = crossfade;
    }
    if let Some(encoder) = options.encoder {
        config.render.encoder = encoder;
    }
    if let Some(timeout) = options.timeout {
        config.render.tool_timeout_secs = Some(timeout);
    }
    if let Some(jobs) = options.jobs {
        config.render.max_parallel_jobs = Some(jobs);
    }
    let settings = PipelineSettings::from_app_config(&config)?;

    let loaded = super::load_manifest(&manifest)?;
    let mut job = loaded.to_job(options.output);
    if let Some(effect) = options.effect {
        job.default_effect = effect
            .parse::<VisualEffect>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    job.temp.keep_on_success = options.keep_temp || config.render.keep_temp;
    job.temp.keep_on_failure = config.render.keep_temp_on_failure;

    println!("  Job: {}", job.job_id);
    println!("  Scenes: {}", job.scenes.len());
    println!("  Output: {}", job.output_path.display());
    println!(
        "  Canvas: {}x{} @ {} fps",
        settings.timeline.width, settings.timeline.height, settings.timeline.fps
    );

    let runner = match config.render.tool_timeout_secs {
        Some(secs) => SystemToolRunner::new().with_timeout(secs),
        None => SystemToolRunner::new(),
    };
    let pipeline =
        RenderPipeline::new(Arc::new(runner), settings).with_progress(Arc::new(print_progress));

    let (handle, cancel) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling render");
            handle.cancel();
        }
    });

    match pipeline.run(&job, &cancel).await {
        Ok(outcome) => {
            println!("\nRender complete: {}", outcome.output_path.display());
            println!("  Encoder: {}", outcome.encoder);
            println!("  Duration: {:.2}s", outcome.expected_duration);
            println!("  Elapsed: {:.1}s", outcome.elapsed_secs);
            if outcome.is_degraded() {
                println!("  [WARN] Degraded render:");
                for sub in &outcome.substitutions {
                    println!(
                        "     scene {} filled by {:?} ({})",
                        sub.scene_index, sub.source, sub.reason
                    );
                }
                for fallback in outcome.mix_fallbacks.iter().filter(|f| f.action.degrades()) {
                    println!(
                        "     {} {:?} ({})",
                        fallback.segment, fallback.action, fallback.reason
                    );
                }
            }
            if let Some(dir) = &outcome.retained_temp_dir {
                println!("  Intermediates kept in: {}", dir.display());
            }
            Ok(())
        }
        Err(e) => {
            println!("\nRender failed: {e}");
            Err(e.into())
        }
    }
}

fn print_progress(p: RenderProgress) {
    match p.stage {
        RenderStage::Encoding | RenderStage::Finalizing if p.total_frames > 0 => print!(
            "\r  {}: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.stage.as_str(),
            p.progress * 100.0,
            p.frames_rendered,
            p.total_frames,
            p.eta_secs,
        ),
        _ => print!("\r  {}: {:.0}%{:30}", p.stage.as_str(), p.progress * 100.0, ""),
    }
    let _ = std::io::stdout().flush();
}
