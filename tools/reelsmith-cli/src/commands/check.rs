//! Check external tools and hardware encoding.

use std::sync::Arc;

use reelsmith_common::config::AppConfig;
use reelsmith_render_engine::{check_tools, CancelSignal, RenderExecutor, SystemToolRunner};
use reelsmith_timeline_model::config::TimelineConfig;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Reelsmith System Check");
    println!("{}", "=".repeat(50));

    let tools = check_tools();
    for tool in &tools {
        match &tool.path {
            Some(path) => println!("[OK] {}: {}", tool.name, path.display()),
            None => println!("[MISSING] {}: not found on PATH", tool.name),
        }
    }
    let tools_ok = tools.iter().all(|t| t.path.is_some());

    if tools_ok {
        let timeline = TimelineConfig::from_defaults(&config.render)?;
        let executor = RenderExecutor::new(Arc::new(SystemToolRunner::new()), timeline);
        if executor.hardware_available(&CancelSignal::never()).await? {
            println!("[OK] Hardware encoder: h264_qsv");
        } else {
            println!("[WARN] Hardware encoder: unavailable, renders use libx264");
        }
    }

    println!("[OK] Temp root: {}", config.render.temp_root.display());

    println!();
    if tools_ok {
        println!("All required tools are available. Reelsmith is ready.");
    } else {
        println!("Install ffmpeg (with ffprobe) and make sure it is on PATH.");
    }
    Ok(())
}
