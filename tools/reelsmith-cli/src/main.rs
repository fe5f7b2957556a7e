//! Reelsmith CLI: plan, caption and render short vertical videos.
//!
//! Usage:
//!   reelsmith render <MANIFEST>   Render a manifest to video
//!   reelsmith plan <MANIFEST>     Show scene timing and cues without rendering
//!   reelsmith subs <MANIFEST>     Write the caption track only
//!   reelsmith preview <MANIFEST>  Captions over a plain background
//!   reelsmith check               Check external tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "reelsmith",
    about = "Timeline composition and rendering for short vertical videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a manifest to video
    Render {
        /// Path to the render manifest (JSON)
        manifest: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Motion for images without their own effect: zoom|pan|kenburns|static
        #[arg(long)]
        effect: Option<String>,

        /// Crossfade between clips (seconds, 0 = hard cuts)
        #[arg(long)]
        crossfade: Option<f64>,

        /// Encoder: auto|hardware|software
        #[arg(long)]
        encoder: Option<String>,

        /// Keep intermediates after a successful render
        #[arg(long)]
        keep_temp: bool,

        /// Kill any single ffmpeg run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Scenes normalized concurrently
        #[arg(long)]
        jobs: Option<usize>,
    },

    /// Show scene timing and cues without running any tool
    Plan {
        /// Path to the render manifest (JSON)
        manifest: PathBuf,

        /// Narration length to plan with when the manifest has no timing
        #[arg(long)]
        narration_secs: Option<f64>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the caption track of a manifest (.ass or .srt)
    Subs {
        /// Path to the render manifest (JSON)
        manifest: PathBuf,

        /// Caption file to write
        #[arg(short, long, default_value = "captions.ass")]
        output: PathBuf,
    },

    /// Quick caption preview over a plain background, no media or audio
    Preview {
        /// Path to the render manifest (JSON)
        manifest: PathBuf,

        /// Preview file to write
        #[arg(short, long, default_value = "preview.mp4")]
        output: PathBuf,

        /// Seconds of the timeline to show
        #[arg(long, default_value_t = 10.0)]
        duration: f64,
    },

    /// Check external tools and hardware encoding
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = reelsmith_common::config::AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    reelsmith_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Render {
            manifest,
            output,
            effect,
            crossfade,
            encoder,
            keep_temp,
            timeout,
            jobs,
        } => {
            let options = commands::render::RenderOptions {
                output,
                effect,
                crossfade,
                encoder,
                keep_temp,
                timeout,
                jobs,
            };
            commands::render::run(config, manifest, options).await
        }
        Commands::Plan {
            manifest,
            narration_secs,
            json,
        } => commands::plan::run(&config, manifest, narration_secs, json),
        Commands::Subs { manifest, output } => {
            commands::subs::run(&config, manifest, output).await
        }
        Commands::Preview {
            manifest,
            output,
            duration,
        } => commands::preview::run(&config, manifest, output, duration).await,
        Commands::Check => commands::check::run(&config).await,
    }
}
