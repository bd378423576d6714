//! Reelcraft CLI
//!
//! Command-line front end for building, previewing and exporting reels
//! described by a JSON manifest.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "reelcraft")]
#[command(about = "Slideshow reels from photos, video clips and generated cards")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the timeline a manifest produces
    Info {
        /// Path to the manifest JSON
        manifest: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check encoder and decoder availability
    Check,

    /// Render still frames of the reel
    Preview {
        /// Path to the manifest JSON
        manifest: PathBuf,

        /// Playhead times (seconds) to render
        #[arg(long = "at", value_delimiter = ',', default_value = "0")]
        at: Vec<f64>,

        /// Directory for the PNG frames
        #[arg(short, long = "out", default_value = ".")]
        output: PathBuf,

        /// Also play the reel in real time for this many seconds
        #[arg(long)]
        play: Option<f64>,
    },

    /// Export the reel to a video file
    Export {
        /// Path to the manifest JSON
        manifest: PathBuf,

        /// Output directory (defaults to the configured exports directory)
        #[arg(short, long = "out")]
        output: Option<PathBuf>,

        /// Quality tier: low, medium, high, ultra
        #[arg(short, long)]
        quality: Option<String>,

        /// Preferred container: webm, mp4
        #[arg(short, long)]
        format: Option<String>,

        /// Output width
        #[arg(long)]
        width: Option<u32>,

        /// Output height
        #[arg(long)]
        height: Option<u32>,

        /// Capture against the wall clock instead of settling every frame
        #[arg(long)]
        realtime: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = reelcraft_common::config::AppConfig::load();
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    reelcraft_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Info { manifest, json } => commands::info::run(&config, manifest, json).await,
        Commands::Check => commands::check::run(&config).await,
        Commands::Preview {
            manifest,
            at,
            output,
            play,
        } => commands::preview::run(&config, manifest, at, output, play).await,
        Commands::Export {
            manifest,
            output,
            quality,
            format,
            width,
            height,
            realtime,
        } => {
            commands::export::run(
                config,
                manifest,
                output,
                quality,
                format,
                width,
                height,
                realtime,
            )
            .await
        }
    }
}
