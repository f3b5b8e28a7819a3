//! SnipFrame CLI: trim and crop video clips from the command line.
//!
//! Usage:
//!   snipframe check                                  Check for ffmpeg/ffprobe
//!   snipframe info <INPUT>                           Show duration and dimensions
//!   snipframe export <INPUT> --start S --end E ...   Export a trimmed/cropped clip

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use snipframe_common::config::AppConfig;
use snipframe_edit_model::CropRect;
use snipframe_export_engine::backend::ffmpeg::OutputFormat;

mod commands;

#[derive(Parser)]
#[command(
    name = "snipframe",
    about = "Trim and crop video clips on your own machine",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the export toolchain is installed
    Check,

    /// Show duration and native dimensions of a video
    Info {
        /// Video file to probe
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a trimmed, optionally cropped clip
    Export {
        /// Source video file
        input: PathBuf,

        /// Trim start (seconds)
        #[arg(long)]
        start: f64,

        /// Trim end (seconds)
        #[arg(long)]
        end: f64,

        /// Crop rectangle in native pixels: X,Y,W,H
        #[arg(long, value_parser = commands::export::parse_crop)]
        crop: Option<CropRect>,

        /// Output file path (defaults to <output_dir>/<name>_trimmed.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output container; negotiated from config preferences when omitted
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Webm,
    Mp4,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Webm => OutputFormat::Webm,
            FormatArg::Mp4 => OutputFormat::Mp4,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load();
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    if cli.json_logs {
        logging.json = true;
    }
    snipframe_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Check => commands::check::run(&config),
        Commands::Info { input, json } => commands::info::run(input, json).await,
        Commands::Export {
            input,
            start,
            end,
            crop,
            output,
            format,
        } => {
            commands::export::run(
                &config,
                input,
                start,
                end,
                crop,
                output,
                format.map(OutputFormat::from),
            )
            .await
        }
    }
}
