//! Check the export toolchain.

use snipframe_common::config::AppConfig;
use snipframe_export_engine::backend::ffmpeg::command_exists;
use snipframe_export_engine::{negotiate, FfmpegBackend};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("SnipFrame System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;
    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found");
        } else {
            println!("[MISSING] {binary} not found in PATH");
            all_ok = false;
        }
    }

    let codec = negotiate(&config.export.codec_preferences, &FfmpegBackend::new(""));
    println!(
        "[{}] Output codec: {}",
        if codec.fallback { "WARN" } else { "OK" },
        codec.mime_type
    );
    println!("     Output directory: {}", config.output_dir.display());
    println!(
        "     Frame rate: {} fps, progress updates: {} Hz",
        config.export.fps, config.export.progress_hz
    );

    println!();
    if all_ok {
        println!("All required tools are available. SnipFrame is ready.");
    } else {
        println!("Install ffmpeg (which ships ffprobe) to export clips.");
    }

    Ok(())
}
