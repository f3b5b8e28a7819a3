//! Show source video information.

use std::path::PathBuf;

use anyhow::Context;
use snipframe_edit_model::SourceFile;
use snipframe_export_engine::backend::ffmpeg::probe_metadata;

pub async fn run(input: PathBuf, json: bool) -> anyhow::Result<()> {
    let metadata = probe_metadata(&input)
        .await
        .with_context(|| format!("Failed to probe {}", input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    let source = SourceFile::from_path(&input);
    println!("Video: {}", source.name);
    println!("  Duration: {:.3}s", metadata.duration_secs);
    println!(
        "  Resolution: {}x{}",
        metadata.pixel_width, metadata.pixel_height
    );
    Ok(())
}
