//! Export a trimmed, optionally cropped clip.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;
use snipframe_common::config::AppConfig;
use snipframe_edit_model::{CropRect, SourceFile};
use snipframe_export_engine::backend::ffmpeg::{probe_metadata, OutputFormat};
use snipframe_export_engine::{EditSession, ExportProgress, FfmpegBackend};

/// Parse `X,Y,W,H` into a crop rectangle.
pub fn parse_crop(value: &str) -> Result<CropRect, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected X,Y,W,H, got '{value}'"));
    }
    let mut nums = [0u32; 4];
    for (slot, part) in nums.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("'{part}' is not a non-negative integer"))?;
    }
    Ok(CropRect::new(nums[0], nums[1], nums[2], nums[3]))
}

pub async fn run(
    config: &AppConfig,
    input: PathBuf,
    start: f64,
    end: f64,
    crop: Option<CropRect>,
    output: Option<PathBuf>,
    format: Option<OutputFormat>,
) -> anyhow::Result<()> {
    println!("Exporting: {}", input.display());

    let metadata = probe_metadata(&input)
        .await
        .with_context(|| format!("Failed to probe {}", input.display()))?;

    let mut session = EditSession::new(config.export.clone());
    session.load_source(SourceFile::from_path(&input));
    session.on_metadata(metadata);

    session.set_trim_start(start);
    let trim = session.set_trim_end(end);
    if trim.start != start || trim.end != end {
        tracing::warn!(
            requested_start = start,
            requested_end = end,
            start = trim.start,
            end = trim.end,
            "Trim range clamped to the source"
        );
    }
    println!("  Trim: {:.3}s -> {:.3}s", trim.start, trim.end);

    if let Some(rect) = crop {
        match session.set_crop(rect)? {
            Some(rect) => println!(
                "  Crop: {}x{} at ({}, {})",
                rect.width, rect.height, rect.x, rect.y
            ),
            None => println!(
                "  Crop: {}x{} is too small; exporting full frame",
                rect.width, rect.height
            ),
        }
    }

    let mut backend = FfmpegBackend::new(&input);
    if let Some(format) = format {
        backend = backend.with_format(format);
    }

    let cancel = session.pipeline().cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    session
        .pipeline_mut()
        .set_progress_callback(Arc::new(|p: ExportProgress| {
            print!(
                "\r  Progress: {:.1}% ({} frames, {:.1}s)  ",
                p.progress * 100.0,
                p.frames_drawn,
                p.elapsed_secs,
            );
            let _ = std::io::stdout().flush();
        }));

    let clip = match session.export(&mut backend).await {
        Ok(clip) => clip,
        Err(e) => {
            println!("\n{}", session.status());
            return Err(e.into());
        }
    };

    let output_path =
        output.unwrap_or_else(|| config.output_dir.join(clip.artifact.suggested_file_name()));
    clip.artifact
        .write_to(&output_path)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    println!("\n{}: {}", session.status(), output_path.display());
    println!(
        "  {} bytes, {}",
        clip.artifact.len(),
        clip.artifact.mime_type()
    );
    Ok(())
}
