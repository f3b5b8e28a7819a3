//! File-based export through an ffmpeg subprocess.
//!
//! Used where no live playback host exists (the CLI). Seeks with `-ss`,
//! limits with `-t`, crops with the `crop` filter, and reports progress from
//! `-progress pipe:1`. The resulting file is read back into an
//! [`OutputArtifact`] so callers see the same result shape as a real-time run.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use snipframe_common::clock::RateController;
use snipframe_common::error::{SnipError, SnipResult};
use snipframe_edit_model::{suggested_file_name, OutputArtifact, VideoMetadata};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::backend::{
    ExportBackend, ExportJob, ExportProgress, ExportStage, ExportStats, RenderedClip, RunControl,
    StopReason,
};
use crate::codec::{negotiate, CodecSupport};

/// How often the cancel flag is polled while ffmpeg runs.
const CANCEL_POLL: Duration = Duration::from_millis(250);

/// Warn when ffmpeg's reported position has not moved for this long.
const STALL_WARN: Duration = Duration::from_secs(10);

/// Container formats the ffmpeg backend can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// VP9 + Opus in WebM.
    Webm,
    /// H.264 + AAC in MP4.
    Mp4,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Webm => "video/webm;codecs=vp9,opus",
            Self::Mp4 => "video/mp4;codecs=avc1,mp4a",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::Mp4 => "mp4",
        }
    }

    /// Format for a negotiated MIME type; anything not MP4 is written as WebM.
    pub fn from_mime_type(mime_type: &str) -> Self {
        if mime_type.trim_start().starts_with("video/mp4") {
            Self::Mp4
        } else {
            Self::Webm
        }
    }
}

/// Exports a trimmed, cropped copy of a local file with ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    input: PathBuf,
    format: Option<OutputFormat>,
}

impl FfmpegBackend {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            format: None,
        }
    }

    /// Force an output format instead of negotiating from preferences.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    fn resolve_format(&self, preferences: &[String]) -> (OutputFormat, String) {
        match self.format {
            Some(format) => (format, format.mime_type().to_string()),
            None => {
                let codec = negotiate(preferences, self);
                (OutputFormat::from_mime_type(&codec.mime_type), codec.mime_type)
            }
        }
    }

    async fn run(
        &self,
        job: &ExportJob,
        control: &RunControl,
        output: &Path,
        format: OutputFormat,
    ) -> SnipResult<()> {
        let args = build_ffmpeg_args(job, &self.input, output, format);
        tracing::debug!(args = ?args, "Running ffmpeg");

        let started = tokio::time::Instant::now();
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SnipError::runtime(format!("failed to start ffmpeg: {e}")))?;

        tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SnipError::runtime("failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SnipError::runtime("failed to capture ffmpeg stderr"))?;

        // ffmpeg blocks once its stderr pipe fills up.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut poll = tokio::time::interval(CANCEL_POLL);
        let mut state = ProgressState::default();
        let mut progress_rate = RateController::new(job.settings.progress_hz);
        let mut last_advance_secs = 0.0f64;
        let mut last_advance_at = tokio::time::Instant::now();
        let length = job.length_secs();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = line
                        .map_err(|e| SnipError::runtime(format!("failed reading ffmpeg progress: {e}")))?;
                    let Some(line) = line else { break };
                    let Some((key, value)) = line.trim().split_once('=') else { continue };
                    state.update(key, value);
                    if key != "progress" {
                        continue;
                    }
                    if state.out_time_secs > last_advance_secs + 0.001 {
                        last_advance_secs = state.out_time_secs;
                        last_advance_at = tokio::time::Instant::now();
                    }
                    let elapsed = started.elapsed();
                    if should_report(&mut progress_rate, &state, elapsed) {
                        control.report(progress_report(&state, length, job.settings.fps, elapsed.as_secs_f64()));
                    }
                }
                _ = poll.tick() => {
                    if control.is_cancelled() {
                        tracing::info!("Export cancelled; stopping ffmpeg");
                        if let Err(e) = child.kill().await {
                            tracing::warn!(error = %e, "Failed to kill ffmpeg");
                        }
                        return Err(SnipError::runtime("export cancelled"));
                    }
                    if last_advance_at.elapsed() >= STALL_WARN {
                        tracing::warn!(
                            out_time_secs = state.out_time_secs,
                            elapsed_secs = started.elapsed().as_secs_f64(),
                            "No ffmpeg progress advancement for 10s"
                        );
                        last_advance_at = tokio::time::Instant::now();
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| SnipError::runtime(format!("failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(SnipError::runtime(format!(
                "ffmpeg export failed (status {}): {}",
                status,
                stderr_output.trim()
            )));
        }
        Ok(())
    }
}

impl CodecSupport for FfmpegBackend {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        let container = mime_type.split(';').next().unwrap_or_default().trim();
        matches!(container, "video/webm" | "video/mp4")
    }
}

#[async_trait::async_trait]
impl ExportBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn check_support(&self) -> SnipResult<()> {
        if !command_exists("ffmpeg") {
            return Err(SnipError::precondition(
                "ffmpeg not found in PATH; install ffmpeg to export",
            ));
        }
        if !self.input.exists() {
            return Err(SnipError::precondition(format!(
                "input file not found: {}",
                self.input.display()
            )));
        }
        Ok(())
    }

    async fn render(&mut self, job: &ExportJob, control: &RunControl) -> SnipResult<RenderedClip> {
        control.report_stage(ExportStage::Preparing, 0.0);
        let (format, mime_type) = self.resolve_format(&job.settings.codec_preferences);
        let output = temp_output_path(format);

        let result = self.run(job, control, &output, format).await;
        let bytes = match result {
            Ok(()) => tokio::fs::read(&output).await.map_err(SnipError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = tokio::fs::remove_file(&output).await {
            tracing::debug!(path = %output.display(), error = %e, "Temp output not removed");
        }

        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                control.report_stage(ExportStage::Failed, 0.0);
                return Err(e);
            }
        };
        if bytes.is_empty() {
            control.report_stage(ExportStage::Failed, 0.0);
            return Err(SnipError::EmptyResult);
        }

        control.report_stage(ExportStage::Complete, 1.0);
        let file_name = suggested_file_name(&job.source, format.extension());
        Ok(RenderedClip {
            artifact: OutputArtifact::new(bytes, mime_type, file_name),
            stats: ExportStats {
                frames_drawn: (job.length_secs() * job.settings.fps as f64).round() as u64,
                chunks_received: 1,
                captured_secs: job.length_secs(),
                stop_reason: StopReason::EncoderFinished,
                drift_ms: None,
            },
        })
    }
}

/// Full ffmpeg argument list for one job.
pub fn build_ffmpeg_args(
    job: &ExportJob,
    input: &Path,
    output: &Path,
    format: OutputFormat,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-y".into(),
        "-ss".into(),
        format!("{:.3}", job.trim.start),
        "-i".into(),
        input.display().to_string(),
        "-t".into(),
        format!("{:.3}", job.length_secs()),
    ];

    let mut filters = Vec::new();
    if let Some(crop) = job.crop {
        filters.push(format!(
            "crop={}:{}:{}:{}",
            crop.width, crop.height, crop.x, crop.y
        ));
    }
    if format == OutputFormat::Mp4 {
        // yuv420p needs even dimensions.
        filters.push("scale=trunc(iw/2)*2:trunc(ih/2)*2".into());
    }
    if !filters.is_empty() {
        args.push("-vf".into());
        args.push(filters.join(","));
    }

    args.push("-r".into());
    args.push(job.settings.fps.to_string());
    args.extend(codec_args(format));
    args.extend([
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
    ]);
    args.push(output.display().to_string());
    args
}

fn codec_args(format: OutputFormat) -> Vec<String> {
    let args: &[&str] = match format {
        OutputFormat::Webm => &[
            "-c:v",
            "libvpx-vp9",
            "-b:v",
            "0",
            "-crf",
            "32",
            "-c:a",
            "libopus",
            "-b:a",
            "128k",
        ],
        OutputFormat::Mp4 => &[
            "-c:v",
            "libx264",
            "-preset",
            "medium",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-b:a",
            "160k",
            "-movflags",
            "+faststart",
        ],
    };
    args.iter().map(|s| s.to_string()).collect()
}

fn temp_output_path(format: OutputFormat) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
    std::env::temp_dir().join(format!(
        "snipframe-{}-{stamp}.{}",
        std::process::id(),
        format.extension()
    ))
}

/// Whether `binary` resolves on PATH.
pub fn command_exists(binary: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Read duration and native dimensions of a local file with ffprobe.
pub async fn probe_metadata(path: &Path) -> SnipResult<VideoMetadata> {
    if !path.exists() {
        return Err(SnipError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| SnipError::runtime(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(SnipError::runtime(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(raw: &[u8]) -> SnipResult<VideoMetadata> {
    let probe: ProbeOutput = serde_json::from_slice(raw)?;
    let stream = probe
        .streams
        .first()
        .ok_or_else(|| SnipError::unsupported("no video stream found"))?;
    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| SnipError::unsupported("source duration is unknown"))?;

    VideoMetadata::new(
        duration,
        stream.width.unwrap_or(0),
        stream.height.unwrap_or(0),
    )
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both names.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

/// Throttle to `progress_hz`; the final `progress=end` block always goes out.
fn should_report(rate: &mut RateController, state: &ProgressState, elapsed: Duration) -> bool {
    let due = rate.should_tick(elapsed.as_nanos() as u64);
    due || state.complete
}

fn progress_report(
    state: &ProgressState,
    length_secs: f64,
    fps: u32,
    elapsed_secs: f64,
) -> ExportProgress {
    let progress = if length_secs <= 0.0 {
        0.0
    } else {
        (state.out_time_secs / length_secs).clamp(0.0, 1.0)
    };

    ExportProgress {
        progress: if state.complete { 1.0 } else { progress },
        frames_drawn: (state.out_time_secs.max(0.0) * fps as f64).round() as u64,
        elapsed_secs,
        stage: if state.complete {
            ExportStage::Finalizing
        } else {
            ExportStage::Rendering
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snipframe_common::config::ExportDefaults;
    use snipframe_edit_model::{CropRect, SourceFile, TrimRange};

    fn job(crop: Option<CropRect>) -> ExportJob {
        ExportJob {
            source: SourceFile::named("talk.mp4"),
            metadata: VideoMetadata::new(10.0, 1280, 720).unwrap(),
            trim: TrimRange { start: 1.5, end: 4.0 },
            crop,
            settings: ExportDefaults::default(),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_args_seek_and_duration() {
        let args = build_ffmpeg_args(
            &job(None),
            Path::new("in.mp4"),
            Path::new("out.webm"),
            OutputFormat::Webm,
        );
        assert_eq!(value_after(&args, "-ss"), Some("1.500"));
        assert_eq!(value_after(&args, "-t"), Some("2.500"));
        assert_eq!(value_after(&args, "-c:v"), Some("libvpx-vp9"));
        assert!(!args.iter().any(|a| a == "-vf"));
        assert_eq!(args.last().map(String::as_str), Some("out.webm"));
    }

    #[test]
    fn test_args_crop_filter() {
        let args = build_ffmpeg_args(
            &job(Some(CropRect::new(10, 20, 100, 50))),
            Path::new("in.mp4"),
            Path::new("out.webm"),
            OutputFormat::Webm,
        );
        assert_eq!(value_after(&args, "-vf"), Some("crop=100:50:10:20"));
    }

    #[test]
    fn test_args_mp4_forces_even_dimensions() {
        let args = build_ffmpeg_args(
            &job(Some(CropRect::new(0, 0, 101, 51))),
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            OutputFormat::Mp4,
        );
        let vf = value_after(&args, "-vf").unwrap();
        assert!(vf.starts_with("crop=101:51:0:0,"));
        assert!(vf.contains("scale=trunc(iw/2)*2"));
        assert_eq!(value_after(&args, "-pix_fmt"), Some("yuv420p"));
    }

    #[test]
    fn test_negotiated_format_uses_preferences() {
        let backend = FfmpegBackend::new("in.mp4");
        let prefs = vec!["video/x-matroska".to_string(), "video/mp4".to_string()];
        let (format, mime) = backend.resolve_format(&prefs);
        assert_eq!(format, OutputFormat::Mp4);
        assert_eq!(mime, "video/mp4");

        let forced = FfmpegBackend::new("in.mp4").with_format(OutputFormat::Webm);
        assert_eq!(forced.resolve_format(&prefs).0, OutputFormat::Webm);
    }

    #[test]
    fn test_progress_state_parses_microseconds() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "1250000");
        state.update("progress", "continue");
        let report = progress_report(&state, 2.5, 30, 0.4);
        assert!((report.progress - 0.5).abs() < 1e-9);
        assert_eq!(report.frames_drawn, 38);
        assert_eq!(report.stage, ExportStage::Rendering);

        state.update("progress", "end");
        let report = progress_report(&state, 2.5, 30, 0.9);
        assert_eq!(report.progress, 1.0);
        assert_eq!(report.stage, ExportStage::Finalizing);
    }

    #[test]
    fn test_progress_reports_are_rate_limited() {
        // ffmpeg emits a progress block roughly every 100ms.
        let mut rate = RateController::new(ExportDefaults::default().progress_hz);
        let mut state = ProgressState::default();
        let forwarded = (0..10u64)
            .filter(|i| {
                state.update("out_time_us", &(i * 100_000).to_string());
                should_report(&mut rate, &state, Duration::from_millis(i * 100))
            })
            .count();
        // 0ms, 300ms, 600ms, 900ms at 4 Hz.
        assert_eq!(forwarded, 4);

        state.update("progress", "end");
        assert!(should_report(&mut rate, &state, Duration::from_millis(950)));
    }

    #[test]
    fn test_parse_probe_output() {
        let raw = br#"{"streams":[{"width":1920,"height":1080}],"format":{"duration":"12.480000"}}"#;
        let meta = parse_probe_output(raw).unwrap();
        assert_eq!(meta.dimensions(), (1920, 1080));
        assert!((meta.duration_secs - 12.48).abs() < 1e-9);
    }

    #[test]
    fn test_parse_probe_output_without_video() {
        let raw = br#"{"streams":[],"format":{"duration":"3.0"}}"#;
        assert!(parse_probe_output(raw).unwrap_err().is_precondition());
    }
}
