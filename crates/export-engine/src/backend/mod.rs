use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snipframe_common::config::ExportDefaults;
use snipframe_common::error::SnipResult;
use snipframe_edit_model::{CropRect, OutputArtifact, SourceFile, TrimRange, VideoMetadata};

pub mod ffmpeg;
pub mod realtime;

pub use ffmpeg::FfmpegBackend;
pub use realtime::RealtimeBackend;

/// A validated export, handed to a backend.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub source: SourceFile,
    pub metadata: VideoMetadata,
    pub trim: TrimRange,
    /// Committed crop; `None` exports the full frame.
    pub crop: Option<CropRect>,
    pub settings: ExportDefaults,
}

impl ExportJob {
    /// Output frame size: the crop size, or the native size without a crop.
    pub fn output_dimensions(&self) -> (u32, u32) {
        match self.crop {
            Some(crop) => (crop.width, crop.height),
            None => self.metadata.dimensions(),
        }
    }

    pub fn length_secs(&self) -> f64 {
        self.trim.length()
    }
}

/// Why capture stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Playback reached the trim end.
    ReachedEnd,
    /// Wall clock passed trim length plus grace before playback got there.
    SafetyTimeout,
    /// The encoder ran to completion on its own.
    EncoderFinished,
}

/// Measurements from one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportStats {
    pub frames_drawn: u64,
    pub chunks_received: usize,
    /// Seconds of source covered by the capture.
    pub captured_secs: f64,
    pub stop_reason: StopReason,
    /// Playback clock minus wall clock at stop, when measured.
    pub drift_ms: Option<f64>,
}

/// Output of a successful backend run.
#[derive(Debug, Clone)]
pub struct RenderedClip {
    pub artifact: OutputArtifact,
    pub stats: ExportStats,
}

/// Stages reported through progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportStage {
    Preparing,
    Seeking,
    Rendering,
    Finalizing,
    Complete,
    Failed,
}

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    pub frames_drawn: u64,

    /// Wall-clock seconds since rendering began.
    pub elapsed_secs: f64,

    pub stage: ExportStage,
}

/// Progress callback for export runs; shared so a pipeline can hand it to every run.
pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Per-run cancellation and progress plumbing shared with a backend.
pub struct RunControl {
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
}

impl RunControl {
    pub fn new(cancel: Arc<AtomicBool>, progress: Option<ProgressCallback>) -> Self {
        Self { cancel, progress }
    }

    /// Control with no cancel source and no progress sink.
    pub fn detached() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)), None)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn report(&self, progress: ExportProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }

    pub(crate) fn report_stage(&self, stage: ExportStage, progress: f64) {
        self.report(ExportProgress {
            progress,
            frames_drawn: 0,
            elapsed_secs: 0.0,
            stage,
        });
    }
}

/// Something that turns an [`ExportJob`] into an [`OutputArtifact`].
#[async_trait::async_trait]
pub trait ExportBackend: Send {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Fail with a precondition error when the host cannot export at all.
    fn check_support(&self) -> SnipResult<()>;

    /// Produce the clip. On error the backend has already restored every
    /// collaborator it touched.
    async fn render(&mut self, job: &ExportJob, control: &RunControl) -> SnipResult<RenderedClip>;
}
