//! Export pipeline state machine.
//!
//! `Idle -> Exporting -> {Done | Error}`. Terminal states re-arm on the next
//! accepted request. Requests that fail a precondition never leave the
//! current state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use snipframe_common::config::ExportDefaults;
use snipframe_common::error::{SnipError, SnipResult};
use snipframe_edit_model::{CropRect, OutputArtifact, SourceFile, TrimRange, VideoMetadata};

use crate::backend::{ExportBackend, ExportJob, ProgressCallback, RenderedClip, RunControl};

/// State of the export pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    /// No run has been attempted yet.
    Idle,
    /// A run is in flight.
    Exporting,
    /// The last run produced an artifact.
    Done,
    /// The last run was aborted.
    Error,
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Exporting => "exporting",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Everything an export needs from the editing state.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub source: Option<SourceFile>,
    pub metadata: Option<VideoMetadata>,
    pub trim: TrimRange,
    pub crop: Option<CropRect>,
}

/// Owns the export state and the latest artifact.
pub struct ExportPipeline {
    state: ExportState,
    settings: ExportDefaults,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
    artifact: Option<OutputArtifact>,
    last_error: Option<String>,
}

impl ExportPipeline {
    pub fn new(settings: ExportDefaults) -> Self {
        Self {
            state: ExportState::Idle,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
            artifact: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn settings(&self) -> &ExportDefaults {
        &self.settings
    }

    /// Artifact of the most recent successful run.
    pub fn artifact(&self) -> Option<&OutputArtifact> {
        self.artifact.as_ref()
    }

    /// Message of the most recent failed run.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Setting the returned flag aborts the current run at its next tick.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    /// Check every precondition and build the job. Does not change state.
    pub fn prepare(
        &self,
        request: &ExportRequest,
        backend: &dyn ExportBackend,
    ) -> SnipResult<ExportJob> {
        if self.state == ExportState::Exporting {
            return Err(SnipError::precondition("an export is already in progress"));
        }
        let source = request
            .source
            .as_ref()
            .ok_or_else(|| SnipError::precondition("no source loaded"))?;
        let metadata = request
            .metadata
            .ok_or_else(|| SnipError::precondition("source metadata not available yet"))?;
        if !(metadata.duration_secs.is_finite() && metadata.duration_secs > 0.0) {
            return Err(SnipError::precondition("source duration is unknown"));
        }
        if metadata.pixel_width == 0 || metadata.pixel_height == 0 {
            return Err(SnipError::precondition("source dimensions are unknown"));
        }
        if !request.trim.is_exportable() {
            return Err(SnipError::precondition(format!(
                "trim end ({:.3}s) must be after start ({:.3}s)",
                request.trim.end, request.trim.start
            )));
        }
        if let Some(crop) = request.crop {
            if !crop.fits_within(metadata.pixel_width, metadata.pixel_height) {
                return Err(SnipError::precondition(format!(
                    "crop {}x{}+{}+{} exceeds the {}x{} frame",
                    crop.width,
                    crop.height,
                    crop.x,
                    crop.y,
                    metadata.pixel_width,
                    metadata.pixel_height
                )));
            }
        }
        self.settings.validate()?;
        backend.check_support()?;

        Ok(ExportJob {
            source: source.clone(),
            metadata,
            trim: request.trim,
            crop: request.crop,
            settings: self.settings.clone(),
        })
    }

    /// Validate `request` and run it on `backend`.
    ///
    /// Precondition failures return without a state change. Anything after
    /// that ends in `Done` or `Error`.
    pub async fn run(
        &mut self,
        request: &ExportRequest,
        backend: &mut dyn ExportBackend,
    ) -> SnipResult<RenderedClip> {
        let job = self.prepare(request, &*backend)?;

        self.cancel.store(false, Ordering::SeqCst);
        self.state = ExportState::Exporting;
        self.last_error = None;
        tracing::info!(
            backend = backend.name(),
            source = %job.source.name,
            start = job.trim.start,
            end = job.trim.end,
            crop = ?job.crop,
            "Export started"
        );

        let control = RunControl::new(Arc::clone(&self.cancel), self.progress.clone());
        match backend.render(&job, &control).await {
            Ok(clip) => {
                if let Some(previous) = self.artifact.take() {
                    tracing::debug!(bytes = previous.len(), "Releasing previous artifact");
                }
                tracing::info!(
                    bytes = clip.artifact.len(),
                    mime_type = clip.artifact.mime_type(),
                    frames = clip.stats.frames_drawn,
                    stop_reason = ?clip.stats.stop_reason,
                    "Export finished"
                );
                self.artifact = Some(clip.artifact.clone());
                self.state = ExportState::Done;
                Ok(clip)
            }
            Err(e) => {
                tracing::error!(error = %e, "Export failed");
                self.state = ExportState::Error;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

impl Default for ExportPipeline {
    fn default() -> Self {
        Self::new(ExportDefaults::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ExportStats, StopReason};

    /// Backend that returns a canned result without touching any host.
    struct ScriptedBackend {
        supported: bool,
        outcome: fn() -> SnipResult<Vec<u8>>,
        renders: usize,
    }

    impl ScriptedBackend {
        fn ok() -> Self {
            Self {
                supported: true,
                outcome: || Ok(vec![1, 2, 3]),
                renders: 0,
            }
        }

        fn failing() -> Self {
            Self {
                supported: true,
                outcome: || Err(SnipError::runtime("recorder error: boom")),
                renders: 0,
            }
        }
    }

    #[async_trait::async_trait]
    impl ExportBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn check_support(&self) -> SnipResult<()> {
            if self.supported {
                Ok(())
            } else {
                Err(SnipError::precondition("no surface capture"))
            }
        }

        async fn render(&mut self, job: &ExportJob, _control: &RunControl) -> SnipResult<RenderedClip> {
            self.renders += 1;
            let bytes = (self.outcome)()?;
            Ok(RenderedClip {
                artifact: OutputArtifact::new(bytes, "video/webm", format!("{}_trimmed.webm", job.source.stem())),
                stats: ExportStats {
                    frames_drawn: 1,
                    chunks_received: 1,
                    captured_secs: job.length_secs(),
                    stop_reason: StopReason::ReachedEnd,
                    drift_ms: None,
                },
            })
        }
    }

    fn request() -> ExportRequest {
        ExportRequest {
            source: Some(SourceFile::named("clip.mp4")),
            metadata: Some(VideoMetadata::new(10.0, 640, 360).unwrap()),
            trim: TrimRange { start: 1.0, end: 4.0 },
            crop: None,
        }
    }

    #[tokio::test]
    async fn test_successful_run_reaches_done() {
        let mut pipeline = ExportPipeline::default();
        let mut backend = ScriptedBackend::ok();
        let clip = pipeline.run(&request(), &mut backend).await.unwrap();
        assert_eq!(clip.artifact.suggested_file_name(), "clip_trimmed.webm");
        assert_eq!(pipeline.state(), ExportState::Done);
        assert_eq!(pipeline.artifact().map(|a| a.len()), Some(3));
    }

    #[tokio::test]
    async fn test_equal_start_end_rejected_without_transition() {
        let mut pipeline = ExportPipeline::default();
        let mut backend = ScriptedBackend::ok();
        let mut req = request();
        req.trim = TrimRange { start: 2.0, end: 2.0 };
        let err = pipeline.run(&req, &mut backend).await.unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(pipeline.state(), ExportState::Idle);
        assert_eq!(backend.renders, 0);
    }

    #[tokio::test]
    async fn test_missing_source_and_metadata_rejected() {
        let pipeline = ExportPipeline::default();
        let backend = ScriptedBackend::ok();

        let mut req = request();
        req.source = None;
        assert!(pipeline.prepare(&req, &backend).unwrap_err().is_precondition());

        let mut req = request();
        req.metadata = None;
        assert!(pipeline.prepare(&req, &backend).unwrap_err().is_precondition());
    }

    #[tokio::test]
    async fn test_unsupported_host_rejected() {
        let mut pipeline = ExportPipeline::default();
        let mut backend = ScriptedBackend {
            supported: false,
            ..ScriptedBackend::ok()
        };
        let err = pipeline.run(&request(), &mut backend).await.unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(pipeline.state(), ExportState::Idle);
    }

    #[test]
    fn test_crop_outside_frame_rejected() {
        let pipeline = ExportPipeline::default();
        let mut req = request();
        req.crop = Some(CropRect::new(600, 0, 100, 50));
        let err = pipeline.prepare(&req, &ScriptedBackend::ok()).unwrap_err();
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn test_error_then_reentry() {
        let mut pipeline = ExportPipeline::default();
        let mut failing = ScriptedBackend::failing();
        assert!(pipeline.run(&request(), &mut failing).await.is_err());
        assert_eq!(pipeline.state(), ExportState::Error);
        assert!(pipeline.last_error().unwrap().contains("boom"));

        let mut backend = ScriptedBackend::ok();
        pipeline.run(&request(), &mut backend).await.unwrap();
        assert_eq!(pipeline.state(), ExportState::Done);
        assert!(pipeline.last_error().is_none());
    }

    #[tokio::test]
    async fn test_failed_run_keeps_previous_artifact() {
        let mut pipeline = ExportPipeline::default();
        pipeline.run(&request(), &mut ScriptedBackend::ok()).await.unwrap();
        let _ = pipeline.run(&request(), &mut ScriptedBackend::failing()).await;
        assert_eq!(pipeline.state(), ExportState::Error);
        assert!(pipeline.artifact().is_some());
    }

    #[tokio::test]
    async fn test_run_clears_stale_cancel_flag() {
        let mut pipeline = ExportPipeline::default();
        pipeline.cancel_handle().store(true, Ordering::SeqCst);
        pipeline.run(&request(), &mut ScriptedBackend::ok()).await.unwrap();
        assert!(!pipeline.cancel_handle().load(Ordering::SeqCst));
    }
}
