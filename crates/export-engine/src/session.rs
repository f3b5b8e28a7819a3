//! Editing session: one loaded source plus its crop, trim, and export state.

use std::fmt;

use snipframe_common::config::ExportDefaults;
use snipframe_common::error::SnipResult;
use snipframe_edit_model::{
    crop_to_display, normalize_pointer, CropPhase, CropRect, CropSelector, DisplayRect,
    OutputArtifact, Point2D, PointerButton, SourceFile, TrimRange, TrimRangeController,
    VideoMetadata,
};

use crate::backend::{ExportBackend, RenderedClip};
use crate::pipeline::{ExportPipeline, ExportRequest};

/// User-facing status, updated at each phase transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing loaded yet.
    Idle,
    /// Source picked; waiting for metadata.
    Loading,
    Ready,
    Exporting,
    Done,
    Error(String),
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("No video loaded"),
            Self::Loading => f.write_str("Loading video..."),
            Self::Ready => f.write_str("Ready"),
            Self::Exporting => f.write_str("Exporting..."),
            Self::Done => f.write_str("Export complete"),
            Self::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// Owns everything tied to the currently loaded source.
pub struct EditSession {
    source: Option<SourceFile>,
    metadata: Option<VideoMetadata>,
    crop: CropSelector,
    trim: TrimRangeController,
    pipeline: ExportPipeline,
    status: SessionStatus,
}

impl EditSession {
    pub fn new(settings: ExportDefaults) -> Self {
        Self {
            source: None,
            metadata: None,
            crop: CropSelector::new(settings.min_crop_px),
            trim: TrimRangeController::new(),
            pipeline: ExportPipeline::new(settings),
            status: SessionStatus::Idle,
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }

    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_ref()
    }

    pub fn pipeline(&self) -> &ExportPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut ExportPipeline {
        &mut self.pipeline
    }

    /// Latest exported clip, if any.
    pub fn artifact(&self) -> Option<&OutputArtifact> {
        self.pipeline.artifact()
    }

    /// Swap in a new source. Crop and trim are cleared until metadata arrives.
    pub fn load_source(&mut self, source: SourceFile) {
        tracing::info!(name = %source.name, "Loading source");
        self.source = Some(source);
        self.metadata = None;
        self.crop.reset_for(None);
        self.trim.clear();
        self.status = SessionStatus::Loading;
    }

    /// Metadata-ready callback for the current source.
    pub fn on_metadata(&mut self, metadata: VideoMetadata) {
        tracing::info!(
            duration_secs = metadata.duration_secs,
            width = metadata.pixel_width,
            height = metadata.pixel_height,
            "Source metadata ready"
        );
        self.metadata = Some(metadata);
        self.crop.reset_for(Some(&metadata));
        self.trim.reset_for(&metadata);
        self.status = SessionStatus::Ready;
    }

    // --- crop ---

    pub fn crop_phase(&self) -> CropPhase {
        self.crop.phase()
    }

    pub fn committed_crop(&self) -> Option<CropRect> {
        self.crop.committed()
    }

    pub fn provisional_crop(&self) -> Option<CropRect> {
        self.crop.provisional()
    }

    /// Overlay rectangle for the current selection, in display coordinates.
    pub fn crop_overlay(&self, bounds: &DisplayRect) -> Option<DisplayRect> {
        let rect = self.crop.provisional().or(self.crop.committed())?;
        crop_to_display(&rect, bounds, self.metadata.as_ref()?)
    }

    /// Pointer pressed over the video surface. Returns whether it started a drag.
    pub fn pointer_down(
        &mut self,
        pointer: Point2D,
        button: PointerButton,
        bounds: &DisplayRect,
    ) -> bool {
        match normalize_pointer(pointer, bounds, self.metadata.as_ref()) {
            Some(point) => self.crop.begin(point, button),
            None => false,
        }
    }

    pub fn pointer_move(&mut self, pointer: Point2D, bounds: &DisplayRect) -> Option<CropRect> {
        let point = normalize_pointer(pointer, bounds, self.metadata.as_ref())?;
        self.crop.update(point)
    }

    pub fn pointer_up(&mut self) -> Option<CropRect> {
        self.crop.end()
    }

    pub fn clear_crop(&mut self) {
        self.crop.reset();
    }

    /// Numeric crop entry.
    pub fn set_crop(&mut self, rect: CropRect) -> SnipResult<Option<CropRect>> {
        self.crop.commit_exact(rect)
    }

    // --- trim ---

    pub fn trim(&self) -> TrimRange {
        self.trim.range()
    }

    pub fn set_trim_start(&mut self, value: f64) -> TrimRange {
        self.trim.set_start(value)
    }

    pub fn set_trim_end(&mut self, value: f64) -> TrimRange {
        self.trim.set_end(value)
    }

    pub fn use_current_as_start(&mut self, position_secs: f64) -> TrimRange {
        self.trim.use_current_as_start(position_secs)
    }

    pub fn use_current_as_end(&mut self, position_secs: f64) -> TrimRange {
        self.trim.use_current_as_end(position_secs)
    }

    // --- export ---

    /// Snapshot of the editing state the pipeline validates.
    pub fn export_request(&self) -> ExportRequest {
        ExportRequest {
            source: self.source.clone(),
            metadata: self.metadata,
            trim: self.trim.range(),
            crop: self.crop.committed(),
        }
    }

    /// Export the current selection. Edits are locked out for the duration
    /// of the run by the exclusive borrow.
    pub async fn export(&mut self, backend: &mut dyn ExportBackend) -> SnipResult<RenderedClip> {
        let request = self.export_request();
        if let Err(e) = self.pipeline.prepare(&request, &*backend) {
            tracing::warn!(error = %e, "Export rejected");
            self.status = SessionStatus::Error(e.to_string());
            return Err(e);
        }

        self.status = SessionStatus::Exporting;
        let result = self.pipeline.run(&request, backend).await;
        self.status = match &result {
            Ok(_) => SessionStatus::Done,
            Err(e) => SessionStatus::Error(e.to_string()),
        };
        result
    }
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new(ExportDefaults::default())
    }
}
