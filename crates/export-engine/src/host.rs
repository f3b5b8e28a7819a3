//! Contracts for the host collaborators the real-time export drives.
//!
//! A host (browser shell, native player, or a test double) provides the
//! playback element, an off-screen drawing surface that can be captured as a
//! stream, a push-based stream recorder, and a display-refresh tick source.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use snipframe_common::config::ExportDefaults;
use snipframe_common::error::SnipResult;
use snipframe_edit_model::CropRect;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

use crate::codec::CodecSupport;

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Opaque handle to one track inside a host stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

impl MediaTrack {
    pub fn video(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Video,
        }
    }

    pub fn audio(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Audio,
        }
    }
}

/// A set of live tracks that can be handed to a recorder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    pub fn has_audio(&self) -> bool {
        self.audio_tracks().next().is_some()
    }

    /// Video tracks of `video` plus the given audio tracks.
    pub fn compose(video: &MediaStream, audio: impl IntoIterator<Item = MediaTrack>) -> Self {
        let mut tracks: Vec<MediaTrack> = video.video_tracks().cloned().collect();
        tracks.extend(audio.into_iter().filter(|t| t.kind == TrackKind::Audio));
        Self { tracks }
    }
}

/// What the host can do at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// Drawing surfaces can be captured as a continuous stream.
    pub surface_capture: bool,
    /// Streams can be recorded into encoded chunks.
    pub stream_recording: bool,
}

/// One frame draw: copy `source` (native pixels) into the whole surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    pub source: CropRect,
    pub dest_width: u32,
    pub dest_height: u32,
}

impl DrawCommand {
    /// Draw the full native frame untransformed.
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            source: CropRect::new(0, 0, width, height),
            dest_width: width,
            dest_height: height,
        }
    }

    /// Draw `crop` scaled to fill a surface of the crop's own size.
    pub fn cropped(crop: CropRect) -> Self {
        Self {
            source: crop,
            dest_width: crop.width,
            dest_height: crop.height,
        }
    }

    /// Whether the draw copies pixels 1:1.
    pub fn is_identity(&self) -> bool {
        self.source.x == 0
            && self.source.y == 0
            && self.source.width == self.dest_width
            && self.source.height == self.dest_height
    }
}

/// The source playback element.
#[async_trait::async_trait]
pub trait MediaElement: Send {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    fn is_muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    /// Seek and wait until the decoder confirms the new position.
    async fn seek(&mut self, position_secs: f64) -> SnipResult<()>;

    /// Start playback; resolves once playback is running.
    async fn play(&mut self) -> SnipResult<()>;

    fn pause(&mut self);

    /// Audio tracks of the source, if the host can expose them.
    fn capture_audio_tracks(&mut self) -> SnipResult<Vec<MediaTrack>>;

    /// Playback error raised since the last call, if any.
    fn take_error(&mut self) -> Option<String>;
}

/// Off-screen drawing surface.
pub trait RenderSurface: Send {
    /// Fixed `(width, height)` of the surface.
    fn dimensions(&self) -> (u32, u32);

    /// Continuous capture of the surface at `fps`.
    fn capture_stream(&mut self, fps: u32) -> SnipResult<MediaStream>;

    /// Draw the element's current frame.
    fn draw_frame(&mut self, media: &dyn MediaElement, command: &DrawCommand) -> SnipResult<()>;
}

/// Events pushed by a recorder after `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// An encoded chunk.
    Data(Vec<u8>),
    /// The recorder failed; no stop acknowledgment follows.
    Error(String),
    /// Stop acknowledged; no further data follows.
    Stopped,
}

pub type RecorderEventSender = mpsc::UnboundedSender<RecorderEvent>;
pub type RecorderEventReceiver = mpsc::UnboundedReceiver<RecorderEvent>;

/// Push-based stream recorder.
pub trait StreamRecorder: Send {
    /// Begin recording `stream`. Data, errors, and the stop acknowledgment
    /// arrive on `events`.
    fn start(
        &mut self,
        stream: &MediaStream,
        mime_type: &str,
        events: RecorderEventSender,
    ) -> SnipResult<()>;

    /// Request a stop. Completion is signalled by [`RecorderEvent::Stopped`].
    fn stop(&mut self) -> SnipResult<()>;

    fn is_recording(&self) -> bool;
}

/// Factory and capability surface of a host.
pub trait ExportHost: CodecSupport + Send {
    fn capabilities(&self) -> HostCapabilities;

    fn create_surface(&mut self, width: u32, height: u32) -> SnipResult<Box<dyn RenderSurface>>;

    fn create_recorder(&mut self) -> SnipResult<Box<dyn StreamRecorder>>;
}

/// Display refresh tick source.
#[async_trait::async_trait]
pub trait FrameTicker: Send {
    /// Resolves at the next display refresh.
    async fn next_frame(&mut self);
}

/// Tick source backed by a tokio interval, for hosts without a refresh callback.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// Must be called from within a tokio runtime.
    pub fn new(refresh_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / refresh_hz.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    /// Ticker at the configured display refresh rate.
    pub fn from_settings(settings: &ExportDefaults) -> Self {
        Self::new(settings.refresh_hz)
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

#[async_trait::async_trait]
impl FrameTicker for IntervalTicker {
    async fn next_frame(&mut self) {
        self.interval.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_keeps_surface_video_and_source_audio() {
        let surface = MediaStream::new(vec![MediaTrack::video("canvas")]);
        let composed = MediaStream::compose(
            &surface,
            vec![MediaTrack::audio("a0"), MediaTrack::video("source-video")],
        );
        assert_eq!(composed.video_tracks().count(), 1);
        assert_eq!(composed.video_tracks().next().unwrap().id, "canvas");
        assert!(composed.has_audio());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker_follows_refresh_setting() {
        let settings = ExportDefaults {
            refresh_hz: 50,
            ..ExportDefaults::default()
        };
        let ticker = IntervalTicker::from_settings(&settings);
        assert_eq!(ticker.period(), Duration::from_millis(20));
    }

    #[test]
    fn test_draw_commands() {
        assert!(DrawCommand::full_frame(640, 360).is_identity());
        let crop = DrawCommand::cropped(CropRect::new(10, 10, 100, 50));
        assert!(!crop.is_identity());
        assert_eq!((crop.dest_width, crop.dest_height), (100, 50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker_period() {
        let mut ticker = IntervalTicker::new(50);
        assert_eq!(ticker.period(), Duration::from_millis(20));
        let start = tokio::time::Instant::now();
        ticker.next_frame().await;
        ticker.next_frame().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
