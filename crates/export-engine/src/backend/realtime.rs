//! Real-time re-encode: play the source, draw each refresh into a surface,
//! and record the surface's capture stream.
//!
//! The run is a single task multiplexing two event sources with
//! `tokio::select!`: the display-refresh tick (draw + stop check) and the
//! recorder's event channel (data chunks, errors, stop acknowledgment).
//!
//! Stop policy: playback position reaching the trim end is the primary
//! signal. Wall-clock time since playback start is only a safety timeout,
//! firing at `trim length + stop_grace_secs` so a stalled decoder cannot keep
//! the recorder running forever.
//!
//! Host calls awaited before the frame loop (seek, play) race the cancel flag
//! and a timeout, so a decoder that never answers still ends the run through
//! the same stop-and-restore path.

use std::future::Future;
use std::time::Duration;

use snipframe_common::clock::{DriftMeasurement, RateController, RunClock};
use snipframe_common::error::{SnipError, SnipResult};
use snipframe_edit_model::{suggested_file_name, OutputArtifact};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::backend::{
    ExportBackend, ExportJob, ExportProgress, ExportStage, ExportStats, RenderedClip, RunControl,
    StopReason,
};
use crate::codec::negotiate;
use crate::host::{
    DrawCommand, ExportHost, FrameTicker, IntervalTicker, MediaElement, MediaStream,
    RecorderEvent, RecorderEventReceiver, RenderSurface, StreamRecorder,
};

/// How long to wait for the recorder to acknowledge a stop request.
const STOP_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a seek or play request may stay unanswered.
const HOST_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the cancel flag is polled while a host call is pending.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Drift above this is logged as a warning.
const DRIFT_WARN_MS: f64 = 100.0;

/// Drives host collaborators through one export.
pub struct RealtimeBackend<'a> {
    host: &'a mut dyn ExportHost,
    media: &'a mut dyn MediaElement,
    /// `None` ticks at the configured `refresh_hz`.
    ticker: Option<&'a mut dyn FrameTicker>,
}

/// Resources a run has touched and must give back.
#[derive(Default)]
struct ActiveRun {
    recorder: Option<Box<dyn StreamRecorder>>,
    saved_muted: Option<bool>,
}

/// What the frame loop saw when it stopped.
struct CaptureEnd {
    reason: StopReason,
    frames_drawn: u64,
    chunks: Vec<Vec<u8>>,
    captured_secs: f64,
    drift: DriftMeasurement,
}

impl<'a> RealtimeBackend<'a> {
    pub fn new(
        host: &'a mut dyn ExportHost,
        media: &'a mut dyn MediaElement,
        ticker: &'a mut dyn FrameTicker,
    ) -> Self {
        Self {
            host,
            media,
            ticker: Some(ticker),
        }
    }

    /// Backend for hosts without a refresh callback; frames are paced by a
    /// tokio interval at `refresh_hz`.
    pub fn with_refresh_interval(
        host: &'a mut dyn ExportHost,
        media: &'a mut dyn MediaElement,
    ) -> Self {
        Self {
            host,
            media,
            ticker: None,
        }
    }

    async fn capture(
        &mut self,
        job: &ExportJob,
        control: &RunControl,
        run: &mut ActiveRun,
    ) -> SnipResult<RenderedClip> {
        control.report_stage(ExportStage::Preparing, 0.0);

        let (width, height) = job.output_dimensions();
        let mut surface = self
            .host
            .create_surface(width, height)
            .map_err(|e| SnipError::runtime(format!("failed to allocate render surface: {e}")))?;
        let command = match job.crop {
            Some(crop) => DrawCommand::cropped(crop),
            None => DrawCommand::full_frame(width, height),
        };

        let video = surface
            .capture_stream(job.settings.fps)
            .map_err(|e| SnipError::runtime(format!("surface capture unavailable: {e}")))?;
        let stream = self.compose_with_source_audio(&video);

        let codec = negotiate(&job.settings.codec_preferences, &*self.host);
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut recorder = self
            .host
            .create_recorder()
            .map_err(|e| SnipError::runtime(format!("failed to create recorder: {e}")))?;
        recorder
            .start(&stream, &codec.mime_type, events_tx)
            .map_err(|e| {
                SnipError::runtime(format!(
                    "recorder rejected {} (fallback: {}): {e}",
                    codec.mime_type, codec.fallback
                ))
            })?;
        run.recorder = Some(recorder);
        tracing::info!(
            mime_type = %codec.mime_type,
            width,
            height,
            audio = stream.has_audio(),
            "Recorder started"
        );

        run.saved_muted = Some(self.media.is_muted());
        self.media.set_muted(true);

        control.report_stage(ExportStage::Seeking, 0.0);
        let position = self.media.current_time();
        if (position - job.trim.start).abs() > job.settings.seek_tolerance_secs {
            tracing::debug!(from = position, to = job.trim.start, "Seeking to trim start");
            let media = &mut *self.media;
            let seek = async {
                media.seek(job.trim.start).await.map_err(|e| {
                    SnipError::runtime(format!("seek to {:.3}s failed: {e}", job.trim.start))
                })
            };
            await_host(control, "seek", seek).await?;
        }

        let media = &mut *self.media;
        let play = async {
            media
                .play()
                .await
                .map_err(|e| SnipError::runtime(format!("playback failed to start: {e}")))
        };
        await_host(control, "playback start", play).await?;

        let mut refresh;
        let ticker: &mut dyn FrameTicker = match self.ticker.as_mut() {
            Some(ticker) => &mut **ticker,
            None => {
                refresh = IntervalTicker::from_settings(&job.settings);
                &mut refresh
            }
        };
        let end = frame_loop(
            &mut *self.media,
            ticker,
            job,
            control,
            surface.as_mut(),
            &command,
            &mut events,
        )
        .await?;

        control.report_stage(ExportStage::Finalizing, 1.0);
        self.stop_and_restore(run)?;
        let mut chunks = end.chunks;
        drain_until_stopped(&mut events, &mut chunks).await?;

        let total_bytes: usize = chunks.iter().map(Vec::len).sum();
        if chunks.is_empty() || total_bytes == 0 {
            return Err(SnipError::EmptyResult);
        }

        let file_name = suggested_file_name(&job.source, codec.file_extension());
        let artifact = OutputArtifact::from_chunks(&chunks, codec.mime_type.clone(), file_name);

        let drift_ms = end.drift.drift_ms();
        if end.drift.exceeds_threshold_ms(DRIFT_WARN_MS) {
            tracing::warn!(drift_ms, "Playback drifted from wall clock during capture");
        } else {
            tracing::debug!(drift_ms, "Playback drift within threshold");
        }

        control.report(ExportProgress {
            progress: 1.0,
            frames_drawn: end.frames_drawn,
            elapsed_secs: end.captured_secs,
            stage: ExportStage::Complete,
        });

        Ok(RenderedClip {
            artifact,
            stats: ExportStats {
                frames_drawn: end.frames_drawn,
                chunks_received: chunks.len(),
                captured_secs: end.captured_secs,
                stop_reason: end.reason,
                drift_ms: Some(drift_ms),
            },
        })
    }

    /// Best effort: a source without exposable audio records video only.
    fn compose_with_source_audio(&mut self, video: &MediaStream) -> MediaStream {
        match self.media.capture_audio_tracks() {
            Ok(tracks) if !tracks.is_empty() => {
                tracing::debug!(tracks = tracks.len(), "Composing source audio into capture");
                MediaStream::compose(video, tracks)
            }
            Ok(_) => {
                tracing::debug!("Source has no audio tracks; recording video only");
                video.clone()
            }
            Err(e) => {
                tracing::debug!(error = %e, "Source audio unavailable; recording video only");
                video.clone()
            }
        }
    }

    /// Stop the recorder if it is running, pause the source, and put its mute
    /// state back. Safe to call more than once.
    fn stop_and_restore(&mut self, run: &mut ActiveRun) -> SnipResult<()> {
        let mut result = Ok(());
        if let Some(recorder) = run.recorder.as_mut() {
            if recorder.is_recording() {
                if let Err(e) = recorder.stop() {
                    tracing::warn!(error = %e, "Recorder stop request failed");
                    result = Err(SnipError::runtime(format!("failed to stop recorder: {e}")));
                }
            }
        }
        self.media.pause();
        if let Some(muted) = run.saved_muted.take() {
            self.media.set_muted(muted);
        }
        result
    }
}

async fn frame_loop(
    media: &mut dyn MediaElement,
    ticker: &mut dyn FrameTicker,
    job: &ExportJob,
    control: &RunControl,
    surface: &mut dyn RenderSurface,
    command: &DrawCommand,
    events: &mut RecorderEventReceiver,
) -> SnipResult<CaptureEnd> {
    let clock = RunClock::start();
    let origin = media.current_time();
    let length = job.length_secs();
    let timeout_secs = length + job.settings.stop_grace_secs;
    let mut progress_rate = RateController::new(job.settings.progress_hz);
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut frames_drawn: u64 = 0;

    tracing::info!(
        start = job.trim.start,
        end = job.trim.end,
        epoch = %clock.epoch_wall(),
        "Playback started; capturing"
    );

    loop {
        tokio::select! {
            biased;

            event = events.recv() => match event {
                Some(RecorderEvent::Data(chunk)) => {
                    if !chunk.is_empty() {
                        chunks.push(chunk);
                    }
                }
                Some(RecorderEvent::Error(message)) => {
                    return Err(SnipError::runtime(format!("recorder error: {message}")));
                }
                Some(RecorderEvent::Stopped) => {
                    return Err(SnipError::runtime("recorder stopped before the trim end"));
                }
                None => {
                    return Err(SnipError::runtime("recorder event channel closed"));
                }
            },

            _ = ticker.next_frame() => {
                if control.is_cancelled() {
                    return Err(SnipError::runtime("export cancelled"));
                }
                if let Some(message) = media.take_error() {
                    return Err(SnipError::runtime(format!("playback error: {message}")));
                }

                let position = media.current_time();
                let elapsed = clock.elapsed_secs();
                let reason = if position >= job.trim.end {
                    Some(StopReason::ReachedEnd)
                } else if elapsed >= timeout_secs {
                    tracing::warn!(
                        position,
                        elapsed,
                        timeout_secs,
                        "Playback did not reach trim end in time; stopping on safety timeout"
                    );
                    Some(StopReason::SafetyTimeout)
                } else {
                    None
                };

                if let Some(reason) = reason {
                    tracing::info!(?reason, frames_drawn, elapsed, "Capture stop condition met");
                    return Ok(CaptureEnd {
                        reason,
                        frames_drawn,
                        chunks,
                        captured_secs: elapsed,
                        drift: DriftMeasurement {
                            wall_secs: elapsed,
                            playback_secs: position - origin,
                        },
                    });
                }

                surface
                    .draw_frame(&*media, command)
                    .map_err(|e| SnipError::runtime(format!("frame draw failed: {e}")))?;
                frames_drawn += 1;

                if progress_rate.should_tick(clock.elapsed_ns()) {
                    control.report(ExportProgress {
                        progress: ((position - job.trim.start) / length).clamp(0.0, 1.0),
                        frames_drawn,
                        elapsed_secs: elapsed,
                        stage: ExportStage::Rendering,
                    });
                }
            }
        }
    }
}

/// Await a host call, giving up when the run is cancelled or the host never
/// answers.
async fn await_host<T>(
    control: &RunControl,
    what: &str,
    call: impl Future<Output = SnipResult<T>>,
) -> SnipResult<T> {
    let mut poll = tokio::time::interval(CANCEL_POLL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline = tokio::time::sleep(HOST_CALL_TIMEOUT);
    tokio::pin!(call, deadline);

    loop {
        tokio::select! {
            biased;

            result = &mut call => return result,
            _ = poll.tick() => {
                if control.is_cancelled() {
                    return Err(SnipError::runtime(format!("export cancelled during {what}")));
                }
            }
            _ = &mut deadline => {
                return Err(SnipError::runtime(format!(
                    "{what} did not complete within {}s",
                    HOST_CALL_TIMEOUT.as_secs()
                )));
            }
        }
    }
}

/// Collect trailing chunks until the recorder acknowledges the stop.
async fn drain_until_stopped(
    events: &mut RecorderEventReceiver,
    chunks: &mut Vec<Vec<u8>>,
) -> SnipResult<()> {
    let drain = async {
        loop {
            match events.recv().await {
                Some(RecorderEvent::Data(chunk)) => {
                    if !chunk.is_empty() {
                        chunks.push(chunk);
                    }
                }
                Some(RecorderEvent::Stopped) => return Ok(()),
                Some(RecorderEvent::Error(message)) => {
                    return Err(SnipError::runtime(format!("recorder error: {message}")));
                }
                None => {
                    return Err(SnipError::runtime(
                        "recorder closed without acknowledging stop",
                    ));
                }
            }
        }
    };

    match tokio::time::timeout(STOP_ACK_TIMEOUT, drain).await {
        Ok(result) => result,
        Err(_) => Err(SnipError::runtime(format!(
            "recorder did not acknowledge stop within {}s",
            STOP_ACK_TIMEOUT.as_secs()
        ))),
    }
}

#[async_trait::async_trait]
impl<'a> ExportBackend for RealtimeBackend<'a> {
    fn name(&self) -> &str {
        "realtime"
    }

    fn check_support(&self) -> SnipResult<()> {
        let caps = self.host.capabilities();
        if !caps.surface_capture {
            return Err(SnipError::precondition(
                "host cannot capture a stream from a drawing surface",
            ));
        }
        if !caps.stream_recording {
            return Err(SnipError::precondition("host cannot record media streams"));
        }
        Ok(())
    }

    async fn render(&mut self, job: &ExportJob, control: &RunControl) -> SnipResult<RenderedClip> {
        let mut run = ActiveRun::default();
        let result = self.capture(job, control, &mut run).await;
        if result.is_err() {
            if let Err(e) = self.stop_and_restore(&mut run) {
                tracing::warn!(error = %e, "Cleanup after failed export was incomplete");
            }
            control.report_stage(ExportStage::Failed, 0.0);
        }
        result
    }
}
