//! Pipeline Processor (C4): drains the Ring Buffer in fixed-size Frames,
//! classifies each with the Silence Detector, accumulates utterance audio,
//! and emits "utterance-ready" events.
//!
//! Deliberately simpler than a streaming-partial-transcript pipeline — this
//! repo never emits a transcript until an utterance is complete, per the
//! explicit Non-goal on streaming partials.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender};
use tracing::{info, warn};

use crate::buffering::frame::UtteranceBuffer;
use crate::buffering::RingBuffer;
use crate::vad::{SilenceDetector, VadDecision};

/// Consecutive silent frames required before silence duration starts
/// accumulating (§4.4 step 2).
pub const DEBOUNCE_FRAMES: u32 = 5;
const SLEEP_EMPTY_MS: u64 = 5;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub frame_length: usize,
    pub sample_rate: u32,
    pub silence_threshold: f32,
    pub silence_duration_sec: f32,
    pub max_utterance_samples: usize,
}

/// A completed utterance, ready to be handed to the Transcriber.
#[derive(Debug, Clone)]
pub struct UtteranceReady {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Atomic counters observable via `status --verbose` and tests, mirroring
/// the teacher's `PipelineDiagnostics` pattern.
#[derive(Default)]
pub struct PipelineDiagnostics {
    pub frames_processed: AtomicUsize,
    pub utterances_emitted: AtomicUsize,
    pub utterances_dropped: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.frames_processed.store(0, Ordering::Relaxed);
        self.utterances_emitted.store(0, Ordering::Relaxed);
        self.utterances_dropped.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            utterances_emitted: self.utterances_emitted.load(Ordering::Relaxed),
            utterances_dropped: self.utterances_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsSnapshot {
    pub frames_processed: usize,
    pub utterances_emitted: usize,
    pub utterances_dropped: usize,
}

/// Owns the Silence Accumulator (§3) and the Utterance Buffer; pure w.r.t.
/// I/O so it can be driven directly in tests without a real ring buffer.
pub struct Pipeline {
    config: PipelineConfig,
    vad: SilenceDetector,
    utterance: UtteranceBuffer,
    silent_seconds: f32,
    consecutive_silent_frames: u32,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, diagnostics: Arc<PipelineDiagnostics>) -> Self {
        let vad = SilenceDetector::new(config.silence_threshold);
        let utterance = UtteranceBuffer::new(config.max_utterance_samples, config.sample_rate);
        Self {
            config,
            vad,
            utterance,
            silent_seconds: 0.0,
            consecutive_silent_frames: 0,
            diagnostics,
        }
    }

    /// Process one Frame (§4.4 algorithm). Returns the emitted utterance's
    /// samples if this frame completed one, via silence threshold or the
    /// max-duration cap.
    pub fn process_frame(&mut self, frame: &[f32]) -> Option<Vec<f32>> {
        self.diagnostics
            .frames_processed
            .fetch_add(1, Ordering::Relaxed);

        let decision = self.vad.classify(frame);
        let mut emit_for_silence = false;

        match decision {
            VadDecision::Silence => {
                self.consecutive_silent_frames += 1;
                if self.consecutive_silent_frames > DEBOUNCE_FRAMES {
                    self.silent_seconds += frame.len() as f32 / self.config.sample_rate as f32;
                }
                if self.silent_seconds >= self.config.silence_duration_sec {
                    emit_for_silence = true;
                }
            }
            VadDecision::Speech => {
                self.silent_seconds = 0.0;
                self.consecutive_silent_frames = 0;
            }
        }

        let hit_cap = self.utterance.append(frame);

        if emit_for_silence || hit_cap {
            let samples = self.utterance.take();
            self.silent_seconds = 0.0;
            self.consecutive_silent_frames = 0;
            self.vad.reset();
            if samples.is_empty() {
                return None;
            }
            self.diagnostics
                .utterances_emitted
                .fetch_add(1, Ordering::Relaxed);
            return Some(samples);
        }

        None
    }

    /// Non-empty buffered audio, if any — used when flushing on cancel.
    pub fn take_pending(&mut self) -> Option<Vec<f32>> {
        if self.utterance.is_empty() {
            None
        } else {
            Some(self.utterance.take())
        }
    }
}

/// Drains `ring` in `config.frame_length`-sized Frames until `running`
/// clears, emitting completed utterances onto `utterance_tx`. Runs on a
/// blocking thread — callers spawn it via `spawn_blocking` or a dedicated
/// `std::thread`.
pub fn run(
    ring: Arc<RingBuffer>,
    running: Arc<AtomicBool>,
    mut pipeline: Pipeline,
    utterance_tx: Sender<UtteranceReady>,
) {
    let frame_len = pipeline.config.frame_length;
    let sample_rate = pipeline.config.sample_rate;
    let backpressure_timeout =
        Duration::from_secs_f32(pipeline.config.silence_duration_sec.max(0.05));

    while running.load(Ordering::Acquire) {
        if ring.available() < frame_len {
            std::thread::sleep(Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }

        let frame = ring.read(frame_len);
        if let Some(samples) = pipeline.process_frame(&frame) {
            emit(&utterance_tx, samples, sample_rate, backpressure_timeout, &pipeline.diagnostics);
        }
    }

    // Cancellation: flush only if non-empty and the send succeeds immediately.
    if let Some(samples) = pipeline.take_pending() {
        let msg = UtteranceReady { samples, sample_rate };
        match utterance_tx.try_send(msg) {
            Ok(()) => info!("flushed pending utterance on shutdown"),
            Err(_) => warn!("could not flush pending utterance on shutdown, dropping"),
        }
    }
}

fn emit(
    tx: &Sender<UtteranceReady>,
    samples: Vec<f32>,
    sample_rate: u32,
    timeout: Duration,
    diagnostics: &PipelineDiagnostics,
) {
    let msg = UtteranceReady { samples, sample_rate };
    match tx.send_timeout(msg, timeout) {
        Ok(()) => {}
        Err(SendTimeoutError::Timeout(_)) => {
            warn!("transcription channel full, dropping utterance");
            diagnostics
                .utterances_dropped
                .fetch_add(1, Ordering::Relaxed);
        }
        Err(SendTimeoutError::Disconnected(_)) => {
            warn!("utterance channel disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(silence_duration_sec: f32, max_utterance_samples: usize) -> PipelineConfig {
        PipelineConfig {
            frame_length: 160,
            sample_rate: 16_000,
            silence_threshold: 0.01,
            silence_duration_sec,
            max_utterance_samples,
        }
    }

    fn silent_frame() -> Vec<f32> {
        vec![0.0005; 160]
    }

    fn speech_frame() -> Vec<f32> {
        vec![0.2; 160]
    }

    /// S1: silence-only input never crosses the debounce threshold into an
    /// emission unless it accumulates enough silent seconds.
    #[test]
    fn silence_only_emits_once_after_duration_reached() {
        let diag = Arc::new(PipelineDiagnostics::default());
        let mut pipeline = Pipeline::new(config(1.0, 16_000 * 300), diag);

        // 1s of silence at 160-sample frames (16kHz) = 100 frames.
        let mut emitted = 0;
        for _ in 0..100 {
            if pipeline.process_frame(&silent_frame()).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 1, "expected exactly one utterance-ready event");
    }

    /// S2: speech followed by enough silence emits one utterance containing
    /// both the speech and the trailing silence frames.
    #[test]
    fn single_utterance_speech_then_silence() {
        let diag = Arc::new(PipelineDiagnostics::default());
        let mut pipeline = Pipeline::new(config(1.0, 16_000 * 300), diag);

        // 1s speech (100 frames) then 1.5s silence (150 frames)
        let mut result = None;
        for _ in 0..100 {
            assert!(pipeline.process_frame(&speech_frame()).is_none());
        }
        for _ in 0..150 {
            if let Some(samples) = pipeline.process_frame(&silent_frame()) {
                result = Some(samples);
                break;
            }
        }
        let samples = result.expect("expected an utterance-ready event");
        assert!(!samples.is_empty());
    }

    /// S3: continuous mode — a second utterance arrives after the first.
    #[test]
    fn continuous_mode_allows_second_utterance_after_first() {
        let diag = Arc::new(PipelineDiagnostics::default());
        let mut pipeline = Pipeline::new(config(1.0, 16_000 * 300), diag);

        let mut first = None;
        for _ in 0..100 {
            pipeline.process_frame(&speech_frame());
        }
        for _ in 0..150 {
            if let Some(s) = pipeline.process_frame(&silent_frame()) {
                first = Some(s);
                break;
            }
        }
        assert!(first.is_some());

        let mut second = None;
        for _ in 0..100 {
            pipeline.process_frame(&speech_frame());
        }
        for _ in 0..150 {
            if let Some(s) = pipeline.process_frame(&silent_frame()) {
                second = Some(s);
                break;
            }
        }
        assert!(second.is_some(), "expected a second utterance-ready event");
    }

    /// S4: max-duration cap forces an early emission independent of silence.
    #[test]
    fn max_duration_cap_forces_early_emission() {
        let diag = Arc::new(PipelineDiagnostics::default());
        let max_samples = 16_000 * 2; // 2s cap for a fast test
        let mut pipeline = Pipeline::new(config(100.0, max_samples), diag);

        let mut emissions = 0;
        let frames_needed = max_samples / 160 + 5;
        for _ in 0..frames_needed {
            if pipeline.process_frame(&speech_frame()).is_some() {
                emissions += 1;
            }
        }
        assert_eq!(emissions, 1, "expected exactly one cap-triggered emission");
    }

    #[test]
    fn take_pending_returns_none_when_buffer_empty() {
        let diag = Arc::new(PipelineDiagnostics::default());
        let mut pipeline = Pipeline::new(config(1.0, 16_000), diag);
        assert!(pipeline.take_pending().is_none());
    }

    #[test]
    fn take_pending_flushes_partial_speech_on_cancel() {
        let diag = Arc::new(PipelineDiagnostics::default());
        let mut pipeline = Pipeline::new(config(1.0, 16_000 * 300), diag);
        for _ in 0..10 {
            pipeline.process_frame(&speech_frame());
        }
        let pending = pipeline.take_pending();
        assert!(pending.is_some());
        assert!(pipeline.take_pending().is_none());
    }
}
