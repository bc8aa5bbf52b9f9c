//! Start/completion/error tone synthesis and playback (§4.3, §4.6).
//!
//! Tones are a short sine burst with linear fade-in/out, played through the
//! default output device via `rodio`. Playback never blocks longer than the
//! configured tone duration.

use std::time::Duration;

use rodio::{OutputStream, Sink, Source};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct ToneConfig {
    pub enabled: bool,
    pub frequency_hz: f32,
    pub duration_ms: u32,
    pub fade_ms: u32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency_hz: 880.0,
            duration_ms: 120,
            fade_ms: 15,
        }
    }
}

/// A synthesized sine burst with linear fade-in/out, ready to feed to a
/// `rodio::Sink`.
struct SineBurst {
    sample_rate: u32,
    total_samples: u32,
    fade_samples: u32,
    frequency_hz: f32,
    position: u32,
}

impl SineBurst {
    fn new(cfg: &ToneConfig, sample_rate: u32) -> Self {
        let total_samples = (sample_rate as u64 * cfg.duration_ms as u64 / 1000) as u32;
        let fade_samples = (sample_rate as u64 * cfg.fade_ms as u64 / 1000) as u32;
        Self {
            sample_rate,
            total_samples,
            fade_samples: fade_samples.min(total_samples / 2).max(1),
            frequency_hz: cfg.frequency_hz,
            position: 0,
        }
    }

    fn envelope(&self) -> f32 {
        let fade = self.fade_samples;
        if self.position < fade {
            self.position as f32 / fade as f32
        } else if self.position > self.total_samples.saturating_sub(fade) {
            let remaining = self.total_samples.saturating_sub(self.position);
            remaining as f32 / fade as f32
        } else {
            1.0
        }
    }
}

impl Iterator for SineBurst {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.total_samples {
            return None;
        }
        let t = self.position as f32 / self.sample_rate as f32;
        let sample = (2.0 * std::f32::consts::PI * self.frequency_hz * t).sin() * self.envelope();
        self.position += 1;
        Some(sample * 0.4) // headroom: avoid clipping on cheap speakers
    }
}

impl Source for SineBurst {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_millis(
            (self.total_samples as u64 * 1000 / self.sample_rate as u64) as u64,
        ))
    }
}

/// Play a tone synchronously, blocking for at most `duration_ms`. Errors
/// (no output device, stream build failure) are logged and swallowed —
/// a missing tone must never fail the capture lifecycle.
pub fn play_blocking(cfg: &ToneConfig) {
    if !cfg.enabled {
        return;
    }
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            warn!("tone playback unavailable: {e}");
            return;
        }
    };
    let sink = match Sink::try_new(&handle) {
        Ok(s) => s,
        Err(e) => {
            warn!("tone playback sink creation failed: {e}");
            return;
        }
    };
    let burst = SineBurst::new(cfg, 48_000);
    sink.append(burst);
    sink.sleep_until_end();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_burst_has_expected_sample_count() {
        let cfg = ToneConfig {
            enabled: true,
            frequency_hz: 440.0,
            duration_ms: 100,
            fade_ms: 10,
        };
        let burst = SineBurst::new(&cfg, 16_000);
        let samples: Vec<f32> = burst.collect();
        assert_eq!(samples.len(), 1_600);
    }

    #[test]
    fn envelope_starts_and_ends_near_zero() {
        let cfg = ToneConfig {
            enabled: true,
            frequency_hz: 440.0,
            duration_ms: 100,
            fade_ms: 10,
        };
        let samples: Vec<f32> = SineBurst::new(&cfg, 16_000).collect();
        assert!(samples.first().unwrap().abs() < 0.05);
        assert!(samples.last().unwrap().abs() < 0.05);
    }
}
