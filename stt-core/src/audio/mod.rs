//! Audio Capture (C3).
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated
//! priority. It **must not**:
//! - Allocate heap memory beyond a small, fixed-size mix buffer
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! This module satisfies that contract by writing directly into the Ring
//! Buffer's `write`, whose critical section is a short index-only lock.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio
//! on macOS). `AudioCapture` must therefore be created and dropped on the
//! same thread — in practice, a dedicated `std::thread` owned by the
//! daemon for the stream's lifetime.

pub mod device;
pub mod resample;
pub mod tone;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

use crate::{
    buffering::RingBuffer,
    error::{Result, SttError},
};

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — bound to its creation thread on Windows/macOS. Create
/// and drop this type on the same OS thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz), before
    /// resampling to the pipeline's target rate.
    pub capture_sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available device. Frames are
    /// resampled to `target_sample_rate` before being written into `ring`.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        ring: Arc<RingBuffer>,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
        target_sample_rate: u32,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut devices: Vec<(String, cpal::Device)> = host
            .input_devices()
            .map_err(|e| SttError::AudioDevice(e.to_string()))?
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                (name, device)
            })
            .collect();
        if devices.is_empty() {
            return Err(SttError::NoDefaultInputDevice);
        }

        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let preferred_idx = preferred_device_name.and_then(|preferred| {
            devices
                .iter()
                .position(|(name, _)| name.as_str() == preferred)
        });
        let default_idx = default_name
            .as_deref()
            .and_then(|name| devices.iter().position(|(n, _)| n.as_str() == name));
        let best_non_loopback_idx = devices
            .iter()
            .enumerate()
            .filter(|(_, (name, _))| !device::is_loopback_like_name(name))
            .max_by_key(|(_, (name, _))| device::mic_preference_score(name))
            .map(|(idx, _)| idx);

        if preferred_device_name.is_some() && preferred_idx.is_none() {
            warn!(
                "preferred input device '{}' not found, falling back",
                preferred_device_name.unwrap_or_default()
            );
        }

        let selected_idx = if let Some(idx) = preferred_idx {
            idx
        } else if let Some(idx) = default_idx {
            idx
        } else if let Some(idx) = best_non_loopback_idx {
            warn!("no default input device, falling back to best available microphone input");
            idx
        } else {
            warn!("no default microphone input device, falling back to first available input");
            0
        };

        let (selected_name, device) = devices.swap_remove(selected_idx);
        info!(device = selected_name.as_str(), "opening input device");

        let supported = device
            .default_input_config()
            .map_err(|e| SttError::AudioDevice(e.to_string()))?;

        let capture_sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(capture_sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(capture_sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = build_stream(
            &device,
            &config,
            supported.sample_format(),
            channels,
            Arc::clone(&ring),
            Arc::clone(&running),
            capture_sample_rate,
            target_sample_rate,
        )?;

        stream
            .play()
            .map_err(|e| SttError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            capture_sample_rate,
        })
    }

    #[cfg(feature = "audio-cpal")]
    pub fn open_default(
        ring: Arc<RingBuffer>,
        running: Arc<AtomicBool>,
        target_sample_rate: u32,
    ) -> Result<Self> {
        Self::open_with_preference(ring, running, None, target_sample_rate)
    }

    /// Signal the callback to no-op on its next invocation. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(feature = "audio-cpal")]
fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    channels: u16,
    ring: Arc<RingBuffer>,
    running: Arc<AtomicBool>,
    capture_sample_rate: u32,
    target_sample_rate: u32,
) -> Result<Stream> {
    let ch = channels as usize;
    let mut resampler = resample::RateConverter::new(capture_sample_rate, target_sample_rate, 960)?;
    let mut mix_buf: Vec<f32> = Vec::new();

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                downmix_f32(data, ch, &mut mix_buf);
                let resampled = resampler.process(&mix_buf);
                write_dropping_overflow(&ring, &resampled);
            },
            |err| error!("audio stream error: {err}"),
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                downmix_i16(data, ch, &mut mix_buf);
                let resampled = resampler.process(&mix_buf);
                write_dropping_overflow(&ring, &resampled);
            },
            |err| error!("audio stream error: {err}"),
            None,
        ),
        SampleFormat::U8 => device.build_input_stream(
            config,
            move |data: &[u8], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                downmix_u8(data, ch, &mut mix_buf);
                let resampled = resampler.process(&mix_buf);
                write_dropping_overflow(&ring, &resampled);
            },
            |err| error!("audio stream error: {err}"),
            None,
        ),
        fmt => {
            return Err(SttError::AudioStream(format!(
                "unsupported sample format: {fmt:?}"
            )))
        }
    }
    .map_err(|e| SttError::AudioStream(e.to_string()))?;

    Ok(stream)
}

#[cfg(feature = "audio-cpal")]
fn write_dropping_overflow(ring: &RingBuffer, samples: &[f32]) {
    if samples.is_empty() {
        return;
    }
    let written = ring.write(samples);
    if written < samples.len() {
        warn!(
            "ring buffer full: dropped {} frames",
            samples.len() - written
        );
    }
}

#[cfg(feature = "audio-cpal")]
fn downmix_f32(data: &[f32], ch: usize, out: &mut Vec<f32>) {
    if ch == 1 {
        out.clear();
        out.extend_from_slice(data);
        return;
    }
    let frames = data.len() / ch;
    out.resize(frames, 0.0);
    for f in 0..frames {
        let base = f * ch;
        out[f] = data[base..base + ch].iter().sum::<f32>() / ch as f32;
    }
}

#[cfg(feature = "audio-cpal")]
fn downmix_i16(data: &[i16], ch: usize, out: &mut Vec<f32>) {
    let frames = data.len() / ch;
    out.resize(frames, 0.0);
    for f in 0..frames {
        let base = f * ch;
        let sum: f32 = data[base..base + ch].iter().map(|s| *s as f32 / 32768.0).sum();
        out[f] = sum / ch as f32;
    }
}

#[cfg(feature = "audio-cpal")]
fn downmix_u8(data: &[u8], ch: usize, out: &mut Vec<f32>) {
    let frames = data.len() / ch;
    out.resize(frames, 0.0);
    for f in 0..frames {
        let base = f * ch;
        let sum: f32 = data[base..base + ch]
            .iter()
            .map(|s| (*s as f32 - 128.0) / 128.0)
            .sum();
        out[f] = sum / ch as f32;
    }
}

/// Stub when the `audio-cpal` feature is disabled (headless test builds).
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _ring: Arc<RingBuffer>,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
        _target_sample_rate: u32,
    ) -> Result<Self> {
        Err(SttError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(
        ring: Arc<RingBuffer>,
        running: Arc<AtomicBool>,
        target_sample_rate: u32,
    ) -> Result<Self> {
        Self::open_with_preference(ring, running, None, target_sample_rate)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
