//! # stt-core
//!
//! Real-time speech-to-text pipeline: audio capture, silence detection,
//! utterance buffering and neural transcription.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → RingBuffer → Pipeline(spawn_blocking)
//!                                              │
//!                                        SilenceDetector
//!                                              │
//!                                   utterance channel (cap 1-2)
//!                                              │
//!                                         Transcriber
//!                                              │
//!                                       text channel → OutputSink
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens off the
//! real-time thread, in the pipeline task.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod error;
pub mod inference;
pub mod ipc;
pub mod pipeline;
pub mod session;
pub mod sink;
pub mod vad;

pub use error::{Result, SttError};
pub use inference::{ModelHandle, SpeechModel};
pub use ipc::wire::{Command, LogEntry, Response};
pub use session::{SessionConfig, SessionController, SessionState};
pub use sink::OutputSink;
