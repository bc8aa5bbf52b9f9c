//! Transcriber (C5): owns the persistent Model Handle, produces a fresh
//! inference context per utterance, and post-processes output text.
//!
//! `&mut self` on `transcribe` expresses that decoders are stateful; all
//! mutation is serialised through `ModelHandle`'s `parking_lot::Mutex`.

pub mod stub;
pub mod whisper;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Tokens the transcriber strips from model output via substring removal
/// (§4.5 step 5). Scoped to the Transcriber rather than a process-global,
/// per the re-architecture note in §9.
pub const FILTER_TOKENS: &[&str] = &["[BLANK_AUDIO]", "[SILENCE]", "[NOISE]", "[SPEECH]", "[MUSIC]"];

/// Strip filter tokens and trim whitespace — the shared post-processing
/// step every `SpeechModel` impl runs its raw output through.
pub fn postprocess(mut text: String) -> String {
    for tok in FILTER_TOKENS {
        text = text.replace(tok, "");
    }
    text.trim().to_string()
}

/// A transcription backend. Implementors may be stateful (a loaded model),
/// but `transcribe` must not leak state across calls — each call creates a
/// fresh inference context internally, not just a fresh decode.
pub trait SpeechModel: Send + 'static {
    /// Load weights / warm the backend. Called once at daemon startup.
    fn warm_up(&mut self) -> Result<()>;

    /// Transcribe one utterance's samples (mono f32 at the model's
    /// required sample rate). Returns already-postprocessed text, or an
    /// empty string if nothing was recognised.
    fn transcribe(&mut self, samples: &[f32]) -> Result<String>;
}

/// Shared, lockable handle to a `SpeechModel`. At most one inference runs
/// at a time, enforced by the mutex (and, upstream, by the utterance
/// channel's capacity of 1).
#[derive(Clone)]
pub struct ModelHandle(pub Arc<Mutex<dyn SpeechModel>>);

impl ModelHandle {
    pub fn new<M: SpeechModel>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postprocess_strips_all_filter_tokens_and_trims() {
        let raw = " Hello  [SILENCE] world [NOISE][MUSIC] ".to_string();
        let out = postprocess(raw);
        assert_eq!(out, "Hello   world");
        for tok in FILTER_TOKENS {
            assert!(!out.contains(tok));
        }
    }

    #[test]
    fn postprocess_empty_after_stripping_yields_empty_string() {
        let raw = "  [BLANK_AUDIO]  ".to_string();
        assert_eq!(postprocess(raw), "");
    }
}
