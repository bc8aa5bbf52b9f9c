//! whisper.cpp (GGML) transcription backend via `whisper-rs`.
//!
//! Mirrors the fresh-context-per-utterance shape used by
//! `whisper-cpp`'s C-ABI backend: `WhisperContext` is loaded once and held
//! for the process lifetime, but `create_state()` is called anew for every
//! utterance. Reusing a state across calls was the teacher corpus's own
//! documented bug (segment-counter pollution causing the second
//! transcription to come back empty) — never do that here.

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::{Result, SttError};
use crate::inference::{postprocess, SpeechModel};

/// GGML magic bytes, little-endian, at offset 0 (§6 Model file format).
const GGML_MAGIC: u32 = 0x6767_6d6c;
/// Magic (4 bytes) + at least 11 int32 header parameters.
const GGML_MIN_SIZE: u64 = 4 + 11 * 4;

/// Validate a candidate model file before attempting to load it (§8
/// invariant 8): correct magic and a minimum plausible size.
pub fn validate_ggml_header(path: &std::path::Path) -> Result<()> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();
    if len < GGML_MIN_SIZE {
        return Err(SttError::InvalidModelFile(format!(
            "file too small ({len} bytes, need >= {GGML_MIN_SIZE})"
        )));
    }

    let mut magic_bytes = [0u8; 4];
    file.read_exact(&mut magic_bytes)?;
    let magic = u32::from_le_bytes(magic_bytes);
    if magic != GGML_MAGIC {
        return Err(SttError::InvalidModelFile(format!(
            "bad magic: 0x{magic:08x}, expected 0x{GGML_MAGIC:08x}"
        )));
    }
    Ok(())
}

/// Configuration for `WhisperModel`. `auto_detect_language` is the operator's
/// request; whether it actually takes effect depends on the loaded model
/// (§4.5 step 2) and is resolved once at `warm_up`.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub model_path: std::path::PathBuf,
    pub auto_detect_language: bool,
    pub language: String,
    pub beam_size: i32,
    pub use_gpu: bool,
}

/// `whisper-rs`-backed `SpeechModel`. Owns the Model Handle (`WhisperContext`)
/// for the lifetime of the daemon; a fresh `WhisperState` is created per
/// utterance inside `transcribe`.
pub struct WhisperModel {
    config: WhisperConfig,
    ctx: Option<WhisperContext>,
    /// Resolved at `warm_up`: `"auto"` only if both requested and the
    /// loaded model is multilingual, the configured language otherwise.
    effective_language: String,
}

impl WhisperModel {
    pub fn new(config: WhisperConfig) -> Self {
        let effective_language = config.language.clone();
        Self {
            config,
            ctx: None,
            effective_language,
        }
    }

    /// The language actually used for inference, resolved at `warm_up`.
    /// Before `warm_up` runs this is just the configured language.
    pub fn effective_language(&self) -> &str {
        &self.effective_language
    }
}

impl SpeechModel for WhisperModel {
    fn warm_up(&mut self) -> Result<()> {
        validate_ggml_header(&self.config.model_path)?;

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(self.config.use_gpu);

        let path = self
            .config
            .model_path
            .to_str()
            .ok_or_else(|| SttError::InitError("model path is not valid UTF-8".into()))?;

        let ctx = WhisperContext::new_with_params(path, ctx_params)
            .map_err(|e| SttError::InitError(format!("failed to load whisper model: {e}")))?;

        self.effective_language = if self.config.auto_detect_language && ctx.is_multilingual() {
            "auto".to_string()
        } else {
            self.config.language.clone()
        };

        self.ctx = Some(ctx);
        Ok(())
    }

    fn transcribe(&mut self, samples: &[f32]) -> Result<String> {
        let ctx = self
            .ctx
            .as_ref()
            .ok_or_else(|| SttError::InferenceError("model not warmed up".into()))?;

        // Fresh inference context every call — see module docs.
        let mut state = ctx
            .create_state()
            .map_err(|e| SttError::InferenceError(format!("create_state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(self.effective_language.as_str()));
        params.set_translate(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| SttError::InferenceError(format!("full(): {e}")))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| SttError::InferenceError(format!("full_n_segments: {e}")))?;

        let mut parts = Vec::with_capacity(num_segments as usize);
        for i in 0..num_segments {
            match state.full_get_segment_text(i) {
                Ok(text) => parts.push(text),
                Err(e) => {
                    return Err(SttError::InferenceError(format!(
                        "segment {i} extraction failed: {e}"
                    )))
                }
            }
        }

        Ok(postprocess(parts.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_file_with_wrong_magic() {
        let tmp = tempfile_with(&[0u8; 64]);
        let err = validate_ggml_header(tmp.path()).unwrap_err();
        assert!(matches!(err, SttError::InvalidModelFile(_)));
    }

    #[test]
    fn rejects_file_smaller_than_minimum_size() {
        let tmp = tempfile_with(&GGML_MAGIC.to_le_bytes());
        let err = validate_ggml_header(tmp.path()).unwrap_err();
        assert!(matches!(err, SttError::InvalidModelFile(_)));
    }

    #[test]
    fn accepts_valid_header() {
        let mut bytes = GGML_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 11 * 4]);
        let tmp = tempfile_with(&bytes);
        assert!(validate_ggml_header(tmp.path()).is_ok());
    }

    fn tempfile_with(bytes: &[u8]) -> tempfile_shim::NamedTempFile {
        let mut f = tempfile_shim::NamedTempFile::new();
        f.write_all(bytes);
        f
    }

    /// Minimal stand-in for the `tempfile` crate (not in the dependency
    /// set) — writes to a process-unique path under `std::env::temp_dir()`
    /// and removes it on drop.
    mod tempfile_shim {
        use std::fs::File;
        use std::io::Write as _;
        use std::path::{Path, PathBuf};
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);

        pub struct NamedTempFile {
            path: PathBuf,
            file: File,
        }

        impl NamedTempFile {
            pub fn new() -> Self {
                let n = COUNTER.fetch_add(1, Ordering::Relaxed);
                let path = std::env::temp_dir().join(format!("stt-core-test-{}-{n}", std::process::id()));
                let file = File::create(&path).expect("create temp file");
                Self { path, file }
            }

            pub fn write_all(&mut self, bytes: &[u8]) {
                self.file.write_all(bytes).expect("write temp file");
            }

            pub fn path(&self) -> &Path {
                &self.path
            }
        }

        impl Drop for NamedTempFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}
