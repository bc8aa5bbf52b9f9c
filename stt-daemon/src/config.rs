//! Daemon configuration: JSON schema, defaults, and the validation rules
//! enforced on load (§6).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stt_core::error::{Result, SttError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneSettings {
    pub enabled: bool,
    pub frequency: f32,
    pub duration: u32,
    pub fade_ms: u32,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: 880.0,
            duration: 120,
            fade_ms: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub silence_threshold: f32,
    pub silence_duration: f32,
    pub frame_length: usize,
    pub buffered_frames: usize,
    pub max_duration: f32,
    pub start_tone: ToneSettings,
    pub completion_tone: ToneSettings,
    pub error_tone: ToneSettings,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            silence_threshold: 0.01,
            silence_duration: 1.0,
            frame_length: 512,
            buffered_frames: 200,
            max_duration: 300.0,
            start_tone: ToneSettings {
                frequency: 880.0,
                ..Default::default()
            },
            completion_tone: ToneSettings {
                frequency: 660.0,
                ..Default::default()
            },
            error_tone: ToneSettings {
                frequency: 220.0,
                duration: 200,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousModeConfig {
    pub enabled: bool,
    pub max_session_duration: u64,
    pub inter_speech_timeout: u64,
    pub auto_stop_on_idle: bool,
}

impl Default for ContinuousModeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_session_duration: 3600,
            inter_speech_timeout: 30,
            auto_stop_on_idle: true,
        }
    }
}

/// Text-validation policy applied by the sink before delivery (Open
/// Question resolution — see SPEC_FULL.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextValidationConfig {
    pub mode: String,
    pub allow_punctuation: bool,
    pub custom_blocklist: Vec<String>,
}

impl Default for TextValidationConfig {
    fn default() -> Self {
        Self {
            mode: "permissive".to_string(),
            allow_punctuation: true,
            custom_blocklist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub shutdown_timeout: u64,
    pub channel_buffer_size: usize,
    pub auto_paste: bool,
    pub continuous_mode: ContinuousModeConfig,
    pub text_validation: TextValidationConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: 5,
            channel_buffer_size: 2,
            auto_paste: false,
            continuous_mode: ContinuousModeConfig::default(),
            text_validation: TextValidationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSource {
    pub url: String,
    pub size: u64,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub model: String,
    pub language: String,
    pub auto_detect_language: bool,
    pub supported_languages: Vec<String>,
    pub beam_size: i32,
    pub models: HashMap<String, ModelSource>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "base.en".to_string(),
            ModelSource {
                url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin"
                    .to_string(),
                size: 147_964_211,
                sha256: None,
            },
        );
        Self {
            model: "base.en".to_string(),
            language: "en".to_string(),
            auto_detect_language: false,
            supported_languages: vec!["en".to_string()],
            beam_size: 5,
            models,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: String,
    pub socket_timeout: u64,
    pub keyboard_enabled: bool,
    pub hotkeys: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/sttd.sock".to_string(),
            socket_timeout: 1,
            keyboard_enabled: false,
            hotkeys: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub print_status: bool,
    pub print_transcriptions: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            print_status: false,
            print_transcriptions: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub processing: ProcessingConfig,
    pub whisper: WhisperConfig,
    pub server: ServerConfig,
    pub debug: DebugConfig,
}

impl Config {
    /// Load and validate configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SttError::InitError(format!("failed to read config {}: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| SttError::InitError(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Enforce every rule in §6's validation table. Returns the first
    /// violation encountered; callers treat any failure as a fatal
    /// InitError before binding the control socket.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate != 16_000 {
            return Err(SttError::InitError(format!(
                "audio.sample_rate must be 16000, got {}",
                self.audio.sample_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.audio.silence_threshold) {
            return Err(SttError::InitError(format!(
                "audio.silence_threshold must be in [0,1], got {}",
                self.audio.silence_threshold
            )));
        }
        if self.audio.silence_duration <= 0.0 {
            return Err(SttError::InitError(
                "audio.silence_duration must be > 0".to_string(),
            ));
        }
        if self.audio.frame_length == 0 {
            return Err(SttError::InitError(
                "audio.frame_length must be > 0".to_string(),
            ));
        }
        if self.audio.buffered_frames == 0 {
            return Err(SttError::InitError(
                "audio.buffered_frames must be > 0".to_string(),
            ));
        }

        let selected = self.whisper.models.get(&self.whisper.model);
        match selected {
            None => {
                return Err(SttError::InitError(format!(
                    "whisper.model '{}' not found in whisper.models",
                    self.whisper.model
                )))
            }
            Some(source) => {
                if source.url.trim().is_empty() {
                    return Err(SttError::InitError(format!(
                        "whisper.models['{}'].url must not be empty",
                        self.whisper.model
                    )));
                }
                if source.size == 0 {
                    return Err(SttError::InitError(format!(
                        "whisper.models['{}'].size must not be empty",
                        self.whisper.model
                    )));
                }
            }
        }

        if self.whisper.language.trim().is_empty() && !self.whisper.auto_detect_language {
            return Err(SttError::InitError(
                "whisper.language must be non-empty unless auto_detect_language is true"
                    .to_string(),
            ));
        }
        if self.whisper.beam_size <= 0 {
            return Err(SttError::InitError(
                "whisper.beam_size must be > 0".to_string(),
            ));
        }

        if self.processing.shutdown_timeout == 0 {
            return Err(SttError::InitError(
                "processing.shutdown_timeout must be > 0".to_string(),
            ));
        }
        if self.processing.channel_buffer_size == 0 {
            return Err(SttError::InitError(
                "processing.channel_buffer_size must be > 0".to_string(),
            ));
        }

        if self.server.socket_path.trim().is_empty()
            || !Path::new(&self.server.socket_path).is_absolute()
        {
            return Err(SttError::InitError(format!(
                "server.socket_path must be a non-empty absolute path, got '{}'",
                self.server.socket_path
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_wrong_sample_rate() {
        let mut cfg = Config::default();
        cfg.audio.sample_rate = 44_100;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let mut cfg = Config::default();
        cfg.audio.silence_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_whisper_model() {
        let mut cfg = Config::default();
        cfg.whisper.model = "does-not-exist".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_missing_language_without_auto_detect() {
        let mut cfg = Config::default();
        cfg.whisper.language = String::new();
        cfg.whisper.auto_detect_language = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_missing_language_with_auto_detect() {
        let mut cfg = Config::default();
        cfg.whisper.language = String::new();
        cfg.whisper.auto_detect_language = true;
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_relative_socket_path() {
        let mut cfg = Config::default();
        cfg.server.socket_path = "relative/sttd.sock".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_socket_path() {
        let mut cfg = Config::default();
        cfg.server.socket_path = String::new();
        assert!(cfg.validate().is_err());
    }
}
