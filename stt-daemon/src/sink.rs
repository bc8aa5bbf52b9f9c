//! Concrete Output Sink (C8): stdout + clipboard + synthetic paste.
//!
//! Replaces the Windows-only FFI text injector with `arboard` (clipboard)
//! and `enigo` (synthetic keystrokes), matching the platform-portable
//! paste pattern used elsewhere in the example pack.

use parking_lot::Mutex;

use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use stt_core::error::{Result, SttError};
use stt_core::sink::OutputSink;
use tracing::{debug, warn};

use crate::config::TextValidationConfig;

const CONTROL_BLOCKLIST_DEFAULT: &[char] = &['\u{0000}'];

/// Strips ASCII control bytes (keeping `\n`/`\t`), applies the configured
/// custom blocklist, and optionally drops punctuation. Never rejects text
/// outright — an over-aggressive sink would silently eat legitimate
/// transcriptions, so filtering degrades gracefully instead of erroring.
pub fn sanitize(text: &str, cfg: &TextValidationConfig) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_control() && ch != '\n' && ch != '\t' {
            continue;
        }
        if CONTROL_BLOCKLIST_DEFAULT.contains(&ch) {
            continue;
        }
        if !cfg.allow_punctuation && ch.is_ascii_punctuation() {
            continue;
        }
        out.push(ch);
    }
    for blocked in &cfg.custom_blocklist {
        if !blocked.is_empty() {
            out = out.replace(blocked.as_str(), "");
        }
    }
    out
}

/// Delivers transcribed text to stdout, the system clipboard, and —
/// when `auto_paste` is enabled — synthesizes a paste keystroke into the
/// focused window.
pub struct DesktopSink {
    auto_paste: bool,
    validation: TextValidationConfig,
    enigo: Mutex<Option<Enigo>>,
}

impl DesktopSink {
    pub fn new(auto_paste: bool, validation: TextValidationConfig) -> Self {
        let enigo = if auto_paste {
            match Enigo::new(&Settings::default()) {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!("enigo init failed, auto-paste disabled: {e}");
                    None
                }
            }
        } else {
            None
        };
        Self {
            auto_paste,
            validation,
            enigo: Mutex::new(enigo),
        }
    }

    fn paste(&self) -> Result<()> {
        let mut guard = self.enigo.lock();
        let Some(enigo) = guard.as_mut() else {
            return Ok(());
        };
        #[cfg(target_os = "macos")]
        let modifier = Key::Meta;
        #[cfg(not(target_os = "macos"))]
        let modifier = Key::Control;

        enigo
            .key(modifier, Direction::Press)
            .and_then(|_| enigo.key(Key::Unicode('v'), Direction::Click))
            .and_then(|_| enigo.key(modifier, Direction::Release))
            .map_err(|e| SttError::Other(anyhow::anyhow!("synthetic paste failed: {e}")))
    }
}

impl OutputSink for DesktopSink {
    fn deliver(&self, text: &str) -> Result<()> {
        let clean = sanitize(text, &self.validation);
        if clean.trim().is_empty() {
            debug!("sink received empty text after sanitization, skipping delivery");
            return Ok(());
        }

        println!("{clean}");

        if let Err(e) = arboard::Clipboard::new().and_then(|mut cb| cb.set_text(clean.clone())) {
            warn!("clipboard write failed: {e}");
        }

        if self.auto_paste {
            if let Err(e) = self.paste() {
                warn!("auto-paste failed: {e}");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(allow_punctuation: bool, blocklist: &[&str]) -> TextValidationConfig {
        TextValidationConfig {
            mode: "permissive".to_string(),
            allow_punctuation,
            custom_blocklist: blocklist.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn strips_control_bytes_but_keeps_newline_and_tab() {
        let input = "hello\u{0007}\tworld\n";
        let out = sanitize(input, &cfg(true, &[]));
        assert_eq!(out, "hello\tworld\n");
    }

    #[test]
    fn drops_punctuation_when_disallowed() {
        let out = sanitize("Hello, world!", &cfg(false, &[]));
        assert_eq!(out, "Hello world");
    }

    #[test]
    fn applies_custom_blocklist() {
        let out = sanitize("the quick brown fox", &cfg(true, &["quick "]));
        assert_eq!(out, "the brown fox");
    }
}
