//! Session Controller (C6): the Idle/Listening/Transcribing/Cooldown state
//! machine, continuous-vs-single-shot mode, and the timeout derivations
//! that drive `stt-daemon`'s orchestration loop.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use crate::error::{Result, SttError};

/// §3 Session State.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Transcribing,
    Cooldown,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Transcribing => "transcribing",
            SessionState::Cooldown => "cooldown",
        }
    }

    /// Whether this state counts as "running" for the `status` action's
    /// plain-text summary (§8 invariant 6 / S5).
    pub fn is_running(self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub continuous: bool,
    pub max_session_duration: Duration,
    pub inter_speech_timeout: Duration,
    pub auto_stop_on_idle: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            max_session_duration: Duration::from_secs(3600),
            inter_speech_timeout: Duration::from_secs(30),
            auto_stop_on_idle: true,
        }
    }
}

struct Inner {
    state: SessionState,
    config: SessionConfig,
    session_started_at: Option<Instant>,
    last_speech_at: Option<Instant>,
}

/// Thread-safe session state machine per the §4.6 transition table. Holds
/// no I/O resources itself — callers (the daemon's orchestration loop) own
/// capture/pipeline/transcriber and call these transition methods as
/// events occur, then act on the returned state.
pub struct SessionController {
    inner: Mutex<Inner>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                config,
                session_started_at: None,
                last_speech_at: None,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_continuous(&self) -> bool {
        self.inner.lock().config.continuous
    }

    /// `Idle --start--> Listening`. Idempotent: starting an already-running
    /// session is not an error (§ supplemented idempotency behavior).
    pub fn start(&self, continuous: bool) -> Result<SessionState> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Idle {
            return Ok(inner.state);
        }
        inner.config.continuous = continuous;
        inner.state = SessionState::Listening;
        inner.session_started_at = Some(Instant::now());
        inner.last_speech_at = Some(Instant::now());
        info!(continuous, "session started — listening");
        Ok(inner.state)
    }

    /// `Listening --utterance-ready--> Transcribing`.
    pub fn utterance_ready(&self) -> Result<SessionState> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Listening {
            return Err(SttError::PipelineError(format!(
                "utterance-ready received in state {:?}",
                inner.state
            )));
        }
        inner.state = SessionState::Transcribing;
        Ok(inner.state)
    }

    /// `Transcribing --text-event--> Listening (continuous) | Cooldown->Idle (single-shot)`.
    pub fn text_event(&self) -> Result<SessionState> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Transcribing {
            return Err(SttError::PipelineError(format!(
                "text-event received in state {:?}",
                inner.state
            )));
        }
        inner.last_speech_at = Some(Instant::now());
        inner.state = if inner.config.continuous {
            SessionState::Listening
        } else {
            SessionState::Cooldown
        };
        Ok(inner.state)
    }

    /// `Transcribing --inference-error--> Listening | Idle`, depending on
    /// continuous mode, matching the same fork as a successful text-event.
    pub fn inference_error(&self) -> Result<SessionState> {
        let mut inner = self.inner.lock();
        inner.state = if inner.config.continuous {
            SessionState::Listening
        } else {
            SessionState::Idle
        };
        Ok(inner.state)
    }

    /// Single-shot sessions land in `Cooldown` after their one
    /// transcription; the orchestration loop calls this once cleanup
    /// (closing capture) is done to finish the `Cooldown -> Idle` edge.
    pub fn cooldown_complete(&self) -> SessionState {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Cooldown {
            inner.state = SessionState::Idle;
        }
        inner.state
    }

    /// `Listening --inter-speech-timeout--> Idle` (if `AutoStopOnIdle`).
    pub fn inter_speech_timeout_elapsed(&self) -> bool {
        let inner = self.inner.lock();
        if inner.state != SessionState::Listening || !inner.config.auto_stop_on_idle {
            return false;
        }
        match inner.last_speech_at {
            Some(t) => t.elapsed() >= inner.config.inter_speech_timeout,
            None => false,
        }
    }

    /// `any --max-session-timeout--> Idle`.
    pub fn max_session_timeout_elapsed(&self) -> bool {
        let inner = self.inner.lock();
        match inner.session_started_at {
            Some(t) => inner.state != SessionState::Idle && t.elapsed() >= inner.config.max_session_duration,
            None => false,
        }
    }

    /// `Listening/Transcribing --stop--> Idle`. Idempotent when already
    /// Idle.
    pub fn stop(&self) -> SessionState {
        let mut inner = self.inner.lock();
        inner.state = SessionState::Idle;
        inner.session_started_at = None;
        info!("session stopped");
        inner.state
    }

    pub fn reset_speech_timer(&self) {
        self.inner.lock().last_speech_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_stop_round_trips_to_idle() {
        let ctl = SessionController::new(SessionConfig::default());
        assert_eq!(ctl.start(false).unwrap(), SessionState::Listening);
        assert_eq!(ctl.stop(), SessionState::Idle);
    }

    #[test]
    fn start_is_idempotent_when_already_listening() {
        let ctl = SessionController::new(SessionConfig::default());
        ctl.start(false).unwrap();
        assert_eq!(ctl.start(true).unwrap(), SessionState::Listening);
    }

    #[test]
    fn stop_is_idempotent_when_already_idle() {
        let ctl = SessionController::new(SessionConfig::default());
        assert_eq!(ctl.stop(), SessionState::Idle);
    }

    #[test]
    fn continuous_mode_returns_to_listening_after_text_event() {
        let ctl = SessionController::new(SessionConfig::default());
        ctl.start(true).unwrap();
        ctl.utterance_ready().unwrap();
        assert_eq!(ctl.text_event().unwrap(), SessionState::Listening);
    }

    #[test]
    fn single_shot_mode_cools_down_then_idles() {
        let ctl = SessionController::new(SessionConfig::default());
        ctl.start(false).unwrap();
        ctl.utterance_ready().unwrap();
        assert_eq!(ctl.text_event().unwrap(), SessionState::Cooldown);
        assert_eq!(ctl.cooldown_complete(), SessionState::Idle);
    }

    #[test]
    fn utterance_ready_outside_listening_is_an_error() {
        let ctl = SessionController::new(SessionConfig::default());
        assert!(ctl.utterance_ready().is_err());
    }

    #[test]
    fn max_session_timeout_fires_after_duration_elapsed() {
        let mut cfg = SessionConfig::default();
        cfg.max_session_duration = Duration::from_millis(1);
        let ctl = SessionController::new(cfg);
        ctl.start(true).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(ctl.max_session_timeout_elapsed());
    }

    #[test]
    fn inter_speech_timeout_only_fires_while_listening() {
        let mut cfg = SessionConfig::default();
        cfg.inter_speech_timeout = Duration::from_millis(1);
        let ctl = SessionController::new(cfg);
        assert!(!ctl.inter_speech_timeout_elapsed(), "not running yet");
        ctl.start(true).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(ctl.inter_speech_timeout_elapsed());
    }
}
