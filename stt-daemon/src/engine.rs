//! Orchestrator: owns the Ring Buffer and opens/closes the Audio Capture
//! device and Pipeline Processor thread as the Session Controller moves
//! in and out of `Listening`, per §4.6's transition table. The control
//! server and keyboard listener never touch capture/pipeline directly —
//! they send `EngineRequest`s through an `EngineHandle` and act on the
//! resulting `SessionState`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use stt_core::audio::tone::{self, ToneConfig};
use stt_core::audio::AudioCapture;
use stt_core::buffering::RingBuffer;
use stt_core::pipeline::{self, Pipeline, PipelineConfig, PipelineDiagnostics, UtteranceReady};
use stt_core::session::{SessionController, SessionState};
use tracing::{error, info};

const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// One request sent to the orchestrator thread from the control server or
/// the keyboard listener.
pub enum EngineRequest {
    Start {
        continuous: bool,
        reply: Sender<SessionState>,
    },
    Stop {
        reply: Sender<SessionState>,
    },
    Shutdown,
}

/// Cheaply cloneable handle callers use to talk to the orchestrator thread.
#[derive(Clone)]
pub struct EngineHandle(pub(crate) Sender<EngineRequest>);

impl EngineHandle {
    pub fn start(&self, continuous: bool) -> SessionState {
        let (reply, rx) = bounded(1);
        if self
            .0
            .send(EngineRequest::Start { continuous, reply })
            .is_err()
        {
            return SessionState::Idle;
        }
        rx.recv_timeout(Duration::from_secs(5))
            .unwrap_or(SessionState::Idle)
    }

    pub fn stop(&self) -> SessionState {
        let (reply, rx) = bounded(1);
        if self.0.send(EngineRequest::Stop { reply }).is_err() {
            return SessionState::Idle;
        }
        rx.recv_timeout(Duration::from_secs(5))
            .unwrap_or(SessionState::Idle)
    }

    pub fn shutdown(&self) {
        let _ = self.0.send(EngineRequest::Shutdown);
    }
}

struct ActiveSession {
    capture_running: Arc<AtomicBool>,
    pipeline_running: Arc<AtomicBool>,
    capture_handle: std::thread::JoinHandle<()>,
    pipeline_handle: std::thread::JoinHandle<()>,
}

/// Drives capture/pipeline lifecycle from Session Controller transitions.
pub struct Engine {
    session: Arc<SessionController>,
    ring: Arc<RingBuffer>,
    pipeline_config: PipelineConfig,
    diagnostics: Arc<PipelineDiagnostics>,
    target_sample_rate: u32,
    start_tone: ToneConfig,
    utterance_tx: Sender<UtteranceReady>,
    active: Option<ActiveSession>,
}

impl Engine {
    pub fn new(
        session: Arc<SessionController>,
        ring: Arc<RingBuffer>,
        pipeline_config: PipelineConfig,
        diagnostics: Arc<PipelineDiagnostics>,
        target_sample_rate: u32,
        start_tone: ToneConfig,
        utterance_tx: Sender<UtteranceReady>,
    ) -> Self {
        Self {
            session,
            ring,
            pipeline_config,
            diagnostics,
            target_sample_rate,
            start_tone,
            utterance_tx,
            active: None,
        }
    }

    /// Move `self` onto its own orchestrator thread. Returns a handle for
    /// issuing requests and the thread's `JoinHandle` for bounded shutdown.
    pub fn spawn(self) -> (EngineHandle, std::thread::JoinHandle<()>) {
        let (tx, rx) = bounded(8);
        let join = std::thread::spawn(move || self.run(rx));
        (EngineHandle(tx), join)
    }

    fn run(mut self, requests: Receiver<EngineRequest>) {
        loop {
            match requests.recv_timeout(TICK_INTERVAL) {
                Ok(EngineRequest::Start { continuous, reply }) => {
                    let state = self.handle_start(continuous);
                    let _ = reply.send(state);
                }
                Ok(EngineRequest::Stop { reply }) => {
                    let state = self.handle_stop();
                    let _ = reply.send(state);
                }
                Ok(EngineRequest::Shutdown) => {
                    self.handle_stop();
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.handle_stop();
                    break;
                }
            }
            self.tick();
        }
    }

    fn handle_start(&mut self, continuous: bool) -> SessionState {
        let state = self.session.start(continuous).unwrap_or(SessionState::Idle);
        if state == SessionState::Listening {
            self.open();
        }
        state
    }

    fn handle_stop(&mut self) -> SessionState {
        let state = self.session.stop();
        self.close();
        state
    }

    /// Drives the timeout-derived transitions §4.6 lists without a
    /// client-issued event: `max-session-timeout`, `inter-speech-timeout`,
    /// and single-shot's `Cooldown -> Idle` (which also closes capture).
    fn tick(&mut self) {
        if self.session.max_session_timeout_elapsed() {
            info!("max session duration elapsed, closing capture");
            self.close();
            self.session.stop();
            return;
        }
        if self.session.inter_speech_timeout_elapsed() {
            info!("inter-speech timeout elapsed, closing capture");
            self.close();
            self.session.stop();
            return;
        }
        match self.session.state() {
            SessionState::Cooldown => {
                self.close();
                self.session.cooldown_complete();
            }
            SessionState::Idle => self.close(),
            _ => {}
        }
    }

    fn open(&mut self) {
        if self.active.is_some() {
            return;
        }
        self.ring.clear();
        self.diagnostics.reset();

        let capture_running = Arc::new(AtomicBool::new(true));
        let pipeline_running = Arc::new(AtomicBool::new(true));

        let capture_ring = Arc::clone(&self.ring);
        let cr = Arc::clone(&capture_running);
        let target_sample_rate = self.target_sample_rate;
        let start_tone = self.start_tone;
        let capture_handle = std::thread::spawn(move || {
            tone::play_blocking(&start_tone);
            match AudioCapture::open_default(capture_ring, Arc::clone(&cr), target_sample_rate) {
                Ok(capture) => {
                    while cr.load(Ordering::Acquire) {
                        std::thread::sleep(Duration::from_millis(50));
                    }
                    capture.stop();
                }
                Err(e) => {
                    error!("failed to open audio capture: {e}");
                    cr.store(false, Ordering::Release);
                }
            }
        });

        let pipeline_ring = Arc::clone(&self.ring);
        let pr = Arc::clone(&pipeline_running);
        let pipeline_obj = Pipeline::new(self.pipeline_config.clone(), Arc::clone(&self.diagnostics));
        let utterance_tx = self.utterance_tx.clone();
        let pipeline_handle = std::thread::spawn(move || {
            pipeline::run(pipeline_ring, pr, pipeline_obj, utterance_tx);
        });

        self.active = Some(ActiveSession {
            capture_running,
            pipeline_running,
            capture_handle,
            pipeline_handle,
        });
    }

    fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.capture_running.store(false, Ordering::Release);
            active.pipeline_running.store(false, Ordering::Release);
            let _ = active.capture_handle.join();
            let _ = active.pipeline_handle.join();
        }
    }
}
