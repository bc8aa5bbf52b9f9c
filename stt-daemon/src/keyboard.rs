//! Optional stdin keyboard listener (§4.7, `server.keyboard_enabled`):
//! maps configured single-character hotkeys to session actions, for
//! running the daemon attached to a terminal without a separate `sttctl`
//! call.
//!
//! Reads stdin one byte at a time rather than by line, so the dispatch
//! loop only ever waits on a bounded channel recv with a short deadline —
//! never on the raw blocking read itself. That keeps the dispatch thread
//! cancellation-aware and joinable with a bounded wait at shutdown. The
//! raw reader thread underneath it stays detached: a blocking single-byte
//! `read()` on stdin cannot itself be interrupted, so it only unwinds
//! once stdin closes or a keystroke finds the channel disconnected.

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use stt_core::session::SessionController;
use tracing::{info, warn};

use crate::engine::EngineHandle;

const DISPATCH_TICK: Duration = Duration::from_millis(200);

/// Spawns the raw stdin reader and a joinable dispatch thread. Dispatch
/// stops within one `DISPATCH_TICK` of `running` going false.
pub fn spawn(
    hotkeys: HashMap<String, String>,
    session: Arc<SessionController>,
    engine: EngineHandle,
    running: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    let (byte_tx, byte_rx) = bounded::<u8>(64);

    std::thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if byte_tx.send(buf[0]).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    std::thread::spawn(move || {
        info!("keyboard listener enabled, reading stdin for hotkeys");
        let mut line = String::new();
        while running.load(Ordering::Acquire) {
            match byte_rx.recv_timeout(DISPATCH_TICK) {
                Ok(byte) => {
                    let ch = byte as char;
                    if ch == '\n' || ch == '\r' {
                        let key = line.trim().to_string();
                        line.clear();
                        if key.is_empty() {
                            continue;
                        }
                        if let Some(action) = hotkeys.get(&key) {
                            dispatch(action, &session, &engine);
                        }
                    } else {
                        line.push(ch);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}

fn dispatch(action: &str, session: &SessionController, engine: &EngineHandle) {
    match action {
        "start" => {
            engine.start(session.is_continuous());
        }
        "stop" => {
            engine.stop();
        }
        "resume" => {
            warn!("resume: no defined semantics");
        }
        other => warn!("keyboard hotkey mapped to unknown action '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineRequest;
    use stt_core::session::{SessionConfig, SessionState};

    /// Session-transition stand-in for `Engine` that skips capture/pipeline
    /// entirely, for exercising `dispatch`'s routing in isolation.
    fn fake_engine(session: Arc<SessionController>) -> EngineHandle {
        let (tx, rx) = crossbeam_channel::bounded(8);
        std::thread::spawn(move || {
            for req in rx.iter() {
                match req {
                    EngineRequest::Start { continuous, reply } => {
                        let state = session.start(continuous).unwrap_or(SessionState::Idle);
                        let _ = reply.send(state);
                    }
                    EngineRequest::Stop { reply } => {
                        let _ = reply.send(session.stop());
                    }
                    EngineRequest::Shutdown => break,
                }
            }
        });
        EngineHandle(tx)
    }

    #[test]
    fn start_action_transitions_session() {
        let session = Arc::new(SessionController::new(SessionConfig::default()));
        let engine = fake_engine(Arc::clone(&session));
        dispatch("start", &session, &engine);
        assert!(session.state().is_running());
    }

    #[test]
    fn resume_action_is_a_logged_no_op() {
        let session = Arc::new(SessionController::new(SessionConfig::default()));
        let engine = fake_engine(Arc::clone(&session));
        dispatch("resume", &session, &engine);
        assert!(!session.state().is_running());
    }

    #[test]
    fn unknown_action_does_not_panic() {
        let session = Arc::new(SessionController::new(SessionConfig::default()));
        let engine = fake_engine(Arc::clone(&session));
        dispatch("does-not-exist", &session, &engine);
    }
}
