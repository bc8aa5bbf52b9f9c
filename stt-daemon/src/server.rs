//! Control Server (C7): a UNIX domain socket accepting one JSON
//! `Command`/`Response` exchange per connection.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use stt_core::error::{Result, SttError};
use stt_core::ipc::wire::{Command, Response};
use stt_core::session::SessionController;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EngineHandle;
use crate::stats::ServerStats;

const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Verify `path` is safe to bind: absolute, with an existing parent
/// directory, and — if a stale socket file is present — only ever
/// unlinked after an explicit probe. Never a blind `unlink`.
pub fn prepare_socket_path(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(SttError::InitError(format!(
            "server.socket_path must be absolute, got '{}'",
            path.display()
        )));
    }
    let parent = path.parent().ok_or_else(|| {
        SttError::InitError(format!(
            "server.socket_path '{}' has no parent directory",
            path.display()
        ))
    })?;
    if !parent.is_dir() {
        return Err(SttError::InitError(format!(
            "server.socket_path parent '{}' does not exist",
            parent.display()
        )));
    }

    if path.exists() {
        // Probe-then-unlink: a successful connect means a live daemon owns
        // this socket, so we must not touch it. Only a refused/reset
        // connect means the file is a stale leftover from a prior run.
        match std::os::unix::net::UnixStream::connect(path) {
            Ok(_) => {
                return Err(SttError::InitError(format!(
                    "socket '{}' is already in use by another instance",
                    path.display()
                )));
            }
            Err(_) => {
                std::fs::remove_file(path).map_err(|e| {
                    SttError::InitError(format!("failed to remove stale socket: {e}"))
                })?;
            }
        }
    }
    Ok(())
}

/// Bind the listener, chmod it owner-rw-only, and accept connections until
/// `cancel` fires. Each connection is handled with a 1-second accept-loop
/// deadline so shutdown is checked regularly even under idle load.
pub async fn run(
    socket_path: std::path::PathBuf,
    accept_timeout: Duration,
    session: Arc<SessionController>,
    engine: EngineHandle,
    stats: Arc<ServerStats>,
    model_name: String,
    language: String,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = UnixListener::bind(&socket_path)
        .map_err(|e| SttError::InitError(format!("failed to bind control socket: {e}")))?;

    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(&socket_path, perms)
        .map_err(|e| SttError::InitError(format!("failed to chmod control socket: {e}")))?;

    info!(path = %socket_path.display(), "control server listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("control server shutting down");
                break;
            }
            result = tokio::time::timeout(accept_timeout, listener.accept()) => {
                match result {
                    Ok(Ok((stream, _addr))) => {
                        let session = Arc::clone(&session);
                        let engine = engine.clone();
                        let stats = Arc::clone(&stats);
                        let model_name = model_name.clone();
                        let language = language.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, session, engine, stats, model_name, language).await
                            {
                                warn!("connection handler error: {e}");
                            }
                        });
                    }
                    Ok(Err(e)) => warn!("accept failed: {e}"),
                    Err(_) => {} // accept-loop deadline elapsed, loop back to check cancellation
                }
            }
        }
    }

    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

async fn handle_connection(
    mut stream: UnixStream,
    session: Arc<SessionController>,
    engine: EngineHandle,
    stats: Arc<ServerStats>,
    model_name: String,
    language: String,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }

    let response = match serde_json::from_slice::<Command>(&buf[..n]) {
        Ok(cmd) => {
            // start/stop block on the orchestrator thread opening or
            // closing the audio device — run dispatch on a blocking
            // thread so a slow device open never stalls the reactor.
            tokio::task::spawn_blocking(move || dispatch(&cmd, &session, &engine, &stats, &model_name, &language))
                .await
                .unwrap_or_else(|e| {
                    warn!("dispatch task panicked: {e}");
                    Response::error("internal error")
                })
        }
        Err(e) => {
            debug!("malformed control request: {e}");
            Response::error("Invalid command")
        }
    };

    let body = serde_json::to_vec(&response)
        .map_err(|e| SttError::ProtocolError(format!("failed to serialize response: {e}")))?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

fn dispatch(
    cmd: &Command,
    session: &SessionController,
    engine: &EngineHandle,
    stats: &ServerStats,
    model_name: &str,
    language: &str,
) -> Response {
    match cmd.action.as_str() {
        "start" => {
            let state = engine.start(cmd.option_true("continuous"));
            Response::success(format!("Transcriber started ({})", state.as_str()))
        }
        "stop" => {
            let state = engine.stop();
            Response::success(format!("Transcriber stopped ({})", state.as_str()))
        }
        "status" => status_response(cmd, session, stats, model_name, language),
        "logs" => logs_response(stats),
        other => {
            debug!("unknown control action: {other}");
            Response::error("Invalid command")
        }
    }
}

fn status_response(
    cmd: &Command,
    session: &SessionController,
    stats: &ServerStats,
    model_name: &str,
    language: &str,
) -> Response {
    let state = session.state();
    let message = if state.is_running() {
        "Transcriber is running"
    } else {
        "Transcriber is stopped"
    };

    if !cmd.option_true("verbose") {
        return Response::success(message);
    }

    let mut data: HashMap<String, Value> = HashMap::new();
    data.insert("state".to_string(), Value::String(state.as_str().to_string()));
    data.insert("uptime".to_string(), Value::from(stats.uptime_secs()));
    data.insert(
        "transcription_count".to_string(),
        Value::from(stats.transcription_count()),
    );
    data.insert("error_count".to_string(), Value::from(stats.error_count()));
    data.insert(
        "last_transcription".to_string(),
        stats
            .last_transcription()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    data.insert(
        "last_error".to_string(),
        stats.last_error().map(Value::String).unwrap_or(Value::Null),
    );
    data.insert(
        "last_error_time".to_string(),
        stats
            .last_error_time()
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    data.insert(
        "continuous_mode".to_string(),
        Value::Bool(session.is_continuous()),
    );
    data.insert("model".to_string(), Value::String(model_name.to_string()));
    data.insert("language".to_string(), Value::String(language.to_string()));

    Response::success_with_data(message, data)
}

fn logs_response(stats: &ServerStats) -> Response {
    let logs = stats.recent_logs();
    let mut data = HashMap::new();
    data.insert(
        "entries".to_string(),
        serde_json::to_value(logs).unwrap_or(Value::Array(Vec::new())),
    );
    Response::success_with_data("recent log entries", data)
}

pub fn unix_time_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
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
    fn status_reports_stopped_when_idle() {
        let session = SessionController::new(SessionConfig::default());
        let stats = ServerStats::default();
        let cmd = Command { action: "status".into(), options: HashMap::new() };
        let resp = status_response(&cmd, &session, &stats, "base.en", "en");
        assert_eq!(resp.message.as_deref(), Some("Transcriber is stopped"));
    }

    #[test]
    fn status_reports_running_when_listening() {
        let session = SessionController::new(SessionConfig::default());
        session.start(false).unwrap();
        let stats = ServerStats::default();
        let cmd = Command { action: "status".into(), options: HashMap::new() };
        let resp = status_response(&cmd, &session, &stats, "base.en", "en");
        assert_eq!(resp.message.as_deref(), Some("Transcriber is running"));
    }

    #[test]
    fn unknown_action_is_protocol_error() {
        let session = Arc::new(SessionController::new(SessionConfig::default()));
        let engine = fake_engine(Arc::clone(&session));
        let stats = ServerStats::default();
        let cmd = Command { action: "bogus".into(), options: HashMap::new() };
        let resp = dispatch(&cmd, &session, &engine, &stats, "base.en", "en");
        assert_eq!(resp.status, "error");
        assert_eq!(resp.error.as_deref(), Some("Invalid command"));
    }

    #[test]
    fn start_then_status_then_stop_round_trips() {
        let session = Arc::new(SessionController::new(SessionConfig::default()));
        let engine = fake_engine(Arc::clone(&session));
        let stats = ServerStats::default();
        let start_cmd = Command { action: "start".into(), options: HashMap::new() };
        assert_eq!(dispatch(&start_cmd, &session, &engine, &stats, "base.en", "en").status, "success");
        assert_eq!(session.state(), SessionState::Listening);

        let stop_cmd = Command { action: "stop".into(), options: HashMap::new() };
        assert_eq!(dispatch(&stop_cmd, &session, &engine, &stats, "base.en", "en").status, "success");
        assert_eq!(session.state(), SessionState::Idle);
    }

    /// Exercises `prepare_socket_path` directly against an unsafe
    /// (relative) path, per S6.
    #[test]
    fn prepare_socket_path_rejects_relative_path() {
        let err = prepare_socket_path(Path::new("relative/sttd.sock")).unwrap_err();
        assert!(matches!(err, SttError::InitError(_)));
    }
}
