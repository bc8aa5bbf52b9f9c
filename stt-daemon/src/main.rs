//! `sttd` — the local speech-to-text daemon entry point.
//!
//! Wires together the Ring Buffer, Audio Capture, Pipeline Processor,
//! Transcriber, Session Controller, and Control Server, then blocks on
//! the Supervisor until a shutdown signal arrives.

mod config;
mod engine;
mod keyboard;
mod logging;
mod model_cache;
mod server;
mod sink;
mod stats;
mod supervisor;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::bounded;
use stt_core::buffering::RingBuffer;
use stt_core::error::{Result, SttError};
use stt_core::inference::whisper::{WhisperConfig, WhisperModel};
use stt_core::inference::{ModelHandle, SpeechModel};
use stt_core::pipeline::{PipelineConfig, PipelineDiagnostics};
use stt_core::session::{SessionConfig, SessionController};
use stt_core::sink::OutputSink;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::sink::DesktopSink;
use crate::stats::ServerStats;

#[derive(Parser, Debug)]
#[command(name = "sttd", about = "Local speech-to-text daemon", version)]
struct Args {
    /// Path to the daemon's JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Enable debug-level logging.
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            // Config is invalid before tracing is initialized — the only
            // point at which this daemon logs straight to stderr.
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::prepare_socket_path(std::path::Path::new(&config.server.socket_path)) {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }

    let stats = Arc::new(ServerStats::new());
    logging::init(Arc::clone(&stats), args.verbose);
    info!("sttd starting");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(run(config, stats));
    std::process::exit(exit_code);
}

async fn run(config: Config, stats: Arc<ServerStats>) -> i32 {
    match run_inner(config, Arc::clone(&stats)).await {
        Ok(()) => {
            info!("sttd exited cleanly");
            0
        }
        Err(e) => {
            error!("fatal error: {e}");
            1
        }
    }
}

async fn run_inner(config: Config, stats: Arc<ServerStats>) -> Result<()> {
    let model_name = config.whisper.model.clone();
    let model_source = config
        .whisper
        .models
        .get(&model_name)
        .expect("validated at config load")
        .clone();

    let cache_dir = PathBuf::from("models");
    let model_name_for_blocking = model_name.clone();
    let model_path = tokio::task::spawn_blocking(move || {
        model_cache::ensure_model(&cache_dir, &model_name_for_blocking, &model_source)
    })
    .await
    .map_err(|e| SttError::InitError(format!("model cache task panicked: {e}")))??;

    let whisper_config = WhisperConfig {
        model_path,
        auto_detect_language: config.whisper.auto_detect_language,
        language: config.whisper.language.clone(),
        beam_size: config.whisper.beam_size,
        use_gpu: false,
    };

    // Persistent model load at startup (Open Question #3 resolution).
    let mut whisper_model = WhisperModel::new(whisper_config);
    whisper_model
        .warm_up()
        .map_err(|e| SttError::InitError(format!("failed to warm up whisper model: {e}")))?;
    // "auto" only resolves once the model's multilingual-ness is known, so
    // the status-reported language label is read back after warm-up rather
    // than computed from config alone (§4.5 step 2).
    let language_label = whisper_model.effective_language().to_string();
    let model_handle = ModelHandle::new(whisper_model);

    let ring_capacity = config.audio.buffered_frames * config.audio.frame_length;
    let ring = Arc::new(RingBuffer::new(ring_capacity.max(config.audio.frame_length)));

    let session_config = SessionConfig {
        continuous: config.processing.continuous_mode.enabled,
        max_session_duration: Duration::from_secs(config.processing.continuous_mode.max_session_duration),
        inter_speech_timeout: Duration::from_secs(config.processing.continuous_mode.inter_speech_timeout),
        auto_stop_on_idle: config.processing.continuous_mode.auto_stop_on_idle,
    };
    let session = Arc::new(SessionController::new(session_config));

    let pipeline_config = PipelineConfig {
        frame_length: config.audio.frame_length,
        sample_rate: config.audio.sample_rate,
        silence_threshold: config.audio.silence_threshold,
        silence_duration_sec: config.audio.silence_duration,
        max_utterance_samples: (config.audio.max_duration * config.audio.sample_rate as f32) as usize,
    };
    let diagnostics = Arc::new(PipelineDiagnostics::default());
    let (utterance_tx, utterance_rx) = bounded(config.processing.channel_buffer_size);

    let start_tone = tone_config(&config.audio.start_tone);
    let engine = Engine::new(
        Arc::clone(&session),
        Arc::clone(&ring),
        pipeline_config,
        diagnostics,
        config.audio.sample_rate,
        start_tone,
        utterance_tx,
    );
    let (engine_handle, engine_join) = engine.spawn();

    let sink: Arc<dyn OutputSink> = Arc::new(DesktopSink::new(
        config.processing.auto_paste,
        config.processing.text_validation.clone(),
    ));

    let completion_tone = tone_config(&config.audio.completion_tone);
    let error_tone = tone_config(&config.audio.error_tone);
    let transcriber_session = Arc::clone(&session);
    let transcriber_stats = Arc::clone(&stats);
    let transcriber_model = model_handle.clone();
    let transcriber_handle = std::thread::spawn(move || {
        run_transcription_loop(
            utterance_rx,
            transcriber_model,
            sink,
            transcriber_session,
            transcriber_stats,
            completion_tone,
            error_tone,
        );
    });

    let keyboard_running = Arc::new(AtomicBool::new(true));
    let keyboard_handle = if config.server.keyboard_enabled {
        Some(keyboard::spawn(
            config.server.hotkeys.clone(),
            Arc::clone(&session),
            engine_handle.clone(),
            Arc::clone(&keyboard_running),
        ))
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(server::run(
        std::path::PathBuf::from(&config.server.socket_path),
        Duration::from_secs(config.server.socket_timeout),
        Arc::clone(&session),
        engine_handle.clone(),
        Arc::clone(&stats),
        model_name,
        language_label,
        server_cancel,
    ));

    supervisor::wait_for_shutdown(cancel).await;

    // Signal every cancellation-aware task immediately, then race the
    // actual joins against the shutdown budget (§5, §8 invariant 7).
    engine_handle.shutdown();
    keyboard_running.store(false, std::sync::atomic::Ordering::Release);

    let shutdown_budget = Duration::from_secs(config.processing.shutdown_timeout);
    let joins = async {
        if let Err(e) = server_task.await {
            warn!("control server task join error: {e}");
        }
        match tokio::task::spawn_blocking(move || engine_join.join()).await {
            Ok(Err(e)) => warn!("engine thread join error: {e:?}"),
            Err(e) => warn!("engine thread join task panicked: {e}"),
            _ => {}
        }
        match tokio::task::spawn_blocking(move || transcriber_handle.join()).await {
            Ok(Err(e)) => warn!("transcriber thread join error: {e:?}"),
            Err(e) => warn!("transcriber thread join task panicked: {e}"),
            _ => {}
        }
        if let Some(handle) = keyboard_handle {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Err(e)) => warn!("keyboard thread join error: {e:?}"),
                Err(e) => warn!("keyboard thread join task panicked: {e}"),
                _ => {}
            }
        }
    };

    if tokio::time::timeout(shutdown_budget, joins).await.is_err() {
        error!("shutdown budget exceeded, forcing exit");
        std::process::exit(1);
    }

    Ok(())
}

fn tone_config(settings: &config::ToneSettings) -> stt_core::audio::tone::ToneConfig {
    stt_core::audio::tone::ToneConfig {
        enabled: settings.enabled,
        frequency_hz: settings.frequency,
        duration_ms: settings.duration,
        fade_ms: settings.fade_ms,
    }
}

/// Drains completed utterances, transcribes them, and delivers
/// non-empty text to the sink, driving the Session Controller's
/// `Transcribing` -> `Listening`/`Cooldown` transitions.
fn run_transcription_loop(
    utterance_rx: crossbeam_channel::Receiver<stt_core::pipeline::UtteranceReady>,
    model: ModelHandle,
    sink: Arc<dyn OutputSink>,
    session: Arc<SessionController>,
    stats: Arc<ServerStats>,
    completion_tone: stt_core::audio::tone::ToneConfig,
    error_tone: stt_core::audio::tone::ToneConfig,
) {
    for utterance in utterance_rx.iter() {
        if session.utterance_ready().is_err() {
            continue;
        }

        let result = model.0.lock().transcribe(&utterance.samples);
        match result {
            Ok(text) => {
                if !text.is_empty() {
                    stats.record_transcription(&text);
                    if let Err(e) = sink.deliver(&text) {
                        warn!("sink delivery failed: {e}");
                    }
                }
                let _ = session.text_event();
                stt_core::audio::tone::play_blocking(&completion_tone);
            }
            Err(e) => {
                warn!("inference error: {e}");
                if e.is_countable() {
                    stats.record_error(&e.to_string(), server::unix_time_now());
                }
                let _ = session.inference_error();
                stt_core::audio::tone::play_blocking(&error_tone);
            }
        }
    }
}
