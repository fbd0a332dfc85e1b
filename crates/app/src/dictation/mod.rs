//! Live dictation daemon: near-realtime transcription typed into the
//! focused window.

pub mod engine;
pub mod punctuation;

use std::sync::Arc;
use std::time::{Duration, Instant};

use sotto_audio::{pick_device, AudioRingBuffer, CaptureStream, WindowResampler};
use sotto_foundation::{SharedConfig, ShutdownFlag, StateFiles};
use sotto_inject::KeystrokeInjector;
use sotto_stt::text::{collapse_whitespace, is_hallucination};
use sotto_stt::{ModelSpec, Transcriber, WhisperTranscriber};
use sotto_vad::{rms, voiced_ratio, VadConfig, VadGate};

use crate::daemonize;
use crate::envcfg::{env_f64, env_flag, env_string, env_u32, env_usize};
use crate::logging;

use self::engine::{DictationEngine, EngineConfig, TextSink};
use self::punctuation::PunctuationStyle;

pub const DAEMON_NAME: &str = "sotto-dictate";

#[derive(Debug, Clone)]
pub struct DictationConfig {
    pub step: Duration,
    pub window: Duration,
    pub max_buffer: Duration,
    pub vad: VadConfig,
    pub key_delay_ms: u32,
    pub engine: EngineConfig,
    pub stable_prefix_guard_words: usize,
    pub silence_reset: Duration,
    pub auto_stop_silence: Duration,
    pub silence_flush_guard_words: usize,
    pub exit_flush_guard_words: usize,
    pub exit_flush_max_idle: Duration,
    pub final_flush_pad: Duration,
    pub model: String,
    pub language: Option<String>,
    pub device_name: Option<String>,
    pub threads: Option<u32>,
    /// Emit heard/flushed text into the logs. Off keeps transcripts out of
    /// the log file entirely.
    pub log_transcripts: bool,
}

impl Default for DictationConfig {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(600),
            window: Duration::from_millis(4_000),
            max_buffer: Duration::from_millis(8_000),
            vad: VadConfig::default(),
            key_delay_ms: 2,
            engine: EngineConfig::default(),
            stable_prefix_guard_words: 1,
            silence_reset: Duration::from_millis(1_200),
            auto_stop_silence: Duration::from_millis(12_000),
            silence_flush_guard_words: 0,
            exit_flush_guard_words: 0,
            exit_flush_max_idle: Duration::from_millis(2_500),
            final_flush_pad: Duration::from_millis(800),
            model: "base.en".to_string(),
            language: Some("en".to_string()),
            device_name: None,
            threads: None,
            log_transcripts: true,
        }
    }
}

impl DictationConfig {
    /// All knobs under the `SOTTO_DICT_` prefix; unset or unparseable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let secs = |key: &str, default: Duration| {
            Duration::from_secs_f64(env_f64(key, default.as_secs_f64()).max(0.0))
        };

        let vad = VadConfig {
            rms_threshold: env_f64("SOTTO_DICT_RMS_THRESHOLD", d.vad.rms_threshold as f64) as f32,
            voiced_frame_ms: env_u32("SOTTO_DICT_VOICED_FRAME_MS", d.vad.voiced_frame_ms),
            min_voiced_ratio: env_f64("SOTTO_DICT_MIN_VOICED_RATIO", d.vad.min_voiced_ratio as f64)
                as f32,
            continuation: secs("SOTTO_DICT_VOICE_CONTINUATION_SECONDS", d.vad.continuation),
            rms_continuation_factor: env_f64(
                "SOTTO_DICT_RMS_CONTINUATION_FACTOR",
                d.vad.rms_continuation_factor as f64,
            ) as f32,
            voiced_continuation_factor: env_f64(
                "SOTTO_DICT_VOICED_CONTINUATION_FACTOR",
                d.vad.voiced_continuation_factor as f64,
            ) as f32,
        };

        let engine = EngineConfig {
            max_revise_words: env_usize(
                "SOTTO_DICT_TAIL_REVISION_MAX_WORDS",
                d.engine.max_revise_words,
            ),
            min_anchor_words: env_usize(
                "SOTTO_DICT_TAIL_REVISION_MIN_ANCHOR_WORDS",
                d.engine.min_anchor_words,
            ),
            min_emit_words: env_usize("SOTTO_DICT_MIN_EMIT_WORDS", d.engine.min_emit_words),
            history_words: env_usize("SOTTO_DICT_EMIT_HISTORY_WORDS", d.engine.history_words),
            punctuation: env_string("SOTTO_DICT_PUNCTUATION_STYLE")
                .map(|s| PunctuationStyle::parse(&s))
                .unwrap_or_default(),
            short_sentence_terminal_words: env_usize(
                "SOTTO_DICT_SHORT_SENTENCE_TERMINAL_WORDS",
                d.engine.short_sentence_terminal_words,
            ),
            flush_min_anchor_words: env_usize(
                "SOTTO_DICT_FLUSH_MIN_ANCHOR_WORDS",
                d.engine.flush_min_anchor_words,
            ),
        };

        Self {
            step: secs("SOTTO_DICT_STEP_SECONDS", d.step),
            window: secs("SOTTO_DICT_WINDOW_SECONDS", d.window),
            max_buffer: secs("SOTTO_DICT_MAX_BUFFER_SECONDS", d.max_buffer),
            vad,
            key_delay_ms: env_u32("SOTTO_DICT_KEY_DELAY_MS", d.key_delay_ms),
            engine,
            stable_prefix_guard_words: env_usize(
                "SOTTO_DICT_STABLE_PREFIX_GUARD_WORDS",
                d.stable_prefix_guard_words,
            ),
            silence_reset: secs("SOTTO_DICT_SILENCE_RESET_SECONDS", d.silence_reset),
            auto_stop_silence: secs("SOTTO_DICT_AUTO_STOP_SILENCE_SECONDS", d.auto_stop_silence),
            silence_flush_guard_words: env_usize(
                "SOTTO_DICT_SILENCE_FLUSH_GUARD_WORDS",
                d.silence_flush_guard_words,
            ),
            exit_flush_guard_words: env_usize(
                "SOTTO_DICT_EXIT_FLUSH_GUARD_WORDS",
                d.exit_flush_guard_words,
            ),
            exit_flush_max_idle: secs(
                "SOTTO_DICT_EXIT_FLUSH_MAX_IDLE_SECONDS",
                d.exit_flush_max_idle,
            ),
            final_flush_pad: secs("SOTTO_DICT_FINAL_FLUSH_PAD_SECONDS", d.final_flush_pad),
            model: env_string("SOTTO_DICT_MODEL").unwrap_or(d.model),
            language: env_string("SOTTO_DICT_LANGUAGE").or(d.language),
            device_name: env_string("SOTTO_DICT_DEVICE_NAME"),
            threads: env_string("SOTTO_DICT_THREADS").and_then(|v| v.parse().ok()),
            log_transcripts: env_flag("SOTTO_DICT_LOG_TRANSCRIPTS", d.log_transcripts),
        }
    }
}

/// Production sink: the ydotool injector.
struct InjectorSink {
    injector: KeystrokeInjector,
}

impl TextSink for InjectorSink {
    async fn type_text(&mut self, text: &str) -> Result<(), sotto_foundation::InjectionError> {
        self.injector.type_text(text).await
    }

    async fn backspace(&mut self, bytes: usize) -> usize {
        self.injector.backspace(bytes).await
    }
}

async fn decode_window(
    transcriber: &Arc<dyn Transcriber>,
    resampler: &mut WindowResampler,
    audio: &[f32],
    language: &Option<String>,
) -> String {
    let samples = resampler.resample(audio);
    if samples.is_empty() {
        return String::new();
    }
    let transcriber = transcriber.clone();
    let language = language.clone();
    match tokio::task::spawn_blocking(move || transcriber.transcribe(&samples, language.as_deref()))
        .await
    {
        Ok(Ok(text)) => {
            let text = collapse_whitespace(&text);
            if text.is_empty() || is_hallucination(&text) {
                String::new()
            } else {
                text
            }
        }
        Ok(Err(e)) => {
            tracing::debug!("decode failed: {}", e);
            String::new()
        }
        Err(e) => {
            tracing::warn!("decode task panicked: {}", e);
            String::new()
        }
    }
}

/// Foreground worker loop. Returns the process exit code.
pub async fn run(cfg: DictationConfig) -> i32 {
    let state = StateFiles::new(DAEMON_NAME);
    if let Err(e) = state.ensure_dir() {
        tracing::error!("cannot create state dir: {}", e);
        return 1;
    }
    if state.daemon_alive() && state.read_pid() != Some(std::process::id()) {
        return 0;
    }
    if let Err(e) = state.write_pid(std::process::id()) {
        tracing::error!("cannot write pid file: {}", e);
        return 1;
    }
    state.clear_stop();

    let shutdown = ShutdownFlag::new();
    shutdown.install_signal_handlers();

    let shared = SharedConfig::load();
    let language = cfg.language.clone().or_else(|| shared.language.clone());

    tracing::info!("loading model {}", cfg.model);
    let spec = ModelSpec::parse(&cfg.model);
    let transcriber: Arc<dyn Transcriber> = match WhisperTranscriber::load(&spec, cfg.threads) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            tracing::error!("failed to load model: {}", e);
            state.clear_all();
            return 1;
        }
    };

    let selected = match pick_device(cfg.device_name.as_deref(), &shared).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("{}", e);
            state.clear_all();
            return 1;
        }
    };
    let capture_rate = selected.sample_rate;
    let window_samples = (cfg.window.as_secs_f64() * capture_rate as f64) as usize;
    let pad_samples = (cfg.final_flush_pad.as_secs_f64() * capture_rate as f64) as usize;

    let ring = Arc::new(AudioRingBuffer::new(
        (cfg.max_buffer.as_secs_f64() * capture_rate as f64) as usize,
    ));
    let mut capture = match CaptureStream::spawn(selected, ring.clone()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to open capture stream: {}", e);
            state.clear_all();
            return 1;
        }
    };

    let mut resampler = WindowResampler::new(capture_rate);
    let mut gate = VadGate::new(cfg.vad.clone());
    let mut engine = DictationEngine::new(
        cfg.engine.clone(),
        InjectorSink {
            injector: KeystrokeInjector::new(cfg.key_delay_ms),
        },
    );

    let mut typing_enabled = state.typing_enabled();
    let mut loop_start = Instant::now();
    let mut last_voice: Option<Instant> = None;
    let mut last_process: Option<Instant> = None;
    let mut last_silence_log: Option<Instant> = None;

    tracing::info!(
        step_s = cfg.step.as_secs_f64(),
        window_s = cfg.window.as_secs_f64(),
        guard_words = cfg.stable_prefix_guard_words,
        max_revise = cfg.engine.max_revise_words,
        "dictation started"
    );

    loop {
        if shutdown.is_requested() || state.stop_requested() {
            break;
        }
        let now = Instant::now();

        let next_typing = state.typing_enabled();
        if next_typing != typing_enabled {
            if typing_enabled && !next_typing {
                flush_pending(
                    &mut engine,
                    &transcriber,
                    &mut resampler,
                    &ring,
                    &cfg,
                    &language,
                    capture_rate,
                    window_samples,
                    pad_samples,
                    cfg.exit_flush_guard_words,
                    "typing-off",
                )
                .await;
            }
            typing_enabled = next_typing;
            engine.reset_session();
            gate.reset();
            ring.clear();
            loop_start = now;
            last_voice = None;
            last_process = None;
            tracing::info!(
                "typing {}",
                if typing_enabled { "enabled" } else { "disabled" }
            );
        }

        if !typing_enabled {
            tokio::time::sleep(Duration::from_millis(30)).await;
            continue;
        }

        if last_process.is_some_and(|t| now.duration_since(t) < cfg.step) {
            tokio::time::sleep(Duration::from_millis(30)).await;
            continue;
        }
        last_process = Some(now);

        let window = ring.snapshot(window_samples);
        if window.is_empty() {
            continue;
        }

        let decision = gate.assess(&window, capture_rate, now);
        if !decision.voiced {
            let silence_for = last_voice
                .map(|t| now.duration_since(t))
                .unwrap_or_else(|| now.duration_since(loop_start));

            if last_voice.is_some() && silence_for >= cfg.silence_reset && engine.has_pending() {
                flush_pending(
                    &mut engine,
                    &transcriber,
                    &mut resampler,
                    &ring,
                    &cfg,
                    &language,
                    capture_rate,
                    window_samples,
                    pad_samples,
                    cfg.silence_flush_guard_words,
                    "silence",
                )
                .await;
            }

            if !cfg.auto_stop_silence.is_zero() && silence_for >= cfg.auto_stop_silence {
                tracing::info!(
                    "auto-disable typing after {:.1}s of inactivity",
                    silence_for.as_secs_f64()
                );
                state.set_typing(false);
                typing_enabled = false;
                engine.reset_session();
                gate.reset();
                ring.clear();
                loop_start = now;
                last_voice = None;
                continue;
            }

            if last_silence_log.map_or(true, |t| now.duration_since(t) >= Duration::from_secs(5)) {
                tracing::debug!(
                    rms = decision.rms,
                    voiced_ratio = decision.voiced_ratio,
                    "waiting for voice"
                );
                last_silence_log = Some(now);
            }
            continue;
        }

        let text = decode_window(&transcriber, &mut resampler, &window, &language).await;
        if text.is_empty() {
            continue;
        }
        last_voice = Some(now);
        if cfg.log_transcripts {
            tracing::debug!("heard: {}", preview(&text));
        }

        engine
            .accept_hypothesis(&text, cfg.stable_prefix_guard_words)
            .await;
    }

    let exit_idle = last_voice
        .map(|t| t.elapsed())
        .unwrap_or_else(|| loop_start.elapsed());
    if typing_enabled && exit_idle <= cfg.exit_flush_max_idle {
        flush_pending(
            &mut engine,
            &transcriber,
            &mut resampler,
            &ring,
            &cfg,
            &language,
            capture_rate,
            window_samples,
            pad_samples,
            cfg.exit_flush_guard_words,
            "exit",
        )
        .await;
    }

    capture.stop();
    state.clear_all();
    tracing::info!("dictation stopped");
    0
}

/// One final decode over the zero-padded window, then commit the better of
/// pending and fresh through the engine's flush path.
#[allow(clippy::too_many_arguments)]
async fn flush_pending<S: TextSink>(
    engine: &mut DictationEngine<S>,
    transcriber: &Arc<dyn Transcriber>,
    resampler: &mut WindowResampler,
    ring: &AudioRingBuffer,
    cfg: &DictationConfig,
    language: &Option<String>,
    capture_rate: u32,
    window_samples: usize,
    pad_samples: usize,
    guard_words: usize,
    reason: &str,
) {
    if !engine.has_pending() {
        return;
    }

    let mut audio = ring.snapshot(window_samples);
    let voiced = !audio.is_empty()
        && rms(&audio) >= cfg.vad.rms_threshold
        && voiced_ratio(
            &audio,
            cfg.vad.rms_threshold,
            cfg.vad.voiced_frame_ms,
            capture_rate,
        ) >= cfg.vad.min_voiced_ratio;

    let fresh = if voiced {
        audio.extend(std::iter::repeat(0.0f32).take(pad_samples));
        decode_window(transcriber, resampler, &audio, language).await
    } else {
        String::new()
    };

    if cfg.log_transcripts {
        tracing::debug!("flush[{}]: {}", reason, preview(&fresh));
    } else {
        tracing::debug!("flush[{}]", reason);
    }
    engine.flush(&fresh, guard_words).await;
}

fn preview(text: &str) -> String {
    if text.len() <= 120 {
        text.to_string()
    } else {
        let cut = text
            .char_indices()
            .take_while(|(i, _)| *i <= 117)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &text[..cut])
    }
}

// CLI operations. Each prints one token from the closed vocabulary and
// returns the process exit code.

pub fn cli_start() -> i32 {
    let state = StateFiles::new(DAEMON_NAME);
    let _ = state.ensure_dir();
    state.clear_stop();
    let was_typing = state.typing_enabled();
    state.set_typing(true);

    if state.daemon_alive() {
        println!("{}", if was_typing { "already-on" } else { "typing-on" });
        return 0;
    }
    let outcome = daemonize::start_daemon(&state, &logging::log_file(DAEMON_NAME));
    println!("{}", outcome.token());
    outcome.exit_code()
}

pub fn cli_stop() -> i32 {
    let state = StateFiles::new(DAEMON_NAME);
    if !state.daemon_alive() {
        state.clear_all();
        println!("already-off");
        return 0;
    }
    if !state.typing_enabled() {
        println!("already-off");
        return 0;
    }
    state.set_typing(false);
    println!("typing-off");
    0
}

pub fn cli_daemon_start() -> i32 {
    let state = StateFiles::new(DAEMON_NAME);
    let _ = state.ensure_dir();
    let outcome = daemonize::start_daemon(&state, &logging::log_file(DAEMON_NAME));
    println!("{}", outcome.token());
    outcome.exit_code()
}

pub fn cli_daemon_stop() -> i32 {
    let state = StateFiles::new(DAEMON_NAME);
    if daemonize::stop_daemon(&state) {
        println!("daemon-stopped");
    } else {
        println!("already-daemon-stopped");
    }
    0
}

pub fn cli_status() -> i32 {
    let state = StateFiles::new(DAEMON_NAME);
    let running = state.daemon_alive();
    let typing = running && state.typing_enabled();
    println!(
        "running={} typing={}",
        if running { 1 } else { 0 },
        if typing { 1 } else { 0 }
    );
    0
}

pub fn cli_toggle() -> i32 {
    let state = StateFiles::new(DAEMON_NAME);
    if state.daemon_alive() && state.typing_enabled() {
        cli_stop()
    } else {
        cli_start()
    }
}
