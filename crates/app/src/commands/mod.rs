//! Voice-command daemon: short-utterance recognition driving the
//! compositor.

pub mod actions;
pub mod config;
pub mod intent;
pub mod numbers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use sotto_audio::{pick_device, AudioRingBuffer, CaptureStream, WindowResampler};
use sotto_foundation::{SharedConfig, ShutdownFlag, StateFiles};
use sotto_stt::text::{choose_flush_candidate, collapse_whitespace, is_hallucination};
use sotto_stt::{ModelSpec, Transcriber, WhisperTranscriber};
use sotto_vad::{VadConfig, VadGate};

use crate::daemonize;
use crate::dictation;
use crate::envcfg::{env_f64, env_flag, env_string, env_u32, env_usize};
use crate::logging;

use self::actions::ZoomSettings;
use self::config::CommandsConfig;

pub const DAEMON_NAME: &str = "sotto-commands";

#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub step: Duration,
    pub window: Duration,
    pub max_buffer: Duration,
    pub vad: VadConfig,
    pub silence_commit: Duration,
    pub final_pad: Duration,
    pub min_final_anchor_words: usize,
    pub confirm_repetitions: u32,
    pub cooldown: Duration,
    pub zoom: ZoomSettings,
    pub model: String,
    pub language: Option<String>,
    pub device_name: Option<String>,
    pub threads: Option<u32>,
    /// Emit heard/finalized text into the logs.
    pub log_transcripts: bool,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(450),
            window: Duration::from_millis(3_400),
            max_buffer: Duration::from_millis(8_000),
            vad: VadConfig::default(),
            silence_commit: Duration::from_millis(850),
            final_pad: Duration::from_millis(800),
            min_final_anchor_words: 2,
            confirm_repetitions: 1,
            cooldown: Duration::from_millis(1_500),
            zoom: ZoomSettings::default(),
            model: "base.en".to_string(),
            language: Some("en".to_string()),
            device_name: None,
            threads: None,
            log_transcripts: true,
        }
    }
}

impl RecognizerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let secs = |key: &str, default: Duration| {
            Duration::from_secs_f64(env_f64(key, default.as_secs_f64()).max(0.0))
        };

        let vad = VadConfig {
            rms_threshold: env_f64("SOTTO_CMD_RMS_THRESHOLD", d.vad.rms_threshold as f64) as f32,
            voiced_frame_ms: env_u32("SOTTO_CMD_VOICED_FRAME_MS", d.vad.voiced_frame_ms),
            min_voiced_ratio: env_f64("SOTTO_CMD_MIN_VOICED_RATIO", d.vad.min_voiced_ratio as f64)
                as f32,
            continuation: secs("SOTTO_CMD_VOICE_CONTINUATION_SECONDS", d.vad.continuation),
            rms_continuation_factor: env_f64(
                "SOTTO_CMD_RMS_CONTINUATION_FACTOR",
                d.vad.rms_continuation_factor as f64,
            ) as f32,
            voiced_continuation_factor: env_f64(
                "SOTTO_CMD_VOICED_CONTINUATION_FACTOR",
                d.vad.voiced_continuation_factor as f64,
            ) as f32,
        };

        let zoom = ZoomSettings {
            key_delay_ms: env_u32("SOTTO_CMD_ZOOM_KEY_DELAY_MS", d.zoom.key_delay_ms),
            step_sleep: Duration::from_millis(u64::from(env_u32(
                "SOTTO_CMD_ZOOM_STEP_SLEEP_MS",
                d.zoom.step_sleep.as_millis() as u32,
            ))),
            repeat_max: env_u32("SOTTO_CMD_ZOOM_REPEAT_MAX", d.zoom.repeat_max).max(1),
        };

        Self {
            step: secs("SOTTO_CMD_STEP_SECONDS", d.step),
            window: secs("SOTTO_CMD_WINDOW_SECONDS", d.window),
            max_buffer: secs("SOTTO_CMD_MAX_BUFFER_SECONDS", d.max_buffer),
            vad,
            silence_commit: secs("SOTTO_CMD_SILENCE_COMMIT_SECONDS", d.silence_commit),
            final_pad: secs("SOTTO_CMD_FINAL_PAD_SECONDS", d.final_pad),
            min_final_anchor_words: env_usize(
                "SOTTO_CMD_MIN_FINAL_ANCHOR_WORDS",
                d.min_final_anchor_words,
            ),
            confirm_repetitions: env_u32(
                "SOTTO_CMD_COMMAND_CONFIRM_REPETITIONS",
                d.confirm_repetitions,
            )
            .max(1),
            cooldown: secs("SOTTO_CMD_COMMAND_COOLDOWN_SECONDS", d.cooldown),
            zoom,
            model: env_string("SOTTO_CMD_MODEL").unwrap_or(d.model),
            language: env_string("SOTTO_CMD_LANGUAGE").or(d.language),
            device_name: env_string("SOTTO_CMD_DEVICE_NAME"),
            threads: env_string("SOTTO_CMD_THREADS").and_then(|v| v.parse().ok()),
            log_transcripts: env_flag("SOTTO_CMD_LOG_TRANSCRIPTS", d.log_transcripts),
        }
    }
}

/// Live-confirmation state: the same command key must repeat across
/// consecutive hypotheses before it executes.
#[derive(Debug, Default)]
struct Confirmation {
    key: Option<String>,
    repetitions: u32,
}

impl Confirmation {
    /// Count a sighting of `key`, returning the updated repetition count.
    fn observe(&mut self, key: String) -> u32 {
        if self.key.as_deref() == Some(key.as_str()) {
            self.repetitions += 1;
        } else {
            self.key = Some(key);
            self.repetitions = 1;
        }
        self.repetitions
    }

    fn reset(&mut self) {
        self.key = None;
        self.repetitions = 0;
    }
}

struct PhraseState {
    text: String,
    last_voice: Option<Instant>,
    confirmation: Confirmation,
    last_execute: Option<Instant>,
}

impl PhraseState {
    fn new() -> Self {
        Self {
            text: String::new(),
            last_voice: None,
            confirmation: Confirmation::default(),
            last_execute: None,
        }
    }

    fn clear_phrase(&mut self) {
        self.text.clear();
        self.last_voice = None;
        self.confirmation.reset();
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

/// Try to execute a live hypothesis. Executes once the same command has
/// been heard `confirm_repetitions` times and the cooldown has passed.
async fn try_execute_live(
    text: &str,
    now: Instant,
    cfg: &RecognizerConfig,
    commands: &CommandsConfig,
    state: &mut PhraseState,
    ring: &AudioRingBuffer,
) -> bool {
    let normalized = intent::normalize_command_text(text);

    let key = if let Some(custom) = actions::resolve_custom(commands, &normalized) {
        format!("custom:{}", custom.id)
    } else {
        match intent::parse_intent(text, cfg.zoom.repeat_max) {
            Some(parsed) => parsed.key(),
            None => {
                state.confirmation.reset();
                return false;
            }
        }
    };

    if state.confirmation.observe(key) < cfg.confirm_repetitions {
        return false;
    }
    if state
        .last_execute
        .is_some_and(|t| now.duration_since(t) < cfg.cooldown)
    {
        return false;
    }

    let ok = actions::execute_text(text, commands, &cfg.zoom).await;
    state.last_execute = Some(now);
    state.clear_phrase();
    ring.clear();
    ok
}

/// Commit the accumulated phrase after a silence boundary: one more decode
/// over the padded window, pick the better text, execute it.
async fn finalize_phrase(
    cfg: &RecognizerConfig,
    commands: &CommandsConfig,
    transcriber: &Arc<dyn Transcriber>,
    resampler: &mut WindowResampler,
    ring: &AudioRingBuffer,
    state: &mut PhraseState,
    capture_rate: u32,
    window_samples: usize,
) {
    let pending = collapse_whitespace(&state.text);
    if pending.is_empty() {
        return;
    }

    let mut audio = ring.snapshot(window_samples);
    let decoded = if audio.is_empty() {
        String::new()
    } else {
        let pad = (cfg.final_pad.as_secs_f64() * capture_rate as f64) as usize;
        audio.extend(std::iter::repeat(0.0f32).take(pad));
        decode_window(transcriber, resampler, &audio, &cfg.language).await
    };

    let final_text = choose_flush_candidate(&pending, &decoded, cfg.min_final_anchor_words);
    if cfg.log_transcripts {
        tracing::info!("finalize: {}", final_text);
    }

    actions::execute_text(&final_text, commands, &cfg.zoom).await;

    state.clear_phrase();
    ring.clear();
}

/// Foreground worker loop. Returns the process exit code.
pub async fn run(cfg: RecognizerConfig) -> i32 {
    let state_files = StateFiles::new(DAEMON_NAME);
    if let Err(e) = state_files.ensure_dir() {
        tracing::error!("cannot create state dir: {}", e);
        return 1;
    }
    if state_files.daemon_alive() && state_files.read_pid() != Some(std::process::id()) {
        return 0;
    }
    if let Err(e) = state_files.write_pid(std::process::id()) {
        tracing::error!("cannot write pid file: {}", e);
        return 1;
    }
    state_files.clear_stop();

    let shutdown = ShutdownFlag::new();
    shutdown.install_signal_handlers();

    let commands = CommandsConfig::load();
    let shared = SharedConfig::load();
    let language = cfg.language.clone().or_else(|| shared.language.clone());
    let cfg = RecognizerConfig { language, ..cfg };

    tracing::info!("loading model {}", cfg.model);
    let spec = ModelSpec::parse(&cfg.model);
    let transcriber: Arc<dyn Transcriber> = match WhisperTranscriber::load(&spec, cfg.threads) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            tracing::error!("failed to load model: {}", e);
            state_files.clear_all();
            return 1;
        }
    };

    let selected = match pick_device(cfg.device_name.as_deref(), &shared).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("{}", e);
            state_files.clear_all();
            return 1;
        }
    };
    let capture_rate = selected.sample_rate;
    let window_samples = (cfg.window.as_secs_f64() * capture_rate as f64) as usize;

    let ring = Arc::new(AudioRingBuffer::new(
        (cfg.max_buffer.as_secs_f64() * capture_rate as f64) as usize,
    ));
    let mut capture = match CaptureStream::spawn(selected, ring.clone()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to open capture stream: {}", e);
            state_files.clear_all();
            return 1;
        }
    };

    let mut resampler = WindowResampler::new(capture_rate);
    let mut gate = VadGate::new(cfg.vad.clone());
    let mut phrase = PhraseState::new();
    let mut last_process: Option<Instant> = None;

    tracing::info!(
        step_s = cfg.step.as_secs_f64(),
        window_s = cfg.window.as_secs_f64(),
        silence_commit_s = cfg.silence_commit.as_secs_f64(),
        confirm = cfg.confirm_repetitions,
        "voice commands started"
    );

    loop {
        if shutdown.is_requested() || state_files.stop_requested() {
            break;
        }
        let now = Instant::now();

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
        if decision.voiced {
            let text = decode_window(&transcriber, &mut resampler, &window, &cfg.language).await;
            if !text.is_empty() {
                phrase.text = text.clone();
                phrase.last_voice = Some(now);
                if cfg.log_transcripts {
                    tracing::debug!("heard: {}", text);
                }
                try_execute_live(&text, now, &cfg, &commands, &mut phrase, &ring).await;
            }
            continue;
        }

        let silence_ready = phrase
            .last_voice
            .is_some_and(|t| now.duration_since(t) >= cfg.silence_commit);
        if !phrase.text.is_empty() && silence_ready {
            finalize_phrase(
                &cfg,
                &commands,
                &transcriber,
                &mut resampler,
                &ring,
                &mut phrase,
                capture_rate,
                window_samples,
            )
            .await;
        }
    }

    if !phrase.text.is_empty() {
        finalize_phrase(
            &cfg,
            &commands,
            &transcriber,
            &mut resampler,
            &ring,
            &mut phrase,
            capture_rate,
            window_samples,
        )
        .await;
    }

    capture.stop();
    state_files.clear_all();
    tracing::info!("voice commands stopped");
    0
}

// CLI operations.

/// Start the commands daemon, stopping dictation first: the two modes
/// never run concurrently.
pub fn cli_daemon_start() -> i32 {
    let dictation_state = StateFiles::new(dictation::DAEMON_NAME);
    if dictation_state.daemon_alive() {
        tracing::info!("stopping dictation daemon before starting commands");
        daemonize::stop_daemon(&dictation_state);
    }

    let state = StateFiles::new(DAEMON_NAME);
    let _ = state.ensure_dir();
    let outcome = daemonize::start_daemon(&state, &logging::log_file(DAEMON_NAME));
    println!("{}", outcome.token());
    outcome.exit_code()
}

pub fn cli_daemon_stop() -> i32 {
    let state = StateFiles::new(DAEMON_NAME);
    if daemonize::stop_daemon(&state) {
        println!("stopped");
    } else {
        println!("already-stopped");
    }
    0
}

pub fn cli_status() -> i32 {
    let state = StateFiles::new(DAEMON_NAME);
    println!("running={}", if state.daemon_alive() { 1 } else { 0 });
    0
}

pub fn cli_toggle() -> i32 {
    let state = StateFiles::new(DAEMON_NAME);
    if state.daemon_alive() {
        cli_daemon_stop()
    } else {
        cli_daemon_start()
    }
}

/// Execute text as if it had been heard. Bypasses audio entirely.
pub async fn cli_simulate(text: &str) -> i32 {
    let phrase = collapse_whitespace(text);
    if phrase.is_empty() {
        println!("simulate-empty");
        return 2;
    }
    let commands = CommandsConfig::load();
    let cfg = RecognizerConfig::from_env();
    println!("simulate: {phrase}");
    actions::execute_text(&phrase, &commands, &cfg.zoom).await;
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_counts_repeats_and_resets_on_change() {
        let mut confirmation = Confirmation::default();
        assert_eq!(confirmation.observe("open:terminal".to_string()), 1);
        assert_eq!(confirmation.observe("open:terminal".to_string()), 2);
        assert_eq!(confirmation.observe("open:browser".to_string()), 1);
        confirmation.reset();
        assert_eq!(confirmation.observe("open:browser".to_string()), 1);
    }
}
