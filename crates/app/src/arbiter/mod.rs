//! Mode arbiter: watches every keyboard for double-taps of Left/Right Ctrl
//! and switches between dictation and voice-command mode, keeping the two
//! mutually exclusive.

pub mod tap;

use std::collections::HashMap;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use evdev::{Device, InputEventKind, Key};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use sotto_foundation::{ShutdownFlag, StateFiles};
use sotto_hypr::notify;

use crate::envcfg::{env_f64, env_string};
use crate::{commands, dictation};

use self::tap::{Side, TapConfig, TapTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultMode {
    Off,
    Dictation,
    Commands,
}

impl DefaultMode {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "dictation" => Self::Dictation,
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::Commands,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    pub tap: TapConfig,
    /// A mode toggled on this recently is "still starting" and won't be
    /// toggled off.
    pub min_mode_on: Duration,
    pub rescan_interval: Duration,
    pub default_mode: DefaultMode,
    pub default_mode_delay: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            tap: TapConfig::default(),
            min_mode_on: Duration::from_millis(1_200),
            rescan_interval: Duration::from_secs(5),
            default_mode: DefaultMode::Commands,
            default_mode_delay: Duration::from_millis(800),
        }
    }
}

impl ArbiterConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let secs = |key: &str, default: Duration| {
            Duration::from_secs_f64(env_f64(key, default.as_secs_f64()).max(0.0))
        };
        Self {
            tap: TapConfig {
                double_tap_window: secs("SOTTO_ARBITER_DOUBLE_TAP_WINDOW", d.tap.double_tap_window),
                max_tap_hold: secs("SOTTO_ARBITER_MAX_TAP_HOLD", d.tap.max_tap_hold),
                trigger_cooldown: secs("SOTTO_ARBITER_TRIGGER_COOLDOWN", d.tap.trigger_cooldown),
                tap_dedup_window: secs("SOTTO_ARBITER_TAP_DEDUP_WINDOW", d.tap.tap_dedup_window),
            },
            min_mode_on: secs("SOTTO_ARBITER_MIN_MODE_ON_SECONDS", d.min_mode_on),
            rescan_interval: secs("SOTTO_ARBITER_RESCAN_INTERVAL", d.rescan_interval),
            default_mode: env_string("SOTTO_ARBITER_DEFAULT_MODE")
                .map(|v| DefaultMode::parse(&v))
                .unwrap_or(d.default_mode),
            default_mode_delay: secs("SOTTO_ARBITER_DEFAULT_MODE_DELAY", d.default_mode_delay),
        }
    }
}

/// Keyboards are devices that can type: they carry the Ctrl we watch plus
/// ordinary letter keys. The injector's uinput device is excluded by name
/// so synthetic keystrokes cannot feed back into mode switching.
fn is_keyboard_like(device: &Device) -> bool {
    let name = device.name().unwrap_or("").to_lowercase();
    if name.contains("ydotool") {
        return false;
    }
    let Some(keys) = device.supported_keys() else {
        return false;
    };
    [Key::KEY_LEFTCTRL, Key::KEY_A, Key::KEY_Z, Key::KEY_SPACE]
        .iter()
        .all(|k| keys.contains(*k))
}

fn discover_devices(devices: &mut HashMap<PathBuf, Device>) {
    for (path, device) in evdev::enumerate() {
        if devices.contains_key(&path) {
            continue;
        }
        if is_keyboard_like(&device) {
            tracing::info!(
                "monitoring {} ({})",
                device.name().unwrap_or("?"),
                path.display()
            );
            devices.insert(path, device);
        }
    }
}

/// Invoke a sibling binary and return (exit code, first stdout token).
fn run_sibling(binary: &str, args: &[&str]) -> (i32, String) {
    let path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(binary)))
        .filter(|p| p.is_file())
        .unwrap_or_else(|| PathBuf::from(binary));

    match std::process::Command::new(&path).args(args).output() {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let token = if stdout.is_empty() {
                String::from_utf8_lossy(&output.stderr).trim().to_string()
            } else {
                stdout
            };
            (output.status.code().unwrap_or(-1), token)
        }
        Err(e) => {
            tracing::error!("failed to invoke {}: {}", binary, e);
            (-1, e.to_string())
        }
    }
}

#[derive(Debug, Default)]
struct ModeClock {
    dictation_on_at: Option<Instant>,
    commands_on_at: Option<Instant>,
}

fn still_starting(turned_on: Option<Instant>, now: Instant, min_on: Duration) -> bool {
    turned_on.is_some_and(|t| now.duration_since(t) < min_on)
}

fn trigger_dictation(now: Instant, clock: &mut ModeClock, min_on: Duration) {
    let dict = StateFiles::new(dictation::DAEMON_NAME);
    let typing_on = dict.daemon_alive() && dict.typing_enabled();

    if typing_on {
        if still_starting(clock.dictation_on_at, now, min_on) {
            tracing::info!("ignoring toggle while dictation is still starting");
            notify("Dictation", "Still starting...");
            return;
        }
        let (code, token) = run_sibling("sotto-dictate", &["stop"]);
        if code == 0 && matches!(token.as_str(), "typing-off" | "already-off") {
            notify("Dictation Off", "Live transcription disabled");
            clock.dictation_on_at = None;
        } else {
            notify("Dictation Stop Failed", &token);
            tracing::warn!("dictation stop failed rc={} out={}", code, token);
        }
        return;
    }

    // Mutual exclusion: commands go down before dictation comes up.
    let cmd_state = StateFiles::new(commands::DAEMON_NAME);
    if cmd_state.daemon_alive() {
        let (_, token) = run_sibling("sotto-commands", &["daemon-stop"]);
        tracing::info!("stopped commands before dictation: {}", token);
        clock.commands_on_at = None;
    }

    let (code, token) = run_sibling("sotto-dictate", &["start"]);
    if code == 0
        && matches!(
            token.as_str(),
            "started" | "already-running" | "typing-on" | "already-on"
        )
    {
        notify("Dictation On", "Live transcription enabled");
        clock.dictation_on_at = Some(now);
    } else {
        notify("Dictation Start Failed", &token);
        tracing::warn!("dictation start failed rc={} out={}", code, token);
    }
}

fn trigger_commands(now: Instant, clock: &mut ModeClock, min_on: Duration) {
    let cmd_state = StateFiles::new(commands::DAEMON_NAME);

    if cmd_state.daemon_alive() {
        if still_starting(clock.commands_on_at, now, min_on) {
            tracing::info!("ignoring toggle while commands are still starting");
            notify("Voice Commands", "Still starting...");
            return;
        }
        let (code, token) = run_sibling("sotto-commands", &["daemon-stop"]);
        if code == 0 && matches!(token.as_str(), "stopped" | "already-stopped") {
            notify("Voice Commands Off", "");
            clock.commands_on_at = None;
        } else {
            notify("Voice Commands Stop Failed", &token);
            tracing::warn!("commands stop failed rc={} out={}", code, token);
        }
        return;
    }

    let dict_state = StateFiles::new(dictation::DAEMON_NAME);
    if dict_state.daemon_alive() {
        let (_, token) = run_sibling("sotto-dictate", &["daemon-stop"]);
        tracing::info!("stopped dictation before commands: {}", token);
        clock.dictation_on_at = None;
    }

    let (code, token) = run_sibling("sotto-commands", &["daemon-start"]);
    if code == 0 && matches!(token.as_str(), "started" | "already-running") {
        notify("Voice Commands On", "Listening for commands");
        clock.commands_on_at = Some(now);
    } else {
        notify("Voice Commands Start Failed", &token);
        tracing::warn!("commands start failed rc={} out={}", code, token);
    }
}

fn bootstrap_default_mode(mode: DefaultMode, clock: &mut ModeClock, now: Instant) {
    let dict_alive = StateFiles::new(dictation::DAEMON_NAME).daemon_alive();
    let cmd_alive = StateFiles::new(commands::DAEMON_NAME).daemon_alive();
    if dict_alive || cmd_alive {
        return;
    }
    match mode {
        DefaultMode::Off => {}
        DefaultMode::Dictation => {
            tracing::info!("bootstrap: starting dictation");
            let (_, token) = run_sibling("sotto-dictate", &["daemon-start"]);
            tracing::info!("bootstrap dictation: {}", token);
            clock.dictation_on_at = Some(now);
        }
        DefaultMode::Commands => {
            tracing::info!("bootstrap: starting voice commands");
            let (_, token) = run_sibling("sotto-commands", &["daemon-start"]);
            tracing::info!("bootstrap commands: {}", token);
            clock.commands_on_at = Some(now);
        }
    }
}

/// Blocking event loop: multiplexed reads over every keyboard with a 500 ms
/// timeout, device rescans, and the bootstrap timer.
pub fn run(cfg: ArbiterConfig, shutdown: ShutdownFlag) -> i32 {
    let mut devices: HashMap<PathBuf, Device> = HashMap::new();
    let mut tracker = TapTracker::new(cfg.tap.clone());
    let mut clock = ModeClock::default();

    let started_at = Instant::now();
    let mut last_scan: Option<Instant> = None;
    let mut bootstrapped = cfg.default_mode == DefaultMode::Off;

    tracing::info!("arbiter started");

    while !shutdown.is_requested() {
        let now = Instant::now();

        if last_scan.map_or(true, |t| now.duration_since(t) >= cfg.rescan_interval)
            || devices.is_empty()
        {
            discover_devices(&mut devices);
            last_scan = Some(now);
        }

        if !bootstrapped && now.duration_since(started_at) >= cfg.default_mode_delay {
            bootstrap_default_mode(cfg.default_mode, &mut clock, now);
            bootstrapped = true;
        }

        if devices.is_empty() {
            std::thread::sleep(Duration::from_millis(500));
            continue;
        }

        let paths: Vec<PathBuf> = devices.keys().cloned().collect();
        let mut poll_fds: Vec<PollFd> = paths
            .iter()
            .map(|p| {
                let raw = devices[p].as_raw_fd();
                // The devices map outlives this poll call.
                let fd = unsafe { BorrowedFd::borrow_raw(raw) };
                PollFd::new(fd, PollFlags::POLLIN)
            })
            .collect();

        let ready = match poll(&mut poll_fds, PollTimeout::from(500u16)) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("poll failed: {}", e);
                std::thread::sleep(Duration::from_millis(200));
                continue;
            }
        };
        if ready == 0 {
            continue;
        }

        let readable: Vec<PathBuf> = poll_fds
            .iter()
            .zip(&paths)
            .filter(|(fd, _)| {
                fd.revents()
                    .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP))
            })
            .map(|(_, path)| path.clone())
            .collect();
        drop(poll_fds);

        for path in readable {
            let device_key = path.display().to_string();
            let Some(device) = devices.get_mut(&path) else {
                continue;
            };
            let events = match device.fetch_events() {
                Ok(events) => events.collect::<Vec<_>>(),
                Err(e) => {
                    tracing::info!("device removed {} ({})", device_key, e);
                    devices.remove(&path);
                    tracker.remove_device(&device_key);
                    continue;
                }
            };

            for event in events {
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                let fired = tracker.on_key(&device_key, key.code(), event.value(), Instant::now());
                match fired {
                    Some(Side::Left) => {
                        tracing::info!("double-tap left: toggling dictation");
                        trigger_dictation(Instant::now(), &mut clock, cfg.min_mode_on);
                    }
                    Some(Side::Right) => {
                        tracing::info!("double-tap right: toggling voice commands");
                        trigger_commands(Instant::now(), &mut clock, cfg.min_mode_on);
                    }
                    None => {}
                }
            }
        }
    }

    tracing::info!("arbiter stopped");
    0
}
