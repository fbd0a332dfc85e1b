//! Input-device selection.
//!
//! Device names coming from ALSA/PipeWire are noisy ("ALSA plug-in [aplay]:
//! USB Audio (hw:2,0)"), and the name the audio server reports for its
//! default source rarely matches the cpal name byte-for-byte. Selection
//! therefore works on normalized token sets and walks a fixed priority
//! chain, taking the first hit:
//!
//! 1. explicit env override,
//! 2. the audio server's default source (`pactl get-default-source`),
//! 3. the configured device name,
//! 4. cpal's default input, unless it is a generic wrapper or a monitor,
//! 5. the first non-generic, non-monitor input,
//! 6. cpal's default input regardless,
//! 7. the first input.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

use sotto_foundation::{AudioError, SharedConfig};

use crate::MODEL_SAMPLE_RATE;

/// Tokens too common in ALSA descriptions to carry matching signal.
const FILLER_TOKENS: &[&str] = &[
    "alsa", "input", "output", "usb", "pci", "mono", "stereo", "fallback", "analog", "digital",
    "hw",
];

const GENERIC_NAMES: &[&str] = &["default", "pipewire", "pulse", "jack"];

pub struct SelectedDevice {
    pub device: Device,
    pub name: String,
    pub sample_rate: u32,
}

/// Name + native rate, split out from `cpal::Device` so the matching logic
/// stays testable without hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCandidate {
    pub name: String,
    pub sample_rate: u32,
}

pub fn normalize_device_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

fn is_generic_input_name(name: &str) -> bool {
    let norm = normalize_device_text(name);
    GENERIC_NAMES.contains(&norm.as_str())
}

fn is_monitor_name(name: &str) -> bool {
    normalize_device_text(name).contains("monitor")
}

/// Fuzzy-match `wanted` against the candidate list.
///
/// Substring containment (either direction, normalized) wins outright;
/// otherwise the candidate with the best token-overlap score is accepted
/// when the score reaches `max(1, min(2, |wanted_tokens|))`. Filler tokens
/// are excluded from the overlap set; `mono` on both sides adds a 0.5
/// tiebreaker.
pub fn fuzzy_find(candidates: &[DeviceCandidate], wanted: &str) -> Option<usize> {
    let wanted_norm = normalize_device_text(wanted);
    if wanted_norm.is_empty() {
        return None;
    }

    for (idx, cand) in candidates.iter().enumerate() {
        let cand_norm = normalize_device_text(&cand.name);
        if cand_norm.is_empty() {
            continue;
        }
        if cand_norm.contains(&wanted_norm) || wanted_norm.contains(&cand_norm) {
            return Some(idx);
        }
    }

    let wanted_tokens: Vec<&str> = wanted_norm
        .split_whitespace()
        .filter(|t| !FILLER_TOKENS.contains(t))
        .collect();
    if wanted_tokens.is_empty() {
        return None;
    }
    let wants_mono = wanted_norm.split_whitespace().any(|t| t == "mono");

    let mut best: Option<(usize, f32)> = None;
    for (idx, cand) in candidates.iter().enumerate() {
        let cand_norm = normalize_device_text(&cand.name);
        let cand_tokens: Vec<&str> = cand_norm.split_whitespace().collect();
        let mut score = wanted_tokens
            .iter()
            .filter(|t| cand_tokens.contains(*t))
            .count() as f32;
        if wants_mono && cand_tokens.contains(&"mono") {
            score += 0.5;
        }
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((idx, score));
        }
    }

    let threshold = 1.0_f32.max(2.0_f32.min(wanted_tokens.len() as f32));
    best.filter(|&(_, score)| score >= threshold).map(|(idx, _)| idx)
}

async fn pactl_default_source_name() -> Option<String> {
    let mut command = tokio::process::Command::new("pactl");
    command
        .arg("get-default-source")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true);

    let child = command.spawn().ok()?;
    let output = tokio::time::timeout(Duration::from_secs(2), child.wait_with_output())
        .await
        .ok()?
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!name.is_empty()).then_some(name)
}

fn device_rate(device: &Device) -> u32 {
    device
        .default_input_config()
        .map(|c| c.sample_rate().0)
        .unwrap_or(MODEL_SAMPLE_RATE)
}

/// Pick the capture device per the priority chain.
pub async fn pick_device(
    env_override: Option<&str>,
    config: &SharedConfig,
) -> Result<SelectedDevice, AudioError> {
    let host = cpal::default_host();

    let mut devices: Vec<Device> = Vec::new();
    let mut candidates: Vec<DeviceCandidate> = Vec::new();
    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                candidates.push(DeviceCandidate {
                    name,
                    sample_rate: device_rate(&device),
                });
                devices.push(device);
            }
        }
    }

    let selected = |idx: usize, devices: &mut Vec<Device>, candidates: &[DeviceCandidate]| {
        let cand = &candidates[idx];
        tracing::info!(
            "using input device: {} (rate={}Hz)",
            cand.name,
            cand.sample_rate
        );
        SelectedDevice {
            device: devices.swap_remove(idx),
            name: cand.name.clone(),
            sample_rate: cand.sample_rate,
        }
    };

    // 1) Explicit env override always wins.
    if let Some(wanted) = env_override.map(str::trim).filter(|w| !w.is_empty()) {
        if let Some(idx) = fuzzy_find(&candidates, wanted) {
            return Ok(selected(idx, &mut devices, &candidates));
        }
    }

    // 2) The audio server's default source (usually the active microphone).
    if let Some(source) = pactl_default_source_name().await {
        if let Some(idx) = fuzzy_find(&candidates, &source) {
            return Ok(selected(idx, &mut devices, &candidates));
        }
    }

    // 3) Configured device name.
    if let Some(wanted) = config
        .audio_device_name
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
    {
        if let Some(idx) = fuzzy_find(&candidates, wanted) {
            return Ok(selected(idx, &mut devices, &candidates));
        }
    }

    // 4) cpal default input, unless it is a generic wrapper or a monitor.
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok());
    if let Some(ref def) = default_name {
        if !is_generic_input_name(def) && !is_monitor_name(def) {
            if let Some(idx) = candidates.iter().position(|c| &c.name == def) {
                return Ok(selected(idx, &mut devices, &candidates));
            }
        }
    }

    // 5) First non-generic, non-monitor input.
    if let Some(idx) = candidates
        .iter()
        .position(|c| !is_generic_input_name(&c.name) && !is_monitor_name(&c.name))
    {
        return Ok(selected(idx, &mut devices, &candidates));
    }

    // 6) Generic default if we have nothing better.
    if let Some(ref def) = default_name {
        if let Some(idx) = candidates.iter().position(|c| &c.name == def) {
            return Ok(selected(idx, &mut devices, &candidates));
        }
    }

    // 7) Last fallback: first available input.
    if !devices.is_empty() {
        return Ok(selected(0, &mut devices, &candidates));
    }

    Err(AudioError::DeviceNotFound {
        wanted: env_override.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(name: &str) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            sample_rate: 48_000,
        }
    }

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(
            normalize_device_text("HyperX QuadCast: USB Audio (hw:2,0)"),
            "hyperx quadcast usb audio hw 2 0"
        );
        assert_eq!(normalize_device_text("---"), "");
    }

    #[test]
    fn substring_match_wins_either_direction() {
        let devices = vec![cand("default"), cand("HyperX QuadCast Analog Stereo")];
        assert_eq!(fuzzy_find(&devices, "quadcast"), Some(1));
        assert_eq!(
            fuzzy_find(&devices, "HyperX QuadCast Analog Stereo plus more words"),
            Some(1)
        );
    }

    #[test]
    fn token_overlap_ignores_filler() {
        let devices = vec![
            cand("ALSA plug-in: USB Audio"),
            cand("Blue Yeti Nano Analog Stereo"),
        ];
        // "usb" and "analog" are filler, so only "yeti" and "nano" count.
        assert_eq!(fuzzy_find(&devices, "yeti nano usb analog"), Some(1));
    }

    #[test]
    fn weak_overlap_is_rejected() {
        let devices = vec![cand("Webcam C920 Mono"), cand("Built-in Audio")];
        // One overlapping token out of three wanted is below the threshold
        // of min(2, 3) = 2.
        assert_eq!(fuzzy_find(&devices, "webcam dock station"), None);
    }

    #[test]
    fn mono_tiebreak_prefers_mono_variant() {
        let devices = vec![
            cand("Elgato Wave 3 Stereo"),
            cand("Elgato Wave 3 Mono"),
        ];
        assert_eq!(fuzzy_find(&devices, "elgato wave mono"), Some(1));
    }

    #[test]
    fn empty_wanted_matches_nothing() {
        let devices = vec![cand("anything")];
        assert_eq!(fuzzy_find(&devices, "  "), None);
        assert_eq!(fuzzy_find(&devices, "(((" ), None);
    }

    #[test]
    fn generic_and_monitor_names_detected() {
        assert!(is_generic_input_name("default"));
        assert!(is_generic_input_name("PipeWire"));
        assert!(!is_generic_input_name("HyperX QuadCast"));
        assert!(is_monitor_name("Speakers.monitor"));
    }
}
