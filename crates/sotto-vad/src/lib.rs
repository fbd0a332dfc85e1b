//! Voice-activity gating for decode windows.
//!
//! Two measurements over a window: overall RMS, and the fraction of short
//! sub-frames whose own RMS clears the threshold (the voiced ratio). A
//! window counts as voiced only when both clear their thresholds. Once the
//! gate has seen voice, thresholds are relaxed for a short continuation
//! period so natural mid-sentence dips do not cut a phrase in half.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Whole-window RMS floor for voiced audio.
    pub rms_threshold: f32,
    /// Sub-frame length for the voiced-ratio measurement.
    pub voiced_frame_ms: u32,
    /// Minimum fraction of voiced sub-frames.
    pub min_voiced_ratio: f32,
    /// Grace period after the last voiced window.
    pub continuation: Duration,
    /// Threshold scale factors applied inside the grace period.
    pub rms_continuation_factor: f32,
    pub voiced_continuation_factor: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            rms_threshold: 3.5e-4,
            voiced_frame_ms: 30,
            min_voiced_ratio: 0.05,
            continuation: Duration::from_millis(1000),
            rms_continuation_factor: 0.55,
            voiced_continuation_factor: 0.55,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VadDecision {
    pub voiced: bool,
    pub rms: f32,
    pub voiced_ratio: f32,
}

#[derive(Debug)]
pub struct VadGate {
    config: VadConfig,
    last_voiced: Option<Instant>,
}

impl VadGate {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            last_voiced: None,
        }
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Assess one window. `now` is injected so ticks and tests share a
    /// single clock.
    pub fn assess(&mut self, window: &[f32], sample_rate: u32, now: Instant) -> VadDecision {
        let in_continuation = self
            .last_voiced
            .is_some_and(|t| now.duration_since(t) <= self.config.continuation);

        let (rms_floor, ratio_floor) = if in_continuation {
            (
                self.config.rms_threshold * self.config.rms_continuation_factor,
                self.config.min_voiced_ratio * self.config.voiced_continuation_factor,
            )
        } else {
            (self.config.rms_threshold, self.config.min_voiced_ratio)
        };

        let window_rms = rms(window);
        let ratio = voiced_ratio(window, rms_floor, self.config.voiced_frame_ms, sample_rate);
        let voiced = window_rms >= rms_floor && ratio >= ratio_floor;

        if voiced {
            self.last_voiced = Some(now);
        }

        VadDecision {
            voiced,
            rms: window_rms,
            voiced_ratio: ratio,
        }
    }

    /// Seconds since the gate last saw voice, if ever.
    pub fn since_last_voice(&self, now: Instant) -> Option<Duration> {
        self.last_voiced.map(|t| now.duration_since(t))
    }

    pub fn reset(&mut self) {
        self.last_voiced = None;
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Fraction of `frame_ms` sub-frames whose RMS clears `threshold`.
/// A window shorter than one sub-frame degenerates to a whole-window check.
pub fn voiced_ratio(samples: &[f32], threshold: f32, frame_ms: u32, sample_rate: u32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let frame_ms = frame_ms.max(5) as usize;
    let frame_samples = ((sample_rate as usize * frame_ms) / 1000).max(1);
    let n_frames = samples.len() / frame_samples;
    if n_frames == 0 {
        return if rms(samples) >= threshold { 1.0 } else { 0.0 };
    }
    let voiced = samples[..n_frames * frame_samples]
        .chunks(frame_samples)
        .filter(|frame| rms(frame) >= threshold)
        .count();
    voiced as f32 / n_frames as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn sine(len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * 440.0 * i as f32 / RATE as f32;
                phase.sin() * amplitude
            })
            .collect()
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&vec![0.0; 512]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_sine_matches_theory() {
        // RMS of a sine wave is amplitude / sqrt(2).
        let wave = sine(RATE as usize, 0.5);
        assert!((rms(&wave) - 0.5 / 2.0_f32.sqrt()).abs() < 0.01);
    }

    #[test]
    fn voiced_ratio_counts_loud_frames() {
        // Half a second of tone followed by half a second of silence.
        let mut samples = sine(8_000, 0.1);
        samples.extend(vec![0.0; 8_000]);
        let ratio = voiced_ratio(&samples, 0.01, 30, RATE);
        assert!((ratio - 0.5).abs() < 0.05, "ratio {}", ratio);
    }

    #[test]
    fn short_window_degenerates_to_rms_check() {
        let samples = sine(100, 0.1); // well under one 30 ms frame
        assert_eq!(voiced_ratio(&samples, 0.01, 30, RATE), 1.0);
        assert_eq!(voiced_ratio(&samples, 0.9, 30, RATE), 0.0);
    }

    #[test]
    fn gate_passes_tone_and_blocks_silence() {
        let mut gate = VadGate::new(VadConfig::default());
        let now = Instant::now();

        let decision = gate.assess(&sine(16_000, 0.05), RATE, now);
        assert!(decision.voiced);

        let mut quiet_gate = VadGate::new(VadConfig::default());
        let decision = quiet_gate.assess(&vec![0.0; 16_000], RATE, now);
        assert!(!decision.voiced);
        assert_eq!(quiet_gate.since_last_voice(now), None);
    }

    #[test]
    fn continuation_lowers_thresholds() {
        let config = VadConfig {
            rms_threshold: 0.01,
            min_voiced_ratio: 0.5,
            ..VadConfig::default()
        };
        let mut gate = VadGate::new(config);
        let t0 = Instant::now();

        // Loud window establishes voice.
        assert!(gate.assess(&sine(16_000, 0.1), RATE, t0).voiced);

        // A window whose RMS sits between the scaled and unscaled floors:
        // fails cold, passes with the 0.55 continuation factor applied.
        // RMS of sine(a) is a/sqrt(2), so a = 0.0119 gives RMS ~0.0084.
        let quiet = sine(16_000, 0.0119);

        let within = t0 + Duration::from_millis(500);
        assert!(gate.assess(&quiet, RATE, within).voiced);

        let mut cold_gate = VadGate::new(VadConfig {
            rms_threshold: 0.01,
            min_voiced_ratio: 0.5,
            ..VadConfig::default()
        });
        assert!(!cold_gate.assess(&quiet, RATE, t0).voiced);
    }

    #[test]
    fn continuation_expires() {
        let config = VadConfig {
            rms_threshold: 0.01,
            min_voiced_ratio: 0.5,
            ..VadConfig::default()
        };
        let mut gate = VadGate::new(config);
        let t0 = Instant::now();

        assert!(gate.assess(&sine(16_000, 0.1), RATE, t0).voiced);

        let quiet: Vec<f32> = sine(16_000, 0.01).iter().map(|s| s * 0.7).collect();
        let late = t0 + Duration::from_millis(2_500);
        assert!(!gate.assess(&quiet, RATE, late).voiced);
    }

    #[test]
    fn reset_clears_continuation() {
        let mut gate = VadGate::new(VadConfig::default());
        let t0 = Instant::now();
        gate.assess(&sine(16_000, 0.1), RATE, t0);
        assert!(gate.since_last_voice(t0).is_some());
        gate.reset();
        assert!(gate.since_last_voice(t0).is_none());
    }
}
