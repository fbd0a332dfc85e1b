//! Window resampling to the model rate.
//!
//! The capture path stores samples at the device's native rate; only the
//! decode path needs 16 kHz, and it works on self-contained windows. Each
//! window is pushed through a sinc (polyphase) resampler in fixed chunks
//! with a final partial flush, so the full tail comes out without streaming
//! latency carrying over between windows. If the sinc resampler cannot be
//! built for a rate pair, a linear-interpolation fallback is used.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::MODEL_SAMPLE_RATE;

const CHUNK_SIZE: usize = 1024;

enum Inner {
    Identity,
    Sinc(Box<SincFixedIn<f32>>),
    Linear,
}

pub struct WindowResampler {
    in_rate: u32,
    inner: Inner,
}

impl WindowResampler {
    pub fn new(in_rate: u32) -> Self {
        if in_rate == MODEL_SAMPLE_RATE {
            return Self {
                in_rate,
                inner: Inner::Identity,
            };
        }

        let params = SincInterpolationParameters {
            sinc_len: 64,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 128,
            window: WindowFunction::Blackman2,
        };
        match SincFixedIn::<f32>::new(
            MODEL_SAMPLE_RATE as f64 / in_rate as f64,
            2.0,
            params,
            CHUNK_SIZE,
            1,
        ) {
            Ok(resampler) => Self {
                in_rate,
                inner: Inner::Sinc(Box::new(resampler)),
            },
            Err(e) => {
                tracing::warn!(
                    "sinc resampler unavailable for {}Hz -> {}Hz ({}), using linear interpolation",
                    in_rate,
                    MODEL_SAMPLE_RATE,
                    e
                );
                Self {
                    in_rate,
                    inner: Inner::Linear,
                }
            }
        }
    }

    pub fn input_rate(&self) -> u32 {
        self.in_rate
    }

    /// Resample one window to 16 kHz. The window is treated as
    /// self-contained; internal state is reset afterwards.
    pub fn resample(&mut self, window: &[f32]) -> Vec<f32> {
        if window.is_empty() {
            return Vec::new();
        }
        match &mut self.inner {
            Inner::Identity => window.to_vec(),
            Inner::Sinc(resampler) => {
                let mut out: Vec<f32> = Vec::with_capacity(
                    (window.len() as u64 * MODEL_SAMPLE_RATE as u64 / self.in_rate as u64) as usize
                        + CHUNK_SIZE,
                );
                for chunk in window.chunks(CHUNK_SIZE) {
                    let frames = if chunk.len() == CHUNK_SIZE {
                        resampler.process(&[chunk.to_vec()], None)
                    } else {
                        resampler.process_partial(Some(&[chunk.to_vec()]), None)
                    };
                    match frames {
                        Ok(frames) => {
                            if let Some(ch) = frames.first() {
                                out.extend_from_slice(ch);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("resampler error, dropping window: {}", e);
                            resampler.reset();
                            return Vec::new();
                        }
                    }
                }
                // Flush the filter's tail so the window comes out whole.
                if let Ok(frames) = resampler.process_partial::<Vec<f32>>(None, None) {
                    if let Some(ch) = frames.first() {
                        out.extend_from_slice(ch);
                    }
                }
                resampler.reset();
                out
            }
            Inner::Linear => linear_resample(window, self.in_rate, MODEL_SAMPLE_RATE),
        }
    }
}

/// Nearest-sample linear interpolation, the quality floor when sinc is
/// unavailable.
pub fn linear_resample(input: &[f32], in_rate: u32, out_rate: u32) -> Vec<f32> {
    if input.is_empty() || in_rate == 0 {
        return Vec::new();
    }
    if in_rate == out_rate {
        return input.to_vec();
    }
    let duration = input.len() as f64 / in_rate as f64;
    let out_len = ((duration * out_rate as f64).round() as usize).max(1);
    let step = input.len() as f64 / out_len as f64;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = pos.floor() as usize;
        let frac = (pos - idx as f64) as f32;
        let a = input[idx.min(input.len() - 1)];
        let b = input[(idx + 1).min(input.len() - 1)];
        out.push(a + (b - a) * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rate_is_passthrough() {
        let mut rs = WindowResampler::new(MODEL_SAMPLE_RATE);
        let input = vec![0.1f32, 0.2, 0.3];
        assert_eq!(rs.resample(&input), input);
    }

    #[test]
    fn downsample_48k_window_has_expected_length() {
        let mut rs = WindowResampler::new(48_000);
        // 0.5 s at 48 kHz should come out near 8000 samples at 16 kHz.
        let input: Vec<f32> = (0..24_000)
            .map(|i| (i as f32 * 0.01).sin() * 0.5)
            .collect();
        let out = rs.resample(&input);
        assert!(
            (7_000..=9_000).contains(&out.len()),
            "expected ~8000 samples, got {}",
            out.len()
        );
    }

    #[test]
    fn consecutive_windows_are_independent() {
        let mut rs = WindowResampler::new(48_000);
        let input: Vec<f32> = (0..9_600).map(|i| (i as f32 * 0.02).sin()).collect();
        let a = rs.resample(&input);
        let b = rs.resample(&input);
        assert_eq!(a.len(), b.len());
        // Same input must give the same output after the internal reset.
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn linear_fallback_preserves_duration_and_range() {
        let input = vec![0.0f32, 1.0, 0.0, -1.0];
        let out = linear_resample(&input, 8_000, 16_000);
        assert_eq!(out.len(), 8);
        assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn linear_upsample_constant_stays_constant() {
        let input = vec![0.25f32; 100];
        let out = linear_resample(&input, 16_000, 44_100);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert!((out.len() as i64 - 276).abs() <= 1);
    }
}
