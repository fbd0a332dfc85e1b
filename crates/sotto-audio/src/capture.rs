//! Capture stream ownership.
//!
//! `cpal::Stream` is not `Send`, so a dedicated thread builds the stream and
//! keeps it alive until shutdown. The data callback copies the first channel
//! into the shared ring and returns; it must never block on anything but the
//! ring mutex. Errors in the callback path only bump counters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, StreamConfig};

use sotto_foundation::AudioError;

use crate::device::SelectedDevice;
use crate::ring_buffer::AudioRingBuffer;

const BLOCK_SIZE: u32 = 1024;

#[derive(Debug, Default)]
pub struct CaptureStats {
    pub frames_captured: AtomicU64,
    pub frames_dropped: AtomicU64,
}

pub struct CaptureStream {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
}

impl CaptureStream {
    /// Spawn the capture thread and block until the stream is playing (or
    /// failed to open, or 3 s passed).
    pub fn spawn(
        selected: SelectedDevice,
        ring: Arc<AudioRingBuffer>,
    ) -> Result<Self, AudioError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(CaptureStats::default());
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), AudioError>>(1);

        let thread_shutdown = shutdown.clone();
        let thread_stats = stats.clone();
        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let stream = match build_stream(&selected, ring, thread_stats) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while !thread_shutdown.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(100));
                }
                drop(stream);
            })
            .map_err(|e| AudioError::Fatal(format!("failed to spawn audio thread: {e}")))?;

        match ready_rx.recv_timeout(Duration::from_secs(3)) {
            Ok(Ok(())) => Ok(Self {
                handle: Some(handle),
                shutdown,
                stats,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Thread wedged while opening the device; leave it detached.
                Err(AudioError::Fatal(
                    "audio stream did not start within 3s".to_string(),
                ))
            }
        }
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_stream(
    selected: &SelectedDevice,
    ring: Arc<AudioRingBuffer>,
    stats: Arc<CaptureStats>,
) -> Result<cpal::Stream, AudioError> {
    let default_config = selected
        .device
        .default_input_config()
        .map_err(|e| AudioError::FormatNotSupported(e.to_string()))?;
    let channels = default_config.channels().max(1);
    let sample_format = default_config.sample_format();

    let config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(selected.sample_rate),
        buffer_size: BufferSize::Fixed(BLOCK_SIZE),
    };

    match try_build(selected, &config, sample_format, ring.clone(), stats.clone()) {
        Ok(stream) => Ok(stream),
        Err(first_err) => {
            // Some backends refuse fixed block sizes; retry with the default.
            tracing::debug!(
                "fixed block size rejected ({}), retrying with default",
                first_err
            );
            let config = StreamConfig {
                buffer_size: BufferSize::Default,
                ..config
            };
            try_build(selected, &config, sample_format, ring, stats)
        }
    }
}

fn try_build(
    selected: &SelectedDevice,
    config: &StreamConfig,
    sample_format: SampleFormat,
    ring: Arc<AudioRingBuffer>,
    stats: Arc<CaptureStats>,
) -> Result<cpal::Stream, AudioError> {
    let channels = config.channels as usize;
    let err_stats = stats.clone();
    let err_fn = move |err: cpal::StreamError| {
        tracing::error!("audio stream error: {}", err);
        err_stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
    };

    // Scratch buffer reused across callbacks to keep the hot path
    // allocation-free after warmup.
    let mut mono: Vec<f32> = Vec::new();

    let push_mono = move |mono: &[f32]| {
        ring.push(mono);
        stats.frames_captured.fetch_add(1, Ordering::Relaxed);
    };

    let stream = match sample_format {
        SampleFormat::F32 => selected.device.build_input_stream(
            config,
            move |data: &[f32], _: &_| {
                mono.clear();
                mono.extend(data.iter().step_by(channels).copied());
                push_mono(&mono);
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => selected.device.build_input_stream(
            config,
            move |data: &[i16], _: &_| {
                mono.clear();
                mono.extend(
                    data.iter()
                        .step_by(channels)
                        .map(|&s| s as f32 / 32768.0),
                );
                push_mono(&mono);
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => selected.device.build_input_stream(
            config,
            move |data: &[u16], _: &_| {
                mono.clear();
                mono.extend(
                    data.iter()
                        .step_by(channels)
                        .map(|&s| (s as f32 - 32768.0) / 32768.0),
                );
                push_mono(&mono);
            },
            err_fn,
            None,
        )?,
        other => {
            return Err(AudioError::FormatNotSupported(format!("{other:?}")));
        }
    };
    Ok(stream)
}
