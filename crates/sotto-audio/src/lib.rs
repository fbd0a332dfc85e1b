pub mod capture;
pub mod device;
pub mod resampler;
pub mod ring_buffer;

pub use capture::{CaptureStats, CaptureStream};
pub use device::{pick_device, SelectedDevice};
pub use resampler::WindowResampler;
pub use ring_buffer::AudioRingBuffer;

/// The rate every speech model input is resampled to.
pub const MODEL_SAMPLE_RATE: u32 = 16_000;
