use sotto_foundation::SttError;

/// A speech model invocation: mono 16 kHz f32 samples in, raw text out.
///
/// Implementations are called from `spawn_blocking` contexts and may take
/// hundreds of milliseconds; they must be callable from multiple sequential
/// decodes without re-initialization.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, samples_16k: &[f32], language: Option<&str>) -> Result<String, SttError>;
}
