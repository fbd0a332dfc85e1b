//! whisper.cpp backend via the whisper-rs bindings.
//!
//! One `WhisperContext` holds the loaded model; a single `WhisperState` is
//! reused across invocations behind a mutex, which also serializes decodes
//! (the pipeline never wants two in flight anyway). Windows are decoded
//! standalone: context carry-over is disabled so a bad hypothesis cannot
//! poison the next window.

use parking_lot::Mutex;

use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

use sotto_foundation::SttError;

use crate::model::ModelSpec;
use crate::transcriber::Transcriber;

pub struct WhisperTranscriber {
    // Holds the loaded model; the reusable state below keeps it in use.
    _context: WhisperContext,
    state: Mutex<WhisperState>,
    threads: i32,
}

impl WhisperTranscriber {
    pub fn load(spec: &ModelSpec, threads: Option<u32>) -> Result<Self, SttError> {
        let model_path = spec.resolve()?;
        let model_str = model_path
            .to_str()
            .ok_or_else(|| SttError::LoadFailed("model path is not valid UTF-8".to_string()))?;

        tracing::info!("loading whisper model {}", model_path.display());

        let ctx_params = WhisperContextParameters::default();
        let context = WhisperContext::new_with_params(model_str, ctx_params)
            .map_err(|e| SttError::LoadFailed(format!("{e:?}")))?;

        let state = context
            .create_state()
            .map_err(|e| SttError::LoadFailed(format!("{e:?}")))?;

        let threads = threads
            .map(|t| t.max(1))
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get().min(4) as u32)
                    .unwrap_or(4)
            }) as i32;

        Ok(Self {
            _context: context,
            state: Mutex::new(state),
            threads,
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, samples_16k: &[f32], language: Option<&str>) -> Result<String, SttError> {
        if samples_16k.is_empty() {
            return Ok(String::new());
        }

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.threads);
        if let Some(lang) = language {
            params.set_language(Some(lang));
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_suppress_blank(true);
        params.set_temperature(0.0);
        // Each window stands alone.
        params.set_no_context(true);
        params.set_single_segment(false);

        let mut state = self.state.lock();
        state
            .full(params, samples_16k)
            .map_err(|e| SttError::TranscriptionFailed(format!("{e:?}")))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            match segment.to_str() {
                Ok(s) => {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(s.trim());
                }
                Err(e) => {
                    return Err(SttError::TranscriptionFailed(format!(
                        "segment text: {e:?}"
                    )))
                }
            }
        }
        Ok(text)
    }
}
