pub mod model;
pub mod text;
pub mod transcriber;
pub mod whisper;

pub use model::ModelSpec;
pub use transcriber::Transcriber;
pub use whisper::WhisperTranscriber;
