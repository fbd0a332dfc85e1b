//! Model resolution: a spec is either an explicit path to a ggml file, or a
//! whisper.cpp model name resolved inside the local model directory.

use std::path::PathBuf;

use sotto_foundation::SttError;

#[derive(Debug, Clone)]
pub enum ModelSpec {
    Path(PathBuf),
    Name(String),
}

impl ModelSpec {
    /// Interpret a user-supplied string: anything that looks like a path
    /// (contains a separator or ends in `.bin`) is a path, otherwise a
    /// model name like `base.en`.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.contains('/') || value.ends_with(".bin") {
            ModelSpec::Path(PathBuf::from(value))
        } else {
            ModelSpec::Name(value.to_string())
        }
    }

    /// Model search directory: `SOTTO_MODEL_DIR` override, else
    /// `~/.local/share/sotto/models`.
    pub fn model_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os("SOTTO_MODEL_DIR") {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sotto")
            .join("models")
    }

    pub fn ggml_filename(name: &str) -> String {
        format!("ggml-{name}.bin")
    }

    /// Resolve to an existing file, or fail with the path that was tried.
    pub fn resolve(&self) -> Result<PathBuf, SttError> {
        let path = match self {
            ModelSpec::Path(p) => p.clone(),
            ModelSpec::Name(name) => Self::model_dir().join(Self::ggml_filename(name)),
        };
        if path.is_file() {
            Ok(path)
        } else {
            Err(SttError::ModelNotFound { path })
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ModelSpec::Path(p) => p.display().to_string(),
            ModelSpec::Name(n) => n.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_paths_are_distinguished() {
        assert!(matches!(ModelSpec::parse("base.en"), ModelSpec::Name(n) if n == "base.en"));
        assert!(matches!(
            ModelSpec::parse("/models/ggml-tiny.bin"),
            ModelSpec::Path(_)
        ));
        assert!(matches!(ModelSpec::parse("ggml-tiny.bin"), ModelSpec::Path(_)));
    }

    #[test]
    fn ggml_filename_shape() {
        assert_eq!(ModelSpec::ggml_filename("base.en"), "ggml-base.en.bin");
        assert_eq!(ModelSpec::ggml_filename("small"), "ggml-small.bin");
    }

    #[test]
    fn missing_model_reports_tried_path() {
        let spec = ModelSpec::Path(PathBuf::from("/definitely/not/here.bin"));
        match spec.resolve() {
            Err(SttError::ModelNotFound { path }) => {
                assert_eq!(path, PathBuf::from("/definitely/not/here.bin"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
