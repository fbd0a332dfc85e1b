//! Shared user configuration, read leniently: a missing or malformed file
//! yields defaults rather than an error, so the daemons always start.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    /// Preferred capture device, fuzzy-matched against input device names.
    pub audio_device_name: Option<String>,
    /// Language hint passed to the speech model (e.g. "en").
    pub language: Option<String>,
}

impl SharedConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sotto").join("config.json"))
    }

    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("ignoring malformed {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = SharedConfig::load_from(std::path::Path::new("/nonexistent/sotto.json"));
        assert!(cfg.audio_device_name.is_none());
        assert!(cfg.language.is_none());
    }

    #[test]
    fn malformed_json_yields_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let cfg = SharedConfig::load_from(&path);
        assert!(cfg.audio_device_name.is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"audio_device_name": "USB Mic", "theme": "dark"}"#,
        )
        .unwrap();
        let cfg = SharedConfig::load_from(&path);
        assert_eq!(cfg.audio_device_name.as_deref(), Some("USB Mic"));
    }
}
