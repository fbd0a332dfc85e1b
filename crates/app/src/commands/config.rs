//! Voice-command configuration: known apps, custom commands, and search
//! engines. Built-in defaults are merged with the user's
//! `~/.config/sotto/commands.json`, entry by entry, keyed on `id` — a user
//! entry overrides the fields it names and unknown ids are appended.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSpec {
    pub class_contains: Vec<String>,
    pub title_contains: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppEntry {
    pub id: String,
    pub aliases: Vec<String>,
    pub launch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<String>,
    #[serde(rename = "match")]
    pub match_spec: MatchSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomCommand {
    pub id: String,
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dispatches: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_engine: String,
    pub engines: BTreeMap<String, String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let mut engines = BTreeMap::new();
        engines.insert(
            "duckduckgo".to_string(),
            "https://duckduckgo.com/?q={query}".to_string(),
        );
        engines.insert(
            "google".to_string(),
            "https://www.google.com/search?q={query}".to_string(),
        );
        engines.insert(
            "bing".to_string(),
            "https://www.bing.com/search?q={query}".to_string(),
        );
        Self {
            default_engine: "duckduckgo".to_string(),
            engines,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub apps: Vec<AppEntry>,
    pub commands: Vec<CustomCommand>,
    pub search: SearchConfig,
}

fn app(id: &str, aliases: &[&str], launch: &str, class_contains: &[&str]) -> AppEntry {
    AppEntry {
        id: id.to_string(),
        aliases: aliases.iter().map(|s| s.to_string()).collect(),
        launch: launch.to_string(),
        close: None,
        match_spec: MatchSpec {
            class_contains: class_contains.iter().map(|s| s.to_string()).collect(),
            title_contains: Vec::new(),
        },
    }
}

fn dispatch_command(id: &str, aliases: &[&str], dispatch: &str, notify: &str) -> CustomCommand {
    CustomCommand {
        id: id.to_string(),
        aliases: aliases.iter().map(|s| s.to_string()).collect(),
        dispatch: Some(dispatch.to_string()),
        notify: Some(notify.to_string()),
        ..CustomCommand::default()
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        let apps = vec![
            app(
                "terminal",
                &["terminal", "shell", "console"],
                "ghostty",
                &[
                    "ghostty",
                    "kitty",
                    "alacritty",
                    "wezterm",
                    "foot",
                    "gnome-terminal",
                    "konsole",
                    "xterm",
                ],
            ),
            app(
                "browser",
                &["browser", "web browser", "internet"],
                "brave",
                &[
                    "firefox",
                    "chromium",
                    "google-chrome",
                    "brave-browser",
                    "microsoft-edge",
                    "vivaldi",
                ],
            ),
            app(
                "files",
                &["files", "file manager", "explorer"],
                "thunar",
                &["thunar", "nautilus", "dolphin", "pcmanfm"],
            ),
            app(
                "notes",
                &["notes", "obsidian", "vault"],
                "obsidian",
                &["obsidian"],
            ),
            app(
                "media",
                &["media player", "video player", "vlc"],
                "vlc",
                &["vlc", "mpv"],
            ),
        ];

        let commands = vec![
            dispatch_command(
                "workspace_next",
                &["next workspace", "workspace next", "go to next workspace"],
                "workspace +1",
                "Next Workspace",
            ),
            dispatch_command(
                "workspace_previous",
                &[
                    "previous workspace",
                    "workspace previous",
                    "go to previous workspace",
                ],
                "workspace -1",
                "Previous Workspace",
            ),
            CustomCommand {
                id: "switch_monitor".to_string(),
                aliases: vec![
                    "switch monitor".to_string(),
                    "switch to other monitor".to_string(),
                    "move window to other monitor".to_string(),
                ],
                dispatches: vec![
                    "movewindow mon:+1".to_string(),
                    "focusmonitor +1".to_string(),
                ],
                notify: Some("Switch Monitor".to_string()),
                ..CustomCommand::default()
            },
            dispatch_command(
                "toggle_floating",
                &["toggle floating", "float window", "toggle floating window"],
                "togglefloating",
                "Toggle Floating",
            ),
            dispatch_command(
                "toggle_fullscreen",
                &["toggle fullscreen", "fullscreen", "full screen"],
                "fullscreen 1",
                "Toggle Fullscreen",
            ),
        ];

        Self {
            apps,
            commands,
            search: SearchConfig::default(),
        }
    }
}

impl CommandsConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sotto").join("commands.json"))
    }

    /// Load the user config merged over the defaults. A missing file is
    /// seeded with the defaults; a malformed one is ignored.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(text) = serde_json::to_string_pretty(&Self::default()) {
                let _ = std::fs::write(&path, text + "\n");
            }
            return Self::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::merged_from_str(&text),
            Err(_) => Self::default(),
        }
    }

    pub fn merged_from_str(user_json: &str) -> Self {
        let Ok(user) = serde_json::from_str::<Value>(user_json) else {
            tracing::warn!("ignoring malformed commands config");
            return Self::default();
        };
        let defaults =
            serde_json::to_value(Self::default()).expect("default config serializes");
        let merged = merge_config_values(defaults, user);
        serde_json::from_value(merged).unwrap_or_else(|e| {
            tracing::warn!("commands config failed to merge cleanly: {}", e);
            Self::default()
        })
    }
}

fn merge_config_values(defaults: Value, user: Value) -> Value {
    let Value::Object(mut base) = defaults else {
        return user;
    };
    let Value::Object(user_map) = user else {
        return Value::Object(base);
    };

    for (key, user_value) in user_map {
        match key.as_str() {
            "apps" | "commands" => {
                let default_list = base.remove(&key).unwrap_or(Value::Array(Vec::new()));
                base.insert(key, merge_named_list(default_list, user_value));
            }
            "search" => {
                let default_search = base.remove("search").unwrap_or(Value::Null);
                base.insert("search".to_string(), merge_search(default_search, user_value));
            }
            _ => {
                base.insert(key, user_value);
            }
        }
    }
    Value::Object(base)
}

/// Merge lists of `{id, ...}` objects: user fields override per id, and
/// user entries with unknown ids are appended in order.
fn merge_named_list(defaults: Value, user: Value) -> Value {
    let default_items: Vec<Value> = match defaults {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    let user_items: Vec<Value> = match user {
        Value::Array(items) => items,
        _ => return Value::Array(default_items),
    };

    let id_of = |item: &Value| -> Option<String> {
        item.get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut merged: Vec<Value> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for default_item in default_items {
        let Some(id) = id_of(&default_item) else {
            merged.push(default_item);
            continue;
        };
        let user_override = user_items
            .iter()
            .find(|u| id_of(u).as_deref() == Some(id.as_str()));
        match (default_item, user_override) {
            (Value::Object(mut base), Some(Value::Object(user_obj))) => {
                for (k, v) in user_obj {
                    base.insert(k.clone(), v.clone());
                }
                merged.push(Value::Object(base));
            }
            (item, _) => merged.push(item),
        }
        seen.push(id);
    }

    for user_item in user_items {
        match id_of(&user_item) {
            Some(id) if seen.contains(&id) => {}
            _ => merged.push(user_item),
        }
    }

    Value::Array(merged)
}

fn merge_search(defaults: Value, user: Value) -> Value {
    let Value::Object(mut base) = defaults else {
        return user;
    };
    let Value::Object(user_map) = user else {
        return Value::Object(base);
    };
    for (key, user_value) in user_map {
        if key == "engines" {
            if let (Some(Value::Object(base_engines)), Value::Object(user_engines)) =
                (base.get_mut("engines"), &user_value)
            {
                for (name, template) in user_engines {
                    base_engines.insert(name.clone(), template.clone());
                }
                continue;
            }
        }
        base.insert(key, user_value);
    }
    Value::Object(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_a_terminal_and_a_browser() {
        let cfg = CommandsConfig::default();
        assert!(cfg.apps.iter().any(|a| a.id == "terminal"));
        assert!(cfg.apps.iter().any(|a| a.id == "browser"));
        assert_eq!(cfg.search.default_engine, "duckduckgo");
        assert!(cfg.search.engines["duckduckgo"].contains("{query}"));
    }

    #[test]
    fn user_entry_overrides_named_fields_only() {
        let cfg = CommandsConfig::merged_from_str(
            r#"{"apps": [{"id": "terminal", "launch": "kitty"}]}"#,
        );
        let terminal = cfg.apps.iter().find(|a| a.id == "terminal").unwrap();
        assert_eq!(terminal.launch, "kitty");
        // Aliases come from the default entry, untouched.
        assert!(terminal.aliases.contains(&"shell".to_string()));
    }

    #[test]
    fn unknown_user_ids_are_appended() {
        let cfg = CommandsConfig::merged_from_str(
            r#"{"apps": [{"id": "editor", "aliases": ["editor"], "launch": "code",
                 "match": {"class_contains": ["code"]}}]}"#,
        );
        assert!(cfg.apps.iter().any(|a| a.id == "editor"));
        // Defaults are still present.
        assert!(cfg.apps.iter().any(|a| a.id == "terminal"));
    }

    #[test]
    fn search_engines_shallow_merge() {
        let cfg = CommandsConfig::merged_from_str(
            r#"{"search": {"default_engine": "kagi",
                 "engines": {"kagi": "https://kagi.com/search?q={query}"}}}"#,
        );
        assert_eq!(cfg.search.default_engine, "kagi");
        assert!(cfg.search.engines.contains_key("kagi"));
        assert!(cfg.search.engines.contains_key("duckduckgo"));
    }

    #[test]
    fn malformed_user_config_yields_defaults() {
        let cfg = CommandsConfig::merged_from_str("{broken");
        assert!(cfg.apps.iter().any(|a| a.id == "terminal"));
    }

    #[test]
    fn custom_command_shapes_deserialize() {
        let cfg = CommandsConfig::merged_from_str(
            r#"{"commands": [
                {"id": "rebuild", "aliases": ["rebuild system"],
                 "exec": "make install", "cwd": "~/src", "detached": false}
            ]}"#,
        );
        let rebuild = cfg.commands.iter().find(|c| c.id == "rebuild").unwrap();
        assert_eq!(rebuild.exec.as_deref(), Some("make install"));
        assert_eq!(rebuild.detached, Some(false));
        // Default customs survive the merge.
        assert!(cfg.commands.iter().any(|c| c.id == "workspace_next"));
    }
}
