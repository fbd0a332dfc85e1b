//! Waybar status probe: reads both daemons' state files and emits one JSON
//! object for a custom module.

use serde::Serialize;

use sotto_foundation::{DaemonStatus, StateFiles};

use crate::{commands, dictation};

#[derive(Debug, Serialize, PartialEq)]
pub struct StatusOutput {
    pub text: String,
    pub alt: String,
    pub class: Vec<String>,
    pub tooltip: String,
}

impl StatusOutput {
    fn new(alt: &str, class: &[&str], tooltip: &str) -> Self {
        Self {
            text: String::new(),
            alt: alt.to_string(),
            class: class.iter().map(|c| c.to_string()).collect(),
            tooltip: tooltip.to_string(),
        }
    }
}

pub fn status_output(dictation_state: &StateFiles, commands_state: &StateFiles) -> StatusOutput {
    if commands_state.daemon_alive() {
        return StatusOutput::new(
            "commands",
            &["commands", "on"],
            "Voice command mode enabled\nR-Ctrl x2: toggle commands\nL-Ctrl x2: switch to dictation",
        );
    }
    match dictation_state.status() {
        DaemonStatus::Typing => StatusOutput::new(
            "on",
            &["running", "typing", "on"],
            "Dictation typing enabled\nL-Ctrl x2: toggle typing\nR-Ctrl x2: voice commands",
        ),
        DaemonStatus::Running => StatusOutput::new(
            "warm",
            &["running", "warm"],
            "Dictation model loaded (typing off)\nL-Ctrl x2: enable typing\nR-Ctrl x2: voice commands",
        ),
        DaemonStatus::Stopped => StatusOutput::new(
            "off",
            &["stopped", "off"],
            "Speech daemons stopped\nL-Ctrl x2: dictation\nR-Ctrl x2: voice commands",
        ),
    }
}

pub fn cli_status() -> i32 {
    let output = status_output(
        &StateFiles::new(dictation::DAEMON_NAME),
        &StateFiles::new(commands::DAEMON_NAME),
    );
    match serde_json::to_string(&output) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("status serialization failed: {e}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn states(tmp: &TempDir) -> (StateFiles, StateFiles) {
        (
            StateFiles::in_dir(tmp.path(), "sotto-dictate"),
            StateFiles::in_dir(tmp.path(), "sotto-commands"),
        )
    }

    #[test]
    fn stopped_when_nothing_runs() {
        let tmp = TempDir::new().unwrap();
        let (dict, cmd) = states(&tmp);
        let out = status_output(&dict, &cmd);
        assert_eq!(out.alt, "off");
        assert_eq!(out.class, vec!["stopped", "off"]);
    }

    #[test]
    fn commands_mode_wins_over_dictation() {
        let tmp = TempDir::new().unwrap();
        let (dict, cmd) = states(&tmp);
        // Both "alive" via this test process's pid.
        dict.write_pid(std::process::id()).unwrap();
        dict.set_typing(true);
        cmd.write_pid(std::process::id()).unwrap();

        let out = status_output(&dict, &cmd);
        assert_eq!(out.alt, "commands");
        assert_eq!(out.class, vec!["commands", "on"]);
    }

    #[test]
    fn typing_and_warm_states() {
        let tmp = TempDir::new().unwrap();
        let (dict, cmd) = states(&tmp);
        dict.write_pid(std::process::id()).unwrap();

        let warm = status_output(&dict, &cmd);
        assert_eq!(warm.alt, "warm");
        assert_eq!(warm.class, vec!["running", "warm"]);

        dict.set_typing(true);
        let typing = status_output(&dict, &cmd);
        assert_eq!(typing.alt, "on");
        assert_eq!(typing.class, vec!["running", "typing", "on"]);
    }

    #[test]
    fn stale_pid_files_read_as_stopped() {
        let tmp = TempDir::new().unwrap();
        let (dict, cmd) = states(&tmp);
        dict.write_pid(i32::MAX as u32).unwrap();
        dict.set_typing(true);

        let out = status_output(&dict, &cmd);
        assert_eq!(out.alt, "off");
    }

    #[test]
    fn output_serializes_with_class_array() {
        let tmp = TempDir::new().unwrap();
        let (dict, cmd) = states(&tmp);
        let json = serde_json::to_string(&status_output(&dict, &cmd)).unwrap();
        assert!(json.contains(r#""class":["stopped","off"]"#));
        assert!(json.contains(r#""tooltip":"#));
    }
}
