//! ydotool subprocess wrapper.
//!
//! Text goes in over stdin (`ydotool type --file -`) so arbitrary UTF-8
//! never fights the shell; key events use the `code:value` CLI contract.
//! Every call is bounded by a timeout and killed on drop, so a wedged
//! injector cannot stall the worker loop for long.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use sotto_foundation::InjectionError;

/// Linux input event codes used by the stack.
pub const KEY_BACKSPACE: u16 = 14;
pub const KEY_LEFTCTRL: u16 = 29;
pub const KEY_EQUAL: u16 = 13;
pub const KEY_MINUS: u16 = 12;

/// Most events ydotool is asked to deliver in one invocation. Keeps each
/// call's latency bounded and limits how much a failing call can lose.
const MAX_EVENTS_PER_CALL: usize = 40;

const CALL_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u16,
    pub down: bool,
}

impl KeyEvent {
    pub fn down(code: u16) -> Self {
        Self { code, down: true }
    }

    pub fn up(code: u16) -> Self {
        Self { code, down: false }
    }

    fn to_arg(self) -> String {
        format!("{}:{}", self.code, if self.down { 1 } else { 0 })
    }
}

#[derive(Debug, Clone)]
pub struct KeystrokeInjector {
    key_delay_ms: u32,
}

impl KeystrokeInjector {
    pub fn new(key_delay_ms: u32) -> Self {
        Self { key_delay_ms }
    }

    /// Type UTF-8 text into the focused window.
    pub async fn type_text(&self, text: &str) -> Result<(), InjectionError> {
        if text.is_empty() {
            return Ok(());
        }
        let mut child = Command::new("ydotool")
            .args([
                "type",
                "--key-delay",
                &self.key_delay_ms.to_string(),
                "--file",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InjectionError::Launch(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            drop(stdin);
        }

        let output = tokio::time::timeout(CALL_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| InjectionError::Timeout(CALL_TIMEOUT))??;

        if output.status.success() {
            Ok(())
        } else {
            Err(InjectionError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Deliver raw key events with a given per-event delay.
    pub async fn send_key_events(
        &self,
        events: &[KeyEvent],
        key_delay_ms: u32,
    ) -> Result<(), InjectionError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut args: Vec<String> =
            vec!["key".to_string(), "--key-delay".to_string(), key_delay_ms.to_string()];
        args.extend(events.iter().map(|e| e.to_arg()));

        let output = tokio::time::timeout(
            CALL_TIMEOUT,
            Command::new("ydotool")
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| InjectionError::Timeout(CALL_TIMEOUT))??;

        if output.status.success() {
            Ok(())
        } else {
            Err(InjectionError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Press backspace `count` times, batched. Returns the number of
    /// backspaces actually delivered; a failing batch aborts the rest.
    pub async fn backspace(&self, count: usize) -> usize {
        let mut delivered = 0;
        while delivered < count {
            let batch = (count - delivered).min(MAX_EVENTS_PER_CALL / 2);
            let events: Vec<KeyEvent> = std::iter::repeat(
                [KeyEvent::down(KEY_BACKSPACE), KeyEvent::up(KEY_BACKSPACE)],
            )
            .take(batch)
            .flatten()
            .collect();

            if let Err(e) = self.send_key_events(&events, self.key_delay_ms).await {
                tracing::warn!("backspace batch failed after {} of {}: {}", delivered, count, e);
                break;
            }
            delivered += batch;
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_event_args_use_code_value_form() {
        assert_eq!(KeyEvent::down(14).to_arg(), "14:1");
        assert_eq!(KeyEvent::up(14).to_arg(), "14:0");
        assert_eq!(KeyEvent::down(KEY_LEFTCTRL).to_arg(), "29:1");
    }

    #[tokio::test]
    async fn empty_inputs_are_noops() {
        let injector = KeystrokeInjector::new(2);
        // No subprocess is spawned for empty input, so these succeed even
        // without ydotool installed.
        assert!(injector.type_text("").await.is_ok());
        assert!(injector.send_key_events(&[], 2).await.is_ok());
        assert_eq!(injector.backspace(0).await, 0);
    }
}
