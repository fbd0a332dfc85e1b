use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use sotto_foundation::WmError;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(8);

/// `hyprctl dispatch <args...>`.
pub async fn dispatch<I, S>(args: I) -> Result<(), WmError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut full: Vec<String> = vec!["dispatch".to_string()];
    full.extend(args.into_iter().map(|a| a.as_ref().to_string()));
    run_hyprctl(&full).await
}

/// Dispatch a whitespace-joined dispatcher line, e.g. `"workspace +1"`.
pub async fn dispatch_line(line: &str) -> Result<(), WmError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Err(WmError::Launch("empty dispatch line".to_string()));
    }
    dispatch(parts).await
}

/// `hyprctl dispatch exec <command>`.
pub async fn exec(command: &str) -> Result<(), WmError> {
    dispatch(["exec", command]).await
}

pub async fn focus_window(address: &str) -> Result<(), WmError> {
    let target = format!("address:{address}");
    dispatch(["focuswindow", target.as_str()]).await
}

pub async fn close_window(address: &str) -> Result<(), WmError> {
    let target = format!("address:{address}");
    dispatch(["closewindow", target.as_str()]).await
}

pub async fn kill_active() -> Result<(), WmError> {
    dispatch(["killactive"]).await
}

pub async fn move_window_silent(address: &str, workspace: &str) -> Result<(), WmError> {
    let target = format!("{workspace},address:{address}");
    dispatch(["movetoworkspacesilent", target.as_str()]).await
}

async fn run_hyprctl(args: &[String]) -> Result<(), WmError> {
    let output = tokio::time::timeout(
        DISPATCH_TIMEOUT,
        Command::new("hyprctl")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| WmError::Timeout(DISPATCH_TIMEOUT))?
    .map_err(|e| WmError::Launch(e.to_string()))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(WmError::DispatchFailed {
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Run hyprctl and capture stdout, for `-j` query calls.
pub(crate) async fn hyprctl_stdout(args: &[&str]) -> Result<String, WmError> {
    let output = tokio::time::timeout(
        Duration::from_secs(5),
        Command::new("hyprctl")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| WmError::Timeout(Duration::from_secs(5)))?
    .map_err(|e| WmError::Launch(e.to_string()))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(WmError::DispatchFailed {
            code: output.status.code().unwrap_or(-1),
            stderr: String::new(),
        })
    }
}
