use std::process::Stdio;

/// Fire-and-forget desktop notification. Failures only log; the
/// notification channel is best-effort by design. Uses a plain std spawn so
/// it is callable from sync contexts (the arbiter) as well as async ones.
pub fn notify(summary: &str, body: &str) {
    let mut command = std::process::Command::new("notify-send");
    command
        .args(["-a", "Sotto", summary])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if !body.is_empty() {
        command.arg(body);
    }
    if let Err(e) = command.spawn() {
        tracing::debug!("notify-send unavailable: {}", e);
    }
}

/// Open a URL with the system handler, falling back to a compositor exec.
pub async fn open_url(url: &str) -> bool {
    let spawned = std::process::Command::new("xdg-open")
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    match spawned {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("xdg-open unavailable ({}), falling back to exec", e);
            crate::dispatch::exec(&format!("xdg-open '{}'", url.replace('\'', "%27")))
                .await
                .is_ok()
        }
    }
}
