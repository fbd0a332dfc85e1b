//! Intent execution: resolve targets against the config, drive the
//! compositor, and report every outcome through a notification.

use std::process::Stdio;
use std::time::Duration;

use sotto_hypr::{notify, Client};
use sotto_inject::{KeyEvent, KeystrokeInjector, KEY_EQUAL, KEY_LEFTCTRL, KEY_MINUS};

use super::config::{AppEntry, CommandsConfig, CustomCommand};
use super::intent::{normalize_command_text, normalize_target, parse_intent, Intent};

#[derive(Debug, Clone)]
pub struct ZoomSettings {
    pub key_delay_ms: u32,
    pub step_sleep: Duration,
    pub repeat_max: u32,
}

impl Default for ZoomSettings {
    fn default() -> Self {
        Self {
            key_delay_ms: 14,
            step_sleep: Duration::from_millis(40),
            repeat_max: 30,
        }
    }
}

fn app_aliases(app: &AppEntry) -> Vec<String> {
    let mut aliases = Vec::new();
    if !app.id.trim().is_empty() {
        aliases.push(normalize_target(&app.id));
    }
    for alias in &app.aliases {
        let normalized = normalize_target(alias);
        if !normalized.is_empty() && !aliases.contains(&normalized) {
            aliases.push(normalized);
        }
    }
    aliases
}

/// Exact alias match first, then substring in either direction.
pub fn resolve_app<'a>(cfg: &'a CommandsConfig, target: &str) -> Option<&'a AppEntry> {
    let target = normalize_target(target);
    if target.is_empty() {
        return None;
    }

    for app in &cfg.apps {
        if app_aliases(app).contains(&target) {
            return Some(app);
        }
    }
    for app in &cfg.apps {
        for alias in app_aliases(app) {
            if target.contains(&alias) || alias.contains(&target) {
                return Some(app);
            }
        }
    }
    None
}

fn custom_aliases(entry: &CustomCommand) -> Vec<String> {
    let mut aliases = Vec::new();
    if !entry.id.trim().is_empty() {
        aliases.push(normalize_command_text(&entry.id));
    }
    for alias in &entry.aliases {
        let normalized = normalize_command_text(alias);
        if !normalized.is_empty() && !aliases.contains(&normalized) {
            aliases.push(normalized);
        }
    }
    aliases
}

/// Custom commands match the whole normalized utterance, verbatim or with
/// a `run`/`execute`/`start` prefix stripped. Checked before the intent
/// table so a custom alias can shadow a built-in rule.
pub fn resolve_custom<'a>(
    cfg: &'a CommandsConfig,
    normalized_text: &str,
) -> Option<&'a CustomCommand> {
    let mut candidates = vec![normalized_text.to_string()];
    for prefix in ["run ", "execute ", "start "] {
        if let Some(rest) = normalized_text.strip_prefix(prefix) {
            candidates.push(rest.trim().to_string());
        }
    }

    for candidate in candidates.iter().filter(|c| !c.is_empty()) {
        for entry in &cfg.commands {
            if custom_aliases(entry).contains(candidate) {
                return Some(entry);
            }
        }
    }
    None
}

pub fn client_matches(client: &Client, app: &AppEntry) -> bool {
    let class = client.class.to_lowercase();
    let title = client.title.to_lowercase();
    app.match_spec
        .class_contains
        .iter()
        .any(|token| class.contains(&token.to_lowercase()))
        || app
            .match_spec
            .title_contains
            .iter()
            .any(|token| title.contains(&token.to_lowercase()))
}

/// Prefer a client on the active workspace, else the first match.
pub fn select_preferred<'a>(clients: &'a [Client], active_workspace: Option<&str>) -> Option<&'a Client> {
    if let Some(ws) = active_workspace {
        if let Some(client) = clients.iter().find(|c| c.workspace.name == ws) {
            return Some(client);
        }
    }
    clients.first()
}

async fn matching_clients(app: &AppEntry) -> Vec<Client> {
    sotto_hypr::clients()
        .await
        .into_iter()
        .filter(|c| client_matches(c, app))
        .collect()
}

async fn preferred_client(app: &AppEntry) -> Option<Client> {
    let clients = matching_clients(app).await;
    let active = sotto_hypr::active_workspace_name().await;
    select_preferred(&clients, active.as_deref()).cloned()
}

fn spawn_detached(command: &str, cwd: Option<&str>) -> bool {
    let mut cmd = std::process::Command::new("bash");
    cmd.args(["-lc", command])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(cwd) = cwd {
        cmd.current_dir(expand_home(cwd));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd.spawn().is_ok()
}

fn expand_home(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    std::path::PathBuf::from(path)
}

async fn open_app(app: &AppEntry) -> bool {
    let launch = app.launch.trim();
    if launch.is_empty() {
        return false;
    }
    if spawn_detached(launch, None) {
        return true;
    }
    sotto_hypr::exec(launch).await.is_ok()
}

async fn show_app(app: &AppEntry) -> bool {
    if let Some(client) = preferred_client(app).await {
        if sotto_hypr::focus_window(&client.address).await.is_ok() {
            return true;
        }
    }
    open_app(app).await
}

async fn focus_app(app: &AppEntry) -> bool {
    match preferred_client(app).await {
        Some(client) => sotto_hypr::focus_window(&client.address).await.is_ok(),
        None => false,
    }
}

async fn close_app(app: &AppEntry) -> bool {
    for client in matching_clients(app).await {
        if sotto_hypr::close_window(&client.address).await.is_ok() {
            return true;
        }
    }
    match app.close.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(close_cmd) => sotto_hypr::exec(close_cmd).await.is_ok(),
        None => false,
    }
}

async fn move_app_to_workspace(app: &AppEntry, workspace: &str) -> bool {
    match preferred_client(app).await {
        Some(client) => sotto_hypr::move_window_silent(&client.address, workspace)
            .await
            .is_ok(),
        None => false,
    }
}

async fn move_active_to_workspace(workspace: &str) -> bool {
    match sotto_hypr::active_window_address().await {
        Ok(address) => sotto_hypr::move_window_silent(&address, workspace)
            .await
            .is_ok(),
        Err(_) => false,
    }
}

/// Build the search URL from the configured engine template.
pub fn search_url(cfg: &CommandsConfig, query: &str) -> Option<String> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    let template = cfg
        .search
        .engines
        .get(&cfg.search.default_engine)
        .filter(|t| t.contains("{query}"))
        .cloned()
        .unwrap_or_else(|| "https://duckduckgo.com/?q={query}".to_string());
    Some(template.replace("{query}", &urlencoding::encode(query)))
}

async fn search_web(cfg: &CommandsConfig, query: &str) -> bool {
    match search_url(cfg, query) {
        Some(url) => sotto_hypr::open_url(&url).await,
        None => false,
    }
}

async fn zoom(steps: u32, zoom_in: bool, settings: &ZoomSettings) -> bool {
    let steps = steps.clamp(1, settings.repeat_max);
    let key = if zoom_in { KEY_EQUAL } else { KEY_MINUS };
    let events = [
        KeyEvent::down(KEY_LEFTCTRL),
        KeyEvent::down(key),
        KeyEvent::up(key),
        KeyEvent::up(KEY_LEFTCTRL),
    ];
    let injector = KeystrokeInjector::new(settings.key_delay_ms);

    for step in 0..steps {
        if injector
            .send_key_events(&events, settings.key_delay_ms)
            .await
            .is_err()
        {
            return false;
        }
        if step + 1 < steps && !settings.step_sleep.is_zero() {
            tokio::time::sleep(settings.step_sleep).await;
        }
    }
    true
}

pub async fn execute_custom(entry: &CustomCommand) -> bool {
    if !entry.dispatches.is_empty() {
        for line in &entry.dispatches {
            if sotto_hypr::dispatch_line(line).await.is_err() {
                return false;
            }
        }
        return true;
    }

    if let Some(dispatch) = entry.dispatch.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        return sotto_hypr::dispatch_line(dispatch).await.is_ok();
    }

    let Some(exec_cmd) = entry.exec.as_deref().map(str::trim).filter(|e| !e.is_empty()) else {
        return false;
    };

    if entry.detached.unwrap_or(true) {
        return spawn_detached(exec_cmd, entry.cwd.as_deref());
    }

    let mut cmd = tokio::process::Command::new("bash");
    cmd.args(["-lc", exec_cmd])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = entry.cwd.as_deref() {
        cmd.current_dir(expand_home(cwd));
    }
    match tokio::time::timeout(Duration::from_secs(600), cmd.output()).await {
        Ok(Ok(output)) => output.status.success(),
        _ => false,
    }
}

/// Execute a parsed intent, notifying the desktop with the outcome.
pub async fn execute_intent(
    intent: &Intent,
    cfg: &CommandsConfig,
    zoom_settings: &ZoomSettings,
) -> bool {
    match intent {
        Intent::Search(query) => {
            let ok = search_web(cfg, query).await;
            tracing::info!(ok, query = %query, "command: search");
            notify("Search", &outcome_body(query, ok));
            ok
        }
        Intent::ZoomIn(count) => {
            let ok = zoom(*count, true, zoom_settings).await;
            tracing::info!(ok, count, "command: zoom-in");
            notify("Enhance", &format!("x{count}: {}", ok_text(ok)));
            ok
        }
        Intent::ZoomOut(count) => {
            let ok = zoom(*count, false, zoom_settings).await;
            tracing::info!(ok, count, "command: zoom-out");
            notify("Zoom Out", &format!("x{count}: {}", ok_text(ok)));
            ok
        }
        Intent::CloseActive => {
            let ok = sotto_hypr::kill_active().await.is_ok();
            tracing::info!(ok, "command: close-active");
            notify("Close Active Window", ok_text(ok));
            ok
        }
        Intent::MoveActiveToWorkspace(workspace) => {
            let ok = move_active_to_workspace(workspace).await;
            tracing::info!(ok, workspace = %workspace, "command: move-active");
            notify(
                "Move Active Window",
                &format!("workspace {workspace}: {}", ok_text(ok)),
            );
            ok
        }
        Intent::MoveAppToWorkspace { app, workspace } => {
            let Some(entry) = resolve_app(cfg, app) else {
                notify("Unknown app", app);
                tracing::info!(target_app = %app, "unknown app");
                return false;
            };
            let ok = move_app_to_workspace(entry, workspace).await;
            tracing::info!(ok, app = %entry.id, workspace = %workspace, "command: move-app");
            notify(
                "Move App",
                &format!("{} -> workspace {workspace}: {}", entry.id, ok_text(ok)),
            );
            ok
        }
        Intent::Open(target) | Intent::Show(target) | Intent::Focus(target)
        | Intent::Close(target) => {
            let Some(entry) = resolve_app(cfg, target) else {
                notify("Unknown app", target);
                tracing::info!(target_app = %target, "unknown app");
                return false;
            };
            let (ok, label) = match intent {
                Intent::Open(_) => (open_app(entry).await, "Open App"),
                Intent::Show(_) => (show_app(entry).await, "Show App"),
                Intent::Focus(_) => (focus_app(entry).await, "Focus App"),
                Intent::Close(_) => (close_app(entry).await, "Close App"),
                _ => unreachable!(),
            };
            tracing::info!(ok, app = %entry.id, action = label, "command");
            notify(label, &format!("{}: {}", entry.id, ok_text(ok)));
            ok
        }
    }
}

/// Full utterance execution: custom commands first, then the intent table.
pub async fn execute_text(
    text: &str,
    cfg: &CommandsConfig,
    zoom_settings: &ZoomSettings,
) -> bool {
    let normalized = normalize_command_text(text);
    if let Some(custom) = resolve_custom(cfg, &normalized) {
        let ok = execute_custom(custom).await;
        let label = custom.notify.clone().unwrap_or_else(|| custom.id.clone());
        tracing::info!(ok, id = %custom.id, "command: custom");
        notify("Run Command", &format!("{label}: {}", ok_text(ok)));
        return ok;
    }

    match parse_intent(text, zoom_settings.repeat_max) {
        Some(intent) => execute_intent(&intent, cfg, zoom_settings).await,
        None => {
            tracing::info!(utterance = %text, "no command recognized");
            notify("No command recognized", text);
            false
        }
    }
}

fn ok_text(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "failed"
    }
}

fn outcome_body(payload: &str, ok: bool) -> String {
    if ok {
        payload.to_string()
    } else {
        format!("failed: {payload}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sotto_hypr::WorkspaceRef;

    fn cfg() -> CommandsConfig {
        CommandsConfig::default()
    }

    fn client(class: &str, title: &str, workspace: &str) -> Client {
        Client {
            address: format!("0x{class}"),
            class: class.to_string(),
            title: title.to_string(),
            workspace: WorkspaceRef {
                name: workspace.to_string(),
            },
        }
    }

    #[test]
    fn app_resolution_prefers_exact_aliases() {
        let cfg = cfg();
        assert_eq!(resolve_app(&cfg, "terminal").unwrap().id, "terminal");
        assert_eq!(resolve_app(&cfg, "the shell").unwrap().id, "terminal");
        assert_eq!(resolve_app(&cfg, "web browser please").unwrap().id, "browser");
        assert!(resolve_app(&cfg, "spreadsheet").is_none());
    }

    #[test]
    fn app_resolution_falls_back_to_substrings() {
        let cfg = cfg();
        // "file" is a substring of the "files" alias.
        assert_eq!(resolve_app(&cfg, "file").unwrap().id, "files");
    }

    #[test]
    fn custom_resolution_strips_run_prefixes() {
        let cfg = cfg();
        assert_eq!(
            resolve_custom(&cfg, "next workspace").unwrap().id,
            "workspace_next"
        );
        assert_eq!(
            resolve_custom(&cfg, "run next workspace").unwrap().id,
            "workspace_next"
        );
        assert!(resolve_custom(&cfg, "dance").is_none());
    }

    #[test]
    fn client_matching_is_substring_on_class_or_title() {
        let cfg = cfg();
        let terminal = resolve_app(&cfg, "terminal").unwrap();
        assert!(client_matches(&client("com.mitchellh.ghostty", "~", "1"), terminal));
        assert!(!client_matches(&client("brave-browser", "news", "1"), terminal));

        let titled = AppEntry {
            id: "journal".to_string(),
            match_spec: super::super::config::MatchSpec {
                class_contains: vec![],
                title_contains: vec!["journal".to_string()],
            },
            ..AppEntry::default()
        };
        assert!(client_matches(&client("obsidian", "Daily Journal", "2"), &titled));
    }

    #[test]
    fn preferred_client_sticks_to_active_workspace() {
        let clients = vec![
            client("ghostty", "a", "1"),
            client("ghostty", "b", "3"),
        ];
        assert_eq!(select_preferred(&clients, Some("3")).unwrap().title, "b");
        assert_eq!(select_preferred(&clients, Some("9")).unwrap().title, "a");
        assert_eq!(select_preferred(&clients, None).unwrap().title, "a");
        assert!(select_preferred(&[], Some("1")).is_none());
    }

    #[test]
    fn search_urls_encode_the_query() {
        let cfg = cfg();
        let url = search_url(&cfg, "rust async & await").unwrap();
        assert!(url.starts_with("https://duckduckgo.com/?q="));
        assert!(url.contains("rust%20async%20%26%20await"));
        assert!(search_url(&cfg, "  ").is_none());
    }

    #[test]
    fn search_falls_back_when_engine_is_unknown() {
        let mut cfg = cfg();
        cfg.search.default_engine = "missing".to_string();
        let url = search_url(&cfg, "hello").unwrap();
        assert!(url.starts_with("https://duckduckgo.com/"));
    }
}
