//! Utterance → intent parsing.
//!
//! A pure function over the normalized utterance: polite prefixes come off,
//! trailing punctuation goes, then the first matching rule wins. Anything
//! unmatched is `None` and the recognizer ignores it.

use once_cell::sync::Lazy;
use regex::Regex;

use sotto_stt::text::collapse_whitespace;

use super::numbers::{parse_repeat_count, workspace_number_word};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Open(String),
    Show(String),
    Focus(String),
    Close(String),
    CloseActive,
    Search(String),
    ZoomIn(u32),
    ZoomOut(u32),
    MoveActiveToWorkspace(String),
    MoveAppToWorkspace { app: String, workspace: String },
}

impl Intent {
    /// Stable key for live-confirmation counting: the same spoken command
    /// across consecutive hypotheses must produce the same key.
    pub fn key(&self) -> String {
        match self {
            Intent::Open(t) => format!("open:{t}"),
            Intent::Show(t) => format!("show:{t}"),
            Intent::Focus(t) => format!("focus:{t}"),
            Intent::Close(t) => format!("close:{t}"),
            Intent::CloseActive => "close-active:active-window".to_string(),
            Intent::Search(q) => format!("search:{q}"),
            Intent::ZoomIn(n) => format!("zoom-in:{n}"),
            Intent::ZoomOut(n) => format!("zoom-out:{n}"),
            Intent::MoveActiveToWorkspace(ws) => format!("move-active-workspace:{ws}"),
            Intent::MoveAppToWorkspace { app, workspace } => {
                format!("move-app-workspace:{app}:{workspace}")
            }
        }
    }
}

static TRAILING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[!?.,]+$").unwrap());
static CLOSE_ACTIVE_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:close|quit|exit|stop|kill)(?:\s+(?:current|this|active))?(?:\s+(?:app|application|window))?$",
    )
    .unwrap()
});
static SEARCH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:search(?: web)?(?: for)?|find|look up|google)\s+(.+)$").unwrap());
static BROWSER_SEARCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^open (?:the )?(?:browser|web|internet)(?: and)? search(?: for)?\s+(.+)$").unwrap()
});
static ZOOM_IN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:enhance|zoom in|increase zoom)(?:\s+(.+))?$").unwrap());
static ZOOM_OUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:zoom out|decrease zoom|reduce zoom|shrink)(?:\s+(.+))?$").unwrap());
static OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:open|launch|start|run)\s+(.+)$").unwrap());
static FOCUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:focus|activate)(?:\s+on)?\s+(.+)$").unwrap());
static SHOW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:show|bring|raise|switch to)\s+(.+)$").unwrap());
static MOVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:move|send)\s+(.+?)\s+to\s+(?:workspace|desktop)\s+(.+)$").unwrap()
});
static CLOSE_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:close|quit|exit|stop|kill)\s+(.+)$").unwrap());

static LEADING_ARTICLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:the|a|an)\s+").unwrap());
static TRAILING_POLITENESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+(?:please|now)$").unwrap());
static WS_LEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:workspace|desktop)\s+").unwrap());
static WS_NUM_LEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:number|num)\s+").unwrap());
static WS_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9:+_-]+$").unwrap());

const POLITE_PREFIXES: &[&str] = &[
    "please ",
    "can you ",
    "could you ",
    "would you ",
    "i want to ",
    "i'd like to ",
];

const MOVE_ACTIVE_SYNONYMS: &[&str] = &[
    "window",
    "current window",
    "active window",
    "this window",
    "current",
    "active",
    "this",
    "app",
    "application",
    "current app",
    "active app",
    "this app",
];

const CLOSE_ACTIVE_SYNONYMS: &[&str] = &[
    "app",
    "application",
    "window",
    "this",
    "current",
    "current window",
    "active window",
];

fn strip_polite_prefix(text: &str) -> String {
    let mut text = collapse_whitespace(&text.to_lowercase());
    loop {
        let mut changed = false;
        for prefix in POLITE_PREFIXES {
            if let Some(rest) = text.strip_prefix(prefix) {
                text = rest.trim_start().to_string();
                changed = true;
            }
        }
        if !changed {
            return text;
        }
    }
}

/// Normalize an utterance for matching: polite prefixes off, trailing
/// punctuation off, lowercased, whitespace collapsed.
pub fn normalize_command_text(text: &str) -> String {
    let stripped = strip_polite_prefix(text);
    let stripped = TRAILING_PUNCT.replace(&stripped, "");
    collapse_whitespace(&stripped)
}

/// Normalize an app/window target: article off the front, politeness off
/// the back.
pub fn normalize_target(text: &str) -> String {
    let lower = collapse_whitespace(&text.to_lowercase());
    let lower = LEADING_ARTICLE.replace(&lower, "");
    let lower = TRAILING_POLITENESS.replace(&lower, "");
    lower.trim().to_string()
}

/// Normalize a workspace target to a dispatcher-safe token, or `None`.
pub fn normalize_workspace_target(text: &str) -> Option<String> {
    let s = collapse_whitespace(&text.to_lowercase());
    let s = WS_LEAD.replace(&s, "");
    let s = WS_NUM_LEAD.replace(&s, "");
    let s = TRAILING_POLITENESS.replace(&s, "");
    let s = s.trim();
    if let Some(digit) = workspace_number_word(s) {
        return Some(digit.to_string());
    }
    WS_TOKEN.is_match(s).then(|| s.to_string())
}

/// First matching rule wins. `zoom_repeat_max` bounds zoom counts.
pub fn parse_intent(text: &str, zoom_repeat_max: u32) -> Option<Intent> {
    let s = normalize_command_text(text);
    if s.is_empty() {
        return None;
    }

    if CLOSE_ACTIVE_BARE.is_match(&s) {
        return Some(Intent::CloseActive);
    }

    for pattern in [&*SEARCH, &*BROWSER_SEARCH] {
        if let Some(caps) = pattern.captures(&s) {
            return Some(Intent::Search(collapse_whitespace(&caps[1])));
        }
    }

    if let Some(caps) = ZOOM_IN.captures(&s) {
        let count_text = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        return Some(Intent::ZoomIn(parse_repeat_count(count_text, 1, zoom_repeat_max)));
    }
    if let Some(caps) = ZOOM_OUT.captures(&s) {
        let count_text = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        return Some(Intent::ZoomOut(parse_repeat_count(count_text, 1, zoom_repeat_max)));
    }

    if let Some(caps) = OPEN.captures(&s) {
        let target = normalize_target(&caps[1]);
        if !target.is_empty() {
            return Some(Intent::Open(target));
        }
        return None;
    }

    if let Some(caps) = FOCUS.captures(&s) {
        let target = normalize_target(&caps[1]);
        if !target.is_empty() {
            return Some(Intent::Focus(target));
        }
        return None;
    }

    if let Some(caps) = SHOW.captures(&s) {
        let target = normalize_target(&caps[1]);
        if !target.is_empty() {
            return Some(Intent::Show(target));
        }
        return None;
    }

    if let Some(caps) = MOVE.captures(&s) {
        let app_target = normalize_target(&caps[1]);
        let workspace = normalize_workspace_target(&caps[2])?;
        if MOVE_ACTIVE_SYNONYMS.contains(&app_target.as_str()) {
            return Some(Intent::MoveActiveToWorkspace(workspace));
        }
        return Some(Intent::MoveAppToWorkspace {
            app: app_target,
            workspace,
        });
    }

    if let Some(caps) = CLOSE_TARGET.captures(&s) {
        let target = normalize_target(&caps[1]);
        if CLOSE_ACTIVE_SYNONYMS.contains(&target.as_str()) {
            return Some(Intent::CloseActive);
        }
        if !target.is_empty() {
            return Some(Intent::Close(target));
        }
        return None;
    }

    None
}
