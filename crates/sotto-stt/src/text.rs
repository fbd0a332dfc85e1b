//! Token-level utilities over decoder output.
//!
//! Hypotheses are compared word-by-word under normalization (lowercased,
//! leading/trailing non-word characters stripped) so that punctuation and
//! casing churn between decodes does not break alignment. The hallucination
//! filter catches the stock phrases whisper emits over near-silence.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Stock phrases the model produces on silence, noise, or music. Matched
/// against text normalized to lowercase letters and spaces.
static HALLUCINATION_MARKERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "blank",
        "blank audio",
        "blankaudio",
        "video playback",
        "music",
        "music playing",
        "keyboard clicking",
        "silence",
        "silence please",
        "quiet",
        "inaudible",
        "foreign",
        "subtitle",
        "pause",
        "breathing",
        "inhales deeply",
        "inhale",
    ]
    .into_iter()
    .collect()
});

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase and strip leading/trailing non-alphanumeric characters.
/// `"Hello," -> "hello"`, `"---" -> ""`.
pub fn normalize_word(word: &str) -> String {
    let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
    trimmed.to_lowercase()
}

pub fn count_word_like_tokens(text: &str) -> usize {
    text.split_whitespace()
        .filter(|t| !normalize_word(t).is_empty())
        .count()
}

/// Length of the common prefix of two word lists under normalization.
pub fn common_prefix_len(a: &[String], b: &[String]) -> usize {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| normalize_word(x) == normalize_word(y))
        .count()
}

/// Largest `k <= limit` such that the last `k` normalized words of `prev`
/// equal the first `k` of `new`.
pub fn tail_overlap_words(prev: &[String], new: &[String], limit: usize) -> usize {
    if prev.is_empty() || new.is_empty() {
        return 0;
    }
    let max_overlap = prev.len().min(new.len()).min(limit);
    for k in (1..=max_overlap).rev() {
        let tail = prev[prev.len() - k..].iter().map(|w| normalize_word(w));
        let head = new[..k].iter().map(|w| normalize_word(w));
        if tail.eq(head) {
            return k;
        }
    }
    0
}

/// True when the text is one of the known over-silence phrases.
pub fn is_hallucination(text: &str) -> bool {
    let mut normalized = String::with_capacity(text.len());
    let mut last_was_space = true;
    for ch in text.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_ascii_alphabetic() {
            normalized.push(ch.to_ascii_lowercase());
            last_was_space = false;
        } else if ch == ' ' && !last_was_space {
            normalized.push(' ');
            last_was_space = true;
        }
        // Everything else (punctuation, brackets, digits) drops out.
    }
    let normalized = normalized.trim();
    HALLUCINATION_MARKERS.contains(normalized)
}

/// Split text into owned word tokens.
pub fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Pick between a pending hypothesis and a fresh decode at a flush point.
///
/// Near-identical texts (common prefix covering all but one word) resolve
/// to the longer one. Otherwise the fresh decode wins only when its head
/// anchors onto the pending tail; an unanchored fresh decode over mostly
/// padded silence is treated as hallucination and dropped.
pub fn choose_flush_candidate(pending: &str, decoded: &str, min_anchor: usize) -> String {
    let pending = collapse_whitespace(pending);
    let decoded = collapse_whitespace(decoded);
    if pending.is_empty() {
        return decoded;
    }
    if decoded.is_empty() {
        return pending;
    }

    let pending_words = words(&pending);
    let decoded_words = words(&decoded);

    let prefix = common_prefix_len(&pending_words, &decoded_words);
    if prefix >= 1.max(pending_words.len().min(decoded_words.len()).saturating_sub(1)) {
        return if decoded_words.len() >= pending_words.len() {
            decoded
        } else {
            pending
        };
    }

    if tail_overlap_words(&pending_words, &decoded_words, 64) >= min_anchor.max(1) {
        return decoded;
    }

    pending
}
