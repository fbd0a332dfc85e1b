//! Emission-side punctuation policy.
//!
//! The model's punctuation is trustworthy mid-sentence but jumpy at chunk
//! boundaries, so the default style tightens spacing and drops terminal
//! punctuation on short chunks instead of committing a period the next
//! window would contradict.

use once_cell::sync::Lazy;
use regex::Regex;

use sotto_stt::text::collapse_whitespace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PunctuationStyle {
    Raw,
    Minimal,
    #[default]
    Adaptive,
}

impl PunctuationStyle {
    /// Lenient parse; anything unrecognized is the default style.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "raw" => Self::Raw,
            "minimal" => Self::Minimal,
            _ => Self::Adaptive,
        }
    }
}

static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());
static MID_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,:;!?]").unwrap());
static TRAILING_DOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.+$").unwrap());
static TERMINAL_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.?!]+$").unwrap());
static REPEATED_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([,;:!?]){2,}").unwrap());
static REPEATED_DOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").unwrap());

pub fn normalize_emit_text(
    text: &str,
    style: PunctuationStyle,
    short_sentence_terminal_words: usize,
) -> String {
    let out = collapse_whitespace(text);
    if out.is_empty() {
        return out;
    }
    if style == PunctuationStyle::Raw {
        return out;
    }

    // Tighten spacing around punctuation first.
    let out = SPACE_BEFORE_PUNCT.replace_all(&out, "$1").into_owned();

    if style == PunctuationStyle::Minimal {
        let out = MID_PUNCT.replace_all(&out, "");
        let out = TRAILING_DOTS.replace_all(&out, "");
        return collapse_whitespace(&out);
    }

    // Adaptive: short chunks do not get to end a sentence.
    let word_count = out.split_whitespace().count();
    let out = if word_count <= short_sentence_terminal_words.max(1) {
        TERMINAL_PUNCT.replace_all(&out, "").into_owned()
    } else {
        out
    };
    let out = REPEATED_PUNCT.replace_all(&out, "$1");
    let out = REPEATED_DOTS.replace_all(&out, ".");
    collapse_whitespace(&out)
}

/// Whether a space must be typed before `new_text`, given the last
/// character already on screen.
pub fn needs_leading_space(last_char: Option<char>, new_text: &str) -> bool {
    let Some(last) = last_char else {
        return false;
    };
    if matches!(last, ' ' | '\n' | '\t' | '(' | '[' | '{') {
        return false;
    }
    match new_text.chars().next() {
        Some(first) => !matches!(
            first,
            '.' | ',' | '!' | '?' | ';' | ':' | ')' | ']' | '}'
        ),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_leaves_text_alone() {
        assert_eq!(
            normalize_emit_text("well ,  okay !!", PunctuationStyle::Raw, 6),
            "well , okay !!"
        );
    }

    #[test]
    fn minimal_strips_mid_and_trailing_punctuation() {
        assert_eq!(
            normalize_emit_text("well, okay; sure!", PunctuationStyle::Minimal, 6),
            "well okay sure"
        );
        assert_eq!(
            normalize_emit_text("done...", PunctuationStyle::Minimal, 6),
            "done"
        );
    }

    #[test]
    fn adaptive_drops_terminal_punct_on_short_chunks() {
        assert_eq!(
            normalize_emit_text("open the door.", PunctuationStyle::Adaptive, 6),
            "open the door"
        );
        assert_eq!(
            normalize_emit_text("stop!", PunctuationStyle::Adaptive, 6),
            "stop"
        );
    }

    #[test]
    fn adaptive_keeps_terminal_punct_on_long_chunks() {
        let long = "this sentence has more than six words in it.";
        assert_eq!(
            normalize_emit_text(long, PunctuationStyle::Adaptive, 6),
            long
        );
    }

    #[test]
    fn adaptive_collapses_repeats_and_tightens_spaces() {
        assert_eq!(
            normalize_emit_text(
                "one two three four five six seven ,, really ??",
                PunctuationStyle::Adaptive,
                6
            ),
            "one two three four five six seven, really?"
        );
    }

    #[test]
    fn leading_space_rule() {
        assert!(needs_leading_space(Some('d'), "next"));
        assert!(needs_leading_space(Some('9'), "next"));
        assert!(!needs_leading_space(None, "next"));
        assert!(!needs_leading_space(Some(' '), "next"));
        assert!(!needs_leading_space(Some('('), "next"));
        assert!(!needs_leading_space(Some('d'), ", attached"));
        assert!(!needs_leading_space(Some('d'), ""));
    }
}
