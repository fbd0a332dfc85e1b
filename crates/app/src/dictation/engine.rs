//! The streaming commit engine: stable-prefix detection, tail revision,
//! and the emit/retract protocol.
//!
//! The engine owns the emission history and the typed-piece ledger and
//! keeps them in lockstep: both grow only after the sink confirmed an
//! emission, both shrink only after the sink confirmed a retraction, and
//! both forget their oldest entries together when the revision horizon
//! moves on.

use std::collections::VecDeque;

use sotto_foundation::InjectionError;
use sotto_inject::TypedLedger;
use sotto_stt::text::{
    choose_flush_candidate, collapse_whitespace, common_prefix_len, count_word_like_tokens,
    is_hallucination, tail_overlap_words, words,
};

use super::punctuation::{needs_leading_space, normalize_emit_text, PunctuationStyle};

/// Cap on overlap searches between consecutive hypotheses.
const OVERLAP_LIMIT: usize = 64;

/// Where committed text lands. The production sink wraps the ydotool
/// injector; tests substitute a scripted screen.
#[allow(async_fn_in_trait)]
pub trait TextSink {
    async fn type_text(&mut self, text: &str) -> Result<(), InjectionError>;
    /// Deliver `bytes` backspaces, returning how many actually landed.
    async fn backspace(&mut self, bytes: usize) -> usize;
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Most trailing words a revision may delete.
    pub max_revise_words: usize,
    /// Minimum re-anchor overlap for accepting a revision.
    pub min_anchor_words: usize,
    /// Minimum words per emission.
    pub min_emit_words: usize,
    /// Revision horizon: how many committed words stay retractable.
    pub history_words: usize,
    pub punctuation: PunctuationStyle,
    pub short_sentence_terminal_words: usize,
    /// Anchor requirement for preferring a fresh decode at flush time.
    pub flush_min_anchor_words: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_revise_words: 3,
            min_anchor_words: 2,
            min_emit_words: 1,
            history_words: 72,
            punctuation: PunctuationStyle::Adaptive,
            short_sentence_terminal_words: 6,
            flush_min_anchor_words: 2,
        }
    }
}

/// Best alignment of a candidate against committed history, possibly
/// retracting up to `max_revise` trailing words.
///
/// Returns `(delete_n, new_words)`. The resolver never accepts an
/// alignment whose overlap is not a strict improvement over the baseline,
/// and refuses a deletion that would not be followed by a re-emission.
pub fn resolve_tail_update(
    history: &[String],
    candidate: &[String],
    max_revise: usize,
    min_anchor: usize,
) -> (usize, Vec<String>) {
    if candidate.is_empty() {
        return (0, Vec::new());
    }

    let base_overlap = tail_overlap_words(history, candidate, OVERLAP_LIMIT);
    let mut best_overlap = base_overlap;
    let mut best_delete = 0;

    let max_delete = max_revise.min(history.len());
    for delete_n in 1..=max_delete {
        let trimmed = &history[..history.len() - delete_n];
        let overlap = tail_overlap_words(trimmed, candidate, OVERLAP_LIMIT);
        if overlap <= best_overlap {
            continue;
        }
        if overlap < min_anchor.max(1) {
            continue;
        }
        best_overlap = overlap;
        best_delete = delete_n;
    }

    if best_overlap >= candidate.len() {
        return (0, Vec::new());
    }
    let new_words = candidate[best_overlap..].to_vec();
    if best_delete > 0 && new_words.is_empty() {
        return (0, Vec::new());
    }
    (best_delete, new_words)
}

pub struct DictationEngine<S> {
    cfg: EngineConfig,
    sink: S,
    history: VecDeque<String>,
    ledger: TypedLedger,
    pending: Vec<String>,
}

impl<S: TextSink> DictationEngine<S> {
    pub fn new(cfg: EngineConfig, sink: S) -> Self {
        Self {
            cfg,
            sink,
            history: VecDeque::new(),
            ledger: TypedLedger::new(),
            pending: Vec::new(),
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Feed one hypothesis from a voiced tick.
    ///
    /// The first hypothesis of a phrase only seeds the pending slot; later
    /// ones commit the stable prefix shared with their predecessor.
    pub async fn accept_hypothesis(&mut self, text: &str, guard_words: usize) {
        let new_words = words(text);
        if new_words.is_empty() {
            return;
        }

        if self.pending.is_empty() {
            self.pending = new_words;
            return;
        }

        let mut overlap = tail_overlap_words(&self.pending, &new_words, OVERLAP_LIMIT);
        if overlap == 0 {
            overlap = common_prefix_len(&self.pending, &new_words);
        }
        if overlap > 0 {
            let stable: Vec<String> = new_words[..overlap].to_vec();
            self.commit(&stable, guard_words).await;
        }
        self.pending = new_words;
    }

    /// Flush the pending hypothesis against a final padded decode.
    pub async fn flush(&mut self, fresh_decode: &str, guard_words: usize) {
        if self.pending.is_empty() {
            return;
        }
        let pending_text = self.pending.join(" ");
        let chosen = choose_flush_candidate(
            &pending_text,
            fresh_decode,
            self.cfg.flush_min_anchor_words,
        );
        let chosen_words = words(&chosen);
        if !chosen_words.is_empty() {
            self.commit(&chosen_words, guard_words).await;
        }
        self.pending.clear();
    }

    /// Drop all session state. The screen keeps whatever was typed.
    pub fn reset_session(&mut self) {
        self.pending.clear();
        self.history.clear();
        self.ledger = TypedLedger::new();
    }

    async fn commit(&mut self, stable_candidate: &[String], guard_words: usize) {
        let candidate: &[String] = if guard_words > 0 {
            if stable_candidate.len() > guard_words {
                &stable_candidate[..stable_candidate.len() - guard_words]
            } else {
                return;
            }
        } else {
            stable_candidate
        };
        if candidate.is_empty() {
            return;
        }

        let history: Vec<String> = self.history.iter().cloned().collect();
        let (delete_n, new_words) = resolve_tail_update(
            &history,
            candidate,
            self.cfg.max_revise_words,
            self.cfg.min_anchor_words,
        );

        if delete_n > 0 {
            let (take, bytes) = self.ledger.retract_plan(delete_n);
            let delivered = self.sink.backspace(bytes).await;
            if delivered < bytes {
                // The screen is now ahead of the plan; leave the ledger
                // untouched and give up on this tick.
                tracing::warn!(
                    "retraction aborted after {}/{} backspaces",
                    delivered,
                    bytes
                );
                return;
            }
            self.ledger.pop(take);
            for _ in 0..take {
                self.history.pop_back();
            }
            tracing::debug!("revise: removed_words={}", take);
        }

        if new_words.len() < self.cfg.min_emit_words.max(1) {
            return;
        }

        let emit_text = collapse_whitespace(&new_words.join(" "));
        if emit_text.is_empty()
            || is_hallucination(&emit_text)
            || count_word_like_tokens(&emit_text) == 0
        {
            return;
        }

        let styled = normalize_emit_text(
            &emit_text,
            self.cfg.punctuation,
            self.cfg.short_sentence_terminal_words,
        );
        if styled.is_empty() {
            return;
        }
        let out = if needs_leading_space(self.ledger.last_char(), &styled) {
            format!(" {styled}")
        } else {
            styled
        };

        match self.sink.type_text(&out).await {
            Ok(()) => {
                self.ledger.record(&out);
                // History records the words as typed, so it stays
                // word-for-word parallel with the ledger even when the
                // punctuation policy drops a standalone token.
                for word in words(&styled) {
                    self.history.push_back(word);
                }
                while self.history.len() > self.cfg.history_words.max(8) {
                    self.history.pop_front();
                    self.ledger.forget_front(1);
                }
            }
            Err(e) => {
                tracing::warn!("emission failed, state unchanged: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted sink simulating the focused window.
    #[derive(Default)]
    struct FakeScreen {
        content: String,
        typed_calls: Vec<String>,
        backspace_calls: Vec<usize>,
        fail_typing: bool,
        deliver_backspaces: Option<usize>,
    }

    impl TextSink for FakeScreen {
        async fn type_text(&mut self, text: &str) -> Result<(), InjectionError> {
            if self.fail_typing {
                return Err(InjectionError::NonZeroExit {
                    code: 1,
                    stderr: "no uinput".to_string(),
                });
            }
            self.content.push_str(text);
            self.typed_calls.push(text.to_string());
            Ok(())
        }

        async fn backspace(&mut self, bytes: usize) -> usize {
            let deliver = self.deliver_backspaces.unwrap_or(bytes).min(bytes);
            self.backspace_calls.push(bytes);
            let new_len = self.content.len().saturating_sub(deliver);
            self.content.truncate(new_len);
            deliver
        }
    }

    fn engine() -> DictationEngine<FakeScreen> {
        DictationEngine::new(EngineConfig::default(), FakeScreen::default())
    }

    fn w(text: &str) -> Vec<String> {
        words(text)
    }

    // Resolver-level checks.

    #[test]
    fn resolver_appends_on_plain_continuation() {
        // History tail already aligns with the candidate head.
        let (delete, new) = resolve_tail_update(
            &w("the quick brown fox"),
            &w("brown fox jumped over"),
            3,
            2,
        );
        assert_eq!(delete, 0);
        assert_eq!(new, w("jumped over"));
    }

    #[test]
    fn resolver_trims_tail_for_a_better_anchor() {
        // The last word was revised: "fox" -> "box" with continued speech.
        let (delete, new) = resolve_tail_update(
            &w("the quick brown fox"),
            &w("quick brown box jumped"),
            3,
            2,
        );
        assert_eq!(delete, 1);
        assert_eq!(new, w("box jumped"));
    }

    #[test]
    fn resolver_rejects_weak_anchors() {
        // Trimming would only re-anchor on a single word, below min_anchor.
        let (delete, new) = resolve_tail_update(&w("i saw the"), &w("eye saw the cat"), 3, 2);
        assert_eq!(delete, 0);
        assert_eq!(new, w("eye saw the cat"));
    }

    #[test]
    fn resolver_noops_when_candidate_is_fully_known() {
        let (delete, new) = resolve_tail_update(&w("hello world"), &w("hello world"), 3, 2);
        assert_eq!(delete, 0);
        assert!(new.is_empty());
    }

    #[test]
    fn resolver_never_deletes_without_reemitting() {
        let (delete, new) = resolve_tail_update(&w("a b c"), &w(""), 3, 2);
        assert_eq!((delete, new.len()), (0, 0));
    }

    #[test]
    fn resolver_overlap_is_monotone() {
        // Any accepted alignment has overlap >= the baseline alignment.
        let history = w("one two three four five");
        let candidate = w("three four five six");
        let base = tail_overlap_words(&history, &candidate, 64);
        let (delete, new) = resolve_tail_update(&history, &candidate, 3, 2);
        let accepted_overlap = candidate.len() - new.len();
        assert!(accepted_overlap >= base);
        assert_eq!(delete, 0);
        assert_eq!(new, w("six"));
    }

    // Engine-level scenarios.

    #[tokio::test]
    async fn stable_streaming_commit() {
        let mut engine = engine();
        engine.accept_hypothesis("hello world this", 0).await;
        assert!(engine.sink().content.is_empty(), "first hypothesis only seeds");

        engine.accept_hypothesis("hello world this is a", 0).await;
        assert_eq!(engine.sink().content, "hello world this");
        assert!(engine.sink().backspace_calls.is_empty());
        assert_eq!(engine.history_len(), engine.ledger_len());
    }

    #[tokio::test]
    async fn guard_holds_back_trailing_words() {
        let mut engine = engine();
        engine.accept_hypothesis("hello world this", 1).await;
        engine.accept_hypothesis("hello world this is a", 1).await;
        // Guard of one strips the last stable word.
        assert_eq!(engine.sink().content, "hello world");
    }

    #[tokio::test]
    async fn tail_revision_backspaces_exactly() {
        let mut engine = engine();
        // Commit "the quick brown fox" through two overlapping hypotheses.
        engine.accept_hypothesis("the quick brown fox", 0).await;
        engine.accept_hypothesis("the quick brown fox", 0).await;
        assert_eq!(engine.sink().content, "the quick brown fox");

        // Revision: last word becomes "box", speech continues.
        engine.accept_hypothesis("quick brown box jumped", 0).await;
        engine
            .accept_hypothesis("quick brown box jumped over", 0)
            .await;

        assert_eq!(engine.sink().content, "the quick brown box jumped");
        // " fox" is 4 bytes.
        assert_eq!(engine.sink().backspace_calls, vec![4]);
        assert_eq!(engine.history_len(), engine.ledger_len());
    }

    #[tokio::test]
    async fn conservative_mismatch_commits_nothing() {
        let mut engine = engine();
        engine.accept_hypothesis("i saw the", 0).await;
        engine.accept_hypothesis("eye saw the cat", 0).await;
        // No overlap between the hypotheses: nothing stable, pending moves on.
        assert!(engine.sink().content.is_empty());
        assert!(engine.has_pending());
    }

    #[tokio::test]
    async fn silence_flush_keeps_pending_over_unanchored_decode() {
        let mut engine = engine();
        engine.accept_hypothesis("open the door", 0).await;
        engine.flush("thanks for watching", 0).await;
        assert_eq!(engine.sink().content, "open the door");
        assert!(!engine.has_pending());
    }

    #[tokio::test]
    async fn flush_prefers_longer_near_identical_decode() {
        let mut engine = engine();
        engine.accept_hypothesis("open the door", 0).await;
        engine.flush("open the door now", 0).await;
        assert_eq!(engine.sink().content, "open the door now");
    }

    #[tokio::test]
    async fn hallucinated_candidate_neither_emits_nor_retracts() {
        let mut engine = engine();
        engine.accept_hypothesis("hello there", 0).await;
        engine.accept_hypothesis("hello there", 0).await;
        let before = engine.sink().content.clone();

        // The marker phrase has to become stable before it could commit.
        engine.accept_hypothesis("hello there blank audio", 0).await;
        engine.accept_hypothesis("hello there blank audio", 0).await;
        assert_eq!(engine.sink().content, before);
        assert!(engine.sink().backspace_calls.is_empty());
        assert_eq!(engine.history_len(), engine.ledger_len());
    }

    #[tokio::test]
    async fn failed_backspace_aborts_without_corrupting_ledger() {
        let mut engine = DictationEngine::new(
            EngineConfig::default(),
            FakeScreen {
                deliver_backspaces: Some(1), // every batch under-delivers
                ..FakeScreen::default()
            },
        );
        engine.accept_hypothesis("the quick brown fox", 0).await;
        engine.accept_hypothesis("the quick brown fox", 0).await;
        let history_before = engine.history_len();
        let ledger_before = engine.ledger_len();

        engine.accept_hypothesis("quick brown box jumped", 0).await;
        engine
            .accept_hypothesis("quick brown box jumped over", 0)
            .await;

        // The retraction failed, so neither history nor ledger moved and
        // nothing new was typed on that tick.
        assert_eq!(engine.history_len(), history_before);
        assert_eq!(engine.ledger_len(), ledger_before);
        assert_eq!(engine.sink().content, "the quick brown fo");
    }

    #[tokio::test]
    async fn failed_typing_leaves_state_unchanged() {
        let mut engine = DictationEngine::new(
            EngineConfig::default(),
            FakeScreen {
                fail_typing: true,
                ..FakeScreen::default()
            },
        );
        engine.accept_hypothesis("hello world", 0).await;
        engine.accept_hypothesis("hello world again", 0).await;
        assert_eq!(engine.history_len(), 0);
        assert_eq!(engine.ledger_len(), 0);
    }

    #[tokio::test]
    async fn history_and_ledger_forget_together() {
        let cfg = EngineConfig {
            history_words: 8, // floor value
            ..EngineConfig::default()
        };
        let mut engine = DictationEngine::new(cfg, FakeScreen::default());
        let mut previous = String::new();
        for i in 0..20 {
            let sentence = format!("{previous} w{i}");
            let sentence = sentence.trim().to_string();
            engine.accept_hypothesis(&sentence, 0).await;
            previous = sentence;
        }
        assert_eq!(engine.history_len(), engine.ledger_len());
        assert!(engine.history_len() <= 8);
    }

    #[tokio::test]
    async fn reset_session_clears_state_but_not_screen() {
        let mut engine = engine();
        engine.accept_hypothesis("hello world", 0).await;
        engine.accept_hypothesis("hello world again", 0).await;
        assert!(!engine.sink().content.is_empty());

        engine.reset_session();
        assert_eq!(engine.history_len(), 0);
        assert_eq!(engine.ledger_len(), 0);
        assert!(!engine.has_pending());
        assert_eq!(engine.sink().content, "hello world");
    }

    #[tokio::test]
    async fn second_emission_gets_a_separating_space() {
        let mut engine = engine();
        engine.accept_hypothesis("hello world", 0).await;
        engine.accept_hypothesis("hello world this is", 0).await;
        engine.accept_hypothesis("this is the end", 0).await;
        engine.accept_hypothesis("the end of it", 0).await;
        assert_eq!(engine.sink().content, "hello world this is the end");
        // Each later chunk was typed with its own leading space.
        assert!(engine.sink().typed_calls[1].starts_with(' '));
    }
}
