//! Sentence-boundary trimming for completed (non-streaming) text.

/// Characters that end a sentence: ASCII and full-width CJK punctuation.
const SENTENCE_TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Trim `input` to the end of its last complete sentence.
///
/// Returns everything up to and including the last terminator, with trailing
/// whitespace removed. When `include_newline` is set, `'\n'` also counts as a
/// terminator (and is then removed as trailing whitespace). Without any
/// terminator the input is returned with trailing whitespace stripped.
///
/// Total. Idempotent when `include_newline` is false; with newlines as
/// terminators a second pass may cut further, since the matched `'\n'` is
/// itself stripped as trailing whitespace.
pub fn trim_to_end_sentence(input: &str, include_newline: bool) -> String {
    let last = input
        .char_indices()
        .rev()
        .find(|&(_, c)| SENTENCE_TERMINATORS.contains(&c) || (include_newline && c == '\n'));

    match last {
        Some((idx, c)) => input[..idx + c.len_utf8()].trim_end().to_owned(),
        None => input.trim_end().to_owned(),
    }
}

/// The trimming applied to non-streaming results when auto-trim is on.
pub fn auto_trim(text: &str) -> String {
    trim_to_end_sentence(text, false)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cuts_after_last_terminator() {
        assert_eq!(trim_to_end_sentence("Hello. World", false), "Hello.");
    }

    #[test]
    fn no_terminator_only_strips_trailing_whitespace() {
        assert_eq!(
            trim_to_end_sentence("No terminator here  ", false),
            "No terminator here"
        );
    }

    #[test]
    fn last_terminator_wins() {
        assert_eq!(trim_to_end_sentence("A? B! C", false), "A? B!");
        assert_eq!(trim_to_end_sentence("A? B! C.", false), "A? B! C.");
    }

    #[test]
    fn newline_counts_only_when_requested() {
        assert_eq!(trim_to_end_sentence("Line one\nLine two", true), "Line one");
        assert_eq!(
            trim_to_end_sentence("Line one\nLine two", false),
            "Line one\nLine two"
        );
    }

    #[test]
    fn full_width_terminators() {
        assert_eq!(trim_to_end_sentence("你好。世界", false), "你好。");
        assert_eq!(trim_to_end_sentence("本当！まだ", false), "本当！");
        assert_eq!(trim_to_end_sentence("何？ ", false), "何？");
    }

    #[test]
    fn empty_and_whitespace_inputs() {
        assert_eq!(trim_to_end_sentence("", false), "");
        assert_eq!(trim_to_end_sentence("   \n\t", false), "");
        assert_eq!(trim_to_end_sentence("\n\n", true), "");
    }

    #[test]
    fn idempotent() {
        let samples = [
            "Hello. World",
            "A? B! C",
            "No terminator here  ",
            "Line one\nLine two\n",
            "trailing dot.   ",
            "混合。text! more?  tail",
            "",
            "...",
            "a\n.\n b",
        ];
        for s in samples {
            let once = trim_to_end_sentence(s, false);
            let twice = trim_to_end_sentence(&once, false);
            assert_eq!(once, twice, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn auto_trim_ignores_newlines() {
        assert_eq!(
            auto_trim("One sentence. Incomplete cut off"),
            "One sentence."
        );
        assert_eq!(auto_trim("para one\npara two"), "para one\npara two");
    }
}
