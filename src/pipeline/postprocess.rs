//! Post-processing of model output and hOCR word handling.
//!
//! Two unrelated cleanups share this module because both are pure
//! string-to-string passes with one regex each:
//!
//! * [`clean_ai_text`] normalises a free-text answer (fences, line endings,
//!   whitespace, invisible characters).
//! * [`hocr_words`] / [`replace_hocr_words`] read and rewrite the word spans
//!   of a Tesseract hOCR page, and [`parse_word_list`] / [`align_words`] turn
//!   a word-correction answer back into a list that lines up 1:1 with them.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! sees the raw answer; blank-line collapsing runs after per-line trimming so
//! whitespace-only lines count as blank.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Apply every free-text cleanup rule to a model answer.
///
/// 1. Strip outer code fences (```` ```html ````, ```` ```text ````, bare)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Trim leading/trailing blank lines
pub fn clean_ai_text(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── hOCR words ───────────────────────────────────────────────────────────────
//
// Tesseract writes one span per recognised word:
//   <span class='ocrx_word' id='word_1_3' title='bbox 36 92 96 116; x_wconf 96'>The</span>
// The inner text may be wrapped in <strong>/<em> and is HTML-escaped.

static RE_WORD_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)(<span[^>]*class=['"]ocrx_word['"][^>]*>)(.*?)(</span>)"#).unwrap()
});

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

fn unescape_html(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Words of an hOCR page, in document order.
pub fn hocr_words(hocr: &str) -> Vec<String> {
    RE_WORD_SPAN
        .captures_iter(hocr)
        .map(|caps| unescape_html(RE_TAG.replace_all(&caps[2], "").trim()))
        .collect()
}

/// Escape a word for use as hOCR element text. Inverse of the unescaping
/// done by [`hocr_words`].
pub fn escape_word(word: &str) -> String {
    word.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Replace the text of each word span with `words[i]`.
///
/// Spans beyond `words.len()` keep their original text; bounding boxes and
/// all other markup are untouched.
pub fn replace_hocr_words(hocr: &str, words: &[String]) -> String {
    let mut index = 0;
    RE_WORD_SPAN
        .replace_all(hocr, |caps: &Captures| {
            let replaced = match words.get(index) {
                Some(word) => format!("{}{}{}", &caps[1], escape_word(word), &caps[3]),
                None => caps[0].to_string(),
            };
            index += 1;
            replaced
        })
        .into_owned()
}

/// Turn a word-correction answer into a word list: fences and HTML tags
/// removed, one word per non-empty line.
pub fn parse_word_list(response: &str) -> Vec<String> {
    let text = strip_code_fences(response);
    let text = RE_TAG.replace_all(&text, "");
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Align corrected words with the originals: position `i` takes the
/// corrected word when there is one, otherwise the original. Extra corrected
/// words are dropped. Empty corrections fall back to the original too.
pub fn align_words(original: &[String], corrected: &[String]) -> Vec<String> {
    original
        .iter()
        .enumerate()
        .map(|(i, orig)| match corrected.get(i) {
            Some(c) if !c.trim().is_empty() => c.clone(),
            _ => orig.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOCR: &str = "<div class='ocr_page'>\
<span class='ocrx_word' id='word_1_1' title='bbox 1 2 3 4; x_wconf 90'>Helo</span> \
<span class='ocrx_word' id='word_1_2' title='bbox 5 6 7 8; x_wconf 40'><strong>wrld</strong></span> \
<span class='ocrx_word' id='word_1_3' title='bbox 9 9 9 9; x_wconf 95'>A&amp;B</span>\
</div>";

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_strip_fences_with_language() {
        assert_eq!(strip_code_fences("```html\n<p>Hi</p>\n```"), "<p>Hi</p>");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_code_fences("plain text"), "plain text");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn test_clean_ai_text_full() {
        let input = "```text\r\nHello  \r\n\r\n\r\n\r\n\r\nWorld\u{200B}\r\n```";
        assert_eq!(clean_ai_text(input), "Hello\n\n\nWorld");
    }

    #[test]
    fn test_hocr_words_strip_markup_and_entities() {
        assert_eq!(hocr_words(HOCR), words(&["Helo", "wrld", "A&B"]));
    }

    #[test]
    fn test_replace_hocr_words_keeps_bboxes() {
        let out = replace_hocr_words(HOCR, &words(&["Hello", "world"]));
        assert!(out.contains("title='bbox 1 2 3 4; x_wconf 90'>Hello</span>"));
        assert!(out.contains("title='bbox 5 6 7 8; x_wconf 40'>world</span>"));
        // third span had no replacement
        assert!(out.contains(">A&amp;B</span>"));
    }

    #[test]
    fn test_replace_escapes_markup_chars() {
        let out = replace_hocr_words(HOCR, &words(&["<b>x", "y&z", "ok>"]));
        assert!(out.contains(">&lt;b&gt;x</span>"));
        assert!(out.contains(">y&amp;z</span>"));
        assert_eq!(hocr_words(&out), words(&["<b>x", "y&z", "ok>"]));
    }

    #[test]
    fn test_unchanged_words_survive_rewrite() {
        let original = hocr_words(HOCR);
        let out = replace_hocr_words(HOCR, &original);
        assert!(out.contains("x_wconf 95'>A&amp;B</span>"));
        assert_eq!(hocr_words(&out), original);
    }

    #[test]
    fn test_parse_word_list_drops_tags_and_blanks() {
        let resp = "```\n<p>Hello</p>\n\n  world \n```";
        assert_eq!(parse_word_list(resp), words(&["Hello", "world"]));
    }

    #[test]
    fn test_align_pads_with_originals() {
        let orig = words(&["a", "b", "c"]);
        assert_eq!(align_words(&orig, &words(&["A"])), words(&["A", "b", "c"]));
    }

    #[test]
    fn test_align_drops_extras() {
        let orig = words(&["a", "b"]);
        assert_eq!(
            align_words(&orig, &words(&["A", "B", "C", "D"])),
            words(&["A", "B"])
        );
    }

    #[test]
    fn test_align_replaces_empty_correction() {
        let orig = words(&["a", "b"]);
        assert_eq!(align_words(&orig, &words(&["  ", "B"])), words(&["a", "B"]));
    }
}
