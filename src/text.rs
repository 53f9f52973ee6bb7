//! Grapheme width and plain-text wrapping helpers.
//!
//! Transcript rows are measured by wrapping their text to the viewport width, so
//! these helpers decide row heights. They are pure (string in, lines out).

use emojis::get as emoji_get;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

const TAB_WIDTH: usize = 3;

pub fn grapheme_width(grapheme: &str) -> usize {
    if grapheme.is_empty() {
        return 0;
    }
    if grapheme == "\t" {
        return TAB_WIDTH;
    }

    if emoji_get(grapheme).is_some() {
        return 2;
    }

    grapheme
        .chars()
        .map(|ch| {
            if ch == '\t' {
                TAB_WIDTH
            } else {
                UnicodeWidthChar::width(ch).unwrap_or(0)
            }
        })
        .sum()
}

pub fn visible_width(input: &str) -> usize {
    input.graphemes(true).map(grapheme_width).sum()
}

/// Wraps `text` into lines no wider than `width` columns.
///
/// Embedded newlines always start a new line, words move to the next line when
/// they do not fit, and words wider than a full line are split at grapheme
/// boundaries. Whitespace at a wrap point is dropped. Always returns at least
/// one line.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        wrap_paragraph(paragraph.trim_end_matches('\r'), width, &mut lines);
    }

    lines
}

fn wrap_paragraph(paragraph: &str, width: usize, out: &mut Vec<String>) {
    if paragraph.is_empty() {
        out.push(String::new());
        return;
    }

    let mut line = String::new();
    let mut line_width = 0usize;

    for segment in paragraph.split_word_bounds() {
        let segment_width = visible_width(segment);
        if line_width + segment_width <= width {
            line.push_str(segment);
            line_width += segment_width;
            continue;
        }

        if segment.chars().all(char::is_whitespace) {
            flush_line(&mut line, &mut line_width, out);
            continue;
        }

        if line_width > 0 {
            flush_line(&mut line, &mut line_width, out);
        }

        if segment_width <= width {
            line.push_str(segment);
            line_width = segment_width;
            continue;
        }

        for grapheme in segment.graphemes(true) {
            let grapheme_cols = grapheme_width(grapheme);
            if line_width > 0 && line_width + grapheme_cols > width {
                flush_line(&mut line, &mut line_width, out);
            }
            line.push_str(grapheme);
            line_width += grapheme_cols;
        }
    }

    if !line.is_empty() {
        flush_line(&mut line, &mut line_width, out);
    }
}

fn flush_line(line: &mut String, line_width: &mut usize, out: &mut Vec<String>) {
    out.push(line.trim_end().to_string());
    line.clear();
    *line_width = 0;
}

/// Truncates `text` to at most `max_width` columns, appending `ellipsis` when
/// anything was cut.
pub fn truncate_to_width(text: &str, max_width: usize, ellipsis: &str) -> String {
    if visible_width(text) <= max_width {
        return text.to_string();
    }

    let ellipsis_width = visible_width(ellipsis);
    let budget = max_width.saturating_sub(ellipsis_width);
    let mut out = String::new();
    let mut used = 0usize;
    for grapheme in text.graphemes(true) {
        let cols = grapheme_width(grapheme);
        if used + cols > budget {
            break;
        }
        out.push_str(grapheme);
        used += cols;
    }

    if ellipsis_width <= max_width {
        out.push_str(ellipsis);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{truncate_to_width, visible_width, wrap_text};

    #[test]
    fn rgi_emoji_width_is_two() {
        assert_eq!(visible_width("👍"), 2);
        assert_eq!(visible_width("ok👍"), 4);
    }

    #[test]
    fn tabs_count_as_three_columns() {
        assert_eq!(visible_width("\tx"), 4);
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(wrap_text("hello world", 5), vec!["hello", "world"]);
        assert_eq!(
            wrap_text("the quick brown fox", 10),
            vec!["the quick", "brown fox"]
        );
    }

    #[test]
    fn long_words_are_split_by_grapheme() {
        assert_eq!(wrap_text("abcdefgh", 3), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn wide_characters_respect_column_budget() {
        assert_eq!(wrap_text("日本語", 4), vec!["日本", "語"]);
    }

    #[test]
    fn newlines_and_blank_paragraphs_are_preserved() {
        assert_eq!(wrap_text("a\n\nb", 10), vec!["a", "", "b"]);
        assert_eq!(wrap_text("", 10), vec![""]);
    }

    #[test]
    fn zero_width_is_treated_as_one_column() {
        assert_eq!(wrap_text("ab", 0), vec!["a", "b"]);
    }

    #[test]
    fn truncation_appends_ellipsis_only_when_cut() {
        assert_eq!(truncate_to_width("short", 10, "…"), "short");
        assert_eq!(truncate_to_width("abcdefgh", 5, "…"), "abcd…");
    }
}
