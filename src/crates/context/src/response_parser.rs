//! Response Parser: extracts `<operations>...</operations>` blocks from an
//! LLM's free text, for both the completed-response path and the streaming
//! engine's incremental detection.

use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

fn block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new(r"<operations>(.*?)</operations>")
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .expect("static regex is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub text_response: String,
    pub operations: Option<String>,
}

/// Scan the entire completed response. Every `<operations>` block's inner
/// text is concatenated into one synthetic block — multiple blocks per
/// turn are merged, not just the first taken. The returned
/// `text_response` has every block span removed, is trimmed, and has runs
/// of three or more newlines collapsed to two.
pub fn parse_response(full_text: &str) -> ParsedResponse {
    let re = block_re();
    let mut inner_blocks = Vec::new();
    for caps in re.captures_iter(full_text) {
        inner_blocks.push(caps[1].to_string());
    }

    let stripped = re.replace_all(full_text, "");
    let text_response = collapse_newlines(stripped.trim());

    let operations = if inner_blocks.is_empty() {
        None
    } else {
        Some(inner_blocks.join("\n"))
    };

    ParsedResponse { text_response, operations }
}

fn collapse_newlines(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex is valid"));
    re.replace_all(text, "\n\n").to_string()
}

/// Every complete `<operations>...</operations>` block that has closed so
/// far in a partial (still-streaming) buffer, in order, as raw inner text.
/// Used by the streaming engine to emit `content` chunks as soon as a block
/// closes, without waiting for the whole response.
pub fn extract_all_complete_blocks(partial_text: &str) -> Vec<String> {
    block_re().captures_iter(partial_text).map(|c| c[1].to_string()).collect()
}

/// One complete `<operations>` block found in a partial buffer, carrying
/// both its full text (tags included, the span the LLM Engine emits as a
/// `content` chunk) and its inner text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpan {
    pub full: String,
    pub inner: String,
    /// Byte offset one past the end of this span (the closing `</operations>`
    /// tag) within the text it was extracted from, for callers that need to
    /// know how much of the buffer this span already accounts for.
    pub end: usize,
}

/// Like [`extract_all_complete_blocks`], but keeps the opening/closing tags
/// in each span's `full` text rather than just the inner contents.
pub fn extract_all_complete_block_spans(partial_text: &str) -> Vec<BlockSpan> {
    block_re()
        .captures_iter(partial_text)
        .map(|c| {
            let m = c.get(0).expect("whole-match group always present");
            BlockSpan {
                full: m.as_str().to_string(),
                inner: c[1].to_string(),
                end: m.end(),
            }
        })
        .collect()
}

/// Whether the end of `partial_text` currently sits inside an open
/// `<operations>` tag: counts case-insensitive opens vs. closes; an excess
/// of opens means we are inside one.
pub fn is_inside_operations_block(partial_text: &str) -> bool {
    let opens = count_tag(partial_text, "<operations>");
    let closes = count_tag(partial_text, "</operations>");
    opens > closes
}

fn count_tag(text: &str, tag: &str) -> usize {
    let lower_text = text.to_lowercase();
    let lower_tag = tag.to_lowercase();
    if lower_tag.is_empty() {
        return 0;
    }
    lower_text.matches(&lower_tag).count()
}
