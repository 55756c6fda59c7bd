//! Markdown stripping for project write-ups.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCED_CODE: Regex = Regex::new(r"(?s)```.*?```").expect("valid regex");
    static ref INLINE_CODE: Regex = Regex::new(r"`([^`\n]*)`").expect("valid regex");
    static ref HEADING: Regex = Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").expect("valid regex");
    static ref BLOCKQUOTE: Regex = Regex::new(r"(?m)^[ \t]*>[ \t]?").expect("valid regex");
    static ref BULLET: Regex = Regex::new(r"(?m)^[ \t]*[-*+][ \t]+").expect("valid regex");
    static ref NUMBERED: Regex = Regex::new(r"(?m)^[ \t]*\d+\.[ \t]+").expect("valid regex");
    static ref IMAGE: Regex = Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid regex");
    static ref LINK: Regex = Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex");
    static ref BOLD_STAR: Regex = Regex::new(r"\*\*(.+?)\*\*").expect("valid regex");
    static ref BOLD_UNDERSCORE: Regex = Regex::new(r"__(.+?)__").expect("valid regex");
    static ref ITALIC_STAR: Regex = Regex::new(r"\*([^*\n]+?)\*").expect("valid regex");
    static ref ITALIC_UNDERSCORE: Regex = Regex::new(r"\b_([^_\n]+?)_\b").expect("valid regex");
    static ref BLANK_LINES: Regex = Regex::new(r"\n[ \t]*(?:\n[ \t]*)+\n").expect("valid regex");
}

/// Strip markdown structure from `body`, keeping readable text.
///
/// Passes are repeated until the output stops changing. Every pass only removes
/// characters, so the loop terminates and the result is a fixed point:
/// `normalize_markdown(normalize_markdown(x)) == normalize_markdown(x)`.
pub fn normalize_markdown(body: &str) -> String {
    let mut current = body.replace("\r\n", "\n");
    loop {
        let next = strip_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let s = FENCED_CODE.replace_all(text, "");
    let s = INLINE_CODE.replace_all(&s, "$1");
    let s = HEADING.replace_all(&s, "");
    let s = BLOCKQUOTE.replace_all(&s, "");
    let s = BULLET.replace_all(&s, "");
    let s = NUMBERED.replace_all(&s, "");
    let s = IMAGE.replace_all(&s, "$1");
    let s = LINK.replace_all(&s, "$1");
    let s = BOLD_STAR.replace_all(&s, "$1");
    let s = BOLD_UNDERSCORE.replace_all(&s, "$1");
    let s = ITALIC_STAR.replace_all(&s, "$1");
    let s = ITALIC_UNDERSCORE.replace_all(&s, "$1");
    let s = BLANK_LINES.replace_all(&s, "\n\n");
    s.trim().to_string()
}
