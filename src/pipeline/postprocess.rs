//! Post-processing: deterministic whitespace cleanup of assembled Markdown.
//!
//! ## Why region-aware?
//!
//! Two kinds of content must come out byte-for-byte as they went in:
//! fenced code blocks (whitespace is content) and embedded HTML tables
//! (already laid out, and a stray blank line would end the HTML block).
//! Every rule below therefore works line by line and only touches lines
//! outside those regions:
//!
//! ```text
//! prose line      → rules apply
//! ``` … ```       → verbatim
//! <table … </table> → verbatim (nesting counted)
//! ```
//!
//! ## Rule Order
//!
//! Line endings are normalised first so region detection sees `\n` only;
//! the final-newline pass runs last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to assembled Markdown.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 1
/// 5. Ensure the text ends with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Regions ──────────────────────────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(`{3,}|~{3,})").unwrap());

/// Each line of `input` paired with whether it is verbatim.
fn regions(input: &str) -> Vec<(&str, bool)> {
    let mut out = Vec::new();
    // (fence char, fence length) of the open code block
    let mut fence: Option<(char, usize)> = None;
    let mut table_depth = 0usize;

    for line in input.split('\n') {
        if let Some((ch, len)) = fence {
            out.push((line, true));
            if closes_fence(line, ch, len) {
                fence = None;
            }
            continue;
        }
        if table_depth > 0 || line.trim_start().starts_with("<table") {
            out.push((line, true));
            table_depth = (table_depth + line.matches("<table").count())
                .saturating_sub(line.matches("</table>").count());
            continue;
        }
        if let Some(caps) = RE_FENCE.captures(line) {
            let marker = &caps[1];
            let ch = marker.chars().next().unwrap_or('`');
            fence = Some((ch, marker.len()));
        }
        out.push((line, fence.is_some()));
    }
    out
}

fn closes_fence(line: &str, ch: char, len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= len && trimmed.chars().all(|c| c == ch)
}

/// Rebuild `input`, passing prose lines through `f`.
fn map_prose(input: &str, f: impl Fn(&str) -> String) -> String {
    regions(input)
        .into_iter()
        .map(|(line, verbatim)| if verbatim { line.to_string() } else { f(line) })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    map_prose(input, |line| {
        line.replace(
            ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
            "",
        )
    })
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    map_prose(input, |line| line.trim_end().to_string())
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

fn collapse_blank_lines(input: &str) -> String {
    let lines = regions(input);
    let mut result: Vec<&str> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let (line, verbatim) = lines[i];
        if verbatim || !line.trim().is_empty() {
            result.push(line);
            i += 1;
            continue;
        }
        let run = lines[i..]
            .iter()
            .take_while(|(l, v)| !v && l.trim().is_empty())
            .count();
        let keep = if run >= 3 { 1 } else { run };
        result.extend(std::iter::repeat("").take(keep));
        i += run;
    }
    result.join("\n")
}

// ── Rule 5: Ensure file ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
