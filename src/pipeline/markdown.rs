//! Markdown assembler: processed tree → final Markdown text.
//!
//! ## Dispatch
//!
//! Every element is routed through one table, `HANDLERS`, keyed by tag:
//!
//! | handler     | meaning                                                  |
//! |-------------|----------------------------------------------------------|
//! | `Block`     | produces whole blocks (paragraph, heading, list, code)   |
//! | `Inline`    | produces text inside the current paragraph               |
//! | `Container` | transparent; its children are rendered in its place      |
//! | `Skip`      | dropped with its subtree                                 |
//!
//! Unknown tags are containers, so new HTML from a newer converter degrades
//! to its text instead of disappearing.
//!
//! ## Blocks and paragraphs
//!
//! Consecutive inline nodes form one paragraph; any block node (including a
//! display-math fragment) ends it. That is what keeps display math on its
//! own line even when pandoc puts it inside a `<p>`.
//!
//! List nesting is tracked with an explicit depth counter, and every block
//! of an item is indented by its marker width, so continuation paragraphs
//! stay inside their item.

use super::dom::{element_to_html, has_block_content, Display, Element, Node};
use super::lists;
use super::postprocess::clean_markdown;
use super::toc::{render_toc, HeadingEntry, Slugger};
use crate::config::{ConversionOptions, MathEngine};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Bullet markers by nesting depth.
const BULLETS: [&str; 3] = ["-", "*", "+"];

/// Separates two adjacent lists that Markdown would otherwise merge.
const LIST_SEPARATOR: &str = "<!-- -->";

/// Options the assembler needs, resolved from the conversion options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembleOptions {
    pub include_toc: bool,
    pub toc_depth: u8,
    /// Emit blockquote content as ordinary blocks.
    pub flatten_blockquotes: bool,
    /// Escape `$` in text so it cannot open a math span.
    pub escape_dollars: bool,
}

impl AssembleOptions {
    pub fn new(options: &ConversionOptions, flatten_blockquotes: bool) -> Self {
        Self {
            include_toc: options.include_toc,
            toc_depth: options.toc_depth,
            flatten_blockquotes,
            escape_dollars: options.math_engine == MathEngine::Latex,
        }
    }
}

/// Assembled document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub markdown: String,
    /// Every heading in document order, TOC-listed or not.
    pub headings: Vec<HeadingEntry>,
}

/// Transliterate `nodes`, prepend the TOC if requested and clean up.
pub fn assemble(nodes: &[Node], options: &AssembleOptions) -> Assembled {
    let mut writer = Writer {
        options: *options,
        headings: Vec::new(),
        slugger: Slugger::default(),
        list_depth: 0,
    };
    let mut body = writer.blocks(nodes).join("\n\n");

    if options.include_toc {
        if let Some(toc) = render_toc(&writer.headings, options.toc_depth) {
            body = if body.is_empty() {
                toc
            } else {
                format!("{toc}\n\n{body}")
            };
        }
    }

    Assembled {
        markdown: clean_markdown(&body),
        headings: writer.headings,
    }
}

// ── Dispatch table ───────────────────────────────────────────────────────

type BlockFn = fn(&mut Writer, &Element) -> Vec<String>;
type InlineFn = fn(&mut Writer, &Element, Around) -> String;

#[derive(Clone, Copy)]
enum Handler {
    Block(BlockFn),
    Inline(InlineFn),
    Container,
    Skip,
}

static HANDLERS: Lazy<HashMap<&'static str, Handler>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, Handler> = HashMap::new();
    for tag in ["h1", "h2", "h3", "h4", "h5", "h6"] {
        m.insert(tag, Handler::Block(Writer::heading));
    }
    m.insert("p", Handler::Block(Writer::paragraph_element));
    m.insert("figcaption", Handler::Block(Writer::paragraph_element));
    m.insert("dd", Handler::Block(Writer::paragraph_element));
    m.insert("li", Handler::Block(Writer::paragraph_element));
    m.insert("dt", Handler::Block(Writer::term));
    m.insert("ul", Handler::Block(Writer::list));
    m.insert("ol", Handler::Block(Writer::list));
    m.insert("blockquote", Handler::Block(Writer::blockquote));
    m.insert("pre", Handler::Block(Writer::code_block));
    m.insert("hr", Handler::Block(Writer::rule));
    m.insert("table", Handler::Block(Writer::raw_block));

    for tag in ["strong", "b"] {
        m.insert(tag, Handler::Inline(Writer::strong));
    }
    for tag in ["em", "i"] {
        m.insert(tag, Handler::Inline(Writer::emphasis));
    }
    for tag in ["del", "s", "strike"] {
        m.insert(tag, Handler::Inline(Writer::strikethrough));
    }
    for tag in ["u", "ins"] {
        m.insert(tag, Handler::Inline(Writer::underline));
    }
    m.insert("sup", Handler::Inline(Writer::superscript));
    m.insert("sub", Handler::Inline(Writer::subscript));
    for tag in ["code", "kbd", "samp", "tt"] {
        m.insert(tag, Handler::Inline(Writer::code));
    }
    m.insert("a", Handler::Inline(Writer::link));
    m.insert("img", Handler::Inline(Writer::image));
    m.insert("br", Handler::Inline(Writer::line_break));
    m.insert("math", Handler::Inline(Writer::raw_inline));
    m.insert("svg", Handler::Inline(Writer::raw_inline));

    for tag in [
        "head", "title", "style", "script", "meta", "link", "template", "noscript",
    ] {
        m.insert(tag, Handler::Skip);
    }
    m
});

fn handler_for(el: &Element) -> Handler {
    // A TOC pandoc generated itself would duplicate ours
    if el.is("nav") && el.attr("id") == Some("TOC") {
        return Handler::Skip;
    }
    HANDLERS
        .get(el.tag.as_str())
        .copied()
        .unwrap_or(Handler::Container)
}

/// Characters just outside an inline element.
#[derive(Debug, Clone, Copy, Default)]
struct Around {
    before: Option<char>,
    after: Option<char>,
}

impl Around {
    fn intraword(self) -> bool {
        self.before.is_some_and(char::is_alphanumeric)
            || self.after.is_some_and(char::is_alphanumeric)
    }
}

// ── Writer ───────────────────────────────────────────────────────────────

struct Writer {
    options: AssembleOptions,
    headings: Vec<HeadingEntry>,
    slugger: Slugger,
    list_depth: usize,
}

impl Writer {
    fn is_inline(node: &Node) -> bool {
        match node {
            Node::Text(_) | Node::Comment(_) => true,
            Node::Rendered(r) => r.display == Display::Inline,
            Node::Element(el) => match handler_for(el) {
                Handler::Block(_) => false,
                Handler::Skip => true,
                Handler::Inline(_) | Handler::Container => !has_block_content(node),
            },
        }
    }

    /// Render a sequence of sibling nodes as blocks.
    fn blocks(&mut self, nodes: &[Node]) -> Vec<String> {
        let mut out = Vec::new();
        let mut run: Vec<&Node> = Vec::new();
        // out.len() right after the last list was pushed
        let mut list_end: Option<usize> = None;

        for node in nodes {
            if Self::is_inline(node) {
                run.push(node);
                continue;
            }
            self.flush_paragraph(&mut run, &mut out);
            match node {
                Node::Rendered(r) => {
                    let text = r.text.trim_matches('\n');
                    if !text.is_empty() {
                        out.push(text.to_string());
                    }
                }
                Node::Element(el) => match handler_for(el) {
                    Handler::Block(f) => {
                        let is_list = el.is("ul") || el.is("ol");
                        if is_list && list_end == Some(out.len()) {
                            out.push(LIST_SEPARATOR.to_string());
                        }
                        out.extend(f(self, el));
                        if is_list {
                            list_end = Some(out.len());
                        }
                    }
                    // Inline or transparent element wrapping blocks
                    _ => out.extend(self.blocks(&el.children)),
                },
                Node::Text(_) | Node::Comment(_) => {}
            }
        }
        self.flush_paragraph(&mut run, &mut out);
        out
    }

    fn flush_paragraph(&mut self, run: &mut Vec<&Node>, out: &mut Vec<String>) {
        if run.is_empty() {
            return;
        }
        let text = self.inlines(run);
        run.clear();
        let text = finish_paragraph(&text);
        if !text.is_empty() {
            out.push(text);
        }
    }

    /// Render nodes as one run of inline Markdown.
    fn inlines(&mut self, nodes: &[&Node]) -> String {
        let mut out = String::new();
        for (i, node) in nodes.iter().enumerate() {
            let piece = match node {
                Node::Text(t) => self.text(t),
                Node::Comment(_) => continue,
                Node::Rendered(r) => r.text.clone(),
                Node::Element(el) => {
                    let around = Around {
                        before: out.chars().last(),
                        after: next_char(&nodes[i + 1..]),
                    };
                    match handler_for(el) {
                        Handler::Inline(f) => f(self, el, around),
                        Handler::Skip => continue,
                        Handler::Block(_) | Handler::Container => self.children_inline(el),
                    }
                }
            };
            push_collapsed(&mut out, &piece);
        }
        out
    }

    fn children_inline(&mut self, el: &Element) -> String {
        let refs: Vec<&Node> = el.children.iter().collect();
        self.inlines(&refs)
    }

    fn text(&self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut in_space = false;
        for c in raw.chars() {
            if c.is_ascii_whitespace() {
                if !in_space {
                    out.push(' ');
                }
                in_space = true;
                continue;
            }
            in_space = false;
            match c {
                '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '~' => {
                    out.push('\\');
                    out.push(c);
                }
                '$' if self.options.escape_dollars => out.push_str("\\$"),
                _ => out.push(c),
            }
        }
        out
    }

    // ── Block handlers ──

    fn paragraph_element(&mut self, el: &Element) -> Vec<String> {
        self.blocks(&el.children)
    }

    fn heading(&mut self, el: &Element) -> Vec<String> {
        let level = el.tag[1..].parse::<u8>().unwrap_or(1).clamp(1, 6);
        let rendered = self.children_inline(el);
        let text = single_line(trim_breaks(&rendered));
        if text.is_empty() {
            return Vec::new();
        }
        let plain = collapse_whitespace(&el.text_content());
        let anchor = self.slugger.slug(&plain);
        self.headings.push(HeadingEntry {
            level,
            text: plain,
            anchor,
        });
        vec![format!("{} {}", "#".repeat(usize::from(level)), text)]
    }

    fn term(&mut self, el: &Element) -> Vec<String> {
        let rendered = self.children_inline(el);
        let text = single_line(trim_breaks(&rendered));
        if text.is_empty() {
            Vec::new()
        } else {
            vec![format!("**{text}**")]
        }
    }

    fn list(&mut self, el: &Element) -> Vec<String> {
        let items: Vec<&Element> = el.child_elements().filter(|c| c.is("li")).collect();
        if items.is_empty() {
            return Vec::new();
        }
        let ordered = el.is("ol");
        let start = el
            .attr("start")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(1);
        let loose = items.iter().any(|li| lists::block_count(li) > 1);
        let separator = if loose { "\n\n" } else { "\n" };
        let bullet = BULLETS[self.list_depth % BULLETS.len()];

        self.list_depth += 1;
        let rendered: Vec<String> = items
            .iter()
            .enumerate()
            .map(|(i, li)| {
                let marker = if ordered {
                    format!("{}.", start + i)
                } else {
                    bullet.to_string()
                };
                let body = self.blocks(&li.children).join(separator);
                indent_item(&marker, &body)
            })
            .collect();
        self.list_depth -= 1;

        vec![rendered.join(separator)]
    }

    fn blockquote(&mut self, el: &Element) -> Vec<String> {
        let blocks = self.blocks(&el.children);
        if self.options.flatten_blockquotes || blocks.is_empty() {
            return blocks;
        }
        let quoted = blocks
            .join("\n\n")
            .lines()
            .map(|line| {
                if line.is_empty() {
                    ">".to_string()
                } else {
                    format!("> {line}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        vec![quoted]
    }

    fn code_block(&mut self, el: &Element) -> Vec<String> {
        let content = el.text_content();
        let content = content.strip_suffix('\n').unwrap_or(&content);
        let fence = "`".repeat(longest_run(content, '`').max(2) + 1);
        vec![format!("{fence}{}\n{content}\n{fence}", code_language(el))]
    }

    fn rule(&mut self, _el: &Element) -> Vec<String> {
        vec!["---".to_string()]
    }

    /// Serialise as HTML; used for tables the processor did not see.
    fn raw_block(&mut self, el: &Element) -> Vec<String> {
        let html = element_to_html(el);
        let lines: Vec<&str> = html.lines().filter(|l| !l.trim().is_empty()).collect();
        vec![lines.join("\n")]
    }

    // ── Inline handlers ──

    /// Wrap rendered children in markers, keeping outer whitespace outside.
    fn wrap(&mut self, el: &Element, open: &str, close: &str) -> String {
        let inner = self.children_inline(el);
        let core = trim_breaks(&inner);
        if core.is_empty() {
            return if inner.is_empty() { String::new() } else { " ".to_string() };
        }
        let lead = if inner.starts_with(char::is_whitespace) { " " } else { "" };
        let trail = if inner.ends_with(char::is_whitespace) { " " } else { "" };
        format!("{lead}{open}{core}{close}{trail}")
    }

    fn strong(&mut self, el: &Element, _around: Around) -> String {
        self.wrap(el, "**", "**")
    }

    fn emphasis(&mut self, el: &Element, around: Around) -> String {
        // `_` does not open or close inside a word
        let marker = if around.intraword() { "*" } else { "_" };
        self.wrap(el, marker, marker)
    }

    fn strikethrough(&mut self, el: &Element, _around: Around) -> String {
        self.wrap(el, "~~", "~~")
    }

    fn underline(&mut self, el: &Element, _around: Around) -> String {
        self.wrap(el, "<u>", "</u>")
    }

    fn superscript(&mut self, el: &Element, _around: Around) -> String {
        self.wrap(el, "<sup>", "</sup>")
    }

    fn subscript(&mut self, el: &Element, _around: Around) -> String {
        self.wrap(el, "<sub>", "</sub>")
    }

    fn code(&mut self, el: &Element, _around: Around) -> String {
        let content = collapse_whitespace(&el.text_content());
        if content.is_empty() {
            return String::new();
        }
        let fence = "`".repeat(longest_run(&content, '`') + 1);
        let pad = if content.starts_with('`') || content.ends_with('`') {
            " "
        } else {
            ""
        };
        format!("{fence}{pad}{content}{pad}{fence}")
    }

    fn link(&mut self, el: &Element, _around: Around) -> String {
        let inner = self.children_inline(el);
        let href = el.attr("href").unwrap_or_default().trim();
        // In-document anchors point at converter ids that no longer exist
        if href.is_empty() || href.starts_with('#') {
            return inner;
        }
        let text = trim_breaks(&inner);
        if text.is_empty() {
            return if is_autolink(href) {
                format!("<{href}>")
            } else {
                String::new()
            };
        }
        let lead = if inner.starts_with(' ') { " " } else { "" };
        let trail = if inner.ends_with(' ') { " " } else { "" };
        format!(
            "{lead}[{text}]({}{}){trail}",
            destination(href),
            title_suffix(el)
        )
    }

    fn image(&mut self, el: &Element, _around: Around) -> String {
        let src = el.attr("src").unwrap_or_default().trim();
        if src.is_empty() {
            return String::new();
        }
        let alt = escape_brackets(&collapse_whitespace(el.attr("alt").unwrap_or_default()));
        format!("![{alt}]({}{})", destination(src), title_suffix(el))
    }

    fn line_break(&mut self, _el: &Element, _around: Around) -> String {
        "\\\n".to_string()
    }

    fn raw_inline(&mut self, el: &Element, _around: Around) -> String {
        element_to_html(el)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Append `piece`, never doubling a collapsed space.
fn push_collapsed(out: &mut String, piece: &str) {
    if piece.starts_with(' ') && (out.ends_with(' ') || out.ends_with('\n')) {
        out.push_str(&piece[1..]);
    } else {
        out.push_str(piece);
    }
}

/// First character of the text that follows.
fn next_char(rest: &[&Node]) -> Option<char> {
    rest.iter()
        .filter(|n| !matches!(n, Node::Comment(_)))
        .find_map(|n| n.text_content().chars().next())
}

/// Trim whitespace and hard breaks from both ends.
///
/// Text escaping doubles every literal backslash, so an odd run of
/// trailing backslashes can only end in a hard break.
fn trim_breaks(s: &str) -> &str {
    let mut s = s.trim();
    loop {
        let trailing = s.len() - s.trim_end_matches('\\').len();
        if trailing % 2 == 1 {
            s = s[..s.len() - 1].trim_end();
        } else {
            break;
        }
    }
    while let Some(rest) = s.strip_prefix("\\\n") {
        s = rest.trim_start();
    }
    s
}

fn single_line(s: &str) -> String {
    s.split("\\\n")
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

static RE_ORDERED_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,9})([.)])(\s|$)").unwrap());

/// Trim the paragraph and escape anything that would start a different
/// block at the beginning of a line.
fn finish_paragraph(text: &str) -> String {
    trim_breaks(text)
        .split('\n')
        .map(|line| escape_line_start(line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_line_start(line: &str) -> String {
    let Some(first) = line.chars().next() else {
        return String::new();
    };
    match first {
        '#' | '>' => format!("\\{line}"),
        '-' | '+' | '=' => {
            let rest = &line[1..];
            let marker_like = rest.is_empty() || rest.starts_with(' ');
            let rule_like = line.chars().all(|c| c == first || c == ' ');
            if marker_like || rule_like {
                format!("\\{line}")
            } else {
                line.to_string()
            }
        }
        '0'..='9' => RE_ORDERED_MARKER
            .replace(line, "$1\\$2$3")
            .into_owned(),
        _ => line.to_string(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn longest_run(s: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in s.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Put `marker` before the first line and indent the rest to match.
fn indent_item(marker: &str, body: &str) -> String {
    if body.is_empty() {
        return marker.to_string();
    }
    let pad = " ".repeat(marker.len() + 1);
    let mut out = String::with_capacity(body.len() + marker.len() + 1);
    for (i, line) in body.lines().enumerate() {
        if i == 0 {
            out.push_str(marker);
            out.push(' ');
            out.push_str(line);
            continue;
        }
        out.push('\n');
        if !line.is_empty() {
            out.push_str(&pad);
            out.push_str(line);
        }
    }
    out
}

fn code_language(el: &Element) -> String {
    let classes = el
        .attr("class")
        .into_iter()
        .chain(el.child_elements().filter(|c| c.is("code")).filter_map(|c| c.attr("class")));
    classes
        .flat_map(str::split_ascii_whitespace)
        .map(|c| c.strip_prefix("language-").unwrap_or(c))
        .find(|c| *c != "sourceCode" && !c.starts_with("number"))
        .map(|c| {
            c.chars()
                .filter(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '+' | '_' | '#'))
                .collect()
        })
        .unwrap_or_default()
}

fn is_autolink(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("mailto:")
}

fn destination(url: &str) -> String {
    if url.contains([' ', '(', ')', '<', '>']) {
        format!("<{}>", url.replace('<', "%3C").replace('>', "%3E"))
    } else {
        url.to_string()
    }
}

fn title_suffix(el: &Element) -> String {
    match el.attr("title").map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!(" \"{}\"", title.replace('"', "\\\"")),
        None => String::new(),
    }
}

fn escape_brackets(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dom::{parse_html, Rendered};

    fn opts() -> AssembleOptions {
        AssembleOptions {
            include_toc: false,
            toc_depth: 3,
            flatten_blockquotes: true,
            escape_dollars: false,
        }
    }

    fn md(html: &str) -> String {
        assemble(&parse_html(html).into_body(), &opts()).markdown
    }

    #[test]
    fn headings_and_paragraphs() {
        assert_eq!(
            md("<h1>Title</h1><p>Some <strong>bold</strong> text.</p>"),
            "# Title\n\nSome **bold** text.\n"
        );
    }

    #[test]
    fn nested_emphasis_never_crosses() {
        assert_eq!(
            md("<p><strong><em>both</em></strong> and <em><strong>both</strong></em></p>"),
            "**_both_** and _**both**_\n"
        );
        assert_eq!(
            md("<p><del><u>gone</u></del></p>"),
            "~~<u>gone</u>~~\n"
        );
    }

    #[test]
    fn whitespace_moves_outside_markers() {
        assert_eq!(md("<p>a<strong> b </strong>c</p>"), "a **b** c\n");
    }

    #[test]
    fn intraword_emphasis_uses_asterisk() {
        assert_eq!(md("<p>un<em>believ</em>able</p>"), "un*believ*able\n");
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(md("<p>a*b_c [d] `e`</p>"), "a\\*b\\_c \\[d\\] \\`e\\`\n");
        assert_eq!(md("<p># not a heading</p>"), "\\# not a heading\n");
        assert_eq!(md("<p>1. not a list</p>"), "1\\. not a list\n");
        assert_eq!(md("<p>- not a bullet</p>"), "\\- not a bullet\n");
    }

    #[test]
    fn dollars_escaped_only_for_latex() {
        assert_eq!(md("<p>$5</p>"), "$5\n");
        let mut o = opts();
        o.escape_dollars = true;
        let out = assemble(&parse_html("<p>$5</p>").into_body(), &o).markdown;
        assert_eq!(out, "\\$5\n");
    }

    #[test]
    fn nested_lists_track_depth() {
        let html = "<ul><li>one<ul><li>two<ol><li>three</li></ol></li></ul></li><li>four</li></ul>";
        assert_eq!(
            md(html),
            "- one\n  * two\n    1. three\n- four\n"
        );
    }

    #[test]
    fn continuation_paragraphs_stay_in_item() {
        let html = "<ol><li><p>first</p><p>more</p></li><li><p>second</p></li></ol>";
        assert_eq!(md(html), "1. first\n\n   more\n\n2. second\n");
    }

    #[test]
    fn ordered_list_start_is_kept() {
        assert_eq!(md(r#"<ol start="3"><li>c</li><li>d</li></ol>"#), "3. c\n4. d\n");
    }

    #[test]
    fn adjacent_lists_are_separated() {
        assert_eq!(
            md("<ul><li>a</li></ul><ul><li>b</li></ul>"),
            "- a\n\n<!-- -->\n\n- b\n"
        );
    }

    #[test]
    fn block_rendered_splits_paragraph() {
        let nodes = vec![Node::Element(Element::with_children(
            "p",
            vec![
                Node::Text("before ".into()),
                Rendered::block("$$\nx\n$$"),
                Node::Text(" after".into()),
            ],
        ))];
        let out = assemble(&nodes, &opts()).markdown;
        assert_eq!(out, "before\n\n$$\nx\n$$\n\nafter\n");
    }

    #[test]
    fn inline_rendered_is_verbatim() {
        let nodes = vec![Node::Element(Element::with_children(
            "p",
            vec![
                Node::Text("see ".into()),
                Rendered::inline("<math><mi>x</mi></math>"),
            ],
        ))];
        assert_eq!(assemble(&nodes, &opts()).markdown, "see <math><mi>x</mi></math>\n");
    }

    #[test]
    fn code_blocks_and_spans() {
        assert_eq!(
            md(r#"<pre class="sourceCode python"><code class="sourceCode python">x = 1

y = 2
</code></pre>"#),
            "```python\nx = 1\n\ny = 2\n```\n"
        );
        assert_eq!(md("<p><code>a`b</code></p>"), "``a`b``\n");
    }

    #[test]
    fn links_and_images() {
        assert_eq!(
            md(r#"<p><a href="https://x.org/a b">site</a> <a href="&#35;sec">here</a></p>"#),
            "[site](<https://x.org/a b>) here\n"
        );
        assert_eq!(
            md(r#"<p><img src="./images/image1.png" alt="A [chart]"></p>"#),
            "![A \\[chart\\]](./images/image1.png)\n"
        );
    }

    #[test]
    fn hard_breaks() {
        assert_eq!(md("<p>a<br>b<br></p>"), "a\\\nb\n");
    }

    #[test]
    fn blockquotes_flatten_or_quote() {
        assert_eq!(md("<blockquote><p>q</p></blockquote>"), "q\n");
        let mut o = opts();
        o.flatten_blockquotes = false;
        let out = assemble(&parse_html("<blockquote><p>a</p><p>b</p></blockquote>").into_body(), &o);
        assert_eq!(out.markdown, "> a\n>\n> b\n");
    }

    #[test]
    fn toc_is_prepended() {
        let mut o = opts();
        o.include_toc = true;
        o.toc_depth = 2;
        let html = "<h1>Heading 1</h1><h2>Heading 2</h2><h2>Heading 2</h2><h3>Deep</h3>";
        let out = assemble(&parse_html(html).into_body(), &o);
        assert_eq!(out.headings.len(), 4);
        assert!(out.markdown.starts_with(
            "**Table of Contents**\n\n- [Heading 1](#heading-1)\n  - [Heading 2](#heading-2)\n  - [Heading 2](#heading-2-1)\n\n# Heading 1"
        ), "{}", out.markdown);
        assert!(!out.markdown.contains("(#deep)"));
    }

    #[test]
    fn head_and_pandoc_toc_are_skipped() {
        let html = r#"<html><head><title>T</title></head><body><nav id="TOC"><ul><li>x</li></ul></nav><p>body</p></body></html>"#;
        assert_eq!(
            assemble(&parse_html(html).nodes, &opts()).markdown,
            "body\n"
        );
    }

    #[test]
    fn empty_document_is_single_newline() {
        assert_eq!(md(""), "\n");
    }
}
