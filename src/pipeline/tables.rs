//! Tables are kept as embedded HTML.
//!
//! ## Why not pipe tables?
//!
//! A pipe table cannot express `rowspan`/`colspan`, block content in cells,
//! or a caption. Word tables use all three. We therefore keep every table as
//! HTML, with its cell contents already processed (math rendered, image
//! paths rewritten), and only strip presentation-only hints.
//!
//! The serialised block contains no blank line: CommonMark ends an HTML
//! block at the first blank line, which would spill the rest of the table
//! into Markdown.

use super::dom::{to_html, Element, Node, Rendered};

/// Structural elements laid out one per line.
const STRUCTURAL: &[&str] = &["table", "thead", "tbody", "tfoot", "tr"];

/// Upper bound on `rowspan`/`colspan`, as in the HTML standard.
const MAX_SPAN: usize = 1000;

/// Shape of a table's cell grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub rows: usize,
    pub columns: usize,
    /// Problems found while laying out the grid. Empty for a sound table.
    pub problems: Vec<String>,
}

/// Result of handling one table.
#[derive(Debug)]
pub struct TableOutcome {
    pub nodes: Vec<Node>,
    /// Why the table was flagged, if it was.
    pub warning: Option<String>,
}

/// Strip presentation, check the grid and serialise.
///
/// A table without rows cannot be embedded meaningfully; its text (if any)
/// survives as a paragraph instead.
pub fn render(mut table: Element) -> TableOutcome {
    strip_presentation(&mut table);
    let grid = analyze(&table);

    if grid.rows == 0 {
        let text = table.text_content().split_whitespace().collect::<Vec<_>>().join(" ");
        let nodes = if text.is_empty() {
            Vec::new()
        } else {
            vec![Node::Element(Element::with_children("p", vec![Node::Text(text)]))]
        };
        return TableOutcome {
            nodes,
            warning: Some("table has no rows; kept its text only".to_string()),
        };
    }

    layout(&mut table, false);
    let html = to_html(&[Node::Element(table)]);
    TableOutcome {
        nodes: vec![Rendered::block(html)],
        warning: (!grid.problems.is_empty()).then(|| grid.problems.join("; ")),
    }
}

// ── Presentation ─────────────────────────────────────────────────────────

/// Remove `<colgroup>`/`<col>`, `width` attributes and `width` declarations.
pub fn strip_presentation(el: &mut Element) {
    el.children
        .retain(|n| !matches!(n, Node::Element(c) if c.is("colgroup") || c.is("col")));
    el.remove_attr("width");
    if let Some(style) = el.remove_attr("style") {
        let kept: Vec<&str> = style
            .split(';')
            .map(str::trim)
            .filter(|decl| !decl.is_empty())
            .filter(|decl| {
                let name = decl.split(':').next().unwrap_or_default().trim();
                !name.eq_ignore_ascii_case("width") && !name.eq_ignore_ascii_case("min-width")
            })
            .collect();
        if !kept.is_empty() {
            el.set_attr("style", kept.join("; "));
        }
    }
    for child in &mut el.children {
        if let Node::Element(inner) = child {
            strip_presentation(inner);
        }
    }
}

// ── Grid analysis ────────────────────────────────────────────────────────

/// Rows of the table itself (not of nested tables), in document order.
fn rows(table: &Element) -> Vec<&Element> {
    let mut rows = Vec::new();
    for child in table.child_elements() {
        match child.tag.as_str() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(child.child_elements().filter(|r| r.is("tr"))),
            _ => {}
        }
    }
    rows
}

fn span(cell: &Element, name: &str) -> usize {
    cell.attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|n| n.clamp(1, MAX_SPAN))
        .unwrap_or(1)
}

/// Lay cells out on a grid, honouring row and column spans.
pub fn analyze(table: &Element) -> Grid {
    let rows = rows(table);
    // remaining[c] = rows (including the current one) column c is still covered for
    let mut remaining: Vec<usize> = Vec::new();
    let mut widths = Vec::with_capacity(rows.len());

    for row in &rows {
        let mut col = 0;
        for cell in row.child_elements().filter(|c| c.is("td") || c.is("th")) {
            while remaining.get(col).is_some_and(|&n| n > 0) {
                col += 1;
            }
            let (rowspan, colspan) = (span(cell, "rowspan"), span(cell, "colspan"));
            if remaining.len() < col + colspan {
                remaining.resize(col + colspan, 0);
            }
            for slot in &mut remaining[col..col + colspan] {
                *slot = rowspan;
            }
            col += colspan;
        }
        widths.push(remaining.iter().rposition(|&n| n > 0).map_or(0, |p| p + 1));
        for slot in &mut remaining {
            *slot = slot.saturating_sub(1);
        }
    }

    let columns = widths.iter().copied().max().unwrap_or(0);
    let mut problems = Vec::new();
    if let Some(row) = widths.iter().position(|&w| w != columns) {
        problems.push(format!(
            "row {} spans {} of {} columns",
            row + 1,
            widths[row],
            columns
        ));
    }
    if remaining.iter().any(|&n| n > 0) {
        problems.push("rowspan extends past the last row".to_string());
    }

    Grid {
        rows: rows.len(),
        columns,
        problems,
    }
}

// ── Layout ───────────────────────────────────────────────────────────────

/// One structural element per line; no newlines inside cells.
fn layout(el: &mut Element, in_pre: bool) {
    if STRUCTURAL.contains(&el.tag.as_str()) {
        let children = std::mem::take(&mut el.children);
        for child in children.into_iter().filter(|n| !n.is_blank_text()) {
            el.children.push(Node::Text("\n".to_string()));
            match child {
                Node::Element(mut inner) => {
                    layout(&mut inner, in_pre);
                    el.children.push(Node::Element(inner));
                }
                other => el.children.push(other),
            }
        }
        el.children.push(Node::Text("\n".to_string()));
        return;
    }

    let in_pre = in_pre || el.is("pre");
    for child in &mut el.children {
        match child {
            Node::Text(t) if !in_pre => {
                if t.contains('\n') {
                    *t = t.replace(['\n', '\r'], " ");
                }
            }
            Node::Element(inner) => layout(inner, in_pre),
            _ => {}
        }
    }
}
