//! Heading anchors and the table of contents.
//!
//! Anchors are derived from heading text alone so they are stable across
//! runs: lowercase, each whitespace character becomes `-`, anything that is
//! not alphanumeric or `-` is dropped. Repeats get a numeric suffix the way
//! GitHub does it, so `Heading 2` twice yields `heading-2`, `heading-2-1`.

use std::collections::HashMap;

/// Title line placed above the generated list.
pub const TOC_TITLE: &str = "**Table of Contents**";

/// One heading as it appears in the final document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingEntry {
    pub level: u8,
    /// Plain heading text, whitespace-collapsed.
    pub text: String,
    pub anchor: String,
}

/// Base anchor for a heading text, before de-duplication.
pub fn slugify(text: &str) -> String {
    let slug: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('-')
            } else if c.is_alphanumeric() || c == '-' {
                Some(c)
            } else {
                None
            }
        })
        .collect();
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

/// Hands out unique anchors in document order.
#[derive(Debug, Default)]
pub struct Slugger {
    seen: HashMap<String, usize>,
}

impl Slugger {
    pub fn slug(&mut self, text: &str) -> String {
        let base = slugify(text);
        let mut slug = base.clone();
        // A generated `x-1` may itself collide with a literal heading "x 1"
        while self.seen.contains_key(&slug) {
            let n = self.seen.entry(base.clone()).or_insert(0);
            *n += 1;
            slug = format!("{base}-{n}");
        }
        self.seen.insert(slug.clone(), 0);
        slug
    }
}

/// Nested link list for headings up to `depth`, or `None` if there are none.
pub fn render_toc(headings: &[HeadingEntry], depth: u8) -> Option<String> {
    let listed: Vec<&HeadingEntry> = headings.iter().filter(|h| h.level <= depth).collect();
    let min_level = listed.iter().map(|h| h.level).min()?;

    let mut out = String::from(TOC_TITLE);
    out.push_str("\n\n");
    let lines: Vec<String> = listed
        .iter()
        .map(|h| {
            let indent = "  ".repeat(usize::from(h.level - min_level));
            format!("{indent}- [{}](#{})", escape_link_text(&h.text), h.anchor)
        })
        .collect();
    out.push_str(&lines.join("\n"));
    Some(out)
}

fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '[' | ']' | '*' | '_' | '`' | '<') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(titles: &[(u8, &str)]) -> Vec<HeadingEntry> {
        let mut slugger = Slugger::default();
        titles
            .iter()
            .map(|(level, text)| HeadingEntry {
                level: *level,
                text: text.to_string(),
                anchor: slugger.slug(text),
            })
            .collect()
    }

    #[test]
    fn slug_rules() {
        assert_eq!(slugify("Heading 1"), "heading-1");
        assert_eq!(slugify("What's new?"), "whats-new");
        assert_eq!(slugify("Über Straße"), "über-straße");
        assert_eq!(slugify("a  b"), "a--b");
        assert_eq!(slugify("!!!"), "section");
    }

    #[test]
    fn duplicates_get_numeric_suffix() {
        let mut s = Slugger::default();
        assert_eq!(s.slug("Heading"), "heading");
        assert_eq!(s.slug("Heading"), "heading-1");
        assert_eq!(s.slug("Heading"), "heading-2");
    }

    #[test]
    fn suffix_skips_literal_collisions() {
        let mut s = Slugger::default();
        assert_eq!(s.slug("x 1"), "x-1");
        assert_eq!(s.slug("x"), "x");
        assert_eq!(s.slug("x"), "x-2");
    }

    #[test]
    fn toc_lists_headings_in_order() {
        let headings = entries(&[(1, "Heading 1"), (2, "Heading 2"), (2, "Heading 2")]);
        let toc = render_toc(&headings, 2).unwrap();
        assert_eq!(
            toc,
            "**Table of Contents**\n\n\
             - [Heading 1](#heading-1)\n  \
             - [Heading 2](#heading-2)\n  \
             - [Heading 2](#heading-2-1)"
        );
    }

    #[test]
    fn depth_limits_entries() {
        let headings = entries(&[(1, "A"), (2, "B"), (3, "C")]);
        let toc = render_toc(&headings, 1).unwrap();
        assert!(!toc.contains("#b"));
        assert!(render_toc(&entries(&[(3, "Deep")]), 2).is_none());
    }

    #[test]
    fn shallowest_listed_level_is_not_indented() {
        let headings = entries(&[(2, "B"), (3, "C")]);
        let toc = render_toc(&headings, 3).unwrap();
        assert!(toc.ends_with("- [B](#b)\n  - [C](#c)"), "{toc}");
    }
}
