//! Plain-text loader for RFC-style documents.
//!
//! The text is split into blank-line separated blocks. A column-0 line such as
//! `3.1.  Header Format` starts a section whose depth is the number of components
//! in its number. Blocks containing diagram borders become figures (a following
//! one-line `Figure ...` block is the caption). Blocks indented deeper than the
//! document's base indent are list items and join the preceding list paragraph.

use crate::dom::{Document, Figure, Node, Paragraph, Section};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("document has no title")]
    MissingTitle,
}

enum Item {
    Heading { number: String, title: String },
    Block { indent: usize, lines: Vec<String> },
}

pub fn load_file(path: impl AsRef<Path>) -> Result<Document, LoadError> {
    let text = fs::read_to_string(path.as_ref())?;
    load_str(&text)
}

pub fn load_str(text: &str) -> Result<Document, LoadError> {
    let text = text.replace("\r\n", "\n").replace(['\r', '\u{c}'], "\n");
    let items = tokenize(&text);

    let title = items
        .iter()
        .take_while(|item| !matches!(item, Item::Heading { .. }))
        .find_map(|item| match item {
            Item::Block { lines, .. } => lines.first().map(|l| l.trim().to_string()),
            Item::Heading { .. } => None,
        })
        .ok_or(LoadError::MissingTitle)?;

    let base_indent = items
        .iter()
        .skip_while(|item| !matches!(item, Item::Heading { .. }))
        .filter_map(|item| match item {
            Item::Block { indent, lines } if !is_artwork(lines) => Some(*indent),
            _ => None,
        })
        .min()
        .unwrap_or(0);

    let mut document = Document::new(&title);
    let mut stack: Vec<(usize, Section)> = Vec::new();
    for item in items {
        match item {
            Item::Heading { number, title } => {
                let depth = number.split('.').count();
                while stack.last().is_some_and(|(d, _)| *d >= depth) {
                    pop_section(&mut stack, &mut document);
                }
                stack.push((depth, Section::new(&number, &title)));
            }
            Item::Block { indent, lines } => {
                // Text before the first heading is front matter.
                if let Some((_, section)) = stack.last_mut() {
                    add_block(&mut section.children, indent, &lines, base_indent);
                }
            }
        }
    }
    while !stack.is_empty() {
        pop_section(&mut stack, &mut document);
    }
    debug!(title = %document.title, sections = document.walk().len(), "loaded document");
    Ok(document)
}

fn pop_section(stack: &mut Vec<(usize, Section)>, document: &mut Document) {
    if let Some((_, section)) = stack.pop() {
        match stack.last_mut() {
            Some((_, parent)) => parent.children.push(Node::Section(section)),
            None => document.sections.push(section),
        }
    }
}

fn tokenize(text: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if is_page_furniture(line) {
            continue;
        }
        if line.is_empty() {
            flush(&mut block, &mut items);
        } else if let Some((number, title)) = heading(line) {
            flush(&mut block, &mut items);
            items.push(Item::Heading { number, title });
        } else {
            block.push(line);
        }
    }
    flush(&mut block, &mut items);
    items
}

fn flush(block: &mut Vec<&str>, items: &mut Vec<Item>) {
    if block.is_empty() {
        return;
    }
    let indent = block.iter().map(|l| indent_of(l)).min().unwrap_or(0);
    items.push(Item::Block {
        indent,
        lines: block.drain(..).map(str::to_string).collect(),
    });
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Page headers and footers of paginated RFC text.
fn is_page_furniture(line: &str) -> bool {
    let trimmed = line.trim();
    (trimmed.ends_with(']') && trimmed.contains("[Page "))
        || (line.starts_with("RFC ") && line[4..].starts_with(|c: char| c.is_ascii_digit()))
}

/// `N(.N)*[.] Title` at column 0. Table-of-contents lines with dot leaders are not headings.
fn heading(line: &str) -> Option<(String, String)> {
    if !line.starts_with(|c: char| c.is_ascii_digit()) || line.contains("....") {
        return None;
    }
    let split = line.find(char::is_whitespace)?;
    let (number, title) = line.split_at(split);
    let number = number.trim_end_matches('.');
    let well_formed = number
        .split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    let title = title.trim();
    if !well_formed || title.is_empty() {
        return None;
    }
    Some((number.to_string(), title.to_string()))
}

fn is_artwork(lines: &[String]) -> bool {
    lines.iter().any(|l| {
        let l = l.trim_start();
        l.starts_with("+-") || l.starts_with('|')
    })
}

fn add_block(children: &mut Vec<Node>, indent: usize, lines: &[String], base_indent: usize) {
    if is_artwork(lines) {
        children.push(Node::Figure(Figure::artwork(&lines.join("\n"))));
        return;
    }

    let text = lines.iter().map(|l| l.trim()).collect::<Vec<_>>().join("\n");
    if let Some(Node::Figure(figure)) = children.last_mut() {
        if figure.title.is_none() && lines.len() == 1 && text.starts_with("Figure") {
            figure.title = Some(text);
            return;
        }
    }

    if indent > base_indent {
        if let Some(Node::Paragraph(paragraph)) = children.last_mut() {
            if let Some(list) = paragraph.leading_list_mut() {
                list.items.push(Paragraph::text(&text));
                return;
            }
        }
        children.push(Node::Paragraph(Paragraph::list(&[text])));
    } else {
        children.push(Node::Paragraph(Paragraph::text(&text)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_need_a_numeric_label() {
        assert_eq!(heading("3.1.  Header Format"), Some(("3.1".into(), "Header Format".into())));
        assert_eq!(heading("4 Options"), Some(("4".into(), "Options".into())));
        assert_eq!(heading("3.1. Header ........ 12"), None);
        assert_eq!(heading("1a. Nope"), None);
        assert_eq!(heading("   3.1 Indented"), None);
    }

    #[test]
    fn sections_nest_by_depth() {
        let doc = load_str("Test Protocol\n\n1. One\n\n   Text.\n\n1.1. Sub\n\n2. Two\n").expect("load");
        assert_eq!(doc.title, "Test Protocol");
        let numbers: Vec<&str> = doc.walk().iter().map(|s| s.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "1.1", "2"]);
        assert_eq!(doc.sections.len(), 2);
    }

    #[test]
    fn indented_blocks_join_the_previous_list() {
        let text = "T\n\n1. S\n\n   Version: 4 bits\n\n      First.\n\n      Second.\n";
        let doc = load_str(text).expect("load");
        let children = &doc.sections[0].children;
        assert_eq!(children.len(), 2);
        match &children[1] {
            Node::Paragraph(p) => assert_eq!(p.leading_list().map(|l| l.items.len()), Some(2)),
            other => panic!("expected list paragraph, got {:?}", other),
        }
    }

    #[test]
    fn artwork_takes_a_caption() {
        let text = "T\n\n1. S\n\n   Intro.\n\n    +-+-+\n    |A|B|\n    +-+-+\n\n   Figure 1: Header\n";
        let doc = load_str(text).expect("load");
        match &doc.sections[0].children[1] {
            Node::Figure(f) => assert_eq!(f.title.as_deref(), Some("Figure 1: Header")),
            other => panic!("expected figure, got {:?}", other),
        }
    }

    #[test]
    fn empty_input_has_no_title() {
        assert!(matches!(load_str("\n\n"), Err(LoadError::MissingTitle)));
    }
}
