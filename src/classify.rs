//! Partition of a section's non-section children into five zones:
//!
//! 0. introductory text paragraphs
//! 1. the figure holding the packet diagram
//! 2. transition text up to the title preceding the first list-bearing paragraph
//! 3. `(title, list body)` paragraph pairs, one per described field
//! 4. trailing material
//!
//! Any other shape is not a structure section; callers treat the failure as a probe.

use crate::dom::{Node, Paragraph};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a structure section: {reason}")]
pub struct Unclassified {
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    ListText,
    Figure,
    Other,
}

fn kind(node: &Node) -> Kind {
    match node {
        Node::Paragraph(p) if p.leading_list().is_some() => Kind::ListText,
        Node::Paragraph(_) => Kind::Text,
        Node::Figure(_) => Kind::Figure,
        Node::Section(_) => Kind::Other,
    }
}

/// Zone sizes, in child counts. Zone 3 always holds an even count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zones {
    pub intro: usize,
    pub figures: usize,
    pub transition: usize,
    pub descriptions: usize,
    pub trailer: usize,
}

impl Zones {
    pub fn counts(&self) -> (usize, usize, usize, usize, usize) {
        (self.intro, self.figures, self.transition, self.descriptions, self.trailer)
    }

    pub fn intro_range(&self) -> Range<usize> {
        0..self.intro
    }

    pub fn figure_range(&self) -> Range<usize> {
        let start = self.intro;
        start..start + self.figures
    }

    pub fn transition_range(&self) -> Range<usize> {
        let start = self.figure_range().end;
        start..start + self.transition
    }

    pub fn description_range(&self) -> Range<usize> {
        let start = self.transition_range().end;
        start..start + self.descriptions
    }

    pub fn trailer_range(&self) -> Range<usize> {
        let start = self.description_range().end;
        start..start + self.trailer
    }
}

/// Classify the non-section children of a section.
pub fn classify(children: &[&Node]) -> Result<Zones, Unclassified> {
    let kinds: Vec<Kind> = children.iter().map(|n| kind(n)).collect();
    let n = kinds.len();
    let mut i = 0;

    while i < n && kinds[i] == Kind::Text {
        i += 1;
    }
    let intro = i;
    if i == n || kinds[i] != Kind::Figure {
        return Err(Unclassified {
            reason: "no figure after the introductory text",
        });
    }

    while i < n && kinds[i] == Kind::Figure {
        i += 1;
    }
    let figures = i - intro;
    if figures > 1 {
        return Err(Unclassified {
            reason: "more than one figure",
        });
    }

    let start = i;
    while i < n {
        match kinds[i] {
            Kind::Text if i + 1 < n && kinds[i + 1] == Kind::ListText => break,
            Kind::Text => i += 1,
            Kind::ListText => break,
            Kind::Figure | Kind::Other => {
                return Err(Unclassified {
                    reason: "unexpected node between the figure and the field descriptions",
                })
            }
        }
    }
    let transition = i - start;

    let start = i;
    while i + 1 < n && kinds[i] == Kind::Text && kinds[i + 1] == Kind::ListText {
        i += 2;
    }
    let descriptions = i - start;

    Ok(Zones {
        intro,
        figures,
        transition,
        descriptions,
        trailer: n - i,
    })
}

/// Title/body pairs of zone 3.
pub fn description_pairs<'a>(children: &[&'a Node], zones: &Zones) -> Vec<(&'a Paragraph, &'a Paragraph)> {
    let mut out = Vec::new();
    let range = zones.description_range();
    for i in range.step_by(2) {
        if let (Some(Node::Paragraph(title)), Some(Node::Paragraph(body))) =
            (children.get(i).copied(), children.get(i + 1).copied())
        {
            out.push((title, body));
        }
    }
    out
}

/// Text paragraphs within `range`.
pub fn paragraphs<'a>(children: &[&'a Node], range: Range<usize>) -> Vec<&'a Paragraph> {
    children[range]
        .iter()
        .copied()
        .filter_map(|n| match n {
            Node::Paragraph(p) => Some(p),
            _ => None,
        })
        .collect()
}
