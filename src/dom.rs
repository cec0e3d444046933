//! Document model of an RFC-style specification.
//!
//! A document is a tree of numbered sections; each section holds paragraphs, figures,
//! and nested sections in reading order. Field descriptions appear as a title
//! paragraph followed by a paragraph whose content is a list (the indented body).

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub title: String,
    pub sections: Vec<Section>,
}

impl Document {
    pub fn new(title: &str) -> Self {
        Document {
            title: title.to_string(),
            sections: Vec::new(),
        }
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// All sections, depth-first, parents before children.
    pub fn walk(&self) -> Vec<&Section> {
        let mut out = Vec::new();
        let mut stack: Vec<&Section> = self.sections.iter().rev().collect();
        while let Some(section) = stack.pop() {
            out.push(section);
            stack.extend(section.subsections().collect::<Vec<_>>().into_iter().rev());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Section {
    /// Dotted section number, e.g. `3.1`.
    pub number: String,
    pub title: String,
    pub children: Vec<Node>,
}

impl Section {
    pub fn new(number: &str, title: &str) -> Self {
        Section {
            number: number.to_string(),
            title: title.to_string(),
            children: Vec::new(),
        }
    }

    pub fn with(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    /// Children other than nested sections.
    pub fn content(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(|n| !matches!(n, Node::Section(_)))
    }

    pub fn subsections(&self) -> impl Iterator<Item = &Section> {
        self.children.iter().filter_map(|n| match n {
            Node::Section(s) => Some(s),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Section(Section),
    Paragraph(Paragraph),
    Figure(Figure),
}

impl From<Section> for Node {
    fn from(s: Section) -> Self {
        Node::Section(s)
    }
}

impl From<Paragraph> for Node {
    fn from(p: Paragraph) -> Self {
        Node::Paragraph(p)
    }
}

impl From<Figure> for Node {
    fn from(f: Figure) -> Self {
        Node::Figure(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    List(List),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Paragraph {
    pub content: Vec<Inline>,
}

impl Paragraph {
    pub fn text(text: &str) -> Self {
        Paragraph {
            content: vec![Inline::Text(text.to_string())],
        }
    }

    /// A paragraph whose only child is a list of the given item texts.
    pub fn list<S: AsRef<str>>(items: &[S]) -> Self {
        Paragraph {
            content: vec![Inline::List(List {
                items: items.iter().map(|s| Paragraph::text(s.as_ref())).collect(),
            })],
        }
    }

    /// The list this paragraph starts with, if any.
    pub fn leading_list(&self) -> Option<&List> {
        match self.content.first() {
            Some(Inline::List(list)) => Some(list),
            _ => None,
        }
    }

    pub fn leading_list_mut(&mut self) -> Option<&mut List> {
        match self.content.first_mut() {
            Some(Inline::List(list)) => Some(list),
            _ => None,
        }
    }

    /// Plain text of the paragraph; list items are separated by newlines.
    pub fn plain_text(&self) -> String {
        let mut parts = Vec::new();
        for inline in &self.content {
            match inline {
                Inline::Text(t) => parts.push(t.clone()),
                Inline::List(list) => parts.push(list.plain_text()),
            }
        }
        parts.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct List {
    pub items: Vec<Paragraph>,
}

impl List {
    pub fn plain_text(&self) -> String {
        self.items
            .iter()
            .map(Paragraph::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Figure {
    pub title: Option<String>,
    pub artwork: Option<Artwork>,
}

impl Figure {
    pub fn artwork(text: &str) -> Self {
        Figure {
            title: None,
            artwork: Some(Artwork {
                text: text.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artwork {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_is_depth_first() {
        let doc = Document::new("T")
            .with_section(
                Section::new("1", "A")
                    .with(Paragraph::text("intro"))
                    .with(Section::new("1.1", "B").with(Section::new("1.1.1", "C"))),
            )
            .with_section(Section::new("2", "D"));
        let numbers: Vec<&str> = doc.walk().iter().map(|s| s.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "1.1", "1.1.1", "2"]);
    }

    #[test]
    fn list_paragraph_text() {
        let p = Paragraph::list(&["first", "second"]);
        assert!(p.leading_list().is_some());
        assert_eq!(p.plain_text(), "first\nsecond");
        assert!(Paragraph::text("x").leading_list().is_none());
    }
}
