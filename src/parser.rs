//! Grammar rules for diagrams, field titles, control-bit lists, and directive
//! sentences, parsed with PEST and built into the field model.
//!
//! [`parse`] is the hard entry point: failure carries the rule and position.
//! [`probe`] is the fallible variant used where a non-match only means "this
//! text is something else" (a figure that is not a packet diagram, a body
//! sentence that is plain prose).

use crate::expr::Expression;
use crate::fields::{merge_value, DiagramField, FieldWidth, RelLoc, TextField};
use crate::names;
use pest::error::LineColLocation;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser as PestParser;
use thiserror::Error;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct DescriptionParser;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{rule:?} parse failed at {line}:{column}: {message}")]
pub struct ParseFailure {
    pub rule: Rule,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseFailure {
    fn at(rule: Rule, pair: &Pair<Rule>, message: impl Into<String>) -> Self {
        let (line, column) = pair.as_span().start_pos().line_col();
        ParseFailure {
            rule,
            line,
            column,
            message: message.into(),
        }
    }

    fn start(rule: Rule, message: impl Into<String>) -> Self {
        ParseFailure {
            rule,
            line: 1,
            column: 1,
            message: message.into(),
        }
    }
}

/// Parse `text` with `rule`.
pub fn parse(text: &str, rule: Rule) -> Result<Pairs<'_, Rule>, ParseFailure> {
    DescriptionParser::parse(rule, text).map_err(|e| {
        let (line, column) = match e.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };
        ParseFailure {
            rule,
            line,
            column,
            message: e.variant.message().into_owned(),
        }
    })
}

/// Parse `text` with `rule`, treating failure as "no match".
pub fn probe(text: &str, rule: Rule) -> Option<Pairs<'_, Rule>> {
    match parse(text, rule) {
        Ok(pairs) => Some(pairs),
        Err(failure) => {
            tracing::trace!(%failure, "probe did not match");
            None
        }
    }
}

fn root<'i>(text: &'i str, rule: Rule) -> Result<Pair<'i, Rule>, ParseFailure> {
    parse(text, rule)?
        .next()
        .ok_or_else(|| ParseFailure::start(rule, "empty parse"))
}

fn parse_number(pair: &Pair<Rule>) -> Result<i64, ParseFailure> {
    let s = pair.as_str();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => s.parse::<i64>(),
    };
    parsed.map_err(|e| ParseFailure::at(Rule::number, pair, e.to_string()))
}

fn parse_unsigned(pair: &Pair<Rule>) -> Result<u64, ParseFailure> {
    let n = parse_number(pair)?;
    u64::try_from(n).map_err(|e| ParseFailure::at(Rule::number, pair, e.to_string()))
}

fn first_inner<'i>(pair: Pair<'i, Rule>, rule: Rule) -> Result<Pair<'i, Rule>, ParseFailure> {
    let at = pair.clone();
    pair.into_inner()
        .find(|p| p.as_rule() == rule)
        .ok_or_else(|| ParseFailure::at(at.as_rule(), &at, format!("missing {:?}", rule)))
}

fn section_id(section_ref: Pair<Rule>) -> Result<String, ParseFailure> {
    Ok(first_inner(section_ref, Rule::section_id)?.as_str().to_string())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split prose into sentences on `.` followed by a space or the end of text.
/// The terminating period is dropped.
pub fn sentences(text: &str) -> Vec<String> {
    let collapsed = collapse_whitespace(text);
    let chars: Vec<char> = collapsed.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();
    for (i, c) in chars.iter().enumerate() {
        if *c == '.' && chars.get(i + 1).map_or(true, |next| *next == ' ') {
            let sentence = current.trim();
            if !sentence.is_empty() {
                out.push(sentence.to_string());
            }
            current.clear();
        } else {
            current.push(*c);
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

// ---------------------------------------------------------------- diagram

/// Remove blank lines, trailing whitespace, and the common indentation.
fn normalize_artwork(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let indent = lines
        .iter()
        .map(|l| l.len() - l.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| &l[indent..])
        .collect::<Vec<_>>()
        .join("\n")
}

struct PendingField {
    label: String,
    bits: u64,
    variable: bool,
    line: usize,
}

#[derive(Default)]
struct Layout {
    fields: Vec<DiagramField>,
    open: Option<PendingField>,
}

impl Layout {
    fn close(&mut self) -> Result<(), ParseFailure> {
        if let Some(pending) = self.open.take() {
            if pending.label.is_empty() {
                return Err(ParseFailure {
                    rule: Rule::diagram,
                    line: pending.line,
                    column: 1,
                    message: "field without a label".to_string(),
                });
            }
            let width = if pending.variable {
                FieldWidth::Variable
            } else {
                FieldWidth::Bits(pending.bits)
            };
            self.fields.push(labelled_field(&pending.label, width)?);
        }
        Ok(())
    }

    fn row(&mut self, line: Pair<Rule>) -> Result<(), ParseFailure> {
        let line_no = line.as_span().start_pos().line_col().0;
        let mut delims: Vec<&str> = Vec::new();
        let mut cells: Vec<&str> = Vec::new();
        for p in line.into_inner() {
            match p.as_rule() {
                Rule::row_delim => delims.push(p.as_str()),
                Rule::cell => cells.push(p.as_str()),
                _ => {}
            }
        }

        let mut row: Vec<PendingField> = Vec::with_capacity(cells.len());
        for (i, cell) in cells.iter().enumerate() {
            let variable = delims.get(i) == Some(&":") || delims.get(i + 1) == Some(&":");
            row.push(PendingField {
                label: cell.trim().to_string(),
                bits: (cell.chars().count() as u64 + 1) / 2,
                variable,
                line: line_no,
            });
        }

        if row.len() == 1 {
            let cell = row.remove(0);
            match self.open.as_mut() {
                Some(open) if open.label.is_empty() || cell.label.is_empty() => {
                    open.bits += cell.bits;
                    open.variable |= cell.variable;
                    if open.label.is_empty() {
                        open.label = cell.label;
                    }
                }
                _ => {
                    self.close()?;
                    self.open = Some(cell);
                }
            }
            return Ok(());
        }

        self.close()?;
        let mut merged: Vec<PendingField> = Vec::new();
        for cell in row {
            match merged.last_mut() {
                Some(prev) if cell.label.is_empty() => {
                    prev.bits += cell.bits;
                    prev.variable |= cell.variable;
                }
                _ => merged.push(cell),
            }
        }
        for cell in merged {
            self.open = Some(cell);
            self.close()?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<DiagramField>, ParseFailure> {
        self.close()?;
        if self.fields.is_empty() {
            return Err(ParseFailure::start(Rule::diagram, "diagram has no fields"));
        }
        Ok(self.fields)
    }
}

fn labelled_field(label: &str, width: FieldWidth) -> Result<DiagramField, ParseFailure> {
    let parsed = root(label, Rule::diagram_label)?;
    let mut field = DiagramField::new("", width);
    for pair in parsed.into_inner() {
        match pair.as_rule() {
            Rule::label_text => field.name = pair.as_str().to_string(),
            Rule::abbreviation => field.abbreviation = Some(pair.as_str().trim().to_string()),
            Rule::label_value => field.value = Some(parse_number(&first_inner(pair, Rule::number)?)?),
            Rule::array_suffix => field.array = Some(true),
            _ => {}
        }
    }
    Ok(field)
}

/// Parse an ASCII packet diagram into its fields, in diagram order.
pub fn parse_diagram(text: &str) -> Result<Vec<DiagramField>, ParseFailure> {
    let normalized = normalize_artwork(text);
    let diagram = root(&normalized, Rule::diagram)?;
    let mut layout = Layout::default();
    for line in diagram.into_inner() {
        match line.as_rule() {
            Rule::border_line => layout.close()?,
            Rule::row_line => layout.row(line)?,
            _ => {}
        }
    }
    layout.finish()
}

// ---------------------------------------------------------------- titles

/// A parsed field title. `control` marks a control-bits title whose body lists
/// one-bit fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTitle {
    pub field: TextField,
    pub control: bool,
}

fn names_of(pair: Pair<Rule>) -> (String, Option<String>) {
    let mut long_name = String::new();
    let mut abbreviation = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::long_name => long_name = inner.as_str().to_string(),
            Rule::abbreviation => abbreviation = Some(inner.as_str().trim().to_string()),
            _ => {}
        }
    }
    (long_name, abbreviation)
}

fn width_of(pair: Pair<Rule>) -> Result<FieldWidth, ParseFailure> {
    let at = pair.clone();
    let spec = pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseFailure::at(Rule::width_spec, &at, "empty width"))?;
    match spec.as_rule() {
        Rule::variable_width => Ok(FieldWidth::Variable),
        Rule::fixed_width => {
            let mut count = 0;
            let mut scale = 1;
            for inner in spec.into_inner() {
                match inner.as_rule() {
                    Rule::number => count = parse_unsigned(&inner)?,
                    Rule::bytes_unit => scale = 8,
                    _ => {}
                }
            }
            count
                .checked_mul(scale)
                .map(FieldWidth::Bits)
                .ok_or_else(|| ParseFailure::at(Rule::fixed_width, &at, "width overflows"))
        }
        _ => Err(ParseFailure::at(Rule::width_spec, &at, "unknown width")),
    }
}

/// Parse a field title such as `Source Port (SP): 16 bits`.
pub fn parse_field_title(text: &str) -> Result<FieldTitle, ParseFailure> {
    let normalized = collapse_whitespace(text);
    let title = root(&normalized, Rule::field_title)?;
    let mut field = TextField::default();
    let mut control = false;
    for pair in title.into_inner() {
        match pair.as_rule() {
            Rule::field_names => {
                let (long_name, abbreviation) = names_of(pair);
                field.long_name = long_name;
                field.abbreviation = abbreviation;
            }
            Rule::width_spec => field.width = Some(width_of(pair)?),
            Rule::section_spec => {
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::repeat_marker => field.array = Some(true),
                        Rule::section_ref => field.section_ref = Some(section_id(inner)?),
                        _ => {}
                    }
                }
            }
            Rule::control_marker => control = true,
            Rule::value_modifier => {
                let at = pair.clone();
                let value = parse_number(&first_inner(pair, Rule::number)?)?;
                field.value = merge_value(&field.long_name, "value", field.value, Some(value))
                    .map_err(|e| ParseFailure::at(Rule::value_modifier, &at, e.to_string()))?;
            }
            Rule::optional_marker => field.optional = true,
            Rule::array_marker => field.array = Some(true),
            _ => {}
        }
    }
    Ok(FieldTitle { field, control })
}

/// Parse a control-bit list: one `NAME [(ABBR)]: description` entry per line,
/// each a one-bit field.
pub fn parse_control_bits(text: &str) -> Result<Vec<TextField>, ParseFailure> {
    let normalized: String = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let list = root(&normalized, Rule::control_bits)?;
    let mut out = Vec::new();
    for bit in list.into_inner().filter(|p| p.as_rule() == Rule::control_bit) {
        let mut field = TextField::default().with_width(FieldWidth::Bits(1));
        for inner in bit.into_inner() {
            match inner.as_rule() {
                Rule::long_name => field.long_name = inner.as_str().to_string(),
                Rule::abbreviation => field.abbreviation = Some(inner.as_str().trim().to_string()),
                _ => {}
            }
        }
        out.push(field);
    }
    Ok(out)
}

// ---------------------------------------------------------------- expressions

fn operator_method(op: &Pair<Rule>) -> Result<&'static str, ParseFailure> {
    let method = match op.as_rule() {
        Rule::or_op => "or",
        Rule::and_op => "and",
        Rule::eq_op => "eq",
        Rule::ne_op => "ne",
        Rule::lt_op => "lt",
        Rule::le_op => "le",
        Rule::gt_op => "gt",
        Rule::ge_op => "ge",
        Rule::sum_op if op.as_str() == "+" => "plus",
        Rule::sum_op => "minus",
        Rule::mul_op if op.as_str() == "*" => "multiply",
        Rule::mul_op if op.as_str() == "/" => "divide",
        Rule::mul_op => "modulo",
        other => return Err(ParseFailure::at(other, op, "not an operator")),
    };
    Ok(method)
}

fn build_expr(pair: Pair<Rule>, this: Option<&str>) -> Result<Expression, ParseFailure> {
    let at = pair.clone();
    match pair.as_rule() {
        Rule::condition | Rule::condition_input => {
            let inner = pair
                .into_inner()
                .find(|p| p.as_rule() == Rule::or_expr)
                .ok_or_else(|| ParseFailure::at(Rule::condition, &at, "empty condition"))?;
            build_expr(inner, this)
        }
        Rule::or_expr | Rule::and_expr | Rule::cmp_expr | Rule::sum_expr | Rule::product => {
            let mut inner = pair.into_inner();
            let first = inner
                .next()
                .ok_or_else(|| ParseFailure::at(at.as_rule(), &at, "missing operand"))?;
            let mut acc = build_expr(first, this)?;
            while let Some(op) = inner.next() {
                let method = operator_method(&op)?;
                let rhs = inner
                    .next()
                    .ok_or_else(|| ParseFailure::at(op.as_rule(), &op, "missing right operand"))?;
                acc = Expression::binary(acc, method, build_expr(rhs, this)?);
            }
            Ok(acc)
        }
        Rule::number => Ok(Expression::int(parse_number(&pair)?)),
        Rule::named_field => {
            let words = first_inner(pair, Rule::field_words)?;
            Ok(Expression::field(&names::field_name(words.as_str())))
        }
        Rule::bare_field => Ok(Expression::field(&names::field_name(pair.as_str()))),
        Rule::this_field => this
            .map(|name| Expression::field(&names::field_name(name)))
            .ok_or_else(|| ParseFailure::at(Rule::this_field, &at, "no field in scope")),
        other => Err(ParseFailure::at(other, &at, "unexpected expression")),
    }
}

/// Parse a standalone condition such as `the Kind field is 2 and HL > 5`.
pub fn parse_condition(text: &str) -> Result<Expression, ParseFailure> {
    let normalized = collapse_whitespace(text);
    let condition = root(&normalized, Rule::condition_input)?;
    build_expr(condition, None)
}

// ---------------------------------------------------------------- directives

/// A recognised sentence of a field body or section legend.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// The section describes a protocol data unit.
    Pdu,
    /// The section's fields are described in another section.
    DescribedIn(String),
    /// The field in scope is present only when the condition holds.
    Presence(Expression),
    /// The field in scope carries a fixed value.
    Value(i64),
    /// The field in scope satisfies `field.<method>(operand)`.
    Constraint { method: String, operand: Expression },
    /// A structure from another section is inserted next to an anchor field.
    Insertion(RelLoc),
}

fn build_insertion(pair: Pair<Rule>, this: Option<&str>) -> Result<RelLoc, ParseFailure> {
    let at = pair.clone();
    let mut rel = RelLoc::new("", 1, "", None);
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::this_value_clause => {
                let field_this = this.ok_or_else(|| ParseFailure::at(Rule::this_value_clause, &inner, "no field in scope"))?;
                rel.field_this = Some(field_this.to_string());
                rel.value = Some(parse_number(&first_inner(inner, Rule::number)?)?);
            }
            Rule::condition_clause => {
                rel.condition = Some(build_expr(first_inner(inner, Rule::condition)?, this)?);
            }
            Rule::optional_word => rel.optional = true,
            Rule::new_field_name => rel.field_new = inner.as_str().to_string(),
            Rule::section_ref => rel.section = Some(section_id(inner)?),
            Rule::follows => rel.rel_loc = 1,
            Rule::precedes => rel.rel_loc = -1,
            Rule::offset_after | Rule::offset_before => {
                let sign = if inner.as_rule() == Rule::offset_after { 1 } else { -1 };
                let count = parse_number(&first_inner(inner.clone(), Rule::number)?)?;
                let count = i32::try_from(count).map_err(|e| ParseFailure::at(Rule::number, &inner, e.to_string()))?;
                rel.rel_loc = sign * count;
            }
            Rule::this_field => {
                rel.field_loc = this
                    .ok_or_else(|| ParseFailure::at(Rule::this_field, &inner, "no field in scope"))?
                    .to_string();
            }
            Rule::named_field => rel.field_loc = first_inner(inner, Rule::field_words)?.as_str().to_string(),
            _ => {}
        }
    }
    if rel.field_new.is_empty() || rel.field_loc.is_empty() {
        return Err(ParseFailure::at(Rule::insertion_directive, &at, "incomplete insertion"));
    }
    Ok(rel)
}

/// Parse one sentence. `this` names the field whose body the sentence belongs to.
pub fn parse_directive(sentence: &str, this: Option<&str>) -> Result<Directive, ParseFailure> {
    let normalized = collapse_whitespace(sentence);
    let normalized = normalized.trim_end_matches('.');
    let directive = root(normalized, Rule::directive)?;
    let at = directive.clone();
    let kind = directive
        .into_inner()
        .next()
        .ok_or_else(|| ParseFailure::at(Rule::directive, &at, "empty directive"))?;
    match kind.as_rule() {
        Rule::pdu_directive => Ok(Directive::Pdu),
        Rule::described_in_directive => Ok(Directive::DescribedIn(section_id(first_inner(kind, Rule::section_ref)?)?)),
        Rule::presence_directive => Ok(Directive::Presence(build_expr(first_inner(kind, Rule::condition)?, this)?)),
        Rule::value_directive => Ok(Directive::Value(parse_number(&first_inner(kind, Rule::number)?)?)),
        Rule::constraint_directive => {
            let mut method = None;
            let mut operand = None;
            for inner in kind.into_inner() {
                match inner.as_rule() {
                    Rule::lt_phrase => method = Some("lt"),
                    Rule::le_phrase => method = Some("le"),
                    Rule::gt_phrase => method = Some("gt"),
                    Rule::ge_phrase => method = Some("ge"),
                    Rule::ne_phrase => method = Some("ne"),
                    Rule::eq_phrase => method = Some("eq"),
                    Rule::sum_expr => operand = Some(build_expr(inner, this)?),
                    _ => {}
                }
            }
            match (method, operand) {
                (Some(method), Some(operand)) => Ok(Directive::Constraint {
                    method: method.to_string(),
                    operand,
                }),
                _ => Err(ParseFailure::at(Rule::constraint_directive, &at, "incomplete constraint")),
            }
        }
        Rule::insertion_directive => Ok(Directive::Insertion(build_insertion(kind, this)?)),
        other => Err(ParseFailure::at(other, &at, "unexpected directive")),
    }
}

/// Like [`parse_directive`], but a sentence that is plain prose yields `None`.
pub fn probe_directive(sentence: &str, this: Option<&str>) -> Option<Directive> {
    match parse_directive(sentence, this) {
        Ok(directive) => Some(directive),
        Err(failure) => {
            tracing::trace!(%failure, sentence, "sentence is not a directive");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_split_on_period_space() {
        let s = sentences("The value is in Section 3.2. It  follows\nthe header.");
        assert_eq!(s, vec!["The value is in Section 3.2", "It follows the header"]);
    }

    #[test]
    fn number_forms() {
        let e = parse_condition("kind == 0x1F").expect("hex");
        assert_eq!(e.render(), "kind.eq(31)");
    }

    #[test]
    fn normalize_artwork_dedents() {
        let art = "\n     +-+\n     |A|\n     +-+   \n\n";
        assert_eq!(normalize_artwork(art), "+-+\n|A|\n+-+");
    }
}
