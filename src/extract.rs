//! Per-section extraction: classify the section, parse its diagram and field
//! descriptions, and collect the directives found in its prose.

use crate::classify::{classify, description_pairs, paragraphs};
use crate::dom::{Node, Section};
use crate::expr::Expression;
use crate::fields::{merge_value, DiagramField, InconsistentData, RelLoc, TextField};
use crate::names;
use crate::parser::{self, Directive, ParseFailure};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Parse(#[from] ParseFailure),
    #[error(transparent)]
    Inconsistent(#[from] InconsistentData),
    #[error("body of field '{0}' is not a list")]
    MalformedBody(String),
}

/// Everything a structure section says about its fields, before reconciliation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SectionParts {
    pub diagram: Vec<DiagramField>,
    pub text: Vec<TextField>,
    pub rel_locs: Vec<RelLoc>,
    pub described_in: Option<String>,
    pub pdu: bool,
}

/// Extract the parts of a structure section.
///
/// `Ok(None)` means the section is not a structure section: its shape does not
/// classify, or its figure is not a packet diagram. Field titles that do not parse
/// are hard errors, as are conflicting literal values.
pub fn extract_section(section: &Section) -> Result<Option<SectionParts>, ExtractError> {
    let children: Vec<&Node> = section.content().collect();
    let zones = match classify(&children) {
        Ok(zones) => zones,
        Err(reason) => {
            debug!(section = %section.number, %reason, "skipping section");
            return Ok(None);
        }
    };

    let artwork = match children.get(zones.figure_range().start) {
        Some(Node::Figure(figure)) => figure.artwork.as_ref(),
        _ => None,
    };
    let Some(artwork) = artwork else {
        debug!(section = %section.number, "figure has no artwork");
        return Ok(None);
    };
    let diagram = match parser::parse_diagram(&artwork.text) {
        Ok(fields) => fields,
        Err(failure) => {
            debug!(section = %section.number, %failure, "figure is not a packet diagram");
            return Ok(None);
        }
    };

    let mut parts = SectionParts {
        diagram,
        ..Default::default()
    };

    let prose = paragraphs(&children, zones.intro_range())
        .into_iter()
        .chain(paragraphs(&children, zones.transition_range()))
        .chain(paragraphs(&children, zones.trailer_range()));
    for paragraph in prose {
        for sentence in parser::sentences(&paragraph.plain_text()) {
            match parser::probe_directive(&sentence, None) {
                Some(Directive::Pdu) => parts.pdu = true,
                Some(Directive::DescribedIn(target)) => parts.described_in = Some(target),
                Some(Directive::Insertion(rel)) => parts.rel_locs.push(rel),
                Some(other) => debug!(section = %section.number, ?other, "field directive outside a field body"),
                None => {}
            }
        }
    }

    for (title, body) in description_pairs(&children, &zones) {
        let title = parser::parse_field_title(&title.plain_text())?;
        let body = body
            .leading_list()
            .ok_or_else(|| ExtractError::MalformedBody(title.field.long_name.clone()))?
            .plain_text();
        if title.control {
            parts.text.extend(parser::parse_control_bits(&body)?);
            continue;
        }
        let mut field = title.field;
        for sentence in parser::sentences(&body) {
            if let Some(directive) = parser::probe_directive(&sentence, Some(&field.long_name)) {
                apply_directive(&mut field, directive, &mut parts)?;
            }
        }
        parts.text.push(field);
    }

    Ok(Some(parts))
}

fn apply_directive(field: &mut TextField, directive: Directive, parts: &mut SectionParts) -> Result<(), InconsistentData> {
    match directive {
        Directive::Presence(condition) => {
            field.condition = Some(match field.condition.take() {
                Some(previous) => previous.and(condition),
                None => condition,
            });
        }
        Directive::Value(value) => {
            field.value = merge_value(&field.long_name, "value", field.value, Some(value))?;
        }
        Directive::Constraint { method, operand } => {
            let this = Expression::field(&names::field_name(&field.long_name));
            field.constraints.push(Expression::binary(this, &method, operand));
        }
        Directive::Insertion(rel) => parts.rel_locs.push(rel),
        Directive::Pdu => parts.pdu = true,
        Directive::DescribedIn(target) => parts.described_in = Some(target),
    }
    Ok(())
}
