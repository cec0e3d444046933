//! Field descriptions from both sources: ASCII diagram cells and textual descriptions,
//! plus the canonical merged [`Field`].

use crate::expr::Expression;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldWidth {
    Bits(u64),
    Variable,
}

impl FieldWidth {
    pub fn bits(&self) -> Option<u64> {
        match self {
            FieldWidth::Bits(n) => Some(*n),
            FieldWidth::Variable => None,
        }
    }
}

impl fmt::Display for FieldWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldWidth::Bits(n) => write!(f, "{}", n),
            FieldWidth::Variable => f.write_str("variable"),
        }
    }
}

/// The two sources disagree on an attribute that cannot be reconciled.
/// `left` is the first (diagram-side) value, `right` the second (text-side).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}': inconsistent {attribute}: {left} vs {right}")]
pub struct InconsistentData {
    pub field: String,
    pub attribute: String,
    pub left: String,
    pub right: String,
}

impl InconsistentData {
    pub fn new(field: &str, attribute: &str, left: impl ToString, right: impl ToString) -> Self {
        InconsistentData {
            field: field.to_string(),
            attribute: attribute.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        }
    }
}

/// Merge two optional values: one present wins, equal values collapse, else an error.
pub fn merge_value<T: PartialEq + fmt::Display>(
    field: &str,
    attribute: &str,
    left: Option<T>,
    right: Option<T>,
) -> Result<Option<T>, InconsistentData> {
    match (left, right) {
        (Some(l), Some(r)) if l != r => Err(InconsistentData::new(field, attribute, l, r)),
        (Some(l), _) => Ok(Some(l)),
        (None, r) => Ok(r),
    }
}

/// One field cell of an ASCII diagram.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramField {
    pub name: String,
    pub abbreviation: Option<String>,
    pub width: FieldWidth,
    pub value: Option<i64>,
    pub array: Option<bool>,
}

impl DiagramField {
    pub fn new(name: &str, width: FieldWidth) -> Self {
        DiagramField {
            name: name.to_string(),
            abbreviation: None,
            width,
            value: None,
            array: None,
        }
    }
}

/// A field described by a title paragraph and its body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextField {
    pub long_name: String,
    pub abbreviation: Option<String>,
    pub width: Option<FieldWidth>,
    pub value: Option<i64>,
    /// Presence condition.
    pub condition: Option<Expression>,
    pub constraints: Vec<Expression>,
    /// Cross-reference to the section that describes this field's structure.
    pub section_ref: Option<String>,
    pub array: Option<bool>,
    pub optional: bool,
}

impl TextField {
    pub fn new(long_name: &str) -> Self {
        TextField {
            long_name: long_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_abbreviation(mut self, abbreviation: &str) -> Self {
        self.abbreviation = Some(abbreviation.to_string());
        self
    }

    pub fn with_width(mut self, width: FieldWidth) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_condition(mut self, condition: Expression) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A relative-location directive: insert a reference field next to an anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct RelLoc {
    /// Field whose description carried the directive, if any.
    pub field_this: Option<String>,
    /// Value of `field_this` that makes the inserted field present.
    pub value: Option<i64>,
    pub field_new: String,
    /// Offset from the anchor: +1 inserts right after it, -1 right before it.
    pub rel_loc: i32,
    /// Anchor field.
    pub field_loc: String,
    pub section: Option<String>,
    pub optional: bool,
    pub condition: Option<Expression>,
}

impl RelLoc {
    pub fn new(field_new: &str, rel_loc: i32, field_loc: &str, section: Option<&str>) -> Self {
        RelLoc {
            field_this: None,
            value: None,
            field_new: field_new.to_string(),
            rel_loc,
            field_loc: field_loc.to_string(),
            section: section.map(str::to_string),
            optional: false,
            condition: None,
        }
    }

    /// Presence of the inserted field: the explicit condition, else `field_this == value`.
    pub fn presence(&self) -> Option<Expression> {
        if let Some(condition) = &self.condition {
            return Some(condition.clone());
        }
        match (&self.field_this, self.value) {
            (Some(this), Some(value)) => {
                Some(Expression::field(&crate::names::field_name(this)).eq(Expression::int(value)))
            }
            _ => None,
        }
    }
}

/// The canonical reconciled field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Field {
    /// Normalized identifier.
    pub name: String,
    pub abbreviation: Option<String>,
    pub width: Option<FieldWidth>,
    pub value: Option<i64>,
    pub condition: Option<Expression>,
    pub constraints: Vec<Expression>,
    pub section_ref: Option<String>,
    pub array: Option<bool>,
    pub optional: bool,
}

impl Field {
    pub fn is_array(&self) -> bool {
        self.array == Some(true)
    }

    /// A synthetic field standing for a structure described in another section.
    pub fn reference(name: &str, section: Option<&str>, condition: Option<Expression>, optional: bool) -> Self {
        Field {
            name: name.to_string(),
            section_ref: section.map(str::to_string),
            condition,
            optional,
            ..Default::default()
        }
    }
}

impl From<&DiagramField> for Field {
    fn from(d: &DiagramField) -> Self {
        Field {
            name: crate::names::field_name(&d.name),
            abbreviation: d.abbreviation.clone(),
            width: Some(d.width),
            value: d.value,
            array: d.array,
            ..Default::default()
        }
    }
}

impl From<&TextField> for Field {
    fn from(t: &TextField) -> Self {
        Field {
            name: crate::names::field_name(&t.long_name),
            abbreviation: t.abbreviation.clone(),
            width: t.width,
            value: t.value,
            condition: t.condition.clone(),
            constraints: t.constraints.clone(),
            section_ref: t.section_ref.clone(),
            array: t.array,
            optional: t.optional,
        }
    }
}
