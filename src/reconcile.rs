//! Field reconciliation: merge the fields of a packet diagram with the fields of
//! the textual descriptions into one ordered list.
//!
//! The diagram fixes the order. Each text field is matched to a diagram slot by
//! long name, else by abbreviation (the slot is then renamed to the long name and
//! keeps its position). Relative-location directives then insert reference fields
//! next to their anchors.

use crate::diagnostics::Diagnostics;
use crate::fields::{merge_value, DiagramField, Field, InconsistentData, RelLoc, TextField};
use crate::names;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("field '{0}' not in ASCII diagram")]
    FieldNotInDiagram(String),
    #[error(transparent)]
    Inconsistent(#[from] InconsistentData),
}

/// How disagreements on width and abbreviation are handled. Literal values,
/// array flags, cross-references, and presence conditions are always fatal on
/// disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Warn and keep the diagram's value.
    #[default]
    Lenient,
    /// Fail with `InconsistentData`.
    Strict,
}

/// Merges fields for one section, recording warnings as it goes.
pub struct Reconciler<'d> {
    section: String,
    policy: MergePolicy,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Reconciler<'d> {
    pub fn new(section: &str, policy: MergePolicy, diagnostics: &'d mut Diagnostics) -> Self {
        Reconciler {
            section: section.to_string(),
            policy,
            diagnostics,
        }
    }

    /// Merge diagram and text fields, then apply the relative-location directives.
    pub fn reconcile(
        &mut self,
        diagram: &[DiagramField],
        text: &[TextField],
        rel_locs: &[RelLoc],
    ) -> Result<Vec<Field>, ReconcileError> {
        let mut lookup: HashMap<String, Field> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for cell in diagram {
            let mut field = Field::from(cell);
            field.name = names::unique(&field.name, |n| lookup.contains_key(n));
            order.push(field.name.clone());
            lookup.insert(field.name.clone(), field);
        }

        for described in text {
            let key = self.match_slot(described, &mut lookup, &mut order)?;
            if let Some(slot) = lookup.get_mut(&key) {
                let incoming = Field::from(described);
                self.merge(slot, &incoming, false)?;
            }
        }

        let mut fields: Vec<Field> = order.iter().filter_map(|k| lookup.remove(k)).collect();
        for rel in rel_locs {
            self.insert_relative(&mut fields, rel);
        }
        Ok(fields)
    }

    /// Find the diagram slot for a text field, renaming an abbreviation-matched slot.
    fn match_slot(
        &self,
        described: &TextField,
        lookup: &mut HashMap<String, Field>,
        order: &mut [String],
    ) -> Result<String, ReconcileError> {
        let long = names::field_name(&described.long_name);
        if lookup.contains_key(&long) {
            return Ok(long);
        }
        let abbreviation = described.abbreviation.as_deref().map(names::field_name);
        if let Some(abbr) = abbreviation {
            if let Some(mut slot) = lookup.remove(&abbr) {
                slot.name = long.clone();
                if let Some(position) = order.iter().position(|k| *k == abbr) {
                    order[position] = long.clone();
                }
                lookup.insert(long.clone(), slot);
                return Ok(long);
            }
        }
        Err(ReconcileError::FieldNotInDiagram(described.long_name.clone()))
    }

    /// Merge `incoming` into `slot` attribute by attribute.
    pub fn merge(&mut self, slot: &mut Field, incoming: &Field, ignore_value: bool) -> Result<(), ReconcileError> {
        let name = slot.name.clone();

        let abbreviation = match (&slot.abbreviation, &incoming.abbreviation) {
            (Some(a), Some(b)) if names::field_name(a) != names::field_name(b) => {
                self.soft_conflict(&name, "abbreviation", a, b)?;
                Some(a.clone())
            }
            (Some(a), _) => Some(a.clone()),
            (None, b) => b.clone(),
        };
        slot.abbreviation = abbreviation;

        slot.width = match (slot.width, incoming.width) {
            (Some(a), Some(b)) if a != b => {
                self.soft_conflict(&name, "width", a, b)?;
                Some(a)
            }
            (Some(a), _) => Some(a),
            (None, b) => b,
        };

        if !ignore_value {
            slot.value = merge_value(&name, "value", slot.value, incoming.value)?;
        }
        slot.array = merge_value(&name, "array", slot.array, incoming.array)?;
        slot.section_ref = merge_value(&name, "section", slot.section_ref.take(), incoming.section_ref.clone())?;
        slot.condition = merge_value(&name, "condition", slot.condition.take(), incoming.condition.clone())?;
        slot.optional |= incoming.optional;
        slot.constraints.extend(incoming.constraints.iter().cloned());
        Ok(())
    }

    fn soft_conflict(
        &mut self,
        field: &str,
        attribute: &str,
        left: impl fmt::Display,
        right: impl fmt::Display,
    ) -> Result<(), ReconcileError> {
        match self.policy {
            MergePolicy::Strict => Err(InconsistentData::new(field, attribute, left, right).into()),
            MergePolicy::Lenient => {
                self.diagnostics.warning(
                    Some(&self.section),
                    Some(field),
                    format!("{} mismatch: diagram {}, text {}; keeping diagram", attribute, left, right),
                );
                Ok(())
            }
        }
    }

    fn insert_relative(&mut self, fields: &mut Vec<Field>, rel: &RelLoc) {
        let anchor = names::field_name(&rel.field_loc);
        let Some(index) = fields.iter().position(|f| f.name == anchor) else {
            self.diagnostics.warning(
                Some(&self.section),
                Some(&anchor),
                format!("anchor of '{}' not found; insertion skipped", rel.field_new),
            );
            return;
        };
        let position = insertion_index(index, rel.rel_loc, fields.len());
        let field = Field::reference(
            &names::field_name(&rel.field_new),
            rel.section.as_deref(),
            rel.presence(),
            rel.optional,
        );
        fields.insert(position, field);
    }
}

/// Index at which a field `rel` places away from `anchor` is inserted:
/// `+1` lands right after the anchor, `-1` right before it.
pub fn insertion_index(anchor: usize, rel: i32, len: usize) -> usize {
    let anchor = anchor as i64;
    let target = if rel >= 0 {
        anchor + i64::from(rel)
    } else {
        anchor + i64::from(rel) + 1
    };
    target.clamp(0, len as i64) as usize
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Lenient => f.write_str("lenient"),
            MergePolicy::Strict => f.write_str("strict"),
        }
    }
}

/// Convenience wrapper over [`Reconciler::reconcile`].
pub fn reconcile(
    section: &str,
    diagram: &[DiagramField],
    text: &[TextField],
    rel_locs: &[RelLoc],
    policy: MergePolicy,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Field>, ReconcileError> {
    Reconciler::new(section, policy, diagnostics).reconcile(diagram, text, rel_locs)
}
