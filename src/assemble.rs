//! Two-pass assembly of a document into the protocol registry.
//!
//! Pass 1 walks the section tree depth-first and turns every structure section
//! into a [`SectionRecord`] (reconciled fields, PDU flag, cross-references),
//! indexed by section number and by name. A failure in one section is recorded
//! as a diagnostic and the section is skipped.
//!
//! Pass 2 emits one struct per record. By default it runs in traversal order and
//! a reference may only name a section already emitted (or the section itself);
//! [`ReferenceOrder::Topological`] emits dependencies first instead. Every struct
//! is forward-declared up front in both orders.
//!
//! Finally, structs and arrays not reachable from a PDU are pruned.

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::dom::{Document, Section};
use crate::expr::Expression;
use crate::extract::extract_section;
use crate::fields::Field;
use crate::names;
use crate::protocol::{EnumVariant, Protocol, ProtocolError, StructField};
use crate::reconcile::{MergePolicy, ReconcileError, Reconciler};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("section reference not found: '{section}' (referenced from section {from})")]
    SectionReferenceNotFound { section: String, from: String },
    #[error("section {section}: {source}")]
    Reconcile {
        section: String,
        #[source]
        source: ReconcileError,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Order in which records are emitted in pass 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceOrder {
    /// Document order; references must point backwards or at the section itself.
    #[default]
    Traversal,
    /// Dependencies first; cycles are broken by forward declarations.
    Topological,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerOptions {
    pub merge_policy: MergePolicy,
    pub reference_order: ReferenceOrder,
    /// One fresh bitstring type per field instead of one shared type per width.
    pub generic_type_per_field: bool,
    pub prune_unreachable: bool,
    /// Register an enum named `PDUs` with one variant per PDU.
    pub pdu_enum: bool,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        AssemblerOptions {
            merge_policy: MergePolicy::Lenient,
            reference_order: ReferenceOrder::Traversal,
            generic_type_per_field: false,
            prune_unreachable: true,
            pdu_enum: false,
        }
    }
}

impl AssemblerOptions {
    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn reference_order(mut self, order: ReferenceOrder) -> Self {
        self.reference_order = order;
        self
    }

    pub fn generic_type_per_field(mut self, enabled: bool) -> Self {
        self.generic_type_per_field = enabled;
        self
    }

    pub fn prune_unreachable(mut self, enabled: bool) -> Self {
        self.prune_unreachable = enabled;
        self
    }

    pub fn pdu_enum(mut self, enabled: bool) -> Self {
        self.pdu_enum = enabled;
        self
    }
}

/// A structure section after pass 1.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionRecord {
    /// Struct type name, unique among records.
    pub name: String,
    pub number: String,
    pub title: String,
    pub fields: Vec<Field>,
    /// Section whose field descriptions also apply here.
    pub described_in: Option<String>,
    pub pdu: bool,
}

impl SectionRecord {
    /// Sections this record refers to, in field order.
    pub fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self.fields.iter().filter_map(|f| f.section_ref.as_deref()).collect();
        if let Some(described_in) = &self.described_in {
            refs.push(described_in);
        }
        refs
    }
}

/// Outcome of an assembly run.
#[derive(Debug, Clone, Default)]
pub struct AssemblyReport {
    pub diagnostics: Vec<Diagnostic>,
    /// Struct names of the records collected in pass 1, in traversal order.
    pub collected: Vec<String>,
    /// Types removed by pruning.
    pub pruned: Vec<String>,
}

pub struct Assembler<'p> {
    protocol: &'p mut Protocol,
    options: AssemblerOptions,
    records: Vec<SectionRecord>,
    by_number: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    diagnostics: Diagnostics,
    pruned: Vec<String>,
    /// Times each struct has been used as a field type.
    struct_uses: HashMap<String, usize>,
}

impl<'p> Assembler<'p> {
    pub fn new(protocol: &'p mut Protocol, options: AssemblerOptions) -> Self {
        Assembler {
            protocol,
            options,
            records: Vec::new(),
            by_number: HashMap::new(),
            by_name: HashMap::new(),
            diagnostics: Diagnostics::new(),
            pruned: Vec::new(),
            struct_uses: HashMap::new(),
        }
    }

    pub fn records(&self) -> &[SectionRecord] {
        &self.records
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // ------------------------------------------------------------ pass 1

    /// Pass 1: collect a record for every structure section of the document.
    pub fn collect(&mut self, document: &Document) {
        for section in document.walk() {
            self.collect_section(section);
        }
    }

    fn collect_section(&mut self, section: &Section) {
        let parts = match extract_section(section) {
            Ok(Some(parts)) => parts,
            Ok(None) => return,
            Err(e) => {
                self.diagnostics
                    .error(Some(&section.number), None, format!("section skipped: {}", e));
                return;
            }
        };

        let fields = {
            let mut reconciler = Reconciler::new(&section.number, self.options.merge_policy, &mut self.diagnostics);
            reconciler.reconcile(&parts.diagram, &parts.text, &parts.rel_locs)
        };
        let fields = match fields {
            Ok(fields) => fields,
            Err(e) => {
                self.diagnostics
                    .error(Some(&section.number), None, format!("section skipped: {}", e));
                return;
            }
        };

        let name = names::unique(&names::type_name(&section.title), |n| self.by_name.contains_key(n));
        debug!(section = %section.number, name = %name, fields = fields.len(), "collected structure section");
        let index = self.records.len();
        self.by_number.insert(section.number.clone(), index);
        self.by_name.insert(name.clone(), index);
        self.records.push(SectionRecord {
            name,
            number: section.number.clone(),
            title: section.title.clone(),
            fields,
            described_in: parts.described_in,
            pdu: parts.pdu,
        });
    }

    /// Record index for a cross-reference given as a section number or a name.
    pub fn lookup(&self, key: &str) -> Option<usize> {
        self.by_number
            .get(key)
            .or_else(|| self.by_name.get(key))
            .or_else(|| self.by_name.get(&names::type_name(key)))
            .copied()
    }

    // ------------------------------------------------------------ pass 2

    /// Pass 2: emit one struct per record into the registry.
    pub fn emit(&mut self) -> Result<(), AssembleError> {
        let records = std::mem::take(&mut self.records);
        let result = self.emit_records(&records);
        self.records = records;
        result
    }

    fn emit_records(&mut self, records: &[SectionRecord]) -> Result<(), AssembleError> {
        // Struct names are claimed before any array or bitstring is named.
        for record in records {
            self.protocol.declare_struct(&record.name)?;
        }
        let order = match self.options.reference_order {
            ReferenceOrder::Traversal => (0..records.len()).collect(),
            ReferenceOrder::Topological => self.topological_order(records),
        };

        let mut emitted: HashSet<usize> = HashSet::new();
        for index in order {
            self.emit_record(records, index, &emitted)?;
            emitted.insert(index);
        }

        if self.options.pdu_enum && !self.protocol.get_pdu_names().is_empty() {
            let variants: Vec<EnumVariant> = self
                .protocol
                .get_pdu_names()
                .iter()
                .map(|pdu| EnumVariant::new(pdu, Some(pdu.as_str())))
                .collect();
            self.protocol.define_enum("PDUs", variants)?;
        }
        Ok(())
    }

    /// Dependency-first order over the records, visiting roots in traversal order.
    fn topological_order(&self, records: &[SectionRecord]) -> Vec<usize> {
        fn visit(
            index: usize,
            records: &[SectionRecord],
            assembler: &Assembler<'_>,
            visited: &mut HashSet<usize>,
            out: &mut Vec<usize>,
        ) {
            if !visited.insert(index) {
                return;
            }
            for reference in records[index].references() {
                if let Some(dep) = assembler.lookup(reference) {
                    visit(dep, records, assembler, visited, out);
                }
            }
            out.push(index);
        }

        let mut visited = HashSet::new();
        let mut out = Vec::with_capacity(records.len());
        for index in 0..records.len() {
            visit(index, records, self, &mut visited, &mut out);
        }
        out
    }

    fn resolve(
        &self,
        records: &[SectionRecord],
        key: &str,
        from: usize,
        emitted: &HashSet<usize>,
    ) -> Result<usize, AssembleError> {
        let not_found = || AssembleError::SectionReferenceNotFound {
            section: key.to_string(),
            from: records[from].number.clone(),
        };
        let target = self.lookup(key).ok_or_else(not_found)?;
        let available = target == from
            || emitted.contains(&target)
            || self.options.reference_order == ReferenceOrder::Topological;
        if !available {
            return Err(not_found());
        }
        Ok(target)
    }

    /// Fields of `record`, with descriptions borrowed from the section it names.
    fn described_fields(
        &mut self,
        records: &[SectionRecord],
        index: usize,
        emitted: &HashSet<usize>,
    ) -> Result<Vec<Field>, AssembleError> {
        let record = &records[index];
        let mut fields = record.fields.clone();
        let Some(key) = &record.described_in else {
            return Ok(fields);
        };
        let source = self.resolve(records, key, index, emitted)?;
        let mut reconciler = Reconciler::new(&record.number, self.options.merge_policy, &mut self.diagnostics);
        for field in &mut fields {
            let matching = records[source].fields.iter().find(|d| {
                d.name == field.name
                    || field
                        .abbreviation
                        .as_deref()
                        .is_some_and(|a| d.abbreviation.as_deref().map(names::field_name) == Some(names::field_name(a)))
            });
            if let Some(description) = matching {
                reconciler
                    .merge(field, description, true)
                    .map_err(|source| AssembleError::Reconcile {
                        section: record.number.clone(),
                        source,
                    })?;
            }
        }
        Ok(fields)
    }

    fn emit_record(
        &mut self,
        records: &[SectionRecord],
        index: usize,
        emitted: &HashSet<usize>,
    ) -> Result<(), AssembleError> {
        let record = &records[index];
        let fields = self.described_fields(records, index, emitted)?;

        let mut aliases: HashMap<String, String> = HashMap::new();
        for field in &fields {
            if let Some(abbr) = &field.abbreviation {
                aliases.insert(names::field_name(abbr), field.name.clone());
            }
        }
        let rename = |name: &str| aliases.get(name).cloned();

        let mut taken: HashSet<String> = HashSet::new();
        let mut struct_fields = Vec::with_capacity(fields.len());
        let mut constraints = Vec::new();
        for field in &fields {
            let name = names::unique(&field.name, |n| taken.contains(n));
            taken.insert(name.clone());

            let field_type = match &field.section_ref {
                Some(key) => {
                    let target = self.resolve(records, key, index, emitted)?;
                    let element = records[target].name.clone();
                    if field.is_array() {
                        self.define_array_of(&field.name, &element)?
                    } else {
                        self.role_type(&record.number, &name, &element)?
                    }
                }
                None => {
                    let element = self.bitstring_for(field, &name)?;
                    if field.is_array() {
                        self.define_array_of(&field.name, &element)?
                    } else {
                        element
                    }
                }
            };

            let is_present = field.condition.clone().map(|mut c| {
                c.map_field_names(&rename);
                c
            });
            for constraint in &field.constraints {
                let mut constraint = constraint.clone();
                constraint.map_field_names(&rename);
                constraints.push(constraint);
            }
            if let Some(value) = field.value {
                let width = field.width.and_then(|w| w.bits()).unwrap_or(crate::expr::DEFAULT_INT_WIDTH);
                constraints.push(Expression::field(&name).eq(Expression::typed_int(width, value)));
            }
            struct_fields.push(StructField::new(&name, &field_type, is_present));
        }

        self.protocol
            .define_struct(&record.name, struct_fields, constraints, Vec::new())?;
        if record.pdu {
            self.protocol.define_pdu(&record.name)?;
        }
        info!(section = %record.number, name = %record.name, "emitted struct");
        Ok(())
    }

    fn bitstring_for(&mut self, field: &Field, field_name: &str) -> Result<String, AssembleError> {
        let width = field.width.and_then(|w| w.bits());
        let width_label = width.map_or_else(|| "var".to_string(), |w| w.to_string());
        let name = if self.options.generic_type_per_field {
            self.protocol
                .unique_type_name(&format!("G${}${}", field_name, width_label))
        } else {
            format!("BitString${}", width_label)
        };
        self.protocol.define_bitstring(&name, width)?;
        Ok(name)
    }

    /// `target` itself on its first use as a field type; each later role gets a
    /// fresh newtype over it.
    fn role_type(&mut self, section: &str, field: &str, target: &str) -> Result<String, AssembleError> {
        let uses = self.struct_uses.entry(target.to_string()).or_insert(0);
        *uses += 1;
        if *uses == 1 {
            return Ok(target.to_string());
        }
        let name = self.protocol.unique_type_name(target);
        self.protocol.define_newtype(&name, target, Vec::new())?;
        self.diagnostics
            .info(Some(section), Some(field), format!("{} is used again; this role is typed {}", target, name));
        Ok(name)
    }

    fn define_array_of(&mut self, field_name: &str, element: &str) -> Result<String, AssembleError> {
        let name = self.protocol.unique_type_name(&names::type_name(field_name));
        self.protocol.define_array(&name, element, None)?;
        Ok(name)
    }

    // ------------------------------------------------------------ pruning

    /// Drop structs and arrays not reachable from a PDU.
    pub fn prune(&mut self) -> Result<(), AssembleError> {
        if !self.options.prune_unreachable {
            return Ok(());
        }
        if self.protocol.get_pdu_names().is_empty() {
            self.diagnostics
                .warning(None, None, "no PDU declared; every struct is unreachable");
        }
        self.pruned = self.protocol.retain_reachable()?;
        for name in &self.pruned {
            debug!(name = %name, "pruned unreachable type");
        }
        Ok(())
    }

    pub fn finish(self) -> AssemblyReport {
        AssemblyReport {
            diagnostics: self.diagnostics.into_vec(),
            collected: self.records.into_iter().map(|r| r.name).collect(),
            pruned: self.pruned,
        }
    }
}

/// Assemble `document` into a new, frozen registry named after the document title.
pub fn assemble(document: &Document, options: AssemblerOptions) -> Result<(Protocol, AssemblyReport), AssembleError> {
    let mut protocol = Protocol::new(&names::type_name(&document.title));
    let report = {
        let mut assembler = Assembler::new(&mut protocol, options);
        assembler.collect(document);
        assembler.emit()?;
        assembler.prune()?;
        assembler.finish()
    };
    protocol.freeze();
    Ok((protocol, report))
}
