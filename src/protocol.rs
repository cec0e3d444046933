//! Protocol type registry: the intermediate representation produced by assembly.
//!
//! Types are registered by unique name and kept in registration order. Struct field
//! types must resolve to registered types; a struct may be forward-declared so that
//! self-referential and mutually referential sections can name each other before
//! their fields are known.

use crate::expr::Expression;
use crate::names;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Naming conflict: type '{0}' is already defined differently")]
    NamingConflict(String),
    #[error("Type not found: {0}")]
    TypeNotFound(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Duplicate field '{field}' in struct {structure}")]
    DuplicateField { structure: String, field: String },
    #[error("Protocol is frozen")]
    Frozen,
}

/// Capabilities a type exposes to expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Trait {
    Value,
    Sized,
    IndexCollection,
    Equality,
    Ordinal,
    BooleanOps,
    ArithmeticOps,
    NumberRepresentable,
}

impl Trait {
    pub fn methods(self) -> &'static [&'static str] {
        match self {
            Trait::Value => &["get", "set"],
            Trait::Sized => &["size"],
            Trait::IndexCollection => &["get", "set", "length"],
            Trait::Equality => &["eq", "ne"],
            Trait::Ordinal => &["lt", "le", "gt", "ge"],
            Trait::BooleanOps => &["and", "or", "not"],
            Trait::ArithmeticOps => &["plus", "minus", "multiply", "divide", "modulo"],
            Trait::NumberRepresentable => &["to_integer"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitString {
    pub name: String,
    /// `None` for variable width.
    pub width: Option<u64>,
}

impl BitString {
    pub fn new(name: &str, width: Option<u64>) -> Self {
        BitString {
            name: name.to_string(),
            width,
        }
    }
}

/// A type derived from another, adding traits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewType {
    pub name: String,
    pub derived_from: String,
    pub implements: Vec<Trait>,
}

impl NewType {
    pub fn new(name: &str, derived_from: &str, implements: Vec<Trait>) -> Self {
        NewType {
            name: name.to_string(),
            derived_from: derived_from.to_string(),
            implements,
        }
    }
}

/// Decoded view of a field: `using` maps the wire value to `into_name` of `into_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transform {
    pub into_name: String,
    pub into_type: String,
    pub using: String,
}

impl Transform {
    pub fn new(into_name: &str, into_type: &str, using: &str) -> Self {
        Transform {
            into_name: into_name.to_string(),
            into_type: into_type.to_string(),
            using: using.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructField {
    pub name: String,
    pub field_type: String,
    pub is_present: Option<Expression>,
    pub transform: Option<Transform>,
}

impl StructField {
    pub fn new(name: &str, field_type: &str, is_present: Option<Expression>) -> Self {
        StructField {
            name: name.to_string(),
            field_type: field_type.to_string(),
            is_present,
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// The field type, then the transform target if any.
    pub fn referenced_types(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.field_type.as_str()).chain(self.transform.as_ref().map(|t| t.into_type.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Struct {
    pub name: String,
    pub fields: Vec<StructField>,
    pub constraints: Vec<Expression>,
    pub actions: Vec<Expression>,
    #[serde(skip)]
    forward: bool,
}

impl Struct {
    pub fn is_forward_declaration(&self) -> bool {
        self.forward
    }

    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn same_layout(&self, fields: &[StructField], constraints: &[Expression], actions: &[Expression]) -> bool {
        self.fields == fields && self.constraints == constraints && self.actions == actions
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Array {
    pub name: String,
    pub element_type: String,
    /// `None` when the element count is not fixed.
    pub length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumVariant {
    pub name: String,
    pub variant_type: Option<String>,
}

impl EnumVariant {
    pub fn new(name: &str, variant_type: Option<&str>) -> Self {
        EnumVariant {
            name: name.to_string(),
            variant_type: variant_type.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enum {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "construct")]
pub enum ProtocolType {
    BitString(BitString),
    NewType(NewType),
    Struct(Struct),
    Array(Array),
    Enum(Enum),
}

impl ProtocolType {
    pub fn name(&self) -> &str {
        match self {
            ProtocolType::BitString(t) => &t.name,
            ProtocolType::NewType(t) => &t.name,
            ProtocolType::Struct(t) => &t.name,
            ProtocolType::Array(t) => &t.name,
            ProtocolType::Enum(t) => &t.name,
        }
    }

    /// Names of the registered types this type depends on.
    pub fn referenced_types(&self) -> Vec<&str> {
        match self {
            ProtocolType::BitString(_) => Vec::new(),
            ProtocolType::NewType(t) => vec![t.derived_from.as_str()],
            ProtocolType::Struct(s) => s.fields.iter().flat_map(StructField::referenced_types).collect(),
            ProtocolType::Array(a) => vec![a.element_type.as_str()],
            ProtocolType::Enum(e) => e
                .variants
                .iter()
                .filter_map(|v| v.variant_type.as_deref())
                .collect(),
        }
    }

    fn builtin_traits(&self) -> &'static [Trait] {
        match self {
            ProtocolType::BitString(_) => &[
                Trait::Sized,
                Trait::Value,
                Trait::Equality,
                Trait::NumberRepresentable,
            ],
            ProtocolType::Array(_) => &[Trait::Sized, Trait::Equality, Trait::IndexCollection],
            ProtocolType::Struct(_) => &[Trait::Sized, Trait::Equality],
            ProtocolType::Enum(_) => &[Trait::Sized],
            ProtocolType::NewType(_) => &[],
        }
    }
}

/// The registry. Created once per document and mutated only while assembling.
#[derive(Debug, Clone, Default)]
pub struct Protocol {
    name: String,
    types: Vec<ProtocolType>,
    types_by_name: HashMap<String, usize>,
    pdus: Vec<String>,
    frozen: bool,
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Protocol", 3)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("types", &self.types)?;
        state.serialize_field("pdus", &self.pdus)?;
        state.end()
    }
}

impl Protocol {
    pub fn new(name: &str) -> Self {
        Protocol {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All types in registration order.
    pub fn types(&self) -> &[ProtocolType] {
        &self.types
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_open(&self) -> Result<(), ProtocolError> {
        if self.frozen {
            return Err(ProtocolError::Frozen);
        }
        Ok(())
    }

    fn check_type_name(name: &str) -> Result<(), ProtocolError> {
        if names::is_type_name(name) {
            Ok(())
        } else {
            Err(ProtocolError::InvalidName(name.to_string()))
        }
    }

    fn require(&self, name: &str) -> Result<&ProtocolType, ProtocolError> {
        self.get_type(name)
    }

    fn push(&mut self, ty: ProtocolType) -> &ProtocolType {
        let i = self.types.len();
        self.types_by_name.insert(ty.name().to_string(), i);
        self.types.push(ty);
        &self.types[i]
    }

    /// Register `ty`; re-registering an identical definition returns the existing one.
    fn register(&mut self, ty: ProtocolType) -> Result<&ProtocolType, ProtocolError> {
        self.check_open()?;
        Self::check_type_name(ty.name())?;
        match self.types_by_name.get(ty.name()).copied() {
            Some(i) if self.types[i] == ty => Ok(&self.types[i]),
            Some(_) => Err(ProtocolError::NamingConflict(ty.name().to_string())),
            None => Ok(self.push(ty)),
        }
    }

    pub fn define_bitstring(&mut self, name: &str, width: Option<u64>) -> Result<&ProtocolType, ProtocolError> {
        self.register(ProtocolType::BitString(BitString::new(name, width)))
    }

    pub fn define_newtype(
        &mut self,
        name: &str,
        derived_from: &str,
        implements: Vec<Trait>,
    ) -> Result<&ProtocolType, ProtocolError> {
        self.require(derived_from)?;
        self.register(ProtocolType::NewType(NewType::new(name, derived_from, implements)))
    }

    pub fn define_array(
        &mut self,
        name: &str,
        element_type: &str,
        length: Option<u64>,
    ) -> Result<&ProtocolType, ProtocolError> {
        self.require(element_type)?;
        self.register(ProtocolType::Array(Array {
            name: name.to_string(),
            element_type: element_type.to_string(),
            length,
        }))
    }

    pub fn define_enum(&mut self, name: &str, variants: Vec<EnumVariant>) -> Result<&ProtocolType, ProtocolError> {
        for variant in &variants {
            if let Some(t) = &variant.variant_type {
                self.require(t)?;
            }
        }
        self.register(ProtocolType::Enum(Enum {
            name: name.to_string(),
            variants,
        }))
    }

    /// Forward-declare a struct. Declaring an existing struct is a no-op.
    pub fn declare_struct(&mut self, name: &str) -> Result<(), ProtocolError> {
        self.check_open()?;
        Self::check_type_name(name)?;
        match self.types_by_name.get(name).copied() {
            Some(i) => match &self.types[i] {
                ProtocolType::Struct(_) => Ok(()),
                _ => Err(ProtocolError::NamingConflict(name.to_string())),
            },
            None => {
                self.push(ProtocolType::Struct(Struct {
                    name: name.to_string(),
                    fields: Vec::new(),
                    constraints: Vec::new(),
                    actions: Vec::new(),
                    forward: true,
                }));
                Ok(())
            }
        }
    }

    /// Define a struct, back-filling a forward declaration of the same name.
    /// The primitive types needed by constants in the expressions are registered first.
    pub fn define_struct(
        &mut self,
        name: &str,
        fields: Vec<StructField>,
        constraints: Vec<Expression>,
        actions: Vec<Expression>,
    ) -> Result<&ProtocolType, ProtocolError> {
        self.check_open()?;
        Self::check_type_name(name)?;

        let mut seen = HashSet::new();
        for field in &fields {
            if !names::is_field_name(&field.name) {
                return Err(ProtocolError::InvalidName(field.name.clone()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ProtocolError::DuplicateField {
                    structure: name.to_string(),
                    field: field.name.clone(),
                });
            }
            for referenced in field.referenced_types() {
                if referenced != name && !self.is_type(referenced) {
                    return Err(ProtocolError::TypeNotFound(referenced.to_string()));
                }
            }
        }

        let mut definitions = Vec::new();
        let expressions = constraints
            .iter()
            .chain(actions.iter())
            .chain(fields.iter().filter_map(|f| f.is_present.as_ref()));
        for expression in expressions {
            definitions.extend(expression.collect_definitions());
        }

        let existing = self.types_by_name.get(name).copied();
        if let Some(i) = existing {
            match &self.types[i] {
                ProtocolType::Struct(s) if s.forward => {}
                ProtocolType::Struct(s) if s.same_layout(&fields, &constraints, &actions) => {
                    return Ok(&self.types[i]);
                }
                _ => return Err(ProtocolError::NamingConflict(name.to_string())),
            }
        }

        self.materialize(definitions)?;
        let defined = Struct {
            name: name.to_string(),
            fields,
            constraints,
            actions,
            forward: false,
        };
        match existing {
            Some(i) => {
                self.types[i] = ProtocolType::Struct(defined);
                Ok(&self.types[i])
            }
            None => Ok(self.push(ProtocolType::Struct(defined))),
        }
    }

    /// Register each definition unless an identical one already exists.
    pub fn materialize(&mut self, definitions: Vec<ProtocolType>) -> Result<(), ProtocolError> {
        for definition in definitions {
            self.register(definition)?;
        }
        Ok(())
    }

    /// Mark a registered struct as a PDU; any other name is `TypeNotFound`.
    pub fn define_pdu(&mut self, name: &str) -> Result<(), ProtocolError> {
        self.check_open()?;
        if self.get_struct(name).is_none() {
            return Err(ProtocolError::TypeNotFound(name.to_string()));
        }
        if !self.pdus.iter().any(|p| p == name) {
            self.pdus.push(name.to_string());
        }
        Ok(())
    }

    pub fn get_type(&self, name: &str) -> Result<&ProtocolType, ProtocolError> {
        self.types_by_name
            .get(name)
            .map(|&i| &self.types[i])
            .ok_or_else(|| ProtocolError::TypeNotFound(name.to_string()))
    }

    pub fn get_struct(&self, name: &str) -> Option<&Struct> {
        match self.get_type(name) {
            Ok(ProtocolType::Struct(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_type(&self, name: &str) -> bool {
        self.types_by_name.contains_key(name)
    }

    pub fn get_type_names(&self) -> Vec<&str> {
        self.types.iter().map(ProtocolType::name).collect()
    }

    pub fn get_pdu_names(&self) -> &[String] {
        &self.pdus
    }

    /// `base` if unused, else `base$N`.
    pub fn unique_type_name(&self, base: &str) -> String {
        names::unique(base, |n| self.is_type(n))
    }

    /// Traits of a type; a newtype has those of its base plus its own.
    pub fn traits_of(&self, name: &str) -> Result<Vec<Trait>, ProtocolError> {
        let mut traits = Vec::new();
        let mut current = self.get_type(name)?;
        let mut visited = HashSet::new();
        loop {
            traits.extend_from_slice(current.builtin_traits());
            match current {
                ProtocolType::NewType(t) if visited.insert(t.name.as_str()) => {
                    traits.extend_from_slice(&t.implements);
                    current = self.get_type(&t.derived_from)?;
                }
                _ => break,
            }
        }
        traits.sort();
        traits.dedup();
        Ok(traits)
    }

    pub fn has_method(&self, type_name: &str, method: &str) -> Result<bool, ProtocolError> {
        Ok(self
            .traits_of(type_name)?
            .iter()
            .any(|t| t.methods().contains(&method)))
    }

    /// Whether `ty` is a struct or array, or a newtype over one.
    fn is_aggregate(&self, ty: &ProtocolType) -> bool {
        let mut current = ty;
        let mut visited = HashSet::new();
        loop {
            match current {
                ProtocolType::Struct(_) | ProtocolType::Array(_) => return true,
                ProtocolType::NewType(t) if visited.insert(t.name.as_str()) => match self.get_type(&t.derived_from) {
                    Ok(base) => current = base,
                    Err(_) => return false,
                },
                _ => return false,
            }
        }
    }

    /// Drop aggregates (structs, arrays, and newtypes over them) not reachable
    /// from a PDU. Returns the removed names.
    pub fn retain_reachable(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.check_open()?;
        let mut reachable: HashSet<String> = HashSet::new();
        let mut queue: Vec<String> = self.pdus.clone();
        for ty in &self.types {
            if !self.is_aggregate(ty) {
                queue.push(ty.name().to_string());
            }
        }
        while let Some(name) = queue.pop() {
            if !reachable.insert(name.clone()) {
                continue;
            }
            if let Ok(ty) = self.get_type(&name) {
                queue.extend(ty.referenced_types().into_iter().map(str::to_string));
            }
        }

        let mut removed = Vec::new();
        self.types.retain(|ty| {
            let keep = reachable.contains(ty.name());
            if !keep {
                removed.push(ty.name().to_string());
            }
            keep
        });
        self.types_by_name = self
            .types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();
        Ok(removed)
    }
}
