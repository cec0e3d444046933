//! Expression algebra used for field presence conditions and struct constraints.
//!
//! Expressions are immutable trees. Binary operators are method invocations on the
//! left operand with the right operand passed as the argument named `other`, so
//! `version == 2` is `version.eq(2)`.

use crate::protocol::{BitString, NewType, ProtocolType, Trait};
use serde::{Serialize, Serializer};
use std::fmt;

/// Width used for integer constants that carry no better width.
pub const DEFAULT_INT_WIDTH: u64 = 32;

/// Infix spelling of the binary methods.
const INFIX_OPERATORS: &[(&str, &str)] = &[
    ("eq", "=="),
    ("ne", "!="),
    ("lt", "<"),
    ("le", "<="),
    ("gt", ">"),
    ("ge", ">="),
    ("and", "&&"),
    ("or", "||"),
    ("plus", "+"),
    ("minus", "-"),
    ("multiply", "*"),
    ("divide", "/"),
    ("modulo", "%"),
];

pub fn infix_operator(method: &str) -> Option<&'static str> {
    INFIX_OPERATORS
        .iter()
        .find(|(m, _)| *m == method)
        .map(|(_, op)| *op)
}

/// Type carried by a constant. Serializes as its registry type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantType {
    Int { width: u64 },
    Boolean,
}

impl ConstantType {
    pub fn type_name(&self) -> String {
        match self {
            ConstantType::Int { width } => format!("Int${}", width),
            ConstantType::Boolean => "Boolean".to_string(),
        }
    }

    /// Primitive registry types this constant type needs.
    pub fn definitions(&self) -> Vec<ProtocolType> {
        match self {
            ConstantType::Int { width } => {
                let bits = format!("BitString${}", width);
                vec![
                    ProtocolType::BitString(BitString::new(&bits, Some(*width))),
                    ProtocolType::NewType(NewType::new(
                        &self.type_name(),
                        &bits,
                        vec![Trait::Ordinal, Trait::ArithmeticOps],
                    )),
                ]
            }
            ConstantType::Boolean => vec![
                ProtocolType::BitString(BitString::new("BitString$1", Some(1))),
                ProtocolType::NewType(NewType::new("Boolean", "BitString$1", vec![Trait::BooleanOps])),
            ],
        }
    }
}

impl Serialize for ConstantType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.type_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// A named argument of a method invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentExpression {
    pub name: String,
    pub value: Box<Expression>,
}

impl ArgumentExpression {
    pub fn new(name: &str, value: Expression) -> Self {
        ArgumentExpression {
            name: name.to_string(),
            value: Box::new(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "expression")]
pub enum Expression {
    Constant {
        constant_type: ConstantType,
        value: Literal,
    },
    This,
    FieldAccess {
        target: Box<Expression>,
        field_name: String,
    },
    MethodInvocation {
        target: Box<Expression>,
        method_name: String,
        arguments: Vec<ArgumentExpression>,
    },
    IfElse {
        condition: Box<Expression>,
        if_true: Box<Expression>,
        if_false: Box<Expression>,
    },
    Argument(ArgumentExpression),
}

impl Expression {
    pub fn this() -> Self {
        Expression::This
    }

    /// Access of a field of the enclosing struct.
    pub fn field(name: &str) -> Self {
        Expression::FieldAccess {
            target: Box::new(Expression::This),
            field_name: name.to_string(),
        }
    }

    pub fn int(value: i64) -> Self {
        Self::typed_int(DEFAULT_INT_WIDTH, value)
    }

    pub fn typed_int(width: u64, value: i64) -> Self {
        Expression::Constant {
            constant_type: ConstantType::Int { width },
            value: Literal::Int(value),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Constant {
            constant_type: ConstantType::Boolean,
            value: Literal::Bool(value),
        }
    }

    pub fn method(target: Expression, method_name: &str, arguments: Vec<ArgumentExpression>) -> Self {
        Expression::MethodInvocation {
            target: Box::new(target),
            method_name: method_name.to_string(),
            arguments,
        }
    }

    pub fn binary(lhs: Expression, method_name: &str, rhs: Expression) -> Self {
        Self::method(lhs, method_name, vec![ArgumentExpression::new("other", rhs)])
    }

    pub fn if_else(condition: Expression, if_true: Expression, if_false: Expression) -> Self {
        Expression::IfElse {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    pub fn eq(self, rhs: Expression) -> Self {
        Self::binary(self, "eq", rhs)
    }

    pub fn and(self, rhs: Expression) -> Self {
        Self::binary(self, "and", rhs)
    }

    /// Pre-order traversal.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expression)) {
        f(self);
        match self {
            Expression::Constant { .. } | Expression::This => {}
            Expression::FieldAccess { target, .. } => target.visit(f),
            Expression::MethodInvocation { target, arguments, .. } => {
                target.visit(f);
                for arg in arguments {
                    arg.value.visit(f);
                }
            }
            Expression::IfElse {
                condition,
                if_true,
                if_false,
            } => {
                condition.visit(f);
                if_true.visit(f);
                if_false.visit(f);
            }
            Expression::Argument(arg) => arg.value.visit(f),
        }
    }

    /// Primitive types (bitstrings and integer newtypes) the constants of this tree need,
    /// deduplicated by name in first-use order.
    pub fn collect_definitions(&self) -> Vec<ProtocolType> {
        let mut out: Vec<ProtocolType> = Vec::new();
        self.visit(&mut |e| {
            if let Expression::Constant { constant_type, .. } = e {
                for def in constant_type.definitions() {
                    if !out.iter().any(|d| d.name() == def.name()) {
                        out.push(def);
                    }
                }
            }
        });
        out
    }

    /// Names of the fields of the enclosing struct this tree reads.
    pub fn collect_field_names(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        self.visit(&mut |e| {
            if let Expression::FieldAccess { target, field_name } = e {
                if **target == Expression::This && !out.contains(field_name) {
                    out.push(field_name.clone());
                }
            }
        });
        out
    }

    /// Rename accesses to fields of the enclosing struct; `rename` returns `None` to keep a name.
    pub fn map_field_names(&mut self, rename: &impl Fn(&str) -> Option<String>) {
        match self {
            Expression::Constant { .. } | Expression::This => {}
            Expression::FieldAccess { target, field_name } => {
                if **target == Expression::This {
                    if let Some(new_name) = rename(field_name) {
                        *field_name = new_name;
                    }
                } else {
                    target.map_field_names(rename);
                }
            }
            Expression::MethodInvocation { target, arguments, .. } => {
                target.map_field_names(rename);
                for arg in arguments {
                    arg.value.map_field_names(rename);
                }
            }
            Expression::IfElse {
                condition,
                if_true,
                if_false,
            } => {
                condition.map_field_names(rename);
                if_true.map_field_names(rename);
                if_false.map_field_names(rename);
            }
            Expression::Argument(arg) => arg.value.map_field_names(rename),
        }
    }

    /// Method-call notation, e.g. `version.eq(2)`.
    pub fn render(&self) -> String {
        match self {
            Expression::Constant { value, .. } => value.to_string(),
            Expression::This => "self".to_string(),
            Expression::FieldAccess { target, field_name } => match **target {
                Expression::This => field_name.clone(),
                _ => format!("{}.{}", target.render(), field_name),
            },
            Expression::MethodInvocation {
                target,
                method_name,
                arguments,
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.value.render()).collect();
                format!("{}.{}({})", target.render(), method_name, args.join(", "))
            }
            Expression::IfElse {
                condition,
                if_true,
                if_false,
            } => format!(
                "if_else({}, {}, {})",
                condition.render(),
                if_true.render(),
                if_false.render()
            ),
            Expression::Argument(arg) => format!("{}={}", arg.name, arg.value.render()),
        }
    }

    /// Infix notation for the known binary methods, e.g. `version == 2`.
    /// Unknown methods keep the dotted call form.
    pub fn render_infix(&self) -> String {
        self.infix(false)
    }

    fn infix(&self, nested: bool) -> String {
        match self {
            Expression::MethodInvocation {
                target,
                method_name,
                arguments,
            } => {
                if let (Some(op), [arg]) = (infix_operator(method_name), arguments.as_slice()) {
                    let s = format!("{} {} {}", target.infix(true), op, arg.value.infix(true));
                    return if nested { format!("({})", s) } else { s };
                }
                if method_name == "not" && arguments.is_empty() {
                    return format!("!{}", target.infix(true));
                }
                let args: Vec<String> = arguments.iter().map(|a| a.value.infix(false)).collect();
                format!("{}.{}({})", target.infix(true), method_name, args.join(", "))
            }
            Expression::FieldAccess { target, field_name } => match **target {
                Expression::This => field_name.clone(),
                _ => format!("{}.{}", target.infix(true), field_name),
            },
            Expression::IfElse {
                condition,
                if_true,
                if_false,
            } => {
                let s = format!(
                    "if {} then {} else {}",
                    condition.infix(false),
                    if_true.infix(false),
                    if_false.infix(false)
                );
                if nested {
                    format!("({})", s)
                } else {
                    s
                }
            }
            Expression::Argument(arg) => format!("{}={}", arg.name, arg.value.infix(false)),
            Expression::Constant { .. } | Expression::This => self.render(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_method_and_infix() {
        let e = Expression::field("version").eq(Expression::int(2));
        assert_eq!(e.render(), "version.eq(2)");
        assert_eq!(e.render_infix(), "version == 2");
        assert_eq!(e.to_string(), "version.eq(2)");
    }

    #[test]
    fn nested_infix_is_parenthesised() {
        let e = Expression::field("a")
            .eq(Expression::int(1))
            .and(Expression::field("b").eq(Expression::int(2)));
        assert_eq!(e.render_infix(), "(a == 1) && (b == 2)");
        assert_eq!(e.render(), "a.eq(1).and(b.eq(2))");
    }

    #[test]
    fn unknown_method_keeps_call_form() {
        let e = Expression::method(Expression::field("len"), "to_integer", vec![]);
        assert_eq!(e.render_infix(), "len.to_integer()");
        let this = Expression::this();
        assert_eq!(this.render(), "self");
    }

    #[test]
    fn definitions_are_deduplicated() {
        let e = Expression::field("a")
            .eq(Expression::int(1))
            .and(Expression::field("b").eq(Expression::int(7)));
        let names: Vec<String> = e
            .collect_definitions()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["BitString$32", "Int$32"]);
    }

    #[test]
    fn field_names_collected_and_mapped() {
        let mut e = Expression::field("hl").eq(Expression::field("kind"));
        assert_eq!(e.collect_field_names(), vec!["hl", "kind"]);
        e.map_field_names(&|n| (n == "hl").then(|| "header_length".to_string()));
        assert_eq!(e.render(), "header_length.eq(kind)");
    }
}
