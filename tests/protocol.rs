//! Registry tests: registration rules, struct validation, traits, pruning, and the
//! serialized form of the IR.

use rfcproto::protocol::{Protocol, ProtocolError, ProtocolType, StructField, Trait, Transform};
use rfcproto::Expression;

fn header_protocol() -> Protocol {
    let mut p = Protocol::new("Test");
    p.define_bitstring("BitString$4", Some(4)).expect("bits");
    let fields = vec![
        StructField::new("version", "BitString$4", None),
        StructField::new(
            "options",
            "BitString$4",
            Some(Expression::field("version").eq(Expression::int(6))),
        ),
    ];
    let constraints = vec![Expression::field("version").eq(Expression::typed_int(4, 2))];
    p.define_struct("Header", fields, constraints, Vec::new()).expect("struct");
    p
}

#[test]
fn test_bitstring_naming_conflict() {
    let mut p = Protocol::new("Test");
    p.define_bitstring("BitString$16", Some(16)).expect("first");
    p.define_bitstring("BitString$16", Some(16)).expect("same width");
    assert_eq!(
        p.define_bitstring("BitString$16", None),
        Err(ProtocolError::NamingConflict("BitString$16".to_string()))
    );
}

#[test]
fn test_struct_materializes_constant_types() {
    let p = header_protocol();
    assert_eq!(
        p.get_type_names(),
        vec!["BitString$4", "Int$4", "BitString$32", "Int$32", "Header"]
    );
    match p.get_type("Int$4").expect("int type") {
        ProtocolType::NewType(t) => assert_eq!(t.derived_from, "BitString$4"),
        other => panic!("expected newtype, got {:?}", other),
    }
}

#[test]
fn test_struct_definition_is_idempotent() {
    let mut p = header_protocol();
    let fields = p.get_struct("Header").expect("header").fields.clone();
    let constraints = p.get_struct("Header").expect("header").constraints.clone();
    p.define_struct("Header", fields, constraints, Vec::new()).expect("same layout");

    let err = p
        .define_struct("Header", vec![StructField::new("version", "BitString$4", None)], Vec::new(), Vec::new())
        .expect_err("different layout");
    assert_eq!(err, ProtocolError::NamingConflict("Header".to_string()));
}

#[test]
fn test_struct_validation() {
    let mut p = Protocol::new("Test");
    p.define_bitstring("BitString$8", Some(8)).expect("bits");

    assert_eq!(
        p.define_struct("S", vec![StructField::new("a", "Missing", None)], Vec::new(), Vec::new())
            .map(|_| ()),
        Err(ProtocolError::TypeNotFound("Missing".to_string()))
    );
    assert_eq!(
        p.define_struct(
            "S",
            vec![
                StructField::new("a", "BitString$8", None),
                StructField::new("a", "BitString$8", None),
            ],
            Vec::new(),
            Vec::new(),
        )
        .map(|_| ()),
        Err(ProtocolError::DuplicateField {
            structure: "S".to_string(),
            field: "a".to_string(),
        })
    );
    assert_eq!(
        p.define_struct("S", vec![StructField::new("Bad", "BitString$8", None)], Vec::new(), Vec::new())
            .map(|_| ()),
        Err(ProtocolError::InvalidName("Bad".to_string()))
    );
    assert_eq!(
        p.define_struct("lowercase", Vec::new(), Vec::new(), Vec::new()).map(|_| ()),
        Err(ProtocolError::InvalidName("lowercase".to_string()))
    );
}

#[test]
fn test_forward_declaration_allows_mutual_references() {
    let mut p = Protocol::new("Test");
    p.declare_struct("Ping").expect("declare ping");
    p.declare_struct("Pong").expect("declare pong");
    p.define_struct("Ping", vec![StructField::new("reply", "Pong", None)], Vec::new(), Vec::new())
        .expect("ping");
    assert!(p.get_struct("Pong").expect("pong").is_forward_declaration());
    p.define_struct("Pong", vec![StructField::new("request", "Ping", None)], Vec::new(), Vec::new())
        .expect("pong");
    assert!(!p.get_struct("Pong").expect("pong").is_forward_declaration());
    assert_eq!(p.get_type_names(), vec!["Ping", "Pong"]);
}

#[test]
fn test_define_pdu_checks_kind() {
    let mut p = header_protocol();
    assert_eq!(p.define_pdu("Nope"), Err(ProtocolError::TypeNotFound("Nope".to_string())));
    assert_eq!(
        p.define_pdu("BitString$4"),
        Err(ProtocolError::TypeNotFound("BitString$4".to_string()))
    );
    p.define_pdu("Header").expect("pdu");
    p.define_pdu("Header").expect("pdu twice");
    assert_eq!(p.get_pdu_names(), &["Header".to_string()]);
}

#[test]
fn test_transform_target_must_exist_and_stays_reachable() {
    let mut p = header_protocol();
    let length = |into: &str| {
        StructField::new("length", "BitString$4", None).with_transform(Transform::new("octets", into, "times_four"))
    };
    assert_eq!(
        p.define_struct("Trailer", vec![length("Octets")], Vec::new(), Vec::new()).map(|_| ()),
        Err(ProtocolError::TypeNotFound("Octets".to_string()))
    );

    p.define_struct("Octets", vec![StructField::new("count", "BitString$4", None)], Vec::new(), Vec::new())
        .expect("octets");
    p.define_struct("Trailer", vec![length("Octets")], Vec::new(), Vec::new())
        .expect("trailer");
    p.define_pdu("Trailer").expect("pdu");

    let removed = p.retain_reachable().expect("prune");
    assert_eq!(removed, vec!["Header".to_string()]);
    assert!(p.is_type("Octets"));

    let json = serde_json::to_value(&p).expect("serialize");
    let trailer = json["types"]
        .as_array()
        .and_then(|types| types.iter().find(|t| t["name"] == "Trailer"))
        .expect("trailer json");
    assert_eq!(trailer["fields"][0]["transform"]["into_name"], "octets");
    assert_eq!(trailer["fields"][0]["transform"]["into_type"], "Octets");
    assert_eq!(trailer["fields"][0]["transform"]["using"], "times_four");
}

#[test]
fn test_newtype_over_struct_is_pruned_with_it() {
    let mut p = header_protocol();
    p.define_newtype("Header$2", "Header", Vec::new()).expect("role");
    assert_eq!(p.retain_reachable().expect("prune"), vec!["Header".to_string(), "Header$2".to_string()]);

    let mut p = header_protocol();
    p.define_newtype("Header$2", "Header", Vec::new()).expect("role");
    p.define_struct("Outer", vec![StructField::new("inner", "Header$2", None)], Vec::new(), Vec::new())
        .expect("outer");
    p.define_pdu("Outer").expect("pdu");
    assert!(p.retain_reachable().expect("prune").is_empty());
    assert_eq!(p.traits_of("Header$2").expect("traits"), vec![Trait::Sized, Trait::Equality]);
}

#[test]
fn test_traits_follow_newtype_chain() {
    let p = header_protocol();
    assert_eq!(
        p.traits_of("Int$32").expect("traits"),
        vec![
            Trait::Value,
            Trait::Sized,
            Trait::Equality,
            Trait::Ordinal,
            Trait::ArithmeticOps,
            Trait::NumberRepresentable,
        ]
    );
    assert_eq!(p.has_method("Int$32", "lt"), Ok(true));
    assert_eq!(p.has_method("BitString$32", "lt"), Ok(false));
    assert_eq!(p.has_method("Header", "eq"), Ok(true));
}

#[test]
fn test_unique_type_name() {
    let p = header_protocol();
    assert_eq!(p.unique_type_name("Header"), "Header$2");
    assert_eq!(p.unique_type_name("Trailer"), "Trailer");
}

#[test]
fn test_retain_reachable_drops_orphans() {
    let mut p = header_protocol();
    p.define_struct("Orphan", vec![StructField::new("b", "BitString$4", None)], Vec::new(), Vec::new())
        .expect("orphan");
    p.define_array("Orphans", "Orphan", None).expect("array");
    p.define_pdu("Header").expect("pdu");

    let removed = p.retain_reachable().expect("prune");
    assert_eq!(removed, vec!["Orphan".to_string(), "Orphans".to_string()]);
    assert!(p.is_type("Header"));
    assert!(p.is_type("BitString$4"));
    assert_eq!(
        p.get_type("Orphan").map(|_| ()),
        Err(ProtocolError::TypeNotFound("Orphan".to_string()))
    );
}

#[test]
fn test_frozen_registry_rejects_changes() {
    let mut p = header_protocol();
    p.freeze();
    assert!(p.is_frozen());
    assert_eq!(
        p.define_bitstring("BitString$8", Some(8)).map(|_| ()),
        Err(ProtocolError::Frozen)
    );
    assert_eq!(p.declare_struct("Later"), Err(ProtocolError::Frozen));
}

#[test]
fn test_serialized_form_is_tagged() {
    let mut p = header_protocol();
    p.define_pdu("Header").expect("pdu");
    let json = serde_json::to_value(&p).expect("serialize");

    assert_eq!(json["name"], "Test");
    assert_eq!(json["pdus"][0], "Header");
    assert_eq!(json["types"][0]["construct"], "BitString");
    assert_eq!(json["types"][0]["width"], 4);
    assert_eq!(json["types"][1]["construct"], "NewType");

    let header = &json["types"][4];
    assert_eq!(header["construct"], "Struct");
    assert_eq!(header["fields"][1]["is_present"]["expression"], "MethodInvocation");

    let constraint = &header["constraints"][0];
    assert_eq!(constraint["expression"], "MethodInvocation");
    assert_eq!(constraint["method_name"], "eq");
    assert_eq!(constraint["target"]["expression"], "FieldAccess");
    assert_eq!(constraint["target"]["target"]["expression"], "This");
    assert_eq!(constraint["arguments"][0]["name"], "other");
    assert_eq!(constraint["arguments"][0]["value"]["constant_type"], "Int$4");
    assert_eq!(constraint["arguments"][0]["value"]["value"], 2);
}
