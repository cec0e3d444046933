//! End-to-end assembly tests: documents built in memory or loaded from text,
//! assembled into a protocol registry.

use rfcproto::diagnostics::Severity;
use rfcproto::dom::{Document, Figure, Paragraph, Section};
use rfcproto::protocol::ProtocolType;
use rfcproto::{assemble, load_file, AssembleError, AssemblerOptions, Protocol, ReferenceOrder};
use std::io::Write;

const VH_DIAGRAM: &str = r#"
   +-+-+-+-+
   |   V   |
   +-+-+-+-+
   :   H   :
   +-+-+-+-+
"#;

const KIND_PAYLOAD_DIAGRAM: &str = r#"
   +-+-+-+-+-+-+-+-+
   |     Kind      |
   +-+-+-+-+-+-+-+-+
   :    Payload    :
   +-+-+-+-+-+-+-+-+
"#;

const KIND_VALUE_DIAGRAM: &str = r#"
   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
   |     Kind      |     Value     |
   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
"#;

const TOY_PROTOCOL: &str = "Toy Protocol

1.  Introduction

   This document describes the toy protocol.

2.  Message Format

   This structure is a PDU.

    0                   1
    0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
   |Version|  Typ  |    Length     |
   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
   :             Body              :
   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

   Figure 1: Message

   where:

   Version: 4 bits

      This field MUST be set to 2.

   Type (Typ): 4 bits

      The value of this field MUST be less than 9.

   Length: 8 bits

      Length of the body in octets.

   Body: variable

      This field is present only if Typ is 1.
";

fn empty_body() -> Paragraph {
    Paragraph::list::<&str>(&[])
}

fn described(section: Section, title: &str, body: &[&str]) -> Section {
    section.with(Paragraph::text(title)).with(Paragraph::list(body))
}

fn vh_section(pdu: bool) -> Section {
    let mut section = Section::new("1", "Simple Header");
    if pdu {
        section = section.with(Paragraph::text("This structure is a PDU."));
    }
    section
        .with(Figure::artwork(VH_DIAGRAM))
        .with(Paragraph::text("V: 4 bits"))
        .with(empty_body())
        .with(Paragraph::text("H: variable"))
        .with(empty_body())
}

fn field_types(protocol: &Protocol, name: &str) -> Vec<(String, String)> {
    protocol
        .get_struct(name)
        .unwrap_or_else(|| panic!("struct {} missing", name))
        .fields
        .iter()
        .map(|f| (f.name.clone(), f.field_type.clone()))
        .collect()
}

fn pair(name: &str, ty: &str) -> (String, String) {
    (name.to_string(), ty.to_string())
}

#[test]
fn test_diagram_and_titles_make_a_struct() {
    let doc = Document::new("Test Protocol").with_section(vh_section(true));
    let (protocol, report) = assemble(&doc, AssemblerOptions::default()).expect("assemble");

    assert_eq!(protocol.name(), "TestProtocol");
    assert!(protocol.is_frozen());
    assert_eq!(
        field_types(&protocol, "SimpleHeader"),
        vec![pair("v", "BitString$4"), pair("h", "BitString$var")]
    );
    let header = protocol.get_struct("SimpleHeader").expect("struct");
    assert!(header.constraints.is_empty());
    assert!(header.fields.iter().all(|f| f.is_present.is_none()));

    match protocol.get_type("BitString$var").expect("variable bitstring") {
        ProtocolType::BitString(b) => assert_eq!(b.width, None),
        other => panic!("expected bitstring, got {:?}", other),
    }
    assert_eq!(protocol.get_pdu_names(), &["SimpleHeader".to_string()]);
    assert!(report.diagnostics.is_empty());
    assert_eq!(report.collected, vec!["SimpleHeader".to_string()]);
    assert!(report.pruned.is_empty());
}

#[test]
fn test_loaded_document_carries_constraints_and_presence() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(TOY_PROTOCOL.as_bytes()).expect("write");
    let doc = load_file(file.path()).expect("load");
    assert_eq!(doc.title, "Toy Protocol");

    let (protocol, report) = assemble(&doc, AssemblerOptions::default()).expect("assemble");
    assert_eq!(protocol.name(), "ToyProtocol");
    assert_eq!(
        field_types(&protocol, "MessageFormat"),
        vec![
            pair("version", "BitString$4"),
            pair("type", "BitString$4"),
            pair("length", "BitString$8"),
            pair("body", "BitString$var"),
        ]
    );

    let message = protocol.get_struct("MessageFormat").expect("struct");
    let constraints: Vec<String> = message.constraints.iter().map(|c| c.render()).collect();
    assert_eq!(constraints, vec!["version.eq(2)", "type.lt(9)"]);
    assert_eq!(
        message.field("body").and_then(|f| f.is_present.as_ref()).map(|c| c.render()),
        Some("type.eq(1)".to_string())
    );
    assert!(protocol.is_type("Int$4"));
    assert!(protocol.is_type("Int$32"));
    assert!(report.diagnostics.is_empty());
}

#[test]
fn test_forward_reference_needs_topological_order() {
    let packet = described(
        described(
            Section::new("1", "Packet")
                .with(Paragraph::text("This structure is a PDU."))
                .with(Figure::artwork(KIND_PAYLOAD_DIAGRAM)),
            "Kind: 8 bits",
            &[],
        ),
        "Payload: see Section 2",
        &[],
    );
    let payload = described(
        Section::new("2", "Payload Header").with(Figure::artwork(
            "+-+-+-+-+-+-+-+-+\n|    Length     |\n+-+-+-+-+-+-+-+-+",
        )),
        "Length: 8 bits",
        &[],
    );
    let doc = Document::new("Refs").with_section(packet).with_section(payload);

    let err = assemble(&doc, AssemblerOptions::default()).expect_err("forward reference");
    assert_eq!(
        err,
        AssembleError::SectionReferenceNotFound {
            section: "2".to_string(),
            from: "1".to_string(),
        }
    );

    let options = AssemblerOptions::default().reference_order(ReferenceOrder::Topological);
    let (protocol, report) = assemble(&doc, options).expect("topological");
    assert_eq!(
        field_types(&protocol, "Packet"),
        vec![pair("kind", "BitString$8"), pair("payload", "PayloadHeader")]
    );
    assert!(protocol.get_struct("PayloadHeader").is_some());
    assert!(report.pruned.is_empty());
}

#[test]
fn test_repeated_reference_becomes_uniquely_named_array() {
    let options = described(
        Section::new("1", "Options").with(Figure::artwork(
            "+-+-+-+-+-+-+-+-+\n|     Code      |\n+-+-+-+-+-+-+-+-+",
        )),
        "Code: 8 bits",
        &[],
    );
    let datagram = described(
        described(
            Section::new("2", "Datagram")
                .with(Paragraph::text("This structure is a PDU."))
                .with(Figure::artwork(KIND_PAYLOAD_DIAGRAM.replace("Payload", "Options").as_str())),
            "Kind: 8 bits",
            &[],
        ),
        "Options: zero or more Section 1",
        &[],
    );
    let doc = Document::new("Arrays").with_section(options).with_section(datagram);

    let (protocol, _) = assemble(&doc, AssemblerOptions::default()).expect("assemble");
    assert_eq!(
        field_types(&protocol, "Datagram"),
        vec![pair("kind", "BitString$8"), pair("options", "Options$2")]
    );
    match protocol.get_type("Options$2").expect("array") {
        ProtocolType::Array(a) => {
            assert_eq!(a.element_type, "Options");
            assert_eq!(a.length, None);
        }
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn test_struct_in_two_roles_gets_a_role_type() {
    let address = described(
        Section::new("1", "Address").with(Figure::artwork(
            "+-+-+-+-+-+-+-+-+\n|     Host      |\n+-+-+-+-+-+-+-+-+",
        )),
        "Host: 8 bits",
        &[],
    );
    let packet = described(
        described(
            Section::new("2", "Packet")
                .with(Paragraph::text("This structure is a PDU."))
                .with(Figure::artwork(
                    KIND_VALUE_DIAGRAM.replace("Kind", "Src ").replace("Value", " Dst ").as_str(),
                )),
            "Src: see Section 1",
            &[],
        ),
        "Dst: see Section 1",
        &[],
    );
    let doc = Document::new("Roles").with_section(address).with_section(packet);

    let (protocol, report) = assemble(&doc, AssemblerOptions::default()).expect("assemble");
    assert_eq!(
        field_types(&protocol, "Packet"),
        vec![pair("src", "Address"), pair("dst", "Address$2")]
    );
    match protocol.get_type("Address$2").expect("role type") {
        ProtocolType::NewType(t) => assert_eq!(t.derived_from, "Address"),
        other => panic!("expected newtype, got {:?}", other),
    }
    assert!(report.pruned.is_empty());

    let notes: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Info)
        .collect();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].field.as_deref(), Some("dst"));
}

#[test]
fn test_borrowed_descriptions_skip_values() {
    let request = described(
        described(
            Section::new("1", "Request")
                .with(Paragraph::text("This structure is a PDU."))
                .with(Figure::artwork(KIND_VALUE_DIAGRAM)),
            "Kind: 8 bits",
            &["This field MUST be set to 3."],
        ),
        "Value: 8 bits",
        &["The value of this field MUST be less than 100."],
    );
    let response = Section::new("2", "Response")
        .with(Paragraph::text(
            "This structure is a PDU. The fields of this structure are described in Section 1.",
        ))
        .with(Figure::artwork(KIND_VALUE_DIAGRAM));
    let doc = Document::new("Borrowing").with_section(request).with_section(response);

    let (protocol, _) = assemble(&doc, AssemblerOptions::default()).expect("assemble");
    let render = |name: &str| -> Vec<String> {
        protocol
            .get_struct(name)
            .expect("struct")
            .constraints
            .iter()
            .map(|c| c.render())
            .collect()
    };
    assert_eq!(render("Request"), vec!["kind.eq(3)", "value.lt(100)"]);
    assert_eq!(render("Response"), vec!["value.lt(100)"]);
    assert_eq!(protocol.get_pdu_names(), &["Request".to_string(), "Response".to_string()]);
}

#[test]
fn test_broken_section_is_reported_and_skipped() {
    let broken = described(
        Section::new("2", "Broken").with(Figure::artwork(KIND_VALUE_DIAGRAM)),
        "Checksum: 16 bits",
        &[],
    );
    let doc = Document::new("Partial").with_section(vh_section(true)).with_section(broken);

    let (protocol, report) = assemble(&doc, AssemblerOptions::default()).expect("assemble");
    assert!(protocol.get_struct("SimpleHeader").is_some());
    assert!(protocol.get_struct("Broken").is_none());
    assert_eq!(report.collected, vec!["SimpleHeader".to_string()]);

    let errors: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].section.as_deref(), Some("2"));
}

#[test]
fn test_without_pdu_everything_is_pruned() {
    let doc = Document::new("Loose").with_section(vh_section(false));

    let (protocol, report) = assemble(&doc, AssemblerOptions::default()).expect("assemble");
    assert_eq!(report.pruned, vec!["SimpleHeader".to_string()]);
    assert_eq!(protocol.get_type_names(), vec!["BitString$4", "BitString$var"]);
    assert!(report.diagnostics.iter().any(|d| d.severity == Severity::Warning));

    let options = AssemblerOptions::default().prune_unreachable(false);
    let (protocol, report) = assemble(&doc, options).expect("assemble");
    assert!(protocol.get_struct("SimpleHeader").is_some());
    assert!(report.pruned.is_empty());
}

#[test]
fn test_generic_types_and_pdu_enum() {
    let doc = Document::new("Options").with_section(vh_section(true));
    let options = AssemblerOptions::default().generic_type_per_field(true).pdu_enum(true);

    let (protocol, _) = assemble(&doc, options).expect("assemble");
    assert_eq!(
        field_types(&protocol, "SimpleHeader"),
        vec![pair("v", "G$v$4"), pair("h", "G$h$var")]
    );
    match protocol.get_type("PDUs").expect("enum") {
        ProtocolType::Enum(e) => {
            let variants: Vec<&str> = e.variants.iter().map(|v| v.name.as_str()).collect();
            assert_eq!(variants, vec!["SimpleHeader"]);
        }
        other => panic!("expected enum, got {:?}", other),
    }
}
