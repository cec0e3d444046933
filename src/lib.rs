//! # rfcproto: protocol IR from RFC-style packet diagrams
//!
//! Reads a protocol document (numbered sections holding ASCII packet diagrams and
//! field descriptions) and builds a typed protocol description: bitstrings, newtypes,
//! structs with presence conditions and constraints, arrays, enums, and the set of
//! PDUs.
//!
//! ## Pipeline
//!
//! - [`loader`]: plain text to a [`Document`] tree of sections, paragraphs, and figures
//! - [`classify`]: decide whether a section is a structure section and split its zones
//! - [`parser`]: PEST grammar for diagrams, field titles, directives, and conditions
//! - [`reconcile`]: merge diagram fields with textual descriptions
//! - [`assemble`]: two-pass assembly into the [`Protocol`] registry
//!
//! ## Structure section
//!
//! ```text
//! 3.1.  Header Format
//!
//!    This structure is a PDU.
//!
//!     0                   1
//!     0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!    |Version|  Type |    Length     |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//!    where:
//!
//!    Version: 4 bits
//!
//!       This field must be set to 2.
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use rfcproto::{assemble, load_file, AssemblerOptions};
//!
//! let document = load_file("draft.txt")?;
//! let (protocol, report) = assemble(&document, AssemblerOptions::default())?;
//! for diagnostic in &report.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//! println!("{} types, PDUs: {:?}", protocol.types().len(), protocol.get_pdu_names());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod assemble;
pub mod classify;
pub mod diagnostics;
pub mod dom;
pub mod expr;
pub mod extract;
pub mod fields;
pub mod loader;
pub mod names;
pub mod parser;
pub mod protocol;
pub mod reconcile;

pub use assemble::{assemble, AssembleError, Assembler, AssemblerOptions, AssemblyReport, ReferenceOrder, SectionRecord};
pub use classify::{classify, Unclassified, Zones};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use dom::{Document, Figure, Node, Paragraph, Section};
pub use expr::{ConstantType, Expression};
pub use extract::{extract_section, ExtractError, SectionParts};
pub use fields::{DiagramField, Field, FieldWidth, InconsistentData, RelLoc, TextField};
pub use loader::{load_file, load_str, LoadError};
pub use parser::ParseFailure;
pub use protocol::{Protocol, ProtocolError, ProtocolType, StructField, Trait, Transform};
pub use reconcile::{reconcile, MergePolicy, ReconcileError, Reconciler};
