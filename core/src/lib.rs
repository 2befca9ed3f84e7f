//! Core of the sqlair typed SQL template engine.
//!
//! SQL templates carry two extensions: `$Type.member` input references and
//! `&Type.member` output references. This crate parses them, describes the
//! user types they refer to, prepares templates into parameterised SQL
//! with bind and scan plans, and moves values between user records and the
//! driver. The driver-facing query surface lives in the `sqlair` facade
//! crate.

// Lets code generated by the derive macro refer to `::sqlair_core` from
// inside this crate's own tests.
extern crate self as sqlair_core;

pub mod bind;
pub mod error;
pub mod parser;
pub mod prepare;
pub mod scan;
pub mod tracing;
pub mod typeinfo;
pub mod value;

pub use bind::{bind_args, NamedArg};
pub use error::{Error, Result};
pub use parser::{FullName, ParsedExpr, Parser, QueryPart};
pub use prepare::{
    input_name, marker_index, marker_name, prepare, PreparedStatement, INPUT_PREFIX,
    OUTPUT_PREFIX,
};
pub use scan::{plan_row, scan_row, RowPlan};
pub use typeinfo::{
    clear_type_cache, convert_probe, parse_tag, type_info, Introspect, Member, MemberKind,
    Record, Shape, TaggedField, TypeInfo, TypeKind, M, SIMPLE_MEMBER,
};
pub use value::{FieldValue, Value};
