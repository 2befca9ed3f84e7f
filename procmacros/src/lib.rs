//! Derive macro for the sqlair template engine.
//!
//! `#[derive(Record)]` turns a named-field struct into a record type the
//! engine can bind to template references. Fields participate when tagged:
//!
//! ```ignore
//! #[derive(Record, Default)]
//! struct Person {
//!     #[db("id")]
//!     id: i64,
//!     #[db("name")]
//!     full_name: String,
//!     #[db("postcode,omitempty")]
//!     postcode: String,
//!     #[db(flatten)]
//!     address: Address,
//! }
//! ```
//!
//! Untagged fields are ignored. `#[db(flatten)]` promotes the tagged
//! members of a nested record into the outer type.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod record;

#[proc_macro_derive(Record, attributes(db))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
