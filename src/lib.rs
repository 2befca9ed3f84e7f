//! sqlair — a typed SQL template engine.
//!
//! SQL is extended with references that bind named record types to the
//! inputs and outputs of a query:
//!
//! ```text
//! SELECT p.* AS &Person.*, (a.district, a.street) AS &M.*
//! FROM   person AS p JOIN address AS a ON p.address_id = a.id
//! WHERE  p.name = $Person.name
//! ```
//!
//! [`Statement::prepare`] turns such a template into plain parameterised
//! SQL plus the plans that feed input records into the driver and scatter
//! result columns back into output records.
//!
//! ```no_run
//! use sqlair::{Record, Statement, TxOptions, DB, M};
//!
//! #[derive(Record, Default, Debug)]
//! struct Person {
//!     #[db("id")]
//!     id: i64,
//!     #[db("name")]
//!     name: String,
//!     #[db("postcode,omitempty")]
//!     postcode: String,
//! }
//!
//! fn main() -> sqlair::Result<()> {
//!     let conn = rusqlite::Connection::open_in_memory()?;
//!     let db = DB::new(conn);
//!
//!     let insert = Statement::prepare(
//!         "INSERT INTO person (*) VALUES ($Person.*)",
//!         &[&Person::default()],
//!     )?;
//!     let fred = Person { id: 30, name: "Fred".into(), postcode: "1000".into() };
//!     db.query(&insert, &[&fred]).run()?;
//!
//!     let select = Statement::prepare(
//!         "SELECT &Person.* FROM person WHERE id = $M.id",
//!         &[&Person::default(), &M::new()],
//!     )?;
//!     let mut person = Person::default();
//!     let id: M = [("id", 30i64)].into_iter().collect();
//!     db.query(&select, &[&id]).get(&mut [&mut person])?;
//!
//!     let mut tx = db.begin(TxOptions::default())?;
//!     tx.query(&insert, &[&fred]).run()?;
//!     tx.commit()?;
//!     Ok(())
//! }
//! ```

mod cache;
mod db;
mod query;
mod statement;
mod transaction;

pub use db::DB;
pub use query::{Outcome, Query, Rows, RowSet};
pub use statement::Statement;
pub use transaction::{Tx, TxBehavior, TxOptions};

pub use sqlair_core::{Error, FieldValue, Record, Result, Value, M};
pub use sqlair_core::{map_record, simple_record};
pub use sqlair_macros::Record;

/// Everything a typical caller needs.
pub mod prelude {
    pub use crate::{
        map_record, simple_record, Error, Outcome, Record, Result, Statement, TxBehavior,
        TxOptions, Value, DB, M,
    };
}

#[doc(hidden)]
pub fn cache_stats() -> (usize, usize) {
    cache::stats()
}
