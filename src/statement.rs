use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sqlair_core::{prepare, Parser, PreparedStatement, Record, Result};

use crate::cache;

static NEXT_STATEMENT_ID: AtomicU64 = AtomicU64::new(0);

/// A prepared template: parsed, checked against its types, and rewritten
/// into driver SQL. Preparing touches no database; driver-side preparation
/// happens lazily on first use against each [`DB`](crate::DB) and is
/// cached per (statement, database) pair.
///
/// Statements are immutable and may be shared freely between threads.
#[derive(Debug)]
pub struct Statement {
    inner: Arc<PreparedStatement>,
    id: u64,
}

impl Statement {
    /// Parses `template` and prepares it against the supplied sample
    /// values, one per type the template references.
    ///
    /// ```no_run
    /// # use sqlair::{Statement, Record, M};
    /// #[derive(Record, Default)]
    /// struct Person {
    ///     #[db("id")]
    ///     id: i64,
    ///     #[db("name")]
    ///     name: String,
    /// }
    ///
    /// let stmt = Statement::prepare(
    ///     "SELECT &Person.* FROM person WHERE id = $M.id",
    ///     &[&Person::default(), &M::new()],
    /// )?;
    /// # Ok::<(), sqlair::Error>(())
    /// ```
    pub fn prepare(template: &str, samples: &[&dyn Record]) -> Result<Statement> {
        let parsed = Parser::new().parse(template)?;
        let prepared = prepare(&parsed, samples)?;
        Ok(Statement {
            inner: Arc::new(prepared),
            id: NEXT_STATEMENT_ID.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// The rewritten SQL sent to the driver.
    pub fn sql(&self) -> &str {
        self.inner.sql()
    }

    pub(crate) fn prepared(&self) -> &Arc<PreparedStatement> {
        &self.inner
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

/// Statements prepared from the same template and type set compare equal.
impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        cache::release_statement(self.id);
    }
}
