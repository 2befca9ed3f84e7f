//! Transactions over a held driver connection.

use std::sync::MutexGuard;

use rusqlite::Connection;
use sqlair_core::{sqlair_trace_tx, Error, Record};

use crate::db::DB;
use crate::query::{Query, Target};
use crate::statement::Statement;
use crate::Result;

/// How the driver acquires locks when the transaction begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxBehavior {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl TxBehavior {
    fn begin_sql(self) -> &'static str {
        match self {
            TxBehavior::Deferred => "BEGIN DEFERRED",
            TxBehavior::Immediate => "BEGIN IMMEDIATE",
            TxBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// Options for [`DB::begin`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub behavior: TxBehavior,
    /// Reject writes for the duration of the transaction.
    pub read_only: bool,
}

/// An open transaction. It holds the database's connection until it is
/// committed, rolled back, or dropped, so it is inherently single-task;
/// dropping it without a commit rolls back.
///
/// After [`commit`](Tx::commit) or [`rollback`](Tx::rollback) the
/// connection is released and every further operation fails with
/// [`Error::TxDone`].
pub struct Tx<'db> {
    db: &'db DB,
    // None once the transaction is done.
    guard: Option<MutexGuard<'db, Connection>>,
    read_only: bool,
}

impl<'db> Tx<'db> {
    pub(crate) fn begin(db: &'db DB, options: TxOptions) -> Result<Tx<'db>> {
        let guard = db.lock_conn();
        guard.execute_batch(options.behavior.begin_sql())?;
        if options.read_only {
            if let Err(e) = guard.pragma_update(None, "query_only", true) {
                let _ = guard.execute_batch("ROLLBACK");
                return Err(e.into());
            }
        }
        sqlair_trace_tx!("begin");
        Ok(Tx {
            db,
            guard: Some(guard),
            read_only: options.read_only,
        })
    }

    /// Builds a query running inside this transaction.
    pub fn query<'q>(&'q self, stmt: &'q Statement, args: &[&dyn Record]) -> Query<'q> {
        match &self.guard {
            Some(guard) => Query::new(
                Target::Tx {
                    conn: &**guard,
                    db_id: self.db.id(),
                },
                stmt,
                args,
            ),
            None => Query::failed(Target::Db(self.db), stmt, Error::TxDone),
        }
    }

    /// Ends the transaction with `sql` and releases the connection.
    fn finish(&mut self, sql: &str) -> Result<()> {
        let Some(guard) = self.guard.take() else {
            return Err(Error::TxDone);
        };
        guard.execute_batch(sql)?;
        if self.read_only {
            guard.pragma_update(None, "query_only", false)?;
        }
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT")?;
        sqlair_trace_tx!("commit");
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.finish("ROLLBACK")?;
        sqlair_trace_tx!("rollback");
        Ok(())
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            let _ = guard.execute_batch("ROLLBACK");
            if self.read_only {
                let _ = guard.pragma_update(None, "query_only", false);
            }
        }
    }
}
