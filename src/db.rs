use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;
use sqlair_core::Record;

use crate::cache::{self, SharedConn};
use crate::query::{Query, Target};
use crate::statement::Statement;
use crate::transaction::{Tx, TxOptions};
use crate::Result;

static NEXT_DB_ID: AtomicU64 = AtomicU64::new(0);

/// A database handle wrapping a driver connection.
///
/// Queries from any number of threads serialise on the connection; a
/// [`Statement`] used here for the first time is prepared on the driver
/// and the handle cached for subsequent calls.
#[derive(Debug)]
pub struct DB {
    conn: SharedConn,
    id: u64,
}

impl DB {
    pub fn new(conn: Connection) -> DB {
        // Engine statements are reused heavily; give the driver's own
        // statement cache room for them.
        conn.set_prepared_statement_cache_capacity(64);
        let conn = std::sync::Arc::new(Mutex::new(conn));
        let id = NEXT_DB_ID.fetch_add(1, Ordering::Relaxed);
        cache::register_db(id, &conn);
        DB { conn, id }
    }

    /// Builds a query from a prepared statement and its input arguments.
    /// Binding problems are carried inside the returned [`Query`] and
    /// surface when it runs.
    pub fn query<'a>(&'a self, stmt: &'a Statement, args: &[&dyn Record]) -> Query<'a> {
        Query::new(Target::Db(self), stmt, args)
    }

    /// Opens a transaction. The transaction holds the connection until it
    /// is committed, rolled back, or dropped.
    pub fn begin(&self, options: TxOptions) -> Result<Tx<'_>> {
        Tx::begin(self, options)
    }

    /// A handle that can interrupt any operation currently running on this
    /// database's connection, from another thread.
    pub fn interrupt_handle(&self) -> rusqlite::InterruptHandle {
        self.lock_conn().get_interrupt_handle()
    }

    pub(crate) fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        cache::release_db(self.id);
    }
}
