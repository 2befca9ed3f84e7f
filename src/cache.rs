//! The statement/database cache registry.
//!
//! Driver-level prepared handles live in each connection's own statement
//! cache, keyed by SQL text. This registry keeps the two cross tables —
//! which databases a statement has been prepared on, and which statements
//! a database carries — so that dropping either side can release the
//! cached driver handles on the other. Both release paths are idempotent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};

use rusqlite::Connection;

pub(crate) type SharedConn = Arc<Mutex<Connection>>;

#[derive(Default)]
struct Registry {
    stmt_dbs: HashMap<u64, HashSet<u64>>,
    db_stmts: HashMap<u64, HashSet<u64>>,
    db_conns: HashMap<u64, Weak<Mutex<Connection>>>,
    stmt_sql: HashMap<u64, String>,
}

static REGISTRY: LazyLock<Mutex<Registry>> = LazyLock::new(Mutex::default);

fn registry() -> MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn register_db(db_id: u64, conn: &SharedConn) {
    let mut r = registry();
    r.db_conns.insert(db_id, Arc::downgrade(conn));
    r.db_stmts.entry(db_id).or_default();
}

/// Records that `stmt_id` has a driver-prepared handle on `db_id`.
pub(crate) fn note_use(stmt_id: u64, sql: &str, db_id: u64) {
    let mut r = registry();
    r.stmt_sql
        .entry(stmt_id)
        .or_insert_with(|| sql.to_string());
    r.stmt_dbs.entry(stmt_id).or_default().insert(db_id);
    r.db_stmts.entry(db_id).or_default().insert(stmt_id);
}

/// Drops the statement's rows from both tables and discards its cached
/// driver handle on every database that is still alive.
pub(crate) fn release_statement(stmt_id: u64) {
    // Snapshot the live connections, then release them outside the
    // registry lock: discarding takes each connection's own lock.
    let (connections, sql) = {
        let mut r = registry();
        let sql = r.stmt_sql.remove(&stmt_id);
        let dbs = r.stmt_dbs.remove(&stmt_id).unwrap_or_default();
        let mut connections = Vec::new();
        for db_id in dbs {
            if let Some(stmts) = r.db_stmts.get_mut(&db_id) {
                stmts.remove(&stmt_id);
            }
            if let Some(conn) = r.db_conns.get(&db_id).and_then(Weak::upgrade) {
                connections.push(conn);
            }
        }
        (connections, sql)
    };
    let Some(sql) = sql else { return };
    for conn in connections {
        let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
        let prepared = guard.prepare_cached(&sql);
        if let Ok(stmt) = prepared {
            stmt.discard();
        }
    }
}

/// Forgets a database. Its connection owns the cached handles, so dropping
/// the connection closes them; only the bookkeeping needs removing here.
pub(crate) fn release_db(db_id: u64) {
    let mut r = registry();
    r.db_conns.remove(&db_id);
    if let Some(stmts) = r.db_stmts.remove(&db_id) {
        for stmt_id in stmts {
            if let Some(dbs) = r.stmt_dbs.get_mut(&stmt_id) {
                dbs.remove(&db_id);
            }
        }
    }
}

/// (tracked statements, tracked databases) — exposed for tests.
pub(crate) fn stats() -> (usize, usize) {
    let r = registry();
    (r.stmt_dbs.len(), r.db_conns.len())
}
