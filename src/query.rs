//! Query execution: binding, driver round trips, and row iteration.

use std::sync::Arc;

use rusqlite::Connection;
use sqlair_core::{
    bind_args, plan_row, scan_row, Error, NamedArg, PreparedStatement, Record, Value,
};

use sqlair_core::sqlair_trace_query;

use crate::cache;
use crate::db::DB;
use crate::statement::Statement;
use crate::Result;

/// Driver-side results of an exec-style query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    rows_affected: u64,
    last_insert_id: i64,
}

impl Outcome {
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }
}

/// Where a query executes: a shared database or a held transaction
/// connection.
pub(crate) enum Target<'a> {
    Db(&'a DB),
    Tx { conn: &'a Connection, db_id: u64 },
}

impl<'a> Target<'a> {
    fn db_id(&self) -> u64 {
        match self {
            Target::Db(db) => db.id(),
            Target::Tx { db_id, .. } => *db_id,
        }
    }

    fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        match self {
            Target::Db(db) => {
                let guard = db.lock_conn();
                f(&guard)
            }
            Target::Tx { conn, .. } => f(conn),
        }
    }
}

/// A bound query, ready to execute. Errors from binding are carried here
/// and surface when the query runs.
pub struct Query<'a> {
    target: Target<'a>,
    stmt: &'a Statement,
    args: Result<Vec<NamedArg>>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(target: Target<'a>, stmt: &'a Statement, args: &[&dyn Record]) -> Query<'a> {
        let args = bind_args(stmt.prepared(), args);
        Query { target, stmt, args }
    }

    pub(crate) fn failed(target: Target<'a>, stmt: &'a Statement, err: Error) -> Query<'a> {
        Query {
            target,
            stmt,
            args: Err(err),
        }
    }

    /// Executes a statement with no output expressions and reports the
    /// driver-side outcome.
    pub fn run(self) -> Result<Outcome> {
        let Query { target, stmt, args } = self;
        let args = args?;
        if stmt.prepared().has_outputs() {
            return Err(
                Error::Scan("query has output values".into()).context("cannot run query")
            );
        }
        execute_outcome(&target, stmt, args)
    }

    /// Fetches exactly one row into `outputs`. Returns [`Error::NoRows`]
    /// when the query has outputs and produced none. On a statement with
    /// no outputs, called with no outputs, this is an exec.
    pub fn get(self, outputs: &mut [&mut dyn Record]) -> Result<()> {
        if !self.stmt.prepared().has_outputs() && outputs.is_empty() {
            let Query { target, stmt, args } = self;
            let args = args?;
            return execute_outcome(&target, stmt, args).map(|_| ());
        }
        let mut rows = self.iter();
        if !rows.next() {
            return match rows.close() {
                Err(e) => Err(e),
                Ok(()) => Err(Error::NoRows),
            };
        }
        let res = rows.get(outputs);
        let close_res = rows.close();
        res?;
        close_res
    }

    /// Fetches every row, populating one `R` per row. A query producing
    /// no rows yields an empty vector.
    pub fn get_all<R: RowSet>(self) -> Result<Vec<R>> {
        if !self.stmt.prepared().has_outputs() {
            return Err(
                Error::Scan("query has no output values".into())
                    .context("cannot populate slice"),
            );
        }
        let mut rows = self.iter();
        let mut collected = Vec::new();
        while rows.next() {
            let mut row = R::new_row();
            let res = {
                let mut targets = row.targets();
                rows.get(&mut targets)
            };
            if let Err(e) = res {
                let _ = rows.close();
                return Err(e.context("cannot populate slice"));
            }
            collected.push(row);
        }
        rows.close()?;
        Ok(collected)
    }

    /// Executes the query and returns its rows. Execution errors are
    /// latched inside the returned [`Rows`] and surface from `close`.
    pub fn iter(self) -> Rows {
        let Query { target, stmt, args } = self;
        let result = args.and_then(|args| execute_select(&target, stmt, args));
        match result {
            Ok(rows) => rows,
            Err(e) => Rows::failed(e),
        }
    }
}

fn to_params(args: Vec<NamedArg>) -> Vec<(String, Value)> {
    args.into_iter()
        .map(|arg| (format!("@{}", arg.name), arg.value))
        .collect()
}

fn execute_outcome(target: &Target<'_>, stmt: &Statement, args: Vec<NamedArg>) -> Result<Outcome> {
    let params = to_params(args);
    let outcome = target.with_conn(|conn| {
        let mut driver_stmt = conn.prepare_cached(stmt.sql())?;
        sqlair_trace_query!(stmt.sql(), params.len());
        let param_refs: Vec<(&str, &dyn rusqlite::ToSql)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn rusqlite::ToSql))
            .collect();
        let rows_affected = driver_stmt.execute(&param_refs[..])? as u64;
        Ok(Outcome {
            rows_affected,
            last_insert_id: conn.last_insert_rowid(),
        })
    })?;
    cache::note_use(stmt.id(), stmt.sql(), target.db_id());
    Ok(outcome)
}

fn execute_select(target: &Target<'_>, stmt: &Statement, args: Vec<NamedArg>) -> Result<Rows> {
    let params = to_params(args);
    let (columns, buffered) = target.with_conn(|conn| {
        let mut driver_stmt = conn.prepare_cached(stmt.sql())?;
        let columns: Vec<String> = driver_stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        sqlair_trace_query!(stmt.sql(), params.len());
        let param_refs: Vec<(&str, &dyn rusqlite::ToSql)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn rusqlite::ToSql))
            .collect();
        let mut driver_rows = driver_stmt.query(&param_refs[..])?;
        let mut buffered = Vec::new();
        while let Some(row) = driver_rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(row.get::<_, Value>(i)?);
            }
            buffered.push(values);
        }
        Ok((columns, buffered))
    })?;
    cache::note_use(stmt.id(), stmt.sql(), target.db_id());
    Ok(Rows::new(stmt.prepared().clone(), columns, buffered))
}

/// The rows of an executed query. Single-task: step with `next`, read the
/// current row with `get`, and always `close`.
///
/// The first error observed is latched; later `close` calls keep returning
/// it. `close` is idempotent.
pub struct Rows {
    stmt: Option<Arc<PreparedStatement>>,
    columns: Vec<String>,
    remaining: std::vec::IntoIter<Vec<Value>>,
    current: Option<Vec<Value>>,
    err: Option<Error>,
    closed: bool,
}

impl Rows {
    fn new(stmt: Arc<PreparedStatement>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Rows {
        Rows {
            stmt: Some(stmt),
            columns,
            remaining: rows.into_iter(),
            current: None,
            err: None,
            closed: false,
        }
    }

    fn failed(err: Error) -> Rows {
        Rows {
            stmt: None,
            columns: Vec::new(),
            remaining: Vec::new().into_iter(),
            current: None,
            err: Some(err),
            closed: false,
        }
    }

    /// Advances to the next row. Returns false once rows are exhausted, an
    /// error is latched, or the iterator is closed.
    pub fn next(&mut self) -> bool {
        if self.closed || self.err.is_some() {
            return false;
        }
        self.current = self.remaining.next();
        self.current.is_some()
    }

    /// Scans the current row into `outputs`.
    pub fn get(&mut self, outputs: &mut [&mut dyn Record]) -> Result<()> {
        let res = self.get_inner(outputs);
        if let Err(e) = &res {
            if self.err.is_none() {
                self.err = Some(e.clone());
            }
        }
        res
    }

    fn get_inner(&mut self, outputs: &mut [&mut dyn Record]) -> Result<()> {
        if let Some(e) = &self.err {
            return Err(e.clone());
        }
        if self.closed {
            return Err(Error::Scan("iterator is closed".into()).context("cannot get result"));
        }
        let Some(stmt) = &self.stmt else {
            return Err(Error::Scan("internal error: no statement".into()));
        };
        let Some(values) = &self.current else {
            return Err(
                Error::Scan("no current row: call next before get".into())
                    .context("cannot get result"),
            );
        };
        let plan = plan_row(stmt, &self.columns, outputs)?;
        scan_row(&plan, stmt, &self.columns, values, outputs)
    }

    /// Releases the rows. Safe to call any number of times; returns the
    /// latched error, if any.
    pub fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.current = None;
        self.remaining = Vec::new().into_iter();
        match &self.err {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// One result row's worth of output records, for [`Query::get_all`].
/// Implemented for tuples of up to four record types.
pub trait RowSet {
    fn new_row() -> Self;
    fn targets(&mut self) -> Vec<&mut dyn Record>;
}

macro_rules! impl_row_set {
    ($($T:ident),+) => {
        impl<$($T: Record + Default),+> RowSet for ($($T,)+) {
            fn new_row() -> Self {
                ($(<$T as Default>::default(),)+)
            }

            #[allow(non_snake_case)]
            fn targets(&mut self) -> Vec<&mut dyn Record> {
                let ($(ref mut $T,)+) = *self;
                vec![$($T as &mut dyn Record),+]
            }
        }
    };
}

impl_row_set!(A);
impl_row_set!(A, B);
impl_row_set!(A, B, C);
impl_row_set!(A, B, C, D);
