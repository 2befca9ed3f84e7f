//! Result scanning: routes driver columns back to output-plan members and
//! writes row values into user records.
//!
//! Only columns aliased `_sqlair_N` are routed; anything else in the result
//! set (user expressions, passthrough selects) is discarded without error.
//! A row is written in two phases: every routed value is first checked
//! against its destination member, and only when the whole row checks clean
//! are the values committed. A failed row therefore leaves the output
//! records untouched.

use std::any::TypeId;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::prepare::{marker_index, PreparedStatement};
use crate::typeinfo::{Member, Record};
use crate::value::Value;

/// Where one result column goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dest {
    /// Not an engine column; value is dropped.
    Discard,
    /// Routed to output-plan entry `member` on output argument `output`.
    Member { member: usize, output: usize },
}

/// The per-result routing table from column positions to output arguments.
/// Built once per result set and reused for every row.
#[derive(Debug)]
pub struct RowPlan {
    dests: Vec<Dest>,
}

impl RowPlan {
    /// The number of routed (non-discarded) columns.
    pub fn routed(&self) -> usize {
        self.dests
            .iter()
            .filter(|d| matches!(d, Dest::Member { .. }))
            .count()
    }
}

/// Matches the result columns and the user's output arguments against the
/// statement's output plan.
pub fn plan_row(
    stmt: &PreparedStatement,
    columns: &[String],
    outputs: &[&mut dyn Record],
) -> Result<RowPlan> {
    plan_inner(stmt, columns, outputs).map_err(|e| e.context("cannot get result"))
}

fn plan_inner(
    stmt: &PreparedStatement,
    columns: &[String],
    outputs: &[&mut dyn Record],
) -> Result<RowPlan> {
    // Types referenced by the output plan, with a stable name list for
    // diagnostics.
    let mut in_query: HashMap<TypeId, &'static str> = HashMap::new();
    let mut query_type_names: Vec<&'static str> = Vec::new();
    for member in stmt.outputs() {
        if in_query.insert(member.owner, member.owner_name).is_none() {
            query_type_names.push(member.owner_name);
        }
    }

    let mut dest_by_type: HashMap<TypeId, usize> = HashMap::new();
    for (i, output) in outputs.iter().enumerate() {
        let info = output.type_info()?;
        if !in_query.contains_key(&info.id()) {
            return Err(Error::Scan(format!(
                "output type \"{}\" does not appear in query, have: {}",
                info.identify(),
                query_type_names.join(", ")
            )));
        }
        if dest_by_type.insert(info.id(), i).is_some() {
            return Err(Error::Scan(format!(
                "type \"{}\" provided more than once, rename one of them",
                info.identify()
            )));
        }
    }

    let mut dests = Vec::with_capacity(columns.len());
    for column in columns {
        let Some(index) = marker_index(column) else {
            dests.push(Dest::Discard);
            continue;
        };
        let Some(member) = stmt.outputs().get(index) else {
            return Err(Error::Scan(format!(
                "internal error: column {column} not in output plan ({index}>={})",
                stmt.outputs().len()
            )));
        };
        let Some(&output) = dest_by_type.get(&member.owner) else {
            return Err(Error::Scan(format!(
                "type \"{}\" found in query but not passed to get",
                member.owner_name
            )));
        };
        dests.push(Dest::Member {
            member: index,
            output,
        });
    }
    Ok(RowPlan { dests })
}

fn member_context(e: Error, member: &Member, column: &str) -> Error {
    Error::Scan(format!(
        "cannot scan column \"{}\" into member \"{}\" (field {}.{}): {}",
        column, member.name, member.owner_name, member.field, e
    ))
}

/// Writes one row of values through the plan into the output arguments.
///
/// `values` holds every column of the row, discarded ones included, in
/// column order.
pub fn scan_row(
    plan: &RowPlan,
    stmt: &PreparedStatement,
    columns: &[String],
    values: &[Value],
    outputs: &mut [&mut dyn Record],
) -> Result<()> {
    scan_inner(plan, stmt, columns, values, outputs).map_err(|e| e.context("cannot get result"))
}

fn scan_inner(
    plan: &RowPlan,
    stmt: &PreparedStatement,
    columns: &[String],
    values: &[Value],
    outputs: &mut [&mut dyn Record],
) -> Result<()> {
    if values.len() != plan.dests.len() {
        return Err(Error::Scan(format!(
            "internal error: row has {} columns, plan has {}",
            values.len(),
            plan.dests.len()
        )));
    }

    // Check phase: no output is mutated until the whole row converts.
    for (i, dest) in plan.dests.iter().enumerate() {
        let Dest::Member { member, output } = dest else {
            continue;
        };
        let member = &stmt.outputs()[*member];
        outputs[*output]
            .check_field(&member.name, &values[i])
            .map_err(|e| member_context(e, member, &columns[i]))?;
    }

    // Commit phase.
    for (i, dest) in plan.dests.iter().enumerate() {
        let Dest::Member { member, output } = dest else {
            continue;
        };
        let member = &stmt.outputs()[*member];
        outputs[*output]
            .set_field(&member.name, values[i].clone())
            .map_err(|e| member_context(e, member, &columns[i]))?;
    }
    Ok(())
}
