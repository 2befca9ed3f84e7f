//! Input binding: turns runtime argument values into the ordered, named
//! driver argument vector of a prepared statement.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::prepare::{input_name, PreparedStatement};
use crate::typeinfo::{Record, TypeInfo};
use crate::value::Value;

/// One bound driver argument. `name` is `sqlair_N`; the driver layer adds
/// its own prefix character when binding.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArg {
    pub name: String,
    pub value: Value,
}

/// Validates `args` against the statement's input plan and extracts the
/// driver argument vector, in plan order.
pub fn bind_args(stmt: &PreparedStatement, args: &[&dyn Record]) -> Result<Vec<NamedArg>> {
    bind_inner(stmt, args).map_err(|e| e.context("invalid input parameter"))
}

fn bind_inner<'a>(
    stmt: &PreparedStatement,
    args: &[&'a dyn Record],
) -> Result<Vec<NamedArg>> {
    let in_query: HashMap<TypeId, ()> = stmt
        .inputs()
        .iter()
        .map(|member| (member.owner, ()))
        .collect();

    let mut by_type: HashMap<TypeId, (Arc<TypeInfo>, &'a dyn Record)> = HashMap::new();
    let mut names: Vec<&'static str> = Vec::new();
    for arg in args {
        let info = arg.type_info()?;
        let id = info.id();
        if by_type.contains_key(&id) {
            return Err(Error::Bind(format!(
                "type \"{}\" provided more than once",
                info.identify()
            )));
        }
        if !in_query.contains_key(&id) {
            // A same-named type from another module is a distinct mistake
            // from a type the query never mentions.
            for member in stmt.inputs() {
                if member.owner_name == info.identify() {
                    return Err(Error::Bind(format!(
                        "type {} not passed as a parameter, have {}",
                        member.owner_full,
                        info.full_name()
                    )));
                }
            }
            return Err(Error::Bind(format!(
                "\"{}\" not referenced in query",
                info.identify()
            )));
        }
        names.push(info.identify());
        by_type.insert(id, (info, *arg));
    }

    let mut bound = Vec::with_capacity(stmt.inputs().len());
    for (i, member) in stmt.inputs().iter().enumerate() {
        let Some((_, arg)) = by_type.get(&member.owner) else {
            return Err(if names.is_empty() {
                Error::Bind(format!(
                    "type \"{}\" not passed as a parameter",
                    member.owner_name
                ))
            } else {
                Error::Bind(format!(
                    "type \"{}\" not passed as a parameter, have: {}",
                    member.owner_name,
                    names.join(", ")
                ))
            });
        };
        let value = arg.get_field(&member.name)?;
        bound.push(NamedArg {
            name: input_name(i),
            value,
        });
    }
    Ok(bound)
}
