//! Statement preparation: validates parsed parts against type descriptors,
//! expands asterisks, assigns parameter and column markers, and emits the
//! final parameterised SQL.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::parser::{FullName, InputPart, OutputPart, ParsedExpr, QueryPart};
use crate::typeinfo::{Member, Record, TypeInfo};

/// Prefix of generated input parameter names (`@sqlair_N` in the SQL).
pub const INPUT_PREFIX: &str = "sqlair_";

/// Prefix of generated output column aliases (`AS _sqlair_N`). Reserved:
/// user column aliases must not begin with it.
pub const OUTPUT_PREFIX: &str = "_sqlair_";

/// The generated alias for output column `n`.
pub fn marker_name(n: usize) -> String {
    format!("{OUTPUT_PREFIX}{n}")
}

/// The generated parameter name for input `n`, without the `@` the driver
/// syntax adds.
pub fn input_name(n: usize) -> String {
    format!("{INPUT_PREFIX}{n}")
}

/// Extracts `N` from a `_sqlair_N` column alias.
pub fn marker_index(name: &str) -> Option<usize> {
    name.strip_prefix(OUTPUT_PREFIX)?.parse().ok()
}

/// A template checked against its types and rewritten into driver SQL,
/// together with the plans that drive binding and scanning. Immutable and
/// safe to share between threads.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    sql: String,
    inputs: Vec<Member>,
    outputs: Vec<Member>,
    // Retained so argument-dependent SQL regeneration stays possible.
    parts: ParsedExpr,
}

impl PreparedStatement {
    /// The rewritten SQL with `@sqlair_N` parameters and `_sqlair_N`
    /// output aliases.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The input plan, in source-text order.
    pub fn inputs(&self) -> &[Member] {
        &self.inputs
    }

    /// The output plan, indexed by column marker.
    pub fn outputs(&self) -> &[Member] {
        &self.outputs
    }

    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }

    pub fn parts(&self) -> &ParsedExpr {
        &self.parts
    }
}

type NameToInfo = HashMap<&'static str, Arc<TypeInfo>>;

fn lookup<'a>(infos: &'a NameToInfo, name: &str) -> Result<&'a Arc<TypeInfo>> {
    infos.get(name).ok_or_else(|| {
        let mut names: Vec<&str> = infos.keys().copied().collect();
        names.sort_unstable();
        if names.is_empty() {
            Error::PrepareType(format!("type \"{name}\" not passed as a parameter"))
        } else {
            Error::PrepareType(format!(
                "type \"{name}\" not passed as a parameter, have: {}",
                names.join(", ")
            ))
        }
    })
}

fn star_count(names: &[FullName]) -> usize {
    names.iter().filter(|n| n.is_star()).count()
}

/// Checks that asterisks in an input expression are well formed.
fn check_input_shape(p: &InputPart) -> Result<()> {
    let num_cols = p.columns.len();
    let num_sources = p.sources.len();
    let star_cols = star_count(&p.columns);
    let star_sources = star_count(&p.sources);

    if num_cols == 1 && star_cols == 1 {
        return Ok(());
    }
    if num_cols == 0 && num_sources > 1 {
        return Err(Error::PrepareShape(format!(
            "internal error: cannot group standalone input expressions: {}",
            p.raw
        )));
    }
    if (num_cols > 1 && star_cols > 0) || (num_cols == 0 && star_sources > 0) {
        return Err(Error::PrepareShape(format!(
            "invalid asterisk in input expression: {}",
            p.raw
        )));
    }
    if num_cols > 0
        && star_cols == 0
        && !((num_sources == 1 && star_sources == 1)
            || (star_sources == 0 && num_sources == num_cols))
    {
        return Err(Error::PrepareShape(format!(
            "cannot match columns to types in input expression: {}",
            p.raw
        )));
    }
    Ok(())
}

/// Checks that asterisks in an output expression are well formed.
fn check_output_shape(p: &OutputPart) -> Result<()> {
    let num_cols = p.columns.len();
    let num_targets = p.targets.len();
    let star_cols = star_count(&p.columns);
    let star_targets = star_count(&p.targets);

    if star_targets > 1
        || star_cols > 1
        || (star_cols == 1 && star_targets == 0)
        || (star_targets == 1 && num_targets > 1)
        || (star_cols == 1 && num_cols > 1)
    {
        return Err(Error::PrepareShape(format!(
            "invalid asterisk in output expression: {}",
            p.raw
        )));
    }
    if star_targets == 0 && num_cols > 0 && num_targets != num_cols {
        return Err(Error::PrepareShape(format!(
            "cannot match columns to types in output expression: {}",
            p.raw
        )));
    }
    Ok(())
}

/// Resolves an input part into the column list to print and the plan
/// members supplying each parameter.
fn prepare_input(infos: &NameToInfo, p: &InputPart) -> Result<(Vec<FullName>, Vec<Member>)> {
    check_input_shape(p)?;

    // Bare scalar, e.g. "$Person.name".
    if p.columns.is_empty() {
        let source = &p.sources[0];
        let info = lookup(infos, &source.prefix)?;
        return Ok((vec![], vec![info.member_by_name(&source.name)?]));
    }

    // Star source, e.g. "(*) VALUES ($Person.*)" or "(c1, c2) VALUES ($Person.*)".
    if p.sources[0].is_star() {
        let info = lookup(infos, &p.sources[0].prefix)?;
        if info.is_map() {
            return Err(Error::PrepareShape(format!(
                "cannot use map type \"{}\" with asterisk in input expression: {}",
                info.identify(),
                p.raw
            )));
        }
        if p.columns[0].is_star() {
            let members = info.all_members_ordered()?;
            let columns = members
                .iter()
                .map(|m| FullName::bare(m.name.clone()))
                .collect();
            return Ok((columns, members));
        }
        let mut columns = Vec::new();
        let mut members = Vec::new();
        for column in &p.columns {
            members.push(info.member_by_name(&column.name)?);
            columns.push(column.clone());
        }
        return Ok((columns, members));
    }

    // Explicit sources, e.g. "(c1, c2) VALUES ($T.m1, $T.m2)".
    let mut members = Vec::new();
    for source in &p.sources {
        let info = lookup(infos, &source.prefix)?;
        members.push(info.member_by_name(&source.name)?);
    }
    let columns = if p.columns[0].is_star() {
        // "(*) VALUES ($T.m1, $T.m2)": columns are named after the members.
        p.sources
            .iter()
            .map(|s| FullName::bare(s.name.clone()))
            .collect()
    } else {
        p.columns.clone()
    };
    Ok((columns, members))
}

/// Resolves an output part into the columns to select and the plan members
/// receiving each one.
fn prepare_output(infos: &NameToInfo, p: &OutputPart) -> Result<(Vec<FullName>, Vec<Member>)> {
    check_output_shape(p)?;

    // Star target, e.g. "&Person.*", "t.* AS &Person.*",
    // "(c1, c2) AS &Person.*".
    if p.targets[0].is_star() {
        let info = lookup(infos, &p.targets[0].prefix)?;
        let star_column = p.columns.is_empty() || p.columns[0].is_star();

        if star_column {
            if info.is_map() {
                return Err(Error::PrepareShape(
                    "map type with asterisk cannot be used when no column name is \
                     specified or column name is asterisk"
                        .to_string(),
                ));
            }
            let prefix = p
                .columns
                .first()
                .map(|c| c.prefix.clone())
                .unwrap_or_default();
            let members = info.all_members_ordered()?;
            let columns = members
                .iter()
                .map(|m| FullName::new(prefix.clone(), m.name.clone()))
                .collect();
            return Ok((columns, members));
        }

        let mut columns = Vec::new();
        let mut members = Vec::new();
        for column in &p.columns {
            members.push(info.member_by_name(&column.name)?);
            columns.push(column.clone());
        }
        return Ok((columns, members));
    }

    // Explicit targets, e.g. "(c1, c2) AS (&T1.m1, &T2.m2)" or
    // "(&T.m1, &T.m2)".
    let mut members = Vec::new();
    for target in &p.targets {
        let info = lookup(infos, &target.prefix)?;
        members.push(info.member_by_name(&target.name)?);
    }
    let columns = if p.columns.is_empty() {
        p.targets
            .iter()
            .map(|t| FullName::bare(t.name.clone()))
            .collect()
    } else {
        p.columns.clone()
    };
    Ok((columns, members))
}

/// Prints a bracketed, comma separated column list.
fn print_columns(columns: &[FullName]) -> String {
    let mut out = String::from("(");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&column.to_string());
    }
    out.push(')');
    out
}

/// Prints `n` named parameters starting at `start`.
fn named_params(start: usize, n: usize) -> String {
    let mut out = String::from("(");
    for i in start..start + n {
        if i > start {
            out.push_str(", ");
        }
        out.push('@');
        out.push_str(&input_name(i));
    }
    out.push(')');
    out
}

/// Checks the parsed template against descriptors built from the sample
/// values, expands every reference, and emits the driver SQL together with
/// the input and output plans.
///
/// The result depends only on the template and the set of sample types,
/// not on the order samples are passed in.
pub fn prepare(parsed: &ParsedExpr, samples: &[&dyn Record]) -> Result<PreparedStatement> {
    prepare_parts(parsed, samples).map_err(|e| e.context("cannot prepare statement"))
}

fn prepare_parts(parsed: &ParsedExpr, samples: &[&dyn Record]) -> Result<PreparedStatement> {
    let mut infos: NameToInfo = HashMap::new();
    for sample in samples {
        let info = sample.type_info()?;
        if let Some(existing) = infos.get(info.identify()) {
            if existing.id() != info.id() {
                return Err(Error::PrepareType(format!(
                    "two types with name \"{}\" passed as parameters: {} and {}",
                    info.identify(),
                    existing.full_name(),
                    info.full_name()
                )));
            }
        }
        infos.insert(info.identify(), info);
    }

    let mut sql = String::new();
    let mut in_count = 0usize;
    let mut out_count = 0usize;
    let mut inputs: Vec<Member> = Vec::new();
    let mut outputs: Vec<Member> = Vec::new();
    let mut seen_outputs: HashSet<(TypeId, String)> = HashSet::new();

    for part in parsed.parts() {
        match part {
            QueryPart::Passthrough(chunk) => sql.push_str(chunk),
            QueryPart::Input(p) => {
                let (columns, members) = prepare_input(&infos, p)?;
                if columns.is_empty() {
                    sql.push('@');
                    sql.push_str(&input_name(in_count));
                    in_count += 1;
                } else {
                    sql.push_str(&print_columns(&columns));
                    sql.push_str(" VALUES ");
                    sql.push_str(&named_params(in_count, columns.len()));
                    in_count += columns.len();
                }
                inputs.extend(members);
            }
            QueryPart::Output(p) => {
                let (columns, members) = prepare_output(&infos, p)?;
                for member in &members {
                    if !seen_outputs.insert((member.owner, member.name.clone())) {
                        return Err(Error::PrepareShape(format!(
                            "member \"{}\" of type \"{}\" appears more than once in output expressions",
                            member.name, member.owner_name
                        )));
                    }
                }
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push_str(&column.to_string());
                    sql.push_str(" AS ");
                    sql.push_str(&marker_name(out_count));
                    out_count += 1;
                }
                outputs.extend(members);
            }
        }
    }

    Ok(PreparedStatement {
        sql,
        inputs,
        outputs,
        parts: parsed.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::typeinfo::M;
    use sqlair_macros::Record;

    #[derive(Record, Default, Debug)]
    struct Person {
        #[db("id")]
        id: i64,
        #[db("name")]
        name: String,
        #[db("address_id")]
        postal_code: i64,
    }

    #[derive(Record, Default, Debug)]
    struct Address {
        #[db("id")]
        id: i64,
        #[db("district")]
        district: String,
        #[db("street")]
        street: String,
    }

    fn prepare_sql(template: &str, samples: &[&dyn Record]) -> Result<PreparedStatement> {
        let parsed = Parser::new().parse(template)?;
        prepare(&parsed, samples)
    }

    #[test]
    fn star_output_expands_sorted_tags() {
        let stmt = prepare_sql(
            "SELECT &Person.* FROM t WHERE foo = $M.address_id",
            &[&Person::default(), &M::new()],
        )
        .unwrap();
        assert_eq!(
            stmt.sql(),
            "SELECT address_id AS _sqlair_0, id AS _sqlair_1, name AS _sqlair_2 \
             FROM t WHERE foo = @sqlair_0"
        );
        assert_eq!(stmt.inputs().len(), 1);
        assert_eq!(stmt.outputs().len(), 3);
    }

    #[test]
    fn insert_star_values() {
        let stmt = prepare_sql(
            "INSERT INTO person (*) VALUES ($Person.*)",
            &[&Person::default()],
        )
        .unwrap();
        assert_eq!(
            stmt.sql(),
            "INSERT INTO person (address_id, id, name) VALUES (@sqlair_0, @sqlair_1, @sqlair_2)"
        );
    }

    #[test]
    fn insert_explicit_columns_star_source() {
        let stmt = prepare_sql(
            "INSERT INTO person (name, id) VALUES ($Person.*)",
            &[&Person::default()],
        )
        .unwrap();
        assert_eq!(
            stmt.sql(),
            "INSERT INTO person (name, id) VALUES (@sqlair_0, @sqlair_1)"
        );
        assert_eq!(stmt.inputs()[0].name, "name");
        assert_eq!(stmt.inputs()[1].name, "id");
    }

    #[test]
    fn map_output_with_explicit_columns() {
        let stmt = prepare_sql(
            "SELECT (a.district, a.street) AS &M.* FROM a",
            &[&M::new()],
        )
        .unwrap();
        assert_eq!(
            stmt.sql(),
            "SELECT a.district AS _sqlair_0, a.street AS _sqlair_1 FROM a"
        );
        assert_eq!(stmt.outputs()[0].name, "district");
        assert_eq!(stmt.outputs()[1].name, "street");
    }

    #[test]
    fn map_star_without_columns_is_rejected() {
        let err = prepare_sql("SELECT &M.* FROM a", &[&M::new()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot prepare statement: map type with asterisk cannot be used \
             when no column name is specified or column name is asterisk"
        );
        let err = prepare_sql("SELECT * AS &M.* FROM a", &[&M::new()]).unwrap_err();
        assert!(err.to_string().contains("map type with asterisk"));
    }

    #[test]
    fn scalar_inputs_number_in_source_order() {
        let stmt = prepare_sql(
            "UPDATE person SET person.address_id = $Address.id WHERE person.id = $M.id",
            &[&Address::default(), &M::new()],
        )
        .unwrap();
        assert_eq!(
            stmt.sql(),
            "UPDATE person SET person.address_id = @sqlair_0 WHERE person.id = @sqlair_1"
        );
        assert_eq!(stmt.inputs()[0].owner_name, "Address");
        assert_eq!(stmt.inputs()[1].owner_name, "M");
    }

    #[test]
    fn map_star_input_is_rejected() {
        let err =
            prepare_sql("INSERT INTO t (*) VALUES ($M.*)", &[&M::new()]).unwrap_err();
        assert!(
            err.to_string().contains("cannot use map type \"M\" with asterisk"),
            "got: {err}"
        );
    }

    #[test]
    fn bare_star_input_is_rejected() {
        let err = prepare_sql(
            "SELECT x FROM t WHERE y = $Person.*",
            &[&Person::default()],
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("invalid asterisk in input expression"),
            "got: {err}"
        );
    }

    #[test]
    fn output_arity_mismatch_is_rejected() {
        let err = prepare_sql(
            "SELECT (a, b) AS (&Person.id, &Person.name, &Person.address_id) FROM t",
            &[&Person::default()],
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("cannot match columns to types"),
            "got: {err}"
        );
    }

    #[test]
    fn star_target_with_sibling_targets_is_rejected() {
        let err = prepare_sql(
            "SELECT * AS (&Person.*, &Address.id) FROM t",
            &[&Person::default(), &Address::default()],
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("invalid asterisk in output expression"),
            "got: {err}"
        );
    }

    #[test]
    fn duplicate_output_member_is_rejected() {
        let err = prepare_sql(
            "SELECT &Person.id, p.id AS &Person.id FROM t",
            &[&Person::default()],
        )
        .unwrap_err();
        assert!(
            err.to_string()
                .contains("member \"id\" of type \"Person\" appears more than once"),
            "got: {err}"
        );
    }

    #[test]
    fn unknown_type_lists_known_names() {
        let err = prepare_sql(
            "SELECT &Unknown.* FROM t",
            &[&Person::default(), &Address::default()],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot prepare statement: type \"Unknown\" not passed as a parameter, \
             have: Address, Person"
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = prepare_sql("SELECT &Person.email FROM t", &[&Person::default()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot prepare statement: type \"Person\" has no \"email\" db tag"
        );
    }

    #[test]
    fn prepare_is_deterministic_in_sample_order() {
        let template = "SELECT &Person.*, a.id AS &Address.id FROM t WHERE x = $Address.district";
        let a = prepare_sql(template, &[&Person::default(), &Address::default()]).unwrap();
        let b = prepare_sql(template, &[&Address::default(), &Person::default()]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sql(), b.sql());
    }

    #[test]
    fn output_markers_are_dense_from_zero() {
        let stmt = prepare_sql(
            "SELECT &Person.*, (a.district, a.street) AS &Address.* FROM t",
            &[&Person::default(), &Address::default()],
        )
        .unwrap();
        for n in 0..stmt.outputs().len() {
            assert!(stmt.sql().contains(&format!(" AS _sqlair_{n}")));
        }
        assert_eq!(stmt.outputs().len(), 5);
    }

    #[test]
    fn table_prefixed_star_expansion() {
        let stmt = prepare_sql("SELECT p.* AS &Person.* FROM t AS p", &[&Person::default()]).unwrap();
        assert_eq!(
            stmt.sql(),
            "SELECT p.address_id AS _sqlair_0, p.id AS _sqlair_1, p.name AS _sqlair_2 \
             FROM t AS p"
        );
    }

    #[test]
    fn passthrough_only_template_has_empty_plans() {
        let stmt = prepare_sql("DELETE FROM person", &[]).unwrap();
        assert_eq!(stmt.sql(), "DELETE FROM person");
        assert!(stmt.inputs().is_empty());
        assert!(!stmt.has_outputs());
    }

    #[test]
    fn marker_index_round_trip() {
        assert_eq!(marker_index(&marker_name(7)), Some(7));
        assert_eq!(marker_index("_sqlair_12"), Some(12));
        assert_eq!(marker_index("calculated_value"), None);
        assert_eq!(marker_index("_sqlair_x"), None);
    }
}
