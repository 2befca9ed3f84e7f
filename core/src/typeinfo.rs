//! Type descriptors and the process-wide descriptor registry.
//!
//! Every type that appears in a template — record structs described by the
//! derive macro, associative types like [`M`], and caller-declared simple
//! wrappers — is summarised once into a [`TypeInfo`] and cached by its
//! [`TypeId`]. The preparer resolves template references against these
//! descriptors; the binder and scanner use the same [`Member`] entries to
//! move values in and out of user records.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use crate::error::{Error, Result};
use crate::value::Value;

/// The member name a simple (single-value) record answers to.
pub const SIMPLE_MEMBER: &str = "v";

/// A raw tagged field as reported by the derive macro: the unparsed
/// `name[,omitempty]` tag and the Rust access path, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedField {
    pub tag: String,
    pub field: String,
}

impl TaggedField {
    pub fn new(tag: impl Into<String>, field: impl Into<String>) -> Self {
        TaggedField {
            tag: tag.into(),
            field: field.into(),
        }
    }

    /// Re-parents a promoted field of a flattened member under `outer`.
    pub fn promoted(mut self, outer: &str) -> Self {
        self.field = format!("{outer}.{}", self.field);
        self
    }
}

/// How a [`Member`] reaches its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A tagged struct field.
    Field,
    /// A map key, resolved at runtime.
    Key,
    /// The single value of a simple record.
    Whole,
}

/// One entry of an input or output plan: a member of a registered type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    pub owner: TypeId,
    pub owner_name: &'static str,
    pub owner_full: &'static str,
    /// Tag name or map key.
    pub name: String,
    /// Rust-side access path, for diagnostics.
    pub field: String,
    pub omit_empty: bool,
    pub kind: MemberKind,
}

/// A record member after tag parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMember {
    pub field: String,
    pub omit_empty: bool,
}

/// The variant-specific portion of a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Record {
        /// Tag names in lexicographic order, driving `*` expansion.
        tags: Vec<String>,
        members: HashMap<String, RecordMember>,
    },
    Map,
    Simple,
}

/// The engine's cached description of one user type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
    full_name: &'static str,
    kind: TypeKind,
}

impl TypeInfo {
    /// The canonical name used in templates.
    pub fn identify(&self) -> &'static str {
        self.name
    }

    /// The fully qualified Rust path, used to tell apart same-named types.
    pub fn full_name(&self) -> &'static str {
        self.full_name
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, TypeKind::Map)
    }

    /// Ordered tag list of a record descriptor; empty for other variants.
    pub fn tags(&self) -> &[String] {
        match &self.kind {
            TypeKind::Record { tags, .. } => tags,
            _ => &[],
        }
    }

    fn make_member(&self, name: &str, field: &str, omit_empty: bool, kind: MemberKind) -> Member {
        Member {
            owner: self.id,
            owner_name: self.name,
            owner_full: self.full_name,
            name: name.to_string(),
            field: field.to_string(),
            omit_empty,
            kind,
        }
    }

    /// Resolves one member by tag name or map key.
    pub fn member_by_name(&self, name: &str) -> Result<Member> {
        match &self.kind {
            TypeKind::Record { members, .. } => match members.get(name) {
                Some(m) => Ok(self.make_member(name, &m.field, m.omit_empty, MemberKind::Field)),
                None => Err(Error::PrepareShape(format!(
                    "type \"{}\" has no \"{}\" db tag",
                    self.name, name
                ))),
            },
            TypeKind::Map => Ok(self.make_member(name, name, false, MemberKind::Key)),
            TypeKind::Simple => {
                if name == SIMPLE_MEMBER {
                    Ok(self.make_member(name, "0", false, MemberKind::Whole))
                } else {
                    Err(Error::PrepareShape(format!(
                        "type \"{}\" has a single member \"{}\", got \"{}\"",
                        self.name, SIMPLE_MEMBER, name
                    )))
                }
            }
        }
    }

    /// All members in deterministic order, for `*` expansion. Fails for
    /// maps, whose membership is not fixed.
    pub fn all_members_ordered(&self) -> Result<Vec<Member>> {
        match &self.kind {
            TypeKind::Record { tags, .. } => {
                tags.iter().map(|tag| self.member_by_name(tag)).collect()
            }
            TypeKind::Map => Err(Error::PrepareShape(format!(
                "map type \"{}\" has no fixed members",
                self.name
            ))),
            TypeKind::Simple => Ok(vec![self.member_by_name(SIMPLE_MEMBER)?]),
        }
    }
}

//------------------------------------------------------------------------------
// tag parsing
//------------------------------------------------------------------------------

fn valid_tag_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Parses a `name[,omitempty]` tag into its name and omit-empty flag.
pub fn parse_tag(tag: &str) -> Result<(String, bool)> {
    let mut options = tag.split(',');
    let name = options.next().unwrap_or("");

    let mut omit_empty = false;
    for flag in options {
        if flag == "omitempty" {
            omit_empty = true;
        } else {
            return Err(Error::PrepareType(format!(
                "unsupported flag \"{flag}\" in tag \"{tag}\""
            )));
        }
    }

    if name.is_empty() {
        return Err(Error::PrepareType("empty db tag".to_string()));
    }
    if !valid_tag_name(name) {
        return Err(Error::PrepareType(format!(
            "invalid column name in 'db' tag: \"{name}\""
        )));
    }
    Ok((name.to_string(), omit_empty))
}

//------------------------------------------------------------------------------
// introspection and the registry
//------------------------------------------------------------------------------

/// The descriptor variant a type introspects as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Record,
    Map,
    Simple,
}

/// Static introspection data, implemented by the derive macro and the
/// `map_record!`/`simple_record!` declarations.
pub trait Introspect: 'static {
    const NAME: &'static str;
    const SHAPE: Shape;

    /// Raw tagged fields, including promoted fields of flattened members.
    /// Only meaningful for `Shape::Record`.
    fn tagged_fields() -> Vec<TaggedField> {
        Vec::new()
    }
}

fn build_info<T: Introspect>() -> Result<TypeInfo> {
    let kind = match T::SHAPE {
        Shape::Map => TypeKind::Map,
        Shape::Simple => TypeKind::Simple,
        Shape::Record => {
            let mut tags: Vec<String> = Vec::new();
            let mut members: HashMap<String, RecordMember> = HashMap::new();
            for raw in T::tagged_fields() {
                let (name, omit_empty) = parse_tag(&raw.tag).map_err(|e| {
                    e.context(&format!(
                        "cannot parse tag for field {}.{}",
                        T::NAME,
                        raw.field
                    ))
                })?;
                if let Some(dup) = members.get(&name) {
                    return Err(Error::PrepareType(format!(
                        "db tag \"{}\" appears in both field \"{}\" and field \"{}\" of struct \"{}\"",
                        name, raw.field, dup.field, T::NAME
                    )));
                }
                tags.push(name.clone());
                members.insert(
                    name,
                    RecordMember {
                        field: raw.field,
                        omit_empty,
                    },
                );
            }
            tags.sort();
            TypeKind::Record { tags, members }
        }
    };
    Ok(TypeInfo {
        id: TypeId::of::<T>(),
        name: T::NAME,
        full_name: std::any::type_name::<T>(),
        kind,
    })
}

static CACHE: LazyLock<RwLock<HashMap<TypeId, Arc<TypeInfo>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn cache_read() -> std::sync::RwLockReadGuard<'static, HashMap<TypeId, Arc<TypeInfo>>> {
    CACHE.read().unwrap_or_else(|e| e.into_inner())
}

fn cache_write() -> std::sync::RwLockWriteGuard<'static, HashMap<TypeId, Arc<TypeInfo>>> {
    CACHE.write().unwrap_or_else(|e| e.into_inner())
}

/// Returns the cached descriptor for `T`, building it on first touch.
///
/// Concurrent first touches may build the descriptor more than once; the
/// cached result converges to the value-equal descriptor.
pub fn type_info<T: Introspect>() -> Result<Arc<TypeInfo>> {
    let id = TypeId::of::<T>();
    if let Some(info) = cache_read().get(&id) {
        return Ok(info.clone());
    }
    let built = Arc::new(build_info::<T>()?);
    let mut cache = cache_write();
    Ok(cache.entry(id).or_insert(built).clone())
}

/// Empties the descriptor cache. Intended for tests only.
pub fn clear_type_cache() {
    cache_write().clear();
}

//------------------------------------------------------------------------------
// runtime record access
//------------------------------------------------------------------------------

/// A value that can take part in a query: reads members at bind time and
/// writes them at scan time. Implemented by the derive macro for structs,
/// by [`M`] (and `map_record!` aliases) for maps, and by `simple_record!`
/// wrappers for single values.
pub trait Record: std::any::Any {
    /// The cached descriptor for this value's type.
    fn type_info(&self) -> Result<Arc<TypeInfo>>;

    /// Whether `name` addresses a member of this record. Maps own every
    /// key.
    fn owns_member(&self, name: &str) -> bool;

    /// Reads the member named `name`.
    fn get_field(&self, name: &str) -> Result<Value>;

    /// Verifies that `value` could be written to member `name` without
    /// mutating anything.
    fn check_field(&self, name: &str, value: &Value) -> Result<()>;

    /// Writes `value` to member `name`. `Null` zeroes the member unless it
    /// is marked omit-empty, in which case the prior content is kept.
    fn set_field(&mut self, name: &str, value: Value) -> Result<()>;
}

/// Conversion dry run used by generated `check_field` implementations: the
/// witness pins the member type without touching it.
pub fn convert_probe<T: crate::value::FieldValue>(_witness: &T, value: &Value) -> Result<()> {
    T::from_value(value.clone()).map(|_| ())
}

/// Declares a string-keyed map newtype (over `HashMap<String, Value>`) as
/// an associative record type. The struct's template name is its ident.
#[macro_export]
macro_rules! map_record {
    ($name:ident) => {
        impl $crate::Introspect for $name {
            const NAME: &'static str = stringify!($name);
            const SHAPE: $crate::Shape = $crate::Shape::Map;
        }

        impl $crate::Record for $name {
            fn type_info(&self) -> $crate::Result<::std::sync::Arc<$crate::TypeInfo>> {
                $crate::type_info::<Self>()
            }

            fn owns_member(&self, _name: &str) -> bool {
                true
            }

            fn get_field(&self, name: &str) -> $crate::Result<$crate::Value> {
                self.0.get(name).cloned().ok_or_else(|| {
                    $crate::Error::Bind(format!(
                        "map \"{}\" does not contain key \"{}\"",
                        <Self as $crate::Introspect>::NAME,
                        name
                    ))
                })
            }

            fn check_field(&self, _name: &str, _value: &$crate::Value) -> $crate::Result<()> {
                Ok(())
            }

            fn set_field(&mut self, name: &str, value: $crate::Value) -> $crate::Result<()> {
                self.0.insert(name.to_string(), value);
                Ok(())
            }
        }
    };
}

/// Declares a one-field tuple struct as a simple (single-value) record
/// type. Its single member is addressed as `$Name.v` / `&Name.v`.
#[macro_export]
macro_rules! simple_record {
    ($name:ident) => {
        impl $crate::Introspect for $name {
            const NAME: &'static str = stringify!($name);
            const SHAPE: $crate::Shape = $crate::Shape::Simple;
        }

        impl $crate::Record for $name {
            fn type_info(&self) -> $crate::Result<::std::sync::Arc<$crate::TypeInfo>> {
                $crate::type_info::<Self>()
            }

            fn owns_member(&self, name: &str) -> bool {
                name == $crate::SIMPLE_MEMBER
            }

            fn get_field(&self, name: &str) -> $crate::Result<$crate::Value> {
                if name != $crate::SIMPLE_MEMBER {
                    return Err($crate::Error::Bind(format!(
                        "type \"{}\" has a single member \"{}\", got \"{}\"",
                        <Self as $crate::Introspect>::NAME,
                        $crate::SIMPLE_MEMBER,
                        name
                    )));
                }
                Ok($crate::FieldValue::to_value(&self.0))
            }

            fn check_field(&self, name: &str, value: &$crate::Value) -> $crate::Result<()> {
                if name != $crate::SIMPLE_MEMBER {
                    return Err($crate::Error::Scan(format!(
                        "type \"{}\" has a single member \"{}\", got \"{}\"",
                        <Self as $crate::Introspect>::NAME,
                        $crate::SIMPLE_MEMBER,
                        name
                    )));
                }
                if value.is_null() {
                    return Ok(());
                }
                $crate::convert_probe(&self.0, value)
            }

            fn set_field(&mut self, name: &str, value: $crate::Value) -> $crate::Result<()> {
                self.check_field(name, &value)?;
                match value {
                    $crate::Value::Null => self.0 = ::core::default::Default::default(),
                    value => self.0 = $crate::FieldValue::from_value(value)?,
                }
                Ok(())
            }
        }
    };
}

/// The engine-provided associative type: a string-keyed map of driver
/// values, usable wherever a record is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct M(pub HashMap<String, Value>);

map_record!(M);

impl M {
    pub fn new() -> Self {
        M::default()
    }
}

impl std::ops::Deref for M {
    type Target = HashMap<String, Value>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for M {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<HashMap<String, Value>> for M {
    fn from(map: HashMap<String, Value>) -> Self {
        M(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for M {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        M(iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tag_variants() {
        assert_eq!(parse_tag("id").unwrap(), ("id".to_string(), false));
        assert_eq!(
            parse_tag("postcode,omitempty").unwrap(),
            ("postcode".to_string(), true)
        );
        assert!(parse_tag("").unwrap_err().to_string().contains("empty db tag"));
        assert!(parse_tag("5col")
            .unwrap_err()
            .to_string()
            .contains("invalid column name"));
        assert!(parse_tag("id,nullzero")
            .unwrap_err()
            .to_string()
            .contains("unsupported flag"));
    }

    struct Person;

    impl Introspect for Person {
        const NAME: &'static str = "Person";
        const SHAPE: Shape = Shape::Record;
        fn tagged_fields() -> Vec<TaggedField> {
            vec![
                TaggedField::new("name", "fullname"),
                TaggedField::new("id", "id"),
                TaggedField::new("address_id", "postal_code"),
            ]
        }
    }

    struct Broken;

    impl Introspect for Broken {
        const NAME: &'static str = "Broken";
        const SHAPE: Shape = Shape::Record;
        fn tagged_fields() -> Vec<TaggedField> {
            vec![TaggedField::new("id", "a"), TaggedField::new("id", "b")]
        }
    }

    #[test]
    fn record_tags_are_sorted() {
        let info = type_info::<Person>().unwrap();
        assert_eq!(info.identify(), "Person");
        assert_eq!(info.tags(), ["address_id", "id", "name"]);
    }

    #[test]
    fn duplicate_tags_fail() {
        let err = type_info::<Broken>().unwrap_err();
        assert!(
            err.to_string().contains("appears in both field"),
            "got: {err}"
        );
    }

    #[test]
    fn unknown_tag_resolution_fails() {
        let info = type_info::<Person>().unwrap();
        let err = info.member_by_name("email").unwrap_err();
        assert_eq!(err.to_string(), "type \"Person\" has no \"email\" db tag");
    }

    #[test]
    fn registry_descriptors_converge() {
        let a = type_info::<Person>().unwrap();
        let b = type_info::<Person>().unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn clear_rebuilds_value_equal_descriptors() {
        let a = type_info::<Person>().unwrap();
        clear_type_cache();
        let b = type_info::<Person>().unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn map_members_resolve_by_key() {
        let info = type_info::<M>().unwrap();
        assert!(info.is_map());
        let member = info.member_by_name("district").unwrap();
        assert_eq!(member.kind, MemberKind::Key);
        assert!(info.all_members_ordered().is_err());
    }

    #[test]
    fn map_key_lookup() {
        let m: M = [("id", Value::Integer(7))].into_iter().collect();
        assert_eq!(m.get_field("id").unwrap(), Value::Integer(7));
        let err = m.get_field("missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "map \"M\" does not contain key \"missing\""
        );
    }

    #[derive(Default)]
    struct Count(i64);
    simple_record!(Count);

    #[test]
    fn simple_record_round_trip() {
        let mut c = Count(3);
        assert_eq!(c.get_field("v").unwrap(), Value::Integer(3));
        c.set_field("v", Value::Integer(9)).unwrap();
        assert_eq!(c.0, 9);
        assert!(c.get_field("count").is_err());
    }
}
