//! Driver-neutral values and field conversions.
//!
//! `Value` is the owned representation every record member passes through
//! on its way to or from the database. `FieldValue` is the conversion trait
//! the derive macro relies on; implementing it for a custom type lets that
//! type participate as a record member.

use crate::error::{Error, Result};

/// An owned database value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer value if this is an INTEGER.
    #[inline]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the real value if this is a REAL.
    #[inline]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text value if this is TEXT.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns the blob value if this is a BLOB.
    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    /// The storage-class name of this value, for diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Blob(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Conversion between a record member and [`Value`].
///
/// `from_value` never sees `Value::Null` for plain members; null handling
/// (zeroing, omit-empty, `Option`) happens in the generated setters before
/// conversion is attempted.
pub trait FieldValue: Sized {
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! impl_field_value_int {
    ($($ty:ty),*) => { $(
        impl FieldValue for $ty {
            fn to_value(&self) -> Value {
                Value::Integer(*self as i64)
            }
            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Integer(i) => <$ty>::try_from(i).map_err(|_| {
                        Error::Conversion(format!(
                            "integer {i} out of range for {}",
                            stringify!($ty)
                        ))
                    }),
                    other => Err(Error::Conversion(format!(
                        "expected integer, got {}",
                        other.kind()
                    ))),
                }
            }
        }
    )* }
}

impl_field_value_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FieldValue for f64 {
    fn to_value(&self) -> Value {
        Value::Real(*self)
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Real(r) => Ok(r),
            Value::Integer(i) => Ok(i as f64),
            other => Err(Error::Conversion(format!(
                "expected real, got {}",
                other.kind()
            ))),
        }
    }
}

impl FieldValue for f32 {
    fn to_value(&self) -> Value {
        Value::Real(*self as f64)
    }
    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|r| r as f32)
    }
}

impl FieldValue for bool {
    fn to_value(&self) -> Value {
        Value::Integer(*self as i64)
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i != 0),
            other => Err(Error::Conversion(format!(
                "expected integer, got {}",
                other.kind()
            ))),
        }
    }
}

impl FieldValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(Error::Conversion(format!(
                "expected text, got {}",
                other.kind()
            ))),
        }
    }
}

impl FieldValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(b) => Ok(b),
            other => Err(Error::Conversion(format!(
                "expected blob, got {}",
                other.kind()
            ))),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// [`Value`] passes through unchanged, so associative values can carry
/// whatever the driver returned.
impl FieldValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

#[cfg(feature = "uuid")]
impl FieldValue for uuid::Uuid {
    fn to_value(&self) -> Value {
        Value::Text(self.hyphenated().to_string())
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => uuid::Uuid::parse_str(&s)
                .map_err(|e| Error::Conversion(format!("invalid uuid text: {e}"))),
            Value::Blob(b) => uuid::Uuid::from_slice(&b)
                .map_err(|e| Error::Conversion(format!("invalid uuid blob: {e}"))),
            other => Err(Error::Conversion(format!(
                "expected text or blob for uuid, got {}",
                other.kind()
            ))),
        }
    }
}

#[cfg(feature = "chrono")]
macro_rules! impl_field_value_chrono {
    ($($ty:ty),*) => { $(
        impl FieldValue for $ty {
            fn to_value(&self) -> Value {
                Value::Text(self.to_string())
            }
            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Text(s) => s.parse().map_err(|e| {
                        Error::Conversion(format!("invalid datetime text: {e}"))
                    }),
                    other => Err(Error::Conversion(format!(
                        "expected text for datetime, got {}",
                        other.kind()
                    ))),
                }
            }
        }
    )* }
}

#[cfg(feature = "chrono")]
impl_field_value_chrono!(chrono::NaiveDate, chrono::NaiveTime);

/// Stored in the driver's conventional `YYYY-MM-DD HH:MM:SS[.fff]` form;
/// the `T`-separated form is accepted on the way back in.
#[cfg(feature = "chrono")]
impl FieldValue for chrono::NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Text(self.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| s.parse())
                .map_err(|e| Error::Conversion(format!("invalid datetime text: {e}"))),
            other => Err(Error::Conversion(format!(
                "expected text for datetime, got {}",
                other.kind()
            ))),
        }
    }
}

#[cfg(feature = "serde")]
impl FieldValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => serde_json::from_str(&s)
                .map_err(|e| Error::Conversion(format!("invalid json text: {e}"))),
            other => Err(Error::Conversion(format!(
                "expected text for json, got {}",
                other.kind()
            ))),
        }
    }
}

//------------------------------------------------------------------------------
// rusqlite conversions
//------------------------------------------------------------------------------

#[cfg(feature = "rusqlite")]
impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, ValueRef};
        let out = match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
        };
        Ok(out)
    }
}

#[cfg(feature = "rusqlite")]
impl rusqlite::types::FromSql for Value {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        use rusqlite::types::ValueRef;
        let result = match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        };
        Ok(result)
    }
}

#[cfg(feature = "rusqlite")]
impl From<rusqlite::types::Value> for Value {
    fn from(value: rusqlite::types::Value) -> Self {
        match value {
            rusqlite::types::Value::Null => Value::Null,
            rusqlite::types::Value::Integer(i) => Value::Integer(i),
            rusqlite::types::Value::Real(r) => Value::Real(r),
            rusqlite::types::Value::Text(s) => Value::Text(s),
            rusqlite::types::Value::Blob(b) => Value::Blob(b),
        }
    }
}

#[cfg(feature = "rusqlite")]
impl From<Value> for rusqlite::types::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => rusqlite::types::Value::Null,
            Value::Integer(i) => rusqlite::types::Value::Integer(i),
            Value::Real(r) => rusqlite::types::Value::Real(r),
            Value::Text(s) => rusqlite::types::Value::Text(s),
            Value::Blob(b) => rusqlite::types::Value::Blob(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_round_trip() {
        let v = 42i32.to_value();
        assert_eq!(v, Value::Integer(42));
        assert_eq!(i32::from_value(v).unwrap(), 42);
    }

    #[test]
    fn integer_out_of_range() {
        let err = u8::from_value(Value::Integer(300)).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn option_null_round_trip() {
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert_eq!(None::<i64>.to_value(), Value::Null);
        assert_eq!(
            Option::<String>::from_value(Value::Text("x".into())).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn kind_mismatch_reports_storage_class() {
        let err = String::from_value(Value::Integer(1)).unwrap_err();
        assert_eq!(err.to_string(), "expected text, got integer");
    }

    #[test]
    fn real_accepts_integer_affinity() {
        assert_eq!(f64::from_value(Value::Integer(3)).unwrap(), 3.0);
    }

    #[cfg(feature = "uuid")]
    #[test]
    fn uuid_round_trip() {
        let id = uuid::Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let v = id.to_value();
        assert_eq!(v, Value::Text("67e55044-10b1-426f-9247-bb680e5fe0c8".into()));
        assert_eq!(uuid::Uuid::from_value(v).unwrap(), id);
        // Blob-stored UUIDs come back too.
        let blob = Value::Blob(id.as_bytes().to_vec());
        assert_eq!(uuid::Uuid::from_value(blob).unwrap(), id);
        assert!(uuid::Uuid::from_value(Value::Integer(1)).is_err());
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn date_and_time_round_trip() {
        let date: chrono::NaiveDate = "2024-03-01".parse().unwrap();
        assert_eq!(date.to_value(), Value::Text("2024-03-01".into()));
        assert_eq!(chrono::NaiveDate::from_value(date.to_value()).unwrap(), date);

        let time: chrono::NaiveTime = "12:30:45".parse().unwrap();
        assert_eq!(chrono::NaiveTime::from_value(time.to_value()).unwrap(), time);

        assert!(chrono::NaiveDate::from_value(Value::Text("not a date".into())).is_err());
        assert!(chrono::NaiveDate::from_value(Value::Integer(0)).is_err());
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn datetime_round_trips_both_separators() {
        let ts: chrono::NaiveDateTime = "2024-03-01T12:30:45".parse().unwrap();
        assert_eq!(ts.to_value(), Value::Text("2024-03-01 12:30:45".into()));
        assert_eq!(chrono::NaiveDateTime::from_value(ts.to_value()).unwrap(), ts);
        assert_eq!(
            chrono::NaiveDateTime::from_value(Value::Text("2024-03-01T12:30:45".into())).unwrap(),
            ts
        );
        let fractional: chrono::NaiveDateTime = "2024-03-01T12:30:45.250".parse().unwrap();
        assert_eq!(
            chrono::NaiveDateTime::from_value(fractional.to_value()).unwrap(),
            fractional
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_round_trip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a":1,"b":[true,null],"c":"x"}"#).unwrap();
        let v = json.to_value();
        assert!(matches!(v, Value::Text(_)));
        assert_eq!(serde_json::Value::from_value(v).unwrap(), json);
        assert!(serde_json::Value::from_value(Value::Text("{not json".into())).is_err());
        assert!(serde_json::Value::from_value(Value::Blob(vec![1])).is_err());
    }
}
