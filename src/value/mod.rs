//! Typed Scalar Values
//!
//! The value model shared by the catalog, the shadow index and the planner:
//!
//! - **ValueType**: the closed set of keyword types (integer widths, floats, time, text)
//! - **Value**: a tagged scalar with a reserved missing sentinel per type
//! - **Literal codec**: `parse` text into values and `format` values as query literals
//! - **Conversion**: range-checked, exactness-aware `convert` between types
//!
//! # Missing values
//!
//! ```text
//! char      i8::MIN          float   NaN
//! short     i16::MIN         double  NaN
//! int       i32::MIN         time    -211087684800.0 (JD_0)
//! longlong  i64::MIN         string  ""
//! ```

mod convert;
mod error;
mod literal;
pub mod time;

pub use convert::convert;
pub use error::{ValueError, ValueResult};
pub use literal::{format, parse, parse_with_unit, quote_text};

use serde::{Deserialize, Serialize};

/// Keyword value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// 8-bit signed integer
    #[serde(alias = "int8")]
    Char,
    /// 16-bit signed integer
    #[serde(alias = "int16")]
    Short,
    /// 32-bit signed integer
    #[serde(alias = "int32")]
    Int,
    /// 64-bit signed integer
    #[serde(alias = "int64")]
    LongLong,
    /// 32-bit float
    #[serde(alias = "float32")]
    Float,
    /// 64-bit float
    #[serde(alias = "float64")]
    Double,
    /// Timestamp, seconds since 1977.01.01_00:00:00_TAI
    Time,
    /// Text
    #[serde(alias = "text")]
    String,
}

impl ValueType {
    /// Get all types for iteration
    pub fn all() -> &'static [ValueType] {
        &[
            ValueType::Char,
            ValueType::Short,
            ValueType::Int,
            ValueType::LongLong,
            ValueType::Float,
            ValueType::Double,
            ValueType::Time,
            ValueType::String,
        ]
    }

    /// Canonical type name
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Char => "char",
            ValueType::Short => "short",
            ValueType::Int => "int",
            ValueType::LongLong => "longlong",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Time => "time",
            ValueType::String => "string",
        }
    }

    /// Parse a type name (case-insensitive, accepts width aliases)
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "char" | "int8" => Some(ValueType::Char),
            "short" | "int16" => Some(ValueType::Short),
            "int" | "int32" => Some(ValueType::Int),
            "longlong" | "int64" => Some(ValueType::LongLong),
            "float" | "float32" => Some(ValueType::Float),
            "double" | "float64" => Some(ValueType::Double),
            "time" => Some(ValueType::Time),
            "string" | "text" => Some(ValueType::String),
            _ => None,
        }
    }

    /// True for the four integer widths
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ValueType::Char | ValueType::Short | ValueType::Int | ValueType::LongLong
        )
    }

    /// True for float, double and time
    pub fn is_real(&self) -> bool {
        matches!(self, ValueType::Float | ValueType::Double | ValueType::Time)
    }

    /// Bit width of integer types
    pub(crate) fn int_bits(&self) -> Option<u32> {
        match self {
            ValueType::Char => Some(8),
            ValueType::Short => Some(16),
            ValueType::Int => Some(32),
            ValueType::LongLong => Some(64),
            _ => None,
        }
    }

    /// Signed range of integer types
    pub(crate) fn int_range(&self) -> Option<(i64, i64)> {
        match self {
            ValueType::Char => Some((i8::MIN as i64, i8::MAX as i64)),
            ValueType::Short => Some((i16::MIN as i64, i16::MAX as i64)),
            ValueType::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            ValueType::LongLong => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A typed scalar value
///
/// Equality treats two NaN floats as equal so the missing sentinel compares
/// equal to itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Char(i8),
    Short(i16),
    Int(i32),
    LongLong(i64),
    Float(f32),
    Double(f64),
    Time(f64),
    String(String),
}

impl Value {
    /// The missing-value sentinel for a type
    pub fn missing(ty: ValueType) -> Self {
        match ty {
            ValueType::Char => Value::Char(i8::MIN),
            ValueType::Short => Value::Short(i16::MIN),
            ValueType::Int => Value::Int(i32::MIN),
            ValueType::LongLong => Value::LongLong(i64::MIN),
            ValueType::Float => Value::Float(f32::NAN),
            ValueType::Double => Value::Double(f64::NAN),
            ValueType::Time => Value::Time(time::MISSING_TIME),
            ValueType::String => Value::String(String::new()),
        }
    }

    /// Type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Char(_) => ValueType::Char,
            Value::Short(_) => ValueType::Short,
            Value::Int(_) => ValueType::Int,
            Value::LongLong(_) => ValueType::LongLong,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::Time(_) => ValueType::Time,
            Value::String(_) => ValueType::String,
        }
    }

    /// Check whether this value is its type's missing sentinel
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Char(v) => *v == i8::MIN,
            Value::Short(v) => *v == i16::MIN,
            Value::Int(v) => *v == i32::MIN,
            Value::LongLong(v) => *v == i64::MIN,
            Value::Float(v) => v.is_nan(),
            Value::Double(v) => v.is_nan(),
            Value::Time(v) => v.is_nan() || *v == time::MISSING_TIME,
            Value::String(s) => s.is_empty(),
        }
    }

    /// Integer payload widened to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Char(v) => Some(*v as i64),
            Value::Short(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::LongLong(v) => Some(*v),
            _ => None,
        }
    }

    /// Real payload widened to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) | Value::Time(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        fn real_eq(a: f64, b: f64) -> bool {
            (a.is_nan() && b.is_nan()) || a == b
        }

        match (self, other) {
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::LongLong(a), Value::LongLong(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => real_eq(*a as f64, *b as f64),
            (Value::Double(a), Value::Double(b)) => real_eq(*a, *b),
            (Value::Time(a), Value::Time(b)) => real_eq(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Char(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::LongLong(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", time::format_time(*v, "TAI", 0)),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}
