//! Literal codec
//!
//! `parse` reads caller or store text into a typed value and `format` renders a
//! value as a query literal. The two are inverse for every non-missing value
//! and for each type's missing sentinel.

use super::{convert, time, Value, ValueError, ValueResult, ValueType};

fn bad(ty: ValueType, text: &str) -> ValueError {
    ValueError::BadString {
        target: ty.name(),
        text: text.to_string(),
    }
}

/// Quote text as a single-quoted literal, doubling embedded quotes
pub fn quote_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Strip one level of single quoting, undoubling embedded quotes
fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

fn is_missing_word(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("missing")
}

/// Parse text as a value of type `ty`
pub fn parse(text: &str, ty: ValueType) -> ValueResult<Value> {
    parse_with_unit(text, ty, None)
}

/// Parse text as a value of type `ty`, using `unit` to interpret time intervals
pub fn parse_with_unit(text: &str, ty: ValueType, unit: Option<&str>) -> ValueResult<Value> {
    let trimmed = text.trim();

    if ty == ValueType::String {
        return Ok(Value::String(
            unquote(trimmed).unwrap_or_else(|| text.to_string()),
        ));
    }

    let unquoted = unquote(trimmed);
    let s = unquoted.as_deref().unwrap_or(trimmed).trim();

    if is_missing_word(s) {
        return Ok(Value::missing(ty));
    }

    match ty {
        ValueType::Char | ValueType::Short | ValueType::Int | ValueType::LongLong => {
            parse_integer(s, ty, text)
        }
        ValueType::Float => {
            let v: f32 = s.parse().map_err(|_| bad(ty, text))?;
            if v.is_infinite() && s.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
                return Err(ValueError::Range {
                    target: ty.name(),
                    source_text: text.to_string(),
                });
            }
            Ok(Value::Float(v))
        }
        ValueType::Double => s
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| bad(ty, text)),
        ValueType::Time => time::parse_time_with_unit(s, unit).map(Value::Time),
        ValueType::String => Ok(Value::String(s.to_string())),
    }
}

/// Integer text: `0x` hex is checked against the full bit pattern of the
/// target width, decimal text against its signed range.
fn parse_integer(s: &str, ty: ValueType, text: &str) -> ValueResult<Value> {
    let range_err = || ValueError::Range {
        target: ty.name(),
        source_text: text.to_string(),
    };

    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let bits = ty.int_bits().ok_or_else(|| bad(ty, text))?;
        let pattern = u64::from_str_radix(hex, 16).map_err(|e| match e.kind() {
            std::num::IntErrorKind::PosOverflow => range_err(),
            _ => bad(ty, text),
        })?;
        if bits < 64 && pattern >> bits != 0 {
            return Err(range_err());
        }
        // Sign-extend the bit pattern to the target width
        let shift = 64 - bits;
        let v = ((pattern << shift) as i64) >> shift;
        let v = if negative { v.checked_neg().ok_or_else(range_err)? } else { v };
        return integer_value(v, ty).ok_or_else(range_err);
    }

    match s.parse::<i128>() {
        Ok(v) => {
            let v = i64::try_from(v).map_err(|_| range_err())?;
            integer_value(v, ty).ok_or_else(range_err)
        }
        Err(_) => {
            // Real-valued text goes through the float conversion rules
            let real: f64 = s.parse().map_err(|_| bad(ty, text))?;
            convert(&Value::Double(real), ty)
        }
    }
}

/// Build an integer value if `v` lies in the signed range of `ty`
pub(crate) fn integer_value(v: i64, ty: ValueType) -> Option<Value> {
    let (min, max) = ty.int_range()?;
    if v < min || v > max {
        return None;
    }
    match ty {
        ValueType::Char => Some(Value::Char(v as i8)),
        ValueType::Short => Some(Value::Short(v as i16)),
        ValueType::Int => Some(Value::Int(v as i32)),
        ValueType::LongLong => Some(Value::LongLong(v)),
        _ => None,
    }
}

fn format_real(v: f64, display: String) -> String {
    if v.is_nan() {
        "'NaN'".to_string()
    } else if v.is_infinite() {
        if v > 0.0 {
            "'Infinity'".to_string()
        } else {
            "'-Infinity'".to_string()
        }
    } else {
        display
    }
}

/// Format a value as a query literal
pub fn format(value: &Value) -> String {
    match value {
        Value::Char(v) => v.to_string(),
        Value::Short(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::LongLong(v) => v.to_string(),
        Value::Float(v) => format_real(*v as f64, v.to_string()),
        Value::Double(v) => format_real(*v, v.to_string()),
        Value::Time(v) => format_real(*v, v.to_string()),
        Value::String(s) => quote_text(s),
    }
}
