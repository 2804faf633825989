//! Type conversion
//!
//! Missing values convert to the target's missing sentinel without taking the
//! conversion path. Narrowing that loses the value entirely is `Range`;
//! narrowing that only loses precision is `Inexact` carrying the rounded result.

use super::literal::{integer_value, parse};
use super::{Value, ValueError, ValueResult, ValueType};

/// Convert `value` to `target`
pub fn convert(value: &Value, target: ValueType) -> ValueResult<Value> {
    if value.is_missing() {
        return Ok(Value::missing(target));
    }
    if value.value_type() == target {
        return Ok(value.clone());
    }

    let range_err = || ValueError::Range {
        target: target.name(),
        source_text: value.to_string(),
    };

    if let Value::String(text) = value {
        return parse(text, target);
    }
    if target == ValueType::String {
        return Ok(Value::String(value.to_string()));
    }

    if let Some(v) = value.as_i64() {
        return match target {
            ValueType::Char | ValueType::Short | ValueType::Int | ValueType::LongLong => {
                integer_value(v, target).ok_or_else(range_err)
            }
            ValueType::Float => {
                let f = v as f32;
                if f as i64 == v && v != i64::MAX {
                    Ok(Value::Float(f))
                } else {
                    Err(ValueError::Inexact {
                        approximate: Value::Float(f),
                    })
                }
            }
            ValueType::Double | ValueType::Time => {
                let d = v as f64;
                let approximate = real_value(d, target);
                if d as i64 == v && d != i64::MAX as f64 {
                    Ok(approximate)
                } else {
                    Err(ValueError::Inexact { approximate })
                }
            }
            ValueType::String => Ok(Value::String(v.to_string())),
        };
    }

    // Real source: float, double or time
    let v = value.as_f64().ok_or_else(range_err)?;
    match target {
        ValueType::Char | ValueType::Short | ValueType::Int | ValueType::LongLong => {
            if !v.is_finite() {
                return Err(range_err());
            }
            // Round half away from zero
            let rounded = v.round();
            let (min, max) = target.int_range().ok_or_else(range_err)?;
            if rounded < min as f64 || rounded > max as f64 || rounded >= 9.223_372_036_854_776e18 {
                return Err(range_err());
            }
            let approximate = integer_value(rounded as i64, target).ok_or_else(range_err)?;
            if rounded == v {
                Ok(approximate)
            } else {
                Err(ValueError::Inexact { approximate })
            }
        }
        ValueType::Float => {
            if v.is_finite() && v.abs() > f32::MAX as f64 {
                return Err(range_err());
            }
            let f = v as f32;
            if f as f64 == v {
                Ok(Value::Float(f))
            } else {
                Err(ValueError::Inexact {
                    approximate: Value::Float(f),
                })
            }
        }
        ValueType::Double | ValueType::Time => Ok(real_value(v, target)),
        ValueType::String => Ok(Value::String(value.to_string())),
    }
}

fn real_value(v: f64, target: ValueType) -> Value {
    match target {
        ValueType::Time => Value::Time(v),
        _ => Value::Double(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_integer_rounds_half_away() {
        let err = convert(&Value::Float(3.5), ValueType::Int).unwrap_err();
        assert_eq!(err.approximate(), Some(&Value::Int(4)));

        let err = convert(&Value::Double(-2.5), ValueType::Short).unwrap_err();
        assert_eq!(err.approximate(), Some(&Value::Short(-3)));

        assert_eq!(convert(&Value::Double(42.0), ValueType::Char).unwrap(), Value::Char(42));
    }

    #[test]
    fn test_integer_narrowing() {
        assert!(matches!(
            convert(&Value::Int(300), ValueType::Char),
            Err(ValueError::Range { target: "char", .. })
        ));
        assert_eq!(convert(&Value::LongLong(-5), ValueType::Short).unwrap(), Value::Short(-5));
        assert!(convert(&Value::Double(1.0e10), ValueType::Int).is_err());
        assert!(convert(&Value::Double(f64::INFINITY), ValueType::LongLong).is_err());
    }

    #[test]
    fn test_text_sources() {
        assert!(matches!(
            convert(&Value::String("300".to_string()), ValueType::Char),
            Err(ValueError::Range { .. })
        ));
        assert_eq!(
            convert(&Value::String("0x12".to_string()), ValueType::Char).unwrap(),
            Value::Char(18)
        );
        assert!(matches!(
            convert(&Value::String("twelve".to_string()), ValueType::Int),
            Err(ValueError::BadString { .. })
        ));
    }

    #[test]
    fn test_missing_propagates() {
        let out = convert(&Value::missing(ValueType::Double), ValueType::Char).unwrap();
        assert_eq!(out, Value::missing(ValueType::Char));

        let out = convert(&Value::missing(ValueType::Int), ValueType::Time).unwrap();
        assert_eq!(out, Value::missing(ValueType::Time));
    }

    #[test]
    fn test_real_narrowing() {
        assert_eq!(convert(&Value::Double(0.5), ValueType::Float).unwrap(), Value::Float(0.5));
        let err = convert(&Value::Double(0.1), ValueType::Float).unwrap_err();
        assert_eq!(err.approximate(), Some(&Value::Float(0.1)));
        assert!(matches!(
            convert(&Value::Double(1.0e300), ValueType::Float),
            Err(ValueError::Range { .. })
        ));
        assert_eq!(convert(&Value::Float(1.5), ValueType::Double).unwrap(), Value::Double(1.5));
        assert_eq!(convert(&Value::Double(9.0), ValueType::Time).unwrap(), Value::Time(9.0));
    }

    #[test]
    fn test_large_integer_to_double_is_inexact() {
        let v = (1i64 << 53) + 1;
        assert!(matches!(
            convert(&Value::LongLong(v), ValueType::Double),
            Err(ValueError::Inexact { .. })
        ));
        assert_eq!(
            convert(&Value::LongLong(1 << 40), ValueType::Double).unwrap(),
            Value::Double((1u64 << 40) as f64)
        );
    }
}
