//! Write Coercion
//!
//! Turns the loosely typed value a caller submits into a value of the kind
//! the target tag actually stores.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{TagValue, ValueKind};

/// A value as submitted by a write request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WriteInput {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Bools(Vec<bool>),
    Text(String),
}

impl WriteInput {
    fn describe(&self) -> &'static str {
        match self {
            WriteInput::Bool(_) => "boolean",
            WriteInput::Integer(_) => "integer",
            WriteInput::Float(_) => "float",
            WriteInput::Bools(_) => "boolean sequence",
            WriteInput::Text(_) => "string",
        }
    }
}

/// What to do with a floating-point value aimed at an integral tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionPolicy {
    /// Drop the fractional part (`3.9` is written as `3`)
    #[default]
    Truncate,
    /// Refuse the write
    Reject,
}

/// Errors produced while coercing a write value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("cannot write a {found} to a {expected} tag")]
    TypeMismatch {
        expected: ValueKind,
        found: &'static str,
    },

    #[error("value {value} does not fit a {expected} tag")]
    OutOfRange { expected: ValueKind, value: String },

    #[error("float {0} rejected for integral tag (coercion policy: reject)")]
    FloatRejected(f64),
}

/// Coerce `input` into a value of `kind` under `policy`
pub fn coerce(
    input: WriteInput,
    kind: ValueKind,
    policy: CoercionPolicy,
) -> Result<TagValue, CoercionError> {
    let mismatch = |input: &WriteInput| CoercionError::TypeMismatch {
        expected: kind,
        found: input.describe(),
    };

    match kind {
        ValueKind::Int => match input {
            WriteInput::Integer(v) => Ok(TagValue::Int(v)),
            WriteInput::Float(v) => truncate(v, kind, policy).map(TagValue::Int),
            other => Err(mismatch(&other)),
        },
        ValueKind::UInt => match input {
            WriteInput::Integer(v) => u64::try_from(v)
                .map(TagValue::UInt)
                .map_err(|_| CoercionError::OutOfRange {
                    expected: kind,
                    value: v.to_string(),
                }),
            WriteInput::Float(v) => {
                let truncated = truncate(v, kind, policy)?;
                u64::try_from(truncated)
                    .map(TagValue::UInt)
                    .map_err(|_| CoercionError::OutOfRange {
                        expected: kind,
                        value: v.to_string(),
                    })
            }
            other => Err(mismatch(&other)),
        },
        ValueKind::Float => match input {
            WriteInput::Float(v) => Ok(TagValue::Float(v)),
            WriteInput::Integer(v) => Ok(TagValue::Float(v as f64)),
            other => Err(mismatch(&other)),
        },
        ValueKind::Boolean => match input {
            WriteInput::Bool(v) => Ok(TagValue::Boolean(v)),
            other => Err(mismatch(&other)),
        },
        ValueKind::BooleanArray => match input {
            WriteInput::Bools(v) => Ok(TagValue::BooleanArray(v)),
            other => Err(mismatch(&other)),
        },
        ValueKind::Text => match input {
            WriteInput::Text(v) => Ok(TagValue::Text(v)),
            other => Err(mismatch(&other)),
        },
    }
}

fn truncate(value: f64, kind: ValueKind, policy: CoercionPolicy) -> Result<i64, CoercionError> {
    if policy == CoercionPolicy::Reject {
        return Err(CoercionError::FloatRejected(value));
    }
    // 2^63; i64::MAX itself is not representable as f64
    const UPPER: f64 = 9_223_372_036_854_775_808.0;

    let truncated = value.trunc();
    if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated >= UPPER {
        return Err(CoercionError::OutOfRange {
            expected: kind,
            value: value.to_string(),
        });
    }
    Ok(truncated as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_truncated_for_integral_tag() {
        let value = coerce(WriteInput::Float(3.0), ValueKind::Int, CoercionPolicy::Truncate);
        assert_eq!(value, Ok(TagValue::Int(3)));

        let value = coerce(WriteInput::Float(-7.9), ValueKind::Int, CoercionPolicy::Truncate);
        assert_eq!(value, Ok(TagValue::Int(-7)));

        let value = coerce(WriteInput::Float(12.6), ValueKind::UInt, CoercionPolicy::Truncate);
        assert_eq!(value, Ok(TagValue::UInt(12)));
    }

    #[test]
    fn test_reject_policy() {
        let result = coerce(WriteInput::Float(3.0), ValueKind::Int, CoercionPolicy::Reject);
        assert_eq!(result, Err(CoercionError::FloatRejected(3.0)));

        // Integers are unaffected by the policy
        let result = coerce(WriteInput::Integer(3), ValueKind::Int, CoercionPolicy::Reject);
        assert_eq!(result, Ok(TagValue::Int(3)));
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(
            coerce(WriteInput::Integer(-1), ValueKind::UInt, CoercionPolicy::Truncate),
            Err(CoercionError::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce(WriteInput::Float(f64::NAN), ValueKind::Int, CoercionPolicy::Truncate),
            Err(CoercionError::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce(WriteInput::Float(1e20), ValueKind::Int, CoercionPolicy::Truncate),
            Err(CoercionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let result = coerce(
            WriteInput::Text("on".to_string()),
            ValueKind::Boolean,
            CoercionPolicy::Truncate,
        );
        assert!(matches!(
            result,
            Err(CoercionError::TypeMismatch {
                expected: ValueKind::Boolean,
                found: "string"
            })
        ));
    }

    #[test]
    fn test_integer_widens_to_float() {
        let value = coerce(WriteInput::Integer(4), ValueKind::Float, CoercionPolicy::Reject);
        assert_eq!(value, Ok(TagValue::Float(4.0)));
    }

    #[test]
    fn test_write_input_deserialize() {
        let v: WriteInput = serde_json::from_str("3.0").unwrap();
        assert_eq!(v, WriteInput::Float(3.0));

        let v: WriteInput = serde_json::from_str("3").unwrap();
        assert_eq!(v, WriteInput::Integer(3));

        let v: WriteInput = serde_json::from_str("[true, false]").unwrap();
        assert_eq!(v, WriteInput::Bools(vec![true, false]));

        let v: WriteInput = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(v, WriteInput::Text("auto".to_string()));

        let v: WriteInput = serde_json::from_str("true").unwrap();
        assert_eq!(v, WriteInput::Bool(true));
    }
}
