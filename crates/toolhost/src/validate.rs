//! Argument validation against a descriptor's parameter schema.

use serde_json::{Map, Number, Value};

use crate::descriptor::{CapabilityDescriptor, ParamSpec, ParamType};
use crate::handler::Arguments;

/// Validate raw arguments, apply defaults, and coerce convertible values.
///
/// Unknown arguments are dropped. `null` is treated as absent. The error
/// string names the first offending parameter.
pub fn validate_arguments(
    descriptor: &CapabilityDescriptor,
    arguments: Option<Value>,
) -> Result<Arguments, String> {
    let mut raw = match arguments {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(format!(
                "arguments must be an object, got {}",
                type_name(&other)
            ))
        }
    };

    let mut validated = Map::new();
    for param in &descriptor.params {
        match raw.remove(&param.name) {
            None | Some(Value::Null) => {
                if let Some(default) = &param.default {
                    validated.insert(param.name.clone(), default.clone());
                } else if param.required {
                    return Err(format!("missing required argument '{}'", param.name));
                }
            }
            Some(value) => {
                let coerced = coerce(param, value)?;
                validated.insert(param.name.clone(), coerced);
            }
        }
    }

    if !raw.is_empty() {
        tracing::debug!(
            "Ignoring unknown arguments for {} '{}': {:?}",
            descriptor.kind,
            descriptor.name,
            raw.keys().collect::<Vec<_>>()
        );
    }

    Ok(Arguments::new(validated))
}

fn coerce(param: &ParamSpec, value: Value) -> Result<Value, String> {
    let mismatch = |value: &Value| {
        format!(
            "argument '{}' expected {}, got {}",
            param.name,
            param.param_type.schema_name().unwrap_or("any"),
            type_name(value)
        )
    };

    match (param.param_type, value) {
        (ParamType::Any, v) => Ok(v),
        (ParamType::String, v @ Value::String(_)) => Ok(v),
        (ParamType::Boolean, v @ Value::Bool(_)) => Ok(v),
        (ParamType::Boolean, Value::String(s)) => match s.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch(&Value::String(s.clone()))),
        },
        (ParamType::Integer, Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15) {
                Ok(Value::from(f as i64))
            } else {
                Err(mismatch(&Value::Number(n)))
            }
        }
        (ParamType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| mismatch(&Value::String(s))),
        (ParamType::Number, v @ Value::Number(_)) => Ok(v),
        (ParamType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| mismatch(&Value::String(s))),
        (ParamType::Array, v @ Value::Array(_)) => Ok(v),
        (ParamType::Object, v @ Value::Object(_)) => Ok(v),
        (_, v) => Err(mismatch(&v)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forecast() -> CapabilityDescriptor {
        CapabilityDescriptor::tool("get_forecast")
            .required("location", ParamType::String)
            .with_default("days", ParamType::Integer, json!(3))
            .optional("metric", ParamType::Boolean)
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let args = validate_arguments(&forecast(), Some(json!({"location": "Oslo"}))).unwrap();
        assert_eq!(args.into_value(), json!({"location": "Oslo", "days": 3}));
    }

    #[test]
    fn test_missing_required() {
        let err = validate_arguments(&forecast(), None).unwrap_err();
        assert!(err.contains("location"), "{err}");
        let err = validate_arguments(&forecast(), Some(json!({"location": null}))).unwrap_err();
        assert!(err.contains("location"), "{err}");
    }

    #[test]
    fn test_unknown_arguments_dropped() {
        let args =
            validate_arguments(&forecast(), Some(json!({"location": "Oslo", "units": "si"})))
                .unwrap();
        assert!(args.get("units").is_none());
    }

    #[test]
    fn test_convertible_values_coerced() {
        let args = validate_arguments(
            &forecast(),
            Some(json!({"location": "Oslo", "days": "2", "metric": "true"})),
        )
        .unwrap();
        assert_eq!(args.get("days"), Some(&json!(2)));
        assert_eq!(args.get("metric"), Some(&json!(true)));

        let args =
            validate_arguments(&forecast(), Some(json!({"location": "Oslo", "days": 2.0}))).unwrap();
        assert_eq!(args.get("days"), Some(&json!(2)));
    }

    #[test]
    fn test_type_mismatch() {
        let err = validate_arguments(&forecast(), Some(json!({"location": 7}))).unwrap_err();
        assert!(err.contains("expected string"), "{err}");
        let err = validate_arguments(
            &forecast(),
            Some(json!({"location": "Oslo", "days": 2.5})),
        )
        .unwrap_err();
        assert!(err.contains("days"), "{err}");
        assert!(validate_arguments(
            &forecast(),
            Some(json!({"location": "Oslo", "days": "soon"}))
        )
        .is_err());
    }

    #[test]
    fn test_non_object_arguments() {
        let err = validate_arguments(&forecast(), Some(json!(["Oslo"]))).unwrap_err();
        assert!(err.contains("object"), "{err}");
    }
}
