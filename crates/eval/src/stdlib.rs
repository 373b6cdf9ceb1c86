//! The standard library functions the evaluator models.

use crate::error::EvalError;
use crate::evaluator::{display, json_eq};
use serde_json::Value as JsonValue;

/// Call `package.function` with already-evaluated arguments.
pub fn call(package: &str, function: &str, args: &[JsonValue]) -> Result<JsonValue, EvalError> {
    let name = format!("{}.{}", package, function);
    match (package, function) {
        ("strconv", "FormatInt") => {
            let [value, base] = arity::<2>(&name, args)?;
            let n = int(&name, value)?;
            let base = int(&name, base)?;
            Ok(JsonValue::String(format_int(n, base)))
        }
        ("strconv", "Itoa") => {
            let [value] = arity::<1>(&name, args)?;
            Ok(JsonValue::String(int(&name, value)?.to_string()))
        }
        ("strings", "ToLower") => {
            let [s] = arity::<1>(&name, args)?;
            Ok(JsonValue::String(string(&name, s)?.to_lowercase()))
        }
        ("strings", "ToUpper") => {
            let [s] = arity::<1>(&name, args)?;
            Ok(JsonValue::String(string(&name, s)?.to_uppercase()))
        }
        ("strings", "TrimSpace") => {
            let [s] = arity::<1>(&name, args)?;
            Ok(JsonValue::String(string(&name, s)?.trim().to_string()))
        }
        ("strings", "HasPrefix") => {
            let [s, prefix] = arity::<2>(&name, args)?;
            Ok(JsonValue::Bool(string(&name, s)?.starts_with(string(&name, prefix)?)))
        }
        ("strings", "HasSuffix") => {
            let [s, suffix] = arity::<2>(&name, args)?;
            Ok(JsonValue::Bool(string(&name, s)?.ends_with(string(&name, suffix)?)))
        }
        ("strings", "Contains") => {
            let [s, needle] = arity::<2>(&name, args)?;
            Ok(JsonValue::Bool(string(&name, s)?.contains(string(&name, needle)?)))
        }
        ("strings", "Join") => {
            let [list, separator] = arity::<2>(&name, args)?;
            let parts: Vec<String> = items(&name, list)?.iter().map(display).collect();
            Ok(JsonValue::String(parts.join(string(&name, separator)?)))
        }
        ("strings", "Replace") => {
            let [s, old, new, n] = arity::<4>(&name, args)?;
            let (s, old, new) = (string(&name, s)?, string(&name, old)?, string(&name, new)?);
            let replaced = match int(&name, n)? {
                n if n < 0 => s.replace(old, new),
                n => s.replacen(old, new, n as usize),
            };
            Ok(JsonValue::String(replaced))
        }
        ("list", "Concat") => {
            let [lists] = arity::<1>(&name, args)?;
            let mut out = Vec::new();
            for list in items(&name, lists)? {
                out.extend(items(&name, list)?.iter().cloned());
            }
            Ok(JsonValue::Array(out))
        }
        ("list", "Contains") => {
            let [list, value] = arity::<2>(&name, args)?;
            Ok(JsonValue::Bool(
                items(&name, list)?.iter().any(|item| json_eq(item, value)),
            ))
        }
        ("list", "FlattenN") => {
            let [list, depth] = arity::<2>(&name, args)?;
            Ok(JsonValue::Array(flatten(items(&name, list)?, int(&name, depth)?)))
        }
        _ => Err(EvalError::UnsupportedCall {
            package: package.to_string(),
            function: function.to_string(),
        }),
    }
}

/// Spread nested lists `depth` levels; a negative depth flattens fully.
pub fn flatten(items: &[JsonValue], depth: i64) -> Vec<JsonValue> {
    let mut out = Vec::new();
    for item in items {
        match item {
            JsonValue::Array(inner) if depth != 0 => out.extend(flatten(inner, depth - 1)),
            other => out.push(other.clone()),
        }
    }
    out
}

fn format_int(n: i64, base: i64) -> String {
    let digits = match base {
        2 => format!("{:b}", n.unsigned_abs()),
        8 => format!("{:o}", n.unsigned_abs()),
        16 => format!("{:x}", n.unsigned_abs()),
        _ => n.unsigned_abs().to_string(),
    };
    if n < 0 {
        format!("-{}", digits)
    } else {
        digits
    }
}

fn arity<'a, const N: usize>(
    function: &str,
    args: &'a [JsonValue],
) -> Result<&'a [JsonValue; N], EvalError> {
    args.try_into().map_err(|_| EvalError::ArgumentCount {
        function: function.to_string(),
        expected: N,
        found: args.len(),
    })
}

fn int(function: &str, value: &JsonValue) -> Result<i64, EvalError> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| EvalError::mismatch(function, "int", value)),
        other => Err(EvalError::mismatch(function, "int", other)),
    }
}

fn string<'a>(function: &str, value: &'a JsonValue) -> Result<&'a str, EvalError> {
    value
        .as_str()
        .ok_or_else(|| EvalError::mismatch(function, "string", value))
}

fn items<'a>(function: &str, value: &'a JsonValue) -> Result<&'a [JsonValue], EvalError> {
    match value {
        JsonValue::Array(items) => Ok(items),
        JsonValue::Null => Ok(&[]),
        other => Err(EvalError::mismatch(function, "list", other)),
    }
}
