use std::fmt;

use serde_json::Value;

pub(crate) fn write_string_no_escape(value: &Value, f: &mut fmt::Formatter) -> fmt::Result {
    match value {
        Value::Null => write!(f, "null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Number(n) => write!(f, "{n}"),
        Value::String(s) => write!(f, "{s}"),
        Value::Array(arr) => write_list_no_escape(arr, f),
        Value::Object(obj) => {
            write!(f, "{{")?;
            let mut first = true;
            for (key, value) in obj {
                if !first {
                    write!(f, ",")?;
                }
                first = false;
                write!(f, "{key}:")?;
                write_string_no_escape(value, f)?;
            }
            write!(f, "}}")
        }
    }
}

pub(crate) fn write_list_no_escape(values: &[Value], f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "[")?;
    let mut first = true;
    for item in values {
        if !first {
            write!(f, ",")?;
        }
        first = false;
        write_string_no_escape(item, f)?;
    }
    write!(f, "]")
}

/// Replaces containers nested deeper than `depth` levels with `null`.
///
/// `depth == 0` leaves the value untouched.
pub(crate) fn truncate_depth(value: Value, depth: usize) -> Value {
    if depth == 0 {
        return value;
    }
    truncate_at(value, depth)
}
fn truncate_at(value: Value, remaining: usize) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) if remaining == 0 => Value::Null,
        Value::Array(arr) => Value::Array(
            arr.into_iter()
                .map(|v| truncate_at(v, remaining - 1))
                .collect(),
        ),
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(k, v)| (k, truncate_at(v, remaining - 1)))
                .collect(),
        ),
        v => v,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::truncate_depth;

    #[test]
    fn truncate_zero_is_unlimited() {
        let v = json!({"a": {"b": {"c": [1, 2]}}});
        assert_eq!(truncate_depth(v.clone(), 0), v);
    }

    #[test]
    fn truncate_keeps_top_level_scalars() {
        let v = json!({"name": "x", "child": {"grand": {"n": 1}}});
        assert_eq!(
            truncate_depth(v, 2),
            json!({"name": "x", "child": {"grand": null}})
        );
    }

    #[test]
    fn truncate_scalar_root() {
        assert_eq!(truncate_depth(json!(5), 1), json!(5));
        assert_eq!(truncate_depth(json!([[1]]), 1), json!([null]));
    }
}
