//! Flatten nested documents into dotted-path fields.

use serde_json::{Map, Value};

use esbridge_shared::{FieldValue, Record};

/// Flatten a whole document: nested objects become `parent.child` paths at any
/// depth, scalars are kept and arrays become multivalue fields.
pub fn flatten(document: &Map<String, Value>) -> Record {
    flatten_fields(document)
}

/// Flatten an arbitrary sequence of top-level entries.
pub fn flatten_fields<'a, I>(entries: I) -> Record
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    let mut out = Record::new();
    for (key, value) in entries {
        flatten_into(key, value, &mut out);
    }
    out
}

fn flatten_into(path: &str, value: &Value, out: &mut Record) {
    match value {
        Value::Object(children) => {
            for (child, nested) in children {
                flatten_into(&format!("{path}.{child}"), nested, out);
            }
        }
        other => out.insert(path, FieldValue::from(other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn nested_objects_become_dotted_paths() {
        let flat = flatten(&doc(json!({"a": {"b": 1, "c": {"d": 2}}})));

        assert_eq!(flat.len(), 2);
        assert_eq!(flat.get("a.b"), Some(&FieldValue::scalar(1)));
        assert_eq!(flat.get("a.c.d"), Some(&FieldValue::scalar(2)));
    }

    #[test]
    fn scalars_and_arrays_are_kept() {
        let flat = flatten(&doc(json!({
            "host": "web-1",
            "ports": [80, 443],
            "geo": {"tags": ["eu", "west"]},
            "missing": null
        })));

        assert_eq!(flat.get("host"), Some(&FieldValue::scalar("web-1")));
        assert_eq!(flat.get("ports"), Some(&FieldValue::from(json!([80, 443]))));
        assert!(flat.get("geo.tags").is_some_and(FieldValue::is_multi));
        assert_eq!(flat.get("missing"), Some(&FieldValue::Scalar(Value::Null)));
    }

    #[test]
    fn no_value_is_a_nested_object() {
        let flat = flatten(&doc(json!({"x": {"y": {"z": {"w": true}}}, "list": [{"k": 1}]})));
        for (_, value) in flat.iter() {
            match value {
                FieldValue::Scalar(v) => assert!(!v.is_object()),
                FieldValue::Multi(vs) => assert!(vs.iter().all(|v| !v.is_object())),
            }
        }
    }

    #[test]
    fn empty_nested_object_contributes_nothing() {
        let flat = flatten(&doc(json!({"a": {}, "b": 1})));
        assert_eq!(flat.len(), 1);
        assert!(flat.contains("b"));
    }
}
