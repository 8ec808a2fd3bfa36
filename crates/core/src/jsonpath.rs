//! Dot-path edits on JSON values
//!
//! A path such as `a.b.0.c` walks objects by key and arrays by index.
//! Missing intermediates are created as empty objects, never arrays.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One edit at a dot path
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Set the value, creating intermediates as needed
    Set(Value),
    /// Remove the key or array element; missing paths are ignored
    Delete,
}

fn segments(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::InvalidArgument(format!("invalid path '{path}'")));
    }
    Ok(segments)
}

/// Apply a single update; `target` must be an object
pub fn apply(target: &mut Value, path: &str, update: Update) -> Result<()> {
    if !target.is_object() {
        return Err(Error::InvalidArgument(
            "updates can only be applied to a JSON object".into(),
        ));
    }
    let segments = segments(path)?;
    match update {
        Update::Set(value) => set_at(target, &segments, value, path),
        Update::Delete => {
            delete_at(target, &segments);
            Ok(())
        }
    }
}

/// Apply updates in order
pub fn apply_all<I, P>(target: &mut Value, updates: I) -> Result<()>
where
    I: IntoIterator<Item = (P, Update)>,
    P: AsRef<str>,
{
    for (path, update) in updates {
        apply(target, path.as_ref(), update)?;
    }
    Ok(())
}

fn set_at(node: &mut Value, segments: &[&str], value: Value, path: &str) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };

    if let Value::Array(items) = node {
        let index: usize = head.parse().map_err(|_| {
            Error::InvalidArgument(format!("'{head}' in '{path}' must index an array"))
        })?;
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        let child = &mut items[index];
        if !rest.is_empty() && !is_container(child) {
            *child = Value::Object(Map::new());
        }
        return set_at(child, rest, value, path);
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let map = node
        .as_object_mut()
        .ok_or_else(|| Error::InvalidArgument(format!("cannot set '{path}'")))?;
    let child = map
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !rest.is_empty() && !is_container(child) {
        *child = Value::Object(Map::new());
    }
    set_at(child, rest, value, path)
}

fn delete_at(node: &mut Value, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    match node {
        Value::Object(map) if rest.is_empty() => {
            map.remove(*head);
        }
        Value::Object(map) => {
            if let Some(child) = map.get_mut(*head) {
                delete_at(child, rest);
            }
        }
        Value::Array(items) => {
            let Ok(index) = head.parse::<usize>() else {
                return;
            };
            if index >= items.len() {
                return;
            }
            if rest.is_empty() {
                items.remove(index);
            } else {
                delete_at(&mut items[index], rest);
            }
        }
        _ => {}
    }
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

/// Value at a dot path, `None` when any segment is missing
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_set_and_delete_together() {
        let mut value = json!({"a": 1, "b": 2});
        apply_all(
            &mut value,
            [("b", Update::Delete), ("c", Update::Set(json!(3)))],
        )
        .unwrap();
        assert_eq!(value, json!({"a": 1, "c": 3}));
    }

    #[test]
    fn test_missing_intermediates_become_objects() {
        let mut value = json!({});
        apply(&mut value, "x.y", Update::Set(json!(5))).unwrap();
        assert_eq!(value, json!({"x": {"y": 5}}));

        apply(&mut value, "p.0.q", Update::Set(json!(true))).unwrap();
        assert_eq!(value["p"], json!({"0": {"q": true}}));
    }

    #[test]
    fn test_numeric_segments_index_arrays() {
        let mut value = json!({"list": [1, 2, 3]});
        apply(&mut value, "list.1", Update::Set(json!("two"))).unwrap();
        apply(&mut value, "list.5", Update::Set(json!(6))).unwrap();
        assert_eq!(value["list"], json!([1, "two", 3, null, null, 6]));

        apply(&mut value, "list.0", Update::Delete).unwrap();
        assert_eq!(value["list"], json!(["two", 3, null, null, 6]));

        let err = apply(&mut value, "list.name", Update::Set(json!(1))).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_scalar_intermediate_is_replaced() {
        let mut value = json!({"a": 7});
        apply(&mut value, "a.b", Update::Set(json!(1))).unwrap();
        assert_eq!(value, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut value = json!({"a": {"b": 1}});
        apply(&mut value, "a.c.d", Update::Delete).unwrap();
        apply(&mut value, "z", Update::Delete).unwrap();
        assert_eq!(value, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_rejects_non_object_target_and_bad_paths() {
        let mut value = json!([1, 2]);
        assert!(apply(&mut value, "0", Update::Delete).is_err());

        let mut value = json!({});
        assert!(apply(&mut value, "a..b", Update::Set(json!(1))).is_err());
        assert!(apply(&mut value, "", Update::Set(json!(1))).is_err());
    }

    #[test]
    fn test_lookup() {
        let value = json!({"a": {"list": [{"b": "x"}]}});
        assert_eq!(lookup(&value, "a.list.0.b"), Some(&json!("x")));
        assert_eq!(lookup(&value, "a.missing"), None);
        assert_eq!(lookup(&value, "a.list.9"), None);
        assert_eq!(lookup(&value, ""), Some(&value));
    }
}
