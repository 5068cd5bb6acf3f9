//! Structural diff and apply over the document's JSON shape.
//!
//! Operations follow RFC 6902 with RFC 6901 pointers. [`diff`] emits only
//! `add`, `remove` and `replace`; [`apply`] understands all six ops.
//!
//! ```text
//!   prev ──┐
//!          ├─ diff ──► [op, op, ...] ──► apply(prev, ops) == next
//!   next ──┘
//! ```
//!
//! Arrays are compared positionally with no move detection, so inserting at
//! the front of a body rewrites every later index. Trailing array removals
//! are emitted highest index first so the ops stay valid when applied in
//! order.

use crate::model::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Invalid JSON pointer '{0}'")]
    InvalidPointer(String),
    #[error("Nothing at '{0}'")]
    NotFound(String),
    #[error("Invalid array index at '{0}'")]
    InvalidIndex(String),
    #[error("Cannot write into a scalar at '{0}'")]
    InvalidTarget(String),
    #[error("Test failed at '{0}'")]
    TestFailed(String),
    #[error("Cannot move '{from}' into its own child '{path}'")]
    MoveIntoChild { from: String, path: String },
    #[error("Document encode error: {0}")]
    Encode(serde_json::Error),
    #[error("Patched value is not a valid document: {0}")]
    Decode(serde_json::Error),
}

/// One JSON patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl Operation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Operation::Add { path: path.into(), value }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Operation::Remove { path: path.into() }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Operation::Replace { path: path.into(), value }
    }

    pub fn path(&self) -> &str {
        match self {
            Operation::Add { path, .. }
            | Operation::Remove { path }
            | Operation::Replace { path, .. }
            | Operation::Move { path, .. }
            | Operation::Copy { path, .. }
            | Operation::Test { path, .. } => path,
        }
    }

    pub fn from_pointer(&self) -> Option<&str> {
        match self {
            Operation::Move { from, .. } | Operation::Copy { from, .. } => Some(from),
            _ => None,
        }
    }
}

// ─── Pointers ───────────────────────────────────────────────────

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Appends one escaped segment to a pointer.
pub fn push_segment(pointer: &str, segment: &str) -> String {
    format!("{pointer}/{}", escape(segment))
}

/// Splits a pointer into unescaped segments. `""` is the whole document.
pub fn parse_pointer(pointer: &str) -> Result<Vec<String>, ApplyError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let rest = pointer
        .strip_prefix('/')
        .ok_or_else(|| ApplyError::InvalidPointer(pointer.to_owned()))?;
    Ok(rest.split('/').map(unescape).collect())
}

fn to_pointer(segments: &[String]) -> String {
    segments.iter().fold(String::new(), |acc, s| push_segment(&acc, s))
}

// ─── Diff ───────────────────────────────────────────────────────

fn diff_into(ops: &mut Vec<Operation>, pointer: &str, prev: &Value, next: &Value) {
    if prev == next {
        return;
    }
    match (prev, next) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                let child = push_segment(pointer, key);
                match new.get(key) {
                    Some(new_value) => diff_into(ops, &child, old_value, new_value),
                    None => ops.push(Operation::remove(child)),
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    ops.push(Operation::add(push_segment(pointer, key), new_value.clone()));
                }
            }
        }
        (Value::Array(old), Value::Array(new)) => {
            let common = old.len().min(new.len());
            for i in 0..common {
                diff_into(ops, &format!("{pointer}/{i}"), &old[i], &new[i]);
            }
            for i in (new.len()..old.len()).rev() {
                ops.push(Operation::remove(format!("{pointer}/{i}")));
            }
            for (i, value) in new.iter().enumerate().skip(old.len()) {
                ops.push(Operation::add(format!("{pointer}/{i}"), value.clone()));
            }
        }
        _ => ops.push(Operation::replace(pointer, next.clone())),
    }
}

/// Minimal-ish op list turning `prev` into `next`.
pub fn diff_values(prev: &Value, next: &Value) -> Vec<Operation> {
    let mut ops = Vec::new();
    diff_into(&mut ops, "", prev, next);
    ops
}

/// Op list turning document `prev` into `next`.
pub fn diff(prev: &Document, next: &Document) -> Result<Vec<Operation>, serde_json::Error> {
    Ok(diff_values(&prev.to_json()?, &next.to_json()?))
}

// ─── Apply ──────────────────────────────────────────────────────

fn get_mut_at<'a>(doc: &'a mut Value, segments: &[String]) -> Result<&'a mut Value, ApplyError> {
    let pointer = to_pointer(segments);
    doc.pointer_mut(&pointer).ok_or(ApplyError::NotFound(pointer))
}

/// Array index per RFC 6901: decimal, no sign, no leading zeros.
fn parse_index(segment: &str, segments: &[String]) -> Result<usize, ApplyError> {
    let valid = !segment.is_empty()
        && segment.bytes().all(|b| b.is_ascii_digit())
        && (segment == "0" || !segment.starts_with('0'));
    if !valid {
        return Err(ApplyError::InvalidIndex(to_pointer(segments)));
    }
    segment
        .parse()
        .map_err(|_| ApplyError::InvalidIndex(to_pointer(segments)))
}

fn apply_add(doc: &mut Value, path: &[String], value: Value) -> Result<(), ApplyError> {
    let Some((key, parent_path)) = path.split_last() else {
        *doc = value;
        return Ok(());
    };
    match get_mut_at(doc, parent_path)? {
        Value::Object(map) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        Value::Array(arr) => {
            if key == "-" {
                arr.push(value);
                return Ok(());
            }
            let idx = parse_index(key, path)?;
            if idx > arr.len() {
                return Err(ApplyError::InvalidIndex(to_pointer(path)));
            }
            arr.insert(idx, value);
            Ok(())
        }
        _ => Err(ApplyError::InvalidTarget(to_pointer(path))),
    }
}

fn apply_remove(doc: &mut Value, path: &[String]) -> Result<Value, ApplyError> {
    let Some((key, parent_path)) = path.split_last() else {
        return Err(ApplyError::InvalidTarget(String::new()));
    };
    match get_mut_at(doc, parent_path)? {
        Value::Object(map) => map
            .remove(key)
            .ok_or_else(|| ApplyError::NotFound(to_pointer(path))),
        Value::Array(arr) => {
            let idx = parse_index(key, path)?;
            if idx >= arr.len() {
                return Err(ApplyError::NotFound(to_pointer(path)));
            }
            Ok(arr.remove(idx))
        }
        _ => Err(ApplyError::InvalidTarget(to_pointer(path))),
    }
}

fn apply_replace(doc: &mut Value, path: &[String], value: Value) -> Result<(), ApplyError> {
    let target = get_mut_at(doc, path)?;
    *target = value;
    Ok(())
}

fn apply_move(doc: &mut Value, from: &[String], path: &[String]) -> Result<(), ApplyError> {
    let source = to_pointer(from);
    if doc.pointer(&source).is_none() {
        return Err(ApplyError::NotFound(source));
    }
    if from == path {
        return Ok(());
    }
    if path.len() > from.len() && path.starts_with(from) {
        return Err(ApplyError::MoveIntoChild {
            from: to_pointer(from),
            path: to_pointer(path),
        });
    }
    let value = apply_remove(doc, from)?;
    apply_add(doc, path, value)
}

fn apply_op(doc: &mut Value, op: &Operation) -> Result<(), ApplyError> {
    let path = parse_pointer(op.path())?;
    match op {
        Operation::Add { value, .. } => apply_add(doc, &path, value.clone()),
        Operation::Remove { .. } => apply_remove(doc, &path).map(|_| ()),
        Operation::Replace { value, .. } => apply_replace(doc, &path, value.clone()),
        Operation::Move { from, .. } => apply_move(doc, &parse_pointer(from)?, &path),
        Operation::Copy { from, .. } => {
            let value = doc
                .pointer(&to_pointer(&parse_pointer(from)?))
                .cloned()
                .ok_or_else(|| ApplyError::NotFound(from.clone()))?;
            apply_add(doc, &path, value)
        }
        Operation::Test { value, .. } => {
            let actual = doc
                .pointer(&to_pointer(&path))
                .ok_or_else(|| ApplyError::NotFound(op.path().to_owned()))?;
            if actual == value {
                Ok(())
            } else {
                Err(ApplyError::TestFailed(op.path().to_owned()))
            }
        }
    }
}

/// Applies `ops` in order to a copy of `prev`. Any failing op fails the
/// whole call and `prev` stays the caller's last-good value.
pub fn apply_value(prev: &Value, ops: &[Operation]) -> Result<Value, ApplyError> {
    let mut working = prev.clone();
    for op in ops {
        apply_op(&mut working, op)?;
    }
    Ok(working)
}

/// Applies `ops` to a document. The result must still parse as a
/// [`Document`].
pub fn apply(prev: &Document, ops: &[Operation]) -> Result<Document, ApplyError> {
    let value = prev.to_json().map_err(ApplyError::Encode)?;
    let patched = apply_value(&value, ops)?;
    Document::from_json(patched).map_err(ApplyError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Point, Widget, WidgetType};
    use crate::path::WidgetPath;
    use crate::{pages, tree};
    use serde_json::json;

    fn one_page_doc() -> Document {
        Document::from_json(json!({"pages": [{"name": "home", "body": []}]})).unwrap()
    }

    #[test]
    fn test_insert_then_remove_emits_single_remove() {
        let base = one_page_doc();
        let with_text = pages::update_page_body(&base, 0, |body| {
            tree::insert(body, &WidgetPath::Root, 0, Widget::new(WidgetType::Text), None)
        })
        .unwrap();
        let added = diff(&base, &with_text).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].path(), "/pages/0/body/0");

        let removed = pages::update_page_body(&with_text, 0, |body| {
            tree::remove(body, &"0".parse().unwrap()).0
        })
        .unwrap();
        let ops = diff(&with_text, &removed).unwrap();
        assert_eq!(ops, vec![Operation::remove("/pages/0/body/0")]);
    }

    #[test]
    fn test_position_change_emits_two_replaces() {
        let base = pages::update_page_body(&one_page_doc(), 0, |body| {
            tree::insert(
                body,
                &WidgetPath::Root,
                0,
                Widget::new(WidgetType::Text),
                Some(Point::new(10.0, 10.0)),
            )
        })
        .unwrap();
        let moved = pages::update_page_body(&base, 0, |body| {
            tree::update_position(body, &"0".parse().unwrap(), Point::new(40.0, 60.0))
        })
        .unwrap();
        let ops = diff(&base, &moved).unwrap();
        assert_eq!(
            ops,
            vec![
                Operation::replace("/pages/0/body/0/props/x", json!(40.0)),
                Operation::replace("/pages/0/body/0/props/y", json!(60.0)),
            ]
        );
    }

    #[test]
    fn test_convergence() {
        let a = Document::default();
        let b = pages::add_page(&a, "Settings").unwrap();
        let b = pages::update_page_body(&b, 1, |body| {
            let body = tree::insert(body, &WidgetPath::Root, 0, Widget::new(WidgetType::Column), None);
            tree::insert(&body, &"0".parse().unwrap(), 0, Widget::new(WidgetType::Text), None)
        })
        .unwrap();
        let b = pages::rename_page(&b, 0, "start").unwrap();

        let forward = diff(&a, &b).unwrap();
        assert_eq!(apply(&a, &forward).unwrap(), b);
        let backward = diff(&b, &a).unwrap();
        assert_eq!(apply(&b, &backward).unwrap(), a);
    }

    #[test]
    fn test_noop_idempotence() {
        let doc = Document::default();
        let ops = diff(&doc, &doc).unwrap();
        assert!(ops.is_empty());
        assert_eq!(apply(&doc, &ops).unwrap(), doc);
    }

    #[test]
    fn test_trailing_array_ops_order() {
        let ops = diff_values(&json!([1, 2, 3, 4]), &json!([1]));
        assert_eq!(
            ops,
            vec![Operation::remove("/3"), Operation::remove("/2"), Operation::remove("/1")]
        );
        let ops = diff_values(&json!([1]), &json!([1, 2, 3]));
        assert_eq!(
            ops,
            vec![Operation::add("/1", json!(2)), Operation::add("/2", json!(3))]
        );
    }

    #[test]
    fn test_diff_type_change_is_replace() {
        let ops = diff_values(&json!({"a": {"b": 1}}), &json!({"a": [1]}));
        assert_eq!(ops, vec![Operation::replace("/a", json!([1]))]);
    }

    #[test]
    fn test_pointer_escaping() {
        let ops = diff_values(&json!({}), &json!({"a/b": 1, "c~d": 2}));
        assert_eq!(ops[0].path(), "/a~1b");
        assert_eq!(ops[1].path(), "/c~0d");
        assert_eq!(apply_value(&json!({}), &ops).unwrap(), json!({"a/b": 1, "c~d": 2}));
    }

    #[test]
    fn test_apply_all_ops() {
        let doc = json!({"list": [1, 2], "obj": {"k": "v"}});
        let ops: Vec<Operation> = serde_json::from_value(json!([
            {"op": "add", "path": "/list/-", "value": 3},
            {"op": "copy", "from": "/obj/k", "path": "/copied"},
            {"op": "move", "from": "/list/0", "path": "/first"},
            {"op": "test", "path": "/first", "value": 1},
            {"op": "replace", "path": "/obj/k", "value": "w"},
            {"op": "remove", "path": "/list/1"}
        ]))
        .unwrap();
        let out = apply_value(&doc, &ops).unwrap();
        assert_eq!(
            out,
            json!({"list": [2], "obj": {"k": "w"}, "copied": "v", "first": 1})
        );
    }

    #[test]
    fn test_apply_failures_are_atomic() {
        let doc = json!({"list": [1]});
        let ops = vec![
            Operation::add("/list/-", json!(2)),
            Operation::remove("/missing"),
        ];
        assert!(matches!(apply_value(&doc, &ops), Err(ApplyError::NotFound(_))));

        assert!(matches!(
            apply_value(&doc, &[Operation::add("/list/01", json!(0))]),
            Err(ApplyError::InvalidIndex(_))
        ));
        assert!(matches!(
            apply_value(&doc, &[Operation::add("/list/5", json!(0))]),
            Err(ApplyError::InvalidIndex(_))
        ));
        assert!(matches!(
            apply_value(&doc, &[Operation::add("nope", json!(0))]),
            Err(ApplyError::InvalidPointer(_))
        ));
        let test_op = Operation::Test { path: "/list/0".into(), value: json!(9) };
        assert!(matches!(apply_value(&doc, &[test_op]), Err(ApplyError::TestFailed(_))));

        // A move onto itself still needs a source.
        let self_move = Operation::Move {
            from: "/pages/7/body/3".into(),
            path: "/pages/7/body/3".into(),
        };
        assert!(matches!(
            apply_value(&json!({"pages": []}), &[self_move]),
            Err(ApplyError::NotFound(_))
        ));
        let self_move = Operation::Move { from: "/list/0".into(), path: "/list/0".into() };
        assert_eq!(apply_value(&doc, &[self_move]).unwrap(), doc);
    }

    #[test]
    fn test_move_into_own_child_rejected() {
        let doc = json!({"a": {"b": {}}});
        let op = Operation::Move { from: "/a".into(), path: "/a/b/c".into() };
        assert!(matches!(
            apply_value(&doc, &[op]),
            Err(ApplyError::MoveIntoChild { .. })
        ));
    }

    #[test]
    fn test_apply_rejects_invalid_document() {
        let doc = Document::default();
        let ops = vec![Operation::remove("/pages")];
        assert!(matches!(apply(&doc, &ops), Err(ApplyError::Decode(_))));
    }

    #[test]
    fn test_operation_wire_shape() {
        let op = Operation::Move { from: "/a".into(), path: "/b".into() };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "move", "from": "/a", "path": "/b"})
        );
    }
}
