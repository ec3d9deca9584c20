//! JSON pointer walker
//!
//! Resolves slash-delimited paths (`/authorization/0/role`) against a
//! `serde_json::Value` to any depth, with `~1` and `~0` unescaping for `/`
//! and `~`. The final token of a path names a member or index inside its
//! parent container; `-` names the position past the end of an array.

use serde_json::Value;

use super::PatchError;

/// Splits a pointer into unescaped reference tokens.
pub fn parse(path: &str) -> Result<Vec<String>, PatchError> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(PatchError::InvalidPath(path.to_string()));
    };
    rest.split('/').map(|raw| unescape(raw, path)).collect()
}

fn unescape(token: &str, path: &str) -> Result<String, PatchError> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return Err(PatchError::InvalidPath(path.to_string())),
        }
    }
    Ok(out)
}

/// Array index token: `0` or digits without a leading zero.
fn parse_index(token: &str) -> Option<usize> {
    let canonical = token == "0"
        || (!token.is_empty()
            && !token.starts_with('0')
            && token.bytes().all(|b| b.is_ascii_digit()));
    if canonical {
        token.parse().ok()
    } else {
        None
    }
}

/// Value at `tokens`, if every step resolves.
pub fn get<'a>(node: &'a Value, tokens: &[String]) -> Option<&'a Value> {
    let Some((head, rest)) = tokens.split_first() else {
        return Some(node);
    };
    let child = match node {
        Value::Object(map) => map.get(head),
        Value::Array(items) => parse_index(head).and_then(|i| items.get(i)),
        _ => None,
    };
    child.and_then(|c| get(c, rest))
}

/// Mutable value at `tokens`. Errors name the full `path` for the caller.
fn walk_mut<'a>(node: &'a mut Value, tokens: &[String], path: &str) -> Result<&'a mut Value, PatchError> {
    let Some((head, rest)) = tokens.split_first() else {
        return Ok(node);
    };
    let child = match node {
        Value::Object(map) => map.get_mut(head),
        Value::Array(items) => parse_index(head).and_then(|i| items.get_mut(i)),
        _ => None,
    };
    match child {
        Some(c) => walk_mut(c, rest, path),
        None => Err(PatchError::PathNotFound(path.to_string())),
    }
}

/// Parent container of the target plus the final token.
fn parent_mut<'a, 't>(
    doc: &'a mut Value,
    tokens: &'t [String],
    path: &str,
) -> Result<(&'a mut Value, &'t str), PatchError> {
    let Some((last, parents)) = tokens.split_last() else {
        return Err(PatchError::InvalidPath(path.to_string()));
    };
    Ok((walk_mut(doc, parents, path)?, last.as_str()))
}

/// Inserts `value`. Object members are created or overwritten; array
/// elements are inserted at the index (`-` appends).
pub fn add(doc: &mut Value, tokens: &[String], value: Value, path: &str) -> Result<(), PatchError> {
    let (parent, last) = parent_mut(doc, tokens, path)?;
    match parent {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = if last == "-" {
                items.len()
            } else {
                parse_index(last)
                    .filter(|i| *i <= items.len())
                    .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?
            };
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

/// Overwrites an existing value. A missing object member is added instead,
/// so optional fields omitted from the serialized form can be set.
pub fn replace(doc: &mut Value, tokens: &[String], value: Value, path: &str) -> Result<(), PatchError> {
    let (parent, last) = parent_mut(doc, tokens, path)?;
    match parent {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let slot = parse_index(last)
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
            *slot = value;
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

/// Removes a value. Removing an absent object member is a no-op; an array
/// index must exist.
pub fn remove(doc: &mut Value, tokens: &[String], path: &str) -> Result<(), PatchError> {
    let (parent, last) = parent_mut(doc, tokens, path)?;
    match parent {
        Value::Object(map) => {
            map.remove(last);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(last)
                .filter(|i| *i < items.len())
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
            items.remove(index);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}
