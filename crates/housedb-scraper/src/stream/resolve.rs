use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use super::token::{Scalar, StreamToken};
use super::value::{Number, ResolvedValue};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("reference to entry {index} while that entry is still being built")]
    Cycle { index: usize },

    #[error("reference to entry {index} but only {available} entries are resolved")]
    DanglingReference { index: usize, available: usize },

    #[error("malformed token sequence at token {position}: {reason}")]
    Malformed { position: usize, reason: String },
}

enum Frame {
    List(Vec<ResolvedValue>),
    Map {
        map: BTreeMap<String, ResolvedValue>,
        key: Option<String>,
    },
}

/// Materialize root entries from a token sequence in one pass.
///
/// References may only point backwards: entry `i` can be named once entries
/// `0..i` are complete. Naming the entry under construction is a cycle and
/// naming a later one is dangling; neither ever recurses. A valid reference
/// shares the named entry, so each token costs O(1).
///
/// # Errors
///
/// Returns [`ResolveError`] for cyclic or forward references and for token
/// sequences that are not balanced around a single root array.
pub fn resolve(tokens: &[StreamToken]) -> Result<Vec<ResolvedValue>, ResolveError> {
    let mut entries: Vec<ResolvedValue> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut root_open = false;
    let mut root_closed = false;

    for (position, token) in tokens.iter().enumerate() {
        let malformed = |reason: &str| ResolveError::Malformed {
            position,
            reason: reason.to_string(),
        };
        if root_closed {
            return Err(malformed("token after the root array closed"));
        }
        if !root_open {
            if *token != StreamToken::ArrayOpen {
                return Err(malformed("stream must start with the root array"));
            }
            root_open = true;
            continue;
        }

        let completed = match token {
            StreamToken::Primitive(scalar) => Some(scalar_value(scalar)),
            StreamToken::Error(message) => {
                tracing::warn!(position, message = %message, "stream carries a serialized error");
                Some(ResolvedValue::Null)
            }
            StreamToken::Reference(index) => {
                let available = entries.len();
                match (*index).cmp(&available) {
                    std::cmp::Ordering::Less => Some(entries[*index].clone()),
                    std::cmp::Ordering::Equal => return Err(ResolveError::Cycle { index: *index }),
                    std::cmp::Ordering::Greater => {
                        return Err(ResolveError::DanglingReference {
                            index: *index,
                            available,
                        })
                    }
                }
            }
            StreamToken::ArrayOpen => {
                stack.push(Frame::List(Vec::new()));
                None
            }
            StreamToken::ObjectOpen => {
                stack.push(Frame::Map {
                    map: BTreeMap::new(),
                    key: None,
                });
                None
            }
            StreamToken::Key(name) => match stack.last_mut() {
                Some(Frame::Map { key, .. }) if key.is_none() => {
                    *key = Some(name.clone());
                    None
                }
                Some(Frame::Map { .. }) => return Err(malformed("two keys without a value")),
                _ => return Err(malformed("key outside an object")),
            },
            StreamToken::ArrayClose => match stack.pop() {
                Some(Frame::List(items)) => Some(ResolvedValue::List(items.into())),
                Some(Frame::Map { .. }) => return Err(malformed("']' closes an object")),
                None => {
                    root_closed = true;
                    None
                }
            },
            StreamToken::ObjectClose => match stack.pop() {
                Some(Frame::Map { map, key: None }) => Some(ResolvedValue::Map(Arc::new(map))),
                Some(Frame::Map { key: Some(_), .. }) => {
                    return Err(malformed("object closed after a key with no value"))
                }
                _ => return Err(malformed("'}' without a matching object")),
            },
        };

        if let Some(value) = completed {
            match stack.last_mut() {
                None => entries.push(value),
                Some(Frame::List(items)) => items.push(value),
                Some(Frame::Map { map, key }) => match key.take() {
                    Some(k) => {
                        map.insert(k, value);
                    }
                    None => return Err(malformed("object member without a key")),
                },
            }
        }
    }

    if !root_open {
        return Err(ResolveError::Malformed {
            position: 0,
            reason: "no root array".to_string(),
        });
    }
    if !root_closed {
        return Err(ResolveError::Malformed {
            position: tokens.len(),
            reason: "root array is never closed".to_string(),
        });
    }
    Ok(entries)
}

fn scalar_value(scalar: &Scalar) -> ResolvedValue {
    match scalar {
        Scalar::Null => ResolvedValue::Null,
        Scalar::Bool(b) => ResolvedValue::Bool(*b),
        Scalar::Int(n) => ResolvedValue::Number(Number::Int(*n)),
        Scalar::Float(f) => ResolvedValue::Number(Number::Float(*f)),
        Scalar::String(s) => ResolvedValue::String(Arc::from(s.as_str())),
    }
}

#[cfg(test)]
#[path = "resolve_test.rs"]
mod tests;
