//! Rebuilding trees from the index-encoded stream dialect.
//!
//! In this dialect every root entry is one node: objects are maps from
//! `_<key index>` to a value index, arrays are lists of value indices, and
//! scalars stand for themselves. Negative indices are sentinels for values
//! JSON cannot express. Typed values are two-element lists tagged by a
//! leading string (`["D", ms]` for dates, `["P", id]` for pending promises).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::resolve::ResolveError;
use super::value::{Number, ResolvedValue};

const NEGATIVE_ZERO: i64 = -4;

const MAX_HYDRATE_DEPTH: usize = 2048;

/// Whether entries use the index-encoded dialect: entry 0 is a non-empty
/// map whose keys all look like `_<digits>`.
#[must_use]
pub fn is_indexed(entries: &[ResolvedValue]) -> bool {
    entries
        .first()
        .and_then(ResolvedValue::as_map)
        .is_some_and(|map| !map.is_empty() && map.keys().all(|k| index_key(k).is_some()))
}

/// Rebuild the tree rooted at entry 0 when the entries are index-encoded.
/// Other entry lists are returned unchanged.
///
/// # Errors
///
/// [`ResolveError::Cycle`] when a node is reached again while it is still
/// being built, [`ResolveError::DanglingReference`] for indices past the
/// end, and [`ResolveError::Malformed`] for nodes that do not follow the
/// dialect.
pub fn hydrate(entries: Vec<ResolvedValue>) -> Result<Vec<ResolvedValue>, ResolveError> {
    if !is_indexed(&entries) {
        return Ok(entries);
    }
    let mut hydrator = Hydrator {
        entries: &entries,
        memo: vec![None; entries.len()],
        in_progress: HashSet::new(),
    };
    let root = hydrator.node(0, 0)?;
    Ok(vec![root])
}

struct Hydrator<'a> {
    entries: &'a [ResolvedValue],
    memo: Vec<Option<ResolvedValue>>,
    in_progress: HashSet<usize>,
}

impl Hydrator<'_> {
    fn value_at(&mut self, raw: &ResolvedValue, depth: usize) -> Result<ResolvedValue, ResolveError> {
        match raw.as_number() {
            Some(Number::Int(i)) if i < 0 => Ok(sentinel(i)),
            Some(Number::Int(i)) => {
                let index = usize::try_from(i).map_err(|_| self.dangling(usize::MAX))?;
                self.node(index, depth + 1)
            }
            _ => Err(malformed(format!("expected an entry index, found {raw:?}"))),
        }
    }

    fn dangling(&self, index: usize) -> ResolveError {
        ResolveError::DanglingReference {
            index,
            available: self.entries.len(),
        }
    }

    fn node(&mut self, index: usize, depth: usize) -> Result<ResolvedValue, ResolveError> {
        if depth > MAX_HYDRATE_DEPTH {
            return Err(malformed("index chain nests too deeply".to_string()));
        }
        if let Some(done) = self.memo.get(index).and_then(Option::as_ref) {
            return Ok(done.clone());
        }
        let entries = self.entries;
        let Some(entry) = entries.get(index) else {
            return Err(self.dangling(index));
        };
        if !self.in_progress.insert(index) {
            return Err(ResolveError::Cycle { index });
        }

        let built = match entry {
            ResolvedValue::Map(map) => {
                let mut out = BTreeMap::new();
                for (raw_key, raw_value) in map.iter() {
                    let key = match index_key(raw_key) {
                        Some(key_index) => self.key_name(key_index)?,
                        None => raw_key.clone(),
                    };
                    let value = self.value_at(raw_value, depth)?;
                    out.insert(key, value);
                }
                ResolvedValue::Map(Arc::new(out))
            }
            ResolvedValue::List(items) => match items.first() {
                Some(ResolvedValue::String(tag)) => typed_value(tag, items.get(1)),
                _ => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items.iter() {
                        out.push(self.value_at(item, depth)?);
                    }
                    ResolvedValue::List(out.into())
                }
            },
            scalar => scalar.clone(),
        };

        self.in_progress.remove(&index);
        self.memo[index] = Some(built.clone());
        Ok(built)
    }

    fn key_name(&self, index: usize) -> Result<String, ResolveError> {
        match self.entries.get(index) {
            Some(ResolvedValue::String(name)) => Ok(name.to_string()),
            Some(other) => Err(malformed(format!(
                "key index {index} names a non-string entry {other:?}"
            ))),
            None => Err(self.dangling(index)),
        }
    }
}

fn index_key(key: &str) -> Option<usize> {
    let digits = key.strip_prefix('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// -1 hole, -2 NaN, -3 and -6 infinities, -5 null, -7 undefined. None of
/// them has a JSON counterpart, so all read as null except negative zero.
fn sentinel(code: i64) -> ResolvedValue {
    if code == NEGATIVE_ZERO {
        ResolvedValue::Number(Number::Float(-0.0))
    } else {
        ResolvedValue::Null
    }
}

fn typed_value(tag: &str, payload: Option<&ResolvedValue>) -> ResolvedValue {
    match (tag, payload) {
        ("D", Some(ResolvedValue::Number(ms))) => ResolvedValue::Number(*ms),
        ("P", _) => ResolvedValue::Null,
        _ => {
            tracing::debug!(tag, "unsupported typed value in stream");
            ResolvedValue::Null
        }
    }
}

fn malformed(reason: String) -> ResolveError {
    ResolveError::Malformed {
        position: 0,
        reason,
    }
}
