use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }
}

/// A stream value with every reference substituted.
///
/// Strings and containers are reference-counted: a reference shares the
/// entry it names instead of copying it, so the resolved graph is a DAG
/// whose size stays linear in the token count. Cloning is O(1).
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Null,
    Bool(bool),
    Number(Number),
    String(Arc<str>),
    List(Arc<[ResolvedValue]>),
    Map(Arc<BTreeMap<String, ResolvedValue>>),
}

/// Whether a depth-first walk should enter the children of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Descend,
    Skip,
}

impl ResolvedValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedValue::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<Number> {
        match self {
            ResolvedValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integral value of a number, or of a string holding only digits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ResolvedValue::Number(Number::Int(n)) => Some(*n),
            #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
            ResolvedValue::Number(Number::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                Some(*f as i64)
            }
            ResolvedValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[ResolvedValue]> {
        match self {
            ResolvedValue::List(items) => Some(&items[..]),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, ResolvedValue>> {
        match self {
            ResolvedValue::Map(map) => Some(map.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ResolvedValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ResolvedValue::Null)
    }

    /// Pre-order walk. The callback decides per node whether its children
    /// are visited. A list or map shared by several references is visited
    /// once, at its first occurrence.
    pub fn walk<'a, F>(&'a self, visit: &mut F)
    where
        F: FnMut(&'a ResolvedValue) -> Visit,
    {
        Self::walk_all([self], visit);
    }

    /// [`walk`](Self::walk) over several roots in order, sharing one record
    /// of visited containers so a subtree reachable from many roots is still
    /// entered once.
    pub fn walk_all<'a, I, F>(roots: I, visit: &mut F)
    where
        I: IntoIterator<Item = &'a ResolvedValue>,
        F: FnMut(&'a ResolvedValue) -> Visit,
    {
        let mut seen: HashSet<*const ()> = HashSet::new();
        let mut stack: Vec<&'a ResolvedValue> = roots.into_iter().collect();
        stack.reverse();
        while let Some(node) = stack.pop() {
            if let Some(id) = node.shared_id() {
                if !seen.insert(id) {
                    continue;
                }
            }
            if visit(node) == Visit::Skip {
                continue;
            }
            match node {
                ResolvedValue::List(items) => stack.extend(items.iter().rev()),
                ResolvedValue::Map(map) => stack.extend(map.values().rev()),
                _ => {}
            }
        }
    }

    fn shared_id(&self) -> Option<*const ()> {
        match self {
            ResolvedValue::List(items) => Some(Arc::as_ptr(items).cast::<()>()),
            ResolvedValue::Map(map) => Some(Arc::as_ptr(map).cast::<()>()),
            _ => None,
        }
    }
}
