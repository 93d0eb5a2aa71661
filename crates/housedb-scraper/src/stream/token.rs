/// A leaf value in the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// One positional token of a decoded stream.
///
/// Objects are emitted as `ObjectOpen`, then a `Key` followed by the member's
/// value tokens for each member, then `ObjectClose`. A token's meaning
/// depends on what precedes it, so sequences are only meaningful as a whole.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamToken {
    Primitive(Scalar),
    /// Zero-based index of an earlier root entry.
    Reference(usize),
    ArrayOpen,
    ArrayClose,
    ObjectOpen,
    Key(String),
    ObjectClose,
    /// A server-side error serialized in place of a value.
    Error(String),
}
