//! Decoding of the incremental-hydration stream embedded in server-rendered
//! pages: HTML → tokens → resolved root entries → (hydrated) value trees.

mod chunks;
mod decode;
mod hydrate;
mod resolve;
mod token;
mod value;

pub use chunks::enqueued_chunks;
pub use decode::{decode, decode_stream, DecodeError, MAX_DEPTH};
pub use hydrate::{hydrate, is_indexed};
pub use resolve::{resolve, ResolveError};
pub use token::{Scalar, StreamToken};
pub use value::{Number, ResolvedValue, Visit};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Run the whole pipeline on a page: decode, resolve, then hydrate when the
/// stream uses the index-encoded dialect.
///
/// # Errors
///
/// Propagates the first [`DecodeError`] or [`ResolveError`].
pub fn values_from_html(html: &str) -> Result<Vec<ResolvedValue>, StreamError> {
    let tokens = decode(html)?;
    let entries = resolve(&tokens)?;
    Ok(hydrate(entries)?)
}
