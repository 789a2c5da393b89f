//! Out-of-line string storage.
//!
//! Names are not stored inside the record, the record holds a `(pointer, length)`
//! pair pointing into the arena region of the same buffer.

use std::borrow::Cow;
use std::sync::Arc;

use crate::buffer::{DecodeError, SharedBuffer};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// A byte range within the shared buffer holding a UTF-8 string.
pub struct NameSpan {
    /// The absolute byte offset into the buffer.
    pub pointer: u32,
    /// The number of bytes.
    pub length: u32,
}

/// Decodes the string referenced by `span`.
///
/// Decoding stops at the first NUL byte even if `span.length` extends further,
/// producers over-allocate names and terminate them early. Invalid UTF-8 sequences
/// are replaced rather than rejected.
///
/// A span reaching outside the buffer is a [DecodeError::OutOfBounds].
pub fn decode_name(buffer: &SharedBuffer, span: NameSpan) -> Result<Cow<'_, str>, DecodeError> {
    if span.length == 0 {
        return Ok(Cow::Borrowed(""));
    }

    let bytes = buffer.read_at(span.pointer as usize, span.length as usize)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]))
}

#[derive(Debug, Default)]
/// A single slot memo of the last decoded name.
///
/// Rows very often share the same span (a producer writing one string for
/// every record) so keeping the last one avoids decoding it per row.
///
/// The entry is keyed by the buffer revision as well as the span, the arena
/// is rewritten on every producer mutation so the same span may hold
/// different bytes across revisions.
pub struct NameCache {
    slot: Option<(u64, NameSpan, Arc<str>)>,
    hits: u64,
}

impl NameCache {
    /// Returns the decoded name for `span`, reusing the cached value if the
    /// revision and span match the last lookup.
    pub fn get_or_decode(
        &mut self,
        buffer: &SharedBuffer,
        revision: u64,
        span: NameSpan,
    ) -> Result<Arc<str>, DecodeError> {
        if let Some((cached_revision, cached_span, name)) = &self.slot {
            if *cached_revision == revision && *cached_span == span {
                self.hits += 1;
                return Ok(name.clone());
            }
        }

        let name: Arc<str> = Arc::from(decode_name(buffer, span)?);
        self.slot = Some((revision, span, name.clone()));
        Ok(name)
    }

    /// The number of lookups served from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }
}
