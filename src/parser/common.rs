#[cfg(not(feature = "mt"))]
use std::rc::Rc;
#[cfg(feature = "mt")]
use std::sync::Arc;

use crate::error::Result;
use crate::lexer::Token;

/// Shared pointer used for entity tables, namespace URIs and texts which
/// are handed to several pipeline stages.
///
/// In builds with the `mt` feature, this is a [`Arc`]. In non-`mt` builds,
/// this is a [`std::rc::Rc`]
#[cfg(feature = "mt")]
pub type RcPtr<T> = Arc<T>;
/// Shared pointer used for entity tables, namespace URIs and texts which
/// are handed to several pipeline stages.
///
/// In builds with the `mt` feature, this is a [`std::sync::Arc`].
/// In non-`mt` builds, this is a [`Rc`].
#[cfg(not(feature = "mt"))]
pub type RcPtr<T> = Rc<T>;

/// XML core namespace URI (for the `xml:` prefix)
pub const XMLNS_XML: &str = "http://www.w3.org/XML/1998/namespace";
/// XML namespace URI (for the `xmlns:` prefix)
pub const XMLNS_XMLNS: &str = "http://www.w3.org/2000/xmlns/";

/// Carry measurement information about the event
///
/// `start` is the byte offset in the document text at which the event's
/// source begins. Events generated from the replacement text of an internal
/// entity point at the entity reference and have a length of zero.
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub struct EventMetrics {
	pub(super) start: usize,
	pub(super) len: usize,
}

impl EventMetrics {
	/// Get the number of bytes used to generate this event.
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Offset of the first byte of this event in the document text.
	pub fn start(&self) -> usize {
		self.start
	}

	/// Offset just past the last byte of this event.
	pub fn end(&self) -> usize {
		self.start + self.len
	}

	// Create new event metrics
	pub const fn new(start: usize, len: usize) -> EventMetrics {
		EventMetrics { start, len }
	}
}

/**
# Read individual tokens from a source

Analogously to [`std::io::Read`] and implemented by [`crate::Lexer`], this
trait provides individual tokens.
*/
pub trait TokenRead {
	/// Return a single token from the source.
	///
	/// If the end of the text has been reached without errors, None is
	/// returned.
	fn read(&mut self) -> Result<Option<Token>>;

	/// Offset in the document text which the source has reached.
	///
	/// After a failed [`TokenRead::read`], this is the offset of the error.
	fn offset(&self) -> usize {
		0
	}
}

/**
Trait for parser-like structs.
*/
pub trait Parse {
	type Output;

	/// Parse a single event using tokens from `r`.
	///
	/// If the end of file has been reached after a document accepted by the
	/// parser, `None` is returned. Otherwise, if the document is still
	/// acceptable the next XML event is returned.
	///
	/// If the document violates a constraint, such as the XML 1.0
	/// grammar or a well-formedness constraint, the corresponding error is
	/// returned.
	///
	/// **Note:** Exchanging the token source between calls to `parse()` is
	/// possible, but not advisible (if the token source represents a
	/// different document).
	fn parse<R: TokenRead>(&mut self, r: &mut R) -> Result<Option<Self::Output>>;

	/// Release all temporary buffers or other ephemeral allocations
	///
	/// This is sensible to call when it is expected that no more data will be
	/// processed by the parser for a while and the memory is better used
	/// elsewhere.
	fn release_temporaries(&mut self);
}
