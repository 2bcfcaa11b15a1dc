/*!
# Error types

This module holds the error types returned by the various functions of this
crate.

The pipeline stages return [`Error`]. [`crate::SaxParser`] wraps the first
fatal error of a run into a [`ParseError`], which adds a best-effort position
and a coarse [`ErrorKind`] for callers which only need to tell failure
classes apart.
*/
use std::error;
use std::fmt;
use std::io;
use std::ops::Deref;
use std::result::Result as StdResult;
use std::sync::Arc;

use smartstring::alias::String as SmartString;

use saxml_validation::Error as ValidationError;

pub use crate::errctx::*;

/// Violation of a well-formedness constraint or the XML 1.0 grammar.
#[derive(Debug, Clone, PartialEq, Copy)]
pub enum WFError {
	/// End-of-file encountered during a construct where more data was
	/// expected.
	///
	/// The contents are implementation details.
	InvalidEof(&'static str),

	/// Attempt to refer to an undeclared entity.
	UndeclaredEntity,

	/// Unicode codepoint which is not allowed in XML 1.0 encountered.
	///
	/// The contents are implementation details.
	InvalidChar(&'static str, u32, bool),

	/// Unicode codepoint which was not expected at that point in the
	/// grammar.
	///
	/// The contents are implementation details.
	UnexpectedChar(&'static str, char, Option<&'static [&'static str]>),

	/// Generalized invalid syntactic construct which does not fit into any
	/// of the other categories.
	///
	/// The contents are implementation details.
	InvalidSyntax(&'static str),

	/// Token was not expected by the parser at that point in the grammar.
	///
	/// The contents are implementation details.
	UnexpectedToken(&'static str, &'static str, Option<&'static [&'static str]>),

	/// Attribute was declared multiple times in the same element.
	///
	/// **Note:** This will also be emitted for namespaced attributes which
	/// resolve to the same `(uri, localname)` pair after prefix resolution.
	DuplicateAttribute,

	/// Ending tag name does not match opening tag.
	ElementMismatch,

	/// End of input reached while elements were still open.
	UnclosedElement,

	/// An entity refers to itself, directly or indirectly.
	RecursiveEntity,

	/// The replacement text of an entity opens or closes elements which it
	/// does not also close or open.
	UnbalancedEntity,

	/// Attribute values must not refer to external entities.
	ExternalEntityInAttribute,

	/// Unparsed (`NDATA`) entities must not be referenced in content.
	UnparsedEntityReference,
}

impl error::Error for WFError {}

impl ErrorWithContext for WFError {
	fn with_context(self, ctx: &'static str) -> WFError {
		match self {
			WFError::InvalidEof(_) => WFError::InvalidEof(ctx),
			WFError::InvalidChar(_, cp, fromref) => WFError::InvalidChar(ctx, cp, fromref),
			WFError::UnexpectedChar(_, ch, alt) => WFError::UnexpectedChar(ctx, ch, alt),
			WFError::UnexpectedToken(_, tok, alt) => WFError::UnexpectedToken(ctx, tok, alt),
			other => other,
		}
	}
}

fn write_options<'f>(f: &'f mut fmt::Formatter, opts: &[&str]) -> fmt::Result {
	if opts.len() == 1 {
		f.write_str(opts[0])?;
	} else {
		f.write_str("one of: ")?;
		for (i, opt) in opts.iter().enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			f.write_str(opt)?;
		}
	}
	f.write_str(")")
}

impl fmt::Display for WFError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			WFError::InvalidEof(ctx) => write!(f, "invalid eof {}", ctx),
			WFError::UndeclaredEntity => write!(f, "use of undeclared entity"),
			WFError::InvalidChar(ctx, cp, false) => {
				write!(f, "invalid codepoint U+{:x} {}", cp, ctx)
			}
			WFError::InvalidChar(ctx, cp, true) => write!(
				f,
				"character reference expanded to invalid codepoint U+{:x} {}",
				cp, ctx
			),
			WFError::UnexpectedChar(ctx, ch, Some(opts)) if !opts.is_empty() => {
				write!(f, "U+{:x} not allowed {} (expected ", *ch as u32, ctx)?;
				write_options(f, opts)
			}
			WFError::UnexpectedChar(ctx, ch, _) => {
				write!(f, "U+{:x} not allowed {}", *ch as u32, ctx)
			}
			WFError::InvalidSyntax(msg) => write!(f, "invalid syntax: {}", msg),
			WFError::UnexpectedToken(ctx, tok, Some(opts)) if !opts.is_empty() => {
				write!(f, "unexpected {} token {} (expected ", tok, ctx)?;
				write_options(f, opts)
			}
			WFError::UnexpectedToken(ctx, tok, _) => write!(f, "unexpected {} token {}", tok, ctx),
			WFError::DuplicateAttribute => f.write_str("duplicate attribute"),
			WFError::ElementMismatch => f.write_str("start and end tag do not match"),
			WFError::UnclosedElement => f.write_str("element not closed at end of input"),
			WFError::RecursiveEntity => f.write_str("recursive entity reference"),
			WFError::UnbalancedEntity => {
				f.write_str("entity replacement text does not balance its elements")
			}
			WFError::ExternalEntityInAttribute => {
				f.write_str("reference to external entity in attribute value")
			}
			WFError::UnparsedEntityReference => f.write_str("reference to unparsed entity"),
		}
	}
}

impl From<ValidationError> for WFError {
	fn from(other: ValidationError) -> Self {
		match other {
			ValidationError::EmptyName => Self::InvalidSyntax("Name must have at least one Char"),
			ValidationError::InvalidChar(ch) => Self::UnexpectedChar(ERRCTX_UNKNOWN, ch, None),
		}
	}
}

/// Violation of a namespace-well-formedness constraint or the Namespaces for
/// XML 1.0 grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum NWFError {
	/// More than one colon encountered in a name.
	///
	/// The contents are implementation details.
	MultiColonName(&'static str),

	/// One side of the colon in a name was empty.
	///
	/// The contents are implementation details.
	EmptyNamePart(&'static str),

	/// Use of an undeclared namespace prefix.
	///
	/// The contents are implementation details.
	UndeclaredNamespacePrefix(&'static str),

	/// Attempt to bind or undeclare a reserved namespace prefix.
	ReservedNamespacePrefix,

	/// Attempt to bind a reserved namespace name to a different prefix.
	ReservedNamespaceName,

	/// Local name does not conform to Name production (invalid start char)
	InvalidLocalName(&'static str),

	/// Declared namespace URI is empty
	EmptyNamespaceUri,
}

impl error::Error for NWFError {}

impl ErrorWithContext for NWFError {
	fn with_context(self, ctx: &'static str) -> NWFError {
		match self {
			Self::MultiColonName(_) => Self::MultiColonName(ctx),
			Self::EmptyNamePart(_) => Self::EmptyNamePart(ctx),
			Self::UndeclaredNamespacePrefix(_) => Self::UndeclaredNamespacePrefix(ctx),
			Self::InvalidLocalName(_) => Self::InvalidLocalName(ctx),
			other => other,
		}
	}
}

impl fmt::Display for NWFError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::MultiColonName(ctx) => write!(f, "more than one colon {}", ctx),
			Self::EmptyNamePart(ctx) => {
				write!(f, "empty string on one side of the colon {}", ctx)
			}
			Self::UndeclaredNamespacePrefix(ctx) => {
				write!(f, "use of undeclared namespace prefix {}", ctx)
			}
			Self::ReservedNamespacePrefix => f.write_str("reserved namespace prefix"),
			Self::ReservedNamespaceName => f.write_str("reserved namespace name"),
			Self::InvalidLocalName(ctx) => write!(f, "local name is invalid {}", ctx),
			Self::EmptyNamespaceUri => write!(f, "namespace URI is empty"),
		}
	}
}

/**
Line and column inside the decoded document text.

Both are 1-based. Columns count characters, not bytes.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
	pub line: usize,
	pub column: usize,
}

impl Position {
	pub const START: Position = Position { line: 1, column: 1 };

	/// Compute the position of byte `offset` in `text`.
	///
	/// Offsets past the end are clamped, offsets inside a multi-byte
	/// character count that character as already passed.
	pub fn locate(text: &str, offset: usize) -> Position {
		let bytes = &text.as_bytes()[..offset.min(text.len())];
		let line = memchr::memchr_iter(b'\n', bytes).count() + 1;
		let line_start = match memchr::memrchr(b'\n', bytes) {
			Some(p) => p + 1,
			None => 0,
		};
		let column = bytes[line_start..]
			.iter()
			.filter(|b| (**b & 0xc0) != 0x80)
			.count() + 1;
		Position { line, column }
	}
}

impl fmt::Display for Position {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(f, "line {}, column {}", self.line, self.column)
	}
}

/// Failure to turn the input bytes into text.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodingError {
	/// A byte sequence is not valid in the detected encoding.
	InvalidSequence {
		encoding: &'static str,
		/// Offset of the offending sequence in the input bytes.
		offset: usize,
		/// Position reached in the decoded text.
		at: Position,
	},
	/// The input ends in the middle of a code unit or sequence.
	Truncated {
		encoding: &'static str,
		offset: usize,
		at: Position,
	},
	/// The declared encoding is not supported by this build.
	Unsupported(SmartString),
	/// The declared encoding contradicts the byte order mark or the byte
	/// pattern of the document start.
	Mismatch {
		detected: &'static str,
		declared: SmartString,
	},
}

impl EncodingError {
	/// Position in the decoded text up to which decoding succeeded, if known.
	pub fn position(&self) -> Option<Position> {
		match self {
			Self::InvalidSequence { at, .. } | Self::Truncated { at, .. } => Some(*at),
			Self::Unsupported(_) | Self::Mismatch { .. } => None,
		}
	}
}

impl fmt::Display for EncodingError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::InvalidSequence {
				encoding, offset, ..
			} => write!(f, "invalid {} sequence at byte {}", encoding, offset),
			Self::Truncated {
				encoding, offset, ..
			} => write!(f, "truncated {} sequence at byte {}", encoding, offset),
			Self::Unsupported(label) => write!(f, "unsupported encoding {:?}", label.as_str()),
			Self::Mismatch { detected, declared } => write!(
				f,
				"declared encoding {:?} contradicts detected {}",
				declared.as_str(),
				detected
			),
		}
	}
}

impl error::Error for EncodingError {}

/// [`std::sync::Arc`]-based around [`std::io::Error`] to allow cloning.
#[derive(Clone)]
pub struct IOErrorWrapper(Arc<io::Error>);

impl IOErrorWrapper {
	pub(crate) fn wrap(e: io::Error) -> IOErrorWrapper {
		IOErrorWrapper(Arc::new(e))
	}
}

impl fmt::Debug for IOErrorWrapper {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(&**self, f)
	}
}

impl fmt::Display for IOErrorWrapper {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&**self, f)
	}
}

impl PartialEq for IOErrorWrapper {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl Deref for IOErrorWrapper {
	type Target = io::Error;

	fn deref(&self) -> &io::Error {
		&self.0
	}
}

/// Failure to resolve an external entity.
///
/// Unless strict entity handling is enabled, these never reach the caller;
/// the entity is elided instead.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityError {
	/// The resolution policy does not permit fetching the entity.
	Denied(SmartString),
	/// The entity could not be fetched.
	Unreachable {
		system_id: SmartString,
		error: IOErrorWrapper,
	},
	/// The fetched entity is not a well-formed external parsed entity.
	Malformed {
		system_id: SmartString,
		error: Box<Error>,
	},
	/// External entities were nested too deeply or refer to themselves.
	TooDeep(SmartString),
}

impl fmt::Display for EntityError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Denied(system_id) => {
				write!(f, "policy denies fetching {:?}", system_id.as_str())
			}
			Self::Unreachable { system_id, error } => {
				write!(f, "failed to fetch {:?}: {}", system_id.as_str(), error)
			}
			Self::Malformed { system_id, error } => {
				write!(f, "entity {:?} is malformed: {}", system_id.as_str(), error)
			}
			Self::TooDeep(system_id) => write!(
				f,
				"external entities nested too deeply at {:?}",
				system_id.as_str()
			),
		}
	}
}

/// Error types which may be returned from the parser or lexer.
///
/// All errors are fatal and will be returned indefinitely from the parser or
/// lexer after the first encounter.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	/// The input bytes could not be decoded.
	Encoding(EncodingError),
	/// A violation of the XML 1.0 grammar or a well-formedness constraint was
	/// encountered during parsing or lexing.
	NotWellFormed(WFError),
	/// A violation of the Namespaces in XML 1.0 grammar or a
	/// namespace-well-formedness constraint was encountered during parsing.
	NotNamespaceWellFormed(NWFError),
	/// A configured limit was exceeded.
	///
	/// The string indicates the context and should not be interpreted by user
	/// code.
	LimitExceeded(&'static str),
	/// An external entity could not be resolved and strict entity handling
	/// is enabled.
	Entity(EntityError),
	/// The event sink requested termination.
	Aborted,
}

pub type Result<T> = StdResult<T, Error>;

pub(crate) trait ErrorWithContext {
	fn with_context(self, ctx: &'static str) -> Self;
}

impl Error {
	pub(crate) fn wfeof(ctx: &'static str) -> Error {
		Error::NotWellFormed(WFError::InvalidEof(ctx))
	}

	pub(crate) fn syntax(msg: &'static str) -> Error {
		Error::NotWellFormed(WFError::InvalidSyntax(msg))
	}

	/// Classify the error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Encoding(_) => ErrorKind::Encoding,
			Self::NotWellFormed(WFError::ElementMismatch) => ErrorKind::MismatchedEndTag,
			Self::NotWellFormed(WFError::UnclosedElement) => ErrorKind::UnclosedElement,
			Self::NotWellFormed(_) => ErrorKind::Malformed,
			Self::NotNamespaceWellFormed(NWFError::UndeclaredNamespacePrefix(_)) => {
				ErrorKind::UnboundNamespacePrefix
			}
			Self::NotNamespaceWellFormed(_) => ErrorKind::Malformed,
			Self::LimitExceeded(_) => ErrorKind::Malformed,
			Self::Entity(_) => ErrorKind::EntityResolution,
			Self::Aborted => ErrorKind::Aborted,
		}
	}
}

impl ErrorWithContext for Error {
	fn with_context(self, ctx: &'static str) -> Self {
		match self {
			Self::NotWellFormed(wf) => Self::NotWellFormed(wf.with_context(ctx)),
			Self::NotNamespaceWellFormed(nwf) => {
				Self::NotNamespaceWellFormed(nwf.with_context(ctx))
			}
			other => other,
		}
	}
}

pub(crate) fn add_context<T, E: ErrorWithContext>(
	r: StdResult<T, E>,
	ctx: &'static str,
) -> StdResult<T, E> {
	r.map_err(|e| e.with_context(ctx))
}

impl From<WFError> for Error {
	fn from(e: WFError) -> Error {
		Error::NotWellFormed(e)
	}
}

impl From<NWFError> for Error {
	fn from(e: NWFError) -> Error {
		Error::NotNamespaceWellFormed(e)
	}
}

impl From<EncodingError> for Error {
	fn from(e: EncodingError) -> Error {
		Error::Encoding(e)
	}
}

impl From<EntityError> for Error {
	fn from(e: EntityError) -> Error {
		Error::Entity(e)
	}
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::Encoding(e) => write!(f, "encoding error: {}", e),
			Error::NotWellFormed(e) => write!(f, "not-well-formed: {}", e),
			Error::NotNamespaceWellFormed(e) => write!(f, "not namespace-well-formed: {}", e),
			Error::LimitExceeded(msg) => write!(f, "limit exceeded: {}", msg),
			Error::Entity(e) => write!(f, "entity resolution failed: {}", e),
			Error::Aborted => f.write_str("parsing aborted by event sink"),
		}
	}
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			Error::Encoding(e) => Some(e),
			Error::NotWellFormed(e) => Some(e),
			Error::NotNamespaceWellFormed(e) => Some(e),
			Error::Entity(EntityError::Unreachable { error, .. }) => Some(&**error),
			Error::Entity(EntityError::Malformed { error, .. }) => Some(&**error),
			Error::Entity(_) | Error::LimitExceeded(_) | Error::Aborted => None,
		}
	}
}

/**
# Coarse classification of parse failures

Every [`Error`] maps to exactly one kind via [`Error::kind()`].
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// Malformed markup or a violated (namespace) well-formedness
	/// constraint not covered by a more specific kind.
	Malformed,
	/// End of input with open elements.
	UnclosedElement,
	/// End tag does not match the innermost open element.
	MismatchedEndTag,
	/// Element or attribute uses a prefix without a binding in scope.
	UnboundNamespacePrefix,
	/// The event sink requested termination.
	Aborted,
	/// The input could not be decoded.
	Encoding,
	/// An external entity could not be resolved under strict entity
	/// handling.
	EntityResolution,
}

impl fmt::Display for ErrorKind {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(match self {
			Self::Malformed => "malformed",
			Self::UnclosedElement => "unclosed-element",
			Self::MismatchedEndTag => "mismatched-end-tag",
			Self::UnboundNamespacePrefix => "unbound-namespace-prefix",
			Self::Aborted => "aborted",
			Self::Encoding => "encoding",
			Self::EntityResolution => "entity-resolution",
		})
	}
}

/**
# Error of a failed parse run

Returned by [`crate::SaxParser::error()`] after [`crate::SaxParser::parse()`]
returned `false`.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
	error: Error,
	position: Position,
}

impl ParseError {
	pub(crate) fn new(error: Error, position: Position) -> ParseError {
		ParseError { error, position }
	}

	/// Failure class of the error.
	pub fn kind(&self) -> ErrorKind {
		self.error.kind()
	}

	/// Detailed error.
	pub fn error(&self) -> &Error {
		&self.error
	}

	/// Best-effort position of the failure.
	pub fn position(&self) -> Position {
		self.position
	}

	pub fn line(&self) -> usize {
		self.position.line
	}

	pub fn column(&self) -> usize {
		self.position.column
	}

	/// True if the run was terminated on request of the event sink.
	pub fn is_abort(&self) -> bool {
		self.error == Error::Aborted
	}
}

impl fmt::Display for ParseError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(f, "{} ({}) at {}", self.error, self.kind(), self.position)
	}
}

impl error::Error for ParseError {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		Some(&self.error)
	}
}
