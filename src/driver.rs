/*!
Wrappers around lexers and parsers to drive them.

[`EventReader`] combines the decoding step, the [`Lexer`], the
[`RawParser`] and the [`NamespaceResolver`] into a pull parser over a
complete document. [`ParserOptions`] configures all stages at once.

For callback-style parsing, see [`crate::SaxParser`].
*/
use crate::encoding::{self, Encoding};
use crate::entity::{EntityPolicy, EntityTable};
use crate::error::{Position, Result};
use crate::lexer::{Lexer, LexerOptions};
use crate::parser::{NamespaceResolver, Parse, RawParser, RcPtr, ResolvedEvent};

/**
# Options for a parse run

```
use saxml::{EntityPolicy, ParserOptions};

let opts = ParserOptions::default()
	.process_namespaces(true)
	.report_namespace_prefixes(true)
	.external_entity_policy(EntityPolicy::SameOriginOnly)
	.document_uri("file:///srv/doc.xml");
assert!(opts.process_namespaces);
```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ParserOptions {
	/// Split element names into prefix and local name and resolve the
	/// prefix to a namespace URI.
	pub process_namespaces: bool,

	/// Report the name as written (qualified name) and prefix mapping
	/// events. Only effective together with
	/// [`ParserOptions::process_namespaces`].
	pub report_namespace_prefixes: bool,

	/// What to do with references to external parsed entities.
	pub external_entity_policy: EntityPolicy,

	/// Encoding to assume for input which carries neither a byte order mark
	/// nor an encoding declaration.
	pub encoding_hint: Option<Encoding>,

	/// URI of the document, used to resolve relative system identifiers and
	/// as the origin for [`EntityPolicy::SameOriginOnly`].
	pub document_uri: Option<String>,

	/// Make any failure to resolve an external entity (including a denial
	/// by policy) fatal, instead of eliding the entity.
	pub fail_on_entity_errors: bool,

	/// Limits for the lexer stage.
	pub lexer: LexerOptions,
}

impl ParserOptions {
	pub fn process_namespaces(mut self, v: bool) -> ParserOptions {
		self.process_namespaces = v;
		self
	}

	pub fn report_namespace_prefixes(mut self, v: bool) -> ParserOptions {
		self.report_namespace_prefixes = v;
		self
	}

	pub fn external_entity_policy(mut self, v: EntityPolicy) -> ParserOptions {
		self.external_entity_policy = v;
		self
	}

	pub fn encoding_hint(mut self, v: Encoding) -> ParserOptions {
		self.encoding_hint = Some(v);
		self
	}

	pub fn document_uri<S: Into<String>>(mut self, v: S) -> ParserOptions {
		self.document_uri = Some(v.into());
		self
	}

	pub fn fail_on_entity_errors(mut self, v: bool) -> ParserOptions {
		self.fail_on_entity_errors = v;
		self
	}

	/// Set the [`LexerOptions::max_token_length`] value.
	pub fn max_token_length(mut self, v: usize) -> ParserOptions {
		self.lexer = self.lexer.max_token_length(v);
		self
	}

	/// Set the [`LexerOptions::max_entity_expansions`] value.
	pub fn max_entity_expansions(mut self, v: usize) -> ParserOptions {
		self.lexer = self.lexer.max_entity_expansions(v);
		self
	}
}

impl Default for ParserOptions {
	/// Namespace processing off, external entities never resolved.
	fn default() -> Self {
		Self {
			process_namespaces: false,
			report_namespace_prefixes: false,
			external_entity_policy: EntityPolicy::default(),
			encoding_hint: None,
			document_uri: None,
			fail_on_entity_errors: false,
			lexer: LexerOptions::default(),
		}
	}
}

/**
# Source for individual XML events

It is analogous to the [`std::io::Read`] trait, but for XML document events
instead of bytes.
*/
pub trait EventRead {
	type Output;

	/// Read a single event from the parser.
	///
	/// If the EOF has been reached with a valid document, `None` is returned.
	///
	/// All errors are fatal and will be returned again by the parser on the
	/// next invocation.
	fn read(&mut self) -> Result<Option<Self::Output>>;

	/// Read all remaining events.
	///
	/// The given `cb` is invoked for each event.
	fn read_all<F>(&mut self, mut cb: F) -> Result<()>
	where
		F: FnMut(Self::Output),
	{
		loop {
			match self.read()? {
				None => return Ok(()),
				Some(ev) => cb(ev),
			}
		}
	}

	/// Read all remaining events into a vector.
	fn collect_events(&mut self) -> Result<Vec<Self::Output>> {
		let mut out = Vec::new();
		self.read_all(|ev| out.push(ev))?;
		Ok(out)
	}
}

/**
# Pull parser over a complete document

```
use saxml::{EventRead, EventReader, ParserOptions, ResolvedEvent};

let mut reader = EventReader::new(
	b"<?xml version='1.0'?><hello>World!</hello>",
	&ParserOptions::default(),
).unwrap();
let mut texts = Vec::new();
reader.read_all(|ev| {
	if let ResolvedEvent::Text(_, text) = ev {
		texts.push(text);
	}
}).unwrap();
assert_eq!(texts[0], "World!");
```
*/
#[derive(Debug)]
pub struct EventReader {
	lexer: Lexer,
	parser: RawParser,
	resolver: NamespaceResolver,
	encoding: Encoding,
}

impl EventReader {
	/// Decode `input` and prepare to parse it.
	///
	/// Decoding errors are returned right away.
	pub fn new(input: &[u8], options: &ParserOptions) -> Result<EventReader> {
		let decoded = encoding::decode(input, options.encoding_hint)?;
		let mut reader = Self::from_text(decoded.text, options);
		reader.encoding = decoded.encoding;
		Ok(reader)
	}

	/// Prepare to parse already decoded text.
	pub fn from_text(text: String, options: &ParserOptions) -> EventReader {
		EventReader {
			lexer: Lexer::with_options(text, options.lexer),
			parser: RawParser::with_options(options.lexer),
			resolver: NamespaceResolver::new(
				options.process_namespaces,
				options.report_namespace_prefixes,
			),
			encoding: Encoding::Utf8,
		}
	}

	/// Reader over the content of an external parsed entity.
	///
	/// Namespace processing is disabled, since prefixes may be bound by the
	/// referring document.
	pub(crate) fn external_entity(
		text: String,
		entities: Option<RcPtr<EntityTable>>,
		options: &ParserOptions,
	) -> EventReader {
		EventReader {
			lexer: Lexer::external_entity(text, entities.clone(), options.lexer),
			parser: RawParser::fragment(entities, options.lexer),
			resolver: NamespaceResolver::new(false, false),
			encoding: Encoding::Utf8,
		}
	}

	/// Encoding the input was decoded from.
	pub fn encoding(&self) -> Encoding {
		self.encoding
	}

	/// Entity declarations of the document, once its DOCTYPE has been read.
	pub fn entities(&self) -> Option<&RcPtr<EntityTable>> {
		self.parser.entities()
	}

	/// Best-effort position of the most recent event, or of the error
	/// after a failed [`EventRead::read`].
	pub fn position(&self) -> Position {
		Position::locate(self.lexer.text(), self.parser.offset())
	}

	/// Access the lexer
	pub fn get_lexer(&self) -> &Lexer {
		&self.lexer
	}

	/// Access the raw parser
	pub fn get_parser(&self) -> &RawParser {
		&self.parser
	}

	/// Release temporary buffers of the parser stages.
	pub fn release_temporaries(&mut self) {
		self.parser.release_temporaries();
	}
}

impl EventRead for EventReader {
	type Output = ResolvedEvent;

	fn read(&mut self) -> Result<Option<ResolvedEvent>> {
		let lexer = &mut self.lexer;
		let parser = &mut self.parser;
		self.resolver.next(|| parser.parse(lexer))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::{Error, WFError};

	#[test]
	fn event_reader_resolves_namespaces() {
		let mut reader = EventReader::new(
			b"<r xmlns='urn:r'><c/></r>",
			&ParserOptions::default().process_namespaces(true),
		)
		.unwrap();
		let evs = reader.collect_events().unwrap();
		assert_eq!(evs.len(), 4);
		match &evs[1] {
			ResolvedEvent::StartElement(_, name, _) => {
				assert_eq!(name.local_name, "c");
				assert_eq!(name.namespace_uri(), Some("urn:r"));
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn event_reader_reports_detected_encoding() {
		let input = crate::encoding::encode_for_test("<a/>", Encoding::Utf16Le);
		let reader = EventReader::new(&input, &ParserOptions::default()).unwrap();
		assert_eq!(reader.encoding(), Encoding::Utf16Le);
	}

	#[test]
	fn event_reader_locates_errors() {
		let mut reader = EventReader::new(b"<a>\n  <b>\n</a>", &ParserOptions::default()).unwrap();
		match reader.collect_events() {
			Err(Error::NotWellFormed(WFError::ElementMismatch)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		let pos = reader.position();
		assert_eq!(pos.line, 3);
		assert_eq!(pos.column, 1);
	}

	#[test]
	fn event_reader_locates_lexer_errors() {
		let mut reader = EventReader::new(b"<a>\nx\x01</a>", &ParserOptions::default()).unwrap();
		match reader.collect_events() {
			Err(Error::NotWellFormed(WFError::InvalidChar(..))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		let pos = reader.position();
		assert_eq!(pos.line, 2);
		assert_eq!(pos.column, 2);
	}

	#[test]
	fn parser_options_forward_lexer_limits() {
		let opts = ParserOptions::default()
			.max_token_length(16)
			.max_entity_expansions(3);
		assert_eq!(opts.lexer.max_token_length, 16);
		assert_eq!(opts.lexer.max_entity_expansions, 3);
		assert_eq!(opts.external_entity_policy, EntityPolicy::Never);
	}
}
