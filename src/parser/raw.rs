/*!
# XML 1.0 Parser, sans namespacing
*/
use std::collections::VecDeque;
use std::fmt;

use crate::entity::{EntityDef, EntityTable, ExternalId};
use crate::error::*;
use crate::lexer::{Lexer, LexerOptions, StartTag, Token, TokenMetrics, XMLDecl};
use crate::strings::*;

use super::common::*;

/**
# Logical XML document parts

The term *Event* is borrowed from SAX terminology. Each [`RawEvent`] refers to
a logical bit of the XML document which has been parsed.

Each event has [`EventMetrics`] attached which give information about where
in the document text the event originates.

## Document event sequence

A well-formed XML document will generate the following sequence of events:

1. Zero or one [`Self::XMLDeclaration`]
2. Zero or more [`Self::Comment`] or [`Self::ProcessingInstruction`]
3. One *element sequence*
4. Zero or more [`Self::Comment`] or [`Self::ProcessingInstruction`]

An *element sequence* consists of:

1. [`Self::StartElement`]
2. Zero or more element sequences, [`Self::Text`], [`Self::Comment`],
   [`Self::ProcessingInstruction`], [`Self::ExternalEntity`] or
   [`Self::SkippedEntity`], mixed arbitrarily
3. [`Self::EndElement`]

The document type declaration does not generate an event; its entity
declarations are available through [`RawParser::entities`].
*/
#[derive(Clone, PartialEq, Debug)]
pub enum RawEvent {
	/// The XML declaration (or the text declaration of an external entity).
	XMLDeclaration(EventMetrics, XMLDecl),

	/// Start of an element, with its attributes in document order.
	///
	/// Namespace declarations are ordinary attributes at this level.
	StartElement(EventMetrics, Name, Vec<(Name, CData)>),

	/// End of an element.
	///
	/// For `<name/>`, this event directly follows the start event and has a
	/// length of zero.
	EndElement(EventMetrics, Name),

	/// Character data.
	///
	/// **Note:** Text may be split into several consecutive events, for
	/// example around comments, CDATA sections and entity references.
	Text(EventMetrics, CData),

	Comment(EventMetrics, CData),

	ProcessingInstruction(EventMetrics, Name, Option<CData>),

	/// Reference to a declared, parsed external entity.
	///
	/// The content is not included in the event stream.
	ExternalEntity(EventMetrics, Name, ExternalId),

	/// Reference to an undeclared entity in a document whose declarations
	/// are not all known (external DTD subset or parameter entity
	/// references).
	SkippedEntity(EventMetrics, Name),
}

impl RawEvent {
	/// Return the [`EventMetrics`] of the event
	pub fn metrics(&self) -> &EventMetrics {
		match self {
			Self::XMLDeclaration(m, ..) => m,
			Self::StartElement(m, ..) => m,
			Self::EndElement(m, ..) => m,
			Self::Text(m, ..) => m,
			Self::Comment(m, ..) => m,
			Self::ProcessingInstruction(m, ..) => m,
			Self::ExternalEntity(m, ..) => m,
			Self::SkippedEntity(m, ..) => m,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum State {
	/// Nothing read yet; an XML declaration may follow.
	Initial,
	/// Before the root element.
	Prolog,
	/// Inside an element, or at the top level of an external entity.
	Content,
	/// After the root element.
	End,
	Eof,
}

/// Internal entity whose replacement text is being parsed.
struct Expansion {
	name: Name,
	lexer: Lexer,
	/// Element depth at which the expansion started.
	depth: usize,
	/// Document offset of the outermost reference.
	at: usize,
}

fn is_whitespace(s: &str) -> bool {
	s.bytes().all(|c| c == b' ' || c == b'\t' || c == b'\n' || c == b'\r')
}

/// White space which was written as such in the document.
///
/// A reference always occupies more bytes in the source than its expansion,
/// so text which contains one is shorter than its metrics.
fn is_literal_whitespace(tm: &TokenMetrics, s: &str) -> bool {
	tm.len() == s.len() && is_whitespace(s)
}

/**
# Logical XML 1.0 parser

The [`RawParser`] converts [`crate::lexer::Token`]s into [`RawEvent`]s. It
enforces the document structure (a single root element, proper nesting,
only white space, comments and processing instructions outside of the root,
at most one document type declaration before the root) and expands
references to internal entities by tokenizing their replacement text.

References to external parsed entities are reported as
[`RawEvent::ExternalEntity`]; what happens with them is up to the consumer.

Namespace prefixes are not interpreted; see
[`NamespaceResolver`](crate::parser::NamespaceResolver).

After the first error, the parser is poisoned and returns that error for
all subsequent calls.
*/
pub struct RawParser {
	state: State,
	fragment: bool,
	doctype_seen: bool,
	opts: LexerOptions,
	element_stack: Vec<Name>,
	entities: Option<RcPtr<EntityTable>>,
	expansions: Vec<Expansion>,
	/// Document offset of the most recent token read from the source.
	offset: usize,
	/// Internal queue for events which will be returned from the current
	/// and potentially future calls to `parse()`.
	eventq: VecDeque<RawEvent>,
	err: Option<Box<Error>>,
}

impl RawParser {
	/// Create a new parser for a document.
	pub fn new() -> Self {
		Self::with_options(LexerOptions::default())
	}

	/// Create a new parser for a document.
	///
	/// The options are used for the lexers created for entity replacement
	/// text and for the entity expansion limit.
	pub fn with_options(opts: LexerOptions) -> Self {
		Self {
			state: State::Initial,
			fragment: false,
			doctype_seen: false,
			opts,
			element_stack: Vec::new(),
			entities: None,
			expansions: Vec::new(),
			offset: 0,
			eventq: VecDeque::new(),
			err: None,
		}
	}

	/// Create a parser for the content of an external parsed entity.
	///
	/// The content may consist of any number of elements and text, but
	/// must be balanced. `entities` are the declarations of the document
	/// referring to the entity.
	pub fn fragment(entities: Option<RcPtr<EntityTable>>, opts: LexerOptions) -> Self {
		let mut result = Self::with_options(opts);
		result.fragment = true;
		result.entities = entities;
		result
	}

	/// Entity declarations of the document, once its DOCTYPE has been read.
	pub fn entities(&self) -> Option<&RcPtr<EntityTable>> {
		self.entities.as_ref()
	}

	/// Offset in the document text of the most recently read token (or of
	/// the end of the text, once it has been reached).
	pub fn offset(&self) -> usize {
		self.offset
	}

	/// Number of currently open elements.
	pub fn depth(&self) -> usize {
		self.element_stack.len()
	}

	/// Read the next token, from the innermost entity expansion if one is
	/// active.
	fn read_token<R: TokenRead>(&mut self, r: &mut R) -> Result<Option<(EventMetrics, Token)>> {
		while let Some(top) = self.expansions.last_mut() {
			match add_context(top.lexer.lex(), ERRCTX_ENTITY)? {
				Some(tok) => return Ok(Some((EventMetrics::new(top.at, 0), tok))),
				None => {
					if self.element_stack.len() != top.depth {
						return Err(WFError::UnbalancedEntity.into());
					}
					self.expansions.pop();
				}
			}
		}
		match r.read() {
			Ok(Some(tok)) => {
				let tm = *tok.metrics();
				self.offset = tm.start();
				Ok(Some((EventMetrics::new(tm.start(), tm.len()), tok)))
			}
			Ok(None) => {
				self.offset = r.offset();
				Ok(None)
			}
			Err(e) => {
				self.offset = r.offset();
				Err(e)
			}
		}
	}

	/// Emit an event into the event queue.
	fn emit_event(&mut self, ev: RawEvent) {
		self.eventq.push_back(ev);
	}

	/// Poison the parser, making it return the same error for all eternity.
	fn poison(&mut self, e: Error) {
		self.err = Some(Box::new(e))
	}

	/// Check if the parser is poisoned and return the corresponding error.
	fn check_poison(&self) -> Result<()> {
		if let Some(e) = self.err.as_ref() {
			Err((**e).clone())
		} else {
			Ok(())
		}
	}

	fn after_element(&self) -> State {
		if self.element_stack.is_empty() && !self.fragment {
			State::End
		} else {
			State::Content
		}
	}

	fn start_element(&mut self, em: EventMetrics, tag: StartTag) -> Result<State> {
		let StartTag {
			name,
			attributes,
			self_closing,
		} = tag;
		self.emit_event(RawEvent::StartElement(em, name.clone(), attributes));
		if self_closing {
			self.emit_event(RawEvent::EndElement(EventMetrics::new(em.end(), 0), name));
		} else {
			self.element_stack.push(name);
		}
		Ok(self.after_element())
	}

	fn end_element(&mut self, em: EventMetrics, name: Name) -> Result<State> {
		if let Some(top) = self.expansions.last() {
			if self.element_stack.len() <= top.depth {
				return Err(WFError::UnbalancedEntity.into());
			}
		}
		match self.element_stack.last() {
			None => {
				return Err(WFError::UnexpectedToken(ERRCTX_TEXT, Token::NAME_ENDTAG, None).into())
			}
			Some(open) if *open != name => return Err(WFError::ElementMismatch.into()),
			Some(_) => (),
		}
		self.element_stack.pop();
		self.emit_event(RawEvent::EndElement(em, name));
		Ok(self.after_element())
	}

	/// Handle a reference to a general entity in content.
	fn reference_entity(&mut self, em: EventMetrics, name: Name) -> Result<()> {
		let table = match self.entities.as_ref() {
			Some(table) => table.clone(),
			None => return Err(WFError::UndeclaredEntity.into()),
		};
		match table.get(&name) {
			None if table.is_complete() => Err(WFError::UndeclaredEntity.into()),
			None => {
				self.emit_event(RawEvent::SkippedEntity(em, name));
				Ok(())
			}
			Some(EntityDef::External {
				notation: Some(_), ..
			}) => Err(WFError::UnparsedEntityReference.into()),
			Some(EntityDef::External { id, .. }) => {
				self.emit_event(RawEvent::ExternalEntity(em, name, id.clone()));
				Ok(())
			}
			Some(EntityDef::Internal(text)) => {
				if self.expansions.iter().any(|x| x.name == name) {
					return Err(WFError::RecursiveEntity.into());
				}
				table.count_expansion(self.opts.max_entity_expansions)?;
				let lexer = Lexer::internal_entity(text, table.clone(), self.opts);
				let at = match self.expansions.first() {
					Some(outer) => outer.at,
					None => em.start(),
				};
				self.expansions.push(Expansion {
					name,
					lexer,
					depth: self.element_stack.len(),
					at,
				});
				Ok(())
			}
		}
	}

	fn parse_prolog(&mut self, em: EventMetrics, tok: Token) -> Result<State> {
		match tok {
			Token::Text(tm, s) if is_literal_whitespace(&tm, &s) => Ok(State::Prolog),
			Token::Comment(_, c) => {
				self.emit_event(RawEvent::Comment(em, c));
				Ok(State::Prolog)
			}
			Token::ProcessingInstruction(_, target, data) => {
				self.emit_event(RawEvent::ProcessingInstruction(em, target, data));
				Ok(State::Prolog)
			}
			Token::Doctype(_, decl) if !self.doctype_seen => {
				self.doctype_seen = true;
				self.entities = Some(decl.entities.clone());
				Ok(State::Prolog)
			}
			Token::StartTag(_, tag) => self.start_element(em, tag),
			other => Err(WFError::UnexpectedToken(
				ERRCTX_DOCBEGIN,
				other.name(),
				Some(&[Token::NAME_STARTTAG, Token::NAME_COMMENT, Token::NAME_PI]),
			)
			.into()),
		}
	}

	fn parse_content(&mut self, em: EventMetrics, tok: Token) -> Result<State> {
		match tok {
			Token::StartTag(_, tag) => self.start_element(em, tag),
			Token::EndTag(_, name) => self.end_element(em, name),
			Token::Text(_, s) | Token::CDataSection(_, s) => {
				if !s.is_empty() {
					self.emit_event(RawEvent::Text(em, s));
				}
				Ok(State::Content)
			}
			Token::Comment(_, c) => {
				self.emit_event(RawEvent::Comment(em, c));
				Ok(State::Content)
			}
			Token::ProcessingInstruction(_, target, data) => {
				self.emit_event(RawEvent::ProcessingInstruction(em, target, data));
				Ok(State::Content)
			}
			Token::EntityRef(_, name) => {
				self.reference_entity(em, name)?;
				Ok(State::Content)
			}
			other => Err(WFError::UnexpectedToken(ERRCTX_TEXT, other.name(), None).into()),
		}
	}

	fn parse_epilog(&mut self, em: EventMetrics, tok: Token) -> Result<State> {
		match tok {
			// whitespace after the root element is explicitly allowed
			Token::Text(tm, s) if is_literal_whitespace(&tm, &s) => Ok(State::End),
			Token::Comment(_, c) => {
				self.emit_event(RawEvent::Comment(em, c));
				Ok(State::End)
			}
			Token::ProcessingInstruction(_, target, data) => {
				self.emit_event(RawEvent::ProcessingInstruction(em, target, data));
				Ok(State::End)
			}
			other => Err(WFError::UnexpectedToken(
				ERRCTX_DOCEND,
				other.name(),
				Some(&["end-of-file"]),
			)
			.into()),
		}
	}

	fn parse_token(&mut self, em: EventMetrics, tok: Token) -> Result<State> {
		match self.state {
			State::Initial => {
				let next = if self.fragment {
					State::Content
				} else {
					State::Prolog
				};
				match tok {
					Token::XMLDeclaration(_, decl) => {
						self.emit_event(RawEvent::XMLDeclaration(em, decl));
						Ok(next)
					}
					tok => {
						self.state = next;
						self.parse_token(em, tok)
					}
				}
			}
			State::Prolog => self.parse_prolog(em, tok),
			State::Content => self.parse_content(em, tok),
			State::End => self.parse_epilog(em, tok),
			State::Eof => Err(WFError::UnexpectedToken(ERRCTX_DOCEND, tok.name(), None).into()),
		}
	}

	fn parse_eof(&mut self) -> Result<State> {
		match self.state {
			State::Initial | State::Prolog if self.fragment => Ok(State::Eof),
			State::Initial | State::Prolog => Err(Error::wfeof(ERRCTX_DOCBEGIN)),
			State::Content if self.fragment && self.element_stack.is_empty() => Ok(State::Eof),
			State::Content => Err(WFError::UnclosedElement.into()),
			State::End | State::Eof => Ok(State::Eof),
		}
	}
}

impl Default for RawParser {
	fn default() -> Self {
		Self::new()
	}
}

impl Parse for RawParser {
	type Output = RawEvent;

	fn parse<R: TokenRead>(&mut self, r: &mut R) -> Result<Option<Self::Output>> {
		self.check_poison()?;
		loop {
			if let Some(ev) = self.eventq.pop_front() {
				return Ok(Some(ev));
			}
			if self.state == State::Eof {
				return Ok(None);
			}

			let result = match self.read_token(r) {
				Ok(Some((em, tok))) => self.parse_token(em, tok),
				Ok(None) => self.parse_eof(),
				Err(e) => Err(e),
			};
			match result {
				Ok(st) => self.state = st,
				// poison the parser to avoid emitting illegal data
				Err(e) => {
					self.poison(e.clone());
					return Err(e);
				}
			}
		}
	}

	fn release_temporaries(&mut self) {
		self.eventq.shrink_to_fit();
		self.element_stack.shrink_to_fit();
		self.expansions.shrink_to_fit();
	}
}

impl fmt::Debug for RawParser {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("RawParser")
			.field("state", &self.state)
			.field("fragment", &self.fragment)
			.field("depth", &self.element_stack.len())
			.field("expansions", &self.expansions.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::convert::TryInto;

	const DM: TokenMetrics = TokenMetrics::new(0, 0);

	struct TokenSliceReader<'x> {
		base: &'x [Token],
		offset: usize,
	}

	impl<'x> TokenSliceReader<'x> {
		fn new(src: &'x [Token]) -> TokenSliceReader<'x> {
			TokenSliceReader {
				base: src,
				offset: 0,
			}
		}
	}

	impl<'x> TokenRead for TokenSliceReader<'x> {
		fn read(&mut self) -> Result<Option<Token>> {
			match self.base.get(self.offset) {
				Some(x) => {
					self.offset += 1;
					Ok(Some(x.clone()))
				}
				None => Ok(None),
			}
		}
	}

	fn start(name: &str, attrs: &[(&str, &str)], self_closing: bool) -> Token {
		Token::StartTag(
			DM,
			StartTag {
				name: name.try_into().unwrap(),
				attributes: attrs
					.iter()
					.map(|(k, v)| ((*k).try_into().unwrap(), (*v).try_into().unwrap()))
					.collect(),
				self_closing,
			},
		)
	}

	fn end(name: &str) -> Token {
		Token::EndTag(DM, name.try_into().unwrap())
	}

	fn text(s: &str) -> Token {
		Token::Text(TokenMetrics::new(0, s.len()), s.try_into().unwrap())
	}

	fn drain<R: TokenRead>(mut parser: RawParser, reader: &mut R) -> (Vec<RawEvent>, Result<()>) {
		let mut sink = Vec::new();
		loop {
			match parser.parse(reader) {
				Ok(Some(ev)) => sink.push(ev),
				Ok(None) => return (sink, Ok(())),
				Err(e) => return (sink, Err(e)),
			}
		}
	}

	fn parse(src: &[Token]) -> (Vec<RawEvent>, Result<()>) {
		drain(RawParser::new(), &mut TokenSliceReader::new(src))
	}

	fn parse_str(src: &str) -> (Vec<RawEvent>, Result<()>) {
		drain(RawParser::new(), &mut Lexer::new(src.to_string()))
	}

	#[test]
	fn parser_parse_xml_declaration_and_root() {
		let (evs, r) = parse(&[
			Token::XMLDeclaration(
				TokenMetrics::new(0, 21),
				XMLDecl {
					version: crate::lexer::XMLVersion::V1_0,
					encoding: None,
					standalone: None,
				},
			),
			text("\n"),
			start("root", &[], true),
		]);
		r.unwrap();
		let mut iter = evs.iter();
		match iter.next().unwrap() {
			RawEvent::XMLDeclaration(em, decl) => {
				assert_eq!(em.len(), 21);
				assert_eq!(decl.version, crate::lexer::XMLVersion::V1_0);
			}
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next().unwrap() {
			RawEvent::StartElement(_, name, attrs) => {
				assert_eq!(name, "root");
				assert!(attrs.is_empty());
			}
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next().unwrap() {
			RawEvent::EndElement(_, name) => assert_eq!(name, "root"),
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next() {
			None => (),
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn parser_parse_nested_elements_and_text() {
		let (evs, r) = parse(&[
			start("root", &[("a", "1")], false),
			text("foo"),
			start("child", &[], false),
			Token::CDataSection(DM, "<bar>".try_into().unwrap()),
			end("child"),
			end("root"),
			text("\n\t "),
		]);
		r.unwrap();
		let mut iter = evs.iter();
		match iter.next().unwrap() {
			RawEvent::StartElement(_, name, attrs) => {
				assert_eq!(name, "root");
				assert_eq!(attrs.len(), 1);
				assert_eq!(attrs[0].0, "a");
				assert_eq!(attrs[0].1, "1");
			}
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next().unwrap() {
			RawEvent::Text(_, t) => assert_eq!(t, "foo"),
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next().unwrap() {
			RawEvent::StartElement(_, name, _) => assert_eq!(name, "child"),
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next().unwrap() {
			RawEvent::Text(_, t) => assert_eq!(t, "<bar>"),
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next().unwrap() {
			RawEvent::EndElement(_, name) => assert_eq!(name, "child"),
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next().unwrap() {
			RawEvent::EndElement(_, name) => assert_eq!(name, "root"),
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next() {
			None => (),
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn parser_reject_mismatched_elements() {
		let (evs, r) = parse(&[
			start("root", &[], false),
			start("child", &[], false),
			end("nonchild"),
			end("root"),
		]);
		match r {
			Err(Error::NotWellFormed(WFError::ElementMismatch)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		assert_eq!(evs.len(), 2);
	}

	#[test]
	fn parser_reject_unclosed_element() {
		let (evs, r) = parse(&[start("root", &[], false), text("x")]);
		match r {
			Err(Error::NotWellFormed(WFError::UnclosedElement)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		assert_eq!(evs.len(), 2);
	}

	#[test]
	fn parser_reject_empty_document() {
		match parse(&[text("  ")]).1 {
			Err(Error::NotWellFormed(WFError::InvalidEof(ERRCTX_DOCBEGIN))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn parser_reject_text_before_root_element() {
		match parse(&[text("x"), start("root", &[], true)]).1 {
			Err(Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_DOCBEGIN, Token::NAME_TEXT, _))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn parser_reject_element_after_root_element() {
		let (evs, r) = parse(&[start("root", &[], true), start("second", &[], true)]);
		match r {
			Err(Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_DOCEND, Token::NAME_STARTTAG, _))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		assert_eq!(evs.len(), 2);
	}

	#[test]
	fn parser_reject_text_after_root_element() {
		match parse(&[start("root", &[], true), text("foo")]).1 {
			Err(Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_DOCEND, Token::NAME_TEXT, _))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn parser_reject_references_around_root_element() {
		for src in &["&#32;<a/>", "&#x20;<a/>", "<a/>&#10;", "<a/>\n&#9;", "<a/>&amp;"] {
			match parse_str(src).1 {
				Err(Error::NotWellFormed(WFError::UnexpectedToken(_, Token::NAME_TEXT, _))) => (),
				other => panic!("unexpected result for {:?}: {:?}", src, other),
			}
		}
	}

	#[test]
	fn parser_reject_expanded_whitespace_token() {
		let spaced = Token::Text(TokenMetrics::new(0, 5), " ".try_into().unwrap());
		match parse(&[spaced, start("root", &[], true)]).1 {
			Err(Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_DOCBEGIN, Token::NAME_TEXT, _))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn parser_allows_misc_around_root_element() {
		let (evs, r) = parse_str("<!--a--><?pi x?>\n<root/>\n<!--b--><?pi?>\n");
		r.unwrap();
		let names: Vec<&str> = evs
			.iter()
			.map(|ev| match ev {
				RawEvent::Comment(..) => "comment",
				RawEvent::ProcessingInstruction(..) => "pi",
				RawEvent::StartElement(..) => "start",
				RawEvent::EndElement(..) => "end",
				other => panic!("unexpected event: {:?}", other),
			})
			.collect();
		assert_eq!(names, vec!["comment", "pi", "start", "end", "comment", "pi"]);
	}

	#[test]
	fn parser_reject_second_doctype_and_late_doctype() {
		match parse_str("<!DOCTYPE a><!DOCTYPE a><a/>").1 {
			Err(Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_DOCBEGIN, Token::NAME_DOCTYPE, _))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		match parse_str("<a><!DOCTYPE a></a>").1 {
			Err(Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_TEXT, Token::NAME_DOCTYPE, _))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn parser_does_not_panic_on_too_many_closing_elements() {
		match parse(&[start("root", &[], false), end("root"), end("root")]).1 {
			Err(Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_DOCEND, Token::NAME_ENDTAG, _))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn parser_repeats_error_after_first_encounter() {
		let toks = &[start("root", &[], false), end("other")];
		let mut reader = TokenSliceReader::new(toks);
		let mut parser = RawParser::new();
		parser.parse(&mut reader).unwrap();
		for _ in 0..3 {
			match parser.parse(&mut reader) {
				Err(Error::NotWellFormed(WFError::ElementMismatch)) => (),
				other => panic!("unexpected result: {:?}", other),
			}
		}
	}

	#[test]
	fn parser_expands_internal_entities() {
		let (evs, r) = parse_str(
			"<!DOCTYPE r [<!ENTITY inner '<i a=\"&amp;\">x</i>'><!ENTITY outer 'a&inner;b'>]>\
			 <r>[&outer;]</r>",
		);
		r.unwrap();
		let mut iter = evs.iter();
		match iter.next().unwrap() {
			RawEvent::StartElement(em, name, _) => {
				assert_eq!(name, "r");
				assert_eq!(em.start(), 78);
			}
			other => panic!("unexpected event: {:?}", other),
		}
		let mut texts = String::new();
		let mut seen_inner = false;
		for ev in iter {
			match ev {
				RawEvent::Text(em, t) => {
					if t != "[" && t != "]" {
						// entity content points at the outermost reference
						assert_eq!(em.start(), 82);
						assert_eq!(em.len(), 0);
					}
					texts.push_str(t);
				}
				RawEvent::StartElement(_, name, attrs) => {
					assert_eq!(name, "i");
					assert_eq!(attrs[0].1, "&");
					seen_inner = true;
				}
				RawEvent::EndElement(..) => (),
				other => panic!("unexpected event: {:?}", other),
			}
		}
		assert!(seen_inner);
		assert_eq!(texts, "[axb]");
	}

	#[test]
	fn parser_rejects_recursive_entities() {
		match parse_str("<!DOCTYPE r [<!ENTITY a '&b;'><!ENTITY b '&a;'>]><r>&a;</r>").1 {
			Err(Error::NotWellFormed(WFError::RecursiveEntity)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn parser_rejects_unbalanced_entities() {
		for doc in &[
			"<!DOCTYPE r [<!ENTITY a '<x>'>]><r>&a;</x></r>",
			"<!DOCTYPE r [<!ENTITY a '</r>'>]><r>&a;",
		] {
			match parse_str(doc).1 {
				Err(Error::NotWellFormed(WFError::UnbalancedEntity)) => (),
				other => panic!("unexpected result for {:?}: {:?}", doc, other),
			}
		}
	}

	#[test]
	fn parser_limits_entity_expansions() {
		let mut doc = String::from("<!DOCTYPE r [<!ENTITY a0 'lol'>");
		for i in 1..10 {
			doc.push_str(&format!(
				"<!ENTITY a{} '&a{};&a{};&a{};&a{};&a{};&a{};&a{};&a{};&a{};&a{};'>",
				i,
				i - 1, i - 1, i - 1, i - 1, i - 1, i - 1, i - 1, i - 1, i - 1, i - 1
			));
		}
		doc.push_str("]><r>&a9;</r>");
		let (_, r) = parse_str(&doc);
		match r {
			Err(Error::LimitExceeded(_)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn parser_reports_external_and_skipped_entities() {
		let (evs, r) = parse_str("<!DOCTYPE r [<!ENTITY e SYSTEM 'e.xml'> %pe;]><r>&e;&unknown;</r>");
		r.unwrap();
		match &evs[1] {
			RawEvent::ExternalEntity(_, name, id) => {
				assert_eq!(name, "e");
				assert_eq!(id.system_id(), "e.xml");
			}
			other => panic!("unexpected event: {:?}", other),
		}
		match &evs[2] {
			RawEvent::SkippedEntity(_, name) => assert_eq!(name, "unknown"),
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn parser_rejects_undeclared_and_unparsed_entities() {
		match parse_str("<r>&nope;</r>").1 {
			Err(Error::NotWellFormed(WFError::UndeclaredEntity)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		match parse_str("<!DOCTYPE r [<!ENTITY i SYSTEM 'i.png' NDATA png>]><r>&i;</r>").1 {
			Err(Error::NotWellFormed(WFError::UnparsedEntityReference)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn parser_fragment_allows_multiple_top_level_elements() {
		let mut lexer = Lexer::external_entity(
			"<?xml encoding='utf-8'?>text<a/><b>x</b>tail".to_string(),
			None,
			LexerOptions::default(),
		);
		let (evs, r) = drain(RawParser::fragment(None, LexerOptions::default()), &mut lexer);
		r.unwrap();
		assert_eq!(evs.len(), 8);
	}

	#[test]
	fn parser_fragment_rejects_unbalanced_content() {
		let mut lexer =
			Lexer::external_entity("<a>".to_string(), None, LexerOptions::default());
		match drain(RawParser::fragment(None, LexerOptions::default()), &mut lexer).1 {
			Err(Error::NotWellFormed(WFError::UnclosedElement)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		let mut lexer =
			Lexer::external_entity("</a>".to_string(), None, LexerOptions::default());
		match drain(RawParser::fragment(None, LexerOptions::default()), &mut lexer).1 {
			Err(Error::NotWellFormed(WFError::UnexpectedToken(..))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn parser_forwards_metrics() {
		let (evs, r) = parse_str("<root>foo</root>");
		r.unwrap();
		assert_eq!(*evs[0].metrics(), EventMetrics::new(0, 6));
		assert_eq!(*evs[1].metrics(), EventMetrics::new(6, 3));
		assert_eq!(*evs[2].metrics(), EventMetrics::new(9, 7));
	}
}
