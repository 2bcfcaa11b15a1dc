/*!
# XML 1.0 Lexer

The lexer turns canonical document text (see [`crate::encoding`]) into
[`Token`]s. It operates on the complete text, which is shared with all
lexers created for entity replacement text.

Besides splitting the text, the lexer performs the purely lexical parts of
XML 1.0 processing:

- character references and the five predefined entities are expanded in text
  and attribute values,
- attribute values are normalized (white space becomes a space) and internal
  entities referenced from them are expanded,
- the internal DTD subset is scanned and its general entity declarations are
  collected into an [`EntityTable`],
- duplicate attribute names within a tag are rejected.

Structural checks (element nesting, placement of the DOCTYPE, etc.) are the
job of [`crate::parser::RawParser`].
*/
use std::collections::HashSet;
use std::fmt;

mod cursor;

use memchr::{memchr2, memchr3, memmem};
use smartstring::alias::String as SmartString;

use saxml_validation::selectors::{CharSelector, CLASS_XML_NONCHAR};
use saxml_validation::validate_pubid;

use crate::entity::{EntityDef, EntityTable, ExternalId};
use crate::errctx::*;
use crate::error::{Error, Result, WFError};
use crate::parser::{RcPtr, TokenRead};
use crate::strings::*;
use cursor::{find_nonchar, Cursor};

/**
# XML version number

Only version 1.0 is supported. Declarations of later 1.x versions are
processed as 1.0.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XMLVersion {
	/// XML Version 1.0
	V1_0,
}

/// Carry information about where in the text the token was observed
///
/// Offsets refer to the text of the lexer which emitted the token. For
/// tokens from entity replacement text, that is the replacement text, not
/// the document.
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub struct TokenMetrics {
	start: usize,
	end: usize,
}

impl TokenMetrics {
	/// Get the length of the token in bytes.
	pub fn len(&self) -> usize {
		self.end - self.start
	}

	pub fn is_empty(&self) -> bool {
		self.end == self.start
	}

	/// Start byte in the text.
	pub fn start(&self) -> usize {
		self.start
	}

	/// End byte of the token in the text (exclusive).
	pub fn end(&self) -> usize {
		self.end
	}

	pub(crate) const fn new(start: usize, end: usize) -> TokenMetrics {
		TokenMetrics { start, end }
	}
}

/// Contents of an XML declaration or of the text declaration of an
/// external parsed entity.
#[derive(Debug, Clone, PartialEq)]
pub struct XMLDecl {
	pub version: XMLVersion,
	pub encoding: Option<SmartString>,
	pub standalone: Option<bool>,
}

/// An element header with its attributes.
///
/// Attribute values are fully expanded and normalized. Names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct StartTag {
	pub name: Name,
	pub attributes: Vec<(Name, CData)>,
	/// Set for `<name/>`.
	pub self_closing: bool,
}

/// A document type declaration.
#[derive(Debug, Clone)]
pub struct DoctypeDecl {
	pub name: Name,
	pub external_id: Option<ExternalId>,
	/// General entities declared in the internal subset.
	pub entities: RcPtr<EntityTable>,
}

impl PartialEq for DoctypeDecl {
	fn eq(&self, other: &DoctypeDecl) -> bool {
		self.name == other.name
			&& self.external_id == other.external_id
			&& RcPtr::ptr_eq(&self.entities, &other.entities)
	}
}

/**
A single XML token

Tokens are emitted by the lexer after processing bits of XML. Each token
carries [`TokenMetrics`] describing the byte range it was derived from.
White space between tokens is always part of a [`Token::Text`]; whether it
is significant is for the parser to decide.
*/
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
	/// `<?xml ... ?>` at the very start of the text.
	XMLDeclaration(TokenMetrics, XMLDecl),

	/// `<!DOCTYPE ...>`, including the processed internal subset.
	Doctype(TokenMetrics, Box<DoctypeDecl>),

	/// `<name ...>` or `<name .../>`.
	StartTag(TokenMetrics, StartTag),

	/// `</name>`.
	EndTag(TokenMetrics, Name),

	/// Character data.
	///
	/// Character references and predefined entities are expanded. Other
	/// entity references terminate the text token and are emitted as
	/// [`Token::EntityRef`].
	Text(TokenMetrics, CData),

	/// Contents of a `<![CDATA[...]]>` section.
	CDataSection(TokenMetrics, CData),

	/// Contents of a `<!--...-->` comment.
	Comment(TokenMetrics, CData),

	/// `<?target data?>`.
	ProcessingInstruction(TokenMetrics, Name, Option<CData>),

	/// Reference to a general entity which is not predefined.
	EntityRef(TokenMetrics, Name),
}

impl Token {
	pub const NAME_XMLDECL: &'static str = "XMLDeclaration";
	pub const NAME_DOCTYPE: &'static str = "Doctype";
	pub const NAME_STARTTAG: &'static str = "StartTag";
	pub const NAME_ENDTAG: &'static str = "EndTag";
	pub const NAME_TEXT: &'static str = "Text";
	pub const NAME_CDATASECTION: &'static str = "CDataSection";
	pub const NAME_COMMENT: &'static str = "Comment";
	pub const NAME_PI: &'static str = "ProcessingInstruction";
	pub const NAME_ENTITYREF: &'static str = "EntityRef";

	/// Static name of the token kind, for use in error messages.
	pub fn name(&self) -> &'static str {
		match self {
			Self::XMLDeclaration(..) => Self::NAME_XMLDECL,
			Self::Doctype(..) => Self::NAME_DOCTYPE,
			Self::StartTag(..) => Self::NAME_STARTTAG,
			Self::EndTag(..) => Self::NAME_ENDTAG,
			Self::Text(..) => Self::NAME_TEXT,
			Self::CDataSection(..) => Self::NAME_CDATASECTION,
			Self::Comment(..) => Self::NAME_COMMENT,
			Self::ProcessingInstruction(..) => Self::NAME_PI,
			Self::EntityRef(..) => Self::NAME_ENTITYREF,
		}
	}

	/// Return a reference to this token's [`TokenMetrics`].
	pub fn metrics(&self) -> &TokenMetrics {
		match self {
			Self::XMLDeclaration(m, ..) => m,
			Self::Doctype(m, ..) => m,
			Self::StartTag(m, ..) => m,
			Self::EndTag(m, ..) => m,
			Self::Text(m, ..) => m,
			Self::CDataSection(m, ..) => m,
			Self::Comment(m, ..) => m,
			Self::ProcessingInstruction(m, ..) => m,
			Self::EntityRef(m, ..) => m,
		}
	}
}

/// Expand one of the five predefined entities.
pub(crate) fn resolve_builtin(name: &str) -> Option<char> {
	match name {
		"lt" => Some('<'),
		"gt" => Some('>'),
		"amp" => Some('&'),
		"apos" => Some('\''),
		"quot" => Some('"'),
		_ => None,
	}
}

enum Reference {
	Char(char),
	Entity(Name),
}

/// Parse the reference at the cursor, which must be at the `&`.
fn read_reference(cur: &mut Cursor<'_>) -> Result<Reference> {
	cur.advance(1);
	let radix = if cur.eat("#x") {
		16
	} else if cur.eat("#") {
		10
	} else {
		let name = cur.read_name(ERRCTX_REF)?;
		cur.expect(";", ERRCTX_REF)?;
		return Ok(Reference::Entity(name));
	};
	let rest = cur.rest();
	let ndigits = rest
		.find(|c: char| !c.is_digit(radix))
		.unwrap_or(rest.len());
	if ndigits == 0 {
		return Err(cur.unexpected(ERRCTX_REF));
	}
	let digits = &rest[..ndigits];
	cur.advance(ndigits);
	cur.expect(";", ERRCTX_REF)?;
	let cp = u32::from_str_radix(digits, radix).unwrap_or(u32::MAX);
	match std::char::from_u32(cp) {
		Some(c) if !CLASS_XML_NONCHAR.select(c) => Ok(Reference::Char(c)),
		_ => Err(WFError::InvalidChar(ERRCTX_REF, cp, true).into()),
	}
}

/// Append attribute value text, replacing white space by a space.
fn push_normalized(out: &mut String, s: &str) {
	for c in s.chars() {
		match c {
			'\t' | '\n' | '\r' => out.push(' '),
			c => out.push(c),
		}
	}
}

fn parse_version(v: &str) -> Result<XMLVersion> {
	match v.strip_prefix("1.") {
		Some(minor) if !minor.is_empty() && minor.bytes().all(|b| b.is_ascii_digit()) => {
			Ok(XMLVersion::V1_0)
		}
		_ => Err(Error::syntax("unsupported XML version")),
	}
}

fn validate_encoding_name(name: &str) -> Result<()> {
	let mut bytes = name.bytes();
	match bytes.next() {
		Some(b) if b.is_ascii_alphabetic() => (),
		_ => return Err(Error::syntax("invalid encoding name")),
	}
	if bytes.all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-') {
		Ok(())
	} else {
		Err(Error::syntax("invalid encoding name"))
	}
}

fn read_external_id(cur: &mut Cursor<'_>, ctx: &'static str) -> Result<ExternalId> {
	if cur.eat("SYSTEM") {
		cur.require_space(ctx)?;
		let system_id = checked_literal(cur, ctx)?;
		Ok(ExternalId::System(system_id))
	} else if cur.eat("PUBLIC") {
		cur.require_space(ctx)?;
		let public_id = cur.read_literal(ctx)?;
		if validate_pubid(public_id).is_err() {
			return Err(Error::syntax("invalid character in public identifier"));
		}
		cur.require_space(ctx)?;
		let system_id = checked_literal(cur, ctx)?;
		Ok(ExternalId::Public {
			public_id: CData::from_checked(public_id),
			system_id,
		})
	} else {
		Err(cur.unexpected(ctx))
	}
}

fn checked_literal(cur: &mut Cursor<'_>, ctx: &'static str) -> Result<CData> {
	let literal = cur.read_literal(ctx)?;
	match find_nonchar(literal) {
		None => Ok(CData::from_checked(literal)),
		Some((_, c)) => Err(WFError::InvalidChar(ctx, c as u32, false).into()),
	}
}

/// Scan to the end of a markup declaration, skipping quoted literals.
fn skip_markup_decl(cur: &mut Cursor<'_>) -> Result<()> {
	loop {
		match cur.next_char() {
			None => return Err(Error::wfeof(ERRCTX_INTERNAL_SUBSET)),
			Some('>') => return Ok(()),
			Some(q) if q == '"' || q == '\'' => {
				let mut buf = [0u8; 4];
				cur.take_until(q.encode_utf8(&mut buf), ERRCTX_INTERNAL_SUBSET)?;
			}
			Some(_) => (),
		}
	}
}

/// Read a comment body; the cursor must be just past `<!--`.
fn read_comment<'a>(cur: &mut Cursor<'a>) -> Result<&'a str> {
	let rest = cur.rest();
	let end = match rest.find("--") {
		Some(end) => end,
		None => {
			cur.advance(rest.len());
			return Err(Error::wfeof(ERRCTX_COMMENT));
		}
	};
	cur.check_chars(end, ERRCTX_COMMENT)?;
	cur.advance(end + 2);
	if !cur.eat(">") {
		return Err(if cur.at_end() {
			Error::wfeof(ERRCTX_COMMENT)
		} else {
			Error::syntax("'--' inside comment")
		});
	}
	Ok(&rest[..end])
}

/**
# Options to configure a [`Lexer`]
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerOptions {
	/// Maximum number of bytes which can form a token.
	///
	/// Text tokens exceeding this limit are split and emitted in parts, all
	/// other tokens exceeding it cause [`Error::LimitExceeded`]. The limit
	/// also applies to the expanded value of a single attribute.
	pub max_token_length: usize,

	/// Maximum number of internal entity expansions per document, counting
	/// both content and attribute values.
	pub max_entity_expansions: usize,
}

impl LexerOptions {
	/// Set the [`LexerOptions::max_token_length`] value.
	///
	/// # Example
	///
	/// ```
	/// use saxml::{Lexer, LexerOptions};
	/// let mut lexer = Lexer::with_options(
	/// 	"<a/>".to_string(),
	/// 	LexerOptions::default().max_token_length(1024),
	/// );
	/// ```
	pub fn max_token_length(mut self, v: usize) -> LexerOptions {
		self.max_token_length = v;
		self
	}

	/// Set the [`LexerOptions::max_entity_expansions`] value.
	pub fn max_entity_expansions(mut self, v: usize) -> LexerOptions {
		self.max_entity_expansions = v;
		self
	}
}

impl Default for LexerOptions {
	/// Constructs default lexer options.
	///
	/// The defaults are implementation-defined and should not be relied upon.
	fn default() -> Self {
		Self {
			max_token_length: 1024 * 1024,
			max_entity_expansions: 10000,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
	Document,
	/// External parsed entity: may start with a text declaration.
	ExternalEntity,
	/// Replacement text of an internal entity.
	InternalEntity,
}

/**
# Tokenizer for XML 1.0 text

The lexer is created on complete, canonical text and hands out one token
per call to [`Lexer::lex`]. After the first error, it is poisoned and keeps
returning that error.

```
use saxml::{Lexer, Token};

let mut lexer = Lexer::new("<a x='1'>b&amp;c</a>".to_string());
match lexer.lex().unwrap() {
	Some(Token::StartTag(_, tag)) => {
		assert_eq!(tag.name, "a");
		assert_eq!(tag.attributes[0].1, "1");
	}
	other => panic!("unexpected token: {:?}", other),
}
match lexer.lex().unwrap() {
	Some(Token::Text(_, text)) => assert_eq!(text, "b&c"),
	other => panic!("unexpected token: {:?}", other),
}
```
*/
pub struct Lexer {
	text: RcPtr<str>,
	pos: usize,
	mode: Mode,
	opts: LexerOptions,
	entities: Option<RcPtr<EntityTable>>,
	standalone: bool,
	err: Option<Box<Error>>,
	err_pos: usize,
}

impl Lexer {
	/// Create a lexer for a document with default options.
	pub fn new(text: String) -> Lexer {
		Self::with_options(text, LexerOptions::default())
	}

	/// Create a lexer for a document.
	pub fn with_options(text: String, opts: LexerOptions) -> Lexer {
		Self::create(RcPtr::from(text), Mode::Document, opts, None)
	}

	/// Create a lexer for the content of an external parsed entity.
	///
	/// `entities` are the declarations of the referring document, if any.
	pub(crate) fn external_entity(
		text: String,
		entities: Option<RcPtr<EntityTable>>,
		opts: LexerOptions,
	) -> Lexer {
		Self::create(RcPtr::from(text), Mode::ExternalEntity, opts, entities)
	}

	/// Create a lexer for the replacement text of an internal entity.
	pub(crate) fn internal_entity(
		text: &str,
		entities: RcPtr<EntityTable>,
		opts: LexerOptions,
	) -> Lexer {
		Self::create(RcPtr::from(text), Mode::InternalEntity, opts, Some(entities))
	}

	fn create(
		text: RcPtr<str>,
		mode: Mode,
		opts: LexerOptions,
		entities: Option<RcPtr<EntityTable>>,
	) -> Lexer {
		Lexer {
			text,
			pos: 0,
			mode,
			opts,
			entities,
			standalone: false,
			err: None,
			err_pos: 0,
		}
	}

	/// The text the lexer operates on.
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Entity declarations seen so far (or inherited from the referring
	/// document).
	pub fn entities(&self) -> Option<&RcPtr<EntityTable>> {
		self.entities.as_ref()
	}

	pub fn options(&self) -> LexerOptions {
		self.opts
	}

	/// Current byte offset in the text, or the offset at which lexing failed.
	pub fn position(&self) -> usize {
		if self.err.is_some() {
			self.err_pos
		} else {
			self.pos
		}
	}

	/// Lex the next token.
	///
	/// Returns `None` at the end of the text.
	pub fn lex(&mut self) -> Result<Option<Token>> {
		if let Some(e) = self.err.as_ref() {
			return Err((**e).clone());
		}
		let text = self.text.clone();
		let mut cur = Cursor::new(&text, self.pos);
		match self.lex_token(&mut cur) {
			Ok(tok) => {
				self.pos = cur.pos();
				Ok(tok)
			}
			Err(e) => {
				self.err_pos = cur.pos();
				self.err = Some(Box::new(e.clone()));
				Err(e)
			}
		}
	}

	fn lex_token(&mut self, cur: &mut Cursor<'_>) -> Result<Option<Token>> {
		let start = cur.pos();
		if cur.at_end() {
			return Ok(None);
		}
		if !cur.starts_with("<") {
			return self.lex_text(cur, start).map(Some);
		}
		let tok = if cur.eat("<!--") {
			let body = read_comment(cur)?;
			Token::Comment(TokenMetrics::new(start, cur.pos()), CData::from_checked(body))
		} else if cur.eat("<![CDATA[") {
			let body_start = cur.pos();
			let body = cur.take_until("]]>", ERRCTX_CDATA_SECTION)?;
			cur.set_pos(body_start);
			cur.check_chars(body.len(), ERRCTX_CDATA_SECTION)?;
			cur.advance(body.len() + 3);
			Token::CDataSection(TokenMetrics::new(start, cur.pos()), CData::from_checked(body))
		} else if cur.eat("<!DOCTYPE") {
			self.lex_doctype(cur, start)?
		} else if cur.eat("<?") {
			self.lex_pi(cur, start)?
		} else if cur.eat("</") {
			let name = cur.read_name(ERRCTX_ELEMENT_FOOT)?;
			cur.skip_space();
			cur.expect(">", ERRCTX_ELEMENT_FOOT)?;
			Token::EndTag(TokenMetrics::new(start, cur.pos()), name)
		} else {
			cur.advance(1);
			self.lex_start_tag(cur, start)?
		};
		if cur.pos() - start > self.opts.max_token_length {
			return Err(Error::LimitExceeded("token too long"));
		}
		Ok(Some(tok))
	}

	fn lex_text(&self, cur: &mut Cursor<'_>, start: usize) -> Result<Token> {
		let mut out = String::new();
		loop {
			let rest = cur.rest();
			let mut stop = memchr2(b'<', b'&', rest.as_bytes()).unwrap_or(rest.len());
			let room = self.opts.max_token_length.saturating_sub(out.len());
			let split = stop > room;
			if split {
				stop = room;
				while !rest.is_char_boundary(stop) {
					stop -= 1;
				}
				if stop == 0 && out.is_empty() {
					stop = rest.chars().next().map(|c| c.len_utf8()).unwrap_or(0);
				}
			}
			let chunk = &rest[..stop];
			// a `]]>` may straddle the end of a split chunk
			let scan = &rest.as_bytes()[..(stop + 2).min(rest.len())];
			if let Some(at) = memmem::find(scan, b"]]>") {
				cur.advance(at);
				return Err(Error::syntax("']]>' in text"));
			}
			cur.check_chars(stop, ERRCTX_TEXT)?;
			out.push_str(chunk);
			cur.advance(stop);
			if split || cur.at_end() || cur.starts_with("<") {
				break;
			}

			let ref_start = cur.pos();
			match read_reference(cur)? {
				Reference::Char(c) => out.push(c),
				Reference::Entity(name) => match resolve_builtin(&name) {
					Some(c) => out.push(c),
					None if out.is_empty() => {
						return Ok(Token::EntityRef(TokenMetrics::new(start, cur.pos()), name));
					}
					None => {
						cur.set_pos(ref_start);
						break;
					}
				},
			}
		}
		Ok(Token::Text(TokenMetrics::new(start, cur.pos()), CData::from_checked(out)))
	}

	fn lex_start_tag(&self, cur: &mut Cursor<'_>, start: usize) -> Result<Token> {
		let name = cur.read_name(ERRCTX_ELEMENT)?;
		let mut attributes: Vec<(Name, CData)> = Vec::new();
		let mut seen: HashSet<Name> = HashSet::new();
		let self_closing = loop {
			let had_space = cur.skip_space();
			if cur.eat(">") {
				break false;
			}
			if cur.eat("/>") {
				break true;
			}
			if !had_space {
				return Err(cur.unexpected(ERRCTX_ELEMENT));
			}
			let attname = cur.read_name(ERRCTX_ATTNAME)?;
			cur.skip_space();
			cur.expect("=", ERRCTX_ATTNAME)?;
			cur.skip_space();
			let value = self.lex_attribute_value(cur)?;
			if !seen.insert(attname.clone()) {
				return Err(WFError::DuplicateAttribute.into());
			}
			attributes.push((attname, value));
		};
		Ok(Token::StartTag(
			TokenMetrics::new(start, cur.pos()),
			StartTag {
				name,
				attributes,
				self_closing,
			},
		))
	}

	fn lex_attribute_value(&self, cur: &mut Cursor<'_>) -> Result<CData> {
		let quote = match cur.next_char() {
			Some(c) if c == '"' || c == '\'' => c,
			Some(c) => {
				return Err(WFError::UnexpectedChar(ERRCTX_ATTVAL, c, Some(&["'", "\""])).into())
			}
			None => return Err(Error::wfeof(ERRCTX_ATTVAL)),
		};
		let mut out = String::new();
		let mut stack: Vec<Name> = Vec::new();
		loop {
			let rest = cur.rest();
			let stop = match memchr3(quote as u8, b'<', b'&', rest.as_bytes()) {
				Some(stop) => stop,
				None => {
					cur.advance(rest.len());
					return Err(Error::wfeof(ERRCTX_ATTVAL));
				}
			};
			cur.check_chars(stop, ERRCTX_ATTVAL)?;
			push_normalized(&mut out, &rest[..stop]);
			cur.advance(stop);
			match rest.as_bytes()[stop] {
				b'<' => return Err(WFError::UnexpectedChar(ERRCTX_ATTVAL, '<', None).into()),
				b'&' => {
					let r = read_reference(cur)?;
					self.expand_in_attribute(r, &mut out, &mut stack)?;
				}
				_ => {
					cur.advance(1);
					break;
				}
			}
			if out.len() > self.opts.max_token_length {
				return Err(Error::LimitExceeded("attribute value too long"));
			}
		}
		Ok(CData::from_checked(out))
	}

	fn expand_in_attribute(
		&self,
		r: Reference,
		out: &mut String,
		stack: &mut Vec<Name>,
	) -> Result<()> {
		let name = match r {
			Reference::Char(c) => {
				out.push(c);
				return Ok(());
			}
			Reference::Entity(name) => name,
		};
		if let Some(c) = resolve_builtin(&name) {
			out.push(c);
			return Ok(());
		}
		let table = match self.entities.as_ref() {
			Some(table) => table,
			None => return Err(WFError::UndeclaredEntity.into()),
		};
		let text = match table.get(&name) {
			None if table.is_complete() => return Err(WFError::UndeclaredEntity.into()),
			None => return Ok(()),
			Some(EntityDef::External { .. }) => {
				return Err(WFError::ExternalEntityInAttribute.into())
			}
			Some(EntityDef::Internal(text)) => text,
		};
		if stack.contains(&name) {
			return Err(WFError::RecursiveEntity.into());
		}
		table.count_expansion(self.opts.max_entity_expansions)?;
		stack.push(name);
		let mut inner = Cursor::new(text, 0);
		loop {
			let rest = inner.rest();
			let stop = memchr2(b'<', b'&', rest.as_bytes()).unwrap_or(rest.len());
			push_normalized(out, &rest[..stop]);
			inner.advance(stop);
			if inner.at_end() {
				break;
			}
			if rest.as_bytes()[stop] == b'<' {
				return Err(WFError::UnexpectedChar(ERRCTX_ATTVAL, '<', None).into());
			}
			let r = read_reference(&mut inner)?;
			self.expand_in_attribute(r, out, stack)?;
			if out.len() > self.opts.max_token_length {
				return Err(Error::LimitExceeded("attribute value too long"));
			}
		}
		stack.pop();
		Ok(())
	}

	fn lex_pi(&mut self, cur: &mut Cursor<'_>, start: usize) -> Result<Token> {
		let target = cur.read_name(ERRCTX_PI)?;
		if target.eq_ignore_ascii_case("xml") {
			if target == "xml" && start == 0 && self.mode != Mode::InternalEntity {
				return self.lex_xml_decl(cur, start);
			}
			return Err(Error::syntax("reserved processing instruction target"));
		}
		if cur.eat("?>") {
			return Ok(Token::ProcessingInstruction(
				TokenMetrics::new(start, cur.pos()),
				target,
				None,
			));
		}
		cur.require_space(ERRCTX_PI)?;
		let data_start = cur.pos();
		let data = cur.take_until("?>", ERRCTX_PI)?;
		cur.set_pos(data_start);
		cur.check_chars(data.len(), ERRCTX_PI)?;
		cur.advance(data.len() + 2);
		Ok(Token::ProcessingInstruction(
			TokenMetrics::new(start, cur.pos()),
			target,
			Some(CData::from_checked(data)),
		))
	}

	fn lex_xml_decl(&mut self, cur: &mut Cursor<'_>, start: usize) -> Result<Token> {
		let text_decl = self.mode == Mode::ExternalEntity;
		let mut version = None;
		let mut encoding: Option<SmartString> = None;
		let mut standalone = None;
		loop {
			let had_space = cur.skip_space();
			if cur.eat("?>") {
				break;
			}
			if !had_space {
				return Err(cur.unexpected(ERRCTX_XML_DECL));
			}
			let name = cur.read_name(ERRCTX_XML_DECL)?;
			cur.skip_space();
			cur.expect("=", ERRCTX_XML_DECL)?;
			cur.skip_space();
			let value = cur.read_literal(ERRCTX_XML_DECL)?;
			// pseudo-attributes must appear in this order and at most once
			match name.as_str() {
				"version" if version.is_none() && encoding.is_none() && standalone.is_none() => {
					version = Some(parse_version(value)?);
				}
				"encoding"
					if encoding.is_none()
						&& standalone.is_none()
						&& (version.is_some() || text_decl) =>
				{
					validate_encoding_name(value)?;
					encoding = Some(value.into());
				}
				"standalone" if !text_decl && standalone.is_none() && version.is_some() => {
					standalone = Some(match value {
						"yes" => true,
						"no" => false,
						_ => return Err(Error::syntax("standalone must be 'yes' or 'no'")),
					});
				}
				_ => return Err(Error::syntax("unexpected pseudo-attribute in XML declaration")),
			}
		}
		if text_decl {
			if encoding.is_none() {
				return Err(Error::syntax("text declaration without encoding"));
			}
		} else if version.is_none() {
			return Err(Error::syntax("XML declaration without version"));
		}
		self.standalone = standalone == Some(true);
		Ok(Token::XMLDeclaration(
			TokenMetrics::new(start, cur.pos()),
			XMLDecl {
				version: version.unwrap_or(XMLVersion::V1_0),
				encoding,
				standalone,
			},
		))
	}

	fn lex_doctype(&mut self, cur: &mut Cursor<'_>, start: usize) -> Result<Token> {
		cur.require_space(ERRCTX_DOCTYPE)?;
		let name = cur.read_name(ERRCTX_DOCTYPE)?;
		let mut external_id = None;
		if cur.skip_space() && (cur.starts_with("SYSTEM") || cur.starts_with("PUBLIC")) {
			external_id = Some(read_external_id(cur, ERRCTX_DOCTYPE)?);
			cur.skip_space();
		}
		let mut table = EntityTable::new();
		if external_id.is_some() && !self.standalone {
			table.mark_incomplete();
		}
		if cur.eat("[") {
			self.lex_internal_subset(cur, &mut table)?;
			cur.skip_space();
		}
		cur.expect(">", ERRCTX_DOCTYPE)?;
		let entities = RcPtr::new(table);
		self.entities = Some(entities.clone());
		Ok(Token::Doctype(
			TokenMetrics::new(start, cur.pos()),
			Box::new(DoctypeDecl {
				name,
				external_id,
				entities,
			}),
		))
	}

	fn lex_internal_subset(&self, cur: &mut Cursor<'_>, table: &mut EntityTable) -> Result<()> {
		let mut pe_seen = false;
		loop {
			cur.skip_space();
			if cur.eat("]") {
				return Ok(());
			}
			if cur.eat("%") {
				cur.read_name(ERRCTX_INTERNAL_SUBSET)?;
				cur.expect(";", ERRCTX_INTERNAL_SUBSET)?;
				pe_seen = true;
				if !self.standalone {
					table.mark_incomplete();
				}
			} else if cur.eat("<!ENTITY") {
				self.lex_entity_decl(cur, table, pe_seen)?;
			} else if cur.eat("<!--") {
				read_comment(cur)?;
			} else if cur.eat("<?") {
				let target = cur.read_name(ERRCTX_PI)?;
				if target.eq_ignore_ascii_case("xml") {
					return Err(Error::syntax("reserved processing instruction target"));
				}
				cur.take_until("?>", ERRCTX_PI)?;
			} else if cur.eat("<!ELEMENT") || cur.eat("<!ATTLIST") || cur.eat("<!NOTATION") {
				skip_markup_decl(cur)?;
			} else {
				return Err(cur.unexpected(ERRCTX_INTERNAL_SUBSET));
			}
		}
	}

	fn lex_entity_decl(
		&self,
		cur: &mut Cursor<'_>,
		table: &mut EntityTable,
		pe_seen: bool,
	) -> Result<()> {
		let ctx = ERRCTX_ENTITY_DECL;
		cur.require_space(ctx)?;
		let parameter = cur.eat("%");
		if parameter {
			cur.require_space(ctx)?;
		}
		let name = cur.read_name(ctx)?;
		cur.require_space(ctx)?;
		let def = if cur.starts_with("\"") || cur.starts_with("'") {
			let literal = cur.read_literal(ctx)?;
			EntityDef::Internal(process_entity_value(literal)?)
		} else {
			let id = read_external_id(cur, ctx)?;
			let notation = if cur.skip_space() && cur.eat("NDATA") {
				if parameter {
					return Err(Error::syntax("NDATA on parameter entity"));
				}
				cur.require_space(ctx)?;
				Some(cur.read_name(ctx)?)
			} else {
				None
			};
			EntityDef::External { id, notation }
		};
		cur.skip_space();
		cur.expect(">", ctx)?;

		if parameter || resolve_builtin(&name).is_some() {
			return Ok(());
		}
		if pe_seen && !self.standalone {
			// the skipped parameter entity might have declared this name
			tracing::trace!(entity = %name, "ignoring entity declaration after parameter entity reference");
			return Ok(());
		}
		table.declare(name, def);
		Ok(())
	}
}

/// Compute the replacement text of an internal entity from its literal.
///
/// Character references are expanded, general entity references are kept.
fn process_entity_value(literal: &str) -> Result<CData> {
	if let Some((_, c)) = find_nonchar(literal) {
		return Err(WFError::InvalidChar(ERRCTX_ENTITY_DECL, c as u32, false).into());
	}
	let mut out = String::with_capacity(literal.len());
	let mut cur = Cursor::new(literal, 0);
	loop {
		let rest = cur.rest();
		let stop = memchr2(b'%', b'&', rest.as_bytes()).unwrap_or(rest.len());
		out.push_str(&rest[..stop]);
		cur.advance(stop);
		if cur.at_end() {
			break;
		}
		if rest.as_bytes()[stop] == b'%' {
			return Err(Error::syntax(
				"parameter entity reference in entity value of the internal subset",
			));
		}
		let ref_start = cur.pos();
		match read_reference(&mut cur)? {
			Reference::Char(c) => out.push(c),
			Reference::Entity(_) => out.push_str(&literal[ref_start..cur.pos()]),
		}
	}
	Ok(CData::from_checked(out))
}

impl TokenRead for Lexer {
	fn read(&mut self) -> Result<Option<Token>> {
		self.lex()
	}

	fn offset(&self) -> usize {
		self.position()
	}
}

impl fmt::Debug for Lexer {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Lexer")
			.field("pos", &self.pos)
			.field("len", &self.text.len())
			.field("mode", &self.mode)
			.field("err", &self.err)
			.finish()
	}
}
