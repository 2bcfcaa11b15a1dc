// Low-level scanning over decoded text. All offsets are byte offsets into
// the text the cursor was created on.
use saxml_validation::selectors::{CharSelector, CLASS_XML_NAME, CLASS_XML_NAMESTART, CLASS_XML_NONCHAR};
use saxml_validation::is_space;

use crate::error::{Error, Result, WFError};
use crate::strings::Name;

/// Return the offset and value of the first char in `s` which is not an XML
/// 1.0 `Char`.
pub(super) fn find_nonchar(s: &str) -> Option<(usize, char)> {
	// everything from U+0020 up to U+007F is a valid Char
	if s.bytes().all(|b| (0x20..0x80).contains(&b) || b == b'\t' || b == b'\n') {
		return None;
	}
	s.char_indices().find(|(_, c)| CLASS_XML_NONCHAR.select(*c))
}

pub(super) struct Cursor<'a> {
	text: &'a str,
	pos: usize,
}

impl<'a> Cursor<'a> {
	pub(super) fn new(text: &'a str, pos: usize) -> Cursor<'a> {
		Cursor { text, pos }
	}

	pub(super) fn pos(&self) -> usize {
		self.pos
	}

	pub(super) fn set_pos(&mut self, pos: usize) {
		debug_assert!(self.text.is_char_boundary(pos));
		self.pos = pos;
	}

	pub(super) fn rest(&self) -> &'a str {
		&self.text[self.pos..]
	}

	pub(super) fn at_end(&self) -> bool {
		self.pos >= self.text.len()
	}

	pub(super) fn advance(&mut self, n: usize) {
		self.set_pos(self.pos + n);
	}

	pub(super) fn peek(&self) -> Option<char> {
		self.rest().chars().next()
	}

	pub(super) fn next_char(&mut self) -> Option<char> {
		let c = self.peek()?;
		self.pos += c.len_utf8();
		Some(c)
	}

	pub(super) fn starts_with(&self, s: &str) -> bool {
		self.rest().starts_with(s)
	}

	/// Consume `s` if the remaining text starts with it.
	pub(super) fn eat(&mut self, s: &str) -> bool {
		if self.starts_with(s) {
			self.pos += s.len();
			true
		} else {
			false
		}
	}

	/// Error for whatever is at the current position.
	pub(super) fn unexpected(&self, ctx: &'static str) -> Error {
		match self.peek() {
			None => Error::wfeof(ctx),
			Some(c) => WFError::UnexpectedChar(ctx, c, None).into(),
		}
	}

	pub(super) fn expect(&mut self, s: &str, ctx: &'static str) -> Result<()> {
		if self.eat(s) {
			Ok(())
		} else {
			Err(self.unexpected(ctx))
		}
	}

	/// Skip white space and return whether there was any.
	pub(super) fn skip_space(&mut self) -> bool {
		let rest = self.rest();
		let n = rest.find(|c| !is_space(c)).unwrap_or(rest.len());
		self.pos += n;
		n > 0
	}

	pub(super) fn require_space(&mut self, ctx: &'static str) -> Result<()> {
		if self.skip_space() {
			Ok(())
		} else {
			Err(self.unexpected(ctx))
		}
	}

	pub(super) fn read_name(&mut self, ctx: &'static str) -> Result<Name> {
		let rest = self.rest();
		match rest.chars().next() {
			Some(c) if CLASS_XML_NAMESTART.select(c) => (),
			_ => return Err(self.unexpected(ctx)),
		}
		let n = rest
			.char_indices()
			.find(|(_, c)| !CLASS_XML_NAME.select(*c))
			.map(|(i, _)| i)
			.unwrap_or(rest.len());
		self.pos += n;
		Ok(Name::from_checked(&rest[..n]))
	}

	/// Return the text up to `delim` and move past `delim`.
	pub(super) fn take_until(&mut self, delim: &str, ctx: &'static str) -> Result<&'a str> {
		let rest = self.rest();
		match rest.find(delim) {
			Some(n) => {
				self.pos += n + delim.len();
				Ok(&rest[..n])
			}
			None => {
				self.pos = self.text.len();
				Err(Error::wfeof(ctx))
			}
		}
	}

	/// Read a quoted literal without interpreting its contents.
	pub(super) fn read_literal(&mut self, ctx: &'static str) -> Result<&'a str> {
		let quote = match self.peek() {
			Some(c) if c == '"' || c == '\'' => c,
			Some(c) => return Err(WFError::UnexpectedChar(ctx, c, Some(&["'", "\""])).into()),
			None => return Err(Error::wfeof(ctx)),
		};
		self.pos += 1;
		let rest = self.rest();
		match memchr::memchr(quote as u8, rest.as_bytes()) {
			Some(n) => {
				self.pos += n + 1;
				Ok(&rest[..n])
			}
			None => {
				self.pos = self.text.len();
				Err(Error::wfeof(ctx))
			}
		}
	}

	/// Fail if the next `len` bytes contain a char which is not allowed in
	/// XML. On failure, the cursor is moved to the offending char.
	pub(super) fn check_chars(&mut self, len: usize, ctx: &'static str) -> Result<()> {
		match find_nonchar(&self.rest()[..len]) {
			None => Ok(()),
			Some((at, c)) => {
				self.pos += at;
				Err(WFError::InvalidChar(ctx, c as u32, false).into())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::errctx::*;

	#[test]
	fn find_nonchar_reports_offset() {
		assert_eq!(find_nonchar("plain text\n"), None);
		assert_eq!(find_nonchar("äöü"), None);
		assert_eq!(find_nonchar("ab\u{1}c"), Some((2, '\u{1}')));
		assert_eq!(find_nonchar("é\u{fffe}"), Some((2, '\u{fffe}')));
	}

	#[test]
	fn read_name_stops_at_non_name_char() {
		let mut c = Cursor::new("foo:bar-1 baz", 0);
		assert_eq!(c.read_name(ERRCTX_NAME).unwrap(), "foo:bar-1");
		assert_eq!(c.pos(), 9);
		assert!(c.skip_space());
		assert!(!c.skip_space());
	}

	#[test]
	fn read_name_rejects_invalid_start() {
		let mut c = Cursor::new("-foo", 0);
		match c.read_name(ERRCTX_NAME) {
			Err(Error::NotWellFormed(WFError::UnexpectedChar(_, '-', _))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn literal_and_take_until() {
		let mut c = Cursor::new("'a\"b' rest?>tail", 0);
		assert_eq!(c.read_literal(ERRCTX_ATTVAL).unwrap(), "a\"b");
		c.skip_space();
		assert_eq!(c.take_until("?>", ERRCTX_PI).unwrap(), "rest");
		assert_eq!(c.rest(), "tail");
		match c.take_until("?>", ERRCTX_PI) {
			Err(Error::NotWellFormed(WFError::InvalidEof(ERRCTX_PI))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}
}
