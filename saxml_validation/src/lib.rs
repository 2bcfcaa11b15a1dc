/*!
# Validator functions for XML-related strings

Supplementary crate for `saxml`. It holds the XML 1.0 character classes and
a handful of validators which are shared between the lexer and the string
types of the parser.
*/
use std::fmt;

pub mod selectors;

use selectors::CharSelector;

/**
Error condition from validating an XML string.
*/
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	/// A Name or NCName was empty.
	EmptyName,
	/// An invalid character was encountered.
	///
	/// This variant contains the character as data.
	InvalidChar(char),
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::EmptyName => f.write_str("Name and NCName must not be empty"),
			Self::InvalidChar(c) => write!(f, "character U+{:04x} is not allowed", *c as u32),
		}
	}
}

impl std::error::Error for Error {}

fn validate_with<S: CharSelector, T: CharSelector>(
	s: &str,
	start: &S,
	rest: &T,
	allow_colon: bool,
) -> Result<(), Error> {
	let mut chars = s.chars();
	match chars.next() {
		None => return Err(Error::EmptyName),
		Some(c) if !start.select(c) || (!allow_colon && c == ':') => {
			return Err(Error::InvalidChar(c))
		}
		Some(_) => (),
	}
	for ch in chars {
		if !rest.select(ch) || (!allow_colon && ch == ':') {
			return Err(Error::InvalidChar(ch));
		}
	}
	Ok(())
}

/**
Check whether a str is a valid XML 1.0 Name

# Example

```rust
use saxml_validation::{validate_name, Error};

assert!(validate_name("foobar").is_ok());
assert!(validate_name("foo:bar").is_ok());
assert!(matches!(validate_name("foo bar"), Err(Error::InvalidChar(' '))));
assert!(matches!(validate_name(""), Err(Error::EmptyName)));
```
*/
pub fn validate_name(s: &str) -> Result<(), Error> {
	validate_with(
		s,
		&selectors::CLASS_XML_NAMESTART,
		&selectors::CLASS_XML_NAME,
		true,
	)
}

/**
Check whether a str is a valid XML 1.0 Name, without colons.

# Example

```rust
use saxml_validation::{validate_ncname, Error};

assert!(validate_ncname("foobar").is_ok());
assert!(matches!(validate_ncname("foo:bar"), Err(Error::InvalidChar(':'))));
assert!(matches!(validate_ncname(""), Err(Error::EmptyName)));
```
*/
pub fn validate_ncname(s: &str) -> Result<(), Error> {
	validate_with(
		s,
		&selectors::CLASS_XML_NAMESTART,
		&selectors::CLASS_XML_NAME,
		false,
	)
}

/**
Check whether a str is valid XML 1.0 CData, i.e. consists of `Char`s only.

# Example

```rust
use saxml_validation::{validate_cdata, Error};

assert!(validate_cdata("foo bar baz <fnord!>").is_ok());
assert!(matches!(validate_cdata("\x01"), Err(Error::InvalidChar('\x01'))));
```
*/
pub fn validate_cdata(s: &str) -> Result<(), Error> {
	match s.chars().find(|ch| selectors::CLASS_XML_NONCHAR.select(*ch)) {
		Some(ch) => Err(Error::InvalidChar(ch)),
		None => Ok(()),
	}
}

/// Check whether a str is a valid public identifier literal body.
pub fn validate_pubid(s: &str) -> Result<(), Error> {
	match s.chars().find(|ch| !selectors::CLASS_XML_PUBID.select(*ch)) {
		Some(ch) => Err(Error::InvalidChar(ch)),
		None => Ok(()),
	}
}

/// Return true if `c` is XML white space.
#[inline]
pub fn is_space(c: char) -> bool {
	matches!(c, ' ' | '\t' | '\n' | '\r')
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_cdata_smoketest() {
		assert!(validate_cdata("foo bar baz http://<xyz>").is_ok());
		assert!(validate_cdata("\u{ffff}").is_err());
	}

	#[test]
	fn test_name_smoketest() {
		assert!(validate_name("foobar").is_ok());
		assert!(validate_name("foo:bar").is_ok());
		assert!(validate_name("").is_err());
		assert!(validate_name("-foo").is_err());
		assert!(validate_name("foo bar baz http://<xyz>").is_err());
		assert!(validate_name("\u{ffff}").is_err());
	}

	#[test]
	fn test_ncname_smoketest() {
		assert!(validate_ncname("foobar").is_ok());
		assert!(validate_ncname("f00-b.r").is_ok());
		assert!(validate_ncname("foo:bar").is_err());
		assert!(validate_ncname(":bar").is_err());
		assert!(validate_ncname("").is_err());
	}

	#[test]
	fn test_pubid_smoketest() {
		assert!(validate_pubid("-//W3C//DTD XHTML 1.0 Strict//EN").is_ok());
		assert_eq!(validate_pubid("a\"b"), Err(Error::InvalidChar('"')));
		assert_eq!(validate_pubid("a<b"), Err(Error::InvalidChar('<')));
	}
}
