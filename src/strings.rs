/*!
# Strongly-typed strings for use with XML 1.0 documents

This module defines string types which represent pieces of text as they occur
in XML documents. The types are checked to contain only text which conforms to
the respective grammar production, so that checks done by the lexer do not
need to be repeated by consumers.

- [`Name`] represents the `Name` production. It is used for element and
  attribute names before namespace prefix expansion, for entity names and for
  processing instruction targets.
- [`NCName`] represents `Name` without a colon. It is used for local names
  and prefixes after prefix splitting.
- [`CData`] represents a string of XML `Char`s. It is used for attribute
  values, text, comments and namespace URIs.

Owned values are constructed through [`std::convert::TryFrom`] from `&str`,
[`String`] and [`smartstring::alias::String`]. [`NCName`] converts into
[`Name`] and both convert into [`CData`] without further checks.
*/
use std::borrow::Borrow;
use std::convert::TryFrom;
use std::fmt;
use std::ops::Deref;

use smartstring::alias::String as SmartString;

use saxml_validation::selectors::{CharSelector, CLASS_XML_NAMESTART};
use saxml_validation::{
	validate_cdata as raw_validate_cdata, validate_name as raw_validate_name,
	validate_ncname as raw_validate_ncname, Error as ValidationError,
};

use crate::errctx::*;
use crate::error::{Error, NWFError, WFError};

macro_rules! saxml_string_type {
	(
		$(#[$outer:meta])*
		pub struct $name:ident($string:ty) use $check:ident;
	) => {
		$(#[$outer])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
		#[repr(transparent)]
		pub struct $name($string);

		impl $name {
			/// Extract the inner string and return it.
			pub fn into_inner(self) -> $string {
				self.0
			}

			/// Obtain a reference to the inner string slice.
			pub fn as_str(&self) -> &str {
				self.0.as_str()
			}

			/// Wrap a string which the caller has already checked.
			pub(crate) fn from_checked<T: Into<$string>>(s: T) -> Self {
				let s = s.into();
				debug_assert!($check(&s).is_ok());
				Self(s)
			}
		}

		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				self.0.as_str()
			}
		}

		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				self.0.as_str()
			}
		}

		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				self.0.as_str()
			}
		}

		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				self.0.as_str() == other
			}
		}

		impl PartialEq<&str> for $name {
			fn eq(&self, other: &&str) -> bool {
				self.0.as_str() == *other
			}
		}

		impl PartialEq<$name> for str {
			fn eq(&self, other: &$name) -> bool {
				self == other.0.as_str()
			}
		}

		impl PartialEq<$name> for &str {
			fn eq(&self, other: &$name) -> bool {
				*self == other.0.as_str()
			}
		}

		impl fmt::Display for $name {
			fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
				f.write_str(self.0.as_str())
			}
		}

		impl TryFrom<&str> for $name {
			type Error = Error;

			fn try_from(other: &str) -> Result<Self, Error> {
				$check(other)?;
				Ok(Self(other.into()))
			}
		}

		impl TryFrom<String> for $name {
			type Error = Error;

			fn try_from(other: String) -> Result<Self, Error> {
				$check(&other)?;
				Ok(Self(other.into()))
			}
		}

		impl TryFrom<SmartString> for $name {
			type Error = Error;

			fn try_from(other: SmartString) -> Result<Self, Error> {
				$check(&other)?;
				Ok(Self(other.into()))
			}
		}

		impl From<$name> for String {
			fn from(other: $name) -> String {
				other.0.into()
			}
		}
	};
}

saxml_string_type! {
	/// String which conforms to the Name production of XML 1.0.
	///
	/// [`Name`] derefs to [`str`], so all non-mutating methods of [`str`] are
	/// available.
	pub struct Name(SmartString) use validate_name;
}

saxml_string_type! {
	/// String which conforms to the NCName production of Namespaces in XML
	/// 1.0.
	pub struct NCName(SmartString) use validate_ncname;
}

saxml_string_type! {
	/// String which consists only of XML 1.0 `Char`s.
	///
	/// References and CDATA sections are expanded by the lexer before text
	/// ends up in a [`CData`].
	pub struct CData(String) use validate_cdata;
}

impl Name {
	/// Split the name at a colon, if it exists.
	///
	/// If the name contains no colon, the function returns `(None, self)`.
	/// If the name contains exactly one colon, the function returns the part
	/// before the colon (the prefix) in the first return value and the part
	/// following the colon (the local name) as second return value.
	///
	/// If neither of the two cases apply or the string on either side of the
	/// colon is empty, an error is returned.
	pub fn split_name(&self) -> Result<(Option<NCName>, NCName), Error> {
		let name = self.as_str();
		let colon_pos = match name.find(':') {
			None => return Ok((None, NCName::from_checked(name))),
			Some(pos) => pos,
		};
		if colon_pos == 0 || colon_pos == name.len() - 1 {
			return Err(NWFError::EmptyNamePart(ERRCTX_UNKNOWN).into());
		}

		let (prefix, localname) = (&name[..colon_pos], &name[colon_pos + 1..]);
		if localname.contains(':') {
			// Namespaces in XML 1.0 (Third Edition) namespace-well-formed criterium 1
			return Err(NWFError::MultiColonName(ERRCTX_UNKNOWN).into());
		}
		match localname.chars().next() {
			Some(c) if CLASS_XML_NAMESTART.select(c) => (),
			// Namespaces in XML 1.0 (Third Edition) NCName production
			_ => return Err(NWFError::InvalidLocalName(ERRCTX_UNKNOWN).into()),
		}

		Ok((
			Some(NCName::from_checked(prefix)),
			NCName::from_checked(localname),
		))
	}
}

impl From<NCName> for Name {
	fn from(other: NCName) -> Self {
		Name(other.0)
	}
}

impl From<NCName> for CData {
	fn from(other: NCName) -> Self {
		CData(other.0.into())
	}
}

impl From<Name> for CData {
	fn from(other: Name) -> Self {
		CData(other.0.into())
	}
}

/**
Check whether a str is valid XML 1.0 CData

# Example

```rust
use saxml::error::{Error, WFError};
use saxml::strings::validate_cdata;

assert!(validate_cdata("foo bar baz <fnord!>").is_ok());
assert!(matches!(
	validate_cdata("\x01"),
	Err(Error::NotWellFormed(WFError::UnexpectedChar(_, '\x01', _)))
));
```
*/
pub fn validate_cdata(s: &str) -> Result<(), Error> {
	match raw_validate_cdata(s) {
		Ok(()) => Ok(()),
		Err(ValidationError::InvalidChar(ch)) => {
			Err(WFError::UnexpectedChar(ERRCTX_TEXT, ch, None).into())
		}
		Err(ValidationError::EmptyName) => Ok(()),
	}
}

/**
Check whether a str is a valid XML 1.0 Name

**Note:** This does *not* enforce that the name contains only a single colon.

# Example

```rust
use saxml::error::{Error, WFError};
use saxml::strings::validate_name;

assert!(validate_name("foobar").is_ok());
assert!(validate_name("foo:bar").is_ok());
assert!(matches!(
	validate_name("foo bar"),
	Err(Error::NotWellFormed(WFError::UnexpectedChar(_, ' ', _)))
));
```
*/
pub fn validate_name(s: &str) -> Result<(), Error> {
	match raw_validate_name(s) {
		Ok(()) => Ok(()),
		Err(ValidationError::InvalidChar(ch)) => {
			Err(WFError::UnexpectedChar(ERRCTX_NAME, ch, None).into())
		}
		Err(ValidationError::EmptyName) => Err(WFError::InvalidSyntax(ERRCTX_NAME).into()),
	}
}

/**
Check whether a str is a valid XML 1.0 Name, without colons.

# Example

```rust
use saxml::error::{Error, NWFError};
use saxml::strings::validate_ncname;

assert!(validate_ncname("foobar").is_ok());
assert!(matches!(
	validate_ncname("foo:bar"),
	Err(Error::NotNamespaceWellFormed(NWFError::MultiColonName(_)))
));
```
*/
pub fn validate_ncname(s: &str) -> Result<(), Error> {
	match raw_validate_ncname(s) {
		Ok(()) => Ok(()),
		Err(ValidationError::InvalidChar(':')) => Err(NWFError::MultiColonName(ERRCTX_NAME).into()),
		Err(ValidationError::InvalidChar(ch)) => {
			Err(WFError::UnexpectedChar(ERRCTX_NAME, ch, None).into())
		}
		Err(ValidationError::EmptyName) => Err(NWFError::EmptyNamePart(ERRCTX_NAME).into()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::convert::TryInto;

	#[test]
	fn split_name_rejects_localname_with_non_namestart_first_char() {
		let nm: Name = "foo:-bar".try_into().unwrap();
		match nm.split_name() {
			Err(Error::NotNamespaceWellFormed(NWFError::InvalidLocalName(_))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn split_name_rejects_multiple_colons() {
		let nm: Name = "a:b:c".try_into().unwrap();
		match nm.split_name() {
			Err(Error::NotNamespaceWellFormed(NWFError::MultiColonName(_))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn split_name_rejects_empty_parts() {
		for s in &[":foo", "foo:"] {
			let nm: Name = (*s).try_into().unwrap();
			match nm.split_name() {
				Err(Error::NotNamespaceWellFormed(NWFError::EmptyNamePart(_))) => (),
				other => panic!("unexpected result for {:?}: {:?}", s, other),
			}
		}
	}

	#[test]
	fn split_name_keeps_both_halves() {
		let nm: Name = "myPrefix:myLocalName".try_into().unwrap();
		let (prefix, local) = nm.split_name().unwrap();
		assert_eq!(prefix.unwrap(), "myPrefix");
		assert_eq!(local, "myLocalName");

		let nm: Name = "noPrefix".try_into().unwrap();
		let (prefix, local) = nm.split_name().unwrap();
		assert!(prefix.is_none());
		assert_eq!(local, "noPrefix");
	}

	#[test]
	fn cdata_allows_slashes_and_empty() {
		let _: CData = "http://www.w3.org/XML/1998/namespace".try_into().unwrap();
		let _: CData = "".try_into().unwrap();
	}

	#[test]
	fn cdata_rejects_nonchars() {
		let r: Result<CData, _> = "a\u{fffe}".try_into();
		assert!(r.is_err());
	}

	#[test]
	fn names_borrow_as_str_for_map_lookups() {
		let mut map = std::collections::HashMap::new();
		let key: Name = "attribute".try_into().unwrap();
		map.insert(key, 1);
		assert_eq!(map.get("attribute"), Some(&1));
	}
}
