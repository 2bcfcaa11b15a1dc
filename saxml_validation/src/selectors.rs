/*!
# Character classes of XML 1.0

The contents of this module are implementation details of `saxml` and
`saxml_validation` and should not be relied upon.
*/
use std::fmt;

/**
# Predicate trait for matching chars
*/
pub trait CharSelector {
	/// Return true if the given char is selected by the selector
	fn select(&self, c: char) -> bool;
}

impl CharSelector for char {
	fn select(&self, c: char) -> bool {
		*self == c
	}
}

impl CharSelector for &'_ [char] {
	fn select(&self, c: char) -> bool {
		self.contains(&c)
	}
}

/// Inclusive range of codepoints.
///
/// Both ends are included because some of the boundaries used by XML are not
/// representable as exclusive Rust `char` ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodepointRange(pub char, pub char);

impl CodepointRange {
	pub fn contains(&self, c: char) -> bool {
		self.0 <= c && c <= self.1
	}
}

impl CharSelector for CodepointRange {
	fn select(&self, c: char) -> bool {
		self.contains(c)
	}
}

/// Valid codepoints for character data (XML 1.0 § 2.2 \[2\])
pub const VALID_XML_CDATA_RANGES: &[CodepointRange] = &[
	CodepointRange('\x09', '\x0a'),
	CodepointRange('\x0d', '\x0d'),
	CodepointRange('\u{0020}', '\u{d7ff}'),
	CodepointRange('\u{e000}', '\u{fffd}'),
	CodepointRange('\u{10000}', '\u{10ffff}'),
];

/// Rust chars which are not XML `Char`s.
///
/// Surrogates are absent because they cannot be Rust chars in the first
/// place.
pub const INVALID_XML_CDATA_RANGES: &[CodepointRange] = &[
	CodepointRange('\x00', '\x08'),
	CodepointRange('\x0b', '\x0c'),
	CodepointRange('\x0e', '\x1f'),
	CodepointRange('\u{fffe}', '\u{ffff}'),
];

const VALID_XML_NAME_START_RANGES: &[CodepointRange] = &[
	CodepointRange(':', ':'),
	CodepointRange('A', 'Z'),
	CodepointRange('_', '_'),
	CodepointRange('a', 'z'),
	CodepointRange('\u{c0}', '\u{d6}'),
	CodepointRange('\u{d8}', '\u{f6}'),
	CodepointRange('\u{f8}', '\u{2ff}'),
	CodepointRange('\u{370}', '\u{37d}'),
	CodepointRange('\u{37f}', '\u{1fff}'),
	CodepointRange('\u{200c}', '\u{200d}'),
	CodepointRange('\u{2070}', '\u{218f}'),
	CodepointRange('\u{2c00}', '\u{2fef}'),
	CodepointRange('\u{3001}', '\u{d7ff}'),
	CodepointRange('\u{f900}', '\u{fdcf}'),
	CodepointRange('\u{fdf0}', '\u{fffd}'),
	CodepointRange('\u{10000}', '\u{effff}'),
];

const VALID_XML_NAME_RANGES: &[CodepointRange] = &[
	CodepointRange('-', '.'),
	CodepointRange('0', ':'),
	CodepointRange('A', 'Z'),
	CodepointRange('_', '_'),
	CodepointRange('a', 'z'),
	CodepointRange('\u{b7}', '\u{b7}'),
	CodepointRange('\u{c0}', '\u{d6}'),
	CodepointRange('\u{d8}', '\u{f6}'),
	CodepointRange('\u{f8}', '\u{37d}'),
	CodepointRange('\u{37f}', '\u{1fff}'),
	CodepointRange('\u{200c}', '\u{200d}'),
	CodepointRange('\u{203f}', '\u{2040}'),
	CodepointRange('\u{2070}', '\u{218f}'),
	CodepointRange('\u{2c00}', '\u{2fef}'),
	CodepointRange('\u{3001}', '\u{d7ff}'),
	CodepointRange('\u{f900}', '\u{fdcf}'),
	CodepointRange('\u{fdf0}', '\u{fffd}'),
	CodepointRange('\u{10000}', '\u{effff}'),
];

// XML 1.0 § 2.3 [13]
const VALID_XML_PUBID_RANGES: &[CodepointRange] = &[
	CodepointRange('\x0a', '\x0a'),
	CodepointRange('\x0d', '\x0d'),
	CodepointRange(' ', '!'),
	CodepointRange('#', '%'),
	CodepointRange('\'', ';'),
	CodepointRange('=', '='),
	CodepointRange('?', 'Z'),
	CodepointRange('_', '_'),
	CodepointRange('a', 'z'),
];

const XML_SPACE_RANGES: &[CodepointRange] = &[
	CodepointRange('\x09', '\x0a'),
	CodepointRange('\x0d', '\x0d'),
	CodepointRange(' ', ' '),
];

/// Sorted, non-overlapping set of [`CodepointRange`]s.
///
/// Lookups use a binary search, so the ranges must be sorted by their start
/// and must not overlap.
#[derive(Clone, Copy)]
pub struct CodepointRanges(pub &'static [CodepointRange]);

impl CodepointRanges {
	pub fn contains(&self, c: char) -> bool {
		self.0
			.binary_search_by(|r| {
				if r.1 < c {
					std::cmp::Ordering::Less
				} else if r.0 > c {
					std::cmp::Ordering::Greater
				} else {
					std::cmp::Ordering::Equal
				}
			})
			.is_ok()
	}
}

impl CharSelector for CodepointRanges {
	fn select(&self, c: char) -> bool {
		self.contains(c)
	}
}

impl fmt::Debug for CodepointRanges {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(f, "CodepointRanges(<{} ranges>)", self.0.len())
	}
}

impl PartialEq for CodepointRanges {
	fn eq(&self, other: &CodepointRanges) -> bool {
		std::ptr::eq(self.0, other.0)
	}
}

/// Valid non-first characters for an XML Name (XML 1.0 § 2.3 \[4a\])
pub static CLASS_XML_NAME: CodepointRanges = CodepointRanges(VALID_XML_NAME_RANGES);

/// Valid first characters for an XML Name (XML 1.0 § 2.3 \[4\])
pub static CLASS_XML_NAMESTART: CodepointRanges = CodepointRanges(VALID_XML_NAME_START_RANGES);

/// See [`INVALID_XML_CDATA_RANGES`]
pub static CLASS_XML_NONCHAR: CodepointRanges = CodepointRanges(INVALID_XML_CDATA_RANGES);

/// Characters allowed in public identifiers (XML 1.0 § 2.3 \[13\])
pub static CLASS_XML_PUBID: CodepointRanges = CodepointRanges(VALID_XML_PUBID_RANGES);

/// White space (XML 1.0 § 2.3 \[3\])
pub static CLASS_XML_SPACE: CodepointRanges = CodepointRanges(XML_SPACE_RANGES);

#[cfg(test)]
mod tests {
	use super::*;

	fn assert_sorted(rs: &[CodepointRange]) {
		for pair in rs.windows(2) {
			assert!(pair[0].1 < pair[1].0, "{:?} overlaps or precedes {:?}", pair[1], pair[0]);
		}
	}

	#[test]
	fn range_tables_are_sorted_and_disjoint() {
		assert_sorted(VALID_XML_CDATA_RANGES);
		assert_sorted(INVALID_XML_CDATA_RANGES);
		assert_sorted(VALID_XML_NAME_START_RANGES);
		assert_sorted(VALID_XML_NAME_RANGES);
		assert_sorted(VALID_XML_PUBID_RANGES);
		assert_sorted(XML_SPACE_RANGES);
	}

	#[test]
	fn cdata_inclusion_and_exclusion_are_equivalent() {
		let includer = CodepointRanges(VALID_XML_CDATA_RANGES);
		for cp in 0x0..=0x10ffffu32 {
			if let Some(ch) = std::char::from_u32(cp) {
				if !includer.select(ch) != CLASS_XML_NONCHAR.select(ch) {
					panic!("cdata range tables disagree about U+{:x}", cp)
				}
			}
		}
	}

	#[test]
	fn name_start_chars_are_name_chars() {
		for cp in 0x0..=0x10ffffu32 {
			if let Some(ch) = std::char::from_u32(cp) {
				if CLASS_XML_NAMESTART.select(ch) && !CLASS_XML_NAME.select(ch) {
					panic!("U+{:x} may start a name but not continue it", cp)
				}
			}
		}
	}

	#[test]
	fn binary_search_hits_range_boundaries() {
		assert!(CLASS_XML_NAME.select('-'));
		assert!(CLASS_XML_NAME.select('.'));
		assert!(CLASS_XML_NAME.select(':'));
		assert!(!CLASS_XML_NAME.select('/'));
		assert!(!CLASS_XML_NAME.select(' '));
		assert!(CLASS_XML_NAMESTART.select('\u{effff}'));
		assert!(!CLASS_XML_NAMESTART.select('\u{f0000}'));
		assert!(CLASS_XML_SPACE.select('\t'));
		assert!(!CLASS_XML_SPACE.select('\x0b'));
	}
}
