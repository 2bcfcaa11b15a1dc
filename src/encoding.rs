/*!
# Input decoding

Turns the raw input bytes into the canonical text the lexer works on: a
UTF-8 [`String`] with line ends normalized to `\n` (XML 1.0 § 2.11).

The encoding is determined as follows (XML 1.0 Appendix F):

1. A byte order mark wins. A declared encoding must agree with it.
2. Otherwise, the byte pattern of the leading `<` tells apart UTF-32, UTF-16
   and the ASCII-compatible encodings. The XML declaration is read in that family;
   its `encoding` label must agree with the family.
3. In the ASCII-compatible family, a declared encoding takes precedence over
   the caller's hint, which takes precedence over the UTF-8 default.

Undecodable input is fatal; there is no replacement character fallback.
*/
use std::fmt;

use smartstring::alias::String as SmartString;

use crate::error::{EncodingError, Position};

/// A supported input encoding.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
	Utf8,
	Utf16Le,
	Utf16Be,
	Utf32Le,
	Utf32Be,
	/// ISO-8859-1
	Latin1,
	/// US-ASCII
	Ascii,
	/// Any other ASCII-compatible encoding known to `encoding_rs`.
	#[cfg(feature = "encoding_rs")]
	Other(&'static encoding_rs::Encoding),
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum Label {
	Exact(Encoding),
	Utf16,
	Utf32,
}

impl Encoding {
	/// Look up an encoding by its IANA label, case-insensitively.
	///
	/// The endianness-agnostic labels `UTF-16` and `UTF-32` resolve to the
	/// big endian variant; the decoder resolves them against the byte order
	/// mark or the byte pattern instead.
	pub fn for_label(label: &str) -> Option<Encoding> {
		match lookup_label(label)? {
			Label::Exact(enc) => Some(enc),
			Label::Utf16 => Some(Encoding::Utf16Be),
			Label::Utf32 => Some(Encoding::Utf32Be),
		}
	}

	/// Canonical name of the encoding.
	pub fn name(&self) -> &'static str {
		match self {
			Self::Utf8 => "UTF-8",
			Self::Utf16Le => "UTF-16LE",
			Self::Utf16Be => "UTF-16BE",
			Self::Utf32Le => "UTF-32LE",
			Self::Utf32Be => "UTF-32BE",
			Self::Latin1 => "ISO-8859-1",
			Self::Ascii => "US-ASCII",
			#[cfg(feature = "encoding_rs")]
			Self::Other(enc) => enc.name(),
		}
	}

	fn unit_width(&self) -> usize {
		match self {
			Self::Utf16Le | Self::Utf16Be => 2,
			Self::Utf32Le | Self::Utf32Be => 4,
			_ => 1,
		}
	}
}

impl fmt::Debug for Encoding {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(f, "Encoding({})", self.name())
	}
}

fn lookup_label(label: &str) -> Option<Label> {
	let label = label.trim();
	let mut folded = SmartString::new();
	for ch in label.chars() {
		folded.push(ch.to_ascii_lowercase());
	}
	let enc = match folded.as_str() {
		"utf-8" | "utf8" | "unicode-1-1-utf-8" => Encoding::Utf8,
		"utf-16" | "utf16" | "iso-10646-ucs-2" | "ucs-2" => return Some(Label::Utf16),
		"utf-32" | "utf32" | "iso-10646-ucs-4" | "ucs-4" => return Some(Label::Utf32),
		"utf-16le" => Encoding::Utf16Le,
		"utf-16be" => Encoding::Utf16Be,
		"utf-32le" => Encoding::Utf32Le,
		"utf-32be" => Encoding::Utf32Be,
		"iso-8859-1" | "iso_8859-1" | "latin1" | "l1" | "iso-ir-100" | "cp819" => {
			Encoding::Latin1
		}
		"us-ascii" | "ascii" | "iso646-us" => Encoding::Ascii,
		#[cfg(feature = "encoding_rs")]
		_ => {
			let enc = encoding_rs::Encoding::for_label(folded.as_bytes())?;
			if !enc.is_ascii_compatible() {
				return None;
			}
			if enc == encoding_rs::UTF_8 {
				Encoding::Utf8
			} else {
				Encoding::Other(enc)
			}
		}
		#[cfg(not(feature = "encoding_rs"))]
		_ => return None,
	};
	Some(Label::Exact(enc))
}

/// Result of decoding the input.
#[derive(Debug, Clone)]
pub struct Decoded {
	/// Canonical document text.
	pub text: String,
	/// Encoding which was used to decode the input.
	pub encoding: Encoding,
	/// Encoding label from the XML declaration, if any.
	pub declared: Option<SmartString>,
}

fn detect_bom(input: &[u8]) -> Option<(Encoding, usize)> {
	match input {
		[0x00, 0x00, 0xfe, 0xff, ..] => Some((Encoding::Utf32Be, 4)),
		[0xff, 0xfe, 0x00, 0x00, ..] => Some((Encoding::Utf32Le, 4)),
		[0xef, 0xbb, 0xbf, ..] => Some((Encoding::Utf8, 3)),
		[0xfe, 0xff, ..] => Some((Encoding::Utf16Be, 2)),
		[0xff, 0xfe, ..] => Some((Encoding::Utf16Le, 2)),
		_ => None,
	}
}

fn detect_pattern(input: &[u8]) -> Option<Encoding> {
	match input {
		[0x00, 0x00, 0x00, 0x3c, ..] => Some(Encoding::Utf32Be),
		[0x3c, 0x00, 0x00, 0x00, ..] => Some(Encoding::Utf32Le),
		[0x00, 0x3c, 0x00, _, ..] => Some(Encoding::Utf16Be),
		[0x3c, 0x00, _, 0x00, ..] => Some(Encoding::Utf16Le),
		_ => None,
	}
}

// An XML declaration is short; anything beyond this is not worth scanning.
const DECL_SCAN_LIMIT: usize = 512;

/// Extract the `encoding` pseudo-attribute from an XML (or text)
/// declaration at the start of `head`.
///
/// This is deliberately lax: the lexer validates the declaration properly
/// later on.
fn declared_label(head: &str) -> Option<&str> {
	let rest = head.strip_prefix("<?xml")?;
	if !rest.starts_with(|c: char| saxml_validation::is_space(c)) {
		return None;
	}
	let end = rest.find("?>")?;
	let decl = &rest[..end];
	let pos = decl.find("encoding")?;
	let after = decl[pos + "encoding".len()..].trim_start();
	let after = after.strip_prefix('=')?.trim_start();
	let quote = after.chars().next()?;
	if quote != '"' && quote != '\'' {
		return None;
	}
	let value = &after[1..];
	let close = value.find(quote)?;
	Some(&value[..close])
}

/// Decode up to [`DECL_SCAN_LIMIT`] units for declaration sniffing.
///
/// Errors are ignored here; they are reported by the real decoding pass.
fn decode_head(body: &[u8], enc: Encoding) -> String {
	let width = enc.unit_width();
	let limit = (DECL_SCAN_LIMIT * width).min(body.len() - body.len() % width);
	let mut head = String::new();
	let _ = decode_into(&body[..limit], enc, 0, &mut head);
	head
}

fn compatible(detected: Encoding, declared: Label) -> bool {
	match declared {
		Label::Exact(enc) => enc == detected,
		Label::Utf16 => detected.unit_width() == 2,
		Label::Utf32 => detected.unit_width() == 4,
	}
}

/**
Decode `input` into canonical text.

`hint` is used for input without byte order mark, without a wide-character
byte pattern and without an encoding declaration.

# Example

```
use saxml::encoding::{decode, Encoding};

let mut input = vec![0xff, 0xfe];
for unit in "<a>\r\n</a>".encode_utf16() {
	input.extend_from_slice(&unit.to_le_bytes());
}
let decoded = decode(&input, None).unwrap();
assert_eq!(decoded.text, "<a>\n</a>");
assert_eq!(decoded.encoding, Encoding::Utf16Le);
```
*/
pub fn decode(input: &[u8], hint: Option<Encoding>) -> Result<Decoded, EncodingError> {
	let bom = detect_bom(input);
	let bom_len = bom.map(|(_, len)| len).unwrap_or(0);
	let body = &input[bom_len..];
	let family = bom.map(|(enc, _)| enc).or_else(|| detect_pattern(body));

	let head = decode_head(body, family.unwrap_or(Encoding::Utf8));
	let declared = declared_label(&head).map(SmartString::from);
	let label = match declared.as_ref() {
		Some(s) => match lookup_label(s) {
			Some(label) => Some(label),
			None => return Err(EncodingError::Unsupported(s.clone())),
		},
		None => None,
	};

	let encoding = match (family, label) {
		(Some(detected), Some(label)) => {
			if !compatible(detected, label) {
				return Err(EncodingError::Mismatch {
					detected: detected.name(),
					declared: declared.unwrap_or_default(),
				});
			}
			detected
		}
		(Some(detected), None) => detected,
		(None, Some(Label::Exact(enc))) if enc.unit_width() == 1 => enc,
		(None, Some(_)) => {
			return Err(EncodingError::Mismatch {
				detected: "an ASCII-compatible encoding",
				declared: declared.unwrap_or_default(),
			})
		}
		(None, None) => hint.unwrap_or(Encoding::Utf8),
	};
	tracing::trace!(encoding = encoding.name(), bom = bom.is_some(), "decoding input");

	let mut text = String::with_capacity(body.len());
	decode_into(body, encoding, bom_len, &mut text)?;
	// a BOM which was not detected as such (e.g. after an explicit hint)
	if text.starts_with('\u{feff}') {
		text.remove(0);
	}
	Ok(Decoded {
		text: normalize_line_ends(text),
		encoding,
		declared,
	})
}

fn invalid(encoding: Encoding, offset: usize, out: &str) -> EncodingError {
	EncodingError::InvalidSequence {
		encoding: encoding.name(),
		offset,
		at: Position::locate(out, out.len()),
	}
}

fn truncated(encoding: Encoding, offset: usize, out: &str) -> EncodingError {
	EncodingError::Truncated {
		encoding: encoding.name(),
		offset,
		at: Position::locate(out, out.len()),
	}
}

/// Decode all of `body` into `out`.
///
/// `base` is the offset of `body` in the original input, for error
/// reporting.
fn decode_into(
	body: &[u8],
	encoding: Encoding,
	base: usize,
	out: &mut String,
) -> Result<(), EncodingError> {
	match encoding {
		Encoding::Utf8 => match std::str::from_utf8(body) {
			Ok(s) => {
				out.push_str(s);
				Ok(())
			}
			Err(e) => {
				let valid = e.valid_up_to();
				// the prefix is valid by construction
				out.push_str(std::str::from_utf8(&body[..valid]).unwrap_or_default());
				match e.error_len() {
					None => Err(truncated(encoding, base + valid, out)),
					Some(_) => Err(invalid(encoding, base + valid, out)),
				}
			}
		},
		Encoding::Utf16Le | Encoding::Utf16Be => {
			let le = encoding == Encoding::Utf16Le;
			let chunks = body.chunks_exact(2);
			let tail = chunks.remainder().len();
			let units = chunks.map(|c| {
				if le {
					u16::from_le_bytes([c[0], c[1]])
				} else {
					u16::from_be_bytes([c[0], c[1]])
				}
			});
			let mut consumed = 0usize;
			for r in std::char::decode_utf16(units) {
				match r {
					Ok(ch) => {
						consumed += ch.len_utf16();
						out.push(ch);
					}
					Err(e) => {
						let at_end = (consumed + 1) * 2 + tail == body.len();
						if at_end && (0xd800..0xdc00).contains(&e.unpaired_surrogate()) {
							return Err(truncated(encoding, base + consumed * 2, out));
						}
						return Err(invalid(encoding, base + consumed * 2, out));
					}
				}
			}
			if tail != 0 {
				return Err(truncated(encoding, base + body.len() - tail, out));
			}
			Ok(())
		}
		Encoding::Utf32Le | Encoding::Utf32Be => {
			let le = encoding == Encoding::Utf32Le;
			let chunks = body.chunks_exact(4);
			let tail = chunks.remainder().len();
			for (i, c) in chunks.enumerate() {
				let cp = if le {
					u32::from_le_bytes([c[0], c[1], c[2], c[3]])
				} else {
					u32::from_be_bytes([c[0], c[1], c[2], c[3]])
				};
				match std::char::from_u32(cp) {
					Some(ch) => out.push(ch),
					None => return Err(invalid(encoding, base + i * 4, out)),
				}
			}
			if tail != 0 {
				return Err(truncated(encoding, base + body.len() - tail, out));
			}
			Ok(())
		}
		Encoding::Latin1 => {
			out.extend(body.iter().map(|b| *b as char));
			Ok(())
		}
		Encoding::Ascii => {
			for (i, b) in body.iter().enumerate() {
				if *b >= 0x80 {
					return Err(invalid(encoding, base + i, out));
				}
				out.push(*b as char);
			}
			Ok(())
		}
		#[cfg(feature = "encoding_rs")]
		Encoding::Other(enc) => match enc.decode_without_bom_handling_and_without_replacement(body) {
			Some(s) => {
				out.push_str(&s);
				Ok(())
			}
			None => Err(invalid(encoding, base, out)),
		},
	}
}

/// Replace `\r\n` and lone `\r` with `\n`.
fn normalize_line_ends(text: String) -> String {
	if memchr::memchr(b'\r', text.as_bytes()).is_none() {
		return text;
	}
	let mut out = String::with_capacity(text.len());
	let mut rest = text.as_str();
	while let Some(pos) = memchr::memchr(b'\r', rest.as_bytes()) {
		out.push_str(&rest[..pos]);
		out.push('\n');
		rest = &rest[pos + 1..];
		if rest.starts_with('\n') {
			rest = &rest[1..];
		}
	}
	out.push_str(rest);
	out
}

/// Encode `s` for tests in any of the Unicode encodings.
#[cfg(test)]
pub(crate) fn encode_for_test(s: &str, encoding: Encoding) -> Vec<u8> {
	let mut out = Vec::new();
	match encoding {
		Encoding::Utf8 => out.extend_from_slice(s.as_bytes()),
		Encoding::Utf16Le => s.encode_utf16().for_each(|u| out.extend_from_slice(&u.to_le_bytes())),
		Encoding::Utf16Be => s.encode_utf16().for_each(|u| out.extend_from_slice(&u.to_be_bytes())),
		Encoding::Utf32Le => s.chars().for_each(|c| out.extend_from_slice(&(c as u32).to_le_bytes())),
		Encoding::Utf32Be => s.chars().for_each(|c| out.extend_from_slice(&(c as u32).to_be_bytes())),
		other => panic!("cannot encode test data as {:?}", other),
	}
	out
}
