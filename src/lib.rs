/*!
# SAX-style XML 1.0 parsing

This crate parses complete XML 1.0 documents held in memory and reports them
as a sequence of callbacks (SAX events) to an [`EventSink`], or as a
sequence of [`ResolvedEvent`]s from a pull-based [`EventReader`].

## Features

* Input in UTF-8, UTF-16 and UTF-32 (both byte orders), ISO-8859-1 and
  US-ASCII; other encodings with the `encoding_rs` feature
* Optional namespace processing with prefix reporting
* Internal DTD subset: general entities are declared and expanded
* External entities are resolved according to an [`EntityPolicy`] and never
  fetched by default
* Comments and processing instructions are reported
* Any callback can abort the run
* Strict nesting: the run fails on the first well-formedness error, after
  which no further callbacks fire

## Example

```
use saxml::{EventSink, Flow, SaxParser};

#[derive(Default)]
struct Count(usize);

impl EventSink for Count {
	fn on_start_element(
		&mut self,
		_name: &str,
		_namespace_uri: Option<&str>,
		_qualified_name: Option<&str>,
		_attributes: &saxml::Attributes,
	) -> Flow {
		self.0 += 1;
		Flow::Continue
	}
}

let mut parser = SaxParser::new(&b"<?xml version='1.0'?><hello><world/></hello>"[..]);
let mut count = Count::default();
assert!(parser.parse(&mut count));
assert_eq!(count.0, 2);
```

## Pipeline

The input is decoded to a `String` first ([`encoding::decode`]). A [`Lexer`]
splits the text into [`Token`]s, the [`RawParser`] assembles them into
elements and expands internal entities, and the [`NamespaceResolver`]
resolves names. [`SaxParser`] drives these stages and hands external entity
references to the entity resolver.
*/
pub mod driver;
pub mod encoding;
pub mod entity;
mod errctx;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod sax;
pub mod sink;
pub mod strings;


#[doc(inline)]
pub use driver::{EventRead, EventReader, ParserOptions};
#[doc(inline)]
pub use encoding::{Decoded, Encoding};
#[doc(inline)]
pub use entity::{EntityFetcher, EntityPolicy, ExternalId, FsFetcher};
#[doc(inline)]
pub use error::{Error, ErrorKind, ParseError, Position, Result};
#[doc(inline)]
pub use lexer::{Lexer, LexerOptions, Token};
#[doc(inline)]
pub use parser::{
	Attributes, ElementName, NamespaceResolver, RawEvent, RawParser, ResolvedEvent, XMLVersion,
	XMLNS_XML, XMLNS_XMLNS,
};
#[doc(inline)]
pub use sax::{RunState, SaxParser};
#[doc(inline)]
pub use sink::{EventSink, Flow, NullSink, RecordingSink, SaxEvent};
pub use strings::{CData, NCName, Name};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
