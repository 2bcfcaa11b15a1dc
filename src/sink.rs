/*!
# Event sinks

An [`EventSink`] receives the callbacks of a [`crate::SaxParser`] run. All
callbacks have no-op default implementations, so a sink only overrides what
it is interested in.

Each callback returns a [`Flow`]. Returning [`Flow::Abort`] stops the run
right after the callback: no further callback fires (not even
[`EventSink::on_end_document`]) and the run fails with
[`ErrorKind::Aborted`](crate::ErrorKind::Aborted).

```
use saxml::{EventSink, Flow, SaxParser};

#[derive(Default)]
struct FirstElement(Option<String>);

impl EventSink for FirstElement {
	fn on_start_element(
		&mut self,
		name: &str,
		_namespace_uri: Option<&str>,
		_qualified_name: Option<&str>,
		_attributes: &saxml::Attributes,
	) -> Flow {
		self.0 = Some(name.to_string());
		Flow::Abort
	}
}

let mut sink = FirstElement::default();
let mut parser = SaxParser::new(&b"<root><child/></root>"[..]);
assert!(!parser.parse(&mut sink));
assert_eq!(sink.0.as_deref(), Some("root"));
```
*/
use std::collections::BTreeMap;

use crate::parser::Attributes;

/// Whether a run continues after a callback.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
	Continue,
	/// Stop the run; it fails with an abort error.
	Abort,
}

impl Default for Flow {
	fn default() -> Self {
		Self::Continue
	}
}

/**
# Receiver of parse events

Callbacks are invoked synchronously, in document order, on the thread which
called [`crate::SaxParser::parse`].

For elements, `name` is the local name when namespace processing is
enabled and the name as written otherwise. `namespace_uri` is `None`
without namespace processing and the (possibly empty) namespace URI with
it. `qualified_name` is the name as written, reported only when namespace
prefixes are reported. [`EventSink::on_end_element`] receives exactly the
values of the matching [`EventSink::on_start_element`].

Character data may be delivered in several consecutive
[`EventSink::on_characters`] calls.
*/
#[allow(unused_variables)]
pub trait EventSink {
	/// First callback of every run.
	fn on_start_document(&mut self) -> Flow {
		Flow::Continue
	}

	/// Last callback of a successful run.
	fn on_end_document(&mut self) -> Flow {
		Flow::Continue
	}

	fn on_start_element(
		&mut self,
		name: &str,
		namespace_uri: Option<&str>,
		qualified_name: Option<&str>,
		attributes: &Attributes,
	) -> Flow {
		Flow::Continue
	}

	fn on_end_element(
		&mut self,
		name: &str,
		namespace_uri: Option<&str>,
		qualified_name: Option<&str>,
	) -> Flow {
		Flow::Continue
	}

	fn on_characters(&mut self, text: &str) -> Flow {
		Flow::Continue
	}

	fn on_comment(&mut self, text: &str) -> Flow {
		Flow::Continue
	}

	fn on_processing_instruction(&mut self, target: &str, data: Option<&str>) -> Flow {
		Flow::Continue
	}

	/// `prefix` is `None` for the default namespace.
	fn on_start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) -> Flow {
		Flow::Continue
	}

	fn on_end_prefix_mapping(&mut self, prefix: Option<&str>) -> Flow {
		Flow::Continue
	}
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
	fn on_start_document(&mut self) -> Flow {
		(**self).on_start_document()
	}

	fn on_end_document(&mut self) -> Flow {
		(**self).on_end_document()
	}

	fn on_start_element(
		&mut self,
		name: &str,
		namespace_uri: Option<&str>,
		qualified_name: Option<&str>,
		attributes: &Attributes,
	) -> Flow {
		(**self).on_start_element(name, namespace_uri, qualified_name, attributes)
	}

	fn on_end_element(
		&mut self,
		name: &str,
		namespace_uri: Option<&str>,
		qualified_name: Option<&str>,
	) -> Flow {
		(**self).on_end_element(name, namespace_uri, qualified_name)
	}

	fn on_characters(&mut self, text: &str) -> Flow {
		(**self).on_characters(text)
	}

	fn on_comment(&mut self, text: &str) -> Flow {
		(**self).on_comment(text)
	}

	fn on_processing_instruction(&mut self, target: &str, data: Option<&str>) -> Flow {
		(**self).on_processing_instruction(target, data)
	}

	fn on_start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) -> Flow {
		(**self).on_start_prefix_mapping(prefix, uri)
	}

	fn on_end_prefix_mapping(&mut self, prefix: Option<&str>) -> Flow {
		(**self).on_end_prefix_mapping(prefix)
	}
}

/// Sink which ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Owned copy of a sink callback, as recorded by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaxEvent {
	StartDocument,
	EndDocument,
	StartElement {
		name: String,
		namespace_uri: Option<String>,
		qualified_name: Option<String>,
		attributes: BTreeMap<String, String>,
	},
	EndElement {
		name: String,
		namespace_uri: Option<String>,
		qualified_name: Option<String>,
	},
	Characters(String),
	Comment(String),
	ProcessingInstruction {
		target: String,
		data: Option<String>,
	},
	StartPrefixMapping {
		prefix: Option<String>,
		uri: String,
	},
	EndPrefixMapping {
		prefix: Option<String>,
	},
}

impl SaxEvent {
	/// Start of an element without namespace information.
	pub fn start(name: &str, attributes: &[(&str, &str)]) -> SaxEvent {
		SaxEvent::StartElement {
			name: name.to_string(),
			namespace_uri: None,
			qualified_name: None,
			attributes: attributes
				.iter()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect(),
		}
	}

	/// End of an element without namespace information.
	pub fn end(name: &str) -> SaxEvent {
		SaxEvent::EndElement {
			name: name.to_string(),
			namespace_uri: None,
			qualified_name: None,
		}
	}

	pub fn characters(text: &str) -> SaxEvent {
		SaxEvent::Characters(text.to_string())
	}
}

fn owned(s: Option<&str>) -> Option<String> {
	s.map(|s| s.to_string())
}

/**
# Sink which records all events

Consecutive character data callbacks are merged into a single
[`SaxEvent::Characters`], so the recording does not depend on how the
parser splits text.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingSink {
	pub events: Vec<SaxEvent>,
}

impl RecordingSink {
	pub fn new() -> RecordingSink {
		RecordingSink { events: Vec::new() }
	}

	pub fn events(&self) -> &[SaxEvent] {
		&self.events
	}

	pub fn into_events(self) -> Vec<SaxEvent> {
		self.events
	}

	/// All character data, concatenated.
	pub fn text(&self) -> String {
		let mut out = String::new();
		for ev in self.events.iter() {
			if let SaxEvent::Characters(text) = ev {
				out.push_str(text);
			}
		}
		out
	}

	pub fn clear(&mut self) {
		self.events.clear();
	}

	fn record(&mut self, ev: SaxEvent) -> Flow {
		self.events.push(ev);
		Flow::Continue
	}
}

impl EventSink for RecordingSink {
	fn on_start_document(&mut self) -> Flow {
		self.record(SaxEvent::StartDocument)
	}

	fn on_end_document(&mut self) -> Flow {
		self.record(SaxEvent::EndDocument)
	}

	fn on_start_element(
		&mut self,
		name: &str,
		namespace_uri: Option<&str>,
		qualified_name: Option<&str>,
		attributes: &Attributes,
	) -> Flow {
		self.record(SaxEvent::StartElement {
			name: name.to_string(),
			namespace_uri: owned(namespace_uri),
			qualified_name: owned(qualified_name),
			attributes: attributes
				.iter()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect(),
		})
	}

	fn on_end_element(
		&mut self,
		name: &str,
		namespace_uri: Option<&str>,
		qualified_name: Option<&str>,
	) -> Flow {
		self.record(SaxEvent::EndElement {
			name: name.to_string(),
			namespace_uri: owned(namespace_uri),
			qualified_name: owned(qualified_name),
		})
	}

	fn on_characters(&mut self, text: &str) -> Flow {
		if let Some(SaxEvent::Characters(prev)) = self.events.last_mut() {
			prev.push_str(text);
			return Flow::Continue;
		}
		self.record(SaxEvent::characters(text))
	}

	fn on_comment(&mut self, text: &str) -> Flow {
		self.record(SaxEvent::Comment(text.to_string()))
	}

	fn on_processing_instruction(&mut self, target: &str, data: Option<&str>) -> Flow {
		self.record(SaxEvent::ProcessingInstruction {
			target: target.to_string(),
			data: owned(data),
		})
	}

	fn on_start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) -> Flow {
		self.record(SaxEvent::StartPrefixMapping {
			prefix: owned(prefix),
			uri: uri.to_string(),
		})
	}

	fn on_end_prefix_mapping(&mut self, prefix: Option<&str>) -> Flow {
		self.record(SaxEvent::EndPrefixMapping {
			prefix: owned(prefix),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn recording_sink_merges_adjacent_characters() {
		let mut sink = RecordingSink::new();
		let _ = sink.on_characters("foo");
		let _ = sink.on_characters("bar");
		let _ = sink.on_comment("c");
		let _ = sink.on_characters("baz");
		assert_eq!(
			sink.events(),
			&[
				SaxEvent::characters("foobar"),
				SaxEvent::Comment("c".to_string()),
				SaxEvent::characters("baz"),
			]
		);
		assert_eq!(sink.text(), "foobarbaz");
	}

	#[test]
	fn default_callbacks_continue() {
		let mut sink = NullSink;
		assert_eq!(sink.on_start_document(), Flow::Continue);
		assert_eq!(sink.on_characters("x"), Flow::Continue);
		assert_eq!(sink.on_end_document(), Flow::Continue);
	}

	#[test]
	fn mutable_references_forward_to_the_sink() {
		fn feed<S: EventSink>(mut sink: S) {
			let _ = sink.on_start_document();
			let _ = sink.on_start_element("a", None, None, &Attributes::new());
			let _ = sink.on_end_element("a", None, None);
		}
		let mut sink = RecordingSink::new();
		feed(&mut sink);
		assert_eq!(
			sink.into_events(),
			vec![SaxEvent::StartDocument, SaxEvent::start("a", &[]), SaxEvent::end("a")]
		);
	}
}
