/*!
# Callback-based parsing

[`SaxParser`] runs the complete pipeline over an in-memory document and
delivers the result to an [`EventSink`]. External entity references are
handed to the configured [`EntityPolicy`].
*/
use std::fmt;

use bytes::Bytes;

use crate::driver::{EventRead, EventReader, ParserOptions};
use crate::encoding::Encoding;
use crate::entity::{EntityFetcher, EntityPolicy, EntityResolver, FsFetcher};
use crate::error::{Error, ParseError, Position};
use crate::parser::ResolvedEvent;
use crate::sink::{EventSink, Flow};

/// Lifecycle of a [`SaxParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
	NotStarted,
	/// A run is in progress. [`SaxParser::parse`] borrows the parser for the
	/// whole run, so this state is left behind only when a callback panics.
	Running,
	/// The last run was terminated by the sink.
	Aborted,
	/// The last run completed successfully.
	Finished,
	/// The last run failed.
	Failed,
}

/**
# SAX-style XML parser

```
use saxml::{RecordingSink, SaxEvent, SaxParser};

let mut parser = SaxParser::new(&b"<test attribute='value'><foo>bar</foo></test>"[..]);
let mut sink = RecordingSink::new();
assert!(parser.parse(&mut sink));
assert_eq!(sink.events(), &[
	SaxEvent::StartDocument,
	SaxEvent::start("test", &[("attribute", "value")]),
	SaxEvent::start("foo", &[]),
	SaxEvent::characters("bar"),
	SaxEvent::end("foo"),
	SaxEvent::end("test"),
	SaxEvent::EndDocument,
]);
```

Every call to [`SaxParser::parse`] is an independent run over the whole
input, with its own decoder, lexer, state machine and entity resolver.
Another parser may be run from inside a callback without affecting the
outer run.
*/
pub struct SaxParser {
	input: Bytes,
	options: ParserOptions,
	fetcher: Box<dyn EntityFetcher>,
	state: RunState,
	error: Option<ParseError>,
}

impl SaxParser {
	/// Create a parser with default options.
	pub fn new<B: Into<Bytes>>(input: B) -> SaxParser {
		Self::with_options(input, ParserOptions::default())
	}

	pub fn with_options<B: Into<Bytes>>(input: B, options: ParserOptions) -> SaxParser {
		SaxParser {
			input: input.into(),
			options,
			fetcher: Box::new(FsFetcher),
			state: RunState::NotStarted,
			error: None,
		}
	}

	pub fn options(&self) -> &ParserOptions {
		&self.options
	}

	pub fn set_process_namespaces(&mut self, v: bool) {
		self.options.process_namespaces = v;
	}

	pub fn set_report_namespace_prefixes(&mut self, v: bool) {
		self.options.report_namespace_prefixes = v;
	}

	pub fn set_external_entity_policy(&mut self, v: EntityPolicy) {
		self.options.external_entity_policy = v;
	}

	pub fn set_document_uri<S: Into<String>>(&mut self, v: S) {
		self.options.document_uri = Some(v.into());
	}

	pub fn set_encoding_hint(&mut self, v: Option<Encoding>) {
		self.options.encoding_hint = v;
	}

	/// Replace the fetcher used for permitted external entities.
	///
	/// The default is [`FsFetcher`].
	pub fn set_fetcher<F: EntityFetcher + 'static>(&mut self, fetcher: F) {
		self.fetcher = Box::new(fetcher);
	}

	pub fn state(&self) -> RunState {
		self.state
	}

	/// Error of the last run, if it did not finish successfully.
	pub fn error(&self) -> Option<&ParseError> {
		self.error.as_ref()
	}

	/// Parse the complete input, delivering events to `sink`.
	///
	/// Returns true if the document was parsed successfully. Otherwise, the
	/// reason is available from [`SaxParser::error`]. No callback fires
	/// after the failure point.
	pub fn parse<S: EventSink>(&mut self, mut sink: S) -> bool {
		self.state = RunState::Running;
		self.error = None;
		tracing::debug!(
			bytes = self.input.len(),
			process_namespaces = self.options.process_namespaces,
			policy = ?self.options.external_entity_policy,
			"parse run started"
		);
		match self.run(&mut sink) {
			Ok(()) => self.state = RunState::Finished,
			Err(e) => {
				self.state = if e.is_abort() {
					RunState::Aborted
				} else {
					RunState::Failed
				};
				tracing::debug!(error = %e, "parse run failed");
				self.error = Some(e);
			}
		}
		tracing::debug!(state = ?self.state, "parse run finished");
		self.state == RunState::Finished
	}

	fn run<S: EventSink>(&mut self, sink: &mut S) -> Result<(), ParseError> {
		check_flow(sink.on_start_document(), Position::START)?;

		let mut reader = EventReader::new(&self.input, &self.options).map_err(|e| {
			let position = match &e {
				Error::Encoding(enc) => enc.position().unwrap_or(Position::START),
				_ => Position::START,
			};
			ParseError::new(e, position)
		})?;
		tracing::trace!(encoding = ?reader.encoding(), "input decoded");

		let mut resolver = EntityResolver::new(&self.options, &mut *self.fetcher);
		loop {
			let ev = match reader.read() {
				Ok(Some(ev)) => ev,
				Ok(None) => break,
				Err(e) => return Err(ParseError::new(e, reader.position())),
			};
			let flow = match ev {
				ResolvedEvent::XMLDeclaration(..) => Flow::Continue,
				ResolvedEvent::StartPrefixMapping(_, prefix, uri) => {
					sink.on_start_prefix_mapping(prefix.as_ref().map(|x| x.as_str()), &uri)
				}
				ResolvedEvent::StartElement(_, name, attributes) => sink.on_start_element(
					&name.local_name,
					name.namespace_uri(),
					name.qualified_name(),
					&attributes,
				),
				ResolvedEvent::EndElement(_, name) => sink.on_end_element(
					&name.local_name,
					name.namespace_uri(),
					name.qualified_name(),
				),
				ResolvedEvent::EndPrefixMapping(_, prefix) => {
					sink.on_end_prefix_mapping(prefix.as_ref().map(|x| x.as_str()))
				}
				ResolvedEvent::Text(_, text) => sink.on_characters(&text),
				ResolvedEvent::Comment(_, text) => sink.on_comment(&text),
				ResolvedEvent::ProcessingInstruction(_, target, data) => {
					sink.on_processing_instruction(&target, data.as_ref().map(|x| x.as_str()))
				}
				ResolvedEvent::ExternalEntity(_, name, id) => {
					if let Err(e) = resolver.resolve(&name, &id, reader.entities()) {
						return Err(ParseError::new(e, reader.position()));
					}
					Flow::Continue
				}
				ResolvedEvent::SkippedEntity(_, name) => {
					tracing::trace!(entity = %name, "undeclared entity skipped");
					Flow::Continue
				}
			};
			check_flow(flow, reader.position())?;
		}

		check_flow(sink.on_end_document(), reader.position())
	}
}

fn check_flow(flow: Flow, position: Position) -> Result<(), ParseError> {
	match flow {
		Flow::Continue => Ok(()),
		Flow::Abort => Err(ParseError::new(Error::Aborted, position)),
	}
}

impl fmt::Debug for SaxParser {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("SaxParser")
			.field("len", &self.input.len())
			.field("options", &self.options)
			.field("state", &self.state)
			.field("error", &self.error)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;
	use crate::sink::{NullSink, RecordingSink, SaxEvent};

	#[test]
	fn parse_reports_success_and_state() {
		let mut parser = SaxParser::new(&b"<a/>"[..]);
		assert_eq!(parser.state(), RunState::NotStarted);
		assert!(parser.parse(NullSink));
		assert_eq!(parser.state(), RunState::Finished);
		assert!(parser.error().is_none());
	}

	#[test]
	fn failed_run_keeps_error_until_next_run() {
		let mut parser = SaxParser::new(&b"<a>"[..]);
		assert!(!parser.parse(NullSink));
		assert_eq!(parser.state(), RunState::Failed);
		assert_eq!(parser.error().unwrap().kind(), ErrorKind::UnclosedElement);
		assert!(!parser.parse(NullSink));
		assert_eq!(parser.error().unwrap().kind(), ErrorKind::UnclosedElement);
	}

	#[test]
	fn runs_end_in_a_terminal_state() {
		struct AbortAtStart;
		impl EventSink for AbortAtStart {
			fn on_start_document(&mut self) -> Flow {
				Flow::Abort
			}
		}

		let mut parser = SaxParser::new(&b"<a/>"[..]);
		assert!(parser.parse(NullSink));
		assert_eq!(parser.state(), RunState::Finished);
		assert!(!parser.parse(AbortAtStart));
		assert_eq!(parser.state(), RunState::Aborted);

		let mut parser = SaxParser::new(&b"<a></b>"[..]);
		assert!(!parser.parse(NullSink));
		assert_eq!(parser.state(), RunState::Failed);
	}

	#[test]
	fn runs_are_repeatable() {
		let mut parser = SaxParser::new(&b"<a>x</a>"[..]);
		let mut first = RecordingSink::new();
		let mut second = RecordingSink::new();
		assert!(parser.parse(&mut first));
		assert!(parser.parse(&mut second));
		assert_eq!(first, second);
	}

	#[test]
	fn comments_and_processing_instructions_are_delivered() {
		let mut parser = SaxParser::new(&b"<?pi data?><a><!--c--></a>"[..]);
		let mut sink = RecordingSink::new();
		assert!(parser.parse(&mut sink));
		assert_eq!(
			sink.events(),
			&[
				SaxEvent::StartDocument,
				SaxEvent::ProcessingInstruction {
					target: "pi".to_string(),
					data: Some("data".to_string()),
				},
				SaxEvent::start("a", &[]),
				SaxEvent::Comment("c".to_string()),
				SaxEvent::end("a"),
				SaxEvent::EndDocument,
			]
		);
	}

	#[test]
	fn prefix_mappings_are_delivered_when_reported() {
		let mut parser = SaxParser::with_options(
			&b"<p:a xmlns:p='urn:p'/>"[..],
			ParserOptions::default()
				.process_namespaces(true)
				.report_namespace_prefixes(true),
		);
		let mut sink = RecordingSink::new();
		assert!(parser.parse(&mut sink));
		assert_eq!(
			sink.events(),
			&[
				SaxEvent::StartDocument,
				SaxEvent::StartPrefixMapping {
					prefix: Some("p".to_string()),
					uri: "urn:p".to_string(),
				},
				SaxEvent::StartElement {
					name: "a".to_string(),
					namespace_uri: Some("urn:p".to_string()),
					qualified_name: Some("p:a".to_string()),
					attributes: Default::default(),
				},
				SaxEvent::EndElement {
					name: "a".to_string(),
					namespace_uri: Some("urn:p".to_string()),
					qualified_name: Some("p:a".to_string()),
				},
				SaxEvent::EndPrefixMapping {
					prefix: Some("p".to_string()),
				},
				SaxEvent::EndDocument,
			]
		);
	}

	#[test]
	fn encoding_errors_follow_start_document() {
		let mut parser = SaxParser::new(&b"<a>\xff</a>"[..]);
		let mut sink = RecordingSink::new();
		assert!(!parser.parse(&mut sink));
		assert_eq!(parser.error().unwrap().kind(), ErrorKind::Encoding);
		assert_eq!(sink.events(), &[SaxEvent::StartDocument]);
	}

	#[test]
	fn abort_in_end_document_counts_as_abort() {
		struct AbortAtEnd;
		impl EventSink for AbortAtEnd {
			fn on_end_document(&mut self) -> Flow {
				Flow::Abort
			}
		}
		let mut parser = SaxParser::new(&b"<a/>"[..]);
		assert!(!parser.parse(AbortAtEnd));
		assert_eq!(parser.state(), RunState::Aborted);
		assert!(parser.error().unwrap().is_abort());
	}

	#[test]
	fn error_position_points_at_the_failure() {
		let mut parser = SaxParser::new(&b"<a>\n  <b></c>\n</a>"[..]);
		assert!(!parser.parse(NullSink));
		let err = parser.error().unwrap();
		assert_eq!(err.kind(), ErrorKind::MismatchedEndTag);
		assert_eq!(err.line(), 2);
		assert_eq!(err.column(), 6);
	}

	#[test]
	fn strict_entity_mode_fails_on_denied_entities() {
		let mut parser = SaxParser::with_options(
			&b"<!DOCTYPE d [<!ENTITY e SYSTEM 'e.xml'>]><d>&e;</d>"[..],
			ParserOptions::default().fail_on_entity_errors(true),
		);
		let mut sink = RecordingSink::new();
		assert!(!parser.parse(&mut sink));
		assert_eq!(parser.error().unwrap().kind(), ErrorKind::EntityResolution);
		assert_eq!(
			sink.events(),
			&[SaxEvent::StartDocument, SaxEvent::start("d", &[])]
		);
	}
}
