/*!
# Namespace resolution

[`NamespaceResolver`] converts [`RawEvent`]s into [`ResolvedEvent`]s by
applying Namespaces in XML 1.0 to element and attribute names, depending on
whether namespace processing is enabled.
*/
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::entity::ExternalId;
use crate::errctx::*;
use crate::error::{add_context, Error, NWFError, Result, WFError};
use crate::lexer::XMLDecl;
use crate::strings::*;

use super::common::{EventMetrics, RcPtr, XMLNS_XML, XMLNS_XMLNS};
use super::raw::RawEvent;

/// Shared namespace URI
pub type NamespaceName = RcPtr<CData>;

/// Attributes of an element, keyed by the name as written in the document.
///
/// With namespace processing enabled, namespace declarations are not
/// included.
pub type Attributes = HashMap<Name, CData>;

/**
# Identity of an element

The meaning of the fields depends on the namespace options of the
[`NamespaceResolver`]:

| processing | reporting | `local_name` | `namespace_uri` | `qualified_name` |
|---|---|---|---|---|
| off | any | name as written | `None` | `None` |
| on | off | local part | `Some(uri)` | `None` |
| on | on | local part | `Some(uri)` | name as written |

When processing is on and the element is in no namespace, the URI is the
empty string.
*/
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ElementName {
	pub local_name: Name,
	pub namespace_uri: Option<NamespaceName>,
	pub qualified_name: Option<Name>,
}

impl ElementName {
	pub fn namespace_uri(&self) -> Option<&str> {
		self.namespace_uri.as_ref().map(|x| x.as_str())
	}

	pub fn qualified_name(&self) -> Option<&str> {
		self.qualified_name.as_ref().map(|x| x.as_str())
	}
}

/**
# High-level, logical XML document parts

In contrast to the [`RawEvent`], observing a [`ResolvedEvent`] from a
[`NamespaceResolver`] which is fed by a [`RawParser`] guarantees that
the XML document has been well-formed and, if namespace processing is
enabled, namespace-well-formed up to this point.

   [`RawParser`]: crate::parser::RawParser
*/
#[derive(Clone, PartialEq, Debug)]
pub enum ResolvedEvent {
	/// This mirrors [`RawEvent::XMLDeclaration`].
	XMLDeclaration(EventMetrics, XMLDecl),

	/// A prefix is bound to a namespace for the scope of the next element.
	///
	/// Only emitted when namespace processing and prefix reporting are both
	/// enabled. `None` is the default namespace; an empty URI undeclares
	/// it.
	StartPrefixMapping(EventMetrics, Option<NCName>, NamespaceName),

	/// The start of an XML element.
	StartElement(EventMetrics, ElementName, Attributes),

	/// The end of an XML element.
	///
	/// The name is identical to the one of the corresponding
	/// [`Self::StartElement`].
	EndElement(EventMetrics, ElementName),

	/// The scope of a prefix binding ended.
	///
	/// Emitted after the [`Self::EndElement`] of the element which declared
	/// it, in reverse order of declaration.
	EndPrefixMapping(EventMetrics, Option<NCName>),

	/// This mirrors [`RawEvent::Text`].
	Text(EventMetrics, CData),

	Comment(EventMetrics, CData),

	ProcessingInstruction(EventMetrics, Name, Option<CData>),

	/// This mirrors [`RawEvent::ExternalEntity`].
	ExternalEntity(EventMetrics, Name, ExternalId),

	/// This mirrors [`RawEvent::SkippedEntity`].
	SkippedEntity(EventMetrics, Name),
}

impl ResolvedEvent {
	/// Return the [`EventMetrics`] of the event
	pub fn metrics(&self) -> &EventMetrics {
		match self {
			Self::XMLDeclaration(m, ..) => m,
			Self::StartPrefixMapping(m, ..) => m,
			Self::StartElement(m, ..) => m,
			Self::EndElement(m, ..) => m,
			Self::EndPrefixMapping(m, ..) => m,
			Self::Text(m, ..) => m,
			Self::Comment(m, ..) => m,
			Self::ProcessingInstruction(m, ..) => m,
			Self::ExternalEntity(m, ..) => m,
			Self::SkippedEntity(m, ..) => m,
		}
	}
}

struct Scope {
	name: ElementName,
	/// Declarations of this element in document order.
	decls: Vec<(Option<NCName>, NamespaceName)>,
}

/**
# Namespace/Attribute resolver

This struct implements the resolution logic to convert namespace prefixes
into namespace names (URIs), as described in Namespaces for XML 1.0. It
takes [`RawEvent`] structs and converts them into [`ResolvedEvent`] structs.

`xmlns` and `xmlns:*` attributes update the scope of the element they occur
on before any name of that element is resolved, so their position among
the attributes does not matter.

## Caveat

This struct does *not* validate that the sequence of [`RawEvent`] structs it
is fed is actually a well-formed XML document. An unbalanced
[`RawEvent::EndElement`] is ignored.
*/
pub struct NamespaceResolver {
	process: bool,
	report: bool,
	fixed_xml_namespace: NamespaceName,
	empty_namespace: NamespaceName,
	scopes: Vec<Scope>,
	eventq: VecDeque<ResolvedEvent>,
	poison: Option<Error>,
}

impl NamespaceResolver {
	/// Create a new namespace resolver.
	///
	/// With `process` unset, names are forwarded as written and namespace
	/// declarations are reported as ordinary attributes; `report` then has
	/// no effect.
	pub fn new(process: bool, report: bool) -> Self {
		Self {
			process,
			report: process && report,
			fixed_xml_namespace: RcPtr::new(CData::from_checked(XMLNS_XML)),
			empty_namespace: RcPtr::new(CData::from_checked("")),
			scopes: Vec::new(),
			eventq: VecDeque::new(),
			poison: None,
		}
	}

	fn check_poison(&self) -> Result<()> {
		if let Some(poison) = self.poison.as_ref() {
			return Err(poison.clone());
		}
		Ok(())
	}

	fn lookup_prefix(&self, prefix: Option<&str>) -> Result<NamespaceName> {
		match prefix {
			Some("xml") => Ok(self.fixed_xml_namespace.clone()),
			prefix => {
				for scope in self.scopes.iter().rev() {
					for (declared, uri) in scope.decls.iter().rev() {
						if declared.as_ref().map(|x| x.as_str()) == prefix {
							return Ok(uri.clone());
						}
					}
				}
				match prefix {
					None => Ok(self.empty_namespace.clone()),
					// Namespaces for XML 1.0
					// Namespace constraint: Prefix Declared
					Some(_) => Err(NWFError::UndeclaredNamespacePrefix(ERRCTX_UNKNOWN).into()),
				}
			}
		}
	}

	/// Validate a namespace declaration and return whether it needs to be
	/// recorded in the scope.
	fn check_declaration(prefix: Option<&str>, uri: &str) -> Result<bool> {
		match prefix {
			Some("xmlns") => return Err(NWFError::ReservedNamespacePrefix.into()),
			Some("xml") if uri == XMLNS_XML => return Ok(false),
			Some("xml") => return Err(NWFError::ReservedNamespacePrefix.into()),
			Some(_) if uri.is_empty() => return Err(NWFError::EmptyNamespaceUri.into()),
			_ => (),
		}
		if uri == XMLNS_XML || uri == XMLNS_XMLNS {
			return Err(NWFError::ReservedNamespaceName.into());
		}
		Ok(true)
	}

	fn start_element(
		&mut self,
		em: EventMetrics,
		raw_name: Name,
		raw_attributes: Vec<(Name, CData)>,
	) -> Result<()> {
		if !self.process {
			let name = ElementName {
				local_name: raw_name,
				namespace_uri: None,
				qualified_name: None,
			};
			self.scopes.push(Scope {
				name: name.clone(),
				decls: Vec::new(),
			});
			self.eventq.push_back(ResolvedEvent::StartElement(
				em,
				name,
				raw_attributes.into_iter().collect(),
			));
			return Ok(());
		}

		let mut decls = Vec::new();
		let mut plain = Vec::with_capacity(raw_attributes.len());
		for (attrname, value) in raw_attributes {
			let (prefix, local) = add_context(attrname.split_name(), ERRCTX_ATTNAME)?;
			let is_default_decl = prefix.is_none() && local == "xmlns";
			let is_prefix_decl = prefix.as_ref().map(|x| x == "xmlns").unwrap_or(false);
			let declared = if is_default_decl {
				None
			} else if is_prefix_decl {
				Some(local)
			} else {
				plain.push((attrname, prefix, local, value));
				continue;
			};
			if Self::check_declaration(declared.as_ref().map(|x| x.as_str()), &value)? {
				decls.push((declared, RcPtr::new(value)));
			}
		}

		let (prefix, local) = add_context(raw_name.split_name(), ERRCTX_NAME)?;
		self.scopes.push(Scope {
			name: ElementName {
				local_name: local.clone().into(),
				namespace_uri: None,
				qualified_name: None,
			},
			decls,
		});
		let name = ElementName {
			namespace_uri: Some(add_context(
				self.lookup_prefix(prefix.as_ref().map(|x| x.as_str())),
				ERRCTX_NAME,
			)?),
			local_name: local.into(),
			qualified_name: if self.report { Some(raw_name) } else { None },
		};

		let mut seen = HashSet::with_capacity(plain.len());
		let mut attributes = Attributes::with_capacity(plain.len());
		for (attrname, prefix, local, value) in plain {
			// unprefixed attributes are in no namespace
			let uri = match prefix {
				Some(prefix) => Some(add_context(
					self.lookup_prefix(Some(prefix.as_str())),
					ERRCTX_ATTNAME,
				)?),
				None => None,
			};
			// Namespaces in XML 1.0
			// Namespace constraint: Attributes Unique
			if !seen.insert((uri, local)) {
				return Err(WFError::DuplicateAttribute.into());
			}
			attributes.insert(attrname, value);
		}

		// the scope is known to exist, it was pushed above
		if let Some(scope) = self.scopes.last_mut() {
			scope.name = name.clone();
			if self.report {
				for (prefix, uri) in scope.decls.iter() {
					self.eventq.push_back(ResolvedEvent::StartPrefixMapping(
						EventMetrics::new(em.start(), 0),
						prefix.clone(),
						uri.clone(),
					));
				}
			}
		}
		self.eventq
			.push_back(ResolvedEvent::StartElement(em, name, attributes));
		Ok(())
	}

	fn end_element(&mut self, em: EventMetrics) {
		let scope = match self.scopes.pop() {
			Some(scope) => scope,
			None => return,
		};
		self.eventq
			.push_back(ResolvedEvent::EndElement(em, scope.name));
		if self.report {
			for (prefix, _) in scope.decls.into_iter().rev() {
				self.eventq.push_back(ResolvedEvent::EndPrefixMapping(
					EventMetrics::new(em.end(), 0),
					prefix,
				));
			}
		}
	}

	fn process_event(&mut self, ev: RawEvent) -> Result<()> {
		match ev {
			RawEvent::StartElement(em, name, attributes) => {
				self.start_element(em, name, attributes)?
			}
			RawEvent::EndElement(em, _) => self.end_element(em),
			RawEvent::XMLDeclaration(em, decl) => self
				.eventq
				.push_back(ResolvedEvent::XMLDeclaration(em, decl)),
			RawEvent::Text(em, text) => self.eventq.push_back(ResolvedEvent::Text(em, text)),
			RawEvent::Comment(em, text) => {
				self.eventq.push_back(ResolvedEvent::Comment(em, text))
			}
			RawEvent::ProcessingInstruction(em, target, data) => self
				.eventq
				.push_back(ResolvedEvent::ProcessingInstruction(em, target, data)),
			RawEvent::ExternalEntity(em, name, id) => self
				.eventq
				.push_back(ResolvedEvent::ExternalEntity(em, name, id)),
			RawEvent::SkippedEntity(em, name) => self
				.eventq
				.push_back(ResolvedEvent::SkippedEntity(em, name)),
		}
		Ok(())
	}

	/// Read [`RawEvent`] structs from the given function until either an
	/// error occurs or a valid [`ResolvedEvent`] can be emitted.
	///
	/// If the [`NamespaceResolver`] detects an error (such as an undeclared
	/// prefix), that error will henceforth be returned whenever this
	/// function is called, no matter the `f`; the `NamespaceResolver` is then
	/// poisoned.
	///
	/// Errors from `f` are forwarded, but do not poison the
	/// [`NamespaceResolver`].
	pub fn next<F: FnMut() -> Result<Option<RawEvent>>>(
		&mut self,
		mut f: F,
	) -> Result<Option<ResolvedEvent>> {
		self.check_poison()?;
		loop {
			if let Some(ev) = self.eventq.pop_front() {
				return Ok(Some(ev));
			}
			let pev = match f()? {
				None => return Ok(None),
				Some(pev) => pev,
			};
			if let Err(e) = self.process_event(pev) {
				self.eventq.clear();
				self.poison = Some(e.clone());
				return Err(e);
			}
		}
	}

	/// Whether namespace processing is enabled.
	pub fn processes_namespaces(&self) -> bool {
		self.process
	}
}

impl fmt::Debug for NamespaceResolver {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("NamespaceResolver")
			.field("process", &self.process)
			.field("report", &self.report)
			.field("depth", &self.scopes.len())
			.field("poison", &self.poison)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::convert::TryInto;

	const DM: EventMetrics = EventMetrics::new(0, 0);

	fn start(name: &str, attrs: &[(&str, &str)]) -> RawEvent {
		RawEvent::StartElement(
			DM,
			name.try_into().unwrap(),
			attrs
				.iter()
				.map(|(k, v)| ((*k).try_into().unwrap(), (*v).try_into().unwrap()))
				.collect(),
		)
	}

	fn end(name: &str) -> RawEvent {
		RawEvent::EndElement(DM, name.try_into().unwrap())
	}

	fn resolve_all(
		mut nsr: NamespaceResolver,
		evs: Vec<RawEvent>,
	) -> (Vec<ResolvedEvent>, Result<()>) {
		let mut iter = evs.into_iter();
		let mut out = Vec::new();
		loop {
			match nsr.next(|| Ok(iter.next())) {
				Ok(Some(ev)) => out.push(ev),
				Ok(None) => return (out, Ok(())),
				Err(e) => return (out, Err(e)),
			}
		}
	}

	#[test]
	fn forwards_raw_names_without_processing() {
		let (evs, r) = resolve_all(
			NamespaceResolver::new(false, true),
			vec![
				start("myPrefix:myLocalName", &[("xmlns:x", "urn:x"), ("a", "1")]),
				end("myPrefix:myLocalName"),
			],
		);
		r.unwrap();
		assert_eq!(evs.len(), 2);
		match &evs[0] {
			ResolvedEvent::StartElement(_, name, attrs) => {
				assert_eq!(name.local_name, "myPrefix:myLocalName");
				assert!(name.namespace_uri.is_none());
				assert!(name.qualified_name.is_none());
				assert_eq!(attrs.len(), 2);
				assert_eq!(attrs.get("xmlns:x").unwrap(), "urn:x");
			}
			other => panic!("unexpected event: {:?}", other),
		}
		match &evs[1] {
			ResolvedEvent::EndElement(_, name) => assert_eq!(name.local_name, "myPrefix:myLocalName"),
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn unprefixed_element_has_empty_namespace_uri() {
		let (evs, r) = resolve_all(
			NamespaceResolver::new(true, true),
			vec![start("test", &[("attribute", "value")]), end("test")],
		);
		r.unwrap();
		match &evs[0] {
			ResolvedEvent::StartElement(_, name, attrs) => {
				assert_eq!(name.local_name, "test");
				assert_eq!(name.namespace_uri(), Some(""));
				assert_eq!(name.qualified_name(), Some("test"));
				assert_eq!(attrs.get("attribute").unwrap(), "value");
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn prefixed_element_keeps_local_and_qualified_name_apart() {
		let (evs, r) = resolve_all(
			NamespaceResolver::new(true, true),
			vec![
				start("myPrefix:myLocalName", &[("xmlns:myPrefix", "urn:p")]),
				end("myPrefix:myLocalName"),
			],
		);
		r.unwrap();
		match &evs[1] {
			ResolvedEvent::StartElement(_, name, attrs) => {
				assert_eq!(name.local_name, "myLocalName");
				assert_eq!(name.namespace_uri(), Some("urn:p"));
				assert_eq!(name.qualified_name(), Some("myPrefix:myLocalName"));
				assert!(attrs.is_empty());
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn qualified_name_is_omitted_without_reporting() {
		let (evs, r) = resolve_all(
			NamespaceResolver::new(true, false),
			vec![start("p:e", &[("xmlns:p", "urn:p")]), end("p:e")],
		);
		r.unwrap();
		assert_eq!(evs.len(), 2);
		match &evs[0] {
			ResolvedEvent::StartElement(_, name, _) => {
				assert_eq!(name.local_name, "e");
				assert!(name.qualified_name.is_none());
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn prefix_mappings_surround_the_declaring_element() {
		let (evs, r) = resolve_all(
			NamespaceResolver::new(true, true),
			vec![
				start("a", &[("xmlns", "urn:d"), ("xmlns:p", "urn:p")]),
				end("a"),
			],
		);
		r.unwrap();
		let kinds: Vec<String> = evs
			.iter()
			.map(|ev| match ev {
				ResolvedEvent::StartPrefixMapping(_, p, uri) => {
					format!("start-mapping {:?} {}", p.as_ref().map(|x| x.as_str()), uri)
				}
				ResolvedEvent::StartElement(_, name, _) => {
					format!("start {}", name.namespace_uri().unwrap())
				}
				ResolvedEvent::EndElement(..) => "end".to_string(),
				ResolvedEvent::EndPrefixMapping(_, p) => {
					format!("end-mapping {:?}", p.as_ref().map(|x| x.as_str()))
				}
				other => panic!("unexpected event: {:?}", other),
			})
			.collect();
		assert_eq!(
			kinds,
			vec![
				"start-mapping None urn:d",
				"start-mapping Some(\"p\") urn:p",
				"start urn:d",
				"end",
				"end-mapping Some(\"p\")",
				"end-mapping None",
			]
		);
	}

	#[test]
	fn child_shadows_and_undeclares_bindings() {
		let (evs, r) = resolve_all(
			NamespaceResolver::new(true, false),
			vec![
				start("a", &[("xmlns", "urn:outer"), ("xmlns:p", "urn:p1")]),
				start("p:b", &[("xmlns:p", "urn:p2"), ("xmlns", "")]),
				start("c", &[]),
				end("c"),
				end("p:b"),
				start("p:d", &[]),
				end("p:d"),
				end("a"),
			],
		);
		r.unwrap();
		let uris: Vec<&str> = evs
			.iter()
			.filter_map(|ev| match ev {
				ResolvedEvent::StartElement(_, name, _) => name.namespace_uri(),
				_ => None,
			})
			.collect();
		assert_eq!(uris, vec!["urn:outer", "urn:p2", "", "urn:p1"]);
	}

	#[test]
	fn xml_prefix_is_always_bound() {
		let (evs, r) = resolve_all(
			NamespaceResolver::new(true, false),
			vec![start("a", &[("xml:lang", "en")]), end("a")],
		);
		r.unwrap();
		match &evs[0] {
			ResolvedEvent::StartElement(_, _, attrs) => {
				assert_eq!(attrs.get("xml:lang").unwrap(), "en")
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn rejects_unbound_prefixes() {
		match resolve_all(
			NamespaceResolver::new(true, false),
			vec![start("p:a", &[]), end("p:a")],
		)
		.1
		{
			Err(Error::NotNamespaceWellFormed(NWFError::UndeclaredNamespacePrefix(ERRCTX_NAME))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		match resolve_all(
			NamespaceResolver::new(true, false),
			vec![start("a", &[("p:x", "1")]), end("a")],
		)
		.1
		{
			Err(Error::NotNamespaceWellFormed(NWFError::UndeclaredNamespacePrefix(ERRCTX_ATTNAME))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn bindings_end_with_their_element() {
		match resolve_all(
			NamespaceResolver::new(true, false),
			vec![
				start("a", &[]),
				start("p:b", &[("xmlns:p", "urn:p")]),
				end("p:b"),
				start("p:c", &[]),
			],
		)
		.1
		{
			Err(Error::NotNamespaceWellFormed(NWFError::UndeclaredNamespacePrefix(_))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn rejects_reserved_declarations() {
		let cases: &[(&str, &str)] = &[
			("xmlns:xmlns", "urn:x"),
			("xmlns:xml", "urn:x"),
			("xmlns:p", XMLNS_XML),
			("xmlns", XMLNS_XMLNS),
			("xmlns:p", ""),
		];
		for (attr, value) in cases {
			match resolve_all(
				NamespaceResolver::new(true, false),
				vec![start("a", &[(attr, value)]), end("a")],
			)
			.1
			{
				Err(Error::NotNamespaceWellFormed(_)) => (),
				other => panic!("unexpected result for {}={:?}: {:?}", attr, value, other),
			}
		}
		resolve_all(
			NamespaceResolver::new(true, false),
			vec![start("a", &[("xmlns:xml", XMLNS_XML)]), end("a")],
		)
		.1
		.unwrap();
	}

	#[test]
	fn rejects_duplicate_expanded_attribute_names() {
		match resolve_all(
			NamespaceResolver::new(true, false),
			vec![
				start(
					"a",
					&[
						("xmlns:p", "urn:x"),
						("xmlns:q", "urn:x"),
						("p:attr", "1"),
						("q:attr", "2"),
					],
				),
				end("a"),
			],
		)
		.1
		{
			Err(Error::NotWellFormed(WFError::DuplicateAttribute)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn rejects_multi_colon_names_when_processing() {
		match resolve_all(
			NamespaceResolver::new(true, false),
			vec![start("a:b:c", &[]), end("a:b:c")],
		)
		.1
		{
			Err(Error::NotNamespaceWellFormed(NWFError::MultiColonName(ERRCTX_NAME))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn repeats_error_once_poisoned() {
		let mut nsr = NamespaceResolver::new(true, false);
		let mut evs = vec![start("p:a", &[])].into_iter();
		for _ in 0..2 {
			match nsr.next(|| Ok(evs.next())) {
				Err(Error::NotNamespaceWellFormed(NWFError::UndeclaredNamespacePrefix(_))) => (),
				other => panic!("unexpected result: {:?}", other),
			}
		}
	}
}
