/*!
# Entity declarations and external entity resolution

This module holds the general entity table which the lexer builds from the
internal DTD subset, and the machinery deciding what happens when the
document refers to an *external* parsed entity.

External entities are never spliced into the event stream of the document
which refers to them. Depending on the [`EntityPolicy`], the entity is either
elided without any I/O, or fetched through an [`EntityFetcher`] and parsed in
an isolated run whose events are discarded. Such a run only establishes that
the entity is well-formed and follows further external references inside it,
up to a fixed nesting depth.
*/
use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use smartstring::alias::String as SmartString;

use crate::driver::{EventRead, EventReader, ParserOptions};
use crate::encoding;
use crate::error::{EntityError, Error, IOErrorWrapper, Result};
use crate::parser::{RcPtr, ResolvedEvent};
use crate::strings::{CData, Name};

/// Maximum nesting of external entities which refer to external entities.
pub const MAX_ENTITY_DEPTH: usize = 8;

/// External identifier of an entity or a document type.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalId {
	/// `SYSTEM "uri"`
	System(CData),
	/// `PUBLIC "pubid" "uri"`
	Public { public_id: CData, system_id: CData },
}

impl ExternalId {
	/// The system identifier (URI reference) of the entity.
	pub fn system_id(&self) -> &str {
		match self {
			Self::System(uri) => uri,
			Self::Public { system_id, .. } => system_id,
		}
	}

	pub fn public_id(&self) -> Option<&str> {
		match self {
			Self::System(_) => None,
			Self::Public { public_id, .. } => Some(public_id),
		}
	}
}

/// Definition of a general entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityDef {
	/// Internal entity with its replacement text.
	///
	/// Character references are already expanded; entity references are
	/// kept verbatim and resolved when the entity is referenced.
	Internal(CData),
	/// External entity. If `notation` is set, the entity is unparsed and
	/// must not be referenced from content.
	External {
		id: ExternalId,
		notation: Option<Name>,
	},
}

/**
# General entities declared by a document

The table is filled by the lexer while it processes the internal DTD subset
and is shared (via [`RcPtr`]) with everything that expands references later
on. It also carries the expansion counter which bounds the total number of
internal entity expansions of one document.
*/
#[derive(Debug)]
pub struct EntityTable {
	general: HashMap<Name, EntityDef>,
	complete: bool,
	expansions: AtomicUsize,
}

impl EntityTable {
	pub(crate) fn new() -> EntityTable {
		EntityTable {
			general: HashMap::new(),
			complete: true,
			expansions: AtomicUsize::new(0),
		}
	}

	/// Record a declaration. The first declaration of a name is binding;
	/// later ones are ignored and `false` is returned.
	pub(crate) fn declare(&mut self, name: Name, def: EntityDef) -> bool {
		if self.general.contains_key(&name) {
			return false;
		}
		self.general.insert(name, def);
		true
	}

	pub(crate) fn mark_incomplete(&mut self) {
		self.complete = false;
	}

	/// Look up the declaration of a general entity.
	pub fn get(&self, name: &str) -> Option<&EntityDef> {
		self.general.get(name)
	}

	/// Number of declared general entities.
	pub fn len(&self) -> usize {
		self.general.len()
	}

	pub fn is_empty(&self) -> bool {
		self.general.is_empty()
	}

	/// Whether all declarations have been seen.
	///
	/// This is false if the document has an external DTD subset or refers
	/// to parameter entities (and is not declared standalone). References
	/// to undeclared entities are skipped instead of rejected in that case.
	pub fn is_complete(&self) -> bool {
		self.complete
	}

	/// Account for one internal entity expansion.
	pub(crate) fn count_expansion(&self, limit: usize) -> Result<()> {
		let n = self.expansions.fetch_add(1, Ordering::Relaxed) + 1;
		if n > limit {
			return Err(Error::LimitExceeded("too many entity expansions"));
		}
		Ok(())
	}
}

/**
# Decision for references to external entities

The default is [`EntityPolicy::Never`].
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityPolicy {
	/// No external entity is ever fetched; references are elided.
	Never,
	/// All external entities are fetched and checked for well-formedness.
	Always,
	/// Only entities from the same origin (scheme, host and port) as the
	/// document URI are fetched. Without an absolute document URI nothing
	/// is fetched.
	SameOriginOnly,
}

impl Default for EntityPolicy {
	fn default() -> Self {
		Self::Never
	}
}

/**
# Source of external entity content

The fetcher is only invoked when the [`EntityPolicy`] permits a fetch. The
URI passed is the system identifier resolved against the referring
document's URI (when one is known).

Closures of type `FnMut(&str) -> io::Result<Bytes>` implement this trait.

```
use std::io;
use bytes::Bytes;
use saxml::{EntityPolicy, ParserOptions, SaxParser, RecordingSink};

let doc = &b"<!DOCTYPE d [<!ENTITY ext SYSTEM 'part.xml'>]><d>&ext;</d>"[..];
let mut parser = SaxParser::with_options(
	doc,
	ParserOptions::default().external_entity_policy(EntityPolicy::Always),
);
let mut fetched = Vec::new();
parser.set_fetcher(move |uri: &str| -> io::Result<Bytes> {
	fetched.push(uri.to_string());
	Ok(Bytes::from_static(b"<part/>"))
});
assert!(parser.parse(&mut RecordingSink::new()));
```
*/
pub trait EntityFetcher {
	/// Retrieve the raw bytes of the entity at `uri`.
	fn fetch(&mut self, uri: &str) -> io::Result<Bytes>;
}

impl<F: FnMut(&str) -> io::Result<Bytes>> EntityFetcher for F {
	fn fetch(&mut self, uri: &str) -> io::Result<Bytes> {
		self(uri)
	}
}

/// Fetcher which reads `file:` URIs and plain paths from the local file
/// system. Other schemes are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFetcher;

impl EntityFetcher for FsFetcher {
	fn fetch(&mut self, uri: &str) -> io::Result<Bytes> {
		let path = match split_scheme(uri) {
			None => uri,
			Some((scheme, rest)) if scheme.eq_ignore_ascii_case("file") => {
				match rest.strip_prefix("//") {
					// file://host/path; only the empty host and localhost
					// are local
					Some(rest) => match rest.find('/') {
						Some(0) => rest,
						Some(p) if rest[..p].eq_ignore_ascii_case("localhost") => &rest[p..],
						_ => {
							return Err(io::Error::new(
								io::ErrorKind::Other,
								"file URI refers to a remote host",
							))
						}
					},
					None => rest,
				}
			}
			Some((scheme, _)) => {
				return Err(io::Error::new(
					io::ErrorKind::Other,
					format!("unsupported URI scheme {:?}", scheme),
				))
			}
		};
		Ok(Bytes::from(fs::read(path)?))
	}
}

/// Split `uri` into scheme and remainder, if it has a scheme.
fn split_scheme(uri: &str) -> Option<(&str, &str)> {
	let colon = uri.find(':')?;
	let scheme = &uri[..colon];
	let mut chars = scheme.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() => (),
		_ => return None,
	}
	if !chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
		return None;
	}
	Some((scheme, &uri[colon + 1..]))
}

#[derive(Debug, PartialEq, Eq)]
struct Origin {
	scheme: SmartString,
	host: SmartString,
	port: Option<u16>,
}

fn default_port(scheme: &str) -> Option<u16> {
	match scheme {
		"http" | "ws" => Some(80),
		"https" | "wss" => Some(443),
		"ftp" => Some(21),
		_ => None,
	}
}

fn origin(uri: &str) -> Option<Origin> {
	let (scheme, rest) = split_scheme(uri)?;
	let scheme: SmartString = scheme.to_ascii_lowercase().into();
	let authority = match rest.strip_prefix("//") {
		Some(rest) => {
			let end = rest.find(|c| c == '/' || c == '?' || c == '#').unwrap_or(rest.len());
			&rest[..end]
		}
		None => "",
	};
	let hostport = match authority.rfind('@') {
		Some(at) => &authority[at + 1..],
		None => authority,
	};
	// the colon of an IPv6 literal is not a port separator
	let port_sep = match hostport.rfind(']') {
		Some(close) => hostport[close..].find(':').map(|p| p + close),
		None => hostport.rfind(':'),
	};
	let (host, port) = match port_sep {
		Some(p) if p + 1 < hostport.len() => (&hostport[..p], hostport[p + 1..].parse().ok()),
		Some(p) => (&hostport[..p], None),
		None => (hostport, None),
	};
	let port = port.or_else(|| default_port(&scheme));
	Some(Origin {
		host: host.to_ascii_lowercase().into(),
		scheme,
		port,
	})
}

fn remove_dot_segments(path: &str) -> String {
	let mut out: Vec<&str> = Vec::new();
	let absolute = path.starts_with('/');
	let segments: Vec<&str> = path.split('/').collect();
	let last = segments.len().saturating_sub(1);
	for (i, seg) in segments.iter().enumerate() {
		match *seg {
			"." => {
				if i == last {
					out.push("");
				}
			}
			".." => {
				if out.len() > usize::from(absolute) {
					out.pop();
				}
				if i == last {
					out.push("");
				}
			}
			other => out.push(other),
		}
	}
	let joined = out.join("/");
	if absolute && !joined.starts_with('/') {
		format!("/{}", joined)
	} else {
		joined
	}
}

/// Resolve the URI reference `reference` against `base`.
///
/// This covers the cases which occur for system identifiers: absolute URIs,
/// network-path, absolute-path and relative-path references. Query and
/// fragment of the base are dropped.
pub(crate) fn resolve_uri(base: Option<&str>, reference: &str) -> String {
	if split_scheme(reference).is_some() {
		return reference.to_string();
	}
	let base = match base {
		Some(b) => b,
		None => return reference.to_string(),
	};
	let base = match base.find(|c| c == '?' || c == '#') {
		Some(p) => &base[..p],
		None => base,
	};
	let (scheme, rest) = match split_scheme(base) {
		Some((scheme, rest)) => (Some(scheme), rest),
		None => (None, base),
	};
	let scheme_prefix = match scheme {
		Some(s) => format!("{}:", s),
		None => String::new(),
	};
	if reference.starts_with("//") {
		return format!("{}{}", scheme_prefix, reference);
	}
	let (authority, path) = match rest.strip_prefix("//") {
		Some(r) => {
			let end = r.find('/').unwrap_or(r.len());
			(&rest[..end + 2], &r[end..])
		}
		None => ("", rest),
	};
	let merged = if reference.starts_with('/') {
		reference.to_string()
	} else {
		let dir = match path.rfind('/') {
			Some(p) => &path[..p + 1],
			None if !authority.is_empty() => "/",
			None => "",
		};
		format!("{}{}", dir, reference)
	};
	format!("{}{}{}", scheme_prefix, authority, remove_dot_segments(&merged))
}

/// Whether `target` (already resolved) has the same origin as `document`.
///
/// Without a document URI, or with one that has no scheme, there is no
/// origin to compare against and nothing is same-origin.
pub(crate) fn same_origin(document: Option<&str>, target: &str) -> bool {
	match document.and_then(origin) {
		Some(doc) => origin(target).map_or(false, |target| target == doc),
		None => false,
	}
}

/**
Per-run resolver for external entities.

The resolver lives for exactly one parse run. It holds the stack of system
identifiers currently being resolved, which bounds nesting and prevents an
entity from fetching itself.
*/
pub(crate) struct EntityResolver<'x> {
	options: &'x ParserOptions,
	fetcher: &'x mut dyn EntityFetcher,
	stack: Vec<String>,
}

impl<'x> EntityResolver<'x> {
	pub(crate) fn new(
		options: &'x ParserOptions,
		fetcher: &'x mut dyn EntityFetcher,
	) -> EntityResolver<'x> {
		EntityResolver {
			options,
			fetcher,
			stack: Vec::new(),
		}
	}

	fn base(&self) -> Option<&str> {
		match self.stack.last() {
			Some(uri) => Some(uri.as_str()),
			None => self.options.document_uri.as_ref().map(|s| s.as_str()),
		}
	}

	/// Handle a reference to the external entity `name`.
	///
	/// Failures are logged and the entity is elided, unless strict entity
	/// handling is enabled, in which case the failure is returned.
	pub(crate) fn resolve(
		&mut self,
		name: &Name,
		id: &ExternalId,
		entities: Option<&RcPtr<EntityTable>>,
	) -> Result<()> {
		match self.try_resolve(name, id, entities) {
			Ok(()) => Ok(()),
			Err(e) if self.options.fail_on_entity_errors => Err(e.into()),
			Err(EntityError::Denied(uri)) => {
				tracing::debug!(entity = %name, uri = %uri, "external entity elided by policy");
				Ok(())
			}
			Err(e) => {
				tracing::warn!(entity = %name, error = %e, "external entity elided");
				Ok(())
			}
		}
	}

	fn try_resolve(
		&mut self,
		name: &Name,
		id: &ExternalId,
		entities: Option<&RcPtr<EntityTable>>,
	) -> std::result::Result<(), EntityError> {
		let uri = resolve_uri(self.base(), id.system_id());
		let permitted = match self.options.external_entity_policy {
			EntityPolicy::Never => false,
			EntityPolicy::Always => true,
			EntityPolicy::SameOriginOnly => {
				same_origin(self.options.document_uri.as_ref().map(|s| s.as_str()), &uri)
			}
		};
		if !permitted {
			return Err(EntityError::Denied(uri.into()));
		}
		if self.stack.len() >= MAX_ENTITY_DEPTH || self.stack.iter().any(|u| *u == uri) {
			return Err(EntityError::TooDeep(uri.into()));
		}

		tracing::debug!(entity = %name, uri = %uri, depth = self.stack.len(), "fetching external entity");
		let data = match self.fetcher.fetch(&uri) {
			Ok(data) => data,
			Err(e) => {
				return Err(EntityError::Unreachable {
					system_id: uri.into(),
					error: IOErrorWrapper::wrap(e),
				})
			}
		};

		self.stack.push(uri);
		let result = self.check_entity(&data, entities);
		let uri = self.stack.pop().unwrap_or_default();
		result.map_err(|e| EntityError::Malformed {
			system_id: uri.into(),
			error: Box::new(e),
		})
	}

	/// Parse the fetched entity in isolation, following nested external
	/// references. All events are discarded.
	fn check_entity(&mut self, data: &[u8], entities: Option<&RcPtr<EntityTable>>) -> Result<()> {
		let decoded = encoding::decode(data, None)?;
		let mut reader = EventReader::external_entity(decoded.text, entities.cloned(), self.options);
		while let Some(ev) = reader.read()? {
			if let ResolvedEvent::ExternalEntity(_, name, id) = ev {
				let table = reader.entities().cloned();
				self.resolve(&name, &id, table.as_ref())?;
			}
		}
		Ok(())
	}
}
