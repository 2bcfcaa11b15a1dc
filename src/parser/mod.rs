/*!
# Parser stages

[`RawParser`] assembles tokens into the document structure and expands
internal entities. [`NamespaceResolver`] sits on top and resolves element
and attribute names against the namespace declarations in scope.
*/
mod common;
pub mod namespaces;
pub mod raw;

pub use common::*;
pub use namespaces::{Attributes, ElementName, NamespaceName, NamespaceResolver, ResolvedEvent};
pub use raw::{RawEvent, RawParser};

pub use crate::lexer::XMLVersion;
