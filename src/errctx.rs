// Static context strings attached to errors. They describe where in the
// grammar an error occurred and are meant for humans only.

pub const ERRCTX_UNKNOWN: &str = "in unknown context";
pub const ERRCTX_TEXT: &str = "in text node";
pub const ERRCTX_CDATA_SECTION: &str = "in CDATA section";
pub const ERRCTX_COMMENT: &str = "in comment";
pub const ERRCTX_PI: &str = "in processing instruction";
pub const ERRCTX_NAME: &str = "in name";
pub const ERRCTX_ATTNAME: &str = "in attribute name";
pub const ERRCTX_ATTVAL: &str = "in attribute value";
pub const ERRCTX_ELEMENT: &str = "in element";
pub const ERRCTX_ELEMENT_FOOT: &str = "in element footer";
pub const ERRCTX_ELEMENT_CLOSE: &str = "at element close";
pub const ERRCTX_XML_DECL: &str = "in XML declaration";
pub const ERRCTX_XML_DECL_START: &str = "at start of XML declaration";
pub const ERRCTX_DOCTYPE: &str = "in DOCTYPE declaration";
pub const ERRCTX_INTERNAL_SUBSET: &str = "in internal DTD subset";
pub const ERRCTX_ENTITY_DECL: &str = "in entity declaration";
pub const ERRCTX_REF: &str = "in entity or character reference";
pub const ERRCTX_ENTITY: &str = "in entity replacement text";
pub const ERRCTX_DOCBEGIN: &str = "before document element";
pub const ERRCTX_DOCEND: &str = "after document element";
