#![forbid(unsafe_code)]

//! XML document support for the domsig XML Signature engine.
//!
//! Everything here works on top of `roxmltree`: a per-document ID registry,
//! node-sets over tree nodes, a self-contained XPath 1.0 evaluator and a
//! small `quick-xml` backed writer used for marshalling.

pub mod document;
pub mod nodeset;
pub mod writer;
pub mod xpath;

pub use document::IdRegistry;
pub use nodeset::NodeSet;
pub use writer::XmlWriter;

use domsig_core::Error;

/// Return roxmltree parsing options that allow DTD.
///
/// roxmltree never fetches external entities, so internal subsets are safe
/// to accept and some signed documents carry one.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse `text` with [`parsing_options`].
pub fn parse(text: &str) -> Result<roxmltree::Document<'_>, Error> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))
}

/// Parse raw bytes as UTF-8 XML into an owned string.
pub fn bytes_to_xml_text(data: &[u8]) -> Result<String, Error> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
    parse(text)?;
    Ok(text.to_owned())
}
