#![forbid(unsafe_code)]

//! XML Canonicalization for the domsig XML Signature engine.
//!
//! Implements the six W3C canonicalization variants:
//! - Canonical XML 1.0 (with and without comments)
//! - Canonical XML 1.1 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)
//!
//! Output is written to any `std::io::Write` sink, so it can be fed straight
//! into a digest without building the canonical form in memory.

pub mod escape;
mod exclusive;
mod inclusive;
mod render;

use domsig_core::{algorithm, Error};
use domsig_xml::NodeSet;
use render::Scope;
use roxmltree::{Document, Node, NodeType};
use std::io::Write;

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Canonical XML 1.1
    Inclusive11,
    /// Canonical XML 1.1 with comments
    Inclusive11WithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Inclusive11 => algorithm::C14N11,
            Self::Inclusive11WithComments => algorithm::C14N11_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::C14N11 => Some(Self::Inclusive11),
            algorithm::C14N11_WITH_COMMENTS => Some(Self::Inclusive11WithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(
            self,
            Self::InclusiveWithComments
                | Self::Inclusive11WithComments
                | Self::ExclusiveWithComments
        )
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }

    pub fn is_11(&self) -> bool {
        matches!(self, Self::Inclusive11 | Self::Inclusive11WithComments)
    }

    /// The same algorithm with comment nodes dropped.
    pub fn without_comments(&self) -> Self {
        match self {
            Self::InclusiveWithComments => Self::Inclusive,
            Self::Inclusive11WithComments => Self::Inclusive11,
            Self::ExclusiveWithComments => Self::Exclusive,
            other => *other,
        }
    }
}

/// The part of a document to canonicalize.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'s, 'a, 'i> {
    /// Every node of the document.
    Document,
    /// An element (or the root node) and all of its descendants.
    Subtree(Node<'a, 'i>),
    /// An explicit document subset.
    Set(&'s NodeSet),
}

/// Canonicalize `selection` of `doc` into `out`.
///
/// `inclusive_prefixes` is the `InclusiveNamespaces` PrefixList and is only
/// consulted by the exclusive modes; an empty list and an absent one are
/// the same thing.
pub fn canonicalize<W: Write>(
    doc: &Document<'_>,
    mode: C14nMode,
    selection: Selection<'_, '_, '_>,
    inclusive_prefixes: &[String],
    out: &mut W,
) -> Result<(), Error> {
    let (start, scope) = match selection {
        Selection::Document => (doc.root(), Scope::All),
        Selection::Subtree(root) if root.node_type() == NodeType::Root => (root, Scope::All),
        Selection::Subtree(root) => {
            let first = root.id().get_usize();
            let last = root
                .descendants()
                .last()
                .map_or(first, |n| n.id().get_usize());
            (root, Scope::Range(first, last))
        }
        Selection::Set(set) => (doc.root(), Scope::Set(set)),
    };
    tracing::trace!(algorithm = mode.uri(), "canonicalizing");

    if mode.is_exclusive() {
        exclusive::canonicalize(start, scope, mode.with_comments(), inclusive_prefixes, out)
    } else {
        inclusive::canonicalize(start, scope, mode.with_comments(), mode.is_11(), out)
    }
}

/// Canonicalize into a fresh buffer.
pub fn canonicalize_to_vec(
    doc: &Document<'_>,
    mode: C14nMode,
    selection: Selection<'_, '_, '_>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    canonicalize(doc, mode, selection, inclusive_prefixes, &mut out)?;
    Ok(out)
}

/// Parse `xml` and canonicalize the whole document.
pub fn canonicalize_str(
    xml: &str,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let doc = domsig_xml::parse(xml)?;
    canonicalize_to_vec(&doc, mode, Selection::Document, inclusive_prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_uri_roundtrip() {
        for mode in [
            C14nMode::Inclusive,
            C14nMode::InclusiveWithComments,
            C14nMode::Inclusive11,
            C14nMode::Inclusive11WithComments,
            C14nMode::Exclusive,
            C14nMode::ExclusiveWithComments,
        ] {
            assert_eq!(C14nMode::from_uri(mode.uri()), Some(mode));
            assert!(!mode.without_comments().with_comments());
        }
        assert_eq!(C14nMode::from_uri("urn:nope"), None);
    }

    #[test]
    fn test_empty_elements_are_expanded() {
        let out = canonicalize_str("<a><b/></a>", C14nMode::Inclusive, &[]).unwrap();
        assert_eq!(out, b"<a><b></b></a>");
    }

    #[test]
    fn test_streaming_matches_buffered() {
        struct Chunked(Vec<Vec<u8>>);
        impl Write for Chunked {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.push(buf.to_vec());
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let xml = r#"<r xmlns:p="urn:p" a="x&amp;y"><p:c>t&lt;</p:c></r>"#;
        let doc = domsig_xml::parse(xml).unwrap();
        let mut sink = Chunked(Vec::new());
        canonicalize(&doc, C14nMode::Exclusive, Selection::Document, &[], &mut sink).unwrap();
        let streamed: Vec<u8> = sink.0.concat();
        let buffered =
            canonicalize_to_vec(&doc, C14nMode::Exclusive, Selection::Document, &[]).unwrap();
        assert_eq!(streamed, buffered);
        assert!(sink.0.len() > 1);
    }
}
