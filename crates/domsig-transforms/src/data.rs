#![forbid(unsafe_code)]

//! Data flowing through dereferencing and the transform chain.

use domsig_c14n::{C14nMode, Selection};
use domsig_core::Error;
use domsig_xml::NodeSet;
use roxmltree::{Document, NodeId};
use std::io::Write;
use std::sync::Arc;

/// The value passed between transforms.
///
/// XML variants carry the source text they index into. Node indices are
/// roxmltree ids, which are stable for a given text, so every consumer can
/// re-parse the text and resolve them.
#[derive(Debug, Clone)]
pub enum TransformData {
    /// An explicit document subset.
    NodeSet { xml: Arc<str>, nodes: NodeSet },
    /// A node and all of its descendants. `root` is 0 for the whole
    /// document. Comment nodes are part of the data only when
    /// `with_comments` is set.
    Subtree {
        xml: Arc<str>,
        root: usize,
        with_comments: bool,
    },
    /// An octet stream.
    Octets(Vec<u8>),
}

/// Whether a value is XML or octets, without the value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Xml,
    Octets,
}

impl TransformData {
    /// The whole of `xml`, comments excluded.
    pub fn document(xml: impl Into<Arc<str>>) -> Self {
        TransformData::Subtree {
            xml: xml.into(),
            root: 0,
            with_comments: false,
        }
    }

    pub fn kind(&self) -> DataKind {
        match self {
            TransformData::Octets(_) => DataKind::Octets,
            _ => DataKind::Xml,
        }
    }

    /// The XML source text, if this is an XML value.
    pub fn xml_text(&self) -> Option<&Arc<str>> {
        match self {
            TransformData::NodeSet { xml, .. } | TransformData::Subtree { xml, .. } => Some(xml),
            TransformData::Octets(_) => None,
        }
    }

    /// The node-set this value stands for, resolved against `doc` (which
    /// must be the parse of this value's XML text).
    pub fn to_node_set(&self, doc: &Document<'_>) -> Result<NodeSet, Error> {
        match self {
            TransformData::NodeSet { nodes, .. } => Ok(nodes.clone()),
            TransformData::Subtree {
                root,
                with_comments,
                ..
            } => Ok(NodeSet::tree(node_at(doc, *root)?, *with_comments)),
            TransformData::Octets(_) => Err(Error::Other("octets are not a node-set".into())),
        }
    }

    /// Canonicalize this value with `mode` into `out`.
    ///
    /// Octets are parsed as a complete document first. A subtree whose
    /// comments were removed at dereference time is canonicalized without
    /// comments whatever the mode says.
    pub fn canonicalize_into<W: Write>(
        &self,
        mode: C14nMode,
        inclusive_prefixes: &[String],
        out: &mut W,
    ) -> Result<(), Error> {
        match self {
            TransformData::Octets(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    Error::Canonicalization(format!("octets are not UTF-8 XML: {e}"))
                })?;
                let doc = domsig_xml::parse(text)
                    .map_err(|e| Error::Canonicalization(format!("octets are not XML: {e}")))?;
                domsig_c14n::canonicalize(&doc, mode, Selection::Document, inclusive_prefixes, out)
            }
            TransformData::Subtree {
                xml,
                root,
                with_comments,
            } => {
                let doc = domsig_xml::parse(xml)?;
                let mode = if *with_comments {
                    mode
                } else {
                    mode.without_comments()
                };
                let selection = Selection::Subtree(node_at(&doc, *root)?);
                domsig_c14n::canonicalize(&doc, mode, selection, inclusive_prefixes, out)
            }
            TransformData::NodeSet { xml, nodes } => {
                let doc = domsig_xml::parse(xml)?;
                domsig_c14n::canonicalize(&doc, mode, Selection::Set(nodes), inclusive_prefixes, out)
            }
        }
    }

    /// Write the octet form of this value: octets as they are, XML through
    /// Canonical XML 1.0 without comments.
    pub fn write_octets<W: Write>(&self, out: &mut W) -> Result<(), Error> {
        match self {
            TransformData::Octets(bytes) => {
                out.write_all(bytes)?;
                Ok(())
            }
            _ => self.canonicalize_into(C14nMode::Inclusive, &[], out),
        }
    }

    pub fn into_octets(self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Octets(bytes) => Ok(bytes),
            other => {
                let mut out = Vec::new();
                other.write_octets(&mut out)?;
                Ok(out)
            }
        }
    }
}

/// Resolve a node index against `doc`.
pub(crate) fn node_at<'a, 'i>(
    doc: &'a Document<'i>,
    index: usize,
) -> Result<roxmltree::Node<'a, 'i>, Error> {
    u32::try_from(index)
        .ok()
        .and_then(|idx| doc.get_node(NodeId::new(idx)))
        .ok_or_else(|| Error::Other(format!("node index {index} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_canonicalization_drops_comments() {
        let data = TransformData::Subtree {
            xml: Arc::from("<r><!--c--><a b='1'/></r>"),
            root: 0,
            with_comments: true,
        };
        assert_eq!(data.into_octets().unwrap(), b"<r><a b=\"1\"></a></r>");
    }

    #[test]
    fn test_downgrade_for_comment_free_subtree() {
        let data = TransformData::document("<r><!--c--></r>");
        let mut out = Vec::new();
        data.canonicalize_into(C14nMode::InclusiveWithComments, &[], &mut out)
            .unwrap();
        assert_eq!(out, b"<r></r>");
    }

    #[test]
    fn test_octets_must_be_xml_for_canonicalization() {
        let data = TransformData::Octets(b"not <xml".to_vec());
        let mut out = Vec::new();
        assert!(matches!(
            data.canonicalize_into(C14nMode::Inclusive, &[], &mut out),
            Err(Error::Canonicalization(_))
        ));
        assert_eq!(data.kind(), DataKind::Octets);
    }
}
