#![forbid(unsafe_code)]

//! Canonicalization as a method and as a transform.
//!
//! The same type backs `<CanonicalizationMethod>` in SignedInfo and a
//! canonicalization `<Transform>`; only the element name differs.

use crate::data::TransformData;
use domsig_c14n::C14nMode;
use domsig_core::{ns, Error};
use domsig_xml::document::find_child_element;
use domsig_xml::XmlWriter;
use roxmltree::Node;
use std::io::Write;

/// Prefix bound to the exclusive C14N namespace when marshalling.
const EC_PREFIX: &str = "ec";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalizationMethod {
    pub mode: C14nMode,
    /// The `InclusiveNamespaces` PrefixList. Only meaningful for the
    /// exclusive modes; `Some(vec![])` marshals an empty PrefixList.
    pub inclusive_prefixes: Option<Vec<String>>,
}

impl CanonicalizationMethod {
    pub fn new(mode: C14nMode) -> Self {
        Self {
            mode,
            inclusive_prefixes: None,
        }
    }

    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inclusive_prefixes = Some(prefixes.into_iter().map(Into::into).collect());
        self
    }

    pub fn algorithm(&self) -> &'static str {
        self.mode.uri()
    }

    /// Read from any element carrying a C14N `Algorithm` attribute.
    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let uri = node
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute(format!("Algorithm on {}", node.tag_name().name())))?;
        Self::from_uri_and_node(uri, node)
    }

    pub(crate) fn from_uri_and_node(uri: &str, node: Node<'_, '_>) -> Result<Self, Error> {
        let mode = C14nMode::from_uri(uri)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("canonicalization: {uri}")))?;
        let inclusive_prefixes = if mode.is_exclusive() {
            find_child_element(node, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES).map(|inc| {
                inc.attribute(ns::attr::PREFIX_LIST)
                    .unwrap_or("")
                    .split_whitespace()
                    .map(str::to_owned)
                    .collect()
            })
        } else {
            None
        };
        Ok(Self {
            mode,
            inclusive_prefixes,
        })
    }

    /// Write `<qname Algorithm="…">` with its InclusiveNamespaces child.
    pub fn marshal(&self, w: &mut XmlWriter, qname: &str) -> Result<(), Error> {
        let attrs = [(ns::attr::ALGORITHM, self.algorithm())];
        match &self.inclusive_prefixes {
            Some(prefixes) if self.mode.is_exclusive() => {
                w.start_element(qname, &attrs)?;
                let list = prefixes.join(" ");
                let xmlns = format!("xmlns:{EC_PREFIX}");
                w.empty_element(
                    &format!("{EC_PREFIX}:{}", ns::node::INCLUSIVE_NAMESPACES),
                    &[(xmlns.as_str(), ns::EXC_C14N), (ns::attr::PREFIX_LIST, &list)],
                )?;
                w.end_element(qname)
            }
            _ => w.empty_element(qname, &attrs),
        }
    }

    /// Canonicalize `data` into `out`.
    pub fn canonicalize<W: Write>(&self, data: &TransformData, out: &mut W) -> Result<(), Error> {
        let prefixes = self.inclusive_prefixes.as_deref().unwrap_or(&[]);
        data.canonicalize_into(self.mode, prefixes, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn parse_method(xml: &str) -> CanonicalizationMethod {
        let doc = domsig_xml::parse(xml).unwrap();
        CanonicalizationMethod::from_node(doc.root_element()).unwrap()
    }

    #[test]
    fn test_prefix_list_parsing() {
        let m = parse_method(&format!(
            r#"<M Algorithm="{}"><ec:InclusiveNamespaces xmlns:ec="{}" PrefixList="a  #default b"/></M>"#,
            domsig_core::algorithm::EXC_C14N,
            ns::EXC_C14N
        ));
        assert_eq!(m.mode, C14nMode::Exclusive);
        assert_eq!(
            m.inclusive_prefixes,
            Some(vec!["a".to_owned(), "#default".to_owned(), "b".to_owned()])
        );

        let m = parse_method(&format!(
            r#"<M Algorithm="{}"/>"#,
            domsig_core::algorithm::C14N11_WITH_COMMENTS
        ));
        assert_eq!(m.mode, C14nMode::Inclusive11WithComments);
        assert_eq!(m.inclusive_prefixes, None);
    }

    #[test]
    fn test_unknown_algorithm() {
        let doc = domsig_xml::parse(r#"<M Algorithm="urn:nope"/>"#).unwrap();
        assert!(matches!(
            CanonicalizationMethod::from_node(doc.root_element()),
            Err(Error::UnsupportedAlgorithm(_))
        ));
        let doc = domsig_xml::parse("<M/>").unwrap();
        assert!(matches!(
            CanonicalizationMethod::from_node(doc.root_element()),
            Err(Error::MissingAttribute(_))
        ));
    }

    #[test]
    fn test_empty_and_omitted_prefix_list_agree() {
        let xml: Arc<str> =
            Arc::from(r#"<r xmlns:a="urn:a" xmlns:b="urn:b"><a:x Id="t"><y/></a:x></r>"#);
        let doc = domsig_xml::parse(&xml).unwrap();
        let target = doc
            .descendants()
            .find(|n| n.has_tag_name("x"))
            .unwrap()
            .id()
            .get_usize();
        let data = TransformData::Subtree {
            xml: Arc::clone(&xml),
            root: target,
            with_comments: false,
        };

        let omitted = CanonicalizationMethod::new(C14nMode::Exclusive);
        let empty = CanonicalizationMethod::new(C14nMode::Exclusive).with_prefixes(Vec::<String>::new());
        let mut a = Vec::new();
        let mut b = Vec::new();
        omitted.canonicalize(&data, &mut a).unwrap();
        empty.canonicalize(&data, &mut b).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, br#"<a:x xmlns:a="urn:a" Id="t"><y></y></a:x>"#);
    }

    #[test]
    fn test_marshal_round_trip() {
        let m = CanonicalizationMethod::new(C14nMode::ExclusiveWithComments).with_prefixes(["ds", "xs"]);
        let mut w = XmlWriter::new();
        m.marshal(&mut w, "CanonicalizationMethod").unwrap();
        let xml = w.into_string().unwrap();
        assert_eq!(parse_method(&xml), m);

        let plain = CanonicalizationMethod::new(C14nMode::Inclusive);
        let mut w = XmlWriter::new();
        plain.marshal(&mut w, "CanonicalizationMethod").unwrap();
        assert_eq!(parse_method(&w.into_string().unwrap()), plain);
    }
}
