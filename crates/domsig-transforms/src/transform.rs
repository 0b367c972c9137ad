#![forbid(unsafe_code)]

//! The closed set of transforms a `<Transform>` element can name.

use crate::c14n_method::CanonicalizationMethod;
use crate::data::{DataKind, TransformData};
use crate::xpath_filter::{execute_filters, XPath2Filter, XPathFilter};
use crate::xslt::XsltTransform;
use crate::{base64_transform, enveloped, TransformEnv};
use domsig_c14n::C14nMode;
use domsig_core::{algorithm, ns, Error};
use domsig_xml::document::find_child_element;
use domsig_xml::writer::qualify;
use domsig_xml::XmlWriter;
use roxmltree::Node;
use std::io::Write;

#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Base64,
    EnvelopedSignature,
    XPath(XPathFilter),
    XPath2(Vec<XPath2Filter>),
    Xslt(XsltTransform),
    Canonicalization(CanonicalizationMethod),
}

impl Transform {
    pub fn c14n(mode: C14nMode) -> Self {
        Transform::Canonicalization(CanonicalizationMethod::new(mode))
    }

    /// Parse a `<Transform>` element. Unknown algorithms are rejected.
    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let uri = node
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on Transform".into()))?;
        match uri {
            algorithm::BASE64 => Ok(Transform::Base64),
            algorithm::ENVELOPED_SIGNATURE => Ok(Transform::EnvelopedSignature),
            algorithm::XPATH => {
                let xpath = find_child_element(node, ns::DSIG, ns::node::XPATH)
                    .ok_or_else(|| Error::MissingElement("XPath".into()))?;
                Ok(Transform::XPath(XPathFilter::from_node(xpath)?))
            }
            algorithm::XPATH2 => Ok(Transform::XPath2(XPath2Filter::list_from_transform(node)?)),
            algorithm::XSLT => Ok(Transform::Xslt(XsltTransform::from_transform(node)?)),
            other if C14nMode::from_uri(other).is_some() => Ok(Transform::Canonicalization(
                CanonicalizationMethod::from_uri_and_node(other, node)?,
            )),
            other => Err(Error::UnsupportedAlgorithm(format!("transform: {other}"))),
        }
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            Transform::Base64 => algorithm::BASE64,
            Transform::EnvelopedSignature => algorithm::ENVELOPED_SIGNATURE,
            Transform::XPath(_) => algorithm::XPATH,
            Transform::XPath2(_) => algorithm::XPATH2,
            Transform::Xslt(_) => algorithm::XSLT,
            Transform::Canonicalization(m) => m.algorithm(),
        }
    }

    pub fn is_xpath(&self) -> bool {
        matches!(self, Transform::XPath(_) | Transform::XPath2(_))
    }

    /// Forbidden under secure validation.
    pub fn is_weak(&self) -> bool {
        matches!(self, Transform::Xslt(_))
    }

    /// The kind of data this transform produces, whatever it is given.
    pub fn output_kind(&self, _input: DataKind) -> DataKind {
        match self {
            Transform::Base64 | Transform::Xslt(_) | Transform::Canonicalization(_) => {
                DataKind::Octets
            }
            Transform::EnvelopedSignature | Transform::XPath(_) | Transform::XPath2(_) => {
                DataKind::Xml
            }
        }
    }

    /// Write `<prefix:Transform>` with its parameters.
    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        let qname = qualify(prefix, ns::node::TRANSFORM);
        let attrs = [(ns::attr::ALGORITHM, self.algorithm())];
        match self {
            Transform::Base64 | Transform::EnvelopedSignature => w.empty_element(&qname, &attrs),
            Transform::Canonicalization(method) => method.marshal(w, &qname),
            Transform::XPath(filter) => {
                w.start_element(&qname, &attrs)?;
                filter.marshal(w, prefix)?;
                w.end_element(&qname)
            }
            Transform::XPath2(filters) => {
                w.start_element(&qname, &attrs)?;
                for filter in filters {
                    filter.marshal(w)?;
                }
                w.end_element(&qname)
            }
            Transform::Xslt(xslt) => {
                w.start_element(&qname, &attrs)?;
                w.write_raw(xslt.stylesheet())?;
                w.end_element(&qname)
            }
        }
    }

    /// Run the transform. `position` is this transform's index in its
    /// `<Transforms>` list.
    pub fn execute(
        &self,
        input: TransformData,
        env: &TransformEnv<'_>,
        position: usize,
    ) -> Result<TransformData, Error> {
        match self {
            Transform::Base64 => base64_transform::decode(&input),
            Transform::EnvelopedSignature => enveloped::remove_signature(input, env),
            Transform::XPath(filter) => filter.execute(input, env, position),
            Transform::XPath2(filters) => execute_filters(filters, input, env, position),
            Transform::Xslt(xslt) => xslt.execute(input, env),
            Transform::Canonicalization(method) => {
                let mut out = Vec::new();
                method.canonicalize(&input, &mut out)?;
                Ok(TransformData::Octets(out))
            }
        }
    }

    /// Run the transform and write its octet form into `out`.
    ///
    /// Canonicalization streams straight into the sink; XML results of the
    /// other transforms go through the implicit Canonical XML 1.0.
    pub fn execute_into<W: Write>(
        &self,
        input: TransformData,
        env: &TransformEnv<'_>,
        position: usize,
        out: &mut W,
    ) -> Result<(), Error> {
        match self {
            Transform::Canonicalization(method) => method.canonicalize(&input, out),
            _ => self.execute(input, env, position)?.write_octets(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transforms_xml(body: &str) -> String {
        format!(
            r#"<ds:Transforms xmlns:ds="{}" xmlns:ec="{}">{body}</ds:Transforms>"#,
            ns::DSIG,
            ns::EXC_C14N
        )
    }

    fn parse_all(xml: &str) -> Result<Vec<Transform>, Error> {
        let doc = domsig_xml::parse(xml).unwrap();
        doc.root_element()
            .children()
            .filter(|n| n.is_element())
            .map(Transform::from_node)
            .collect()
    }

    #[test]
    fn test_marshal_round_trip_preserves_order() {
        let list = vec![
            Transform::EnvelopedSignature,
            Transform::XPath(
                XPathFilter::new("not(ancestor-or-self::ds:Signature)")
                    .unwrap()
                    .with_namespace("ds", ns::DSIG),
            ),
            Transform::Base64,
            Transform::Canonicalization(
                CanonicalizationMethod::new(C14nMode::Exclusive).with_prefixes(["ds"]),
            ),
            Transform::c14n(C14nMode::Inclusive11),
        ];
        let mut w = XmlWriter::new();
        w.start_element("ds:Transforms", &[("xmlns:ds", ns::DSIG)]).unwrap();
        for t in &list {
            t.marshal(&mut w, "ds").unwrap();
        }
        w.end_element("ds:Transforms").unwrap();
        let parsed = parse_all(&w.into_string().unwrap()).unwrap();
        assert_eq!(parsed, list);
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let xml = transforms_xml(r#"<ds:Transform Algorithm="urn:unknown"/>"#);
        assert!(matches!(parse_all(&xml), Err(Error::UnsupportedAlgorithm(_))));
        let xml = transforms_xml(&format!(
            r#"<ds:Transform Algorithm="{}"/>"#,
            algorithm::XPATH
        ));
        assert!(matches!(parse_all(&xml), Err(Error::MissingElement(_))));
    }

    #[test]
    fn test_output_kinds() {
        assert_eq!(Transform::Base64.output_kind(DataKind::Xml), DataKind::Octets);
        assert_eq!(
            Transform::EnvelopedSignature.output_kind(DataKind::Xml),
            DataKind::Xml
        );
        assert_eq!(
            Transform::c14n(C14nMode::Inclusive).output_kind(DataKind::Octets),
            DataKind::Octets
        );
        assert!(Transform::Xslt(XsltTransform::new("<x/>")).is_weak());
    }
}
