#![forbid(unsafe_code)]

//! XPath Filtering and XPath Filter 2.0 transforms.
//!
//! The XPath Filtering transform keeps every input node for which the
//! expression is true. XPath Filter 2.0 evaluates each filter once against
//! the document, expands the selected nodes to their subtrees and combines
//! them with the running set by intersection, subtraction or union; the
//! output is the input node-set intersected with the result.

use crate::data::{node_at, TransformData};
use crate::TransformEnv;
use domsig_core::{ns, Error};
use domsig_xml::document::{find_child_element, find_child_elements, text_content};
use domsig_xml::writer::qualify;
use domsig_xml::xpath::{EvalContext, XPathExpr};
use domsig_xml::{IdRegistry, NodeSet, XmlWriter};
use roxmltree::{Document, Node};
use std::sync::Arc;

/// Prefix bound to the XPath Filter 2.0 namespace when marshalling.
pub const XPATH2_PREFIX: &str = "dsig-xpath";

/// An XPath expression with the prefix bindings it was written under.
#[derive(Debug, Clone)]
pub struct XPathFilter {
    expr: XPathExpr,
    namespaces: Vec<(String, String)>,
}

impl PartialEq for XPathFilter {
    fn eq(&self, other: &Self) -> bool {
        self.expression() == other.expression() && self.namespaces == other.namespaces
    }
}

impl XPathFilter {
    pub fn new(expression: &str) -> Result<Self, Error> {
        Ok(Self {
            expr: XPathExpr::compile(expression)?,
            namespaces: Vec::new(),
        })
    }

    /// Bind `prefix` for name tests in the expression.
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.namespaces.retain(|(p, _)| *p != prefix);
        self.namespaces.push((prefix, uri.into()));
        self
    }

    pub fn expression(&self) -> &str {
        self.expr.as_str()
    }

    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    /// Read an `<XPath>` element, capturing every prefix in scope there.
    pub fn from_node(xpath: Node<'_, '_>) -> Result<Self, Error> {
        let mut filter = Self::new(text_content(xpath).trim())?;
        for binding in xpath.namespaces() {
            if let Some(prefix) = binding.name() {
                if prefix != "xml" {
                    filter = filter.with_namespace(prefix, binding.uri());
                }
            }
        }
        Ok(filter)
    }

    /// Write `<qname>expression</qname>` declaring the captured prefixes.
    /// Bindings for `skip_prefix` are left to the enclosing element.
    fn marshal_as(
        &self,
        w: &mut XmlWriter,
        qname: &str,
        skip_prefix: &str,
        extra: &[(&str, &str)],
    ) -> Result<(), Error> {
        let decls: Vec<(String, &str)> = self
            .namespaces
            .iter()
            .filter(|(p, _)| p != skip_prefix)
            .map(|(p, u)| (format!("xmlns:{p}"), u.as_str()))
            .collect();
        let mut attrs: Vec<(&str, &str)> = decls.iter().map(|(n, u)| (n.as_str(), *u)).collect();
        attrs.extend_from_slice(extra);
        w.text_element(qname, &attrs, self.expression())
    }

    /// Write `<prefix:XPath>` for the XPath Filtering transform.
    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        self.marshal_as(w, &qualify(prefix, ns::node::XPATH), prefix, &[])
    }

    fn context<'a, 'i>(
        &self,
        doc: &'a Document<'i>,
        ids: &'a IdRegistry,
        here: Option<Node<'a, 'i>>,
    ) -> EvalContext<'a, 'i> {
        let mut ctx = EvalContext::new(doc).with_ids(ids);
        for (prefix, uri) in &self.namespaces {
            ctx = ctx.with_namespace(prefix, uri);
        }
        match here {
            Some(node) => ctx.with_here(node),
            None => ctx,
        }
    }

    /// Run the XPath Filtering transform.
    pub fn execute(
        &self,
        input: TransformData,
        env: &TransformEnv<'_>,
        position: usize,
    ) -> Result<TransformData, Error> {
        let input = into_xml(input)?;
        let xml = xml_of(&input)?;
        let nodes = {
            let doc = domsig_xml::parse(&xml)?;
            let ids = IdRegistry::build(&doc, env.id_attrs);
            let here = transform_element(&doc, env, &xml, position)
                .and_then(|t| find_child_element(t, ns::DSIG, ns::node::XPATH));
            let ctx = self.context(&doc, &ids, here);

            let mut kept = NodeSet::new();
            for node in input.to_node_set(&doc)?.nodes(&doc) {
                if self.expr.eval_bool(&ctx, node)? {
                    kept.insert(node);
                }
            }
            tracing::debug!(
                expression = self.expression(),
                kept = kept.len(),
                "XPath filter applied"
            );
            kept
        };
        Ok(TransformData::NodeSet { xml, nodes })
    }
}

// ── XPath Filter 2.0 ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XPath2Op {
    Intersect,
    Subtract,
    Union,
}

impl XPath2Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            XPath2Op::Intersect => ns::XPATH2_FILTER_INTERSECT,
            XPath2Op::Subtract => ns::XPATH2_FILTER_SUBTRACT,
            XPath2Op::Union => ns::XPATH2_FILTER_UNION,
        }
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        match value {
            ns::XPATH2_FILTER_INTERSECT => Ok(XPath2Op::Intersect),
            ns::XPATH2_FILTER_SUBTRACT => Ok(XPath2Op::Subtract),
            ns::XPATH2_FILTER_UNION => Ok(XPath2Op::Union),
            other => Err(Error::Marshal(format!("unknown XPath2 Filter value: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XPath2Filter {
    pub op: XPath2Op,
    pub filter: XPathFilter,
}

impl XPath2Filter {
    pub fn new(op: XPath2Op, filter: XPathFilter) -> Self {
        Self { op, filter }
    }

    /// Read every `dsig-xpath:XPath` child of a `<Transform>`.
    pub fn list_from_transform(transform: Node<'_, '_>) -> Result<Vec<Self>, Error> {
        let elements = find_child_elements(transform, ns::XPATH2, ns::node::XPATH);
        if elements.is_empty() {
            return Err(Error::MissingElement("XPath2 filter XPath".into()));
        }
        elements
            .into_iter()
            .map(|el| {
                let op = el
                    .attribute(ns::attr::FILTER)
                    .ok_or_else(|| Error::MissingAttribute("Filter on XPath2 XPath".into()))?;
                Ok(Self::new(XPath2Op::parse(op)?, XPathFilter::from_node(el)?))
            })
            .collect()
    }

    pub fn marshal(&self, w: &mut XmlWriter) -> Result<(), Error> {
        let xmlns = format!("xmlns:{XPATH2_PREFIX}");
        self.filter.marshal_as(
            w,
            &qualify(XPATH2_PREFIX, ns::node::XPATH),
            XPATH2_PREFIX,
            &[(xmlns.as_str(), ns::XPATH2), (ns::attr::FILTER, self.op.as_str())],
        )
    }
}

/// Run an XPath Filter 2.0 transform made of `filters`.
pub fn execute_filters(
    filters: &[XPath2Filter],
    input: TransformData,
    env: &TransformEnv<'_>,
    position: usize,
) -> Result<TransformData, Error> {
    let input = into_xml(input)?;
    let xml = xml_of(&input)?;
    let nodes = {
        let doc = domsig_xml::parse(&xml)?;
        let ids = IdRegistry::build(&doc, env.id_attrs);
        let here_elements = transform_element(&doc, env, &xml, position)
            .map(|t| find_child_elements(t, ns::XPATH2, ns::node::XPATH))
            .unwrap_or_default();

        let mut filtered = NodeSet::all(&doc, true);
        for (i, step) in filters.iter().enumerate() {
            let ctx = step.filter.context(&doc, &ids, here_elements.get(i).copied());
            let mut selected = NodeSet::new();
            for node in step.filter.expr.select(&ctx, doc.root())? {
                selected.insert_subtree(node);
            }
            filtered = match step.op {
                XPath2Op::Intersect => filtered.intersection(&selected),
                XPath2Op::Subtract => filtered.subtract(&selected),
                XPath2Op::Union => filtered.union(&selected),
            };
            tracing::debug!(
                filter = step.op.as_str(),
                expression = step.filter.expression(),
                selected = selected.len(),
                "XPath2 filter applied"
            );
        }
        input.to_node_set(&doc)?.intersection(&filtered)
    };
    Ok(TransformData::NodeSet { xml, nodes })
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Octets become a freshly parsed document with comments kept.
fn into_xml(input: TransformData) -> Result<TransformData, Error> {
    match input {
        TransformData::Octets(bytes) => Ok(TransformData::Subtree {
            xml: Arc::from(domsig_xml::bytes_to_xml_text(&bytes)?),
            root: 0,
            with_comments: true,
        }),
        xml => Ok(xml),
    }
}

fn xml_of(data: &TransformData) -> Result<Arc<str>, Error> {
    data.xml_text()
        .cloned()
        .ok_or_else(|| Error::Other("XPath input is not XML".into()))
}

/// The `<Transform>` element at `position` under the chain's owner, when
/// the data belongs to the signature document.
fn transform_element<'a, 'i>(
    doc: &'a Document<'i>,
    env: &TransformEnv<'_>,
    xml: &Arc<str>,
    position: usize,
) -> Option<Node<'a, 'i>> {
    if !env.is_signature_document(xml) {
        return None;
    }
    let owner = node_at(doc, env.transforms_owner?).ok()?;
    let transforms = find_child_element(owner, ns::DSIG, ns::node::TRANSFORMS)?;
    find_child_elements(transforms, ns::DSIG, ns::node::TRANSFORM)
        .get(position)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNED: &str = r#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><a>1</a><b><c>2</c></b><ds:Signature><ds:SignedInfo><ds:Reference URI=""><ds:Transforms><ds:Transform Algorithm="http://www.w3.org/TR/1999/REC-xpath-19991116"><ds:XPath>not(ancestor-or-self::ds:Signature)</ds:XPath></ds:Transform></ds:Transforms></ds:Reference></ds:SignedInfo></ds:Signature></doc>"#;

    #[test]
    fn test_xpath_filter_excludes_signature() {
        let xml: Arc<str> = Arc::from(SIGNED);
        let doc = domsig_xml::parse(&xml).unwrap();
        let xpath = doc.descendants().find(|n| n.has_tag_name((ns::DSIG, "XPath"))).unwrap();
        let filter = XPathFilter::from_node(xpath).unwrap();
        assert_eq!(filter.expression(), "not(ancestor-or-self::ds:Signature)");

        let env = TransformEnv::for_document(Arc::clone(&xml));
        let out = filter
            .execute(TransformData::document(Arc::clone(&xml)), &env, 0)
            .unwrap();
        assert_eq!(
            out.into_octets().unwrap(),
            br#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><a>1</a><b><c>2</c></b></doc>"#
        );
    }

    #[test]
    fn test_here_resolves_to_the_xpath_element() {
        let xml: Arc<str> = Arc::from(SIGNED);
        let doc = domsig_xml::parse(&xml).unwrap();
        let reference = doc
            .descendants()
            .find(|n| n.has_tag_name((ns::DSIG, "Reference")))
            .unwrap();
        let mut env = TransformEnv::for_document(Arc::clone(&xml));
        env.transforms_owner = Some(reference.id().get_usize());

        let filter = XPathFilter::new("count(ancestor-or-self::ds:Signature | here()/ancestor::ds:Signature[1]) > count(ancestor-or-self::ds:Signature)")
            .unwrap()
            .with_namespace("ds", ns::DSIG);
        let out = filter
            .execute(TransformData::document(Arc::clone(&xml)), &env, 0)
            .unwrap();
        assert_eq!(
            out.into_octets().unwrap(),
            br#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><a>1</a><b><c>2</c></b></doc>"#
        );

        // Without an owner here() has nothing to return.
        let bare = TransformEnv::for_document(Arc::clone(&xml));
        assert!(filter
            .execute(TransformData::document(Arc::clone(&xml)), &bare, 0)
            .is_err());
    }

    #[test]
    fn test_octets_are_parsed_with_comments() {
        let filter = XPathFilter::new("self::comment() or self::text() or self::*").unwrap();
        let env = TransformEnv::default();
        let out = filter
            .execute(TransformData::Octets(b"<r><!--c-->t</r>".to_vec()), &env, 0)
            .unwrap();
        match out {
            TransformData::NodeSet { nodes, .. } => assert_eq!(nodes.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_xpath2_subtract_and_intersect() {
        let xml: Arc<str> = Arc::from("<r><keep><x/></keep><drop><y/></drop><other/></r>");
        let env = TransformEnv::for_document(Arc::clone(&xml));
        let input = TransformData::document(Arc::clone(&xml));

        let subtract = [XPath2Filter::new(XPath2Op::Subtract, XPathFilter::new("//drop").unwrap())];
        let out = execute_filters(&subtract, input.clone(), &env, 0).unwrap();
        assert_eq!(out.into_octets().unwrap(), b"<r><keep><x></x></keep><other></other></r>");

        let intersect = [XPath2Filter::new(XPath2Op::Intersect, XPathFilter::new("//keep").unwrap())];
        let out = execute_filters(&intersect, input.clone(), &env, 0).unwrap();
        assert_eq!(out.into_octets().unwrap(), b"<keep><x></x></keep>");

        let combined = [
            XPath2Filter::new(XPath2Op::Subtract, XPathFilter::new("/r").unwrap()),
            XPath2Filter::new(XPath2Op::Union, XPathFilter::new("//y").unwrap()),
        ];
        let out = execute_filters(&combined, input, &env, 0).unwrap();
        assert_eq!(out.into_octets().unwrap(), b"<y></y>");
    }

    #[test]
    fn test_xpath2_marshal_round_trip() {
        let filter = XPath2Filter::new(
            XPath2Op::Union,
            XPathFilter::new("//p:a").unwrap().with_namespace("p", "urn:p"),
        );
        let mut w = XmlWriter::new();
        w.start_element("T", &[]).unwrap();
        filter.marshal(&mut w).unwrap();
        w.end_element("T").unwrap();
        let xml = w.into_string().unwrap();
        let doc = domsig_xml::parse(&xml).unwrap();
        let parsed = XPath2Filter::list_from_transform(doc.root_element()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].op, XPath2Op::Union);
        assert_eq!(parsed[0].filter.expression(), "//p:a");
        assert!(parsed[0]
            .filter
            .namespaces()
            .contains(&("p".to_owned(), "urn:p".to_owned())));
    }
}
