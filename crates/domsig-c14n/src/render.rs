#![forbid(unsafe_code)]

//! Rendering pieces shared by the inclusive and exclusive serializers.

use crate::escape;
use domsig_core::{ns, Error};
use domsig_xml::document::{attribute_prefix, element_qname};
use domsig_xml::NodeSet;
use roxmltree::{Node, NodeType};
use std::collections::BTreeMap;
use std::io::Write;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NsDecl {
    /// "" for the default namespace.
    pub prefix: String,
    pub uri: String,
}

impl NsDecl {
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), Error> {
        if self.prefix.is_empty() {
            out.write_all(b" xmlns=\"")?;
        } else {
            write!(out, " xmlns:{}=\"", self.prefix)?;
        }
        escape::write_attr(out, &self.uri)?;
        out.write_all(b"\"")?;
        Ok(())
    }
}

// Default namespace first, then by prefix.
impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.prefix.cmp(&other.prefix)
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attr {
    /// "" when the attribute has no namespace.
    pub ns_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn xml(local_name: &str, value: &str) -> Self {
        Attr {
            ns_uri: ns::XML.to_owned(),
            local_name: local_name.to_owned(),
            qualified_name: format!("xml:{local_name}"),
            value: value.to_owned(),
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), Error> {
        write!(out, " {}=\"", self.qualified_name)?;
        escape::write_attr(out, &self.value)?;
        out.write_all(b"\"")?;
        Ok(())
    }
}

// Unqualified attributes first, then by (namespace URI, local name).
impl Ord for Attr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ns_uri
            .cmp(&other.ns_uri)
            .then_with(|| self.local_name.cmp(&other.local_name))
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Which nodes of the document are rendered.
#[derive(Clone, Copy)]
pub(crate) enum Scope<'s> {
    All,
    /// A subtree: node indices `first..=last`.
    Range(usize, usize),
    Set(&'s NodeSet),
}

impl Scope<'_> {
    pub fn is_visible(&self, node: Node<'_, '_>) -> bool {
        let idx = node.id().get_usize();
        match self {
            Scope::All => true,
            Scope::Range(first, last) => (*first..=*last).contains(&idx),
            Scope::Set(set) => set.contains_index(idx),
        }
    }
}

/// In-scope namespace bindings of `node`, excluding `xml` and undeclarations.
pub(crate) fn inscope_namespaces(node: Node<'_, '_>) -> BTreeMap<String, String> {
    node.namespaces()
        .filter(|ns| ns.name() != Some("xml") && !ns.uri().is_empty())
        .map(|ns| (ns.name().unwrap_or("").to_owned(), ns.uri().to_owned()))
        .collect()
}

/// The attribute axis of `node`, unsorted.
pub(crate) fn element_attrs(node: Node<'_, '_>) -> Vec<Attr> {
    let doc = node.document();
    node.attributes()
        .map(|attr| {
            let qualified_name = match attribute_prefix(doc, &attr) {
                Some(prefix) => format!("{prefix}:{}", attr.name()),
                None => attr.name().to_owned(),
            };
            Attr {
                ns_uri: attr.namespace().unwrap_or("").to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name,
                value: attr.value().to_owned(),
            }
        })
        .collect()
}

/// Write `<qname ns-decls attrs>`.
pub(crate) fn write_start_tag<W: Write>(
    out: &mut W,
    qname: &str,
    ns_decls: &[NsDecl],
    attrs: &[Attr],
) -> Result<(), Error> {
    write!(out, "<{qname}")?;
    for decl in ns_decls {
        decl.write_to(out)?;
    }
    for attr in attrs {
        attr.write_to(out)?;
    }
    out.write_all(b">")?;
    Ok(())
}

pub(crate) fn write_end_tag<W: Write>(out: &mut W, node: Node<'_, '_>) -> Result<(), Error> {
    write!(out, "</{}>", element_qname(node))?;
    Ok(())
}

/// Render a text, comment or processing-instruction node.
///
/// Comments and PIs that are children of the root node are separated from
/// the document element by a line feed.
pub(crate) fn write_leaf<W: Write>(
    out: &mut W,
    node: Node<'_, '_>,
    scope: Scope<'_>,
    with_comments: bool,
) -> Result<(), Error> {
    if !scope.is_visible(node) {
        return Ok(());
    }
    match node.node_type() {
        NodeType::Text => {
            escape::write_text(out, node.text().unwrap_or(""))?;
        }
        NodeType::Comment if with_comments => {
            let top_level = at_document_level(node);
            if top_level && node.prev_siblings().skip(1).any(|s| s.is_element()) {
                out.write_all(b"\n")?;
            }
            write!(out, "<!--{}-->", node.text().unwrap_or(""))?;
            if top_level && node.next_siblings().skip(1).any(|s| s.is_element()) {
                out.write_all(b"\n")?;
            }
        }
        NodeType::PI => {
            let Some(pi) = node.pi() else {
                return Ok(());
            };
            let top_level = at_document_level(node);
            if top_level && node.prev_siblings().skip(1).any(|s| s.is_element()) {
                out.write_all(b"\n")?;
            }
            write!(out, "<?{}", pi.target)?;
            if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
                out.write_all(b" ")?;
                escape::write_pi(out, value)?;
            }
            out.write_all(b"?>")?;
            if top_level && node.next_siblings().skip(1).any(|s| s.is_element()) {
                out.write_all(b"\n")?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn at_document_level(node: Node<'_, '_>) -> bool {
    node.parent()
        .is_some_and(|p| p.node_type() == NodeType::Root)
}
