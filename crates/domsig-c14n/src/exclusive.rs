#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0.
//!
//! Only visibly utilized namespace bindings are rendered: the prefix of the
//! element name, the prefixes of its attributes and the prefixes named in
//! the `InclusiveNamespaces` PrefixList (`#default` for the default
//! namespace). A binding is rendered when it differs from the one in
//! effect at the nearest rendered ancestor. No `xml:*` attributes are
//! inherited.

use crate::render::{self, NsDecl, Scope};
use domsig_core::Error;
use domsig_xml::document::{attribute_prefix, element_prefix, element_qname};
use roxmltree::{Node, NodeType};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

pub(crate) fn canonicalize<W: Write>(
    start: Node<'_, '_>,
    scope: Scope<'_>,
    with_comments: bool,
    inclusive_prefixes: &[String],
    out: &mut W,
) -> Result<(), Error> {
    let inclusive_prefixes = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { String::new() } else { p.clone() })
        .collect();
    let ctx = ExcC14nContext {
        scope,
        with_comments,
        inclusive_prefixes,
    };
    ctx.process_node(start, &BTreeMap::new(), out)
}

struct ExcC14nContext<'s> {
    scope: Scope<'s>,
    with_comments: bool,
    /// "" stands for the default namespace.
    inclusive_prefixes: BTreeSet<String>,
}

impl ExcC14nContext<'_> {
    fn process_node<W: Write>(
        &self,
        node: Node<'_, '_>,
        rendered: &BTreeMap<String, String>,
        out: &mut W,
    ) -> Result<(), Error> {
        match node.node_type() {
            NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, rendered, out)?;
                }
                Ok(())
            }
            NodeType::Element => self.process_element(node, rendered, out),
            _ => render::write_leaf(out, node, self.scope, self.with_comments),
        }
    }

    fn visibly_utilized(&self, node: Node<'_, '_>) -> BTreeSet<String> {
        let mut utilized = self.inclusive_prefixes.clone();
        utilized.insert(element_prefix(node).unwrap_or("").to_owned());
        let doc = node.document();
        for attr in node.attributes() {
            if let Some(prefix) = attribute_prefix(doc, &attr) {
                utilized.insert(prefix.to_owned());
            }
        }
        utilized.remove("xml");
        utilized
    }

    fn process_element<W: Write>(
        &self,
        node: Node<'_, '_>,
        rendered: &BTreeMap<String, String>,
        out: &mut W,
    ) -> Result<(), Error> {
        if !self.scope.is_visible(node) {
            for child in node.children() {
                self.process_node(child, rendered, out)?;
            }
            return Ok(());
        }

        let inscope = render::inscope_namespaces(node);
        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in self.visibly_utilized(node) {
            match inscope.get(&prefix) {
                Some(uri) if rendered.get(&prefix) != Some(uri) => ns_decls.push(NsDecl {
                    prefix,
                    uri: uri.clone(),
                }),
                None if prefix.is_empty()
                    && rendered.get("").is_some_and(|uri| !uri.is_empty()) =>
                {
                    ns_decls.push(NsDecl {
                        prefix,
                        uri: String::new(),
                    })
                }
                _ => {}
            }
        }
        ns_decls.sort();

        let mut attrs = render::element_attrs(node);
        attrs.sort();

        let qname = element_qname(node);
        render::write_start_tag(out, &qname, &ns_decls, &attrs)?;

        let mut child_rendered = rendered.clone();
        for decl in ns_decls {
            child_rendered.insert(decl.prefix, decl.uri);
        }
        for child in node.children() {
            self.process_node(child, &child_rendered, out)?;
        }
        render::write_end_tag(out, node)
    }
}
