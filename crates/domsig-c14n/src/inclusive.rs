#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 and 1.1.
//!
//! Namespace declarations are rendered whenever the binding differs from the
//! one in effect at the nearest rendered ancestor. When an element is
//! rendered but its parent is not, the `xml:*` attributes of the omitted
//! ancestors are pulled onto it. Version 1.1 leaves `xml:id` alone and
//! resolves `xml:base` values against each other instead of copying the
//! nearest one.

use crate::render::{self, Attr, NsDecl, Scope};
use domsig_core::{ns, Error};
use domsig_xml::document::element_qname;
use roxmltree::{Node, NodeType};
use std::collections::BTreeMap;
use std::io::Write;

pub(crate) fn canonicalize<W: Write>(
    start: Node<'_, '_>,
    scope: Scope<'_>,
    with_comments: bool,
    version11: bool,
    out: &mut W,
) -> Result<(), Error> {
    let ctx = C14nContext {
        scope,
        with_comments,
        version11,
    };
    ctx.process_node(start, &BTreeMap::new(), out)
}

struct C14nContext<'s> {
    scope: Scope<'s>,
    with_comments: bool,
    version11: bool,
}

impl C14nContext<'_> {
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
        let mut ns_decls: Vec<NsDecl> = inscope
            .iter()
            .filter(|(prefix, uri)| rendered.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })
            .collect();
        if !inscope.contains_key("") && rendered.get("").is_some_and(|uri| !uri.is_empty()) {
            ns_decls.push(NsDecl {
                prefix: String::new(),
                uri: String::new(),
            });
        }
        ns_decls.sort();

        let mut attrs = render::element_attrs(node);
        let parent_omitted = node
            .parent()
            .map_or(true, |p| !p.is_element() || !self.scope.is_visible(p));
        if parent_omitted {
            self.inherit_xml_attrs(node, &mut attrs);
        }
        attrs.sort();

        let qname = element_qname(node);
        render::write_start_tag(out, &qname, &ns_decls, &attrs)?;
        for child in node.children() {
            self.process_node(child, &inscope, out)?;
        }
        render::write_end_tag(out, node)
    }

    /// Pull `xml:*` attributes of omitted ancestors onto `node`.
    fn inherit_xml_attrs(&self, node: Node<'_, '_>, attrs: &mut Vec<Attr>) {
        let omitted: Vec<Node<'_, '_>> = node
            .ancestors()
            .skip(1)
            .take_while(|a| a.is_element() && !self.scope.is_visible(*a))
            .collect();
        if omitted.is_empty() {
            return;
        }

        let mut inherited: BTreeMap<&str, &str> = BTreeMap::new();
        for ancestor in &omitted {
            for attr in ancestor.attributes() {
                if attr.namespace() == Some(ns::XML) {
                    inherited.entry(attr.name()).or_insert(attr.value());
                }
            }
        }

        for (name, value) in inherited {
            if self.version11 && (name == "id" || name == "base") {
                continue;
            }
            let present = attrs
                .iter()
                .any(|a| a.ns_uri == ns::XML && a.local_name == name);
            if !present {
                attrs.push(Attr::xml(name, value));
            }
        }

        if self.version11 {
            fixup_xml_base(node, &omitted, attrs);
        }
    }
}

/// Replace the element's `xml:base` with the resolution of the omitted
/// ancestors' values (outermost first) and its own.
fn fixup_xml_base(node: Node<'_, '_>, omitted: &[Node<'_, '_>], attrs: &mut Vec<Attr>) {
    let ancestor_bases: Vec<&str> = omitted
        .iter()
        .rev()
        .filter_map(|a| a.attribute((ns::XML, "base")))
        .collect();
    if ancestor_bases.is_empty() {
        return;
    }
    let own = node.attribute((ns::XML, "base"));
    let resolved = ancestor_bases
        .into_iter()
        .chain(own)
        .fold(String::new(), |base, reference| resolve_uri(&base, reference));

    attrs.retain(|a| !(a.ns_uri == ns::XML && a.local_name == "base"));
    if !resolved.is_empty() {
        attrs.push(Attr::xml("base", &resolved));
    }
}

fn has_scheme(uri: &str) -> bool {
    match uri.find(':') {
        Some(i) if i > 0 => {
            let scheme = &uri[..i];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// Split a base URI into its `scheme://authority` prefix and its path.
fn split_base(base: &str) -> (&str, &str) {
    let base = base.split(['?', '#']).next().unwrap_or(base);
    if !has_scheme(base) {
        return ("", base);
    }
    let colon = base.find(':').unwrap_or(0);
    let rest = &base[colon + 1..];
    if let Some(after) = rest.strip_prefix("//") {
        let auth_len = after.find('/').unwrap_or(after.len());
        let split = colon + 3 + auth_len;
        (&base[..split], &base[split..])
    } else {
        (&base[..=colon], rest)
    }
}

/// Resolve `reference` against `base` following RFC 3986 section 5.2.
///
/// Leading `..` segments of a relative result are preserved.
pub(crate) fn resolve_uri(base: &str, reference: &str) -> String {
    if base.is_empty() || has_scheme(reference) {
        return reference.to_owned();
    }
    if reference.is_empty() {
        return base.to_owned();
    }
    let (prefix, path) = split_base(base);
    if let Some(network) = reference.strip_prefix("//") {
        let scheme = prefix.split(':').next().unwrap_or("");
        return format!("{scheme}://{network}");
    }
    if reference.starts_with('/') {
        return format!("{prefix}{}", remove_dot_segments(reference));
    }
    if reference.starts_with('?') || reference.starts_with('#') {
        return format!("{prefix}{path}{reference}");
    }
    let dir = &path[..path.rfind('/').map_or(0, |i| i + 1)];
    let dir = if dir.is_empty() && !prefix.is_empty() && !prefix.ends_with(':') {
        "/"
    } else {
        dir
    };
    format!("{prefix}{}", remove_dot_segments(&format!("{dir}{reference}")))
}

fn remove_dot_segments(path: &str) -> String {
    let (path, suffix) = match path.find(['?', '#']) {
        Some(i) => (&path[..i], &path[i..]),
        None => (path, ""),
    };
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);
    let mut trailing_slash = false;
    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." => trailing_slash = i == last,
            ".." => {
                trailing_slash = i == last;
                match stack.last() {
                    Some(top) if *top != ".." && !top.is_empty() => {
                        stack.pop();
                    }
                    _ if !absolute => stack.push(".."),
                    _ => {}
                }
            }
            "" if i != last => {}
            s => {
                trailing_slash = false;
                stack.push(s);
            }
        }
    }
    let mut out = String::new();
    if absolute {
        out.push('/');
    }
    out.push_str(&stack.join("/"));
    if trailing_slash && !out.is_empty() && !out.ends_with('/') {
        out.push('/');
    }
    out.push_str(suffix);
    out
}
