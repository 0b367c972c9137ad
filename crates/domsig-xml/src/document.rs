#![forbid(unsafe_code)]

//! Document helpers: ID registration, element lookup and prefix recovery.

use domsig_core::ns;
use roxmltree::{Document, Node, NodeId};
use std::collections::{HashMap, HashSet};

/// Attribute names always treated as IDs (unqualified).
const DEFAULT_ID_ATTRS: [&str; 3] = ["Id", "ID", "id"];

/// ID → element mapping for one parsed document.
///
/// A registry is built per sign or validate call and never shared between
/// documents. When an ID value occurs on more than one element the first
/// element in document order wins and the value is recorded as duplicated.
#[derive(Debug, Clone, Default)]
pub struct IdRegistry {
    ids: HashMap<String, NodeId>,
    duplicates: HashSet<String>,
}

impl IdRegistry {
    /// Scan `doc` for `Id`, `ID`, `id`, `xml:id` and every name in `extra_attrs`.
    ///
    /// Extra names written as `prefix:local` are matched against the
    /// attribute's qualified name as written in the source; plain names
    /// match unqualified attributes only.
    pub fn build(doc: &Document<'_>, extra_attrs: &[String]) -> Self {
        let mut registry = IdRegistry::default();
        let text = doc.input_text();
        for node in doc.descendants().filter(|n| n.is_element()) {
            for attr in node.attributes() {
                let is_id = match attr.namespace() {
                    None => {
                        DEFAULT_ID_ATTRS.contains(&attr.name())
                            || extra_attrs.iter().any(|x| x == attr.name())
                    }
                    Some(uri) if uri == ns::XML => attr.name() == "id",
                    Some(_) => {
                        let qname = &text[attr.range_qname()];
                        extra_attrs.iter().any(|x| x.contains(':') && x == qname)
                    }
                };
                if is_id {
                    registry.register(attr.value(), node.id());
                }
            }
        }
        registry
    }

    /// Register an ID explicitly.
    pub fn register(&mut self, id: &str, node: NodeId) {
        match self.ids.get(id) {
            Some(existing) if *existing != node => {
                tracing::debug!(id, "duplicate ID value, keeping first occurrence");
                self.duplicates.insert(id.to_owned());
            }
            Some(_) => {}
            None => {
                self.ids.insert(id.to_owned(), node);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Resolve `id` to its element in `doc`.
    pub fn lookup<'a, 'input>(
        &self,
        doc: &'a Document<'input>,
        id: &str,
    ) -> Option<Node<'a, 'input>> {
        self.get(id).and_then(|nid| doc.get_node(nid))
    }

    /// True when `id` was declared on more than one element.
    pub fn is_duplicate(&self, id: &str) -> bool {
        self.duplicates.contains(id)
    }

    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ── Element lookup ───────────────────────────────────────────────────

/// True if `node` is an element with the given namespace and local name.
pub fn is_element(node: Node<'_, '_>, ns_uri: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns_uri
}

/// Find the first descendant element with the given namespace and local name.
pub fn find_element<'a, 'input>(
    doc: &'a Document<'input>,
    ns_uri: &str,
    local_name: &str,
) -> Option<Node<'a, 'input>> {
    doc.descendants().find(|n| is_element(*n, ns_uri, local_name))
}

pub fn find_child_element<'a, 'input>(
    parent: Node<'a, 'input>,
    ns_uri: &str,
    local_name: &str,
) -> Option<Node<'a, 'input>> {
    parent.children().find(|n| is_element(*n, ns_uri, local_name))
}

pub fn find_child_elements<'a, 'input>(
    parent: Node<'a, 'input>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<Node<'a, 'input>> {
    parent
        .children()
        .filter(|n| is_element(*n, ns_uri, local_name))
        .collect()
}

/// Iterate over element children only.
pub fn element_children<'a, 'input>(
    parent: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    parent.children().filter(|n| n.is_element())
}

/// Concatenation of all descendant text nodes (the XPath string-value).
pub fn text_content(node: Node<'_, '_>) -> String {
    if node.is_text() || node.is_comment() {
        return node.text().unwrap_or("").to_owned();
    }
    let mut out = String::new();
    for d in node.descendants().filter(|d| d.is_text()) {
        out.push_str(d.text().unwrap_or(""));
    }
    out
}

// ── Prefix recovery ──────────────────────────────────────────────────

/// The prefix an element was written with, if any.
///
/// roxmltree only keeps expanded names, so the prefix is read back from the
/// source text at the element's start tag.
pub fn element_prefix<'input>(node: Node<'_, 'input>) -> Option<&'input str> {
    if !node.is_element() {
        return None;
    }
    let text = node.document().input_text();
    let tag = text.get(node.range().start + 1..)?;
    let end = tag
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(tag.len());
    let qname = &tag[..end];
    qname.split_once(':').map(|(prefix, _)| prefix)
}

/// The qualified name an element was written with.
pub fn element_qname(node: Node<'_, '_>) -> String {
    match element_prefix(node) {
        Some(prefix) => format!("{prefix}:{}", node.tag_name().name()),
        None => node.tag_name().name().to_owned(),
    }
}

/// The prefix an attribute was written with, if any.
pub fn attribute_prefix<'input>(
    doc: &Document<'input>,
    attr: &roxmltree::Attribute<'_, 'input>,
) -> Option<&'input str> {
    attr.namespace()?;
    let qname = doc.input_text().get(attr.range_qname())?;
    qname.split_once(':').map(|(prefix, _)| prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_registry_defaults_and_xml_id() {
        let xml = r#"<r xmlns:w="urn:w"><a Id="one"/><b xml:id="two"/><c w:Id="three"/></r>"#;
        let doc = crate::parse(xml).unwrap();
        let reg = IdRegistry::build(&doc, &[]);
        assert_eq!(reg.lookup(&doc, "one").unwrap().tag_name().name(), "a");
        assert_eq!(reg.lookup(&doc, "two").unwrap().tag_name().name(), "b");
        assert!(reg.lookup(&doc, "three").is_none());

        let reg = IdRegistry::build(&doc, &["w:Id".to_owned()]);
        assert_eq!(reg.lookup(&doc, "three").unwrap().tag_name().name(), "c");
    }

    #[test]
    fn test_duplicate_ids_first_wins() {
        let xml = r#"<r><a Id="x"/><b Id="x"/></r>"#;
        let doc = crate::parse(xml).unwrap();
        let reg = IdRegistry::build(&doc, &[]);
        assert!(reg.is_duplicate("x"));
        assert!(reg.has_duplicates());
        assert_eq!(reg.lookup(&doc, "x").unwrap().tag_name().name(), "a");
    }

    #[test]
    fn test_prefix_recovery() {
        let xml = r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:p="urn:p" p:a="1"><SignedInfo xmlns="urn:x"/></ds:Signature>"#;
        let doc = crate::parse(xml).unwrap();
        let root = doc.root_element();
        assert_eq!(element_prefix(root), Some("ds"));
        assert_eq!(element_qname(root), "ds:Signature");
        let child = root.first_element_child().unwrap();
        assert_eq!(element_prefix(child), None);
        let attr = root.attributes().next().unwrap();
        assert_eq!(attribute_prefix(&doc, &attr), Some("p"));
    }

    #[test]
    fn test_text_content() {
        let doc = crate::parse("<a>x<b>y</b><!--c-->z</a>").unwrap();
        assert_eq!(text_content(doc.root_element()), "xyz");
    }
}
