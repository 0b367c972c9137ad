#![forbid(unsafe_code)]

//! `<KeyInfo>`: key names, inline public keys and `<RetrievalMethod>`.

use crate::secure::SecurePolicy;
use domsig_core::{ns, Error};
use domsig_keys::keyvalue::{parse_key_value, parse_key_value_content, write_key_value};
use domsig_keys::Key;
use domsig_transforms::{chain, uri, Transform, TransformData, TransformEnv};
use domsig_xml::document::{element_children, find_child_element, text_content};
use domsig_xml::writer::qualify;
use domsig_xml::XmlWriter;
use roxmltree::{Node, NodeId};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct KeyInfo {
    pub id: Option<String>,
    pub items: Vec<KeyInfoItem>,
}

#[derive(Debug, Clone)]
pub enum KeyInfoItem {
    KeyName(String),
    KeyValue(Key),
    RetrievalMethod(RetrievalMethod),
    /// Any other child, kept as written.
    Raw(String),
}

/// What a `<RetrievalMethod>` pointed at once resolved.
#[derive(Debug, Clone)]
pub enum Retrieved {
    Key(Key),
    KeyName(String),
}

#[derive(Debug, Clone)]
pub struct RetrievalMethod {
    pub uri: String,
    pub ret_type: Option<String>,
    pub transforms: Vec<Transform>,
    /// Filled in by [`KeyInfo::resolve_retrieval_methods`].
    resolved: Option<Retrieved>,
}

impl KeyInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_key_name(mut self, name: impl Into<String>) -> Self {
        self.items.push(KeyInfoItem::KeyName(name.into()));
        self
    }

    /// Add the public part of `key` as a `<KeyValue>`.
    pub fn with_key_value(mut self, key: &Key) -> Self {
        self.items.push(KeyInfoItem::KeyValue(key.public_only()));
        self
    }

    pub fn with_retrieval_method(mut self, method: RetrievalMethod) -> Self {
        self.items.push(KeyInfoItem::RetrievalMethod(method));
        self
    }

    /// Key names, direct and retrieved, in document order.
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            KeyInfoItem::KeyName(name) => Some(name.as_str()),
            KeyInfoItem::RetrievalMethod(rm) => match rm.resolved() {
                Some(Retrieved::KeyName(name)) => Some(name.as_str()),
                _ => None,
            },
            _ => None,
        })
    }

    /// Inline and retrieved public keys, in document order.
    pub fn key_values(&self) -> impl Iterator<Item = &Key> {
        self.items.iter().filter_map(|item| match item {
            KeyInfoItem::KeyValue(key) => Some(key),
            KeyInfoItem::RetrievalMethod(rm) => match rm.resolved() {
                Some(Retrieved::Key(key)) => Some(key),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let mut key_info = KeyInfo {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            items: Vec::new(),
        };
        for child in element_children(node) {
            let item = match (child.tag_name().namespace(), child.tag_name().name()) {
                (Some(ns::DSIG), ns::node::KEY_NAME) => {
                    KeyInfoItem::KeyName(text_content(child).trim().to_owned())
                }
                (Some(ns::DSIG), ns::node::KEY_VALUE) => match parse_key_value(child) {
                    Ok(key) => KeyInfoItem::KeyValue(key),
                    Err(Error::UnsupportedAlgorithm(kind)) => {
                        tracing::debug!(%kind, "keeping unsupported KeyValue as raw XML");
                        KeyInfoItem::Raw(source_of(child)?)
                    }
                    Err(e) => return Err(e),
                },
                (Some(ns::DSIG), ns::node::RETRIEVAL_METHOD) => {
                    KeyInfoItem::RetrievalMethod(RetrievalMethod::from_node(child)?)
                }
                _ => KeyInfoItem::Raw(source_of(child)?),
            };
            key_info.items.push(item);
        }
        Ok(key_info)
    }

    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        let qname = qualify(prefix, ns::node::KEY_INFO);
        let mut attrs = Vec::new();
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id.as_str()));
        }
        w.start_element(&qname, &attrs)?;
        for item in &self.items {
            match item {
                KeyInfoItem::KeyName(name) => {
                    w.text_element(&qualify(prefix, ns::node::KEY_NAME), &[], name)?
                }
                KeyInfoItem::KeyValue(key) => write_key_value(w, prefix, key)?,
                KeyInfoItem::RetrievalMethod(rm) => rm.marshal(w, prefix)?,
                KeyInfoItem::Raw(markup) => w.write_raw(markup)?,
            }
        }
        w.end_element(&qname)
    }

    /// Resolve every `<RetrievalMethod>` against the document holding the
    /// signature. `node` is this KeyInfo's element in `doc`, which must be
    /// the parse of `env.document`.
    pub fn resolve_retrieval_methods(
        &mut self,
        node: Node<'_, '_>,
        env: &TransformEnv<'_>,
        policy: Option<&SecurePolicy>,
    ) -> Result<(), Error> {
        for (item, child) in self.items.iter_mut().zip(element_children(node)) {
            if let KeyInfoItem::RetrievalMethod(rm) = item {
                if rm.resolved.is_none() {
                    let mut visited = HashSet::new();
                    let found = rm.retrieve(child.id(), env, policy, &mut visited)?;
                    rm.resolved = Some(found);
                }
            }
        }
        Ok(())
    }
}

// ── RetrievalMethod ──────────────────────────────────────────────────

impl RetrievalMethod {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ret_type: None,
            transforms: Vec::new(),
            resolved: None,
        }
    }

    pub fn with_type(mut self, ret_type: impl Into<String>) -> Self {
        self.ret_type = Some(ret_type.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn resolved(&self) -> Option<&Retrieved> {
        self.resolved.as_ref()
    }

    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let uri = node
            .attribute(ns::attr::URI)
            .ok_or_else(|| Error::MissingAttribute("URI on RetrievalMethod".into()))?;
        let transforms = match find_child_element(node, ns::DSIG, ns::node::TRANSFORMS) {
            Some(list) => element_children(list)
                .map(Transform::from_node)
                .collect::<Result<_, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            uri: uri.to_owned(),
            ret_type: node.attribute(ns::attr::TYPE).map(str::to_owned),
            transforms,
            resolved: None,
        })
    }

    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        let qname = qualify(prefix, ns::node::RETRIEVAL_METHOD);
        let mut attrs = vec![(ns::attr::URI, self.uri.as_str())];
        if let Some(t) = &self.ret_type {
            attrs.push((ns::attr::TYPE, t.as_str()));
        }
        if self.transforms.is_empty() {
            return w.empty_element(&qname, &attrs);
        }
        w.start_element(&qname, &attrs)?;
        let list = qualify(prefix, ns::node::TRANSFORMS);
        w.start_element(&list, &[])?;
        for transform in &self.transforms {
            transform.marshal(w, prefix)?;
        }
        w.end_element(&list)?;
        w.end_element(&qname)
    }

    /// Dereference, transform and interpret the target. `element` is this
    /// RetrievalMethod's node in the document being dereferenced.
    fn retrieve(
        &self,
        element: NodeId,
        env: &TransformEnv<'_>,
        policy: Option<&SecurePolicy>,
        visited: &mut HashSet<String>,
    ) -> Result<Retrieved, Error> {
        if !visited.insert(self.uri.clone()) {
            return Err(Error::SecureValidation(format!(
                "RetrievalMethod loop through {}",
                self.uri
            )));
        }
        let mut local = env.clone();
        local.transforms_owner = Some(element.get_usize());
        let data = uri::dereference(&self.uri, &local)?;
        let data = chain::apply(&self.transforms, data, &local, 0)?;
        tracing::debug!(uri = %self.uri, "resolved RetrievalMethod");

        let (xml, root) = match &data {
            TransformData::Subtree { xml, root, .. } => (xml.clone(), Some(*root)),
            TransformData::NodeSet { xml, nodes } => (xml.clone(), nodes.indices().next()),
            TransformData::Octets(bytes) => {
                let text = domsig_xml::bytes_to_xml_text(bytes)?;
                (text.into(), Some(0))
            }
        };
        let doc = domsig_xml::parse(&xml)?;
        let target = root
            .and_then(|idx| u32::try_from(idx).ok())
            .and_then(|idx| doc.get_node(NodeId::new(idx)))
            .and_then(first_element)
            .ok_or_else(|| {
                Error::KeyNotFound(format!("RetrievalMethod {} selects no element", self.uri))
            })?;

        match (target.tag_name().namespace(), target.tag_name().name()) {
            (Some(ns::DSIG), ns::node::RETRIEVAL_METHOD) => {
                if policy.is_some_and(|p| p.forbid_retrieval_method_chains) {
                    tracing::warn!(uri = %self.uri, "RetrievalMethod points at another RetrievalMethod");
                    return Err(Error::SecureValidation(format!(
                        "RetrievalMethod {} points at another RetrievalMethod",
                        self.uri
                    )));
                }
                let next = RetrievalMethod::from_node(target)?;
                let mut next_env = env.clone();
                next_env.document = Some(xml.clone());
                next.retrieve(target.id(), &next_env, policy, visited)
            }
            (Some(ns::DSIG), ns::node::KEY_VALUE) => Ok(Retrieved::Key(parse_key_value(target)?)),
            (Some(ns::DSIG), ns::node::KEY_NAME) => {
                Ok(Retrieved::KeyName(text_content(target).trim().to_owned()))
            }
            _ => parse_key_value_content(target).map(Retrieved::Key),
        }
    }
}

/// `node` itself when it is an element, else its first element child
/// (for document roots).
fn first_element<'a, 'i>(node: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    if node.is_element() {
        Some(node)
    } else {
        element_children(node).next()
    }
}

fn source_of(node: Node<'_, '_>) -> Result<String, Error> {
    node.document()
        .input_text()
        .get(node.range())
        .map(str::to_owned)
        .ok_or_else(|| Error::Marshal(format!("{} range out of bounds", node.tag_name().name())))
}

/// Locate the KeyInfo element under a parsed Signature element.
pub(crate) fn key_info_element<'a, 'i>(signature: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    find_child_element(signature, ns::DSIG, ns::node::KEY_INFO)
}
