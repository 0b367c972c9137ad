#![forbid(unsafe_code)]

//! `<Object>` and the `<SignatureProperties>` it may carry.

use crate::manifest::Manifest;
use crate::secure::SecurePolicy;
use domsig_core::{ns, Error};
use domsig_xml::document::{element_children, is_element};
use domsig_xml::writer::qualify;
use domsig_xml::XmlWriter;
use roxmltree::Node;

#[derive(Debug, Clone, Default)]
pub struct XmlObject {
    pub id: Option<String>,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    pub content: Vec<ObjectContent>,
}

#[derive(Debug, Clone)]
pub enum ObjectContent {
    Manifest(Manifest),
    SignatureProperties(SignatureProperties),
    /// Markup or text kept exactly as written.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureProperties {
    pub id: Option<String>,
    pub properties: Vec<SignatureProperty>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureProperty {
    /// URI of the Signature this property applies to.
    pub target: String,
    pub id: Option<String>,
    /// Serialized content.
    pub content: String,
}

impl XmlObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_content(mut self, content: ObjectContent) -> Self {
        self.content.push(content);
        self
    }

    /// Manifests directly inside this Object, in order.
    pub fn manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.content.iter().filter_map(|c| match c {
            ObjectContent::Manifest(m) => Some(m),
            _ => None,
        })
    }

    pub fn manifests_mut(&mut self) -> impl Iterator<Item = &mut Manifest> {
        self.content.iter_mut().filter_map(|c| match c {
            ObjectContent::Manifest(m) => Some(m),
            _ => None,
        })
    }

    pub fn from_node(node: Node<'_, '_>, policy: Option<&SecurePolicy>) -> Result<Self, Error> {
        let mut content = Vec::new();
        for child in node.children() {
            if is_element(child, ns::DSIG, ns::node::MANIFEST) {
                content.push(ObjectContent::Manifest(Manifest::from_node(child, policy)?));
            } else if is_element(child, ns::DSIG, ns::node::SIGNATURE_PROPERTIES) {
                content.push(ObjectContent::SignatureProperties(
                    SignatureProperties::from_node(child)?,
                ));
            } else if !(child.is_text() && child.text().is_some_and(|t| t.trim().is_empty())) {
                content.push(ObjectContent::Raw(source_of(child)?.to_owned()));
            }
        }
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            mime_type: node.attribute(ns::attr::MIME_TYPE).map(str::to_owned),
            encoding: node.attribute(ns::attr::ENCODING).map(str::to_owned),
            content,
        })
    }

    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        let qname = qualify(prefix, ns::node::OBJECT);
        let mut attrs = Vec::new();
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id.as_str()));
        }
        if let Some(m) = &self.mime_type {
            attrs.push((ns::attr::MIME_TYPE, m.as_str()));
        }
        if let Some(e) = &self.encoding {
            attrs.push((ns::attr::ENCODING, e.as_str()));
        }
        w.start_element(&qname, &attrs)?;
        for item in &self.content {
            match item {
                ObjectContent::Manifest(m) => m.marshal(w, prefix)?,
                ObjectContent::SignatureProperties(p) => p.marshal(w, prefix)?,
                ObjectContent::Raw(markup) => w.write_raw(markup)?,
            }
        }
        w.end_element(&qname)
    }
}

impl SignatureProperties {
    pub fn new(properties: Vec<SignatureProperty>) -> Result<Self, Error> {
        if properties.is_empty() {
            return Err(Error::signature(
                "SignatureProperties needs at least one SignatureProperty",
            ));
        }
        Ok(Self {
            id: None,
            properties,
        })
    }

    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let properties = element_children(node)
            .filter(|c| is_element(*c, ns::DSIG, ns::node::SIGNATURE_PROPERTY))
            .map(SignatureProperty::from_node)
            .collect::<Result<Vec<_>, _>>()?;
        if properties.is_empty() {
            return Err(Error::Marshal("SignatureProperties has no SignatureProperty".into()));
        }
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            properties,
        })
    }

    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        let qname = qualify(prefix, ns::node::SIGNATURE_PROPERTIES);
        let mut attrs = Vec::new();
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id.as_str()));
        }
        w.start_element(&qname, &attrs)?;
        for property in &self.properties {
            property.marshal(w, prefix)?;
        }
        w.end_element(&qname)
    }
}

impl SignatureProperty {
    pub fn new(target: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            id: None,
            content: content.into(),
        }
    }

    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let target = node
            .attribute(ns::attr::TARGET)
            .ok_or_else(|| Error::MissingAttribute("Target on SignatureProperty".into()))?;
        let content = match (node.first_child(), node.last_child()) {
            (Some(first), Some(last)) => node
                .document()
                .input_text()
                .get(first.range().start..last.range().end)
                .ok_or_else(|| Error::Marshal("SignatureProperty range out of bounds".into()))?
                .to_owned(),
            _ => String::new(),
        };
        Ok(Self {
            target: target.to_owned(),
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            content,
        })
    }

    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        let qname = qualify(prefix, ns::node::SIGNATURE_PROPERTY);
        let mut attrs = vec![(ns::attr::TARGET, self.target.as_str())];
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id.as_str()));
        }
        w.start_element(&qname, &attrs)?;
        w.write_raw(&self.content)?;
        w.end_element(&qname)
    }
}

fn source_of<'i>(node: Node<'_, 'i>) -> Result<&'i str, Error> {
    node.document()
        .input_text()
        .get(node.range())
        .ok_or_else(|| Error::Marshal("Object content range out of bounds".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domsig_core::algorithm;

    #[test]
    fn test_object_content_kinds() {
        let xml = format!(
            r##"<ds:Object xmlns:ds="{dsig}" Id="obj" MimeType="text/xml">
  <data a="1">payload &amp; more</data>
  <ds:Manifest Id="m"><ds:Reference URI="#x"><ds:DigestMethod Algorithm="{sha}"/><ds:DigestValue>AA==</ds:DigestValue></ds:Reference></ds:Manifest>
  <ds:SignatureProperties><ds:SignatureProperty Target="#sig" Id="p"><when>2024</when></ds:SignatureProperty></ds:SignatureProperties>
</ds:Object>"##,
            dsig = ns::DSIG,
            sha = algorithm::SHA256
        );
        let doc = domsig_xml::parse(&xml).unwrap();
        let object = XmlObject::from_node(doc.root_element(), None).unwrap();
        assert_eq!(object.id.as_deref(), Some("obj"));
        assert_eq!(object.mime_type.as_deref(), Some("text/xml"));
        assert_eq!(object.content.len(), 3);
        assert!(matches!(
            &object.content[0],
            ObjectContent::Raw(s) if s == r#"<data a="1">payload &amp; more</data>"#
        ));
        assert_eq!(object.manifests().count(), 1);
        let ObjectContent::SignatureProperties(props) = &object.content[2] else {
            panic!("expected SignatureProperties");
        };
        assert_eq!(
            props.properties[0],
            SignatureProperty {
                target: "#sig".into(),
                id: Some("p".into()),
                content: "<when>2024</when>".into(),
            }
        );

        let mut w = XmlWriter::new();
        w.start_element("root", &[("xmlns:ds", ns::DSIG)]).unwrap();
        object.marshal(&mut w, "ds").unwrap();
        w.end_element("root").unwrap();
        let text = w.into_string().unwrap();
        let doc = domsig_xml::parse(&text).unwrap();
        let again =
            XmlObject::from_node(doc.root_element().first_element_child().unwrap(), None).unwrap();
        assert_eq!(again.content.len(), 3);
        assert!(matches!(&again.content[0], ObjectContent::Raw(s) if s.contains("&amp;")));
    }

    #[test]
    fn test_signature_property_requires_target() {
        let xml = format!(
            r#"<ds:SignatureProperties xmlns:ds="{}"><ds:SignatureProperty/></ds:SignatureProperties>"#,
            ns::DSIG
        );
        let doc = domsig_xml::parse(&xml).unwrap();
        assert!(matches!(
            SignatureProperties::from_node(doc.root_element()),
            Err(Error::MissingAttribute(_))
        ));
        assert!(SignatureProperties::new(Vec::new()).is_err());
    }
}
