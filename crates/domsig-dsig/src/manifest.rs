#![forbid(unsafe_code)]

//! `<Manifest>`: a list of references outside SignedInfo.

use crate::reference::Reference;
use crate::secure::SecurePolicy;
use domsig_core::{ns, Error};
use domsig_xml::document::find_child_elements;
use domsig_xml::writer::qualify;
use domsig_xml::XmlWriter;
use roxmltree::Node;

#[derive(Debug, Clone)]
pub struct Manifest {
    pub id: Option<String>,
    pub references: Vec<Reference>,
}

impl Manifest {
    pub fn new(references: Vec<Reference>) -> Result<Self, Error> {
        if references.is_empty() {
            return Err(Error::signature("Manifest needs at least one Reference"));
        }
        Ok(Self {
            id: None,
            references,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn from_node(node: Node<'_, '_>, policy: Option<&SecurePolicy>) -> Result<Self, Error> {
        let nodes = find_child_elements(node, ns::DSIG, ns::node::REFERENCE);
        if nodes.is_empty() {
            return Err(Error::Marshal("Manifest has no Reference".into()));
        }
        if let Some(policy) = policy {
            policy.check_reference_count(nodes.len(), "Manifest")?;
        }
        let references = nodes
            .into_iter()
            .map(|n| Reference::from_node(n, policy))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            references,
        })
    }

    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        let qname = qualify(prefix, ns::node::MANIFEST);
        let mut attrs = Vec::new();
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id.as_str()));
        }
        w.start_element(&qname, &attrs)?;
        for reference in &self.references {
            reference.marshal(w, prefix)?;
        }
        w.end_element(&qname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domsig_core::algorithm;
    use domsig_crypto::DigestMethod;

    fn manifest_xml(count: usize) -> String {
        let refs: String = (0..count)
            .map(|i| {
                format!(
                    r##"<ds:Reference URI="#r{i}"><ds:DigestMethod Algorithm="{}"/><ds:DigestValue>AA==</ds:DigestValue></ds:Reference>"##,
                    algorithm::SHA1
                )
            })
            .collect();
        format!(r#"<ds:Manifest xmlns:ds="{}" Id="m">{refs}</ds:Manifest>"#, ns::DSIG)
    }

    #[test]
    fn test_reference_limit() {
        let policy = SecurePolicy::default();
        let xml = manifest_xml(31);
        let doc = domsig_xml::parse(&xml).unwrap();
        assert!(matches!(
            Manifest::from_node(doc.root_element(), Some(&policy)),
            Err(Error::SecureValidation(_))
        ));
        let manifest = Manifest::from_node(doc.root_element(), None).unwrap();
        assert_eq!(manifest.references.len(), 31);
        assert_eq!(manifest.id.as_deref(), Some("m"));

        let xml = manifest_xml(30);
        let doc = domsig_xml::parse(&xml).unwrap();
        assert!(Manifest::from_node(doc.root_element(), Some(&policy)).is_ok());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(Manifest::new(Vec::new()), Err(Error::Signature { .. })));
        let xml = manifest_xml(0);
        let doc = domsig_xml::parse(&xml).unwrap();
        assert!(matches!(
            Manifest::from_node(doc.root_element(), None),
            Err(Error::Marshal(_))
        ));
        assert!(Manifest::new(vec![Reference::new("#x", DigestMethod::Sha256)]).is_ok());
    }
}
