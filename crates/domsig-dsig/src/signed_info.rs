#![forbid(unsafe_code)]

//! `<SignedInfo>`.

use crate::reference::Reference;
use crate::secure::SecurePolicy;
use domsig_core::{ns, Error};
use domsig_crypto::SignatureMethod;
use domsig_transforms::CanonicalizationMethod;
use domsig_xml::document::{find_child_element, find_child_elements, text_content};
use domsig_xml::writer::qualify;
use domsig_xml::XmlWriter;
use roxmltree::Node;

#[derive(Debug, Clone)]
pub struct SignedInfo {
    pub id: Option<String>,
    pub canonicalization: CanonicalizationMethod,
    pub signature_method: SignatureMethod,
    /// `HMACOutputLength` in bits.
    pub hmac_output_length: Option<u32>,
    pub references: Vec<Reference>,
}

impl SignedInfo {
    pub fn new(
        canonicalization: CanonicalizationMethod,
        signature_method: SignatureMethod,
        references: Vec<Reference>,
    ) -> Result<Self, Error> {
        if references.is_empty() {
            return Err(Error::signature("SignedInfo needs at least one Reference"));
        }
        Ok(Self {
            id: None,
            canonicalization,
            signature_method,
            hmac_output_length: None,
            references,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_hmac_output_length(mut self, bits: u32) -> Self {
        self.hmac_output_length = Some(bits);
        self
    }

    pub fn from_node(node: Node<'_, '_>, policy: Option<&SecurePolicy>) -> Result<Self, Error> {
        let c14n_node = find_child_element(node, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
            .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
        let canonicalization = CanonicalizationMethod::from_node(c14n_node)?;

        let method_node = find_child_element(node, ns::DSIG, ns::node::SIGNATURE_METHOD)
            .ok_or_else(|| Error::MissingElement("SignatureMethod".into()))?;
        let method_uri = method_node
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on SignatureMethod".into()))?;
        let signature_method = SignatureMethod::from_uri(method_uri)?;
        let hmac_output_length =
            match find_child_element(method_node, ns::DSIG, ns::node::HMAC_OUTPUT_LENGTH) {
                Some(n) => {
                    let text = text_content(n);
                    Some(text.trim().parse::<u32>().map_err(|_| {
                        Error::Marshal(format!("HMACOutputLength is not a number: {text:?}"))
                    })?)
                }
                None => None,
            };

        let nodes = find_child_elements(node, ns::DSIG, ns::node::REFERENCE);
        if nodes.is_empty() {
            return Err(Error::Marshal("SignedInfo has no Reference".into()));
        }
        if let Some(policy) = policy {
            policy.check_algorithm(method_uri)?;
            policy.check_reference_count(nodes.len(), "SignedInfo")?;
        }
        let references = nodes
            .into_iter()
            .map(|n| Reference::from_node(n, policy))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            canonicalization,
            signature_method,
            hmac_output_length,
            references,
        })
    }

    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        let qname = qualify(prefix, ns::node::SIGNED_INFO);
        let mut attrs = Vec::new();
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id.as_str()));
        }
        w.start_element(&qname, &attrs)?;
        self.canonicalization
            .marshal(w, &qualify(prefix, ns::node::CANONICALIZATION_METHOD))?;

        let method = qualify(prefix, ns::node::SIGNATURE_METHOD);
        let method_attrs = [(ns::attr::ALGORITHM, self.signature_method.uri())];
        match self.hmac_output_length {
            Some(bits) => {
                w.start_element(&method, &method_attrs)?;
                w.text_element(
                    &qualify(prefix, ns::node::HMAC_OUTPUT_LENGTH),
                    &[],
                    &bits.to_string(),
                )?;
                w.end_element(&method)?;
            }
            None => w.empty_element(&method, &method_attrs)?,
        }

        for reference in &self.references {
            reference.marshal(w, prefix)?;
        }
        w.end_element(&qname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domsig_c14n::C14nMode;
    use domsig_core::algorithm;
    use domsig_crypto::DigestMethod;

    #[test]
    fn test_empty_references_rejected() {
        let err = SignedInfo::new(
            CanonicalizationMethod::new(C14nMode::Exclusive),
            SignatureMethod::RsaSha256,
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Signature { .. }));

        let xml = format!(
            r#"<ds:SignedInfo xmlns:ds="{}"><ds:CanonicalizationMethod Algorithm="{}"/><ds:SignatureMethod Algorithm="{}"/></ds:SignedInfo>"#,
            ns::DSIG,
            algorithm::C14N,
            algorithm::RSA_SHA256
        );
        let doc = domsig_xml::parse(&xml).unwrap();
        assert!(matches!(
            SignedInfo::from_node(doc.root_element(), None),
            Err(Error::Marshal(_))
        ));
    }

    #[test]
    fn test_marshal_round_trip_with_hmac_length() {
        let si = SignedInfo::new(
            CanonicalizationMethod::new(C14nMode::Exclusive).with_prefixes(["ds", "soap"]),
            SignatureMethod::HmacSha256,
            vec![Reference::new("", DigestMethod::Sha256)],
        )
        .unwrap()
        .with_id("si")
        .with_hmac_output_length(256);

        let mut w = XmlWriter::new();
        w.start_element("ds:X", &[("xmlns:ds", ns::DSIG)]).unwrap();
        si.marshal(&mut w, "ds").unwrap();
        w.end_element("ds:X").unwrap();
        let text = w.into_string().unwrap();
        let doc = domsig_xml::parse(&text).unwrap();
        let parsed =
            SignedInfo::from_node(doc.root_element().first_element_child().unwrap(), None).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("si"));
        assert_eq!(parsed.canonicalization, si.canonicalization);
        assert_eq!(parsed.signature_method, SignatureMethod::HmacSha256);
        assert_eq!(parsed.hmac_output_length, Some(256));
        assert_eq!(parsed.references[0].uri.as_deref(), Some(""));
    }

    #[test]
    fn test_weak_method_rejected_under_policy() {
        let xml = format!(
            r#"<ds:SignedInfo xmlns:ds="{}"><ds:CanonicalizationMethod Algorithm="{}"/><ds:SignatureMethod Algorithm="{}"/><ds:Reference URI=""><ds:DigestMethod Algorithm="{}"/><ds:DigestValue/></ds:Reference></ds:SignedInfo>"#,
            ns::DSIG,
            algorithm::C14N,
            algorithm::HMAC_MD5,
            algorithm::SHA256
        );
        let doc = domsig_xml::parse(&xml).unwrap();
        let policy = SecurePolicy::default();
        assert!(matches!(
            SignedInfo::from_node(doc.root_element(), Some(&policy)),
            Err(Error::SecureValidation(_))
        ));
        assert!(SignedInfo::from_node(doc.root_element(), None).is_ok());
    }
}
