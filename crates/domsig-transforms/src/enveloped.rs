#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `<Signature>` element that holds the transform, together
//! with its descendants, from the node-set.

use crate::data::{node_at, TransformData};
use crate::TransformEnv;
use domsig_core::Error;

pub fn remove_signature(input: TransformData, env: &TransformEnv<'_>) -> Result<TransformData, Error> {
    let xml = match &input {
        TransformData::Octets(_) => {
            return Err(Error::Other(
                "enveloped-signature transform requires XML input".into(),
            ))
        }
        TransformData::NodeSet { xml, .. } | TransformData::Subtree { xml, .. } => xml.clone(),
    };

    let signature = match env.signature {
        Some(index) if env.is_signature_document(&xml) => index,
        _ => {
            tracing::debug!("enveloped transform on a foreign document, passing through");
            return Ok(input);
        }
    };

    let doc = domsig_xml::parse(&xml)?;
    let mut nodes = input.to_node_set(&doc)?;
    nodes.remove_subtree(node_at(&doc, signature)?);
    Ok(TransformData::NodeSet { xml, nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const XML: &str = r#"<doc><item>a</item><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo/></ds:Signature></doc>"#;

    #[test]
    fn test_signature_subtree_removed() {
        let xml: Arc<str> = Arc::from(XML);
        let doc = domsig_xml::parse(&xml).unwrap();
        let sig = doc
            .descendants()
            .find(|n| n.has_tag_name((domsig_core::ns::DSIG, "Signature")))
            .unwrap();
        let mut env = TransformEnv::for_document(Arc::clone(&xml));
        env.signature = Some(sig.id().get_usize());

        let out = remove_signature(TransformData::document(Arc::clone(&xml)), &env).unwrap();
        assert_eq!(out.into_octets().unwrap(), b"<doc><item>a</item></doc>");
    }

    #[test]
    fn test_other_documents_pass_through() {
        let env = TransformEnv::for_document(Arc::from(XML));
        let foreign = TransformData::document(XML);
        let out = remove_signature(foreign, &env).unwrap();
        assert!(matches!(out, TransformData::Subtree { root: 0, .. }));

        assert!(remove_signature(TransformData::Octets(b"x".to_vec()), &env).is_err());
    }
}
