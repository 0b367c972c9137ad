#![forbid(unsafe_code)]

//! Base64 decode transform.

use crate::data::{node_at, TransformData};
use base64::Engine;
use domsig_core::Error;
use domsig_xml::document::text_content;

/// Decode the base64 text carried by `input`.
///
/// XML input contributes the string value of its text nodes; octets are
/// taken as UTF-8 text. Whitespace is dropped before decoding.
pub fn decode(input: &TransformData) -> Result<TransformData, Error> {
    let text = match input {
        TransformData::Octets(bytes) => std::str::from_utf8(bytes)
            .map_err(|e| Error::Base64(format!("input is not UTF-8: {e}")))?
            .to_owned(),
        TransformData::Subtree { xml, root, .. } => {
            let doc = domsig_xml::parse(xml)?;
            text_content(node_at(&doc, *root)?)
        }
        TransformData::NodeSet { xml, nodes } => {
            let doc = domsig_xml::parse(xml)?;
            nodes
                .nodes(&doc)
                .into_iter()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect()
        }
    };

    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| Error::Base64(format!("decode error: {e}")))?;
    tracing::debug!(decoded_len = decoded.len(), "base64 transform");
    Ok(TransformData::Octets(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domsig_xml::NodeSet;
    use std::sync::Arc;

    #[test]
    fn test_subtree_text_is_decoded() {
        let xml: Arc<str> = Arc::from("<r><data Id=\"d\">aGVs\n  bG8=<!--x--></data></r>");
        let doc = domsig_xml::parse(&xml).unwrap();
        let data = doc.descendants().find(|n| n.has_tag_name("data")).unwrap();
        let input = TransformData::Subtree {
            xml: Arc::clone(&xml),
            root: data.id().get_usize(),
            with_comments: false,
        };
        assert!(matches!(decode(&input).unwrap(), TransformData::Octets(b) if b == b"hello"));
    }

    #[test]
    fn test_node_set_only_uses_selected_text() {
        let xml: Arc<str> = Arc::from("<r><a>aGk=</a><b>!!!</b></r>");
        let doc = domsig_xml::parse(&xml).unwrap();
        let a = doc.descendants().find(|n| n.has_tag_name("a")).unwrap();
        let input = TransformData::NodeSet {
            xml: Arc::clone(&xml),
            nodes: NodeSet::tree(a, false),
        };
        assert!(matches!(decode(&input).unwrap(), TransformData::Octets(b) if b == b"hi"));
    }

    #[test]
    fn test_invalid_input() {
        let input = TransformData::Octets(b"***".to_vec());
        assert!(matches!(decode(&input), Err(Error::Base64(_))));
    }
}
