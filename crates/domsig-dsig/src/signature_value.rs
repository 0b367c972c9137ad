#![forbid(unsafe_code)]

//! Computing and checking `<SignatureValue>` over canonical SignedInfo.

use domsig_core::{ns, Error};
use domsig_crypto::SignatureMethod;
use domsig_keys::Key;
use domsig_transforms::{CanonicalizationMethod, TransformData};
use domsig_xml::writer::qualify;
use domsig_xml::XmlWriter;

/// The `<SignatureValue>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureValue {
    pub id: Option<String>,
    pub value: Vec<u8>,
}

impl SignatureValue {
    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        use base64::Engine;
        let mut attrs = Vec::new();
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id.as_str()));
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.value);
        w.text_element(&qualify(prefix, ns::node::SIGNATURE_VALUE), &attrs, &encoded)
    }
}

/// Key and usage errors pass through; anything else from the pipeline is
/// reported as a signature error.
fn wrap(context: &str, err: Error) -> Error {
    match err {
        Error::Signature { .. } | Error::InvalidKey(_) => err,
        other => Error::wrap_signature(context, other),
    }
}

fn canonical_signed_info(
    signed_info: &TransformData,
    c14n: &CanonicalizationMethod,
) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    c14n.canonicalize(signed_info, &mut out)?;
    tracing::debug!(bytes = out.len(), "canonicalized SignedInfo");
    Ok(out)
}

/// Sign the canonical form of `signed_info`, a comment-free subtree rooted
/// at the `<SignedInfo>` element.
pub fn sign(
    key: &Key,
    signed_info: &TransformData,
    c14n: &CanonicalizationMethod,
    method: SignatureMethod,
    hmac_output_length: Option<u32>,
) -> Result<Vec<u8>, Error> {
    let data = canonical_signed_info(signed_info, c14n)
        .map_err(|e| wrap("canonicalizing SignedInfo", e))?;
    method
        .algorithm(hmac_output_length)
        .sign(&key.to_signing_key(), &data)
        .map_err(|e| wrap("computing SignatureValue", e))
}

/// Check `value` against the canonical form of `signed_info`.
pub fn verify(
    key: &Key,
    signed_info: &TransformData,
    c14n: &CanonicalizationMethod,
    method: SignatureMethod,
    hmac_output_length: Option<u32>,
    value: &[u8],
) -> Result<bool, Error> {
    let data = canonical_signed_info(signed_info, c14n)
        .map_err(|e| wrap("canonicalizing SignedInfo", e))?;
    method
        .algorithm(hmac_output_length)
        .verify(&key.to_verifying_key(), &data, value)
        .map_err(|e| wrap("verifying SignatureValue", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domsig_c14n::C14nMode;
    use domsig_keys::loader::load_hmac_key;
    use std::sync::Arc;

    const SI: &str = r#"<root xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo><!--c--><ds:Reference URI=""/></ds:SignedInfo></root>"#;

    fn signed_info() -> TransformData {
        let xml: Arc<str> = Arc::from(SI);
        let doc = domsig_xml::parse(&xml).unwrap();
        let root = doc.root_element().first_element_child().unwrap().id().get_usize();
        TransformData::Subtree {
            xml: Arc::clone(&xml),
            root,
            with_comments: false,
        }
    }

    #[test]
    fn test_hmac_sign_verify() {
        let key = load_hmac_key(b"secret");
        let c14n = CanonicalizationMethod::new(C14nMode::ExclusiveWithComments);
        let value = sign(&key, &signed_info(), &c14n, SignatureMethod::HmacSha256, None).unwrap();
        assert_eq!(value.len(), 32);
        assert!(verify(&key, &signed_info(), &c14n, SignatureMethod::HmacSha256, None, &value).unwrap());
        let other = load_hmac_key(b"other");
        assert!(!verify(&other, &signed_info(), &c14n, SignatureMethod::HmacSha256, None, &value).unwrap());
    }

    #[test]
    fn test_hmac_output_length_too_short() {
        let key = load_hmac_key(b"secret");
        let c14n = CanonicalizationMethod::new(C14nMode::Inclusive);
        let err = sign(&key, &signed_info(), &c14n, SignatureMethod::HmacSha256, Some(128))
            .unwrap_err();
        assert!(matches!(err, Error::Signature { .. }));
        let err = verify(&key, &signed_info(), &c14n, SignatureMethod::HmacSha1, Some(80), &[0; 20])
            .unwrap_err();
        assert!(matches!(err, Error::Signature { .. }));
    }

    #[test]
    fn test_key_mismatch() {
        let key = load_hmac_key(b"secret");
        let c14n = CanonicalizationMethod::new(C14nMode::Inclusive);
        let err = sign(&key, &signed_info(), &c14n, SignatureMethod::RsaSha256, None).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));

        let public = crate::test_keys::load("rsa-2048-pub.pem");
        let err = sign(&public, &signed_info(), &c14n, SignatureMethod::RsaSha256, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn test_dsa_and_ecdsa_round_trips() {
        let c14n = CanonicalizationMethod::new(C14nMode::Exclusive);
        for (file, method, len) in [
            ("dsa-1024.pem", SignatureMethod::DsaSha1, 40),
            ("dsa-2048.pem", SignatureMethod::DsaSha256, 64),
            ("ec-p256.pem", SignatureMethod::EcdsaSha256, 64),
        ] {
            let key = crate::test_keys::load(file);
            let value = sign(&key, &signed_info(), &c14n, method, None).unwrap();
            assert_eq!(value.len(), len, "{file}");
            let public = key.public_only();
            assert!(verify(&public, &signed_info(), &c14n, method, None, &value).unwrap());
            let mut bad = value.clone();
            bad[len - 1] ^= 1;
            assert!(!verify(&public, &signed_info(), &c14n, method, None, &bad).unwrap_or(false));
        }
    }

    #[test]
    fn test_marshal() {
        let mut w = XmlWriter::new();
        SignatureValue {
            id: Some("sv".into()),
            value: vec![1, 2, 3],
        }
        .marshal(&mut w, "ds")
        .unwrap();
        assert_eq!(
            w.into_string().unwrap(),
            r#"<ds:SignatureValue Id="sv">AQID</ds:SignatureValue>"#
        );
    }
}
