#![forbid(unsafe_code)]

//! `<KeyValue>` codec for RSA, DSA and EC public keys.

use crate::key::{Key, KeyData, KeyUsage};
use base64::Engine;
use domsig_core::{algorithm, ns, Error};
use domsig_xml::document::{element_children, find_child_element, text_content};
use domsig_xml::writer::qualify;
use domsig_xml::XmlWriter;
use roxmltree::Node;

const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Prefix used for the `dsig11` namespace on marshalled `ECKeyValue`.
const DSIG11_PREFIX: &str = "dsig11";

/// Read the public key carried by a `<KeyValue>` element.
pub fn parse_key_value(key_value: Node<'_, '_>) -> Result<Key, Error> {
    let inner = element_children(key_value)
        .next()
        .ok_or_else(|| Error::MissingElement("KeyValue content".into()))?;
    parse_key_value_content(inner)
}

/// Read an `RSAKeyValue`, `DSAKeyValue` or `ECKeyValue` element.
pub fn parse_key_value_content(inner: Node<'_, '_>) -> Result<Key, Error> {
    let ns_uri = inner.tag_name().namespace().unwrap_or("");
    match (ns_uri, inner.tag_name().name()) {
        (ns::DSIG, ns::node::RSA_KEY_VALUE) => parse_rsa(inner),
        (ns::DSIG, ns::node::DSA_KEY_VALUE) => parse_dsa(inner),
        (ns::DSIG11 | ns::DSIG, ns::node::EC_KEY_VALUE) => parse_ec(inner),
        (_, other) => Err(Error::UnsupportedAlgorithm(format!("KeyValue type: {other}"))),
    }
}

fn crypto_binary(parent: Node<'_, '_>, ns_uri: &str, name: &str) -> Result<Vec<u8>, Error> {
    let node = find_child_element(parent, ns_uri, name)
        .ok_or_else(|| Error::MissingElement(name.into()))?;
    let clean: String = text_content(node)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if clean.is_empty() {
        return Err(Error::Marshal(format!("{name} is empty")));
    }
    ENGINE
        .decode(clean)
        .map_err(|e| Error::Base64(format!("{name}: {e}")))
}

fn parse_rsa(node: Node<'_, '_>) -> Result<Key, Error> {
    let n = crypto_binary(node, ns::DSIG, ns::node::RSA_MODULUS)?;
    let e = crypto_binary(node, ns::DSIG, ns::node::RSA_EXPONENT)?;
    let public = rsa::RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n),
        rsa::BigUint::from_bytes_be(&e),
    )
    .map_err(|err| Error::InvalidKey(format!("invalid RSA public key: {err}")))?;
    Ok(Key::new(
        KeyData::Rsa {
            private: None,
            public,
        },
        KeyUsage::Verify,
    ))
}

fn parse_dsa(node: Node<'_, '_>) -> Result<Key, Error> {
    let component = |name: &str| -> Result<dsa::BigUint, Error> {
        Ok(dsa::BigUint::from_bytes_be(&crypto_binary(node, ns::DSIG, name)?))
    };
    let p = component(ns::node::DSA_P)?;
    let q = component(ns::node::DSA_Q)?;
    let g = component(ns::node::DSA_G)?;
    let y = component(ns::node::DSA_Y)?;

    let components = dsa::Components::from_components(p, q, g)
        .map_err(|e| Error::InvalidKey(format!("invalid DSA parameters: {e}")))?;
    let public = dsa::VerifyingKey::from_components(components, y)
        .map_err(|e| Error::InvalidKey(format!("invalid DSA public key: {e}")))?;
    Ok(Key::new(
        KeyData::Dsa {
            private: None,
            public,
        },
        KeyUsage::Verify,
    ))
}

fn parse_ec(node: Node<'_, '_>) -> Result<Key, Error> {
    let ns_uri = node.tag_name().namespace().unwrap_or(ns::DSIG11);
    let curve = find_child_element(node, ns_uri, ns::node::NAMED_CURVE)
        .ok_or_else(|| Error::MissingElement(ns::node::NAMED_CURVE.into()))?
        .attribute(ns::attr::URI)
        .ok_or_else(|| Error::MissingAttribute("URI on NamedCurve".into()))?;
    let point = crypto_binary(node, ns_uri, ns::node::PUBLIC_KEY)?;

    let data = match curve {
        algorithm::CURVE_P256 => KeyData::EcP256 {
            private: None,
            public: p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| Error::InvalidKey(format!("invalid P-256 point: {e}")))?,
        },
        algorithm::CURVE_P384 => KeyData::EcP384 {
            private: None,
            public: p384::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| Error::InvalidKey(format!("invalid P-384 point: {e}")))?,
        },
        other => return Err(Error::UnsupportedAlgorithm(format!("EC curve: {other}"))),
    };
    Ok(Key::new(data, KeyUsage::Verify))
}

// ── Marshalling ──────────────────────────────────────────────────────

/// Write `<prefix:KeyValue>` for the public part of `key`.
///
/// HMAC keys have no public representation and are rejected.
pub fn write_key_value(w: &mut XmlWriter, prefix: &str, key: &Key) -> Result<(), Error> {
    use rsa::traits::PublicKeyParts;

    let key_value = qualify(prefix, ns::node::KEY_VALUE);
    w.start_element(&key_value, &[])?;
    match &key.data {
        KeyData::Rsa { public, .. } => {
            let outer = qualify(prefix, ns::node::RSA_KEY_VALUE);
            w.start_element(&outer, &[])?;
            binary_element(w, prefix, ns::node::RSA_MODULUS, &public.n().to_bytes_be())?;
            binary_element(w, prefix, ns::node::RSA_EXPONENT, &public.e().to_bytes_be())?;
            w.end_element(&outer)?;
        }
        KeyData::Dsa { public, .. } => {
            let outer = qualify(prefix, ns::node::DSA_KEY_VALUE);
            let params = public.components();
            w.start_element(&outer, &[])?;
            binary_element(w, prefix, ns::node::DSA_P, &params.p().to_bytes_be())?;
            binary_element(w, prefix, ns::node::DSA_Q, &params.q().to_bytes_be())?;
            binary_element(w, prefix, ns::node::DSA_G, &params.g().to_bytes_be())?;
            binary_element(w, prefix, ns::node::DSA_Y, &public.y().to_bytes_be())?;
            w.end_element(&outer)?;
        }
        KeyData::EcP256 { public, .. } => {
            let point = public.to_encoded_point(false);
            write_ec(w, algorithm::CURVE_P256, point.as_bytes())?;
        }
        KeyData::EcP384 { public, .. } => {
            let point = public.to_encoded_point(false);
            write_ec(w, algorithm::CURVE_P384, point.as_bytes())?;
        }
        KeyData::Hmac(_) => {
            return Err(Error::InvalidKey(
                "HMAC keys cannot be written as KeyValue".into(),
            ))
        }
    }
    w.end_element(&key_value)
}

fn binary_element(w: &mut XmlWriter, prefix: &str, local: &str, bytes: &[u8]) -> Result<(), Error> {
    w.text_element(&qualify(prefix, local), &[], &ENGINE.encode(bytes))
}

fn write_ec(w: &mut XmlWriter, curve: &str, point: &[u8]) -> Result<(), Error> {
    let outer = qualify(DSIG11_PREFIX, ns::node::EC_KEY_VALUE);
    let xmlns = format!("xmlns:{DSIG11_PREFIX}");
    w.start_element(&outer, &[(xmlns.as_str(), ns::DSIG11)])?;
    w.empty_element(
        &qualify(DSIG11_PREFIX, ns::node::NAMED_CURVE),
        &[(ns::attr::URI, curve)],
    )?;
    w.text_element(
        &qualify(DSIG11_PREFIX, ns::node::PUBLIC_KEY),
        &[],
        &ENGINE.encode(point),
    )?;
    w.end_element(&outer)
}
