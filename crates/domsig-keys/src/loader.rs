#![forbid(unsafe_code)]

//! Key loading from PEM, DER and raw binary.
//!
//! PEM input is dispatched on its label; DER input is tried as PKCS#8,
//! PKCS#1 and SubjectPublicKeyInfo in turn.

use crate::key::{Key, KeyData, KeyUsage};
use domsig_core::Error;
use std::path::Path;

/// Load a key from PEM data, detecting the format from the PEM label.
pub fn load_pem(pem_data: &[u8]) -> Result<Key, Error> {
    let (label, der) = pem_rfc7468::decode_vec(trim_ascii(pem_data))
        .map_err(|e| Error::InvalidKey(format!("failed to decode PEM: {e}")))?;
    tracing::debug!(label, "loading PEM key");
    match label {
        "PRIVATE KEY" => load_pkcs8_der(&der),
        "PUBLIC KEY" => load_spki_der(&der),
        "RSA PRIVATE KEY" => load_rsa_pkcs1_private_der(&der),
        "RSA PUBLIC KEY" => load_rsa_pkcs1_public_der(&der),
        other => Err(Error::InvalidKey(format!("unsupported PEM label: {other}"))),
    }
}

/// Load a key from DER data of unknown format.
pub fn load_der(der: &[u8]) -> Result<Key, Error> {
    load_pkcs8_der(der)
        .or_else(|_| load_rsa_pkcs1_private_der(der))
        .or_else(|_| load_spki_der(der))
        .or_else(|_| load_rsa_pkcs1_public_der(der))
        .map_err(|_| Error::InvalidKey("unable to auto-detect DER key format".into()))
}

/// Load a key file, auto-detecting PEM or DER.
pub fn load_key_file(path: &Path) -> Result<Key, Error> {
    let data = std::fs::read(path)?;
    let loaded = if trim_ascii(&data).starts_with(b"-----BEGIN") {
        load_pem(&data)
    } else {
        load_der(&data)
    };
    loaded.map_err(|e| match e {
        Error::InvalidKey(msg) => Error::InvalidKey(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Load an HMAC key from raw binary data.
pub fn load_hmac_key(data: &[u8]) -> Key {
    Key::new(KeyData::Hmac(data.to_vec()), KeyUsage::Any)
}

/// Load an HMAC key file. The whole file content is the secret.
pub fn load_hmac_key_file(path: &Path) -> Result<Key, Error> {
    let data = std::fs::read(path)?;
    if data.is_empty() {
        return Err(Error::InvalidKey(format!(
            "{}: empty HMAC key file",
            path.display()
        )));
    }
    Ok(load_hmac_key(&data))
}

/// Load a private key from PKCS#8 DER. Tries RSA, P-256, P-384 and DSA.
pub fn load_pkcs8_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        let public = pk.to_public_key();
        return Ok(Key::new(
            KeyData::Rsa {
                private: Some(pk),
                public,
            },
            KeyUsage::Any,
        ));
    }

    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
        let public = *sk.verifying_key();
        return Ok(Key::new(
            KeyData::EcP256 {
                private: Some(sk),
                public,
            },
            KeyUsage::Any,
        ));
    }

    if let Ok(sk) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
        let public = *sk.verifying_key();
        return Ok(Key::new(
            KeyData::EcP384 {
                private: Some(sk),
                public,
            },
            KeyUsage::Any,
        ));
    }

    {
        use pkcs8::der::Decode;
        if let Ok(pki) = pkcs8::PrivateKeyInfo::from_der(der) {
            if let Ok(sk) = dsa::SigningKey::try_from(pki) {
                let public = sk.verifying_key().clone();
                return Ok(Key::new(
                    KeyData::Dsa {
                        private: Some(sk),
                        public,
                    },
                    KeyUsage::Any,
                ));
            }
        }
    }

    Err(Error::InvalidKey(
        "unable to parse PKCS#8 private key (tried RSA, P-256, P-384, DSA)".into(),
    ))
}

/// Load a public key from SubjectPublicKeyInfo DER.
pub fn load_spki_der(der: &[u8]) -> Result<Key, Error> {
    use spki::DecodePublicKey;

    if let Ok(public) = rsa::RsaPublicKey::from_public_key_der(der) {
        return Ok(Key::new(
            KeyData::Rsa {
                private: None,
                public,
            },
            KeyUsage::Verify,
        ));
    }

    if let Ok(public) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
        return Ok(Key::new(
            KeyData::EcP256 {
                private: None,
                public,
            },
            KeyUsage::Verify,
        ));
    }

    if let Ok(public) = p384::ecdsa::VerifyingKey::from_public_key_der(der) {
        return Ok(Key::new(
            KeyData::EcP384 {
                private: None,
                public,
            },
            KeyUsage::Verify,
        ));
    }

    {
        use pkcs8::der::Decode;
        if let Ok(spki_ref) = spki::SubjectPublicKeyInfoRef::from_der(der) {
            if let Ok(public) = dsa::VerifyingKey::try_from(spki_ref) {
                return Ok(Key::new(
                    KeyData::Dsa {
                        private: None,
                        public,
                    },
                    KeyUsage::Verify,
                ));
            }
        }
    }

    Err(Error::InvalidKey(
        "unsupported public key algorithm in SPKI".into(),
    ))
}

fn load_rsa_pkcs1_private_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs1::DecodeRsaPrivateKey;
    let pk = rsa::RsaPrivateKey::from_pkcs1_der(der)
        .map_err(|e| Error::InvalidKey(format!("failed to parse PKCS#1 RSA private key: {e}")))?;
    let public = pk.to_public_key();
    Ok(Key::new(
        KeyData::Rsa {
            private: Some(pk),
            public,
        },
        KeyUsage::Any,
    ))
}

fn load_rsa_pkcs1_public_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs1::DecodeRsaPublicKey;
    let public = rsa::RsaPublicKey::from_pkcs1_der(der)
        .map_err(|e| Error::InvalidKey(format!("failed to parse PKCS#1 RSA public key: {e}")))?;
    Ok(Key::new(
        KeyData::Rsa {
            private: None,
            public,
        },
        KeyUsage::Verify,
    ))
}

fn trim_ascii(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &data[start..end]
}
