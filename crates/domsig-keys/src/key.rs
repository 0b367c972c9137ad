#![forbid(unsafe_code)]

//! Key types and data structures.

use domsig_crypto::{KeyFamily, SignatureMethod, SigningKey};

/// Usage flags for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    Sign,
    Verify,
    Any,
}

impl KeyUsage {
    /// True when a key with this usage may serve `wanted`.
    pub fn permits(self, wanted: KeyUsage) -> bool {
        self == KeyUsage::Any || wanted == KeyUsage::Any || self == wanted
    }
}

/// The underlying key data.
#[derive(Clone)]
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    Dsa {
        private: Option<dsa::SigningKey>,
        public: dsa::VerifyingKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
    EcP384 {
        private: Option<p384::ecdsa::SigningKey>,
        public: p384::ecdsa::VerifyingKey,
    },
    Hmac(Vec<u8>),
}

impl KeyData {
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Rsa { .. } => KeyFamily::Rsa,
            Self::Dsa { .. } => KeyFamily::Dsa,
            Self::EcP256 { .. } | Self::EcP384 { .. } => KeyFamily::Ecdsa,
            Self::Hmac(_) => KeyFamily::Hmac,
        }
    }

    pub fn has_private(&self) -> bool {
        match self {
            Self::Rsa { private, .. } => private.is_some(),
            Self::Dsa { private, .. } => private.is_some(),
            Self::EcP256 { private, .. } => private.is_some(),
            Self::EcP384 { private, .. } => private.is_some(),
            Self::Hmac(_) => true,
        }
    }
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Rsa { .. } => "RSA",
            Self::Dsa { .. } => "DSA",
            Self::EcP256 { .. } => "EC P-256",
            Self::EcP384 { .. } => "EC P-384",
            Self::Hmac(k) => return write!(f, "HMAC key ({} bytes)", k.len()),
        };
        if self.has_private() {
            write!(f, "{kind} private+public key")
        } else {
            write!(f, "{kind} public key")
        }
    }
}

/// A named key with associated data.
#[derive(Debug, Clone)]
pub struct Key {
    /// Optional name for `KeyName` lookup.
    pub name: Option<String>,
    pub data: KeyData,
    pub usage: KeyUsage,
}

impl Key {
    pub fn new(data: KeyData, usage: KeyUsage) -> Self {
        Self {
            name: None,
            data,
            usage,
        }
    }

    /// Set the key name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn family(&self) -> KeyFamily {
        self.data.family()
    }

    pub fn has_private(&self) -> bool {
        self.data.has_private()
    }

    /// True when this key can drive `method`.
    pub fn is_compatible(&self, method: SignatureMethod) -> bool {
        self.family() == method.family()
    }

    /// Convert to a `SigningKey`, preferring the private half when present.
    pub fn to_signing_key(&self) -> SigningKey {
        match &self.data {
            KeyData::Rsa { private: Some(pk), .. } => SigningKey::Rsa(pk.clone()),
            KeyData::Rsa { public, .. } => SigningKey::RsaPublic(public.clone()),
            KeyData::Dsa { private: Some(sk), .. } => SigningKey::Dsa(sk.clone()),
            KeyData::Dsa { public, .. } => SigningKey::DsaPublic(public.clone()),
            KeyData::EcP256 { private: Some(sk), .. } => SigningKey::EcP256(sk.clone()),
            KeyData::EcP256 { public, .. } => SigningKey::EcP256Public(*public),
            KeyData::EcP384 { private: Some(sk), .. } => SigningKey::EcP384(sk.clone()),
            KeyData::EcP384 { public, .. } => SigningKey::EcP384Public(*public),
            KeyData::Hmac(k) => SigningKey::Hmac(k.clone()),
        }
    }

    /// The verification half only.
    pub fn to_verifying_key(&self) -> SigningKey {
        match &self.data {
            KeyData::Rsa { public, .. } => SigningKey::RsaPublic(public.clone()),
            KeyData::Dsa { public, .. } => SigningKey::DsaPublic(public.clone()),
            KeyData::EcP256 { public, .. } => SigningKey::EcP256Public(*public),
            KeyData::EcP384 { public, .. } => SigningKey::EcP384Public(*public),
            KeyData::Hmac(k) => SigningKey::Hmac(k.clone()),
        }
    }

    pub fn key_size_bits(&self) -> usize {
        self.to_verifying_key().key_size_bits()
    }

    /// A copy without private material. HMAC keys are unchanged.
    pub fn public_only(&self) -> Key {
        let data = match &self.data {
            KeyData::Rsa { public, .. } => KeyData::Rsa {
                private: None,
                public: public.clone(),
            },
            KeyData::Dsa { public, .. } => KeyData::Dsa {
                private: None,
                public: public.clone(),
            },
            KeyData::EcP256 { public, .. } => KeyData::EcP256 {
                private: None,
                public: *public,
            },
            KeyData::EcP384 { public, .. } => KeyData::EcP384 {
                private: None,
                public: *public,
            },
            KeyData::Hmac(k) => KeyData::Hmac(k.clone()),
        };
        Key {
            name: self.name.clone(),
            data,
            usage: KeyUsage::Verify,
        }
    }
}
