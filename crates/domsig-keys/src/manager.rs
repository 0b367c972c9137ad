#![forbid(unsafe_code)]

//! Key manager with named key store.

use crate::key::{Key, KeyUsage};
use domsig_core::Error;
use domsig_crypto::SignatureMethod;

/// Manages a collection of keys for lookup during signing and validation.
#[derive(Debug, Clone, Default)]
pub struct KeysManager {
    keys: Vec<Key>,
}

impl KeysManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&mut self, key: Key) {
        self.keys.push(key);
    }

    /// Insert a key ahead of all others.
    pub fn insert_key_first(&mut self, key: Key) {
        self.keys.insert(0, key);
    }

    /// Find a key by name.
    pub fn find_by_name(&self, name: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.name.as_deref() == Some(name))
    }

    /// The first key that can drive `method` for `usage`.
    ///
    /// Signing additionally requires private material.
    pub fn find_compatible(&self, method: SignatureMethod, usage: KeyUsage) -> Option<&Key> {
        self.keys.iter().find(|k| {
            k.is_compatible(method)
                && k.usage.permits(usage)
                && (usage != KeyUsage::Sign || k.has_private())
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    /// Get the first key available (for simple single-key scenarios).
    pub fn first_key(&self) -> Result<&Key, Error> {
        self.keys
            .first()
            .ok_or_else(|| Error::KeyNotFound("no keys in manager".into()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyData;

    fn hmac(name: &str, usage: KeyUsage) -> Key {
        Key::new(KeyData::Hmac(name.as_bytes().to_vec()), usage).with_name(name)
    }

    #[test]
    fn test_lookup_by_name_and_method() {
        let mut mgr = KeysManager::new();
        assert!(mgr.first_key().is_err());
        mgr.add_key(hmac("verify-only", KeyUsage::Verify));
        mgr.add_key(hmac("any", KeyUsage::Any));

        assert_eq!(mgr.len(), 2);
        assert!(mgr.find_by_name("any").is_some());
        assert!(mgr.find_by_name("missing").is_none());

        let signer = mgr
            .find_compatible(SignatureMethod::HmacSha256, KeyUsage::Sign)
            .unwrap();
        assert_eq!(signer.name.as_deref(), Some("any"));
        let verifier = mgr
            .find_compatible(SignatureMethod::HmacSha1, KeyUsage::Verify)
            .unwrap();
        assert_eq!(verifier.name.as_deref(), Some("verify-only"));
        assert!(mgr
            .find_compatible(SignatureMethod::RsaSha256, KeyUsage::Verify)
            .is_none());
    }

    #[test]
    fn test_insert_first() {
        let mut mgr = KeysManager::new();
        mgr.add_key(hmac("b", KeyUsage::Any));
        mgr.insert_key_first(hmac("a", KeyUsage::Any));
        assert_eq!(mgr.first_key().unwrap().name.as_deref(), Some("a"));
    }
}
