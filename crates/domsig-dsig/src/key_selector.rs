#![forbid(unsafe_code)]

//! Choosing the key for a sign or validate call.

use crate::keyinfo::KeyInfo;
use domsig_core::Error;
use domsig_crypto::SignatureMethod;
use domsig_keys::{Key, KeyUsage, KeysManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Sign,
    Verify,
}

impl Purpose {
    fn usage(self) -> KeyUsage {
        match self {
            Purpose::Sign => KeyUsage::Sign,
            Purpose::Verify => KeyUsage::Verify,
        }
    }
}

/// Where a selected key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Looked up by a `<KeyName>`.
    KeyName(String),
    /// Taken from `<KeyValue>` or a resolved `<RetrievalMethod>`.
    KeyValue,
    /// First compatible key of a keys manager.
    Manager,
    /// A key fixed on the selector.
    Fixed,
}

#[derive(Debug, Clone)]
pub struct SelectedKey {
    pub key: Key,
    pub source: KeySource,
}

/// Picks the key for a signature.
///
/// `Ok(None)` means this selector has no suitable key; errors are reserved
/// for selectors that fail outright.
pub trait KeySelector {
    fn select(
        &self,
        key_info: Option<&KeyInfo>,
        purpose: Purpose,
        method: SignatureMethod,
    ) -> Result<Option<SelectedKey>, Error>;
}

fn usable(key: &Key, purpose: Purpose, method: SignatureMethod) -> bool {
    key.is_compatible(method)
        && key.usage.permits(purpose.usage())
        && (purpose == Purpose::Verify || key.has_private())
}

/// `<KeyName>` lookups first, then the first compatible key.
impl KeySelector for KeysManager {
    fn select(
        &self,
        key_info: Option<&KeyInfo>,
        purpose: Purpose,
        method: SignatureMethod,
    ) -> Result<Option<SelectedKey>, Error> {
        for name in key_info.into_iter().flat_map(KeyInfo::key_names) {
            if let Some(key) = self.find_by_name(name).filter(|k| usable(k, purpose, method)) {
                tracing::debug!(name, "selected key by KeyName");
                return Ok(Some(SelectedKey {
                    key: key.clone(),
                    source: KeySource::KeyName(name.to_owned()),
                }));
            }
        }
        Ok(self
            .find_compatible(method, purpose.usage())
            .map(|key| SelectedKey {
                key: key.clone(),
                source: KeySource::Manager,
            }))
    }
}

/// Trusts the public key carried in the signature itself. Verification only.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyValueSelector;

impl KeySelector for KeyValueSelector {
    fn select(
        &self,
        key_info: Option<&KeyInfo>,
        purpose: Purpose,
        method: SignatureMethod,
    ) -> Result<Option<SelectedKey>, Error> {
        if purpose != Purpose::Verify {
            return Ok(None);
        }
        Ok(key_info
            .into_iter()
            .flat_map(KeyInfo::key_values)
            .find(|k| k.is_compatible(method))
            .map(|key| {
                tracing::debug!(family = ?key.family(), "selected key from KeyValue");
                SelectedKey {
                    key: key.clone(),
                    source: KeySource::KeyValue,
                }
            }))
    }
}

/// Always answers with one key. Mismatches surface when the key is used.
#[derive(Debug, Clone)]
pub struct SingleKeySelector(pub Key);

impl KeySelector for SingleKeySelector {
    fn select(
        &self,
        _key_info: Option<&KeyInfo>,
        _purpose: Purpose,
        _method: SignatureMethod,
    ) -> Result<Option<SelectedKey>, Error> {
        Ok(Some(SelectedKey {
            key: self.0.clone(),
            source: KeySource::Fixed,
        }))
    }
}

/// Tries each selector in turn.
impl KeySelector for Vec<Box<dyn KeySelector>> {
    fn select(
        &self,
        key_info: Option<&KeyInfo>,
        purpose: Purpose,
        method: SignatureMethod,
    ) -> Result<Option<SelectedKey>, Error> {
        for selector in self {
            if let Some(found) = selector.select(key_info, purpose, method)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}
