#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) creation and validation.
//!
//! An [`XmlSignature`] is built in memory (or read from a document with
//! [`XmlSignature::parse`]), signed into an enveloped or enveloping
//! document, and validated against the text it was read from. Keys come
//! from a [`KeySelector`]; limits on what a signature may ask for come from
//! the [`SecurePolicy`] of the [`DsigContext`].

pub mod context;
pub mod key_selector;
pub mod keyinfo;
pub mod manifest;
pub mod object;
pub mod reference;
pub mod secure;
pub mod signature;
pub mod signature_value;
pub mod signed_info;

pub use context::{DsigConfig, DsigContext};
pub use key_selector::{
    KeySelector, KeySource, KeyValueSelector, Purpose, SelectedKey, SingleKeySelector,
};
pub use keyinfo::{KeyInfo, KeyInfoItem, RetrievalMethod, Retrieved};
pub use manifest::Manifest;
pub use object::{ObjectContent, SignatureProperties, SignatureProperty, XmlObject};
pub use reference::{Reference, RetainedData};
pub use secure::SecurePolicy;
pub use signature::{RefPath, SignatureTarget, XmlSignature};
pub use signature_value::SignatureValue;
pub use signed_info::SignedInfo;

#[cfg(test)]
pub(crate) mod test_keys {
    use domsig_keys::loader::load_key_file;
    use domsig_keys::Key;
    use std::path::PathBuf;

    /// Load the committed fixture `test-data/keys/<name>`.
    pub fn load(name: &str) -> Key {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../test-data/keys")
            .join(name);
        load_key_file(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
    }
}
