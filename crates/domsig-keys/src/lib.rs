#![forbid(unsafe_code)]

//! Key management for the domsig XML Signature engine.
//!
//! Loads RSA, DSA and EC keys from PEM or DER (PKCS#8, PKCS#1, SPKI) and raw
//! HMAC secrets, keeps them in a `KeysManager` for lookup by name or
//! algorithm, and converts public keys to and from `<KeyValue>` XML.

pub mod key;
pub mod keyvalue;
pub mod loader;
pub mod manager;

pub use key::{Key, KeyData, KeyUsage};
pub use manager::KeysManager;
