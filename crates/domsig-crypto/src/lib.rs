#![forbid(unsafe_code)]

//! Cryptographic primitives for the domsig XML Signature engine.
//!
//! Digest and signature algorithms are closed enums backed by static
//! descriptor tables; the primitives themselves come from RustCrypto.

pub mod digest;
pub mod sign;

pub use digest::{DigestAlgorithm, DigestMethod, DigestSink};
pub use sign::{
    constant_time_eq, convert_asn1_to_xmldsig, convert_xmldsig_to_asn1, KeyFamily,
    SignatureAlgorithm, SignatureMethod, SigningKey,
};
