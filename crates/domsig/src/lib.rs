#![forbid(unsafe_code)]

//! domsig: a DOM-based W3C XML Signature engine.

pub use domsig_core as core;
pub use domsig_xml as xml;
pub use domsig_c14n as c14n;
pub use domsig_crypto as crypto;
pub use domsig_keys as keys;
pub use domsig_transforms as transforms;
pub use domsig_dsig as dsig;
