#![forbid(unsafe_code)]

//! XML namespace constants used across the library.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Digital Signature 1.1 namespace
pub const DSIG11: &str = "http://www.w3.org/2009/xmldsig11#";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XPath Filter 2.0 namespace
pub const XPATH2: &str = "http://www.w3.org/2002/06/xmldsig-filter2";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

/// Default prefix used when marshalling signature elements.
pub const DEFAULT_DSIG_PREFIX: &str = "ds";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const OBJECT: &str = "Object";
    pub const MANIFEST: &str = "Manifest";
    pub const SIGNATURE_PROPERTIES: &str = "SignatureProperties";
    pub const SIGNATURE_PROPERTY: &str = "SignatureProperty";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const HMAC_OUTPUT_LENGTH: &str = "HMACOutputLength";

    // KeyInfo elements
    pub const KEY_INFO: &str = "KeyInfo";
    pub const KEY_NAME: &str = "KeyName";
    pub const KEY_VALUE: &str = "KeyValue";
    pub const RETRIEVAL_METHOD: &str = "RetrievalMethod";

    // RSA elements
    pub const RSA_KEY_VALUE: &str = "RSAKeyValue";
    pub const RSA_MODULUS: &str = "Modulus";
    pub const RSA_EXPONENT: &str = "Exponent";

    // DSA elements
    pub const DSA_KEY_VALUE: &str = "DSAKeyValue";
    pub const DSA_P: &str = "P";
    pub const DSA_Q: &str = "Q";
    pub const DSA_G: &str = "G";
    pub const DSA_Y: &str = "Y";

    // EC elements
    pub const EC_KEY_VALUE: &str = "ECKeyValue";
    pub const NAMED_CURVE: &str = "NamedCurve";
    pub const PUBLIC_KEY: &str = "PublicKey";

    // XPath / Exc C14N
    pub const XPATH: &str = "XPath";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const MIME_TYPE: &str = "MimeType";
    pub const ENCODING: &str = "Encoding";
    pub const ALGORITHM: &str = "Algorithm";
    pub const FILTER: &str = "Filter";
    pub const TARGET: &str = "Target";
    pub const PREFIX_LIST: &str = "PrefixList";
}

// ── XPath2 filter values ─────────────────────────────────────────────

pub const XPATH2_FILTER_INTERSECT: &str = "intersect";
pub const XPATH2_FILTER_SUBTRACT: &str = "subtract";
pub const XPATH2_FILTER_UNION: &str = "union";
