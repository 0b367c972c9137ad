#![forbid(unsafe_code)]

/// Errors produced by the domsig XML Signature engine.
///
/// A failed digest comparison or a signature that does not verify is not an
/// error: `validate` reports those as `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("marshal error: {0}")]
    Marshal(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("XPath error: {0}")]
    XPath(String),

    #[error("transform {algorithm} failed: {cause}")]
    Transform {
        algorithm: String,
        #[source]
        cause: Box<Error>,
    },

    #[error("cannot dereference URI {uri:?}: {message}")]
    Dereference { uri: String, message: String },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("XML signature error: {message}")]
    Signature {
        message: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    #[error("secure validation violation: {0}")]
    SecureValidation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// A signature-pipeline failure with no underlying cause.
    pub fn signature(message: impl Into<String>) -> Self {
        Error::Signature {
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap `cause` into the signature-pipeline umbrella error.
    ///
    /// The cause's message is folded into the outer message so that a plain
    /// `Display` still tells the whole story.
    pub fn wrap_signature(context: impl AsRef<str>, cause: Error) -> Self {
        Error::Signature {
            message: format!("{}: {cause}", context.as_ref()),
            cause: Some(Box::new(cause)),
        }
    }

    /// Wrap `cause` as the failure of the transform identified by `algorithm`.
    pub fn transform(algorithm: impl Into<String>, cause: Error) -> Self {
        Error::Transform {
            algorithm: algorithm.into(),
            cause: Box::new(cause),
        }
    }

    pub fn dereference(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Dereference {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// True for errors raised while reading a structure (marshal class).
    pub fn is_marshal(&self) -> bool {
        matches!(
            self,
            Error::Marshal(_)
                | Error::MissingElement(_)
                | Error::MissingAttribute(_)
                | Error::UnsupportedAlgorithm(_)
                | Error::Base64(_)
                | Error::XmlParse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
