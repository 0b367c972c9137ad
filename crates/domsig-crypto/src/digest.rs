#![forbid(unsafe_code)]

//! Digest (hash) algorithms and the streaming digest sink.

use domsig_core::{algorithm, Error};
use digest::Digest;
use std::io;

/// The digest algorithms understood by `DigestMethod` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestMethod {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
    Md5,
}

/// Static facts about a digest algorithm.
#[derive(Debug)]
pub struct DigestDescriptor {
    pub method: DigestMethod,
    pub uri: &'static str,
    pub native_name: &'static str,
    /// Output length in bytes.
    pub output_len: usize,
    pub weak: bool,
}

static DIGESTS: [DigestDescriptor; 10] = [
    DigestDescriptor { method: DigestMethod::Sha1, uri: algorithm::SHA1, native_name: "SHA-1", output_len: 20, weak: false },
    DigestDescriptor { method: DigestMethod::Sha224, uri: algorithm::SHA224, native_name: "SHA-224", output_len: 28, weak: false },
    DigestDescriptor { method: DigestMethod::Sha256, uri: algorithm::SHA256, native_name: "SHA-256", output_len: 32, weak: false },
    DigestDescriptor { method: DigestMethod::Sha384, uri: algorithm::SHA384, native_name: "SHA-384", output_len: 48, weak: false },
    DigestDescriptor { method: DigestMethod::Sha512, uri: algorithm::SHA512, native_name: "SHA-512", output_len: 64, weak: false },
    DigestDescriptor { method: DigestMethod::Sha3_224, uri: algorithm::SHA3_224, native_name: "SHA3-224", output_len: 28, weak: false },
    DigestDescriptor { method: DigestMethod::Sha3_256, uri: algorithm::SHA3_256, native_name: "SHA3-256", output_len: 32, weak: false },
    DigestDescriptor { method: DigestMethod::Sha3_384, uri: algorithm::SHA3_384, native_name: "SHA3-384", output_len: 48, weak: false },
    DigestDescriptor { method: DigestMethod::Sha3_512, uri: algorithm::SHA3_512, native_name: "SHA3-512", output_len: 64, weak: false },
    DigestDescriptor { method: DigestMethod::Md5, uri: algorithm::MD5, native_name: "MD5", output_len: 16, weak: true },
];

impl DigestMethod {
    /// Look up a digest method by algorithm URI.
    ///
    /// The `xmldsig-more#sha256` spelling is accepted as SHA-256.
    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        if uri == algorithm::SHA256_ALIAS {
            return Ok(DigestMethod::Sha256);
        }
        DIGESTS
            .iter()
            .find(|d| d.uri == uri)
            .map(|d| d.method)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest algorithm: {uri}")))
    }

    pub fn descriptor(&self) -> &'static DigestDescriptor {
        let idx = DIGESTS.iter().position(|d| d.method == *self).unwrap_or(0);
        &DIGESTS[idx]
    }

    pub fn uri(&self) -> &'static str {
        self.descriptor().uri
    }

    pub fn native_name(&self) -> &'static str {
        self.descriptor().native_name
    }

    pub fn output_len(&self) -> usize {
        self.descriptor().output_len
    }

    pub fn is_weak(&self) -> bool {
        self.descriptor().weak
    }

    /// Every supported digest method.
    pub fn all() -> &'static [DigestDescriptor] {
        &DIGESTS
    }

    /// A fresh hasher for this method.
    pub fn hasher(&self) -> Box<dyn DigestAlgorithm> {
        match self {
            DigestMethod::Sha1 => Box::new(Sha1Digest::new()),
            DigestMethod::Sha224 => Box::new(Sha224Digest::new()),
            DigestMethod::Sha256 => Box::new(Sha256Digest::new()),
            DigestMethod::Sha384 => Box::new(Sha384Digest::new()),
            DigestMethod::Sha512 => Box::new(Sha512Digest::new()),
            DigestMethod::Sha3_224 => Box::new(Sha3_224Digest::new()),
            DigestMethod::Sha3_256 => Box::new(Sha3_256Digest::new()),
            DigestMethod::Sha3_384 => Box::new(Sha3_384Digest::new()),
            DigestMethod::Sha3_512 => Box::new(Sha3_512Digest::new()),
            DigestMethod::Md5 => Box::new(Md5Digest::new()),
        }
    }
}

/// Trait for digest algorithms.
pub trait DigestAlgorithm: Send {
    /// Feed data into the hash.
    fn update(&mut self, data: &[u8]);
    /// Finalize and return the hash value.
    fn finalize(self: Box<Self>) -> Vec<u8>;
    fn method(&self) -> DigestMethod;
}

/// Compute a digest in one shot.
pub fn digest(method: DigestMethod, data: &[u8]) -> Vec<u8> {
    let mut hasher = method.hasher();
    hasher.update(data);
    hasher.finalize()
}

// ── Concrete implementations ─────────────────────────────────────────

macro_rules! impl_digest {
    ($name:ident, $hasher:ty, $method:expr) => {
        struct $name {
            inner: $hasher,
        }

        impl $name {
            fn new() -> Self {
                Self {
                    inner: <$hasher>::new(),
                }
            }
        }

        impl DigestAlgorithm for $name {
            fn update(&mut self, data: &[u8]) {
                Digest::update(&mut self.inner, data);
            }

            fn finalize(self: Box<Self>) -> Vec<u8> {
                Digest::finalize(self.inner).to_vec()
            }

            fn method(&self) -> DigestMethod {
                $method
            }
        }
    };
}

impl_digest!(Sha1Digest, sha1::Sha1, DigestMethod::Sha1);
impl_digest!(Sha224Digest, sha2::Sha224, DigestMethod::Sha224);
impl_digest!(Sha256Digest, sha2::Sha256, DigestMethod::Sha256);
impl_digest!(Sha384Digest, sha2::Sha384, DigestMethod::Sha384);
impl_digest!(Sha512Digest, sha2::Sha512, DigestMethod::Sha512);
impl_digest!(Sha3_224Digest, sha3::Sha3_224, DigestMethod::Sha3_224);
impl_digest!(Sha3_256Digest, sha3::Sha3_256, DigestMethod::Sha3_256);
impl_digest!(Sha3_384Digest, sha3::Sha3_384, DigestMethod::Sha3_384);
impl_digest!(Sha3_512Digest, sha3::Sha3_512, DigestMethod::Sha3_512);
impl_digest!(Md5Digest, md5::Md5, DigestMethod::Md5);

// ── Streaming sink ───────────────────────────────────────────────────

/// An `io::Write` sink that hashes everything written to it.
///
/// With capture enabled the exact bytes are also kept, so the digest input
/// can be inspected afterwards.
pub struct DigestSink {
    hasher: Box<dyn DigestAlgorithm>,
    capture: Option<Vec<u8>>,
    written: usize,
}

impl DigestSink {
    pub fn new(method: DigestMethod) -> Self {
        Self {
            hasher: method.hasher(),
            capture: None,
            written: 0,
        }
    }

    /// A sink that also records the bytes it digests.
    pub fn capturing(method: DigestMethod) -> Self {
        Self {
            capture: Some(Vec::new()),
            ..Self::new(method)
        }
    }

    pub fn bytes_written(&self) -> usize {
        self.written
    }

    /// The digest value and, when capturing, the digested bytes.
    pub fn finish(self) -> (Vec<u8>, Option<Vec<u8>>) {
        (self.hasher.finalize(), self.capture)
    }
}

impl io::Write for DigestSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        if let Some(capture) = self.capture.as_mut() {
            capture.extend_from_slice(buf);
        }
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_sha256() {
        let result = digest(DigestMethod::Sha256, b"hello");
        assert_eq!(
            hex(&result),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_output_lengths_match_table() {
        for d in DigestMethod::all() {
            assert_eq!(digest(d.method, b"x").len(), d.output_len, "{}", d.native_name);
            assert_eq!(DigestMethod::from_uri(d.uri).unwrap(), d.method);
        }
    }

    #[test]
    fn test_sha256_alias_and_unknown() {
        assert_eq!(
            DigestMethod::from_uri(algorithm::SHA256_ALIAS).unwrap(),
            DigestMethod::Sha256
        );
        assert!(matches!(
            DigestMethod::from_uri("urn:unknown"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
        assert!(DigestMethod::Md5.is_weak());
    }

    #[test]
    fn test_sink_matches_one_shot_and_captures() {
        let mut sink = DigestSink::capturing(DigestMethod::Sha1);
        sink.write_all(b"hel").unwrap();
        sink.write_all(b"lo").unwrap();
        assert_eq!(sink.bytes_written(), 5);
        let (value, captured) = sink.finish();
        assert_eq!(value, digest(DigestMethod::Sha1, b"hello"));
        assert_eq!(captured.as_deref(), Some(&b"hello"[..]));

        let (_, none) = DigestSink::new(DigestMethod::Sha1).finish();
        assert!(none.is_none());
    }
}
