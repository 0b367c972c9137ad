#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA, DSA, ECDSA, HMAC).

use crate::digest::DigestMethod;
use domsig_core::{algorithm, Error};
use signature::SignatureEncoding;

/// The key family a signature method needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Dsa,
    Ecdsa,
    Hmac,
}

/// The signature algorithms understood by `SignatureMethod` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureMethod {
    RsaSha1,
    RsaSha224,
    RsaSha256,
    RsaSha384,
    RsaSha512,
    RsaMd5,
    DsaSha1,
    DsaSha256,
    EcdsaSha1,
    EcdsaSha224,
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
    HmacSha1,
    HmacSha224,
    HmacSha256,
    HmacSha384,
    HmacSha512,
    HmacMd5,
}

/// Static facts about a signature algorithm.
#[derive(Debug)]
pub struct SignatureDescriptor {
    pub method: SignatureMethod,
    pub uri: &'static str,
    pub native_name: &'static str,
    pub family: KeyFamily,
    pub digest: DigestMethod,
    pub weak: bool,
}

macro_rules! sig {
    ($method:ident, $uri:ident, $name:literal, $family:ident, $digest:ident, $weak:literal) => {
        SignatureDescriptor {
            method: SignatureMethod::$method,
            uri: algorithm::$uri,
            native_name: $name,
            family: KeyFamily::$family,
            digest: DigestMethod::$digest,
            weak: $weak,
        }
    };
}

static SIGNATURES: [SignatureDescriptor; 19] = [
    sig!(RsaSha1, RSA_SHA1, "SHA1withRSA", Rsa, Sha1, false),
    sig!(RsaSha224, RSA_SHA224, "SHA224withRSA", Rsa, Sha224, false),
    sig!(RsaSha256, RSA_SHA256, "SHA256withRSA", Rsa, Sha256, false),
    sig!(RsaSha384, RSA_SHA384, "SHA384withRSA", Rsa, Sha384, false),
    sig!(RsaSha512, RSA_SHA512, "SHA512withRSA", Rsa, Sha512, false),
    sig!(RsaMd5, RSA_MD5, "MD5withRSA", Rsa, Md5, true),
    sig!(DsaSha1, DSA_SHA1, "SHA1withDSA", Dsa, Sha1, false),
    sig!(DsaSha256, DSA_SHA256, "SHA256withDSA", Dsa, Sha256, false),
    sig!(EcdsaSha1, ECDSA_SHA1, "SHA1withECDSA", Ecdsa, Sha1, false),
    sig!(EcdsaSha224, ECDSA_SHA224, "SHA224withECDSA", Ecdsa, Sha224, false),
    sig!(EcdsaSha256, ECDSA_SHA256, "SHA256withECDSA", Ecdsa, Sha256, false),
    sig!(EcdsaSha384, ECDSA_SHA384, "SHA384withECDSA", Ecdsa, Sha384, false),
    sig!(EcdsaSha512, ECDSA_SHA512, "SHA512withECDSA", Ecdsa, Sha512, false),
    sig!(HmacSha1, HMAC_SHA1, "HmacSHA1", Hmac, Sha1, false),
    sig!(HmacSha224, HMAC_SHA224, "HmacSHA224", Hmac, Sha224, false),
    sig!(HmacSha256, HMAC_SHA256, "HmacSHA256", Hmac, Sha256, false),
    sig!(HmacSha384, HMAC_SHA384, "HmacSHA384", Hmac, Sha384, false),
    sig!(HmacSha512, HMAC_SHA512, "HmacSHA512", Hmac, Sha512, false),
    sig!(HmacMd5, HMAC_MD5, "HmacMD5", Hmac, Md5, true),
];

impl SignatureMethod {
    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        SIGNATURES
            .iter()
            .find(|d| d.uri == uri)
            .map(|d| d.method)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}")))
    }

    pub fn descriptor(&self) -> &'static SignatureDescriptor {
        let idx = SIGNATURES.iter().position(|d| d.method == *self).unwrap_or(0);
        &SIGNATURES[idx]
    }

    pub fn uri(&self) -> &'static str {
        self.descriptor().uri
    }

    pub fn family(&self) -> KeyFamily {
        self.descriptor().family
    }

    pub fn digest(&self) -> DigestMethod {
        self.descriptor().digest
    }

    pub fn is_weak(&self) -> bool {
        self.descriptor().weak
    }

    pub fn is_hmac(&self) -> bool {
        self.family() == KeyFamily::Hmac
    }

    /// Every supported signature method.
    pub fn all() -> &'static [SignatureDescriptor] {
        &SIGNATURES
    }

    /// Instantiate the algorithm.
    ///
    /// `hmac_output_length` is the `HMACOutputLength` in bits and is only
    /// meaningful for the HMAC family.
    pub fn algorithm(&self, hmac_output_length: Option<u32>) -> Box<dyn SignatureAlgorithm> {
        let method = *self;
        let hash = self.digest();
        match self.family() {
            KeyFamily::Rsa => Box::new(RsaPkcs1v15 { method, hash }),
            KeyFamily::Dsa => Box::new(Dsa { method, hash }),
            KeyFamily::Ecdsa => Box::new(Ecdsa { method, hash }),
            KeyFamily::Hmac => Box::new(HmacSign {
                method,
                hash,
                output_length: hmac_output_length,
            }),
        }
    }
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    Ok(SignatureMethod::from_uri(uri)?.algorithm(None))
}

// ── Key material ─────────────────────────────────────────────────────

/// Key material for signature operations.
#[derive(Clone)]
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    Dsa(dsa::SigningKey),
    DsaPublic(dsa::VerifyingKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
    Hmac(Vec<u8>),
}

impl SigningKey {
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Rsa(_) | Self::RsaPublic(_) => KeyFamily::Rsa,
            Self::Dsa(_) | Self::DsaPublic(_) => KeyFamily::Dsa,
            Self::EcP256(_) | Self::EcP256Public(_) | Self::EcP384(_) | Self::EcP384Public(_) => {
                KeyFamily::Ecdsa
            }
            Self::Hmac(_) => KeyFamily::Hmac,
        }
    }

    /// True when the key can produce signatures.
    pub fn is_private(&self) -> bool {
        matches!(
            self,
            Self::Rsa(_) | Self::Dsa(_) | Self::EcP256(_) | Self::EcP384(_) | Self::Hmac(_)
        )
    }

    /// Key size in bits: the modulus for RSA, `p` for DSA, the field for EC
    /// and the raw key length for HMAC.
    pub fn key_size_bits(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        match self {
            Self::Rsa(k) => k.size() * 8,
            Self::RsaPublic(k) => k.size() * 8,
            Self::Dsa(k) => k.verifying_key().components().p().bits(),
            Self::DsaPublic(k) => k.components().p().bits(),
            Self::EcP256(_) | Self::EcP256Public(_) => 256,
            Self::EcP384(_) | Self::EcP384Public(_) => 384,
            Self::Hmac(k) => k.len() * 8,
        }
    }

    /// The public half of an asymmetric key; HMAC keys are returned as is.
    pub fn to_public(&self) -> SigningKey {
        match self {
            Self::Rsa(k) => Self::RsaPublic(k.to_public_key()),
            Self::Dsa(k) => Self::DsaPublic(k.verifying_key().clone()),
            Self::EcP256(k) => Self::EcP256Public(k.verifying_key().clone()),
            Self::EcP384(k) => Self::EcP384Public(k.verifying_key().clone()),
            other => other.clone(),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("family", &self.family())
            .field("bits", &self.key_size_bits())
            .field("private", &self.is_private())
            .finish()
    }
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send {
    fn method(&self) -> SignatureMethod;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    /// `Ok(false)` when the signature does not match; errors are reserved
    /// for unusable keys and malformed inputs.
    fn verify(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

fn wrong_key(method: SignatureMethod, key: &SigningKey) -> Error {
    Error::InvalidKey(format!(
        "{:?} key cannot be used with {}",
        key.family(),
        method.uri()
    ))
}

fn public_only(method: SignatureMethod) -> Error {
    Error::InvalidKey(format!("{} signing requires a private key", method.uri()))
}

fn unsupported_hash(method: SignatureMethod) -> Error {
    Error::UnsupportedAlgorithm(format!("digest for {}", method.uri()))
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    method: SignatureMethod,
    hash: DigestMethod,
}

impl RsaPkcs1v15 {
    fn sign_with_key(&self, private_key: &rsa::RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
                let sig = sk
                    .try_sign(data)
                    .map_err(|e| Error::Crypto(format!("RSA signing failed: {e}")))?;
                Ok(sig.to_vec())
            }};
        }
        match self.hash {
            DigestMethod::Sha1 => do_sign!(sha1::Sha1),
            DigestMethod::Sha224 => do_sign!(sha2::Sha224),
            DigestMethod::Sha256 => do_sign!(sha2::Sha256),
            DigestMethod::Sha384 => do_sign!(sha2::Sha384),
            DigestMethod::Sha512 => do_sign!(sha2::Sha512),
            DigestMethod::Md5 => do_sign!(md5::Md5),
            _ => Err(unsupported_hash(self.method)),
        }
    }

    fn verify_with_key(
        &self,
        public_key: rsa::RsaPublicKey,
        data: &[u8],
        sig_bytes: &[u8],
    ) -> Result<bool, Error> {
        use signature::Verifier;
        let Ok(sig) = rsa::pkcs1v15::Signature::try_from(sig_bytes) else {
            return Ok(false);
        };
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key);
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            DigestMethod::Sha1 => do_verify!(sha1::Sha1),
            DigestMethod::Sha224 => do_verify!(sha2::Sha224),
            DigestMethod::Sha256 => do_verify!(sha2::Sha256),
            DigestMethod::Sha384 => do_verify!(sha2::Sha384),
            DigestMethod::Sha512 => do_verify!(sha2::Sha512),
            DigestMethod::Md5 => do_verify!(md5::Md5),
            _ => Err(unsupported_hash(self.method)),
        }
    }
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn method(&self) -> SignatureMethod {
        self.method
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        match key {
            SigningKey::Rsa(pk) => self.sign_with_key(pk, data),
            SigningKey::RsaPublic(_) => Err(public_only(self.method)),
            other => Err(wrong_key(self.method, other)),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let pubk = match key {
            SigningKey::Rsa(pk) => pk.to_public_key(),
            SigningKey::RsaPublic(pk) => pk.clone(),
            other => return Err(wrong_key(self.method, other)),
        };
        self.verify_with_key(pubk, data, sig_bytes)
    }
}

// ── DSA ──────────────────────────────────────────────────────────────

struct Dsa {
    method: SignatureMethod,
    hash: DigestMethod,
}

/// Convert a DER `SEQUENCE { INTEGER r, INTEGER s }` DSA signature to the
/// XML-DSig `r || s` form, each half left-padded to `size` bytes.
pub fn convert_asn1_to_xmldsig(der: &[u8], size: usize) -> Result<Vec<u8>, Error> {
    let sig = dsa::Signature::try_from(der)
        .map_err(|e| Error::Crypto(format!("malformed DER DSA signature: {e}")))?;
    let mut out = vec![0u8; size * 2];
    for (half, n) in out.chunks_mut(size).zip([sig.r(), sig.s()]) {
        let bytes = n.to_bytes_be();
        if bytes.len() > size {
            return Err(Error::Crypto(format!(
                "DSA signature component is longer than {size} bytes"
            )));
        }
        half[size - bytes.len()..].copy_from_slice(&bytes);
    }
    Ok(out)
}

/// Convert an XML-DSig `r || s` DSA signature to DER.
pub fn convert_xmldsig_to_asn1(raw: &[u8]) -> Result<Vec<u8>, Error> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(Error::Crypto(format!(
            "invalid XMLDSig DSA signature length: {}",
            raw.len()
        )));
    }
    let (r, s) = raw.split_at(raw.len() / 2);
    let sig = dsa::Signature::from_components(
        dsa::BigUint::from_bytes_be(r),
        dsa::BigUint::from_bytes_be(s),
    )
    .map_err(|e| Error::Crypto(format!("invalid DSA signature: {e}")))?;
    Ok(sig.to_bytes().into_vec())
}

impl Dsa {
    /// Width of `r` and `s` in the XML-DSig encoding: 20 bytes for
    /// DSA-SHA1, 32 for DSA-SHA256.
    fn component_len(&self) -> usize {
        match self.hash {
            DigestMethod::Sha1 => 20,
            _ => 32,
        }
    }

    /// The key's subgroup order must fit the method's component width.
    fn check_q(&self, vk: &dsa::VerifyingKey) -> Result<usize, Error> {
        let size = self.component_len();
        let bits = vk.components().q().bits();
        if bits > size * 8 {
            return Err(Error::InvalidKey(format!(
                "{} needs a DSA subgroup order of at most {} bits, key has {bits}",
                self.method.uri(),
                size * 8
            )));
        }
        Ok(size)
    }
}

impl SignatureAlgorithm for Dsa {
    fn method(&self) -> SignatureMethod {
        self.method
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use digest::Digest;
        use signature::DigestSigner;
        let sk = match key {
            SigningKey::Dsa(sk) => sk,
            SigningKey::DsaPublic(_) => return Err(public_only(self.method)),
            other => return Err(wrong_key(self.method, other)),
        };
        let size = self.check_q(sk.verifying_key())?;
        let sig: dsa::Signature = match self.hash {
            DigestMethod::Sha1 => sk.try_sign_digest(sha1::Sha1::new_with_prefix(data)),
            DigestMethod::Sha256 => sk.try_sign_digest(sha2::Sha256::new_with_prefix(data)),
            _ => return Err(unsupported_hash(self.method)),
        }
        .map_err(|e| Error::Crypto(format!("DSA signing failed: {e}")))?;
        convert_asn1_to_xmldsig(&sig.to_bytes(), size)
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use digest::Digest;
        use signature::DigestVerifier;
        let vk = match key {
            SigningKey::Dsa(sk) => sk.verifying_key(),
            SigningKey::DsaPublic(vk) => vk,
            other => return Err(wrong_key(self.method, other)),
        };
        if sig_bytes.len() != self.check_q(vk)? * 2 {
            return Ok(false);
        }
        let Ok(der) = convert_xmldsig_to_asn1(sig_bytes) else {
            return Ok(false);
        };
        let Ok(sig) = dsa::Signature::try_from(der.as_slice()) else {
            return Ok(false);
        };
        let verified = match self.hash {
            DigestMethod::Sha1 => vk.verify_digest(sha1::Sha1::new_with_prefix(data), &sig),
            DigestMethod::Sha256 => vk.verify_digest(sha2::Sha256::new_with_prefix(data), &sig),
            _ => return Err(unsupported_hash(self.method)),
        };
        Ok(verified.is_ok())
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────

/// ECDSA over P-256 or P-384, chosen by the key. The message is hashed with
/// the method's digest and signed as a prehash; the signature value is the
/// fixed-width `r || s` concatenation.
struct Ecdsa {
    method: SignatureMethod,
    hash: DigestMethod,
}

impl SignatureAlgorithm for Ecdsa {
    fn method(&self) -> SignatureMethod {
        self.method
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::hazmat::PrehashSigner;
        let prehash = crate::digest::digest(self.hash, data);
        let map_err = |e: signature::Error| Error::Crypto(format!("ECDSA signing failed: {e}"));
        match key {
            SigningKey::EcP256(sk) => {
                let sig: p256::ecdsa::Signature = sk.sign_prehash(&prehash).map_err(map_err)?;
                Ok(sig.to_bytes().to_vec())
            }
            SigningKey::EcP384(sk) => {
                let sig: p384::ecdsa::Signature = sk.sign_prehash(&prehash).map_err(map_err)?;
                Ok(sig.to_bytes().to_vec())
            }
            SigningKey::EcP256Public(_) | SigningKey::EcP384Public(_) => {
                Err(public_only(self.method))
            }
            other => Err(wrong_key(self.method, other)),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::hazmat::PrehashVerifier;
        let prehash = crate::digest::digest(self.hash, data);
        match key {
            SigningKey::EcP256(_) | SigningKey::EcP256Public(_) => {
                let vk: &p256::ecdsa::VerifyingKey = match key {
                    SigningKey::EcP256(sk) => sk.verifying_key(),
                    SigningKey::EcP256Public(vk) => vk,
                    _ => return Err(wrong_key(self.method, key)),
                };
                let Ok(sig) = p256::ecdsa::Signature::from_slice(sig_bytes) else {
                    return Ok(false);
                };
                Ok(vk.verify_prehash(&prehash, &sig).is_ok())
            }
            SigningKey::EcP384(_) | SigningKey::EcP384Public(_) => {
                let vk: &p384::ecdsa::VerifyingKey = match key {
                    SigningKey::EcP384(sk) => sk.verifying_key(),
                    SigningKey::EcP384Public(vk) => vk,
                    _ => return Err(wrong_key(self.method, key)),
                };
                let Ok(sig) = p384::ecdsa::Signature::from_slice(sig_bytes) else {
                    return Ok(false);
                };
                Ok(vk.verify_prehash(&prehash, &sig).is_ok())
            }
            other => Err(wrong_key(self.method, other)),
        }
    }
}

// ── HMAC ─────────────────────────────────────────────────────────────

struct HmacSign {
    method: SignatureMethod,
    hash: DigestMethod,
    /// `HMACOutputLength` in bits.
    output_length: Option<u32>,
}

impl HmacSign {
    /// Reject truncation below the native digest length.
    fn check_output_length(&self) -> Result<(), Error> {
        if let Some(bits) = self.output_length {
            let native = self.hash.output_len() * 8;
            if (bits as usize) < native {
                return Err(Error::signature(format!(
                    "HMACOutputLength {bits} is less than the {native}-bit output of {}",
                    self.method.uri()
                )));
            }
        }
        Ok(())
    }

    fn key<'k>(&self, key: &'k SigningKey) -> Result<&'k [u8], Error> {
        match key {
            SigningKey::Hmac(k) => Ok(k),
            other => Err(wrong_key(self.method, other)),
        }
    }
}

macro_rules! with_hmac {
    ($hash:expr, $method:expr, $key:expr, |$mac:ident| $body:expr) => {{
        use hmac::Mac;
        let bad_key = |e: hmac::digest::InvalidLength| Error::InvalidKey(format!("HMAC key: {e}"));
        match $hash {
            DigestMethod::Sha1 => {
                let $mac = hmac::Hmac::<sha1::Sha1>::new_from_slice($key).map_err(bad_key)?;
                $body
            }
            DigestMethod::Sha224 => {
                let $mac = hmac::Hmac::<sha2::Sha224>::new_from_slice($key).map_err(bad_key)?;
                $body
            }
            DigestMethod::Sha256 => {
                let $mac = hmac::Hmac::<sha2::Sha256>::new_from_slice($key).map_err(bad_key)?;
                $body
            }
            DigestMethod::Sha384 => {
                let $mac = hmac::Hmac::<sha2::Sha384>::new_from_slice($key).map_err(bad_key)?;
                $body
            }
            DigestMethod::Sha512 => {
                let $mac = hmac::Hmac::<sha2::Sha512>::new_from_slice($key).map_err(bad_key)?;
                $body
            }
            DigestMethod::Md5 => {
                let $mac = hmac::Hmac::<md5::Md5>::new_from_slice($key).map_err(bad_key)?;
                $body
            }
            _ => Err(unsupported_hash($method)),
        }
    }};
}

impl SignatureAlgorithm for HmacSign {
    fn method(&self) -> SignatureMethod {
        self.method
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_output_length()?;
        let key = self.key(key)?;
        with_hmac!(self.hash, self.method, key, |mac| {
            let mut mac = mac;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        })
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        self.check_output_length()?;
        let key = self.key(key)?;
        with_hmac!(self.hash, self.method, key, |mac| {
            let mut mac = mac;
            mac.update(data);
            Ok(mac.verify_slice(sig_bytes).is_ok())
        })
    }
}

/// Constant-time byte comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkcs8::DecodePrivateKey;

    fn read_key(name: &str) -> String {
        let path = format!("{}/../../test-data/keys/{name}", env!("CARGO_MANIFEST_DIR"));
        std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{path}: {e}"))
    }

    #[test]
    fn test_descriptor_table() {
        for d in SignatureMethod::all() {
            assert_eq!(SignatureMethod::from_uri(d.uri).unwrap(), d.method);
            assert_eq!(d.method.algorithm(None).method(), d.method);
        }
        assert!(SignatureMethod::RsaMd5.is_weak());
        assert!(SignatureMethod::HmacSha256.is_hmac());
        assert!(matches!(
            from_uri("urn:nope"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_hmac_sha256_known_answer() {
        // RFC 4231 test case 2
        let alg = SignatureMethod::HmacSha256.algorithm(None);
        let key = SigningKey::Hmac(b"Jefe".to_vec());
        let mac = alg.sign(&key, b"what do ya want for nothing?").unwrap();
        let hex: String = mac.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(
            hex,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert!(alg.verify(&key, b"what do ya want for nothing?", &mac).unwrap());
        assert!(!alg.verify(&key, b"tampered", &mac).unwrap());
    }

    #[test]
    fn test_hmac_output_length() {
        let key = SigningKey::Hmac(b"secret".to_vec());
        let short = SignatureMethod::HmacSha1.algorithm(Some(80));
        assert!(matches!(short.sign(&key, b"x"), Err(Error::Signature { .. })));
        assert!(matches!(
            short.verify(&key, b"x", &[0u8; 10]),
            Err(Error::Signature { .. })
        ));

        let full = SignatureMethod::HmacSha1.algorithm(Some(160));
        let mac = full.sign(&key, b"x").unwrap();
        assert_eq!(mac.len(), 20);
        assert!(full.verify(&key, b"x", &mac).unwrap());
    }

    #[test]
    fn test_key_family_mismatch() {
        let alg = SignatureMethod::RsaSha256.algorithm(None);
        let key = SigningKey::Hmac(b"k".to_vec());
        assert!(matches!(alg.sign(&key, b"x"), Err(Error::InvalidKey(_))));
        assert!(matches!(alg.verify(&key, b"x", b"y"), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_rsa_round_trip_and_public_only() {
        let pem = read_key("rsa-2048.pem");
        let sk = rsa::RsaPrivateKey::from_pkcs8_pem(&pem).unwrap();
        let key = SigningKey::Rsa(sk);
        assert_eq!(key.key_size_bits(), 2048);

        let alg = SignatureMethod::RsaSha256.algorithm(None);
        let sig = alg.sign(&key, b"signed info").unwrap();
        assert_eq!(sig.len(), 256);
        let public = key.to_public();
        assert!(!public.is_private());
        assert!(alg.verify(&public, b"signed info", &sig).unwrap());
        assert!(!alg.verify(&public, b"signed inf0", &sig).unwrap());
        assert!(matches!(alg.sign(&public, b"x"), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_dsa_sha1_round_trip() {
        let pem = read_key("dsa-1024.pem");
        let key = SigningKey::Dsa(dsa::SigningKey::from_pkcs8_pem(&pem).unwrap());
        assert_eq!(key.key_size_bits(), 1024);
        let alg = SignatureMethod::DsaSha1.algorithm(None);
        let sig = alg.sign(&key, b"payload").unwrap();
        assert_eq!(sig.len(), 40);
        assert!(alg.verify(&key.to_public(), b"payload", &sig).unwrap());
        assert!(!alg.verify(&key, b"other", &sig).unwrap());
    }

    #[test]
    fn test_dsa_sha256_round_trip() {
        let pem = read_key("dsa-2048.pem");
        let key = SigningKey::Dsa(dsa::SigningKey::from_pkcs8_pem(&pem).unwrap());
        let alg = SignatureMethod::DsaSha256.algorithm(None);
        let sig = alg.sign(&key, b"payload").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(alg.verify(&key.to_public(), b"payload", &sig).unwrap());
        assert!(!alg.verify(&key, b"payload", &sig[..40]).unwrap());
    }

    #[test]
    fn test_dsa_sha1_rejects_wide_subgroup() {
        let pem = read_key("dsa-2048.pem");
        let key = SigningKey::Dsa(dsa::SigningKey::from_pkcs8_pem(&pem).unwrap());
        let alg = SignatureMethod::DsaSha1.algorithm(None);
        assert!(matches!(alg.sign(&key, b"payload"), Err(Error::InvalidKey(_))));
        assert!(matches!(
            alg.verify(&key.to_public(), b"payload", &[1u8; 40]),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_dsa_asn1_xmldsig_conversion() {
        let mut raw = vec![0u8; 40];
        raw[1] = 0x80;
        raw[19] = 7;
        raw[20] = 0xff;
        raw[39] = 1;
        let der = convert_xmldsig_to_asn1(&raw).unwrap();
        assert_eq!(der[0], 0x30);
        assert_eq!(der[2], 0x02);
        assert_eq!(convert_asn1_to_xmldsig(&der, 20).unwrap(), raw);
        assert!(convert_asn1_to_xmldsig(&der, 10).is_err());
        assert!(convert_xmldsig_to_asn1(&[1, 2, 3]).is_err());
        assert!(convert_xmldsig_to_asn1(&[]).is_err());
        assert!(convert_xmldsig_to_asn1(&[0u8; 40]).is_err());

        let mut bad_sequence = der.clone();
        bad_sequence[0] = 0x31;
        assert!(matches!(
            convert_asn1_to_xmldsig(&bad_sequence, 20),
            Err(Error::Crypto(_))
        ));
        let mut bad_integer = der.clone();
        bad_integer[2] = 0x04;
        assert!(matches!(
            convert_asn1_to_xmldsig(&bad_integer, 20),
            Err(Error::Crypto(_))
        ));
        assert!(convert_asn1_to_xmldsig(&der[..der.len() - 1], 20).is_err());

        // r is a 21-byte INTEGER.
        let mut long_r = vec![0x30, 0x1a, 0x02, 0x15, 0x01];
        long_r.extend_from_slice(&[0x22; 20]);
        long_r.extend_from_slice(&[0x02, 0x01, 0x01]);
        assert!(matches!(
            convert_asn1_to_xmldsig(&long_r, 20),
            Err(Error::Crypto(_))
        ));
        let widened = convert_asn1_to_xmldsig(&long_r, 21).unwrap();
        assert_eq!(widened[0], 0x01);
        assert_eq!(widened[41], 0x01);
        assert_eq!(convert_xmldsig_to_asn1(&widened).unwrap(), long_r);
    }

    #[test]
    fn test_ecdsa_p256_round_trip() {
        let pem = read_key("ec-p256.pem");
        let key = SigningKey::EcP256(p256::ecdsa::SigningKey::from_pkcs8_pem(&pem).unwrap());
        for method in [SignatureMethod::EcdsaSha256, SignatureMethod::EcdsaSha512] {
            let alg = method.algorithm(None);
            let sig = alg.sign(&key, b"payload").unwrap();
            assert_eq!(sig.len(), 64);
            assert!(alg.verify(&key.to_public(), b"payload", &sig).unwrap());
            assert!(!alg.verify(&key, b"tampered", &sig).unwrap());
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
