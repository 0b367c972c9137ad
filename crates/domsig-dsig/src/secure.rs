#![forbid(unsafe_code)]

//! Limits enforced under secure validation.

use domsig_core::{algorithm, Error};
use domsig_crypto::KeyFamily;
use domsig_keys::Key;
use domsig_transforms::uri::uri_scheme;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurePolicy {
    /// Per Manifest or SignedInfo.
    pub max_references: usize,
    /// Per Reference.
    pub max_transforms: usize,
    /// Digest, signature and transform algorithm URIs that are rejected.
    pub forbidden_algorithms: Vec<String>,
    /// Reference URI schemes that are rejected.
    pub forbidden_uri_schemes: Vec<String>,
    pub forbid_retrieval_method_chains: bool,
    pub reject_duplicate_ids: bool,
    pub min_rsa_bits: usize,
    pub min_dsa_bits: usize,
    pub min_ec_bits: usize,
}

impl Default for SecurePolicy {
    fn default() -> Self {
        Self {
            max_references: 30,
            max_transforms: 5,
            forbidden_algorithms: [
                algorithm::MD5,
                algorithm::RSA_MD5,
                algorithm::HMAC_MD5,
                algorithm::XSLT,
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
            forbidden_uri_schemes: ["file", "http", "https"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            forbid_retrieval_method_chains: true,
            reject_duplicate_ids: true,
            min_rsa_bits: 1024,
            min_dsa_bits: 1024,
            min_ec_bits: 224,
        }
    }
}

fn violation(message: String) -> Error {
    tracing::warn!(%message, "secure validation rejected input");
    Error::SecureValidation(message)
}

impl SecurePolicy {
    pub fn check_reference_count(&self, count: usize, owner: &str) -> Result<(), Error> {
        if count > self.max_references {
            return Err(violation(format!(
                "{owner} has {count} references, the limit is {}",
                self.max_references
            )));
        }
        Ok(())
    }

    pub fn check_transform_count(&self, count: usize) -> Result<(), Error> {
        if count > self.max_transforms {
            return Err(violation(format!(
                "reference has {count} transforms, the limit is {}",
                self.max_transforms
            )));
        }
        Ok(())
    }

    pub fn check_algorithm(&self, uri: &str) -> Result<(), Error> {
        if self.forbidden_algorithms.iter().any(|a| a == uri) {
            return Err(violation(format!("algorithm {uri} is forbidden")));
        }
        Ok(())
    }

    pub fn check_uri(&self, uri: &str) -> Result<(), Error> {
        match uri_scheme(uri) {
            Some(scheme) if self.forbidden_uri_schemes.contains(&scheme) => Err(violation(
                format!("reference URI scheme {scheme:?} is forbidden: {uri}"),
            )),
            _ => Ok(()),
        }
    }

    pub fn check_key(&self, key: &Key) -> Result<(), Error> {
        let minimum = match key.family() {
            KeyFamily::Rsa => self.min_rsa_bits,
            KeyFamily::Dsa => self.min_dsa_bits,
            KeyFamily::Ecdsa => self.min_ec_bits,
            KeyFamily::Hmac => 0,
        };
        let bits = key.key_size_bits();
        if bits < minimum {
            return Err(violation(format!(
                "{:?} key of {bits} bits is below the {minimum}-bit minimum",
                key.family()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let policy = SecurePolicy::default();
        assert!(policy.check_reference_count(30, "Manifest").is_ok());
        assert!(matches!(
            policy.check_reference_count(31, "Manifest"),
            Err(Error::SecureValidation(_))
        ));
        assert!(policy.check_transform_count(5).is_ok());
        assert!(policy.check_transform_count(6).is_err());
        assert!(policy.check_algorithm(algorithm::SHA256).is_ok());
        assert!(policy.check_algorithm(algorithm::HMAC_MD5).is_err());
        assert!(policy.check_algorithm(algorithm::XSLT).is_err());
    }

    #[test]
    fn test_uri_schemes() {
        let policy = SecurePolicy::default();
        assert!(policy.check_uri("").is_ok());
        assert!(policy.check_uri("#obj").is_ok());
        assert!(policy.check_uri("cid:part1").is_ok());
        assert!(policy.check_uri("HTTPS://example.com/x").is_err());
        assert!(policy.check_uri("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_key_sizes() {
        let policy = SecurePolicy::default();
        let hmac = domsig_keys::loader::load_hmac_key(b"k");
        assert!(policy.check_key(&hmac).is_ok());
    }
}
