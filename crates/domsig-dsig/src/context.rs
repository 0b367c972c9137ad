#![forbid(unsafe_code)]

//! DSig context: configuration, key selection and resolvers for signature
//! operations.

use crate::key_selector::KeySelector;
use crate::secure::SecurePolicy;
use domsig_core::{ns, Error};
use domsig_transforms::{ResourceResolver, TransformEnv, XsltEngine};
use std::sync::Arc;

/// Processing flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsigConfig {
    /// Append a C14N 1.1 transform to references whose chain ends in XML.
    pub use_c14n11: bool,
    /// Keep the dereferenced data and digest input of each reference.
    pub cache_reference: bool,
    /// Enforce the [`SecurePolicy`].
    pub secure_validation: bool,
    /// Also validate references inside Manifests.
    pub validate_manifests: bool,
}

impl Default for DsigConfig {
    fn default() -> Self {
        Self {
            use_c14n11: false,
            cache_reference: false,
            secure_validation: true,
            validate_manifests: false,
        }
    }
}

impl DsigConfig {
    /// Defaults overlaid with the `DOMSIG_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Overlay values looked up by variable name.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flags: [(&str, &mut bool); 4] = [
            ("DOMSIG_USE_C14N11", &mut self.use_c14n11),
            ("DOMSIG_CACHE_REFERENCE", &mut self.cache_reference),
            ("DOMSIG_SECURE_VALIDATION", &mut self.secure_validation),
            ("DOMSIG_VALIDATE_MANIFESTS", &mut self.validate_manifests),
        ];
        for (name, slot) in flags {
            if let Some(value) = lookup(name) {
                *slot = parse_flag(name, &value)?;
            }
        }
        Ok(self)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Other(format!("{name}: not a boolean: {other:?}"))),
    }
}

/// Context for XML-DSig operations.
pub struct DsigContext {
    pub config: DsigConfig,
    /// Limits applied when `config.secure_validation` is set.
    pub policy: SecurePolicy,
    pub key_selector: Box<dyn KeySelector>,
    /// Additional ID attribute names to register.
    pub id_attrs: Vec<String>,
    /// Resolver for URIs outside the signature document.
    pub resolver: Option<Box<dyn ResourceResolver>>,
    pub xslt: Option<Box<dyn XsltEngine>>,
    /// Base URI handed to the resolver.
    pub base_uri: Option<String>,
    /// Namespace prefix for marshalled signature elements.
    pub prefix: String,
}

impl DsigContext {
    /// Create a new DSig context with the given key selector.
    pub fn new(key_selector: impl KeySelector + 'static) -> Self {
        Self {
            config: DsigConfig::default(),
            policy: SecurePolicy::default(),
            key_selector: Box::new(key_selector),
            id_attrs: Vec::new(),
            resolver: None,
            xslt: None,
            base_uri: None,
            prefix: ns::DEFAULT_DSIG_PREFIX.to_owned(),
        }
    }

    pub fn with_config(mut self, config: DsigConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_policy(mut self, policy: SecurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_resolver(mut self, resolver: impl ResourceResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn with_xslt(mut self, engine: impl XsltEngine + 'static) -> Self {
        self.xslt = Some(Box::new(engine));
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replace the key selector.
    pub fn set_key_selector(&mut self, key_selector: impl KeySelector + 'static) {
        self.key_selector = Box::new(key_selector);
    }

    /// Add an ID attribute name to register during processing.
    pub fn add_id_attr(&mut self, name: &str) {
        self.id_attrs.push(name.to_owned());
    }

    /// The policy to enforce, if secure validation is on.
    pub fn active_policy(&self) -> Option<&SecurePolicy> {
        self.config.secure_validation.then_some(&self.policy)
    }

    /// A transform environment over `document` with this context's
    /// resolvers and ID attributes.
    pub fn transform_env(&self, document: Arc<str>) -> TransformEnv<'_> {
        TransformEnv {
            document: Some(document),
            signature: None,
            transforms_owner: None,
            id_attrs: &self.id_attrs,
            resolver: self.resolver.as_deref(),
            xslt: self.xslt.as_deref(),
            base_uri: self.base_uri.as_deref(),
            reject_duplicate_ids: self
                .active_policy()
                .is_some_and(|p| p.reject_duplicate_ids),
        }
    }
}

impl std::fmt::Debug for DsigContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsigContext")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("id_attrs", &self.id_attrs)
            .field("resolver", &self.resolver.is_some())
            .field("xslt", &self.xslt.is_some())
            .field("base_uri", &self.base_uri)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domsig_keys::KeysManager;
    use std::collections::HashMap;

    #[test]
    fn test_config_defaults() {
        let config = DsigConfig::default();
        assert!(config.secure_validation);
        assert!(!config.use_c14n11);
        assert!(!config.cache_reference);
        assert!(!config.validate_manifests);
    }

    #[test]
    fn test_config_overlay() {
        let vars: HashMap<&str, &str> = [
            ("DOMSIG_USE_C14N11", "yes"),
            ("DOMSIG_SECURE_VALIDATION", "Off"),
            ("DOMSIG_VALIDATE_MANIFESTS", "1"),
        ]
        .into_iter()
        .collect();
        let config = DsigConfig::default()
            .overlay(|name| vars.get(name).map(|v| (*v).to_owned()))
            .unwrap();
        assert!(config.use_c14n11);
        assert!(!config.secure_validation);
        assert!(config.validate_manifests);
        assert!(!config.cache_reference);

        let bad = DsigConfig::default().overlay(|name| {
            (name == "DOMSIG_CACHE_REFERENCE").then(|| "maybe".to_owned())
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_transform_env_follows_policy() {
        let mut ctx = DsigContext::new(KeysManager::new());
        ctx.add_id_attr("wsu:Id");
        let doc: Arc<str> = Arc::from("<a/>");
        let env = ctx.transform_env(Arc::clone(&doc));
        assert!(env.reject_duplicate_ids);
        assert_eq!(env.id_attrs, ["wsu:Id".to_owned()]);
        assert!(env.is_signature_document(&doc));

        let ctx = ctx.with_config(DsigConfig {
            secure_validation: false,
            ..DsigConfig::default()
        });
        assert!(ctx.active_policy().is_none());
        assert!(!ctx.transform_env(doc).reject_duplicate_ids);
    }
}
