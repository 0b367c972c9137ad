#![forbid(unsafe_code)]

//! `<Reference>`: dereference, transform, digest and compare.

use crate::secure::SecurePolicy;
use base64::Engine;
use domsig_core::{ns, Error};
use domsig_crypto::{constant_time_eq, DigestMethod, DigestSink};
use domsig_transforms::{chain, uri, DataKind, Transform, TransformData, TransformEnv};
use domsig_xml::document::{element_children, find_child_element, text_content};
use domsig_xml::writer::qualify;
use domsig_xml::XmlWriter;
use roxmltree::Node;

const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// What the digest of a reference was computed over, kept when
/// reference caching is on.
#[derive(Debug, Clone)]
pub struct RetainedData {
    /// The dereferenced (or applied) data before any transform ran.
    pub data: TransformData,
    /// The exact bytes fed to the digest.
    pub digest_input: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub uri: Option<String>,
    pub ref_type: Option<String>,
    pub id: Option<String>,
    pub digest_method: DigestMethod,
    pub transforms: Vec<Transform>,
    digest_value: Option<Vec<u8>>,
    calculated_digest: Option<Vec<u8>>,
    digested: bool,
    validation: Option<bool>,
    /// Pre-computed input and the number of transforms already applied to it.
    applied: Option<(TransformData, usize)>,
    retained: Option<RetainedData>,
}

impl Reference {
    pub fn new(uri: impl Into<String>, digest_method: DigestMethod) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::without_uri(digest_method)
        }
    }

    /// A reference with no `URI` attribute. It needs applied data to be
    /// digested.
    pub fn without_uri(digest_method: DigestMethod) -> Self {
        Self {
            uri: None,
            ref_type: None,
            id: None,
            digest_method,
            transforms: Vec::new(),
            digest_value: None,
            calculated_digest: None,
            digested: false,
            validation: None,
            applied: None,
            retained: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, ref_type: impl Into<String>) -> Self {
        self.ref_type = Some(ref_type.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Digest `data` instead of dereferencing the URI, skipping the first
    /// `applied` transforms which were already run over it.
    pub fn with_applied_data(mut self, data: TransformData, applied: usize) -> Self {
        self.applied = Some((data, applied.min(self.transforms.len())));
        self
    }

    /// The `DigestValue`: unmarshalled, or computed by [`Reference::digest`].
    pub fn digest_value(&self) -> Option<&[u8]> {
        self.digest_value.as_deref()
    }

    /// The digest computed during validation.
    pub fn calculated_digest_value(&self) -> Option<&[u8]> {
        self.calculated_digest.as_deref()
    }

    pub fn is_digested(&self) -> bool {
        self.digested
    }

    /// `None` until [`Reference::validate`] has run.
    pub fn validation_status(&self) -> Option<bool> {
        self.validation
    }

    /// The data the digest started from, when reference caching is on.
    pub fn dereferenced_data(&self) -> Option<&TransformData> {
        self.retained.as_ref().map(|r| &r.data)
    }

    /// The exact digest input, when reference caching is on.
    pub fn digest_input(&self) -> Option<&[u8]> {
        self.retained.as_ref().map(|r| r.digest_input.as_slice())
    }

    pub fn has_xpath_transform(&self) -> bool {
        self.transforms.iter().any(Transform::is_xpath)
    }

    /// Whether the chain ends in XML, worked out without running it.
    ///
    /// Same-document URIs count as XML and external ones as octets.
    pub fn output_kind(&self) -> DataKind {
        let (input, start) = match &self.applied {
            Some((data, applied)) => (data.kind(), *applied),
            None => {
                let same_doc = self
                    .uri
                    .as_deref()
                    .map(|u| u.is_empty() || u.starts_with('#'))
                    .unwrap_or(false);
                let kind = if same_doc { DataKind::Xml } else { DataKind::Octets };
                (kind, 0)
            }
        };
        chain::output_kind(&self.transforms[start..], input)
    }

    fn describe(&self) -> String {
        match (&self.id, &self.uri) {
            (Some(id), _) => format!("reference {id}"),
            (None, Some(uri)) => format!("reference URI={uri:?}"),
            (None, None) => "reference without URI".to_owned(),
        }
    }

    // ── Digesting ────────────────────────────────────────────────────

    /// Compute and store the DigestValue. A second call does nothing.
    pub fn digest(&mut self, env: &TransformEnv<'_>, retain: bool) -> Result<(), Error> {
        if self.digested {
            return Ok(());
        }
        let (value, retained) = self
            .compute(env, retain)
            .map_err(|e| Error::wrap_signature(format!("digest of {}", self.describe()), e))?;
        tracing::debug!(reference = %self.describe(), "reference digested");
        self.digest_value = Some(value);
        self.retained = retained;
        self.digested = true;
        Ok(())
    }

    /// Recompute the digest and compare it with the DigestValue.
    ///
    /// The outcome is cached: later calls return it without recomputing.
    pub fn validate(&mut self, env: &TransformEnv<'_>, retain: bool) -> Result<bool, Error> {
        if let Some(status) = self.validation {
            return Ok(status);
        }
        let expected = self
            .digest_value
            .clone()
            .ok_or_else(|| Error::signature(format!("{} has no DigestValue", self.describe())))?;
        let (value, retained) = self
            .compute(env, retain)
            .map_err(|e| Error::wrap_signature(format!("digest of {}", self.describe()), e))?;
        let ok = constant_time_eq(&value, &expected);
        if ok {
            tracing::debug!(reference = %self.describe(), "reference digest matches");
        } else {
            tracing::warn!(reference = %self.describe(), "reference digest mismatch");
        }
        self.calculated_digest = Some(value);
        self.retained = retained;
        self.validation = Some(ok);
        Ok(ok)
    }

    fn compute(
        &self,
        env: &TransformEnv<'_>,
        retain: bool,
    ) -> Result<(Vec<u8>, Option<RetainedData>), Error> {
        let (input, start) = match &self.applied {
            Some((data, applied)) => (data.clone(), *applied),
            None => {
                let uri = self.uri.as_deref().ok_or_else(|| {
                    Error::signature("reference has no URI and no applied data")
                })?;
                (uri::dereference(uri, env)?, 0)
            }
        };
        let kept = retain.then(|| input.clone());
        let mut sink = if retain {
            DigestSink::capturing(self.digest_method)
        } else {
            DigestSink::new(self.digest_method)
        };
        chain::apply_into(&self.transforms, input, env, start, &mut sink)?;
        tracing::debug!(
            digest = self.digest_method.native_name(),
            bytes = sink.bytes_written(),
            "digest input complete"
        );
        let (value, captured) = sink.finish();
        let retained = kept
            .zip(captured)
            .map(|(data, digest_input)| RetainedData { data, digest_input });
        Ok((value, retained))
    }

    // ── XML ──────────────────────────────────────────────────────────

    pub fn from_node(node: Node<'_, '_>, policy: Option<&SecurePolicy>) -> Result<Self, Error> {
        let uri = node.attribute(ns::attr::URI).map(str::to_owned);
        let transforms: Vec<Transform> =
            match find_child_element(node, ns::DSIG, ns::node::TRANSFORMS) {
                Some(list) => element_children(list)
                    .map(Transform::from_node)
                    .collect::<Result<_, _>>()?,
                None => Vec::new(),
            };

        let method_node = find_child_element(node, ns::DSIG, ns::node::DIGEST_METHOD)
            .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?;
        let method_uri = method_node
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on DigestMethod".into()))?;
        let digest_method = DigestMethod::from_uri(method_uri)?;

        let value_node = find_child_element(node, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
        let clean: String = text_content(value_node)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let digest_value = ENGINE
            .decode(clean)
            .map_err(|e| Error::Base64(format!("DigestValue: {e}")))?;

        if let Some(policy) = policy {
            policy.check_transform_count(transforms.len())?;
            policy.check_algorithm(method_uri)?;
            for transform in &transforms {
                policy.check_algorithm(transform.algorithm())?;
            }
            if let Some(uri) = &uri {
                policy.check_uri(uri)?;
            }
        }

        Ok(Self {
            uri,
            ref_type: node.attribute(ns::attr::TYPE).map(str::to_owned),
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            digest_method,
            transforms,
            digest_value: Some(digest_value),
            ..Self::without_uri(digest_method)
        })
    }

    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        let qname = qualify(prefix, ns::node::REFERENCE);
        let mut attrs = Vec::new();
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id.as_str()));
        }
        if let Some(uri) = &self.uri {
            attrs.push((ns::attr::URI, uri.as_str()));
        }
        if let Some(t) = &self.ref_type {
            attrs.push((ns::attr::TYPE, t.as_str()));
        }
        w.start_element(&qname, &attrs)?;
        if !self.transforms.is_empty() {
            let list = qualify(prefix, ns::node::TRANSFORMS);
            w.start_element(&list, &[])?;
            for transform in &self.transforms {
                transform.marshal(w, prefix)?;
            }
            w.end_element(&list)?;
        }
        w.empty_element(
            &qualify(prefix, ns::node::DIGEST_METHOD),
            &[(ns::attr::ALGORITHM, self.digest_method.uri())],
        )?;
        let value = self
            .digest_value
            .as_deref()
            .map(|v| ENGINE.encode(v))
            .unwrap_or_default();
        w.text_element(&qualify(prefix, ns::node::DIGEST_VALUE), &[], &value)?;
        w.end_element(&qname)
    }
}
