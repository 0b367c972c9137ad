#![forbid(unsafe_code)]

//! `<Signature>`: the sign and validate state machine.
//!
//! Signing works on the marshalled form. Every reference is digested
//! against a fresh render of the whole document, so a reference that covers
//! another reference (or a Manifest) sees the DigestValues computed before
//! it. Validation re-parses the text the signature was read from.

use crate::context::DsigContext;
use crate::key_selector::Purpose;
use crate::keyinfo::{key_info_element, KeyInfo};
use crate::object::XmlObject;
use crate::reference::Reference;
use crate::secure::SecurePolicy;
use crate::signature_value::{self, SignatureValue};
use crate::signed_info::SignedInfo;
use base64::Engine;
use domsig_c14n::C14nMode;
use domsig_core::{ns, Error};
use domsig_transforms::{DataKind, Transform, TransformData, TransformEnv};
use domsig_xml::document::{
    element_qname, find_child_element, find_child_elements, find_element, is_element,
    text_content,
};
use domsig_xml::writer::qualify;
use domsig_xml::xpath::{parse_same_document_ref, SameDocumentRef};
use domsig_xml::{IdRegistry, XmlWriter};
use roxmltree::{Document, Node};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Where a reference lives inside a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefPath {
    /// The i-th Reference of SignedInfo.
    SignedInfo(usize),
    /// A Reference of the `manifest`-th Manifest of the `object`-th Object.
    Manifest {
        object: usize,
        manifest: usize,
        reference: usize,
    },
}

impl std::fmt::Display for RefPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefPath::SignedInfo(i) => write!(f, "SignedInfo/Reference[{}]", i + 1),
            RefPath::Manifest {
                object,
                manifest,
                reference,
            } => write!(
                f,
                "Object[{}]/Manifest[{}]/Reference[{}]",
                object + 1,
                manifest + 1,
                reference + 1
            ),
        }
    }
}

/// Where the signature goes when it is signed.
#[derive(Debug, Clone)]
pub enum SignatureTarget {
    /// The Signature element is the whole document.
    Enveloping,
    /// Append the Signature as the last child of the element with ID
    /// `parent_id`, or of the root element.
    Enveloped {
        document: String,
        parent_id: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct Source {
    xml: Arc<str>,
    /// Byte offset of the Signature start tag.
    offset: usize,
}

/// Document text around the Signature element.
struct Layout {
    prefix: String,
    suffix: String,
}

/// Signature-schema elements that references can depend on.
#[derive(Debug, Clone, Copy)]
enum Structure {
    Reference(RefPath),
    Manifest { object: usize, manifest: usize },
    Object(usize),
}

#[derive(Debug, Clone)]
pub struct XmlSignature {
    pub id: Option<String>,
    pub signed_info: SignedInfo,
    pub signature_value: SignatureValue,
    pub key_info: Option<KeyInfo>,
    pub objects: Vec<XmlObject>,
    source: Option<Source>,
    validation: Option<bool>,
    digest_order: Vec<RefPath>,
}

impl XmlSignature {
    pub fn new(signed_info: SignedInfo) -> Self {
        Self {
            id: None,
            signed_info,
            signature_value: SignatureValue::default(),
            key_info: None,
            objects: Vec::new(),
            source: None,
            validation: None,
            digest_order: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_key_info(mut self, key_info: KeyInfo) -> Self {
        self.key_info = Some(key_info);
        self
    }

    pub fn with_object(mut self, object: XmlObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_signature_value_id(mut self, id: impl Into<String>) -> Self {
        self.signature_value.id = Some(id.into());
        self
    }

    /// `None` until [`XmlSignature::validate`] has run.
    pub fn validation_status(&self) -> Option<bool> {
        self.validation
    }

    /// True once signed or when read from a document.
    pub fn is_signed(&self) -> bool {
        self.source.is_some()
    }

    /// The document text this signature was read from or rendered into.
    pub fn source(&self) -> Option<&str> {
        self.source.as_ref().map(|s| &*s.xml)
    }

    /// References in the order they were digested by the last `sign`.
    pub fn digest_order(&self) -> &[RefPath] {
        &self.digest_order
    }

    pub fn reference(&self, path: RefPath) -> Option<&Reference> {
        match path {
            RefPath::SignedInfo(i) => self.signed_info.references.get(i),
            RefPath::Manifest {
                object,
                manifest,
                reference,
            } => self
                .objects
                .get(object)?
                .manifests()
                .nth(manifest)?
                .references
                .get(reference),
        }
    }

    pub fn reference_mut(&mut self, path: RefPath) -> Option<&mut Reference> {
        match path {
            RefPath::SignedInfo(i) => self.signed_info.references.get_mut(i),
            RefPath::Manifest {
                object,
                manifest,
                reference,
            } => self
                .objects
                .get_mut(object)?
                .manifests_mut()
                .nth(manifest)?
                .references
                .get_mut(reference),
        }
    }

    fn signed_info_paths(&self) -> Vec<RefPath> {
        (0..self.signed_info.references.len())
            .map(RefPath::SignedInfo)
            .collect()
    }

    /// Paths of every Manifest reference, in document order.
    pub fn manifest_paths(&self) -> Vec<RefPath> {
        (0..self.objects.len())
            .flat_map(|object| self.object_paths(object))
            .collect()
    }

    fn object_paths(&self, object: usize) -> Vec<RefPath> {
        let Some(obj) = self.objects.get(object) else {
            return Vec::new();
        };
        obj.manifests()
            .enumerate()
            .flat_map(|(manifest, m)| {
                (0..m.references.len()).map(move |reference| RefPath::Manifest {
                    object,
                    manifest,
                    reference,
                })
            })
            .collect()
    }

    fn manifest_reference_paths(&self, object: usize, manifest: usize) -> Vec<RefPath> {
        self.object_paths(object)
            .into_iter()
            .filter(|p| matches!(p, RefPath::Manifest { manifest: m, .. } if *m == manifest))
            .collect()
    }

    // ── Unmarshalling ────────────────────────────────────────────────

    /// Read the first `<Signature>` of `xml`.
    pub fn parse(xml: &str, ctx: &DsigContext) -> Result<Self, Error> {
        let text: Arc<str> = Arc::from(xml);
        let doc = domsig_xml::parse(&text)?;
        let node = find_element(&doc, ns::DSIG, ns::node::SIGNATURE)
            .ok_or_else(|| Error::MissingElement("Signature".into()))?;
        let mut signature = Self::from_node(node, ctx.active_policy())?;
        signature.source = Some(Source {
            xml: Arc::clone(&text),
            offset: node.range().start,
        });
        Ok(signature)
    }

    /// Read the structure under a `<Signature>` element. The result has no
    /// source document and cannot be validated.
    pub fn from_node(node: Node<'_, '_>, policy: Option<&SecurePolicy>) -> Result<Self, Error> {
        let si_node = find_child_element(node, ns::DSIG, ns::node::SIGNED_INFO)
            .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
        let signed_info = SignedInfo::from_node(si_node, policy)?;

        let sv_node = find_child_element(node, ns::DSIG, ns::node::SIGNATURE_VALUE)
            .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
        let clean: String = text_content(sv_node)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let value = base64::engine::general_purpose::STANDARD
            .decode(clean)
            .map_err(|e| Error::Base64(format!("SignatureValue: {e}")))?;

        let key_info = key_info_element(node).map(KeyInfo::from_node).transpose()?;
        let objects = find_child_elements(node, ns::DSIG, ns::node::OBJECT)
            .into_iter()
            .map(|o| XmlObject::from_node(o, policy))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            signature_value: SignatureValue {
                id: sv_node.attribute(ns::attr::ID).map(str::to_owned),
                value,
            },
            key_info,
            objects,
            ..Self::new(signed_info)
        })
    }

    // ── Marshalling ──────────────────────────────────────────────────

    /// Write `<prefix:Signature>`, declaring the signature namespace on it.
    pub fn marshal(&self, w: &mut XmlWriter, prefix: &str) -> Result<(), Error> {
        let qname = qualify(prefix, ns::node::SIGNATURE);
        let xmlns = if prefix.is_empty() {
            "xmlns".to_owned()
        } else {
            format!("xmlns:{prefix}")
        };
        let mut attrs = vec![(xmlns.as_str(), ns::DSIG)];
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id.as_str()));
        }
        w.start_element(&qname, &attrs)?;
        self.signed_info.marshal(w, prefix)?;
        self.signature_value.marshal(w, prefix)?;
        if let Some(key_info) = &self.key_info {
            key_info.marshal(w, prefix)?;
        }
        for object in &self.objects {
            object.marshal(w, prefix)?;
        }
        w.end_element(&qname)
    }

    /// The Signature element on its own.
    pub fn to_xml(&self, prefix: &str) -> Result<String, Error> {
        let mut w = XmlWriter::new();
        self.marshal(&mut w, prefix)?;
        w.into_string()
    }

    fn render(&self, ctx: &DsigContext, layout: &Layout) -> Result<(Arc<str>, usize), Error> {
        let body = self.to_xml(&ctx.prefix)?;
        let mut xml = String::with_capacity(layout.prefix.len() + body.len() + layout.suffix.len());
        xml.push_str(&layout.prefix);
        xml.push_str(&body);
        xml.push_str(&layout.suffix);
        Ok((Arc::from(xml), layout.prefix.len()))
    }

    // ── Signing ──────────────────────────────────────────────────────

    /// Digest every reference, compute the SignatureValue and return the
    /// signed document.
    pub fn sign(&mut self, ctx: &DsigContext, target: &SignatureTarget) -> Result<String, Error> {
        let layout = Layout::for_target(target, ctx)?;
        if ctx.config.use_c14n11 {
            self.append_c14n11();
        }
        let structures = self.structure_map();
        self.digest_order.clear();

        let order: Vec<RefPath> = self
            .manifest_paths()
            .into_iter()
            .chain(self.signed_info_paths())
            .collect();
        let mut resolving = HashSet::new();
        for &path in &order {
            let deferred = self
                .reference(path)
                .is_some_and(|r| r.uri.as_deref() == Some("") && r.has_xpath_transform());
            if deferred {
                tracing::debug!(%path, "deferring whole-document XPath reference");
                continue;
            }
            self.digest_path(path, ctx, &layout, &structures, &mut resolving)?;
        }
        for &path in &order {
            self.digest_path(path, ctx, &layout, &structures, &mut resolving)?;
        }

        let method = self.signed_info.signature_method;
        let selected = ctx
            .key_selector
            .select(self.key_info.as_ref(), Purpose::Sign, method)?
            .ok_or_else(|| {
                Error::signature(format!("no key available to sign with {}", method.uri()))
            })?;
        tracing::debug!(source = ?selected.source, "selected signing key");

        let (xml, offset) = self.render(ctx, &layout)?;
        let signed_info = signed_info_data(&xml, offset)?;
        self.signature_value.value = signature_value::sign(
            &selected.key,
            &signed_info,
            &self.signed_info.canonicalization,
            method,
            self.signed_info.hmac_output_length,
        )?;

        let (xml, offset) = self.render(ctx, &layout)?;
        self.source = Some(Source {
            xml: Arc::clone(&xml),
            offset,
        });
        self.validation = None;
        tracing::info!(
            method = method.uri(),
            references = self.signed_info.references.len(),
            "signature created"
        );
        Ok(xml.to_string())
    }

    /// Append C14N 1.1 to every undigested reference whose chain ends in XML.
    fn append_c14n11(&mut self) {
        let references = self.signed_info.references.iter_mut().chain(
            self.objects
                .iter_mut()
                .flat_map(|o| o.manifests_mut())
                .flat_map(|m| m.references.iter_mut()),
        );
        for reference in references {
            if !reference.is_digested() && reference.output_kind() == DataKind::Xml {
                tracing::debug!(uri = ?reference.uri, "appending C14N 1.1 transform");
                reference
                    .transforms
                    .push(Transform::c14n(C14nMode::Inclusive11));
            }
        }
    }

    fn structure_map(&self) -> HashMap<String, Structure> {
        let mut map = HashMap::new();
        for path in self.signed_info_paths().into_iter().chain(self.manifest_paths()) {
            if let Some(id) = self.reference(path).and_then(|r| r.id.clone()) {
                map.entry(id).or_insert(Structure::Reference(path));
            }
        }
        for (object, obj) in self.objects.iter().enumerate() {
            if let Some(id) = &obj.id {
                map.entry(id.clone()).or_insert(Structure::Object(object));
            }
            for (manifest, m) in obj.manifests().enumerate() {
                if let Some(id) = &m.id {
                    map.entry(id.clone())
                        .or_insert(Structure::Manifest { object, manifest });
                }
            }
        }
        map
    }

    /// References that must be digested before the one at `path`.
    fn dependencies(&self, path: RefPath, structures: &HashMap<String, Structure>) -> Vec<RefPath> {
        let Some(uri) = self.reference(path).and_then(|r| r.uri.as_deref()) else {
            return Vec::new();
        };
        let id = match parse_same_document_ref(uri) {
            Ok(Some(SameDocumentRef::Id(id) | SameDocumentRef::XPointerId(id))) => id,
            _ => return Vec::new(),
        };
        match structures.get(id) {
            Some(Structure::Reference(p)) => vec![*p],
            Some(Structure::Manifest { object, manifest }) => {
                self.manifest_reference_paths(*object, *manifest)
            }
            Some(Structure::Object(object)) => self.object_paths(*object),
            None => Vec::new(),
        }
    }

    fn digest_path(
        &mut self,
        path: RefPath,
        ctx: &DsigContext,
        layout: &Layout,
        structures: &HashMap<String, Structure>,
        resolving: &mut HashSet<RefPath>,
    ) -> Result<(), Error> {
        let reference = self
            .reference(path)
            .ok_or_else(|| Error::signature(format!("no reference at {path}")))?;
        if reference.is_digested() {
            return Ok(());
        }
        if !resolving.insert(path) {
            return Err(Error::signature(format!(
                "reference dependency cycle through {path}"
            )));
        }
        for dependency in self.dependencies(path, structures) {
            self.digest_path(dependency, ctx, layout, structures, resolving)?;
        }
        resolving.remove(&path);

        let (xml, offset) = self.render(ctx, layout)?;
        let mut env = ctx.transform_env(Arc::clone(&xml));
        {
            let doc = domsig_xml::parse(&xml)?;
            let signature = locate_signature(&doc, offset)?;
            env.signature = Some(signature.id().get_usize());
            env.transforms_owner = Some(reference_element(signature, path)?.id().get_usize());
        }
        let retain = ctx.config.cache_reference;
        self.reference_mut(path)
            .ok_or_else(|| Error::signature(format!("no reference at {path}")))?
            .digest(&env, retain)?;
        self.digest_order.push(path);
        Ok(())
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Check the SignatureValue and then each reference.
    ///
    /// The outcome is cached; later calls return it without recomputing.
    pub fn validate(&mut self, ctx: &DsigContext) -> Result<bool, Error> {
        if let Some(status) = self.validation {
            return Ok(status);
        }
        let (xml, offset) = match &self.source {
            Some(source) => (Arc::clone(&source.xml), source.offset),
            None => return Err(Error::signature("signature has no document to validate against")),
        };
        let doc = domsig_xml::parse(&xml)?;
        let signature = locate_signature(&doc, offset)?;
        let policy = ctx.active_policy();
        let mut env = ctx.transform_env(Arc::clone(&xml));
        env.signature = Some(signature.id().get_usize());

        if let (Some(key_info), Some(node)) = (self.key_info.as_mut(), key_info_element(signature)) {
            key_info.resolve_retrieval_methods(node, &env, policy)?;
        }

        let method = self.signed_info.signature_method;
        let selected = ctx
            .key_selector
            .select(self.key_info.as_ref(), Purpose::Verify, method)?
            .ok_or_else(|| {
                Error::KeyNotFound(format!("no key available to verify {}", method.uri()))
            })?;
        tracing::debug!(source = ?selected.source, "selected verification key");
        if let Some(policy) = policy {
            policy.check_key(&selected.key)?;
        }

        let signed_info = signed_info_data(&xml, offset)?;
        let verified = signature_value::verify(
            &selected.key,
            &signed_info,
            &self.signed_info.canonicalization,
            method,
            self.signed_info.hmac_output_length,
            &self.signature_value.value,
        )?;
        if !verified {
            tracing::warn!(method = method.uri(), "SignatureValue does not verify");
            return Ok(self.finish_validation(false));
        }

        let mut paths = self.signed_info_paths();
        if ctx.config.validate_manifests {
            paths.extend(self.manifest_paths());
        }
        for path in paths {
            if !self.validate_reference(path, signature, &env, ctx)? {
                return Ok(self.finish_validation(false));
            }
        }
        Ok(self.finish_validation(true))
    }

    fn validate_reference(
        &mut self,
        path: RefPath,
        signature: Node<'_, '_>,
        env: &TransformEnv<'_>,
        ctx: &DsigContext,
    ) -> Result<bool, Error> {
        let mut env = env.clone();
        env.transforms_owner = Some(reference_element(signature, path)?.id().get_usize());
        let reference = self
            .reference_mut(path)
            .ok_or_else(|| Error::signature(format!("no reference at {path}")))?;
        let valid = reference.validate(&env, ctx.config.cache_reference)?;
        if !valid {
            tracing::warn!(%path, "reference failed validation");
        }
        Ok(valid)
    }

    fn finish_validation(&mut self, valid: bool) -> bool {
        self.validation = Some(valid);
        tracing::info!(valid, "signature validated");
        valid
    }
}

impl Layout {
    fn for_target(target: &SignatureTarget, ctx: &DsigContext) -> Result<Self, Error> {
        let (document, parent_id) = match target {
            SignatureTarget::Enveloping => {
                return Ok(Layout {
                    prefix: String::new(),
                    suffix: String::new(),
                })
            }
            SignatureTarget::Enveloped {
                document,
                parent_id,
            } => (document.as_str(), parent_id.as_deref()),
        };
        let doc = domsig_xml::parse(document)?;
        let parent = match parent_id {
            Some(id) => IdRegistry::build(&doc, &ctx.id_attrs)
                .lookup(&doc, id)
                .ok_or_else(|| {
                    Error::signature(format!("no element with ID {id:?} to hold the signature"))
                })?,
            None => doc.root_element(),
        };
        let range = parent.range();
        let element = &document[range.clone()];
        if !parent.has_children() && element.ends_with("/>") {
            // Self-closing: open it up.
            let open_end = range.end - 2;
            return Ok(Layout {
                prefix: format!("{}>", &document[..open_end]),
                suffix: format!("</{}>{}", element_qname(parent), &document[range.end..]),
            });
        }
        let close = element
            .rfind("</")
            .ok_or_else(|| Error::Marshal("parent element has no end tag".into()))?;
        let split = range.start + close;
        Ok(Layout {
            prefix: document[..split].to_owned(),
            suffix: document[split..].to_owned(),
        })
    }
}

fn locate_signature<'a, 'i>(doc: &'a Document<'i>, offset: usize) -> Result<Node<'a, 'i>, Error> {
    doc.descendants()
        .find(|n| n.range().start == offset && is_element(*n, ns::DSIG, ns::node::SIGNATURE))
        .ok_or_else(|| Error::MissingElement(format!("Signature at offset {offset}")))
}

fn nth_child<'a, 'i>(parent: Node<'a, 'i>, local: &str, index: usize) -> Result<Node<'a, 'i>, Error> {
    find_child_elements(parent, ns::DSIG, local)
        .get(index)
        .copied()
        .ok_or_else(|| Error::MissingElement(format!("{local}[{}]", index + 1)))
}

fn reference_element<'a, 'i>(signature: Node<'a, 'i>, path: RefPath) -> Result<Node<'a, 'i>, Error> {
    match path {
        RefPath::SignedInfo(i) => {
            let si = nth_child(signature, ns::node::SIGNED_INFO, 0)?;
            nth_child(si, ns::node::REFERENCE, i)
        }
        RefPath::Manifest {
            object,
            manifest,
            reference,
        } => {
            let obj = nth_child(signature, ns::node::OBJECT, object)?;
            let m = nth_child(obj, ns::node::MANIFEST, manifest)?;
            nth_child(m, ns::node::REFERENCE, reference)
        }
    }
}

/// The `<SignedInfo>` of the Signature at `offset`, comments excluded.
fn signed_info_data(xml: &Arc<str>, offset: usize) -> Result<TransformData, Error> {
    let doc = domsig_xml::parse(xml)?;
    let signature = locate_signature(&doc, offset)?;
    let root = nth_child(signature, ns::node::SIGNED_INFO, 0)?.id().get_usize();
    Ok(TransformData::Subtree {
        xml: Arc::clone(xml),
        root,
        with_comments: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DsigConfig;
    use crate::key_selector::{KeyValueSelector, SingleKeySelector};
    use crate::manifest::Manifest;
    use crate::object::ObjectContent;
    use domsig_core::algorithm;
    use domsig_crypto::{DigestMethod, SignatureMethod};
    use domsig_keys::loader::load_hmac_key;
    use domsig_keys::KeysManager;
    use domsig_transforms::xslt::XsltTransform;
    use domsig_transforms::{CanonicalizationMethod, Resolved, XPath2Filter, XPath2Op, XPathFilter};

    const DOC: &str = "<doc><a>one</a><b>two</b><c>three</c></doc>";

    fn enveloped(document: &str) -> SignatureTarget {
        SignatureTarget::Enveloped {
            document: document.to_owned(),
            parent_id: None,
        }
    }

    fn insecure() -> DsigConfig {
        DsigConfig {
            secure_validation: false,
            ..DsigConfig::default()
        }
    }

    fn hmac_ctx(secret: &[u8]) -> DsigContext {
        DsigContext::new(SingleKeySelector(load_hmac_key(secret)))
    }

    fn signed_info(method: SignatureMethod, references: Vec<Reference>) -> SignedInfo {
        SignedInfo::new(CanonicalizationMethod::new(C14nMode::Exclusive), method, references)
            .unwrap()
    }

    fn enveloped_reference() -> Reference {
        Reference::new("", DigestMethod::Sha256)
            .with_transform(Transform::EnvelopedSignature)
            .with_transform(Transform::c14n(C14nMode::Exclusive))
    }

    fn verify(xml: &str, ctx: &DsigContext) -> Result<bool, Error> {
        XmlSignature::parse(xml, ctx)?.validate(ctx)
    }

    #[test]
    fn test_rsa_enveloped_end_to_end() {
        let private = crate::test_keys::load("rsa-2048.pem");
        let public = crate::test_keys::load("rsa-2048-pub.pem");
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::RsaSha256,
            vec![enveloped_reference()],
        ));
        let signed = signature
            .sign(&DsigContext::new(SingleKeySelector(private)), &enveloped(DOC))
            .unwrap();
        assert!(signed.starts_with("<doc><a>one</a><b>two</b><c>three</c><ds:Signature"));
        assert!(signature.is_signed());

        let mut manager = KeysManager::new();
        manager.add_key(public);
        let verifier = DsigContext::new(manager);
        assert!(verify(&signed, &verifier).unwrap());

        let tampered = signed.replacen("<b>two</b>", "<b>TWO</b>", 1);
        let mut parsed = XmlSignature::parse(&tampered, &verifier).unwrap();
        assert!(!parsed.validate(&verifier).unwrap());
        assert_eq!(parsed.signed_info.references[0].validation_status(), Some(false));
    }

    #[test]
    fn test_validate_is_cached() {
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![enveloped_reference()],
        ));
        let mut ctx = hmac_ctx(b"secret");
        let signed = signature.sign(&ctx, &enveloped(DOC)).unwrap();

        let mut parsed = XmlSignature::parse(&signed, &ctx).unwrap();
        assert_eq!(parsed.validation_status(), None);
        assert!(parsed.validate(&ctx).unwrap());
        ctx.set_key_selector(SingleKeySelector(load_hmac_key(b"wrong")));
        assert!(parsed.validate(&ctx).unwrap());
        assert!(!verify(&signed, &ctx).unwrap());
    }

    #[test]
    fn test_references_to_references_digest_first() {
        let reference_b = Reference::new("#data", DigestMethod::Sha256).with_id("ref-b");
        let reference_a = Reference::new("#ref-b", DigestMethod::Sha256);
        let manifest =
            Manifest::new(vec![Reference::new("#data", DigestMethod::Sha1)]).unwrap().with_id("m");
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![
                reference_a,
                reference_b,
                Reference::new("#m", DigestMethod::Sha256).with_type(algorithm::TYPE_MANIFEST),
            ],
        ))
        .with_object(
            XmlObject::new()
                .with_id("data")
                .with_content(ObjectContent::Raw("<payload>42</payload>".into())),
        )
        .with_object(XmlObject::new().with_content(ObjectContent::Manifest(manifest)));

        let ctx = hmac_ctx(b"k").with_config(DsigConfig {
            validate_manifests: true,
            ..DsigConfig::default()
        });
        let signed = signature.sign(&ctx, &SignatureTarget::Enveloping).unwrap();
        let manifest_ref = RefPath::Manifest {
            object: 1,
            manifest: 0,
            reference: 0,
        };
        assert_eq!(
            signature.digest_order(),
            [
                manifest_ref,
                RefPath::SignedInfo(1),
                RefPath::SignedInfo(0),
                RefPath::SignedInfo(2)
            ]
        );

        let mut parsed = XmlSignature::parse(&signed, &ctx).unwrap();
        assert!(parsed.validate(&ctx).unwrap());
        assert_eq!(parsed.reference(manifest_ref).unwrap().validation_status(), Some(true));

        // A changed Manifest digest breaks the SignedInfo reference over it.
        let manifest_value = base64::engine::general_purpose::STANDARD.encode(
            signature.reference(manifest_ref).unwrap().digest_value().unwrap(),
        );
        let broken = signed.replacen(&manifest_value, "AAAAAAAAAAAAAAAAAAAAAAAAAAA=", 1);
        assert!(!verify(&broken, &ctx).unwrap());
    }

    #[test]
    fn test_cycle_is_an_error() {
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha1,
            vec![
                Reference::new("#r2", DigestMethod::Sha1).with_id("r1"),
                Reference::new("#r1", DigestMethod::Sha1).with_id("r2"),
            ],
        ));
        let err = signature
            .sign(&hmac_ctx(b"k"), &SignatureTarget::Enveloping)
            .unwrap_err();
        assert!(matches!(err, Error::Signature { ref message, .. } if message.contains("cycle")));
    }

    #[test]
    fn test_reference_limit_under_secure_validation() {
        let references = (0..31).map(|_| enveloped_reference()).collect();
        let mut signature =
            XmlSignature::new(signed_info(SignatureMethod::HmacSha256, references));
        let ctx = hmac_ctx(b"k");
        let signed = signature.sign(&ctx, &enveloped(DOC)).unwrap();

        assert!(matches!(
            XmlSignature::parse(&signed, &ctx),
            Err(Error::SecureValidation(_))
        ));
        let relaxed = hmac_ctx(b"k").with_config(insecure());
        assert!(verify(&signed, &relaxed).unwrap());
    }

    #[test]
    fn test_hmac_output_length_check() {
        let mut signature = XmlSignature::new(
            signed_info(SignatureMethod::HmacSha256, vec![enveloped_reference()])
                .with_hmac_output_length(160),
        );
        let err = signature.sign(&hmac_ctx(b"k"), &enveloped(DOC)).unwrap_err();
        assert!(matches!(err, Error::Signature { .. }));

        let mut full = XmlSignature::new(
            signed_info(SignatureMethod::HmacSha256, vec![enveloped_reference()])
                .with_hmac_output_length(256),
        );
        let signed = full.sign(&hmac_ctx(b"k"), &enveloped(DOC)).unwrap();
        assert!(signed.contains("<ds:HMACOutputLength>256</ds:HMACOutputLength>"));
        assert!(verify(&signed, &hmac_ctx(b"k")).unwrap());
    }

    #[test]
    fn test_no_signing_key() {
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![enveloped_reference()],
        ));
        let ctx = DsigContext::new(KeysManager::new());
        let err = signature.sign(&ctx, &enveloped(DOC)).unwrap_err();
        assert!(matches!(err, Error::Signature { .. }));
    }

    #[test]
    fn test_dsa_and_ecdsa_with_key_value() {
        for (file, method) in [
            ("dsa-1024.pem", SignatureMethod::DsaSha1),
            ("dsa-2048.pem", SignatureMethod::DsaSha256),
            ("ec-p256.pem", SignatureMethod::EcdsaSha256),
        ] {
            let key = crate::test_keys::load(file);
            let mut signature = XmlSignature::new(signed_info(method, vec![enveloped_reference()]))
                .with_key_info(KeyInfo::new().with_key_value(&key));
            let signed = signature
                .sign(&DsigContext::new(SingleKeySelector(key)), &enveloped(DOC))
                .unwrap();
            let verifier = DsigContext::new(KeyValueSelector);
            assert!(verify(&signed, &verifier).unwrap(), "{file}");
        }
    }

    #[test]
    fn test_c14n11_is_appended_when_chain_ends_in_xml() {
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![
                Reference::new("", DigestMethod::Sha256).with_transform(Transform::EnvelopedSignature),
                enveloped_reference(),
            ],
        ));
        let ctx = hmac_ctx(b"k").with_config(DsigConfig {
            use_c14n11: true,
            ..DsigConfig::default()
        });
        let signed = signature.sign(&ctx, &enveloped(DOC)).unwrap();

        let parsed = XmlSignature::parse(&signed, &ctx).unwrap();
        let first = &parsed.signed_info.references[0].transforms;
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].algorithm(), algorithm::C14N11);
        assert_eq!(parsed.signed_info.references[1].transforms.len(), 2);
        assert_eq!(
            parsed.signed_info.references[1].transforms[1].algorithm(),
            algorithm::EXC_C14N
        );
        assert!(verify(&signed, &ctx).unwrap());
    }

    #[test]
    fn test_xpath_here_and_xpath2() {
        let here = XPathFilter::new(
            "count(ancestor-or-self::dsig:Signature | here()/ancestor::dsig:Signature[1]) > \
             count(ancestor-or-self::dsig:Signature)",
        )
        .unwrap()
        .with_namespace("dsig", ns::DSIG);
        let xpath_ref = Reference::new("", DigestMethod::Sha256).with_transform(Transform::XPath(here));
        let filter2 = Reference::new("", DigestMethod::Sha256).with_transform(Transform::XPath2(vec![
            XPath2Filter::new(XPath2Op::Intersect, XPathFilter::new("/doc").unwrap()),
            XPath2Filter::new(
                XPath2Op::Subtract,
                XPathFilter::new("//dsig:Signature | /doc/c")
                    .unwrap()
                    .with_namespace("dsig", ns::DSIG),
            ),
        ]));
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![xpath_ref, filter2],
        ));
        let ctx = hmac_ctx(b"k").with_config(DsigConfig {
            cache_reference: true,
            ..DsigConfig::default()
        });
        let signed = signature.sign(&ctx, &enveloped(DOC)).unwrap();

        let mut parsed = XmlSignature::parse(&signed, &ctx).unwrap();
        assert!(parsed.validate(&ctx).unwrap());
        assert_eq!(
            parsed.signed_info.references[0].digest_input(),
            Some(&b"<doc><a>one</a><b>two</b><c>three</c></doc>"[..])
        );
        assert_eq!(
            parsed.signed_info.references[1].digest_input(),
            Some(&b"<doc><a>one</a><b>two</b></doc>"[..])
        );

        // Content removed by the XPath2 filter is not covered.
        let outside = signed.replacen("<c>three</c>", "<c>3</c>", 1);
        let mut parsed = XmlSignature::parse(&outside, &ctx).unwrap();
        assert!(!parsed.validate(&ctx).unwrap());
        assert_eq!(parsed.signed_info.references[0].validation_status(), Some(false));
    }

    #[test]
    fn test_base64_over_object() {
        let object = XmlObject::new()
            .with_id("b64")
            .with_mime_type("text/plain")
            .with_encoding(algorithm::BASE64)
            .with_content(ObjectContent::Raw("aGVs\n bG8=".into()));
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![Reference::new("#b64", DigestMethod::Sha256).with_transform(Transform::Base64)],
        ))
        .with_object(object);
        let ctx = hmac_ctx(b"k").with_config(DsigConfig {
            cache_reference: true,
            ..DsigConfig::default()
        });
        let signed = signature.sign(&ctx, &SignatureTarget::Enveloping).unwrap();
        assert_eq!(
            signature.signed_info.references[0].digest_input(),
            Some(&b"hello"[..])
        );
        assert!(matches!(
            signature.signed_info.references[0].dereferenced_data(),
            Some(TransformData::Subtree { .. })
        ));
        assert!(signed.contains(r#"MimeType="text/plain""#));
        assert!(verify(&signed, &ctx).unwrap());
    }

    #[test]
    fn test_duplicate_ids_rejected_when_secure() {
        let document = r#"<doc><item Id="x">first</item><item Id="x">second</item></doc>"#;
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![Reference::new("#x", DigestMethod::Sha256)],
        ));
        let relaxed = hmac_ctx(b"k").with_config(insecure());
        let signed = signature.sign(&relaxed, &enveloped(document)).unwrap();
        assert!(verify(&signed, &relaxed).unwrap());

        let err = verify(&signed, &hmac_ctx(b"k")).unwrap_err();
        let Error::Signature { cause: Some(cause), .. } = err else {
            panic!("expected a wrapped error, got {err:?}");
        };
        assert!(matches!(*cause, Error::Dereference { .. }));
    }

    #[test]
    fn test_enveloped_into_parent_by_id() {
        let document = r#"<doc><header Id="h"/><body>text</body></doc>"#;
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![Reference::new("#body", DigestMethod::Sha256)],
        ));
        let document = document.replace("<body>", r#"<body Id="body">"#);
        let target = SignatureTarget::Enveloped {
            document,
            parent_id: Some("h".into()),
        };
        let ctx = hmac_ctx(b"k");
        let signed = signature.sign(&ctx, &target).unwrap();
        assert!(signed.starts_with(r#"<doc><header Id="h"><ds:Signature"#));
        assert!(signed.contains("</ds:Signature></header><body"));
        assert!(verify(&signed, &ctx).unwrap());
    }

    #[test]
    fn test_marshal_round_trip() {
        let key = crate::test_keys::load("rsa-2048.pem");
        let mut signature = XmlSignature::new(
            signed_info(SignatureMethod::RsaSha256, vec![enveloped_reference()]).with_id("si"),
        )
        .with_id("sig")
        .with_signature_value_id("sv")
        .with_key_info(KeyInfo::new().with_key_name("signer").with_key_value(&key));
        let ctx = DsigContext::new(SingleKeySelector(key));
        let signed = signature.sign(&ctx, &enveloped(DOC)).unwrap();

        let parsed = XmlSignature::parse(&signed, &ctx).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("sig"));
        assert_eq!(parsed.signed_info.id.as_deref(), Some("si"));
        assert_eq!(parsed.signature_value, signature.signature_value);
        assert_eq!(
            parsed.key_info.as_ref().unwrap().key_names().collect::<Vec<_>>(),
            ["signer"]
        );
        let (a, b) = (&parsed.signed_info.references[0], &signature.signed_info.references[0]);
        assert_eq!(a.uri, b.uri);
        assert_eq!(a.transforms, b.transforms);
        assert_eq!(a.digest_value(), b.digest_value());
        assert_eq!(parsed.to_xml("ds").unwrap(), signature.to_xml("ds").unwrap());
    }

    #[test]
    fn test_default_namespace_prefix() {
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![enveloped_reference()],
        ));
        let ctx = hmac_ctx(b"k").with_prefix("");
        let signed = signature.sign(&ctx, &enveloped(DOC)).unwrap();
        assert!(signed.contains(r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#"><SignedInfo>"#));
        assert!(!signed.contains("ds:"));
        assert!(verify(&signed, &ctx).unwrap());
    }

    struct StaticResolver;

    impl domsig_transforms::ResourceResolver for StaticResolver {
        fn resolve(&self, uri: &str, base_uri: Option<&str>) -> Result<Resolved, Error> {
            match (uri, base_uri) {
                ("http://example.com/data.txt", Some("http://example.com/sig.xml")) => {
                    Ok(Resolved::Octets(b"external data".to_vec()))
                }
                _ => Err(Error::Other(format!("unexpected {uri} from {base_uri:?}"))),
            }
        }
    }

    #[test]
    fn test_external_reference_through_resolver() {
        let allow_http = SecurePolicy {
            forbidden_uri_schemes: vec!["file".into()],
            ..SecurePolicy::default()
        };
        let ctx = hmac_ctx(b"k")
            .with_policy(allow_http)
            .with_resolver(StaticResolver)
            .with_base_uri("http://example.com/sig.xml");
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![Reference::new("http://example.com/data.txt", DigestMethod::Sha256)],
        ));
        let signed = signature.sign(&ctx, &SignatureTarget::Enveloping).unwrap();
        assert!(verify(&signed, &ctx).unwrap());

        // The default policy forbids http.
        let strict = hmac_ctx(b"k")
            .with_resolver(StaticResolver)
            .with_base_uri("http://example.com/sig.xml");
        assert!(verify(&signed, &strict).is_err());

        // No resolver, nothing to dereference with.
        let unresolved = hmac_ctx(b"k").with_config(insecure());
        assert!(verify(&signed, &unresolved).is_err());
    }

    struct UppercaseXslt;

    impl domsig_transforms::XsltEngine for UppercaseXslt {
        fn transform(&self, stylesheet: &str, input: &[u8]) -> Result<Vec<u8>, Error> {
            assert!(stylesheet.contains("xsl:stylesheet"));
            Ok(input.to_ascii_uppercase())
        }
    }

    #[test]
    fn test_xslt_transform_needs_engine_and_relaxed_policy() {
        let sheet = r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0"/>"#;
        let document = r#"<doc><item Id="data">payload</item></doc>"#;
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![Reference::new("#data", DigestMethod::Sha256)
                .with_transform(Transform::Xslt(XsltTransform::new(sheet)))],
        ));
        let ctx = hmac_ctx(b"k")
            .with_config(DsigConfig {
                secure_validation: false,
                cache_reference: true,
                ..DsigConfig::default()
            })
            .with_xslt(UppercaseXslt);
        let signed = signature.sign(&ctx, &enveloped(document)).unwrap();
        assert_eq!(
            signature.signed_info.references[0].digest_input(),
            Some(&br#"<ITEM ID="DATA">PAYLOAD</ITEM>"#[..])
        );
        assert!(verify(&signed, &ctx).unwrap());

        let secure = hmac_ctx(b"k").with_xslt(UppercaseXslt);
        assert!(verify(&signed, &secure).is_err());
        let no_engine = hmac_ctx(b"k").with_config(insecure());
        assert!(verify(&signed, &no_engine).is_err());
    }

    #[test]
    fn test_unsigned_signature_cannot_validate() {
        let mut signature = XmlSignature::new(signed_info(
            SignatureMethod::HmacSha256,
            vec![enveloped_reference()],
        ));
        assert!(signature.validate(&hmac_ctx(b"k")).is_err());
        assert!(!signature.is_signed());
    }
}
