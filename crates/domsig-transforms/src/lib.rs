#![forbid(unsafe_code)]

//! URI dereferencing and the transform chain for the domsig XML Signature
//! engine.
//!
//! A reference is resolved by [`uri::dereference`] into [`TransformData`],
//! then run through its [`Transform`]s with [`chain::apply`] (or
//! [`chain::apply_into`] when the result goes straight into a digest).

pub mod base64_transform;
pub mod c14n_method;
pub mod chain;
pub mod data;
pub mod enveloped;
pub mod transform;
pub mod uri;
pub mod xpath_filter;
pub mod xslt;

pub use c14n_method::CanonicalizationMethod;
pub use data::{DataKind, TransformData};
pub use transform::Transform;
pub use uri::{FileResolver, Resolved, ResourceResolver, UrlMapResolver};
pub use xpath_filter::{XPath2Filter, XPath2Op, XPathFilter};
pub use xslt::XsltEngine;

use std::sync::Arc;

/// Everything a dereference or a transform may consult besides its input.
///
/// Node indices refer to `document` and are only applied to data whose XML
/// text is that same `Arc`.
#[derive(Clone, Default)]
pub struct TransformEnv<'e> {
    /// Text of the document holding the signature.
    pub document: Option<Arc<str>>,
    /// Node index of the `<Signature>` element, for the enveloped transform.
    pub signature: Option<usize>,
    /// Node index of the element whose `<Transforms>` child holds the chain
    /// being run (a `Reference` or a `RetrievalMethod`). Used for `here()`.
    pub transforms_owner: Option<usize>,
    /// Extra ID attribute names.
    pub id_attrs: &'e [String],
    pub resolver: Option<&'e dyn ResourceResolver>,
    pub xslt: Option<&'e dyn XsltEngine>,
    pub base_uri: Option<&'e str>,
    /// Fail same-document dereferences of IDs declared more than once.
    pub reject_duplicate_ids: bool,
}

impl<'e> TransformEnv<'e> {
    pub fn for_document(document: Arc<str>) -> Self {
        Self {
            document: Some(document),
            ..Self::default()
        }
    }

    /// True when `xml` is the signature document itself.
    pub fn is_signature_document(&self, xml: &Arc<str>) -> bool {
        self.document
            .as_ref()
            .is_some_and(|doc| Arc::ptr_eq(doc, xml))
    }
}

impl std::fmt::Debug for TransformEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformEnv")
            .field("document_len", &self.document.as_ref().map(|d| d.len()))
            .field("signature", &self.signature)
            .field("transforms_owner", &self.transforms_owner)
            .field("id_attrs", &self.id_attrs)
            .field("resolver", &self.resolver.is_some())
            .field("xslt", &self.xslt.is_some())
            .field("base_uri", &self.base_uri)
            .field("reject_duplicate_ids", &self.reject_duplicate_ids)
            .finish()
    }
}
