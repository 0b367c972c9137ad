#![forbid(unsafe_code)]

//! URI dereferencing for XML-DSig references.
//!
//! Same-document forms:
//! - `""`: the whole document, comments removed
//! - `#id`: the identified element subtree, comments removed
//! - `#xpointer(/)`: the whole document, comments kept
//! - `#xpointer(id('id'))`: the identified element subtree, comments kept
//!
//! Everything else is handed to the registered [`ResourceResolver`].

use crate::data::TransformData;
use crate::TransformEnv;
use domsig_core::Error;
use domsig_xml::xpath::{parse_same_document_ref, SameDocumentRef};
use domsig_xml::IdRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What an external resolver returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Octets(Vec<u8>),
    /// Well-formed XML text.
    Xml(String),
}

/// Fetches resources named by external reference URIs.
pub trait ResourceResolver {
    fn resolve(&self, uri: &str, base_uri: Option<&str>) -> Result<Resolved, Error>;
}

/// The scheme of `uri` in lower case, if it has one.
pub fn uri_scheme(uri: &str) -> Option<String> {
    let (scheme, _) = uri.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        Some(scheme.to_ascii_lowercase())
    } else {
        None
    }
}

/// Resolve `uri` to the data it names.
pub fn dereference(uri: &str, env: &TransformEnv<'_>) -> Result<TransformData, Error> {
    let Some(same_doc) = parse_same_document_ref(uri)? else {
        return dereference_external(uri, env);
    };

    let xml = env
        .document
        .clone()
        .ok_or_else(|| Error::dereference(uri, "no document to resolve against"))?;
    let with_comments = same_doc.keeps_comments();

    let id = match same_doc {
        SameDocumentRef::WholeDocument | SameDocumentRef::XPointerRoot => {
            tracing::debug!(uri, "dereferenced whole document");
            return Ok(TransformData::Subtree {
                xml,
                root: 0,
                with_comments,
            });
        }
        SameDocumentRef::Id(id) | SameDocumentRef::XPointerId(id) => id,
    };

    let doc = domsig_xml::parse(&xml)?;
    let ids = IdRegistry::build(&doc, env.id_attrs);
    if env.reject_duplicate_ids && ids.is_duplicate(id) {
        return Err(Error::dereference(uri, format!("ID {id:?} is not unique")));
    }
    let node = ids
        .lookup(&doc, id)
        .ok_or_else(|| Error::dereference(uri, format!("no element with ID {id:?}")))?;
    let root = node.id().get_usize();
    tracing::debug!(uri, element = node.tag_name().name(), "dereferenced same-document URI");
    drop(doc);
    Ok(TransformData::Subtree {
        xml: Arc::clone(&xml),
        root,
        with_comments,
    })
}

fn dereference_external(uri: &str, env: &TransformEnv<'_>) -> Result<TransformData, Error> {
    let resolver = env
        .resolver
        .ok_or_else(|| Error::dereference(uri, "no resource resolver registered"))?;
    let resolved = resolver.resolve(uri, env.base_uri).map_err(|e| match e {
        err @ Error::Dereference { .. } => err,
        other => Error::dereference(uri, other.to_string()),
    })?;
    tracing::debug!(uri, "dereferenced external URI");
    match resolved {
        Resolved::Octets(bytes) => Ok(TransformData::Octets(bytes)),
        Resolved::Xml(text) => {
            domsig_xml::parse(&text).map_err(|e| Error::dereference(uri, e.to_string()))?;
            Ok(TransformData::Subtree {
                xml: Arc::from(text),
                root: 0,
                with_comments: true,
            })
        }
    }
}

// ── Bundled resolvers ────────────────────────────────────────────────

/// Resolves relative paths and `file:` URIs against a base directory.
#[derive(Debug, Clone)]
pub struct FileResolver {
    base_dir: PathBuf,
}

impl FileResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, uri: &str, base_uri: Option<&str>) -> Result<PathBuf, Error> {
        let path = match uri_scheme(uri).as_deref() {
            Some("file") => uri.trim_start_matches("file:").trim_start_matches("//"),
            Some(scheme) => {
                return Err(Error::dereference(
                    uri,
                    format!("scheme {scheme:?} is not handled by the file resolver"),
                ))
            }
            None => uri,
        };
        let path = Path::new(path);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        let base = match base_uri.and_then(|b| Path::new(b).parent()) {
            Some(parent) if !parent.as_os_str().is_empty() => self.base_dir.join(parent),
            _ => self.base_dir.clone(),
        };
        Ok(base.join(path))
    }
}

impl ResourceResolver for FileResolver {
    fn resolve(&self, uri: &str, base_uri: Option<&str>) -> Result<Resolved, Error> {
        let path = self.path_for(uri, base_uri)?;
        let bytes = std::fs::read(&path)
            .map_err(|e| Error::dereference(uri, format!("{}: {e}", path.display())))?;
        Ok(Resolved::Octets(bytes))
    }
}

/// Maps URL prefixes onto local files or directories.
#[derive(Debug, Clone, Default)]
pub struct UrlMapResolver {
    entries: Vec<(String, PathBuf)>,
}

impl UrlMapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve URIs starting with `prefix` from `target`. When the URI is longer
    /// than the prefix the remainder is joined onto `target`.
    pub fn map(mut self, prefix: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        self.entries.push((prefix.into(), target.into()));
        self
    }
}

impl ResourceResolver for UrlMapResolver {
    fn resolve(&self, uri: &str, _base_uri: Option<&str>) -> Result<Resolved, Error> {
        let (prefix, target) = self
            .entries
            .iter()
            .filter(|(prefix, _)| uri.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .ok_or_else(|| Error::dereference(uri, "no mapping for URI"))?;
        let rest = uri[prefix.len()..].trim_start_matches('/');
        let path = if rest.is_empty() {
            target.clone()
        } else {
            target.join(rest)
        };
        let bytes = std::fs::read(&path)
            .map_err(|e| Error::dereference(uri, format!("{}: {e}", path.display())))?;
        Ok(Resolved::Octets(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<root><a Id="x">1<!--c--></a><b Id="dup"/><c Id="dup"/></root>"#;

    fn env(doc: &Arc<str>) -> TransformEnv<'static> {
        TransformEnv::for_document(Arc::clone(doc))
    }

    #[test]
    fn test_same_document_forms() {
        let doc: Arc<str> = Arc::from(XML);
        let env = env(&doc);

        match dereference("", &env).unwrap() {
            TransformData::Subtree { root, with_comments, .. } => {
                assert_eq!(root, 0);
                assert!(!with_comments);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            dereference("#xpointer(/)", &env).unwrap(),
            TransformData::Subtree { root: 0, with_comments: true, .. }
        ));

        let by_id = dereference("#x", &env).unwrap();
        assert_eq!(by_id.clone().into_octets().unwrap(), b"<a Id=\"x\">1</a>");
        let by_xpointer = dereference("#xpointer(id('x'))", &env).unwrap();
        assert!(matches!(
            by_xpointer,
            TransformData::Subtree { with_comments: true, .. }
        ));
    }

    #[test]
    fn test_unknown_and_duplicate_ids() {
        let doc: Arc<str> = Arc::from(XML);
        let mut env = env(&doc);
        assert!(matches!(
            dereference("#nope", &env),
            Err(Error::Dereference { .. })
        ));
        assert!(dereference("#dup", &env).is_ok());
        env.reject_duplicate_ids = true;
        assert!(matches!(
            dereference("#dup", &env),
            Err(Error::Dereference { .. })
        ));
    }

    #[test]
    fn test_external_without_resolver() {
        let doc: Arc<str> = Arc::from(XML);
        let env = env(&doc);
        let err = dereference("http://example.com/data.xml", &env).unwrap_err();
        assert!(matches!(err, Error::Dereference { ref uri, .. } if uri == "http://example.com/data.xml"));
    }

    #[test]
    fn test_file_and_url_map_resolvers() {
        let dir = std::env::temp_dir().join(format!("domsig-uri-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("payload.bin"), b"hello").unwrap();

        let files = FileResolver::new(&dir);
        assert_eq!(
            files.resolve("payload.bin", None).unwrap(),
            Resolved::Octets(b"hello".to_vec())
        );
        assert!(files.resolve("https://x/payload.bin", None).is_err());

        let urls = UrlMapResolver::new().map("http://example.com/data/", &dir);
        assert_eq!(
            urls.resolve("http://example.com/data/payload.bin", None).unwrap(),
            Resolved::Octets(b"hello".to_vec())
        );
        assert!(urls.resolve("http://other.example/", None).is_err());

        let mut env = TransformEnv::default();
        env.resolver = Some(&urls);
        assert!(matches!(
            dereference("http://example.com/data/payload.bin", &env).unwrap(),
            TransformData::Octets(ref b) if b == b"hello"
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_uri_scheme() {
        assert_eq!(uri_scheme("HTTP://x").as_deref(), Some("http"));
        assert_eq!(uri_scheme("file:/tmp/x").as_deref(), Some("file"));
        assert_eq!(uri_scheme("relative/path"), None);
        assert_eq!(uri_scheme("#id"), None);
    }
}
