#![forbid(unsafe_code)]

//! XPath 1.0 for XML-DSig processing.
//!
//! Covers the expression language used by the XPath Filter and XPath Filter
//! 2.0 transforms: all thirteen axes, the core function library and the
//! XML-DSig `here()` function. Variables are not supported. Also parses the
//! same-document URI forms accepted in `Reference/@URI`.

mod eval;
mod lexer;
mod parser;

pub use eval::{EvalContext, Value, XNode};

use domsig_core::Error;
use roxmltree::Node;

/// A compiled XPath expression.
#[derive(Debug, Clone)]
pub struct XPathExpr {
    source: String,
    expr: parser::Expr,
}

impl XPathExpr {
    pub fn compile(text: &str) -> Result<Self, Error> {
        let tokens = lexer::tokenize(text)?;
        let expr = parser::parse(tokens)?;
        Ok(Self {
            source: text.to_owned(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate with `node` as the context node.
    pub fn eval<'a, 'i>(
        &self,
        ctx: &EvalContext<'a, 'i>,
        node: XNode<'a, 'i>,
    ) -> Result<Value<'a, 'i>, Error> {
        eval::evaluate(ctx, &self.expr, node)
    }

    /// Evaluate and convert the result with the `boolean()` rules.
    pub fn eval_bool<'a, 'i>(
        &self,
        ctx: &EvalContext<'a, 'i>,
        node: Node<'a, 'i>,
    ) -> Result<bool, Error> {
        Ok(self.eval(ctx, XNode::Node(node))?.to_bool())
    }

    /// Evaluate to a node-set and keep its tree nodes, in document order.
    pub fn select<'a, 'i>(
        &self,
        ctx: &EvalContext<'a, 'i>,
        node: Node<'a, 'i>,
    ) -> Result<Vec<Node<'a, 'i>>, Error> {
        match self.eval(ctx, XNode::Node(node))? {
            Value::NodeSet(nodes) => Ok(nodes.iter().filter_map(XNode::tree_node).collect()),
            _ => Err(Error::XPath(format!(
                "expression does not select nodes: {}",
                self.source
            ))),
        }
    }
}

/// A same-document reference as written in `Reference/@URI`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameDocumentRef<'u> {
    /// `""`: the whole document, comments removed.
    WholeDocument,
    /// `#id`: the identified element subtree, comments removed.
    Id(&'u str),
    /// `#xpointer(/)`: the whole document, comments kept.
    XPointerRoot,
    /// `#xpointer(id('id'))`: the identified subtree, comments kept.
    XPointerId(&'u str),
}

impl SameDocumentRef<'_> {
    /// Whether comment nodes survive dereferencing.
    pub fn keeps_comments(&self) -> bool {
        matches!(self, SameDocumentRef::XPointerRoot | SameDocumentRef::XPointerId(_))
    }
}

/// Classify `uri`. Returns `Ok(None)` for anything that is not a
/// same-document reference.
pub fn parse_same_document_ref(uri: &str) -> Result<Option<SameDocumentRef<'_>>, Error> {
    if uri.is_empty() {
        return Ok(Some(SameDocumentRef::WholeDocument));
    }
    let Some(fragment) = uri.strip_prefix('#') else {
        return Ok(None);
    };
    let Some(pointer) = fragment.strip_prefix("xpointer(") else {
        return Ok(Some(SameDocumentRef::Id(fragment)));
    };
    let unsupported = || Error::Dereference {
        uri: uri.to_owned(),
        message: "unsupported XPointer expression".into(),
    };
    let body = pointer.strip_suffix(')').ok_or_else(unsupported)?;
    if body.trim() == "/" {
        return Ok(Some(SameDocumentRef::XPointerRoot));
    }
    let arg = body
        .trim()
        .strip_prefix("id(")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(unsupported)?
        .trim();
    let id = arg
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| arg.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .ok_or_else(unsupported)?;
    Ok(Some(SameDocumentRef::XPointerId(id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_document_forms() {
        assert_eq!(
            parse_same_document_ref("").unwrap(),
            Some(SameDocumentRef::WholeDocument)
        );
        assert_eq!(
            parse_same_document_ref("#obj").unwrap(),
            Some(SameDocumentRef::Id("obj"))
        );
        assert_eq!(
            parse_same_document_ref("#xpointer(/)").unwrap(),
            Some(SameDocumentRef::XPointerRoot)
        );
        assert_eq!(
            parse_same_document_ref("#xpointer(id('obj'))").unwrap(),
            Some(SameDocumentRef::XPointerId("obj"))
        );
        assert_eq!(
            parse_same_document_ref("#xpointer(id(\"obj\"))").unwrap(),
            Some(SameDocumentRef::XPointerId("obj"))
        );
        assert!(SameDocumentRef::XPointerRoot.keeps_comments());
        assert!(!SameDocumentRef::Id("x").keeps_comments());
    }

    #[test]
    fn test_external_and_unsupported() {
        assert_eq!(parse_same_document_ref("http://example.com/a.xml").unwrap(), None);
        assert!(parse_same_document_ref("#xpointer(//a)").is_err());
    }

    #[test]
    fn test_here_and_select() {
        let xml = r#"<r><a/><XPath>count(ancestor::r)</XPath></r>"#;
        let doc = crate::parse(xml).unwrap();
        let here = doc.descendants().find(|n| n.has_tag_name("XPath")).unwrap();
        let ctx = EvalContext::new(&doc).with_here(here);
        let expr = XPathExpr::compile("here()/preceding-sibling::a").unwrap();
        let nodes = expr.select(&ctx, doc.root()).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].tag_name().name(), "a");
        assert!(XPathExpr::compile("self::node()")
            .unwrap()
            .eval_bool(&ctx, doc.root())
            .unwrap());
    }
}
