#![forbid(unsafe_code)]

//! XPath 1.0 evaluation over a roxmltree document.

use super::lexer::NameToken;
use super::parser::{Axis, BinaryOp, Expr, NodeTest, Path, Step};
use crate::document::{attribute_prefix, element_qname, text_content};
use crate::IdRegistry;
use domsig_core::{ns, Error};
use roxmltree::{Document, Node};
use std::collections::{HashMap, HashSet};

/// A node of the XPath data model.
///
/// Tree nodes map directly onto roxmltree nodes. Attribute nodes are
/// addressed by their owner and index; namespace nodes by their owner and
/// the in-scope binding they represent.
#[derive(Debug, Clone, Copy)]
pub enum XNode<'a, 'i> {
    Node(Node<'a, 'i>),
    Attr(Node<'a, 'i>, usize),
    Namespace {
        owner: Node<'a, 'i>,
        prefix: Option<&'a str>,
        uri: &'a str,
    },
}

impl<'a, 'i> XNode<'a, 'i> {
    /// The tree node, if this is not an attribute or namespace node.
    pub fn tree_node(&self) -> Option<Node<'a, 'i>> {
        match self {
            XNode::Node(n) => Some(*n),
            _ => None,
        }
    }

    fn owner(&self) -> Node<'a, 'i> {
        match self {
            XNode::Node(n) => *n,
            XNode::Attr(n, _) => *n,
            XNode::Namespace { owner, .. } => *owner,
        }
    }

    fn attribute(&self) -> Option<roxmltree::Attribute<'a, 'i>> {
        match self {
            XNode::Attr(n, idx) => n.attributes().nth(*idx),
            _ => None,
        }
    }

    /// Document-order key: owner first, then its namespace nodes, then attributes.
    fn sort_key(&self) -> (usize, u8, usize) {
        match self {
            XNode::Node(n) => (n.id().get_usize(), 0, 0),
            XNode::Namespace { owner, prefix, .. } => {
                let idx = owner
                    .namespaces()
                    .position(|ns| ns.name() == *prefix)
                    .unwrap_or(0);
                (owner.id().get_usize(), 1, idx)
            }
            XNode::Attr(n, idx) => (n.id().get_usize(), 2, *idx),
        }
    }

    /// The XPath string-value of the node.
    pub fn string_value(&self) -> String {
        match self {
            XNode::Node(n) if n.is_pi() => n
                .pi()
                .and_then(|pi| pi.value)
                .unwrap_or("")
                .to_owned(),
            XNode::Node(n) => text_content(*n),
            XNode::Attr(..) => self
                .attribute()
                .map(|a| a.value().to_owned())
                .unwrap_or_default(),
            XNode::Namespace { uri, .. } => (*uri).to_owned(),
        }
    }

    fn local_name(&self) -> String {
        match self {
            XNode::Node(n) if n.is_element() => n.tag_name().name().to_owned(),
            XNode::Node(n) if n.is_pi() => n.pi().map(|pi| pi.target.to_owned()).unwrap_or_default(),
            XNode::Node(_) => String::new(),
            XNode::Attr(..) => self
                .attribute()
                .map(|a| a.name().to_owned())
                .unwrap_or_default(),
            XNode::Namespace { prefix, .. } => prefix.unwrap_or("").to_owned(),
        }
    }

    fn namespace_uri(&self) -> String {
        match self {
            XNode::Node(n) if n.is_element() => n.tag_name().namespace().unwrap_or("").to_owned(),
            XNode::Attr(..) => self
                .attribute()
                .and_then(|a| a.namespace().map(str::to_owned))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    fn qualified_name(&self) -> String {
        match self {
            XNode::Node(n) if n.is_element() => element_qname(*n),
            XNode::Attr(owner, _) => match self.attribute() {
                Some(attr) => match attribute_prefix(owner.document(), &attr) {
                    Some(prefix) => format!("{prefix}:{}", attr.name()),
                    None => attr.name().to_owned(),
                },
                None => String::new(),
            },
            _ => self.local_name(),
        }
    }
}

impl PartialEq for XNode<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

/// The result of evaluating an expression.
#[derive(Debug, Clone)]
pub enum Value<'a, 'i> {
    /// Always in document order without duplicates.
    NodeSet(Vec<XNode<'a, 'i>>),
    Bool(bool),
    Number(f64),
    Str(String),
}

impl Value<'_, '_> {
    pub fn to_bool(&self) -> bool {
        match self {
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => string_to_number(&other.to_xpath_string()),
        }
    }

    pub fn to_xpath_string(&self) -> String {
        match self {
            Value::NodeSet(nodes) => nodes.first().map(XNode::string_value).unwrap_or_default(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.clone(),
        }
    }
}

/// Static context for evaluating expressions against one document.
pub struct EvalContext<'a, 'i> {
    pub doc: &'a Document<'i>,
    /// Prefix bindings for name tests in the expression.
    pub namespaces: HashMap<String, String>,
    /// The node returned by `here()`.
    pub here: Option<Node<'a, 'i>>,
    /// ID lookup for the `id()` function.
    pub ids: Option<&'a IdRegistry>,
}

impl<'a, 'i> EvalContext<'a, 'i> {
    pub fn new(doc: &'a Document<'i>) -> Self {
        Self {
            doc,
            namespaces: HashMap::new(),
            here: None,
            ids: None,
        }
    }

    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.insert(prefix.to_owned(), uri.to_owned());
        self
    }

    pub fn with_here(mut self, here: Node<'a, 'i>) -> Self {
        self.here = Some(here);
        self
    }

    pub fn with_ids(mut self, ids: &'a IdRegistry) -> Self {
        self.ids = Some(ids);
        self
    }
}

#[derive(Clone, Copy)]
struct Focus<'a, 'i> {
    node: XNode<'a, 'i>,
    position: usize,
    size: usize,
}

/// Evaluate `expr` with `node` as the context node (position 1 of 1).
pub fn evaluate<'a, 'i>(
    ctx: &EvalContext<'a, 'i>,
    expr: &Expr,
    node: XNode<'a, 'i>,
) -> Result<Value<'a, 'i>, Error> {
    eval(
        ctx,
        expr,
        &Focus {
            node,
            position: 1,
            size: 1,
        },
    )
}

fn eval<'a, 'i>(
    ctx: &EvalContext<'a, 'i>,
    expr: &Expr,
    focus: &Focus<'a, 'i>,
) -> Result<Value<'a, 'i>, Error> {
    match expr {
        Expr::Or(l, r) => {
            if eval(ctx, l, focus)?.to_bool() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(ctx, r, focus)?.to_bool()))
        }
        Expr::And(l, r) => {
            if !eval(ctx, l, focus)?.to_bool() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(ctx, r, focus)?.to_bool()))
        }
        Expr::Binary(op, l, r) => {
            let left = eval(ctx, l, focus)?;
            let right = eval(ctx, r, focus)?;
            Ok(match op {
                BinaryOp::Add => Value::Number(left.to_number() + right.to_number()),
                BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
                BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
                BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
                BinaryOp::Mod => Value::Number(left.to_number() % right.to_number()),
                cmp => Value::Bool(compare(*cmp, &left, &right)),
            })
        }
        Expr::Neg(inner) => Ok(Value::Number(-eval(ctx, inner, focus)?.to_number())),
        Expr::Union(l, r) => {
            let (Value::NodeSet(mut left), Value::NodeSet(right)) =
                (eval(ctx, l, focus)?, eval(ctx, r, focus)?)
            else {
                return Err(Error::XPath("union operands must be node-sets".into()));
            };
            left.extend(right);
            Ok(Value::NodeSet(sort_dedup(left)))
        }
        Expr::Literal(s) => Ok(Value::Str(s.clone())),
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Variable(name) => Err(Error::XPath(format!("unbound variable ${name}"))),
        Expr::Function(name, args) => call_function(ctx, name, args, focus),
        Expr::Path(path) => eval_path(ctx, path, focus).map(Value::NodeSet),
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            let Value::NodeSet(nodes) = eval(ctx, primary, focus)? else {
                return Err(Error::XPath("predicate applied to a non-node-set".into()));
            };
            let nodes = apply_predicates(ctx, predicates, nodes, false)?;
            apply_steps(ctx, steps, nodes).map(Value::NodeSet)
        }
    }
}

// ── Location paths ───────────────────────────────────────────────────

fn eval_path<'a, 'i>(
    ctx: &EvalContext<'a, 'i>,
    path: &Path,
    focus: &Focus<'a, 'i>,
) -> Result<Vec<XNode<'a, 'i>>, Error> {
    let start = if path.absolute {
        vec![XNode::Node(ctx.doc.root())]
    } else {
        vec![focus.node]
    };
    apply_steps(ctx, &path.steps, start)
}

fn apply_steps<'a, 'i>(
    ctx: &EvalContext<'a, 'i>,
    steps: &[Step],
    mut current: Vec<XNode<'a, 'i>>,
) -> Result<Vec<XNode<'a, 'i>>, Error> {
    for step in steps {
        let mut next = Vec::new();
        for node in &current {
            let mut candidates = Vec::new();
            for candidate in axis_nodes(ctx.doc, step.axis, *node) {
                if matches_test(ctx, &step.test, step.axis, &candidate)? {
                    candidates.push(candidate);
                }
            }
            next.extend(apply_predicates(
                ctx,
                &step.predicates,
                candidates,
                step.axis.is_reverse(),
            )?);
        }
        current = sort_dedup(next);
    }
    Ok(current)
}

/// Filter `nodes` (document order) by each predicate in turn.
fn apply_predicates<'a, 'i>(
    ctx: &EvalContext<'a, 'i>,
    predicates: &[Expr],
    mut nodes: Vec<XNode<'a, 'i>>,
    reverse: bool,
) -> Result<Vec<XNode<'a, 'i>>, Error> {
    for predicate in predicates {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in nodes.iter().enumerate() {
            let position = if reverse { size - i } else { i + 1 };
            let focus = Focus {
                node: *node,
                position,
                size,
            };
            let keep = match eval(ctx, predicate, &focus)? {
                Value::Number(n) => n == position as f64,
                other => other.to_bool(),
            };
            if keep {
                kept.push(*node);
            }
        }
        nodes = kept;
    }
    Ok(nodes)
}

fn sort_dedup<'a, 'i>(mut nodes: Vec<XNode<'a, 'i>>) -> Vec<XNode<'a, 'i>> {
    nodes.sort_by_key(XNode::sort_key);
    nodes.dedup_by_key(|n| n.sort_key());
    nodes
}

/// Nodes on `axis` from `node`, in document order.
fn axis_nodes<'a, 'i>(doc: &'a Document<'i>, axis: Axis, node: XNode<'a, 'i>) -> Vec<XNode<'a, 'i>> {
    let tree = node.tree_node();
    let owner = node.owner();
    match axis {
        Axis::SelfAxis => vec![node],
        Axis::Child => tree
            .map(|n| n.children().map(XNode::Node).collect())
            .unwrap_or_default(),
        Axis::Descendant => tree
            .map(|n| n.descendants().skip(1).map(XNode::Node).collect())
            .unwrap_or_default(),
        Axis::DescendantOrSelf => match tree {
            Some(n) => n.descendants().map(XNode::Node).collect(),
            None => vec![node],
        },
        Axis::Parent => match tree {
            Some(n) => n.parent().map(XNode::Node).into_iter().collect(),
            None => vec![XNode::Node(owner)],
        },
        Axis::Ancestor | Axis::AncestorOrSelf => {
            let mut out: Vec<XNode<'a, 'i>> = match tree {
                Some(n) => n.ancestors().skip(1).map(XNode::Node).collect(),
                None => owner.ancestors().map(XNode::Node).collect(),
            };
            if axis == Axis::AncestorOrSelf {
                out.insert(0, node);
            }
            out.reverse();
            out
        }
        Axis::FollowingSibling => tree
            .map(|n| n.next_siblings().skip(1).map(XNode::Node).collect())
            .unwrap_or_default(),
        Axis::PrecedingSibling => {
            let mut out: Vec<XNode<'a, 'i>> = tree
                .map(|n| n.prev_siblings().skip(1).map(XNode::Node).collect())
                .unwrap_or_default();
            out.reverse();
            out
        }
        Axis::Following => {
            // Attribute and namespace nodes precede their owner's children.
            let after = match tree {
                Some(n) => n
                    .descendants()
                    .last()
                    .map_or(n.id().get_usize(), |d| d.id().get_usize()),
                None => owner.id().get_usize(),
            };
            doc.descendants()
                .filter(|d| d.id().get_usize() > after)
                .map(XNode::Node)
                .collect()
        }
        Axis::Preceding => {
            let ancestors: HashSet<usize> =
                owner.ancestors().map(|a| a.id().get_usize()).collect();
            let before = owner.id().get_usize();
            doc.descendants()
                .filter(|d| d.id().get_usize() < before && !ancestors.contains(&d.id().get_usize()))
                .map(XNode::Node)
                .collect()
        }
        Axis::Attribute => match tree {
            Some(n) if n.is_element() => (0..n.attributes().count())
                .map(|i| XNode::Attr(n, i))
                .collect(),
            _ => Vec::new(),
        },
        Axis::Namespace => match tree {
            Some(n) if n.is_element() => n
                .namespaces()
                .map(|ns| XNode::Namespace {
                    owner: n,
                    prefix: ns.name(),
                    uri: ns.uri(),
                })
                .collect(),
            _ => Vec::new(),
        },
    }
}

fn matches_test(
    ctx: &EvalContext<'_, '_>,
    test: &NodeTest,
    axis: Axis,
    node: &XNode<'_, '_>,
) -> Result<bool, Error> {
    let principal = match axis {
        Axis::Attribute => matches!(node, XNode::Attr(..)),
        Axis::Namespace => matches!(node, XNode::Namespace { .. }),
        _ => node.tree_node().is_some_and(|n| n.is_element()),
    };
    Ok(match test {
        NodeTest::Node => true,
        NodeTest::Text => node.tree_node().is_some_and(|n| n.is_text()),
        NodeTest::Comment => node.tree_node().is_some_and(|n| n.is_comment()),
        NodeTest::ProcessingInstruction(target) => match node.tree_node().and_then(|n| n.pi()) {
            Some(pi) => target.as_deref().map_or(true, |t| t == pi.target),
            None => false,
        },
        NodeTest::Name(NameToken::Any) => principal,
        NodeTest::Name(NameToken::NamespaceAny(prefix)) => {
            let uri = resolve_prefix(ctx, prefix)?;
            principal && node.namespace_uri() == uri
        }
        NodeTest::Name(NameToken::QName { prefix, local }) => {
            if !principal || node.local_name() != *local {
                false
            } else if let XNode::Namespace { .. } = node {
                prefix.is_none()
            } else {
                match prefix {
                    Some(p) => node.namespace_uri() == resolve_prefix(ctx, p)?,
                    None => node.namespace_uri().is_empty(),
                }
            }
        }
    })
}

fn resolve_prefix<'c>(ctx: &'c EvalContext<'_, '_>, prefix: &str) -> Result<&'c str, Error> {
    if prefix == "xml" {
        return Ok(ns::XML);
    }
    ctx.namespaces
        .get(prefix)
        .map(String::as_str)
        .ok_or_else(|| Error::XPath(format!("undeclared namespace prefix: {prefix}")))
}

// ── Comparisons ──────────────────────────────────────────────────────

fn compare(op: BinaryOp, left: &Value<'_, '_>, right: &Value<'_, '_>) -> bool {
    match (left, right) {
        (Value::NodeSet(_), Value::Bool(_)) | (Value::Bool(_), Value::NodeSet(_)) => {
            compare_scalars(op, &Value::Bool(left.to_bool()), &Value::Bool(right.to_bool()))
        }
        (Value::NodeSet(a), Value::NodeSet(b)) => {
            let right_strings: Vec<String> = b.iter().map(XNode::string_value).collect();
            a.iter().any(|x| {
                let xs = x.string_value();
                right_strings
                    .iter()
                    .any(|ys| compare_scalars(op, &Value::Str(xs.clone()), &Value::Str(ys.clone())))
            })
        }
        (Value::NodeSet(a), other) => a
            .iter()
            .any(|x| compare_scalars(op, &Value::Str(x.string_value()), other)),
        (other, Value::NodeSet(b)) => b
            .iter()
            .any(|y| compare_scalars(op, other, &Value::Str(y.string_value()))),
        _ => compare_scalars(op, left, right),
    }
}

fn compare_scalars(op: BinaryOp, left: &Value<'_, '_>, right: &Value<'_, '_>) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::Neq => {
            let equal = match (left, right) {
                (Value::Bool(_), _) | (_, Value::Bool(_)) => left.to_bool() == right.to_bool(),
                (Value::Number(_), _) | (_, Value::Number(_)) => {
                    left.to_number() == right.to_number()
                }
                _ => left.to_xpath_string() == right.to_xpath_string(),
            };
            if op == BinaryOp::Eq {
                equal
            } else {
                !equal
            }
        }
        _ => {
            let (a, b) = (left.to_number(), right.to_number());
            match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                BinaryOp::Ge => a >= b,
                _ => false,
            }
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    let digits = t.strip_prefix('-').unwrap_or(t);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits != ".";
    if valid {
        t.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.into()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

// ── Function library ─────────────────────────────────────────────────

fn check_arity(name: &str, args: &[Expr], min: usize, max: usize) -> Result<(), Error> {
    if args.len() < min || args.len() > max {
        return Err(Error::XPath(format!(
            "{name}() takes {min}..={max} arguments, got {}",
            args.len()
        )));
    }
    Ok(())
}

fn string_arg<'a, 'i>(
    ctx: &EvalContext<'a, 'i>,
    args: &[Expr],
    idx: usize,
    focus: &Focus<'a, 'i>,
) -> Result<String, Error> {
    match args.get(idx) {
        Some(arg) => Ok(eval(ctx, arg, focus)?.to_xpath_string()),
        None => Ok(focus.node.string_value()),
    }
}

fn node_arg<'a, 'i>(
    ctx: &EvalContext<'a, 'i>,
    args: &[Expr],
    focus: &Focus<'a, 'i>,
) -> Result<Option<XNode<'a, 'i>>, Error> {
    match args.first() {
        Some(arg) => match eval(ctx, arg, focus)? {
            Value::NodeSet(nodes) => Ok(nodes.first().copied()),
            _ => Err(Error::XPath("argument must be a node-set".into())),
        },
        None => Ok(Some(focus.node)),
    }
}

fn call_function<'a, 'i>(
    ctx: &EvalContext<'a, 'i>,
    name: &str,
    args: &[Expr],
    focus: &Focus<'a, 'i>,
) -> Result<Value<'a, 'i>, Error> {
    let value = match name {
        "last" => {
            check_arity(name, args, 0, 0)?;
            Value::Number(focus.size as f64)
        }
        "position" => {
            check_arity(name, args, 0, 0)?;
            Value::Number(focus.position as f64)
        }
        "count" => {
            check_arity(name, args, 1, 1)?;
            match eval(ctx, &args[0], focus)? {
                Value::NodeSet(nodes) => Value::Number(nodes.len() as f64),
                _ => return Err(Error::XPath("count() requires a node-set".into())),
            }
        }
        "id" => {
            check_arity(name, args, 1, 1)?;
            let tokens = match eval(ctx, &args[0], focus)? {
                Value::NodeSet(nodes) => nodes
                    .iter()
                    .map(XNode::string_value)
                    .collect::<Vec<_>>()
                    .join(" "),
                other => other.to_xpath_string(),
            };
            let mut found = Vec::new();
            if let Some(ids) = ctx.ids {
                for id in tokens.split_whitespace() {
                    if let Some(node) = ids.lookup(ctx.doc, id) {
                        found.push(XNode::Node(node));
                    }
                }
            }
            Value::NodeSet(sort_dedup(found))
        }
        "here" => {
            check_arity(name, args, 0, 0)?;
            let here = ctx
                .here
                .ok_or_else(|| Error::XPath("here() is not available in this context".into()))?;
            Value::NodeSet(vec![XNode::Node(here)])
        }
        "local-name" | "namespace-uri" | "name" => {
            check_arity(name, args, 0, 1)?;
            let s = match node_arg(ctx, args, focus)? {
                Some(node) => match name {
                    "local-name" => node.local_name(),
                    "namespace-uri" => node.namespace_uri(),
                    _ => node.qualified_name(),
                },
                None => String::new(),
            };
            Value::Str(s)
        }
        "string" => {
            check_arity(name, args, 0, 1)?;
            Value::Str(string_arg(ctx, args, 0, focus)?)
        }
        "concat" => {
            if args.len() < 2 {
                return Err(Error::XPath("concat() takes at least 2 arguments".into()));
            }
            let mut out = String::new();
            for arg in args {
                out.push_str(&eval(ctx, arg, focus)?.to_xpath_string());
            }
            Value::Str(out)
        }
        "starts-with" | "contains" | "substring-before" | "substring-after" => {
            check_arity(name, args, 2, 2)?;
            let s = string_arg(ctx, args, 0, focus)?;
            let t = string_arg(ctx, args, 1, focus)?;
            match name {
                "starts-with" => Value::Bool(s.starts_with(&t)),
                "contains" => Value::Bool(s.contains(&t)),
                "substring-before" => {
                    Value::Str(s.find(&t).map(|i| s[..i].to_owned()).unwrap_or_default())
                }
                _ => Value::Str(
                    s.find(&t)
                        .map(|i| s[i + t.len()..].to_owned())
                        .unwrap_or_default(),
                ),
            }
        }
        "substring" => {
            check_arity(name, args, 2, 3)?;
            let s = string_arg(ctx, args, 0, focus)?;
            let start = xpath_round(eval(ctx, &args[1], focus)?.to_number());
            let end = match args.get(2) {
                Some(len) => start + xpath_round(eval(ctx, len, focus)?.to_number()),
                None => f64::INFINITY,
            };
            let out: String = s
                .chars()
                .enumerate()
                .filter(|(i, _)| {
                    let p = (*i + 1) as f64;
                    p >= start && p < end
                })
                .map(|(_, c)| c)
                .collect();
            Value::Str(out)
        }
        "string-length" => {
            check_arity(name, args, 0, 1)?;
            Value::Number(string_arg(ctx, args, 0, focus)?.chars().count() as f64)
        }
        "normalize-space" => {
            check_arity(name, args, 0, 1)?;
            let s = string_arg(ctx, args, 0, focus)?;
            Value::Str(s.split_whitespace().collect::<Vec<_>>().join(" "))
        }
        "translate" => {
            check_arity(name, args, 3, 3)?;
            let s = string_arg(ctx, args, 0, focus)?;
            let from: Vec<char> = string_arg(ctx, args, 1, focus)?.chars().collect();
            let to: Vec<char> = string_arg(ctx, args, 2, focus)?.chars().collect();
            let out: String = s
                .chars()
                .filter_map(|c| match from.iter().position(|f| *f == c) {
                    Some(i) => to.get(i).copied(),
                    None => Some(c),
                })
                .collect();
            Value::Str(out)
        }
        "boolean" => {
            check_arity(name, args, 1, 1)?;
            Value::Bool(eval(ctx, &args[0], focus)?.to_bool())
        }
        "not" => {
            check_arity(name, args, 1, 1)?;
            Value::Bool(!eval(ctx, &args[0], focus)?.to_bool())
        }
        "true" => {
            check_arity(name, args, 0, 0)?;
            Value::Bool(true)
        }
        "false" => {
            check_arity(name, args, 0, 0)?;
            Value::Bool(false)
        }
        "lang" => {
            check_arity(name, args, 1, 1)?;
            let wanted = string_arg(ctx, args, 0, focus)?.to_ascii_lowercase();
            let lang = focus
                .node
                .owner()
                .ancestors()
                .find_map(|n| n.attribute((ns::XML, "lang")))
                .map(str::to_ascii_lowercase);
            Value::Bool(lang.is_some_and(|l| {
                l == wanted || l.strip_prefix(&wanted).is_some_and(|rest| rest.starts_with('-'))
            }))
        }
        "number" => {
            check_arity(name, args, 0, 1)?;
            match args.first() {
                Some(arg) => Value::Number(eval(ctx, arg, focus)?.to_number()),
                None => Value::Number(string_to_number(&focus.node.string_value())),
            }
        }
        "sum" => {
            check_arity(name, args, 1, 1)?;
            match eval(ctx, &args[0], focus)? {
                Value::NodeSet(nodes) => Value::Number(
                    nodes
                        .iter()
                        .map(|n| string_to_number(&n.string_value()))
                        .sum(),
                ),
                _ => return Err(Error::XPath("sum() requires a node-set".into())),
            }
        }
        "floor" | "ceiling" | "round" => {
            check_arity(name, args, 1, 1)?;
            let n = eval(ctx, &args[0], focus)?.to_number();
            Value::Number(match name {
                "floor" => n.floor(),
                "ceiling" => n.ceil(),
                _ => xpath_round(n),
            })
        }
        other => return Err(Error::XPath(format!("unknown function: {other}()"))),
    };
    Ok(value)
}
