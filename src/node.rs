// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

use crate::compile::{CompiledNode, Compiler};
use crate::disjoint::Disjoint;
use crate::error::SchemaError;
use crate::intersect;
use crate::kinds::NodeKind;
use crate::nodes::Inner;
use crate::scope::{Scope, WeakScope};
use crate::traverse::{Diagnostic, TraversalContext};
use crate::value::Value;

type String = Rc<str>;

/// Which projection of a morph-bearing node to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoKind {
    In,
    Out,
}

pub(crate) struct NodeData {
    pub kind: NodeKind,
    pub inner: Inner,
    pub children: Vec<Node>,
    pub json: Value,
    pub type_json: Value,
    pub collapsible_json: Value,
    pub id: String,
    pub type_id: String,
    pub description: Option<String>,
    pub includes_morph: bool,
    pub includes_contextual_predicate: bool,
    pub scope: WeakScope,
    io_in: RefCell<Option<Node>>,
    io_out: RefCell<Option<Node>>,
}

/// An immutable validation rule, interned within its scope.
///
/// A node is a cheap shared handle: children may be referenced by many
/// parents since nodes are deduplicated by canonical identity. Two nodes
/// parsed from the same canonical schema within one scope are the *same*
/// node (`Node::ptr_eq`). Type-level equality (`==`, [`Node::equals`])
/// compares `type_id`, which ignores cosmetic metadata like descriptions.
#[derive(Clone)]
pub struct Node {
    pub(crate) data: Rc<NodeData>,
}

impl Node {
    pub(crate) fn new(
        kind: NodeKind,
        inner: Inner,
        children: Vec<Node>,
        json: Value,
        type_json: Value,
        collapsible_json: Value,
        id: String,
        type_id: String,
        description: Option<String>,
        scope: &Scope,
    ) -> Node {
        let includes_morph =
            kind == NodeKind::Morph || children.iter().any(|child| child.includes_morph());
        let includes_contextual_predicate = matches!(
            &inner,
            Inner::Predicate(predicate) if predicate.contextual
        ) || children
            .iter()
            .any(|child| child.data.includes_contextual_predicate);
        Node {
            data: Rc::new(NodeData {
                kind,
                inner,
                children,
                json,
                type_json,
                collapsible_json,
                id,
                type_id,
                description,
                includes_morph,
                includes_contextual_predicate,
                scope: scope.downgrade(),
                io_in: RefCell::new(None),
                io_out: RefCell::new(None),
            }),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind
    }

    /// Canonical identity: kind plus full canonical JSON.
    pub fn id(&self) -> &str {
        &self.data.id
    }

    /// Type-level identity: kind plus the JSON restricted to keys that
    /// affect accepted values.
    pub fn type_id(&self) -> &str {
        &self.data.type_id
    }

    /// The canonical JSON form. Feeding it back through the parser with
    /// `prereduced` reconstructs a node with identical `type_id`.
    pub fn to_json(&self) -> &Value {
        &self.data.json
    }

    /// The JSON restricted to keys that affect accepted values
    /// (metadata such as descriptions excluded); the source of
    /// [`Node::type_id`].
    pub fn type_json(&self) -> &Value {
        &self.data.type_json
    }

    /// Simplified serialization: a node with exactly one significant
    /// inner key elides the wrapper object.
    pub fn collapsible_json(&self) -> &Value {
        &self.data.collapsible_json
    }

    /// Whether any node in this subtree is a value transformation.
    pub fn includes_morph(&self) -> bool {
        self.data.includes_morph
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.data.inner
    }

    pub(crate) fn children(&self) -> &[Node] {
        &self.data.children
    }

    pub(crate) fn scope(&self) -> Scope {
        self.data.scope.upgrade()
    }

    /// Type-level equality, independent of descriptions and other
    /// metadata.
    pub fn equals(&self, other: &Node) -> bool {
        self.data.type_id == other.data.type_id
    }

    /// Reference identity: whether both handles point at the same interned
    /// node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// Human description of the accepted values, completing "must be
    /// _____". Uses the schema's `description` metadata when present.
    pub fn description(&self) -> std::string::String {
        match &self.data.description {
            Some(description) => description.to_string(),
            None => self.data.inner.default_description(),
        }
    }

    /// Whether this node accepts no value (the empty union).
    pub fn is_never(&self) -> bool {
        matches!(&self.data.inner, Inner::Union(inner) if inner.branches.is_empty())
    }

    /// Whether this node accepts every value (the empty intersection).
    pub fn is_unknown(&self) -> bool {
        matches!(&self.data.inner, Inner::Intersection(inner) if inner.is_empty())
    }

    /// Boolean test: does this node accept `data`? Short-circuits on the
    /// first failing constraint.
    pub fn allows(&self, data: &Value) -> bool {
        let compiled = self.compiled();
        let mut ctx = TraversalContext::new();
        compiled.allows(data, &mut ctx)
    }

    /// Full validation: traverses all of `data`, collecting one
    /// diagnostic per failing constraint. Never fails for ordinary data —
    /// the diagnostic list is the result.
    pub fn apply(&self, data: &Value) -> Result<Value, Vec<Diagnostic>> {
        let compiled = self.compiled();
        let mut ctx = TraversalContext::new();
        compiled.apply(data, &mut ctx);
        if ctx.errors().is_empty() {
            Ok(data.clone())
        } else {
            Err(ctx.into_errors())
        }
    }

    fn compiled(&self) -> CompiledNode {
        let scope = self.scope();
        let cached = scope.data.compiled.borrow().get(self.id()).cloned();
        if let Some(compiled) = cached {
            return compiled;
        }
        let compiled = Compiler::new(&scope).compile(self);
        scope
            .data
            .compiled
            .borrow_mut()
            .insert(self.data.id.clone(), compiled.clone());
        compiled
    }

    /// The set-theoretic intersection of two nodes: a reduced node, or a
    /// [`Disjoint`] proof that no value satisfies both. Commutative and
    /// memoized per scope.
    pub fn intersect(&self, other: &Node) -> Result<Node, Disjoint> {
        intersect::intersect_nodes(self, other)
    }

    /// Eager intersection: converts a [`Disjoint`] into a parse-time
    /// failure.
    pub fn and(&self, other: &Node) -> Result<Node, SchemaError> {
        self.intersect(other).map_err(|disjoint| disjoint.throw())
    }

    /// The union of two nodes.
    pub fn or(&self, other: &Node) -> Result<Node, SchemaError> {
        let scope = self.scope();
        let branches = Value::from(vec![self.to_json().clone(), other.to_json().clone()]);
        scope.parse_node(NodeKind::Union, branches)
    }

    /// Subtype test: whether every value this node accepts is also
    /// accepted by `other`.
    pub fn extends(&self, other: &Node) -> bool {
        match self.intersect(other) {
            Ok(intersection) => self.equals(&intersection),
            Err(_) => false,
        }
    }

    /// The type accepted *before* any morphs run. Identity when the
    /// subtree contains no morph.
    pub fn extract_in(&self) -> Node {
        self.get_io(IoKind::In)
    }

    /// The type produced *after* all morphs run. Identity when the
    /// subtree contains no morph.
    pub fn extract_out(&self) -> Node {
        self.get_io(IoKind::Out)
    }

    fn get_io(&self, io: IoKind) -> Node {
        if !self.data.includes_morph {
            return self.clone();
        }
        let cache = match io {
            IoKind::In => &self.data.io_in,
            IoKind::Out => &self.data.io_out,
        };
        if let Some(cached) = cache.borrow().as_ref() {
            return cached.clone();
        }
        let projected = self.project_io(io);
        *cache.borrow_mut() = Some(projected.clone());
        projected
    }

    fn project_io(&self, io: IoKind) -> Node {
        let scope = self.scope();
        if let Inner::Morph(inner) = &self.data.inner {
            return match io {
                IoKind::In => inner.in_node.extract_in(),
                IoKind::Out => match &inner.out_node {
                    Some(out) => out.extract_out(),
                    None => scope.unknown(),
                },
            };
        }
        let mapped = self.data.inner.map_children(|child| match io {
            IoKind::In => child.extract_in(),
            IoKind::Out => child.extract_out(),
        });
        crate::parse::finalize_inner(&scope, mapped, self.data.description.clone())
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Node {}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.data.kind, self.data.json)
    }
}
