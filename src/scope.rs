// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use regex::Regex;

use crate::compile::CompiledNode;
use crate::disjoint::Disjoint;
use crate::error::SchemaError;
use crate::kinds::NodeKind;
use crate::node::Node;
use crate::parse;
use crate::traverse::TraversalContext;
use crate::value::Value;

type String = Rc<str>;

pub(crate) type PredicateFn = Rc<dyn Fn(&Value) -> bool>;
pub(crate) type ContextualPredicateFn = Rc<dyn Fn(&Value, &mut TraversalContext) -> bool>;
pub(crate) type MorphFn = Rc<dyn Fn(&Value) -> Value>;

/// A non-primitive value embedded in a node: referenced from canonical
/// JSON by index so the JSON itself stays serializable.
#[derive(Clone)]
pub(crate) enum Registered {
    Regex(Rc<Regex>),
    Predicate(PredicateFn),
    ContextualPredicate(ContextualPredicateFn),
    Morph(MorphFn),
}

impl Registered {
    fn kind_name(&self) -> &'static str {
        match self {
            Registered::Regex(_) => "regex",
            Registered::Predicate(_) | Registered::ContextualPredicate(_) => "predicate",
            Registered::Morph(_) => "morph",
        }
    }
}

/// Index of a registered value within its scope's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RegistryRef(pub usize);

impl RegistryRef {
    /// Serialized reference token, e.g. `"$reg:3"`.
    pub fn to_value(self) -> Value {
        Value::from(format!("$reg:{}", self.0))
    }

    pub fn from_token(token: &str) -> Option<RegistryRef> {
        let index = token.strip_prefix("$reg:")?;
        index.parse::<usize>().ok().map(RegistryRef)
    }
}

/// Parse options accepted by [`Scope::parse_node_with`].
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Suppress the reduce step. Used when the caller has already
    /// guaranteed the schema is in canonical reduced form, e.g. when
    /// re-parsing a node's own canonical JSON.
    pub prereduced: bool,
    /// Restrict acceptable result kinds; parsing fails otherwise.
    pub allowed_kinds: Option<Vec<NodeKind>>,
}

#[derive(Default)]
pub(crate) struct ScopeData {
    /// Interned nodes by canonical id. Append-only: entries are never
    /// evicted or replaced, so equal ids always resolve to the same node.
    pub nodes: RefCell<BTreeMap<String, Node>>,
    /// Memoized pairwise intersection results keyed by
    /// `"<l.type_id>&<r.type_id>"`.
    pub intersections: RefCell<BTreeMap<String, Result<Node, Disjoint>>>,
    /// Registry of embedded non-primitive values.
    pub registry: RefCell<Vec<Registered>>,
    /// Compiled checks per root node id.
    pub compiled: RefCell<BTreeMap<String, CompiledNode>>,
}

/// The context object threaded through parsing, intersection, and
/// compilation.
///
/// A scope owns all caches that the original design kept in process-wide
/// globals: the node intern table, the pairwise intersection cache, and
/// the registry of embedded values. Multiple independent scopes may
/// coexist in one process; nodes from different scopes must not be mixed.
///
/// All caches grow monotonically and entries are immutable once inserted,
/// so interior mutability is limited to insert-if-absent updates.
#[derive(Clone, Default)]
pub struct Scope {
    pub(crate) data: Rc<ScopeData>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn downgrade(&self) -> WeakScope {
        WeakScope(Rc::downgrade(&self.data))
    }

    /// Parse a raw schema of a known kind into a node.
    pub fn parse_node(&self, kind: NodeKind, raw: Value) -> Result<Node, SchemaError> {
        parse::parse_node(self, kind, raw, &ParseOptions::default())
    }

    /// Parse with explicit options (`prereduced`, `allowed_kinds`).
    pub fn parse_node_with(
        &self,
        kind: NodeKind,
        raw: Value,
        options: &ParseOptions,
    ) -> Result<Node, SchemaError> {
        parse::parse_node(self, kind, raw, options)
    }

    /// Parse a raw schema whose kind is inferred from its shape: a domain
    /// name string, an array of union branches, or an object keyed by
    /// constraint kinds.
    pub fn parse_type(&self, raw: Value) -> Result<Node, SchemaError> {
        parse::parse_type(self, raw, &ParseOptions::default())
    }

    /// Parse a set of exact values into a unit node (one value) or a
    /// union of unit nodes, deduplicated.
    pub fn parse_units(&self, values: Vec<Value>) -> Result<Node, SchemaError> {
        parse::parse_units(self, values)
    }

    /// The node accepting every value: the empty intersection.
    pub fn unknown(&self) -> Node {
        match self.parse_node_with(
            NodeKind::Intersection,
            Value::new_object(),
            &ParseOptions {
                prereduced: true,
                allowed_kinds: None,
            },
        ) {
            Ok(node) => node,
            Err(e) => internal_error!("failed to build unknown node: {e}"),
        }
    }

    /// The node accepting no value: the empty union.
    pub fn never(&self) -> Node {
        match self.parse_node_with(
            NodeKind::Union,
            Value::new_array(),
            &ParseOptions {
                prereduced: true,
                allowed_kinds: None,
            },
        ) {
            Ok(node) => node,
            Err(e) => internal_error!("failed to build never node: {e}"),
        }
    }

    /// Register a context-free predicate function and return the schema
    /// token that references it (usable as the value of a `predicate`
    /// key).
    pub fn register_predicate(&self, predicate: impl Fn(&Value) -> bool + 'static) -> Value {
        self.register(Registered::Predicate(Rc::new(predicate)))
            .to_value()
    }

    /// Register a predicate that receives the traversal context. Nodes
    /// holding one of these are flagged so the compiler always threads the
    /// context through.
    pub fn register_contextual_predicate(
        &self,
        predicate: impl Fn(&Value, &mut TraversalContext) -> bool + 'static,
    ) -> Value {
        self.register(Registered::ContextualPredicate(Rc::new(predicate)))
            .to_value()
    }

    /// Register a value transformation and return its schema token
    /// (usable inside a `morph` key).
    pub fn register_morph(&self, morph: impl Fn(&Value) -> Value + 'static) -> Value {
        self.register(Registered::Morph(Rc::new(morph))).to_value()
    }

    pub(crate) fn register(&self, value: Registered) -> RegistryRef {
        let mut registry = self.data.registry.borrow_mut();
        registry.push(value);
        RegistryRef(registry.len() - 1)
    }

    /// Register a compiled regex, reusing an existing entry with the same
    /// source so equal patterns share one compiled form.
    pub(crate) fn register_regex(&self, regex: Regex) -> RegistryRef {
        {
            let registry = self.data.registry.borrow();
            for (index, entry) in registry.iter().enumerate() {
                if let Registered::Regex(existing) = entry {
                    if existing.as_str() == regex.as_str() {
                        return RegistryRef(index);
                    }
                }
            }
        }
        self.register(Registered::Regex(Rc::new(regex)))
    }

    pub(crate) fn resolve(&self, reference: RegistryRef) -> Option<Registered> {
        self.data.registry.borrow().get(reference.0).cloned()
    }

    /// Resolve a schema token to a registry entry, verifying its kind.
    pub(crate) fn resolve_token(
        &self,
        token: &str,
        expected: &'static str,
    ) -> Result<(RegistryRef, Registered), SchemaError> {
        let invalid = || SchemaError::InvalidRegistryRef {
            reference: Rc::from(token),
            expected: Rc::from(expected),
        };
        let reference = RegistryRef::from_token(token).ok_or_else(invalid)?;
        let entry = self.resolve(reference).ok_or_else(invalid)?;
        if entry.kind_name() != expected {
            return Err(invalid());
        }
        Ok((reference, entry))
    }

    pub(crate) fn cached_node(&self, id: &str) -> Option<Node> {
        self.data.nodes.borrow().get(id).cloned()
    }

    pub(crate) fn intern(&self, id: String, node: Node) {
        self.data.nodes.borrow_mut().insert(id, node);
    }
}

/// Back-reference from a node to its owning scope. Nodes never outlive
/// their scope in a correct program; a dead upgrade is an internal
/// invariant violation.
#[derive(Clone)]
pub(crate) struct WeakScope(Weak<ScopeData>);

impl WeakScope {
    pub fn upgrade(&self) -> Scope {
        match self.0.upgrade() {
            Some(data) => Scope { data },
            None => internal_error!("node used after its scope was dropped"),
        }
    }
}
