// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The parser/normalizer: turns loosely-shaped raw schemas into canonical
//! inner representations and interned nodes.
//!
//! Parsing proceeds in four steps: (1) a kind-specific normalize expands
//! shorthand forms to the canonical object form, (2) keys are validated
//! and iterated in sorted order so key order in the source never affects
//! identity, (3) nested schemas are recursively parsed into child nodes,
//! (4) unless the caller marked the schema prereduced, a kind-specific
//! reduce step may replace the result with a simpler node of a different
//! kind entirely.

use std::collections::BTreeMap;
use std::rc::Rc;

use regex::Regex;

use crate::error::SchemaError;
use crate::intersect;
use crate::kinds::NodeKind;
use crate::node::Node;
use crate::nodes::{
    BoundInner, DivisorInner, DomainInner, IndexInner, Inner, IntersectionInner, LengthInner,
    MorphInner, PatternInner, PredicateInner, PropInner, ProtoInner, SequenceInner, UnionInner,
    UnitInner,
};
use crate::number::Number;
use crate::scope::{ParseOptions, Registered, Scope};
use crate::value::{Domain, ObjectKind, Value};

type String = Rc<str>;
type Map = BTreeMap<Value, Value>;

/// Kinds a union branch may reduce to.
pub(crate) const BRANCH_KINDS: [NodeKind; 5] = [
    NodeKind::Intersection,
    NodeKind::Morph,
    NodeKind::Unit,
    NodeKind::Proto,
    NodeKind::Domain,
];

/// Kinds a morph child (in/out) may reduce to.
pub(crate) const MORPH_CHILD_KINDS: [NodeKind; 4] = [
    NodeKind::Intersection,
    NodeKind::Unit,
    NodeKind::Proto,
    NodeKind::Domain,
];

/// Infer the kind of an untagged raw schema from its shape.
pub(crate) fn schema_kind_of(raw: &Value) -> Result<NodeKind, SchemaError> {
    match raw {
        Value::String(s) => {
            if Domain::from_str(s).is_some() {
                Ok(NodeKind::Domain)
            } else if ObjectKind::from_str(s).is_some() {
                Ok(NodeKind::Proto)
            } else {
                Err(SchemaError::InvalidSchema(Rc::from(raw.to_string())))
            }
        }
        Value::Array(_) => Ok(NodeKind::Union),
        Value::Object(map) => {
            let only_unit_keys = map.keys().all(|key| {
                matches!(key, Value::String(s) if matches!(s.as_ref(), "unit" | "description"))
            });
            if map.contains_key(&Value::from("morph")) {
                Ok(NodeKind::Morph)
            } else if map.contains_key(&Value::from("branches")) {
                Ok(NodeKind::Union)
            } else if map.contains_key(&Value::from("unit")) && only_unit_keys {
                Ok(NodeKind::Unit)
            } else {
                Ok(NodeKind::Intersection)
            }
        }
        _ => Err(SchemaError::InvalidSchema(Rc::from(raw.to_string()))),
    }
}

pub(crate) fn parse_type(
    scope: &Scope,
    raw: Value,
    options: &ParseOptions,
) -> Result<Node, SchemaError> {
    let kind = schema_kind_of(&raw)?;
    parse_node(scope, kind, raw, options)
}

pub(crate) fn parse_node(
    scope: &Scope,
    kind: NodeKind,
    raw: Value,
    options: &ParseOptions,
) -> Result<Node, SchemaError> {
    let normalized = normalize(kind, raw)?;
    let (inner, description) = build_inner(scope, kind, &normalized)?;
    let node = if options.prereduced {
        finalize_inner(scope, inner, description)
    } else {
        match reduce(scope, &inner)? {
            Some(reduced) => reduced,
            None => finalize_inner(scope, inner, description),
        }
    };
    check_allowed_kinds(node, options)
}

pub(crate) fn parse_units(scope: &Scope, values: Vec<Value>) -> Result<Node, SchemaError> {
    let mut unique: Vec<Value> = Vec::new();
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    let mut branches = Vec::with_capacity(unique.len());
    for value in unique {
        let mut map = Map::new();
        map.insert(Value::from("unit"), value);
        branches.push(parse_node(
            scope,
            NodeKind::Unit,
            Value::from(map),
            &ParseOptions::default(),
        )?);
    }
    if branches.len() == 1 {
        return Ok(branches.remove(0));
    }
    Ok(finalize_inner(
        scope,
        Inner::Union(UnionInner { branches }),
        None,
    ))
}

fn check_allowed_kinds(node: Node, options: &ParseOptions) -> Result<Node, SchemaError> {
    if let Some(allowed) = &options.allowed_kinds {
        if !allowed.contains(&node.kind()) {
            return Err(SchemaError::KindNotAllowed {
                kind: Rc::from(node.kind().as_str()),
                allowed: Rc::from(
                    allowed
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
            });
        }
    }
    Ok(node)
}

/// Expand shorthand schema forms into the canonical object form.
fn normalize(kind: NodeKind, raw: Value) -> Result<Map, SchemaError> {
    let shorthand = |key: &str, value: Value| {
        let mut map = Map::new();
        map.insert(Value::from(key), value);
        map
    };
    let invalid = |raw: &Value| SchemaError::InvalidSchema(Rc::from(raw.to_string()));
    Ok(match (kind, raw) {
        (NodeKind::Domain, raw @ Value::String(_)) => shorthand("domain", raw),
        (NodeKind::Proto, raw @ Value::String(_)) => shorthand("proto", raw),
        (NodeKind::Divisor, raw @ Value::Number(_)) => shorthand("divisor", raw),
        (
            NodeKind::Min
            | NodeKind::Max
            | NodeKind::MinLength
            | NodeKind::MaxLength
            | NodeKind::ExactLength,
            raw @ Value::Number(_),
        ) => shorthand("limit", raw),
        (NodeKind::Pattern, raw @ Value::String(_)) => shorthand("source", raw),
        (NodeKind::Predicate, raw @ Value::String(_)) => shorthand("predicate", raw),
        (NodeKind::Union, raw @ Value::Array(_)) => shorthand("branches", raw),
        (NodeKind::Intersection, raw @ Value::String(_)) => shorthand("domain", raw),
        (NodeKind::Sequence, raw) => match raw {
            Value::Object(map) if map.contains_key(&Value::from("element")) => (*map).clone(),
            element => shorthand("element", element),
        },
        (_, Value::Object(map)) => (*map).clone(),
        (_, raw) => return Err(invalid(&raw)),
    })
}

struct Keys<'a> {
    kind: NodeKind,
    map: &'a Map,
}

/// Sorted-key accessor over a normalized schema. Validates that every
/// supplied key is recognized for the kind and extracts typed values.
impl<'a> Keys<'a> {
    fn new(kind: NodeKind, map: &'a Map, allowed: &[&str]) -> Result<Self, SchemaError> {
        for key in map.keys() {
            let name = match key {
                Value::String(s) => s.as_ref(),
                _ => "",
            };
            if name != "description" && !allowed.contains(&name) {
                return Err(SchemaError::UnknownKey {
                    kind: Rc::from(kind.as_str()),
                    key: Rc::from(key.to_string()),
                });
            }
        }
        Ok(Keys { kind, map })
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(&Value::from(key))
    }

    fn require(&self, key: &str) -> Result<&'a Value, SchemaError> {
        self.get(key).ok_or_else(|| SchemaError::MissingKey {
            kind: Rc::from(self.kind.as_str()),
            key: Rc::from(key),
        })
    }

    fn invalid(&self, key: &str, reason: &str) -> SchemaError {
        SchemaError::InvalidValue {
            kind: Rc::from(self.kind.as_str()),
            key: Rc::from(key),
            reason: Rc::from(reason),
        }
    }

    fn string(&self, key: &str) -> Result<String, SchemaError> {
        match self.require(key)? {
            Value::String(s) => Ok(s.clone()),
            _ => Err(self.invalid(key, "expected a string")),
        }
    }

    fn optional_string(&self, key: &str) -> Result<Option<String>, SchemaError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(key, "expected a string")),
        }
    }

    fn number(&self, key: &str) -> Result<Number, SchemaError> {
        match self.require(key)? {
            Value::Number(n) => Ok(n.clone()),
            _ => Err(self.invalid(key, "expected a number")),
        }
    }

    fn non_negative_integer(&self, key: &str) -> Result<u64, SchemaError> {
        self.number(key)?
            .as_u64()
            .ok_or_else(|| self.invalid(key, "expected a non-negative integer"))
    }

    fn bool_or_false(&self, key: &str) -> Result<bool, SchemaError> {
        match self.get(key) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(self.invalid(key, "expected a boolean")),
        }
    }

    fn description(&self) -> Option<String> {
        match self.get("description") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

fn build_inner(
    scope: &Scope,
    kind: NodeKind,
    map: &Map,
) -> Result<(Inner, Option<String>), SchemaError> {
    match kind {
        NodeKind::Domain => {
            let keys = Keys::new(kind, map, &["domain"])?;
            let name = keys.string("domain")?;
            let domain = Domain::from_str(&name)
                .ok_or_else(|| keys.invalid("domain", "expected a domain name"))?;
            return Ok((Inner::Domain(DomainInner { domain }), keys.description()));
        }
        NodeKind::Unit => {
            let keys = Keys::new(kind, map, &["unit"])?;
            let unit = keys.require("unit")?.clone();
            return Ok((Inner::Unit(UnitInner { unit }), keys.description()));
        }
        NodeKind::Proto => {
            let keys = Keys::new(kind, map, &["proto"])?;
            let name = keys.string("proto")?;
            let proto = ObjectKind::from_str(&name)
                .ok_or_else(|| keys.invalid("proto", "expected Array or Object"))?;
            return Ok((Inner::Proto(ProtoInner { proto }), keys.description()));
        }
        NodeKind::Divisor => {
            let keys = Keys::new(kind, map, &["divisor"])?;
            let divisor = keys.non_negative_integer("divisor")?;
            if divisor == 0 {
                return Err(keys.invalid("divisor", "expected a positive integer"));
            }
            return Ok((Inner::Divisor(DivisorInner { divisor }), keys.description()));
        }
        NodeKind::Min | NodeKind::Max => {
            let keys = Keys::new(kind, map, &["limit", "exclusive"])?;
            let bound = BoundInner {
                limit: keys.number("limit")?,
                exclusive: keys.bool_or_false("exclusive")?,
            };
            let inner = match kind {
                NodeKind::Min => Inner::Min(bound),
                _ => Inner::Max(bound),
            };
            return Ok((inner, keys.description()));
        }
        NodeKind::MinLength | NodeKind::MaxLength | NodeKind::ExactLength => {
            let keys = Keys::new(kind, map, &["limit"])?;
            let length = LengthInner {
                limit: keys.non_negative_integer("limit")?,
            };
            let inner = match kind {
                NodeKind::MinLength => Inner::MinLength(length),
                NodeKind::MaxLength => Inner::MaxLength(length),
                _ => Inner::ExactLength(length),
            };
            return Ok((inner, keys.description()));
        }
        NodeKind::Pattern => {
            let keys = Keys::new(kind, map, &["source", "flags"])?;
            let source = keys.string("source")?;
            let flags = keys.optional_string("flags")?;
            let full_source = match &flags {
                Some(flags) => format!("(?{flags}){source}"),
                None => source.to_string(),
            };
            let regex = Regex::new(&full_source).map_err(|e| SchemaError::InvalidPattern {
                pattern: source.clone(),
                error: Rc::from(e.to_string()),
            })?;
            let regex = scope.register_regex(regex);
            return Ok((
                Inner::Pattern(PatternInner {
                    source,
                    flags,
                    regex,
                }),
                keys.description(),
            ));
        }
        NodeKind::Predicate => {
            let keys = Keys::new(kind, map, &["predicate"])?;
            let token = keys.string("predicate")?;
            let (predicate, entry) = scope.resolve_token(&token, "predicate")?;
            let contextual = matches!(entry, Registered::ContextualPredicate(_));
            return Ok((
                Inner::Predicate(PredicateInner {
                    predicate,
                    contextual,
                }),
                keys.description(),
            ));
        }
        NodeKind::Required | NodeKind::Optional => {
            let keys = Keys::new(kind, map, &["key", "value"])?;
            let prop = PropInner {
                key: keys.string("key")?,
                value: parse_type(scope, keys.require("value")?.clone(), &ParseOptions::default())?,
            };
            let inner = match kind {
                NodeKind::Required => Inner::Required(prop),
                _ => Inner::Optional(prop),
            };
            return Ok((inner, keys.description()));
        }
        NodeKind::Index => {
            let keys = Keys::new(kind, map, &["signature", "value"])?;
            return Ok((
                Inner::Index(IndexInner {
                    signature: parse_type(
                        scope,
                        keys.require("signature")?.clone(),
                        &ParseOptions::default(),
                    )?,
                    value: parse_type(
                        scope,
                        keys.require("value")?.clone(),
                        &ParseOptions::default(),
                    )?,
                }),
                keys.description(),
            ));
        }
        NodeKind::Sequence => {
            let keys = Keys::new(kind, map, &["element"])?;
            return Ok((
                Inner::Sequence(SequenceInner {
                    element: parse_type(
                        scope,
                        keys.require("element")?.clone(),
                        &ParseOptions::default(),
                    )?,
                }),
                keys.description(),
            ));
        }
        NodeKind::Union => {
            let keys = Keys::new(kind, map, &["branches"])?;
            let raw_branches = match keys.require("branches")? {
                Value::Array(branches) => (**branches).clone(),
                _ => return Err(keys.invalid("branches", "expected an array")),
            };
            let mut branches = Vec::new();
            for raw in raw_branches {
                let branch = parse_type(scope, raw, &ParseOptions::default())?;
                // nested unions flatten into the parent's branch list
                let nested = match branch.inner() {
                    Inner::Union(nested) => Some(nested.branches.clone()),
                    _ => None,
                };
                match nested {
                    Some(nested) => branches.extend(nested),
                    None => {
                        check_allowed_kinds(
                            branch.clone(),
                            &ParseOptions {
                                prereduced: false,
                                allowed_kinds: Some(BRANCH_KINDS.to_vec()),
                            },
                        )?;
                        branches.push(branch);
                    }
                }
            }
            return Ok((Inner::Union(UnionInner { branches }), keys.description()));
        }
        NodeKind::Morph => {
            let keys = Keys::new(kind, map, &["in", "out", "morph"])?;
            let child_options = ParseOptions {
                prereduced: false,
                allowed_kinds: Some(MORPH_CHILD_KINDS.to_vec()),
            };
            let in_node = parse_type(scope, keys.require("in")?.clone(), &child_options)?;
            let out_node = match keys.get("out") {
                Some(raw) => Some(parse_type(scope, raw.clone(), &child_options)?),
                None => None,
            };
            let raw_morphs = match keys.require("morph")? {
                Value::Array(tokens) => (**tokens).clone(),
                token => vec![token.clone()],
            };
            let mut morphs = Vec::with_capacity(raw_morphs.len());
            for token in raw_morphs {
                let token = match token {
                    Value::String(s) => s,
                    other => return Err(keys.invalid("morph", &other.to_string())),
                };
                let (reference, _) = scope.resolve_token(&token, "morph")?;
                morphs.push(reference);
            }
            return Ok((
                Inner::Morph(MorphInner {
                    in_node,
                    out_node,
                    morphs,
                }),
                keys.description(),
            ));
        }
        NodeKind::Intersection => {
            const KEYS: [&str; 15] = [
                "domain",
                "proto",
                "unit",
                "divisor",
                "min",
                "max",
                "minLength",
                "maxLength",
                "exactLength",
                "pattern",
                "predicate",
                "required",
                "optional",
                "index",
                "sequence",
            ];
            let keys = Keys::new(kind, map, &KEYS)?;
            let mut inner = IntersectionInner::default();
            // basis keys fold first so refinement prerequisites are
            // checked against the basis regardless of schema key order
            for basis_key in ["unit", "proto", "domain"] {
                if let Some(raw) = keys.get(basis_key) {
                    let basis_kind = match NodeKind::from_str(basis_key) {
                        Some(kind) => kind,
                        None => internal_error!("unmapped basis key {basis_key}"),
                    };
                    let basis =
                        parse_node(scope, basis_kind, raw.clone(), &ParseOptions::default())?;
                    intersect::fold_into(&mut inner, &basis).map_err(|d| d.throw())?;
                }
            }
            for constraint_key in KEYS {
                if matches!(constraint_key, "unit" | "proto" | "domain") {
                    continue;
                }
                let raw = match keys.get(constraint_key) {
                    Some(raw) => raw,
                    None => continue,
                };
                let constraint_kind = match NodeKind::from_str(constraint_key) {
                    Some(kind) => kind,
                    None => internal_error!("unmapped constraint key {constraint_key}"),
                };
                let raw_list = match raw {
                    Value::Array(list) if constraint_kind.has_open_intersection() => {
                        (**list).clone()
                    }
                    other => vec![other.clone()],
                };
                for raw_constraint in raw_list {
                    let constraint = parse_node(
                        scope,
                        constraint_kind,
                        raw_constraint,
                        &ParseOptions::default(),
                    )?;
                    intersect::fold_into(&mut inner, &constraint).map_err(|d| d.throw())?;
                }
            }
            return Ok((Inner::Intersection(inner), keys.description()));
        }
    }
}

/// Kind-specific reductions: a schema may parse to an entirely different
/// node than its kind suggests.
fn reduce(scope: &Scope, inner: &Inner) -> Result<Option<Node>, SchemaError> {
    match inner {
        Inner::Union(union) => {
            // dedupe branches by type identity; a singleton union IS its
            // branch
            let mut unique: Vec<Node> = Vec::new();
            for branch in &union.branches {
                if !unique.iter().any(|b| b.equals(branch)) {
                    unique.push(branch.clone());
                }
            }
            if unique.len() == 1 {
                return Ok(Some(unique.remove(0)));
            }
            if unique.len() != union.branches.len() {
                return Ok(Some(finalize_inner(
                    scope,
                    Inner::Union(UnionInner { branches: unique }),
                    None,
                )));
            }
            Ok(None)
        }
        Inner::Intersection(intersection) => {
            let mut intersection = intersection.clone();
            let mut changed = false;
            // minLength and maxLength meeting at one limit fold into
            // exactLength
            let length_limits = match (&intersection.min_length, &intersection.max_length) {
                (Some(min), Some(max)) => match (min.inner(), max.inner()) {
                    (Inner::MinLength(min), Inner::MaxLength(max)) => Some((min.limit, max.limit)),
                    _ => internal_error!("mistyped length slots in intersection"),
                },
                _ => None,
            };
            if let Some((min_limit, max_limit)) = length_limits {
                if min_limit == max_limit {
                    let mut map = Map::new();
                    map.insert(Value::from("limit"), Value::from(min_limit));
                    let exact = parse_node(
                        scope,
                        NodeKind::ExactLength,
                        Value::from(map),
                        &ParseOptions::default(),
                    )?;
                    intersection.min_length = None;
                    intersection.max_length = None;
                    intersection.exact_length = Some(exact);
                    changed = true;
                }
            }
            // an intersection holding nothing but its basis IS the basis
            let constraints = intersection.constraints();
            if constraints.len() == 1 && intersection.basis.is_some() {
                return Ok(Some(constraints[0].clone()));
            }
            if changed {
                return Ok(Some(finalize_inner(
                    scope,
                    Inner::Intersection(intersection),
                    None,
                )));
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

/// Re-finalize an inner produced by the intersection engine, applying
/// the same reductions a freshly parsed schema would receive. The inner
/// was built from already-validated nodes, so schema errors are
/// unreachable here.
pub(crate) fn rebuild(scope: &Scope, inner: Inner) -> Node {
    match reduce(scope, &inner) {
        Ok(Some(node)) => node,
        Ok(None) => finalize_inner(scope, inner, None),
        Err(e) => internal_error!("re-reduction of folded inner failed: {e}"),
    }
}

/// Finalize a typed inner into an interned node: canonicalize ordering,
/// derive the serialized forms and identities, and return the scope's
/// node for that identity (constructing it on first sight).
pub(crate) fn finalize_inner(scope: &Scope, inner: Inner, description: Option<String>) -> Node {
    let inner = canonicalize(inner);
    let children = inner.children();

    let base_json = inner.to_json();
    let mut type_json = base_json.clone();
    let mut json = base_json.clone();
    if let Some(description) = &description {
        if let Ok(map) = json.as_object_mut() {
            map.insert(
                Value::from("description"),
                Value::from(description.clone()),
            );
        }
    }

    // a node with exactly one significant inner key elides the wrapper;
    // if the collapsed value is itself composite it becomes the full
    // serialization too
    let mut collapsible_json = json.clone();
    if description.is_none() {
        if let Some(collapse_key) = inner.collapse_key() {
            if let Ok(map) = base_json.as_object() {
                if map.len() == 1 {
                    if let Some(value) = map.get(&Value::from(collapse_key)) {
                        collapsible_json = value.clone();
                        if matches!(value, Value::Object(_) | Value::Array(_)) {
                            json = collapsible_json.clone();
                            type_json = collapsible_json.clone();
                        }
                    }
                }
            }
        }
    }

    let id: String = Rc::from(format!("{}{}", inner.kind(), json));
    if let Some(existing) = scope.cached_node(&id) {
        return existing;
    }
    let type_id: String = Rc::from(format!("{}{}", inner.kind(), type_json));
    let node = Node::new(
        inner.kind(),
        inner,
        children,
        json,
        type_json,
        collapsible_json,
        id.clone(),
        type_id,
        description,
        scope,
    );
    scope.intern(id, node.clone());
    node
}

/// Order-insensitive groups are kept sorted so identity never depends on
/// the order constraints were supplied or folded.
fn canonicalize(inner: Inner) -> Inner {
    match inner {
        Inner::Intersection(mut intersection) => {
            let prop_key = |node: &Node| -> String {
                match node.inner() {
                    Inner::Required(prop) | Inner::Optional(prop) => prop.key.clone(),
                    _ => Rc::from(node.id()),
                }
            };
            intersection.required.sort_by_key(&prop_key);
            intersection.optional.sort_by_key(&prop_key);
            intersection
                .index
                .sort_by(|a, b| a.id().cmp(b.id()));
            Inner::Intersection(intersection)
        }
        other => other,
    }
}
