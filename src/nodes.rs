// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Kind-specific inner representations.
//!
//! Each node holds one `Inner` variant. The inner carries the semantic
//! payload of the constraint (limits, keys, child nodes); everything
//! derived from it — canonical JSON, identity, children — is computed once
//! at construction by [`crate::parse`].

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::kinds::NodeKind;
use crate::node::Node;
use crate::number::Number;
use crate::scope::RegistryRef;
use crate::value::{Domain, ObjectKind, Value};

type String = Rc<str>;

#[derive(Debug, Clone)]
pub(crate) struct DomainInner {
    pub domain: Domain,
}

#[derive(Debug, Clone)]
pub(crate) struct UnitInner {
    pub unit: Value,
}

#[derive(Debug, Clone)]
pub(crate) struct ProtoInner {
    pub proto: ObjectKind,
}

/// Numeric range bound (min/max). `exclusive` tightens the comparison.
#[derive(Debug, Clone)]
pub(crate) struct BoundInner {
    pub limit: Number,
    pub exclusive: bool,
}

/// Length bound (minLength/maxLength/exactLength) over strings or arrays.
#[derive(Debug, Clone)]
pub(crate) struct LengthInner {
    pub limit: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct DivisorInner {
    pub divisor: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct PatternInner {
    pub source: String,
    pub flags: Option<String>,
    /// Compiled regex, resolved through the scope registry rather than
    /// stored inline so the canonical JSON stays serializable.
    pub regex: RegistryRef,
}

#[derive(Debug, Clone)]
pub(crate) struct PredicateInner {
    pub predicate: RegistryRef,
    /// Contextual predicates receive the traversal context; plain
    /// predicates can be invoked without one.
    pub contextual: bool,
}

/// A required or optional key constraint on objects.
#[derive(Debug, Clone)]
pub(crate) struct PropInner {
    pub key: String,
    pub value: Node,
}

/// Constrains all keys matching `signature` to values of `value`'s type.
#[derive(Debug, Clone)]
pub(crate) struct IndexInner {
    pub signature: Node,
    pub value: Node,
}

/// Constrains every element of an array.
#[derive(Debug, Clone)]
pub(crate) struct SequenceInner {
    pub element: Node,
}

/// Accumulator for a set of constraints sharing one basis.
///
/// Closed kinds occupy single slots; open kinds accumulate lists. Pattern
/// and predicate lists preserve insertion order (evaluation is
/// sequential); required/optional/index lists are kept sorted by their
/// canonical JSON so key order in the source schema does not affect
/// identity.
#[derive(Debug, Clone, Default)]
pub(crate) struct IntersectionInner {
    pub basis: Option<Node>,
    pub divisor: Option<Node>,
    pub min: Option<Node>,
    pub max: Option<Node>,
    pub min_length: Option<Node>,
    pub max_length: Option<Node>,
    pub exact_length: Option<Node>,
    pub pattern: Vec<Node>,
    pub predicate: Vec<Node>,
    pub required: Vec<Node>,
    pub optional: Vec<Node>,
    pub index: Vec<Node>,
    pub sequence: Option<Node>,
}

impl IntersectionInner {
    /// All constraints in canonical order: basis first, then closed
    /// refinements by kind precedence, then the open groups.
    pub fn constraints(&self) -> Vec<Node> {
        let mut all = Vec::new();
        if let Some(basis) = &self.basis {
            all.push(basis.clone());
        }
        for slot in [
            &self.divisor,
            &self.min,
            &self.max,
            &self.min_length,
            &self.max_length,
            &self.exact_length,
        ] {
            if let Some(node) = slot {
                all.push(node.clone());
            }
        }
        all.extend(self.pattern.iter().cloned());
        all.extend(self.predicate.iter().cloned());
        all.extend(self.required.iter().cloned());
        all.extend(self.optional.iter().cloned());
        all.extend(self.index.iter().cloned());
        if let Some(sequence) = &self.sequence {
            all.push(sequence.clone());
        }
        all
    }

    pub fn is_empty(&self) -> bool {
        self.constraints().is_empty()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct UnionInner {
    pub branches: Vec<Node>,
}

#[derive(Debug, Clone)]
pub(crate) struct MorphInner {
    pub in_node: Node,
    pub out_node: Option<Node>,
    pub morphs: Vec<RegistryRef>,
}

#[derive(Debug, Clone)]
pub(crate) enum Inner {
    Domain(DomainInner),
    Unit(UnitInner),
    Proto(ProtoInner),
    Divisor(DivisorInner),
    Min(BoundInner),
    Max(BoundInner),
    MinLength(LengthInner),
    MaxLength(LengthInner),
    ExactLength(LengthInner),
    Pattern(PatternInner),
    Predicate(PredicateInner),
    Required(PropInner),
    Optional(PropInner),
    Index(IndexInner),
    Sequence(SequenceInner),
    Intersection(IntersectionInner),
    Union(UnionInner),
    Morph(MorphInner),
}

fn obj(entries: Vec<(&str, Value)>) -> Value {
    let mut map = BTreeMap::new();
    for (k, v) in entries {
        map.insert(Value::from(k), v);
    }
    Value::from(map)
}

fn node_list(nodes: &[Node]) -> Value {
    Value::from(
        nodes
            .iter()
            .map(|n| n.collapsible_json().clone())
            .collect::<Vec<_>>(),
    )
}

impl Inner {
    pub fn kind(&self) -> NodeKind {
        match self {
            Inner::Domain(_) => NodeKind::Domain,
            Inner::Unit(_) => NodeKind::Unit,
            Inner::Proto(_) => NodeKind::Proto,
            Inner::Divisor(_) => NodeKind::Divisor,
            Inner::Min(_) => NodeKind::Min,
            Inner::Max(_) => NodeKind::Max,
            Inner::MinLength(_) => NodeKind::MinLength,
            Inner::MaxLength(_) => NodeKind::MaxLength,
            Inner::ExactLength(_) => NodeKind::ExactLength,
            Inner::Pattern(_) => NodeKind::Pattern,
            Inner::Predicate(_) => NodeKind::Predicate,
            Inner::Required(_) => NodeKind::Required,
            Inner::Optional(_) => NodeKind::Optional,
            Inner::Index(_) => NodeKind::Index,
            Inner::Sequence(_) => NodeKind::Sequence,
            Inner::Intersection(_) => NodeKind::Intersection,
            Inner::Union(_) => NodeKind::Union,
            Inner::Morph(_) => NodeKind::Morph,
        }
    }

    /// Child nodes in canonical order. Children are always finalized
    /// before their parent, so the node graph is acyclic by construction.
    pub fn children(&self) -> Vec<Node> {
        match self {
            Inner::Domain(_)
            | Inner::Unit(_)
            | Inner::Proto(_)
            | Inner::Divisor(_)
            | Inner::Min(_)
            | Inner::Max(_)
            | Inner::MinLength(_)
            | Inner::MaxLength(_)
            | Inner::ExactLength(_)
            | Inner::Pattern(_)
            | Inner::Predicate(_) => vec![],
            Inner::Required(prop) | Inner::Optional(prop) => vec![prop.value.clone()],
            Inner::Index(index) => vec![index.signature.clone(), index.value.clone()],
            Inner::Sequence(sequence) => vec![sequence.element.clone()],
            Inner::Intersection(inner) => inner.constraints(),
            Inner::Union(inner) => inner.branches.clone(),
            Inner::Morph(inner) => {
                let mut children = vec![inner.in_node.clone()];
                if let Some(out) = &inner.out_node {
                    children.push(out.clone());
                }
                children
            }
        }
    }

    /// The single significant inner key, where one exists. A node whose
    /// inner holds exactly this key serializes to the bare value
    /// (`collapsible_json`). Units never collapse: a bare value is not
    /// distinguishable from the schema describing it.
    pub fn collapse_key(&self) -> Option<&'static str> {
        match self {
            Inner::Domain(_) => Some("domain"),
            Inner::Proto(_) => Some("proto"),
            Inner::Divisor(_) => Some("divisor"),
            Inner::Min(_) | Inner::Max(_) => Some("limit"),
            Inner::MinLength(_) | Inner::MaxLength(_) | Inner::ExactLength(_) => Some("limit"),
            Inner::Pattern(_) => Some("source"),
            Inner::Sequence(_) => Some("element"),
            Inner::Union(_) => Some("branches"),
            _ => None,
        }
    }

    /// The canonical JSON form of the inner, before node-level metadata
    /// (description) is attached. Identical for json and type json since
    /// all inner keys are significant.
    pub fn to_json(&self) -> Value {
        match self {
            Inner::Domain(d) => obj(vec![("domain", Value::from(d.domain.as_str()))]),
            Inner::Unit(u) => obj(vec![("unit", u.unit.clone())]),
            Inner::Proto(p) => obj(vec![("proto", Value::from(p.proto.as_str()))]),
            Inner::Divisor(d) => obj(vec![("divisor", Value::from(d.divisor))]),
            Inner::Min(b) | Inner::Max(b) => {
                let mut entries = vec![("limit", Value::from(b.limit.clone()))];
                if b.exclusive {
                    entries.push(("exclusive", Value::from(true)));
                }
                obj(entries)
            }
            Inner::MinLength(l) | Inner::MaxLength(l) | Inner::ExactLength(l) => {
                obj(vec![("limit", Value::from(l.limit))])
            }
            Inner::Pattern(p) => {
                let mut entries = vec![("source", Value::from(p.source.clone()))];
                if let Some(flags) = &p.flags {
                    entries.push(("flags", Value::from(flags.clone())));
                }
                obj(entries)
            }
            Inner::Predicate(p) => obj(vec![("predicate", p.predicate.to_value())]),
            Inner::Required(prop) | Inner::Optional(prop) => obj(vec![
                ("key", Value::from(prop.key.clone())),
                ("value", prop.value.collapsible_json().clone()),
            ]),
            Inner::Index(index) => obj(vec![
                ("signature", index.signature.collapsible_json().clone()),
                ("value", index.value.collapsible_json().clone()),
            ]),
            Inner::Sequence(sequence) => {
                obj(vec![("element", sequence.element.collapsible_json().clone())])
            }
            Inner::Intersection(inner) => {
                let mut entries: Vec<(&str, Value)> = Vec::new();
                if let Some(basis) = &inner.basis {
                    entries.push((basis.kind().as_str(), basis.collapsible_json().clone()));
                }
                for (key, slot) in [
                    ("divisor", &inner.divisor),
                    ("min", &inner.min),
                    ("max", &inner.max),
                    ("minLength", &inner.min_length),
                    ("maxLength", &inner.max_length),
                    ("exactLength", &inner.exact_length),
                    ("sequence", &inner.sequence),
                ] {
                    if let Some(node) = slot {
                        entries.push((key, node.collapsible_json().clone()));
                    }
                }
                for (key, list) in [
                    ("pattern", &inner.pattern),
                    ("predicate", &inner.predicate),
                    ("required", &inner.required),
                    ("optional", &inner.optional),
                    ("index", &inner.index),
                ] {
                    if !list.is_empty() {
                        entries.push((key, node_list(list)));
                    }
                }
                obj(entries)
            }
            Inner::Union(inner) => obj(vec![("branches", node_list(&inner.branches))]),
            Inner::Morph(inner) => {
                let mut entries = vec![("in", inner.in_node.collapsible_json().clone())];
                if let Some(out) = &inner.out_node {
                    entries.push(("out", out.collapsible_json().clone()));
                }
                entries.push((
                    "morph",
                    Value::from(
                        inner
                            .morphs
                            .iter()
                            .map(|m| m.to_value())
                            .collect::<Vec<_>>(),
                    ),
                ));
                obj(entries)
            }
        }
    }

    /// Rebuild the inner with each child node replaced. Used by the
    /// in/out projections; morph nodes are handled by the caller since
    /// their projection discards the morph wrapper entirely.
    pub fn map_children(&self, f: impl Fn(&Node) -> Node) -> Inner {
        match self {
            Inner::Domain(_)
            | Inner::Unit(_)
            | Inner::Proto(_)
            | Inner::Divisor(_)
            | Inner::Min(_)
            | Inner::Max(_)
            | Inner::MinLength(_)
            | Inner::MaxLength(_)
            | Inner::ExactLength(_)
            | Inner::Pattern(_)
            | Inner::Predicate(_) => self.clone(),
            Inner::Required(prop) => Inner::Required(PropInner {
                key: prop.key.clone(),
                value: f(&prop.value),
            }),
            Inner::Optional(prop) => Inner::Optional(PropInner {
                key: prop.key.clone(),
                value: f(&prop.value),
            }),
            Inner::Index(index) => Inner::Index(IndexInner {
                signature: f(&index.signature),
                value: f(&index.value),
            }),
            Inner::Sequence(sequence) => Inner::Sequence(SequenceInner {
                element: f(&sequence.element),
            }),
            Inner::Intersection(inner) => Inner::Intersection(IntersectionInner {
                basis: inner.basis.as_ref().map(&f),
                divisor: inner.divisor.as_ref().map(&f),
                min: inner.min.as_ref().map(&f),
                max: inner.max.as_ref().map(&f),
                min_length: inner.min_length.as_ref().map(&f),
                max_length: inner.max_length.as_ref().map(&f),
                exact_length: inner.exact_length.as_ref().map(&f),
                pattern: inner.pattern.iter().map(&f).collect(),
                predicate: inner.predicate.iter().map(&f).collect(),
                required: inner.required.iter().map(&f).collect(),
                optional: inner.optional.iter().map(&f).collect(),
                index: inner.index.iter().map(&f).collect(),
                sequence: inner.sequence.as_ref().map(&f),
            }),
            Inner::Union(inner) => Inner::Union(UnionInner {
                branches: inner.branches.iter().map(&f).collect(),
            }),
            Inner::Morph(inner) => Inner::Morph(MorphInner {
                in_node: f(&inner.in_node),
                out_node: inner.out_node.as_ref().map(&f),
                morphs: inner.morphs.clone(),
            }),
        }
    }

    /// Default completion for "must be _____", used when the schema does
    /// not carry a description of its own.
    pub fn default_description(&self) -> std::string::String {
        match self {
            Inner::Domain(d) => d.domain.description().to_string(),
            Inner::Unit(u) => u.unit.to_string(),
            Inner::Proto(p) => p.proto.description().to_string(),
            Inner::Divisor(d) => {
                if d.divisor == 1 {
                    "an integer".to_string()
                } else {
                    format!("a multiple of {}", d.divisor)
                }
            }
            Inner::Min(b) => {
                if b.exclusive {
                    format!("more than {}", b.limit)
                } else {
                    format!("at least {}", b.limit)
                }
            }
            Inner::Max(b) => {
                if b.exclusive {
                    format!("less than {}", b.limit)
                } else {
                    format!("at most {}", b.limit)
                }
            }
            Inner::MinLength(l) => format!("at least length {}", l.limit),
            Inner::MaxLength(l) => format!("at most length {}", l.limit),
            Inner::ExactLength(l) => format!("exactly length {}", l.limit),
            Inner::Pattern(p) => format!("matched by {}", p.source),
            Inner::Predicate(_) => "valid according to an anonymous predicate".to_string(),
            Inner::Required(prop) => format!("{}: {}", prop.key, prop.value.description()),
            Inner::Optional(prop) => format!("{}?: {}", prop.key, prop.value.description()),
            Inner::Index(index) => format!(
                "[{}]: {}",
                index.signature.description(),
                index.value.description()
            ),
            Inner::Sequence(sequence) => format!("{}[]", sequence.element.description()),
            Inner::Intersection(inner) => {
                let constraints = inner.constraints();
                if constraints.is_empty() {
                    "a value".to_string()
                } else {
                    constraints
                        .iter()
                        .map(|c| c.description())
                        .collect::<Vec<_>>()
                        .join(" and ")
                }
            }
            Inner::Union(inner) => {
                if inner.branches.is_empty() {
                    "never".to_string()
                } else {
                    inner
                        .branches
                        .iter()
                        .map(|b| b.description())
                        .collect::<Vec<_>>()
                        .join(" or ")
                }
            }
            Inner::Morph(inner) => match &inner.out_node {
                Some(out) => format!(
                    "a morph from {} to {}",
                    inner.in_node.description(),
                    out.description()
                ),
                None => format!("a morph from {}", inner.in_node.description()),
            },
        }
    }
}
