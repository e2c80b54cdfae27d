// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;

/// The closed enumeration of node kinds.
///
/// Declaration order is intersection precedence: when two nodes of
/// different kinds are intersected, the kind declared first becomes the
/// canonical left operand. Set kinds come first so that composite
/// structure is decomposed before constraint-level rules run, then basis
/// kinds, then refinements, then props.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeKind {
    // set kinds
    Union,
    Morph,
    Intersection,

    // basis kinds
    Unit,
    Proto,
    Domain,

    // closed refinement kinds
    Divisor,
    Min,
    Max,
    MinLength,
    MaxLength,
    ExactLength,

    // open refinement kinds
    Pattern,
    Predicate,

    // prop kinds
    Required,
    Optional,
    Index,
    Sequence,
}

pub(crate) const PROP_KINDS: [NodeKind; 4] = [
    NodeKind::Required,
    NodeKind::Optional,
    NodeKind::Index,
    NodeKind::Sequence,
];

pub(crate) const CONSTRAINT_KINDS: [NodeKind; 15] = [
    NodeKind::Unit,
    NodeKind::Proto,
    NodeKind::Domain,
    NodeKind::Divisor,
    NodeKind::Min,
    NodeKind::Max,
    NodeKind::MinLength,
    NodeKind::MaxLength,
    NodeKind::ExactLength,
    NodeKind::Pattern,
    NodeKind::Predicate,
    NodeKind::Required,
    NodeKind::Optional,
    NodeKind::Index,
    NodeKind::Sequence,
];

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Union => "union",
            NodeKind::Morph => "morph",
            NodeKind::Intersection => "intersection",
            NodeKind::Unit => "unit",
            NodeKind::Proto => "proto",
            NodeKind::Domain => "domain",
            NodeKind::Divisor => "divisor",
            NodeKind::Min => "min",
            NodeKind::Max => "max",
            NodeKind::MinLength => "minLength",
            NodeKind::MaxLength => "maxLength",
            NodeKind::ExactLength => "exactLength",
            NodeKind::Pattern => "pattern",
            NodeKind::Predicate => "predicate",
            NodeKind::Required => "required",
            NodeKind::Optional => "optional",
            NodeKind::Index => "index",
            NodeKind::Sequence => "sequence",
        }
    }

    pub fn from_str(s: &str) -> Option<NodeKind> {
        Some(match s {
            "union" => NodeKind::Union,
            "morph" => NodeKind::Morph,
            "intersection" => NodeKind::Intersection,
            "unit" => NodeKind::Unit,
            "proto" => NodeKind::Proto,
            "domain" => NodeKind::Domain,
            "divisor" => NodeKind::Divisor,
            "min" => NodeKind::Min,
            "max" => NodeKind::Max,
            "minLength" => NodeKind::MinLength,
            "maxLength" => NodeKind::MaxLength,
            "exactLength" => NodeKind::ExactLength,
            "pattern" => NodeKind::Pattern,
            "predicate" => NodeKind::Predicate,
            "required" => NodeKind::Required,
            "optional" => NodeKind::Optional,
            "index" => NodeKind::Index,
            "sequence" => NodeKind::Sequence,
            _ => return None,
        })
    }

    /// Composite kinds whose children are themselves full types.
    pub fn is_set(&self) -> bool {
        matches!(
            self,
            NodeKind::Union | NodeKind::Morph | NodeKind::Intersection
        )
    }

    /// Kinds asserting the fundamental shape of accepted values. At most
    /// one basis may exist per intersection.
    pub fn is_basis(&self) -> bool {
        matches!(self, NodeKind::Unit | NodeKind::Proto | NodeKind::Domain)
    }

    pub fn is_refinement(&self) -> bool {
        matches!(
            self,
            NodeKind::Divisor
                | NodeKind::Min
                | NodeKind::Max
                | NodeKind::MinLength
                | NodeKind::MaxLength
                | NodeKind::ExactLength
                | NodeKind::Pattern
                | NodeKind::Predicate
        )
    }

    /// Structural kinds describing object/array shape.
    pub fn is_prop(&self) -> bool {
        PROP_KINDS.contains(self)
    }

    pub fn is_constraint(&self) -> bool {
        CONSTRAINT_KINDS.contains(self)
    }

    /// Whether multiple constraints of this kind may coexist within one
    /// intersection (the "open" group).
    pub fn has_open_intersection(&self) -> bool {
        matches!(
            self,
            NodeKind::Pattern
                | NodeKind::Predicate
                | NodeKind::Required
                | NodeKind::Optional
                | NodeKind::Index
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
