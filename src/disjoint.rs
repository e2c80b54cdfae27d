// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use std::rc::Rc;

use crate::error::SchemaError;
use crate::node::Node;
use crate::value::Value;

/// The kind of conflict that proves an intersection empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisjointKind {
    /// The operands assert different fundamental domains.
    Domain,
    /// The operands assert different exact values.
    Unit,
    /// The operands assert different object kinds.
    Proto,
    /// Numeric or length bounds exclude each other.
    Range,
    /// A unit value fails the other operand's constraints.
    Assignability,
    /// Exactly one operand is the empty union.
    Presence,
    /// A union cross-product produced no branches.
    Union,
    /// The operands carry different morph pipelines.
    Morph,
}

impl DisjointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisjointKind::Domain => "domain",
            DisjointKind::Unit => "unit",
            DisjointKind::Proto => "proto",
            DisjointKind::Range => "range",
            DisjointKind::Assignability => "assignability",
            DisjointKind::Presence => "presence",
            DisjointKind::Union => "union",
            DisjointKind::Morph => "morph",
        }
    }
}

/// One side of a disjoint pair.
#[derive(Debug, Clone)]
pub enum DisjointOperand {
    Node(Node),
    Value(Value),
    /// Used by presence conflicts: whether this side was inhabited.
    Presence(bool),
}

impl fmt::Display for DisjointOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisjointOperand::Node(node) => f.write_str(&node.description()),
            DisjointOperand::Value(value) => write!(f, "{value}"),
            DisjointOperand::Presence(present) => {
                f.write_str(if *present { "present" } else { "never" })
            }
        }
    }
}

/// A proof that two nodes have an empty intersection.
///
/// Not an error in the exception sense: `Disjoint` is a first-class value
/// propagated through the intersection engine, and only converted to a
/// thrown failure at boundaries that cannot express it (see [`Disjoint::throw`]).
#[derive(Debug, Clone)]
pub struct Disjoint {
    kind: DisjointKind,
    l: DisjointOperand,
    r: DisjointOperand,
}

impl Disjoint {
    pub(crate) fn new(kind: DisjointKind, l: DisjointOperand, r: DisjointOperand) -> Self {
        Disjoint { kind, l, r }
    }

    pub(crate) fn from_nodes(kind: DisjointKind, l: &Node, r: &Node) -> Self {
        Disjoint::new(
            kind,
            DisjointOperand::Node(l.clone()),
            DisjointOperand::Node(r.clone()),
        )
    }

    pub fn kind(&self) -> DisjointKind {
        self.kind
    }

    pub fn left(&self) -> &DisjointOperand {
        &self.l
    }

    pub fn right(&self) -> &DisjointOperand {
        &self.r
    }

    /// Swap the operands. A cached result computed as `(a, b)` serves the
    /// query `(b, a)` once inverted.
    pub fn invert(&self) -> Disjoint {
        Disjoint {
            kind: self.kind,
            l: self.r.clone(),
            r: self.l.clone(),
        }
    }

    /// Convert the proof into a parse-time failure, for contexts (such as
    /// an eager `and`) with no way to represent partial failure.
    pub fn throw(&self) -> SchemaError {
        SchemaError::Unsatisfiable {
            l: Rc::from(self.l.to_string()),
            r: Rc::from(self.r.to_string()),
        }
    }
}

impl fmt::Display for Disjoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "intersection of {} and {} results in an unsatisfiable type",
            self.l, self.r
        )
    }
}
