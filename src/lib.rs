// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

#[macro_use]
mod error;

mod compile;
mod disjoint;
mod intersect;
mod kinds;
mod node;
mod nodes;
mod number;
mod parse;
mod scope;
mod traverse;
mod value;

pub use compile::{CompiledNode, Compiler};
pub use disjoint::{Disjoint, DisjointKind};
pub use error::SchemaError;
pub use kinds::NodeKind;
pub use node::Node;
pub use number::Number;
pub use scope::{ParseOptions, Scope};
pub use traverse::{Diagnostic, DiagnosticCode, TraversalContext};
pub use value::{Domain, ObjectKind, Value};

#[cfg(test)]
mod tests;
