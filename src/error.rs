// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::rc::Rc;

use thiserror::Error;

type String = Rc<str>;

/// Errors raised while parsing a raw schema into a node.
///
/// Schema construction is an author-time activity: these errors are never
/// recovered from, they are surfaced immediately to the caller.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// A key was supplied that the kind's schema does not recognize.
    #[error("key '{key}' is not valid on {kind} schema")]
    UnknownKey { kind: String, key: String },

    /// A required key was missing from the schema.
    #[error("{kind} schema requires key '{key}'")]
    MissingKey { kind: String, key: String },

    /// The raw value has no valid interpretation as a schema.
    #[error("{0} is not a valid type schema")]
    InvalidSchema(String),

    /// A schema value had the wrong shape for its key.
    #[error("invalid value for key '{key}' on {kind} schema: {reason}")]
    InvalidValue {
        kind: String,
        key: String,
        reason: String,
    },

    /// The parsed node's kind is not among the kinds allowed by the caller.
    #[error("schema of kind {kind} should be one of {allowed}")]
    KindNotAllowed { kind: String, allowed: String },

    /// A pattern schema's source failed to compile as a regex.
    #[error("invalid regex pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },

    /// A registry reference token did not resolve to the expected entry.
    #[error("'{reference}' does not name a registered {expected}")]
    InvalidRegistryRef {
        reference: String,
        expected: String,
    },

    /// An eager operation (e.g. `and`) encountered a provably empty
    /// intersection. Produced by [`crate::Disjoint::throw`].
    #[error("intersection of {l} and {r} results in an unsatisfiable type")]
    Unsatisfiable { l: String, r: String },
}

/// Fatal failure for states the engine asserts are unreachable.
///
/// Never raised for bad input: reaching one of these signals a bug in the
/// engine itself, so it aborts rather than propagating.
macro_rules! internal_error {
    ($($arg:tt)*) => {
        panic!("internal error: {}", format!($($arg)*))
    };
}
