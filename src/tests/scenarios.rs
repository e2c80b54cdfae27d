// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end flows: parse, intersect, compile, traverse.

#![allow(clippy::unwrap_used, clippy::panic)]

use super::v;
use crate::{DiagnosticCode, DisjointKind, NodeKind, Scope};
use serde_json::json;

#[test]
fn test_divisor_refinement_chain() {
    let scope = Scope::new();
    let number = scope.parse_node(NodeKind::Domain, v(json!("number"))).unwrap();
    let div3 = scope.parse_node(NodeKind::Divisor, v(json!(3))).unwrap();
    let div5 = scope.parse_node(NodeKind::Divisor, v(json!(5))).unwrap();

    let refined = number.intersect(&div3).unwrap();
    assert_eq!(refined.kind(), NodeKind::Intersection);

    let refined = refined.intersect(&div5).unwrap();
    assert_eq!(
        refined.to_json(),
        &v(json!({ "domain": "number", "divisor": 15 }))
    );
    assert!(refined.allows(&v(json!(30))));
    assert!(!refined.allows(&v(json!(10))));
}

#[test]
fn test_conflicting_required_key_types_surface_a_disjoint() {
    let scope = Scope::new();
    let id_string = scope
        .parse_type(v(json!({
            "domain": "object",
            "required": [{ "key": "id", "value": "string" }]
        })))
        .unwrap();
    let id_number = scope
        .parse_type(v(json!({
            "domain": "object",
            "required": [{ "key": "id", "value": "number" }]
        })))
        .unwrap();
    let disjoint = id_string.intersect(&id_number).unwrap_err();
    assert_eq!(disjoint.kind(), DisjointKind::Domain);
}

#[test]
fn test_exclusive_bound_diagnostics() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({
            "domain": "number",
            "min": { "limit": 5, "exclusive": true },
            "max": { "limit": 10 }
        })))
        .unwrap();

    let errors = node.apply(&v(json!(4))).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), DiagnosticCode::Min);
    assert_eq!(errors[0].expected(), "more than 5");
    assert_eq!(errors[0].to_string(), "must be more than 5 (was 4)");

    assert!(node.apply(&v(json!(8))).is_ok());
    // the bounds are exclusive below and inclusive above
    assert!(!node.allows(&v(json!(5))));
    assert!(node.allows(&v(json!(10))));
    assert!(!node.allows(&v(json!(11))));
}

#[test]
fn test_pattern_and_min_length_on_one_basis() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({
            "domain": "string",
            "pattern": ["^[a-z]+$"],
            "minLength": 5
        })))
        .unwrap();

    // allows rejects a string failing either check
    assert!(node.allows(&v(json!("abcdef"))));
    assert!(!node.allows(&v(json!("abc"))));
    assert!(!node.allows(&v(json!("ABCDEF"))));

    // apply reports both failing constraints independently, in the
    // canonical constraint order (bounds before patterns)
    let errors = node.apply(&v(json!("AB!"))).unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].code(), DiagnosticCode::MinLength);
    assert_eq!(errors[1].code(), DiagnosticCode::Pattern);
}
