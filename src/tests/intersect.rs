// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::unwrap_used, clippy::panic)]

use super::v;
use crate::{DisjointKind, NodeKind, Scope, SchemaError};
use serde_json::json;

#[test]
fn test_self_intersection_is_identity() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({ "domain": "number", "divisor": 3 })))
        .unwrap();
    let result = node.intersect(&node).unwrap();
    assert!(result.ptr_eq(&node));
}

#[test]
fn test_intersection_is_commutative() {
    let scope = Scope::new();
    let number = scope.parse_type(v(json!("number"))).unwrap();
    let divisor = scope.parse_node(NodeKind::Divisor, v(json!(3))).unwrap();
    let forward = number.intersect(&divisor).unwrap();
    let backward = divisor.intersect(&number).unwrap();
    assert!(forward.ptr_eq(&backward));
}

#[test]
fn test_domain_disjoint_in_both_orders() {
    let scope = Scope::new();
    let string = scope.parse_type(v(json!("string"))).unwrap();
    let number = scope.parse_type(v(json!("number"))).unwrap();

    let forward = string.intersect(&number).unwrap_err();
    assert_eq!(forward.kind(), DisjointKind::Domain);

    let backward = number.intersect(&string).unwrap_err();
    assert_eq!(backward.kind(), DisjointKind::Domain);
}

#[test]
fn test_divisor_fold_is_lcm() {
    let scope = Scope::new();
    let number = scope.parse_type(v(json!("number"))).unwrap();
    let div4 = scope.parse_node(NodeKind::Divisor, v(json!(4))).unwrap();
    let div6 = scope.parse_node(NodeKind::Divisor, v(json!(6))).unwrap();
    let refined = number.intersect(&div4).unwrap().intersect(&div6).unwrap();
    assert_eq!(
        refined.to_json(),
        &v(json!({ "domain": "number", "divisor": 12 }))
    );
}

#[test]
fn test_bound_fold_prefers_stricter() {
    let scope = Scope::new();
    let inclusive = scope
        .parse_type(v(json!({ "domain": "number", "min": { "limit": 5 } })))
        .unwrap();
    let exclusive = scope
        .parse_type(v(json!({ "domain": "number", "min": { "limit": 5, "exclusive": true } })))
        .unwrap();
    let folded = inclusive.intersect(&exclusive).unwrap();
    assert_eq!(
        folded.to_json(),
        &v(json!({ "domain": "number", "min": { "limit": 5, "exclusive": true } }))
    );
    assert!(folded.ptr_eq(&exclusive));
}

#[test]
fn test_incompatible_bounds_are_disjoint() {
    let scope = Scope::new();
    let low = scope
        .parse_type(v(json!({ "domain": "number", "max": 5 })))
        .unwrap();
    let high = scope
        .parse_type(v(json!({ "domain": "number", "min": 10 })))
        .unwrap();
    let disjoint = low.intersect(&high).unwrap_err();
    assert_eq!(disjoint.kind(), DisjointKind::Range);
}

#[test]
fn test_unit_assignability() {
    let scope = Scope::new();
    let unit = scope.parse_type(v(json!({ "unit": "foo" }))).unwrap();
    let string = scope.parse_type(v(json!("string"))).unwrap();
    let number = scope.parse_type(v(json!("number"))).unwrap();

    let narrowed = unit.intersect(&string).unwrap();
    assert!(narrowed.ptr_eq(&unit));

    let disjoint = unit.intersect(&number).unwrap_err();
    assert_eq!(disjoint.kind(), DisjointKind::Assignability);

    let other_unit = scope.parse_type(v(json!({ "unit": "bar" }))).unwrap();
    assert_eq!(
        unit.intersect(&other_unit).unwrap_err().kind(),
        DisjointKind::Unit
    );
}

#[test]
fn test_proto_refines_object_domain() {
    let scope = Scope::new();
    let array = scope.parse_type(v(json!("Array"))).unwrap();
    let object_domain = scope.parse_type(v(json!("object"))).unwrap();
    let string = scope.parse_type(v(json!("string"))).unwrap();
    let plain_object = scope.parse_type(v(json!("Object"))).unwrap();

    assert!(array.intersect(&object_domain).unwrap().ptr_eq(&array));
    assert_eq!(
        array.intersect(&string).unwrap_err().kind(),
        DisjointKind::Domain
    );
    assert_eq!(
        array.intersect(&plain_object).unwrap_err().kind(),
        DisjointKind::Proto
    );
}

#[test]
fn test_required_keys_fold_by_key() {
    let scope = Scope::new();
    let with_min = scope
        .parse_type(v(json!({
            "domain": "object",
            "required": [{ "key": "age", "value": { "domain": "number", "min": 0 } }]
        })))
        .unwrap();
    let with_max = scope
        .parse_type(v(json!({
            "domain": "object",
            "required": [{ "key": "age", "value": { "domain": "number", "max": 120 } }]
        })))
        .unwrap();
    let folded = with_min.intersect(&with_max).unwrap();
    assert_eq!(
        folded.to_json(),
        &v(json!({
            "domain": "object",
            "required": [{
                "key": "age",
                "value": { "domain": "number", "max": 120, "min": 0 }
            }]
        }))
    );
}

#[test]
fn test_conflicting_required_values_are_disjoint() {
    let scope = Scope::new();
    let as_string = scope
        .parse_type(v(json!({
            "domain": "object",
            "required": [{ "key": "id", "value": "string" }]
        })))
        .unwrap();
    let as_number = scope
        .parse_type(v(json!({
            "domain": "object",
            "required": [{ "key": "id", "value": "number" }]
        })))
        .unwrap();
    let disjoint = as_string.intersect(&as_number).unwrap_err();
    assert_eq!(disjoint.kind(), DisjointKind::Domain);
}

#[test]
fn test_conflicting_optional_values_collapse_to_never() {
    let scope = Scope::new();
    let as_string = scope
        .parse_type(v(json!({
            "domain": "object",
            "optional": [{ "key": "extra", "value": "string" }]
        })))
        .unwrap();
    let as_number = scope
        .parse_type(v(json!({
            "domain": "object",
            "optional": [{ "key": "extra", "value": "number" }]
        })))
        .unwrap();
    let folded = as_string.intersect(&as_number).unwrap();
    assert_eq!(
        folded.to_json(),
        &v(json!({
            "domain": "object",
            "optional": [{ "key": "extra", "value": [] }]
        }))
    );
    // the key may be absent, but may never be present
    assert!(folded.allows(&v(json!({}))));
    assert!(!folded.allows(&v(json!({ "extra": "anything" }))));
}

#[test]
fn test_required_and_optional_on_one_key_merge() {
    let scope = Scope::new();
    let required = scope
        .parse_type(v(json!({
            "domain": "object",
            "required": [{ "key": "id", "value": { "domain": "number", "min": 1 } }]
        })))
        .unwrap();
    let optional = scope
        .parse_type(v(json!({
            "domain": "object",
            "optional": [{ "key": "id", "value": { "domain": "number", "divisor": 2 } }]
        })))
        .unwrap();
    let folded = required.intersect(&optional).unwrap();
    // presence stays required, both value constraints apply
    assert!(!folded.allows(&v(json!({}))));
    assert!(!folded.allows(&v(json!({ "id": 3 }))));
    assert!(folded.allows(&v(json!({ "id": 4 }))));
}

#[test]
fn test_length_bounds_fold_to_exact_length() {
    let scope = Scope::new();
    let min = scope
        .parse_type(v(json!({ "domain": "string", "minLength": 6 })))
        .unwrap();
    let max = scope
        .parse_type(v(json!({ "domain": "string", "maxLength": 6 })))
        .unwrap();
    let folded = min.intersect(&max).unwrap();
    assert_eq!(
        folded.to_json(),
        &v(json!({ "domain": "string", "exactLength": 6 }))
    );
}

#[test]
fn test_union_intersection_cross_product() {
    let scope = Scope::new();
    let union = scope.parse_type(v(json!(["number", "string"]))).unwrap();
    let number = scope.parse_type(v(json!("number"))).unwrap();

    // number is a subtype of one branch: the cross product reduces to it
    let narrowed = union.intersect(&number).unwrap();
    assert!(narrowed.ptr_eq(&number));

    // overlapping unions keep each distinct region
    let other = scope.parse_type(v(json!(["string", "null"]))).unwrap();
    let overlap = union.intersect(&other).unwrap();
    assert_eq!(overlap.kind(), NodeKind::Domain);
    assert_eq!(overlap.to_json(), &v(json!({ "domain": "string" })));
}

#[test]
fn test_disjoint_unions() {
    let scope = Scope::new();
    let numeric = scope.parse_type(v(json!(["number"]))).unwrap();
    let textual = scope.parse_type(v(json!(["string", "null"]))).unwrap();
    // singleton unions reduce, so build one that stays a union
    assert_eq!(textual.kind(), NodeKind::Union);
    let disjoint = numeric.intersect(&textual).unwrap_err();
    assert_eq!(disjoint.kind(), DisjointKind::Union);

    let never = scope.never();
    let presence = textual.intersect(&never).unwrap_err();
    assert_eq!(presence.kind(), DisjointKind::Presence);
}

#[test]
fn test_union_with_no_common_region() {
    let scope = Scope::new();
    let low = scope
        .parse_type(v(json!([
            { "domain": "number", "max": 0 },
            { "domain": "string", "maxLength": 1 }
        ])))
        .unwrap();
    let high = scope
        .parse_type(v(json!([
            { "domain": "number", "min": 10 },
            { "domain": "string", "minLength": 5 }
        ])))
        .unwrap();
    // every branch pair is range-disjoint
    let disjoint = low.intersect(&high).unwrap_err();
    assert_eq!(disjoint.kind(), DisjointKind::Union);
}

#[test]
fn test_morph_intersections() {
    let scope = Scope::new();
    let token = scope.register_morph(|value| value.clone());
    let token = match &token {
        crate::Value::String(s) => s.to_string(),
        _ => panic!("Expected a registry token"),
    };
    let narrow = scope
        .parse_type(v(json!({
            "in": { "domain": "string", "minLength": 2 },
            "morph": token
        })))
        .unwrap();
    let wide = scope
        .parse_type(v(json!({ "in": "string", "morph": token })))
        .unwrap();
    let merged = narrow.intersect(&wide).unwrap();
    assert_eq!(merged.kind(), NodeKind::Morph);
    assert!(merged
        .extract_in()
        .equals(&narrow.extract_in()));

    let other_token = match scope.register_morph(|value| value.clone()) {
        crate::Value::String(s) => s.to_string(),
        _ => panic!("Expected a registry token"),
    };
    let different = scope
        .parse_type(v(json!({ "in": "string", "morph": other_token })))
        .unwrap();
    assert_eq!(
        narrow.intersect(&different).unwrap_err().kind(),
        DisjointKind::Morph
    );

    // a morph narrows through a plain constraint on its input
    let bounded = scope
        .parse_type(v(json!({ "domain": "string", "maxLength": 10 })))
        .unwrap();
    let constrained = narrow.intersect(&bounded).unwrap();
    assert_eq!(constrained.kind(), NodeKind::Morph);
    assert!(constrained.allows(&v(json!("ok"))));
    assert!(!constrained.allows(&v(json!("x"))));
}

#[test]
fn test_and_throws_disjoint() {
    let scope = Scope::new();
    let string = scope.parse_type(v(json!("string"))).unwrap();
    let number = scope.parse_type(v(json!("number"))).unwrap();
    assert!(matches!(
        string.and(&number),
        Err(SchemaError::Unsatisfiable { .. })
    ));
    let both = string
        .and(&scope.parse_type(v(json!({ "domain": "string", "minLength": 1 }))).unwrap())
        .unwrap();
    assert_eq!(both.kind(), NodeKind::Intersection);
}

#[test]
fn test_or_builds_unions() {
    let scope = Scope::new();
    let number = scope.parse_type(v(json!("number"))).unwrap();
    let string = scope.parse_type(v(json!("string"))).unwrap();
    let either = number.or(&string).unwrap();
    assert_eq!(either.kind(), NodeKind::Union);
    assert!(either.allows(&v(json!(1))));
    assert!(either.allows(&v(json!("x"))));
    assert!(!either.allows(&v(json!(null))));
}

#[test]
fn test_extends() {
    let scope = Scope::new();
    let number = scope.parse_type(v(json!("number"))).unwrap();
    let even = scope
        .parse_type(v(json!({ "domain": "number", "divisor": 2 })))
        .unwrap();
    let string = scope.parse_type(v(json!("string"))).unwrap();

    assert!(even.extends(&number));
    assert!(!number.extends(&even));
    assert!(!even.extends(&string));
    assert!(even.extends(&scope.unknown()));
}

#[test]
fn test_never_and_unknown() {
    let scope = Scope::new();
    let never = scope.never();
    let unknown = scope.unknown();
    assert!(never.is_never());
    assert!(unknown.is_unknown());
    assert!(!never.allows(&v(json!(1))));
    assert!(unknown.allows(&v(json!(1))));
    assert!(unknown.allows(&v(json!({ "any": ["thing"] }))));
}
