// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::unwrap_used, clippy::panic)]

use super::v;
use crate::{Compiler, DiagnosticCode, Scope, TraversalContext, Value};
use serde_json::json;

#[test]
fn test_allows_primitive_constraints() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({ "domain": "number", "divisor": 3, "min": 0 })))
        .unwrap();
    assert!(node.allows(&v(json!(9))));
    assert!(node.allows(&v(json!(0))));
    assert!(!node.allows(&v(json!(-3))));
    assert!(!node.allows(&v(json!(7))));
    assert!(!node.allows(&v(json!("9"))));
}

#[test]
fn test_apply_reports_only_failing_constraints() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({ "domain": "number", "divisor": 3, "min": 0 })))
        .unwrap();

    let errors = node.apply(&v(json!(-2))).unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].code(), DiagnosticCode::Divisor);
    assert_eq!(errors[1].code(), DiagnosticCode::Min);

    let out = node.apply(&v(json!(9))).unwrap();
    assert_eq!(out, v(json!(9)));
}

#[test]
fn test_failed_basis_short_circuits_refinements() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({ "domain": "number", "divisor": 3 })))
        .unwrap();
    let errors = node.apply(&v(json!("nope"))).unwrap_err();
    // the divisor diagnostic would be noise once the domain failed
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), DiagnosticCode::Domain);
    assert_eq!(errors[0].to_string(), "must be a number (was \"nope\")");
}

#[test]
fn test_nested_paths_in_diagnostics() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({
            "domain": "object",
            "required": [{
                "key": "items",
                "value": { "domain": "object", "sequence": { "domain": "number", "min": 0 } }
            }]
        })))
        .unwrap();

    let errors = node
        .apply(&v(json!({ "items": [1, -2, 3, "x"] })))
        .unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].path(), "items[1]");
    assert_eq!(errors[0].code(), DiagnosticCode::Min);
    assert_eq!(errors[1].path(), "items[3]");
    assert_eq!(errors[1].code(), DiagnosticCode::Domain);
}

#[test]
fn test_missing_required_key() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({
            "domain": "object",
            "required": [{ "key": "name", "value": "string" }]
        })))
        .unwrap();
    let errors = node.apply(&v(json!({}))).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), DiagnosticCode::Required);
    assert_eq!(errors[0].path(), "name");
    assert_eq!(errors[0].to_string(), "name must be provided");
}

#[test]
fn test_optional_keys_only_checked_when_present() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({
            "domain": "object",
            "optional": [{ "key": "nickname", "value": "string" }]
        })))
        .unwrap();
    assert!(node.allows(&v(json!({}))));
    assert!(node.allows(&v(json!({ "nickname": "zed" }))));
    assert!(!node.allows(&v(json!({ "nickname": 42 }))));
}

#[test]
fn test_index_signatures() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({
            "domain": "object",
            "index": [{
                "signature": { "domain": "string", "pattern": ["^x_"] },
                "value": "number"
            }]
        })))
        .unwrap();
    assert!(node.allows(&v(json!({ "x_count": 3, "label": "free" }))));
    assert!(!node.allows(&v(json!({ "x_count": "three" }))));

    let errors = node.apply(&v(json!({ "x_count": "three" }))).unwrap_err();
    assert_eq!(errors[0].path(), "x_count");
    assert_eq!(errors[0].code(), DiagnosticCode::Domain);
}

#[test]
fn test_registered_predicates() {
    let scope = Scope::new();
    let token = scope.register_predicate(|value| {
        matches!(value, Value::Number(n) if n.as_u64().is_some_and(|u| u % 2 == 0))
    });
    let token = match &token {
        Value::String(s) => s.to_string(),
        _ => panic!("Expected a registry token"),
    };
    let node = scope
        .parse_type(v(json!({ "domain": "number", "predicate": [token] })))
        .unwrap();
    assert!(node.allows(&v(json!(4))));
    assert!(!node.allows(&v(json!(3))));

    let errors = node.apply(&v(json!(3))).unwrap_err();
    assert_eq!(errors[0].code(), DiagnosticCode::Predicate);
}

#[test]
fn test_contextual_predicates_receive_context() {
    let scope = Scope::new();
    let token = scope.register_contextual_predicate(|value, _ctx| !value.is_null());
    let token = match &token {
        Value::String(s) => s.to_string(),
        _ => panic!("Expected a registry token"),
    };
    let node = scope
        .parse_type(v(json!({ "domain": "object", "predicate": [token] })))
        .unwrap();
    assert!(node.allows(&v(json!({}))));
}

#[test]
fn test_union_apply_reports_one_diagnostic() {
    let scope = Scope::new();
    let node = scope.parse_type(v(json!(["number", "string"]))).unwrap();
    let errors = node.apply(&v(json!(true))).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), DiagnosticCode::Union);
    assert_eq!(
        errors[0].to_string(),
        "must be a number or a string (was true)"
    );
}

#[test]
fn test_discriminated_union_reports_branch_detail() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!([
            { "domain": "number", "divisor": 2 },
            { "domain": "string", "minLength": 2 }
        ])))
        .unwrap();
    // the domain switch selects the number branch, whose refinement
    // diagnostics surface directly
    let errors = node.apply(&v(json!(3))).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), DiagnosticCode::Divisor);

    let errors = node.apply(&v(json!(null))).unwrap_err();
    assert_eq!(errors[0].code(), DiagnosticCode::Union);
}

#[test]
fn test_unit_discriminated_union() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!([{ "unit": "on" }, { "unit": "off" }])))
        .unwrap();
    assert!(node.allows(&v(json!("on"))));
    assert!(node.allows(&v(json!("off"))));
    assert!(!node.allows(&v(json!("standby"))));
}

#[test]
fn test_discriminant_elision_is_semantics_preserving() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!([
            { "domain": "number", "divisor": 2 },
            { "domain": "string", "minLength": 2 },
            { "domain": "object", "required": [{ "key": "tag", "value": "string" }] }
        ])))
        .unwrap();
    let optimized = Compiler::new(&scope).compile(&node);
    let unoptimized = Compiler::new(&scope)
        .without_discriminant_elision()
        .compile(&node);

    let samples = [
        v(json!(4)),
        v(json!(3)),
        v(json!("ab")),
        v(json!("a")),
        v(json!({ "tag": "x" })),
        v(json!({ "tag": 1 })),
        v(json!({})),
        v(json!(null)),
        v(json!([1, 2])),
        v(json!(true)),
    ];
    for sample in &samples {
        let mut ctx = TraversalContext::new();
        let fast = optimized.allows(sample, &mut ctx);
        let mut ctx = TraversalContext::new();
        let slow = unoptimized.allows(sample, &mut ctx);
        assert_eq!(fast, slow, "allows diverged on {sample}");

        let mut fast_ctx = TraversalContext::new();
        optimized.apply(sample, &mut fast_ctx);
        let mut slow_ctx = TraversalContext::new();
        unoptimized.apply(sample, &mut slow_ctx);
        assert_eq!(
            fast_ctx.errors().is_empty(),
            slow_ctx.errors().is_empty(),
            "apply acceptance diverged on {sample}"
        );
        assert_eq!(fast, fast_ctx.errors().is_empty());
    }
}

#[test]
fn test_morph_apply_validates_input() {
    let scope = Scope::new();
    let token = match scope.register_morph(|value| value.clone()) {
        Value::String(s) => s.to_string(),
        _ => panic!("Expected a registry token"),
    };
    let node = scope
        .parse_type(v(json!({
            "in": { "domain": "string", "minLength": 1 },
            "out": "string",
            "morph": token
        })))
        .unwrap();
    assert!(node.includes_morph());
    assert!(node.allows(&v(json!("x"))));
    assert!(!node.allows(&v(json!(""))));

    let out = node.apply(&v(json!("x"))).unwrap();
    assert_eq!(out, v(json!("x")));
}

#[test]
fn test_io_projections() {
    let scope = Scope::new();
    let token = match scope.register_morph(|value| value.clone()) {
        Value::String(s) => s.to_string(),
        _ => panic!("Expected a registry token"),
    };
    let parsed_string = scope.parse_type(v(json!("string"))).unwrap();
    let parsed_number = scope.parse_type(v(json!("number"))).unwrap();

    let morph = scope
        .parse_type(v(json!({ "in": "string", "out": "number", "morph": token })))
        .unwrap();
    assert!(morph.extract_in().ptr_eq(&parsed_string));
    assert!(morph.extract_out().ptr_eq(&parsed_number));

    // projections are identity for morph-free nodes
    assert!(parsed_string.extract_in().ptr_eq(&parsed_string));
    assert!(parsed_string.extract_out().ptr_eq(&parsed_string));

    // and rebuild composites around each child's projection
    let object = scope
        .parse_type(v(json!({
            "domain": "object",
            "required": [{
                "key": "count",
                "value": { "in": "string", "out": "number", "morph": token }
            }]
        })))
        .unwrap();
    assert!(object.includes_morph());
    let in_projection = object.extract_in();
    let out_projection = object.extract_out();
    assert!(!in_projection.includes_morph());
    assert!(in_projection.allows(&v(json!({ "count": "5" }))));
    assert!(!in_projection.allows(&v(json!({ "count": 5 }))));
    assert!(out_projection.allows(&v(json!({ "count": 5 }))));
    assert!(!out_projection.allows(&v(json!({ "count": "5" }))));
}

#[test]
fn test_compiled_checks_are_cached() {
    let scope = Scope::new();
    let node = scope
        .parse_type(v(json!({ "domain": "number", "min": 1 })))
        .unwrap();
    assert!(node.allows(&v(json!(2))));
    assert!(node.allows(&v(json!(3))));
    assert_eq!(scope.data.compiled.borrow().len(), 1);
}
