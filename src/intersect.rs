// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The intersection engine.
//!
//! `intersect_nodes` computes the set-theoretic intersection of two
//! nodes: a reduced node, or a [`Disjoint`] proof of emptiness.
//! Intersection is commutative; results are memoized per scope under both
//! operand orders, with the Disjoint inverted for the swapped key so
//! left/right always line up with the caller's operands.

use std::collections::BTreeMap;

use crate::disjoint::{Disjoint, DisjointKind, DisjointOperand};
use crate::kinds::NodeKind;
use crate::node::Node;
use crate::nodes::{Inner, IntersectionInner, MorphInner, PropInner, SequenceInner, UnionInner};
use crate::parse;
use crate::scope::Scope;
use crate::value::{Domain, Value};

pub(crate) fn intersect_nodes(l: &Node, r: &Node) -> Result<Node, Disjoint> {
    if l.equals(r) {
        return Ok(l.clone());
    }
    let scope = l.scope();
    let cache_key = format!("{}&{}", l.type_id(), r.type_id());
    {
        let cache = scope.data.intersections.borrow();
        if let Some(cached) = cache.get(cache_key.as_str()) {
            return cached.clone();
        }
    }
    let result = intersect_uncached(&scope, l, r);
    let swapped_key = format!("{}&{}", r.type_id(), l.type_id());
    let swapped_result = match &result {
        Ok(node) => Ok(node.clone()),
        Err(disjoint) => Err(disjoint.invert()),
    };
    let mut cache = scope.data.intersections.borrow_mut();
    cache.insert(cache_key.into(), result.clone());
    cache.insert(swapped_key.into(), swapped_result);
    result
}

fn intersect_uncached(scope: &Scope, l: &Node, r: &Node) -> Result<Node, Disjoint> {
    // a canonical left operand guarantees symmetric results regardless of
    // call order
    let (a, b, swapped) = if r.kind() < l.kind() {
        (r, l, true)
    } else {
        (l, r, false)
    };
    let result = intersect_ordered(scope, a, b);
    match result {
        Err(disjoint) if swapped => Err(disjoint.invert()),
        other => other,
    }
}

fn intersect_ordered(scope: &Scope, a: &Node, b: &Node) -> Result<Node, Disjoint> {
    match (a.inner(), b.inner()) {
        (Inner::Union(_), _) | (_, Inner::Union(_)) => union_intersection(scope, a, b),

        (Inner::Morph(l), Inner::Morph(r)) => {
            if l.morphs != r.morphs {
                return Err(Disjoint::from_nodes(DisjointKind::Morph, a, b));
            }
            let in_node = intersect_nodes(&l.in_node, &r.in_node)?;
            let out_node = match (&l.out_node, &r.out_node) {
                (None, None) => None,
                (Some(out), None) | (None, Some(out)) => Some(out.clone()),
                (Some(l_out), Some(r_out)) => Some(intersect_nodes(l_out, r_out)?),
            };
            Ok(parse::rebuild(
                scope,
                Inner::Morph(MorphInner {
                    in_node,
                    out_node,
                    morphs: l.morphs.clone(),
                }),
            ))
        }
        (Inner::Morph(l), _) => {
            let in_node = intersect_nodes(&l.in_node, b)?;
            Ok(parse::rebuild(
                scope,
                Inner::Morph(MorphInner {
                    in_node,
                    out_node: l.out_node.clone(),
                    morphs: l.morphs.clone(),
                }),
            ))
        }

        (Inner::Intersection(l), _) => {
            let mut inner = l.clone();
            match b.inner() {
                Inner::Intersection(r) => {
                    for constraint in r.constraints() {
                        fold_into(&mut inner, &constraint)?;
                    }
                }
                _ => fold_into(&mut inner, b)?,
            }
            Ok(parse::rebuild(scope, Inner::Intersection(inner)))
        }

        // equal units were already handled by the identity check
        (Inner::Unit(_), Inner::Unit(_)) => Err(Disjoint::from_nodes(DisjointKind::Unit, a, b)),
        (Inner::Unit(l), _) => {
            if b.allows(&l.unit) {
                Ok(a.clone())
            } else {
                Err(Disjoint::new(
                    DisjointKind::Assignability,
                    DisjointOperand::Value(l.unit.clone()),
                    DisjointOperand::Node(b.clone()),
                ))
            }
        }

        (Inner::Proto(_), Inner::Proto(_)) => Err(Disjoint::from_nodes(DisjointKind::Proto, a, b)),
        (Inner::Proto(_), Inner::Domain(domain)) => {
            if domain.domain == Domain::Object {
                Ok(a.clone())
            } else {
                Err(Disjoint::from_nodes(DisjointKind::Domain, a, b))
            }
        }

        (Inner::Domain(_), Inner::Domain(_)) => {
            Err(Disjoint::from_nodes(DisjointKind::Domain, a, b))
        }

        (Inner::Divisor(l), Inner::Divisor(r)) => {
            let mut map = BTreeMap::new();
            map.insert(
                Value::from("divisor"),
                Value::from(lcm(l.divisor, r.divisor)),
            );
            match scope.parse_node(NodeKind::Divisor, Value::from(map)) {
                Ok(node) => Ok(node),
                Err(e) => internal_error!("reparse of divisor intersection failed: {e}"),
            }
        }

        (Inner::Min(l), Inner::Min(r)) => {
            // the stricter lower bound wins
            let l_stricter = l.limit > r.limit || (l.limit == r.limit && l.exclusive);
            Ok(if l_stricter { a.clone() } else { b.clone() })
        }
        (Inner::Max(l), Inner::Max(r)) => {
            let l_stricter = l.limit < r.limit || (l.limit == r.limit && l.exclusive);
            Ok(if l_stricter { a.clone() } else { b.clone() })
        }
        (Inner::Min(min), Inner::Max(max)) => {
            if min.limit > max.limit
                || (min.limit == max.limit && (min.exclusive || max.exclusive))
            {
                Err(Disjoint::from_nodes(DisjointKind::Range, a, b))
            } else {
                synthesize_intersection(scope, a, b)
            }
        }

        (Inner::MinLength(l), Inner::MinLength(r)) => {
            Ok(if l.limit >= r.limit { a.clone() } else { b.clone() })
        }
        (Inner::MaxLength(l), Inner::MaxLength(r)) => {
            Ok(if l.limit <= r.limit { a.clone() } else { b.clone() })
        }
        (Inner::MinLength(min), Inner::MaxLength(max)) => {
            if min.limit > max.limit {
                Err(Disjoint::from_nodes(DisjointKind::Range, a, b))
            } else {
                synthesize_intersection(scope, a, b)
            }
        }
        (Inner::MinLength(min), Inner::ExactLength(exact)) => {
            if exact.limit >= min.limit {
                Ok(b.clone())
            } else {
                Err(Disjoint::from_nodes(DisjointKind::Range, a, b))
            }
        }
        (Inner::MaxLength(max), Inner::ExactLength(exact)) => {
            if exact.limit <= max.limit {
                Ok(b.clone())
            } else {
                Err(Disjoint::from_nodes(DisjointKind::Range, a, b))
            }
        }
        (Inner::ExactLength(_), Inner::ExactLength(_)) => {
            Err(Disjoint::from_nodes(DisjointKind::Range, a, b))
        }

        (Inner::Required(l), Inner::Required(r)) if l.key == r.key => {
            let value = intersect_nodes(&l.value, &r.value)?;
            Ok(parse::rebuild(
                scope,
                Inner::Required(PropInner {
                    key: l.key.clone(),
                    value,
                }),
            ))
        }
        (Inner::Optional(l), Inner::Optional(r)) if l.key == r.key => {
            // an optional key may simply be absent, so a disjoint value
            // collapses to never rather than proving the whole
            // intersection empty
            let value = match intersect_nodes(&l.value, &r.value) {
                Ok(value) => value,
                Err(_) => scope.never(),
            };
            Ok(parse::rebuild(
                scope,
                Inner::Optional(PropInner {
                    key: l.key.clone(),
                    value,
                }),
            ))
        }
        (Inner::Index(l), Inner::Index(r)) if l.signature.equals(&r.signature) => {
            let value = match intersect_nodes(&l.value, &r.value) {
                Ok(value) => value,
                Err(_) => scope.never(),
            };
            Ok(parse::rebuild(
                scope,
                Inner::Index(crate::nodes::IndexInner {
                    signature: l.signature.clone(),
                    value,
                }),
            ))
        }
        (Inner::Sequence(l), Inner::Sequence(r)) => {
            let element = match intersect_nodes(&l.element, &r.element) {
                Ok(element) => element,
                Err(_) => scope.never(),
            };
            Ok(parse::rebuild(
                scope,
                Inner::Sequence(SequenceInner { element }),
            ))
        }

        // no closed rule: reconcile as co-members of one intersection
        _ => synthesize_intersection(scope, a, b),
    }
}

/// Ad-hoc intersection synthesis for constraint pairs with no closed
/// rule: a basis plus a refinement, two predicates, two required keys.
/// Anything involving a set kind reaching this point violates the
/// engine's invariants.
fn synthesize_intersection(scope: &Scope, a: &Node, b: &Node) -> Result<Node, Disjoint> {
    if a.kind().is_set() || b.kind().is_set() {
        internal_error!(
            "unexpected null intersection between {} and {}",
            a.kind(),
            b.kind()
        );
    }
    let mut inner = IntersectionInner::default();
    fold_into(&mut inner, a)?;
    fold_into(&mut inner, b)?;
    Ok(parse::rebuild(scope, Inner::Intersection(inner)))
}

/// The fundamental domain asserted by a basis node.
fn basis_domain(basis: &Node) -> Option<Domain> {
    match basis.inner() {
        Inner::Domain(inner) => Some(inner.domain),
        Inner::Proto(_) => Some(Domain::Object),
        Inner::Unit(inner) => inner.unit.domain(),
        _ => None,
    }
}

/// Whether a refinement or prop of `kind` can apply to data of the
/// basis's domain.
fn prerequisite_ok(kind: NodeKind, domain: Domain) -> bool {
    match kind {
        NodeKind::Divisor | NodeKind::Min | NodeKind::Max => domain == Domain::Number,
        NodeKind::MinLength | NodeKind::MaxLength | NodeKind::ExactLength => {
            matches!(domain, Domain::String | Domain::Object)
        }
        NodeKind::Pattern => domain == Domain::String,
        NodeKind::Predicate => true,
        NodeKind::Required | NodeKind::Optional | NodeKind::Index | NodeKind::Sequence => {
            domain == Domain::Object
        }
        _ => true,
    }
}

fn check_prerequisite(basis: &Node, constraint: &Node) -> Result<(), Disjoint> {
    let domain = match basis_domain(basis) {
        Some(domain) => domain,
        None => return Ok(()),
    };
    if prerequisite_ok(constraint.kind(), domain) {
        Ok(())
    } else {
        Err(Disjoint::from_nodes(DisjointKind::Domain, basis, constraint))
    }
}

/// Fold one constraint into an accumulating intersection.
///
/// Closed kinds merge into their single slot; open kinds scan their list
/// for a matching entry (required/optional by key, index by signature)
/// and intersect values on a match, otherwise append. Pattern and
/// predicate lists preserve insertion order since evaluation is
/// sequential.
pub(crate) fn fold_into(inner: &mut IntersectionInner, node: &Node) -> Result<(), Disjoint> {
    match node.inner() {
        Inner::Domain(_) | Inner::Proto(_) | Inner::Unit(_) => {
            let merged = match &inner.basis {
                Some(existing) => intersect_nodes(existing, node)?,
                None => node.clone(),
            };
            for constraint in inner.constraints() {
                if !constraint.kind().is_basis() {
                    check_prerequisite(&merged, &constraint)?;
                }
            }
            inner.basis = Some(merged);
            Ok(())
        }

        Inner::Divisor(_) => {
            require_basis_compat(inner, node)?;
            merge_slot(&mut inner.divisor, node)
        }
        Inner::Min(min) => {
            require_basis_compat(inner, node)?;
            if let Some(max) = &inner.max {
                if let Inner::Max(max_inner) = max.inner() {
                    if min.limit > max_inner.limit
                        || (min.limit == max_inner.limit
                            && (min.exclusive || max_inner.exclusive))
                    {
                        return Err(Disjoint::from_nodes(DisjointKind::Range, node, max));
                    }
                }
            }
            merge_slot(&mut inner.min, node)
        }
        Inner::Max(max) => {
            require_basis_compat(inner, node)?;
            if let Some(min) = &inner.min {
                if let Inner::Min(min_inner) = min.inner() {
                    if min_inner.limit > max.limit
                        || (min_inner.limit == max.limit
                            && (min_inner.exclusive || max.exclusive))
                    {
                        return Err(Disjoint::from_nodes(DisjointKind::Range, min, node));
                    }
                }
            }
            merge_slot(&mut inner.max, node)
        }

        Inner::MinLength(min) => {
            require_basis_compat(inner, node)?;
            if let Some(max) = &inner.max_length {
                if let Inner::MaxLength(max_inner) = max.inner() {
                    if min.limit > max_inner.limit {
                        return Err(Disjoint::from_nodes(DisjointKind::Range, node, max));
                    }
                }
            }
            if let Some(exact) = &inner.exact_length {
                // an exact length subsumes compatible min/max bounds
                if let Inner::ExactLength(exact_inner) = exact.inner() {
                    if exact_inner.limit < min.limit {
                        return Err(Disjoint::from_nodes(DisjointKind::Range, node, exact));
                    }
                }
                return Ok(());
            }
            merge_slot(&mut inner.min_length, node)
        }
        Inner::MaxLength(max) => {
            require_basis_compat(inner, node)?;
            if let Some(min) = &inner.min_length {
                if let Inner::MinLength(min_inner) = min.inner() {
                    if min_inner.limit > max.limit {
                        return Err(Disjoint::from_nodes(DisjointKind::Range, min, node));
                    }
                }
            }
            if let Some(exact) = &inner.exact_length {
                if let Inner::ExactLength(exact_inner) = exact.inner() {
                    if exact_inner.limit > max.limit {
                        return Err(Disjoint::from_nodes(DisjointKind::Range, exact, node));
                    }
                }
                return Ok(());
            }
            merge_slot(&mut inner.max_length, node)
        }
        Inner::ExactLength(exact) => {
            require_basis_compat(inner, node)?;
            if let Some(existing) = &inner.exact_length {
                if !existing.equals(node) {
                    return Err(Disjoint::from_nodes(DisjointKind::Range, existing, node));
                }
                return Ok(());
            }
            if let Some(min) = &inner.min_length {
                if let Inner::MinLength(min_inner) = min.inner() {
                    if exact.limit < min_inner.limit {
                        return Err(Disjoint::from_nodes(DisjointKind::Range, min, node));
                    }
                }
            }
            if let Some(max) = &inner.max_length {
                if let Inner::MaxLength(max_inner) = max.inner() {
                    if exact.limit > max_inner.limit {
                        return Err(Disjoint::from_nodes(DisjointKind::Range, node, max));
                    }
                }
            }
            inner.min_length = None;
            inner.max_length = None;
            inner.exact_length = Some(node.clone());
            Ok(())
        }

        Inner::Pattern(_) | Inner::Predicate(_) => {
            require_basis_compat(inner, node)?;
            let list = match node.inner() {
                Inner::Pattern(_) => &mut inner.pattern,
                _ => &mut inner.predicate,
            };
            if !list.iter().any(|existing| existing.equals(node)) {
                list.push(node.clone());
            }
            Ok(())
        }

        Inner::Required(prop) => {
            require_basis_compat(inner, node)?;
            // an optional constraint on the same key folds into the
            // required one: presence stays required, both value
            // constraints apply
            let mut node = node.clone();
            if let Some(position) = inner.optional.iter().position(|existing| {
                matches!(existing.inner(), Inner::Optional(o) if o.key == prop.key)
            }) {
                let optional = inner.optional.remove(position);
                node = merge_prop_values(&node, &optional)?;
            }
            fold_keyed(&mut inner.required, &node, false)
        }
        Inner::Optional(prop) => {
            require_basis_compat(inner, node)?;
            if let Some(position) = inner.required.iter().position(|existing| {
                matches!(existing.inner(), Inner::Required(r) if r.key == prop.key)
            }) {
                let merged = merge_prop_values(&inner.required[position], node)?;
                inner.required[position] = merged;
                return Ok(());
            }
            fold_keyed(&mut inner.optional, node, true)
        }
        Inner::Index(index) => {
            require_basis_compat(inner, node)?;
            for existing in &mut inner.index {
                let matches = matches!(
                    existing.inner(),
                    Inner::Index(e) if e.signature.equals(&index.signature)
                );
                if matches {
                    *existing = intersect_nodes(existing, node)?;
                    return Ok(());
                }
            }
            inner.index.push(node.clone());
            Ok(())
        }
        Inner::Sequence(_) => {
            require_basis_compat(inner, node)?;
            merge_slot(&mut inner.sequence, node)
        }

        Inner::Intersection(_) | Inner::Union(_) | Inner::Morph(_) => {
            internal_error!("cannot fold set kind {} into an intersection", node.kind())
        }
    }
}

fn require_basis_compat(inner: &IntersectionInner, node: &Node) -> Result<(), Disjoint> {
    match &inner.basis {
        Some(basis) => check_prerequisite(basis, node),
        None => Ok(()),
    }
}

fn merge_slot(slot: &mut Option<Node>, node: &Node) -> Result<(), Disjoint> {
    let merged = match slot.as_ref() {
        Some(existing) => intersect_nodes(existing, node)?,
        None => node.clone(),
    };
    *slot = Some(merged);
    Ok(())
}

/// Merge a required node with a same-keyed optional (or required) node,
/// intersecting the value types. The result stays required.
fn merge_prop_values(required: &Node, other: &Node) -> Result<Node, Disjoint> {
    let (key, l_value) = match required.inner() {
        Inner::Required(prop) => (prop.key.clone(), prop.value.clone()),
        _ => internal_error!("merge_prop_values expects a required node"),
    };
    let r_value = match other.inner() {
        Inner::Required(prop) | Inner::Optional(prop) => prop.value.clone(),
        _ => internal_error!("merge_prop_values expects a prop node"),
    };
    let value = intersect_nodes(&l_value, &r_value)?;
    Ok(parse::rebuild(
        &required.scope(),
        Inner::Required(PropInner { key, value }),
    ))
}

/// Fold a required/optional node into its list: scan for an existing
/// entry with the same key, intersect values on a match, append
/// otherwise. `collapse_to_never` implements the optional semantics
/// where a disjoint value type degrades to never instead of failing.
fn fold_keyed(list: &mut Vec<Node>, node: &Node, collapse_to_never: bool) -> Result<(), Disjoint> {
    let key = match node.inner() {
        Inner::Required(prop) | Inner::Optional(prop) => prop.key.clone(),
        _ => internal_error!("fold_keyed expects a prop node"),
    };
    let mut matched = false;
    for existing in list.iter_mut() {
        let same_key = match existing.inner() {
            Inner::Required(prop) | Inner::Optional(prop) => prop.key == key,
            _ => false,
        };
        if !same_key {
            continue;
        }
        if matched {
            internal_error!("multiple distinct entries for prop key {key}");
        }
        let merged = match intersect_nodes(existing, node) {
            Ok(merged) => merged,
            Err(disjoint) => {
                if !collapse_to_never {
                    return Err(disjoint);
                }
                let scope = node.scope();
                parse::rebuild(
                    &scope,
                    Inner::Optional(PropInner {
                        key: key.clone(),
                        value: scope.never(),
                    }),
                )
            }
        };
        *existing = merged;
        matched = true;
    }
    if !matched {
        list.push(node.clone());
    }
    Ok(())
}

fn union_intersection(scope: &Scope, a: &Node, b: &Node) -> Result<Node, Disjoint> {
    let single_a = [a.clone()];
    let single_b = [b.clone()];
    let l: &[Node] = match a.inner() {
        Inner::Union(inner) => &inner.branches,
        _ => &single_a,
    };
    let r: &[Node] = match b.inner() {
        Inner::Union(inner) => &inner.branches,
        _ => &single_b,
    };
    let branches = intersect_branches(l, r);
    if branches.is_empty() {
        if l.is_empty() != r.is_empty() {
            // exactly one operand is never: discriminate on presence
            return Err(Disjoint::new(
                DisjointKind::Presence,
                DisjointOperand::Presence(!l.is_empty()),
                DisjointOperand::Presence(!r.is_empty()),
            ));
        }
        return Err(Disjoint::from_nodes(DisjointKind::Union, a, b));
    }
    let mut unique: Vec<Node> = Vec::new();
    for branch in branches {
        if !unique.iter().any(|existing| existing.equals(&branch)) {
            unique.push(branch);
        }
    }
    if unique.len() == 1 {
        return Ok(unique.remove(0));
    }
    Ok(parse::rebuild(
        scope,
        Inner::Union(UnionInner { branches: unique }),
    ))
}

/// Element-wise cross product of two branch sets with subtype
/// short-circuiting: a branch recognized as a subtype of an opposite
/// branch joins the result directly, and no further intersections
/// involving its supertype's other pairs can contribute anything
/// distinct.
fn intersect_branches(l: &[Node], r: &[Node]) -> Vec<Node> {
    let mut final_branches: Vec<Node> = Vec::new();
    // each r branch accumulates distinct intersections until it is
    // identified as a subtype or equal of some l branch (None)
    let mut candidates_by_r: Vec<Option<Vec<Node>>> = r.iter().map(|_| Some(Vec::new())).collect();
    for l_branch in l {
        let mut current_candidate_by_r: BTreeMap<usize, Node> = BTreeMap::new();
        for (r_index, r_branch) in r.iter().enumerate() {
            if candidates_by_r[r_index].is_none() {
                continue;
            }
            if l_branch.equals(r_branch) {
                final_branches.push(l_branch.clone());
                candidates_by_r[r_index] = None;
                current_candidate_by_r.clear();
                break;
            }
            let branch_intersection = match intersect_nodes(l_branch, r_branch) {
                // a disjoint pair adds no distinct region
                Err(_) => continue,
                Ok(node) => node,
            };
            if branch_intersection.equals(l_branch) {
                // l is a subtype of this r branch; its remaining pairs
                // are redundant
                final_branches.push(l_branch.clone());
                current_candidate_by_r.clear();
                break;
            }
            if branch_intersection.equals(r_branch) {
                // r is a subtype of this l branch
                final_branches.push(r_branch.clone());
                candidates_by_r[r_index] = None;
                continue;
            }
            current_candidate_by_r.insert(r_index, branch_intersection);
        }
        for (r_index, candidate) in current_candidate_by_r {
            if let Some(candidates) = &mut candidates_by_r[r_index] {
                candidates.push(candidate);
            }
        }
    }
    for candidates in candidates_by_r.into_iter().flatten() {
        final_branches.extend(candidates);
    }
    final_branches
}

fn gcd(l: u64, r: u64) -> u64 {
    let mut greatest = l;
    let mut current = r;
    while current != 0 {
        let previous = current;
        current = greatest % current;
        greatest = previous;
    }
    greatest
}

fn lcm(l: u64, r: u64) -> u64 {
    let product = (l as u128) * (r as u128);
    match u64::try_from(product / gcd(l, r) as u128) {
        Ok(lcm) => lcm,
        Err(_) => internal_error!("divisor intersection overflow: lcm({l}, {r})"),
    }
}
