// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The compiler: lowers a finalized node graph into two executable forms
//! per node.
//!
//! `allows` is a boolean predicate that short-circuits on the first
//! failing constraint; `apply` collects every failing constraint as a
//! path-keyed diagnostic and never aborts traversal of sibling branches.
//! Both are produced from one uniform check template, so the two modes
//! cannot disagree about acceptance.
//!
//! Before compiling a basis/domain/value check at a given path the
//! compiler consults a ledger of already-proven discriminants for that
//! path (or a path prefix, for object-domain checks) and omits redundant
//! checks. This is purely an optimization: a [`Compiler`] built with
//! [`Compiler::without_discriminant_elision`] emits every check, which is
//! what differential tests compare against.

use std::rc::Rc;

use crate::node::Node;
use crate::nodes::{Inner, IntersectionInner};
use crate::scope::{Registered, RegistryRef, Scope};
use crate::traverse::{DiagnosticCode, TraversalContext};
use crate::value::{Domain, Value};

type String = Rc<str>;

type AllowsFn = Rc<dyn Fn(&Value, &mut TraversalContext) -> bool>;
type ApplyFn = Rc<dyn Fn(&Value, &mut TraversalContext)>;

/// The two executable forms of one compiled node.
///
/// Compiled checks read only the closed-over node graph and the context
/// passed to them, so one `CompiledNode` may serve concurrent calls as
/// long as each call supplies its own context.
#[derive(Clone)]
pub struct CompiledNode {
    allows: AllowsFn,
    apply: ApplyFn,
}

impl CompiledNode {
    pub fn allows(&self, data: &Value, ctx: &mut TraversalContext) -> bool {
        (self.allows)(data, ctx)
    }

    pub fn apply(&self, data: &Value, ctx: &mut TraversalContext) {
        (self.apply)(data, ctx)
    }

    /// The uniform check template: a primitive condition that either
    /// short-circuits (allows) or appends a structured diagnostic
    /// (apply).
    fn primitive(
        code: DiagnosticCode,
        expected: String,
        test: Rc<dyn Fn(&Value) -> bool>,
    ) -> CompiledNode {
        let apply_test = test.clone();
        CompiledNode {
            allows: Rc::new(move |data, _ctx| test(data)),
            apply: Rc::new(move |data, ctx| {
                if !apply_test(data) {
                    ctx.error(code, expected.clone(), data);
                }
            }),
        }
    }

    /// A check proven redundant by a discriminant: compiles to nothing.
    fn elided() -> CompiledNode {
        CompiledNode {
            allows: Rc::new(|_, _| true),
            apply: Rc::new(|_, _| {}),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    /// A variable segment (array element or dynamic key): extends the
    /// path without ever matching a discriminant exactly.
    Element,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DiscriminantKind {
    Domain,
    Value,
}

/// A fact proven by an enclosing dispatch: at `path`, the domain (or the
/// exact value) of the data has already been checked.
struct Discriminant {
    path: Vec<Segment>,
    kind: DiscriminantKind,
}

#[derive(Default)]
struct CompileCtx {
    path: Vec<Segment>,
    discriminants: Vec<Discriminant>,
}

impl CompileCtx {
    /// Whether a domain/value check at the current path is already proven.
    fn proven(&self, kind: DiscriminantKind) -> bool {
        self.discriminants.iter().any(|d| {
            d.path == self.path
                && match kind {
                    // an exact value implies its domain
                    DiscriminantKind::Domain => true,
                    DiscriminantKind::Value => d.kind == DiscriminantKind::Value,
                }
        })
    }

    /// Whether some discriminant was proven at the current path or below
    /// it. Discriminating on a deeper path implies the data here is an
    /// object, so an object-domain check is redundant.
    fn proven_at_or_below(&self) -> bool {
        self.discriminants
            .iter()
            .any(|d| d.path.len() >= self.path.len() && d.path[..self.path.len()] == self.path[..])
    }
}

/// Compiles node graphs into [`CompiledNode`]s for a given scope.
pub struct Compiler<'s> {
    scope: &'s Scope,
    elide: bool,
}

impl<'s> Compiler<'s> {
    pub fn new(scope: &'s Scope) -> Self {
        Compiler { scope, elide: true }
    }

    /// Disable discriminant-based dead-check elision. Acceptance
    /// semantics are identical with the optimization on or off; this
    /// exists so differential tests can verify that.
    pub fn without_discriminant_elision(mut self) -> Self {
        self.elide = false;
        self
    }

    pub fn compile(&self, node: &Node) -> CompiledNode {
        let mut ctx = CompileCtx::default();
        self.compile_node(node, &mut ctx)
    }

    fn resolve(&self, reference: RegistryRef) -> Registered {
        match self.scope.resolve(reference) {
            Some(entry) => entry,
            None => internal_error!("dangling registry reference $reg:{}", reference.0),
        }
    }

    fn compile_node(&self, node: &Node, ctx: &mut CompileCtx) -> CompiledNode {
        match node.inner() {
            Inner::Domain(inner) => {
                if self.elide {
                    if inner.domain == Domain::Object && ctx.proven_at_or_below() {
                        return CompiledNode::elided();
                    }
                    if ctx.proven(DiscriminantKind::Domain) {
                        return CompiledNode::elided();
                    }
                }
                let domain = inner.domain;
                CompiledNode::primitive(
                    DiagnosticCode::Domain,
                    Rc::from(node.description()),
                    Rc::new(move |data| data.domain() == Some(domain)),
                )
            }
            Inner::Proto(inner) => {
                let proto = inner.proto;
                CompiledNode::primitive(
                    DiagnosticCode::Proto,
                    Rc::from(node.description()),
                    Rc::new(move |data| data.object_kind() == Some(proto)),
                )
            }
            Inner::Unit(inner) => {
                if self.elide && ctx.proven(DiscriminantKind::Value) {
                    return CompiledNode::elided();
                }
                let unit = inner.unit.clone();
                CompiledNode::primitive(
                    DiagnosticCode::Unit,
                    Rc::from(node.description()),
                    Rc::new(move |data| *data == unit),
                )
            }
            Inner::Divisor(inner) => {
                let divisor = inner.divisor;
                CompiledNode::primitive(
                    DiagnosticCode::Divisor,
                    Rc::from(node.description()),
                    Rc::new(move |data| match data {
                        Value::Number(n) => n.is_multiple_of(divisor),
                        _ => false,
                    }),
                )
            }
            Inner::Min(inner) => {
                let limit = inner.limit.clone();
                let exclusive = inner.exclusive;
                CompiledNode::primitive(
                    DiagnosticCode::Min,
                    Rc::from(node.description()),
                    Rc::new(move |data| match data {
                        Value::Number(n) if exclusive => *n > limit,
                        Value::Number(n) => *n >= limit,
                        _ => false,
                    }),
                )
            }
            Inner::Max(inner) => {
                let limit = inner.limit.clone();
                let exclusive = inner.exclusive;
                CompiledNode::primitive(
                    DiagnosticCode::Max,
                    Rc::from(node.description()),
                    Rc::new(move |data| match data {
                        Value::Number(n) if exclusive => *n < limit,
                        Value::Number(n) => *n <= limit,
                        _ => false,
                    }),
                )
            }
            Inner::MinLength(inner) => {
                let limit = inner.limit;
                CompiledNode::primitive(
                    DiagnosticCode::MinLength,
                    Rc::from(node.description()),
                    Rc::new(move |data| length_of(data).is_some_and(|len| len >= limit)),
                )
            }
            Inner::MaxLength(inner) => {
                let limit = inner.limit;
                CompiledNode::primitive(
                    DiagnosticCode::MaxLength,
                    Rc::from(node.description()),
                    Rc::new(move |data| length_of(data).is_some_and(|len| len <= limit)),
                )
            }
            Inner::ExactLength(inner) => {
                let limit = inner.limit;
                CompiledNode::primitive(
                    DiagnosticCode::ExactLength,
                    Rc::from(node.description()),
                    Rc::new(move |data| length_of(data) == Some(limit)),
                )
            }
            Inner::Pattern(inner) => {
                let regex = match self.resolve(inner.regex) {
                    Registered::Regex(regex) => regex,
                    _ => internal_error!("pattern node references a non-regex registry entry"),
                };
                CompiledNode::primitive(
                    DiagnosticCode::Pattern,
                    Rc::from(node.description()),
                    Rc::new(move |data| match data {
                        Value::String(s) => regex.is_match(s),
                        _ => false,
                    }),
                )
            }
            Inner::Predicate(inner) => match self.resolve(inner.predicate) {
                Registered::Predicate(predicate) => CompiledNode::primitive(
                    DiagnosticCode::Predicate,
                    Rc::from(node.description()),
                    Rc::new(move |data| predicate(data)),
                ),
                Registered::ContextualPredicate(predicate) => {
                    let expected: String = Rc::from(node.description());
                    let allows_predicate = predicate.clone();
                    CompiledNode {
                        allows: Rc::new(move |data, ctx| allows_predicate(data, ctx)),
                        apply: Rc::new(move |data, ctx| {
                            if !predicate(data, ctx) {
                                ctx.error(DiagnosticCode::Predicate, expected.clone(), data);
                            }
                        }),
                    }
                }
                _ => internal_error!("predicate node references a non-predicate registry entry"),
            },
            Inner::Required(prop) => self.compile_prop(&prop.key, &prop.value, true, ctx),
            Inner::Optional(prop) => self.compile_prop(&prop.key, &prop.value, false, ctx),
            Inner::Index(inner) => {
                let signature = self.compile_node(&inner.signature, &mut CompileCtx::default());
                ctx.path.push(Segment::Element);
                let value = self.compile_node(&inner.value, ctx);
                ctx.path.pop();
                let allows_signature = signature.clone();
                let allows_value = value.clone();
                CompiledNode {
                    allows: Rc::new(move |data, ctx| {
                        let entries = match data.as_object() {
                            Ok(entries) => entries,
                            Err(_) => return true,
                        };
                        for (key, entry) in entries.iter() {
                            let mut probe = TraversalContext::new();
                            if !allows_signature.allows(key, &mut probe) {
                                continue;
                            }
                            let key_name: String = match key {
                                Value::String(s) => s.clone(),
                                other => Rc::from(other.to_string()),
                            };
                            ctx.push_key(key_name);
                            let ok = allows_value.allows(entry, ctx);
                            ctx.pop();
                            if !ok {
                                return false;
                            }
                        }
                        true
                    }),
                    apply: Rc::new(move |data, ctx| {
                        let entries = match data.as_object() {
                            Ok(entries) => entries,
                            Err(_) => return,
                        };
                        for (key, entry) in entries.iter() {
                            let mut probe = TraversalContext::new();
                            if !signature.allows(key, &mut probe) {
                                continue;
                            }
                            let key_name: String = match key {
                                Value::String(s) => s.clone(),
                                other => Rc::from(other.to_string()),
                            };
                            ctx.push_key(key_name);
                            value.apply(entry, ctx);
                            ctx.pop();
                        }
                    }),
                }
            }
            Inner::Sequence(inner) => {
                ctx.path.push(Segment::Element);
                let element = self.compile_node(&inner.element, ctx);
                ctx.path.pop();
                let allows_element = element.clone();
                CompiledNode {
                    allows: Rc::new(move |data, ctx| {
                        let items = match data.as_array() {
                            Ok(items) => items,
                            Err(_) => return true,
                        };
                        for (index, item) in items.iter().enumerate() {
                            ctx.push_index(index);
                            let ok = allows_element.allows(item, ctx);
                            ctx.pop();
                            if !ok {
                                return false;
                            }
                        }
                        true
                    }),
                    apply: Rc::new(move |data, ctx| {
                        let items = match data.as_array() {
                            Ok(items) => items,
                            Err(_) => return,
                        };
                        for (index, item) in items.iter().enumerate() {
                            ctx.push_index(index);
                            element.apply(item, ctx);
                            ctx.pop();
                        }
                    }),
                }
            }
            Inner::Intersection(inner) => self.compile_intersection(inner, ctx),
            Inner::Union(inner) => self.compile_union(node, &inner.branches, ctx),
            Inner::Morph(inner) => {
                // morphs validate their input type; transformation is
                // modeled by the in/out projections
                self.compile_node(&inner.in_node, ctx)
            }
        }
    }

    fn compile_prop(
        &self,
        key: &String,
        value: &Node,
        required: bool,
        ctx: &mut CompileCtx,
    ) -> CompiledNode {
        ctx.path.push(Segment::Key(key.clone()));
        let compiled_value = self.compile_node(value, ctx);
        ctx.path.pop();
        let allows_key = key.clone();
        let allows_value = compiled_value.clone();
        let apply_key = key.clone();
        CompiledNode {
            allows: Rc::new(move |data, ctx| {
                let entry = match data.as_object() {
                    Ok(map) => map.get(&Value::String(allows_key.clone())),
                    Err(_) => None,
                };
                match entry {
                    Some(entry) => {
                        ctx.push_key(allows_key.clone());
                        let ok = allows_value.allows(entry, ctx);
                        ctx.pop();
                        ok
                    }
                    None => !required,
                }
            }),
            apply: Rc::new(move |data, ctx| {
                let entry = match data.as_object() {
                    Ok(map) => map.get(&Value::String(apply_key.clone())),
                    Err(_) => None,
                };
                match entry {
                    Some(entry) => {
                        ctx.push_key(apply_key.clone());
                        compiled_value.apply(entry, ctx);
                        ctx.pop();
                    }
                    None if required => {
                        ctx.push_key(apply_key.clone());
                        ctx.error_with_actual(
                            DiagnosticCode::Required,
                            Rc::from("provided"),
                            Rc::from(""),
                        );
                        ctx.pop();
                    }
                    None => {}
                }
            }),
        }
    }

    fn compile_intersection(
        &self,
        inner: &IntersectionInner,
        ctx: &mut CompileCtx,
    ) -> CompiledNode {
        let basis = inner
            .basis
            .as_ref()
            .map(|basis| self.compile_node(basis, ctx));
        let mut refinements = Vec::new();
        for constraint in inner.constraints() {
            if constraint.kind().is_basis() {
                continue;
            }
            refinements.push(self.compile_node(&constraint, ctx));
        }
        let allows_basis = basis.clone();
        let allows_refinements = refinements.clone();
        CompiledNode {
            allows: Rc::new(move |data, ctx| {
                if let Some(basis) = &allows_basis {
                    if !basis.allows(data, ctx) {
                        return false;
                    }
                }
                allows_refinements
                    .iter()
                    .all(|refinement| refinement.allows(data, ctx))
            }),
            apply: Rc::new(move |data, ctx| {
                let before = ctx.error_count();
                if let Some(basis) = &basis {
                    basis.apply(data, ctx);
                    if ctx.error_count() > before {
                        // refinements assume the basis held; a failed
                        // basis is the only diagnostic worth reporting
                        return;
                    }
                }
                for refinement in &refinements {
                    refinement.apply(data, ctx);
                }
            }),
        }
    }

    fn compile_union(&self, node: &Node, branches: &[Node], ctx: &mut CompileCtx) -> CompiledNode {
        if self.elide {
            if let Some(compiled) = self.compile_discriminated(branches, ctx) {
                return compiled;
            }
        }
        let compiled_branches: Vec<CompiledNode> = branches
            .iter()
            .map(|branch| self.compile_node(branch, ctx))
            .collect();
        let expected: String = Rc::from(node.description());
        let allows_branches = compiled_branches.clone();
        CompiledNode {
            allows: Rc::new(move |data, ctx| {
                allows_branches
                    .iter()
                    .any(|branch| branch.allows(data, ctx))
            }),
            apply: Rc::new(move |data, ctx| {
                let matched = compiled_branches.iter().any(|branch| {
                    let mut probe = TraversalContext::new();
                    branch.allows(data, &mut probe)
                });
                if !matched {
                    ctx.error(DiagnosticCode::Union, expected.clone(), data);
                }
            }),
        }
    }

    /// Attempt discriminant dispatch: when every branch is anchored by a
    /// basis of one discriminable kind (all distinct domains, or all
    /// distinct unit values), compile a switch instead of an or-chain and
    /// record the proven discriminant so branch-level basis checks elide.
    fn compile_discriminated(
        &self,
        branches: &[Node],
        ctx: &mut CompileCtx,
    ) -> Option<CompiledNode> {
        if branches.len() < 2 {
            return None;
        }
        let bases: Vec<Node> = branches
            .iter()
            .map(branch_basis)
            .collect::<Option<Vec<_>>>()?;

        let domains: Option<Vec<Domain>> = bases
            .iter()
            .map(|basis| match basis.inner() {
                Inner::Domain(inner) => Some(inner.domain),
                _ => None,
            })
            .collect();
        if let Some(domains) = domains {
            if all_distinct(&domains) {
                ctx.discriminants.push(Discriminant {
                    path: ctx.path.clone(),
                    kind: DiscriminantKind::Domain,
                });
                let compiled: Vec<(Domain, CompiledNode)> = domains
                    .iter()
                    .zip(branches)
                    .map(|(domain, branch)| (*domain, self.compile_node(branch, ctx)))
                    .collect();
                ctx.discriminants.pop();
                return Some(dispatch(compiled, union_description(branches), |data| {
                    data.domain()
                }));
            }
        }

        let units: Option<Vec<Value>> = bases
            .iter()
            .map(|basis| match basis.inner() {
                Inner::Unit(inner) => Some(inner.unit.clone()),
                _ => None,
            })
            .collect();
        if let Some(units) = units {
            if all_distinct(&units) {
                ctx.discriminants.push(Discriminant {
                    path: ctx.path.clone(),
                    kind: DiscriminantKind::Value,
                });
                let compiled: Vec<(Value, CompiledNode)> = units
                    .iter()
                    .zip(branches)
                    .map(|(unit, branch)| (unit.clone(), self.compile_node(branch, ctx)))
                    .collect();
                ctx.discriminants.pop();
                return Some(dispatch(compiled, union_description(branches), |data| {
                    Some(data.clone())
                }));
            }
        }

        None
    }
}

/// The basis anchoring a union branch, where one exists.
fn branch_basis(branch: &Node) -> Option<Node> {
    match branch.inner() {
        Inner::Domain(_) | Inner::Unit(_) | Inner::Proto(_) => Some(branch.clone()),
        Inner::Intersection(inner) => inner.basis.clone(),
        Inner::Morph(inner) => branch_basis(&inner.in_node),
        _ => None,
    }
}

fn all_distinct<T: PartialEq>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(i, item)| !items[..i].contains(item))
}

fn union_description(branches: &[Node]) -> String {
    Rc::from(
        branches
            .iter()
            .map(|branch| branch.description())
            .collect::<Vec<_>>()
            .join(" or "),
    )
}

/// Build a discriminant switch: select the branch whose key matches the
/// data's projection and run only that branch's checks.
fn dispatch<K: PartialEq + 'static>(
    table: Vec<(K, CompiledNode)>,
    expected: String,
    project: impl Fn(&Value) -> Option<K> + 'static,
) -> CompiledNode {
    let project = Rc::new(project);
    let allows_table: Rc<Vec<(K, CompiledNode)>> = Rc::new(table);
    let apply_table = allows_table.clone();
    let allows_project = project.clone();
    CompiledNode {
        allows: Rc::new(move |data, ctx| {
            let key = match allows_project(data) {
                Some(key) => key,
                None => return false,
            };
            match allows_table.iter().find(|(k, _)| *k == key) {
                Some((_, branch)) => branch.allows(data, ctx),
                None => false,
            }
        }),
        apply: Rc::new(move |data, ctx| {
            let selected = project(data).and_then(|key| apply_table.iter().find(|(k, _)| *k == key));
            match selected {
                Some((_, branch)) => branch.apply(data, ctx),
                None => ctx.error(DiagnosticCode::Union, expected.clone(), data),
            }
        }),
    }
}

fn length_of(data: &Value) -> Option<u64> {
    match data {
        Value::String(s) => Some(s.len() as u64),
        Value::Array(a) => Some(a.len() as u64),
        _ => None,
    }
}
