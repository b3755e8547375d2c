//! # Dependency Validator
//!
//! Builds the transient "copies from" graph over every requestor and checks
//! it for structural soundness before anything is copied:
//!
//! 1. Self/ancestor copies (a type copying from itself, its containers or
//!    its nested types)
//! 2. Cycles, flagged on the edge that closes them
//! 3. Sources living in another assembly
//! 4. Type arguments violating the source's generic constraints

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::model::{DeclId, GenericParameter, SymbolGraph};
use crate::resolver::{split_generic, ResolvedDirective, TargetResolver, TypeFacts};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet};

/// One resolved "copies from" relation, alive for a single pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub from: DeclId,
    pub to: DeclId,
    /// Index of the directive record on `from` that produced the edge
    pub directive: usize,
}

/// Depth-first cycle search over a copies-from adjacency list
pub struct CycleDetector<'g> {
    adjacency: &'g IndexMap<DeclId, Vec<DependencyEdge>>,
}

struct Frame {
    node: DeclId,
    next_edge: usize,
    reaches_cycle: bool,
}

impl<'g> CycleDetector<'g> {
    pub fn new(adjacency: &'g IndexMap<DeclId, Vec<DependencyEdge>>) -> Self {
        Self { adjacency }
    }

    /// Every edge that closes a cycle in some traversal.
    ///
    /// Each node is used as a root in turn; nodes whose whole subtree proved
    /// acyclic are memoized and never walked again.
    pub fn closing_edges(&self) -> IndexSet<DependencyEdge> {
        let mut acyclic = HashSet::new();
        let mut flagged = IndexSet::new();
        for root in self.adjacency.keys() {
            if !acyclic.contains(root) {
                self.walk(*root, &mut acyclic, &mut flagged);
            }
        }
        flagged
    }

    fn walk(
        &self,
        root: DeclId,
        acyclic: &mut HashSet<DeclId>,
        flagged: &mut IndexSet<DependencyEdge>,
    ) {
        let mut on_path = HashSet::from([root]);
        let mut finished = HashSet::new();
        let mut stack = vec![Frame {
            node: root,
            next_edge: 0,
            reaches_cycle: false,
        }];

        while let Some(frame) = stack.last_mut() {
            let edges = self
                .adjacency
                .get(&frame.node)
                .map(Vec::as_slice)
                .unwrap_or_default();

            if let Some(edge) = edges.get(frame.next_edge).copied() {
                frame.next_edge += 1;
                if on_path.contains(&edge.to) {
                    flagged.insert(edge);
                    frame.reaches_cycle = true;
                } else if acyclic.contains(&edge.to) {
                    continue;
                } else if finished.contains(&edge.to) {
                    // walked earlier in this traversal and found tainted
                    frame.reaches_cycle = true;
                } else {
                    on_path.insert(edge.to);
                    stack.push(Frame {
                        node: edge.to,
                        next_edge: 0,
                        reaches_cycle: false,
                    });
                }
                continue;
            }

            let Some(done) = stack.pop() else { break };
            on_path.remove(&done.node);
            finished.insert(done.node);
            if done.reaches_cycle {
                if let Some(parent) = stack.last_mut() {
                    parent.reaches_cycle = true;
                }
            } else {
                acyclic.insert(done.node);
            }
        }
    }
}

/// A single unmet generic constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub parameter: String,
    pub argument: String,
    pub requirement: String,
}

/// Check one type argument against one parameter's constraints.
///
/// With `first_only` the check stops at the first unmet clause.
pub fn check_constraints(
    parameter: &GenericParameter,
    facts: &TypeFacts,
    substitutions: &HashMap<String, String>,
    first_only: bool,
) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();
    if !facts.known {
        return violations;
    }

    let constraints = &parameter.constraints;
    let mut requirements: Vec<(String, bool)> = Vec::new();
    if constraints.reference_type {
        requirements.push(("a reference type".to_string(), facts.reference_type));
    }
    if constraints.value_type || constraints.unmanaged {
        requirements.push((
            "a non-nullable value type".to_string(),
            facts.value_type && !facts.nullable,
        ));
    }
    if constraints.unmanaged {
        requirements.push(("an unmanaged type".to_string(), facts.unmanaged));
    }
    if constraints.not_null {
        requirements.push(("a non-nullable type".to_string(), !facts.nullable));
    }
    for required in &constraints.types {
        let required = crate::codegen::substitute_type_text(required, substitutions);
        requirements.push((
            format!("convertible to '{required}'"),
            satisfies_type(facts, &required),
        ));
    }

    for (requirement, satisfied) in requirements {
        if satisfied {
            continue;
        }
        violations.push(ConstraintViolation {
            parameter: parameter.name.clone(),
            argument: facts.rendered.clone(),
            requirement,
        });
        if first_only {
            break;
        }
    }
    violations
}

fn simple_name(rendered: &str) -> &str {
    let (name, _) = split_generic(rendered);
    name.rsplit('.').next().unwrap_or(name)
}

fn satisfies_type(facts: &TypeFacts, required: &str) -> bool {
    let compact = |text: &str| text.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    let required_compact = compact(required);
    if compact(&facts.rendered) == required_compact || required == "object" {
        return true;
    }
    facts.supertypes.iter().any(|supertype| {
        compact(supertype) == required_compact
            || (simple_name(supertype) == simple_name(required)
                && split_generic(supertype).1.len() == split_generic(required).1.len())
    })
}

/// Result of validating the whole graph
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    /// Requestors that must not produce any output, with the reason
    pub aborted: IndexMap<DeclId, DiagnosticCode>,
    /// Individual directives (requestor, record index) that were rejected
    pub rejected: HashSet<(DeclId, usize)>,
}

impl ValidationOutcome {
    pub fn is_aborted(&self, requestor: DeclId) -> bool {
        self.aborted.contains_key(&requestor)
    }

    pub fn is_rejected(&self, requestor: DeclId, directive: usize) -> bool {
        self.rejected.contains(&(requestor, directive))
    }

    fn abort(&mut self, requestor: DeclId, code: DiagnosticCode) {
        self.aborted.entry(requestor).or_insert(code);
    }
}

pub struct DependencyValidator<'a> {
    graph: &'a SymbolGraph,
    resolver: &'a TargetResolver<'a>,
}

impl<'a> DependencyValidator<'a> {
    pub fn new(resolver: &'a TargetResolver<'a>) -> Self {
        Self {
            graph: resolver.graph(),
            resolver,
        }
    }

    /// Validate every requestor's resolved directives
    pub fn validate(
        &self,
        resolved: &IndexMap<DeclId, Vec<ResolvedDirective>>,
        sink: &mut dyn DiagnosticSink,
    ) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let mut adjacency: IndexMap<DeclId, Vec<DependencyEdge>> = IndexMap::new();

        for (requestor, directives) in resolved {
            let edges = adjacency.entry(*requestor).or_default();
            for directive in directives {
                if self.is_self_or_ancestor(*requestor, directive.source) {
                    report(
                        sink,
                        self.graph,
                        *requestor,
                        directive,
                        DiagnosticCode::SelfOrAncestorCopy,
                        format!(
                            "'{}' cannot copy members from itself, a containing type or a nested type ('{}')",
                            self.graph.display_name(*requestor),
                            self.graph.display_name(directive.source)
                        ),
                    );
                    outcome.abort(*requestor, DiagnosticCode::SelfOrAncestorCopy);
                    continue;
                }
                edges.push(DependencyEdge {
                    from: *requestor,
                    to: directive.source,
                    directive: directive.directive.index,
                });
            }
        }

        let closing = CycleDetector::new(&adjacency).closing_edges();
        tracing::debug!("[TCG] Cycle search flagged {} edge(s)", closing.len());
        for edge in &closing {
            let Some(directive) = resolved
                .get(&edge.from)
                .and_then(|list| list.iter().find(|d| d.directive.index == edge.directive))
            else {
                continue;
            };
            report(
                sink,
                self.graph,
                edge.from,
                directive,
                DiagnosticCode::CircularDependency,
                format!(
                    "copying from '{}' into '{}' creates a circular dependency",
                    self.graph.display_name(edge.to),
                    self.graph.display_name(edge.from)
                ),
            );
            outcome.abort(edge.from, DiagnosticCode::CircularDependency);
        }

        for (requestor, directives) in resolved {
            for directive in directives {
                if !self.check_directive(*requestor, directive, sink) {
                    outcome.rejected.insert((*requestor, directive.directive.index));
                }
            }
        }

        outcome
    }

    /// Same-assembly and constraint checks for one directive
    fn check_directive(
        &self,
        requestor: DeclId,
        directive: &ResolvedDirective,
        sink: &mut dyn DiagnosticSink,
    ) -> bool {
        let requestor_decl = self.graph.declaration(requestor);
        let source_decl = self.graph.declaration(directive.source);

        if requestor_decl.assembly != source_decl.assembly {
            report(
                sink,
                self.graph,
                requestor,
                directive,
                DiagnosticCode::CrossAssembly,
                format!(
                    "'{}' lives in assembly '{}' but '{}' is in '{}'",
                    self.graph.display_name(directive.source),
                    source_decl.assembly,
                    self.graph.display_name(requestor),
                    requestor_decl.assembly
                ),
            );
            return false;
        }

        if !directive.directive.source.is_closed_generic() {
            return true;
        }

        let substitutions: HashMap<String, String> = source_decl
            .generic_parameters
            .iter()
            .zip(directive.type_arguments())
            .map(|(parameter, argument)| (parameter.name.clone(), argument.clone()))
            .collect();

        let detailed = sink.is_detailed();
        let mut valid = true;
        for (parameter, argument) in source_decl
            .generic_parameters
            .iter()
            .zip(directive.type_arguments())
        {
            let facts = self.resolver.type_facts(requestor, argument);
            // quiet mode stops at the first failing argument
            let violations = check_constraints(parameter, &facts, &substitutions, !detailed);
            if violations.is_empty() {
                continue;
            }
            valid = false;
            for violation in violations {
                report(
                    sink,
                    self.graph,
                    requestor,
                    directive,
                    DiagnosticCode::TypeArgumentConstraintViolation,
                    format!(
                        "type argument '{}' for '{}' of '{}' must be {}",
                        violation.argument,
                        violation.parameter,
                        self.graph.display_name(directive.source),
                        violation.requirement
                    ),
                );
            }
            if !detailed {
                break;
            }
        }
        valid
    }

    fn is_self_or_ancestor(&self, requestor: DeclId, source: DeclId) -> bool {
        self.graph.is_within(requestor, source) || self.graph.is_within(source, requestor)
    }
}

fn report(
    sink: &mut dyn DiagnosticSink,
    graph: &SymbolGraph,
    requestor: DeclId,
    directive: &ResolvedDirective,
    code: DiagnosticCode,
    message: String,
) {
    sink.report(
        Diagnostic::new(code, message)
            .for_requestor(graph.display_name(requestor))
            .at(directive.directive.location.clone()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticBag, FailureFlag};
    use crate::directive::DirectiveRecord;
    use crate::model::{Declaration, GenericConstraints, GraphBuilder};
    use crate::resolver::resolve_directives;

    fn edge(from: u32, to: u32) -> DependencyEdge {
        DependencyEdge {
            from: DeclId::from_raw(from),
            to: DeclId::from_raw(to),
            directive: 0,
        }
    }

    fn adjacency(edges: &[(u32, u32)]) -> IndexMap<DeclId, Vec<DependencyEdge>> {
        let mut map: IndexMap<DeclId, Vec<DependencyEdge>> = IndexMap::new();
        for (from, to) in edges {
            map.entry(DeclId::from_raw(*from)).or_default().push(edge(*from, *to));
            map.entry(DeclId::from_raw(*to)).or_default();
        }
        map
    }

    fn run(graph: &SymbolGraph, sink: &mut dyn DiagnosticSink) -> ValidationOutcome {
        let resolver = TargetResolver::new(graph);
        let mut resolved = IndexMap::new();
        for requestor in graph.requestors() {
            resolved.insert(requestor, resolve_directives(&resolver, requestor, sink));
        }
        DependencyValidator::new(&resolver).validate(&resolved, sink)
    }

    #[test]
    fn dag_has_no_closing_edges() {
        let map = adjacency(&[(0, 1), (0, 2), (1, 3), (2, 3)]);
        assert!(CycleDetector::new(&map).closing_edges().is_empty());
    }

    #[test]
    fn every_edge_of_a_ring_is_flagged_once() {
        let map = adjacency(&[(0, 1), (1, 2), (2, 0)]);
        let flagged = CycleDetector::new(&map).closing_edges();
        assert_eq!(flagged.len(), 3);
        assert!(flagged.contains(&edge(2, 0)));
        assert!(flagged.contains(&edge(0, 1)));
        assert!(flagged.contains(&edge(1, 2)));
    }

    #[test]
    fn nodes_leading_into_a_cycle_are_not_flagged() {
        let map = adjacency(&[(3, 0), (0, 1), (1, 0)]);
        let flagged = CycleDetector::new(&map).closing_edges();
        assert!(flagged.iter().all(|e| e.from != DeclId::from_raw(3)));
        assert_eq!(flagged.len(), 2);
    }

    #[test]
    fn mutual_copy_aborts_both_requestors() {
        let mut builder = GraphBuilder::new();
        let a = builder.add(Declaration::class("A").partial().directive(DirectiveRecord::new("B").order(1)));
        let b = builder.add(Declaration::class("B").partial().directive(DirectiveRecord::new("A").order(1)));
        let graph = builder.build().unwrap();

        let mut bag = DiagnosticBag::new();
        let outcome = run(&graph, &mut bag);
        assert!(outcome.is_aborted(a));
        assert!(outcome.is_aborted(b));
        assert_eq!(
            bag.codes(),
            vec![DiagnosticCode::CircularDependency, DiagnosticCode::CircularDependency]
        );
    }

    #[test]
    fn copying_from_self_or_container_is_rejected() {
        let mut builder = GraphBuilder::new();
        let outer = builder.add(Declaration::class("Outer").partial());
        let inner = builder.add_nested(
            outer,
            Declaration::class("Inner").partial().directive(DirectiveRecord::new("Outer")),
        );
        let lonely = builder.add(Declaration::class("Lonely").partial().directive(DirectiveRecord::new("Lonely")));
        let graph = builder.build().unwrap();

        let mut bag = DiagnosticBag::new();
        let outcome = run(&graph, &mut bag);
        assert_eq!(outcome.aborted.get(&inner), Some(&DiagnosticCode::SelfOrAncestorCopy));
        assert_eq!(outcome.aborted.get(&lonely), Some(&DiagnosticCode::SelfOrAncestorCopy));
        assert!(!bag.codes().contains(&DiagnosticCode::CircularDependency));
    }

    #[test]
    fn cross_assembly_rejects_only_the_directive() {
        let mut builder = GraphBuilder::new();
        let a = builder.add(
            Declaration::class("A")
                .partial()
                .in_assembly("X")
                .directive(DirectiveRecord::new("B"))
                .directive(DirectiveRecord::new("C")),
        );
        builder.add(Declaration::class("B").in_assembly("Y"));
        builder.add(Declaration::class("C").in_assembly("X"));
        let graph = builder.build().unwrap();

        let mut bag = DiagnosticBag::new();
        let outcome = run(&graph, &mut bag);
        assert!(!outcome.is_aborted(a));
        assert!(outcome.is_rejected(a, 0));
        assert!(!outcome.is_rejected(a, 1));
        assert_eq!(bag.codes(), vec![DiagnosticCode::CrossAssembly]);
    }

    fn constrained_graph() -> SymbolGraph {
        let strict = GenericConstraints {
            value_type: true,
            types: vec!["IComparable".to_string()],
            ..GenericConstraints::default()
        };
        let mut builder = GraphBuilder::new();
        builder.add(
            Declaration::class("A")
                .partial()
                .directive(DirectiveRecord::new("Pair<string, object>")),
        );
        builder.add(
            Declaration::class("Pair")
                .generic(GenericParameter::new("K").with_constraints(strict.clone()))
                .generic(GenericParameter::new("V").with_constraints(strict)),
        );
        builder.build().unwrap()
    }

    #[test]
    fn every_constraint_violation_is_reported() {
        let graph = constrained_graph();
        let mut bag = DiagnosticBag::new();
        let outcome = run(&graph, &mut bag);
        assert!(outcome.is_rejected(DeclId::from_raw(0), 0));
        // two clauses unmet for each of the two arguments
        assert_eq!(
            bag.codes(),
            vec![DiagnosticCode::TypeArgumentConstraintViolation; 4]
        );
    }

    #[test]
    fn quiet_mode_short_circuits_but_keeps_the_verdict() {
        let graph = constrained_graph();
        let mut flag = FailureFlag::new();
        let outcome = run(&graph, &mut flag);
        assert!(outcome.is_rejected(DeclId::from_raw(0), 0));
        assert!(flag.has_errors());
    }

    #[test]
    fn reference_constraint_accepts_string() {
        let mut builder = GraphBuilder::new();
        builder.add(
            Declaration::class("A")
                .partial()
                .generic(GenericParameter::new("T"))
                .directive(DirectiveRecord::new("Box<string>")),
        );
        builder.add(Declaration::class("Box").generic(GenericParameter::new("U").with_constraints(
            GenericConstraints {
                reference_type: true,
                ..GenericConstraints::default()
            },
        )));
        let graph = builder.build().unwrap();

        let mut bag = DiagnosticBag::new();
        let outcome = run(&graph, &mut bag);
        assert!(bag.is_empty());
        assert!(outcome.rejected.is_empty());
    }

    #[test]
    fn constraint_types_see_through_substitution() {
        let parameter = GenericParameter::new("T").with_constraints(GenericConstraints {
            types: vec!["IEquatable<T>".to_string()],
            ..GenericConstraints::default()
        });
        let facts = TypeFacts {
            rendered: "Money".to_string(),
            reference_type: true,
            supertypes: vec!["IEquatable<Money>".to_string()],
            known: true,
            ..TypeFacts::default()
        };
        let substitutions = HashMap::from([("T".to_string(), "Money".to_string())]);
        assert!(check_constraints(&parameter, &facts, &substitutions, false).is_empty());
    }
}
