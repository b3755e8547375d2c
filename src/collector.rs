//! # Directive Collector
//!
//! Turns a requestor's validated directives into the ordered plan the
//! transplantation engine consumes: duplicates collapsed, partial parts
//! located, impossible additional constructs pruned, patterns compiled.

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::directive::AdditionalConstructs;
use crate::model::{DeclId, SymbolGraph};
use crate::pattern::PatternSet;
use crate::resolver::ResolvedDirective;
use crate::validator::ValidationOutcome;
use std::collections::HashMap;

/// A directive ready for transplantation
#[derive(Debug, Clone)]
pub struct CollectedDirective {
    pub resolved: ResolvedDirective,
    /// Index of the fragment picked by the partial-part selector
    pub fragment: Option<usize>,
    /// Additional constructs left after pruning
    pub constructs: AdditionalConstructs,
}

impl CollectedDirective {
    pub fn source(&self) -> DeclId {
        self.resolved.source
    }
}

/// Everything needed to synthesize one requestor's output
#[derive(Debug, Clone)]
pub struct RequestorPlan {
    pub requestor: DeclId,
    pub directives: Vec<CollectedDirective>,
    pub patterns: PatternSet,
}

pub struct DirectiveCollector<'a> {
    graph: &'a SymbolGraph,
}

impl<'a> DirectiveCollector<'a> {
    pub fn new(graph: &'a SymbolGraph) -> Self {
        Self { graph }
    }

    /// Build the plan for `requestor`, or `None` when it must not produce
    /// output at all.
    pub fn collect(
        &self,
        requestor: DeclId,
        resolved: &[ResolvedDirective],
        outcome: &ValidationOutcome,
        sink: &mut dyn DiagnosticSink,
    ) -> Option<RequestorPlan> {
        if outcome.is_aborted(requestor) {
            return None;
        }
        if !self.check_partial(requestor, sink) {
            return None;
        }

        let requestor_name = self.graph.display_name(requestor);
        let mut seen: HashMap<(DeclId, Option<String>), usize> = HashMap::new();
        let mut directives = Vec::new();

        for directive in resolved {
            let index = directive.directive.index;
            if outcome.is_rejected(requestor, index) {
                continue;
            }

            let key = (directive.source, directive.directive.partial_part.clone());
            if let Some(first) = seen.get(&key) {
                sink.report(
                    Diagnostic::new(
                        DiagnosticCode::EquivalentTarget,
                        format!(
                            "directive #{} copies the same members from '{}' as directive #{} and is ignored",
                            index,
                            self.graph.display_name(directive.source),
                            first
                        ),
                    )
                    .for_requestor(requestor_name.clone())
                    .at(directive.directive.location.clone()),
                );
                continue;
            }
            seen.insert(key, index);

            let fragment = match &directive.directive.partial_part {
                Some(part) => match self.find_part(directive.source, part) {
                    Some(fragment) => Some(fragment),
                    None => {
                        sink.report(
                            Diagnostic::new(
                                DiagnosticCode::UnknownPartialPartName,
                                format!(
                                    "'{}' has no partial part named '{}'",
                                    self.graph.display_name(directive.source),
                                    part
                                ),
                            )
                            .for_requestor(requestor_name.clone())
                            .at(directive.directive.location.clone()),
                        );
                        continue;
                    }
                },
                None => None,
            };

            let constructs = self.prune_constructs(requestor, directive, sink);
            directives.push(CollectedDirective {
                resolved: directive.clone(),
                fragment,
                constructs,
            });
        }

        // stable: equal priorities keep declaration order
        directives.sort_by_key(|collected| collected.resolved.directive.order);

        let patterns = PatternSet::from_records(
            &self.graph.declaration(requestor).patterns,
            &requestor_name,
            sink,
        );

        tracing::debug!(
            "[TCG] {}: {} directive(s), {} pattern(s)",
            requestor_name,
            directives.len(),
            patterns.len()
        );

        Some(RequestorPlan {
            requestor,
            directives,
            patterns,
        })
    }

    /// The requestor and all of its containers must be partial
    fn check_partial(&self, requestor: DeclId, sink: &mut dyn DiagnosticSink) -> bool {
        let name = self.graph.display_name(requestor);
        if !self.graph.declaration(requestor).is_partial {
            sink.report(
                Diagnostic::new(
                    DiagnosticCode::NotPartial,
                    format!("'{name}' must be declared partial to receive copied members"),
                )
                .for_requestor(name),
            );
            return false;
        }
        for container in self.graph.containing_chain(requestor) {
            if !self.graph.declaration(container).is_partial {
                sink.report(
                    Diagnostic::new(
                        DiagnosticCode::ContainingTypeNotPartial,
                        format!(
                            "containing type '{}' of '{}' must be declared partial",
                            self.graph.display_name(container),
                            name
                        ),
                    )
                    .for_requestor(name),
                );
                return false;
            }
        }
        true
    }

    fn find_part(&self, source: DeclId, part: &str) -> Option<usize> {
        self.graph
            .declaration(source)
            .source_fragments()
            .find(|(_, fragment)| fragment.part_name.as_deref() == Some(part))
            .map(|(index, _)| index)
    }

    /// Drop constructs that cannot apply to this source/requestor pair,
    /// explaining why only when the sink wants detail.
    fn prune_constructs(
        &self,
        requestor: DeclId,
        directive: &ResolvedDirective,
        sink: &mut dyn DiagnosticSink,
    ) -> AdditionalConstructs {
        let requested = directive.directive.constructs;
        let mut kept = requested;
        for flag in requested.iter() {
            if let Some(reason) = self.inapplicable(requestor, directive, flag) {
                kept.remove(flag);
                if sink.is_detailed() {
                    sink.report(
                        Diagnostic::new(
                            DiagnosticCode::AdditionalConstructNotApplicable,
                            format!("{flag} of '{}' will not be copied: {reason}", self.graph.display_name(directive.source)),
                        )
                        .for_requestor(self.graph.display_name(requestor))
                        .at(directive.directive.location.clone()),
                    );
                }
            }
        }
        kept
    }

    fn inapplicable(
        &self,
        requestor: DeclId,
        directive: &ResolvedDirective,
        flag: AdditionalConstructs,
    ) -> Option<&'static str> {
        let source = self.graph.declaration(directive.source);
        let target = self.graph.declaration(requestor);

        if flag == AdditionalConstructs::DOCUMENTATION {
            source
                .documentation
                .is_none()
                .then_some("the source has no documentation")
        } else if flag == AdditionalConstructs::ATTRIBUTES {
            source
                .attributes
                .is_empty()
                .then_some("the source has no attributes")
        } else if flag == AdditionalConstructs::BASE_TYPE {
            if source.base_type.is_none() {
                Some("the source has no base type")
            } else if !target.kind.can_have_base_class() {
                Some("the requestor cannot declare a base class")
            } else {
                None
            }
        } else if flag == AdditionalConstructs::BASE_INTERFACES {
            source
                .interfaces
                .is_empty()
                .then_some("the source implements no interfaces")
        } else if flag == AdditionalConstructs::CONSTRAINTS {
            if !source.is_generic() {
                Some("the source is not generic")
            } else if directive.directive.source.is_closed_generic() {
                Some("type arguments were supplied for the source")
            } else if source.arity() != target.arity() {
                Some("the requestor's generic arity differs from the source's")
            } else if source
                .generic_parameters
                .iter()
                .all(|parameter| parameter.constraints.is_empty())
            {
                Some("the source declares no constraints")
            } else {
                None
            }
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticBag, FailureFlag};
    use crate::directive::DirectiveRecord;
    use crate::model::{
        Declaration, DeclKind, Fragment, GenericConstraints, GenericParameter, GraphBuilder,
        SourceLocation,
    };
    use crate::resolver::{resolve_directives, TargetResolver};
    use crate::validator::DependencyValidator;
    use indexmap::IndexMap;

    fn plan_for(graph: &SymbolGraph, requestor: DeclId, sink: &mut dyn DiagnosticSink) -> Option<RequestorPlan> {
        let resolver = TargetResolver::new(graph);
        let mut resolved = IndexMap::new();
        for id in graph.requestors() {
            resolved.insert(id, resolve_directives(&resolver, id, sink));
        }
        let outcome = DependencyValidator::new(&resolver).validate(&resolved, sink);
        DirectiveCollector::new(graph).collect(requestor, &resolved[&requestor], &outcome, sink)
    }

    fn fragment(path: &str) -> Fragment {
        Fragment::new(SourceLocation::new(path, 0, 1))
    }

    #[test]
    fn orders_by_priority_and_collapses_duplicates() {
        let mut builder = GraphBuilder::new();
        let widget = builder.add(
            Declaration::class("Widget")
                .partial()
                .directive(DirectiveRecord::new("C").order(3))
                .directive(DirectiveRecord::new("A").order(1))
                .directive(DirectiveRecord::new("B").order(2))
                .directive(DirectiveRecord::new("A").order(0)),
        );
        for name in ["A", "B", "C"] {
            builder.add(Declaration::class(name));
        }
        let graph = builder.build().unwrap();

        let mut bag = DiagnosticBag::new();
        let plan = plan_for(&graph, widget, &mut bag).unwrap();
        let order: Vec<&str> = plan
            .directives
            .iter()
            .map(|d| graph.declaration(d.source()).name.as_str())
            .collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(plan.directives[0].resolved.directive.order, 1);
        assert_eq!(bag.codes(), vec![DiagnosticCode::EquivalentTarget]);
    }

    #[test]
    fn different_partial_parts_are_not_duplicates() {
        let mut builder = GraphBuilder::new();
        let widget = builder.add(
            Declaration::class("Widget")
                .partial()
                .directive(DirectiveRecord::new("Template").partial_part("Core"))
                .directive(DirectiveRecord::new("Template").partial_part("Extras"))
                .directive(DirectiveRecord::new("Template").partial_part("Missing")),
        );
        builder.add(
            Declaration::class("Template")
                .partial()
                .fragment(fragment("Core.cs").part("Core"))
                .fragment(fragment("Extras.cs").part("Extras")),
        );
        let graph = builder.build().unwrap();

        let mut bag = DiagnosticBag::new();
        let plan = plan_for(&graph, widget, &mut bag).unwrap();
        let fragments: Vec<Option<usize>> = plan.directives.iter().map(|d| d.fragment).collect();
        assert_eq!(fragments, vec![Some(0), Some(1)]);
        assert_eq!(bag.codes(), vec![DiagnosticCode::UnknownPartialPartName]);
    }

    #[test]
    fn non_partial_requestor_or_container_aborts() {
        let mut builder = GraphBuilder::new();
        let plain = builder.add(Declaration::class("Plain").directive(DirectiveRecord::new("T1")));
        let outer = builder.add(Declaration::class("Outer"));
        let nested = builder.add_nested(
            outer,
            Declaration::class("Nested").partial().directive(DirectiveRecord::new("T1")),
        );
        builder.add(Declaration::class("T1"));
        let graph = builder.build().unwrap();

        let mut bag = DiagnosticBag::new();
        assert!(plan_for(&graph, plain, &mut bag).is_none());
        assert_eq!(bag.codes(), vec![DiagnosticCode::NotPartial]);

        let mut bag = DiagnosticBag::new();
        assert!(plan_for(&graph, nested, &mut bag).is_none());
        assert_eq!(bag.codes(), vec![DiagnosticCode::ContainingTypeNotPartial]);
    }

    fn pruning_graph() -> (SymbolGraph, DeclId) {
        let mut builder = GraphBuilder::new();
        let point = builder.add(
            Declaration::new("Point", DeclKind::Struct)
                .partial()
                .directive(
                    DirectiveRecord::new("Shape")
                        .constructs(AdditionalConstructs::ALL),
                ),
        );
        builder.add(
            Declaration::class("Shape")
                .base("ShapeBase")
                .implements("IShape")
                .documented("A shape."),
        );
        (builder.build().unwrap(), point)
    }

    #[test]
    fn verbose_mode_explains_pruned_constructs() {
        let (graph, point) = pruning_graph();
        let mut bag = DiagnosticBag::new();
        let plan = plan_for(&graph, point, &mut bag).unwrap();
        let constructs = plan.directives[0].constructs;
        assert!(constructs.contains(AdditionalConstructs::DOCUMENTATION));
        assert!(constructs.contains(AdditionalConstructs::BASE_INTERFACES));
        assert!(!constructs.contains(AdditionalConstructs::ATTRIBUTES));
        assert!(!constructs.contains(AdditionalConstructs::BASE_TYPE));
        assert!(!constructs.contains(AdditionalConstructs::CONSTRAINTS));
        assert_eq!(
            bag.codes(),
            vec![DiagnosticCode::AdditionalConstructNotApplicable; 3]
        );
    }

    #[test]
    fn fast_mode_prunes_silently() {
        let (graph, point) = pruning_graph();
        let mut flag = FailureFlag::new();
        let plan = plan_for(&graph, point, &mut flag).unwrap();
        assert!(!plan.directives[0].constructs.contains(AdditionalConstructs::BASE_TYPE));
        assert!(!flag.has_errors());
    }

    #[test]
    fn constraints_require_matching_open_generics() {
        let constrained = GenericParameter::new("T").with_constraints(GenericConstraints {
            reference_type: true,
            ..GenericConstraints::default()
        });
        let mut builder = GraphBuilder::new();
        let open = builder.add(
            Declaration::class("Open")
                .partial()
                .generic(GenericParameter::new("X"))
                .directive(DirectiveRecord::new("Box<>").constructs(AdditionalConstructs::CONSTRAINTS)),
        );
        let closed = builder.add(
            Declaration::class("Closed")
                .partial()
                .directive(DirectiveRecord::new("Box<string>").constructs(AdditionalConstructs::CONSTRAINTS)),
        );
        builder.add(Declaration::class("Box").generic(constrained));
        let graph = builder.build().unwrap();

        let mut bag = DiagnosticBag::new();
        let plan = plan_for(&graph, open, &mut bag).unwrap();
        assert!(plan.directives[0].constructs.contains(AdditionalConstructs::CONSTRAINTS));

        let plan = plan_for(&graph, closed, &mut bag).unwrap();
        assert!(plan.directives[0].constructs.is_empty());
    }
}
