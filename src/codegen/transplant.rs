//! # Transplantation Engine
//!
//! Copies the members of each planned source fragment into synthesized
//! fragments of the requestor.

use super::lexer::RewriteError;
use super::render::render_member;
use super::rewrite::{Rewriter, SelfTypeRewrite};
use crate::cancel::CancellationToken;
use crate::collector::{CollectedDirective, RequestorPlan};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::directive::AdditionalConstructs;
use crate::error::CopyError;
use crate::model::{DeclId, Declaration, Fragment, MemberKind, MemberSyntax, SourceLocation, SymbolGraph};
use crate::pattern::PatternSet;
use std::collections::HashMap;

/// Declaration-level constructs attached to a synthesized fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentHeader {
    pub documentation: Option<String>,
    pub attributes: Vec<String>,
    /// Base class first, then interfaces
    pub base_types: Vec<String>,
    /// One clause per constrained parameter, e.g. `T : class, new()`
    pub constraints: Vec<String>,
}

impl FragmentHeader {
    pub fn is_empty(&self) -> bool {
        self.documentation.is_none()
            && self.attributes.is_empty()
            && self.base_types.is_empty()
            && self.constraints.is_empty()
    }
}

/// Members copied from one source fragment, ready for emission
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedFragment {
    /// `Name`, `Name_1`, ... in the source's fragment order
    pub chunk: String,
    pub source: DeclId,
    /// Index of the directive record that produced this fragment
    pub directive: usize,
    pub header: FragmentHeader,
    /// Rendered member text, after renaming, substitution and patterns
    pub members: Vec<String>,
    pub imports: Vec<String>,
    pub origin: SourceLocation,
}

/// Per-directive rewriting state
struct CopyContext<'a> {
    source: &'a Declaration,
    requestor: &'a Declaration,
    substitutions: HashMap<String, String>,
    self_type: Option<SelfTypeRewrite>,
    handle_special_members: bool,
}

impl<'a> CopyContext<'a> {
    fn new(graph: &'a SymbolGraph, requestor: DeclId, directive: &CollectedDirective) -> Self {
        let source = graph.declaration(directive.source());
        let requestor = graph.declaration(requestor);
        let copy = &directive.resolved.directive;

        // closed copies bind arguments; open copies of equal arity rename
        // source parameters to the requestor's, position by position
        let substitutions = if copy.source.is_closed_generic() {
            source
                .generic_parameters
                .iter()
                .zip(&copy.source.type_arguments)
                .map(|(parameter, argument)| (parameter.name.clone(), argument.clone()))
                .collect()
        } else if source.arity() == requestor.arity() {
            source
                .generic_parameters
                .iter()
                .zip(&requestor.generic_parameters)
                .filter(|(from, to)| from.name != to.name)
                .map(|(from, to)| (from.name.clone(), to.name.clone()))
                .collect()
        } else {
            HashMap::new()
        };

        let self_type = copy.handle_special_members.then(|| SelfTypeRewrite {
            source_name: source.name.clone(),
            arity: source.arity(),
            replacement: requestor.self_type(),
        });

        Self {
            source,
            requestor,
            substitutions,
            self_type,
            handle_special_members: copy.handle_special_members,
        }
    }

    /// Split field-like members into one member per symbol, dropping
    /// excluded symbols and attaching symbol attributes
    fn split(&self, member: &MemberSyntax) -> Vec<MemberSyntax> {
        if member.kind.is_field_like() && !member.declarators.is_empty() {
            return member
                .declarators
                .iter()
                .filter_map(|declarator| {
                    let symbol = self.source.member_symbol(&declarator.name);
                    if symbol.is_some_and(|symbol| symbol.exclude_from_copy) {
                        return None;
                    }
                    let mut single = member.clone();
                    single.declarators = vec![declarator.clone()];
                    if let Some(symbol) = symbol {
                        single.attributes.extend(symbol.attributes.iter().cloned());
                    }
                    Some(single)
                })
                .collect();
        }

        let symbol = if member.name.is_empty() {
            None
        } else {
            self.source.member_symbol(&member.name)
        };
        match symbol {
            Some(symbol) if symbol.exclude_from_copy => Vec::new(),
            Some(symbol) => {
                let mut copy = member.clone();
                copy.attributes.extend(symbol.attributes.iter().cloned());
                vec![copy]
            }
            None => vec![member.clone()],
        }
    }

    fn rewrite(&self, mut member: MemberSyntax) -> Result<MemberSyntax, RewriteError> {
        let special = self.handle_special_members && member.kind.is_special();
        let self_type = if special { self.self_type.as_ref() } else { None };

        let signature = Rewriter::new(&self.substitutions)
            .with_self_type(self_type)
            .shadowing(member.type_parameters.iter().cloned());
        let statements = Rewriter::new(&self.substitutions)
            .shadowing(member.type_parameters.iter().cloned())
            .shadowing(member.parameters.iter().map(|parameter| parameter.name.clone()))
            .tracking_locals();

        for attribute in &mut member.attributes {
            *attribute = signature.rewrite(attribute)?;
        }
        if let Some(ty) = &member.ty {
            member.ty = Some(signature.rewrite(ty)?);
        }
        for clause in &mut member.constraints {
            *clause = signature.rewrite(clause)?;
        }
        for parameter in &mut member.parameters {
            parameter.ty = signature.rewrite(&parameter.ty)?;
            if let Some(default) = &parameter.default {
                parameter.default = Some(statements.rewrite(default)?);
            }
        }
        for declarator in &mut member.declarators {
            if let Some(initializer) = &declarator.initializer {
                declarator.initializer = Some(statements.rewrite(initializer)?);
            }
        }
        if let Some(initializer) = &member.initializer {
            member.initializer = Some(statements.rewrite(initializer)?);
        }
        if let Some(body) = &member.body {
            member.body = Some(statements.rewrite(body)?);
        }

        if special && matches!(member.kind, MemberKind::Constructor | MemberKind::Destructor) {
            member.name = self.requestor.name.clone();
        }
        Ok(member)
    }

    /// Type text in declaration headers; unparsable text is kept as written
    fn rewrite_type(&self, text: &str) -> String {
        Rewriter::new(&self.substitutions)
            .with_self_type(self.self_type.as_ref())
            .rewrite(text)
            .unwrap_or_else(|_| text.to_string())
    }

    fn header(&self, constructs: AdditionalConstructs) -> FragmentHeader {
        let mut header = FragmentHeader::default();
        if constructs.contains(AdditionalConstructs::DOCUMENTATION) {
            header.documentation = self.source.documentation.clone();
        }
        if constructs.contains(AdditionalConstructs::ATTRIBUTES) {
            header.attributes = self
                .source
                .attributes
                .iter()
                .map(|attribute| self.rewrite_type(attribute))
                .collect();
        }
        if constructs.contains(AdditionalConstructs::BASE_TYPE) {
            header
                .base_types
                .extend(self.source.base_type.iter().map(|base| self.rewrite_type(base)));
        }
        if constructs.contains(AdditionalConstructs::BASE_INTERFACES) {
            header.base_types.extend(
                self.source
                    .interfaces
                    .iter()
                    .map(|interface| self.rewrite_type(interface)),
            );
        }
        if constructs.contains(AdditionalConstructs::CONSTRAINTS) {
            let renamer = Rewriter::new(&self.substitutions);
            for (from, to) in self
                .source
                .generic_parameters
                .iter()
                .zip(&self.requestor.generic_parameters)
            {
                if from.constraints.is_empty() {
                    continue;
                }
                let clauses: Vec<String> = from
                    .constraints
                    .clauses()
                    .iter()
                    .map(|clause| renamer.rewrite(clause).unwrap_or_else(|_| clause.clone()))
                    .collect();
                header
                    .constraints
                    .push(format!("{} : {}", to.name, clauses.join(", ")));
            }
        }
        header
    }
}

/// Copies members for one requestor at a time
pub struct TransplantEngine<'a> {
    graph: &'a SymbolGraph,
    cancellation: &'a CancellationToken,
}

impl<'a> TransplantEngine<'a> {
    pub fn new(graph: &'a SymbolGraph, cancellation: &'a CancellationToken) -> Self {
        Self {
            graph,
            cancellation,
        }
    }

    /// Synthesize the fragments of one requestor plan.
    ///
    /// Only cancellation fails the whole plan; a member that cannot be
    /// rewritten is reported and skipped.
    pub fn transplant(
        &self,
        plan: &RequestorPlan,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Vec<SynthesizedFragment>, CopyError> {
        let requestor_name = self.graph.display_name(plan.requestor);
        let mut attached = AdditionalConstructs::NONE;
        let mut synthesized = Vec::new();

        for directive in &plan.directives {
            self.cancellation.check()?;
            let context = CopyContext::new(self.graph, plan.requestor, directive);

            let fragments: Vec<&Fragment> = match directive.fragment {
                Some(index) => context.source.fragments.get(index).into_iter().collect(),
                None => context
                    .source
                    .source_fragments()
                    .map(|(_, fragment)| fragment)
                    .collect(),
            };
            tracing::debug!(
                "[TCG] {} <- {}: {} fragment(s)",
                requestor_name,
                self.graph.display_name(directive.source()),
                fragments.len()
            );

            for (position, fragment) in fragments.into_iter().enumerate() {
                let chunk = if position == 0 {
                    context.source.name.clone()
                } else {
                    format!("{}_{}", context.source.name, position)
                };

                let pending = directive.constructs.difference(attached);
                attached = attached.union(pending);
                let header = context.header(pending);

                let members =
                    self.copy_members(&context, fragment, &plan.patterns, &requestor_name, sink)?;

                let mut imports: Vec<String> = fragment
                    .imports
                    .iter()
                    .chain(&directive.resolved.directive.required_imports)
                    .cloned()
                    .collect();
                imports.sort();
                imports.dedup();

                synthesized.push(SynthesizedFragment {
                    chunk,
                    source: directive.source(),
                    directive: directive.resolved.directive.index,
                    header,
                    members,
                    imports,
                    origin: fragment.location.clone(),
                });
            }
        }

        Ok(synthesized)
    }

    fn copy_members(
        &self,
        context: &CopyContext<'_>,
        fragment: &Fragment,
        patterns: &PatternSet,
        requestor_name: &str,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Vec<String>, CopyError> {
        let mut members = Vec::new();
        for member in &fragment.members {
            self.cancellation.check()?;
            for copy in context.split(member) {
                let name = copy.symbol_names().join(", ");
                match context.rewrite(copy) {
                    Ok(rewritten) => members.push(patterns.apply(&render_member(&rewritten))),
                    Err(err) => {
                        tracing::warn!("[TCG] Skipping member '{}' of {}: {}", name, context.source.name, err);
                        sink.report(
                            Diagnostic::new(
                                DiagnosticCode::MemberTransplantFailed,
                                format!(
                                    "member '{}' of '{}' could not be copied: {}",
                                    name, context.source.name, err
                                ),
                            )
                            .for_requestor(requestor_name)
                            .at(Some(fragment.location.clone())),
                        );
                    }
                }
            }
        }
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::DirectiveCollector;
    use crate::diagnostics::DiagnosticBag;
    use crate::directive::DirectiveRecord;
    use crate::model::{GenericConstraints, GenericParameter, GraphBuilder, MemberSymbol};
    use crate::resolver::{resolve_directives, TargetResolver};
    use crate::validator::DependencyValidator;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn transplant(graph: &SymbolGraph, requestor: DeclId) -> (Vec<SynthesizedFragment>, DiagnosticBag) {
        let mut bag = DiagnosticBag::new();
        let resolver = TargetResolver::new(graph);
        let mut resolved = IndexMap::new();
        for id in graph.requestors() {
            resolved.insert(id, resolve_directives(&resolver, id, &mut bag));
        }
        let outcome = DependencyValidator::new(&resolver).validate(&resolved, &mut bag);
        let plan = DirectiveCollector::new(graph)
            .collect(requestor, &resolved[&requestor], &outcome, &mut bag)
            .unwrap();
        let token = CancellationToken::new();
        let fragments = TransplantEngine::new(graph, &token)
            .transplant(&plan, &mut bag)
            .unwrap();
        (fragments, bag)
    }

    fn fragment(path: &str) -> Fragment {
        Fragment::new(SourceLocation::new(path, 0, 10))
    }

    #[test]
    fn renames_special_members_to_the_destination() {
        let mut builder = GraphBuilder::new();
        let price = builder.add(
            Declaration::structure("Price")
                .partial()
                .directive(DirectiveRecord::new("Money")),
        );
        builder.add(
            Declaration::structure("Money").fragment(
                fragment("Money.cs")
                    .member(
                        MemberSyntax::constructor("Money")
                            .modifier("public")
                            .param("decimal", "amount")
                            .body("{ Amount = amount; }"),
                    )
                    .member(
                        MemberSyntax::operator("Money", "+")
                            .modifier("public")
                            .modifier("static")
                            .param("Money", "a")
                            .param("Money", "b")
                            .body("=> new(a.Amount + b.Amount)"),
                    )
                    .member(
                        MemberSyntax::conversion(false, "Money")
                            .modifier("public")
                            .modifier("static")
                            .param("decimal", "amount")
                            .body("=> new(amount)"),
                    ),
            ),
        );
        let graph = builder.build().unwrap();

        let (fragments, bag) = transplant(&graph, price);
        assert!(bag.is_empty());
        assert_eq!(
            fragments[0].members,
            vec![
                "public Price(decimal amount) { Amount = amount; }".to_string(),
                "public static Price operator +(Price a, Price b) => new(a.Amount + b.Amount);".to_string(),
                "public static explicit operator Price(decimal amount) => new(amount);".to_string(),
            ]
        );
    }

    #[test]
    fn special_member_handling_can_be_disabled() {
        let mut builder = GraphBuilder::new();
        let price = builder.add(
            Declaration::class("Price")
                .partial()
                .directive(DirectiveRecord::new("Money").special_members(false)),
        );
        builder.add(Declaration::class("Money").fragment(
            fragment("Money.cs").member(MemberSyntax::constructor("Money").body("{ }")),
        ));
        let graph = builder.build().unwrap();
        let (fragments, _) = transplant(&graph, price);
        assert_eq!(fragments[0].members, vec!["Money() { }".to_string()]);
    }

    #[test]
    fn splits_field_symbols_and_honours_exclusions() {
        let mut builder = GraphBuilder::new();
        let widget = builder.add(
            Declaration::class("Widget")
                .partial()
                .directive(DirectiveRecord::new("Template")),
        );
        builder.add(
            Declaration::class("Template")
                .symbol(MemberSymbol::new("b").excluded())
                .symbol(MemberSymbol::new("c").attribute("NonSerialized"))
                .symbol(MemberSymbol::new("Helper").excluded())
                .fragment(
                    fragment("Template.cs")
                        .member(MemberSyntax::field("int", &["a", "b", "c"]).modifier("private"))
                        .member(MemberSyntax::method("void", "Helper").body("{ }")),
                ),
        );
        let graph = builder.build().unwrap();
        let (fragments, _) = transplant(&graph, widget);
        assert_eq!(
            fragments[0].members,
            vec![
                "private int a;".to_string(),
                "[NonSerialized]\nprivate int c;".to_string(),
            ]
        );
    }

    #[test]
    fn substitutes_type_arguments_outside_shadowing_scopes() {
        let mut builder = GraphBuilder::new();
        let ints = builder.add(
            Declaration::class("IntBag")
                .partial()
                .directive(DirectiveRecord::new("Bag<int>")),
        );
        builder.add(
            Declaration::class("Bag")
                .generic(GenericParameter::new("T"))
                .fragment(
                    fragment("Bag.cs")
                        .member(MemberSyntax::field("List<T>", &["items"]).modifier("private"))
                        .member(
                            MemberSyntax::method("T", "Convert")
                                .type_parameter("T")
                                .param("T", "value")
                                .body("=> value"),
                        )
                        .member(
                            MemberSyntax::method("void", "Add")
                                .param("T", "item")
                                .body("{ items.Add(item); var T = 0; Log(T); }"),
                        ),
                ),
        );
        let graph = builder.build().unwrap();
        let (fragments, _) = transplant(&graph, ints);
        assert_eq!(
            fragments[0].members,
            vec![
                "private List<int> items;".to_string(),
                "T Convert<T>(T value) => value;".to_string(),
                "void Add(int item) { items.Add(item); var T = 0; Log(T); }".to_string(),
            ]
        );
    }

    #[test]
    fn every_unselected_fragment_becomes_a_chunk() {
        let mut builder = GraphBuilder::new();
        let widget = builder.add(
            Declaration::class("Widget")
                .partial()
                .directive(DirectiveRecord::new("Template").import("System.Linq")),
        );
        let mut generated = fragment("Widget.Template.g.cs");
        generated.generated = true;
        builder.add(
            Declaration::class("Template")
                .fragment(fragment("A.cs").import("System"))
                .fragment(generated)
                .fragment(fragment("B.cs")),
        );
        let graph = builder.build().unwrap();
        let (fragments, _) = transplant(&graph, widget);
        let chunks: Vec<&str> = fragments.iter().map(|f| f.chunk.as_str()).collect();
        assert_eq!(chunks, vec!["Template", "Template_1", "Template_2"]);
        assert_eq!(fragments[0].imports, vec!["System", "System.Linq"]);
        assert_eq!(fragments[1].origin.path, "Widget.Template.g.cs");
        assert_eq!(fragments[2].origin.path, "B.cs");
    }

    #[test]
    fn additional_constructs_attach_once() {
        let constrained = GenericParameter::new("T").with_constraints(GenericConstraints {
            reference_type: true,
            types: vec!["IComparable<T>".to_string()],
            ..GenericConstraints::default()
        });
        let mut builder = GraphBuilder::new();
        let sorted = builder.add(
            Declaration::class("Sorted")
                .partial()
                .generic(GenericParameter::new("TItem"))
                .directive(DirectiveRecord::new("Ordered<>").constructs(AdditionalConstructs::ALL))
                .directive(DirectiveRecord::new("Named").constructs(AdditionalConstructs::DOCUMENTATION)),
        );
        builder.add(
            Declaration::class("Ordered")
                .generic(constrained)
                .documented("Ordered items.")
                .implements("IEnumerable<T>")
                .fragment(
                    fragment("Ordered.cs")
                        .member(MemberSyntax::method("T", "First").body("=> default"))
                        .member(
                            MemberSyntax::method("bool", "Contains")
                                .param("T", "item")
                                .body("{ List<T> seen = new(); return seen.Contains(item); }"),
                        ),
                ),
        );
        builder.add(
            Declaration::class("Named")
                .documented("Named.")
                .fragment(fragment("Named.cs")),
        );
        let graph = builder.build().unwrap();
        let (fragments, _) = transplant(&graph, sorted);

        let first = &fragments[0].header;
        assert_eq!(first.documentation.as_deref(), Some("Ordered items."));
        assert_eq!(first.base_types, vec!["IEnumerable<TItem>".to_string()]);
        assert_eq!(first.constraints, vec!["TItem : class, IComparable<TItem>".to_string()]);
        assert_eq!(
            fragments[0].members,
            vec![
                "TItem First() => default;".to_string(),
                "bool Contains(TItem item) { List<TItem> seen = new(); return seen.Contains(item); }"
                    .to_string(),
            ]
        );
        assert!(fragments[1].header.is_empty());
    }

    #[test]
    fn unlexable_members_are_reported_and_skipped() {
        let mut builder = GraphBuilder::new();
        let ints = builder.add(
            Declaration::class("IntBox")
                .partial()
                .directive(DirectiveRecord::new("Box<int>")),
        );
        builder.add(
            Declaration::class("Box")
                .generic(GenericParameter::new("T"))
                .fragment(
                    fragment("Box.cs")
                        .member(MemberSyntax::method("T", "Broken").body("{ return \"open; }"))
                        .member(MemberSyntax::property("T", "Value")),
                ),
        );
        let graph = builder.build().unwrap();
        let (fragments, bag) = transplant(&graph, ints);
        assert_eq!(fragments[0].members, vec!["int Value { get; set; }".to_string()]);
        assert_eq!(bag.codes(), vec![DiagnosticCode::MemberTransplantFailed]);
    }
}
