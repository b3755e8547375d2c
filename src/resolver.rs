//! # Target Resolver
//!
//! Resolves a directive's raw type reference to the declaration it names,
//! from the point of view of the requestor, and describes type arguments
//! well enough to check generic constraints against them.

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::directive::{parse_directive, CopyDirective, SourceReference};
use crate::model::{Accessibility, DeclId, DeclKind, GenericConstraints, SymbolGraph};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no type named '{reference}' could be found")]
    Unresolvable { reference: String },

    #[error("'{reference}' is ambiguous between {}", candidates.join(", "))]
    Ambiguous {
        reference: String,
        candidates: Vec<String>,
    },

    #[error("'{candidate}' is inaccessible from '{requestor}'")]
    Inaccessible { candidate: String, requestor: String },

    #[error("'{candidate}' is {kind} and cannot be used as a copy source")]
    WrongKind { candidate: String, kind: &'static str },
}

impl ResolveError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            ResolveError::Unresolvable { .. } => DiagnosticCode::Unresolvable,
            ResolveError::Ambiguous { .. } => DiagnosticCode::Ambiguous,
            ResolveError::Inaccessible { .. } => DiagnosticCode::Inaccessible,
            ResolveError::WrongKind { .. } => DiagnosticCode::WrongKind,
        }
    }
}

/// A directive whose source reference resolved to a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDirective {
    pub directive: CopyDirective,
    pub source: DeclId,
}

impl ResolvedDirective {
    pub fn type_arguments(&self) -> &[String] {
        &self.directive.source.type_arguments
    }
}

/// What is known about a type argument when checking constraints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeFacts {
    pub rendered: String,
    pub reference_type: bool,
    pub value_type: bool,
    pub unmanaged: bool,
    pub nullable: bool,
    /// Base classes and interfaces, transitively
    pub supertypes: Vec<String>,
    /// False for types the graph knows nothing about
    pub known: bool,
}

const UNMANAGED_KEYWORDS: &[&str] = &[
    "bool", "byte", "sbyte", "char", "decimal", "double", "float", "int", "uint", "long", "ulong",
    "short", "ushort", "nint", "nuint",
];

const REFERENCE_KEYWORDS: &[&str] = &["string", "object", "dynamic"];

/// Read-only resolution queries over a [`SymbolGraph`]
pub struct TargetResolver<'a> {
    graph: &'a SymbolGraph,
}

impl<'a> TargetResolver<'a> {
    pub fn new(graph: &'a SymbolGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &'a SymbolGraph {
        self.graph
    }

    /// Resolve `reference` as seen from `requestor`.
    ///
    /// The most accessible candidate wins; several candidates sharing the
    /// highest accessibility are ambiguous unless exactly one of them lives
    /// in the requestor's namespace. Only when nothing is accessible
    /// does an inaccessible candidate surface as an error.
    pub fn resolve(
        &self,
        requestor: DeclId,
        reference: &SourceReference,
    ) -> Result<DeclId, ResolveError> {
        let candidates = self.graph.find_by_name(&reference.name, reference.arity());
        if candidates.is_empty() {
            return Err(ResolveError::Unresolvable {
                reference: reference.to_string(),
            });
        }

        let (copyable, wrong_kind): (Vec<DeclId>, Vec<DeclId>) = candidates
            .into_iter()
            .partition(|id| self.graph.declaration(*id).kind.supports_member_copy());

        if copyable.is_empty() {
            let candidate = wrong_kind[0];
            return Err(ResolveError::WrongKind {
                candidate: self.graph.display_name(candidate),
                kind: self.graph.declaration(candidate).kind.keyword(),
            });
        }

        let accessible: Vec<(DeclId, Accessibility)> = copyable
            .iter()
            .filter(|id| self.is_accessible(requestor, **id))
            .map(|id| (*id, self.effective_accessibility(*id)))
            .collect();

        let Some(best) = accessible.iter().map(|(_, access)| *access).max() else {
            return Err(ResolveError::Inaccessible {
                candidate: self.graph.display_name(copyable[0]),
                requestor: self.graph.display_name(requestor),
            });
        };

        let winners: Vec<DeclId> = accessible
            .iter()
            .filter(|(_, access)| *access == best)
            .map(|(id, _)| *id)
            .collect();

        if winners.len() > 1 {
            // the requestor's own namespace shadows the others
            let home = self.graph.namespace_of(requestor);
            let local: Vec<DeclId> = winners
                .iter()
                .copied()
                .filter(|id| self.graph.namespace_of(*id) == home)
                .collect();
            if let [only] = local.as_slice() {
                return Ok(*only);
            }
            return Err(ResolveError::Ambiguous {
                reference: reference.to_string(),
                candidates: winners.iter().map(|id| self.graph.display_name(*id)).collect(),
            });
        }

        Ok(winners[0])
    }

    /// Least accessibility along the containing chain
    pub fn effective_accessibility(&self, id: DeclId) -> Accessibility {
        std::iter::once(id)
            .chain(self.graph.containing_chain(id))
            .map(|decl| self.graph.declaration(decl).accessibility)
            .min()
            .unwrap_or(Accessibility::Public)
    }

    /// Whether `target` and every declaration containing it are visible
    /// from `from`
    pub fn is_accessible(&self, from: DeclId, target: DeclId) -> bool {
        std::iter::once(target)
            .chain(self.graph.containing_chain(target))
            .all(|decl| self.declared_accessible(from, decl))
    }

    fn declared_accessible(&self, from: DeclId, target: DeclId) -> bool {
        let declaration = self.graph.declaration(target);
        let same_assembly = self.graph.declaration(from).assembly == declaration.assembly;
        match (declaration.accessibility, declaration.containing) {
            (Accessibility::Public, _) => true,
            (Accessibility::Internal, _) => same_assembly,
            // top-level private/protected types behave as internal
            (_, None) => same_assembly,
            (Accessibility::Private, Some(container)) => self.graph.is_within(from, container),
            (Accessibility::Protected, Some(container)) => {
                self.graph.is_within(from, container)
                    || std::iter::once(from)
                        .chain(self.graph.containing_chain(from))
                        .any(|decl| self.derives_from(decl, container))
            }
        }
    }

    /// Walk base types through the graph
    pub fn derives_from(&self, id: DeclId, ancestor: DeclId) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(id);
        while let Some(decl) = current {
            if !seen.insert(decl) {
                return false;
            }
            current = self
                .graph
                .declaration(decl)
                .base_type
                .as_deref()
                .and_then(|base| self.lookup_type(decl, base));
            if current == Some(ancestor) {
                return true;
            }
        }
        false
    }

    /// Best-effort lookup of a rendered type name such as a base type.
    ///
    /// Ignores accessibility so it can be used while checking it; when the
    /// name is not unique, a candidate from the context's assembly wins.
    pub fn lookup_type(&self, context: DeclId, rendered: &str) -> Option<DeclId> {
        let (name, arguments) = split_generic(rendered);
        let candidates = self.graph.find_by_name(name, arguments.len());
        if candidates.len() == 1 {
            return Some(candidates[0]);
        }
        let assembly = &self.graph.declaration(context).assembly;
        let local: Vec<DeclId> = candidates
            .into_iter()
            .filter(|id| &self.graph.declaration(*id).assembly == assembly)
            .collect();
        (local.len() == 1).then(|| local[0])
    }

    /// Describe a type argument written in `requestor`'s context
    pub fn type_facts(&self, requestor: DeclId, argument: &str) -> TypeFacts {
        let argument = argument.trim();

        if argument.ends_with("[]") {
            return TypeFacts {
                rendered: argument.to_string(),
                reference_type: true,
                supertypes: vec!["System.Array".to_string(), "object".to_string()],
                known: true,
                ..TypeFacts::default()
            };
        }

        if let Some(underlying) = argument.strip_suffix('?') {
            let inner = self.type_facts(requestor, underlying);
            return TypeFacts {
                rendered: argument.to_string(),
                reference_type: inner.reference_type,
                // Nullable<T> satisfies neither `struct` nor `unmanaged`
                value_type: false,
                unmanaged: false,
                nullable: true,
                supertypes: inner.supertypes,
                known: inner.known,
            };
        }

        if UNMANAGED_KEYWORDS.contains(&argument) {
            return TypeFacts {
                rendered: argument.to_string(),
                value_type: true,
                unmanaged: true,
                supertypes: vec!["System.ValueType".to_string(), "object".to_string()],
                known: true,
                ..TypeFacts::default()
            };
        }

        if REFERENCE_KEYWORDS.contains(&argument) {
            return TypeFacts {
                rendered: argument.to_string(),
                reference_type: true,
                supertypes: vec!["object".to_string()],
                known: true,
                ..TypeFacts::default()
            };
        }

        if let Some(parameter) = self
            .graph
            .declaration(requestor)
            .generic_parameters
            .iter()
            .find(|parameter| parameter.name == argument)
        {
            return self.parameter_facts(argument, &parameter.constraints);
        }

        match self.lookup_type(requestor, argument) {
            Some(decl) => self.declaration_facts(argument, decl),
            None => TypeFacts {
                rendered: argument.to_string(),
                known: false,
                ..TypeFacts::default()
            },
        }
    }

    fn parameter_facts(&self, rendered: &str, constraints: &GenericConstraints) -> TypeFacts {
        let value_type = constraints.value_type || constraints.unmanaged;
        let reference_type = constraints.reference_type;
        TypeFacts {
            rendered: rendered.to_string(),
            reference_type,
            value_type,
            unmanaged: constraints.unmanaged,
            nullable: !(constraints.not_null || value_type || reference_type),
            supertypes: constraints.types.clone(),
            known: true,
        }
    }

    fn declaration_facts(&self, rendered: &str, decl: DeclId) -> TypeFacts {
        let declaration = self.graph.declaration(decl);
        let mut supertypes = Vec::new();
        self.collect_supertypes(decl, &mut supertypes, &mut HashSet::new());
        TypeFacts {
            rendered: rendered.to_string(),
            reference_type: declaration.kind.is_reference_type(),
            value_type: declaration.kind.is_value_type(),
            unmanaged: self.is_unmanaged(decl, &mut HashSet::new()),
            nullable: false,
            supertypes,
            known: true,
        }
    }

    fn collect_supertypes(&self, decl: DeclId, out: &mut Vec<String>, seen: &mut HashSet<DeclId>) {
        if !seen.insert(decl) {
            return;
        }
        let declaration = self.graph.declaration(decl);
        for supertype in declaration.base_type.iter().chain(declaration.interfaces.iter()) {
            if !out.contains(supertype) {
                out.push(supertype.clone());
            }
            if let Some(parent) = self.lookup_type(decl, supertype) {
                self.collect_supertypes(parent, out, seen);
            }
        }
    }

    /// Enums and structs whose fields are all unmanaged
    fn is_unmanaged(&self, decl: DeclId, visiting: &mut HashSet<DeclId>) -> bool {
        let declaration = self.graph.declaration(decl);
        match declaration.kind {
            DeclKind::Enum => true,
            DeclKind::Struct | DeclKind::RecordStruct => {
                if !visiting.insert(decl) {
                    // a struct cannot contain itself by value
                    return false;
                }
                let unmanaged = declaration
                    .fragments
                    .iter()
                    .flat_map(|fragment| fragment.members.iter())
                    .filter(|member| member.kind == crate::model::MemberKind::Field)
                    .filter(|member| !member.modifiers.iter().any(|m| m == "static" || m == "const"))
                    .all(|member| {
                        let ty = member.ty.as_deref().unwrap_or_default().trim();
                        if UNMANAGED_KEYWORDS.contains(&ty) || ty.ends_with('*') {
                            return true;
                        }
                        match self.lookup_type(decl, ty) {
                            Some(field_type) => self.is_unmanaged(field_type, visiting),
                            None => false,
                        }
                    });
                visiting.remove(&decl);
                unmanaged
            }
            _ => false,
        }
    }
}

/// Split `List<int>` into `("List", ["int"])`
pub fn split_generic(rendered: &str) -> (&str, Vec<String>) {
    let rendered = rendered.trim();
    match (rendered.find('<'), rendered.ends_with('>')) {
        (Some(open), true) => {
            let inner = &rendered[open + 1..rendered.len() - 1];
            let arguments = crate::directive::split_type_arguments(inner).unwrap_or_default();
            (rendered[..open].trim(), arguments)
        }
        _ => (rendered, Vec::new()),
    }
}

/// Parse and resolve every directive of `requestor`, reporting records that
/// are malformed or name nothing usable.
pub fn resolve_directives(
    resolver: &TargetResolver<'_>,
    requestor: DeclId,
    sink: &mut dyn DiagnosticSink,
) -> Vec<ResolvedDirective> {
    let graph = resolver.graph();
    let declaration = graph.declaration(requestor);
    let requestor_name = graph.display_name(requestor);
    let mut resolved = Vec::new();

    for (index, record) in declaration.directives.iter().enumerate() {
        let directive = match parse_directive(index, record) {
            Ok(directive) => directive,
            Err(err) => {
                sink.report(
                    Diagnostic::new(
                        DiagnosticCode::MalformedDirective,
                        format!("copy directive '{}' is malformed: {}", record.source, err),
                    )
                    .for_requestor(requestor_name.clone())
                    .at(record.location.clone()),
                );
                continue;
            }
        };

        match resolver.resolve(requestor, &directive.source) {
            Ok(source) => {
                tracing::debug!(
                    "[TCG] {} -> {} resolved to {}",
                    requestor_name,
                    directive.source,
                    graph.display_name(source)
                );
                resolved.push(ResolvedDirective { directive, source });
            }
            Err(err) => {
                sink.report(
                    Diagnostic::new(err.code(), err.to_string())
                        .for_requestor(requestor_name.clone())
                        .at(directive.location.clone()),
                );
            }
        }
    }

    resolved
}
