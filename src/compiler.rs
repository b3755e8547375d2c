//! # Generation Pass
//!
//! Main entry points for running the copy pipeline over a symbol graph.

use crate::cache::{fingerprint, CachedOutcome, ResultCache};
use crate::cancel::CancellationToken;
use crate::codegen::TransplantEngine;
use crate::collector::DirectiveCollector;
use crate::diagnostics::{sort_deterministic, Diagnostic, DiagnosticBag, DiagnosticSink, FailureFlag};
use crate::emit::{EmissionSink, OutputUnit};
use crate::error::CopyError;
use crate::model::{DeclId, SymbolGraph};
use crate::options::GeneratorOptions;
use crate::resolver::{resolve_directives, ResolvedDirective, TargetResolver};
use crate::validator::{DependencyValidator, ValidationOutcome};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Everything a pass produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub units: Vec<OutputUnit>,
    /// Sorted by requestor, location, code and message; empty in quiet mode
    pub diagnostics: Vec<Diagnostic>,
    /// Whether any error-severity finding was reported
    pub failed: bool,
    /// Set when the pass stopped early; `units` then holds only the
    /// requestors that completed
    pub cancelled: bool,
}

/// Host-provided collaborators of a pass
#[derive(Default)]
pub struct PassContext<'c> {
    pub cache: Option<&'c mut dyn ResultCache>,
    pub cancellation: CancellationToken,
}

impl<'c> PassContext<'c> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: &'c mut dyn ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

fn new_sink(detailed: bool) -> Box<dyn DiagnosticSink> {
    if detailed {
        Box::new(DiagnosticBag::new())
    } else {
        Box::new(FailureFlag::new())
    }
}

/// Run a pass with default options
///
/// # Examples
///
/// ```rust
/// use tcgen::{generate, Declaration, DirectiveRecord, Fragment, GraphBuilder, MemberSyntax, SourceLocation};
///
/// let mut builder = GraphBuilder::new();
/// builder.add(
///     Declaration::class("Widget")
///         .partial()
///         .directive(DirectiveRecord::new("Template")),
/// );
/// builder.add(Declaration::class("Template").fragment(
///     Fragment::new(SourceLocation::new("Template.cs", 0, 42))
///         .member(MemberSyntax::method("void", "Reset").modifier("public").body("{ }")),
/// ));
/// let graph = builder.build()?;
///
/// let output = generate(&graph)?;
/// assert!(!output.failed);
/// assert_eq!(output.units[0].hint_name, "Widget.Template.g.cs");
/// # Ok::<(), tcgen::CopyError>(())
/// ```
pub fn generate(graph: &SymbolGraph) -> Result<GenerationOutput, CopyError> {
    generate_with_options(graph, &GeneratorOptions::default())
}

/// Run a pass with explicit options and no cache
pub fn generate_with_options(
    graph: &SymbolGraph,
    options: &GeneratorOptions,
) -> Result<GenerationOutput, CopyError> {
    generate_with_context(graph, options, PassContext::default())
}

/// Run a pass with a result cache and/or a cancellation token.
///
/// Findings about the analyzed program are returned in the output; `Err` is
/// reserved for failures of the pass itself. Cancellation is not an error:
/// the output comes back with `cancelled` set and without any partial output
/// for the requestor that was interrupted.
pub fn generate_with_context(
    graph: &SymbolGraph,
    options: &GeneratorOptions,
    mut context: PassContext<'_>,
) -> Result<GenerationOutput, CopyError> {
    tracing::info!("[TCG] Starting trait copy generation");
    tracing::info!(
        "[TCG] Graph: {} declarations, {} requestors",
        graph.len(),
        graph.requestors().count()
    );

    let detailed = options.capabilities.diagnostics;
    let mut sink = new_sink(detailed);
    let mut output = GenerationOutput::default();

    // Phase 1: Resolve every directive of every requestor
    tracing::info!("[TCG] Phase 1: Resolving copy directives...");
    let resolver = TargetResolver::new(graph);
    let mut resolved: IndexMap<DeclId, Vec<ResolvedDirective>> = IndexMap::new();
    for requestor in graph.requestors() {
        resolved.insert(requestor, resolve_directives(&resolver, requestor, &mut *sink));
    }
    tracing::info!(
        "[TCG] Resolved {} directive(s)",
        resolved.values().map(Vec::len).sum::<usize>()
    );

    if context.cancellation.is_cancelled() {
        return Ok(finish(output, sink.as_mut(), true));
    }

    // Phase 2: Whole-graph validation
    tracing::info!("[TCG] Phase 2: Validating dependencies...");
    let outcome = DependencyValidator::new(&resolver).validate(&resolved, &mut *sink);
    for (requestor, code) in &outcome.aborted {
        tracing::warn!(
            "[TCG] {} produces no output ({})",
            graph.display_name(*requestor),
            code
        );
    }
    tracing::info!(
        "[TCG] Validation complete: {} aborted requestor(s), {} rejected directive(s)",
        outcome.aborted.len(),
        outcome.rejected.len()
    );

    // Phase 3: Collect, transplant and emit, sources before their requestors
    tracing::info!("[TCG] Phase 3: Transplanting members...");
    let order = processing_order(&resolved, &outcome);
    let use_cache = options.capabilities.cache && context.cache.is_some();
    let mut cache_hits = 0usize;
    let mut cancelled = false;

    // output merged here is what later requestors copy from
    let mut working = graph.clone();
    working.clear_generated();
    let mut completed: HashMap<DeclId, CachedOutcome> = HashMap::new();

    for requestor in order {
        if context.cancellation.is_cancelled() {
            cancelled = true;
            break;
        }
        let Some(directives) = resolved.get(&requestor) else {
            continue;
        };

        let key = if use_cache {
            let sources: Vec<DeclId> = directives.iter().map(|directive| directive.source).collect();
            let rejected: Vec<usize> = directives
                .iter()
                .map(|directive| directive.directive.index)
                .filter(|index| outcome.is_rejected(requestor, *index))
                .collect();
            Some(fingerprint(&working, requestor, &sources, &rejected, options)?)
        } else {
            None
        };

        let cached = match (key, context.cache.as_deref()) {
            (Some(key), Some(cache)) => cache.get(key),
            _ => None,
        };
        let result = if let Some(hit) = cached {
            tracing::debug!("[TCG] Cache hit for {}", working.display_name(requestor));
            cache_hits += 1;
            hit
        } else {
            let mut local = new_sink(detailed);
            let units = match process_requestor(
                &working,
                options,
                &context.cancellation,
                requestor,
                directives,
                &outcome,
                local.as_mut(),
            ) {
                Ok(units) => units,
                Err(err) if err.is_cancelled() => {
                    cancelled = true;
                    break;
                }
                Err(err) => return Err(err),
            };
            let fresh = CachedOutcome {
                units,
                diagnostics: local.take(),
                failed: local.has_errors(),
            };
            if let (Some(key), Some(cache)) = (key, context.cache.as_deref_mut()) {
                cache.put(key, fresh.clone());
            }
            fresh
        };

        working.merge_generated(&result.units)?;
        completed.insert(requestor, result);
    }

    // report in graph order, whatever order requestors were processed in
    for requestor in resolved.keys() {
        if let Some(result) = completed.remove(requestor) {
            output.failed |= result.failed;
            output.diagnostics.extend(result.diagnostics);
            output.units.extend(result.units);
        }
    }

    tracing::info!(
        "[TCG] Generated {} output unit(s) ({} requestor(s) from cache)",
        output.units.len(),
        cache_hits
    );

    // Phase 4: Settle diagnostics
    tracing::info!("[TCG] Phase 4: Sorting diagnostics...");
    let output = finish(output, sink.as_mut(), cancelled);
    if output.cancelled {
        tracing::warn!("[TCG] Generation cancelled");
    } else if output.failed {
        tracing::info!("[TCG] Generation finished with errors");
    } else {
        tracing::info!("[TCG] Generation successful!");
    }
    Ok(output)
}

/// Live requestors ordered so each one comes after every requestor it
/// copies from. Aborted requestors and rejected directives contribute no
/// edges; since every cycle aborts at least one member, what remains is
/// acyclic.
fn processing_order(
    resolved: &IndexMap<DeclId, Vec<ResolvedDirective>>,
    outcome: &ValidationOutcome,
) -> Vec<DeclId> {
    let live = |id: DeclId| resolved.contains_key(&id) && !outcome.is_aborted(id);

    let mut pending: IndexMap<DeclId, usize> = IndexMap::new();
    let mut dependents: HashMap<DeclId, Vec<DeclId>> = HashMap::new();
    for (requestor, directives) in resolved {
        if !live(*requestor) {
            continue;
        }
        let mut sources = HashSet::new();
        for directive in directives {
            let source = directive.source;
            if outcome.is_rejected(*requestor, directive.directive.index)
                || source == *requestor
                || !live(source)
                || !sources.insert(source)
            {
                continue;
            }
            dependents.entry(source).or_default().push(*requestor);
        }
        pending.insert(*requestor, sources.len());
    }

    let mut ready: VecDeque<DeclId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(pending.len());
    while let Some(next) = ready.pop_front() {
        order.push(next);
        for dependent in dependents.get(&next).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(*dependent);
                }
            }
        }
    }
    if order.len() < pending.len() {
        tracing::warn!("[TCG] Copy order is cyclic after validation; falling back to graph order");
        for id in pending.keys() {
            if !order.contains(id) {
                order.push(*id);
            }
        }
    }
    order
}

fn process_requestor(
    graph: &SymbolGraph,
    options: &GeneratorOptions,
    cancellation: &CancellationToken,
    requestor: DeclId,
    directives: &[ResolvedDirective],
    outcome: &ValidationOutcome,
    sink: &mut dyn DiagnosticSink,
) -> Result<Vec<OutputUnit>, CopyError> {
    let Some(plan) = DirectiveCollector::new(graph).collect(requestor, directives, outcome, sink) else {
        return Ok(Vec::new());
    };
    let fragments = TransplantEngine::new(graph, cancellation).transplant(&plan, sink)?;
    Ok(EmissionSink::new(graph, options).emit(requestor, fragments))
}

fn finish(
    mut output: GenerationOutput,
    sink: &mut dyn DiagnosticSink,
    cancelled: bool,
) -> GenerationOutput {
    output.failed |= sink.has_errors();
    output.diagnostics.extend(sink.take());
    sort_deterministic(&mut output.diagnostics);
    output.cancelled = cancelled;
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::diagnostics::DiagnosticCode;
    use crate::directive::DirectiveRecord;
    use crate::model::{Declaration, Fragment, GraphBuilder, MemberSyntax, SourceLocation};

    fn widget_graph() -> SymbolGraph {
        let mut builder = GraphBuilder::new();
        builder.add(
            Declaration::class("Widget")
                .partial()
                .directive(DirectiveRecord::new("Template"))
                .directive(DirectiveRecord::new("Missing")),
        );
        builder.add(Declaration::class("Template").fragment(
            Fragment::new(SourceLocation::new("Template.cs", 0, 1))
                .member(MemberSyntax::method("void", "Run").body("{ }")),
        ));
        builder.build().unwrap()
    }

    #[test]
    fn unresolved_directives_do_not_block_the_rest() {
        let output = generate(&widget_graph()).unwrap();
        assert!(output.failed);
        assert_eq!(output.units.len(), 1);
        let codes: Vec<DiagnosticCode> = output.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::Unresolvable]);
    }

    #[test]
    fn quiet_mode_keeps_only_the_failure_flag() {
        let output = generate_with_options(&widget_graph(), &GeneratorOptions::quiet()).unwrap();
        assert!(output.failed);
        assert!(output.diagnostics.is_empty());
        assert_eq!(output.units.len(), 1);
    }

    #[test]
    fn cached_outcomes_are_replayed() {
        let graph = widget_graph();
        let options = GeneratorOptions::default().with_cache();
        let mut cache = MemoryCache::new();

        let first =
            generate_with_context(&graph, &options, PassContext::new().with_cache(&mut cache)).unwrap();
        assert_eq!(cache.len(), 1);
        let second =
            generate_with_context(&graph, &options, PassContext::new().with_cache(&mut cache)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn sources_are_processed_before_their_requestors() {
        let mut builder = GraphBuilder::new();
        let a = builder.add(Declaration::class("A").partial().directive(DirectiveRecord::new("B")));
        let b = builder.add(Declaration::class("B").partial().directive(DirectiveRecord::new("C")));
        let c = builder.add(Declaration::class("C").partial().directive(DirectiveRecord::new("D")));
        builder.add(Declaration::class("D"));
        let graph = builder.build().unwrap();

        let resolver = TargetResolver::new(&graph);
        let mut bag = DiagnosticBag::new();
        let resolved: IndexMap<DeclId, Vec<ResolvedDirective>> = graph
            .requestors()
            .map(|id| (id, resolve_directives(&resolver, id, &mut bag)))
            .collect();
        let outcome = DependencyValidator::new(&resolver).validate(&resolved, &mut bag);
        assert_eq!(processing_order(&resolved, &outcome), vec![c, b, a]);
    }

    #[test]
    fn cancelled_before_start_produces_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let output = generate_with_context(
            &widget_graph(),
            &GeneratorOptions::default(),
            PassContext::new().with_cancellation(token),
        )
        .unwrap();
        assert!(output.cancelled);
        assert!(output.units.is_empty());
    }
}
