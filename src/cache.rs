//! # Result Cache
//!
//! Per-requestor memoization of collection, transplantation and emission.
//! Entries are keyed by a fingerprint of everything those phases read: the
//! requestor, its containers, its resolved sources (with their containers
//! and any output merged into them earlier in the pass), the directives
//! validation rejected, and the generator options.
//!
//! Validation is never cached; cycles and constraint checks depend on the
//! whole graph and always run.

use crate::diagnostics::Diagnostic;
use crate::emit::OutputUnit;
use crate::error::CopyError;
use crate::model::{DeclId, Declaration, SymbolGraph};
use crate::options::GeneratorOptions;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;

/// Content hash of one requestor's inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Everything a requestor contributed to a pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedOutcome {
    pub units: Vec<OutputUnit>,
    pub diagnostics: Vec<Diagnostic>,
    pub failed: bool,
}

/// Storage for cached outcomes, owned by the host across passes
pub trait ResultCache {
    fn get(&self, fingerprint: Fingerprint) -> Option<CachedOutcome>;
    fn put(&mut self, fingerprint: Fingerprint, outcome: CachedOutcome);
}

/// In-memory cache, suitable for a host process that keeps it between passes
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<Fingerprint, CachedOutcome>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, fingerprint: Fingerprint) -> Option<CachedOutcome> {
        self.entries.get(&fingerprint).cloned()
    }

    fn put(&mut self, fingerprint: Fingerprint, outcome: CachedOutcome) {
        self.entries.insert(fingerprint, outcome);
    }
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    format: u32,
    options: &'a GeneratorOptions,
    requestor: &'a Declaration,
    containers: Vec<&'a Declaration>,
    sources: Vec<SourceInput<'a>>,
    rejected: &'a [usize],
}

#[derive(Serialize)]
struct SourceInput<'a> {
    declaration: &'a Declaration,
    containers: Vec<&'a Declaration>,
}

fn containers(graph: &SymbolGraph, id: DeclId) -> Vec<&Declaration> {
    graph
        .containing_chain(id)
        .into_iter()
        .map(|container| graph.declaration(container))
        .collect()
}

/// Fingerprint a requestor together with the sources its directives resolved to
pub fn fingerprint(
    graph: &SymbolGraph,
    requestor: DeclId,
    sources: &[DeclId],
    rejected: &[usize],
    options: &GeneratorOptions,
) -> Result<Fingerprint, CopyError> {
    let input = FingerprintInput {
        format: 1,
        options,
        requestor: graph.checked(requestor)?,
        containers: containers(graph, requestor),
        sources: sources
            .iter()
            .map(|source| {
                Ok(SourceInput {
                    declaration: graph.checked(*source)?,
                    containers: containers(graph, *source),
                })
            })
            .collect::<Result<_, CopyError>>()?,
        rejected,
    };
    let bytes = serde_json::to_vec(&input).map_err(CopyError::Serialization)?;

    let mut hasher = DefaultHasher::new();
    hasher.write(&bytes);
    Ok(Fingerprint(hasher.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::DirectiveRecord;
    use crate::model::{GraphBuilder, MemberSyntax, Fragment, SourceLocation};

    fn graph(body: &str) -> (SymbolGraph, DeclId, DeclId) {
        let mut builder = GraphBuilder::new();
        let widget = builder.add(
            Declaration::class("Widget")
                .partial()
                .directive(DirectiveRecord::new("Template")),
        );
        let template = builder.add(Declaration::class("Template").fragment(
            Fragment::new(SourceLocation::new("Template.cs", 0, 1))
                .member(MemberSyntax::method("void", "Run").body(body)),
        ));
        (builder.build().unwrap(), widget, template)
    }

    #[test]
    fn fingerprint_tracks_source_content() {
        let options = GeneratorOptions::default();
        let (first, widget, template) = graph("{ }");
        let (same, _, _) = graph("{ }");
        let (changed, _, _) = graph("{ Go(); }");

        let a = fingerprint(&first, widget, &[template], &[], &options).unwrap();
        let b = fingerprint(&same, widget, &[template], &[], &options).unwrap();
        let c = fingerprint(&changed, widget, &[template], &[], &options).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, fingerprint(&first, widget, &[template], &[0], &options).unwrap());
        assert_ne!(a, fingerprint(&first, widget, &[template], &[], &GeneratorOptions::quiet()).unwrap());
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let (graph, widget, _) = graph("{ }");
        let err = fingerprint(&graph, widget, &[DeclId::from_raw(9)], &[], &GeneratorOptions::default())
            .unwrap_err();
        assert!(matches!(err, CopyError::UnknownDeclaration(_)));
    }

    #[test]
    fn memory_cache_round_trips_outcomes() {
        let mut cache = MemoryCache::new();
        let outcome = CachedOutcome {
            failed: true,
            ..CachedOutcome::default()
        };
        cache.put(Fingerprint(7), outcome.clone());
        assert_eq!(cache.get(Fingerprint(7)), Some(outcome));
        assert_eq!(cache.get(Fingerprint(8)), None);
        assert_eq!(cache.len(), 1);
    }
}
