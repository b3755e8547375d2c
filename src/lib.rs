//! # Trait Copy Generator (TCG)
//!
//! Source generator that lets a partial type declaration copy members from
//! one or more template declarations ("trait copy"), with per-relationship
//! rewriting rules, after the whole program's copy relationships have been
//! checked for soundness.
//!
//! TCG works on a pre-resolved [`SymbolGraph`] handed over by a compiler
//! front end and produces new partial declarations for every requestor:
//! - Directive parsing and target resolution with accessibility rules
//! - Circular-dependency detection across the whole graph
//! - Generic type-argument constraint checking
//! - Partial-part (multi-fragment) selection and priority ordering
//! - Constructor/operator renaming and generic parameter substitution
//! - Regular-expression rewriting of the copied text
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tcgen::{generate, SymbolGraph};
//!
//! let json = std::fs::read_to_string("graph.json")?;
//! let graph = SymbolGraph::from_json(&json)?;
//!
//! let output = generate(&graph)?;
//! for diagnostic in &output.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//! for unit in &output.units {
//!     std::fs::write(&unit.hint_name, &unit.text)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! A pass runs in phases:
//!
//! 1. **Resolution** - Parse directive records and resolve their targets
//! 2. **Validation** - Cycles, assembly boundaries and generic constraints
//! 3. **Transplantation** - Collect, copy and rewrite members, then emit
//!    output units (optionally served from a [`ResultCache`])
//! 4. **Diagnostics** - Sort findings deterministically

pub mod cache;
pub mod cancel;
pub mod codegen;
pub mod collector;
pub mod compiler;
pub mod diagnostics;
pub mod directive;
pub mod emit;
pub mod error;
pub mod model;
pub mod options;
pub mod pattern;
pub mod resolver;
pub mod validator;

// Re-export the main generation API
pub use compiler::{
    generate,
    generate_with_context,
    generate_with_options,
    GenerationOutput,
    PassContext,
};

pub use cache::{CachedOutcome, Fingerprint, MemoryCache, ResultCache};
pub use cancel::CancellationToken;
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, Severity};
pub use directive::{AdditionalConstructs, DirectiveRecord, PatternRecord};
pub use emit::{OriginLocation, OutputUnit};
pub use error::{CopyError, Result};
pub use model::{
    Accessibility, DeclId, DeclKind, Declaration, Fragment, GenericConstraints, GenericParameter,
    GraphBuilder, MemberKind, MemberSymbol, MemberSyntax, Parameter, SourceLocation, SymbolGraph,
    VariableDeclarator,
};
pub use options::{Capabilities, GeneratorOptions};
