//! # Pattern Engine
//!
//! Ordered regular-expression find/replace rules applied to the rendered
//! text of copied members. The rewrite is purely textual: no attempt is made
//! to keep the output syntactically valid.

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::directive::{parse_pattern, PatternRecord, PatternRule};
use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: PatternRule,
    regex: Regex,
}

/// The rules of one requestor, deduplicated and sorted by priority
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    rules: Vec<CompiledRule>,
}

impl PatternSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile rules, dropping repeated patterns (first wins) and sorting by
    /// ascending order with ties kept in declaration order.
    ///
    /// Rules whose pattern fails to compile are returned with their error and
    /// left out of the set.
    pub fn compile(rules: Vec<PatternRule>) -> (Self, Vec<(PatternRule, regex::Error)>) {
        let mut seen = HashSet::new();
        let mut compiled = Vec::new();
        let mut failures = Vec::new();

        for rule in rules {
            if !seen.insert(rule.pattern.clone()) {
                continue;
            }
            match Regex::new(&rule.pattern) {
                Ok(regex) => compiled.push(CompiledRule { rule, regex }),
                Err(err) => failures.push((rule, err)),
            }
        }

        compiled.sort_by_key(|compiled| (compiled.rule.order, compiled.rule.index));
        (Self { rules: compiled }, failures)
    }

    /// Build the set for a requestor's pattern records, reporting rules that
    /// do not compile.
    pub fn from_records(
        records: &[PatternRecord],
        requestor: &str,
        sink: &mut dyn DiagnosticSink,
    ) -> Self {
        let rules = records
            .iter()
            .enumerate()
            .map(|(index, record)| parse_pattern(index, record))
            .collect();
        let (set, failures) = Self::compile(rules);
        for (rule, err) in failures {
            let message = if sink.is_detailed() {
                format!("pattern '{}' is not a valid regular expression: {}", rule.pattern, err)
            } else {
                String::new()
            };
            sink.report(
                Diagnostic::new(DiagnosticCode::InvalidPattern, message).for_requestor(requestor),
            );
        }
        set
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }

    /// Apply every rule in order; each sees the output of the previous one
    pub fn apply(&self, text: &str) -> String {
        self.rules.iter().fold(text.to_string(), |current, compiled| {
            compiled
                .regex
                .replace_all(&current, compiled.rule.replacement.as_str())
                .into_owned()
        })
    }
}
