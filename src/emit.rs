//! # Emission
//!
//! Serializes synthesized fragments as output units: one partial
//! declaration per fragment, wrapped in its namespace and containing
//! declarations, under a stable name.

use crate::codegen::{render_attribute, render_documentation, SynthesizedFragment};
use crate::model::{DeclId, SourceLocation, SymbolGraph};
use crate::options::GeneratorOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where the members of an output unit were copied from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginLocation {
    /// Display name of the source declaration
    pub source: String,
    pub location: SourceLocation,
}

/// One generated source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputUnit {
    pub hint_name: String,
    pub requestor: DeclId,
    pub requestor_name: String,
    pub text: String,
    /// Rendered members, in output order
    pub members: Vec<String>,
    pub imports: Vec<String>,
    pub origin: OriginLocation,
}

struct CodeWriter<'a> {
    indent: &'a str,
    level: usize,
    text: String,
}

impl<'a> CodeWriter<'a> {
    fn new(indent: &'a str) -> Self {
        Self {
            indent,
            level: 0,
            text: String::new(),
        }
    }

    fn line(&mut self, line: &str) {
        if !line.is_empty() {
            for _ in 0..self.level {
                self.text.push_str(self.indent);
            }
            self.text.push_str(line);
        }
        self.text.push('\n');
    }

    fn lines(&mut self, text: &str) {
        for line in text.lines() {
            self.line(line);
        }
    }

    fn open(&mut self) {
        self.line("{");
        self.level += 1;
    }

    fn close(&mut self) {
        self.level = self.level.saturating_sub(1);
        self.line("}");
    }
}

/// `System.Linq`, `using System.Linq;` and `global using X;` all name an import
fn normalize_import(import: &str) -> String {
    let import = import.trim().trim_end_matches(';').trim();
    let import = import.strip_prefix("global ").unwrap_or(import).trim_start();
    import.strip_prefix("using ").unwrap_or(import).trim().to_string()
}

pub struct EmissionSink<'a> {
    graph: &'a SymbolGraph,
    options: &'a GeneratorOptions,
}

impl<'a> EmissionSink<'a> {
    pub fn new(graph: &'a SymbolGraph, options: &'a GeneratorOptions) -> Self {
        Self { graph, options }
    }

    /// Turn a requestor's fragments into output units, in fragment order
    pub fn emit(&self, requestor: DeclId, fragments: Vec<SynthesizedFragment>) -> Vec<OutputUnit> {
        let requestor_name = self.graph.display_name(requestor);
        let mut used = HashSet::new();
        fragments
            .into_iter()
            .map(|fragment| {
                let hint_name = self.hint_name(requestor, &fragment.chunk, &mut used);
                let mut imports: Vec<String> = fragment
                    .imports
                    .iter()
                    .map(|import| normalize_import(import))
                    .filter(|import| !import.is_empty())
                    .collect();
                imports.sort();
                imports.dedup();
                let text = self.render(requestor, &fragment, &imports);
                OutputUnit {
                    hint_name,
                    requestor,
                    requestor_name: requestor_name.clone(),
                    text,
                    members: fragment.members,
                    imports,
                    origin: OriginLocation {
                        source: self.graph.display_name(fragment.source),
                        location: fragment.origin,
                    },
                }
            })
            .collect()
    }

    /// `{qualified requestor}[-arity].{chunk}.{extension}`, with an ordinal
    /// before the extension when the name is already taken
    pub fn hint_name(&self, requestor: DeclId, chunk: &str, used: &mut HashSet<String>) -> String {
        let declaration = self.graph.declaration(requestor);
        let mut base = self.graph.qualified_name(requestor);
        if declaration.is_generic() {
            base.push_str(&format!("-{}", declaration.arity()));
        }
        let extension = &self.options.file_extension;

        let mut name = format!("{base}.{chunk}.{extension}");
        let mut ordinal = 2;
        while !used.insert(name.clone()) {
            name = format!("{base}.{chunk}.{ordinal}.{extension}");
            ordinal += 1;
        }
        name
    }

    fn render(&self, requestor: DeclId, fragment: &SynthesizedFragment, imports: &[String]) -> String {
        let mut writer = CodeWriter::new(&self.options.indent);
        writer.line(&self.options.header_comment);
        writer.line("");

        if !imports.is_empty() {
            for import in imports {
                writer.line(&format!("using {import};"));
            }
            writer.line("");
        }

        let namespace = self
            .graph
            .namespace_of(requestor)
            .filter(|namespace| !namespace.is_empty());
        if let Some(namespace) = namespace {
            writer.line(&format!("namespace {namespace}"));
            writer.open();
        }

        let containers: Vec<DeclId> = self.graph.containing_chain(requestor).into_iter().rev().collect();
        for container in &containers {
            let declaration = self.graph.declaration(*container);
            writer.line(&format!(
                "partial {} {}",
                declaration.kind.keyword(),
                declaration.self_type()
            ));
            writer.open();
        }

        let declaration = self.graph.declaration(requestor);
        let header = &fragment.header;
        if let Some(documentation) = &header.documentation {
            for line in render_documentation(documentation) {
                writer.line(&line);
            }
        }
        for attribute in &header.attributes {
            writer.line(&render_attribute(attribute));
        }
        let mut signature = format!("partial {} {}", declaration.kind.keyword(), declaration.self_type());
        if !header.base_types.is_empty() {
            signature.push_str(" : ");
            signature.push_str(&header.base_types.join(", "));
        }
        writer.line(&signature);
        writer.level += 1;
        for clause in &header.constraints {
            writer.line(&format!("where {clause}"));
        }
        writer.level -= 1;

        writer.open();
        for (index, member) in fragment.members.iter().enumerate() {
            if index > 0 {
                writer.line("");
            }
            writer.lines(member);
        }
        writer.close();

        for _ in &containers {
            writer.close();
        }
        if namespace.is_some() {
            writer.close();
        }
        writer.text
    }
}
