//! # Symbol Graph
//!
//! Read-only, pre-resolved arena over every declaration of the program.
//! Declarations reference each other through [`DeclId`] indices only, so the
//! naturally cyclic "types mention each other" shape never turns into
//! ownership cycles.

mod declaration;
mod syntax;

pub use declaration::*;
pub use syntax::*;

use crate::emit::OutputUnit;
use crate::error::CopyError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whole-program snapshot handed to a generation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolGraph {
    declarations: Vec<Declaration>,
}

impl SymbolGraph {
    /// Build a graph, checking that every containing link points inside the
    /// arena and that containment never loops.
    pub fn new(declarations: Vec<Declaration>) -> Result<Self, CopyError> {
        let graph = Self { declarations };
        graph.check_containment()?;
        Ok(graph)
    }

    /// Deserialize a graph from the JSON form a host front end produces
    pub fn from_json(json: &str) -> Result<Self, CopyError> {
        let raw: SymbolGraph = serde_json::from_str(json).map_err(CopyError::Deserialization)?;
        Self::new(raw.declarations)
    }

    pub fn to_json(&self) -> Result<String, CopyError> {
        serde_json::to_string_pretty(self).map_err(CopyError::Serialization)
    }

    fn check_containment(&self) -> Result<(), CopyError> {
        for (index, declaration) in self.declarations.iter().enumerate() {
            let mut seen = HashSet::new();
            seen.insert(index);
            let mut current = declaration.containing;
            while let Some(parent) = current {
                let parent_decl = self.declarations.get(parent.index()).ok_or_else(|| {
                    CopyError::InvalidGraph(format!(
                        "'{}' is contained in unknown declaration {:?}",
                        declaration.name, parent
                    ))
                })?;
                if !seen.insert(parent.index()) {
                    return Err(CopyError::InvalidGraph(format!(
                        "containment of '{}' loops back on itself",
                        declaration.name
                    )));
                }
                current = parent_decl.containing;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = DeclId> + '_ {
        (0..self.declarations.len()).map(|index| DeclId::from_raw(index as u32))
    }

    pub fn get(&self, id: DeclId) -> Option<&Declaration> {
        self.declarations.get(id.index())
    }

    /// Access a declaration by an id handed out by this graph
    pub fn declaration(&self, id: DeclId) -> &Declaration {
        &self.declarations[id.index()]
    }

    /// Look up an id that may come from outside the graph
    pub fn checked(&self, id: DeclId) -> Result<&Declaration, CopyError> {
        self.get(id).ok_or(CopyError::UnknownDeclaration(id))
    }

    /// Containing declarations, innermost first
    pub fn containing_chain(&self, id: DeclId) -> Vec<DeclId> {
        let mut chain = Vec::new();
        let mut current = self.declaration(id).containing;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.declaration(parent).containing;
        }
        chain
    }

    /// True when `id` is `ancestor` or is nested (at any depth) inside it
    pub fn is_within(&self, id: DeclId, ancestor: DeclId) -> bool {
        id == ancestor || self.containing_chain(id).contains(&ancestor)
    }

    /// Dotted name without generic parameters: `Ns.Outer.Inner`
    pub fn qualified_name(&self, id: DeclId) -> String {
        let declaration = self.declaration(id);
        let mut parts: Vec<&str> = self
            .containing_chain(id)
            .iter()
            .rev()
            .map(|parent| self.declaration(*parent).name.as_str())
            .collect();
        parts.push(&declaration.name);

        let root = self.outermost(id);
        match &self.declaration(root).namespace {
            Some(namespace) if !namespace.is_empty() => format!("{}.{}", namespace, parts.join(".")),
            _ => parts.join("."),
        }
    }

    /// Qualified name including generic parameters, used in diagnostics
    pub fn display_name(&self, id: DeclId) -> String {
        let declaration = self.declaration(id);
        let qualified = self.qualified_name(id);
        if declaration.is_generic() {
            let self_type = declaration.self_type();
            let suffix = &self_type[declaration.name.len()..];
            format!("{qualified}{suffix}")
        } else {
            qualified
        }
    }

    /// Namespace of the outermost containing declaration
    pub fn namespace_of(&self, id: DeclId) -> Option<&str> {
        self.declaration(self.outermost(id)).namespace.as_deref()
    }

    fn outermost(&self, id: DeclId) -> DeclId {
        self.containing_chain(id).last().copied().unwrap_or(id)
    }

    /// Declarations matching a reference name and generic arity.
    ///
    /// A plain name matches on the simple name; a dotted name must match a
    /// suffix of the qualified name on a `.` boundary.
    pub fn find_by_name(&self, name: &str, arity: usize) -> Vec<DeclId> {
        let dotted = name.contains('.');
        self.ids()
            .filter(|id| {
                let declaration = self.declaration(*id);
                if declaration.arity() != arity {
                    return false;
                }
                if dotted {
                    let qualified = self.qualified_name(*id);
                    qualified == name || qualified.ends_with(&format!(".{name}"))
                } else {
                    declaration.name == name
                }
            })
            .collect()
    }

    /// Requestors: declarations that carry at least one copy directive
    pub fn requestors(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.ids()
            .filter(|id| !self.declaration(*id).directives.is_empty())
    }

    /// Drop every fragment fed back by [`merge_generated`](Self::merge_generated)
    pub fn clear_generated(&mut self) {
        for declaration in &mut self.declarations {
            declaration.fragments.retain(|fragment| !fragment.generated);
        }
    }

    /// Feed generated output back into the graph as extra fragments.
    ///
    /// Previously merged output for the same requestor is replaced, so
    /// merging the output of an unchanged pass leaves the graph unchanged.
    pub fn merge_generated(&mut self, units: &[OutputUnit]) -> Result<(), CopyError> {
        let mut touched = HashSet::new();
        for unit in units {
            let declaration = self
                .declarations
                .get_mut(unit.requestor.index())
                .ok_or(CopyError::UnknownDeclaration(unit.requestor))?;
            if touched.insert(unit.requestor) {
                declaration.fragments.retain(|fragment| !fragment.generated);
            }
            declaration.fragments.push(Fragment {
                location: SourceLocation::new(unit.hint_name.clone(), 0, unit.text.len()),
                part_name: None,
                imports: unit.imports.clone(),
                members: unit
                    .members
                    .iter()
                    .map(|text| MemberSyntax::verbatim(text.clone()))
                    .collect(),
                generated: true,
            });
        }
        Ok(())
    }
}

/// Incrementally assembles a [`SymbolGraph`]
#[derive(Debug, Default)]
pub struct GraphBuilder {
    declarations: Vec<Declaration>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, declaration: Declaration) -> DeclId {
        let id = DeclId::from_raw(self.declarations.len() as u32);
        self.declarations.push(declaration);
        id
    }

    /// Add a declaration nested inside `parent`
    pub fn add_nested(&mut self, parent: DeclId, mut declaration: Declaration) -> DeclId {
        declaration.containing = Some(parent);
        self.add(declaration)
    }

    /// Mutable access for wiring directives after ids are known
    pub fn get_mut(&mut self, id: DeclId) -> Option<&mut Declaration> {
        self.declarations.get_mut(id.index())
    }

    pub fn build(self) -> Result<SymbolGraph, CopyError> {
        SymbolGraph::new(self.declarations)
    }
}
