//! # Declarations and Fragments
//!
//! Value types describing one type-like declaration of the analyzed program.

use crate::directive::{DirectiveRecord, PatternRecord};
use crate::model::syntax::MemberSyntax;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a declaration inside a [`SymbolGraph`](crate::model::SymbolGraph)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclId(pub u32);

impl DeclId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeclId({})", self.0)
    }
}

/// The kind of a type-like declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Class,
    Struct,
    Interface,
    Record,
    RecordStruct,
    Enum,
    Delegate,
}

impl DeclKind {
    /// Whether members can be copied from or into this kind of declaration
    pub fn supports_member_copy(self) -> bool {
        matches!(
            self,
            DeclKind::Class
                | DeclKind::Struct
                | DeclKind::Interface
                | DeclKind::Record
                | DeclKind::RecordStruct
        )
    }

    /// Whether a declaration of this kind may name a base class
    pub fn can_have_base_class(self) -> bool {
        matches!(self, DeclKind::Class | DeclKind::Record)
    }

    pub fn is_reference_type(self) -> bool {
        matches!(
            self,
            DeclKind::Class | DeclKind::Interface | DeclKind::Record | DeclKind::Delegate
        )
    }

    pub fn is_value_type(self) -> bool {
        matches!(self, DeclKind::Struct | DeclKind::RecordStruct | DeclKind::Enum)
    }

    /// Keyword used when rendering a partial declaration of this kind
    pub fn keyword(self) -> &'static str {
        match self {
            DeclKind::Class => "class",
            DeclKind::Struct => "struct",
            DeclKind::Interface => "interface",
            DeclKind::Record => "record",
            DeclKind::RecordStruct => "record struct",
            DeclKind::Enum => "enum",
            DeclKind::Delegate => "delegate",
        }
    }
}

/// Declared accessibility, ordered from least to most accessible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    Private,
    Protected,
    Internal,
    Public,
}

impl Default for Accessibility {
    fn default() -> Self {
        Accessibility::Internal
    }
}

/// Constraints declared on one generic parameter
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericConstraints {
    /// `class`
    pub reference_type: bool,
    /// `struct`
    pub value_type: bool,
    pub unmanaged: bool,
    /// `notnull`
    pub not_null: bool,
    /// `new()`
    pub constructor: bool,
    /// Explicit base class and interface constraints
    pub types: Vec<String>,
}

impl GenericConstraints {
    pub fn is_empty(&self) -> bool {
        !self.reference_type
            && !self.value_type
            && !self.unmanaged
            && !self.not_null
            && !self.constructor
            && self.types.is_empty()
    }

    /// Constraint clauses in declaration order (`class`, `IFoo`, `new()`)
    pub fn clauses(&self) -> Vec<String> {
        let mut clauses = Vec::new();
        if self.reference_type {
            clauses.push("class".to_string());
        }
        if self.unmanaged {
            clauses.push("unmanaged".to_string());
        } else if self.value_type {
            clauses.push("struct".to_string());
        }
        if self.not_null {
            clauses.push("notnull".to_string());
        }
        clauses.extend(self.types.iter().cloned());
        if self.constructor {
            clauses.push("new()".to_string());
        }
        clauses
    }
}

/// A generic type parameter of a declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericParameter {
    pub name: String,
    #[serde(default)]
    pub constraints: GenericConstraints,
}

impl GenericParameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraints: GenericConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: GenericConstraints) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Span of source text a fragment or directive originates from
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
}

impl SourceLocation {
    pub fn new(path: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            path: path.into(),
            start,
            end,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{}]", self.path, self.start, self.end)
    }
}

/// One physical occurrence of a declaration's member list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default)]
    pub location: SourceLocation,
    /// Name selectable through a directive's partial-part selector
    #[serde(default)]
    pub part_name: Option<String>,
    /// Imports in effect in the file holding this fragment
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub members: Vec<MemberSyntax>,
    /// Set on fragments fed back from a previous generation pass
    #[serde(default)]
    pub generated: bool,
}

impl Fragment {
    pub fn new(location: SourceLocation) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }

    pub fn part(mut self, name: impl Into<String>) -> Self {
        self.part_name = Some(name.into());
        self
    }

    pub fn import(mut self, import: impl Into<String>) -> Self {
        self.imports.push(import.into());
        self
    }

    pub fn member(mut self, member: MemberSyntax) -> Self {
        self.members.push(member);
        self
    }
}

/// Per-symbol configuration of a member
///
/// A field declaring `a, b` owns two symbols; each one carries its own
/// configuration regardless of the shared syntax node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSymbol {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub exclude_from_copy: bool,
}

impl MemberSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn excluded(mut self) -> Self {
        self.exclude_from_copy = true;
        self
    }

    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }
}

/// A named type-like entity that can be a source and/or requestor of copying
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub kind: DeclKind,
    #[serde(default)]
    pub accessibility: Accessibility,
    #[serde(default = "default_assembly")]
    pub assembly: String,
    #[serde(default)]
    pub containing: Option<DeclId>,
    #[serde(default)]
    pub is_partial: bool,
    #[serde(default)]
    pub generic_parameters: Vec<GenericParameter>,
    #[serde(default)]
    pub base_type: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<MemberSymbol>,
    #[serde(default)]
    pub directives: Vec<DirectiveRecord>,
    #[serde(default)]
    pub patterns: Vec<PatternRecord>,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
}

fn default_assembly() -> String {
    "main".to_string()
}

impl Declaration {
    pub fn new(name: impl Into<String>, kind: DeclKind) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            kind,
            accessibility: Accessibility::Public,
            assembly: default_assembly(),
            containing: None,
            is_partial: false,
            generic_parameters: Vec::new(),
            base_type: None,
            interfaces: Vec::new(),
            documentation: None,
            attributes: Vec::new(),
            symbols: Vec::new(),
            directives: Vec::new(),
            patterns: Vec::new(),
            fragments: Vec::new(),
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, DeclKind::Class)
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, DeclKind::Struct)
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, DeclKind::Interface)
    }

    pub fn partial(mut self) -> Self {
        self.is_partial = true;
        self
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn in_assembly(mut self, assembly: impl Into<String>) -> Self {
        self.assembly = assembly.into();
        self
    }

    pub fn accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    pub fn generic(mut self, parameter: GenericParameter) -> Self {
        self.generic_parameters.push(parameter);
        self
    }

    pub fn base(mut self, base_type: impl Into<String>) -> Self {
        self.base_type = Some(base_type.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn documented(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn symbol(mut self, symbol: MemberSymbol) -> Self {
        self.symbols.push(symbol);
        self
    }

    pub fn directive(mut self, directive: DirectiveRecord) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn pattern(mut self, pattern: PatternRecord) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn fragment(mut self, fragment: Fragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    pub fn arity(&self) -> usize {
        self.generic_parameters.len()
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_parameters.is_empty()
    }

    /// Name with its own generic parameter list, e.g. `Box<T>`
    pub fn self_type(&self) -> String {
        if self.generic_parameters.is_empty() {
            self.name.clone()
        } else {
            let params: Vec<&str> = self
                .generic_parameters
                .iter()
                .map(|p| p.name.as_str())
                .collect();
            format!("{}<{}>", self.name, params.join(", "))
        }
    }

    /// Fragments members can be copied from, in declaration order.
    ///
    /// Generated fragments count: a pass merges each requestor's output
    /// before anything copies from it, so copying is transitive.
    pub fn source_fragments(&self) -> impl Iterator<Item = (usize, &Fragment)> {
        self.fragments.iter().enumerate()
    }

    pub fn member_symbol(&self, name: &str) -> Option<&MemberSymbol> {
        self.symbols.iter().find(|symbol| symbol.name == name)
    }
}
