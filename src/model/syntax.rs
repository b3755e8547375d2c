//! # Member Syntax
//!
//! Syntactic shape of the members found in a fragment. Types, bodies and
//! initializers are kept as source text; the rewriting passes in
//! [`codegen`](crate::codegen) operate on that text token by token.

use serde::{Deserialize, Serialize};

/// Syntactic category of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Field,
    Property,
    Method,
    Constructor,
    Destructor,
    Operator,
    /// `implicit`/`explicit` conversion operator; `name` holds the keyword and
    /// `ty` the target type
    Conversion,
    Event,
    /// Opaque member text (nested types, indexers, anything unmodelled)
    Verbatim,
}

impl MemberKind {
    /// Members whose signature names their declaring type
    pub fn is_special(self) -> bool {
        matches!(
            self,
            MemberKind::Constructor
                | MemberKind::Destructor
                | MemberKind::Operator
                | MemberKind::Conversion
        )
    }

    /// Members that may declare several symbols in one syntax node
    pub fn is_field_like(self) -> bool {
        matches!(self, MemberKind::Field | MemberKind::Event)
    }
}

/// One declared variable of a field-like member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDeclarator {
    pub name: String,
    #[serde(default)]
    pub initializer: Option<String>,
}

impl VariableDeclarator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initializer: None,
        }
    }

    pub fn with_initializer(mut self, initializer: impl Into<String>) -> Self {
        self.initializer = Some(initializer.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub ty: String,
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
}

impl Parameter {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            modifiers: Vec::new(),
            ty: ty.into(),
            name: name.into(),
            default: None,
        }
    }
}

/// A single syntactic member of a fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSyntax {
    pub kind: MemberKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub type_parameters: Vec<String>,
    /// Method-level `where` clauses
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Field/property/event type, or the return type of methods and operators
    #[serde(default)]
    pub ty: Option<String>,
    #[serde(default)]
    pub declarators: Vec<VariableDeclarator>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Constructor initializer (`base(x)`) or property initializer value
    #[serde(default)]
    pub initializer: Option<String>,
    /// Block, expression body (`=> ...`) or accessor list
    #[serde(default)]
    pub body: Option<String>,
}

impl MemberSyntax {
    pub fn new(kind: MemberKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            documentation: None,
            attributes: Vec::new(),
            modifiers: Vec::new(),
            type_parameters: Vec::new(),
            constraints: Vec::new(),
            ty: None,
            declarators: Vec::new(),
            parameters: Vec::new(),
            initializer: None,
            body: None,
        }
    }

    pub fn field(ty: impl Into<String>, names: &[&str]) -> Self {
        let mut member = Self::new(MemberKind::Field, "");
        member.ty = Some(ty.into());
        member.declarators = names.iter().map(|name| VariableDeclarator::new(*name)).collect();
        member
    }

    pub fn property(ty: impl Into<String>, name: impl Into<String>) -> Self {
        let mut member = Self::new(MemberKind::Property, name);
        member.ty = Some(ty.into());
        member.body = Some("{ get; set; }".to_string());
        member
    }

    pub fn method(return_type: impl Into<String>, name: impl Into<String>) -> Self {
        let mut member = Self::new(MemberKind::Method, name);
        member.ty = Some(return_type.into());
        member
    }

    pub fn constructor(name: impl Into<String>) -> Self {
        Self::new(MemberKind::Constructor, name)
    }

    pub fn destructor(name: impl Into<String>) -> Self {
        Self::new(MemberKind::Destructor, name)
    }

    pub fn operator(return_type: impl Into<String>, token: impl Into<String>) -> Self {
        let mut member = Self::new(MemberKind::Operator, token);
        member.ty = Some(return_type.into());
        member
    }

    pub fn conversion(implicit: bool, target: impl Into<String>) -> Self {
        let keyword = if implicit { "implicit" } else { "explicit" };
        let mut member = Self::new(MemberKind::Conversion, keyword);
        member.ty = Some(target.into());
        member
    }

    pub fn event(ty: impl Into<String>, names: &[&str]) -> Self {
        let mut member = Self::field(ty, names);
        member.kind = MemberKind::Event;
        member
    }

    pub fn verbatim(text: impl Into<String>) -> Self {
        let mut member = Self::new(MemberKind::Verbatim, "");
        member.body = Some(text.into());
        member
    }

    pub fn modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.push(modifier.into());
        self
    }

    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn documented(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    pub fn type_parameter(mut self, name: impl Into<String>) -> Self {
        self.type_parameters.push(name.into());
        self
    }

    pub fn constraint(mut self, clause: impl Into<String>) -> Self {
        self.constraints.push(clause.into());
        self
    }

    pub fn param(mut self, ty: impl Into<String>, name: impl Into<String>) -> Self {
        self.parameters.push(Parameter::new(ty, name));
        self
    }

    pub fn initializer(mut self, initializer: impl Into<String>) -> Self {
        self.initializer = Some(initializer.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn declarator(mut self, declarator: VariableDeclarator) -> Self {
        self.declarators.push(declarator);
        self
    }

    /// Names of the symbols this syntax node declares
    pub fn symbol_names(&self) -> Vec<&str> {
        if self.kind.is_field_like() && !self.declarators.is_empty() {
            self.declarators.iter().map(|d| d.name.as_str()).collect()
        } else if self.name.is_empty() {
            Vec::new()
        } else {
            vec![self.name.as_str()]
        }
    }
}
