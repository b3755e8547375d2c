//! # Copy Directives
//!
//! Raw directive and pattern records as the annotation surface supplies them,
//! and the single parse boundary turning them into immutable value objects.

use crate::model::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Extra declaration-level constructs copied along with the members
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditionalConstructs(u8);

impl AdditionalConstructs {
    pub const NONE: Self = Self(0);
    pub const DOCUMENTATION: Self = Self(1);
    pub const ATTRIBUTES: Self = Self(1 << 1);
    pub const BASE_TYPE: Self = Self(1 << 2);
    pub const BASE_INTERFACES: Self = Self(1 << 3);
    pub const CONSTRAINTS: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b1_1111);

    const NAMED: [(AdditionalConstructs, &'static str); 5] = [
        (Self::DOCUMENTATION, "documentation"),
        (Self::ATTRIBUTES, "attributes"),
        (Self::BASE_TYPE, "base type"),
        (Self::BASE_INTERFACES, "base interfaces"),
        (Self::CONSTRAINTS, "constraints"),
    ];

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Bits outside the known flag set
    pub const fn unknown_bits(self) -> u8 {
        self.0 & !Self::ALL.0
    }

    /// Single flags contained in this set, in a fixed order
    pub fn iter(self) -> impl Iterator<Item = AdditionalConstructs> {
        Self::NAMED
            .into_iter()
            .map(|(flag, _)| flag)
            .filter(move |flag| self.contains(*flag))
    }
}

impl fmt::Display for AdditionalConstructs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(", "))
        }
    }
}

fn default_true() -> bool {
    true
}

/// Directive configuration exactly as attached to a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveRecord {
    /// Raw type reference, e.g. `Box<string>`, `Ns.Template`, `Pair<,>`
    pub source: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub partial_part: Option<String>,
    #[serde(default)]
    pub additional_constructs: AdditionalConstructs,
    #[serde(default = "default_true")]
    pub handle_special_members: bool,
    #[serde(default)]
    pub required_imports: Vec<String>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

impl DirectiveRecord {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            order: 0,
            partial_part: None,
            additional_constructs: AdditionalConstructs::NONE,
            handle_special_members: true,
            required_imports: Vec::new(),
            location: None,
        }
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn partial_part(mut self, part: impl Into<String>) -> Self {
        self.partial_part = Some(part.into());
        self
    }

    pub fn constructs(mut self, constructs: AdditionalConstructs) -> Self {
        self.additional_constructs = constructs;
        self
    }

    pub fn special_members(mut self, handle: bool) -> Self {
        self.handle_special_members = handle;
        self
    }

    pub fn import(mut self, import: impl Into<String>) -> Self {
        self.required_imports.push(import.into());
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

/// Pattern configuration exactly as attached to a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub pattern: String,
    #[serde(default)]
    pub replacement: Option<String>,
    #[serde(default)]
    pub order: i32,
}

impl PatternRecord {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: Some(replacement.into()),
            order: 0,
        }
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

/// Parsed form of a raw type reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceReference {
    pub name: String,
    /// Concrete type arguments; empty for non-generic and open references
    pub type_arguments: Vec<String>,
    /// Arity of an open generic reference such as `Pair<,>`
    pub open_arity: usize,
}

impl SourceReference {
    pub fn arity(&self) -> usize {
        if self.type_arguments.is_empty() {
            self.open_arity
        } else {
            self.type_arguments.len()
        }
    }

    pub fn is_closed_generic(&self) -> bool {
        !self.type_arguments.is_empty()
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_closed_generic() {
            write!(f, "{}<{}>", self.name, self.type_arguments.join(", "))
        } else if self.open_arity > 0 {
            write!(f, "{}<{}>", self.name, ",".repeat(self.open_arity - 1))
        } else {
            f.write_str(&self.name)
        }
    }
}

/// A validated copy directive, one per record, immutable for the pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyDirective {
    /// Position among the requestor's records
    pub index: usize,
    pub source: SourceReference,
    pub order: i32,
    pub partial_part: Option<String>,
    pub constructs: AdditionalConstructs,
    pub handle_special_members: bool,
    pub required_imports: Vec<String>,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRule {
    pub pattern: String,
    pub replacement: String,
    pub order: i32,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveParseError {
    #[error("the source reference is empty")]
    EmptyReference,
    #[error("unbalanced type argument list in '{0}'")]
    UnbalancedTypeArguments(String),
    #[error("empty type argument in '{0}'")]
    EmptyTypeArgument(String),
    #[error("unknown additional construct flags {0:#04x}")]
    UnknownConstructs(u8),
    #[error("the partial part name is empty")]
    EmptyPartialPart,
}

/// Parse a raw type reference such as `Ns.Box<List<int>, string>`
pub fn parse_reference(raw: &str) -> Result<SourceReference, DirectiveParseError> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("global::").unwrap_or(raw);
    if raw.is_empty() {
        return Err(DirectiveParseError::EmptyReference);
    }

    let Some(open) = raw.find('<') else {
        if raw.contains('>') {
            return Err(DirectiveParseError::UnbalancedTypeArguments(raw.to_string()));
        }
        return Ok(SourceReference {
            name: raw.to_string(),
            type_arguments: Vec::new(),
            open_arity: 0,
        });
    };

    let name = raw[..open].trim();
    if name.is_empty() {
        return Err(DirectiveParseError::EmptyReference);
    }
    if !raw.ends_with('>') {
        return Err(DirectiveParseError::UnbalancedTypeArguments(raw.to_string()));
    }
    let inner = &raw[open + 1..raw.len() - 1];
    let arguments = split_type_arguments(inner)
        .ok_or_else(|| DirectiveParseError::UnbalancedTypeArguments(raw.to_string()))?;

    if arguments.iter().all(|argument| argument.is_empty()) {
        return Ok(SourceReference {
            name: name.to_string(),
            type_arguments: Vec::new(),
            open_arity: arguments.len(),
        });
    }
    if arguments.iter().any(|argument| argument.is_empty()) {
        return Err(DirectiveParseError::EmptyTypeArgument(raw.to_string()));
    }

    Ok(SourceReference {
        name: name.to_string(),
        type_arguments: arguments,
        open_arity: 0,
    })
}

/// Split a type argument list on top-level commas
pub fn split_type_arguments(inner: &str) -> Option<Vec<String>> {
    let mut arguments = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '<' | '(' | '[' => {
                depth += 1;
                current.push(ch);
            }
            '>' | ')' | ']' => {
                depth = depth.checked_sub(1)?;
                current.push(ch);
            }
            ',' if depth == 0 => {
                arguments.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return None;
    }
    arguments.push(current.trim().to_string());
    Some(arguments)
}

/// Convert one raw directive record into a [`CopyDirective`]
pub fn parse_directive(
    index: usize,
    record: &DirectiveRecord,
) -> Result<CopyDirective, DirectiveParseError> {
    let source = parse_reference(&record.source)?;

    let unknown = record.additional_constructs.unknown_bits();
    if unknown != 0 {
        return Err(DirectiveParseError::UnknownConstructs(unknown));
    }

    let partial_part = match &record.partial_part {
        Some(part) if part.trim().is_empty() => return Err(DirectiveParseError::EmptyPartialPart),
        Some(part) => Some(part.trim().to_string()),
        None => None,
    };

    Ok(CopyDirective {
        index,
        source,
        order: record.order,
        partial_part,
        constructs: record.additional_constructs,
        handle_special_members: record.handle_special_members,
        required_imports: record
            .required_imports
            .iter()
            .map(|import| import.trim().to_string())
            .filter(|import| !import.is_empty())
            .collect(),
        location: record.location.clone(),
    })
}

/// Convert a raw pattern record; a missing replacement deletes the match
pub fn parse_pattern(index: usize, record: &PatternRecord) -> PatternRule {
    PatternRule {
        pattern: record.pattern.clone(),
        replacement: record.replacement.clone().unwrap_or_default(),
        order: record.order,
        index,
    }
}
