//! Identifier-level rewriting of member text.
//!
//! One pass over the token stream performs both the self-type rewrite used
//! for special members and generic type-parameter substitution. A self-type
//! reference such as `Source<T>` is replaced as a whole before its arguments
//! are looked at, so a destination that reuses a source parameter name never
//! sees that name substituted twice.

use super::lexer::{tokenize, RewriteError, Token, TokenKind, TYPE_KEYWORDS};
use std::collections::{HashMap, HashSet};

/// Replace references to the source type with the destination's self type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTypeRewrite {
    pub source_name: String,
    /// Number of type arguments a reference must carry to match
    pub arity: usize,
    pub replacement: String,
}

pub struct Rewriter<'a> {
    substitutions: &'a HashMap<String, String>,
    self_type: Option<&'a SelfTypeRewrite>,
    shadowed: HashSet<String>,
    track_locals: bool,
}

impl<'a> Rewriter<'a> {
    pub fn new(substitutions: &'a HashMap<String, String>) -> Self {
        Self {
            substitutions,
            self_type: None,
            shadowed: HashSet::new(),
            track_locals: false,
        }
    }

    pub fn with_self_type(mut self, self_type: Option<&'a SelfTypeRewrite>) -> Self {
        self.self_type = self_type;
        self
    }

    /// Names bound outside the rewritten text (method type parameters,
    /// parameter names) that hide type parameters of the source
    pub fn shadowing<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shadowed.extend(names.into_iter().map(Into::into));
        self
    }

    /// Treat the text as statements and honour locals and lambda parameters
    pub fn tracking_locals(mut self) -> Self {
        self.track_locals = true;
        self
    }

    pub fn is_identity(&self) -> bool {
        self.substitutions.is_empty() && self.self_type.is_none()
    }

    pub fn rewrite(&self, text: &str) -> Result<String, RewriteError> {
        if self.is_identity() {
            return Ok(text.to_string());
        }

        let tokens = tokenize(text)?;
        let significant: Vec<usize> = (0..tokens.len())
            .filter(|index| !tokens[*index].is_trivia())
            .collect();
        let stream = Stream {
            tokens: &tokens,
            significant: &significant,
        };

        let mut replaced: Vec<Option<&str>> = vec![None; tokens.len()];
        let mut dropped = vec![false; tokens.len()];
        let mut scopes = Scopes::default();

        let mut k = 0;
        while k < significant.len() {
            let token = stream.at(k);
            match (token.kind, token.text) {
                (TokenKind::Punct, "{") => scopes.open_block(),
                (TokenKind::Punct, "}") => scopes.close_block(),
                (TokenKind::Punct, ";") => scopes.end_statement(),
                (TokenKind::Punct, ",") => scopes.separator(),
                (TokenKind::Punct, ")") | (TokenKind::Punct, "]") => scopes.close_group(),
                (TokenKind::Punct, "[") => scopes.open_group(),
                (TokenKind::Punct, "(") => {
                    if self.track_locals {
                        if let Some(close) = stream.matching_paren(k) {
                            if stream.text(close + 1) == Some("=>") {
                                scopes.open_lambda();
                                for j in k + 1..close {
                                    let candidate = stream.at(j);
                                    if candidate.kind == TokenKind::Identifier
                                        && matches!(stream.text(j + 1), Some(",") | Some(")"))
                                    {
                                        scopes.bind(candidate.text);
                                    }
                                }
                            }
                        }
                    }
                    scopes.open_group();
                }
                (TokenKind::Identifier, name) => {
                    let after_access = k
                        .checked_sub(1)
                        .and_then(|prev| stream.text(prev))
                        .is_some_and(|prev| matches!(prev, "." | "?." | "::" | "->"));
                    if after_access {
                        k += 1;
                        continue;
                    }
                    if self.track_locals && stream.text(k + 1) == Some("=>") {
                        scopes.open_lambda();
                        scopes.bind(name);
                        k += 1;
                        continue;
                    }
                    if self.track_locals && stream.declares(k) {
                        scopes.bind(name);
                        k += 1;
                        continue;
                    }
                    if !self.shadowed.contains(name) && !scopes.binds(name) {
                        if let Some(self_type) = self.self_type.filter(|s| s.source_name == name) {
                            if let Some(end) = stream.self_type_end(k, self_type.arity) {
                                replaced[significant[k]] = Some(self_type.replacement.as_str());
                                for flag in &mut dropped[significant[k] + 1..=significant[end]] {
                                    *flag = true;
                                }
                                k = end + 1;
                                continue;
                            }
                        }
                        if let Some(substitute) = self.substitutions.get(name) {
                            replaced[significant[k]] = Some(substitute.as_str());
                        }
                    }
                }
                _ => {}
            }
            k += 1;
        }

        let mut out = String::with_capacity(text.len());
        for (index, token) in tokens.iter().enumerate() {
            if dropped[index] {
                continue;
            }
            out.push_str(replaced[index].unwrap_or(token.text));
        }
        Ok(out)
    }
}

struct Scope<'a> {
    names: HashSet<&'a str>,
    /// Group nesting depth a lambda was opened at; `None` for blocks
    lambda_depth: Option<usize>,
}

/// Binding scopes seen so far. Blocks end at their closing brace; expression
/// lambdas end when the enclosing argument, group or statement does.
struct Scopes<'a> {
    stack: Vec<Scope<'a>>,
    depth: usize,
}

impl Default for Scopes<'_> {
    fn default() -> Self {
        Self {
            stack: vec![Scope {
                names: HashSet::new(),
                lambda_depth: None,
            }],
            depth: 0,
        }
    }
}

impl<'a> Scopes<'a> {
    fn bind(&mut self, name: &'a str) {
        if let Some(scope) = self.stack.last_mut() {
            scope.names.insert(name);
        }
    }

    fn binds(&self, name: &str) -> bool {
        self.stack.iter().any(|scope| scope.names.contains(name))
    }

    fn open_block(&mut self) {
        self.stack.push(Scope {
            names: HashSet::new(),
            lambda_depth: None,
        });
    }

    fn close_block(&mut self) {
        self.close_lambdas(|_| true);
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    fn open_lambda(&mut self) {
        self.stack.push(Scope {
            names: HashSet::new(),
            lambda_depth: Some(self.depth),
        });
    }

    fn open_group(&mut self) {
        self.depth += 1;
    }

    fn close_group(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        let depth = self.depth;
        self.close_lambdas(|opened| depth < opened);
    }

    fn separator(&mut self) {
        let depth = self.depth;
        self.close_lambdas(|opened| depth == opened);
    }

    fn end_statement(&mut self) {
        self.close_lambdas(|_| true);
    }

    fn close_lambdas(&mut self, ends: impl Fn(usize) -> bool) {
        while let Some(opened) = self.stack.last().and_then(|scope| scope.lambda_depth) {
            if !ends(opened) {
                break;
            }
            self.stack.pop();
        }
    }
}

/// Significant (non-trivia) tokens addressed by position
struct Stream<'t, 'a> {
    tokens: &'t [Token<'a>],
    significant: &'t [usize],
}

impl<'t, 'a> Stream<'t, 'a> {
    fn at(&self, k: usize) -> Token<'a> {
        self.tokens[self.significant[k]]
    }

    fn text(&self, k: usize) -> Option<&'a str> {
        self.significant.get(k).map(|index| self.tokens[*index].text)
    }

    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for k in open..self.significant.len() {
            match self.text(k) {
                Some("(") => depth += 1,
                Some(")") => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(k);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Whether the identifier at `k` introduces a local or lambda parameter
    fn declares(&self, k: usize) -> bool {
        let next = self.text(k + 1);
        if next == Some("=>") {
            return true;
        }
        if !matches!(next, Some("=") | Some(";") | Some(",") | Some(")") | Some("in")) {
            return false;
        }
        let Some(prev) = k.checked_sub(1).map(|p| self.at(p)) else {
            return false;
        };
        match prev.kind {
            TokenKind::Identifier => true,
            TokenKind::Keyword => TYPE_KEYWORDS.contains(&prev.text),
            TokenKind::Punct => matches!(prev.text, ">" | "]" | "?"),
            _ => false,
        }
    }

    /// Last token of a self-type reference starting at `k`, if the reference
    /// carries exactly `arity` type arguments
    fn self_type_end(&self, k: usize, arity: usize) -> Option<usize> {
        let opens_arguments = self.text(k + 1) == Some("<");
        if arity == 0 {
            return (!opens_arguments).then_some(k);
        }
        if !opens_arguments {
            return None;
        }

        let mut angle = 0usize;
        let mut nested = 0usize;
        let mut arguments = 1;
        for j in k + 1..self.significant.len() {
            match self.text(j)? {
                "<" => angle += 1,
                ">" => {
                    angle -= 1;
                    if angle == 0 {
                        return (arguments == arity).then_some(j);
                    }
                }
                "(" | "[" => nested += 1,
                ")" | "]" => nested = nested.checked_sub(1)?,
                "," if angle == 1 && nested == 0 => arguments += 1,
                ";" | "{" | "}" | "=" | "==" | "&&" | "||" => return None,
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_inside_nested_generics() {
        let subs = map(&[("T", "int")]);
        let rewriter = Rewriter::new(&subs).tracking_locals();
        assert_eq!(
            rewriter
                .rewrite("Dictionary<string, List<T>> items = new Dictionary<string, List<T>>();")
                .unwrap(),
            "Dictionary<string, List<int>> items = new Dictionary<string, List<int>>();"
        );
    }

    #[test]
    fn leaves_literals_comments_and_member_access() {
        let subs = map(&[("T", "int")]);
        let rewriter = Rewriter::new(&subs).tracking_locals();
        assert_eq!(
            rewriter
                .rewrite(r#"Log("T" + 'T' + other.T); // T stays"#)
                .unwrap(),
            r#"Log("T" + 'T' + other.T); // T stays"#
        );
        assert_eq!(
            rewriter.rewrite(r#"$"{default(T)} of T""#).unwrap(),
            r#"$"{default(int)} of T""#
        );
    }

    #[test]
    fn hole_alignment_and_format_survive() {
        let subs = map(&[("T", "int")]);
        let rewriter = Rewriter::new(&subs).tracking_locals();
        assert_eq!(
            rewriter
                .rewrite(r#"=> $"{Value,8:N2} of {typeof(T)} at {Stamp:HH:mm}""#)
                .unwrap(),
            r#"=> $"{Value,8:N2} of {typeof(int)} at {Stamp:HH:mm}""#
        );
    }

    #[test]
    fn outer_bindings_shadow_type_parameters() {
        let subs = map(&[("T", "int")]);
        let rewriter = Rewriter::new(&subs).shadowing(["T"]).tracking_locals();
        assert_eq!(rewriter.rewrite("return default(T);").unwrap(), "return default(T);");
    }

    #[test]
    fn locals_shadow_until_their_block_closes() {
        let subs = map(&[("T", "int")]);
        let rewriter = Rewriter::new(&subs).tracking_locals();
        assert_eq!(
            rewriter
                .rewrite("{ { var T = 1; Use(T); } T value = default; }")
                .unwrap(),
            "{ { var T = 1; Use(T); } int value = default; }"
        );
    }

    #[test]
    fn lambda_parameters_shadow() {
        let subs = map(&[("T", "int")]);
        let rewriter = Rewriter::new(&subs).tracking_locals();
        assert_eq!(
            rewriter.rewrite("xs.Select(T => T.Length)").unwrap(),
            "xs.Select(T => T.Length)"
        );
        assert_eq!(
            rewriter.rewrite("xs.Zip(ys, (T, b) => T + b); List<T> l;").unwrap(),
            "xs.Zip(ys, (T, b) => T + b); List<int> l;"
        );
    }

    #[test]
    fn self_type_replaced_before_arguments() {
        let subs = map(&[("T", "string")]);
        let self_type = SelfTypeRewrite {
            source_name: "Source".to_string(),
            arity: 1,
            replacement: "Dest<T>".to_string(),
        };
        let rewriter = Rewriter::new(&subs).with_self_type(Some(&self_type));
        assert_eq!(
            rewriter.rewrite("List<Source<T>>").unwrap(),
            "List<Dest<T>>"
        );
        assert_eq!(rewriter.rewrite("Source<T, T>").unwrap(), "Source<string, string>");
        assert_eq!(rewriter.rewrite("Source").unwrap(), "Source");
    }

    #[test]
    fn non_generic_self_type() {
        let subs = HashMap::new();
        let self_type = SelfTypeRewrite {
            source_name: "Money".to_string(),
            arity: 0,
            replacement: "Price".to_string(),
        };
        let rewriter = Rewriter::new(&subs).with_self_type(Some(&self_type));
        assert_eq!(rewriter.rewrite("IEquatable<Money>").unwrap(), "IEquatable<Price>");
        assert_eq!(rewriter.rewrite("Money<int>").unwrap(), "Money<int>");
    }

    #[test]
    fn identity_rewriter_skips_lexing() {
        let subs = HashMap::new();
        assert_eq!(Rewriter::new(&subs).rewrite("\"unterminated").unwrap(), "\"unterminated");
    }

    #[test]
    fn lexing_errors_propagate() {
        let subs = map(&[("T", "int")]);
        assert!(Rewriter::new(&subs).rewrite("/* open").is_err());
    }
}
