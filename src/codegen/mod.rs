//! # Member Transplantation
//!
//! Text-level machinery that turns source members into requestor members:
//! a shallow lexer, the identifier rewriter, member rendering and the
//! transplantation engine driving them.

mod lexer;
mod render;
mod rewrite;
mod transplant;

pub use lexer::{tokenize, RewriteError, Token, TokenKind};
pub use render::{render_attribute, render_documentation, render_member};
pub use rewrite::{Rewriter, SelfTypeRewrite};
pub use transplant::*;

use std::collections::HashMap;

/// Substitute type parameters inside a type reference.
///
/// Text that cannot be lexed is returned unchanged.
pub fn substitute_type_text(text: &str, substitutions: &HashMap<String, String>) -> String {
    Rewriter::new(substitutions)
        .rewrite(text)
        .unwrap_or_else(|_| text.to_string())
}
