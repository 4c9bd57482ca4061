//! Tree-sitter integration for post-write syntax checks.
//!
//! Grammars are taken from `ast-grep-language`, so any language listed in
//! [`SourceLanguage`] can be parsed without pulling in extra grammar crates.

pub mod errors;
pub mod lang;
pub mod parser;

pub use errors::TreeSitterError;
pub use lang::SourceLanguage;
pub use parser::{ErrorNode, ParsedSource, SourceParser};
