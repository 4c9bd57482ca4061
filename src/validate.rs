//! Post-write syntax validation.
//!
//! A patched file only commits when it parses as a complete program in its
//! language: the tree must contain no ERROR or MISSING nodes. Unlike a
//! "no new errors" check, a file that was already broken stays rejected
//! until a patch actually fixes it.
//!
//! Some grammars accept more than the language does. The Python grammar
//! still parses Python 2 statements and a bare `:=` statement, so those
//! are rejected on top of the error-node check.

use crate::pool;
use crate::ts::{ErrorNode, ParsedSource, SourceLanguage, TreeSitterError};
use std::fmt;
use thiserror::Error;
use tree_sitter::Node;

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{language} source has {count} syntax error(s), first at {}", first_location(.errors))]
    SyntaxErrors {
        language: SourceLanguage,
        count: usize,
        errors: Vec<ErrorLocation>,
    },

    #[error("Tree-sitter error: {0}")]
    TreeSitter(#[from] TreeSitterError),
}

fn first_location(errors: &[ErrorLocation]) -> String {
    errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown location".to_string())
}

/// Location of an error node in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    pub byte_start: usize,
    pub byte_end: usize,
    pub line: usize,
    pub column: usize,
    pub context: String,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{} near `{}`", self.line, self.column, self.context)
    }
}

/// Validation through the thread-local parser pool.
pub mod pooled {
    use super::*;

    /// Validate source code using the pooled parser for `language`.
    pub fn validate(language: SourceLanguage, source: &str) -> Result<(), ValidationError> {
        pool::with_parser(language, |parser| {
            let parsed = parser.parse_with_source(source)?;
            check_parsed(language, &parsed)
        })?
    }
}

fn check_parsed(language: SourceLanguage, parsed: &ParsedSource<'_>) -> Result<(), ValidationError> {
    let nodes = if parsed.has_errors() {
        parsed.error_nodes()
    } else {
        unsupported_constructs(language, parsed)
    };

    if nodes.is_empty() {
        return Ok(());
    }

    let errors: Vec<ErrorLocation> = nodes
        .iter()
        .map(|node| locate(node, parsed.source))
        .collect();
    Err(ValidationError::SyntaxErrors {
        language,
        count: errors.len(),
        errors,
    })
}

/// Nodes the grammar accepts but the language rejects.
fn unsupported_constructs(language: SourceLanguage, parsed: &ParsedSource<'_>) -> Vec<ErrorNode> {
    match language {
        SourceLanguage::Python => parsed.find_nodes(rejected_by_python3),
        _ => Vec::new(),
    }
}

/// `print x`, `exec "code"` and an unparenthesized `y := 2` statement.
fn rejected_by_python3(node: Node<'_>) -> bool {
    match node.kind() {
        "print_statement" | "exec_statement" => true,
        "named_expression" => node
            .parent()
            .is_some_and(|parent| parent.kind() == "expression_statement"),
        _ => false,
    }
}

fn locate(node: &ErrorNode, source: &str) -> ErrorLocation {
    // Up to 20 bytes on either side of the error
    let context_start = floor_char_boundary(source, node.byte_start.saturating_sub(20));
    let context_end = floor_char_boundary(source, (node.byte_end + 20).min(source.len()));
    let context = source
        .get(context_start..context_end)
        .unwrap_or("")
        .replace('\n', "\\n");

    ErrorLocation {
        byte_start: node.byte_start,
        byte_end: node.byte_end,
        line: node.start_point.row + 1,
        column: node.start_point.column + 1,
        context,
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
