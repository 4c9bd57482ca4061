use crate::ts::errors::TreeSitterError;
use crate::ts::lang::SourceLanguage;
use ast_grep_language::LanguageExt;
use tree_sitter::{Node, Parser, Tree};

/// Tree-sitter parser bound to one target language.
pub struct SourceParser {
    parser: Parser,
}

impl SourceParser {
    /// Create a parser for the given language.
    pub fn new(language: SourceLanguage) -> Result<Self, TreeSitterError> {
        let mut parser = Parser::new();
        // The grammar is the one bundled with ast-grep-language
        let ts_lang = language.support_lang().get_ts_language();
        parser
            .set_language(&ts_lang)
            .map_err(|_| TreeSitterError::LanguageSet { language })?;

        Ok(Self { parser })
    }

    /// Parse source code and return the tree along with the source.
    pub fn parse_with_source<'a>(
        &mut self,
        source: &'a str,
    ) -> Result<ParsedSource<'a>, TreeSitterError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or(TreeSitterError::ParseFailed)?;
        Ok(ParsedSource { source, tree })
    }
}

/// A parsed source file with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
}

impl<'a> ParsedSource<'a> {
    /// Check if the tree contains any ERROR or MISSING nodes.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Get all ERROR and MISSING nodes in the tree.
    pub fn error_nodes(&self) -> Vec<ErrorNode> {
        let mut errors = Vec::new();
        collect_error_nodes(self.tree.root_node(), &mut errors);
        errors
    }

    /// Spans of every node, in document order, for which `matches` holds.
    pub fn find_nodes(&self, mut matches: impl FnMut(Node<'_>) -> bool) -> Vec<ErrorNode> {
        let mut found = Vec::new();
        let mut cursor = self.tree.walk();

        loop {
            let node = cursor.node();
            if matches(node) {
                found.push(ErrorNode::from(node));
            }

            if cursor.goto_first_child() || cursor.goto_next_sibling() {
                continue;
            }
            // Climb until a sibling is found or the root is reached
            loop {
                if !cursor.goto_parent() {
                    return found;
                }
                if cursor.goto_next_sibling() {
                    break;
                }
            }
        }
    }
}

/// Span of a node the validator reports on.
#[derive(Debug, Clone)]
pub struct ErrorNode {
    pub byte_start: usize,
    pub byte_end: usize,
    pub start_point: tree_sitter::Point,
}

impl From<Node<'_>> for ErrorNode {
    fn from(node: Node<'_>) -> Self {
        Self {
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            start_point: node.start_position(),
        }
    }
}

fn collect_error_nodes(node: Node<'_>, errors: &mut Vec<ErrorNode>) {
    if node.is_error() || node.is_missing() {
        errors.push(ErrorNode::from(node));
    }

    // Subtrees without errors cannot contain ERROR nodes
    if !node.has_error() {
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_python() {
        let mut parser = SourceParser::new(SourceLanguage::Python).unwrap();
        let source = "def main():\n    print(\"hello\")\n";
        let parsed = parser.parse_with_source(source).unwrap();

        assert!(!parsed.has_errors());
        assert_eq!(parsed.tree.root_node().kind(), "module");
    }

    #[test]
    fn test_parse_invalid_python() {
        let mut parser = SourceParser::new(SourceLanguage::Python).unwrap();
        let source = "def main(:\n    pass\n";
        let parsed = parser.parse_with_source(source).unwrap();

        assert!(parsed.has_errors());
        assert!(!parsed.error_nodes().is_empty());
    }

    #[test]
    fn test_parse_valid_rust() {
        let mut parser = SourceParser::new(SourceLanguage::Rust).unwrap();
        let parsed = parser
            .parse_with_source("fn main() { println!(\"hello\"); }")
            .unwrap();

        assert!(!parsed.has_errors());
        assert_eq!(parsed.tree.root_node().kind(), "source_file");
    }

    #[test]
    fn test_find_nodes_in_document_order() {
        let mut parser = SourceParser::new(SourceLanguage::Python).unwrap();
        let source = "a = 1\ndef f():\n    b = 2\nc = 3\n";
        let parsed = parser.parse_with_source(source).unwrap();

        let assignments = parsed.find_nodes(|node| node.kind() == "assignment");
        let rows: Vec<usize> = assignments.iter().map(|n| n.start_point.row).collect();
        assert_eq!(rows, vec![0, 2, 3]);
    }
}
