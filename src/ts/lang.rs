//! Target language detection.
//!
//! Grammars come from `ast-grep-language`'s built-in set; we only map file
//! extensions onto the handful of languages a debugged script is likely to
//! be written in.

use ast_grep_language::SupportLang;
use std::fmt;
use std::path::Path;

/// Language of a target file, as far as syntax validation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLanguage {
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Ruby,
    Go,
    Bash,
}

impl SourceLanguage {
    /// Detect the language from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    /// Map a bare extension (without the dot) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyw" => Some(SourceLanguage::Python),
            "rs" => Some(SourceLanguage::Rust),
            "js" | "mjs" | "cjs" => Some(SourceLanguage::JavaScript),
            "ts" | "mts" | "cts" => Some(SourceLanguage::TypeScript),
            "rb" => Some(SourceLanguage::Ruby),
            "go" => Some(SourceLanguage::Go),
            "sh" | "bash" => Some(SourceLanguage::Bash),
            _ => None,
        }
    }

    /// The ast-grep language carrying the tree-sitter grammar.
    pub fn support_lang(self) -> SupportLang {
        match self {
            SourceLanguage::Python => SupportLang::Python,
            SourceLanguage::Rust => SupportLang::Rust,
            SourceLanguage::JavaScript => SupportLang::JavaScript,
            SourceLanguage::TypeScript => SupportLang::TypeScript,
            SourceLanguage::Ruby => SupportLang::Ruby,
            SourceLanguage::Go => SupportLang::Go,
            SourceLanguage::Bash => SupportLang::Bash,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SourceLanguage::Python => "python",
            SourceLanguage::Rust => "rust",
            SourceLanguage::JavaScript => "javascript",
            SourceLanguage::TypeScript => "typescript",
            SourceLanguage::Ruby => "ruby",
            SourceLanguage::Go => "go",
            SourceLanguage::Bash => "bash",
        }
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_python_scripts() {
        assert_eq!(
            SourceLanguage::from_path("scripts/script_1.py"),
            Some(SourceLanguage::Python)
        );
        assert_eq!(
            SourceLanguage::from_path("tool.PYW"),
            Some(SourceLanguage::Python)
        );
    }

    #[test]
    fn test_detects_other_languages() {
        assert_eq!(SourceLanguage::from_path("main.rs"), Some(SourceLanguage::Rust));
        assert_eq!(SourceLanguage::from_path("a.mjs"), Some(SourceLanguage::JavaScript));
        assert_eq!(SourceLanguage::from_path("run.sh"), Some(SourceLanguage::Bash));
    }

    #[test]
    fn test_unknown_extension_is_none() {
        assert_eq!(SourceLanguage::from_path("notes.txt"), None);
        assert_eq!(SourceLanguage::from_path("Makefile"), None);
    }
}
