//! Thread-local parser pooling.
//!
//! A debugging session re-validates the same file after every patch, so the
//! parser for its language is created once per thread and reused.

use crate::ts::{SourceLanguage, SourceParser, TreeSitterError};
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static PARSERS: RefCell<HashMap<SourceLanguage, SourceParser>> =
        RefCell::new(HashMap::new());
}

/// Execute function with the pooled parser for `language`.
///
/// On first call per thread and language, creates a new parser. Subsequent
/// calls reuse the same instance.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use autofix::pool::with_parser;
/// use autofix::ts::SourceLanguage;
///
/// let has_errors = with_parser(SourceLanguage::Python, |parser| {
///     parser.parse_with_source("print('hi')\n").map(|p| p.has_errors())
/// })??;
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(language: SourceLanguage, f: F) -> Result<R, TreeSitterError>
where
    F: FnOnce(&mut SourceParser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(language) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(SourceParser::new(language)?)
            }
        };
        Ok(f(parser))
    })
}
