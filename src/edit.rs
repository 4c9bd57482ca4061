//! Line-level edit primitives.
//!
//! A [`PatchBatch`] is a set of [`EditOperation`]s proposed together. The
//! batch is applied bottom-to-top (descending line number) so that an
//! insert or delete at a lower line never shifts the line numbers of edits
//! still waiting to be applied.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// What an [`EditOperation`] does to its target line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditAction {
    Replace,
    Insert,
    Delete,
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EditAction::Replace => "replace",
            EditAction::Insert => "insert",
            EditAction::Delete => "delete",
        })
    }
}

/// One requested textual change.
///
/// `line` is 1-based. For inserts, `0` prepends and any value past the end
/// of the file appends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOperation {
    pub action: EditAction,
    pub line: usize,
    pub content: String,
}

impl EditOperation {
    pub fn replace(line: usize, content: impl Into<String>) -> Self {
        Self {
            action: EditAction::Replace,
            line,
            content: content.into(),
        }
    }

    pub fn insert(line: usize, content: impl Into<String>) -> Self {
        Self {
            action: EditAction::Insert,
            line,
            content: content.into(),
        }
    }

    pub fn delete(line: usize) -> Self {
        Self {
            action: EditAction::Delete,
            line,
            content: String::new(),
        }
    }

    /// Whether this operation can be applied to a file of `line_count` lines.
    pub fn in_range(&self, line_count: usize) -> bool {
        match self.action {
            EditAction::Insert => true,
            EditAction::Replace | EditAction::Delete => (1..=line_count).contains(&self.line),
        }
    }
}

impl fmt::Display for EditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} line {}", self.action, self.line)
    }
}

/// Edits proposed together from one diagnosis pass.
///
/// The producer's order carries no meaning; see [`PatchBatch::application_order`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchBatch {
    operations: Vec<EditOperation>,
}

impl PatchBatch {
    pub fn new(operations: Vec<EditOperation>) -> Self {
        Self { operations }
    }

    pub fn push(&mut self, op: EditOperation) {
        self.operations.push(op);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[EditOperation] {
        &self.operations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EditOperation> {
        self.operations.iter()
    }

    /// Operations sorted by line number descending.
    ///
    /// The sort is stable, so operations on the same line keep the
    /// producer's relative order.
    pub fn application_order(&self) -> Vec<&EditOperation> {
        let mut ordered: Vec<&EditOperation> = self.operations.iter().collect();
        ordered.sort_by(|a, b| b.line.cmp(&a.line));
        ordered
    }
}

impl From<Vec<EditOperation>> for PatchBatch {
    fn from(operations: Vec<EditOperation>) -> Self {
        Self::new(operations)
    }
}

impl FromIterator<EditOperation> for PatchBatch {
    fn from_iter<I: IntoIterator<Item = EditOperation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PatchBatch {
    type Item = &'a EditOperation;
    type IntoIter = std::slice::Iter<'a, EditOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

/// Result of applying a batch to in-memory text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedText {
    pub content: String,
    pub applied: usize,
    /// Operations that were out of range and left untouched.
    pub skipped: Vec<EditOperation>,
}

/// File content held as lines, each keeping its own terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBuffer {
    lines: Vec<String>,
    newline: &'static str,
}

impl LineBuffer {
    /// Split `content` into lines, preserving `\n` / `\r\n` terminators.
    pub fn parse(content: &str) -> Self {
        let lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();
        let newline = match lines.first() {
            Some(first) if first.ends_with("\r\n") => "\r\n",
            _ => "\n",
        };
        Self { lines, newline }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Apply one operation. Returns `false` when it was out of range.
    pub fn apply(&mut self, op: &EditOperation) -> bool {
        if !op.in_range(self.lines.len()) {
            return false;
        }

        match op.action {
            EditAction::Replace => {
                let original = &self.lines[op.line - 1];
                let (body, terminator) = split_terminator(original);
                let indent_len = body.len() - body.trim_start().len();
                let indent = &body[..indent_len];
                let terminator = if terminator.is_empty() {
                    self.newline
                } else {
                    terminator
                };

                let replacement = format!(
                    "{indent}{}{terminator}",
                    strip_terminator(op.content.trim_start())
                );
                debug!(line = op.line, "replacing line");
                self.lines[op.line - 1] = replacement;
            }
            EditAction::Insert => {
                let new_line = format!("{}{}", strip_terminator(&op.content), self.newline);
                if op.line == 0 {
                    debug!("prepending line");
                    self.lines.insert(0, new_line);
                } else if op.line > self.lines.len() {
                    debug!(line = op.line, "appending line");
                    if let Some(last) = self.lines.last_mut() {
                        if !last.ends_with('\n') {
                            last.push_str(self.newline);
                        }
                    }
                    self.lines.push(new_line);
                } else {
                    debug!(line = op.line, "inserting line");
                    self.lines.insert(op.line - 1, new_line);
                }
            }
            EditAction::Delete => {
                debug!(line = op.line, "deleting line");
                self.lines.remove(op.line - 1);
            }
        }

        true
    }

    pub fn into_string(self) -> String {
        self.lines.concat()
    }
}

fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn strip_terminator(text: &str) -> &str {
    text.trim_end_matches(['\r', '\n'])
}

/// Apply a whole batch to `content` in descending line order.
pub fn apply_operations(content: &str, batch: &PatchBatch) -> PatchedText {
    let mut buffer = LineBuffer::parse(content);
    let mut applied = 0;
    let mut skipped = Vec::new();

    for op in batch.application_order() {
        if buffer.apply(op) {
            applied += 1;
        } else {
            debug!(%op, line_count = buffer.len(), "skipping out-of-range edit");
            skipped.push(op.clone());
        }
    }

    PatchedText {
        content: buffer.into_string(),
        applied,
        skipped,
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or nothing changes. The permissions of an
/// existing file at `path` are carried over to the new file.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;

    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(content: &str, ops: Vec<EditOperation>) -> PatchedText {
        apply_operations(content, &PatchBatch::new(ops))
    }

    #[test]
    fn test_line_buffer_preserves_terminators() {
        let content = "a\r\nb\nc";
        let buffer = LineBuffer::parse(content);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.into_string(), content);
    }

    #[test]
    fn test_replace_keeps_indentation() {
        let result = apply(
            "def f():\n    return x / y\n",
            vec![EditOperation::replace(2, "return x / y if y != 0 else 0")],
        );
        assert_eq!(result.content, "def f():\n    return x / y if y != 0 else 0\n");
        assert_eq!(result.applied, 1);
    }

    #[test]
    fn test_replace_reindents_over_indented_content() {
        let result = apply(
            "if a:\n\tb()\n",
            vec![EditOperation::replace(2, "        c()\n")],
        );
        assert_eq!(result.content, "if a:\n\tc()\n");
    }

    #[test]
    fn test_replace_last_line_without_terminator() {
        let result = apply("a()\nb()", vec![EditOperation::replace(2, "c()")]);
        assert_eq!(result.content, "a()\nc()\n");
    }

    #[test]
    fn test_replace_keeps_crlf() {
        let result = apply("a()\r\nb()\r\n", vec![EditOperation::replace(1, "z()")]);
        assert_eq!(result.content, "z()\r\nb()\r\n");
    }

    #[test]
    fn test_insert_prepend_middle_append() {
        let result = apply(
            "b\nd\n",
            vec![
                EditOperation::insert(0, "a"),
                EditOperation::insert(2, "c"),
                EditOperation::insert(99, "e"),
            ],
        );
        assert_eq!(result.content, "a\nb\nc\nd\ne\n");
        assert_eq!(result.applied, 3);
    }

    #[test]
    fn test_append_terminates_previous_last_line() {
        let result = apply("a()", vec![EditOperation::insert(5, "b()")]);
        assert_eq!(result.content, "a()\nb()\n");
    }

    #[test]
    fn test_delete_removes_line() {
        let result = apply("a\nb\nc\n", vec![EditOperation::delete(2)]);
        assert_eq!(result.content, "a\nc\n");
    }

    #[test]
    fn test_out_of_range_operations_are_skipped() {
        let result = apply(
            "a\nb\n",
            vec![
                EditOperation::replace(0, "x"),
                EditOperation::replace(3, "x"),
                EditOperation::delete(7),
                EditOperation::replace(1, "A"),
            ],
        );
        assert_eq!(result.content, "A\nb\n");
        assert_eq!(result.applied, 1);
        assert_eq!(result.skipped.len(), 3);
    }

    #[test]
    fn test_descending_order_keeps_line_numbers_stable() {
        // Delete line 1 and replace line 3 of the original file
        let result = apply(
            "one\ntwo\nthree\n",
            vec![EditOperation::delete(1), EditOperation::replace(3, "THREE")],
        );
        assert_eq!(result.content, "two\nTHREE\n");
    }

    #[test]
    fn test_application_order_is_stable_for_ties() {
        let batch = PatchBatch::new(vec![
            EditOperation::insert(2, "first"),
            EditOperation::replace(5, "x"),
            EditOperation::insert(2, "second"),
        ]);
        let order: Vec<_> = batch
            .application_order()
            .into_iter()
            .map(|op| op.content.as_str())
            .collect();
        assert_eq!(order, vec!["x", "first", "second"]);
    }

    #[test]
    fn test_empty_batch_is_identity() {
        let content = "keep\n  me\r\nexactly";
        let result = apply(content, Vec::new());
        assert_eq!(result.content, content);
        assert_eq!(result.applied, 0);
    }

    #[test]
    fn test_atomic_write_integration() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, b"original content").unwrap();

        atomic_write(&file_path, b"modified content").unwrap();

        let new_content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(new_content, "modified content");
    }

    #[test]
    #[cfg(unix)]
    fn test_atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("run.py");
        fs::write(&file_path, b"print(1)\n").unwrap();
        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o755)).unwrap();

        atomic_write(&file_path, b"print(2)\n").unwrap();

        let mode = fs::metadata(&file_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
