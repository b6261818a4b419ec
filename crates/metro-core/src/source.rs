//! Source store: owns source text and maps byte offsets to (file, line, column).
//!
//! One [`SourceStore`] is shared by the whole pipeline. Every loaded file gets
//! a stable [`SourceId`]; lexer/parser/Sema/evaluator diagnostics reference
//! locations by `(SourceId, offset, length)` rather than borrowing `&str`
//! directly, so the store can be passed around by shared reference without
//! fighting the borrow checker across pipeline stages.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Stable identifier for a loaded source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u32);

/// A single loaded source file: its path and full text.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: SourceId,
    pub path: PathBuf,
    pub text: String,
    /// Byte offset of the start of each line (line 0 starts at offset 0).
    line_starts: Vec<usize>,
}

impl SourceFile {
    fn new(id: SourceId, path: PathBuf, text: String) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        SourceFile { id, path, text, line_starts }
    }

    /// 1-based line number containing `offset`.
    pub fn line_at(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// 1-based column number at `offset`.
    pub fn column_at(&self, offset: usize) -> usize {
        let line = self.line_at(offset);
        let line_start = self.line_starts[line - 1];
        offset - line_start + 1
    }

    /// The text of the (1-based) line containing `offset`, without its
    /// trailing newline. Used by the diagnostic renderer for snippets.
    pub fn line_text(&self, line: usize) -> &str {
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .map(|&e| e.saturating_sub(1))
            .unwrap_or(self.text.len());
        self.text[start..end.max(start)].trim_end_matches('\r')
    }
}

/// Owns the text of every file loaded during a run.
#[derive(Debug, Default)]
pub struct SourceStore {
    files: Vec<SourceFile>,
}

impl SourceStore {
    pub fn new() -> Self {
        SourceStore { files: Vec::new() }
    }

    /// Registers a new source file and returns its id.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, text: String) -> SourceId {
        let id = SourceId(self.files.len() as u32);
        self.files.push(SourceFile::new(id, path.into(), text));
        id
    }

    pub fn get(&self, id: SourceId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    /// Finds an already-loaded file by its canonical-ish path, for import
    /// deduplication (spec.md 6.2: "duplicates resolve to the same already
    /// loaded unit").
    pub fn find_by_path(&self, path: &Path) -> Option<SourceId> {
        self.files.iter().find(|f| f.path == path).map(|f| f.id)
    }

    pub fn path(&self, id: SourceId) -> &Path {
        &self.files[id.0 as usize].path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_at_finds_line_number() {
        let mut store = SourceStore::new();
        let id = store.add_file("a.metro", "let x = 1;\nlet y = 2;\n".to_string());
        let f = store.get(id);
        assert_eq!(f.line_at(0), 1);
        assert_eq!(f.line_at(11), 2);
    }

    #[test]
    fn line_text_strips_newline() {
        let mut store = SourceStore::new();
        let id = store.add_file("a.metro", "abc\ndef\n".to_string());
        let f = store.get(id);
        assert_eq!(f.line_text(1), "abc");
        assert_eq!(f.line_text(2), "def");
    }

    #[test]
    fn find_by_path_dedups() {
        let mut store = SourceStore::new();
        let id = store.add_file("a.metro", "x".to_string());
        assert_eq!(store.find_by_path(Path::new("a.metro")), Some(id));
        assert_eq!(store.find_by_path(Path::new("b.metro")), None);
    }
}
