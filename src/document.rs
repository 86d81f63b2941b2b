//! Corpus documents and evaluation inputs.
//!
//! A document is one plain-text file from the corpus directory. All
//! lengths in this crate are measured in characters, not bytes, since
//! the corpus is predominantly Chinese text where the two differ.

use crate::error::{RagBenchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A single corpus document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document name (file stem).
    pub name: String,
    /// Original file path (if loaded from file).
    pub path: Option<PathBuf>,
    /// Full text content, BOM stripped.
    pub content: String,
}

impl Document {
    /// Create a document from raw text content.
    pub fn from_text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            content: strip_bom(content.into()),
        }
    }

    /// Load a text file as a document.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagBenchError::io(path, e))?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();

        Ok(Self {
            name,
            path: Some(path.to_path_buf()),
            content: strip_bom(content),
        })
    }

    /// Length of the content in characters.
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// Remove a leading UTF-8 byte order mark if present. Files exported
/// from Windows tooling often carry one.
fn strip_bom(content: String) -> String {
    match content.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => content,
    }
}

/// Load every `.txt` and `.md` file under `dir` as a document, sorted
/// by file name for a deterministic ingest order.
pub fn load_corpus(dir: &Path) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let is_text = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md"))
            .unwrap_or(false);

        if is_text {
            documents.push(Document::from_file(entry.path())?);
        }
    }

    if documents.is_empty() {
        return Err(RagBenchError::EmptyCorpus(dir.to_path_buf()));
    }

    Ok(documents)
}

/// One evaluation question from the questions CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Question identifier, forwarded verbatim to the scoring service.
    #[serde(rename = "q_id")]
    pub id: String,
    /// Question text.
    #[serde(rename = "questions")]
    pub text: String,
}

/// One turn of a scripted conversation from the chat CSV.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatPrompt {
    /// Conversation the turn belongs to. Turns sharing an id share history.
    pub conversation_id: String,
    /// The user's question for this turn.
    #[serde(rename = "questions")]
    pub question: String,
}

/// Load the evaluation questions from a CSV file with `q_id` and
/// `questions` columns.
pub fn load_questions(path: &Path) -> Result<Vec<Question>> {
    read_csv(path)
}

/// Load scripted conversation turns from a CSV file with
/// `conversation_id` and `questions` columns. Row order is preserved;
/// it defines the turn order within each conversation.
pub fn load_chat_prompts(path: &Path) -> Result<Vec<ChatPrompt>> {
    read_csv(path)
}

fn read_csv<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).map_err(|e| RagBenchError::io(path, e))?;
    let mut reader = csv::Reader::from_reader(file);

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_from_text() {
        let doc = Document::from_text("manual", "人工智慧很有趣");
        assert_eq!(doc.name, "manual");
        assert!(doc.path.is_none());
        assert_eq!(doc.char_count(), 7);
    }

    #[test]
    fn test_bom_is_stripped() {
        let doc = Document::from_text("exported", "\u{feff}內容開始");
        assert_eq!(doc.content, "內容開始");
        assert_eq!(doc.char_count(), 4);
    }

    #[test]
    fn test_load_corpus_reads_text_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        std::fs::write(dir.path().join("a.txt"), "first").unwrap();
        std::fs::write(dir.path().join("notes.md"), "third").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let docs = load_corpus(dir.path()).unwrap();
        assert_eq!(docs.len(), 3);
        // Sorted by file name, non-text files skipped
        assert_eq!(docs[0].name, "a");
        assert_eq!(docs[1].name, "b");
        assert_eq!(docs[2].name, "notes");
    }

    #[test]
    fn test_load_corpus_empty_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_corpus(dir.path()).unwrap_err();
        assert!(matches!(err, RagBenchError::EmptyCorpus(_)));
    }

    #[test]
    fn test_load_questions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.csv");
        std::fs::write(&path, "q_id,questions\n1,什麼是機器學習？\n2,深度學習有哪些應用？\n").unwrap();

        let questions = load_questions(&path).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, "1");
        assert_eq!(questions[0].text, "什麼是機器學習？");
        assert_eq!(questions[1].id, "2");
    }

    #[test]
    fn test_load_chat_prompts_preserves_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.csv");
        std::fs::write(
            &path,
            "conversation_id,questions\nc1,它是什麼？\nc2,天氣如何？\nc1,有什麼用途？\n",
        )
        .unwrap();

        let prompts = load_chat_prompts(&path).unwrap();
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[0].conversation_id, "c1");
        assert_eq!(prompts[1].conversation_id, "c2");
        assert_eq!(prompts[2].question, "有什麼用途？");
    }

    #[test]
    fn test_missing_questions_file() {
        let err = load_questions(Path::new("/nonexistent/questions.csv")).unwrap_err();
        assert!(matches!(err, RagBenchError::Io { .. }));
    }
}
