//! Exact readers for conversation logs.
//!
//! A conversation log is a single JSON array of messages, oldest first. Two
//! readers implement [`ConversationReader`] with identical filter semantics:
//!
//! - [`StreamingArrayReader`]: single forward pass, memory bounded by the
//!   filter (`O(limit)` for a bare tail query, `O(matches)` otherwise)
//! - [`FallbackArrayReader`]: whole-file parse, tolerant of a few valid inputs
//!   the tokenizer rejects
//!
//! [`read_filtered`] chains them: a parse failure in the streaming reader is
//! retried once in memory. A parse failure there is final for exact reads;
//! switching to best-effort recovery is the caller's decision (see
//! [`crate::recovery`]).

pub mod fallback;
pub mod filter;
pub mod streaming;

pub use fallback::FallbackArrayReader;
pub use filter::{select, Selection};
pub use streaming::StreamingArrayReader;

use crate::error::{Error, Result};
use crate::types::{FilterSpec, Message};
use std::fs::File;
use std::path::Path;

/// Common interface of the exact readers.
pub trait ConversationReader: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Read `path` and return the messages selected by `filter`, oldest first.
    ///
    /// ## Errors
    ///
    /// - [`Error::NotFound`] if the file does not exist
    /// - [`Error::Io`] for other filesystem failures
    /// - [`Error::Parse`] if the content is not an array of messages
    fn read_filtered(&self, path: &Path, filter: &FilterSpec) -> Result<Vec<Message>>;
}

/// Exact read with automatic fallback from streaming to whole-file parsing.
pub fn read_filtered(path: &Path, filter: &FilterSpec) -> Result<Vec<Message>> {
    let streaming = StreamingArrayReader;
    match streaming.read_filtered(path, filter) {
        Ok(messages) => Ok(messages),
        Err(err) if err.is_parse() => {
            tracing::warn!(
                path = %path.display(),
                reader = streaming.name(),
                error = %err,
                "streaming read failed, retrying with whole-file parse"
            );
            FallbackArrayReader.read_filtered(path, filter)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn open_source(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| not_found_or_io(path, e))
}

pub(crate) fn read_source(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| not_found_or_io(path, e))
}

fn not_found_or_io(path: &Path, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(format!("conversation file {}", path.display()))
    } else {
        Error::Io(std::io::Error::new(
            err.kind(),
            format!("Failed to open {}: {}", path.display(), err),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content).expect("Failed to write temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = read_filtered(Path::new("/nonexistent/history.json"), &FilterSpec::new())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_falls_back_on_bom() {
        let file = create_test_file(b"\xEF\xBB\xBF[{\"role\":\"user\",\"content\":\"hi\"}]");
        assert!(StreamingArrayReader
            .read_filtered(file.path(), &FilterSpec::new())
            .is_err());

        let out = read_filtered(file.path(), &FilterSpec::new()).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_corrupt_file_surfaces_parse_error() {
        let file = create_test_file(br#"[{"role":"user","content":"hi"},{"rol"#);
        let err = read_filtered(file.path(), &FilterSpec::new()).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_readers_agree_on_fixture() {
        let file = create_test_file(
            br#"[
  {"role": "user", "content": "Add login to auth.js", "timestamp": 1000},
  {"role": "assistant", "content": [{"type": "text", "text": "I created auth.js"}], "timestamp": 2000},
  {"role": "user", "content": "Now the tests", "timestamp": 3000},
  {"role": "assistant", "content": "I fixed the failing auth test", "timestamp": 4000}
]"#,
        );
        let filters = vec![
            FilterSpec::new(),
            FilterSpec::new().limit(1),
            FilterSpec::new().limit(10),
            FilterSpec::new().since(2500),
            FilterSpec::new().search("auth").limit(2),
        ];
        for filter in &filters {
            let streamed = StreamingArrayReader
                .read_filtered(file.path(), filter)
                .unwrap();
            let loaded = FallbackArrayReader
                .read_filtered(file.path(), filter)
                .unwrap();
            assert_eq!(streamed, loaded, "readers disagree for {:?}", filter);
        }
    }

    #[test]
    fn test_readers_agree_on_repeated_keys() {
        let file = create_test_file(
            br#"[{"role":"user","content":"a","content":"b"},{"role":"assistant","role":"user","content":"c"}]"#,
        );
        let streamed = StreamingArrayReader
            .read_filtered(file.path(), &FilterSpec::new())
            .unwrap();
        let loaded = FallbackArrayReader
            .read_filtered(file.path(), &FilterSpec::new())
            .unwrap();
        assert_eq!(streamed, loaded);
        assert_eq!(streamed[0].text(), "b");
        assert_eq!(streamed[1].role, crate::types::Role::Human);
    }
}
