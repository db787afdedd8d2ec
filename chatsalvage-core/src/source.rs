//! Resolution of logical conversation ids to files.
//!
//! The extension keeps one directory per task:
//!
//! ```text
//! <tasks_root>/tasks/<task id>/api_conversation_history.json
//! ```

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// File name of a task's conversation log.
pub const HISTORY_FILE: &str = "api_conversation_history.json";

/// Maps a source id to the conversation file it names.
pub trait ConversationLocator: Send + Sync {
    /// Absolute path of the conversation log for `source_id`.
    ///
    /// ## Errors
    ///
    /// [`Error::NotFound`] if no such conversation exists.
    fn locate(&self, source_id: &str) -> Result<PathBuf>;
}

/// Locator over the extension's `tasks/` directory.
#[derive(Debug, Clone)]
pub struct TaskDirectoryLocator {
    root: PathBuf,
}

impl TaskDirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }

    /// Ids of all tasks that have a conversation log, sorted.
    pub fn list_sources(&self) -> Result<Vec<String>> {
        let tasks_dir = self.tasks_dir();
        if !tasks_dir.is_dir() {
            return Ok(Vec::new());
        }

        let pattern = format!(
            "{}/*/{}",
            glob::Pattern::escape(&tasks_dir.to_string_lossy()),
            HISTORY_FILE
        );
        let entries = glob::glob(&pattern).map_err(|e| Error::Parse {
            origin: tasks_dir.display().to_string(),
            message: format!("Invalid glob pattern: {}", e),
        })?;

        let mut ids: Vec<String> = entries
            .flatten()
            .filter_map(|path| {
                path.parent()
                    .and_then(|dir| dir.file_name())
                    .and_then(|name| name.to_str())
                    .map(|name| name.to_string())
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl ConversationLocator for TaskDirectoryLocator {
    fn locate(&self, source_id: &str) -> Result<PathBuf> {
        if source_id.is_empty()
            || source_id.contains("..")
            || source_id.contains('/')
            || source_id.contains('\\')
        {
            return Err(Error::NotFound(format!("conversation {}", source_id)));
        }

        let path = self.tasks_dir().join(source_id).join(HISTORY_FILE);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::NotFound(format!("conversation {}", source_id)))
        }
    }
}
