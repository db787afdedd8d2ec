//! Whole-file reader.
//!
//! Loads the complete file, parses it as one JSON value and applies the same
//! [`Selection`] as the streaming reader. It also accepts a leading UTF-8 byte
//! order mark, which the tokenizer rejects.

use super::filter::Selection;
use super::{read_source, ConversationReader};
use crate::error::{Error, Result};
use crate::types::{FilterSpec, Message};
use serde_json::Value;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// In-memory reader; the semantic reference for [`super::StreamingArrayReader`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackArrayReader;

impl FallbackArrayReader {
    /// Parse an in-memory byte slice.
    pub fn read_slice(
        &self,
        bytes: &[u8],
        filter: &FilterSpec,
        origin: &str,
    ) -> Result<Vec<Message>> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| Error::from_read(origin, e))?;

        let Value::Array(items) = value else {
            return Err(Error::parse(origin, "top-level value is not an array"));
        };

        let mut selection = Selection::new(filter);
        for (index, item) in items.into_iter().enumerate() {
            if !item.is_object() {
                return Err(Error::parse(
                    origin,
                    format!("element {} is not an object", index),
                ));
            }
            let message: Message = serde_json::from_value(item)
                .map_err(|e| Error::parse(origin, format!("element {}: {}", index, e)))?;
            selection.offer(message);
        }

        Ok(selection.finish())
    }
}

impl ConversationReader for FallbackArrayReader {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn read_filtered(&self, path: &Path, filter: &FilterSpec) -> Result<Vec<Message>> {
        let bytes = read_source(path)?;
        self.read_slice(&bytes, filter, &path.display().to_string())
    }
}
