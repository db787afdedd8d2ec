//! Single-pass, bounded-memory reader.
//!
//! The file is consumed as a token stream through a serde [`Visitor`]; each
//! array element is parsed to a [`Value`] and converted the same way the
//! whole-file reader converts it (repeated keys: last one wins), then offered
//! to a [`Selection`] and dropped if not retained. Any structural problem (non-array top level, non-object or
//! role-less element, truncation, trailing garbage) is a parse error. There
//! is no local retry: the caller decides whether to fall back.

use super::filter::Selection;
use super::{open_source, ConversationReader};
use crate::error::{Error, Result};
use crate::types::{FilterSpec, Message};
use serde::de::{Error as _, SeqAccess, Visitor};
use serde::Deserializer as _;
use serde_json::Value;
use std::fmt;
use std::io::{BufReader, Read};
use std::path::Path;

/// Streaming reader over a top-level JSON array of messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamingArrayReader;

impl StreamingArrayReader {
    /// Read from any byte source.
    ///
    /// `origin` is used in error messages only.
    pub fn read_from<R: Read>(
        &self,
        reader: R,
        filter: &FilterSpec,
        origin: &str,
    ) -> Result<Vec<Message>> {
        let mut de = serde_json::Deserializer::from_reader(reader);

        let selection = (&mut de)
            .deserialize_seq(SelectingVisitor {
                selection: Selection::new(filter),
            })
            .map_err(|e| Error::from_read(origin, e))?;
        de.end().map_err(|e| Error::from_read(origin, e))?;

        tracing::debug!(
            origin,
            offered = selection.offered(),
            retained = selection.retained(),
            "streaming read complete"
        );

        Ok(selection.finish())
    }
}

impl ConversationReader for StreamingArrayReader {
    fn name(&self) -> &'static str {
        "streaming"
    }

    fn read_filtered(&self, path: &Path, filter: &FilterSpec) -> Result<Vec<Message>> {
        let file = open_source(path)?;
        self.read_from(
            BufReader::new(file),
            filter,
            &path.display().to_string(),
        )
    }
}

struct SelectingVisitor<'f> {
    selection: Selection<'f>,
}

impl<'de, 'f> Visitor<'de> for SelectingVisitor<'f> {
    type Value = Selection<'f>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a JSON array of conversation messages")
    }

    fn visit_seq<A>(mut self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut index = 0usize;
        while let Some(item) = seq.next_element::<Value>()? {
            if !item.is_object() {
                return Err(A::Error::custom(format!("element {} is not an object", index)));
            }
            let message: Message = serde_json::from_value(item)
                .map_err(|e| A::Error::custom(format!("element {}: {}", index, e)))?;
            self.selection.offer(message);
            index += 1;
        }
        Ok(self.selection)
    }
}
