//! Independent parse of each balanced top-level object.

use super::scan::top_level_objects;
use super::{to_message, Attempt, Located, Strategy};
use crate::types::StrategyKind;
use serde_json::Value;

pub struct ChunkedStrategy;

impl Strategy for ChunkedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Chunked
    }

    fn attempt(&self, text: &str) -> Result<Attempt, String> {
        let scan = top_level_objects(text);
        if scan.spans.is_empty() {
            return Err("no balanced objects found".to_string());
        }

        let mut attempt = Attempt::default();
        for &(start, end) in &scan.spans {
            let parsed = serde_json::from_str::<Value>(&text[start..end])
                .map_err(|e| e.to_string())
                .and_then(|value| to_message(value, false));

            match parsed {
                Ok(message) => attempt.found.push(Located {
                    offset: start,
                    message,
                }),
                Err(reason) => attempt
                    .notes
                    .push(format!("chunk at byte {} skipped: {}", start, reason)),
            }
        }

        if let Some(start) = scan.unterminated {
            attempt
                .notes
                .push(format!("object at byte {} is unterminated", start));
        }

        if attempt.found.is_empty() {
            return Err(format!(
                "none of {} candidate chunks parsed",
                scan.spans.len()
            ));
        }
        Ok(attempt)
    }
}
