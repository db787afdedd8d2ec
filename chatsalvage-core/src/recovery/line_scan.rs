//! Line accumulation until braces balance.
//!
//! Targets pretty-printed logs: lines are appended to a buffer starting at the
//! first `{`, and each time the buffer balances it is parsed and reset. The
//! buffer ends at the balancing `}`; whatever follows on that line (array
//! punctuation, separator noise, the next object) is scanned afresh.

use super::scan::BraceCounter;
use super::{to_message, Attempt, Located, Strategy};
use crate::types::StrategyKind;
use serde_json::Value;

pub struct LineScanStrategy {
    buffer_limit: usize,
}

impl LineScanStrategy {
    pub fn new(buffer_limit: usize) -> Self {
        Self { buffer_limit }
    }
}

impl Strategy for LineScanStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Line
    }

    fn attempt(&self, text: &str) -> Result<Attempt, String> {
        let mut attempt = Attempt::default();
        let mut counter = BraceCounter::new();
        let mut buffer = String::new();
        let mut buffer_start = 0;
        let mut offset = 0;
        let mut balanced_units = 0;

        for line in text.split_inclusive('\n') {
            let mut rest = line;
            let mut rest_offset = offset;
            offset += line.len();

            while !rest.is_empty() {
                if buffer.is_empty() {
                    let Some(i) = rest.find('{') else {
                        break;
                    };
                    buffer_start = rest_offset + i;
                    rest = &rest[i..];
                    rest_offset += i;
                }

                // Cut at the closing brace so trailing separator text on the
                // same line starts a fresh search
                let mut taken = rest.len();
                for (i, byte) in rest.bytes().enumerate() {
                    counter.push(byte);
                    if counter.is_balanced() {
                        taken = i + 1;
                        break;
                    }
                }
                buffer.push_str(&rest[..taken]);
                rest = &rest[taken..];
                rest_offset += taken;

                if counter.is_balanced() {
                    balanced_units += 1;
                    let parsed = serde_json::from_str::<Value>(&buffer)
                        .map_err(|e| e.to_string())
                        .and_then(|value| to_message(value, false));
                    match parsed {
                        Ok(message) => attempt.found.push(Located {
                            offset: buffer_start,
                            message,
                        }),
                        Err(reason) => attempt.notes.push(format!(
                            "block at byte {} skipped: {}",
                            buffer_start, reason
                        )),
                    }
                    buffer.clear();
                    counter.reset();
                } else if buffer.len() > self.buffer_limit {
                    attempt.notes.push(format!(
                        "block at byte {} exceeded {} bytes, dropped",
                        buffer_start, self.buffer_limit
                    ));
                    buffer.clear();
                    counter.reset();
                }
            }
        }

        if !buffer.is_empty() {
            attempt
                .notes
                .push(format!("block at byte {} never balanced", buffer_start));
        }

        if attempt.found.is_empty() {
            return Err(format!(
                "no parseable block among {} balanced candidates",
                balanced_units
            ));
        }
        Ok(attempt)
    }
}
