//! Whole-file parse; full fidelity when it works.

use super::{to_message, Attempt, Located, Strategy};
use crate::types::StrategyKind;
use serde_json::Value;

pub struct DirectStrategy;

impl Strategy for DirectStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn attempt(&self, text: &str) -> Result<Attempt, String> {
        let text = text.trim_start_matches('\u{feff}');
        let value: Value =
            serde_json::from_str(text).map_err(|e| format!("whole-file parse failed: {}", e))?;

        let Value::Array(items) = value else {
            return Err("top-level value is not an array".to_string());
        };

        let mut attempt = Attempt::default();
        for (index, item) in items.into_iter().enumerate() {
            let message = to_message(item, false).map_err(|r| format!("element {}: {}", index, r))?;
            attempt.found.push(Located {
                offset: index,
                message,
            });
        }
        Ok(attempt)
    }
}
