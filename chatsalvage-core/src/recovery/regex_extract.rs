//! `"role"`-anchored object extraction.
//!
//! Last resort: every `"role": "<known role>"` occurrence is taken as a hint
//! that a message object surrounds it. The scanner walks back over preceding
//! `{` positions and validates every balanced object enclosing the anchor
//! strictly (known role, `content` present). The outermost valid one wins, so
//! a role-bearing payload nested inside a message (a tool result quoting a
//! message, say) is never taken for a message of its own.

use super::scan::matching_close;
use super::{to_message, Attempt, Located, Strategy};
use crate::types::StrategyKind;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

static ROLE_ANCHOR: OnceLock<Regex> = OnceLock::new();

fn role_anchor() -> &'static Regex {
    ROLE_ANCHOR.get_or_init(|| {
        Regex::new(r#""role"\s*:\s*"(?:human|user|assistant|system)""#)
            .expect("role anchor pattern is valid")
    })
}

pub struct RegexStrategy {
    backtrack_limit: usize,
}

impl RegexStrategy {
    /// `backtrack_limit` caps how many preceding `{` are tried per anchor.
    pub fn new(backtrack_limit: usize) -> Self {
        Self {
            backtrack_limit: backtrack_limit.max(1),
        }
    }

    fn enclosing_message(&self, text: &str, anchor_start: usize, anchor_end: usize) -> Candidate {
        let mut search_end = anchor_start;
        let mut outermost = None;
        let mut last_reason = None;

        for _ in 0..self.backtrack_limit {
            let Some(open) = text[..search_end].rfind('{') else {
                break;
            };
            search_end = open;

            let Some(close) = matching_close(text, open) else {
                continue;
            };
            if close <= anchor_end {
                // Sibling object that ends before the anchor
                continue;
            }

            let parsed = serde_json::from_str::<Value>(&text[open..close])
                .map_err(|e| e.to_string())
                .and_then(|value| to_message(value, true));
            match parsed {
                Ok(message) => {
                    outermost = Some((
                        Located {
                            offset: open,
                            message,
                        },
                        close,
                    ))
                }
                Err(reason) => last_reason = Some(reason),
            }
        }

        match outermost {
            Some((located, close)) => Candidate::Found(located, close),
            None => Candidate::Rejected(
                last_reason.unwrap_or_else(|| "no enclosing object".to_string()),
            ),
        }
    }
}

enum Candidate {
    /// Accepted message and the end of its object
    Found(Located, usize),
    Rejected(String),
}

impl Strategy for RegexStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Regex
    }

    fn attempt(&self, text: &str) -> Result<Attempt, String> {
        let mut attempt = Attempt::default();
        let mut covered_until = 0;
        let mut anchors = 0;

        for anchor in role_anchor().find_iter(text) {
            anchors += 1;
            if anchor.start() < covered_until {
                // Nested inside a message already recovered
                continue;
            }

            match self.enclosing_message(text, anchor.start(), anchor.end()) {
                Candidate::Found(located, end) => {
                    covered_until = end;
                    attempt.found.push(located);
                }
                Candidate::Rejected(reason) => attempt.notes.push(format!(
                    "anchor at byte {} rejected: {}",
                    anchor.start(),
                    reason
                )),
            }
        }

        if anchors == 0 {
            return Err("no role anchors in text".to_string());
        }
        if attempt.found.is_empty() {
            return Err(format!("none of {} role anchors yielded a message", anchors));
        }
        Ok(attempt)
    }
}
