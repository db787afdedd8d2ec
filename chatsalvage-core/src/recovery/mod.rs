//! Best-effort recovery of truncated or corrupted conversation logs.
//!
//! Used only after both exact readers have failed. The [`RecoveryPipeline`]
//! drives an ordered list of [`Strategy`] values, from most precise to most
//! tolerant:
//!
//! | Strategy | Finds |
//! |----------|-------|
//! | [`DirectStrategy`] | the whole array, when it still parses |
//! | [`ChunkedStrategy`] | balanced top-level objects |
//! | [`LineScanStrategy`] | pretty-printed objects, line by line |
//! | [`RegexStrategy`] | objects around `"role"` anchors |
//!
//! A strategy failing only lowers recall. [`RecoveryPipeline::recover`]
//! always returns a [`RecoveryResult`]; recovering nothing is reported as an
//! empty result with diagnostics.

pub mod chunked;
pub mod direct;
pub mod line_scan;
pub mod regex_extract;
pub mod scan;

pub use chunked::ChunkedStrategy;
pub use direct::DirectStrategy;
pub use line_scan::LineScanStrategy;
pub use regex_extract::RegexStrategy;

use crate::config::RecoveryConfig;
use crate::types::{Message, RecoveryResult, Role, StrategyKind};
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Notes kept per strategy before the rest are summarised.
const MAX_NOTES_PER_STRATEGY: usize = 20;

/// A message found by a strategy, with the byte offset of its object.
#[derive(Debug, Clone)]
pub struct Located {
    pub offset: usize,
    pub message: Message,
}

/// What a strategy recovered, plus notes on what it skipped.
#[derive(Debug, Default)]
pub struct Attempt {
    pub found: Vec<Located>,
    pub notes: Vec<String>,
}

/// One recovery tier.
///
/// `Err` carries the reason the strategy found nothing at all. Partial
/// success is `Ok` with notes.
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;
    fn attempt(&self, text: &str) -> Result<Attempt, String>;
}

/// Convert a parsed candidate into a [`Message`].
///
/// `strict` additionally requires a known role string and a `content` key,
/// which keeps the regex tier from accepting unrelated role-bearing objects.
pub(crate) fn to_message(value: Value, strict: bool) -> Result<Message, String> {
    let Value::Object(map) = &value else {
        return Err("not an object".to_string());
    };
    let Some(role) = map.get("role") else {
        return Err("missing role".to_string());
    };
    if strict {
        match role.as_str() {
            Some(name) if name.parse::<Role>().is_ok() => {}
            _ => return Err(format!("unknown role {}", role)),
        }
        if !map.contains_key("content") {
            return Err("missing content".to_string());
        }
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

static ROLE_KEY: OnceLock<Regex> = OnceLock::new();

/// Occurrences of a `"role":` key; an upper bound on the message count.
pub fn count_role_keys(text: &str) -> usize {
    ROLE_KEY
        .get_or_init(|| Regex::new(r#""role"\s*:"#).expect("role key pattern is valid"))
        .find_iter(text)
        .count()
}

/// Normalised content hash used to merge strategy outputs.
fn fingerprint(message: &Message) -> String {
    let serialized = serde_json::to_string(message).unwrap_or_default();
    hex::encode(Sha256::digest(serialized.as_bytes()))
}

/// Ordered strategy driver.
pub struct RecoveryPipeline {
    strategies: Vec<Box<dyn Strategy>>,
}

impl RecoveryPipeline {
    /// The four standard tiers, tuned by `config`.
    pub fn new(config: &RecoveryConfig) -> Self {
        Self::with_strategies(vec![
            Box::new(DirectStrategy),
            Box::new(ChunkedStrategy),
            Box::new(LineScanStrategy::new(config.line_buffer_limit_bytes)),
            Box::new(RegexStrategy::new(config.regex_backtrack_limit)),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// Recover what can be recovered from the file at `path`.
    ///
    /// Never fails: an unreadable file yields an empty result whose
    /// diagnostics say why. `max_messages` keeps the most recent N.
    pub fn recover(&self, path: &Path, max_messages: Option<usize>) -> RecoveryResult {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read file for recovery");
                return self.exhausted(vec![format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )]);
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let result = self.recover_text(&text, max_messages);
        info!(
            path = %path.display(),
            strategy = result.strategy_used.as_str(),
            recovered = result.recovered_count,
            expected = ?result.expected_count,
            "recovery finished"
        );
        result
    }

    /// Recover messages from in-memory text.
    pub fn recover_text(&self, text: &str, max_messages: Option<usize>) -> RecoveryResult {
        let bound = count_role_keys(text);
        let mut diagnostics = Vec::new();
        let mut runs: Vec<(StrategyKind, Attempt)> = Vec::new();

        for strategy in &self.strategies {
            let kind = strategy.kind();
            match strategy.attempt(text) {
                Ok(attempt) => {
                    debug!(
                        strategy = kind.as_str(),
                        found = attempt.found.len(),
                        skipped = attempt.notes.len(),
                        "strategy succeeded"
                    );
                    push_notes(&mut diagnostics, kind, &attempt.notes);

                    let found = attempt.found.len();
                    if kind == StrategyKind::Direct {
                        diagnostics.push(format!("direct: parsed all {} messages", found));
                        return finish(kind, Some(found), attempt.found, diagnostics, max_messages);
                    }
                    if bound > 0 && found == bound {
                        diagnostics.push(format!(
                            "{}: recovered all {} role-bearing objects",
                            kind, bound
                        ));
                        return finish(kind, Some(bound), attempt.found, diagnostics, max_messages);
                    }
                    runs.push((kind, attempt));
                }
                Err(reason) => {
                    debug!(strategy = kind.as_str(), %reason, "strategy found nothing");
                    diagnostics.push(format!("{}: {}", kind, reason));
                }
            }
        }

        let (merged, top) = merge(runs, &mut diagnostics);
        let expected = (bound > 0).then(|| bound.max(merged.len()));

        match top {
            Some(kind) => finish(kind, expected, merged, diagnostics, max_messages),
            None => {
                diagnostics.push("recovery exhausted: no strategy recovered a message".to_string());
                let mut result = self.exhausted(diagnostics);
                result.expected_count = expected;
                result
            }
        }
    }

    fn exhausted(&self, diagnostics: Vec<String>) -> RecoveryResult {
        RecoveryResult {
            strategy_used: self
                .strategies
                .last()
                .map(|s| s.kind())
                .unwrap_or(StrategyKind::Regex),
            recovered_count: 0,
            expected_count: None,
            messages: Vec::new(),
            diagnostics,
        }
    }
}

/// Multiset union of strategy outputs keyed by content fingerprint.
///
/// A message repeated k times in the source is kept k times as long as some
/// strategy saw all k copies. Returns the merged list ordered by offset and
/// the strategy that contributed most.
fn merge(
    runs: Vec<(StrategyKind, Attempt)>,
    diagnostics: &mut Vec<String>,
) -> (Vec<Located>, Option<StrategyKind>) {
    let mut kept: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Located> = Vec::new();
    let mut top: Option<(StrategyKind, usize)> = None;

    for (kind, attempt) in runs {
        let mut seen_here: HashMap<String, usize> = HashMap::new();
        let mut added = 0;

        for located in attempt.found {
            let key = fingerprint(&located.message);
            let nth = seen_here.entry(key.clone()).or_insert(0);
            *nth += 1;
            let already = kept.entry(key).or_insert(0);
            if *nth > *already {
                *already = *nth;
                merged.push(located);
                added += 1;
            }
        }

        diagnostics.push(format!("{}: contributed {} distinct messages", kind, added));
        if added > 0 && top.map_or(true, |(_, best)| added > best) {
            top = Some((kind, added));
        }
    }

    merged.sort_by_key(|l| l.offset);
    (merged, top.map(|(kind, _)| kind))
}

fn finish(
    strategy_used: StrategyKind,
    expected_count: Option<usize>,
    mut found: Vec<Located>,
    mut diagnostics: Vec<String>,
    max_messages: Option<usize>,
) -> RecoveryResult {
    found.sort_by_key(|l| l.offset);
    let total = found.len();
    if let Some(max) = max_messages {
        if total > max {
            found.drain(..total - max);
            diagnostics.push(format!(
                "kept the most recent {} of {} recovered messages",
                max, total
            ));
        }
    }

    let messages: Vec<Message> = found.into_iter().map(|l| l.message).collect();
    RecoveryResult {
        strategy_used,
        recovered_count: messages.len(),
        expected_count,
        messages,
        diagnostics,
    }
}

fn push_notes(diagnostics: &mut Vec<String>, kind: StrategyKind, notes: &[String]) {
    for note in notes.iter().take(MAX_NOTES_PER_STRATEGY) {
        diagnostics.push(format!("{}: {}", kind, note));
    }
    if notes.len() > MAX_NOTES_PER_STRATEGY {
        diagnostics.push(format!(
            "{}: {} more notes omitted",
            kind,
            notes.len() - MAX_NOTES_PER_STRATEGY
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn pipeline() -> RecoveryPipeline {
        RecoveryPipeline::new(&RecoveryConfig::default())
    }

    #[test]
    fn test_to_message_reasons() {
        assert_eq!(to_message(Value::from(3), false).unwrap_err(), "not an object");
        assert_eq!(
            to_message(serde_json::json!({"content": "x"}), false).unwrap_err(),
            "missing role"
        );
        assert!(to_message(serde_json::json!({"role": "user"}), false).is_ok());
        assert_eq!(
            to_message(serde_json::json!({"role": "user"}), true).unwrap_err(),
            "missing content"
        );
    }

    #[test]
    fn test_count_role_keys() {
        assert_eq!(count_role_keys(r#"{"role":"user"} {"role" : "x"} "roles":1"#), 2);
    }

    #[test]
    fn test_well_formed_returns_direct() {
        let result = pipeline().recover_text(
            r#"[{"role":"user","content":"a"},{"role":"assistant","content":"b"}]"#,
            None,
        );
        assert_eq!(result.strategy_used, StrategyKind::Direct);
        assert_eq!(result.recovered_count, 2);
        assert_eq!(result.expected_count, Some(2));
        assert!(result.is_complete());
    }

    #[test]
    fn test_truncated_prefix_is_recovered() {
        let result = pipeline().recover_text(
            r#"[{"role":"user","content":"a"},{"role":"assistant","content":"b"},{"role":"user","co"#,
            None,
        );
        assert_eq!(result.recovered_count, 2);
        assert_eq!(result.expected_count, Some(3));
        assert!(!result.is_complete());
        assert_eq!(result.messages[1].text(), "b");
    }

    #[test]
    fn test_stops_at_first_strategy_reaching_bound() {
        let result = pipeline().recover_text(
            r#"{"role":"user","content":"a"} ## {"role":"assistant","content":"b"}"#,
            None,
        );
        assert_eq!(result.strategy_used, StrategyKind::Chunked);
        assert_eq!(result.recovered_count, 2);
    }

    #[test]
    fn test_regex_tier_handles_unclosed_garbage() {
        let result = pipeline().recover_text(
            r#"{"role":"user","content":"a"} {oops {"role":"assistant","content":"b"}"#,
            None,
        );
        assert_eq!(result.strategy_used, StrategyKind::Regex);
        assert_eq!(result.recovered_count, 2);
    }

    #[test]
    fn test_union_across_strategies() {
        // Chunked and line-scan only see the first object, the strict regex
        // tier rejects it for lacking content but finds the second.
        let text = "{\"role\":\"user\"}\n{oops\n{\"role\":\"assistant\",\"content\":\"b\"}\n";
        let result = pipeline().recover_text(text, None);

        assert_eq!(result.recovered_count, 2);
        assert_eq!(result.expected_count, Some(2));
        assert_eq!(result.messages[0].role, Role::Human);
        assert_eq!(result.messages[1].text(), "b");
        assert_eq!(result.strategy_used, StrategyKind::Chunked);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d == "regex: contributed 1 distinct messages"));
    }

    #[test]
    fn test_quote_in_separator_keeps_chunked_recall() {
        let text = r#"{"role":"user","content":"a"} it"s broken {"role":"assistant","content":"b"} {"role":"user","content":"c"}"#;
        let result = pipeline().recover_text(text, None);
        assert_eq!(result.strategy_used, StrategyKind::Chunked);
        assert_eq!(result.recovered_count, 3);
    }

    #[test]
    fn test_nested_payload_is_not_recovered_as_message() {
        let text = r#"[{"content":[{"type":"tool_result","content":{"role":"user","content":"inner"}}],"role":"assistant"},{"role":"user","content":"cut"#;
        let result = pipeline().recover_text(text, None);
        assert_eq!(result.recovered_count, 1);
        assert_eq!(result.messages[0].role, Role::Assistant);
        assert!(result.messages.iter().all(|m| m.text() != "inner"));
    }

    #[test]
    fn test_repeated_messages_survive_dedup() {
        let text = r#"{"role":"user","content":"continue"} x {"role":"user","content":"continue"} {oops"#;
        let result = pipeline().recover_text(text, None);
        assert_eq!(result.recovered_count, 2);
    }

    #[test]
    fn test_exhausted_is_not_an_error() {
        let result = pipeline().recover_text("complete garbage", None);
        assert!(result.is_exhausted());
        assert!(result.messages.is_empty());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.starts_with("recovery exhausted")));
    }

    #[test]
    fn test_max_messages_keeps_tail() {
        let result = pipeline().recover_text(
            r#"[{"role":"user","content":"1"},{"role":"assistant","content":"2"},{"role":"user","content":"3"}]"#,
            Some(2),
        );
        let texts: Vec<String> = result.messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["2", "3"]);
        assert_eq!(result.recovered_count, 2);
    }

    #[test]
    fn test_missing_file_degrades() {
        let result = pipeline().recover(Path::new("/nonexistent/history.json"), None);
        assert!(result.is_exhausted());
        assert!(result.diagnostics[0].contains("cannot read"));
    }

    #[test]
    fn test_recover_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"[{"role":"user","content":"hello"},{"role":"assis"#)
            .unwrap();
        let result = pipeline().recover(file.path(), None);
        assert_eq!(result.recovered_count, 1);
        assert_eq!(result.messages[0].text(), "hello");
    }
}
