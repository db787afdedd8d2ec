//! Conversation analytics.
//!
//! [`ConversationAnalyzer`] derives an [`AnalysisSummary`] from any message
//! list, exact or recovered. It looks at:
//!
//! - role counts
//! - topic tokens (stop words removed, top K by count)
//! - fenced code blocks (pairs of ` ``` `)
//! - file references (extension allow-list plus tool `path` inputs)
//! - command executions and file operations (tool-use blocks and the
//!   XML-style tool tags the extension writes into assistant text)
//! - key actions (assistant sentences opening with "I've", "I created", ...)
//!
//! ## Time window
//!
//! `since` works like the reader's cursor: the window starts at the first
//! message whose timestamp is at or after `since` and runs to the end, in
//! array order. When no message carries a timestamp the window cannot be
//! dated and the whole list is analyzed.

pub mod lexicon;

use crate::config::AnalysisConfig;
use crate::types::{
    AnalysisSummary, Coverage, Message, RecoveryResult, Role, TimeRange, TopicCount,
};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Longest key action kept, in characters.
const MAX_ACTION_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct ConversationAnalyzer {
    top_topics: usize,
    max_key_actions: usize,
    min_token_len: usize,
}

impl Default for ConversationAnalyzer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl ConversationAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            top_topics: config.top_topics,
            max_key_actions: config.max_key_actions,
            min_token_len: config.min_token_len,
        }
    }

    /// Analyze an exact message list.
    pub fn analyze(&self, messages: &[Message], since: Option<i64>) -> AnalysisSummary {
        let window = window(messages, since);

        let mut summary = AnalysisSummary {
            message_count: window.len(),
            ..Default::default()
        };
        let mut topic_counts: HashMap<String, usize> = HashMap::new();

        for message in window {
            match message.role {
                Role::Human => summary.human_count += 1,
                Role::Assistant => summary.assistant_count += 1,
                Role::System => {}
            }

            let text = message.text();
            summary.code_block_count += text.matches("```").count() / 2;

            for token in lexicon::tokens(&text, self.min_token_len) {
                *topic_counts.entry(token).or_insert(0) += 1;
            }

            collect_files(&text, &mut summary.files_referenced);
            self.count_tools(message, &text, &mut summary);

            if message.role == Role::Assistant && summary.key_actions.len() < self.max_key_actions
            {
                for sentence in sentences(&text) {
                    if summary.key_actions.len() >= self.max_key_actions {
                        break;
                    }
                    if lexicon::action_pattern().is_match(sentence) {
                        summary.key_actions.push(truncate(sentence, MAX_ACTION_CHARS));
                    }
                }
            }
        }

        summary.topics = top_topics(topic_counts, self.top_topics);
        summary.time_range = time_range(window);
        summary
    }

    /// Analyze a recovery result, marking the summary partial when messages
    /// are known or suspected to be missing.
    pub fn analyze_recovery(&self, recovery: &RecoveryResult, since: Option<i64>) -> AnalysisSummary {
        let mut summary = self.analyze(&recovery.messages, since);
        summary.coverage = if recovery.is_complete() {
            Coverage::Complete
        } else {
            Coverage::Partial {
                recovered: recovery.recovered_count,
                expected: recovery.expected_count,
            }
        };
        summary
    }

    fn count_tools(&self, message: &Message, text: &str, summary: &mut AnalysisSummary) {
        for (name, input) in message.tool_uses() {
            if lexicon::COMMAND_TOOLS.contains(&name) {
                summary.command_count += 1;
            } else if lexicon::FILE_TOOLS.contains(&name) {
                summary.file_operation_count += 1;
            }
            collect_input_paths(input, &mut summary.files_referenced);
        }

        if message.role != Role::Assistant {
            return;
        }
        for caps in lexicon::tool_tag_pattern().captures_iter(text) {
            let Some(tag) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if lexicon::COMMAND_TOOLS.contains(&tag) {
                summary.command_count += 1;
            } else if lexicon::FILE_TOOLS.contains(&tag) {
                summary.file_operation_count += 1;
            }
        }
    }
}

fn window(messages: &[Message], since: Option<i64>) -> &[Message] {
    let Some(since) = since else {
        return messages;
    };
    if messages.iter().all(|m| m.timestamp.is_none()) {
        return messages;
    }
    match messages
        .iter()
        .position(|m| m.timestamp.is_some_and(|t| t >= since))
    {
        Some(start) => &messages[start..],
        None => &[],
    }
}

fn collect_files(text: &str, files: &mut BTreeSet<String>) {
    for caps in lexicon::file_pattern().captures_iter(text) {
        if let Some(m) = caps.get(1) {
            files.insert(m.as_str().to_string());
        }
    }
}

fn collect_input_paths(input: &Value, files: &mut BTreeSet<String>) {
    for key in lexicon::PATH_KEYS {
        if let Some(path) = input.get(*key).and_then(|v| v.as_str()) {
            if !path.is_empty() {
                files.insert(path.to_string());
            }
        }
    }
}

fn top_topics(counts: HashMap<String, usize>, k: usize) -> Vec<TopicCount> {
    let mut topics: Vec<TopicCount> = counts
        .into_iter()
        .map(|(topic, count)| TopicCount { topic, count })
        .collect();
    topics.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));
    topics.truncate(k);
    topics
}

fn time_range(messages: &[Message]) -> Option<TimeRange> {
    let start = messages.iter().find_map(|m| m.timestamp)?;
    let end = messages.iter().rev().find_map(|m| m.timestamp)?;
    Some(TimeRange { start, end })
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace, and
/// at line breaks.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for line in text.lines() {
        let mut start = 0;
        let mut chars = line.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            let at_boundary = matches!(c, '.' | '!' | '?')
                && chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                push_sentence(&mut out, &line[start..end]);
                start = end;
            }
        }
        push_sentence(&mut out, &line[start..]);
    }
    out
}

fn push_sentence<'a>(out: &mut Vec<&'a str>, s: &'a str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s);
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
