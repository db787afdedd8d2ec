//! Core domain types for chatsalvage
//!
//! These types describe conversation logs written by the editor extension and
//! the artifacts derived from them.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Conversation** | Ordered sequence of [`Message`] records for one task |
//! | **Source id** | Logical identifier of a conversation (the extension's task id) |
//! | **Tail-limit** | The most recent N elements of a chronologically ordered sequence |
//! | **Recovery** | Best-effort reconstruction of a conversation that cannot be read exactly |
//! | **Crash report** | Persisted recovery summary plus analysis, see [`CrashReport`] |
//!
//! ### Ordering
//!
//! Position within the source array is the canonical chronological order,
//! oldest first. A message's `timestamp` is informational and never reorders
//! a sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// ============================================
// Messages
// ============================================

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A real person. The extension writes this role as `"user"`.
    #[serde(alias = "user")]
    Human,
    /// The coding assistant
    Assistant,
    /// System / environment injected content
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" | "user" => Ok(Role::Human),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// A known content block kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: Value,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    Image {
        source: Value,
    },
}

/// One element of a structured message body.
///
/// Blocks of a kind we don't model are kept verbatim so nothing is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentBlock {
    Known(Block),
    Raw(Value),
}

/// Message body: plain text, a list of blocks, or any other JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(Value),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

/// A single conversation message.
///
/// Keys we don't recognize are collected in `extensions` and written back
/// unchanged on serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Milliseconds since the Unix epoch, when the writer recorded one
    #[serde(
        default,
        deserialize_with = "deserialize_opt_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub content: Content,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl Message {
    /// Create a plain-text message.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            timestamp: None,
            content: Content::Text(text.into()),
            extensions: BTreeMap::new(),
        }
    }

    /// Builder-style timestamp setter.
    pub fn at(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    /// Plain text of the message: text blocks and textual tool results,
    /// joined with newlines.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => {
                let parts: Vec<String> = blocks.iter().filter_map(block_text).collect();
                parts.join("\n")
            }
            Content::Other(Value::String(s)) => s.clone(),
            Content::Other(Value::Null) => String::new(),
            Content::Other(v) => v.to_string(),
        }
    }

    /// Structured tool invocations carried by this message, as `(name, input)`.
    pub fn tool_uses(&self) -> Vec<(&str, &Value)> {
        match &self.content {
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Known(Block::ToolUse { name, input, .. }) => {
                        Some((name.as_str(), input))
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn block_text(block: &ContentBlock) -> Option<String> {
    match block {
        ContentBlock::Known(Block::Text { text }) => Some(text.clone()),
        ContentBlock::Known(Block::ToolResult { content, .. }) => match content {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => {
                let texts: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                    .collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join("\n"))
                }
            }
            _ => None,
        },
        _ => None,
    }
}

/// Accepts integer milliseconds, fractional milliseconds, RFC3339 strings or null.
fn deserialize_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| Error::custom("invalid timestamp")),
        Value::String(s) => s
            .parse::<DateTime<Utc>>()
            .map(|dt| Some(dt.timestamp_millis()))
            .map_err(|e| Error::custom(format!("invalid RFC3339 timestamp: {}", e))),
        _ => Err(Error::custom("timestamp must be a number or string")),
    }
}

// ============================================
// Query filters
// ============================================

/// Caller-supplied message predicate.
pub type MessagePredicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Query-time filters applied while reading a conversation.
///
/// `search_term`, `since` and `predicate` select matches; `limit` then keeps
/// the most recent N of them, in original order.
#[derive(Clone, Default)]
pub struct FilterSpec {
    /// Keep the most recent N matches
    pub limit: Option<usize>,
    /// Epoch milliseconds; see [`crate::reader::Selection`] for cursor semantics
    pub since: Option<i64>,
    /// Case-insensitive substring of the message text
    pub search_term: Option<String>,
    pub predicate: Option<MessagePredicate>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn since(mut self, since_ms: i64) -> Self {
        self.since = Some(since_ms);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn predicate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(f));
        self
    }

    /// True when only a tail limit (or nothing) is requested.
    pub fn is_tail_only(&self) -> bool {
        self.since.is_none() && self.search_term.is_none() && self.predicate.is_none()
    }
}

impl std::fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSpec")
            .field("limit", &self.limit)
            .field("since", &self.since)
            .field("search_term", &self.search_term)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

// ============================================
// Recovery
// ============================================

/// Recovery strategy, in increasing order of tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Whole-file JSON parse
    Direct,
    /// Independent parse of balanced top-level objects
    Chunked,
    /// Line accumulation until braces balance
    Line,
    /// `"role":`-anchored object extraction
    Regex,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "direct",
            StrategyKind::Chunked => "chunked",
            StrategyKind::Line => "line",
            StrategyKind::Regex => "regex",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(StrategyKind::Direct),
            "chunked" => Ok(StrategyKind::Chunked),
            "line" => Ok(StrategyKind::Line),
            "regex" => Ok(StrategyKind::Regex),
            _ => Err(format!("unknown strategy: {}", s)),
        }
    }
}

/// Outcome of a best-effort recovery.
///
/// `recovered_count <= expected_count` whenever `expected_count` is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    pub strategy_used: StrategyKind,
    pub recovered_count: usize,
    pub expected_count: Option<usize>,
    pub messages: Vec<Message>,
    pub diagnostics: Vec<String>,
}

impl RecoveryResult {
    /// Nothing could be recovered.
    pub fn is_exhausted(&self) -> bool {
        self.recovered_count == 0
    }

    /// Every expected message was recovered.
    pub fn is_complete(&self) -> bool {
        match self.expected_count {
            Some(expected) => self.recovered_count >= expected,
            None => false,
        }
    }

    /// The recovery outcome without the message bodies.
    pub fn summary(&self) -> RecoverySummary {
        RecoverySummary {
            strategy_used: self.strategy_used,
            recovered_count: self.recovered_count,
            expected_count: self.expected_count,
            diagnostics: self.diagnostics.clone(),
        }
    }
}

/// [`RecoveryResult`] minus messages, as stored in a crash report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySummary {
    pub strategy_used: StrategyKind,
    pub recovered_count: usize,
    pub expected_count: Option<usize>,
    pub diagnostics: Vec<String>,
}

// ============================================
// Analysis
// ============================================

/// A topic token and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

/// First and last timestamps observed, in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

/// Whether an analysis covers the whole conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Coverage {
    /// Computed over an exact read, or a recovery that found every message
    Complete,
    /// Computed over a partial reconstruction
    Partial {
        recovered: usize,
        expected: Option<usize>,
    },
}

impl Coverage {
    pub fn is_partial(&self) -> bool {
        matches!(self, Coverage::Partial { .. })
    }
}

impl Default for Coverage {
    fn default() -> Self {
        Coverage::Complete
    }
}

/// Analytics derived from a message list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub message_count: usize,
    pub human_count: usize,
    pub assistant_count: usize,
    /// Ordered by count, descending
    pub topics: Vec<TopicCount>,
    pub code_block_count: usize,
    pub file_operation_count: usize,
    pub command_count: usize,
    pub files_referenced: BTreeSet<String>,
    /// In conversation order
    pub key_actions: Vec<String>,
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub coverage: Coverage,
}

// ============================================
// Crash reports
// ============================================

/// Lifecycle partition of a crash report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Active,
    Dismissed,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Active => "active",
            Partition::Dismissed => "dismissed",
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Partition::Active),
            "dismissed" => Ok(Partition::Dismissed),
            _ => Err(format!("unknown partition: {}", s)),
        }
    }
}

/// A persisted best-effort reconstruction of a conversation.
///
/// Created once; afterwards only `read` changes. The file on disk is the
/// source of truth for which partition a report is in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
    pub id: String,
    pub source_id: String,
    pub created_at: DateTime<Utc>,
    pub analysis: AnalysisSummary,
    pub recovery_summary: RecoverySummary,
    pub formatted_message: String,
    pub read: bool,
}
