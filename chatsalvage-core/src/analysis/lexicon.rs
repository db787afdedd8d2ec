//! Word lists and patterns used by the analyzer.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Common English and chat-filler words excluded from topics.
pub static STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "can", "to", "of",
    "in", "for", "on", "with", "at", "by", "from", "as", "into", "through", "then", "here",
    "there", "when", "where", "why", "how", "all", "each", "every", "both", "few", "more", "most",
    "some", "such", "not", "only", "just", "but", "and", "or", "if", "about", "what", "which",
    "who", "this", "that", "these", "those", "it", "its", "my", "me", "we", "our", "you", "your",
    "up", "down", "no", "so", "very", "too", "than", "please", "help", "want", "like", "think",
    "know", "see", "look", "make", "take", "get", "let", "say", "tell", "give", "use", "find",
    "show", "try", "ask", "work", "call", "put", "keep", "also", "now", "still", "already",
    "done", "good", "right", "sure", "yeah", "yes", "okay", "thanks", "thank", "i've", "i'll",
    "i'm", "let's", "don't", "it's", "need", "going", "them", "they", "their", "there's", "any",
    "one", "out", "over", "after", "before", "because", "again", "same", "other", "true",
    "false", "null",
];

/// Tool names that execute a shell command.
pub static COMMAND_TOOLS: &[&str] = &["execute_command", "bash", "run_command", "shell"];

/// Tool names that read or modify files.
pub static FILE_TOOLS: &[&str] = &[
    "read_file",
    "write_to_file",
    "replace_in_file",
    "apply_diff",
    "insert_content",
    "search_and_replace",
    "list_files",
    "search_files",
    "edit",
    "write",
    "read",
    "multi_edit",
];

/// Input keys whose string value names a file.
pub static PATH_KEYS: &[&str] = &["path", "file_path", "filePath"];

pub fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// File names with an allow-listed source extension.
pub fn file_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b([\w./-]+\.(?:rs|py|js|ts|tsx|jsx|go|java|md|json|html|css|scss|yaml|yml|toml|c|cpp|h|hpp|rb|php|sh|sql))\b",
        )
        .expect("file pattern is valid")
    })
}

/// XML-style tool tags the extension embeds in assistant text.
pub fn tool_tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([a-z_]+)>").expect("tool tag pattern is valid"))
}

/// Sentences reporting work the assistant performed.
pub fn action_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:I've|I have|I created|I fixed|I updated|I added|I implemented|I modified|I removed|I refactored|I wrote|I changed)\b",
        )
        .expect("action pattern is valid")
    })
}

/// Lowercased topic tokens of `text`.
///
/// Splits on anything but alphanumerics, `_` and `-`; drops short tokens,
/// stop words and pure numbers.
pub fn tokens(text: &str, min_len: usize) -> Vec<String> {
    let stop = stop_words();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-' && c != '\'')
        .map(|w| w.trim_matches(|c: char| c == '-' || c == '\''))
        .filter(|w| w.chars().count() >= min_len && !stop.contains(w))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .map(|w| w.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_drop_stop_words_and_numbers() {
        let toks = tokens("Please fix the Login flow in 2024, it's broken", 3);
        assert_eq!(toks, vec!["fix", "login", "flow", "broken"]);
    }

    #[test]
    fn test_file_pattern() {
        let found: Vec<&str> = file_pattern()
            .captures_iter("edit src/auth.js and README.md, not v1.2")
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        assert_eq!(found, vec!["src/auth.js", "README.md"]);
    }

    #[test]
    fn test_action_pattern() {
        assert!(action_pattern().is_match("I've added the route."));
        assert!(action_pattern().is_match("I created auth.js"));
        assert!(!action_pattern().is_match("Should I create it?"));
        assert!(!action_pattern().is_match("I creatively wrote"));
    }
}
