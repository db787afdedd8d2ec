//! Human-readable rendering of recovery outcomes and crash reports.

use crate::types::{AnalysisSummary, CrashReport, RecoverySummary, TimeRange};
use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Write;

/// Topics and files listed in a crash message before eliding the rest.
const MAX_LISTED: usize = 8;

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    format_relative_time_from(ts, Utc::now())
}

/// [`format_relative_time`] against an explicit `now`.
pub fn format_relative_time_from(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

/// Format epoch milliseconds as `YYYY-MM-DD HH:MM UTC`.
pub fn format_epoch_ms(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(ts) => ts.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => format!("{}ms", ms),
    }
}

/// True when the recovery did not provably find every message.
pub fn is_partial(recovery: &RecoverySummary, analysis: &AnalysisSummary) -> bool {
    if analysis.coverage.is_partial() {
        return true;
    }
    match recovery.expected_count {
        Some(expected) => recovery.recovered_count < expected,
        None => true,
    }
}

/// Render the message stored in a crash report.
///
/// A partial reconstruction is always called out on the first lines.
pub fn format_crash_message(
    source_id: &str,
    recovery: &RecoverySummary,
    analysis: &AnalysisSummary,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Conversation {} could not be read exactly and was reconstructed.",
        source_id
    );

    if recovery.recovered_count == 0 {
        let _ = writeln!(out, "No messages could be recovered.");
        return out;
    }

    if is_partial(recovery, analysis) {
        match recovery.expected_count {
            Some(expected) => {
                let _ = writeln!(
                    out,
                    "PARTIAL RECONSTRUCTION: recovered {} of {} expected messages ({} strategy).",
                    recovery.recovered_count, expected, recovery.strategy_used
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "PARTIAL RECONSTRUCTION: recovered {} messages; the original count is unknown ({} strategy).",
                    recovery.recovered_count, recovery.strategy_used
                );
            }
        }
    } else {
        let _ = writeln!(
            out,
            "Recovered all {} messages ({} strategy).",
            recovery.recovered_count, recovery.strategy_used
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Messages: {} ({} from the user, {} from the assistant)",
        analysis.message_count, analysis.human_count, analysis.assistant_count
    );
    if let Some(TimeRange { start, end }) = analysis.time_range {
        let _ = writeln!(
            out,
            "Time span: {} to {}",
            format_epoch_ms(start),
            format_epoch_ms(end)
        );
    }
    if !analysis.topics.is_empty() {
        let topics: Vec<String> = analysis
            .topics
            .iter()
            .take(MAX_LISTED)
            .map(|t| format!("{} ({})", t.topic, t.count))
            .collect();
        let _ = writeln!(out, "Topics: {}", topics.join(", "));
    }
    if !analysis.files_referenced.is_empty() {
        let files: Vec<&str> = analysis
            .files_referenced
            .iter()
            .take(MAX_LISTED)
            .map(String::as_str)
            .collect();
        let more = analysis.files_referenced.len().saturating_sub(MAX_LISTED);
        let suffix = if more > 0 {
            format!(" and {} more", more)
        } else {
            String::new()
        };
        let _ = writeln!(out, "Files referenced: {}{}", files.join(", "), suffix);
    }
    let _ = writeln!(
        out,
        "Code blocks: {} | File operations: {} | Commands: {}",
        analysis.code_block_count, analysis.file_operation_count, analysis.command_count
    );

    if !analysis.key_actions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Key actions:");
        for action in &analysis.key_actions {
            let _ = writeln!(out, "- {}", action);
        }
    }
    out
}

/// One-line listing entry for a crash report.
pub fn format_report_line(report: &CrashReport, now: DateTime<Utc>) -> String {
    let marker = if report.read { " " } else { "*" };
    let counts = match report.recovery_summary.expected_count {
        Some(expected) => format!("{}/{}", report.recovery_summary.recovered_count, expected),
        None => format!("{}/?", report.recovery_summary.recovered_count),
    };
    format!(
        "{} {}  {}  {} messages  {}",
        marker,
        report.id,
        report.source_id,
        counts,
        format_relative_time_from(report.created_at, now)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coverage, StrategyKind, TopicCount};
    use chrono::Duration;

    fn recovery(recovered: usize, expected: Option<usize>) -> RecoverySummary {
        RecoverySummary {
            strategy_used: StrategyKind::Chunked,
            recovered_count: recovered,
            expected_count: expected,
            diagnostics: vec![],
        }
    }

    #[test]
    fn test_relative_time() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time_from(now + Duration::seconds(5), now), "just now");
        assert_eq!(format_relative_time_from(now - Duration::seconds(30), now), "30s ago");
        assert_eq!(format_relative_time_from(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_relative_time_from(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_relative_time_from(now - Duration::days(2), now), "2d ago");
        assert_eq!(format_relative_time_from(now - Duration::days(30), now), "Feb 09");
    }

    #[test]
    fn test_partial_is_stated() {
        let analysis = AnalysisSummary {
            message_count: 3,
            coverage: Coverage::Partial {
                recovered: 3,
                expected: Some(5),
            },
            ..Default::default()
        };
        let text = format_crash_message("task-1", &recovery(3, Some(5)), &analysis);
        assert!(text.contains("PARTIAL RECONSTRUCTION: recovered 3 of 5 expected messages"));
    }

    #[test]
    fn test_unknown_expected_count_is_partial() {
        let text =
            format_crash_message("task-1", &recovery(2, None), &AnalysisSummary::default());
        assert!(text.contains("original count is unknown"));
    }

    #[test]
    fn test_complete_recovery() {
        let analysis = AnalysisSummary {
            message_count: 2,
            human_count: 1,
            assistant_count: 1,
            topics: vec![TopicCount {
                topic: "auth".to_string(),
                count: 2,
            }],
            key_actions: vec!["I created auth.js".to_string()],
            time_range: Some(TimeRange {
                start: 1_700_000_000_000,
                end: 1_700_000_060_000,
            }),
            ..Default::default()
        };
        let text = format_crash_message("task-1", &recovery(2, Some(2)), &analysis);
        assert!(!text.contains("PARTIAL"));
        assert!(text.contains("Recovered all 2 messages (chunked strategy)."));
        assert!(text.contains("Topics: auth (2)"));
        assert!(text.contains("Time span: 2023-11-14 22:13 UTC to 2023-11-14 22:14 UTC"));
        assert!(text.contains("- I created auth.js"));
    }

    #[test]
    fn test_report_line() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let report = CrashReport {
            id: "crash-task-1-abcd1234".to_string(),
            source_id: "task-1".to_string(),
            created_at: now - Duration::minutes(3),
            analysis: AnalysisSummary::default(),
            recovery_summary: recovery(4, Some(6)),
            formatted_message: String::new(),
            read: false,
        };
        assert_eq!(
            format_report_line(&report, now),
            "* crash-task-1-abcd1234  task-1  4/6 messages  3m ago"
        );
    }

    #[test]
    fn test_nothing_recovered() {
        let text =
            format_crash_message("task-1", &recovery(0, None), &AnalysisSummary::default());
        assert!(text.contains("No messages could be recovered."));
    }
}
