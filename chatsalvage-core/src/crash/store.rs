//! Filesystem-backed crash report store.

use crate::error::{Error, Result};
use crate::format::format_crash_message;
use crate::types::{AnalysisSummary, CrashReport, Partition, RecoveryResult};
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the dismissed partition, a subdirectory of the active one.
pub const DISMISSED_DIR: &str = "Dismissed";

/// Crash reports as `<id>.json` files in an active directory and its
/// `Dismissed` subdirectory.
///
/// Nothing is cached: the directory a file sits in is its partition. Calls
/// take no lock; a rewrite that finds its file gone fails with `NotFound`
/// instead of recreating it, but callers in separate processes must still
/// serialize store calls on the same id.
#[derive(Debug, Clone)]
pub struct CrashReportStore {
    active_dir: PathBuf,
}

impl CrashReportStore {
    pub fn new(active_dir: impl Into<PathBuf>) -> Self {
        Self {
            active_dir: active_dir.into(),
        }
    }

    pub fn active_dir(&self) -> &Path {
        &self.active_dir
    }

    pub fn dismissed_dir(&self) -> PathBuf {
        self.active_dir.join(DISMISSED_DIR)
    }

    fn partition_dir(&self, partition: Partition) -> PathBuf {
        match partition {
            Partition::Active => self.active_dir.clone(),
            Partition::Dismissed => self.dismissed_dir(),
        }
    }

    /// Path of report `id` in `partition`, or `None` for ids that could
    /// escape the partition directory.
    fn report_path(&self, partition: Partition, id: &str) -> Option<PathBuf> {
        if !is_valid_id(id) {
            return None;
        }
        Some(self.partition_dir(partition).join(format!("{}.json", id)))
    }

    /// Build a new, unread report. Nothing is written until [`Self::persist`].
    pub fn create(
        &self,
        source_id: &str,
        recovery: &RecoveryResult,
        analysis: AnalysisSummary,
    ) -> CrashReport {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("crash-{}-{}", sanitize_id(source_id), &suffix[..8]);
        let recovery_summary = recovery.summary();
        let formatted_message = format_crash_message(source_id, &recovery_summary, &analysis);

        CrashReport {
            id,
            source_id: source_id.to_string(),
            created_at: Utc::now(),
            analysis,
            recovery_summary,
            formatted_message,
            read: false,
        }
    }

    /// Write `report` to the active partition.
    ///
    /// Rewrites an active report with the same id. Fails if the id is already
    /// dismissed, so a report never exists in both partitions, and with
    /// [`Error::NotFound`] for ids that could escape the store directory.
    pub fn persist(&self, report: &CrashReport) -> Result<PathBuf> {
        let path = self
            .report_path(Partition::Active, &report.id)
            .ok_or_else(|| not_found(&report.id))?;

        if let Some(dismissed) = self.report_path(Partition::Dismissed, &report.id) {
            if dismissed.exists() {
                return Err(Error::Io(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    format!("crash report {} is already dismissed", report.id),
                )));
            }
        }

        fs::create_dir_all(&self.active_dir)?;
        write_report(&path, report)?;
        info!(id = %report.id, source_id = %report.source_id, "crash report persisted");
        Ok(path)
    }

    /// Move report `id` from the active to the dismissed partition.
    ///
    /// ## Errors
    ///
    /// [`Error::NotFound`] if `id` is not in the active partition, including
    /// when it has already been dismissed.
    pub fn dismiss(&self, id: &str) -> Result<()> {
        let (Some(from), Some(to)) = (
            self.report_path(Partition::Active, id),
            self.report_path(Partition::Dismissed, id),
        ) else {
            return Err(not_found(id));
        };
        if !from.is_file() {
            return Err(not_found(id));
        }

        fs::create_dir_all(self.dismissed_dir())?;
        fs::rename(&from, &to).map_err(|e| match e.kind() {
            ErrorKind::NotFound => not_found(id),
            _ => Error::Io(e),
        })?;
        info!(id, "crash report dismissed");
        Ok(())
    }

    /// Set `read` on report `id`, in whichever partition holds it.
    ///
    /// Fails with [`Error::NotFound`] if the report moves or disappears
    /// between the lookup and the rewrite.
    pub fn mark_read(&self, id: &str) -> Result<CrashReport> {
        let (partition, mut report) = self.get(id)?;
        if !report.read {
            report.read = true;
            let path = self
                .report_path(partition, id)
                .ok_or_else(|| not_found(id))?;
            replace_report(&path, &report)?;
            info!(id, partition = partition.as_str(), "crash report marked read");
        }
        Ok(report)
    }

    /// Look up report `id` and the partition it is in.
    pub fn get(&self, id: &str) -> Result<(Partition, CrashReport)> {
        for partition in [Partition::Active, Partition::Dismissed] {
            let Some(path) = self.report_path(partition, id) else {
                return Err(not_found(id));
            };
            match fs::read(&path) {
                Ok(bytes) => return Ok((partition, serde_json::from_slice(&bytes)?)),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Err(not_found(id))
    }

    /// Remove report `id` from disk; returns the partition it was in.
    pub fn delete(&self, id: &str) -> Result<Partition> {
        for partition in [Partition::Active, Partition::Dismissed] {
            let Some(path) = self.report_path(partition, id) else {
                return Err(not_found(id));
            };
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(id, partition = partition.as_str(), "crash report deleted");
                    return Ok(partition);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Err(not_found(id))
    }

    /// Reports in `partition`, newest first.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    pub fn list(&self, partition: Partition) -> Result<Vec<CrashReport>> {
        let dir = self.partition_dir(partition);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let pattern = format!(
            "{}/*.json",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let entries = glob::glob(&pattern).map_err(|e| Error::Parse {
            origin: dir.display().to_string(),
            message: format!("Invalid glob pattern: {}", e),
        })?;

        let mut reports = Vec::new();
        for path in entries.flatten() {
            match read_report(&path) {
                Ok(report) => reports.push(report),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable crash report"),
            }
        }

        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        debug!(partition = partition.as_str(), count = reports.len(), "listed crash reports");
        Ok(reports)
    }

    /// Active reports not yet read.
    pub fn unread_count(&self) -> Result<usize> {
        Ok(self
            .list(Partition::Active)?
            .iter()
            .filter(|r| !r.read)
            .count())
    }
}

/// Replace characters outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_id(source_id: &str) -> String {
    let cleaned: String = source_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains("..") && !id.contains('/') && !id.contains('\\')
}

fn not_found(id: &str) -> Error {
    Error::NotFound(format!("crash report {}", id))
}

fn read_report(path: &Path) -> Result<CrashReport> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Pretty-printed JSON, written to a temp file and renamed into place.
fn write_report(path: &Path, report: &CrashReport) -> Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, serde_json::to_vec_pretty(report)?)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    Ok(())
}

/// Like [`write_report`], but only over a file that still exists.
///
/// The existence check runs after the temp file is written, right before the
/// rename.
fn replace_report(path: &Path, report: &CrashReport) -> Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, serde_json::to_vec_pretty(report)?)?;
    if !path.is_file() {
        let _ = fs::remove_file(&tmp);
        return Err(not_found(&report.id));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, Role, StrategyKind};
    use tempfile::TempDir;

    fn recovery() -> RecoveryResult {
        RecoveryResult {
            strategy_used: StrategyKind::Chunked,
            recovered_count: 1,
            expected_count: Some(2),
            messages: vec![Message::new(Role::Human, "hello")],
            diagnostics: vec!["chunked: object at byte 40 is unterminated".to_string()],
        }
    }

    fn store() -> (TempDir, CrashReportStore) {
        let dir = TempDir::new().unwrap();
        let store = CrashReportStore::new(dir.path().join("crash-reports"));
        (dir, store)
    }

    #[test]
    fn test_create_sets_id_and_unread() {
        let (_dir, store) = store();
        let report = store.create("task/1 ..", &recovery(), AnalysisSummary::default());
        assert!(report.id.starts_with("crash-task_1___-"));
        assert_eq!(report.id.len(), "crash-task_1___-".len() + 8);
        assert!(!report.read);
        assert_eq!(report.source_id, "task/1 ..");
        assert!(report.formatted_message.contains("PARTIAL RECONSTRUCTION"));
    }

    #[test]
    fn test_persist_then_get() {
        let (_dir, store) = store();
        let report = store.create("t1", &recovery(), AnalysisSummary::default());
        let path = store.persist(&report).unwrap();
        assert!(path.ends_with(format!("{}.json", report.id)));
        assert!(!path.with_extension("json.tmp").exists());

        let (partition, loaded) = store.get(&report.id).unwrap();
        assert_eq!(partition, Partition::Active);
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_dismiss_moves_exactly_once() {
        let (_dir, store) = store();
        let report = store.create("t1", &recovery(), AnalysisSummary::default());
        store.persist(&report).unwrap();

        store.dismiss(&report.id).unwrap();
        assert!(store.list(Partition::Active).unwrap().is_empty());
        assert_eq!(store.list(Partition::Dismissed).unwrap().len(), 1);

        let err = store.dismiss(&report.id).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // Re-persisting a dismissed id would create a second copy
        assert!(store.persist(&report).is_err());
    }

    #[test]
    fn test_mark_read_in_dismissed_partition() {
        let (_dir, store) = store();
        let report = store.create("t1", &recovery(), AnalysisSummary::default());
        store.persist(&report).unwrap();
        store.dismiss(&report.id).unwrap();

        let updated = store.mark_read(&report.id).unwrap();
        assert!(updated.read);
        let (partition, loaded) = store.get(&report.id).unwrap();
        assert_eq!(partition, Partition::Dismissed);
        assert!(loaded.read);
    }

    #[test]
    fn test_list_sorted_newest_first_and_skips_garbage() {
        let (_dir, store) = store();
        let mut older = store.create("a", &recovery(), AnalysisSummary::default());
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        let newer = store.create("b", &recovery(), AnalysisSummary::default());
        store.persist(&older).unwrap();
        store.persist(&newer).unwrap();
        fs::write(store.active_dir().join("broken.json"), "{not json").unwrap();

        let ids: Vec<String> = store
            .list(Partition::Active)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![newer.id.clone(), older.id.clone()]);
        assert_eq!(store.unread_count().unwrap(), 2);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let (_dir, store) = store();
        assert!(store.list(Partition::Dismissed).unwrap().is_empty());
    }

    #[test]
    fn test_traversal_ids_are_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.dismiss("../etc"), Err(Error::NotFound(_))));
        assert!(matches!(store.get("a/b"), Err(Error::NotFound(_))));
        assert!(matches!(store.delete(""), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_rewrite_after_dismiss_does_not_resurrect() {
        let (_dir, store) = store();
        let mut report = store.create("t1", &recovery(), AnalysisSummary::default());
        let active = store.persist(&report).unwrap();
        store.dismiss(&report.id).unwrap();

        report.read = true;
        let err = replace_report(&active, &report).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!active.exists());
        assert!(!tmp_path(&active).exists());
        assert_eq!(store.get(&report.id).unwrap().0, Partition::Dismissed);
    }

    #[test]
    fn test_persist_invalid_id_is_not_found() {
        let (_dir, store) = store();
        let mut report = store.create("t1", &recovery(), AnalysisSummary::default());
        report.id = "../escape".to_string();
        assert!(matches!(store.persist(&report), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete() {
        let (_dir, store) = store();
        let report = store.create("t1", &recovery(), AnalysisSummary::default());
        store.persist(&report).unwrap();
        assert_eq!(store.delete(&report.id).unwrap(), Partition::Active);
        assert!(matches!(store.get(&report.id), Err(Error::NotFound(_))));
    }
}
