//! Conversation engine: the composed read → recover → analyze → report path.
//!
//! Exact reads and best-effort recovery are separate entry points.
//! [`ConversationEngine::read_exact`] surfaces parse errors;
//! [`ConversationEngine::load`] falls back to recovery and says so in its
//! return type.

use crate::analysis::ConversationAnalyzer;
use crate::cache::{ActiveTaskCache, Clock};
use crate::config::{CacheConfig, Config};
use crate::crash::CrashReportStore;
use crate::error::Result;
use crate::reader::{self, select};
use crate::recovery::RecoveryPipeline;
use crate::source::{ConversationLocator, TaskDirectoryLocator};
use crate::types::{AnalysisSummary, CrashReport, FilterSpec, Message, RecoveryResult};
use std::path::PathBuf;
use tracing::{info, warn};

/// Outcome of [`ConversationEngine::load`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationLoad {
    /// The file parsed; messages are exactly the filter's selection
    Exact(Vec<Message>),
    /// The file did not parse; `messages` holds the filter's selection of
    /// what recovery found, `recovered_count` counts everything recovered
    Recovered(RecoveryResult),
}

impl ConversationLoad {
    pub fn messages(&self) -> &[Message] {
        match self {
            ConversationLoad::Exact(messages) => messages,
            ConversationLoad::Recovered(result) => &result.messages,
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, ConversationLoad::Recovered(_))
    }
}

pub struct ConversationEngine<L: ConversationLocator = TaskDirectoryLocator> {
    locator: L,
    pipeline: RecoveryPipeline,
    analyzer: ConversationAnalyzer,
    store: CrashReportStore,
    max_recovered: Option<usize>,
    cache: CacheConfig,
}

impl ConversationEngine<TaskDirectoryLocator> {
    /// Engine over the extension's task directory, as configured.
    pub fn from_config(config: &Config) -> Self {
        Self::new(TaskDirectoryLocator::new(config.storage.tasks_root()), config)
    }
}

impl<L: ConversationLocator> ConversationEngine<L> {
    pub fn new(locator: L, config: &Config) -> Self {
        let mut engine = Self::with_parts(
            locator,
            RecoveryPipeline::new(&config.recovery),
            ConversationAnalyzer::new(&config.analysis),
            CrashReportStore::new(config.storage.crash_reports_dir()),
        );
        engine.max_recovered = config.recovery.max_messages;
        engine.cache = config.cache.clone();
        engine
    }

    pub fn with_parts(
        locator: L,
        pipeline: RecoveryPipeline,
        analyzer: ConversationAnalyzer,
        store: CrashReportStore,
    ) -> Self {
        Self {
            locator,
            pipeline,
            analyzer,
            store,
            max_recovered: None,
            cache: CacheConfig::default(),
        }
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    pub fn store(&self) -> &CrashReportStore {
        &self.store
    }

    /// Exact filtered read; parse failures are returned, never recovered.
    pub fn read_exact(&self, source_id: &str, filter: &FilterSpec) -> Result<Vec<Message>> {
        let path = self.locator.locate(source_id)?;
        reader::read_filtered(&path, filter)
    }

    /// Filtered read that falls back to recovery when the file won't parse.
    ///
    /// `NotFound` and I/O errors are still returned.
    pub fn load(&self, source_id: &str, filter: &FilterSpec) -> Result<ConversationLoad> {
        let path = self.locator.locate(source_id)?;
        match reader::read_filtered(&path, filter) {
            Ok(messages) => Ok(ConversationLoad::Exact(messages)),
            Err(err) if err.is_parse() => {
                warn!(
                    source_id,
                    error = %err,
                    "exact read failed, switching to recovery"
                );
                let mut result = self.pipeline.recover(&path, self.max_recovered);
                let recovered = std::mem::take(&mut result.messages);
                let total = recovered.len();
                result.messages = select(recovered, filter);
                if result.messages.len() != total {
                    result.diagnostics.push(format!(
                        "filter selected {} of {} recovered messages",
                        result.messages.len(),
                        total
                    ));
                }
                Ok(ConversationLoad::Recovered(result))
            }
            Err(err) => Err(err),
        }
    }

    /// Run the recovery pipeline on a conversation.
    ///
    /// Only locating the file can fail.
    pub fn recover(&self, source_id: &str) -> Result<RecoveryResult> {
        let path = self.locator.locate(source_id)?;
        Ok(self.pipeline.recover(&path, self.max_recovered))
    }

    /// Analyze a conversation, exactly when possible.
    pub fn analyze(&self, source_id: &str, since: Option<i64>) -> Result<AnalysisSummary> {
        Ok(match self.load(source_id, &FilterSpec::new())? {
            ConversationLoad::Exact(messages) => self.analyzer.analyze(&messages, since),
            ConversationLoad::Recovered(result) => self.analyzer.analyze_recovery(&result, since),
        })
    }

    /// Recover, analyze and persist a crash report for `source_id`.
    pub fn salvage(&self, source_id: &str) -> Result<CrashReport> {
        let recovery = self.recover(source_id)?;
        let analysis = self.analyzer.analyze_recovery(&recovery, None);
        let report = self.store.create(source_id, &recovery, analysis);
        self.store.persist(&report)?;
        info!(
            source_id,
            id = %report.id,
            recovered = recovery.recovered_count,
            expected = ?recovery.expected_count,
            "salvaged conversation"
        );
        Ok(report)
    }

    /// Empty active task cache with the configured TTL.
    pub fn active_task_cache<C: Clock>(&self, clock: C) -> ActiveTaskCache<C> {
        ActiveTaskCache::from_config(&self.cache, clock)
    }

    /// Source id and path of the active task for `workspace`, if the cache
    /// holds a live entry whose conversation still exists.
    ///
    /// An entry pointing at a missing conversation is cleared.
    pub fn active_source<C: Clock>(
        &self,
        cache: &mut ActiveTaskCache<C>,
        workspace: &str,
    ) -> Option<(String, PathBuf)> {
        let source_id = cache.active(workspace)?;
        match self.locator.locate(&source_id) {
            Ok(path) => Some((source_id, path)),
            Err(err) => {
                warn!(workspace, source_id = %source_id, error = %err, "dropping stale active task");
                cache.clear(workspace);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::error::Error;
    use crate::source::HISTORY_FILE;
    use crate::types::{Partition, Role};
    use chrono::{Duration, Utc};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ConversationEngine) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.active_task_ttl_secs = 60;
        config.storage.tasks_root = Some(dir.path().join("ext"));
        config.storage.crash_reports_dir = Some(dir.path().join("reports"));
        let engine = ConversationEngine::from_config(&config);
        (dir, engine)
    }

    fn write_task(engine: &ConversationEngine, id: &str, body: &str) {
        let dir = engine.locator().root().join("tasks").join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(HISTORY_FILE), body).unwrap();
    }

    const GOOD: &str = r#"[
  {"role": "user", "content": "Fix login in auth.js"},
  {"role": "assistant", "content": "I fixed the token check in auth.js."}
]"#;

    const CUT: &str = r#"[
  {"role": "user", "content": "Fix login in auth.js"},
  {"role": "assistant", "content": "I fixed the token check in auth.js."},
  {"role": "user", "content": "Now add a te"#;

    #[test]
    fn test_load_exact() {
        let (_dir, engine) = setup();
        write_task(&engine, "t1", GOOD);
        let load = engine.load("t1", &FilterSpec::new().limit(1)).unwrap();
        assert!(!load.is_recovered());
        assert_eq!(load.messages().len(), 1);
        assert_eq!(load.messages()[0].role, Role::Assistant);
    }

    #[test]
    fn test_read_exact_surfaces_parse_error() {
        let (_dir, engine) = setup();
        write_task(&engine, "t1", CUT);
        assert!(engine
            .read_exact("t1", &FilterSpec::new())
            .unwrap_err()
            .is_parse());
    }

    #[test]
    fn test_load_falls_back_to_recovery() {
        let (_dir, engine) = setup();
        write_task(&engine, "t1", CUT);
        let load = engine.load("t1", &FilterSpec::new().search("token")).unwrap();
        match load {
            ConversationLoad::Recovered(result) => {
                assert_eq!(result.recovered_count, 2);
                assert_eq!(result.expected_count, Some(3));
                assert_eq!(result.messages.len(), 1);
                assert!(result
                    .diagnostics
                    .iter()
                    .any(|d| d == "filter selected 1 of 2 recovered messages"));
            }
            other => panic!("expected recovery, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_source() {
        let (_dir, engine) = setup();
        assert!(matches!(
            engine.load("nope", &FilterSpec::new()),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(engine.salvage("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_analyze_marks_partial_coverage() {
        let (_dir, engine) = setup();
        write_task(&engine, "good", GOOD);
        write_task(&engine, "cut", CUT);

        let exact = engine.analyze("good", None).unwrap();
        assert!(!exact.coverage.is_partial());
        assert!(exact.files_referenced.contains("auth.js"));

        let partial = engine.analyze("cut", None).unwrap();
        assert!(partial.coverage.is_partial());
        assert_eq!(partial.message_count, 2);
    }

    #[test]
    fn test_salvage_persists_report() {
        let (_dir, engine) = setup();
        write_task(&engine, "t1", CUT);

        let report = engine.salvage("t1").unwrap();
        assert!(report.formatted_message.contains("PARTIAL RECONSTRUCTION"));
        assert_eq!(report.analysis.key_actions.len(), 1);

        let active = engine.store().list(Partition::Active).unwrap();
        assert_eq!(active, vec![report]);
    }

    #[test]
    fn test_active_source_drops_stale_entries() {
        let (_dir, engine) = setup();
        write_task(&engine, "t1", GOOD);
        let mut cache = engine.active_task_cache(ManualClock::new(Utc::now()));

        cache.set_active("/ws", "t1");
        let (id, path) = engine.active_source(&mut cache, "/ws").unwrap();
        assert_eq!(id, "t1");
        assert!(path.ends_with(Path::new("t1").join(HISTORY_FILE)));

        cache.clock().advance(Duration::seconds(60));
        assert!(engine.active_source(&mut cache, "/ws").is_none());

        cache.set_active("/ws", "gone");
        assert!(engine.active_source(&mut cache, "/ws").is_none());
        assert!(cache.is_empty());
    }
}
