use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::ImportOptions;
use crate::models::entry::NewEntry;
use crate::models::import::{CandidateEntry, CommitSummary, ValidationSummary};
use crate::services::batch_inserter::insert_in_chunks;
use crate::services::csv_parser::{parse_rows, SchemaError};
use crate::services::duplicate_reconciler::{dedupe_within_file, reconcile};
use crate::services::entry_store::EntryStore;
use crate::services::entry_validator;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("no file has been selected")]
    NoFileSelected,
    #[error("import session not found")]
    UnknownSession,
}

/// 导入会话的状态机：Idle → FileSelected → Parsed → Done
///
/// commit 期间会话被 &mut 借用，状态一直保持 Parsed，只有全部分块跑完才切到 Done。
/// commit 中途被丢弃 (客户端断开) 时会话仍是 Parsed，重新提交会把已写入的词当作已存在跳过。
#[derive(Debug, Default)]
enum ImportState {
    #[default]
    Idle,
    FileSelected {
        content: String,
    },
    Parsed {
        content: String,
        candidates: Vec<CandidateEntry>,
    },
    Done {
        summary: CommitSummary,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Idle,
    FileSelected,
    Parsed,
    Done,
}

/// commit 的所有结局；提前结束的情况也是正常返回值，不是错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    NotParsed,
    AlreadyCommitted,
    NoValidEntries,
    DuplicateCheckFailed,
    NoNewEntries { skipped_existing: usize, skipped_in_file: usize },
    Completed(CommitSummary),
}

impl CommitOutcome {
    pub fn message(&self) -> String {
        match self {
            CommitOutcome::NotParsed => "Please process the CSV file before uploading.".to_string(),
            CommitOutcome::AlreadyCommitted => "This import has already been uploaded.".to_string(),
            CommitOutcome::NoValidEntries => {
                "No valid entries. Please fix the errors in your CSV file.".to_string()
            }
            CommitOutcome::DuplicateCheckFailed => {
                "Could not check for existing words. Please try again.".to_string()
            }
            CommitOutcome::NoNewEntries { .. } => {
                "No new entries. All words in the CSV already exist in the dictionary.".to_string()
            }
            CommitOutcome::Completed(summary) if summary.failed_chunks.is_empty() => {
                format!("Added {} new dictionary entries.", summary.inserted_count)
            }
            CommitOutcome::Completed(summary) => format!(
                "Added {} of {} new dictionary entries; {} batch(es) failed.",
                summary.inserted_count,
                summary.attempted_count,
                summary.failed_chunks.len()
            ),
        }
    }
}

/// 一次批量导入的全部状态，由调用方显式持有
#[derive(Debug)]
pub struct ImportSession {
    options: ImportOptions,
    state: ImportState,
}

impl ImportSession {
    pub fn new(options: ImportOptions) -> Self {
        ImportSession { options, state: ImportState::Idle }
    }

    pub fn stage(&self) -> SessionStage {
        match self.state {
            ImportState::Idle => SessionStage::Idle,
            ImportState::FileSelected { .. } => SessionStage::FileSelected,
            ImportState::Parsed { .. } => SessionStage::Parsed,
            ImportState::Done { .. } => SessionStage::Done,
        }
    }

    /// 选择新文件会丢弃之前的解析结果
    pub fn select_file(&mut self, content: String) {
        self.state = ImportState::FileSelected { content };
    }

    pub fn candidates(&self) -> &[CandidateEntry] {
        match &self.state {
            ImportState::Parsed { candidates, .. } => candidates,
            _ => &[],
        }
    }

    /// 解析并校验当前文件。表头不合法时会话停留在 FileSelected
    pub fn parse(&mut self) -> Result<ValidationSummary, ImportError> {
        let content = match mem::take(&mut self.state) {
            ImportState::FileSelected { content } | ImportState::Parsed { content, .. } => content,
            other => {
                self.state = other;
                return Err(ImportError::NoFileSelected);
            }
        };

        let rows = match parse_rows(&content, self.options.delimiter) {
            Ok(rows) => rows,
            Err(e) => {
                self.state = ImportState::FileSelected { content };
                return Err(e.into());
            }
        };

        let candidates: Vec<CandidateEntry> = rows.into_iter().map(entry_validator::validate).collect();
        let summary = ValidationSummary::from_candidates(&candidates);
        self.state = ImportState::Parsed { content, candidates };
        Ok(summary)
    }

    /// 查重后分块写入。只有成功走完才进入 Done，其余情况会话保持 Parsed，可以重试
    pub async fn commit<S>(&mut self, store: &S, user_id: Uuid) -> CommitOutcome
    where
        S: EntryStore + Sync,
    {
        let valid: Vec<NewEntry> = match &self.state {
            ImportState::Parsed { candidates, .. } => candidates
                .iter()
                .filter(|c| c.is_valid())
                .map(|c| c.entry.clone())
                .collect(),
            ImportState::Done { .. } => return CommitOutcome::AlreadyCommitted,
            _ => return CommitOutcome::NotParsed,
        };
        if valid.is_empty() {
            return CommitOutcome::NoValidEntries;
        }

        let (unique, skipped_in_file) = dedupe_within_file(valid);

        let reconciliation = match reconcile(store, unique).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("!!! 查重失败, 本次不写入: user={}, Error: {}", user_id, e);
                return CommitOutcome::DuplicateCheckFailed;
            }
        };

        if reconciliation.new_entries.is_empty() {
            return CommitOutcome::NoNewEntries {
                skipped_existing: reconciliation.skipped_existing,
                skipped_in_file,
            };
        }

        let report = insert_in_chunks(
            store,
            &reconciliation.new_entries,
            user_id,
            self.options.chunk_size,
        )
        .await;

        let summary = CommitSummary {
            inserted_count: report.inserted,
            attempted_count: reconciliation.new_entries.len(),
            skipped_existing: reconciliation.skipped_existing,
            skipped_in_file,
            failed_chunks: report.failed_chunks,
        };
        tracing::info!(
            "<<< 批量导入完成: user={}, inserted={}, attempted={}, failed_chunks={}",
            user_id, summary.inserted_count, summary.attempted_count, summary.failed_chunks.len()
        );

        self.state = ImportState::Done { summary: summary.clone() };
        CommitOutcome::Completed(summary)
    }
}

struct SessionSlot {
    owner: Uuid,
    touched: Instant,
    session: Arc<Mutex<ImportSession>>,
}

/// 进行中的导入会话，按用户隔离。
///
/// 超过 ttl 未访问的会话会被清理；每个用户最多保留 max_per_owner 个，超出时淘汰最久未访问的。
pub struct ImportRegistry {
    sessions: Mutex<HashMap<Uuid, SessionSlot>>,
    ttl: Duration,
    max_per_owner: usize,
}

impl ImportRegistry {
    pub fn new(ttl: Duration, max_per_owner: usize) -> Self {
        ImportRegistry {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_per_owner: max_per_owner.max(1),
        }
    }

    pub async fn insert(&self, owner: Uuid, session: ImportSession) -> Uuid {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let ttl = self.ttl;
        sessions.retain(|_, slot| now.duration_since(slot.touched) < ttl);

        let mut owned: Vec<(Uuid, Instant)> = sessions
            .iter()
            .filter(|(_, slot)| slot.owner == owner)
            .map(|(id, slot)| (*id, slot.touched))
            .collect();
        if owned.len() >= self.max_per_owner {
            owned.sort_by_key(|(_, touched)| *touched);
            let excess = owned.len() + 1 - self.max_per_owner;
            for (id, _) in owned.into_iter().take(excess) {
                tracing::info!("--- 导入会话超出上限被淘汰: session={}, user={}", id, owner);
                sessions.remove(&id);
            }
        }

        let id = Uuid::new_v4();
        let slot = SessionSlot { owner, touched: now, session: Arc::new(Mutex::new(session)) };
        sessions.insert(id, slot);
        id
    }

    /// 别人的会话同样视为不存在；过期的会话当场移除
    pub async fn get(&self, id: Uuid, owner: Uuid) -> Result<Arc<Mutex<ImportSession>>, ImportError> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let expired = match sessions.get_mut(&id) {
            Some(slot) if slot.owner == owner => {
                if now.duration_since(slot.touched) < self.ttl {
                    slot.touched = now;
                    return Ok(slot.session.clone());
                }
                true
            }
            _ => false,
        };
        if expired {
            sessions.remove(&id);
        }
        Err(ImportError::UnknownSession)
    }

    pub async fn remove(&self, id: Uuid, owner: Uuid) -> Result<(), ImportError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&id) {
            Some(slot) if slot.owner == owner => {
                sessions.remove(&id);
                Ok(())
            }
            _ => Err(ImportError::UnknownSession),
        }
    }

    /// 清理过期会话，返回清理数量
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, slot| now.duration_since(slot.touched) < self.ttl);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// 后台定期清理过期的导入会话
pub fn spawn_sweeper(registry: Arc<ImportRegistry>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let evicted = registry.evict_expired().await;
            if evicted > 0 {
                tracing::info!("<<< 清理过期导入会话: evicted={}", evicted);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::entry_store::testing::MemoryStore;

    const HEADER: &str = "word,part_of_speech,definition\n";

    fn session_with(body: &str) -> ImportSession {
        let mut session = ImportSession::new(ImportOptions::default());
        session.select_file(format!("{HEADER}{body}"));
        session
    }

    fn generated_rows(n: usize) -> String {
        (0..n).map(|i| format!("word{i},noun,definition {i}\n")).collect()
    }

    #[test]
    fn parse_reports_valid_and_invalid_rows() {
        let mut session = session_with("thlai,noun,a plant\n,noun,x\nkal,article,to go\n\n");
        let summary = session.parse().unwrap();

        assert_eq!(summary.valid_count, 1);
        assert_eq!(summary.invalid_count, 2);
        assert_eq!(summary.rows[1].status, "Word is required");
        assert_eq!(summary.rows[2].status, "Invalid part of speech");
        assert_eq!(session.stage(), SessionStage::Parsed);
    }

    #[test]
    fn schema_error_produces_no_candidates() {
        let mut session = ImportSession::new(ImportOptions::default());
        session.select_file("Word,PartOfSpeech,Definition\nthlai,noun,plant".into());

        let err = session.parse().unwrap_err();
        assert!(matches!(err, ImportError::Schema(_)));
        assert!(session.candidates().is_empty());
        assert_eq!(session.stage(), SessionStage::FileSelected);
    }

    #[test]
    fn parse_without_file_fails() {
        let mut session = ImportSession::new(ImportOptions::default());
        assert_eq!(session.parse().unwrap_err(), ImportError::NoFileSelected);
        assert_eq!(session.stage(), SessionStage::Idle);
    }

    #[test]
    fn selecting_a_new_file_discards_previous_results() {
        let mut session = session_with("thlai,noun,a plant\n");
        session.parse().unwrap();
        assert_eq!(session.candidates().len(), 1);

        session.select_file(format!("{HEADER}kal,verb,to go\nzu,noun,beer\n"));
        assert!(session.candidates().is_empty());
        assert_eq!(session.stage(), SessionStage::FileSelected);
        assert_eq!(session.parse().unwrap().valid_count, 2);
    }

    #[tokio::test]
    async fn commit_before_parse_short_circuits() {
        let store = MemoryStore::default();
        let mut session = session_with("thlai,noun,a plant\n");

        assert_eq!(session.commit(&store, Uuid::new_v4()).await, CommitOutcome::NotParsed);
        assert_eq!(session.stage(), SessionStage::FileSelected);
        assert_eq!(store.read_count(), 0);
    }

    #[tokio::test]
    async fn commit_with_no_valid_rows_short_circuits() {
        let store = MemoryStore::default();
        let mut session = session_with(",noun,x\nkal,,to go\n");
        session.parse().unwrap();

        assert_eq!(session.commit(&store, Uuid::new_v4()).await, CommitOutcome::NoValidEntries);
        assert_eq!(store.read_count(), 0);
    }

    #[tokio::test]
    async fn existing_words_are_excluded() {
        let store = MemoryStore::with_words(&["thlai"]);
        let mut session = session_with("thlai,noun,\"a plant sown for food\"\nkal,verb,to go\n");
        session.parse().unwrap();

        let outcome = session.commit(&store, Uuid::new_v4()).await;
        let CommitOutcome::Completed(summary) = &outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(summary.inserted_count, 1);
        assert_eq!(summary.skipped_existing, 1);
        assert!(store.contains("kal"));
        assert_eq!(session.stage(), SessionStage::Done);
    }

    #[tokio::test]
    async fn all_existing_reports_no_new_entries() {
        let store = MemoryStore::with_words(&["thlai"]);
        let mut session = session_with("thlai,noun,a plant\n");
        session.parse().unwrap();

        let outcome = session.commit(&store, Uuid::new_v4()).await;
        assert_eq!(
            outcome,
            CommitOutcome::NoNewEntries { skipped_existing: 1, skipped_in_file: 0 }
        );
        assert!(store.chunk_sizes().is_empty());
    }

    #[tokio::test]
    async fn second_import_of_same_file_inserts_nothing() {
        let store = MemoryStore::default();
        let file = generated_rows(10);

        let mut first = session_with(&file);
        first.parse().unwrap();
        assert!(matches!(
            first.commit(&store, Uuid::new_v4()).await,
            CommitOutcome::Completed(CommitSummary { inserted_count: 10, .. })
        ));

        let mut second = session_with(&file);
        second.parse().unwrap();
        assert_eq!(
            second.commit(&store, Uuid::new_v4()).await,
            CommitOutcome::NoNewEntries { skipped_existing: 10, skipped_in_file: 0 }
        );
        assert_eq!(store.len(), 10);
    }

    #[tokio::test]
    async fn failed_duplicate_check_writes_nothing_and_can_retry() {
        let store = MemoryStore::default().failing_reads();
        let mut session = session_with("kal,verb,to go\n");
        session.parse().unwrap();

        let outcome = session.commit(&store, Uuid::new_v4()).await;
        assert_eq!(outcome, CommitOutcome::DuplicateCheckFailed);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({ "status": "duplicate_check_failed" })
        );
        assert!(store.chunk_sizes().is_empty());
        assert_eq!(session.stage(), SessionStage::Parsed);

        let healthy = MemoryStore::default();
        assert!(matches!(
            session.commit(&healthy, Uuid::new_v4()).await,
            CommitOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn partial_chunk_failure_is_reported() {
        let store = MemoryStore::default().failing_insert(1);
        let mut session = session_with(&generated_rows(120));
        session.parse().unwrap();

        let outcome = session.commit(&store, Uuid::new_v4()).await;
        let CommitOutcome::Completed(summary) = &outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(store.chunk_sizes(), vec![50, 50, 20]);
        assert_eq!(summary.inserted_count, 70);
        assert_eq!(summary.attempted_count, 120);
        assert_eq!(summary.failed_chunks.len(), 1);
        assert_eq!(outcome.message(), "Added 70 of 120 new dictionary entries; 1 batch(es) failed.");
    }

    #[tokio::test]
    async fn duplicate_words_within_a_file_keep_the_first() {
        let store = MemoryStore::default();
        let mut session = session_with("kal,verb,to go\nkal,noun,a journey\n");
        session.parse().unwrap();

        let outcome = session.commit(&store, Uuid::new_v4()).await;
        let CommitOutcome::Completed(summary) = &outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(summary.inserted_count, 1);
        assert_eq!(summary.skipped_in_file, 1);
    }

    #[tokio::test]
    async fn done_session_cannot_commit_again() {
        let store = MemoryStore::default();
        let mut session = session_with("kal,verb,to go\n");
        session.parse().unwrap();
        session.commit(&store, Uuid::new_v4()).await;

        assert_eq!(session.commit(&store, Uuid::new_v4()).await, CommitOutcome::AlreadyCommitted);
        assert_eq!(session.parse().unwrap_err(), ImportError::NoFileSelected);
    }

    #[test]
    fn outcomes_serialize_with_a_status_tag() {
        let json = serde_json::to_value(CommitOutcome::NoNewEntries {
            skipped_existing: 2,
            skipped_in_file: 0,
        })
        .unwrap();
        assert_eq!(json["status"], "no_new_entries");
        assert_eq!(json["skipped_existing"], 2);
    }

    #[tokio::test]
    async fn registry_hides_sessions_from_other_users() {
        let registry = ImportRegistry::new(Duration::from_secs(60), 5);
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let id = registry.insert(owner, ImportSession::new(ImportOptions::default())).await;

        assert!(registry.get(id, owner).await.is_ok());
        assert_eq!(registry.get(id, stranger).await.unwrap_err(), ImportError::UnknownSession);
        assert_eq!(registry.remove(id, stranger).await.unwrap_err(), ImportError::UnknownSession);

        registry.remove(id, owner).await.unwrap();
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn dropped_commit_leaves_the_session_retryable() {
        let store = MemoryStore::default().stalling_insert(1);
        let owner = Uuid::new_v4();
        let mut session = session_with(&generated_rows(60));
        session.parse().unwrap();

        // 第二个分块永远不返回，模拟客户端在写入途中断开
        let pending = tokio::time::timeout(
            Duration::from_millis(20),
            session.commit(&store, owner),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(session.stage(), SessionStage::Parsed);
        assert_eq!(session.candidates().len(), 60);
        assert_eq!(store.len(), 50);

        let outcome = session.commit(&store, owner).await;
        let CommitOutcome::Completed(summary) = &outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(summary.inserted_count, 10);
        assert_eq!(summary.skipped_existing, 50);
        assert_eq!(store.len(), 60);
        assert_eq!(session.stage(), SessionStage::Done);
    }

    #[tokio::test]
    async fn registry_evicts_idle_sessions() {
        let registry = ImportRegistry::new(Duration::from_millis(20), 5);
        let owner = Uuid::new_v4();
        let id = registry.insert(owner, ImportSession::new(ImportOptions::default())).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(registry.get(id, owner).await.unwrap_err(), ImportError::UnknownSession);

        registry.insert(owner, ImportSession::new(ImportOptions::default())).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(registry.evict_expired().await, 1);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn registry_caps_open_sessions_per_user() {
        let registry = ImportRegistry::new(Duration::from_secs(60), 2);
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let oldest = registry.insert(owner, ImportSession::new(ImportOptions::default())).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        let middle = registry.insert(owner, ImportSession::new(ImportOptions::default())).await;
        let theirs = registry.insert(other, ImportSession::new(ImportOptions::default())).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        let newest = registry.insert(owner, ImportSession::new(ImportOptions::default())).await;

        assert!(registry.get(oldest, owner).await.is_err());
        assert!(registry.get(middle, owner).await.is_ok());
        assert!(registry.get(newest, owner).await.is_ok());
        assert!(registry.get(theirs, other).await.is_ok());
        assert_eq!(registry.len().await, 3);
    }
}
