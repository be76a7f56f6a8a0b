use std::collections::HashSet;

use crate::models::entry::NewEntry;
use crate::services::entry_store::{EntryStore, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub new_entries: Vec<NewEntry>,
    pub skipped_existing: usize,
}

/// 去掉词库里已有的词。只发起一次读取；读取失败直接返回错误，调用方不得继续写入
pub async fn reconcile<S>(store: &S, candidates: Vec<NewEntry>) -> StoreResult<Reconciliation>
where
    S: EntryStore + Sync,
{
    if candidates.is_empty() {
        return Ok(Reconciliation { new_entries: Vec::new(), skipped_existing: 0 });
    }

    let words: Vec<String> = candidates.iter().map(|e| e.word.clone()).collect();
    let existing = store.existing_words(&words).await?;
    tracing::debug!("查重完成: candidates={}, existing={}", candidates.len(), existing.len());

    let total = candidates.len();
    let new_entries: Vec<NewEntry> = candidates
        .into_iter()
        .filter(|e| !existing.contains(&e.word))
        .collect();

    Ok(Reconciliation {
        skipped_existing: total - new_entries.len(),
        new_entries,
    })
}

/// 同一文件里重复出现的词只保留第一次出现的那条，返回被丢弃的数量
pub fn dedupe_within_file(entries: Vec<NewEntry>) -> (Vec<NewEntry>, usize) {
    let mut seen = HashSet::new();
    let total = entries.len();
    let kept: Vec<NewEntry> = entries
        .into_iter()
        .filter(|e| seen.insert(e.word.clone()))
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::entry_store::testing::MemoryStore;

    fn entry(word: &str) -> NewEntry {
        NewEntry::trimmed(word, "noun", "definition")
    }

    #[tokio::test]
    async fn excludes_words_already_in_the_store() {
        let store = MemoryStore::with_words(&["thlai"]);
        let result = reconcile(&store, vec![entry("thlai"), entry("kal")]).await.unwrap();

        assert_eq!(result.new_entries, vec![entry("kal")]);
        assert_eq!(result.skipped_existing, 1);
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn match_is_case_sensitive() {
        let store = MemoryStore::with_words(&["Thlai"]);
        let result = reconcile(&store, vec![entry("thlai")]).await.unwrap();
        assert_eq!(result.new_entries.len(), 1);
    }

    #[tokio::test]
    async fn read_failure_is_propagated() {
        let store = MemoryStore::with_words(&[]).failing_reads();
        assert!(reconcile(&store, vec![entry("kal")]).await.is_err());
    }

    #[tokio::test]
    async fn empty_input_skips_the_query() {
        let store = MemoryStore::default();
        let result = reconcile(&store, Vec::new()).await.unwrap();
        assert!(result.new_entries.is_empty());
        assert_eq!(store.read_count(), 0);
    }

    #[test]
    fn keeps_first_occurrence_within_a_file() {
        let first = NewEntry::trimmed("kal", "verb", "to go");
        let second = NewEntry::trimmed("kal", "noun", "a journey");
        let (kept, dropped) = dedupe_within_file(vec![first.clone(), entry("thlai"), second]);
        assert_eq!(kept, vec![first, entry("thlai")]);
        assert_eq!(dropped, 1);
    }
}
