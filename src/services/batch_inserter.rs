use uuid::Uuid;

use crate::models::entry::NewEntry;
use crate::models::import::ChunkFailure;
use crate::services::entry_store::EntryStore;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InsertReport {
    pub inserted: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

/// 按 chunk_size 分块顺序写入。失败的块记录下来、不重试，后面的块照常写
pub async fn insert_in_chunks<S>(
    store: &S,
    entries: &[NewEntry],
    created_by: Uuid,
    chunk_size: usize,
) -> InsertReport
where
    S: EntryStore + Sync,
{
    let mut report = InsertReport::default();

    for (chunk_index, chunk) in entries.chunks(chunk_size.max(1)).enumerate() {
        match store.insert_many(chunk, created_by).await {
            Ok(_) => {
                report.inserted += chunk.len();
            }
            Err(e) => {
                tracing::warn!(
                    "--- 分块写入失败: chunk={}, size={}, Error: {}",
                    chunk_index, chunk.len(), e
                );
                report.failed_chunks.push(ChunkFailure {
                    chunk_index,
                    size: chunk.len(),
                    message: e.user_message().to_string(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::entry_store::testing::MemoryStore;

    fn entries(n: usize) -> Vec<NewEntry> {
        (0..n)
            .map(|i| NewEntry::trimmed(&format!("word{i}"), "noun", "definition"))
            .collect()
    }

    #[tokio::test]
    async fn submits_fixed_size_chunks_in_order() {
        let store = MemoryStore::default();
        let report = insert_in_chunks(&store, &entries(120), Uuid::new_v4(), 50).await;

        assert_eq!(store.chunk_sizes(), vec![50, 50, 20]);
        assert_eq!(report.inserted, 120);
        assert!(report.failed_chunks.is_empty());
    }

    #[tokio::test]
    async fn failed_chunk_does_not_stop_the_rest() {
        let store = MemoryStore::default().failing_insert(1);
        let report = insert_in_chunks(&store, &entries(120), Uuid::new_v4(), 50).await;

        assert_eq!(store.chunk_sizes(), vec![50, 50, 20]);
        assert_eq!(report.inserted, 70);
        assert_eq!(report.failed_chunks.len(), 1);
        assert_eq!(report.failed_chunks[0].chunk_index, 1);
        assert_eq!(report.failed_chunks[0].size, 50);
        assert_eq!(report.failed_chunks[0].message, "The dictionary is temporarily unavailable.");
        assert!(!store.contains("word50"));
        assert!(store.contains("word100"));
    }

    #[tokio::test]
    async fn attributes_rows_to_the_owner() {
        let store = MemoryStore::default();
        let owner = Uuid::new_v4();
        insert_in_chunks(&store, &entries(3), owner, 50).await;

        let words = store.words.lock().unwrap();
        assert!(words.values().all(|id| *id == owner));
    }

    #[tokio::test]
    async fn nothing_to_insert_makes_no_calls() {
        let store = MemoryStore::default();
        let report = insert_in_chunks(&store, &[], Uuid::new_v4(), 50).await;
        assert_eq!(report.inserted, 0);
        assert!(store.chunk_sizes().is_empty());
    }
}
