use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::entry::NewEntry;

/// 单行校验失败的原因，按优先级排列，只记录第一个命中的规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("Word is required")]
    WordRequired,
    #[error("Part of speech is required")]
    PartOfSpeechRequired,
    #[error("Invalid part of speech")]
    InvalidPartOfSpeech,
    #[error("Definition is required")]
    DefinitionRequired,
}

/// 上传文件中解析出的一行候选词条，校验后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    pub entry: NewEntry,
    pub error: Option<RowError>,
}

impl CandidateEntry {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn report(&self) -> RowReport {
        RowReport {
            word: self.entry.word.clone(),
            part_of_speech: self.entry.part_of_speech.clone(),
            status: match self.error {
                None => "valid".to_string(),
                Some(err) => err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowReport {
    pub word: String,
    pub part_of_speech: String,
    pub status: String,
}

/// parse() 之后返回给前端的预览
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub valid_count: usize,
    pub invalid_count: usize,
    pub rows: Vec<RowReport>,
}

impl ValidationSummary {
    pub fn from_candidates(candidates: &[CandidateEntry]) -> Self {
        let valid_count = candidates.iter().filter(|c| c.is_valid()).count();
        ValidationSummary {
            valid_count,
            invalid_count: candidates.len() - valid_count,
            rows: candidates.iter().map(CandidateEntry::report).collect(),
        }
    }
}

/// 某个分块写入失败的记录 (不重试，不计入成功数)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub size: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub inserted_count: usize,
    pub attempted_count: usize,
    pub skipped_existing: usize,
    pub skipped_in_file: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

#[derive(Debug, Serialize)]
pub struct ImportCreated {
    pub session_id: Uuid,
    pub summary: ValidationSummary,
}
