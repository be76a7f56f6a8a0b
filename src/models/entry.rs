use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 词性：固定的 8 个分类，存库时使用小写字符串
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
    Pronoun,
    Preposition,
    Conjunction,
    Interjection,
}

impl PartOfSpeech {
    pub const ALL: [PartOfSpeech; 8] = [
        PartOfSpeech::Noun,
        PartOfSpeech::Verb,
        PartOfSpeech::Adjective,
        PartOfSpeech::Adverb,
        PartOfSpeech::Pronoun,
        PartOfSpeech::Preposition,
        PartOfSpeech::Conjunction,
        PartOfSpeech::Interjection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartOfSpeech::Noun => "noun",
            PartOfSpeech::Verb => "verb",
            PartOfSpeech::Adjective => "adjective",
            PartOfSpeech::Adverb => "adverb",
            PartOfSpeech::Pronoun => "pronoun",
            PartOfSpeech::Preposition => "preposition",
            PartOfSpeech::Conjunction => "conjunction",
            PartOfSpeech::Interjection => "interjection",
        }
    }
}

impl fmt::Display for PartOfSpeech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPartOfSpeech;

// 精确匹配，大小写敏感 ("Noun" 不是合法值)
impl FromStr for PartOfSpeech {
    type Err = UnknownPartOfSpeech;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PartOfSpeech::ALL
            .iter()
            .copied()
            .find(|pos| pos.as_str() == s)
            .ok_or(UnknownPartOfSpeech)
    }
}

/// 已入库的词条 (dictionary_entries 表)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DictionaryEntry {
    pub id: Uuid,
    pub word: String,
    pub part_of_speech: String,
    pub definition: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 词条详情，附带贡献者的显示名 (资料缺失时为空)
#[derive(Debug, Serialize, FromRow)]
pub struct EntryDetail {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub entry: DictionaryEntry,
    pub contributor: Option<String>,
}

/// 待写入的词条内容：单条提交、编辑和批量导入共用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewEntry {
    pub word: String,
    pub part_of_speech: String,
    pub definition: String,
}

impl NewEntry {
    /// 三个字段统一去掉首尾空白
    pub fn trimmed(word: &str, part_of_speech: &str, definition: &str) -> Self {
        NewEntry {
            word: word.trim().to_string(),
            part_of_speech: part_of_speech.trim().to_string(),
            definition: definition.trim().to_string(),
        }
    }
}

/// 列表查询参数: /api/entries?q=&part_of_speech=&mine=&page=&per_page=
#[derive(Debug, Default, Deserialize)]
pub struct EntryListQuery {
    pub q: Option<String>,
    pub part_of_speech: Option<String>,
    #[serde(default)]
    pub mine: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EntryPage {
    pub entries: Vec<DictionaryEntry>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct DictionaryStats {
    pub total_entries: i64,
    pub contributors: i64,
}
