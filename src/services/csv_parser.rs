use thiserror::Error;

use crate::models::entry::NewEntry;

pub const REQUIRED_COLUMNS: [&str; 3] = ["word", "part_of_speech", "definition"];

/// 表头缺少必需列，整个文件不做任何解析
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("CSV file must include word, part_of_speech, and definition columns (missing: {})", .missing.join(", "))]
pub struct SchemaError {
    pub missing: Vec<&'static str>,
}

/// 三个必需列在表头中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub word: usize,
    pub part_of_speech: usize,
    pub definition: usize,
}

impl ColumnMap {
    /// 表头大小写不敏感、去空白后精确匹配；同名列取第一个
    pub fn from_header(header: &str, delimiter: char) -> Result<Self, SchemaError> {
        let headers: Vec<String> = header
            .split(delimiter)
            .map(|h| h.trim().to_lowercase())
            .collect();
        let position = |name: &str| headers.iter().position(|h| h == name);

        let missing: Vec<&'static str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| position(name).is_none())
            .collect();

        match (position("word"), position("part_of_speech"), position("definition")) {
            (Some(word), Some(part_of_speech), Some(definition)) => Ok(ColumnMap {
                word,
                part_of_speech,
                definition,
            }),
            _ => Err(SchemaError { missing }),
        }
    }

    fn slice(&self, fields: &[&str]) -> NewEntry {
        let field = |idx: usize| fields.get(idx).copied().unwrap_or("");
        NewEntry::trimmed(field(self.word), field(self.part_of_speech), field(self.definition))
    }
}

/// 解析上传文件：第一行是表头，其余每个非空行产出一条记录。
///
/// 按单个分隔符切分，不处理引号；字段里出现分隔符会导致列错位。
pub fn parse_rows(text: &str, delimiter: char) -> Result<Vec<NewEntry>, SchemaError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split('\n');

    let header = lines.next().unwrap_or("");
    let columns = ColumnMap::from_header(header, delimiter)?;

    let rows = lines
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split(delimiter).collect();
            columns.slice(&fields)
        })
        .collect();

    Ok(rows)
}
