use crate::models::entry::{NewEntry, PartOfSpeech};
use crate::models::import::{CandidateEntry, RowError};

/// 按固定顺序校验，第一个失败的规则胜出，后面的规则不再检查
pub fn check(entry: &NewEntry) -> Result<(), RowError> {
    if entry.word.is_empty() {
        return Err(RowError::WordRequired);
    }
    if entry.part_of_speech.is_empty() {
        return Err(RowError::PartOfSpeechRequired);
    }
    if entry.part_of_speech.parse::<PartOfSpeech>().is_err() {
        return Err(RowError::InvalidPartOfSpeech);
    }
    if entry.definition.is_empty() {
        return Err(RowError::DefinitionRequired);
    }
    Ok(())
}

pub fn validate(entry: NewEntry) -> CandidateEntry {
    let error = check(&entry).err();
    CandidateEntry { entry, error }
}
