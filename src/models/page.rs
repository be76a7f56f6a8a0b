use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// 站内内容页，正文为 markdown，渲染交给前端
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Page {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PageSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PageUpdate {
    pub title: Option<String>,
    pub content: String,
}

/// slug 只允许小写字母、数字和连字符
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// 内置页面的初始内容；管理员第一次访问时落库
pub fn default_page(slug: &str) -> Option<(&'static str, &'static str)> {
    match slug {
        "about" => Some((
            "About Hmar Dictionary",
            "# About Hmar Dictionary\n\nWelcome to the Hmar Open Dictionary project, a community-driven effort to document and preserve the Hmar language.",
        )),
        "faq" => Some((
            "Frequently Asked Questions",
            "# Frequently Asked Questions\n\n## How can I contribute to the dictionary?\n\nCreate an account and add the words you know.",
        )),
        "tutorials" => Some((
            "Dictionary Tutorials",
            "# Dictionary Tutorials\n\n## Bulk Import\n\nUpload a CSV file with `word`, `part_of_speech` and `definition` columns to add many words at once.",
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_lowercase_words_joined_by_hyphens() {
        assert!(is_valid_slug("about"));
        assert!(is_valid_slug("style-guide-2"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("About"));
        assert!(!is_valid_slug("-faq"));
        assert!(!is_valid_slug("../etc"));
    }

    #[test]
    fn built_in_pages_have_defaults() {
        for slug in ["about", "faq", "tutorials"] {
            let (title, content) = default_page(slug).expect(slug);
            assert!(!title.is_empty());
            assert!(content.starts_with("# "));
        }
        assert!(default_page("contact").is_none());
    }
}
