//! Row and response types exchanged with the hosted data service and the
//! upload endpoint.
//!
//! The hosted backend owns the schema; these types only describe the columns
//! the site reads and writes. Unknown columns are ignored on read.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Table names used by the blog admin.
pub mod resources {
    pub const POSTS: &str = "posts";
    pub const CATEGORIES: &str = "categories";
    pub const TAGS: &str = "tags";
    pub const POST_TAGS: &str = "post_tags";
}

/// A blog post as returned by the data service, optionally with joined
/// category and tag rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRow {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub focus_keyword: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub publish_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub content_score: Option<u32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_tags: Vec<PostTagJoin>,
}

/// Embedded category projection (`category:categories(name)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub name: String,
}

/// Embedded join row (`post_tags(tag:tags(id,name))`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTagJoin {
    pub tag: Option<TagRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRow {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTagRow {
    pub post_id: Uuid,
    pub tag_id: Uuid,
}

/// Response body of the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_row_reads_embedded_joins() {
        let raw = serde_json::json!({
            "id": "6f1c1f5e-3a7c-4b53-9c1f-3c2e3e0b1a10",
            "title": "Scaling support teams",
            "slug": "scaling-support-teams",
            "content": "Body",
            "is_published": true,
            "publish_date": "2026-01-05T10:00:00Z",
            "category": { "name": "Operations" },
            "post_tags": [
                { "tag": { "id": "0c2b8f0e-5d9f-4b0a-8a55-0f4c4a5a2f11", "name": "outsourcing" } },
                { "tag": null }
            ],
            "unknown_column": 42
        });

        let row: PostRow = serde_json::from_value(raw).expect("post row");
        assert_eq!(row.category.as_ref().map(|c| c.name.as_str()), Some("Operations"));
        assert_eq!(row.post_tags.len(), 2);
        assert!(row.publish_date.is_some());
        assert!(row.excerpt.is_none());
    }

    #[test]
    fn upload_response_tolerates_missing_optional_fields() {
        let row: UploadResponse =
            serde_json::from_str(r#"{"url":"https://cdn.example.com/blog/a.jpg"}"#)
                .expect("upload response");
        assert_eq!(row.url, "https://cdn.example.com/blog/a.jpg");
        assert!(row.width.is_none());
    }
}
