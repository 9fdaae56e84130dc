//! Blog post records as the admin edits them: keys, publication state,
//! image precedence and the payload sent to the data service.

use std::fmt;

use pressroom_api_types::{PostRow, PostTagRow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;
use super::scoring::{ContentScore, ContentScorer, ScoreInput};
use super::slug::derive_slug;

/// Identity of a post in the local list. Optimistic copies carry a temporary
/// key until the server assigns an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostKey {
    Temporary(Uuid),
    Persisted(Uuid),
}

impl PostKey {
    pub fn temporary() -> Self {
        Self::Temporary(Uuid::new_v4())
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Server id, if one has been assigned.
    pub fn persisted_id(&self) -> Option<Uuid> {
        match self {
            Self::Persisted(id) => Some(*id),
            Self::Temporary(_) => None,
        }
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temporary(id) => write!(f, "temp-{id}"),
            Self::Persisted(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishOption {
    #[default]
    Draft,
    Publish,
    Schedule,
}

impl PublishOption {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "publish" => Some(Self::Publish),
            "schedule" => Some(Self::Schedule),
            _ => None,
        }
    }

    /// Map the editor's choice onto the stored flags.
    ///
    /// `Publish` keeps a supplied date and otherwise stamps `now`; `Schedule`
    /// needs a date; `Draft` always clears it.
    pub fn resolve(
        self,
        date: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<PublicationState, DomainError> {
        match self {
            Self::Draft => Ok(PublicationState {
                is_published: false,
                is_draft: true,
                publish_date: None,
            }),
            Self::Publish => Ok(PublicationState {
                is_published: true,
                is_draft: false,
                publish_date: Some(date.unwrap_or(now)),
            }),
            Self::Schedule => {
                let date = date.ok_or_else(|| {
                    DomainError::validation("a scheduled post needs a publish date")
                })?;
                Ok(PublicationState {
                    is_published: false,
                    is_draft: false,
                    publish_date: Some(date),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicationState {
    pub is_published: bool,
    pub is_draft: bool,
    pub publish_date: Option<OffsetDateTime>,
}

/// Status filter for post listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Published,
    Draft,
    Scheduled,
}

impl PostStatus {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "published" => Some(Self::Published),
            "draft" => Some(Self::Draft),
            "scheduled" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

/// Candidate cover images, highest precedence first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSources {
    pub uploaded: Option<String>,
    pub library: Option<String>,
    pub existing: Option<String>,
}

impl ImageSources {
    /// Freshly uploaded, then library pick, then the stored value. Empty when
    /// none is set.
    pub fn resolve(&self) -> String {
        [&self.uploaded, &self.library, &self.existing]
            .into_iter()
            .flatten()
            .map(|url| url.trim())
            .find(|url| !url.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

/// Editor input for creating or updating a post.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    /// `None` for a new post.
    pub id: Option<Uuid>,
    pub title: String,
    pub slug: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    pub meta_description: Option<String>,
    pub focus_keyword: Option<String>,
    pub category_id: Option<Uuid>,
    pub tag_ids: Vec<Uuid>,
    pub publish_option: PublishOption,
    pub publish_date: Option<OffsetDateTime>,
    pub images: ImageSources,
}

/// A validated draft ready to be applied locally and sent to the service.
#[derive(Debug, Clone)]
pub struct PreparedPost {
    pub key: PostKey,
    pub payload: Value,
    pub view: PostView,
    pub tag_ids: Vec<Uuid>,
    pub score: ContentScore,
}

#[derive(Serialize)]
struct PostPayload<'a> {
    id: Option<Uuid>,
    title: &'a str,
    slug: &'a str,
    content: &'a str,
    excerpt: Option<&'a str>,
    meta_description: Option<&'a str>,
    focus_keyword: Option<&'a str>,
    category_id: Option<Uuid>,
    image_url: &'a str,
    is_published: bool,
    is_draft: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    publish_date: Option<OffsetDateTime>,
    content_score: u32,
}

impl PostDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("title must not be empty"));
        }
        if self.content.trim().is_empty() {
            return Err(DomainError::validation("content must not be empty"));
        }
        Ok(())
    }

    pub fn prepare(
        &self,
        scorer: &dyn ContentScorer,
        now: OffsetDateTime,
    ) -> Result<PreparedPost, DomainError> {
        self.validate()?;
        let publication = self.publish_option.resolve(self.publish_date, now)?;

        let slug = match non_empty(self.slug.as_deref()) {
            Some(slug) => slug.to_string(),
            None => derive_slug(&self.title)
                .map_err(|err| DomainError::validation(err.to_string()))?,
        };
        let image_url = self.images.resolve();
        let excerpt = non_empty(self.excerpt.as_deref());
        let meta_description = non_empty(self.meta_description.as_deref());
        let focus_keyword = non_empty(self.focus_keyword.as_deref());

        let score = scorer.score(&ScoreInput {
            title: &self.title,
            content: &self.content,
            excerpt,
            meta_description,
            focus_keyword,
            has_image: !image_url.is_empty(),
            has_category: self.category_id.is_some(),
            tag_count: self.tag_ids.len(),
        });

        let payload = serde_json::to_value(PostPayload {
            id: self.id,
            title: self.title.trim(),
            slug: &slug,
            content: &self.content,
            excerpt,
            meta_description,
            focus_keyword,
            category_id: self.category_id,
            image_url: &image_url,
            is_published: publication.is_published,
            is_draft: publication.is_draft,
            publish_date: publication.publish_date,
            content_score: score.total,
        })
        .map_err(|err| DomainError::invariant(format!("post payload: {err}")))?;

        let key = self.id.map_or_else(PostKey::temporary, PostKey::Persisted);
        let view = PostView {
            key,
            title: self.title.trim().to_string(),
            slug,
            excerpt: excerpt.map(str::to_string),
            category_id: self.category_id,
            category_name: None,
            tag_ids: self.tag_ids.clone(),
            tag_names: Vec::new(),
            image_url: (!image_url.is_empty()).then_some(image_url),
            is_published: publication.is_published,
            is_draft: publication.is_draft,
            publish_date: publication.publish_date,
            content_score: Some(score.total),
            updated_at: Some(now),
        };

        Ok(PreparedPost {
            key,
            payload: strip_nulls(payload),
            view,
            tag_ids: self.tag_ids.clone(),
            score,
        })
    }
}

/// Denormalized post as shown in the admin list. Not authoritative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostView {
    #[serde(serialize_with = "serialize_key")]
    pub key: PostKey,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub tag_ids: Vec<Uuid>,
    pub tag_names: Vec<String>,
    pub image_url: Option<String>,
    pub is_published: bool,
    pub is_draft: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub publish_date: Option<OffsetDateTime>,
    pub content_score: Option<u32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

fn serialize_key<S: serde::Serializer>(key: &PostKey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(key)
}

impl PostView {
    pub fn status(&self) -> PostStatus {
        if self.is_published {
            PostStatus::Published
        } else if !self.is_draft && self.publish_date.is_some() {
            PostStatus::Scheduled
        } else {
            PostStatus::Draft
        }
    }

    /// Keep the joined category and tag names of `previous` where the ids
    /// they belong to are unchanged.
    pub fn carry_joined_names(&mut self, previous: &PostView) {
        if self.category_name.is_none() && self.category_id == previous.category_id {
            self.category_name = previous.category_name.clone();
        }
        if self.tag_names.is_empty() && self.tag_ids == previous.tag_ids {
            self.tag_names = previous.tag_names.clone();
        }
    }
}

impl From<PostRow> for PostView {
    fn from(row: PostRow) -> Self {
        let (tag_ids, tag_names) = row
            .post_tags
            .into_iter()
            .filter_map(|join| join.tag)
            .map(|tag| (tag.id, tag.name))
            .unzip();

        Self {
            key: PostKey::Persisted(row.id),
            title: row.title,
            slug: row.slug,
            excerpt: row.excerpt,
            category_id: row.category_id,
            category_name: row.category.map(|category| category.name),
            tag_ids,
            tag_names,
            image_url: row.image_url.filter(|url| !url.is_empty()),
            is_published: row.is_published,
            is_draft: row.is_draft,
            publish_date: row.publish_date,
            content_score: row.content_score,
            updated_at: row.updated_at.or(row.created_at),
        }
    }
}

/// Join rows linking `post_id` to each tag, duplicates removed.
pub fn tag_links(post_id: Uuid, tag_ids: &[Uuid]) -> Vec<PostTagRow> {
    let mut links: Vec<PostTagRow> = Vec::with_capacity(tag_ids.len());
    for &tag_id in tag_ids {
        if !links.iter().any(|link| link.tag_id == tag_id) {
            links.push(PostTagRow { post_id, tag_id });
        }
    }
    links
}

/// Drop top-level `null` fields so the service keeps its own defaults.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.retain(|_, field| !field.is_null());
            Value::Object(map)
        }
        other => other,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
