//! Blog admin operations: listing, saving and deleting posts with optimistic
//! local updates.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use pressroom_api_types::{CategoryRow, PostRow, TagRow, resources};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::notify::{Notifier, Toast};
use crate::application::optimistic::{OptimisticList, Patch};
use crate::client::{DataClient, Filter, Order, QueryOptions, ServiceError};
use crate::domain::posts::{PostDraft, PostKey, PostStatus, PostView, PreparedPost, tag_links};
use crate::domain::scoring::{ContentScorer, HeuristicScorer};
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::posts";

/// Columns fetched for the admin list, with the category name and tags joined.
pub const POST_LIST_SELECT: &str = "*, category:categories(name), post_tags(tag:tags(id,name))";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostListFilter {
    pub status: Option<PostStatus>,
    pub category_id: Option<Uuid>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PostListFilter {
    pub fn to_query_options(&self) -> QueryOptions {
        let mut options = QueryOptions::new()
            .select(POST_LIST_SELECT)
            .order(Order::desc("created_at"));

        options = match self.status {
            Some(PostStatus::Published) => options.filter("is_published", Filter::eq(true)),
            Some(PostStatus::Draft) => options.filter("is_draft", Filter::eq(true)),
            Some(PostStatus::Scheduled) => options
                .filter("is_published", Filter::eq(false))
                .filter("is_draft", Filter::eq(false)),
            None => options,
        };
        if let Some(category_id) = self.category_id {
            options = options.filter("category_id", Filter::eq(category_id.to_string()));
        }
        if let Some(limit) = self.limit {
            options = options.limit(limit);
        }
        if let Some(offset) = self.offset {
            options = options.offset(offset);
        }
        options
    }
}

pub struct BlogAdmin {
    client: Arc<DataClient>,
    posts: OptimisticList<PostView>,
    notifier: Arc<dyn Notifier>,
    scorer: Arc<dyn ContentScorer>,
    filter: Mutex<PostListFilter>,
}

impl BlogAdmin {
    pub fn new(client: Arc<DataClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client,
            posts: OptimisticList::new(),
            notifier,
            scorer: Arc::new(HeuristicScorer),
            filter: Mutex::new(PostListFilter::default()),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ContentScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Current local list, including unconfirmed changes.
    pub fn posts(&self) -> Vec<PostView> {
        self.posts.snapshot()
    }

    pub fn post(&self, key: &PostKey) -> Option<PostView> {
        self.posts.get(key)
    }

    /// Load posts matching `filter` and make them the local list.
    pub async fn refresh_posts(
        &self,
        filter: PostListFilter,
    ) -> Result<Vec<PostView>, ServiceError> {
        let rows: Vec<PostRow> = self
            .client
            .query_as(resources::POSTS, filter.to_query_options())
            .await?;
        let views: Vec<PostView> = rows.into_iter().map(PostView::from).collect();

        self.posts.replace_all(views.clone());
        *mutex_lock(&self.filter, SOURCE, "blog_admin.refresh_posts") = filter;
        Ok(views)
    }

    pub async fn categories(&self) -> Result<Vec<CategoryRow>, ServiceError> {
        self.client
            .query_as(
                resources::CATEGORIES,
                QueryOptions::new().order(Order::asc("name")).batch(true),
            )
            .await
    }

    pub async fn tags(&self) -> Result<Vec<TagRow>, ServiceError> {
        self.client
            .query_as(
                resources::TAGS,
                QueryOptions::new().order(Order::asc("name")).batch(true),
            )
            .await
    }

    /// Create or update a post.
    ///
    /// The local list shows the change immediately; it is rolled back if the
    /// service rejects the post row. Returns whether the post was saved. Once
    /// the row is stored, a failure to rewrite its tag links is reported but
    /// the saved entry stays, so a later edit updates that row.
    pub async fn submit(&self, draft: PostDraft) -> bool {
        let prepared = match draft.prepare(self.scorer.as_ref(), OffsetDateTime::now_utc()) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.notifier.notify(Toast::error(err.to_string()));
                return false;
            }
        };

        let key = prepared.key;
        let mut optimistic = prepared.view.clone();
        if let Some(current) = self.posts.get(&key) {
            optimistic.carry_joined_names(&current);
        }
        let compensation = self.posts.apply(Patch::Upsert(optimistic.clone()));

        let saved = match self.save_row(&prepared).await {
            Ok(saved) => saved,
            Err(err) => {
                compensation.revert(&self.posts);
                warn!(target = SOURCE, local_key = %key, error = %err, "post save failed");
                self.notifier
                    .notify(Toast::error(format!("Failed to save post: {err}")));
                return false;
            }
        };

        let post_id = saved.id;
        let mut view = PostView::from(saved);
        view.tag_ids = prepared.tag_ids.clone();
        view.carry_joined_names(&optimistic);
        self.posts.reconcile(&key, view);

        let tags = self.rewrite_tags(post_id, &prepared.tag_ids).await;
        self.client.invalidate(Some(resources::POSTS));
        info!(
            target = SOURCE,
            local_key = %key,
            post_id = %post_id,
            score = prepared.score.total,
            "post saved"
        );
        self.refetch().await;

        match tags {
            Ok(()) => {
                let text = if key.is_temporary() {
                    "Post created"
                } else {
                    "Post updated"
                };
                self.notifier.notify(Toast::success(text));
            }
            Err(err) => {
                warn!(target = SOURCE, post_id = %post_id, error = %err, "tag links not updated");
                self.notifier.notify(Toast::error(format!(
                    "Post saved, but its tags could not be updated: {err}"
                )));
            }
        }
        true
    }

    /// Delete a post, restoring it locally at its original position on
    /// failure.
    pub async fn delete(&self, id: Uuid) -> bool {
        let key = PostKey::Persisted(id);
        let compensation = self.posts.apply(Patch::Remove(key));

        let filters = BTreeMap::from([("id".to_string(), Filter::eq(id.to_string()))]);
        match self.client.delete_where(resources::POSTS, filters).await {
            Ok(()) => {
                self.client.invalidate(Some(resources::POSTS));
                info!(target = SOURCE, post_key = %key, "post deleted");
                self.notifier.notify(Toast::success("Post deleted"));
                true
            }
            Err(err) => {
                compensation.revert(&self.posts);
                warn!(target = SOURCE, post_key = %key, error = %err, "post delete failed");
                self.notifier
                    .notify(Toast::error(format!("Failed to delete post: {err}")));
                false
            }
        }
    }

    async fn save_row(&self, prepared: &PreparedPost) -> Result<PostRow, ServiceError> {
        let rows = self
            .client
            .upsert(resources::POSTS, vec![prepared.payload.clone()])
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::decode("post upsert returned no rows"))?;
        serde_json::from_value(row)
            .map_err(|err| ServiceError::decode(format!("posts row: {err}")))
    }

    async fn rewrite_tags(&self, post_id: Uuid, tag_ids: &[Uuid]) -> Result<(), ServiceError> {
        let filters = BTreeMap::from([("post_id".to_string(), Filter::eq(post_id.to_string()))]);
        self.client
            .delete_where(resources::POST_TAGS, filters)
            .await?;

        let rows = tag_links(post_id, tag_ids)
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()
            .map_err(|err| ServiceError::decode(format!("post_tags row: {err}")))?;
        self.client
            .insert_many(resources::POST_TAGS, rows)
            .await?;
        Ok(())
    }

    async fn refetch(&self) {
        let filter = mutex_lock(&self.filter, SOURCE, "blog_admin.refetch").clone();
        if let Err(err) = self.refresh_posts(filter).await {
            warn!(target = SOURCE, error = %err, "post list refetch failed");
        }
    }
}
