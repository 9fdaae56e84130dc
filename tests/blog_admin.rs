use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pressroom::application::notify::{RecordingNotifier, ToastKind};
use pressroom::application::posts::{BlogAdmin, PostListFilter};
use pressroom::cache::CacheConfig;
use pressroom::client::{DataClient, DataService, Filter, RetryPolicy, SelectRequest, ServiceError};
use pressroom::domain::posts::{PostDraft, PostKey, PublishOption};
use serde_json::{Value, json};
use tokio::sync::Notify;
use uuid::Uuid;

/// In-memory posts table. Writes can be held open or made to fail. Reads
/// embed the category join the way the real service does.
#[derive(Default)]
struct FakeService {
    posts: Mutex<Vec<Value>>,
    tag_links: Mutex<Vec<Value>>,
    selects: AtomicUsize,
    fail_writes: AtomicBool,
    fail_tag_links: AtomicBool,
    hold_writes: AtomicBool,
    write_started: Notify,
    release_write: Notify,
}

impl FakeService {
    fn with_posts(posts: Vec<Value>) -> Self {
        Self {
            posts: Mutex::new(posts),
            ..Default::default()
        }
    }

    async fn gate(&self) -> Result<(), ServiceError> {
        if self.hold_writes.load(Ordering::SeqCst) {
            self.write_started.notify_one();
            self.release_write.notified().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ServiceError::status(409, Some("23505".into()), "duplicate slug"));
        }
        Ok(())
    }
}

#[async_trait]
impl DataService for FakeService {
    async fn select(&self, request: &SelectRequest) -> Result<Vec<Value>, ServiceError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        match request.resource.as_str() {
            "posts" => Ok(self
                .posts
                .lock()
                .unwrap()
                .iter()
                .cloned()
                .map(|mut row| {
                    row["category"] = json!({ "name": "Hiring" });
                    row
                })
                .collect()),
            "categories" => Ok(vec![json!({ "id": Uuid::nil(), "name": "News" })]),
            _ => Ok(Vec::new()),
        }
    }

    async fn upsert(&self, resource: &str, rows: Vec<Value>) -> Result<Vec<Value>, ServiceError> {
        self.gate().await?;
        assert_eq!(resource, "posts");
        let mut stored = Vec::new();
        let mut posts = self.posts.lock().unwrap();
        for mut row in rows {
            if row.get("id").is_none() {
                row["id"] = json!(Uuid::new_v4());
            }
            posts.retain(|existing| existing["id"] != row["id"]);
            posts.insert(0, row.clone());
            stored.push(row);
        }
        Ok(stored)
    }

    async fn insert(&self, resource: &str, rows: Vec<Value>) -> Result<Vec<Value>, ServiceError> {
        assert_eq!(resource, "post_tags");
        if self.fail_tag_links.load(Ordering::SeqCst) {
            return Err(ServiceError::status(409, Some("23503".into()), "unknown tag"));
        }
        self.tag_links.lock().unwrap().extend(rows.clone());
        Ok(rows)
    }

    async fn delete(
        &self,
        resource: &str,
        filters: &BTreeMap<String, Filter>,
    ) -> Result<(), ServiceError> {
        if resource == "post_tags" {
            return Ok(());
        }
        self.gate().await?;
        let Some(Filter::Eq(Value::String(id))) = filters.get("id") else {
            return Err(ServiceError::invalid_request("missing id filter"));
        };
        self.posts
            .lock()
            .unwrap()
            .retain(|row| row["id"].as_str() != Some(id.as_str()));
        Ok(())
    }
}

fn post(id: Uuid, title: &str) -> Value {
    json!({ "id": id, "title": title, "slug": title.to_lowercase(), "is_draft": true })
}

fn admin(service: Arc<FakeService>) -> (Arc<BlogAdmin>, Arc<RecordingNotifier>) {
    let client = DataClient::new(
        service,
        &CacheConfig::default(),
        RetryPolicy::new(1, Duration::from_millis(1)),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let admin = BlogAdmin::new(Arc::new(client), notifier.clone());
    (Arc::new(admin), notifier)
}

fn draft(title: &str) -> PostDraft {
    PostDraft {
        title: title.to_string(),
        content: "Outsourcing support lets small teams cover every time zone.".to_string(),
        tag_ids: vec![Uuid::new_v4()],
        publish_option: PublishOption::Publish,
        ..Default::default()
    }
}

#[tokio::test]
async fn new_post_is_visible_before_the_server_confirms() {
    let service = Arc::new(FakeService::default());
    service.hold_writes.store(true, Ordering::SeqCst);
    let (admin, notifier) = admin(service.clone());

    let task = tokio::spawn({
        let admin = Arc::clone(&admin);
        async move { admin.submit(draft("Hello World")).await }
    });

    service.write_started.notified().await;
    let pending = admin.posts();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].key.is_temporary());
    assert_eq!(pending[0].title, "Hello World");

    service.release_write.notify_one();
    assert!(task.await.unwrap());

    let saved = admin.posts();
    assert_eq!(saved.len(), 1);
    assert!(!saved[0].key.is_temporary());
    assert_eq!(saved[0].slug, "hello-world");
    assert_eq!(service.tag_links.lock().unwrap().len(), 1);
    assert_eq!(notifier.last().map(|t| t.kind), Some(ToastKind::Success));
}

#[tokio::test]
async fn saved_post_is_read_back_from_the_service() {
    let existing = Uuid::new_v4();
    let service = Arc::new(FakeService::with_posts(vec![post(existing, "Kept")]));
    let (admin, _) = admin(service.clone());
    admin.refresh_posts(PostListFilter::default()).await.unwrap();
    assert_eq!(service.selects.load(Ordering::SeqCst), 1);

    assert!(admin.submit(draft("Hello World")).await);

    assert_eq!(service.selects.load(Ordering::SeqCst), 2);
    let posts = admin.posts();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].title, "Hello World");
    assert_eq!(posts[0].category_name.as_deref(), Some("Hiring"));
    assert_eq!(posts[1].key, PostKey::Persisted(existing));
}

#[tokio::test]
async fn tag_link_failure_keeps_the_stored_post() {
    let service = Arc::new(FakeService::default());
    service.fail_tag_links.store(true, Ordering::SeqCst);
    let (admin, notifier) = admin(service.clone());
    admin.refresh_posts(PostListFilter::default()).await.unwrap();

    assert!(admin.submit(draft("Hello World")).await);

    let stored = service.posts.lock().unwrap().clone();
    assert_eq!(stored.len(), 1);
    let id: Uuid = serde_json::from_value(stored[0]["id"].clone()).unwrap();
    let posts = admin.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].key, PostKey::Persisted(id));
    let toast = notifier.last().unwrap();
    assert_eq!(toast.kind, ToastKind::Error);
    assert!(toast.text.contains("tags could not be updated"));

    let reloaded = admin.refresh_posts(PostListFilter::default()).await.unwrap();
    assert_eq!(reloaded.len(), 1);

    let mut retry = draft("Hello World");
    retry.id = Some(id);
    assert!(admin.submit(retry).await);
    assert_eq!(service.posts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn edit_keeps_joined_names_while_pending() {
    let id = Uuid::new_v4();
    let service = Arc::new(FakeService::with_posts(vec![post(id, "Original")]));
    service.hold_writes.store(true, Ordering::SeqCst);
    let (admin, _) = admin(service.clone());
    admin.refresh_posts(PostListFilter::default()).await.unwrap();

    let mut edit = draft("Renamed");
    edit.id = Some(id);
    edit.tag_ids.clear();
    let task = tokio::spawn({
        let admin = Arc::clone(&admin);
        async move { admin.submit(edit).await }
    });

    service.write_started.notified().await;
    let pending = admin.post(&PostKey::Persisted(id)).unwrap();
    assert_eq!(pending.title, "Renamed");
    assert_eq!(pending.category_name.as_deref(), Some("Hiring"));

    service.release_write.notify_one();
    assert!(task.await.unwrap());
}

#[tokio::test]
async fn rejected_post_is_rolled_back_with_error_toast() {
    let existing = Uuid::new_v4();
    let service = Arc::new(FakeService::with_posts(vec![post(existing, "Kept")]));
    service.fail_writes.store(true, Ordering::SeqCst);
    let (admin, notifier) = admin(service.clone());
    admin.refresh_posts(PostListFilter::default()).await.unwrap();

    assert!(!admin.submit(draft("Duplicate")).await);

    let posts = admin.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].key, PostKey::Persisted(existing));
    let toast = notifier.last().unwrap();
    assert_eq!(toast.kind, ToastKind::Error);
    assert!(toast.text.contains("duplicate slug"));
}

#[tokio::test]
async fn failed_edit_restores_previous_values() {
    let id = Uuid::new_v4();
    let service = Arc::new(FakeService::with_posts(vec![post(id, "Original")]));
    service.fail_writes.store(true, Ordering::SeqCst);
    let (admin, _) = admin(service);
    admin.refresh_posts(PostListFilter::default()).await.unwrap();

    let mut edit = draft("Renamed");
    edit.id = Some(id);
    assert!(!admin.submit(edit).await);

    assert_eq!(admin.post(&PostKey::Persisted(id)).unwrap().title, "Original");
}

#[tokio::test]
async fn failed_delete_restores_post_at_original_position() {
    let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    let service = Arc::new(FakeService::with_posts(
        ids.iter().map(|id| post(*id, "Post")).collect(),
    ));
    service.fail_writes.store(true, Ordering::SeqCst);
    let (admin, notifier) = admin(service);
    admin.refresh_posts(PostListFilter::default()).await.unwrap();

    assert!(!admin.delete(ids[1]).await);

    let keys: Vec<PostKey> = admin.posts().iter().map(|p| p.key).collect();
    assert_eq!(
        keys,
        ids.iter().map(|id| PostKey::Persisted(*id)).collect::<Vec<_>>()
    );
    assert_eq!(notifier.last().map(|t| t.kind), Some(ToastKind::Error));
}

#[tokio::test]
async fn successful_delete_removes_post_and_invalidates_cache() {
    let id = Uuid::new_v4();
    let service = Arc::new(FakeService::with_posts(vec![post(id, "Gone")]));
    let (admin, _) = admin(service.clone());
    admin.refresh_posts(PostListFilter::default()).await.unwrap();

    assert!(admin.delete(id).await);
    assert!(admin.posts().is_empty());

    let reloaded = admin.refresh_posts(PostListFilter::default()).await.unwrap();
    assert!(reloaded.is_empty());
    assert_eq!(service.selects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalid_draft_never_reaches_the_service() {
    let service = Arc::new(FakeService::default());
    let (admin, notifier) = admin(service.clone());

    let mut scheduled = draft("Later");
    scheduled.publish_option = PublishOption::Schedule;
    assert!(!admin.submit(scheduled).await);

    assert!(admin.posts().is_empty());
    assert!(service.posts.lock().unwrap().is_empty());
    let toast = notifier.last().unwrap();
    assert_eq!(toast.kind, ToastKind::Error);
    assert!(toast.text.contains("publish date"));
}

#[tokio::test]
async fn concurrent_category_loads_share_one_request() {
    let service = Arc::new(FakeService::default());
    let (admin, _) = admin(service.clone());

    let (a, b) = tokio::join!(admin.categories(), admin.categories());

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(service.selects.load(Ordering::SeqCst), 1);
}
