use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use shared::error::ErrorCode;
use tokio::sync::{oneshot, Mutex};

use crate::{error::TransportError, transport::ApiTransport};

pub(crate) const SETTINGS_ID: &str = "cfg1";
pub(crate) const ADMIN_KEY: &str = "admin-key";

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub credential: String,
    pub body: Option<Value>,
}

type Reply = Result<Value, TransportError>;

enum Scripted {
    Ready(Reply),
    Gated(oneshot::Receiver<Reply>),
}

/// Replays queued replies in order and records every request it sees.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push_ok(&self, value: Value) {
        self.replies
            .lock()
            .await
            .push_back(Scripted::Ready(Ok(value)));
    }

    pub async fn push_status(&self, status: u16, detail: &str) {
        self.replies
            .lock()
            .await
            .push_back(Scripted::Ready(Err(status_error(status, detail))));
    }

    /// Queues a reply that only resolves once the returned sender fires.
    pub async fn push_gated(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().await.push_back(Scripted::Gated(rx));
        tx
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|request| request.path.clone())
            .collect()
    }

    pub async fn wait_for_requests(&self, count: usize) {
        for _ in 0..10_000 {
            if self.requests.lock().await.len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("timed out waiting for {count} requests");
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        credential: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        self.requests.lock().await.push(RecordedRequest {
            method,
            path: path.to_string(),
            credential: credential.to_string(),
            body,
        });
        let next = self.replies.lock().await.pop_front();
        match next {
            Some(Scripted::Ready(reply)) => reply,
            Some(Scripted::Gated(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(status_error(503, "gate dropped"))),
            None => Err(status_error(500, "no scripted reply")),
        }
    }
}

pub(crate) fn status_error(status: u16, detail: &str) -> TransportError {
    TransportError::Status {
        status,
        code: ErrorCode::from_status(status),
        detail: detail.to_string(),
    }
}

/// A keyset page whose items are ordered newest first.
pub(crate) fn page_json(ids: &[&str], next_cursor: Option<i64>, avg_rating: i64, count: u64) -> Value {
    let items: Vec<Value> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            json!({
                "id": id,
                "settings_id": SETTINGS_ID,
                "name": format!("reviewer {id}"),
                "tag": "coffee",
                "rating": 800,
                "comment": "ok",
                "paid": true,
                "payment_hash": "free",
                "created_at": 1_700_000_000 - index as i64,
            })
        })
        .collect();
    json!({
        "items": items,
        "next_cursor": next_cursor,
        "avg_rating": avg_rating,
        "review_count": count,
    })
}

pub(crate) fn settings_json(tags: &[&str]) -> Value {
    json!({
        "id": SETTINGS_ID,
        "user_id": "u1",
        "wallet": "w1",
        "cost": 0,
        "comment_word_limit": 50,
        "tags": tags,
    })
}

#[derive(Debug, Clone)]
struct StoredReview {
    id: String,
    rating: i64,
    created_at: i64,
}

/// Serves keyset pages from an in-memory collection the way the reviews API does:
/// newest first, `before` exclusive, and a next cursor whenever a page is full.
pub(crate) struct CollectionTransport {
    reviews: Mutex<Vec<StoredReview>>,
    requests: Mutex<Vec<RecordedRequest>>,
    fail_deletes: bool,
}

impl CollectionTransport {
    pub fn with_reviews(count: usize) -> Arc<Self> {
        Arc::new(Self::build(count, false))
    }

    pub fn with_failing_deletes(count: usize) -> Arc<Self> {
        Arc::new(Self::build(count, true))
    }

    fn build(count: usize, fail_deletes: bool) -> Self {
        let reviews = (0..count)
            .map(|index| StoredReview {
                id: format!("r{index}"),
                rating: if index % 2 == 0 { 1000 } else { 500 },
                created_at: 1_700_000_000 - index as i64,
            })
            .collect();
        Self {
            reviews: Mutex::new(reviews),
            requests: Mutex::new(Vec::new()),
            fail_deletes,
        }
    }

    pub async fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|request| request.path.clone())
            .collect()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn page(&self, limit: usize, before: Option<i64>) -> Value {
        let reviews = self.reviews.lock().await;
        let items: Vec<&StoredReview> = reviews
            .iter()
            .filter(|review| before.map_or(true, |before| review.created_at < before))
            .take(limit)
            .collect();
        let next_cursor = if items.len() == limit {
            items.last().map(|review| review.created_at)
        } else {
            None
        };
        let avg_rating = if reviews.is_empty() {
            0
        } else {
            let total: i64 = reviews.iter().map(|review| review.rating).sum();
            (total as f64 / reviews.len() as f64).round() as i64
        };
        let items: Vec<Value> = items
            .iter()
            .map(|review| {
                json!({
                    "id": review.id,
                    "settings_id": SETTINGS_ID,
                    "rating": review.rating,
                    "created_at": review.created_at,
                })
            })
            .collect();
        json!({
            "items": items,
            "next_cursor": next_cursor,
            "avg_rating": avg_rating,
            "review_count": reviews.len(),
        })
    }
}

#[async_trait]
impl ApiTransport for CollectionTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        credential: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        self.requests.lock().await.push(RecordedRequest {
            method: method.clone(),
            path: path.to_string(),
            credential: credential.to_string(),
            body,
        });

        let url = url::Url::parse(&format!("http://collection.test{path}"))
            .map_err(|err| status_error(400, &err.to_string()))?;
        let segments: Vec<String> = url
            .path_segments()
            .map(|segments| segments.map(str::to_string).collect())
            .unwrap_or_default();

        if method == Method::DELETE {
            if self.fail_deletes {
                return Err(status_error(403, "Not your extension."));
            }
            let id = segments.last().cloned().unwrap_or_default();
            let mut reviews = self.reviews.lock().await;
            let before = reviews.len();
            reviews.retain(|review| review.id != id);
            if reviews.len() == before {
                return Err(status_error(404, "Review does not exist."));
            }
            return Ok(Value::Null);
        }

        let mut limit = 10;
        let mut before = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "limit" => limit = value.parse().unwrap_or(10),
                "before" => before = value.parse().ok(),
                _ => {}
            }
        }
        Ok(self.page(limit, before).await)
    }
}
