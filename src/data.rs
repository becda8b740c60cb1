use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::backend::{
    self, Label, RecommendRequest, RecommendResponse, RelatedPost, RelatedRequest,
};
use crate::content::{self, PostContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyMode {
    Single,
    Batch,
}

pub trait ContentService: Send + Sync {
    fn post_content(&self, id: &str) -> Option<PostContent>;
}

pub trait ClassifyService: Send + Sync {
    fn classify(&self, text: &str, mode: ClassifyMode) -> Option<Label>;
}

#[derive(Debug, Clone)]
pub enum RecommendOutcome {
    /// 204: the user has not crossed the one-sidedness threshold.
    NoContent,
    /// Threshold crossed; counter-perspective links to display.
    Biased(RecommendResponse),
}

pub trait RecommendService: Send + Sync {
    fn recommend(&self, request: &RecommendRequest) -> Option<RecommendOutcome>;
}

pub trait RelatedService: Send + Sync {
    fn related(&self, request: &RelatedRequest) -> Option<Vec<RelatedPost>>;
}

pub struct RedditContentService {
    client: Arc<content::Client>,
}

impl RedditContentService {
    pub fn new(client: Arc<content::Client>) -> Self {
        Self { client }
    }
}

impl ContentService for RedditContentService {
    fn post_content(&self, id: &str) -> Option<PostContent> {
        match self.client.post_content(id) {
            Ok(content) => Some(content),
            Err(err) => {
                warn!(id, %err, "content fetch failed");
                None
            }
        }
    }
}

pub struct BackendClassifyService {
    client: Arc<backend::Client>,
}

impl BackendClassifyService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl ClassifyService for BackendClassifyService {
    fn classify(&self, text: &str, mode: ClassifyMode) -> Option<Label> {
        let result = match mode {
            ClassifyMode::Single => self.client.classify(text),
            ClassifyMode::Batch => self.client.classify_batched(text),
        };
        match result {
            Ok(label) => Some(label),
            Err(err) => {
                warn!(%err, "classify failed");
                None
            }
        }
    }
}

pub struct BackendRecommendService {
    client: Arc<backend::Client>,
}

impl BackendRecommendService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl RecommendService for BackendRecommendService {
    fn recommend(&self, request: &RecommendRequest) -> Option<RecommendOutcome> {
        match self.client.recommend(request) {
            Ok(Some(response)) => Some(RecommendOutcome::Biased(response)),
            Ok(None) => Some(RecommendOutcome::NoContent),
            Err(err) => {
                warn!(user_id = %request.user_id, %err, "recommend failed");
                None
            }
        }
    }
}

pub struct BackendRelatedService {
    client: Arc<backend::Client>,
}

impl BackendRelatedService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl RelatedService for BackendRelatedService {
    fn related(&self, request: &RelatedRequest) -> Option<Vec<RelatedPost>> {
        match self.client.related(request) {
            Ok(posts) => Some(posts),
            Err(err) => {
                warn!(%err, "related fetch failed");
                None
            }
        }
    }
}

/// Canned content keyed by identifier, with a call log so tests can
/// assert the at-most-once fetch property.
#[derive(Default)]
pub struct MockContentService {
    contents: Mutex<HashMap<String, PostContent>>,
    calls: Mutex<Vec<String>>,
}

impl MockContentService {
    pub fn with(entries: Vec<(&str, PostContent)>) -> Self {
        let mock = Self::default();
        {
            let mut contents = mock.contents.lock();
            for (id, content) in entries {
                contents.insert(id.to_string(), content);
            }
        }
        mock
    }

    pub fn insert(&self, id: &str, content: PostContent) {
        self.contents.lock().insert(id.to_string(), content);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == id).count()
    }
}

impl ContentService for MockContentService {
    fn post_content(&self, id: &str) -> Option<PostContent> {
        self.calls.lock().push(id.to_string());
        self.contents.lock().get(id).cloned()
    }
}

/// Fixed label for every text, or `None` to simulate a failing
/// classifier. Records the texts it saw.
pub struct MockClassifyService {
    label: Option<Label>,
    calls: Mutex<Vec<String>>,
}

impl MockClassifyService {
    pub fn returning(label: Option<Label>) -> Self {
        Self {
            label,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl ClassifyService for MockClassifyService {
    fn classify(&self, text: &str, _mode: ClassifyMode) -> Option<Label> {
        self.calls.lock().push(text.to_string());
        self.label
    }
}

#[derive(Default)]
pub struct MockRecommendService {
    response: Mutex<Option<RecommendResponse>>,
    calls: Mutex<usize>,
}

impl MockRecommendService {
    pub fn biased(response: RecommendResponse) -> Self {
        Self {
            response: Mutex::new(Some(response)),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

impl RecommendService for MockRecommendService {
    fn recommend(&self, _request: &RecommendRequest) -> Option<RecommendOutcome> {
        *self.calls.lock() += 1;
        match self.response.lock().clone() {
            Some(response) => Some(RecommendOutcome::Biased(response)),
            None => Some(RecommendOutcome::NoContent),
        }
    }
}

#[derive(Default)]
pub struct MockRelatedService {
    posts: Mutex<Vec<RelatedPost>>,
    calls: Mutex<usize>,
}

impl MockRelatedService {
    pub fn with(posts: Vec<RelatedPost>) -> Self {
        Self {
            posts: Mutex::new(posts),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

impl RelatedService for MockRelatedService {
    fn related(&self, _request: &RelatedRequest) -> Option<Vec<RelatedPost>> {
        *self.calls.lock() += 1;
        Some(self.posts.lock().clone())
    }
}
