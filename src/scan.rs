//! The scan state machine. Each trigger (initial load, mutation, toggle,
//! navigation settle, periodic poll) runs one pass: detect the page
//! mode, walk candidate posts, and drive locate, fetch, classify,
//! annotate per post. The `Session` is the single owner of page-scoped
//! mutable state with explicit reset semantics.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};
use url::Url;

use crate::annotate;
use crate::backend::{Label, RelatedPost};
use crate::content::PostContent;
use crate::data::{ClassifyMode, ClassifyService, ContentService};
use crate::locator::{self, Located};
use crate::page::Page;

pub const DEFAULT_FEED_CAP: usize = 15;
pub const DEFAULT_MIN_CONTENT_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    OpenedPost,
    Feed,
}

impl PageMode {
    pub fn detect(url: &Url) -> PageMode {
        if locator::is_comments_page(url) {
            PageMode::OpenedPost
        } else {
            PageMode::Feed
        }
    }
}

/// Last related-posts fetch, memoized per page URL.
#[derive(Debug, Clone)]
pub struct RelatedCache {
    pub page_url: String,
    pub posts: Vec<RelatedPost>,
}

/// Page-lifetime state. Everything here is scoped to one loaded page
/// and reset on navigation; nothing is durably persisted.
#[derive(Debug, Default)]
pub struct Session {
    enabled: bool,
    processed: HashSet<String>,
    recommended: HashSet<String>,
    pub related_cache: Option<RelatedCache>,
    pub username: Option<String>,
}

impl Session {
    pub fn new(enabled: bool) -> Self {
        Session {
            enabled,
            ..Session::default()
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Toggling off clears the processed set and the related cache so a
    /// later re-enable starts a fresh scan. The recommendation seen-set
    /// survives toggling; it is scoped to the page lifetime and only
    /// navigation resets it.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            self.processed.clear();
            self.related_cache = None;
        }
    }

    /// Synchronous claim of an identifier, strictly before any fetch
    /// for it. Returns false when the identifier was already claimed.
    pub fn claim(&mut self, id: &str) -> bool {
        self.processed.insert(id.to_string())
    }

    /// Undo a claim after a transient failure so a later pass retries.
    pub fn release(&mut self, id: &str) {
        self.processed.remove(id);
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.processed.contains(id)
    }

    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    /// Recommendation seen-set: inserted before the backend call and
    /// never released, so one post can never re-trigger.
    pub fn mark_recommended(&mut self, id: &str) -> bool {
        self.recommended.insert(id.to_string())
    }

    pub fn reset_for_navigation(&mut self) {
        self.processed.clear();
        self.recommended.clear();
        self.related_cache = None;
        self.username = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Disabled,
    /// Content absent or too short; the next trigger retries.
    NotReady,
    AlreadyAnnotated,
    /// Fetch or classify failed for the opened post; no annotation this
    /// pass, identifier left unclaimed.
    Failed,
    Annotated {
        id: String,
        label: Label,
        content: PostContent,
    },
    Feed(FeedSummary),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub candidates: usize,
    pub annotated: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Orchestrator {
    content: Arc<dyn ContentService>,
    classify: Arc<dyn ClassifyService>,
    feed_cap: usize,
    min_content_len: usize,
}

impl Orchestrator {
    pub fn new(content: Arc<dyn ContentService>, classify: Arc<dyn ClassifyService>) -> Self {
        Orchestrator {
            content,
            classify,
            feed_cap: DEFAULT_FEED_CAP,
            min_content_len: DEFAULT_MIN_CONTENT_LEN,
        }
    }

    pub fn with_limits(mut self, feed_cap: usize, min_content_len: usize) -> Self {
        self.feed_cap = feed_cap;
        self.min_content_len = min_content_len;
        self
    }

    pub fn scan(&self, page: &mut Page, session: &mut Session) -> Result<ScanOutcome> {
        if !session.enabled() {
            return Ok(ScanOutcome::Disabled);
        }
        match PageMode::detect(page.url()) {
            PageMode::OpenedPost => self.scan_opened(page, session),
            PageMode::Feed => Ok(ScanOutcome::Feed(self.scan_feed(page, session))),
        }
    }

    fn scan_opened(&self, page: &mut Page, session: &mut Session) -> Result<ScanOutcome> {
        let Some(candidate) = locator::opened_post(page) else {
            debug!("opened post container not present yet");
            return Ok(ScanOutcome::NotReady);
        };
        if annotate::is_annotated(page, &candidate.anchor) {
            return Ok(ScanOutcome::AlreadyAnnotated);
        }
        let Some(id) = candidate.id.clone() else {
            return Ok(ScanOutcome::NotReady);
        };
        if !session.claim(&id) {
            return Ok(ScanOutcome::AlreadyAnnotated);
        }

        let Some(content) = self.content.post_content(&id) else {
            session.release(&id);
            return Ok(ScanOutcome::Failed);
        };
        if content.combined_len() < self.min_content_len {
            session.release(&id);
            debug!(%id, "opened post content too short, waiting for render");
            return Ok(ScanOutcome::NotReady);
        }

        let Some(label) = self.classify.classify(&content.text(), ClassifyMode::Single) else {
            session.release(&id);
            return Ok(ScanOutcome::Failed);
        };

        // The element may have been swapped out while the network calls
        // were in flight; never write into a container that is gone.
        if !page.exists(&candidate.anchor) {
            session.release(&id);
            return Ok(ScanOutcome::NotReady);
        }
        if !annotate::annotate(page, &candidate.anchor, &label)? {
            return Ok(ScanOutcome::AlreadyAnnotated);
        }

        Ok(ScanOutcome::Annotated { id, label, content })
    }

    fn scan_feed(&self, page: &mut Page, session: &mut Session) -> FeedSummary {
        let mut summary = FeedSummary::default();

        // Three selector families with separate extraction paths; one
        // shared cap across all of them.
        let candidates: Vec<Located> = locator::feed_cards(page)
            .into_iter()
            .chain(locator::search_tiles(page))
            .chain(locator::search_previews(page))
            .take(self.feed_cap)
            .collect();

        for candidate in candidates {
            summary.candidates += 1;
            self.process_feed_candidate(page, session, candidate, &mut summary);
        }

        debug!(?summary, "feed pass complete");
        summary
    }

    /// One candidate, failures isolated: nothing here aborts the
    /// remaining iterations of the pass.
    fn process_feed_candidate(
        &self,
        page: &mut Page,
        session: &mut Session,
        candidate: Located,
        summary: &mut FeedSummary,
    ) {
        let Some(id) = candidate.id.clone() else {
            summary.skipped += 1;
            return;
        };
        if annotate::is_annotated(page, &candidate.anchor) {
            // Terminal state reached by an earlier pass; keep the set
            // consistent with the document.
            session.claim(&id);
            summary.skipped += 1;
            return;
        }
        if !session.claim(&id) {
            summary.skipped += 1;
            return;
        }

        let Some(content) = self.content.post_content(&id) else {
            session.release(&id);
            summary.failed += 1;
            return;
        };
        let mut text = content.text();
        if text.chars().count() < self.min_content_len {
            // Canonical text can be empty for link posts; the visible
            // element text is the fallback.
            text = candidate.text.clone();
        }
        if text.chars().count() < self.min_content_len {
            session.release(&id);
            summary.skipped += 1;
            return;
        }

        let Some(label) = self.classify.classify(&text, ClassifyMode::Batch) else {
            session.release(&id);
            summary.failed += 1;
            return;
        };

        if !page.exists(&candidate.anchor) {
            session.release(&id);
            summary.skipped += 1;
            return;
        }
        match annotate::annotate(page, &candidate.anchor, &label) {
            Ok(true) => summary.annotated += 1,
            Ok(false) => summary.skipped += 1,
            Err(err) => {
                warn!(%id, %err, "annotation failed");
                session.release(&id);
                summary.failed += 1;
            }
        }
    }
}
