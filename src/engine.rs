//! Composition root. Every host trigger (load, mutation, tick, command,
//! hover) funnels into the same idempotent scan pass, so a pass that
//! aborted without a result is reattempted by the next trigger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info};

use crate::annotate;
use crate::control::Command;
use crate::data::{ClassifyService, ContentService, RecommendService, RelatedService};
use crate::locator;
use crate::nav::Watcher;
use crate::overlay;
use crate::page::Page;
use crate::recommend;
use crate::related::{self, Panel, Rect, Size};
use crate::scan::{Orchestrator, PageMode, ScanOutcome, Session};
use crate::storage::{keys, Store};

pub struct Options {
    pub enabled: bool,
    pub content: Arc<dyn ContentService>,
    pub classify: Arc<dyn ClassifyService>,
    pub recommend: Arc<dyn RecommendService>,
    pub related: Arc<dyn RelatedService>,
    pub feed_cap: usize,
    pub min_content_len: usize,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub store: Option<Arc<Store>>,
}

pub struct Engine {
    session: Session,
    orchestrator: Orchestrator,
    watcher: Watcher,
    trigger: recommend::Trigger,
    panel: Panel,
    store: Option<Arc<Store>>,
}

impl Engine {
    pub fn new(options: Options) -> Self {
        Engine {
            session: Session::new(options.enabled),
            orchestrator: Orchestrator::new(options.content, options.classify)
                .with_limits(options.feed_cap, options.min_content_len),
            watcher: Watcher::new(options.poll_interval, options.settle_delay),
            trigger: recommend::Trigger::new(options.recommend),
            panel: Panel::new(options.related),
            store: options.store,
        }
    }

    pub fn enabled(&self) -> bool {
        self.session.enabled()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn poll_interval(&self) -> Duration {
        self.watcher.poll_interval()
    }

    /// Initial load: inject the chrome, then scan if enabled.
    pub fn bootstrap(&mut self, page: &mut Page) -> Result<()> {
        overlay::ensure_toggle(page, self.session.enabled())?;
        overlay::ensure_dashboard_button(page)?;
        if self.session.enabled() {
            self.scan(page)?;
        }
        Ok(())
    }

    /// One scan pass plus its downstream effects: the recommendation
    /// trigger for a freshly annotated opened post, and the
    /// related-posts button check.
    pub fn scan(&mut self, page: &mut Page) -> Result<ScanOutcome> {
        let outcome = self.orchestrator.scan(page, &mut self.session)?;
        if let ScanOutcome::Annotated {
            ref id,
            ref label,
            ref content,
        } = outcome
        {
            let (id, label, content) = (id.clone(), *label, content.clone());
            self.trigger.maybe_trigger(
                page,
                &mut self.session,
                &id,
                &content.title,
                &content.body,
                &label,
            )?;
        }
        self.check_tagged_post(page)?;
        Ok(outcome)
    }

    /// The related-posts trigger exists exactly when the opened post
    /// carries an annotation.
    pub fn check_tagged_post(&mut self, page: &mut Page) -> Result<()> {
        if self.session.enabled() && PageMode::detect(page.url()) == PageMode::OpenedPost {
            if let Some(opened) = locator::opened_post(page) {
                if annotate::is_annotated(page, &opened.anchor) {
                    related::ensure_button(page)?;
                    return Ok(());
                }
            }
        }
        related::remove(page)
    }

    /// Mutation-observer analog: the host re-rendered part of the
    /// document. Scans are idempotent, so re-running is always safe.
    pub fn notify_mutation(&mut self, page: &mut Page) -> Result<Option<ScanOutcome>> {
        if !self.session.enabled() {
            return Ok(None);
        }
        Ok(Some(self.scan(page)?))
    }

    /// Periodic tick: poll for an in-page navigation; on change, tear
    /// down post-specific UI and page-scoped caches synchronously, then
    /// rescan once the settle delay has elapsed.
    pub fn tick(&mut self, page: &mut Page, now: Instant) -> Result<Option<ScanOutcome>> {
        if let Some(nav) = self.watcher.observe(page.href(), now) {
            info!(from = %nav.from, to = %nav.to, "page navigated");
            related::remove(page)?;
            recommend::remove_modal(page)?;
            self.session.reset_for_navigation();
        }

        if self.watcher.settle_due(now) {
            debug!("settle delay elapsed, rescanning");
            overlay::ensure_toggle(page, self.session.enabled())?;
            overlay::ensure_dashboard_button(page)?;
            if self.session.enabled() {
                return Ok(Some(self.scan(page)?));
            }
        }
        Ok(None)
    }

    /// Toggle handler. Disabling removes every marker and the related
    /// UI; enabling rescans from scratch. The flag is mirrored to the
    /// external settings store.
    pub fn set_enabled(&mut self, page: &mut Page, enabled: bool) -> Result<()> {
        if self.session.enabled() == enabled {
            return Ok(());
        }
        self.session.set_enabled(enabled);
        if let Some(store) = &self.store {
            store.set_bool(keys::BIAS_DETECTION_ENABLED, enabled)?;
        }
        overlay::sync_toggle(page, enabled)?;

        if enabled {
            self.scan(page)?;
        } else {
            annotate::unannotate_all(page)?;
            related::remove(page)?;
        }
        Ok(())
    }

    pub fn handle(&mut self, page: &mut Page, command: Command) -> Result<()> {
        match command {
            Command::Toggle { enabled } => self.set_enabled(page, enabled),
            Command::Rescan => {
                if self.session.enabled() {
                    self.scan(page)?;
                }
                Ok(())
            }
        }
    }

    pub fn hover_related(
        &mut self,
        page: &mut Page,
        trigger: Rect,
        panel: Size,
        viewport_width: f64,
    ) -> Result<()> {
        if !self.session.enabled() {
            return Ok(());
        }
        self.panel
            .hover(page, &mut self.session, trigger, panel, viewport_width)
    }
}
