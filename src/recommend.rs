//! One-shot counter-perspective prompt, shown when the backend decides
//! the user has crossed the one-sidedness threshold.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::backend::{Label, RecommendRequest, Recommendation};
use crate::data::{RecommendOutcome, RecommendService};
use crate::locator;
use crate::page::{Edit, Page};
use crate::related::ANONYMOUS_USER;
use crate::scan::Session;

pub const MODAL_ID: &str = "bias-recommend-modal";

pub struct Trigger {
    service: Arc<dyn RecommendService>,
}

impl Trigger {
    pub fn new(service: Arc<dyn RecommendService>) -> Self {
        Trigger { service }
    }

    /// Returns whether a modal was displayed. The seen-set entry is
    /// inserted before the backend call and never released: the same
    /// post never re-triggers, not even after a failure.
    pub fn maybe_trigger(
        &self,
        page: &mut Page,
        session: &mut Session,
        id: &str,
        title: &str,
        body: &str,
        label: &Label,
    ) -> Result<bool> {
        if !label.leaning.is_polarized() {
            return Ok(false);
        }
        if !session.mark_recommended(id) {
            return Ok(false);
        }

        if session.username.is_none() {
            session.username = locator::username(page);
        }
        let request = RecommendRequest {
            user_id: session
                .username
                .clone()
                .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
            title: title.to_string(),
            post: body.to_string(),
            label: label.leaning,
        };

        match self.service.recommend(&request) {
            Some(RecommendOutcome::Biased(response)) if !response.recommendations.is_empty() => {
                info!(
                    id,
                    count = response.recommendations.len(),
                    "one-sidedness threshold reached"
                );
                render_modal(page, &response.recommendations)?;
                Ok(true)
            }
            Some(_) => {
                debug!(id, "no recommendation threshold reached");
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

pub fn is_modal_present(page: &Page) -> bool {
    page.exists(&format!("#{MODAL_ID}"))
}

/// Dismiss handler for the modal close control.
pub fn remove_modal(page: &mut Page) -> Result<()> {
    if !is_modal_present(page) {
        return Ok(());
    }
    page.apply(&[Edit::Remove {
        selector: format!("#{MODAL_ID}"),
    }])
}

fn render_modal(page: &mut Page, recommendations: &[Recommendation]) -> Result<()> {
    if is_modal_present(page) {
        return Ok(());
    }

    let mut items = String::new();
    for rec in recommendations {
        items.push_str(&format!(
            "<a href=\"{}\" target=\"_blank\" rel=\"noopener\" class=\"recommend-item {}\"><span class=\"recommend-title\">{}</span><span class=\"recommend-bias\">{}</span></a>",
            escape_html(&rec.url),
            rec.leaning.as_str(),
            escape_html(&rec.title),
            rec.leaning.as_str().to_uppercase(),
        ));
    }
    let html = format!(
        "<div id=\"{MODAL_ID}\" class=\"recommend-modal\"><div class=\"recommend-card\"><button class=\"recommend-close\" aria-label=\"Dismiss\">&times;</button><h3>Step outside the echo chamber</h3><p>You have been reading a lot of one-sided content. Here are some other perspectives.</p>{items}</div></div>"
    );

    page.apply(&[Edit::Append {
        selector: "body".to_string(),
        html,
    }])
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Leaning, RecommendResponse};
    use crate::data::MockRecommendService;

    fn page() -> Page {
        Page::new(
            "https://www.reddit.com/r/news/comments/ab1/title/",
            "<html><body></body></html>",
        )
        .unwrap()
    }

    fn label(leaning: Leaning) -> Label {
        Label {
            leaning,
            confidence: 0.9,
        }
    }

    fn biased_response() -> RecommendResponse {
        serde_json::from_str(
            r#"{
                "bias_detected": true,
                "bias": "left",
                "recommendations": [
                    {"title": "Other side", "url": "https://www.reddit.com/r/a", "leaning": "right"},
                    {"title": "Middle ground", "url": "https://www.reddit.com/r/b", "leaning": "neutral"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn polarized_label_with_threshold_shows_modal() {
        let service = Arc::new(MockRecommendService::biased(biased_response()));
        let trigger = Trigger::new(service.clone());
        let mut page = page();
        let mut session = Session::new(true);

        let shown = trigger
            .maybe_trigger(
                &mut page,
                &mut session,
                "t3_ab1",
                "Title",
                "Body",
                &label(Leaning::Left),
            )
            .unwrap();
        assert!(shown);
        assert!(is_modal_present(&page));
        assert_eq!(page.count(".recommend-item"), 2);
    }

    #[test]
    fn neutral_label_never_triggers() {
        let service = Arc::new(MockRecommendService::default());
        let trigger = Trigger::new(service.clone());
        let mut page = page();
        let mut session = Session::new(true);

        let shown = trigger
            .maybe_trigger(
                &mut page,
                &mut session,
                "t3_ab1",
                "Title",
                "Body",
                &label(Leaning::Neutral),
            )
            .unwrap();
        assert!(!shown);
        assert_eq!(service.call_count(), 0);
    }

    #[test]
    fn same_post_triggers_at_most_once() {
        let service = Arc::new(MockRecommendService::biased(biased_response()));
        let trigger = Trigger::new(service.clone());
        let mut page = page();
        let mut session = Session::new(true);

        for _ in 0..3 {
            trigger
                .maybe_trigger(
                    &mut page,
                    &mut session,
                    "t3_ab1",
                    "Title",
                    "Body",
                    &label(Leaning::Left),
                )
                .unwrap();
        }
        assert_eq!(service.call_count(), 1);
    }

    #[test]
    fn no_content_response_changes_no_ui() {
        let service = Arc::new(MockRecommendService::default());
        let trigger = Trigger::new(service.clone());
        let mut page = page();
        let mut session = Session::new(true);

        let shown = trigger
            .maybe_trigger(
                &mut page,
                &mut session,
                "t3_ab1",
                "Title",
                "Body",
                &label(Leaning::Right),
            )
            .unwrap();
        assert!(!shown);
        assert_eq!(service.call_count(), 1);
        assert!(!is_modal_present(&page));
    }

    #[test]
    fn modal_is_dismissible() {
        let service = Arc::new(MockRecommendService::biased(biased_response()));
        let trigger = Trigger::new(service);
        let mut page = page();
        let mut session = Session::new(true);

        trigger
            .maybe_trigger(
                &mut page,
                &mut session,
                "t3_ab1",
                "Title",
                "Body",
                &label(Leaning::Left),
            )
            .unwrap();
        remove_modal(&mut page).unwrap();
        assert!(!is_modal_present(&page));
    }
}
