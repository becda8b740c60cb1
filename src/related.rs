//! Floating related-posts trigger and its hover panel.

use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::annotate;
use crate::backend::{RelatedPost, RelatedRequest};
use crate::data::RelatedService;
use crate::locator;
use crate::page::{Edit, Page};
use crate::scan::{RelatedCache, Session};

pub const BUTTON_ID: &str = "find-related-btn";
pub const PANEL_ID: &str = "related-posts-panel";

pub const ANONYMOUS_USER: &str = "anonymous";

static BUTTON_HTML: Lazy<String> = Lazy::new(|| {
    format!(
        "<button id=\"{BUTTON_ID}\" class=\"related-btn\">Find Related Posts</button>"
    )
});

/// Viewport-space bounding box of the trigger element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Panel placement: right-aligned under the trigger, clamped inside the
/// viewport with a 12px gutter on both sides.
pub fn panel_position(trigger: Rect, panel: Size, viewport_width: f64) -> (f64, f64) {
    let mut left = trigger.right - panel.width;
    left = left.min(viewport_width - panel.width - 12.0);
    left = left.max(12.0);
    let top = trigger.bottom + 8.0;
    (left, top)
}

/// Add the floating trigger, once. Returns whether it was added.
pub fn ensure_button(page: &mut Page) -> Result<bool> {
    if page.exists(&format!("#{BUTTON_ID}")) {
        return Ok(false);
    }
    page.apply(&[Edit::Append {
        selector: "body".to_string(),
        html: BUTTON_HTML.clone(),
    }])?;
    Ok(true)
}

/// Remove the trigger and any open panel. Safe when absent.
pub fn remove(page: &mut Page) -> Result<()> {
    let mut edits = Vec::new();
    if page.exists(&format!("#{BUTTON_ID}")) {
        edits.push(Edit::Remove {
            selector: format!("#{BUTTON_ID}"),
        });
    }
    if page.exists(&format!("#{PANEL_ID}")) {
        edits.push(Edit::Remove {
            selector: format!("#{PANEL_ID}"),
        });
    }
    page.apply(&edits)
}

pub fn is_button_present(page: &Page) -> bool {
    page.exists(&format!("#{BUTTON_ID}"))
}

pub struct Panel {
    service: Arc<dyn RelatedService>,
}

impl Panel {
    pub fn new(service: Arc<dyn RelatedService>) -> Self {
        Panel { service }
    }

    /// Hover handler: fetch (or reuse) the related list for the opened
    /// post and render the positioned panel. No-op when the opened post
    /// is not annotated.
    pub fn hover(
        &self,
        page: &mut Page,
        session: &mut Session,
        trigger: Rect,
        panel: Size,
        viewport_width: f64,
    ) -> Result<()> {
        let Some(opened) = locator::opened_post(page) else {
            return Ok(());
        };
        let Some(label) = annotate::stored_label(page, &opened.anchor) else {
            return Ok(());
        };

        let posts = match &session.related_cache {
            Some(cache) if cache.page_url == page.href() => cache.posts.clone(),
            _ => {
                let request = RelatedRequest {
                    user_id: session
                        .username
                        .clone()
                        .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
                    subreddit: locator::subreddit_from_url(page.url()).unwrap_or_default(),
                    label: label.leaning,
                    title: opened.title.clone().unwrap_or_default(),
                    post: opened.text.clone(),
                };
                let Some(posts) = self.service.related(&request) else {
                    // Soft failure; the next hover retries.
                    return Ok(());
                };
                debug!(count = posts.len(), "related posts fetched");
                session.related_cache = Some(RelatedCache {
                    page_url: page.href().to_string(),
                    posts: posts.clone(),
                });
                posts
            }
        };

        let (left, top) = panel_position(trigger, panel, viewport_width);
        render_panel(page, &posts, left, top)
    }
}

fn render_panel(page: &mut Page, posts: &[RelatedPost], left: f64, top: f64) -> Result<()> {
    let mut items = String::new();
    for post in posts {
        items.push_str(&format!(
            "<a href=\"{}\" target=\"_blank\" rel=\"noopener\" class=\"related-item {}\"><span class=\"related-title\">{}</span><span class=\"related-bias\">{}</span></a>",
            escape_html(&post.url),
            post.leaning.as_str(),
            escape_html(&post.title),
            post.leaning.as_str().to_uppercase(),
        ));
    }
    let html = format!(
        "<div id=\"{PANEL_ID}\" class=\"related-panel show\" style=\"position: fixed; left: {left}px; top: {top}px\"><h4>Related Posts</h4>{items}</div>"
    );

    let mut edits = Vec::new();
    if page.exists(&format!("#{PANEL_ID}")) {
        edits.push(Edit::Remove {
            selector: format!("#{PANEL_ID}"),
        });
    }
    edits.push(Edit::Append {
        selector: "body".to_string(),
        html,
    });
    page.apply(&edits)
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
    use crate::backend::{Label, Leaning};
    use crate::data::MockRelatedService;

    fn annotated_post_page() -> Page {
        let mut page = Page::new(
            "https://www.reddit.com/r/news/comments/ab1/title/",
            r#"<html><body><shreddit-post id="t3_ab1" post-title="Headline">a body of sufficient length</shreddit-post></body></html>"#,
        )
        .unwrap();
        annotate::annotate(
            &mut page,
            "shreddit-post[id=\"t3_ab1\"]",
            &Label {
                leaning: Leaning::Left,
                confidence: 0.8,
            },
        )
        .unwrap();
        page
    }

    fn geometry() -> (Rect, Size) {
        (
            Rect {
                left: 900.0,
                top: 20.0,
                right: 1060.0,
                bottom: 52.0,
            },
            Size {
                width: 320.0,
                height: 240.0,
            },
        )
    }

    #[test]
    fn position_right_aligns_under_trigger() {
        let (trigger, panel) = geometry();
        let (left, top) = panel_position(trigger, panel, 1280.0);
        assert_eq!(left, 740.0);
        assert_eq!(top, 60.0);
    }

    #[test]
    fn position_clamps_to_viewport() {
        let panel = Size {
            width: 320.0,
            height: 240.0,
        };
        let narrow = Rect {
            left: 0.0,
            top: 0.0,
            right: 40.0,
            bottom: 30.0,
        };
        let (left, _) = panel_position(narrow, panel, 1280.0);
        assert_eq!(left, 12.0);

        let wide = Rect {
            left: 1240.0,
            top: 0.0,
            right: 1700.0,
            bottom: 30.0,
        };
        let (left, _) = panel_position(wide, panel, 1280.0);
        assert_eq!(left, 1280.0 - 320.0 - 12.0);
    }

    #[test]
    fn button_is_duplicate_guarded() {
        let mut page = annotated_post_page();
        assert!(ensure_button(&mut page).unwrap());
        assert!(!ensure_button(&mut page).unwrap());
        assert_eq!(page.count(&format!("#{BUTTON_ID}")), 1);

        remove(&mut page).unwrap();
        assert!(!is_button_present(&page));
    }

    #[test]
    fn hover_fetches_once_and_reuses_the_cache() {
        let service = Arc::new(MockRelatedService::with(vec![RelatedPost {
            title: "Counter view".into(),
            url: "https://www.reddit.com/r/x".into(),
            leaning: Leaning::Right,
        }]));
        let panel = Panel::new(service.clone());
        let mut page = annotated_post_page();
        let mut session = Session::new(true);
        let (trigger, size) = geometry();

        panel
            .hover(&mut page, &mut session, trigger, size, 1280.0)
            .unwrap();
        panel
            .hover(&mut page, &mut session, trigger, size, 1280.0)
            .unwrap();
        assert_eq!(service.call_count(), 1);
        assert!(page.exists(&format!("#{PANEL_ID}")));
        assert_eq!(page.count(".related-item"), 1);
    }

    #[test]
    fn hover_without_annotation_renders_nothing() {
        let service = Arc::new(MockRelatedService::default());
        let panel = Panel::new(service.clone());
        let mut page = Page::new(
            "https://www.reddit.com/r/news/comments/ab1/title/",
            r#"<html><body><shreddit-post id="t3_ab1">plain</shreddit-post></body></html>"#,
        )
        .unwrap();
        let mut session = Session::new(true);
        let (trigger, size) = geometry();

        panel
            .hover(&mut page, &mut session, trigger, size, 1280.0)
            .unwrap();
        assert_eq!(service.call_count(), 0);
        assert!(!page.exists(&format!("#{PANEL_ID}")));
    }

    #[test]
    fn cache_is_keyed_by_page_url() {
        let service = Arc::new(MockRelatedService::with(vec![]));
        let panel = Panel::new(service.clone());
        let mut page = annotated_post_page();
        let mut session = Session::new(true);
        let (trigger, size) = geometry();

        panel
            .hover(&mut page, &mut session, trigger, size, 1280.0)
            .unwrap();
        assert_eq!(service.call_count(), 1);

        // Same cache entry no longer matches after a navigation.
        page.navigate(
            "https://www.reddit.com/r/news/comments/cd2/other/",
            r#"<html><body><shreddit-post id="t3_cd2" post-title="Other">another body of sufficient length</shreddit-post></body></html>"#,
        )
        .unwrap();
        annotate::annotate(
            &mut page,
            "shreddit-post[id=\"t3_cd2\"]",
            &Label {
                leaning: Leaning::Right,
                confidence: 0.7,
            },
        )
        .unwrap();
        panel
            .hover(&mut page, &mut session, trigger, size, 1280.0)
            .unwrap();
        assert_eq!(service.call_count(), 2);
    }
}
