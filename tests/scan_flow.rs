//! End-to-end pass over the engine with mocked services: feed scan,
//! SPA navigation into a post, recommendation modal, related-posts
//! hover, and teardown on the way back out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use echobreak::annotate;
use echobreak::backend::{Label, Leaning, RecommendResponse, RelatedPost};
use echobreak::content::PostContent;
use echobreak::control::Command;
use echobreak::data::{
    MockClassifyService, MockContentService, MockRecommendService, MockRelatedService,
};
use echobreak::engine::{Engine, Options};
use echobreak::page::Page;
use echobreak::recommend;
use echobreak::related::{self, Rect, Size};
use echobreak::scan::ScanOutcome;

const FEED_URL: &str = "https://www.reddit.com/r/news/";
const POST_URL: &str = "https://www.reddit.com/r/news/comments/p1/headline/";

const FEED_HTML: &str = r#"<html><body>
    <shreddit-post id="t3_f1">feed card one</shreddit-post>
    <shreddit-post id="t3_f2">feed card two</shreddit-post>
    <div class="thing" data-fullname="t3_f3">legacy card</div>
</body></html>"#;

const POST_HTML: &str = r#"<html><body>
    <shreddit-post id="t3_p1" post-title="Headline">the opened post body</shreddit-post>
</body></html>"#;

fn contents() -> Arc<MockContentService> {
    let contents = Arc::new(MockContentService::default());
    for id in ["t3_f1", "t3_f2", "t3_f3"] {
        contents.insert(
            id,
            PostContent {
                title: format!("Feed title {id}"),
                body: "a body comfortably over the minimum".into(),
                subreddit: "news".into(),
            },
        );
    }
    contents.insert(
        "t3_p1",
        PostContent {
            title: "Headline".into(),
            body: "the canonical full text of the opened post".into(),
            subreddit: "news".into(),
        },
    );
    contents
}

fn biased_response() -> RecommendResponse {
    serde_json::from_str(
        r#"{
            "bias_detected": true,
            "bias": "left",
            "recommendations": [
                {"title": "Counter view", "url": "https://www.reddit.com/r/a", "leaning": "right"},
                {"title": "Middle ground", "url": "https://www.reddit.com/r/b", "leaning": "neutral"}
            ]
        }"#,
    )
    .unwrap()
}

fn engine(
    contents: Arc<MockContentService>,
    recommend_svc: Arc<MockRecommendService>,
    related_svc: Arc<MockRelatedService>,
) -> Engine {
    Engine::new(Options {
        enabled: true,
        content: contents,
        classify: Arc::new(MockClassifyService::returning(Some(Label {
            leaning: Leaning::Left,
            confidence: 0.9,
        }))),
        recommend: recommend_svc,
        related: related_svc,
        feed_cap: 15,
        min_content_len: 20,
        poll_interval: Duration::from_millis(300),
        settle_delay: Duration::from_millis(400),
        store: None,
    })
}

#[test]
fn full_session_feed_to_post_and_back() {
    let contents = contents();
    let recommend_svc = Arc::new(MockRecommendService::biased(biased_response()));
    let related_svc = Arc::new(MockRelatedService::with(vec![RelatedPost {
        title: "Opposing take".into(),
        url: "https://www.reddit.com/r/other".into(),
        leaning: Leaning::Right,
    }]));
    let mut engine = engine(contents.clone(), recommend_svc.clone(), related_svc.clone());

    // Initial load on the feed.
    let mut page = Page::new(FEED_URL, FEED_HTML).unwrap();
    engine.bootstrap(&mut page).unwrap();
    assert_eq!(annotate::marker_count(&page), 3);
    assert!(page.exists("shreddit-post[id=\"t3_f1\"] .bias-left"));
    // Feed annotations never show the related trigger.
    assert!(!related::is_button_present(&page));

    let t0 = Instant::now();
    engine.tick(&mut page, t0).unwrap();

    // SPA navigation into a post: no reload, only the URL and document
    // change under the poller.
    page.navigate(POST_URL, POST_HTML).unwrap();
    let t1 = t0 + Duration::from_millis(300);
    engine.tick(&mut page, t1).unwrap();
    assert!(!engine.session().is_processed("t3_f1"));

    // Settle delay elapses; the rescan runs in opened-post mode.
    let t2 = t1 + Duration::from_millis(400);
    let outcome = engine.tick(&mut page, t2).unwrap().expect("settle rescan");
    assert!(matches!(outcome, ScanOutcome::Annotated { ref id, .. } if id == "t3_p1"));
    assert_eq!(contents.calls_for("t3_p1"), 1);

    // Polarized label crossed the threshold: modal plus related button.
    assert!(recommend::is_modal_present(&page));
    assert_eq!(recommend_svc.call_count(), 1);
    assert!(related::is_button_present(&page));

    // Hovering the trigger populates the panel once; the second hover
    // hits the URL-keyed cache.
    let trigger = Rect {
        left: 900.0,
        top: 20.0,
        right: 1060.0,
        bottom: 52.0,
    };
    let size = Size {
        width: 320.0,
        height: 240.0,
    };
    engine.hover_related(&mut page, trigger, size, 1280.0).unwrap();
    engine.hover_related(&mut page, trigger, size, 1280.0).unwrap();
    assert_eq!(related_svc.call_count(), 1);
    assert!(page.exists(".related-item"));

    // A mutation-triggered pass on the same post is a no-op.
    let outcome = engine.notify_mutation(&mut page).unwrap().unwrap();
    assert_eq!(outcome, ScanOutcome::AlreadyAnnotated);
    assert_eq!(contents.calls_for("t3_p1"), 1);
    assert_eq!(recommend_svc.call_count(), 1);

    // Back to the feed: post-scoped UI is torn down synchronously.
    page.navigate(FEED_URL, FEED_HTML).unwrap();
    let t3 = t2 + Duration::from_millis(300);
    engine.tick(&mut page, t3).unwrap();
    assert!(!related::is_button_present(&page));
    assert!(!recommend::is_modal_present(&page));
    assert!(engine.session().related_cache.is_none());
}

#[test]
fn toggle_round_trip_via_companion_commands() {
    let contents = contents();
    let mut engine = engine(
        contents.clone(),
        Arc::new(MockRecommendService::default()),
        Arc::new(MockRelatedService::default()),
    );
    let mut page = Page::new(FEED_URL, FEED_HTML).unwrap();
    engine.bootstrap(&mut page).unwrap();
    assert_eq!(annotate::marker_count(&page), 3);

    engine
        .handle(&mut page, Command::Toggle { enabled: false })
        .unwrap();
    assert_eq!(annotate::marker_count(&page), 0);
    assert!(!engine.enabled());

    engine
        .handle(&mut page, Command::Toggle { enabled: true })
        .unwrap();
    assert_eq!(annotate::marker_count(&page), 3);

    engine.handle(&mut page, Command::Rescan).unwrap();
    assert_eq!(annotate::marker_count(&page), 3);
}

#[test]
fn rendered_marker_matches_classifier_label() {
    let contents = contents();
    let mut engine = engine(
        contents,
        Arc::new(MockRecommendService::default()),
        Arc::new(MockRelatedService::default()),
    );
    let mut page = Page::new(POST_URL, POST_HTML).unwrap();
    engine.bootstrap(&mut page).unwrap();

    let anchor = "shreddit-post[id=\"t3_p1\"]";
    let stored = annotate::stored_label(&page, anchor).expect("stored label");
    assert_eq!(stored.leaning, Leaning::Left);
    assert!(page.exists(&format!("{anchor} .bias-left")));
    assert!(!page.exists(&format!("{anchor} .bias-neutral")));
    assert!(!page.exists(&format!("{anchor} .bias-right")));
}
