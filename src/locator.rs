//! Finds candidate post elements and extracts the canonical `t3_<id>`
//! identifier for each, across the markup variants the feed serves.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::page::{ElementSnapshot, Page};

pub const FULLNAME_PREFIX: &str = "t3_";

/// Modern custom-element feed card.
pub const FEED_CARD_SELECTOR: &str = "shreddit-post";
/// Legacy class-based markup.
pub const LEGACY_CARD_SELECTOR: &str = "div.thing";
/// Title-only search tile.
pub const SEARCH_TILE_SELECTOR: &str = "a[data-testid=\"post-title\"]";
/// Content-preview search result.
pub const SEARCH_PREVIEW_SELECTOR: &str = "div[data-testid=\"search-post-unit\"]";

static COMMENTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/comments/([a-z0-9]+)").expect("valid comments regex"));

static SUBREDDIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/r/([^/]+)").expect("valid subreddit regex"));

/// One candidate post element.
#[derive(Debug, Clone)]
pub struct Located {
    /// Canonical identifier in `t3_<id>` form, or `None` when no markup
    /// variant yielded one. Callers skip such elements without error.
    pub id: Option<String>,
    /// Selector that re-addresses this element in the live document.
    pub anchor: String,
    pub title: Option<String>,
    pub text: String,
}

/// Home-feed cards: modern custom elements first, then legacy markup.
pub fn feed_cards(page: &Page) -> Vec<Located> {
    let mut found = Vec::new();
    for snapshot in page.select(FEED_CARD_SELECTOR) {
        found.push(locate_card(&snapshot, FEED_CARD_SELECTOR));
    }
    for snapshot in page.select(LEGACY_CARD_SELECTOR) {
        found.push(locate_card(&snapshot, LEGACY_CARD_SELECTOR));
    }
    found
}

/// Title-only search tiles. The tile is itself the permalink anchor, so
/// the identifier comes from its own href and the body text is absent.
pub fn search_tiles(page: &Page) -> Vec<Located> {
    page.select(SEARCH_TILE_SELECTOR)
        .into_iter()
        .map(|snapshot| {
            let raw = snapshot.links.first().and_then(|href| raw_id(href));
            Located {
                id: raw.as_deref().map(fullname),
                anchor: match raw {
                    Some(raw) => format!("a[href*=\"/comments/{raw}/\"]"),
                    None => SEARCH_TILE_SELECTOR.to_string(),
                },
                title: Some(snapshot.text.clone()),
                text: snapshot.text,
            }
        })
        .collect()
}

/// Content-preview search results: a wrapper div whose permalink lives
/// on a nested anchor. The nested anchor doubles as the mutation target
/// since the wrapper itself carries no addressable attribute.
pub fn search_previews(page: &Page) -> Vec<Located> {
    page.select(SEARCH_PREVIEW_SELECTOR)
        .into_iter()
        .map(|snapshot| {
            let raw = snapshot.links.iter().find_map(|href| raw_id(href));
            Located {
                id: raw.as_deref().map(fullname),
                anchor: match raw {
                    Some(raw) => format!(
                        "{SEARCH_PREVIEW_SELECTOR} a[href*=\"/comments/{raw}/\"]"
                    ),
                    None => SEARCH_PREVIEW_SELECTOR.to_string(),
                },
                title: None,
                text: snapshot.text,
            }
        })
        .collect()
}

/// The single container of an opened post, tried in priority order.
pub fn opened_post(page: &Page) -> Option<Located> {
    for selector in [
        FEED_CARD_SELECTOR,
        "div[data-test-id=\"post-content\"]",
        ".entry .usertext-body",
    ] {
        if let Some(snapshot) = page.select(selector).into_iter().next() {
            let mut located = locate_card(&snapshot, selector);
            if located.id.is_none() {
                located.id = post_id_from_url(page.url());
            }
            return Some(located);
        }
    }
    None
}

/// Identifier from the page URL itself, available on comments pages.
pub fn post_id_from_url(url: &Url) -> Option<String> {
    raw_id(url.path()).map(|raw| fullname(&raw))
}

pub fn is_comments_page(url: &Url) -> bool {
    post_id_from_url(url).is_some()
}

pub fn subreddit_from_url(url: &Url) -> Option<String> {
    SUBREDDIT_RE
        .captures(url.path())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Best-effort logged-in username, for the recommendation identity.
pub fn username(page: &Page) -> Option<String> {
    if let Some(user) = page.select("span.user a").into_iter().next() {
        if !user.text.is_empty() {
            return Some(user.text);
        }
    }
    page.select("a[href^=\"/user/\"]")
        .into_iter()
        .map(|snapshot| snapshot.text)
        .find(|text| !text.is_empty())
}

fn locate_card(snapshot: &ElementSnapshot, selector: &str) -> Located {
    let title = snapshot
        .attr("post-title")
        .map(str::to_string)
        .filter(|t| !t.is_empty());

    // Native attributes first.
    if let Some(id) = snapshot.attr("id").filter(|id| is_fullname(id)) {
        return Located {
            id: Some(id.to_string()),
            anchor: format!("{}[id=\"{}\"]", snapshot.tag, id),
            title,
            text: snapshot.text.clone(),
        };
    }
    if let Some(id) = snapshot.attr("data-fullname").filter(|id| is_fullname(id)) {
        return Located {
            id: Some(id.to_string()),
            anchor: format!("{}[data-fullname=\"{}\"]", snapshot.tag, id),
            title,
            text: snapshot.text.clone(),
        };
    }
    if let Some(raw) = snapshot.attr("permalink").and_then(raw_id) {
        return Located {
            id: Some(fullname(&raw)),
            anchor: format!("{}[permalink*=\"/comments/{}/\"]", snapshot.tag, raw),
            title,
            text: snapshot.text.clone(),
        };
    }

    // Fall back to a nested permalink anchor.
    if let Some(raw) = snapshot.links.iter().find_map(|href| raw_id(href)) {
        return Located {
            id: Some(fullname(&raw)),
            anchor: format!("{} a[href*=\"/comments/{}/\"]", selector, raw),
            title,
            text: snapshot.text.clone(),
        };
    }

    Located {
        id: None,
        anchor: selector.to_string(),
        title,
        text: snapshot.text.clone(),
    }
}

fn is_fullname(value: &str) -> bool {
    value
        .strip_prefix(FULLNAME_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn fullname(raw: &str) -> String {
    format!("{FULLNAME_PREFIX}{raw}")
}

fn raw_id(path: &str) -> Option<String> {
    COMMENTS_RE
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}
