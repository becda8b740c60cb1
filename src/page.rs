//! In-memory page model: the current URL plus the current HTML of the
//! document. Reads go through `scraper`, writes through `lol_html`
//! rewriting, so every edit produces the next HTML state the way a live
//! DOM mutation would.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

#[derive(Debug, Clone)]
pub struct Page {
    url: Url,
    html: String,
}

/// Owned view of one matched element. Holding a snapshot instead of a
/// live node reference means callers must re-address elements through
/// selectors before mutating, which is what guards against writes into
/// a document that has changed shape since the lookup.
#[derive(Debug, Clone)]
pub struct ElementSnapshot {
    pub tag: String,
    pub attrs: HashMap<String, String>,
    pub text: String,
    pub links: Vec<String>,
}

impl ElementSnapshot {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub enum Edit {
    Prepend { selector: String, html: String },
    /// Prepend into the first match only, even when the selector hits
    /// duplicate nodes for one logical element.
    PrependOnce { selector: String, html: String },
    Append { selector: String, html: String },
    Remove { selector: String },
    SetAttr { selector: String, name: String, value: String },
    RemoveAttr { selector: String, name: String },
}

impl Page {
    pub fn new(url: &str, html: impl Into<String>) -> Result<Self> {
        let url = Url::parse(url)?;
        Ok(Page {
            url,
            html: html.into(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Replace the document after an in-page navigation.
    pub fn navigate(&mut self, url: &str, html: impl Into<String>) -> Result<()> {
        self.url = Url::parse(url)?;
        self.html = html.into();
        Ok(())
    }

    /// Replace the document body after the host re-rendered (the
    /// mutation-observer analog). The URL is unchanged.
    pub fn set_html(&mut self, html: impl Into<String>) {
        self.html = html.into();
    }

    pub fn select(&self, selector: &str) -> Vec<ElementSnapshot> {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(selector, %err, "page: invalid selector");
                return Vec::new();
            }
        };
        let anchor = match Selector::parse("a[href]") {
            Ok(anchor) => anchor,
            Err(_) => return Vec::new(),
        };

        let document = Html::parse_document(&self.html);
        document
            .select(&parsed)
            .map(|element| {
                let mut attrs = HashMap::new();
                for (name, value) in element.value().attrs() {
                    attrs.insert(name.to_string(), value.to_string());
                }
                let mut links: Vec<String> = element
                    .select(&anchor)
                    .filter_map(|a| a.value().attr("href"))
                    .map(str::to_string)
                    .collect();
                if element.value().name() == "a" {
                    if let Some(href) = element.value().attr("href") {
                        links.insert(0, href.to_string());
                    }
                }
                ElementSnapshot {
                    tag: element.value().name().to_string(),
                    attrs,
                    text: collapse_whitespace(element.text()),
                    links,
                }
            })
            .collect()
    }

    pub fn exists(&self, selector: &str) -> bool {
        !self.select(selector).is_empty()
    }

    pub fn count(&self, selector: &str) -> usize {
        self.select(selector).len()
    }

    /// Apply a batch of edits in one rewrite pass.
    pub fn apply(&mut self, edits: &[Edit]) -> Result<()> {
        if edits.is_empty() {
            return Ok(());
        }

        let mut handlers = Vec::with_capacity(edits.len());
        for edit in edits {
            let handler = match edit {
                Edit::Prepend { selector, html } => element!(selector.as_str(), move |el| {
                    el.prepend(html, ContentType::Html);
                    Ok(())
                }),
                Edit::PrependOnce { selector, html } => {
                    let mut done = false;
                    element!(selector.as_str(), move |el| {
                        if !done {
                            el.prepend(html, ContentType::Html);
                            done = true;
                        }
                        Ok(())
                    })
                }
                Edit::Append { selector, html } => element!(selector.as_str(), move |el| {
                    el.append(html, ContentType::Html);
                    Ok(())
                }),
                Edit::Remove { selector } => element!(selector.as_str(), |el| {
                    el.remove();
                    Ok(())
                }),
                Edit::SetAttr {
                    selector,
                    name,
                    value,
                } => element!(selector.as_str(), move |el| {
                    el.set_attribute(name, value)?;
                    Ok(())
                }),
                Edit::RemoveAttr { selector, name } => element!(selector.as_str(), move |el| {
                    el.remove_attribute(name);
                    Ok(())
                }),
            };
            handlers.push(handler);
        }

        let next = rewrite_str(
            &self.html,
            RewriteStrSettings {
                element_content_handlers: handlers,
                ..RewriteStrSettings::default()
            },
        )
        .map_err(|err| anyhow!("page: rewrite failed: {err}"))?;

        self.html = next;
        Ok(())
    }
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for part in parts {
        for word in part.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<html><body>
        <div id="a" class="card"><a href="/comments/abc/">First   post</a></div>
        <div id="b" class="card">Second post</div>
    </body></html>"#;

    #[test]
    fn select_returns_snapshots_with_links() {
        let page = Page::new("https://example.com/", DOC).unwrap();
        let cards = page.select("div.card");
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].attr("id"), Some("a"));
        assert_eq!(cards[0].text, "First post");
        assert_eq!(cards[0].links, vec!["/comments/abc/".to_string()]);
        assert!(cards[1].links.is_empty());
    }

    #[test]
    fn select_is_idempotent() {
        let page = Page::new("https://example.com/", DOC).unwrap();
        let first: Vec<_> = page.select("div.card").iter().map(|c| c.text.clone()).collect();
        let second: Vec<_> = page.select("div.card").iter().map(|c| c.text.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn apply_prepend_and_remove_round_trip() {
        let mut page = Page::new("https://example.com/", DOC).unwrap();
        page.apply(&[Edit::Prepend {
            selector: "div[id=\"a\"]".into(),
            html: "<span class=\"marker\">x</span>".into(),
        }])
        .unwrap();
        assert!(page.exists("div[id=\"a\"] span.marker"));

        page.apply(&[Edit::Remove {
            selector: "span.marker".into(),
        }])
        .unwrap();
        assert!(!page.exists("span.marker"));
    }

    #[test]
    fn apply_set_attribute() {
        let mut page = Page::new("https://example.com/", DOC).unwrap();
        page.apply(&[Edit::SetAttr {
            selector: "div[id=\"b\"]".into(),
            name: "data-flag".into(),
            value: "on".into(),
        }])
        .unwrap();
        let cards = page.select("div[id=\"b\"]");
        assert_eq!(cards[0].attr("data-flag"), Some("on"));
    }

    #[test]
    fn invalid_selector_is_soft() {
        let page = Page::new("https://example.com/", DOC).unwrap();
        assert!(page.select("div[[").is_empty());
    }

    #[test]
    fn navigate_replaces_url_and_document() {
        let mut page = Page::new("https://example.com/", DOC).unwrap();
        page.navigate("https://example.com/next", "<html><body></body></html>")
            .unwrap();
        assert_eq!(page.href(), "https://example.com/next");
        assert!(!page.exists("div.card"));
    }
}
