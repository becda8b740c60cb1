//! Page chrome injected once per page: the Vibes/Skeptical toggle and
//! the EchoBreak dashboard button. Both are duplicate-guarded by id.

use anyhow::Result;
use once_cell::sync::Lazy;

use crate::page::{Edit, Page};

pub const TOGGLE_ID: &str = "bias-detector-toggle";
pub const TOGGLE_CHECKBOX_ID: &str = "biasToggleCheckbox";
pub const DASHBOARD_BUTTON_ID: &str = "dashboard-btn";

static TOGGLE_HTML: Lazy<String> = Lazy::new(|| {
    format!(
        r#"<div id="{TOGGLE_ID}"><div class="toggle-wrapper"><span class="toggle-label"><span class="mode-vibes">Vibes</span> / <span class="mode-skeptical">Skeptical</span> Mode</span><label class="toggle-switch"><input type="checkbox" id="{TOGGLE_CHECKBOX_ID}"><span class="toggle-slider"></span></label></div></div>"#
    )
});

static DASHBOARD_HTML: Lazy<String> = Lazy::new(|| {
    format!(
        r#"<div id="{DASHBOARD_BUTTON_ID}" style="position: fixed; bottom: 20px; right: 20px; z-index: 9999"><button class="dashboard-open">EchoBreak</button></div>"#
    )
});

/// Insert the toggle control if absent and sync its checkbox with the
/// enabled flag.
pub fn ensure_toggle(page: &mut Page, enabled: bool) -> Result<()> {
    let mut edits = Vec::new();
    if !page.exists(&format!("#{TOGGLE_ID}")) {
        edits.push(Edit::Append {
            selector: "body".to_string(),
            html: TOGGLE_HTML.clone(),
        });
    }
    page.apply(&edits)?;
    sync_toggle(page, enabled)
}

/// Reflect the enabled flag on the checkbox element.
pub fn sync_toggle(page: &mut Page, enabled: bool) -> Result<()> {
    let selector = format!("#{TOGGLE_CHECKBOX_ID}");
    if !page.exists(&selector) {
        return Ok(());
    }
    let edit = if enabled {
        Edit::SetAttr {
            selector,
            name: "checked".to_string(),
            value: String::new(),
        }
    } else {
        Edit::RemoveAttr {
            selector,
            name: "checked".to_string(),
        }
    };
    page.apply(&[edit])
}

pub fn ensure_dashboard_button(page: &mut Page) -> Result<()> {
    if page.exists(&format!("#{DASHBOARD_BUTTON_ID}")) {
        return Ok(());
    }
    page.apply(&[Edit::Append {
        selector: "body".to_string(),
        html: DASHBOARD_HTML.clone(),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Page {
        Page::new("https://www.reddit.com/", "<html><body></body></html>").unwrap()
    }

    #[test]
    fn toggle_is_inserted_once() {
        let mut page = page();
        ensure_toggle(&mut page, true).unwrap();
        ensure_toggle(&mut page, true).unwrap();
        assert_eq!(page.count(&format!("#{TOGGLE_ID}")), 1);
    }

    #[test]
    fn checkbox_reflects_enabled_flag() {
        let mut page = page();
        ensure_toggle(&mut page, true).unwrap();
        let checkbox = page
            .select(&format!("#{TOGGLE_CHECKBOX_ID}"))
            .into_iter()
            .next()
            .unwrap();
        assert!(checkbox.attr("checked").is_some());

        sync_toggle(&mut page, false).unwrap();
        let checkbox = page
            .select(&format!("#{TOGGLE_CHECKBOX_ID}"))
            .into_iter()
            .next()
            .unwrap();
        assert!(checkbox.attr("checked").is_none());
    }

    #[test]
    fn dashboard_button_is_inserted_once() {
        let mut page = page();
        ensure_dashboard_button(&mut page).unwrap();
        ensure_dashboard_button(&mut page).unwrap();
        assert_eq!(page.count(&format!("#{DASHBOARD_BUTTON_ID}")), 1);
    }
}
