use anyhow::Result;

use crate::backend::{Label, Leaning};
use crate::page::{Edit, Page};

pub const MARKER_CLASS: &str = "bias-indicator";
pub const LABEL_ATTR: &str = "data-bias-label";
pub const CONFIDENCE_ATTR: &str = "data-bias-confidence";

/// Insert a marker into the element addressed by `anchor` and store the
/// label on it. No-op when the element already carries a marker; the
/// check is a DOM query, not a side table, so revisits from overlapping
/// triggers cannot double-annotate. Returns whether a marker was added.
pub fn annotate(page: &mut Page, anchor: &str, label: &Label) -> Result<bool> {
    if is_annotated(page, anchor) {
        return Ok(false);
    }

    page.apply(&[
        Edit::PrependOnce {
            selector: anchor.to_string(),
            html: marker_html(label),
        },
        Edit::SetAttr {
            selector: anchor.to_string(),
            name: LABEL_ATTR.to_string(),
            value: label.leaning.as_str().to_string(),
        },
        Edit::SetAttr {
            selector: anchor.to_string(),
            name: CONFIDENCE_ATTR.to_string(),
            value: format!("{:.4}", label.confidence),
        },
    ])?;
    Ok(true)
}

pub fn is_annotated(page: &Page, anchor: &str) -> bool {
    page.exists(&format!("{anchor} .{MARKER_CLASS}"))
}

/// Read the cached label back off an annotated element.
pub fn stored_label(page: &Page, anchor: &str) -> Option<Label> {
    let snapshot = page.select(anchor).into_iter().next()?;
    let leaning = match snapshot.attr(LABEL_ATTR)? {
        "left" => Leaning::Left,
        "right" => Leaning::Right,
        "neutral" => Leaning::Neutral,
        _ => Leaning::Unknown,
    };
    let confidence = snapshot
        .attr(CONFIDENCE_ATTR)
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(0.0);
    Some(Label {
        leaning,
        confidence,
    })
}

/// Remove every marker in the document and strip the cached labels.
/// Used when the user disables detection. Returns the marker count
/// removed.
pub fn unannotate_all(page: &mut Page) -> Result<usize> {
    let removed = marker_count(page);
    if removed == 0 && !page.exists(&format!("[{LABEL_ATTR}]")) {
        return Ok(0);
    }
    page.apply(&[
        Edit::Remove {
            selector: format!(".{MARKER_CLASS}"),
        },
        Edit::RemoveAttr {
            selector: format!("[{LABEL_ATTR}]"),
            name: LABEL_ATTR.to_string(),
        },
        Edit::RemoveAttr {
            selector: format!("[{CONFIDENCE_ATTR}]"),
            name: CONFIDENCE_ATTR.to_string(),
        },
    ])?;
    Ok(removed)
}

pub fn marker_count(page: &Page) -> usize {
    page.count(&format!(".{MARKER_CLASS}"))
}

fn marker_html(label: &Label) -> String {
    let percent = (label.confidence * 100.0).round() as i64;
    format!(
        "<div class=\"{MARKER_CLASS} {}\"><span class=\"bias-badge\">Leaning: {}</span><span class=\"bias-score\">{percent}%</span></div>",
        label.leaning.css_class(),
        label.leaning.as_str().to_uppercase(),
    )
}
