//! Listing text: titles, subtitles and HTML descriptions

/// Character budget for titles
pub const TITLE_BUDGET: usize = 80;

/// Character budget for subtitles
pub const SUBTITLE_BUDGET: usize = 80;

/// Notice appended to every description
pub const PICKUP_NOTICE: &str = "<b>PICKUP ONLY. NO SHIPPING OFFERED.</b>";

/// Shorten `text` to at most `budget` characters without splitting a word
///
/// Text within budget is returned unchanged. Longer text is cut at the last
/// space at or before the budget; when there is none, it is cut at the budget.
/// Counts characters, not bytes.
pub fn shorten(text: &str, budget: usize) -> String {
    let Some((cut, next)) = text.char_indices().nth(budget) else {
        return text.to_string();
    };
    let head = &text[..cut];

    // The budget ends exactly on a word boundary
    if next == ' ' {
        return head.trim().to_string();
    }

    match head.rfind(' ') {
        Some(space) => head[..space].trim().to_string(),
        None => head.trim().to_string(),
    }
}

/// Cut to at most `budget` characters
fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// Dash suffix encoding how many times an item has been listed
fn relist_suffix(auction_count: Option<i64>) -> &'static str {
    match auction_count {
        Some(n) if n >= 4 => "",
        Some(3) => " ---",
        Some(2) => " --",
        _ => " -",
    }
}

/// `MSRP: $<msrp><dashes>`, optionally followed by ` NOTES: <notes>`, within
/// [`SUBTITLE_BUDGET`] characters
pub fn format_subtitle(auction_count: Option<i64>, msrp: &str, notes: Option<&str>) -> String {
    let mut subtitle = format!("MSRP: ${}{}", msrp.trim(), relist_suffix(auction_count));
    if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
        subtitle.push_str(" NOTES: ");
        subtitle.push_str(notes);
    }
    truncate_chars(&subtitle, SUBTITLE_BUDGET).trim_end().to_string()
}

/// `<b>label</b>: value<br>` for each non-blank value, then the pickup notice
pub fn describe(fragments: &[(&str, Option<&str>)]) -> String {
    let mut html = String::new();
    for (label, value) in fragments {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            html.push_str(&format!("<b>{label}</b>: {value}<br>"));
        }
    }
    html.push_str(PICKUP_NOTICE);
    html
}
