use chrono::{DateTime, NaiveDate, NaiveDateTime};
use scraper::Html;

const PREVIEW_CHARS: usize = 200;
const VISIBLE_REQUIREMENTS: usize = 3;

/// Scraped descriptions sometimes arrive as HTML fragments.
pub fn html_to_text(raw: &str) -> String {
    if !raw.contains('<') {
        return collapse_whitespace(raw);
    }
    let fragment = Html::parse_fragment(raw);
    let text: Vec<&str> = fragment.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Card preview of a job description.
pub fn description_preview(description: &str) -> String {
    let text = html_to_text(description);
    if text.is_empty() {
        return "No description available".to_string();
    }
    if text.chars().count() > PREVIEW_CHARS {
        let kept: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", kept)
    } else {
        text
    }
}

/// First few requirements, plus a "+N more" marker for the rest.
pub fn requirement_chips(requirements: &[String]) -> Vec<String> {
    let mut chips: Vec<String> = requirements
        .iter()
        .take(VISIBLE_REQUIREMENTS)
        .cloned()
        .collect();
    if requirements.len() > VISIBLE_REQUIREMENTS {
        chips.push(format!("+{} more", requirements.len() - VISIBLE_REQUIREMENTS));
    }
    chips
}

/// Renders server dates as e.g. `Mar 01, 2024`. Unparseable dates are shown as-is.
pub fn format_date(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return "Unknown".to_string();
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%b %d, %Y").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%b %d, %Y").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%b %d, %Y").to_string();
    }
    raw.to_string()
}

pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

pub fn wrap(text: &str, width: usize) -> Vec<String> {
    textwrap::wrap(text, width.max(10))
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}
