// Formatting helpers for the terminal front end

use chrono::{DateTime, Local, NaiveDateTime};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const PROMPT_PREVIEW_CHARS: usize = 50;

/// Renders an ISO-8601 timestamp in local time. Offset-less values are taken
/// as already local; anything unparseable is returned unchanged.
pub fn format_timestamp(raw: &str) -> String {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return instant.with_timezone(&Local).format(DISPLAY_FORMAT).to_string();
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => naive.format(DISPLAY_FORMAT).to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Shortens long prompts for list rows.
pub fn preview_prompt(prompt: &str) -> String {
    if prompt.chars().count() > PROMPT_PREVIEW_CHARS {
        let head: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        prompt.to_string()
    }
}
