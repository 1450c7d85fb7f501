pub mod anthropic;
pub mod openai;
pub mod wikipedia;

/// First `max` characters of a response body, for log lines.
pub(crate) fn snippet(raw: &str, max: usize) -> String {
    raw.chars().take(max).collect()
}
