/// Remove a surrounding Markdown code fence, if the model added one.
///
/// Example: "```latex\n\\name{A}\n```" → "\\name{A}"
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    // Opening fence, possibly with a language tag.
    lines.remove(0);
    if lines.last().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Cut `text` to at most `max_chars` characters, appending "…" when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}…", text[..end].trim_end()),
        None => text.to_string(),
    }
}

/// About 60 characters of context around byte offset `pos`, on one line.
pub fn excerpt(text: &str, pos: usize) -> String {
    const RADIUS: usize = 30;
    let mut start = pos.saturating_sub(RADIUS).min(text.len());
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + RADIUS).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].split_whitespace().collect::<Vec<_>>().join(" ")
}
