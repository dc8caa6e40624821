use std::ops::Range;

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Byte ranges of every non-overlapping case-insensitive occurrence of `query` in `text`.
pub fn match_ranges(text: &str, query: &str) -> Vec<Range<usize>> {
    scan(text, query, usize::MAX)
}

pub fn find_ignore_case(text: &str, query: &str) -> Option<Range<usize>> {
    scan(text, query, 1).into_iter().next()
}

fn scan(text: &str, query: &str, limit: usize) -> Vec<Range<usize>> {
    let needle = query.chars().map(fold).collect::<Vec<_>>();
    if needle.is_empty() {
        return Vec::new();
    }
    let chars = text.char_indices().collect::<Vec<_>>();

    let mut ranges = Vec::new();
    let mut i = 0usize;
    while i + needle.len() <= chars.len() && ranges.len() < limit {
        let matched = needle
            .iter()
            .enumerate()
            .all(|(j, n)| fold(chars[i + j].1) == *n);
        if !matched {
            i += 1;
            continue;
        }
        let start = chars[i].0;
        let end = chars
            .get(i + needle.len())
            .map_or(text.len(), |(idx, _)| *idx);
        ranges.push(start..end);
        i += needle.len();
    }
    ranges
}

/// Text around `hit`: `before` characters ahead of it through `after` characters past
/// its end, wrapped in ellipses.
pub fn snippet(text: &str, hit: Range<usize>, before: usize, after: usize) -> String {
    let start = text[..hit.start]
        .char_indices()
        .rev()
        .take(before)
        .last()
        .map_or(hit.start, |(idx, _)| idx);
    let end = text[hit.end..]
        .char_indices()
        .nth(after)
        .map_or(text.len(), |(idx, _)| hit.end + idx);
    format!("...{}...", &text[start..end])
}

/// Shortens `text` to at most `max_chars` characters, ending with an ellipsis when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let kept = text
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    format!("{}…", kept.trim_end())
}
