use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::events::ContentSelection;
use crate::formats::{Course, SearchResult, SearchResultKind};
use crate::text;

pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_DISPLAYED_RESULTS: usize = 50;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

const MARK_OPEN: &str = "<mark>";
const MARK_CLOSE: &str = "</mark>";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchView {
    pub query: String,
    /// Number of matches before the display cap.
    pub total: usize,
    pub items: Vec<SearchItem>,
}

impl SearchView {
    pub fn truncated(&self) -> bool {
        self.total > self.items.len()
    }
}

/// One displayable result. Every `*_html` field is escaped.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchItem {
    pub kind: SearchResultKind,
    pub chapter_id: u32,
    pub chapter_title_html: String,
    pub label_html: String,
    pub context_html: String,
    pub target: ContentSelection,
}

/// Builds the result list shown to the user. At most [`MAX_DISPLAYED_RESULTS`] items
/// are kept; `total` still reports every match.
pub fn render_results(results: &[SearchResult], query: &str) -> SearchView {
    let items = results
        .iter()
        .take(MAX_DISPLAYED_RESULTS)
        .map(|result| SearchItem {
            kind: result.kind,
            chapter_id: result.chapter_id,
            chapter_title_html: escape_html(&result.chapter_title),
            label_html: highlight(&text::truncate_chars(&result.label, 120), query),
            context_html: highlight(&result.context, query),
            target: selection_for(result),
        })
        .collect();

    SearchView {
        query: query.to_owned(),
        total: results.len(),
        items,
    }
}

fn selection_for(result: &SearchResult) -> ContentSelection {
    match (&result.section, result.takeaway) {
        (Some(section), _) => ContentSelection::section(result.chapter_id, section.clone()),
        (None, Some(index)) => ContentSelection::takeaway(result.chapter_id, index),
        (None, None) => ContentSelection::chapter(result.chapter_id),
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes `raw` and wraps every case-insensitive occurrence of `query` in `<mark>`.
///
/// Matching runs against the unescaped text, so a query containing `&` or `<` still
/// lines up with what the reader sees.
pub fn highlight(raw: &str, query: &str) -> String {
    let query = query.trim();
    let mut out = String::with_capacity(raw.len() + 16);
    let mut cursor = 0usize;
    for range in text::match_ranges(raw, query) {
        out.push_str(&escape_html(&raw[cursor..range.start]));
        out.push_str(MARK_OPEN);
        out.push_str(&escape_html(&raw[range.clone()]));
        out.push_str(MARK_CLOSE);
        cursor = range.end;
    }
    out.push_str(&escape_html(&raw[cursor..]));
    out
}

/// Search over a loaded course with the interactive input policy applied.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    course: Arc<Course>,
}

impl SearchIndex {
    pub fn new(course: Arc<Course>) -> Self {
        Self { course }
    }

    /// `None` when the trimmed query is too short to search.
    pub fn query(&self, raw: &str) -> Option<SearchView> {
        let query = raw.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            return None;
        }
        let results = self.course.search(query);
        let view = render_results(&results, query);
        tracing::debug!(
            query,
            total = view.total,
            shown = view.items.len(),
            "search view"
        );
        Some(view)
    }
}

/// Runs at most one delayed task; scheduling a new one cancels the pending one.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
