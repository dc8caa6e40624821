use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use sha2::{Digest as _, Sha256};
use tokio::sync::OnceCell;
use url::Url;

use crate::error::LoadError;
use crate::formats::{
    Chapter, Course, CourseStats, FlatNode, NodeKind, Part, SearchResult, SearchResultKind,
    Section, SectionRef,
};
use crate::text;

pub const MAX_FLATTENED_TAKEAWAYS: usize = 5;
pub const MAX_SECTION_DEPTH: usize = 64;
pub const ROOT_NODE_ID: &str = "root";
pub const ROOT_COLOR: &str = "#2c3e50";
const DEFAULT_PART_COLOR: &str = "#7f8c8d";
const CONTEXT_BEFORE: usize = 50;
const CONTEXT_AFTER: usize = 100;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Human readable location used in logs and errors.
    fn location(&self) -> String;
    async fn fetch(&self) -> Result<Vec<u8>, LoadError>;
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContentSource for FileSource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<Vec<u8>, LoadError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|err| LoadError::Transport {
                location: self.location(),
                message: err.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpSource {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build course http client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ContentSource for HttpSource {
    fn location(&self) -> String {
        self.url.to_string()
    }

    async fn fetch(&self) -> Result<Vec<u8>, LoadError> {
        let transport = |err: reqwest::Error| LoadError::Transport {
            location: self.location(),
            message: err.to_string(),
        };

        let resp = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::USER_AGENT, "coursemap/0.1")
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(LoadError::Status {
                location: self.location(),
                status: resp.status().as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(transport)?;
        Ok(body.to_vec())
    }
}

/// Picks an HTTP source for `http(s)://` locations and a file source otherwise.
pub fn source_for(location: &str) -> anyhow::Result<Arc<dyn ContentSource>> {
    let location = location.trim();
    if location.is_empty() {
        anyhow::bail!("course location is empty");
    }
    if let Ok(url) = Url::parse(location)
        && matches!(url.scheme(), "http" | "https")
    {
        return Ok(Arc::new(HttpSource::new(url)?));
    }
    Ok(Arc::new(FileSource::new(location)))
}

#[derive(Debug, Clone)]
struct LoadedCourse {
    course: Arc<Course>,
    fingerprint: String,
}

/// Owns the course document. The document is fetched at most once; every caller of
/// [`ContentStore::load`] shares the same in-flight fetch and the same outcome.
pub struct ContentStore {
    source: Option<Arc<dyn ContentSource>>,
    loaded: OnceCell<Result<LoadedCourse, LoadError>>,
}

impl ContentStore {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self {
            source: Some(source),
            loaded: OnceCell::new(),
        }
    }

    pub fn from_course(course: Course) -> Result<Self, LoadError> {
        validate(&course)?;
        let bytes = serde_json::to_vec(&course).map_err(|err| LoadError::Parse(err.to_string()))?;
        let loaded = LoadedCourse {
            course: Arc::new(course),
            fingerprint: fingerprint(&bytes),
        };
        Ok(Self {
            source: None,
            loaded: OnceCell::new_with(Some(Ok(loaded))),
        })
    }

    pub fn location(&self) -> String {
        self.source
            .as_ref()
            .map_or_else(|| "<memory>".to_owned(), |source| source.location())
    }

    pub async fn load(&self) -> Result<Arc<Course>, LoadError> {
        let loaded = self
            .loaded
            .get_or_init(|| async { self.fetch_and_parse().await })
            .await;
        loaded
            .as_ref()
            .map(|loaded| Arc::clone(&loaded.course))
            .map_err(Clone::clone)
    }

    /// The loaded course, if a load already completed successfully.
    pub fn loaded(&self) -> Option<Arc<Course>> {
        match self.loaded.get() {
            Some(Ok(loaded)) => Some(Arc::clone(&loaded.course)),
            _ => None,
        }
    }

    /// Hex SHA-256 of the fetched document.
    pub fn fingerprint(&self) -> Option<&str> {
        match self.loaded.get() {
            Some(Ok(loaded)) => Some(loaded.fingerprint.as_str()),
            _ => None,
        }
    }

    async fn fetch_and_parse(&self) -> Result<LoadedCourse, LoadError> {
        let Some(source) = &self.source else {
            return Err(LoadError::Invalid("no content source configured".to_owned()));
        };
        let location = source.location();
        tracing::info!(location = %location, "loading course document");

        let result = fetch_course(source.as_ref()).await;

        match &result {
            Ok(loaded) => tracing::info!(
                location = %location,
                parts = loaded.course.parts.len(),
                chapters = loaded.course.chapters.len(),
                fingerprint = %loaded.fingerprint,
                "course document loaded"
            ),
            Err(err) => tracing::warn!(location = %location, error = %err, "course load failed"),
        }
        result
    }
}

async fn fetch_course(source: &dyn ContentSource) -> Result<LoadedCourse, LoadError> {
    let bytes = source.fetch().await?;
    let course = parse_course(&bytes)?;
    Ok(LoadedCourse {
        course: Arc::new(course),
        fingerprint: fingerprint(&bytes),
    })
}

pub fn parse_course(bytes: &[u8]) -> Result<Course, LoadError> {
    let course: Course =
        serde_json::from_slice(bytes).map_err(|err| LoadError::Parse(err.to_string()))?;
    validate(&course)?;
    Ok(course)
}

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn validate(course: &Course) -> Result<(), LoadError> {
    let mut ids = HashSet::new();
    for chapter in &course.chapters {
        if !ids.insert(chapter.id) {
            return Err(LoadError::Invalid(format!(
                "duplicate chapter id {}",
                chapter.id
            )));
        }
        let depth = section_depth(&chapter.sections);
        if depth > MAX_SECTION_DEPTH {
            return Err(LoadError::Invalid(format!(
                "chapter {} nests sections {depth} levels deep (limit {MAX_SECTION_DEPTH})",
                chapter.id
            )));
        }
    }

    let mut owner: HashMap<u32, u32> = HashMap::new();
    for part in &course.parts {
        for chapter_id in &part.chapters {
            if !ids.contains(chapter_id) {
                tracing::warn!(part = part.id, chapter_id, "part references unknown chapter");
                continue;
            }
            if let Some(previous) = owner.insert(*chapter_id, part.id) {
                return Err(LoadError::Invalid(format!(
                    "chapter {chapter_id} is listed by part {previous} and part {}",
                    part.id
                )));
            }
        }
    }

    for chapter in &course.chapters {
        if !owner.contains_key(&chapter.id) {
            tracing::warn!(chapter_id = chapter.id, "chapter is not listed by any part");
        }
    }

    Ok(())
}

fn section_depth(sections: &[Section]) -> usize {
    let mut deepest = 0;
    let mut stack = sections.iter().map(|s| (1usize, s)).collect::<Vec<_>>();
    while let Some((depth, section)) = stack.pop() {
        deepest = deepest.max(depth);
        if depth > MAX_SECTION_DEPTH {
            break;
        }
        stack.extend(section.subsections.iter().map(|s| (depth + 1, s)));
    }
    deepest
}

/// Pre-order walk over a section tree, yielding each section with its path.
pub struct SectionWalk<'a> {
    stack: Vec<(SectionRef, &'a Section)>,
}

pub fn walk_sections(sections: &[Section]) -> SectionWalk<'_> {
    let stack = sections
        .iter()
        .enumerate()
        .rev()
        .map(|(i, section)| (SectionRef::root(i), section))
        .collect();
    SectionWalk { stack }
}

impl<'a> Iterator for SectionWalk<'a> {
    type Item = (SectionRef, &'a Section);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, section) = self.stack.pop()?;
        for (i, child) in section.subsections.iter().enumerate().rev() {
            self.stack.push((path.child(i), child));
        }
        Some((path, section))
    }
}

pub fn part_node_id(part_id: u32) -> String {
    format!("part-{part_id}")
}

pub fn chapter_node_id(chapter_id: u32) -> String {
    format!("chapter-{chapter_id}")
}

pub fn takeaway_node_id(chapter_id: u32, index: usize) -> String {
    format!("chapter-{chapter_id}-takeaway-{index}")
}

impl Course {
    pub fn chapter(&self, id: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn part(&self, id: u32) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == id)
    }

    /// Chapters of a part in the part's declared order. Ids that do not resolve are
    /// dropped.
    pub fn chapters_for_part(&self, part_id: u32) -> Vec<&Chapter> {
        let Some(part) = self.part(part_id) else {
            return Vec::new();
        };
        part.chapters
            .iter()
            .filter_map(|id| self.chapter(*id))
            .collect()
    }

    pub fn part_for_chapter(&self, chapter_id: u32) -> Option<&Part> {
        self.parts
            .iter()
            .find(|p| p.chapters.contains(&chapter_id))
    }

    pub fn section_at(&self, chapter_id: u32, section: &SectionRef) -> Option<&Section> {
        let chapter = self.chapter(chapter_id)?;
        let (first, rest) = section.0.split_first()?;
        let mut current = chapter.sections.get(*first)?;
        for index in rest {
            current = current.subsections.get(*index)?;
        }
        Some(current)
    }

    /// Case-insensitive substring search over every text field of every chapter.
    ///
    /// A chapter contributes one result per matching field. An empty or missing query
    /// matches nothing.
    pub fn search<'q>(&self, query: impl Into<Option<&'q str>>) -> Vec<SearchResult> {
        let Some(query) = query.into().map(str::trim).filter(|q| !q.is_empty()) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for chapter in &self.chapters {
            let mut hits = Hits {
                chapter,
                query,
                out: &mut results,
            };
            hits.field(SearchResultKind::Chapter, &chapter.title, None, None);
            if let Some(overview) = &chapter.overview {
                hits.field(SearchResultKind::Overview, overview, None, None);
            }
            for (index, takeaway) in chapter.key_takeaways.iter().enumerate() {
                hits.field(SearchResultKind::Takeaway, takeaway, None, Some(index));
            }
            for (path, section) in walk_sections(&chapter.sections) {
                hits.field(SearchResultKind::Section, &section.title, Some(&path), None);
                if let Some(content) = &section.content {
                    hits.field(SearchResultKind::Content, content, Some(&path), None);
                }
                for concept in &section.concepts {
                    hits.field(SearchResultKind::Concept, &concept.name, Some(&path), None);
                    hits.field(
                        SearchResultKind::Definition,
                        &concept.definition,
                        Some(&path),
                        None,
                    );
                }
            }
        }

        tracing::debug!(query, results = results.len(), "search");
        results
    }

    /// Parent-linked node list for the mind map: root, then each part followed by its
    /// chapters (in the part's order) and each chapter's first takeaways.
    pub fn flatten(&self) -> Vec<FlatNode> {
        let root_label = if self.course_title.trim().is_empty() {
            "Course".to_owned()
        } else {
            self.course_title.clone()
        };
        let mut nodes = vec![FlatNode {
            id: ROOT_NODE_ID.to_owned(),
            label: root_label,
            kind: NodeKind::Root,
            level: 0,
            parent: None,
            color: ROOT_COLOR.to_owned(),
            chapter_id: None,
            takeaway_index: None,
        }];

        for part in &self.parts {
            let part_id = part_node_id(part.id);
            let color = if part.color.trim().is_empty() {
                DEFAULT_PART_COLOR.to_owned()
            } else {
                part.color.clone()
            };
            nodes.push(FlatNode {
                id: part_id.clone(),
                label: part.title.clone(),
                kind: NodeKind::Part,
                level: 1,
                parent: Some(ROOT_NODE_ID.to_owned()),
                color: color.clone(),
                chapter_id: None,
                takeaway_index: None,
            });

            for chapter in self.chapters_for_part(part.id) {
                let chapter_id = chapter_node_id(chapter.id);
                nodes.push(FlatNode {
                    id: chapter_id.clone(),
                    label: chapter.title.clone(),
                    kind: NodeKind::Chapter,
                    level: 2,
                    parent: Some(part_id.clone()),
                    color: color.clone(),
                    chapter_id: Some(chapter.id),
                    takeaway_index: None,
                });
                for (index, takeaway) in chapter
                    .key_takeaways
                    .iter()
                    .take(MAX_FLATTENED_TAKEAWAYS)
                    .enumerate()
                {
                    nodes.push(FlatNode {
                        id: takeaway_node_id(chapter.id, index),
                        label: takeaway.clone(),
                        kind: NodeKind::Takeaway,
                        level: 3,
                        parent: Some(chapter_id.clone()),
                        color: color.clone(),
                        chapter_id: Some(chapter.id),
                        takeaway_index: Some(index),
                    });
                }
            }
        }

        nodes
    }

    /// Key takeaways plus concepts across every chapter.
    pub fn count_concepts(&self) -> usize {
        self.chapters
            .iter()
            .map(|chapter| {
                let concepts = walk_sections(&chapter.sections)
                    .map(|(_, section)| section.concepts.len())
                    .sum::<usize>();
                chapter.key_takeaways.len() + concepts
            })
            .sum()
    }

    pub fn stats(&self) -> CourseStats {
        CourseStats {
            parts: self.parts.len(),
            chapters: self.chapters.len(),
            sections: self
                .chapters
                .iter()
                .map(|c| walk_sections(&c.sections).count())
                .sum(),
            concepts: self.count_concepts(),
            pages: self.chapters.iter().map(|c| u64::from(c.total_pages)).sum(),
        }
    }
}

struct Hits<'a, 'q> {
    chapter: &'a Chapter,
    query: &'q str,
    out: &'a mut Vec<SearchResult>,
}

impl Hits<'_, '_> {
    fn field(
        &mut self,
        kind: SearchResultKind,
        text: &str,
        section: Option<&SectionRef>,
        takeaway: Option<usize>,
    ) {
        let Some(hit) = text::find_ignore_case(text, self.query) else {
            return;
        };
        let context = match kind {
            SearchResultKind::Overview
            | SearchResultKind::Takeaway
            | SearchResultKind::Content
            | SearchResultKind::Definition => {
                text::snippet(text, hit, CONTEXT_BEFORE, CONTEXT_AFTER)
            }
            SearchResultKind::Chapter | SearchResultKind::Section | SearchResultKind::Concept => {
                text.to_owned()
            }
        };
        self.out.push(SearchResult {
            kind,
            chapter_id: self.chapter.id,
            chapter_title: self.chapter.title.clone(),
            label: text.to_owned(),
            context,
            section: section.cloned(),
            takeaway,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::fixtures::{COURSE_JSON, minimal_course, sample_course};

    struct CountingSource {
        body: Result<Vec<u8>, LoadError>,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ContentSource for CountingSource {
        fn location(&self) -> String {
            "counting".to_owned()
        }

        async fn fetch(&self) -> Result<Vec<u8>, LoadError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.body.clone()
        }
    }

    fn counting(body: Result<Vec<u8>, LoadError>) -> (ContentStore, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            body,
            fetches: Arc::clone(&fetches),
        };
        (ContentStore::new(Arc::new(source)), fetches)
    }

    #[test]
    fn flatten_minimal_course_matches_expected_order() {
        let course = minimal_course();
        let ids = course
            .flatten()
            .into_iter()
            .map(|n| n.id)
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                "root",
                "part-1",
                "chapter-1",
                "chapter-1-takeaway-0",
                "chapter-1-takeaway-1",
                "chapter-1-takeaway-2",
                "chapter-2",
            ]
        );
    }

    #[test]
    fn flatten_follows_part_order_and_caps_takeaways() {
        let course = sample_course();
        let nodes = course.flatten();

        let parts = nodes.iter().filter(|n| n.kind == NodeKind::Part).count();
        let chapters = nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Chapter)
            .map(|n| n.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(parts, 2);
        assert_eq!(chapters, vec!["chapter-1", "chapter-2", "chapter-4", "chapter-3"]);

        for chapter in &course.chapters {
            let takeaways = nodes
                .iter()
                .filter(|n| n.kind == NodeKind::Takeaway && n.chapter_id == Some(chapter.id))
                .count();
            assert_eq!(takeaways, chapter.key_takeaways.len().min(MAX_FLATTENED_TAKEAWAYS));
        }

        let ids = nodes.iter().map(|n| n.id.as_str()).collect::<HashSet<_>>();
        assert_eq!(ids.len(), nodes.len());
        for node in nodes.iter().filter(|n| n.kind != NodeKind::Root) {
            let parent = node.parent.as_deref().expect("non-root node has a parent");
            assert!(ids.contains(parent), "dangling parent {parent} for {}", node.id);
        }

        assert_eq!(course.flatten(), nodes);
    }

    #[test]
    fn flatten_colors_chapters_with_their_part() {
        let nodes = sample_course().flatten();
        let chapter3 = nodes
            .iter()
            .find(|n| n.id == "chapter-3")
            .expect("chapter-3 node");
        assert_eq!(chapter3.color, "#3498db");
        assert_eq!(chapter3.parent.as_deref(), Some("part-2"));
        assert_eq!(chapter3.level, 2);
    }

    #[test]
    fn lookups_return_none_when_missing() {
        let course = sample_course();
        assert_eq!(course.chapter(3).map(|c| c.title.as_str()), Some("Learning"));
        assert!(course.chapter(42).is_none());
        assert!(course.part(9).is_none());
        assert!(course.chapters_for_part(9).is_empty());
        assert_eq!(course.part_for_chapter(4).map(|p| p.id), Some(2));
    }

    #[test]
    fn chapters_for_part_drops_unresolved_ids() {
        let course = sample_course();
        let ids = course
            .chapters_for_part(2)
            .iter()
            .map(|c| c.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn section_at_resolves_nested_paths() {
        let course = sample_course();
        let nested = course
            .section_at(1, &SectionRef(vec![0, 0]))
            .expect("nested section");
        assert_eq!(nested.title, "Early Schools");
        assert!(course.section_at(1, &SectionRef(vec![0, 5])).is_none());
        assert!(course.section_at(1, &SectionRef(Vec::new())).is_none());
        assert!(course.section_at(7, &SectionRef::root(0)).is_none());
    }

    #[test]
    fn search_empty_or_missing_query_returns_nothing() {
        let course = sample_course();
        assert!(course.search("").is_empty());
        assert!(course.search("   ").is_empty());
        assert!(course.search(None).is_empty());
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let course = sample_course();
        let lower = course.search("conditioning");
        let upper = course.search("CONDITIONING");
        assert_eq!(lower, upper);
        assert!(!lower.is_empty());
        assert!(lower.iter().all(|r| r.chapter_id == 3));
    }

    #[test]
    fn search_overview_returns_bounded_context() {
        let course = sample_course();
        let results = course.search("motivation");
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.kind, SearchResultKind::Overview);
        assert_eq!(result.chapter_id, 1);
        assert!(result.context.starts_with("..."));
        assert!(result.context.ends_with("..."));
        assert!(result.context.contains("driven by motivation and reward"));
        assert!(result.context.chars().count() <= 170);
    }

    #[test]
    fn search_reaches_nested_sections_and_concepts() {
        let course = sample_course();
        let results = course.search("introspection");
        let kinds = results.iter().map(|r| r.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![SearchResultKind::Content, SearchResultKind::Concept]
        );
        assert!(results.iter().all(|r| r.section == Some(SectionRef(vec![0, 0]))));
    }

    #[test]
    fn search_reports_one_result_per_matching_field() {
        let course = sample_course();
        let results = course.search("behavior");
        let chapter1 = results.iter().filter(|r| r.chapter_id == 1).count();
        assert!(chapter1 >= 4, "expected several chapter 1 hits, got {chapter1}");
        let takeaway = results
            .iter()
            .find(|r| r.kind == SearchResultKind::Takeaway)
            .expect("takeaway hit");
        assert_eq!(takeaway.takeaway, Some(0));
    }

    #[test]
    fn count_concepts_sums_takeaways_and_concepts() {
        let course = sample_course();
        assert_eq!(course.count_concepts(), 11 + 4);
        let stats = course.stats();
        assert_eq!(stats.parts, 2);
        assert_eq!(stats.chapters, 4);
        assert_eq!(stats.sections, 3);
        assert_eq!(stats.pages, 94);
    }

    #[test]
    fn walk_sections_is_pre_order() {
        let course = sample_course();
        let chapter = course.chapter(1).expect("chapter 1");
        let titles = walk_sections(&chapter.sections)
            .map(|(path, s)| format!("{path}:{}", s.title))
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["0:Defining the Field", "0.0:Early Schools"]);
    }

    #[test]
    fn parse_rejects_duplicate_chapter_ids() {
        let json = r#"{"parts": [], "chapters": [
            {"chapter": 1, "title": "A"}, {"chapter": 1, "title": "B"}
        ]}"#;
        let err = parse_course(json.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::Invalid(msg) if msg.contains("duplicate chapter id 1")));
    }

    #[test]
    fn parse_rejects_chapter_shared_by_two_parts() {
        let json = r#"{"parts": [
            {"part": 1, "title": "P1", "chapters": [1]},
            {"part": 2, "title": "P2", "chapters": [1]}
        ], "chapters": [{"chapter": 1, "title": "A"}]}"#;
        assert!(matches!(
            parse_course(json.as_bytes()),
            Err(LoadError::Invalid(_))
        ));
    }

    #[test]
    fn parse_rejects_runaway_section_nesting() {
        let mut section = Section {
            title: "leaf".to_owned(),
            content: None,
            concepts: Vec::new(),
            subsections: Vec::new(),
        };
        for depth in 0..MAX_SECTION_DEPTH {
            section = Section {
                title: format!("level {depth}"),
                content: None,
                concepts: Vec::new(),
                subsections: vec![section],
            };
        }
        let course = Course {
            chapters: vec![Chapter {
                id: 1,
                title: "Deep".to_owned(),
                overview: None,
                key_takeaways: Vec::new(),
                sections: vec![section],
                total_pages: 0,
            }],
            ..Course::default()
        };
        assert!(matches!(
            ContentStore::from_course(course),
            Err(LoadError::Invalid(msg)) if msg.contains("levels deep")
        ));
    }

    #[test]
    fn parse_treats_null_optional_fields_as_empty() -> anyhow::Result<()> {
        let json = r#"{"courseTitle": null, "parts": [
            {"part": 1, "title": "P1", "color": null, "chapters": [1]}
        ], "chapters": [{
            "chapter": 1, "title": "A", "overview": null,
            "keyTakeaways": null, "sections": [
                {"title": "S", "content": null, "concepts": [
                    {"name": "C", "definition": null, "examples": null}
                ], "subsections": null}
            ], "totalPages": null
        }]}"#;
        let course = parse_course(json.as_bytes())?;
        assert_eq!(course.course_title, "");
        assert_eq!(course.parts[0].color, "");
        let chapter = &course.chapters[0];
        assert!(chapter.key_takeaways.is_empty());
        assert_eq!(chapter.total_pages, 0);
        assert!(chapter.sections[0].subsections.is_empty());
        assert_eq!(chapter.sections[0].concepts[0].definition, "");
        assert_eq!(course.count_concepts(), 1);
        Ok(())
    }

    #[test]
    fn parse_reports_malformed_json() {
        assert!(matches!(
            parse_course(b"{not json"),
            Err(LoadError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_fetch() -> anyhow::Result<()> {
        let (store, fetches) = counting(Ok(COURSE_JSON.as_bytes().to_vec()));

        let (a, b) = tokio::join!(store.load(), store.load());
        let (a, b) = (a?, b?);
        assert!(Arc::ptr_eq(&a, &b));
        store.load().await?;

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(store.loaded().map(|c| c.chapters.len()), Some(4));
        assert_eq!(store.fingerprint().map(str::len), Some(64));
        Ok(())
    }

    #[tokio::test]
    async fn failed_load_is_not_retried() {
        let failure = LoadError::Status {
            location: "counting".to_owned(),
            status: 503,
        };
        let (store, fetches) = counting(Err(failure.clone()));

        assert_eq!(store.load().await.unwrap_err(), failure);
        assert_eq!(store.load().await.unwrap_err(), failure);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(store.loaded().is_none());
    }

    #[tokio::test]
    async fn file_source_reports_missing_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ContentStore::new(source_for(
            &dir.path().join("missing.json").to_string_lossy(),
        )?);
        assert!(matches!(
            store.load().await,
            Err(LoadError::Transport { .. })
        ));
        Ok(())
    }

    #[test]
    fn source_for_distinguishes_urls_from_paths() -> anyhow::Result<()> {
        assert_eq!(
            source_for("https://example.com/course.json")?.location(),
            "https://example.com/course.json"
        );
        assert_eq!(source_for("data/course.json")?.location(), "data/course.json");
        assert!(source_for("  ").is_err());
        Ok(())
    }
}
