use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(default, deserialize_with = "null_as_default")]
    pub course_title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub course_level: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub university: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub instructor: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parts: Vec<Part>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Part {
    #[serde(rename = "part")]
    pub id: u32,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub color: String,
    /// Chapter ids in display order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub chapters: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    #[serde(rename = "chapter")]
    pub id: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_takeaways: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sections: Vec<Section>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_pages: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub concepts: Vec<Concept>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subsections: Vec<Section>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Concept {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub definition: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    pub title: String,
    pub chapter: u32,
}

/// Path of child indices from a chapter's top-level sections down to one section.
///
/// `[0, 2]` is the third subsection of the first section. Displayed and parsed
/// as `0.2`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SectionRef(pub Vec<usize>);

impl SectionRef {
    pub fn root(index: usize) -> Self {
        Self(vec![index])
    }

    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for SectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{index}")?;
        }
        Ok(())
    }
}

impl FromStr for SectionRef {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            anyhow::bail!("section reference is empty");
        }
        let path = raw
            .split('.')
            .map(|segment| {
                segment
                    .trim()
                    .parse::<usize>()
                    .map_err(|err| anyhow::anyhow!("invalid section index {segment:?}: {err}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self(path))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Part,
    Chapter,
    Takeaway,
}

/// Parent-linked record produced by flattening a course for graph rendering.
///
/// `parent` is a lookup key into the same flat list, never ownership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlatNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub takeaway_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchResultKind {
    Chapter,
    Overview,
    Takeaway,
    Section,
    Content,
    Concept,
    Definition,
}

impl SearchResultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chapter => "chapter",
            Self::Overview => "overview",
            Self::Takeaway => "takeaway",
            Self::Section => "section",
            Self::Content => "content",
            Self::Concept => "concept",
            Self::Definition => "definition",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub kind: SearchResultKind,
    pub chapter_id: u32,
    pub chapter_title: String,
    /// The field text that matched (title, takeaway, concept name, ...).
    pub label: String,
    /// Text surrounding the match.
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub takeaway: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CourseStats {
    pub parts: usize,
    pub chapters: usize,
    pub sections: usize,
    pub concepts: usize,
    pub pages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_document_uses_wire_field_names() -> anyhow::Result<()> {
        let json = r##"{
            "courseTitle": "Psychology 101",
            "courseLevel": "Intro",
            "university": "State",
            "instructor": "Dr. Lee",
            "date": "2024",
            "parts": [{"part": 1, "title": "Foundations", "color": "#e74c3c", "chapters": [1]}],
            "chapters": [{
                "chapter": 1,
                "title": "Motivation",
                "keyTakeaways": ["Drives matter"],
                "sections": [{"title": "Drive theory", "subsections": [{"title": "Homeostasis"}]}],
                "totalPages": 12
            }]
        }"##;

        let course: Course = serde_json::from_str(json)?;
        assert_eq!(course.course_title, "Psychology 101");
        assert_eq!(course.parts[0].id, 1);
        assert_eq!(course.parts[0].chapters, vec![1]);
        let chapter = &course.chapters[0];
        assert_eq!(chapter.overview, None);
        assert_eq!(chapter.key_takeaways, vec!["Drives matter"]);
        assert_eq!(chapter.sections[0].subsections[0].title, "Homeostasis");
        assert!(chapter.sections[0].concepts.is_empty());
        assert_eq!(chapter.total_pages, 12);
        Ok(())
    }

    #[test]
    fn section_ref_parses_dotted_paths() -> anyhow::Result<()> {
        let section: SectionRef = "0.2.1".parse()?;
        assert_eq!(section, SectionRef(vec![0, 2, 1]));
        assert_eq!(section.to_string(), "0.2.1");
        assert_eq!(SectionRef::root(3).child(4).to_string(), "3.4");
        assert!("".parse::<SectionRef>().is_err());
        assert!("1.x".parse::<SectionRef>().is_err());
        Ok(())
    }
}
