use std::fmt::Write as _;

use pulldown_cmark::{Event, Options, Parser};
use serde::Serialize;

use crate::error::LoadError;
use crate::events::ContentSelection;
use crate::formats::{Course, Section, SectionRef};
use crate::search::escape_html;

/// What the content pane shows for one selection.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPane {
    Chapter {
        chapter_id: u32,
        title: String,
        part: Option<String>,
        color: Option<String>,
        overview: Option<String>,
        key_takeaways: Vec<String>,
        sections: Vec<String>,
        total_pages: u32,
    },
    Section {
        chapter_id: u32,
        chapter_title: String,
        path: SectionRef,
        section: Section,
    },
    Takeaway {
        chapter_id: u32,
        chapter_title: String,
        index: usize,
        text: String,
    },
}

impl ContentPane {
    /// `None` when the selection points at nothing in the course.
    pub fn resolve(course: &Course, selection: &ContentSelection) -> Option<Self> {
        let chapter = course.chapter(selection.chapter)?;
        if let Some(path) = &selection.section {
            let section = course.section_at(chapter.id, path)?;
            return Some(Self::Section {
                chapter_id: chapter.id,
                chapter_title: chapter.title.clone(),
                path: path.clone(),
                section: section.clone(),
            });
        }
        if let Some(index) = selection.takeaway {
            let text = chapter.key_takeaways.get(index)?;
            return Some(Self::Takeaway {
                chapter_id: chapter.id,
                chapter_title: chapter.title.clone(),
                index,
                text: text.clone(),
            });
        }

        let part = course.part_for_chapter(chapter.id);
        Some(Self::Chapter {
            chapter_id: chapter.id,
            title: chapter.title.clone(),
            part: part.map(|p| format!("Part {}: {}", p.id, p.title)),
            color: part
                .map(|p| p.color.clone())
                .filter(|color| !color.trim().is_empty()),
            overview: chapter
                .overview
                .clone()
                .filter(|overview| !overview.trim().is_empty()),
            key_takeaways: chapter.key_takeaways.clone(),
            sections: chapter.sections.iter().map(|s| s.title.clone()).collect(),
            total_pages: chapter.total_pages,
        })
    }

    pub fn chapter_id(&self) -> u32 {
        match self {
            Self::Chapter { chapter_id, .. }
            | Self::Section { chapter_id, .. }
            | Self::Takeaway { chapter_id, .. } => *chapter_id,
        }
    }

    pub fn title(&self) -> String {
        match self {
            Self::Chapter {
                chapter_id, title, ..
            } => format!("Chapter {chapter_id}: {title}"),
            Self::Section { section, .. } => section.title.clone(),
            Self::Takeaway { index, .. } => format!("Key takeaway {}", index + 1),
        }
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", self.title());
        match self {
            Self::Chapter {
                part,
                overview,
                key_takeaways,
                sections,
                total_pages,
                ..
            } => {
                let mut byline = part.clone().unwrap_or_default();
                if *total_pages > 0 {
                    if !byline.is_empty() {
                        byline.push_str(" · ");
                    }
                    let _ = write!(byline, "{total_pages} pages");
                }
                if !byline.is_empty() {
                    let _ = writeln!(out, "*{byline}*\n");
                }
                if let Some(overview) = overview {
                    let _ = writeln!(out, "{}\n", overview.trim());
                }
                if !key_takeaways.is_empty() {
                    out.push_str("## Key takeaways\n\n");
                    for takeaway in key_takeaways {
                        let _ = writeln!(out, "- {takeaway}");
                    }
                    out.push('\n');
                }
                if !sections.is_empty() {
                    out.push_str("## Sections\n\n");
                    for (i, title) in sections.iter().enumerate() {
                        let _ = writeln!(out, "{}. {title}", i + 1);
                    }
                    out.push('\n');
                }
            }
            Self::Section {
                chapter_id,
                chapter_title,
                path,
                section,
            } => {
                let _ = writeln!(out, "*Chapter {chapter_id}: {chapter_title} · §{path}*\n");
                if let Some(content) = section.content.as_deref()
                    && !content.trim().is_empty()
                {
                    let _ = writeln!(out, "{}\n", content.trim());
                }
                if !section.concepts.is_empty() {
                    out.push_str("## Concepts\n\n");
                    for concept in &section.concepts {
                        if concept.definition.trim().is_empty() {
                            let _ = writeln!(out, "- **{}**", concept.name);
                        } else {
                            let _ = writeln!(out, "- **{}**: {}", concept.name, concept.definition);
                        }
                        for example in &concept.examples {
                            let _ = writeln!(out, "  - e.g. {example}");
                        }
                    }
                    out.push('\n');
                }
                if !section.subsections.is_empty() {
                    out.push_str("## Subsections\n\n");
                    for child in &section.subsections {
                        let _ = writeln!(out, "- {}", child.title);
                    }
                    out.push('\n');
                }
            }
            Self::Takeaway {
                chapter_id,
                chapter_title,
                text,
                ..
            } => {
                let _ = writeln!(out, "*Chapter {chapter_id}: {chapter_title}*\n");
                let _ = writeln!(out, "> {text}\n");
            }
        }
        out
    }

    /// HTML for the pane. Raw HTML in the course text is escaped, never passed through.
    pub fn render_html(&self) -> String {
        markdown_to_html(&self.render_markdown())
    }
}

pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut out, parser);
    out
}

/// Full-pane error shown when the course cannot be loaded. Reloading is the only way
/// out.
pub fn render_load_error(err: &LoadError) -> String {
    format!(
        concat!(
            "<section class=\"load-error\" role=\"alert\">\n",
            "<h1>Course content could not be loaded</h1>\n",
            "<p>{}</p>\n",
            "<button type=\"button\" onclick=\"window.location.reload()\">Reload</button>\n",
            "</section>\n"
        ),
        escape_html(&err.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_course;
    use crate::formats::Concept;

    #[test]
    fn chapter_pane_lists_takeaways_and_sections() -> anyhow::Result<()> {
        let course = sample_course();
        let pane = ContentPane::resolve(&course, &ContentSelection::chapter(1))
            .ok_or_else(|| anyhow::anyhow!("chapter 1 missing"))?;
        let md = pane.render_markdown();
        assert!(md.starts_with("# Chapter 1: What Is Psychology?\n"));
        assert!(md.contains("*Part 1: Foundations · 24 pages*"));
        assert!(md.contains("## Key takeaways"));
        assert!(md.contains("1. Defining the Field"));
        Ok(())
    }

    #[test]
    fn empty_chapter_renders_title_only() -> anyhow::Result<()> {
        let course = sample_course();
        let pane = ContentPane::resolve(&course, &ContentSelection::chapter(2))
            .ok_or_else(|| anyhow::anyhow!("chapter 2 missing"))?;
        let md = pane.render_markdown();
        assert!(!md.contains("## Key takeaways"));
        assert!(!md.contains("## Sections"));
        Ok(())
    }

    #[test]
    fn unknown_targets_resolve_to_none() {
        let course = sample_course();
        assert!(ContentPane::resolve(&course, &ContentSelection::chapter(404)).is_none());
        assert!(ContentPane::resolve(&course, &ContentSelection::takeaway(4, 1)).is_none());
        assert!(
            ContentPane::resolve(&course, &ContentSelection::section(1, SectionRef(vec![0, 9])))
                .is_none()
        );
    }

    #[test]
    fn section_and_takeaway_panes() -> anyhow::Result<()> {
        let course = sample_course();
        let section = ContentPane::resolve(
            &course,
            &ContentSelection::section(1, SectionRef(vec![0, 0])),
        )
        .ok_or_else(|| anyhow::anyhow!("section missing"))?;
        assert_eq!(section.title(), "Early Schools");
        assert!(section.render_markdown().contains("§0.0"));

        let takeaway = ContentPane::resolve(&course, &ContentSelection::takeaway(3, 0))
            .ok_or_else(|| anyhow::anyhow!("takeaway missing"))?;
        assert_eq!(takeaway.chapter_id(), 3);
        assert!(takeaway.render_markdown().contains("# Key takeaway 1\n"));
        Ok(())
    }

    #[test]
    fn html_escapes_embedded_markup() {
        let pane = ContentPane::Section {
            chapter_id: 1,
            chapter_title: "Intro".to_owned(),
            path: SectionRef::root(0),
            section: Section {
                title: "Unsafe".to_owned(),
                content: Some("<script>alert(1)</script>\n\nInline <b>bold</b>".to_owned()),
                concepts: vec![Concept {
                    name: "Tag".to_owned(),
                    definition: "<img src=x onerror=alert(1)>".to_owned(),
                    examples: Vec::new(),
                }],
                subsections: Vec::new(),
            },
        };
        let html = pane.render_html();
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<b>"));
        assert!(!html.contains("<img"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("<h1>Unsafe</h1>"));
    }

    #[test]
    fn load_error_pane_offers_reload() {
        let html = render_load_error(&LoadError::Status {
            location: "https://example.test/<data>.json".to_owned(),
            status: 404,
        });
        assert!(html.contains("Reload"));
        assert!(html.contains("status 404"));
        assert!(html.contains("&lt;data&gt;"));
    }
}
