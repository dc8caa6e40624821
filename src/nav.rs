use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;

use crate::content::MAX_FLATTENED_TAKEAWAYS;
use crate::events::{AppEvent, ContentSelection, EventBus};
use crate::formats::{Course, Section, SectionRef};

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavNodeId {
    Part { part: u32 },
    Chapter { chapter: u32 },
    Section { chapter: u32, section: SectionRef },
    Takeaway { chapter: u32, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavNode {
    pub id: NavNodeId,
    pub label: String,
    pub children: Vec<NavNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavRow {
    pub depth: usize,
    pub id: NavNodeId,
    pub label: String,
    pub expandable: bool,
    pub expanded: bool,
}

/// Result of clicking a navigation item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    Toggled { expanded: bool },
    Selected(ContentSelection),
    Unknown,
}

/// Collapsible outline of the course. Expansion state lives here, not in the course.
#[derive(Debug)]
pub struct NavigationTree {
    roots: Vec<NavNode>,
    expanded: HashSet<NavNodeId>,
    bus: EventBus,
}

impl NavigationTree {
    pub fn new(course: &Arc<Course>, bus: EventBus) -> Self {
        Self {
            roots: build(course),
            expanded: HashSet::new(),
            bus,
        }
    }

    pub fn roots(&self) -> &[NavNode] {
        &self.roots
    }

    pub fn is_expanded(&self, id: &NavNodeId) -> bool {
        self.expanded.contains(id)
    }

    pub fn click(&mut self, id: &NavNodeId) -> NavOutcome {
        let Some(node) = find(&self.roots, id) else {
            tracing::debug!(?id, "click on unknown navigation item");
            return NavOutcome::Unknown;
        };
        let has_children = !node.children.is_empty();
        self.bus.emit(AppEvent::NavItemClick { item: id.clone() });

        match id {
            NavNodeId::Part { .. } => self.toggle(id),
            NavNodeId::Chapter { chapter } => {
                let has_sections = node
                    .children
                    .iter()
                    .any(|c| matches!(c.id, NavNodeId::Section { .. }));
                if has_sections && has_children {
                    self.toggle(id)
                } else {
                    self.select(ContentSelection::chapter(*chapter))
                }
            }
            NavNodeId::Section { chapter, section } => {
                self.select(ContentSelection::section(*chapter, section.clone()))
            }
            NavNodeId::Takeaway { chapter, index } => {
                self.select(ContentSelection::takeaway(*chapter, *index))
            }
        }
    }

    /// Flips one node's disclosure state. Leaves cannot be expanded.
    pub fn toggle(&mut self, id: &NavNodeId) -> NavOutcome {
        let Some(node) = find(&self.roots, id) else {
            return NavOutcome::Unknown;
        };
        if node.children.is_empty() {
            return NavOutcome::Toggled { expanded: false };
        }
        let expanded = if self.expanded.remove(id) {
            false
        } else {
            self.expanded.insert(id.clone());
            true
        };
        NavOutcome::Toggled { expanded }
    }

    pub fn expand_all(&mut self) {
        let mut stack = self.roots.iter().collect::<Vec<_>>();
        while let Some(node) = stack.pop() {
            if !node.children.is_empty() {
                self.expanded.insert(node.id.clone());
            }
            stack.extend(node.children.iter());
        }
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    /// Rows currently on screen, in display order.
    pub fn visible_rows(&self) -> Vec<NavRow> {
        let mut rows = Vec::new();
        let mut stack = self.roots.iter().rev().map(|n| (0usize, n)).collect::<Vec<_>>();
        while let Some((depth, node)) = stack.pop() {
            let expanded = self.expanded.contains(&node.id);
            rows.push(NavRow {
                depth,
                id: node.id.clone(),
                label: node.label.clone(),
                expandable: !node.children.is_empty(),
                expanded,
            });
            if expanded {
                stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
            }
        }
        rows
    }

    pub fn render_outline(&self) -> String {
        let mut out = String::new();
        for row in self.visible_rows() {
            let marker = match (row.expandable, row.expanded) {
                (true, true) => "▾",
                (true, false) => "▸",
                (false, _) => "•",
            };
            let _ = writeln!(out, "{}{marker} {}", "  ".repeat(row.depth), row.label);
        }
        out
    }

    fn select(&self, selection: ContentSelection) -> NavOutcome {
        self.bus.emit(AppEvent::Content(selection.clone()));
        NavOutcome::Selected(selection)
    }
}

fn find<'a>(nodes: &'a [NavNode], id: &NavNodeId) -> Option<&'a NavNode> {
    let mut stack = nodes.iter().collect::<Vec<_>>();
    while let Some(node) = stack.pop() {
        if &node.id == id {
            return Some(node);
        }
        stack.extend(node.children.iter());
    }
    None
}

fn build(course: &Course) -> Vec<NavNode> {
    course
        .parts
        .iter()
        .map(|part| NavNode {
            id: NavNodeId::Part { part: part.id },
            label: format!("Part {}: {}", part.id, part.title),
            children: course
                .chapters_for_part(part.id)
                .into_iter()
                .map(|chapter| {
                    let mut children = chapter
                        .sections
                        .iter()
                        .enumerate()
                        .map(|(i, s)| section_node(chapter.id, SectionRef::root(i), s))
                        .collect::<Vec<_>>();
                    children.extend(
                        chapter
                            .key_takeaways
                            .iter()
                            .take(MAX_FLATTENED_TAKEAWAYS)
                            .enumerate()
                            .map(|(index, takeaway)| NavNode {
                                id: NavNodeId::Takeaway {
                                    chapter: chapter.id,
                                    index,
                                },
                                label: takeaway.clone(),
                                children: Vec::new(),
                            }),
                    );
                    NavNode {
                        id: NavNodeId::Chapter {
                            chapter: chapter.id,
                        },
                        label: format!("{}. {}", chapter.id, chapter.title),
                        children,
                    }
                })
                .collect(),
        })
        .collect()
}

// Depth is bounded when the course is loaded.
fn section_node(chapter: u32, path: SectionRef, section: &Section) -> NavNode {
    NavNode {
        children: section
            .subsections
            .iter()
            .enumerate()
            .map(|(i, child)| section_node(chapter, path.child(i), child))
            .collect(),
        id: NavNodeId::Section {
            chapter,
            section: path,
        },
        label: section.title.clone(),
    }
}
