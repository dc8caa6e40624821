pub mod export;
pub mod layout;

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::events::{AppEvent, ContentSelection, EventBus};
use crate::formats::{Course, FlatNode, NodeKind};

pub use layout::{LayoutKind, LayoutStrategy, Point, Positions, VisibleGraph};

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 4.0;
pub const FIT_MARGIN: f64 = 40.0;
pub const DEFAULT_SETTLE_TICKS: usize = 600;

pub fn node_radius(kind: NodeKind) -> f64 {
    match kind {
        NodeKind::Root => 32.0,
        NodeKind::Part => 24.0,
        NodeKind::Chapter => 18.0,
        NodeKind::Takeaway => 10.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub k: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            k: 1.0,
        }
    }
}

impl Transform {
    pub fn apply(&self, p: Point) -> Point {
        Point::new(p.x * self.k + self.x, p.y * self.k + self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Smallest box holding every `(centre, radius)` circle.
    pub fn around<I>(circles: I) -> Option<Self>
    where
        I: IntoIterator<Item = (Point, f64)>,
    {
        circles.into_iter().fold(None, |acc, (p, r)| {
            let b = Self {
                min_x: p.x - r,
                min_y: p.y - r,
                max_x: p.x + r,
                max_y: p.y + r,
            };
            Some(match acc {
                None => b,
                Some(a) => Self {
                    min_x: a.min_x.min(b.min_x),
                    min_y: a.min_y.min(b.min_y),
                    max_x: a.max_x.max(b.max_x),
                    max_y: a.max_y.max(b.max_y),
                },
            })
        })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    transform: Transform,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            transform: Transform::default(),
        }
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.transform.x += dx;
        self.transform.y += dy;
    }

    /// Zooms by `factor` keeping the screen point `anchor` fixed. Scale stays within
    /// [`MIN_SCALE`, `MAX_SCALE`].
    pub fn zoom_at(&mut self, factor: f64, anchor: Point) {
        let t = self.transform;
        let k = (t.k * factor).clamp(MIN_SCALE, MAX_SCALE);
        let ratio = k / t.k;
        self.transform = Transform {
            x: anchor.x - (anchor.x - t.x) * ratio,
            y: anchor.y - (anchor.y - t.y) * ratio,
            k,
        };
    }

    pub fn fit(&mut self, bounds: Bounds, margin: f64) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let (w, h) = (f64::from(self.width), f64::from(self.height));
        let avail_w = (w - 2.0 * margin).max(1.0);
        let avail_h = (h - 2.0 * margin).max(1.0);
        let k = (avail_w / bounds.width().max(1.0))
            .min(avail_h / bounds.height().max(1.0))
            .clamp(MIN_SCALE, MAX_SCALE);
        let cx = (bounds.min_x + bounds.max_x) / 2.0;
        let cy = (bounds.min_y + bounds.max_y) / 2.0;
        self.transform = Transform {
            x: w / 2.0 - k * cx,
            y: h / 2.0 - k * cy,
            k,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Toggled { expanded: bool },
    Selected(ContentSelection),
    Ignored,
    Unknown,
}

/// Interactive mind map over the flattened course.
///
/// The root is always expanded; a node is visible when its parent is visible and
/// expanded. Every visibility change recomputes the layout.
pub struct MindMap {
    nodes: Vec<FlatNode>,
    index: HashMap<String, usize>,
    children: HashMap<String, Vec<usize>>,
    roots: Vec<usize>,
    expanded: HashSet<String>,
    strategy: Box<dyn LayoutStrategy>,
    positions: Positions,
    viewport: Viewport,
    bus: EventBus,
}

impl MindMap {
    pub fn new(nodes: Vec<FlatNode>, strategy: Box<dyn LayoutStrategy>, bus: EventBus) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect::<HashMap<_, _>>();

        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            match node.parent.as_deref() {
                Some(parent) if index.contains_key(parent) => {
                    children.entry(parent.to_owned()).or_default().push(i);
                }
                _ => roots.push(i),
            }
        }
        let expanded = roots.iter().map(|i| nodes[*i].id.clone()).collect();

        let mut map = Self {
            nodes,
            index,
            children,
            roots,
            expanded,
            strategy,
            positions: Positions::new(),
            viewport: Viewport::new(1280, 800),
            bus,
        };
        map.relayout();
        map
    }

    pub fn from_course(course: &Course, layout: LayoutKind, bus: EventBus) -> Self {
        Self::new(course.flatten(), layout.strategy(), bus)
    }

    pub fn layout_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn nodes(&self) -> &[FlatNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&FlatNode> {
        self.index.get(id).map(|i| &self.nodes[*i])
    }

    pub fn has_children(&self, id: &str) -> bool {
        self.children.get(id).is_some_and(|c| !c.is_empty())
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    fn is_root(&self, id: &str) -> bool {
        self.index
            .get(id)
            .is_some_and(|i| self.roots.contains(i))
    }

    fn visible_indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = self.roots.clone();
        while let Some(i) = stack.pop() {
            out.push(i);
            let id = &self.nodes[i].id;
            if self.expanded.contains(id)
                && let Some(children) = self.children.get(id)
            {
                stack.extend(children.iter().copied());
            }
        }
        out.sort_unstable();
        out
    }

    /// Visible nodes in flattened order.
    pub fn visible_nodes(&self) -> Vec<&FlatNode> {
        self.visible_indices()
            .into_iter()
            .map(|i| &self.nodes[i])
            .collect()
    }

    pub fn visible_ids(&self) -> Vec<&str> {
        self.visible_nodes()
            .into_iter()
            .map(|n| n.id.as_str())
            .collect()
    }

    /// Expands or collapses a node with children. Collapsing hides the whole subtree;
    /// descendants keep their own state, so re-expanding shows what was visible
    /// before. Returns whether anything changed.
    pub fn toggle(&mut self, id: &str) -> bool {
        if !self.has_children(id) || self.is_root(id) {
            return false;
        }
        if self.expanded.contains(id) {
            self.expanded.remove(id);
            tracing::debug!(node_id = id, "collapse");
        } else {
            self.expanded.insert(id.to_owned());
            tracing::debug!(node_id = id, "expand");
        }
        self.relayout();
        true
    }

    pub fn expand_all(&mut self) {
        for (id, children) in &self.children {
            if !children.is_empty() {
                self.expanded.insert(id.clone());
            }
        }
        self.relayout();
    }

    pub fn collapse_all(&mut self) {
        self.expanded = self
            .roots
            .iter()
            .map(|i| self.nodes[*i].id.clone())
            .collect();
        self.relayout();
    }

    /// Nodes with children toggle; leaf chapters and takeaways select content.
    pub fn click(&mut self, id: &str) -> ClickOutcome {
        let Some(node) = self.node(id).cloned() else {
            return ClickOutcome::Unknown;
        };
        self.bus.emit(AppEvent::MindmapNodeClick {
            node: node.id.clone(),
        });

        if self.has_children(id) {
            if !self.toggle(id) {
                return ClickOutcome::Ignored;
            }
            return ClickOutcome::Toggled {
                expanded: self.is_expanded(id),
            };
        }

        let selection = match (node.kind, node.chapter_id, node.takeaway_index) {
            (NodeKind::Chapter, Some(chapter), _) => ContentSelection::chapter(chapter),
            (NodeKind::Takeaway, Some(chapter), Some(index)) => {
                ContentSelection::takeaway(chapter, index)
            }
            _ => return ClickOutcome::Ignored,
        };
        self.bus.emit(AppEvent::Content(selection.clone()));
        ClickOutcome::Selected(selection)
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    pub fn position(&self, id: &str) -> Option<Point> {
        self.positions.get(id).copied()
    }

    /// One animation frame of the layout. Returns `true` once the layout is at rest.
    pub fn tick(&mut self) -> bool {
        let visible = self.visible_indices();
        let graph = VisibleGraph::new(&self.nodes, &visible);
        self.strategy.step(&graph, &mut self.positions)
    }

    /// Runs frames until the layout rests or `max_ticks` is reached. Returns the
    /// number of frames run.
    pub fn settle(&mut self, max_ticks: usize) -> usize {
        for tick in 0..max_ticks {
            if self.tick() {
                return tick + 1;
            }
        }
        max_ticks
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    /// Extent of the visible nodes in layout coordinates.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::around(
            self.visible_nodes()
                .into_iter()
                .filter_map(|n| Some((self.position(&n.id)?, node_radius(n.kind)))),
        )
    }

    /// Frames every visible node inside the viewport.
    pub fn reset_view(&mut self) {
        if let Some(bounds) = self.bounds() {
            self.viewport.fit(bounds, FIT_MARGIN);
        }
    }

    fn relayout(&mut self) {
        let visible = self.visible_indices();
        let graph = VisibleGraph::new(&self.nodes, &visible);
        self.positions = self.strategy.layout(&graph, &self.positions);
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::Receiver;

    use super::*;
    use crate::fixtures::sample_course;

    fn map(kind: LayoutKind) -> (MindMap, Receiver<AppEvent>) {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        (MindMap::from_course(&sample_course(), kind, bus), rx)
    }

    fn drain(rx: &mut Receiver<AppEvent>) -> Vec<AppEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn starts_with_root_expanded() {
        let (map, _) = map(LayoutKind::Hierarchical);
        assert!(map.is_expanded("root"));
        assert_eq!(map.visible_ids(), vec!["root", "part-1", "part-2"]);
        assert_eq!(map.positions().len(), 3);
    }

    #[test]
    fn collapse_hides_entire_subtree() {
        let (mut map, _) = map(LayoutKind::Hierarchical);
        map.toggle("part-1");
        map.toggle("chapter-1");
        assert!(map.visible_ids().contains(&"chapter-1-takeaway-2"));

        map.toggle("part-1");
        let visible = map.visible_ids();
        assert_eq!(visible, vec!["root", "part-1", "part-2"]);
        assert!(map.position("chapter-1-takeaway-0").is_none());
        assert!(map.position("chapter-2").is_none());
    }

    #[test]
    fn expand_after_collapse_restores_visible_set() {
        let (mut map, _) = map(LayoutKind::Tree);
        map.toggle("part-1");
        map.toggle("chapter-1");
        let before = map
            .visible_ids()
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        assert!(before.iter().any(|id| id == "chapter-1-takeaway-0"));

        map.toggle("part-1");
        assert_eq!(map.visible_ids(), vec!["root", "part-1", "part-2"]);
        map.toggle("part-1");
        assert_eq!(map.visible_ids(), before);
    }

    #[test]
    fn root_cannot_be_collapsed() {
        let (mut map, _) = map(LayoutKind::Hierarchical);
        assert!(!map.toggle("root"));
        assert_eq!(map.click("root"), ClickOutcome::Ignored);
        assert!(map.is_expanded("root"));
    }

    #[test]
    fn click_on_parent_toggles_instead_of_selecting() {
        let (mut map, mut rx) = map(LayoutKind::Hierarchical);
        map.toggle("part-1");

        assert_eq!(
            map.click("chapter-1"),
            ClickOutcome::Toggled { expanded: true }
        );
        let names = drain(&mut rx).iter().map(AppEvent::name).collect::<Vec<_>>();
        assert_eq!(names, vec!["mindmap:nodeClick"]);
    }

    #[test]
    fn click_on_leaf_chapter_selects_it() {
        let (mut map, mut rx) = map(LayoutKind::Hierarchical);
        map.toggle("part-1");

        assert_eq!(
            map.click("chapter-2"),
            ClickOutcome::Selected(ContentSelection::chapter(2))
        );
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                AppEvent::MindmapNodeClick {
                    node: "chapter-2".to_owned()
                },
                AppEvent::Content(ContentSelection::chapter(2)),
            ]
        );
    }

    #[test]
    fn click_on_takeaway_selects_takeaway() {
        let (mut map, _) = map(LayoutKind::Hierarchical);
        map.expand_all();
        assert_eq!(
            map.click("chapter-3-takeaway-4"),
            ClickOutcome::Selected(ContentSelection::takeaway(3, 4))
        );
        assert_eq!(map.click("nope"), ClickOutcome::Unknown);
    }

    #[test]
    fn expand_all_shows_every_node_and_collapse_all_resets() {
        let (mut map, _) = map(LayoutKind::Hierarchical);
        map.expand_all();
        assert_eq!(map.visible_nodes().len(), map.nodes().len());
        assert_eq!(map.positions().len(), map.nodes().len());

        map.collapse_all();
        assert_eq!(map.visible_ids(), vec!["root", "part-1", "part-2"]);
    }

    #[test]
    fn reset_view_frames_all_visible_nodes() {
        let (mut map, _) = map(LayoutKind::Hierarchical);
        map.expand_all();
        map.resize(800, 600);
        map.viewport_mut().pan(5000.0, -300.0);
        map.reset_view();

        let t = map.viewport().transform();
        assert!(t.k >= MIN_SCALE && t.k <= MAX_SCALE);
        for node in map.visible_nodes() {
            let p = t.apply(map.position(&node.id).expect("position"));
            assert!(p.x >= FIT_MARGIN - 1e-6 && p.x <= 800.0 - FIT_MARGIN + 1e-6);
            assert!(p.y >= FIT_MARGIN - 1e-6 && p.y <= 600.0 - FIT_MARGIN + 1e-6);
        }
    }

    #[test]
    fn zoom_is_bounded_and_keeps_anchor() {
        let mut viewport = Viewport::new(400, 400);
        let anchor = Point::new(100.0, 50.0);
        let before = viewport.transform();
        viewport.zoom_at(2.0, anchor);
        let after = viewport.transform();
        let world = Point::new(
            (anchor.x - before.x) / before.k,
            (anchor.y - before.y) / before.k,
        );
        let screen = after.apply(world);
        assert!((screen.x - anchor.x).abs() < 1e-9);
        assert!((screen.y - anchor.y).abs() < 1e-9);

        for _ in 0..20 {
            viewport.zoom_at(10.0, anchor);
        }
        assert_eq!(viewport.transform().k, MAX_SCALE);
        for _ in 0..20 {
            viewport.zoom_at(0.01, anchor);
        }
        assert_eq!(viewport.transform().k, MIN_SCALE);
    }

    #[test]
    fn force_layout_relayouts_after_toggle_and_settles() {
        let (mut map, _) = map(LayoutKind::Force);
        assert_eq!(map.layout_name(), "force");
        map.toggle("part-2");
        assert!(map.position("chapter-3").is_some());
        let ticks = map.settle(5000);
        assert!(ticks < 5000);
    }
}
