use std::collections::{HashMap, HashSet};
use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::formats::FlatNode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn length(self) -> f64 {
        self.x.hypot(self.y)
    }
}

pub type Positions = HashMap<String, Point>;

/// The part of the flattened course that is currently visible.
#[derive(Debug)]
pub struct VisibleGraph<'a> {
    nodes: Vec<&'a FlatNode>,
    ids: HashSet<&'a str>,
    children: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> VisibleGraph<'a> {
    /// `visible` indexes into `nodes` and must list parents before their children.
    pub fn new(nodes: &'a [FlatNode], visible: &[usize]) -> Self {
        let nodes = visible.iter().map(|i| &nodes[*i]).collect::<Vec<_>>();
        let ids = nodes.iter().map(|n| n.id.as_str()).collect::<HashSet<_>>();
        let mut children: HashMap<&'a str, Vec<&'a str>> = HashMap::new();
        for node in &nodes {
            if let Some(parent) = node.parent.as_deref()
                && ids.contains(parent)
            {
                children.entry(parent).or_default().push(node.id.as_str());
            }
        }
        Self {
            nodes,
            ids,
            children,
        }
    }

    pub fn nodes(&self) -> &[&'a FlatNode] {
        &self.nodes
    }

    pub fn children(&self, id: &str) -> &[&'a str] {
        self.children.get(id).map_or(&[], Vec::as_slice)
    }

    /// Visible nodes whose parent is not visible (normally just the root).
    pub fn roots(&self) -> impl Iterator<Item = &'a FlatNode> + '_ {
        self.nodes.iter().copied().filter(|node| {
            node.parent
                .as_deref()
                .is_none_or(|parent| !self.ids.contains(parent))
        })
    }

    /// `(parent, child)` pairs between visible nodes.
    pub fn edges(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.nodes.iter().filter_map(|node| {
            let parent = node.parent.as_deref()?;
            self.ids
                .contains(parent)
                .then_some((parent, node.id.as_str()))
        })
    }
}

pub trait LayoutStrategy: Send {
    fn name(&self) -> &'static str;

    /// Computes positions for every visible node. `previous` holds the positions from
    /// the last layout so incremental strategies can keep nodes where they were.
    fn layout(&mut self, graph: &VisibleGraph<'_>, previous: &Positions) -> Positions;

    /// Advances the layout by one frame; `true` once nothing moves any more.
    fn step(&mut self, _graph: &VisibleGraph<'_>, _positions: &mut Positions) -> bool {
        true
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// Fixed levels, parents centred over their children.
    #[default]
    Hierarchical,
    /// Force-directed simulation.
    Force,
    /// Evenly spaced rows, one per level.
    Tree,
}

impl LayoutKind {
    pub fn strategy(self) -> Box<dyn LayoutStrategy> {
        match self {
            Self::Hierarchical => Box::new(HierarchicalLayout::default()),
            Self::Force => Box::new(ForceLayout::default()),
            Self::Tree => Box::new(TreeLayout::default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HierarchicalLayout {
    pub level_gap: f64,
    pub sibling_gap: f64,
}

impl Default for HierarchicalLayout {
    fn default() -> Self {
        Self {
            level_gap: 140.0,
            sibling_gap: 180.0,
        }
    }
}

impl HierarchicalLayout {
    // Leaves take consecutive slots; a parent sits midway over its first and last child.
    fn place(
        &self,
        graph: &VisibleGraph<'_>,
        id: &str,
        depth: usize,
        next_slot: &mut f64,
        out: &mut Positions,
    ) -> f64 {
        let children = graph.children(id);
        let x = if children.is_empty() {
            let x = *next_slot * self.sibling_gap;
            *next_slot += 1.0;
            x
        } else {
            let xs = children
                .iter()
                .map(|child| self.place(graph, child, depth + 1, next_slot, out))
                .collect::<Vec<_>>();
            (xs[0] + xs[xs.len() - 1]) / 2.0
        };
        out.insert(id.to_owned(), Point::new(x, depth as f64 * self.level_gap));
        x
    }
}

impl LayoutStrategy for HierarchicalLayout {
    fn name(&self) -> &'static str {
        "hierarchical"
    }

    fn layout(&mut self, graph: &VisibleGraph<'_>, _previous: &Positions) -> Positions {
        let mut out = Positions::new();
        let mut next_slot = 0.0;
        let roots = graph.roots().collect::<Vec<_>>();
        for root in &roots {
            self.place(graph, &root.id, 0, &mut next_slot, &mut out);
        }
        if let Some(anchor) = roots.first().and_then(|root| out.get(&root.id).copied()) {
            for point in out.values_mut() {
                point.x -= anchor.x;
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct TreeLayout {
    pub row_height: f64,
    pub node_spacing: f64,
}

impl Default for TreeLayout {
    fn default() -> Self {
        Self {
            row_height: 120.0,
            node_spacing: 160.0,
        }
    }
}

impl LayoutStrategy for TreeLayout {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn layout(&mut self, graph: &VisibleGraph<'_>, _previous: &Positions) -> Positions {
        let mut rows: Vec<Vec<&str>> = Vec::new();
        for node in graph.nodes() {
            let level = usize::from(node.level);
            if rows.len() <= level {
                rows.resize_with(level + 1, Vec::new);
            }
            rows[level].push(node.id.as_str());
        }

        let mut out = Positions::new();
        for (level, row) in rows.iter().enumerate() {
            let offset = (row.len().saturating_sub(1)) as f64 / 2.0;
            for (i, id) in row.iter().enumerate() {
                out.insert(
                    (*id).to_owned(),
                    Point::new(
                        (i as f64 - offset) * self.node_spacing,
                        level as f64 * self.row_height,
                    ),
                );
            }
        }
        out
    }
}

/// Spring-electrical simulation. Nodes repel each other, edges pull towards
/// `link_distance`, the root stays pinned at the origin.
#[derive(Debug, Clone)]
pub struct ForceLayout {
    pub link_distance: f64,
    pub repulsion: f64,
    pub spring: f64,
    pub gravity: f64,
    pub damping: f64,
    pub max_step: f64,
    pub settle_threshold: f64,
    velocities: HashMap<String, Point>,
}

impl Default for ForceLayout {
    fn default() -> Self {
        Self {
            link_distance: 120.0,
            repulsion: 6000.0,
            spring: 0.08,
            gravity: 0.002,
            damping: 0.8,
            max_step: 25.0,
            settle_threshold: 0.05,
            velocities: HashMap::new(),
        }
    }
}

impl ForceLayout {
    fn seed(&self, graph: &VisibleGraph<'_>, previous: &Positions) -> Positions {
        let mut out = Positions::new();
        let mut stack = graph
            .roots()
            .map(|root| (root.id.as_str(), None::<Point>))
            .collect::<Vec<_>>();

        while let Some((id, grandparent)) = stack.pop() {
            let at = previous
                .get(id)
                .copied()
                .or_else(|| out.get(id).copied())
                .unwrap_or(Point::ORIGIN);
            out.insert(id.to_owned(), at);

            let children = graph.children(id);
            let count = children.len() as f64;
            for (i, child) in children.iter().enumerate() {
                if !previous.contains_key(*child) {
                    let angle = match grandparent {
                        None => TAU * i as f64 / count,
                        Some(gp) => {
                            let away = (at.y - gp.y).atan2(at.x - gp.x);
                            let spread = PI / 2.0;
                            away - spread / 2.0 + spread * (i as f64 + 0.5) / count
                        }
                    };
                    out.insert(
                        (*child).to_owned(),
                        Point::new(
                            at.x + angle.cos() * self.link_distance,
                            at.y + angle.sin() * self.link_distance,
                        ),
                    );
                }
                stack.push((*child, Some(at)));
            }
        }
        out
    }
}

impl LayoutStrategy for ForceLayout {
    fn name(&self) -> &'static str {
        "force"
    }

    fn layout(&mut self, graph: &VisibleGraph<'_>, previous: &Positions) -> Positions {
        let positions = self.seed(graph, previous);
        self.velocities.retain(|id, _| positions.contains_key(id));
        positions
    }

    fn step(&mut self, graph: &VisibleGraph<'_>, positions: &mut Positions) -> bool {
        let ids = graph
            .nodes()
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| positions.contains_key(*id))
            .collect::<Vec<_>>();
        if ids.len() <= 1 {
            return true;
        }
        let pinned = graph.roots().map(|r| r.id.as_str()).collect::<Vec<_>>();
        let at = |id: &str| positions.get(id).copied().unwrap_or(Point::ORIGIN);

        let mut forces: HashMap<&str, Point> = ids.iter().map(|id| (*id, Point::ORIGIN)).collect();
        let mut push = |id: &str, fx: f64, fy: f64| {
            if let Some(f) = forces.get_mut(id) {
                f.x += fx;
                f.y += fy;
            }
        };

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (pa, pb) = (at(ids[i]), at(ids[j]));
                let d = Point::new(pa.x - pb.x, pa.y - pb.y);
                let dist = d.length().max(0.1);
                let magnitude = self.repulsion / (dist * dist);
                let (fx, fy) = (d.x / dist * magnitude, d.y / dist * magnitude);
                push(ids[i], fx, fy);
                push(ids[j], -fx, -fy);
            }
        }

        for (parent, child) in graph.edges() {
            let (pa, pb) = (at(parent), at(child));
            let d = Point::new(pb.x - pa.x, pb.y - pa.y);
            let len = d.length().max(0.001);
            let stretch = len - self.link_distance;
            let (fx, fy) = (
                d.x / len * stretch * self.spring,
                d.y / len * stretch * self.spring,
            );
            push(parent, fx, fy);
            push(child, -fx, -fy);
        }

        for id in &ids {
            let p = at(id);
            push(id, -p.x * self.gravity, -p.y * self.gravity);
        }

        let damping = self.damping.clamp(0.0, 1.0);
        let mut moved = 0.0f64;
        for id in &ids {
            if pinned.contains(id) {
                continue;
            }
            let f = forces.get(id).copied().unwrap_or(Point::ORIGIN);
            let v = self.velocities.entry((*id).to_owned()).or_default();
            v.x = (v.x + f.x) * damping;
            v.y = (v.y + f.y) * damping;

            let mut step = *v;
            let len = step.length();
            if len > self.max_step {
                step = Point::new(step.x / len * self.max_step, step.y / len * self.max_step);
            }
            if let Some(p) = positions.get_mut(*id) {
                p.x += step.x;
                p.y += step.y;
            }
            moved = moved.max(step.length());
        }

        moved < self.settle_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_course;

    fn all_visible(nodes: &[FlatNode]) -> Vec<usize> {
        (0..nodes.len()).collect()
    }

    fn min_pairwise_distance(positions: &Positions) -> f64 {
        let points = positions.values().copied().collect::<Vec<_>>();
        let mut best = f64::MAX;
        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                let d = Point::new(points[i].x - points[j].x, points[i].y - points[j].y);
                best = best.min(d.length());
            }
        }
        best
    }

    #[test]
    fn hierarchical_puts_children_below_and_centres_parents() {
        let nodes = sample_course().flatten();
        let visible = all_visible(&nodes);
        let graph = VisibleGraph::new(&nodes, &visible);
        let positions = HierarchicalLayout::default().layout(&graph, &Positions::new());

        assert_eq!(positions.len(), nodes.len());
        assert_eq!(positions["root"].x, 0.0);
        for node in &nodes {
            if let Some(parent) = &node.parent {
                assert!(positions[&node.id].y > positions[parent].y);
            }
        }
        assert!(min_pairwise_distance(&positions) >= 140.0);
    }

    #[test]
    fn tree_layout_spaces_rows_evenly() {
        let nodes = sample_course().flatten();
        let visible = all_visible(&nodes);
        let graph = VisibleGraph::new(&nodes, &visible);
        let positions = TreeLayout::default().layout(&graph, &Positions::new());

        assert_eq!(positions["part-1"].y, 120.0);
        assert_eq!(positions["part-1"].x, -80.0);
        assert_eq!(positions["part-2"].x, 80.0);
        assert!(min_pairwise_distance(&positions) >= 120.0);
    }

    #[test]
    fn force_layout_settles_without_overlap() {
        let nodes = sample_course().flatten();
        let visible = all_visible(&nodes);
        let graph = VisibleGraph::new(&nodes, &visible);
        let mut force = ForceLayout::default();
        let mut positions = force.layout(&graph, &Positions::new());

        let mut settled = false;
        for _ in 0..5000 {
            if force.step(&graph, &mut positions) {
                settled = true;
                break;
            }
        }
        assert!(settled);
        assert_eq!(positions["root"], Point::ORIGIN);
        assert!(min_pairwise_distance(&positions) > 20.0);
    }

    #[test]
    fn force_layout_keeps_previous_positions() {
        let nodes = sample_course().flatten();
        let visible = all_visible(&nodes);
        let graph = VisibleGraph::new(&nodes, &visible);
        let mut previous = Positions::new();
        previous.insert("part-1".to_owned(), Point::new(300.0, -40.0));

        let positions = ForceLayout::default().layout(&graph, &previous);
        assert_eq!(positions["part-1"], Point::new(300.0, -40.0));
        assert_eq!(positions.len(), nodes.len());
    }

    #[test]
    fn graph_edges_only_join_visible_nodes() {
        let nodes = sample_course().flatten();
        let visible = vec![0, 1, 2];
        let graph = VisibleGraph::new(&nodes, &visible);
        let edges = graph.edges().collect::<Vec<_>>();
        assert_eq!(edges, vec![("root", "part-1"), ("part-1", "chapter-1")]);
        assert_eq!(graph.roots().count(), 1);
    }
}
