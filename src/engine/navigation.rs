// Obstacle-aware pathfinding for level navigation.
//
// Layer 1: PolygonObstacle — static scenery polygons from the level file.
// Layer 2: NavigationGraph — visibility graph over the buffered corners of
//          every obstacle, built once per level.
//
// Path queries splice two temporary nodes into the graph, run A*, and always
// remove them again through `TemporaryNodes`, so the persistent graph is
// identical before and after every query.

use glam::Vec2;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

// ============================================================================
// CONSTANTS
// ============================================================================

const EPSILON: f32 = 1e-5;
/// Lower bound on the miter cosine when offsetting sharp corners.
const MIN_MITER_COS: f32 = 0.25;
/// Slack added to the buffer radius when testing whether a point already sits
/// inside an obstacle's buffer zone.
pub const DEFAULT_CONTAINMENT_SLACK: f32 = 5.0;

// ============================================================================
// GEOMETRY
// ============================================================================

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn from_points(points: &[Vec2]) -> Self {
        let Some(first) = points.first() else {
            return Self { min: Vec2::ZERO, max: Vec2::ZERO };
        };
        points.iter().fold(Self { min: *first, max: *first }, |bounds, p| Self {
            min: bounds.min.min(*p),
            max: bounds.max.max(*p),
        })
    }

    pub fn expanded(self, by: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(by),
            max: self.max + Vec2::splat(by),
        }
    }

    /// Strict containment; points on the edge are outside.
    pub fn contains(&self, point: Vec2) -> bool {
        point.x > self.min.x && point.x < self.max.x && point.y > self.min.y && point.y < self.max.y
    }
}

/// Signed area of the triangle (a, b, c), positive when counter-clockwise.
fn orient(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

fn straddles(x: f32, y: f32) -> bool {
    (x > EPSILON && y < -EPSILON) || (x < -EPSILON && y > EPSILON)
}

/// Proper crossing of segments ab and cd. Touching at an endpoint does not count.
fn segments_cross(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> bool {
    straddles(orient(c, d, a), orient(c, d, b)) && straddles(orient(a, b, c), orient(a, b, d))
}

pub fn closest_point_on_segment(point: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let length_squared = ab.length_squared();
    if length_squared <= EPSILON {
        return a;
    }
    let t = ((point - a).dot(ab) / length_squared).clamp(0.0, 1.0);
    a + ab * t
}

// ============================================================================
// POLYGON OBSTACLES
// ============================================================================

/// A closed scenery polygon. Winding order may be either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonObstacle {
    vertices: Vec<Vec2>,
    bounds: Aabb,
}

impl PolygonObstacle {
    pub fn new(vertices: Vec<Vec2>) -> Self {
        let bounds = Aabb::from_points(&vertices);
        Self { vertices, bounds }
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Lowest y extent, used by the ground-level occlusion test.
    pub fn lowest_y(&self) -> f32 {
        self.bounds.min.y
    }

    pub fn edges(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    fn signed_area(&self) -> f32 {
        0.5 * self.edges().map(|(a, b)| a.perp_dot(b)).sum::<f32>()
    }

    /// Even-odd ray cast. Undefined exactly on the boundary.
    pub fn contains_point(&self, point: Vec2) -> bool {
        if self.vertices.len() < 3 || !self.bounds.expanded(EPSILON).contains(point) {
            return false;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > point.y) != (b.y > point.y) {
                let x = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if point.x < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    fn crosses_segment(&self, a: Vec2, b: Vec2) -> bool {
        self.edges().any(|(c, d)| segments_cross(a, b, c, d))
    }

    /// True when the segment ab passes through the polygon or starts/ends inside it.
    pub fn intersects_segment(&self, a: Vec2, b: Vec2) -> bool {
        self.contains_point(a)
            || self.contains_point(b)
            || self.contains_point((a + b) * 0.5)
            || self.crosses_segment(a, b)
    }

    pub fn closest_boundary_point(&self, point: Vec2) -> Vec2 {
        self.edges()
            .map(|(a, b)| closest_point_on_segment(point, a, b))
            .min_by(|p, q| {
                p.distance_squared(point)
                    .partial_cmp(&q.distance_squared(point))
                    .unwrap_or(Ordering::Equal)
            })
            .unwrap_or(point)
    }

    /// Copy of this polygon with every edge pushed outward by `radius`.
    pub fn buffered(&self, radius: f32) -> Self {
        let n = self.vertices.len();
        if n < 3 || radius <= 0.0 {
            return self.clone();
        }
        let winding = if self.signed_area() >= 0.0 { 1.0 } else { -1.0 };
        let outward = |a: Vec2, b: Vec2| {
            let edge = (b - a).normalize_or_zero();
            Vec2::new(edge.y, -edge.x) * winding
        };

        let vertices = (0..n)
            .map(|i| {
                let previous = self.vertices[(i + n - 1) % n];
                let current = self.vertices[i];
                let next = self.vertices[(i + 1) % n];
                let n1 = outward(previous, current);
                let n2 = outward(current, next);
                let bisector = (n1 + n2).normalize_or_zero();
                if bisector == Vec2::ZERO {
                    return current + n1 * radius;
                }
                let miter_cos = bisector.dot(n1).max(MIN_MITER_COS);
                current + bisector * (radius / miter_cos)
            })
            .collect();
        Self::new(vertices)
    }
}

// ============================================================================
// NAVIGATION GRAPH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Buffered obstacle vertex a node was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Corner {
    obstacle: usize,
    vertex: usize,
}

#[derive(Debug, Clone)]
struct GraphNode {
    position: Vec2,
    corner: Option<Corner>,
    neighbours: Vec<NodeId>,
}

/// Visibility graph over buffered obstacle corners.
///
/// Built once at level load. Only `TemporaryNodes` mutates it afterwards and
/// it restores the original node and edge sets when dropped.
#[derive(Debug, Clone)]
pub struct NavigationGraph {
    obstacles: Vec<PolygonObstacle>,
    buffered: Vec<PolygonObstacle>,
    buffer_radius: f32,
    containment_slack: f32,
    nodes: Vec<Option<GraphNode>>,
}

impl NavigationGraph {
    pub fn new(obstacles: Vec<PolygonObstacle>, buffer_radius: f32) -> Self {
        Self::with_containment_slack(obstacles, buffer_radius, DEFAULT_CONTAINMENT_SLACK)
    }

    pub fn with_containment_slack(
        obstacles: Vec<PolygonObstacle>,
        buffer_radius: f32,
        containment_slack: f32,
    ) -> Self {
        let buffered: Vec<PolygonObstacle> =
            obstacles.iter().map(|o| o.buffered(buffer_radius)).collect();

        let mut graph = Self {
            obstacles,
            buffered,
            buffer_radius,
            containment_slack,
            nodes: Vec::new(),
        };

        // Corners swallowed by a neighbouring obstacle's buffer are unreachable.
        for (obstacle, polygon) in graph.buffered.iter().enumerate() {
            for (vertex, position) in polygon.vertices().iter().enumerate() {
                let swallowed = graph
                    .buffered
                    .iter()
                    .enumerate()
                    .any(|(other, p)| other != obstacle && p.contains_point(*position));
                if !swallowed {
                    graph.nodes.push(Some(GraphNode {
                        position: *position,
                        corner: Some(Corner { obstacle, vertex }),
                        neighbours: Vec::new(),
                    }));
                }
            }
        }

        let count = graph.nodes.len();
        for i in 0..count {
            for j in (i + 1)..count {
                let (Some(a), Some(b)) = (&graph.nodes[i], &graph.nodes[j]) else {
                    continue;
                };
                if graph.is_clear(a.position, a.corner, b.position, b.corner, &[]) {
                    graph.link(NodeId(i), NodeId(j));
                }
            }
        }

        log::debug!(
            "navigation graph: {} obstacles, {} nodes, {} edges",
            graph.obstacles.len(),
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    pub fn obstacles(&self) -> &[PolygonObstacle] {
        &self.obstacles
    }

    pub fn buffer_radius(&self) -> f32 {
        self.buffer_radius
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().flatten().map(|n| n.neighbours.len()).sum::<usize>() / 2
    }

    pub fn node_position(&self, id: NodeId) -> Option<Vec2> {
        self.node(id).map(|n| n.position)
    }

    fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Indices of obstacles whose expanded bounds contain `point`.
    pub fn obstacles_containing(&self, point: Vec2) -> Vec<usize> {
        let grow = self.buffer_radius + self.containment_slack;
        self.obstacles
            .iter()
            .enumerate()
            .filter(|(_, o)| o.bounds().expanded(grow).contains(point))
            .map(|(i, _)| i)
            .collect()
    }

    /// Shortest obstacle-avoiding route from `from` to `to`, endpoints included.
    ///
    /// Returns an empty path if either point cannot be connected to the graph
    /// or no route exists. The graph is left unchanged either way.
    pub fn find_path(&mut self, from: Vec2, to: Vec2) -> Vec<Vec2> {
        let mut query = self.temporary_nodes();
        let Some(start) = query.connect(from) else {
            log::trace!("find_path: start {from} could not be connected");
            return Vec::new();
        };
        let Some(end) = query.connect(to) else {
            log::trace!("find_path: end {to} could not be connected");
            return Vec::new();
        };
        query.shortest_path(start, end)
    }

    /// Scoped handle for splicing temporary nodes into the graph.
    pub fn temporary_nodes(&mut self) -> TemporaryNodes<'_> {
        TemporaryNodes {
            graph: self,
            inserted: Vec::new(),
        }
    }

    /// Segment visibility. Obstacles listed in `ignoring` are tested with
    /// their raw polygon instead of the buffered one.
    fn is_clear(
        &self,
        a: Vec2,
        a_corner: Option<Corner>,
        b: Vec2,
        b_corner: Option<Corner>,
        ignoring: &[usize],
    ) -> bool {
        for (index, raw) in self.obstacles.iter().enumerate() {
            let ignored = ignoring.contains(&index);
            let polygon = if ignored { raw } else { &self.buffered[index] };
            let own_a = a_corner.filter(|c| !ignored && c.obstacle == index);
            let own_b = b_corner.filter(|c| !ignored && c.obstacle == index);

            if let (Some(ca), Some(cb)) = (own_a, own_b) {
                let n = polygon.vertices().len();
                if (ca.vertex + 1) % n == cb.vertex || (cb.vertex + 1) % n == ca.vertex {
                    continue;
                }
            }

            let a_inside = own_a.is_none() && polygon.contains_point(a);
            let b_inside = own_b.is_none() && polygon.contains_point(b);
            if a_inside
                || b_inside
                || polygon.contains_point((a + b) * 0.5)
                || polygon.crosses_segment(a, b)
            {
                return false;
            }
        }
        true
    }

    fn link(&mut self, a: NodeId, b: NodeId) {
        if let Some(node) = self.nodes[a.0].as_mut() {
            node.neighbours.push(b);
        }
        if let Some(node) = self.nodes[b.0].as_mut() {
            node.neighbours.push(a);
        }
    }

    /// Insert a free-standing node and link it to every node it can see.
    /// The node is discarded again if it sees nothing.
    fn connect_node(&mut self, position: Vec2, ignoring: &[usize]) -> Option<NodeId> {
        let visible: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i), n)))
            .filter(|(_, n)| self.is_clear(position, None, n.position, n.corner, ignoring))
            .map(|(id, _)| id)
            .collect();
        if visible.is_empty() {
            return None;
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(GraphNode {
            position,
            corner: None,
            neighbours: Vec::new(),
        }));
        for other in visible {
            self.link(id, other);
        }
        Some(id)
    }

    fn remove_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        for neighbour in node.neighbours {
            if let Some(other) = self.nodes[neighbour.0].as_mut() {
                other.neighbours.retain(|n| *n != id);
            }
        }
        while matches!(self.nodes.last(), Some(None)) {
            self.nodes.pop();
        }
    }

    /// A* over the current node set. Empty if `end` is unreachable.
    fn shortest_path(&self, start: NodeId, end: NodeId) -> Vec<Vec2> {
        let (Some(start_node), Some(end_node)) = (self.node(start), self.node(end)) else {
            return Vec::new();
        };
        let goal = end_node.position;

        let mut open_set = BinaryHeap::new();
        let mut came_from: HashMap<NodeId, NodeId> = HashMap::new();
        let mut g_score: HashMap<NodeId, f32> = HashMap::new();
        let mut closed_set: HashSet<NodeId> = HashSet::new();

        g_score.insert(start, 0.0);
        open_set.push(Frontier {
            node: start,
            f_score: start_node.position.distance(goal),
        });

        while let Some(Frontier { node: current, .. }) = open_set.pop() {
            if current == end {
                let mut route = vec![current];
                let mut cursor = current;
                while let Some(previous) = came_from.get(&cursor) {
                    route.push(*previous);
                    cursor = *previous;
                }
                route.reverse();
                return route.into_iter().filter_map(|id| self.node_position(id)).collect();
            }
            if !closed_set.insert(current) {
                continue;
            }
            let Some(node) = self.node(current) else {
                continue;
            };
            let current_g = g_score.get(&current).copied().unwrap_or(f32::INFINITY);

            for &neighbour in &node.neighbours {
                if closed_set.contains(&neighbour) {
                    continue;
                }
                let Some(position) = self.node_position(neighbour) else {
                    continue;
                };
                let tentative = current_g + node.position.distance(position);
                if tentative < g_score.get(&neighbour).copied().unwrap_or(f32::INFINITY) {
                    came_from.insert(neighbour, current);
                    g_score.insert(neighbour, tentative);
                    open_set.push(Frontier {
                        node: neighbour,
                        f_score: tentative + position.distance(goal),
                    });
                }
            }
        }

        Vec::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    node: NodeId,
    f_score: f32,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed so the BinaryHeap pops the lowest f-score first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.f_score.partial_cmp(&self.f_score).unwrap_or(Ordering::Equal)
    }
}

// ============================================================================
// TEMPORARY NODES
// ============================================================================

/// Temporary nodes spliced into a `NavigationGraph` for one query.
/// Every node inserted through this handle is removed when it drops.
pub struct TemporaryNodes<'a> {
    graph: &'a mut NavigationGraph,
    inserted: Vec<NodeId>,
}

impl TemporaryNodes<'_> {
    /// Connect `point` to the graph. Only when it sees nothing are the
    /// buffers of the obstacles it sits close to ignored.
    pub fn connect(&mut self, point: Vec2) -> Option<NodeId> {
        let id = match self.graph.connect_node(point, &[]) {
            Some(id) => id,
            None => {
                let ignoring = self.graph.obstacles_containing(point);
                if ignoring.is_empty() {
                    return None;
                }
                self.graph.connect_node(point, &ignoring)?
            }
        };
        self.inserted.push(id);
        Some(id)
    }

    pub fn shortest_path(&self, start: NodeId, end: NodeId) -> Vec<Vec2> {
        self.graph.shortest_path(start, end)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

impl Drop for TemporaryNodes<'_> {
    fn drop(&mut self) {
        while let Some(id) = self.inserted.pop() {
            self.graph.remove_node(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(center: Vec2, half: f32) -> PolygonObstacle {
        PolygonObstacle::new(vec![
            center + Vec2::new(-half, -half),
            center + Vec2::new(half, -half),
            center + Vec2::new(half, half),
            center + Vec2::new(-half, half),
        ])
    }

    #[test]
    fn test_buffered_square_grows_outward() {
        let buffered = square(Vec2::ZERO, 10.0).buffered(30.0);
        let bounds = buffered.bounds();
        assert!((bounds.min.x + 40.0).abs() < 1e-3);
        assert!((bounds.max.y - 40.0).abs() < 1e-3);

        // clockwise winding must push the same way
        let clockwise = PolygonObstacle::new(square(Vec2::ZERO, 10.0).vertices().iter().rev().copied().collect());
        assert!((clockwise.buffered(30.0).bounds().max.x - 40.0).abs() < 1e-3);
    }

    #[test]
    fn test_graph_links_square_corners_along_edges_only() {
        let graph = NavigationGraph::new(vec![square(Vec2::ZERO, 10.0)], 30.0);
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_find_path_routes_around_obstacle() {
        let mut graph = NavigationGraph::new(vec![square(Vec2::ZERO, 10.0)], 30.0);
        let from = Vec2::new(-100.0, 0.0);
        let to = Vec2::new(100.0, 0.0);
        let path = graph.find_path(from, to);

        assert_eq!(path.len(), 4);
        assert_eq!(path[0], from);
        assert_eq!(path[3], to);
        let raw = &graph.obstacles()[0];
        for pair in path.windows(2) {
            assert!(!raw.intersects_segment(pair[0], pair[1]));
        }
    }

    #[test]
    fn test_find_path_leaves_graph_unchanged() {
        let mut graph = NavigationGraph::new(
            vec![square(Vec2::ZERO, 10.0), square(Vec2::new(200.0, 50.0), 20.0)],
            30.0,
        );
        let nodes = graph.node_count();
        let edges = graph.edge_count();

        let found = graph.find_path(Vec2::new(-100.0, 0.0), Vec2::new(300.0, 40.0));
        assert!(!found.is_empty());
        assert_eq!((graph.node_count(), graph.edge_count()), (nodes, edges));

        let missing = graph.find_path(Vec2::ZERO, Vec2::new(300.0, 40.0));
        assert!(missing.is_empty());
        assert_eq!((graph.node_count(), graph.edge_count()), (nodes, edges));
    }

    #[test]
    fn test_point_inside_buffer_zone_ignores_that_buffer() {
        let mut graph = NavigationGraph::new(vec![square(Vec2::ZERO, 10.0)], 30.0);
        let from = Vec2::new(-25.0, 0.0);
        assert_eq!(graph.obstacles_containing(from), vec![0]);

        let path = graph.find_path(from, Vec2::new(100.0, 0.0));
        assert!(path.len() >= 3);
        assert_eq!(path[0], from);
    }

    #[test]
    fn test_point_near_buffer_keeps_buffer_when_it_can_connect() {
        let mut graph = NavigationGraph::new(vec![square(Vec2::ZERO, 10.0)], 30.0);
        // outside the buffered square but within the grown bounds
        let from = Vec2::new(-43.0, -20.0);
        let to = Vec2::new(60.0, -60.0);
        assert_eq!(graph.obstacles_containing(from), vec![0]);

        let path = graph.find_path(from, to);
        assert!(path.len() >= 3);
        assert_eq!(path[0], from);
        assert_eq!(*path.last().unwrap(), to);
        let buffered = square(Vec2::ZERO, 10.0).buffered(30.0);
        for pair in path.windows(2) {
            assert!(!buffered.crosses_segment(pair[0], pair[1]), "{pair:?} cuts the buffer");
            assert!(!buffered.contains_point((pair[0] + pair[1]) * 0.5));
        }
    }

    #[test]
    fn test_point_inside_obstacle_cannot_connect() {
        let mut graph = NavigationGraph::new(vec![square(Vec2::ZERO, 10.0)], 30.0);
        assert!(graph.find_path(Vec2::ZERO, Vec2::new(100.0, 0.0)).is_empty());
    }

    #[test]
    fn test_temporary_nodes_are_dropped_with_the_guard() {
        let mut graph = NavigationGraph::new(vec![square(Vec2::ZERO, 10.0)], 30.0);
        {
            let mut query = graph.temporary_nodes();
            assert!(query.connect(Vec2::new(-100.0, 0.0)).is_some());
            assert!(query.connect(Vec2::new(100.0, 0.0)).is_some());
            assert_eq!(query.node_count(), 6);
        }
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_segment_intersection_touching_is_not_crossing() {
        let obstacle = square(Vec2::ZERO, 10.0);
        assert!(obstacle.intersects_segment(Vec2::new(-50.0, 0.0), Vec2::new(50.0, 0.0)));
        assert!(!obstacle.intersects_segment(Vec2::new(-50.0, 20.0), Vec2::new(50.0, 20.0)));
        assert!(obstacle.intersects_segment(Vec2::new(0.0, 0.0), Vec2::new(0.0, 1.0)));
    }
}
