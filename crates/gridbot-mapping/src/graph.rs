//! Topological map of the road grid.
//!
//! Intersections live in an arena indexed by [`NodeId`]; a `Location → NodeId`
//! map resolves coordinates and an adjacency list holds the undirected driven
//! roads. Every mutating operation validates its inputs before writing, so a
//! rejected call leaves the graph exactly as it was.
//!
//! # Invariants
//!
//! - The origin `(0, 0)` is always present.
//! - An edge between A and B exists iff A's heading toward B is `Driven`
//!   and B's heading toward A is `Driven`.
//! - `Driven` and `None` are never downgraded.
//!
//! # Example
//!
//! ```rust
//! use gridbot_mapping::MapGraph;
//! use gridbot_types::{Heading, Location, RoadState};
//!
//! // Robot left the origin heading north and reached (0, 1).
//! let mut graph = MapGraph::new(Location::new(0, 1), Heading::NORTH).unwrap();
//! assert_eq!(graph.len(), 2);
//! assert_eq!(graph.edge_count(), 1);
//!
//! graph.record_driven(Location::new(0, 1), Location::new(1, 1), Heading::EAST).unwrap();
//! let node = graph.intersection(Location::new(1, 1)).unwrap();
//! assert_eq!(node.road(Heading::WEST), RoadState::Driven);
//! ```

use std::collections::{HashMap, HashSet};

use gridbot_types::{
    BlockageState, EdgeView, Heading, Location, MapSnapshot, NavError, NodeView, Pose, RoadState,
    TurnDirection,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Intersection
// ────────────────────────────────────────────────────────────────────────────

/// Stable arena index of an [`Intersection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One grid intersection with its eight potential roads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    location: Location,
    roads: [RoadState; 8],
    blockages: [BlockageState; 8],
}

impl Intersection {
    fn new(location: Location) -> Self {
        Self {
            location,
            roads: [RoadState::Unknown; 8],
            blockages: [BlockageState::Unblocked; 8],
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn road(&self, heading: Heading) -> RoadState {
        self.roads[heading.index()]
    }

    pub fn blockage(&self, heading: Heading) -> BlockageState {
        self.blockages[heading.index()]
    }

    pub fn is_blocked(&self, heading: Heading) -> bool {
        self.blockage(heading).is_blocked()
    }

    /// Full road table indexed by heading.
    pub fn roads(&self) -> &[RoadState; 8] {
        &self.roads
    }

    /// Every heading is confirmed (`Driven`/`None`) or currently blocked.
    pub fn is_explored(&self) -> bool {
        Heading::all().all(|h| self.heading_settled(h))
    }

    fn heading_settled(&self, heading: Heading) -> bool {
        self.road(heading).is_confirmed() || self.is_blocked(heading)
    }
}

/// How [`MapGraph::is_complete`] treats the origin intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "heading", rename_all = "snake_case")]
pub enum CompletenessPolicy {
    /// Every heading of every intersection must be settled.
    #[default]
    Strict,
    /// Ignore one heading of the origin, e.g. the stub the robot was placed on.
    ExemptOriginHeading(Heading),
}

// ────────────────────────────────────────────────────────────────────────────
// MapGraph
// ────────────────────────────────────────────────────────────────────────────

/// The robot's incrementally built map.
#[derive(Debug, Clone)]
pub struct MapGraph {
    nodes: Vec<Intersection>,
    index: HashMap<Location, NodeId>,
    adjacency: Vec<Vec<NodeId>>,
    policy: CompletenessPolicy,
    /// Bumped whenever reachability can change: new intersections, new
    /// edges, blockage updates.
    revision: u64,
}

/// On-disk form produced by [`MapGraph::to_blob`].
#[derive(Serialize, Deserialize)]
struct StoredGraph {
    policy: CompletenessPolicy,
    intersections: Vec<Intersection>,
    edges: Vec<(Location, Location)>,
}

impl MapGraph {
    /// Seed the map after the first line follow: the robot left the origin
    /// along `approach_heading` and arrived at `location`.
    ///
    /// When `location` is the origin itself only the origin is created.
    ///
    /// # Errors
    ///
    /// [`NavError::Configuration`] when `location` is neither the origin nor
    /// one step from it along `approach_heading`.
    pub fn new(location: Location, approach_heading: Heading) -> Result<Self, NavError> {
        let mut graph = Self::origin();
        if location == Location::ORIGIN {
            return Ok(graph);
        }
        if Location::ORIGIN.step(approach_heading) != location {
            return Err(NavError::Configuration(format!(
                "{location} is not one step from the origin along heading {approach_heading}"
            )));
        }
        graph.record_driven(Location::ORIGIN, location, approach_heading)?;
        Ok(graph)
    }

    /// A map holding only the origin, every heading unknown.
    pub fn origin() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            adjacency: Vec::new(),
            policy: CompletenessPolicy::default(),
            revision: 0,
        };
        graph.insert_node(Location::ORIGIN);
        graph
    }

    /// Builder-style completeness policy override.
    pub fn with_policy(mut self, policy: CompletenessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> CompletenessPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: CompletenessPolicy) {
        self.policy = policy;
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Number of intersections.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Changes whenever an intersection, an edge or a blockage changes.
    /// Road-state updates that leave reachability alone do not count.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Always `false`: the origin exists from construction.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, location: Location) -> bool {
        self.index.contains_key(&location)
    }

    pub fn node_id(&self, location: Location) -> Option<NodeId> {
        self.index.get(&location).copied()
    }

    pub fn intersection(&self, location: Location) -> Option<&Intersection> {
        self.node_id(location).map(|id| &self.nodes[id.0])
    }

    /// The intersection behind a [`NodeId`] handed out by this graph.
    pub fn node(&self, id: NodeId) -> &Intersection {
        &self.nodes[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Intersection)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Undirected edges, each reported once.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(a, adj)| {
            adj.iter()
                .filter(move |b| a < b.0)
                .map(move |&b| (NodeId(a), b))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Heading of the road from `from` to an adjacent `to`.
    pub fn heading_between(&self, from: NodeId, to: NodeId) -> Option<Heading> {
        self.nodes[from.0]
            .location
            .heading_to(self.nodes[to.0].location)
    }

    /// Nodes joined to `id` by an edge that is unblocked on both ends.
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency[id.0].iter().copied().filter(move |&other| {
            self.heading_between(id, other).is_some_and(|h| {
                !self.nodes[id.0].is_blocked(h) && !self.nodes[other.0].is_blocked(h.opposite())
            })
        })
    }

    /// `true` when no intersection has an unsettled heading, subject to the
    /// [`CompletenessPolicy`].
    pub fn is_complete(&self) -> bool {
        self.nodes.iter().all(|node| {
            Heading::all().all(|h| {
                if let CompletenessPolicy::ExemptOriginHeading(exempt) = self.policy
                    && node.location == Location::ORIGIN
                    && h == exempt
                {
                    return true;
                }
                node.heading_settled(h)
            })
        })
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Record that the robot drove from `prev` to `location` along `heading`.
    ///
    /// Creates `location` if needed and inserts the edge once; repeating the
    /// call is a no-op.
    pub fn record_driven(
        &mut self,
        prev: Location,
        location: Location,
        heading: Heading,
    ) -> Result<NodeId, NavError> {
        let prev_id = self.require(prev)?;
        if prev.step(heading) != location {
            return Err(NavError::Configuration(format!(
                "{location} is not one step from {prev} along heading {heading}"
            )));
        }
        let back = heading.opposite();
        if self.nodes[prev_id.0].road(heading) == RoadState::None {
            return Err(inconsistency(
                prev,
                heading,
                RoadState::None,
                "drove a road the map says is absent",
            ));
        }
        if let Some(existing) = self.intersection(location)
            && existing.road(back) == RoadState::None
        {
            return Err(inconsistency(
                location,
                back,
                RoadState::None,
                "arrived over a road the map says is absent",
            ));
        }

        let id = match self.node_id(location) {
            Some(id) => id,
            None => self.insert_node(location),
        };
        self.nodes[prev_id.0].roads[heading.index()] = RoadState::Driven;
        self.nodes[id.0].roads[back.index()] = RoadState::Driven;
        if !self.adjacency[prev_id.0].contains(&id) {
            self.adjacency[prev_id.0].push(id);
            self.adjacency[id.0].push(prev_id);
            self.revision += 1;
            debug!(from = %prev, to = %location, heading = %heading, "edge recorded");
        }
        Ok(id)
    }

    /// Record that there is no road at `heading`.
    ///
    /// # Errors
    ///
    /// [`NavError::MapInconsistency`] if a road is already known there.
    pub fn record_absent(&mut self, location: Location, heading: Heading) -> Result<(), NavError> {
        let id = self.require(location)?;
        let current = self.nodes[id.0].road(heading);
        if current.is_road() {
            return Err(inconsistency(
                location,
                heading,
                current,
                "cannot mark a known road absent",
            ));
        }
        self.nodes[id.0].roads[heading.index()] = RoadState::None;
        debug!(%location, %heading, "road absent");
        Ok(())
    }

    /// Record that a road was seen at `heading`. `Driven` stays `Driven`.
    ///
    /// # Errors
    ///
    /// [`NavError::MapInconsistency`] if the map says there is no road.
    pub fn record_seen(&mut self, location: Location, heading: Heading) -> Result<(), NavError> {
        let id = self.require(location)?;
        match self.nodes[id.0].road(heading) {
            RoadState::None => Err(inconsistency(
                location,
                heading,
                RoadState::None,
                "road seen where the map has none",
            )),
            RoadState::Driven => Ok(()),
            RoadState::Unknown | RoadState::Undriven => {
                self.nodes[id.0].roads[heading.index()] = RoadState::Undriven;
                debug!(%location, %heading, "road seen");
                Ok(())
            }
        }
    }

    /// Record an in-place turn of `angle` degrees from `start` in direction
    /// `turn` and return the heading the robot ended on.
    ///
    /// Every heading passed over becomes `None`; the final heading becomes
    /// `Undriven` unless already `Driven`.
    ///
    /// # Errors
    ///
    /// - [`NavError::Configuration`] if `angle` does not round to 1–8 steps.
    /// - [`NavError::MapInconsistency`] if the sweep passes over a known road
    ///   or stops on a heading known to have none.
    pub fn record_turn_sweep(
        &mut self,
        location: Location,
        start: Heading,
        angle: f64,
        turn: TurnDirection,
    ) -> Result<Heading, NavError> {
        let steps = (angle.abs() / 45.0).round();
        if !(1.0..=8.0).contains(&steps) {
            return Err(NavError::Configuration(format!(
                "turn of {angle:.1}° does not map to 1-8 heading steps"
            )));
        }
        let steps = steps as i32;
        let id = self.require(location)?;
        let node = &self.nodes[id.0];

        for k in 1..steps {
            let h = start.turned(turn, k);
            let state = node.road(h);
            if state.is_road() {
                return Err(inconsistency(
                    location,
                    h,
                    state,
                    "turn swept past a known road",
                ));
            }
        }
        let end = start.turned(turn, steps);
        if node.road(end) == RoadState::None {
            return Err(inconsistency(
                location,
                end,
                RoadState::None,
                "turn stopped where the map has no road",
            ));
        }

        let node = &mut self.nodes[id.0];
        for k in 1..steps {
            node.roads[start.turned(turn, k).index()] = RoadState::None;
        }
        if node.roads[end.index()] != RoadState::Driven {
            node.roads[end.index()] = RoadState::Undriven;
        }
        debug!(%location, %start, %end, steps, %turn, "turn sweep recorded");
        Ok(end)
    }

    /// Mark the road from `prev` toward `location` as blocked on both ends.
    pub fn block(
        &mut self,
        prev: Location,
        location: Location,
        heading: Heading,
    ) -> Result<(), NavError> {
        self.set_blockage(prev, location, heading, BlockageState::Blocked)
    }

    /// Clear a blockage set by [`MapGraph::block`].
    pub fn unblock(
        &mut self,
        prev: Location,
        location: Location,
        heading: Heading,
    ) -> Result<(), NavError> {
        self.set_blockage(prev, location, heading, BlockageState::Unblocked)
    }

    pub fn clear_all_blockages(&mut self) {
        for node in &mut self.nodes {
            node.blockages = [BlockageState::Unblocked; 8];
        }
        self.revision += 1;
        debug!("all blockages cleared");
    }

    fn set_blockage(
        &mut self,
        prev: Location,
        location: Location,
        heading: Heading,
        state: BlockageState,
    ) -> Result<(), NavError> {
        let prev_id = self.require(prev)?;
        if prev.step(heading) != location {
            return Err(NavError::Configuration(format!(
                "{location} is not one step from {prev} along heading {heading}"
            )));
        }
        self.nodes[prev_id.0].blockages[heading.index()] = state;
        if let Some(id) = self.node_id(location) {
            self.nodes[id.0].blockages[heading.opposite().index()] = state;
        }
        self.revision += 1;
        debug!(from = %prev, to = %location, %heading, ?state, "blockage updated");
        Ok(())
    }

    fn insert_node(&mut self, location: Location) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Intersection::new(location));
        self.adjacency.push(Vec::new());
        self.index.insert(location, id);
        self.revision += 1;
        debug!(%location, id = id.0, "intersection created");
        id
    }

    fn require(&self, location: Location) -> Result<NodeId, NavError> {
        self.node_id(location)
            .ok_or(NavError::UnknownLocation(location))
    }

    // ── Views & persistence ──────────────────────────────────────────────

    /// Renderable view of the map with an optional robot pose and path overlay.
    pub fn snapshot(&self, robot: Option<Pose>, path: &[Location]) -> MapSnapshot {
        let nodes = self
            .nodes
            .iter()
            .map(|n| NodeView {
                location: n.location,
                explored: n.is_explored(),
                roads: n.roads,
                blocked: Heading::all().filter(|&h| n.is_blocked(h)).collect(),
            })
            .collect();
        let edges = self
            .edges()
            .map(|(a, b)| {
                let blocked = self
                    .heading_between(a, b)
                    .is_some_and(|h| self.nodes[a.0].is_blocked(h) || self.nodes[b.0].is_blocked(h.opposite()));
                EdgeView {
                    a: self.nodes[a.0].location,
                    b: self.nodes[b.0].location,
                    blocked,
                }
            })
            .collect();
        MapSnapshot {
            nodes,
            edges,
            robot,
            path: path.to_vec(),
        }
    }

    /// Serialize the whole graph as JSON bytes.
    pub fn to_blob(&self) -> Result<Vec<u8>, NavError> {
        let stored = StoredGraph {
            policy: self.policy,
            intersections: self.nodes.clone(),
            edges: self
                .edges()
                .map(|(a, b)| (self.nodes[a.0].location, self.nodes[b.0].location))
                .collect(),
        };
        serde_json::to_vec(&stored).map_err(|e| NavError::Configuration(e.to_string()))
    }

    /// Rebuild a graph from [`MapGraph::to_blob`] output.
    ///
    /// # Errors
    ///
    /// [`NavError::Configuration`] when the bytes do not parse or describe a
    /// graph that violates the map invariants.
    pub fn from_blob(bytes: &[u8]) -> Result<Self, NavError> {
        let stored: StoredGraph = serde_json::from_slice(bytes)
            .map_err(|e| NavError::Configuration(format!("invalid map blob: {e}")))?;
        let bad = |msg: String| NavError::Configuration(format!("invalid map blob: {msg}"));

        let mut index = HashMap::with_capacity(stored.intersections.len());
        for (i, node) in stored.intersections.iter().enumerate() {
            if index.insert(node.location, NodeId(i)).is_some() {
                return Err(bad(format!("duplicate intersection {}", node.location)));
            }
        }
        if !index.contains_key(&Location::ORIGIN) {
            return Err(bad("origin missing".into()));
        }

        let mut adjacency = vec![Vec::new(); stored.intersections.len()];
        let mut seen = HashSet::new();
        for (a, b) in &stored.edges {
            let (Some(&ia), Some(&ib)) = (index.get(a), index.get(b)) else {
                return Err(bad(format!("edge {a} – {b} references a missing intersection")));
            };
            let Some(h) = a.heading_to(*b) else {
                return Err(bad(format!("edge {a} – {b} joins non-adjacent intersections")));
            };
            if stored.intersections[ia.0].road(h) != RoadState::Driven
                || stored.intersections[ib.0].road(h.opposite()) != RoadState::Driven
            {
                return Err(bad(format!("edge {a} – {b} is not driven on both ends")));
            }
            if seen.insert((ia.min(ib), ia.max(ib))) {
                adjacency[ia.0].push(ib);
                adjacency[ib.0].push(ia);
            }
        }
        for node in &stored.intersections {
            for h in Heading::all() {
                if node.road(h) != RoadState::Driven {
                    continue;
                }
                let other = node.location.step(h);
                let linked = index.get(&other).is_some_and(|&o| {
                    seen.contains(&(index[&node.location].min(o), index[&node.location].max(o)))
                });
                if !linked {
                    return Err(bad(format!(
                        "{} heading {h} is driven but has no edge",
                        node.location
                    )));
                }
            }
        }

        Ok(Self {
            nodes: stored.intersections,
            index,
            adjacency,
            policy: stored.policy,
            revision: 0,
        })
    }
}

fn inconsistency(
    location: Location,
    heading: Heading,
    expected: RoadState,
    detail: &str,
) -> NavError {
    NavError::MapInconsistency {
        location,
        heading,
        expected,
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    fn h(v: u8) -> Heading {
        Heading::new(v).unwrap()
    }

    /// Square (0,0) → (0,1) → (1,1) → (1,0) → (0,0).
    fn square() -> MapGraph {
        let mut g = MapGraph::new(loc(0, 1), Heading::NORTH).unwrap();
        g.record_driven(loc(0, 1), loc(1, 1), Heading::EAST).unwrap();
        g.record_driven(loc(1, 1), loc(1, 0), Heading::SOUTH).unwrap();
        g.record_driven(loc(1, 0), loc(0, 0), Heading::WEST).unwrap();
        g
    }

    fn assert_symmetric(g: &MapGraph) {
        for (id, node) in g.iter() {
            for heading in Heading::all() {
                let other = node.location().step(heading);
                let Some(other_id) = g.node_id(other) else {
                    continue;
                };
                let both = node.road(heading) == RoadState::Driven
                    && g.node(other_id).road(heading.opposite()) == RoadState::Driven;
                let edge = g.edges().any(|(a, b)| {
                    (a, b) == (id, other_id) || (a, b) == (other_id, id)
                });
                assert_eq!(both, edge, "{} heading {heading}", node.location());
            }
        }
    }

    #[test]
    fn new_seeds_origin_and_first_edge() {
        let g = MapGraph::new(loc(0, 1), Heading::NORTH).unwrap();
        assert!(g.contains(Location::ORIGIN));
        assert_eq!(g.len(), 2);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(
            g.intersection(loc(0, 1)).unwrap().road(Heading::SOUTH),
            RoadState::Driven
        );
        assert_eq!(
            g.intersection(Location::ORIGIN).unwrap().road(Heading::NORTH),
            RoadState::Driven
        );
        assert_symmetric(&g);
    }

    #[test]
    fn new_at_origin_creates_single_node() {
        let g = MapGraph::new(Location::ORIGIN, Heading::EAST).unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn new_rejects_non_adjacent_location() {
        assert!(matches!(
            MapGraph::new(loc(3, 3), Heading::NORTH),
            Err(NavError::Configuration(_))
        ));
    }

    #[test]
    fn record_driven_is_idempotent() {
        let mut g = square();
        let before = (g.len(), g.edge_count());
        g.record_driven(loc(0, 1), loc(1, 1), Heading::EAST).unwrap();
        g.record_driven(loc(1, 1), loc(0, 1), Heading::WEST).unwrap();
        assert_eq!((g.len(), g.edge_count()), before);
        assert_symmetric(&g);
    }

    #[test]
    fn record_driven_unknown_prev_leaves_graph_unchanged() {
        let mut g = square();
        let err = g
            .record_driven(loc(5, 5), loc(5, 6), Heading::NORTH)
            .unwrap_err();
        assert_eq!(err, NavError::UnknownLocation(loc(5, 5)));
        assert_eq!(g.len(), 4);
        assert!(!g.contains(loc(5, 6)));
    }

    #[test]
    fn record_driven_over_absent_road_is_inconsistent() {
        let mut g = square();
        g.record_absent(loc(0, 1), Heading::NORTH).unwrap();
        assert!(matches!(
            g.record_driven(loc(0, 1), loc(0, 2), Heading::NORTH),
            Err(NavError::MapInconsistency { .. })
        ));
        assert!(!g.contains(loc(0, 2)));
    }

    #[test]
    fn record_absent_rejects_known_road() {
        let mut g = square();
        let err = g.record_absent(loc(0, 1), Heading::EAST).unwrap_err();
        assert!(matches!(
            err,
            NavError::MapInconsistency {
                expected: RoadState::Driven,
                ..
            }
        ));
        g.record_seen(loc(0, 1), Heading::NORTH).unwrap();
        assert!(g.record_absent(loc(0, 1), Heading::NORTH).is_err());
        assert_eq!(
            g.intersection(loc(0, 1)).unwrap().road(Heading::NORTH),
            RoadState::Undriven
        );
    }

    #[test]
    fn record_seen_keeps_driven() {
        let mut g = square();
        g.record_seen(loc(0, 1), Heading::EAST).unwrap();
        assert_eq!(
            g.intersection(loc(0, 1)).unwrap().road(Heading::EAST),
            RoadState::Driven
        );
    }

    #[test]
    fn sweep_over_unknown_marks_none_then_undriven() {
        let mut g = MapGraph::new(loc(0, 1), Heading::NORTH).unwrap();
        // Facing north at (0,1); turn left 135° to south-west.
        let end = g
            .record_turn_sweep(loc(0, 1), Heading::NORTH, 135.0, TurnDirection::Left)
            .unwrap();
        assert_eq!(end, h(3));
        let n = g.intersection(loc(0, 1)).unwrap();
        assert_eq!(n.road(h(1)), RoadState::None);
        assert_eq!(n.road(h(2)), RoadState::None);
        assert_eq!(n.road(h(3)), RoadState::Undriven);
    }

    #[test]
    fn sweep_ending_on_driven_stays_driven() {
        let mut g = MapGraph::new(loc(0, 1), Heading::NORTH).unwrap();
        let end = g
            .record_turn_sweep(loc(0, 1), Heading::NORTH, 180.0, TurnDirection::Right)
            .unwrap();
        assert_eq!(end, Heading::SOUTH);
        let n = g.intersection(loc(0, 1)).unwrap();
        assert_eq!(n.road(Heading::SOUTH), RoadState::Driven);
        assert_eq!(n.road(h(7)), RoadState::None);
        assert_eq!(n.road(Heading::EAST), RoadState::None);
        assert_eq!(n.road(h(5)), RoadState::None);
    }

    #[test]
    fn sweep_past_known_road_fails_without_mutation() {
        let mut g = square();
        // At (0,1): south and east are driven. Turning right 135° from north
        // passes east.
        let before = g.intersection(loc(0, 1)).unwrap().clone();
        let err = g
            .record_turn_sweep(loc(0, 1), Heading::NORTH, 135.0, TurnDirection::Right)
            .unwrap_err();
        assert!(matches!(
            err,
            NavError::MapInconsistency {
                heading,
                expected: RoadState::Driven,
                ..
            } if heading == Heading::EAST
        ));
        assert_eq!(g.intersection(loc(0, 1)).unwrap(), &before);
    }

    #[test]
    fn sweep_onto_absent_road_fails() {
        let mut g = square();
        g.record_absent(loc(0, 1), h(1)).unwrap();
        assert!(
            g.record_turn_sweep(loc(0, 1), Heading::NORTH, 45.0, TurnDirection::Left)
                .is_err()
        );
    }

    #[test]
    fn sweep_angle_out_of_range_is_configuration_error() {
        let mut g = square();
        for angle in [0.0, 10.0, 400.0] {
            assert!(matches!(
                g.record_turn_sweep(loc(0, 1), Heading::NORTH, angle, TurnDirection::Left),
                Err(NavError::Configuration(_))
            ));
        }
    }

    #[test]
    fn sweep_rounds_noisy_angle() {
        let mut g = MapGraph::new(loc(0, 1), Heading::NORTH).unwrap();
        let end = g
            .record_turn_sweep(loc(0, 1), Heading::NORTH, 98.0, TurnDirection::Left)
            .unwrap();
        assert_eq!(end, Heading::WEST);
    }

    #[test]
    fn block_is_symmetric_and_hides_neighbor() {
        let mut g = square();
        let a = g.node_id(loc(0, 1)).unwrap();
        let b = g.node_id(loc(1, 1)).unwrap();
        assert!(g.neighbors(a).any(|n| n == b));

        g.block(loc(0, 1), loc(1, 1), Heading::EAST).unwrap();
        assert!(g.intersection(loc(1, 1)).unwrap().is_blocked(Heading::WEST));
        assert!(!g.neighbors(a).any(|n| n == b));
        assert!(!g.neighbors(b).any(|n| n == a));

        g.unblock(loc(1, 1), loc(0, 1), Heading::WEST).unwrap();
        assert!(g.neighbors(a).any(|n| n == b));
    }

    #[test]
    fn block_toward_unmapped_location_marks_prev_only() {
        let mut g = square();
        g.block(loc(0, 1), loc(0, 2), Heading::NORTH).unwrap();
        assert!(g.intersection(loc(0, 1)).unwrap().is_blocked(Heading::NORTH));
        assert!(matches!(
            g.block(loc(9, 9), loc(9, 10), Heading::NORTH),
            Err(NavError::UnknownLocation(_))
        ));
    }

    #[test]
    fn clear_all_blockages_resets_everything() {
        let mut g = square();
        g.block(loc(0, 1), loc(1, 1), Heading::EAST).unwrap();
        g.block(loc(0, 0), loc(-1, 0), Heading::WEST).unwrap();
        g.clear_all_blockages();
        assert!(
            g.iter()
                .all(|(_, n)| Heading::all().all(|h| !n.is_blocked(h)))
        );
    }

    #[test]
    fn revision_tracks_reachability_changes() {
        let mut g = square();
        let r0 = g.revision();
        g.record_driven(loc(0, 0), loc(0, 1), Heading::NORTH).unwrap();
        assert_eq!(g.revision(), r0, "repeat drive adds no edge");
        g.record_absent(loc(1, 1), Heading::NORTH).unwrap();
        assert_eq!(g.revision(), r0);

        g.block(loc(0, 1), loc(1, 1), Heading::EAST).unwrap();
        let r1 = g.revision();
        assert!(r1 > r0);
        g.clear_all_blockages();
        let r2 = g.revision();
        assert!(r2 > r1);
        g.record_driven(loc(1, 1), loc(1, 2), Heading::NORTH).unwrap();
        assert!(g.revision() > r2);
    }

    #[test]
    fn completeness_requires_every_heading_settled() {
        let mut g = MapGraph::new(Location::ORIGIN, Heading::NORTH).unwrap();
        assert!(!g.is_complete());
        for heading in Heading::all() {
            g.record_absent(Location::ORIGIN, heading).unwrap();
        }
        assert!(g.is_complete());
    }

    #[test]
    fn blocked_heading_counts_as_settled() {
        let mut g = MapGraph::new(Location::ORIGIN, Heading::NORTH).unwrap();
        for heading in Heading::all().skip(1) {
            g.record_absent(Location::ORIGIN, heading).unwrap();
        }
        assert!(!g.is_complete());
        g.block(Location::ORIGIN, loc(0, 1), Heading::NORTH).unwrap();
        assert!(g.is_complete());
    }

    #[test]
    fn origin_exemption_masks_real_undriven_road() {
        let mut g = MapGraph::new(Location::ORIGIN, Heading::NORTH).unwrap();
        for heading in Heading::all().skip(1) {
            g.record_absent(Location::ORIGIN, heading).unwrap();
        }
        g.record_seen(Location::ORIGIN, Heading::NORTH).unwrap();
        assert!(!g.is_complete());

        let g = g.with_policy(CompletenessPolicy::ExemptOriginHeading(Heading::NORTH));
        // A genuine undriven road is now ignored.
        assert!(g.is_complete());
    }

    #[test]
    fn blob_roundtrip_preserves_graph() {
        let mut g = square().with_policy(CompletenessPolicy::ExemptOriginHeading(Heading::SOUTH));
        g.block(loc(0, 1), loc(1, 1), Heading::EAST).unwrap();
        g.record_absent(loc(1, 0), Heading::EAST).unwrap();

        let blob = g.to_blob().unwrap();
        let back = MapGraph::from_blob(&blob).unwrap();
        assert_eq!(back.len(), g.len());
        assert_eq!(back.edge_count(), g.edge_count());
        assert_eq!(back.policy(), g.policy());
        for (_, node) in g.iter() {
            assert_eq!(back.intersection(node.location()), Some(node));
        }
        assert_symmetric(&back);
    }

    #[test]
    fn blob_with_asymmetric_edge_is_rejected() {
        let g = square();
        let mut value: serde_json::Value = serde_json::from_slice(&g.to_blob().unwrap()).unwrap();
        // Forget the reciprocal label at (1,1) heading west.
        let nodes = value["intersections"].as_array_mut().unwrap();
        let node = nodes
            .iter_mut()
            .find(|n| n["location"]["x"] == 1 && n["location"]["y"] == 1)
            .unwrap();
        node["roads"][2] = serde_json::json!("unknown");
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            MapGraph::from_blob(&bytes),
            Err(NavError::Configuration(_))
        ));
    }

    #[test]
    fn blob_garbage_is_rejected() {
        assert!(MapGraph::from_blob(b"not json").is_err());
    }

    #[test]
    fn snapshot_reports_blocked_edges_and_path() {
        let mut g = square();
        g.block(loc(0, 1), loc(1, 1), Heading::EAST).unwrap();
        let pose = Pose {
            location: loc(0, 1),
            heading: Heading::EAST,
        };
        let snap = g.snapshot(Some(pose), &[loc(0, 1), loc(0, 0)]);
        assert_eq!(snap.nodes.len(), 4);
        assert_eq!(snap.edges.len(), 4);
        assert_eq!(snap.edges.iter().filter(|e| e.blocked).count(), 1);
        assert_eq!(snap.path.len(), 2);
        assert_eq!(snap.robot, Some(pose));
    }
}
