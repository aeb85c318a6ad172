//! Unit-weight shortest paths over the [`MapGraph`].
//!
//! The search runs backwards from the goal, labelling every reachable
//! intersection with its hop count and the heading of its next hop toward
//! the goal. Scratch state lives in parallel arrays indexed by
//! [`NodeId::index`], so the graph itself stays free of planner fields.
//!
//! An empty path is a normal answer (already there, or no route) and never
//! an error.
//!
//! # Example
//!
//! ```rust
//! use gridbot_mapping::{MapGraph, Planner};
//! use gridbot_types::{Heading, Location};
//!
//! let mut graph = MapGraph::new(Location::new(0, 1), Heading::NORTH).unwrap();
//! graph.record_driven(Location::new(0, 1), Location::new(1, 1), Heading::EAST).unwrap();
//!
//! let mut planner = Planner::new();
//! planner.reset(&graph, Location::new(1, 1)).unwrap();
//! let path = planner.path_from(&graph, Location::ORIGIN);
//! assert_eq!(Vec::from(path), vec![Heading::NORTH, Heading::EAST]);
//! ```

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use gridbot_types::{Heading, Location, NavError};
use tracing::debug;

use crate::graph::{MapGraph, NodeId};

const UNREACHED: u32 = u32::MAX;

/// Reusable Dijkstra state for one goal at a time.
#[derive(Debug, Default)]
pub struct Planner {
    goal: Option<Location>,
    cost: Vec<u32>,
    next_direction: Vec<Option<Heading>>,
    queue: BinaryHeap<Reverse<(u32, NodeId)>>,
    /// [`MapGraph::revision`] the labels were computed against.
    revision: u64,
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The goal of the last successful [`Planner::reset`].
    pub fn goal(&self) -> Option<Location> {
        self.goal
    }

    /// Forget previous results and seed the search at `goal`.
    ///
    /// # Errors
    ///
    /// [`NavError::UnknownLocation`] if `goal` is not in the graph; the
    /// planner keeps its previous state.
    pub fn reset(&mut self, graph: &MapGraph, goal: Location) -> Result<(), NavError> {
        let goal_id = graph
            .node_id(goal)
            .ok_or(NavError::UnknownLocation(goal))?;
        self.goal = Some(goal);
        self.cost.clear();
        self.cost.resize(graph.len(), UNREACHED);
        self.next_direction.clear();
        self.next_direction.resize(graph.len(), None);
        self.queue.clear();
        self.revision = graph.revision();
        self.cost[goal_id.index()] = 0;
        self.queue.push(Reverse((0, goal_id)));
        Ok(())
    }

    /// Drain the queue, labelling every intersection reachable from the goal
    /// through unblocked roads. Re-seeds first if intersections, edges or
    /// blockages changed since the last reset.
    pub fn run(&mut self, graph: &MapGraph) {
        let stale = self.cost.len() != graph.len() || self.revision != graph.revision();
        if stale
            && let Some(goal) = self.goal
            && self.reset(graph, goal).is_err()
        {
            return;
        }

        while let Some(Reverse((cost, node))) = self.queue.pop() {
            if cost > self.cost[node.index()] {
                continue;
            }
            for neighbor in graph.neighbors(node) {
                let candidate = cost + 1;
                if candidate < self.cost[neighbor.index()] {
                    self.cost[neighbor.index()] = candidate;
                    self.next_direction[neighbor.index()] = graph.heading_between(neighbor, node);
                    self.queue.push(Reverse((candidate, neighbor)));
                }
            }
        }
    }

    /// Headings to drive from `start` to the goal, shortest first.
    ///
    /// Empty when `start` is the goal, unknown, or cut off.
    pub fn path_from(&mut self, graph: &MapGraph, start: Location) -> VecDeque<Heading> {
        self.run(graph);
        let mut path = VecDeque::new();
        let (Some(goal), Some(mut current)) = (self.goal, graph.node_id(start)) else {
            return path;
        };
        while graph.node(current).location() != goal {
            let Some(heading) = self.next_direction.get(current.index()).copied().flatten() else {
                debug!(%start, %goal, "no route");
                return VecDeque::new();
            };
            path.push_back(heading);
            let next = graph.node(current).location().step(heading);
            match graph.node_id(next) {
                Some(id) if path.len() <= graph.len() => current = id,
                _ => return VecDeque::new(),
            }
        }
        debug!(%start, %goal, hops = path.len(), "route planned");
        path
    }

    /// Hop count from `location` to the goal after the last run.
    pub fn cost_to_goal(&self, graph: &MapGraph, location: Location) -> Option<u32> {
        let id = graph.node_id(location)?;
        self.cost
            .get(id.index())
            .copied()
            .filter(|&c| c != UNREACHED)
    }

    /// Expand a heading sequence into the locations it visits, `start` first.
    pub fn path_locations<'a>(
        start: Location,
        path: impl IntoIterator<Item = &'a Heading>,
    ) -> Vec<Location> {
        let mut locations = vec![start];
        let mut current = start;
        for &heading in path {
            current = current.step(heading);
            locations.push(current);
        }
        locations
    }
}
