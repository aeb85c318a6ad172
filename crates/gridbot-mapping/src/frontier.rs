//! Frontier search: where should the robot go to learn something new?
//!
//! A *frontier* intersection has at least one unblocked heading whose road
//! state is still `Unknown` or `Undriven`.
//!
//! | Function | Used when |
//! |---|---|
//! | [`local_unexplored_heading`] | exploring, something left to drive right here |
//! | [`find_unexplored`] | exploring, current intersection is done |
//! | [`nearest_reachable_heading`] | exploring, nothing reachable is left |
//! | [`closest_subtarget`] | goal not yet on the map |
//! | [`heading_toward`] | goal not yet on the map, standing at the subtarget |

use std::collections::{HashSet, VecDeque};

use gridbot_types::{Heading, Location, RoadState};

use crate::graph::{Intersection, MapGraph, NodeId};

/// Added to the distance score of diagonal headings so axis-aligned
/// approaches win when the geometry is otherwise close.
pub const DIAGONAL_APPROACH_PENALTY: f64 = 0.5;

/// Added to already-driven headings in [`heading_toward`] so unexplored
/// roads win ties.
pub const EXPLORED_DIRECTION_PENALTY: f64 = 0.1;

/// Intermediate target chosen while the destination is off the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subtarget {
    /// Frontier intersection to drive to.
    pub location: Location,
    /// Unexplored heading to leave it by.
    pub heading: Heading,
    /// Hops from the current location.
    pub hops: usize,
    /// Distance score that selected it.
    pub score: f64,
}

fn is_open_frontier(node: &Intersection, heading: Heading) -> bool {
    node.road(heading).is_unexplored() && !node.is_blocked(heading)
}

fn has_frontier(node: &Intersection) -> bool {
    Heading::all().any(|h| is_open_frontier(node, h))
}

fn approach_score(from: Location, heading: Heading, destination: Location) -> f64 {
    let penalty = if heading.is_diagonal() {
        DIAGONAL_APPROACH_PENALTY
    } else {
        0.0
    };
    from.step(heading).distance_to(destination) + penalty
}

/// Depth-first search from `current` for a neighbouring intersection with
/// an open frontier heading, reached only through unblocked roads.
///
/// `current` itself is not a candidate. Returns `None` when nothing
/// reachable is left to explore or `current` is not mapped.
pub fn find_unexplored(graph: &MapGraph, current: Location) -> Option<Location> {
    let start = graph.node_id(current)?;
    let mut visited = HashSet::from([start]);
    dfs(graph, start, &mut visited).map(|id| graph.node(id).location())
}

fn dfs(graph: &MapGraph, node: NodeId, visited: &mut HashSet<NodeId>) -> Option<NodeId> {
    let neighbors: Vec<NodeId> = graph.neighbors(node).collect();
    for next in neighbors {
        if !visited.insert(next) {
            continue;
        }
        if has_frontier(graph.node(next)) {
            return Some(next);
        }
        if let Some(found) = dfs(graph, next, visited) {
            return Some(found);
        }
    }
    None
}

/// A road seen but not yet driven at this intersection, if any is unblocked.
pub fn local_unexplored_heading(intersection: &Intersection) -> Option<Heading> {
    Heading::all().find(|&h| {
        intersection.road(h) == RoadState::Undriven && !intersection.is_blocked(h)
    })
}

/// The unblocked known road closest in rotation to `facing`.
///
/// Equal rotations prefer the left (counter-clockwise) side.
pub fn nearest_reachable_heading(intersection: &Intersection, facing: Heading) -> Option<Heading> {
    (0..=4)
        .flat_map(|k| [facing.rotate(k), facing.rotate(-k)])
        .find(|&h| intersection.road(h).is_road() && !intersection.is_blocked(h))
}

/// Pick the frontier heading whose neighbouring cell is closest to
/// `destination`, searching every intersection reachable from `current`
/// (including `current`).
///
/// Ties on score go to the intersection fewer hops away.
pub fn closest_subtarget(
    graph: &MapGraph,
    current: Location,
    destination: Location,
) -> Option<Subtarget> {
    let start = graph.node_id(current)?;
    let mut hops = vec![usize::MAX; graph.len()];
    hops[start.index()] = 0;
    let mut queue = VecDeque::from([start]);
    let mut best: Option<Subtarget> = None;

    while let Some(node) = queue.pop_front() {
        let intersection = graph.node(node);
        for heading in Heading::all().filter(|&h| is_open_frontier(intersection, h)) {
            let candidate = Subtarget {
                location: intersection.location(),
                heading,
                hops: hops[node.index()],
                score: approach_score(intersection.location(), heading, destination),
            };
            let better = match &best {
                None => true,
                Some(b) => candidate
                    .score
                    .total_cmp(&b.score)
                    .then(candidate.hops.cmp(&b.hops))
                    .is_lt(),
            };
            if better {
                best = Some(candidate);
            }
        }
        for next in graph.neighbors(node) {
            if hops[next.index()] == usize::MAX {
                hops[next.index()] = hops[node.index()] + 1;
                queue.push_back(next);
            }
        }
    }
    best
}

/// The heading to leave `intersection` by when heading for an unmapped
/// `destination`: any unblocked road that is not known to be absent,
/// scored like [`closest_subtarget`] with driven roads slightly penalised.
pub fn heading_toward(intersection: &Intersection, destination: Location) -> Option<Heading> {
    Heading::all()
        .filter(|&h| intersection.road(h) != RoadState::None && !intersection.is_blocked(h))
        .map(|h| {
            let mut score = approach_score(intersection.location(), h, destination);
            if intersection.road(h) == RoadState::Driven {
                score += EXPLORED_DIRECTION_PENALTY;
            }
            (h, score)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(h, _)| h)
}
