//! `gridbot-mapping` – the robot's world model.
//!
//! Turns arrival, turn and sensor events into a topological map of the taped
//! grid and answers route queries over it while it is still being built.
//!
//! # Modules
//!
//! - [`graph`] – [`MapGraph`][graph::MapGraph]: arena of intersections with
//!   per-heading road and blockage state and a symmetric adjacency list.
//! - [`planner`] – [`Planner`][planner::Planner]: unit-weight Dijkstra run
//!   backwards from a goal, re-seeded whenever the graph changes.
//! - [`frontier`] – depth-first search for the nearest unexplored
//!   intersection, plus the subtarget heuristic used when the goal has not
//!   been mapped yet.

pub mod frontier;
pub mod graph;
pub mod planner;

pub use graph::{CompletenessPolicy, Intersection, MapGraph, NodeId};
pub use planner::Planner;
