//! Reconcile noisy measurements with the map.
//!
//! Two checks run at every intersection:
//!
//! - [`verify_approach`] – after arriving, the line sensor says whether a
//!   road continues straight ahead. That observation is written into the map
//!   when it agrees with what the map already knows; a contradiction is
//!   either fatal or handed to the operator, depending on [`RepairPolicy`].
//! - [`verify_turn_angle`] – after every in-place turn, the measured angle is
//!   quantized to a heading. When that heading is known to have no road (or
//!   the turn would have swept over a known road) the heading is corrected
//!   to the first plausible road in the turn direction.
//!
//! Neither check mutates the graph on a mismatch.

use std::fmt;
use std::str::FromStr;

use gridbot_mapping::MapGraph;
use gridbot_types::{Heading, Location, NavError, RoadState, TurnDirection};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ────────────────────────────────────────────────────────────────────────────
// Approach verification
// ────────────────────────────────────────────────────────────────────────────

/// What to do when an observation contradicts the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairPolicy {
    /// Return [`NavError::MapInconsistency`].
    #[default]
    Fatal,
    /// Return [`ApproachVerdict::NeedsRepair`] and leave the decision to a human.
    #[serde(rename = "operator")]
    AskOperator,
}

impl FromStr for RepairPolicy {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" => Ok(RepairPolicy::Fatal),
            "operator" | "ask" => Ok(RepairPolicy::AskOperator),
            other => Err(NavError::Configuration(format!(
                "invalid repair policy '{other}', expected fatal or operator"
            ))),
        }
    }
}

/// A sensor observation the map cannot explain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub location: Location,
    pub heading: Heading,
    /// What the map believed.
    pub map_state: RoadState,
    /// Whether the line sensor saw a road.
    pub road_seen: bool,
}

impl Discrepancy {
    /// Question shown to the operator.
    pub fn prompt(&self) -> String {
        format!(
            "{self}. Reply 'x,y[,h]' if the robot is somewhere else, 'h' if it faces another heading, or 'ok' to keep the map"
        )
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seen = if self.road_seen { "a road" } else { "no road" };
        write!(
            f,
            "At {} heading {} the sensor saw {seen} but the map says {}",
            self.location, self.heading, self.map_state
        )
    }
}

impl From<Discrepancy> for NavError {
    fn from(d: Discrepancy) -> Self {
        let detail = if d.road_seen {
            "road seen where the map has none"
        } else {
            "expected road missing"
        };
        NavError::MapInconsistency {
            location: d.location,
            heading: d.heading,
            expected: d.map_state,
            detail: detail.to_string(),
        }
    }
}

/// Outcome of [`verify_approach`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApproachVerdict {
    /// No road ahead; the heading is now `None`.
    NoRoad,
    /// A road ahead; the heading is now `Undriven` (or stayed `Driven`).
    Road,
    /// The observation contradicts the map; nothing was written.
    NeedsRepair(Discrepancy),
}

/// Check the line sensor's view straight ahead against the map and record it.
///
/// | Road seen | Map says | Result |
/// |---|---|---|
/// | no  | Unknown / None | mark `None` |
/// | yes | anything but None | mark `Undriven` unless `Driven` |
/// | no  | Undriven / Driven | mismatch |
/// | yes | None | mismatch |
///
/// # Errors
///
/// - [`NavError::UnknownLocation`] if `location` is not mapped.
/// - [`NavError::MapInconsistency`] on a mismatch under [`RepairPolicy::Fatal`].
pub fn verify_approach(
    graph: &mut MapGraph,
    location: Location,
    heading: Heading,
    road_seen: bool,
    policy: RepairPolicy,
) -> Result<ApproachVerdict, NavError> {
    let map_state = graph
        .intersection(location)
        .ok_or(NavError::UnknownLocation(location))?
        .road(heading);

    let consistent = if road_seen {
        map_state != RoadState::None
    } else {
        !map_state.is_road()
    };
    if !consistent {
        let discrepancy = Discrepancy {
            location,
            heading,
            map_state,
            road_seen,
        };
        warn!(%discrepancy, ?policy, "approach check failed");
        return match policy {
            RepairPolicy::Fatal => Err(discrepancy.into()),
            RepairPolicy::AskOperator => Ok(ApproachVerdict::NeedsRepair(discrepancy)),
        };
    }

    if road_seen {
        graph.record_seen(location, heading)?;
        Ok(ApproachVerdict::Road)
    } else {
        graph.record_absent(location, heading)?;
        Ok(ApproachVerdict::NoRoad)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Turn verification
// ────────────────────────────────────────────────────────────────────────────

/// Heading and angle to record for a completed turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnCheck {
    /// Heading the robot is now facing.
    pub heading: Heading,
    /// Angle in degrees to pass to [`MapGraph::record_turn_sweep`].
    pub angle: f64,
    /// The measured angle was overridden.
    pub corrected: bool,
    /// The corrected heading has never been observed, so the correction is a
    /// guess an operator may want to confirm.
    pub needs_confirmation: bool,
}

/// Quantize a measured turn and correct it against the map.
///
/// The measured heading is rejected when the map says it has no road, or
/// when reaching it would sweep over a road the map already knows. In either
/// case the robot must actually have stopped on the first heading past
/// `start` (in the turn direction) that is not known to be empty.
///
/// # Errors
///
/// - [`NavError::UnknownLocation`] if `location` is not mapped.
/// - [`NavError::MapInconsistency`] if every heading at `location` is `None`.
pub fn verify_turn_angle(
    graph: &MapGraph,
    location: Location,
    start: Heading,
    measured: f64,
    turn: TurnDirection,
) -> Result<TurnCheck, NavError> {
    let node = graph
        .intersection(location)
        .ok_or(NavError::UnknownLocation(location))?;
    let steps = (measured.abs() / 45.0).round() as i32;
    let measured_heading = start.turned(turn, steps);

    let swept_road = (1..steps).any(|k| node.road(start.turned(turn, k)).is_road());
    let lands_on_none = node.road(measured_heading) == RoadState::None;
    if (1..=8).contains(&steps) && !swept_road && !lands_on_none {
        return Ok(TurnCheck {
            heading: measured_heading,
            angle: f64::from(steps) * 45.0,
            corrected: false,
            needs_confirmation: false,
        });
    }

    let Some(k) = (1..=8).find(|&k| node.road(start.turned(turn, k)) != RoadState::None) else {
        return Err(NavError::MapInconsistency {
            location,
            heading: start,
            expected: RoadState::None,
            detail: "every heading at this intersection is marked absent".to_string(),
        });
    };
    let heading = start.turned(turn, k);
    let needs_confirmation = node.road(heading) == RoadState::Unknown;
    warn!(
        %location,
        %start,
        measured,
        corrected = %heading,
        needs_confirmation,
        "turn angle corrected"
    );
    Ok(TurnCheck {
        heading,
        angle: f64::from(k) * 45.0,
        corrected: true,
        needs_confirmation,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Operator answers
// ────────────────────────────────────────────────────────────────────────────

/// Pose correction typed by the operator in reply to a prompt.
///
/// Both fields empty means "the map is right, carry on".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoseFix {
    pub location: Option<Location>,
    pub heading: Option<Heading>,
}

impl PoseFix {
    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.heading.is_none()
    }
}

/// Parse an operator answer: `"x,y"`, `"x,y,h"`, `"h"`, or `"ok"`.
///
/// # Errors
///
/// [`NavError::Configuration`] for anything else.
pub fn apply_operator_fix(answer: &str) -> Result<PoseFix, NavError> {
    let answer = answer.trim();
    if answer.is_empty() || ["ok", "keep", "y", "yes"].contains(&answer.to_ascii_lowercase().as_str())
    {
        return Ok(PoseFix::default());
    }
    let parts: Vec<&str> = answer.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [h] => Ok(PoseFix {
            location: None,
            heading: Some(h.parse()?),
        }),
        [x, y] => Ok(PoseFix {
            location: Some(format!("{x},{y}").parse()?),
            heading: None,
        }),
        [x, y, h] => Ok(PoseFix {
            location: Some(format!("{x},{y}").parse()?),
            heading: Some(h.parse()?),
        }),
        _ => Err(NavError::Configuration(format!(
            "cannot read '{answer}' as x,y[,h] or h"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    fn graph() -> MapGraph {
        // (0,0) → (0,1) → (1,1); at (0,1) south and east are driven.
        let mut g = MapGraph::new(loc(0, 1), Heading::NORTH).unwrap();
        g.record_driven(loc(0, 1), loc(1, 1), Heading::EAST).unwrap();
        g
    }

    fn road(g: &MapGraph, at: Location, h: Heading) -> RoadState {
        g.intersection(at).unwrap().road(h)
    }

    #[test]
    fn approach_without_road_marks_none() {
        let mut g = graph();
        let v = verify_approach(&mut g, loc(0, 1), Heading::NORTH, false, RepairPolicy::Fatal)
            .unwrap();
        assert_eq!(v, ApproachVerdict::NoRoad);
        assert_eq!(road(&g, loc(0, 1), Heading::NORTH), RoadState::None);
    }

    #[test]
    fn approach_with_road_marks_undriven_but_keeps_driven() {
        let mut g = graph();
        verify_approach(&mut g, loc(0, 1), Heading::NORTH, true, RepairPolicy::Fatal).unwrap();
        assert_eq!(road(&g, loc(0, 1), Heading::NORTH), RoadState::Undriven);
        verify_approach(&mut g, loc(0, 1), Heading::EAST, true, RepairPolicy::Fatal).unwrap();
        assert_eq!(road(&g, loc(0, 1), Heading::EAST), RoadState::Driven);
    }

    #[test]
    fn missing_expected_road_is_fatal_by_default() {
        let mut g = graph();
        let err = verify_approach(&mut g, loc(0, 1), Heading::EAST, false, RepairPolicy::Fatal)
            .unwrap_err();
        assert!(matches!(
            err,
            NavError::MapInconsistency {
                expected: RoadState::Driven,
                ..
            }
        ));
        assert_eq!(road(&g, loc(0, 1), Heading::EAST), RoadState::Driven);
    }

    #[test]
    fn mismatch_under_operator_policy_needs_repair() {
        let mut g = graph();
        g.record_absent(loc(0, 1), Heading::NORTH).unwrap();
        let v = verify_approach(
            &mut g,
            loc(0, 1),
            Heading::NORTH,
            true,
            RepairPolicy::AskOperator,
        )
        .unwrap();
        let ApproachVerdict::NeedsRepair(d) = v else {
            panic!("expected repair request, got {v:?}");
        };
        assert_eq!(d.map_state, RoadState::None);
        assert!(d.road_seen);
        assert!(d.prompt().contains("x,y"));
        assert_eq!(road(&g, loc(0, 1), Heading::NORTH), RoadState::None);
    }

    #[test]
    fn approach_at_unknown_location_errors() {
        let mut g = graph();
        assert_eq!(
            verify_approach(&mut g, loc(4, 4), Heading::NORTH, true, RepairPolicy::Fatal),
            Err(NavError::UnknownLocation(loc(4, 4)))
        );
    }

    #[test]
    fn plausible_turn_is_accepted_as_measured() {
        let g = graph();
        let check =
            verify_turn_angle(&g, loc(0, 1), Heading::EAST, 93.0, TurnDirection::Left).unwrap();
        assert_eq!(check.heading, Heading::NORTH);
        assert_eq!(check.angle, 90.0);
        assert!(!check.corrected);
    }

    #[test]
    fn turn_onto_absent_road_is_corrected() {
        let mut g = graph();
        g.record_absent(loc(0, 1), Heading::NORTH).unwrap();
        g.record_absent(loc(0, 1), Heading::new(7).unwrap()).unwrap();
        // South → left 180° sweeps driven east and lands on absent north.
        // Heading 5 is the first one not known to be absent.
        let check =
            verify_turn_angle(&g, loc(0, 1), Heading::SOUTH, 180.0, TurnDirection::Left).unwrap();
        assert!(check.corrected);
        assert_eq!(check.heading, Heading::new(5).unwrap());
        assert_eq!(check.angle, 45.0);
        assert!(check.needs_confirmation);
    }

    #[test]
    fn overshoot_past_known_road_is_corrected_without_confirmation() {
        let mut g = graph();
        g.record_absent(loc(0, 1), Heading::new(5).unwrap()).unwrap();
        // South → left 135° would sweep over driven east.
        let check =
            verify_turn_angle(&g, loc(0, 1), Heading::SOUTH, 135.0, TurnDirection::Left).unwrap();
        assert_eq!(check.heading, Heading::EAST);
        assert_eq!(check.angle, 90.0);
        assert!(check.corrected);
        assert!(!check.needs_confirmation);
    }

    #[test]
    fn all_absent_intersection_is_inconsistent() {
        let mut g = MapGraph::new(Location::ORIGIN, Heading::NORTH).unwrap();
        for h in Heading::all() {
            g.record_absent(Location::ORIGIN, h).unwrap();
        }
        assert!(matches!(
            verify_turn_angle(&g, Location::ORIGIN, Heading::NORTH, 90.0, TurnDirection::Right),
            Err(NavError::MapInconsistency { .. })
        ));
    }

    #[test]
    fn operator_answers_parse() {
        assert!(apply_operator_fix("ok").unwrap().is_empty());
        assert!(apply_operator_fix("  ").unwrap().is_empty());
        assert_eq!(
            apply_operator_fix("2,3").unwrap(),
            PoseFix {
                location: Some(loc(2, 3)),
                heading: None
            }
        );
        assert_eq!(
            apply_operator_fix("2, -3, 6").unwrap(),
            PoseFix {
                location: Some(loc(2, -3)),
                heading: Some(Heading::EAST)
            }
        );
        assert_eq!(
            apply_operator_fix("4").unwrap().heading,
            Some(Heading::SOUTH)
        );
    }

    #[test]
    fn bad_operator_answers_are_rejected() {
        for bad in ["9", "1,2,3,4", "x,y", "maybe"] {
            assert!(
                matches!(apply_operator_fix(bad), Err(NavError::Configuration(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn repair_policy_parses() {
        assert_eq!("fatal".parse::<RepairPolicy>().unwrap(), RepairPolicy::Fatal);
        assert_eq!(
            "operator".parse::<RepairPolicy>().unwrap(),
            RepairPolicy::AskOperator
        );
        assert!("sometimes".parse::<RepairPolicy>().is_err());
    }
}
