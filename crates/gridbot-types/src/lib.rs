use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod geometry;

pub use geometry::{Heading, Location, TurnDirection};

/// What the map knows about a potential road leaving an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoadState {
    /// No information yet.
    #[default]
    Unknown,
    /// A road was seen but has not been traversed.
    Undriven,
    /// Confirmed: there is no road.
    None,
    /// Confirmed: the robot has driven this road.
    Driven,
}

impl RoadState {
    /// `Driven` and `None` are terminal; nothing downgrades them.
    pub fn is_confirmed(self) -> bool {
        matches!(self, RoadState::Driven | RoadState::None)
    }

    /// A road is known to exist in this direction.
    pub fn is_road(self) -> bool {
        matches!(self, RoadState::Undriven | RoadState::Driven)
    }

    /// Still worth exploring.
    pub fn is_unexplored(self) -> bool {
        matches!(self, RoadState::Unknown | RoadState::Undriven)
    }
}

impl fmt::Display for RoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoadState::Unknown => "unknown",
            RoadState::Undriven => "undriven",
            RoadState::None => "none",
            RoadState::Driven => "driven",
        };
        f.write_str(s)
    }
}

impl FromStr for RoadState {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(RoadState::Unknown),
            "undriven" => Ok(RoadState::Undriven),
            "none" => Ok(RoadState::None),
            "driven" => Ok(RoadState::Driven),
            other => Err(NavError::Configuration(format!(
                "invalid road state '{other}'"
            ))),
        }
    }
}

/// Transient obstruction flag, orthogonal to [`RoadState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockageState {
    Blocked,
    #[default]
    Unblocked,
}

impl BlockageState {
    pub fn is_blocked(self) -> bool {
        self == BlockageState::Blocked
    }
}

impl FromStr for BlockageState {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocked" => Ok(BlockageState::Blocked),
            "unblocked" => Ok(BlockageState::Unblocked),
            other => Err(NavError::Configuration(format!(
                "invalid blockage state '{other}'"
            ))),
        }
    }
}

/// Where the robot is and which way it faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pose {
    pub location: Location,
    pub heading: Heading,
}

/// Top-level behaviour of the navigator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Idle,
    Explore,
    Goal(Location),
    Manual,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Idle => write!(f, "idle"),
            Mode::Explore => write!(f, "explore"),
            Mode::Goal(loc) => write!(f, "goal {loc}"),
            Mode::Manual => write!(f, "manual"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Operator protocol
// ────────────────────────────────────────────────────────────────────────────

/// A line typed by the operator, parsed into a command for the control loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorCommand {
    Explore,
    Goal(Location),
    Manual,
    Turn(TurnDirection),
    Drive,
    Pause,
    Resume,
    /// Run exactly one tick while paused.
    Step,
    Show,
    Save(String),
    ClearBlockages,
    /// Answer to an outstanding repair prompt.
    Respond(String),
    Quit,
}

impl FromStr for OperatorCommand {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };
        let needs_no_arg = |cmd: OperatorCommand| {
            if rest.is_empty() {
                Ok(cmd)
            } else {
                Err(NavError::Configuration(format!(
                    "'{word}' takes no argument"
                )))
            }
        };
        match word.to_ascii_lowercase().as_str() {
            "explore" => needs_no_arg(OperatorCommand::Explore),
            "goal" => Ok(OperatorCommand::Goal(rest.parse()?)),
            "manual" => needs_no_arg(OperatorCommand::Manual),
            "left" | "right" => needs_no_arg(OperatorCommand::Turn(word.parse()?)),
            "drive" => needs_no_arg(OperatorCommand::Drive),
            "pause" => needs_no_arg(OperatorCommand::Pause),
            "resume" => needs_no_arg(OperatorCommand::Resume),
            "step" => needs_no_arg(OperatorCommand::Step),
            "show" => needs_no_arg(OperatorCommand::Show),
            "save" if !rest.is_empty() => Ok(OperatorCommand::Save(rest.to_string())),
            "save" => Err(NavError::Configuration("save needs a map name".into())),
            "clear-blockages" => needs_no_arg(OperatorCommand::ClearBlockages),
            "respond" if !rest.is_empty() => Ok(OperatorCommand::Respond(rest.to_string())),
            "respond" => Err(NavError::Configuration("respond needs an answer".into())),
            "quit" | "exit" => needs_no_arg(OperatorCommand::Quit),
            "" => Err(NavError::Configuration("empty command".into())),
            other => Err(NavError::Configuration(format!("unknown command '{other}'"))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Map snapshot
// ────────────────────────────────────────────────────────────────────────────

/// One intersection as shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub location: Location,
    /// Every heading is `Driven`, `None` or blocked.
    pub explored: bool,
    pub roads: [RoadState; 8],
    pub blocked: Vec<Heading>,
}

/// One undirected road as shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeView {
    pub a: Location,
    pub b: Location,
    pub blocked: bool,
}

/// Renderable view of the whole map plus robot pose and planned path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapSnapshot {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    pub robot: Option<Pose>,
    pub path: Vec<Location>,
}

// ────────────────────────────────────────────────────────────────────────────
// Status stream
// ────────────────────────────────────────────────────────────────────────────

/// Status message published by the control loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "gridbot-runtime::control"
    pub source: String,
    pub payload: StatusPayload,
}

impl StatusEvent {
    pub fn new(source: impl Into<String>, payload: StatusPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that flow out of the control loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatusPayload {
    Message(String),
    Pose(Pose),
    Snapshot(MapSnapshot),
    /// A serialized graph the operator asked to save under `name`.
    MapBlob {
        name: String,
        intersections: usize,
        edges: usize,
        blob: Vec<u8>,
    },
    /// The navigator is suspended waiting for `respond <text>`.
    Prompt(String),
    /// The control loop stopped.
    Halted { reason: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every gridbot crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavError {
    #[error("Map inconsistency at {location} heading {heading}: graph has {expected}, {detail}")]
    MapInconsistency {
        location: Location,
        heading: Heading,
        expected: RoadState,
        detail: String,
    },

    #[error("Unknown location {0}")]
    UnknownLocation(Location),

    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Channel Error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn road_state_parse_and_display() {
        for s in [
            RoadState::Unknown,
            RoadState::Undriven,
            RoadState::None,
            RoadState::Driven,
        ] {
            assert_eq!(s.to_string().parse::<RoadState>().unwrap(), s);
        }
        assert!(matches!(
            "maybe".parse::<RoadState>(),
            Err(NavError::Configuration(_))
        ));
    }

    #[test]
    fn road_state_classification() {
        assert!(RoadState::Driven.is_confirmed());
        assert!(RoadState::None.is_confirmed());
        assert!(!RoadState::Undriven.is_confirmed());
        assert!(RoadState::Undriven.is_unexplored());
        assert!(!RoadState::None.is_road());
    }

    #[test]
    fn blockage_parse_rejects_garbage() {
        assert_eq!(
            "Blocked".parse::<BlockageState>().unwrap(),
            BlockageState::Blocked
        );
        assert!("half".parse::<BlockageState>().is_err());
    }

    #[test]
    fn parse_operator_commands() {
        use OperatorCommand as C;
        assert_eq!("explore".parse::<C>().unwrap(), C::Explore);
        assert_eq!(
            "goal 2,-3".parse::<C>().unwrap(),
            C::Goal(Location::new(2, -3))
        );
        assert_eq!(
            "LEFT".parse::<C>().unwrap(),
            C::Turn(TurnDirection::Left)
        );
        assert_eq!(
            "save my map".parse::<C>().unwrap(),
            C::Save("my map".to_string())
        );
        assert_eq!(
            "respond 1,2,6".parse::<C>().unwrap(),
            C::Respond("1,2,6".to_string())
        );
        assert_eq!("clear-blockages".parse::<C>().unwrap(), C::ClearBlockages);
    }

    #[test]
    fn parse_operator_command_errors() {
        use OperatorCommand as C;
        for bad in ["", "fly", "goal", "goal x,y", "save", "explore now"] {
            assert!(
                matches!(bad.parse::<C>(), Err(NavError::Configuration(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn nav_error_serialization_roundtrip() {
        let err = NavError::MapInconsistency {
            location: Location::new(1, 1),
            heading: Heading::EAST,
            expected: RoadState::Driven,
            detail: "no road seen".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: NavError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
        assert!(err.to_string().contains("driven"));
    }

    #[test]
    fn status_event_has_fresh_id() {
        let a = StatusEvent::new("test", StatusPayload::Message("hi".into()));
        let b = StatusEvent::new("test", StatusPayload::Message("hi".into()));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn snapshot_serializes() {
        let snap = MapSnapshot {
            nodes: vec![NodeView {
                location: Location::ORIGIN,
                explored: false,
                roads: [RoadState::Unknown; 8],
                blocked: vec![Heading::NORTH],
            }],
            edges: vec![],
            robot: Some(Pose {
                location: Location::ORIGIN,
                heading: Heading::NORTH,
            }),
            path: vec![],
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: MapSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
    }
}
