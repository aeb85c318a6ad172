//! [`Navigator`] – the drive/decide state machine.
//!
//! Each call to [`Navigator::tick`] advances the robot by at most one road
//! segment:
//!
//! 1. **Drive** – follow the line to the next intersection. On arrival the
//!    location advances, the map records the driven road, the two diagonals
//!    flanking the road just driven are marked absent, the range sensors are
//!    checked for blockages, and the line sensor's view straight ahead is
//!    reconciled with the map. An obstruction blocks the road ahead instead
//!    and the robot stays put.
//! 2. **Decide** – depending on the [`Mode`], choose the next heading and
//!    turn to it. Every turn is quantized, checked against the map with
//!    [`verify_turn_angle`] and recorded with
//!    [`MapGraph::record_turn_sweep`].
//!
//! # Modes
//!
//! | Mode | Decision |
//! |---|---|
//! | `Explore` | sweep unknown headings, drive undriven roads, plan to the nearest frontier, else wander; done when the map is complete |
//! | `Goal(x, y)` | follow the planned route, replanning around blockages; off-map goals go via the most promising frontier |
//! | `Manual` | nothing automatic: [`Navigator::manual_turn`] and [`Navigator::request_drive`] |
//! | `Idle` | nothing |
//!
//! # Operator repair
//!
//! With [`RepairPolicy::AskOperator`] a contradiction between the sensors and
//! the map does not abort. `tick` returns
//! [`TickOutcome::NeedsOperatorInput`] and keeps returning it until
//! [`Navigator::resume`] is called with the operator's answer. The same
//! suspension is used for turn corrections onto never-seen headings when
//! [`NavigatorConfig::confirm_uncertain_turns`] is set.
//!
//! # Example
//!
//! ```rust
//! use gridbot_hal::{SimRobot, SimWorld};
//! use gridbot_runtime::{Navigator, NavigatorConfig, TickOutcome};
//! use gridbot_types::Mode;
//!
//! let robot = SimRobot::new(SimWorld::grid(2, 2));
//! let mut nav = Navigator::new(robot, NavigatorConfig::default());
//! nav.set_mode(Mode::Explore);
//! loop {
//!     match nav.tick().unwrap() {
//!         TickOutcome::Continue => continue,
//!         outcome => {
//!             assert_eq!(outcome, TickOutcome::ExplorationComplete);
//!             break;
//!         }
//!     }
//! }
//! assert_eq!(nav.graph().unwrap().len(), 4);
//! ```

use std::collections::VecDeque;

use gridbot_hal::{FollowOutcome, LineSensor, RobotHardware, quantize_angle};
use gridbot_kernel::{
    ApproachVerdict, Discrepancy, PoseFix, RepairPolicy, TurnCheck, apply_operator_fix,
    verify_approach, verify_turn_angle,
};
use gridbot_mapping::{CompletenessPolicy, Intersection, MapGraph, Planner, frontier};
use gridbot_types::{
    Heading, Location, MapSnapshot, Mode, NavError, Pose, RoadState, TurnDirection,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::blockage::{BlockageConfig, BlockageDetector, RangeSensor};
use crate::loop_guard::LoopGuard;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Upper bound on turns spent reaching one heading or sweeping one
/// intersection. A full revolution never needs more.
const MAX_TURNS: usize = 8;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime knobs for [`Navigator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// What to do when the line sensor contradicts the map.
    pub repair_policy: RepairPolicy,
    /// Ask the operator before recording a turn that was corrected onto a
    /// heading nobody has observed yet.
    pub confirm_uncertain_turns: bool,
    pub completeness: CompletenessPolicy,
    pub blockage: BlockageConfig,
    /// Consecutive wander decisions tolerated before recovery kicks in.
    pub fallback_loop_threshold: usize,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            repair_policy: RepairPolicy::Fatal,
            confirm_uncertain_turns: false,
            completeness: CompletenessPolicy::Strict,
            blockage: BlockageConfig::default(),
            fallback_loop_threshold: 3,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes & internal state
// ─────────────────────────────────────────────────────────────────────────────

/// What one [`Navigator::tick`] achieved.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Progress was made; tick again.
    Continue,
    /// Nothing to do in the current mode.
    Idle,
    /// Suspended until [`Navigator::resume`]; carries the question.
    NeedsOperatorInput(String),
    ExplorationComplete,
    /// Exploration gave up after recovery failed.
    ExplorationHalted,
    GoalReached(Location),
    GoalUnreachable(Location),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Drive,
    Decide,
}

#[derive(Debug, Clone)]
enum Pending {
    Approach(Discrepancy),
    Turn {
        start: Heading,
        turn: TurnDirection,
        check: TurnCheck,
    },
}

impl Pending {
    fn prompt(&self, location: Location) -> String {
        match self {
            Pending::Approach(discrepancy) => discrepancy.prompt(),
            Pending::Turn { start, turn, check } => format!(
                "At {location} a {turn} turn from heading {start} was corrected to {}, which has never been observed. Reply 'h' with the heading the robot faces, or 'ok' to accept",
                check.heading
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigator
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the map and the hardware and decides every move.
///
/// The robot starts at the origin facing north. The map is created on the
/// first arrival (or at the origin, if the first thing the robot does is
/// turn or get obstructed).
pub struct Navigator<H> {
    hardware: H,
    config: NavigatorConfig,
    graph: Option<MapGraph>,
    pose: Pose,
    mode: Mode,
    phase: Phase,
    path: VecDeque<Heading>,
    planner: Planner,
    detector: BlockageDetector,
    fallback_guard: LoopGuard<MapProgress>,
    pending: Option<Pending>,
    /// Automatic blockage clearing has been spent for the current mode.
    blockages_cleared: bool,
    drive_requested: bool,
}

impl<H: RobotHardware> Navigator<H> {
    pub fn new(hardware: H, config: NavigatorConfig) -> Self {
        Self {
            hardware,
            detector: BlockageDetector::new(config.blockage),
            fallback_guard: LoopGuard::new(config.fallback_loop_threshold),
            config,
            graph: None,
            pose: Pose {
                location: Location::ORIGIN,
                heading: Heading::NORTH,
            },
            mode: Mode::Idle,
            phase: Phase::Drive,
            path: VecDeque::new(),
            planner: Planner::new(),
            pending: None,
            blockages_cleared: false,
            drive_requested: false,
        }
    }

    /// Start from a previously saved map instead of an empty one. The robot
    /// must be standing at the origin facing north, as it was when the map
    /// was first built.
    pub fn with_map(mut self, mut graph: MapGraph) -> Self {
        graph.set_policy(self.config.completeness);
        info!(
            intersections = graph.len(),
            edges = graph.edge_count(),
            "starting from a saved map"
        );
        self.graph = Some(graph);
        self.phase = Phase::Decide;
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// `None` until the robot has arrived somewhere or turned.
    pub fn graph(&self) -> Option<&MapGraph> {
        self.graph.as_ref()
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Remaining headings of the current route.
    pub fn path(&self) -> &VecDeque<Heading> {
        &self.path
    }

    /// The outstanding operator question, if suspended.
    pub fn pending_prompt(&self) -> Option<String> {
        self.pending
            .as_ref()
            .map(|p| p.prompt(self.pose.location))
    }

    /// Map, pose and planned route for display.
    pub fn snapshot(&self) -> MapSnapshot {
        let path = Planner::path_locations(self.pose.location, &self.path);
        match &self.graph {
            Some(graph) => graph.snapshot(Some(self.pose), &path),
            None => MapSnapshot {
                robot: Some(self.pose),
                ..MapSnapshot::default()
            },
        }
    }

    // ── Operator controls ─────────────────────────────────────────────────────

    /// Switch mode. Drops the current route and re-arms automatic recovery.
    pub fn set_mode(&mut self, mode: Mode) {
        info!(from = %self.mode, to = %mode, "mode changed");
        self.mode = mode;
        self.path.clear();
        self.fallback_guard.reset();
        self.blockages_cleared = false;
        self.drive_requested = false;
        self.phase = if self.graph.is_none() && mode != Mode::Manual {
            Phase::Drive
        } else {
            Phase::Decide
        };
    }

    /// Forget every blockage. Obstacles still there are found again on the
    /// next arrival.
    pub fn clear_all_blockages(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.clear_all_blockages();
            self.path.clear();
            info!("blockages cleared");
        }
    }

    /// Turn once in `direction` (manual mode only).
    ///
    /// # Errors
    ///
    /// [`NavError::Configuration`] outside manual mode; hardware and map
    /// errors from the turn itself.
    pub fn manual_turn(&mut self, direction: TurnDirection) -> Result<TickOutcome, NavError> {
        self.require_manual("turn")?;
        if let Some(prompt) = self.pending_prompt() {
            return Ok(TickOutcome::NeedsOperatorInput(prompt));
        }
        Ok(self.turn_once(direction)?.unwrap_or(TickOutcome::Continue))
    }

    /// Allow exactly one drive segment on the next tick (manual mode only).
    pub fn request_drive(&mut self) -> Result<(), NavError> {
        self.require_manual("drive")?;
        self.drive_requested = true;
        Ok(())
    }

    /// Answer the outstanding operator question.
    ///
    /// For a map contradiction the answer re-anchors the pose (`x,y[,h]` or
    /// `h`) and the view ahead is checked again, which may raise a new
    /// question; `ok` keeps the map as it is. For a turn correction the
    /// answer is the heading actually faced, or `ok` to accept the guess.
    ///
    /// # Errors
    ///
    /// [`NavError::Configuration`] when nothing is pending or the answer is
    /// unreadable, [`NavError::UnknownLocation`] for an unmapped location.
    /// The question stays pending on error.
    pub fn resume(&mut self, answer: &str) -> Result<(), NavError> {
        let Some(pending) = self.pending.clone() else {
            return Err(NavError::Configuration(
                "nothing is waiting for an answer".to_string(),
            ));
        };
        let fix = apply_operator_fix(answer)?;
        match pending {
            Pending::Approach(discrepancy) => self.resolve_approach(&discrepancy, fix),
            Pending::Turn { start, turn, check } => self.resolve_turn(start, turn, &check, fix),
        }
    }

    // ── Tick ──────────────────────────────────────────────────────────────────

    /// Advance by at most one drive segment and one decision.
    ///
    /// # Errors
    ///
    /// Hardware faults, and map contradictions under
    /// [`RepairPolicy::Fatal`].
    #[instrument(skip(self), fields(mode = %self.mode))]
    pub fn tick(&mut self) -> Result<TickOutcome, NavError> {
        if let Some(prompt) = self.pending_prompt() {
            return Ok(TickOutcome::NeedsOperatorInput(prompt));
        }
        match self.mode {
            Mode::Idle => Ok(TickOutcome::Idle),
            Mode::Manual => {
                if !std::mem::take(&mut self.drive_requested) {
                    return Ok(TickOutcome::Idle);
                }
                Ok(self.drive_segment()?.unwrap_or(TickOutcome::Continue))
            }
            Mode::Explore => {
                if self.phase == Phase::Drive
                    && let Some(outcome) = self.drive_segment()?
                {
                    return Ok(outcome);
                }
                self.decide_explore()
            }
            Mode::Goal(destination) => {
                if self.phase == Phase::Drive
                    && let Some(outcome) = self.drive_segment()?
                {
                    return Ok(outcome);
                }
                self.decide_goal(destination)
            }
        }
    }

    // ── Drive ─────────────────────────────────────────────────────────────────

    /// Follow the line one segment. `Some` when suspended for the operator.
    fn drive_segment(&mut self) -> Result<Option<TickOutcome>, NavError> {
        let Pose {
            location: prev,
            heading,
        } = self.pose;
        self.phase = Phase::Decide;

        if self.hardware.line_follow()? == FollowOutcome::Obstructed {
            warn!(location = %prev, %heading, "obstructed, staying put");
            self.ensure_graph()
                .block(prev, prev.step(heading), heading)?;
            self.path.clear();
            return Ok(None);
        }

        let location = prev.step(heading);
        match self.graph.as_mut() {
            Some(graph) => {
                graph.record_driven(prev, location, heading)?;
            }
            None => {
                let graph = MapGraph::new(location, heading)?.with_policy(self.config.completeness);
                self.graph = Some(graph);
            }
        }
        self.pose.location = location;
        info!(from = %prev, to = %location, %heading, "arrived");

        let graph = map_mut(&mut self.graph)?;
        for flank in [heading.rotate(3), heading.rotate(5)] {
            if graph.intersection(location).map(|n| n.road(flank)) == Some(RoadState::Unknown) {
                graph.record_absent(location, flank)?;
            }
        }
        self.detector
            .scan(&mut self.hardware, graph, self.pose, &RangeSensor::ALL)?;
        self.hardware.pullup()?;
        self.verify_ahead()
    }

    /// Reconcile the line sensor's view ahead with the map.
    fn verify_ahead(&mut self) -> Result<Option<TickOutcome>, NavError> {
        let road_seen = LineSensor::read(&mut self.hardware)?.iter().any(|&on| on);
        let graph = map_mut(&mut self.graph)?;
        let verdict = verify_approach(
            graph,
            self.pose.location,
            self.pose.heading,
            road_seen,
            self.config.repair_policy,
        )?;
        match verdict {
            ApproachVerdict::NeedsRepair(discrepancy) => {
                let prompt = discrepancy.prompt();
                self.pending = Some(Pending::Approach(discrepancy));
                Ok(Some(TickOutcome::NeedsOperatorInput(prompt)))
            }
            verdict => {
                debug!(?verdict, "approach verified");
                Ok(None)
            }
        }
    }

    // ── Decide: explore ───────────────────────────────────────────────────────

    fn decide_explore(&mut self) -> Result<TickOutcome, NavError> {
        self.ensure_graph();
        if let Some(outcome) = self.sweep_unknown()? {
            return Ok(outcome);
        }

        let graph = map_ref(&self.graph)?;
        if graph.is_complete() {
            info!(
                intersections = graph.len(),
                edges = graph.edge_count(),
                "exploration complete"
            );
            self.finish()?;
            return Ok(TickOutcome::ExplorationComplete);
        }

        if let Some(outcome) = self.follow_path()? {
            return Ok(outcome);
        }

        let location = self.pose.location;
        let undriven = frontier::local_unexplored_heading(self.here()?);
        if let Some(heading) = undriven {
            self.fallback_guard.reset();
            debug!(%location, %heading, "driving an undriven road");
            return self.head_out(heading, false);
        }

        let graph = map_ref(&self.graph)?;
        if let Some(target) = frontier::find_unexplored(graph, location) {
            self.planner.reset(graph, target)?;
            let path = self.planner.path_from(graph, location);
            if let Some(&first) = path.front() {
                info!(%target, hops = path.len(), "heading for frontier");
                self.fallback_guard.reset();
                self.path = path;
                return self.head_out(first, true);
            }
        }

        if self.fallback_guard.record(MapProgress::of(graph)) {
            warn!(
                streak = self.fallback_guard.streak(),
                "exploration keeps falling back"
            );
            return self.recover_or(TickOutcome::ExplorationHalted);
        }
        let fallback = frontier::nearest_reachable_heading(self.here()?, self.pose.heading);
        match fallback {
            Some(heading) => {
                debug!(%location, %heading, "no frontier reachable, wandering");
                self.head_out(heading, false)
            }
            None => {
                warn!(%location, "no usable road here");
                self.recover_or(TickOutcome::ExplorationHalted)
            }
        }
    }

    // ── Decide: goal ──────────────────────────────────────────────────────────

    fn decide_goal(&mut self, destination: Location) -> Result<TickOutcome, NavError> {
        let location = self.pose.location;
        if location == destination {
            info!(%destination, "goal reached");
            self.finish()?;
            return Ok(TickOutcome::GoalReached(destination));
        }

        let on_map = self.ensure_graph().contains(destination);
        if !on_map && let Some(outcome) = self.sweep_unknown()? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.follow_path()? {
            return Ok(outcome);
        }

        let graph = map_ref(&self.graph)?;
        if on_map {
            self.planner.reset(graph, destination)?;
            let path = self.planner.path_from(graph, location);
            let Some(&first) = path.front() else {
                warn!(%destination, "no route to goal");
                return self.recover_or(TickOutcome::GoalUnreachable(destination));
            };
            info!(%destination, hops = path.len(), "route planned");
            self.path = path;
            return self.head_out(first, true);
        }

        let Some(subtarget) = frontier::closest_subtarget(graph, location, destination) else {
            warn!(%destination, "goal is off the map and no frontier is left");
            return self.recover_or(TickOutcome::GoalUnreachable(destination));
        };
        if subtarget.location == location {
            let here = self.here()?;
            let heading = frontier::heading_toward(here, destination)
                .filter(|&h| here.road(h).is_unexplored())
                .unwrap_or(subtarget.heading);
            debug!(%destination, %heading, "leaving the map toward the goal");
            return self.head_out(heading, false);
        }
        self.planner.reset(graph, subtarget.location)?;
        let path = self.planner.path_from(graph, location);
        let Some(&first) = path.front() else {
            return self.recover_or(TickOutcome::GoalUnreachable(destination));
        };
        info!(
            %destination,
            subtarget = %subtarget.location,
            score = subtarget.score,
            "heading for subtarget"
        );
        self.path = path;
        self.head_out(first, true)
    }

    // ── Decision helpers ──────────────────────────────────────────────────────

    /// Continue the stored route if its next road is still usable.
    fn follow_path(&mut self) -> Result<Option<TickOutcome>, NavError> {
        let Some(&next) = self.path.front() else {
            return Ok(None);
        };
        let here = self.here()?;
        if here.road(next).is_road() && !here.is_blocked(next) {
            return self.head_out(next, true).map(Some);
        }
        debug!(%next, "route blocked, replanning");
        self.path.clear();
        Ok(None)
    }

    /// Turn to `heading` and arm the next drive. `from_path` pops the route
    /// once the robot faces it.
    fn head_out(&mut self, heading: Heading, from_path: bool) -> Result<TickOutcome, NavError> {
        if !from_path {
            self.path.clear();
        }
        if let Some(outcome) = self.turn_to(heading)? {
            return Ok(outcome);
        }
        if self.pose.heading != heading || self.here()?.is_blocked(heading) {
            debug!(%heading, "road unusable after turning");
            self.path.clear();
            return Ok(TickOutcome::Continue);
        }
        if from_path {
            self.path.pop_front();
        }
        self.phase = Phase::Drive;
        Ok(TickOutcome::Continue)
    }

    /// Give up on the current mode, but clear blockages and retry once first.
    fn recover_or(&mut self, give_up: TickOutcome) -> Result<TickOutcome, NavError> {
        self.path.clear();
        if !self.blockages_cleared {
            warn!("clearing all blockages and retrying");
            self.blockages_cleared = true;
            self.fallback_guard.reset();
            if let Some(graph) = self.graph.as_mut() {
                graph.clear_all_blockages();
            }
            return Ok(TickOutcome::Continue);
        }
        warn!(outcome = ?give_up, "giving up");
        self.finish()?;
        Ok(give_up)
    }

    fn finish(&mut self) -> Result<(), NavError> {
        self.hardware.stop()?;
        self.path.clear();
        self.mode = Mode::Idle;
        self.phase = Phase::Decide;
        Ok(())
    }

    // ── Turning ───────────────────────────────────────────────────────────────

    /// Turn toward every `Unknown` heading here until none is left.
    fn sweep_unknown(&mut self) -> Result<Option<TickOutcome>, NavError> {
        for _ in 0..MAX_TURNS {
            let here = self.here()?;
            let facing = self.pose.heading;
            let unknown = |h: Heading| here.road(h) == RoadState::Unknown;
            if !Heading::all().any(|h| unknown(h)) {
                return Ok(None);
            }
            let left = (0..4).any(|k| unknown(facing.rotate(k)));
            let right = (1..4).any(|k| unknown(facing.rotate(-k)));
            let direction = if right && !left {
                TurnDirection::Right
            } else {
                TurnDirection::Left
            };
            if let Some(outcome) = self.turn_once(direction)? {
                return Ok(Some(outcome));
            }
        }
        warn!(location = %self.pose.location, "sweep gave up with headings still unknown");
        Ok(None)
    }

    /// Turn until facing `target`, or until the map says it has no road.
    fn turn_to(&mut self, target: Heading) -> Result<Option<TickOutcome>, NavError> {
        for _ in 0..MAX_TURNS {
            if self.pose.heading == target {
                return Ok(None);
            }
            let here = self.here()?;
            if here.road(target) == RoadState::None {
                warn!(%target, "target heading has no road after all");
                return Ok(None);
            }
            let direction = turn_direction(here, self.pose.heading, target);
            if let Some(outcome) = self.turn_once(direction)? {
                return Ok(Some(outcome));
            }
        }
        if self.pose.heading == target {
            return Ok(None);
        }
        Err(NavError::HardwareFault {
            component: "drive_base".to_string(),
            details: format!(
                "could not reach heading {target} at {}",
                self.pose.location
            ),
        })
    }

    /// One verified turn. `Some` when suspended for the operator.
    fn turn_once(&mut self, direction: TurnDirection) -> Result<Option<TickOutcome>, NavError> {
        let start = self.pose.heading;
        let location = self.pose.location;
        let measured = quantize_angle(self.hardware.execute_turn(direction)?);
        let check = verify_turn_angle(self.ensure_graph(), location, start, measured, direction)?;

        if check.needs_confirmation && self.config.confirm_uncertain_turns {
            let pending = Pending::Turn {
                start,
                turn: direction,
                check,
            };
            let prompt = pending.prompt(location);
            self.pending = Some(pending);
            return Ok(Some(TickOutcome::NeedsOperatorInput(prompt)));
        }
        self.finish_turn(start, direction, check.angle)?;
        Ok(None)
    }

    fn finish_turn(
        &mut self,
        start: Heading,
        direction: TurnDirection,
        angle: f64,
    ) -> Result<(), NavError> {
        let location = self.pose.location;
        let graph = map_mut(&mut self.graph)?;
        let heading = graph.record_turn_sweep(location, start, angle, direction)?;
        self.pose.heading = heading;
        debug!(%location, %start, %heading, "turned");
        self.detector
            .scan(&mut self.hardware, graph, self.pose, &[RangeSensor::Center])?;
        Ok(())
    }

    // ── Operator repair ───────────────────────────────────────────────────────

    fn resolve_approach(&mut self, discrepancy: &Discrepancy, fix: PoseFix) -> Result<(), NavError> {
        if fix.is_empty() {
            info!(%discrepancy, "operator kept the map");
            self.pending = None;
            return Ok(());
        }
        let location = fix.location.unwrap_or(self.pose.location);
        if !map_ref(&self.graph)?.contains(location) {
            return Err(NavError::UnknownLocation(location));
        }
        self.pose = Pose {
            location,
            heading: fix.heading.unwrap_or(self.pose.heading),
        };
        self.path.clear();
        self.pending = None;
        info!(%location, heading = %self.pose.heading, "pose re-anchored by operator");
        if let Some(TickOutcome::NeedsOperatorInput(prompt)) = self.verify_ahead()? {
            warn!(%prompt, "still inconsistent after re-anchoring");
        }
        Ok(())
    }

    fn resolve_turn(
        &mut self,
        start: Heading,
        direction: TurnDirection,
        check: &TurnCheck,
        fix: PoseFix,
    ) -> Result<(), NavError> {
        if fix.location.is_some() {
            return Err(NavError::Configuration(
                "answer a turn question with a heading, not a location".to_string(),
            ));
        }
        let angle = match fix.heading {
            None => check.angle,
            Some(heading) => {
                let steps = match start.steps_to(heading, direction) {
                    0 => 8,
                    k => k,
                };
                f64::from(steps) * 45.0
            }
        };
        self.finish_turn(start, direction, angle)?;
        self.pending = None;
        info!(heading = %self.pose.heading, "turn confirmed by operator");
        Ok(())
    }

    // ── Small helpers ─────────────────────────────────────────────────────────

    fn require_manual(&self, what: &str) -> Result<(), NavError> {
        if self.mode == Mode::Manual {
            Ok(())
        } else {
            Err(NavError::Configuration(format!(
                "'{what}' needs manual mode (currently {})",
                self.mode
            )))
        }
    }

    /// The map, started at the origin if nothing has been recorded yet.
    fn ensure_graph(&mut self) -> &mut MapGraph {
        let policy = self.config.completeness;
        self.graph.get_or_insert_with(|| {
            debug!("map started at the origin");
            MapGraph::origin().with_policy(policy)
        })
    }

    fn here(&self) -> Result<&Intersection, NavError> {
        map_ref(&self.graph)?
            .intersection(self.pose.location)
            .ok_or(NavError::UnknownLocation(self.pose.location))
    }
}

/// How much of the map is known. Two fallbacks with the same value learned
/// nothing in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MapProgress {
    intersections: usize,
    roads: usize,
    settled_headings: usize,
}

impl MapProgress {
    fn of(graph: &MapGraph) -> Self {
        Self {
            intersections: graph.len(),
            roads: graph.edge_count(),
            settled_headings: graph
                .iter()
                .flat_map(|(_, node)| node.roads().iter())
                .filter(|&&road| road != RoadState::Unknown)
                .count(),
        }
    }
}

fn map_ref(graph: &Option<MapGraph>) -> Result<&MapGraph, NavError> {
    graph
        .as_ref()
        .ok_or_else(|| NavError::Configuration("nothing has been mapped yet".to_string()))
}

fn map_mut(graph: &mut Option<MapGraph>) -> Result<&mut MapGraph, NavError> {
    graph
        .as_mut()
        .ok_or_else(|| NavError::Configuration("nothing has been mapped yet".to_string()))
}

/// Which way to turn to face `target`: the shorter way round, and for a
/// reversal the side whose nearest undriven road is closer.
fn turn_direction(here: &Intersection, facing: Heading, target: Heading) -> TurnDirection {
    match facing.steps_to(target, TurnDirection::Left) {
        1..=3 => TurnDirection::Left,
        5..=7 => TurnDirection::Right,
        _ => {
            let nearest = |direction: TurnDirection| {
                (1..4).find(|&k| here.road(facing.turned(direction, k)) == RoadState::Undriven)
            };
            match (nearest(TurnDirection::Left), nearest(TurnDirection::Right)) {
                (Some(l), Some(r)) if r < l => TurnDirection::Right,
                (None, Some(_)) => TurnDirection::Right,
                _ => TurnDirection::Left,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbot_hal::{SimRobot, SimWorld};

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    fn h(value: u8) -> Heading {
        Heading::new(value).unwrap()
    }

    fn nav(world: SimWorld) -> Navigator<SimRobot> {
        Navigator::new(SimRobot::new(world), NavigatorConfig::default())
    }

    fn run_until_settled<H: RobotHardware>(nav: &mut Navigator<H>) -> TickOutcome {
        for _ in 0..200 {
            match nav.tick().unwrap() {
                TickOutcome::Continue => {}
                outcome => return outcome,
            }
        }
        panic!("navigator did not settle");
    }

    #[test]
    fn idle_navigator_does_nothing() {
        let mut nav = nav(SimWorld::grid(2, 2));
        assert_eq!(nav.tick().unwrap(), TickOutcome::Idle);
        assert!(nav.graph().is_none());
        assert_eq!(nav.hardware().line_follows(), 0);
    }

    #[test]
    fn first_arrival_creates_the_map() {
        let mut nav = nav(SimWorld::grid(1, 3));
        nav.set_mode(Mode::Explore);
        assert_eq!(nav.tick().unwrap(), TickOutcome::Continue);
        let graph = nav.graph().unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.intersection(Location::ORIGIN).unwrap().road(Heading::NORTH),
            RoadState::Driven
        );
        // Flanking diagonals of the road just driven.
        let here = graph.intersection(loc(0, 1)).unwrap();
        assert_eq!(here.road(h(3)), RoadState::None);
        assert_eq!(here.road(h(5)), RoadState::None);
    }

    #[test]
    fn navigator_pose_tracks_the_simulator() {
        let mut nav = nav(SimWorld::grid(2, 2));
        nav.set_mode(Mode::Explore);
        for _ in 0..3 {
            nav.tick().unwrap();
            assert_eq!(nav.pose(), nav.hardware().pose());
        }
    }

    #[test]
    fn reversal_prefers_side_with_nearer_undriven_road() {
        let mut graph = MapGraph::origin();
        graph.record_seen(Location::ORIGIN, h(6)).unwrap();
        let here = graph.intersection(Location::ORIGIN).unwrap();
        assert_eq!(
            turn_direction(here, Heading::NORTH, Heading::SOUTH),
            TurnDirection::Right
        );
        assert_eq!(
            turn_direction(here, Heading::NORTH, Heading::WEST),
            TurnDirection::Left
        );
        assert_eq!(
            turn_direction(here, Heading::NORTH, Heading::EAST),
            TurnDirection::Right
        );
    }

    #[test]
    fn manual_controls_require_manual_mode() {
        let mut nav = nav(SimWorld::grid(2, 2));
        assert!(matches!(
            nav.manual_turn(TurnDirection::Left),
            Err(NavError::Configuration(_))
        ));
        assert!(matches!(
            nav.request_drive(),
            Err(NavError::Configuration(_))
        ));
    }

    #[test]
    fn manual_drive_is_one_segment_per_request() {
        let mut nav = nav(SimWorld::grid(1, 3));
        nav.set_mode(Mode::Manual);
        assert_eq!(nav.tick().unwrap(), TickOutcome::Idle);
        nav.request_drive().unwrap();
        assert_eq!(nav.tick().unwrap(), TickOutcome::Continue);
        assert_eq!(nav.tick().unwrap(), TickOutcome::Idle);
        assert_eq!(nav.pose().location, loc(0, 1));
        assert_eq!(nav.hardware().line_follows(), 1);
    }

    #[test]
    fn manual_turn_records_sweep() {
        // Origin of a 2x2 grid has roads north and east only.
        let mut nav = nav(SimWorld::grid(2, 2));
        nav.set_mode(Mode::Manual);
        assert_eq!(
            nav.manual_turn(TurnDirection::Right).unwrap(),
            TickOutcome::Continue
        );
        assert_eq!(nav.pose().heading, Heading::EAST);
        let origin = nav.graph().unwrap().intersection(Location::ORIGIN).unwrap();
        assert_eq!(origin.road(h(7)), RoadState::None);
        assert_eq!(origin.road(Heading::EAST), RoadState::Undriven);
    }

    #[test]
    fn resume_without_question_is_an_error() {
        let mut nav = nav(SimWorld::grid(2, 2));
        assert!(matches!(
            nav.resume("ok"),
            Err(NavError::Configuration(_))
        ));
    }

    #[test]
    fn obstruction_before_first_arrival_blocks_origin_road() {
        let world = SimWorld::grid(1, 2).with_obstacle(Location::ORIGIN, Heading::NORTH);
        let mut nav = nav(world);
        nav.set_mode(Mode::Explore);
        nav.tick().unwrap();
        let origin = nav.graph().unwrap().intersection(Location::ORIGIN).unwrap();
        assert!(origin.is_blocked(Heading::NORTH));
        assert_eq!(nav.pose().location, Location::ORIGIN);
    }

    #[test]
    fn snapshot_without_map_still_shows_robot() {
        let nav = nav(SimWorld::grid(2, 2));
        let snapshot = nav.snapshot();
        assert!(snapshot.nodes.is_empty());
        assert_eq!(snapshot.robot, Some(nav.pose()));
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: NavigatorConfig = toml::from_str(
            r#"
repair_policy = "operator"

[blockage]
samples = 3
"#,
        )
        .unwrap();
        assert_eq!(config.repair_policy, RepairPolicy::AskOperator);
        assert_eq!(config.blockage.samples, 3);
        assert_eq!(config.fallback_loop_threshold, 3);
        assert_eq!(config.completeness, CompletenessPolicy::Strict);
    }

    #[test]
    fn explore_2x2_settles_complete() {
        let mut nav = nav(SimWorld::grid(2, 2));
        nav.set_mode(Mode::Explore);
        assert_eq!(run_until_settled(&mut nav), TickOutcome::ExplorationComplete);
        assert_eq!(nav.mode(), Mode::Idle);
    }

    #[test]
    fn map_progress_only_moves_when_something_is_learned() {
        let mut graph = MapGraph::new(loc(0, 1), Heading::NORTH).unwrap();
        let before = MapProgress::of(&graph);
        graph
            .record_driven(Location::ORIGIN, loc(0, 1), Heading::NORTH)
            .unwrap();
        assert_eq!(MapProgress::of(&graph), before);

        graph.record_absent(loc(0, 1), Heading::EAST).unwrap();
        assert_ne!(MapProgress::of(&graph), before);
    }
}
