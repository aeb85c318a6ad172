//! In-process simulation for CI/CD testing without physical hardware.
//!
//! [`SimWorld`] describes a taped grid: a set of straight road segments
//! between neighbouring intersections plus obstacles parked on some of them.
//! [`SimRobot`] drives that world through the same [`DriveBase`],
//! [`LineSensor`] and [`ProximitySensor`] traits the real robot implements,
//! so the whole navigator runs headless in tests and in the CLI.
//!
//! Turns behave like the hardware: the robot spins until its sensors cross
//! the next road and reports the angle it thinks it turned. Scripted noise
//! can be queued to exercise angle correction.
//!
//! # Example
//!
//! ```rust
//! use gridbot_hal::sim::{SimRobot, SimWorld};
//! use gridbot_hal::{DriveBase, FollowOutcome};
//! use gridbot_types::{Location, TurnDirection};
//!
//! let mut robot = SimRobot::new(SimWorld::grid(2, 2));
//! assert_eq!(robot.line_follow().unwrap(), FollowOutcome::ArrivedAtIntersection);
//! assert_eq!(robot.pose().location, Location::new(0, 1));
//!
//! // From (0,1) facing north the next road clockwise is east.
//! assert_eq!(robot.execute_turn(TurnDirection::Right).unwrap(), 90.0);
//! ```

use std::collections::{HashSet, VecDeque};

use gridbot_types::{Heading, Location, NavError, Pose, TurnDirection};
use tracing::trace;

use crate::drive::{DriveBase, FollowOutcome};
use crate::sensors::{LineSensor, ProximityReading, ProximitySensor};

/// Range reported when an obstacle sits on the road a sensor looks down.
pub const OBSTACLE_RANGE_M: f64 = 0.2;
/// Range reported when nothing is there.
pub const CLEAR_RANGE_M: f64 = 2.0;

// ────────────────────────────────────────────────────────────────────────────
// World
// ────────────────────────────────────────────────────────────────────────────

/// Undirected road segment key: endpoints in ascending order.
type Segment = (Location, Location);

fn segment(at: Location, heading: Heading) -> Segment {
    let other = at.step(heading);
    if at <= other { (at, other) } else { (other, at) }
}

/// The taped grid the simulated robot drives on.
#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    roads: HashSet<Segment>,
    obstacles: HashSet<Segment>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// `width × height` lattice of axis-aligned roads with its south-west
    /// corner at the origin.
    pub fn grid(width: i32, height: i32) -> Self {
        let mut world = Self::new();
        for y in 0..height {
            for x in 0..width {
                let here = Location::new(x, y);
                if x + 1 < width {
                    world.add_road(here, Heading::EAST);
                }
                if y + 1 < height {
                    world.add_road(here, Heading::NORTH);
                }
            }
        }
        world
    }

    /// Builder-style [`SimWorld::add_road`].
    pub fn with_road(mut self, at: Location, heading: Heading) -> Self {
        self.add_road(at, heading);
        self
    }

    /// Builder-style [`SimWorld::remove_road`].
    pub fn without_road(mut self, at: Location, heading: Heading) -> Self {
        self.remove_road(at, heading);
        self
    }

    /// Builder-style [`SimWorld::place_obstacle`].
    pub fn with_obstacle(mut self, at: Location, heading: Heading) -> Self {
        self.place_obstacle(at, heading);
        self
    }

    pub fn add_road(&mut self, at: Location, heading: Heading) {
        self.roads.insert(segment(at, heading));
    }

    pub fn remove_road(&mut self, at: Location, heading: Heading) {
        self.roads.remove(&segment(at, heading));
    }

    /// Park an obstacle on the road leaving `at` along `heading`.
    pub fn place_obstacle(&mut self, at: Location, heading: Heading) {
        self.obstacles.insert(segment(at, heading));
    }

    pub fn remove_obstacle(&mut self, at: Location, heading: Heading) {
        self.obstacles.remove(&segment(at, heading));
    }

    pub fn has_road(&self, at: Location, heading: Heading) -> bool {
        self.roads.contains(&segment(at, heading))
    }

    pub fn is_obstructed(&self, at: Location, heading: Heading) -> bool {
        self.obstacles.contains(&segment(at, heading))
    }

    /// Number of distinct intersections touched by a road.
    pub fn intersection_count(&self) -> usize {
        self.roads
            .iter()
            .flat_map(|&(a, b)| [a, b])
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn road_count(&self) -> usize {
        self.roads.len()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Robot
// ────────────────────────────────────────────────────────────────────────────

/// A simulated robot placed on a [`SimWorld`], starting at the origin facing
/// north.
#[derive(Debug, Clone)]
pub struct SimRobot {
    world: SimWorld,
    location: Location,
    heading: Heading,
    turn_noise: VecDeque<f64>,
    line_follows: usize,
    turns: usize,
}

impl SimRobot {
    pub fn new(world: SimWorld) -> Self {
        Self {
            world,
            location: Location::ORIGIN,
            heading: Heading::NORTH,
            turn_noise: VecDeque::new(),
            line_follows: 0,
            turns: 0,
        }
    }

    /// Queue angle errors (degrees) added to the next reported turns, one
    /// per turn.
    pub fn with_turn_noise(mut self, errors: impl IntoIterator<Item = f64>) -> Self {
        self.push_turn_noise(errors);
        self
    }

    /// Queue more angle errors behind any still pending.
    pub fn push_turn_noise(&mut self, errors: impl IntoIterator<Item = f64>) {
        self.turn_noise.extend(errors);
    }

    /// Ground-truth pose.
    pub fn pose(&self) -> Pose {
        Pose {
            location: self.location,
            heading: self.heading,
        }
    }

    /// Move the robot without driving, e.g. to simulate it being picked up.
    pub fn teleport(&mut self, pose: Pose) {
        self.location = pose.location;
        self.heading = pose.heading;
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut SimWorld {
        &mut self.world
    }

    pub fn line_follows(&self) -> usize {
        self.line_follows
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    fn range(&self, heading: Heading) -> f64 {
        if self.world.is_obstructed(self.location, heading) {
            OBSTACLE_RANGE_M
        } else {
            CLEAR_RANGE_M
        }
    }
}

impl DriveBase for SimRobot {
    fn line_follow(&mut self) -> Result<FollowOutcome, NavError> {
        if !self.world.has_road(self.location, self.heading) {
            return Err(NavError::HardwareFault {
                component: "line_sensor".to_string(),
                details: format!(
                    "no line to follow from {} heading {}",
                    self.location, self.heading
                ),
            });
        }
        if self.world.is_obstructed(self.location, self.heading) {
            trace!(location = %self.location, heading = %self.heading, "sim: obstructed");
            return Ok(FollowOutcome::Obstructed);
        }
        self.location = self.location.step(self.heading);
        self.line_follows += 1;
        trace!(location = %self.location, "sim: arrived");
        Ok(FollowOutcome::ArrivedAtIntersection)
    }

    fn pullup(&mut self) -> Result<(), NavError> {
        Ok(())
    }

    fn execute_turn(&mut self, direction: TurnDirection) -> Result<f64, NavError> {
        let steps = (1..=8)
            .find(|&k| {
                self.world
                    .has_road(self.location, self.heading.turned(direction, k))
            })
            .ok_or_else(|| NavError::HardwareFault {
                component: "drive_base".to_string(),
                details: format!("no road to turn onto at {}", self.location),
            })?;
        self.heading = self.heading.turned(direction, steps);
        self.turns += 1;
        let noise = self.turn_noise.pop_front().unwrap_or(0.0);
        let reported = (f64::from(steps) * 45.0 + noise).max(0.0);
        trace!(heading = %self.heading, reported, "sim: turned");
        Ok(reported)
    }

    fn stop(&mut self) -> Result<(), NavError> {
        Ok(())
    }
}

impl LineSensor for SimRobot {
    fn read(&mut self) -> Result<[bool; 3], NavError> {
        let ahead = self.world.has_road(self.location, self.heading);
        Ok([ahead; 3])
    }
}

impl ProximitySensor for SimRobot {
    fn read(&mut self) -> Result<ProximityReading, NavError> {
        Ok(ProximityReading {
            left: self.range(self.heading.rotate(2)),
            center: self.range(self.heading),
            right: self.range(self.heading.rotate(-2)),
        })
    }
}
