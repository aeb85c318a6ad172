//! Generic `DriveBase` trait for the robot's differential drive.
//!
//! A driver owns the motors and whatever low-level feedback loop keeps the
//! robot on the tape. The rest of the system only sees whole manoeuvres:
//! follow to the next intersection, centre on it, spin to the next road.

use gridbot_types::{NavError, TurnDirection};

/// How a line follow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    /// Reached the next intersection.
    ArrivedAtIntersection,
    /// Something is in the way; the robot stopped before leaving.
    Obstructed,
}

/// The robot's drive train.
pub trait DriveBase: Send {
    /// Follow the line ahead until the next intersection or an obstacle.
    ///
    /// # Errors
    ///
    /// [`NavError::HardwareFault`] if there is no line to follow.
    fn line_follow(&mut self) -> Result<FollowOutcome, NavError>;

    /// Creep forward to centre the wheels on the intersection just reached.
    fn pullup(&mut self) -> Result<(), NavError>;

    /// Spin in place until the next road is found and report the angle
    /// turned in degrees (always positive).
    fn execute_turn(&mut self, direction: TurnDirection) -> Result<f64, NavError>;

    /// Cut power to both motors.
    fn stop(&mut self) -> Result<(), NavError>;
}
