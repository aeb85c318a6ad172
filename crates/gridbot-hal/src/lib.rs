//! `gridbot-hal` – Hardware Abstraction Layer
//!
//! The navigator never touches GPIO, PWM or sensor drivers directly; it
//! talks to the narrow traits defined here, so the same control code drives
//! the physical robot and the deterministic [`sim::SimRobot`].
//!
//! # Modules
//!
//! - [`drive`] – [`DriveBase`][drive::DriveBase]: line following, pull-up
//!   and in-place turns.
//! - [`sensors`] – [`LineSensor`][sensors::LineSensor] and
//!   [`ProximitySensor`][sensors::ProximitySensor].
//! - [`sim`] – [`SimWorld`][sim::SimWorld] and [`SimRobot`][sim::SimRobot]:
//!   a scripted road grid with obstacles and optional turn-angle noise.

pub mod drive;
pub mod sensors;
pub mod sim;

pub use drive::{DriveBase, FollowOutcome};
pub use sensors::{LineSensor, ProximityReading, ProximitySensor};
pub use sim::{SimRobot, SimWorld};

/// Everything the navigator needs from a robot.
pub trait RobotHardware: DriveBase + LineSensor + ProximitySensor {}

impl<T: DriveBase + LineSensor + ProximitySensor> RobotHardware for T {}

/// Round a measured turn angle to the nearest multiple of 45°.
///
/// ```rust
/// use gridbot_hal::quantize_angle;
///
/// assert_eq!(quantize_angle(98.0), 90.0);
/// assert_eq!(quantize_angle(-140.0), -135.0);
/// ```
pub fn quantize_angle(degrees: f64) -> f64 {
    (degrees / 45.0).round() * 45.0
}
