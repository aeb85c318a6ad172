//! Line and proximity sensor traits.

use gridbot_types::NavError;

/// Three downward IR sensors across the front of the robot.
pub trait LineSensor: Send {
    /// `[left, centre, right]`, `true` where tape is under the sensor.
    fn read(&mut self) -> Result<[bool; 3], NavError>;
}

/// Distances in metres from the three forward-facing ultrasound sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityReading {
    /// Looks 90° to the left of the heading.
    pub left: f64,
    /// Looks straight ahead.
    pub center: f64,
    /// Looks 90° to the right of the heading.
    pub right: f64,
}

/// Ultrasound ranging used to detect obstacles on neighbouring roads.
pub trait ProximitySensor: Send {
    fn read(&mut self) -> Result<ProximityReading, NavError>;
}
