//! Blockage detection from the three forward-facing range sensors.
//!
//! Ultrasonic readings are noisy, so each check takes several samples and a
//! sensor only counts as seeing an obstacle when a strict majority of its
//! samples fall inside the threshold. Diagonal roads are longer, so they use
//! a longer threshold.
//!
//! A heading is only marked blocked when there is something there to block:
//! a road the map already knows about, or a mapped intersection one step
//! away. A heading whose majority reads clear is unblocked again.

use gridbot_hal::{ProximityReading, ProximitySensor};
use gridbot_mapping::MapGraph;
use gridbot_types::{Heading, NavError, Pose};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Sampling and threshold settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockageConfig {
    /// Readings taken per check.
    pub samples: usize,
    /// Obstacle distance in metres for roads along the axes.
    pub axis_threshold_m: f64,
    /// Obstacle distance in metres for diagonal roads.
    pub diagonal_threshold_m: f64,
}

impl Default for BlockageConfig {
    fn default() -> Self {
        Self {
            samples: 5,
            axis_threshold_m: 0.5,
            diagonal_threshold_m: 0.7,
        }
    }
}

impl BlockageConfig {
    pub fn threshold_for(&self, heading: Heading) -> f64 {
        if heading.is_diagonal() {
            self.diagonal_threshold_m
        } else {
            self.axis_threshold_m
        }
    }
}

/// One of the three range sensors, named by where it points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSensor {
    Left,
    Center,
    Right,
}

impl RangeSensor {
    pub const ALL: [RangeSensor; 3] = [RangeSensor::Left, RangeSensor::Center, RangeSensor::Right];

    /// The road heading this sensor looks along when the robot faces `facing`.
    pub fn looks_along(self, facing: Heading) -> Heading {
        match self {
            RangeSensor::Left => facing.rotate(2),
            RangeSensor::Center => facing,
            RangeSensor::Right => facing.rotate(-2),
        }
    }

    fn distance(self, reading: &ProximityReading) -> f64 {
        match self {
            RangeSensor::Left => reading.left,
            RangeSensor::Center => reading.center,
            RangeSensor::Right => reading.right,
        }
    }
}

/// A blockage state change written to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockageChange {
    pub heading: Heading,
    pub blocked: bool,
}

/// Majority-vote blockage filter.
#[derive(Debug, Clone, Default)]
pub struct BlockageDetector {
    config: BlockageConfig,
}

impl BlockageDetector {
    pub fn new(config: BlockageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BlockageConfig {
        &self.config
    }

    /// Sample the range sensors and update blockages around `pose` for the
    /// given `sensors`. Returns the changes made.
    ///
    /// # Errors
    ///
    /// Sensor faults, or [`NavError::UnknownLocation`] when `pose` is not on
    /// the map.
    pub fn scan<S: ProximitySensor + ?Sized>(
        &self,
        sensor: &mut S,
        graph: &mut MapGraph,
        pose: Pose,
        sensors: &[RangeSensor],
    ) -> Result<Vec<BlockageChange>, NavError> {
        if !graph.contains(pose.location) {
            return Err(NavError::UnknownLocation(pose.location));
        }
        let samples = self.config.samples.max(1);
        let mut readings = Vec::with_capacity(samples);
        for _ in 0..samples {
            readings.push(sensor.read()?);
        }
        let threshold = self.config.threshold_for(pose.heading);

        let mut changes = Vec::new();
        for &which in sensors {
            let heading = which.looks_along(pose.heading);
            let close = readings
                .iter()
                .filter(|r| which.distance(r) <= threshold)
                .count();
            let obstacle = close * 2 > readings.len();
            debug!(?which, %heading, close, samples, obstacle, "range vote");
            if let Some(change) = self.apply(graph, pose, heading, obstacle)? {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    fn apply(
        &self,
        graph: &mut MapGraph,
        pose: Pose,
        heading: Heading,
        obstacle: bool,
    ) -> Result<Option<BlockageChange>, NavError> {
        let location = pose.location;
        let next = location.step(heading);
        let Some(node) = graph.intersection(location) else {
            return Err(NavError::UnknownLocation(location));
        };
        let was_blocked = node.is_blocked(heading);
        let something_there = node.road(heading).is_road() || graph.contains(next);

        if obstacle && something_there && !was_blocked {
            graph.block(location, next, heading)?;
            warn!(%location, %heading, "road blocked");
            return Ok(Some(BlockageChange {
                heading,
                blocked: true,
            }));
        }
        if !obstacle && was_blocked {
            graph.unblock(location, next, heading)?;
            info!(%location, %heading, "road clear again");
            return Ok(Some(BlockageChange {
                heading,
                blocked: false,
            }));
        }
        Ok(None)
    }
}
