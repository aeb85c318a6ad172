//! Grid geometry: headings, locations and turn directions.
//!
//! Headings are integers in `[0, 8)` counted counter-clockwise from north in
//! 45° steps, so a left turn adds one step and a right turn subtracts one.
//!
//! | Heading | Compass | Delta `(dx, dy)` |
//! |---|---|---|
//! | 0 | N  | `( 0,  1)` |
//! | 1 | NW | `(-1,  1)` |
//! | 2 | W  | `(-1,  0)` |
//! | 3 | SW | `(-1, -1)` |
//! | 4 | S  | `( 0, -1)` |
//! | 5 | SE | `( 1, -1)` |
//! | 6 | E  | `( 1,  0)` |
//! | 7 | NE | `( 1,  1)` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::NavError;

const DELTAS: [(i32, i32); 8] = [
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
];

const COMPASS: [&str; 8] = ["N", "NW", "W", "SW", "S", "SE", "E", "NE"];

// ────────────────────────────────────────────────────────────────────────────
// Heading
// ────────────────────────────────────────────────────────────────────────────

/// One of the eight 45° compass directions a road can leave an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Heading(u8);

impl Heading {
    /// Number of distinct headings.
    pub const COUNT: usize = 8;

    pub const NORTH: Heading = Heading(0);
    pub const WEST: Heading = Heading(2);
    pub const SOUTH: Heading = Heading(4);
    pub const EAST: Heading = Heading(6);

    /// Build a heading from its integer value.
    ///
    /// # Errors
    ///
    /// [`NavError::Configuration`] when `value` is not in `[0, 8)`.
    pub fn new(value: u8) -> Result<Self, NavError> {
        if usize::from(value) < Self::COUNT {
            Ok(Self(value))
        } else {
            Err(NavError::Configuration(format!(
                "heading {value} is outside [0, 8)"
            )))
        }
    }

    /// Build a heading from any integer, wrapping modulo 8.
    pub fn wrapping(value: i32) -> Self {
        Self(value.rem_euclid(Self::COUNT as i32) as u8)
    }

    /// The integer value in `[0, 8)`.
    pub fn value(self) -> u8 {
        self.0
    }

    /// The heading as an array index.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// The heading pointing the other way: `(h + 4) mod 8`.
    pub fn opposite(self) -> Self {
        self.rotate(4)
    }

    /// Rotate by `steps` 45° increments (positive is counter-clockwise).
    pub fn rotate(self, steps: i32) -> Self {
        Self::wrapping(i32::from(self.0) + steps)
    }

    /// Rotate by `steps` increments in the given turn direction.
    pub fn turned(self, direction: TurnDirection, steps: i32) -> Self {
        self.rotate(direction.sign() * steps)
    }

    /// Number of 45° increments needed to reach `target` while turning in
    /// `direction`, in `[0, 8)`.
    pub fn steps_to(self, target: Heading, direction: TurnDirection) -> u8 {
        let diff = (i32::from(target.0) - i32::from(self.0)) * direction.sign();
        diff.rem_euclid(Self::COUNT as i32) as u8
    }

    /// Unit grid displacement for one road segment along this heading.
    pub fn delta(self) -> (i32, i32) {
        DELTAS[self.index()]
    }

    /// Invert [`Heading::delta`]. Returns `None` for `(0, 0)` or any
    /// displacement longer than one cell.
    pub fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        DELTAS
            .iter()
            .position(|&d| d == (dx, dy))
            .map(|i| Self(i as u8))
    }

    /// `true` for the four 45° diagonals.
    pub fn is_diagonal(self) -> bool {
        self.0 % 2 == 1
    }

    /// Heading expressed as a mathematical angle in radians (east = 0,
    /// counter-clockwise positive).
    pub fn radians(self) -> f64 {
        std::f64::consts::FRAC_PI_4 * f64::from(self.0 + 2)
    }

    /// All eight headings in ascending order.
    pub fn all() -> impl Iterator<Item = Heading> {
        (0..Self::COUNT as u8).map(Heading)
    }
}

impl TryFrom<u8> for Heading {
    type Error = NavError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Heading> for u8 {
    fn from(h: Heading) -> Self {
        h.0
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, COMPASS[self.index()])
    }
}

impl FromStr for Heading {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if let Some(i) = COMPASS.iter().position(|c| c.eq_ignore_ascii_case(t)) {
            return Ok(Self(i as u8));
        }
        let value: u8 = t
            .parse()
            .map_err(|_| NavError::Configuration(format!("invalid heading '{t}'")))?;
        Self::new(value)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TurnDirection
// ────────────────────────────────────────────────────────────────────────────

/// Direction of an in-place spin at an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnDirection {
    /// Counter-clockwise, heading increases.
    Left,
    /// Clockwise, heading decreases.
    Right,
}

impl TurnDirection {
    /// `+1` for left, `-1` for right.
    pub fn sign(self) -> i32 {
        match self {
            TurnDirection::Left => 1,
            TurnDirection::Right => -1,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            TurnDirection::Left => TurnDirection::Right,
            TurnDirection::Right => TurnDirection::Left,
        }
    }
}

impl fmt::Display for TurnDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnDirection::Left => write!(f, "left"),
            TurnDirection::Right => write!(f, "right"),
        }
    }
}

impl FromStr for TurnDirection {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "left" => Ok(TurnDirection::Left),
            "r" | "right" => Ok(TurnDirection::Right),
            other => Err(NavError::Configuration(format!(
                "invalid turn direction '{other}'"
            ))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Location
// ────────────────────────────────────────────────────────────────────────────

/// A grid intersection coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    /// The intersection the robot starts from.
    pub const ORIGIN: Location = Location { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring location one road segment along `heading`.
    pub fn step(self, heading: Heading) -> Self {
        let (dx, dy) = heading.delta();
        Self::new(self.x + dx, self.y + dy)
    }

    /// Heading from `self` to an adjacent `other`, or `None` if the two are
    /// not neighbours.
    pub fn heading_to(self, other: Location) -> Option<Heading> {
        Heading::from_delta(other.x - self.x, other.y - self.y)
    }

    /// Straight-line distance in grid units.
    pub fn distance_to(self, other: Location) -> f64 {
        let dx = f64::from(other.x - self.x);
        let dy = f64::from(other.y - self.y);
        dx.hypot(dy)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl FromStr for Location {
    type Err = NavError;

    /// Parse `"x,y"`, tolerating surrounding whitespace and parentheses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || NavError::Configuration(format!("invalid location '{s}', expected x,y"));
        let body = s.trim().trim_start_matches('(').trim_end_matches(')');
        let (x, y) = body.split_once(',').ok_or_else(bad)?;
        let x = x.trim().parse::<i32>().map_err(|_| bad())?;
        let y = y.trim().parse::<i32>().map_err(|_| bad())?;
        Ok(Self::new(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_a_bijection() {
        for h in Heading::all() {
            let (dx, dy) = h.delta();
            assert_eq!(Heading::from_delta(dx, dy), Some(h));
        }
        assert_eq!(Heading::from_delta(0, 0), None);
        assert_eq!(Heading::from_delta(2, 0), None);
    }

    #[test]
    fn opposite_is_an_involution() {
        for h in Heading::all() {
            assert_eq!(h.opposite().opposite(), h);
            let (dx, dy) = h.delta();
            assert_eq!(h.opposite().delta(), (-dx, -dy));
        }
    }

    #[test]
    fn left_turn_from_north_faces_west() {
        assert_eq!(Heading::NORTH.turned(TurnDirection::Left, 2), Heading::WEST);
        assert_eq!(Heading::NORTH.turned(TurnDirection::Right, 2), Heading::EAST);
        assert_eq!(Heading::NORTH.turned(TurnDirection::Right, 1).value(), 7);
    }

    #[test]
    fn steps_to_counts_in_turn_direction() {
        assert_eq!(Heading::NORTH.steps_to(Heading::WEST, TurnDirection::Left), 2);
        assert_eq!(Heading::NORTH.steps_to(Heading::WEST, TurnDirection::Right), 6);
        assert_eq!(Heading::EAST.steps_to(Heading::EAST, TurnDirection::Left), 0);
    }

    #[test]
    fn heading_new_rejects_out_of_range() {
        assert!(Heading::new(7).is_ok());
        assert!(matches!(Heading::new(8), Err(NavError::Configuration(_))));
    }

    #[test]
    fn heading_parses_number_or_compass() {
        assert_eq!("6".parse::<Heading>().unwrap(), Heading::EAST);
        assert_eq!("nw".parse::<Heading>().unwrap().value(), 1);
        assert!("9".parse::<Heading>().is_err());
    }

    #[test]
    fn heading_serde_rejects_invalid_value() {
        assert!(serde_json::from_str::<Heading>("3").is_ok());
        assert!(serde_json::from_str::<Heading>("12").is_err());
    }

    #[test]
    fn location_step_and_heading_to() {
        let a = Location::new(2, -1);
        for h in Heading::all() {
            assert_eq!(a.heading_to(a.step(h)), Some(h));
        }
        assert_eq!(a.heading_to(Location::new(4, -1)), None);
    }

    #[test]
    fn location_parse() {
        assert_eq!("3,4".parse::<Location>().unwrap(), Location::new(3, 4));
        assert_eq!(" (-1, 2) ".parse::<Location>().unwrap(), Location::new(-1, 2));
        assert!(matches!(
            "3;4".parse::<Location>(),
            Err(NavError::Configuration(_))
        ));
        assert!("a,b".parse::<Location>().is_err());
    }

    #[test]
    fn distance_is_euclidean() {
        let d = Location::ORIGIN.distance_to(Location::new(3, 4));
        assert!((d - 5.0).abs() < 1e-9);
    }
}
