//! Core geometry and technology types.

use std::fmt;

/// A location in database units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Squared euclidean distance, in DBU².
    pub fn distance_sq(&self, other: &Point) -> i128 {
        let dx = (self.x - other.x) as i128;
        let dy = (self.y - other.y) as i128;
        dx * dx + dy * dy
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned rectangle in database units. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl Rect {
    /// Build a rectangle from two opposite corners in any order.
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self {
            x_min: x0.min(x1),
            y_min: y0.min(y1),
            x_max: x0.max(x1),
            y_max: y0.max(y1),
        }
    }

    /// Square of side `size` centered on `center`.
    pub fn centered(center: Point, size: i64) -> Self {
        let half = size / 2;
        Self::new(
            center.x - half,
            center.y - half,
            center.x + half,
            center.y + half,
        )
    }

    pub fn dx(&self) -> i64 {
        self.x_max - self.x_min
    }

    pub fn dy(&self) -> i64 {
        self.y_max - self.y_min
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x_min + self.dx() / 2,
            self.y_min + self.dy() / 2,
        )
    }

    /// Wires run along their longer side; squares count as horizontal.
    pub fn direction(&self) -> Direction {
        if self.dy() > self.dx() {
            Direction::Vertical
        } else {
            Direction::Horizontal
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    /// Strict containment: points on the boundary are outside.
    pub fn contains_strictly(&self, p: Point) -> bool {
        p.x > self.x_min && p.x < self.x_max && p.y > self.y_min && p.y < self.y_max
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x_min <= other.x_max
            && other.x_min <= self.x_max
            && self.y_min <= other.y_max
            && other.y_min <= self.y_max
    }

    /// Smallest rectangle covering both.
    pub fn merge(&self, other: &Rect) -> Rect {
        Rect {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn bloat(&self, margin: i64) -> Rect {
        Rect {
            x_min: self.x_min - margin,
            y_min: self.y_min - margin,
            x_max: self.x_max + margin,
            y_max: self.y_max + margin,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {} {}]",
            self.x_min, self.y_min, self.x_max, self.y_max
        )
    }
}

/// Preferred routing direction of a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Horizontal,
    Vertical,
}

/// Technology data for one routing layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Layer name as written in the design (e.g. "M1")
    pub name: String,
    /// Routing level, 1 is the lowest metal
    pub level: u32,
    /// Sheet resistance in ohms per square
    pub sheet_resistance: f64,
    /// Resistance of one via cut from this layer to the level above
    pub via_resistance: f64,
    /// Wire EM limit in amperes per micron of width
    pub em_limit: Option<f64>,
    /// Via EM limit in amperes per cut
    pub via_em_limit: Option<f64>,
}

/// Role of a supply net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetKind {
    Power,
    Ground,
}

impl NetKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "power" | "pwr" | "vdd" => Some(NetKind::Power),
            "ground" | "gnd" | "vss" => Some(NetKind::Ground),
            _ => None,
        }
    }
}

impl fmt::Display for NetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetKind::Power => write!(f, "power"),
            NetKind::Ground => write!(f, "ground"),
        }
    }
}

/// A power or ground net.
#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub name: String,
    pub kind: NetKind,
    /// Declared supply voltage, if any
    pub voltage: Option<f64>,
}

/// A rectangular special-wire segment of a supply net.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wire {
    pub level: u32,
    pub rect: Rect,
}

/// Cut-array parameters of a generated via.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViaParams {
    pub rows: u32,
    pub cols: u32,
}

impl ViaParams {
    pub fn cut_count(&self) -> u32 {
        self.rows.max(1) * self.cols.max(1)
    }
}

/// A via instance between two adjacent routing levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Via {
    pub bottom: u32,
    pub top: u32,
    /// Cut boxes on the cut layer
    pub cuts: Vec<Rect>,
    /// Landing metal on the bottom level, if the via carries it
    pub bottom_enclosure: Option<Rect>,
    /// Landing metal on the top level, if the via carries it
    pub top_enclosure: Option<Rect>,
    pub params: Option<ViaParams>,
}

impl Via {
    /// Bounding box of all cuts.
    pub fn bbox(&self) -> Option<Rect> {
        let mut iter = self.cuts.iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, r| acc.merge(r)))
    }
}

/// A placed macro blocking grid nodes underneath it.
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    pub rect: Rect,
    /// Highest routing level obstructed by the macro
    pub max_level: u32,
    /// Supply nets whose grid is allowed to continue over the macro
    pub pass_through: Vec<String>,
}

impl Macro {
    /// Whether the macro keeps sampled nodes of `net` off `level`.
    pub fn blocks(&self, net: &str, level: u32) -> bool {
        level <= self.max_level && !self.pass_through.iter().any(|n| n == net)
    }
}

/// A chip-level I/O terminal of a supply net.
///
/// Pin sources attach to the net's top routing level like every other
/// source; `level` records where the pin shape was drawn and does not move
/// the attachment point.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub level: u32,
    pub rect: Rect,
}

/// Power drawn by one leaf instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancePower {
    pub name: String,
    pub bbox: Rect,
    /// Supply nets the instance connects to; empty means every net
    pub nets: Vec<String>,
    /// Total power in watts
    pub power: f64,
}

impl InstancePower {
    pub fn connects_to(&self, net: &str) -> bool {
        self.nets.is_empty() || self.nets.iter().any(|n| n == net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_normalizes_corners() {
        let r = Rect::new(10, 20, 0, 5);
        assert_eq!(r, Rect::new(0, 5, 10, 20));
        assert_eq!(r.center(), Point::new(5, 12));
        assert_eq!(r.direction(), Direction::Vertical);
    }

    #[test]
    fn test_rect_containment() {
        let r = Rect::new(0, 0, 10, 10);
        assert!(r.contains(Point::new(10, 0)));
        assert!(!r.contains_strictly(Point::new(10, 5)));
        assert!(r.contains_strictly(Point::new(5, 5)));
        assert!(r.intersects(&Rect::new(10, 10, 20, 20)));
        assert!(!r.intersects(&Rect::new(11, 0, 20, 10)));
    }

    #[test]
    fn test_macro_pass_through() {
        let m = Macro {
            name: "ram".to_string(),
            rect: Rect::new(0, 0, 100, 100),
            max_level: 4,
            pass_through: vec!["VDD".to_string()],
        };
        assert!(!m.blocks("VDD", 1));
        assert!(m.blocks("VSS", 4));
        assert!(!m.blocks("VSS", 5));
    }

    #[test]
    fn test_via_params_cut_count() {
        assert_eq!(ViaParams { rows: 2, cols: 3 }.cut_count(), 6);
        assert_eq!(ViaParams { rows: 0, cols: 3 }.cut_count(), 3);
    }
}
