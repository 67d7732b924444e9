//! Anchor-relative placement of watermark content.
//!
//! Every anchor contributes zero, one or two per-axis rules. An axis without
//! a rule keeps the plain offset (top-left behaviour):
//!
//! | rule      | formula                                  |
//! |-----------|------------------------------------------|
//! | far edge  | `container - offset - content`           |
//! | centered  | `container / 2 - offset - content / 2`   |
//!
//! Results are fractional (centering divides by two) and never clamped: an
//! offset larger than the container yields a negative or out-of-bounds
//! placement and the compositor simply crops the content.
//!
//! # Example
//!
//! ```ignore
//! use imgpipe::watermark::position::{resolve, Anchor, Dimensions};
//!
//! let placement = resolve(Dimensions::new(800, 600), Dimensions::new(100, 50), Anchor::SouthEast, 10, 10);
//! assert_eq!((placement.x, placement.y), (690.0, 540.0)); // 800 - 10 - 100, 600 - 10 - 50
//! ```

use std::fmt;

/// Width and height of a container or of the content placed in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &image::RgbaImage) -> Self {
        Self::new(image.width(), image.height())
    }
}

/// Named reference point used for relative placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    #[default]
    SouthEast,
}

/// How one axis is derived when an anchor does not keep the plain offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisRule {
    /// Measure the offset from the far edge (right or bottom)
    FarEdge,
    /// Measure the offset from the container midline
    Centered,
}

impl AxisRule {
    fn apply(self, container: f64, content: f64, offset: f64) -> f64 {
        match self {
            AxisRule::FarEdge => container - offset - content,
            AxisRule::Centered => container / 2.0 - offset - content / 2.0,
        }
    }
}

impl Anchor {
    pub const ALL: [Anchor; 9] = [
        Anchor::NorthWest,
        Anchor::North,
        Anchor::NorthEast,
        Anchor::West,
        Anchor::Center,
        Anchor::East,
        Anchor::SouthWest,
        Anchor::South,
        Anchor::SouthEast,
    ];

    /// Parse an anchor code. Unknown codes fall back to `se`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "nw" => Anchor::NorthWest,
            "north" => Anchor::North,
            "ne" => Anchor::NorthEast,
            "west" => Anchor::West,
            "center" => Anchor::Center,
            "east" => Anchor::East,
            "sw" => Anchor::SouthWest,
            "south" => Anchor::South,
            "se" => Anchor::SouthEast,
            _ => Anchor::default(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Anchor::NorthWest => "nw",
            Anchor::North => "north",
            Anchor::NorthEast => "ne",
            Anchor::West => "west",
            Anchor::Center => "center",
            Anchor::East => "east",
            Anchor::SouthWest => "sw",
            Anchor::South => "south",
            Anchor::SouthEast => "se",
        }
    }

    /// Per-axis rules as `(x, y)`. `None` keeps the plain offset.
    pub fn axis_rules(&self) -> (Option<AxisRule>, Option<AxisRule>) {
        use AxisRule::{Centered, FarEdge};

        match self {
            Anchor::NorthWest => (None, None),
            Anchor::North => (Some(Centered), None),
            Anchor::NorthEast => (Some(FarEdge), None),
            Anchor::West => (None, Some(Centered)),
            Anchor::Center => (Some(Centered), Some(Centered)),
            Anchor::East => (Some(FarEdge), Some(Centered)),
            Anchor::SouthWest => (None, Some(FarEdge)),
            Anchor::South => (Some(Centered), Some(FarEdge)),
            Anchor::SouthEast => (Some(FarEdge), Some(FarEdge)),
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Absolute top-left placement, possibly fractional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
}

impl Placement {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Round to the pixel grid.
    pub fn to_pixel(self) -> (i64, i64) {
        (self.x.round() as i64, self.y.round() as i64)
    }

    /// Shift by a pixel offset.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx as f64, self.y + dy as f64)
    }
}

/// Everything needed to place one piece of content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementRequest {
    pub container: Dimensions,
    pub content: Dimensions,
    pub anchor: Anchor,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl PlacementRequest {
    pub fn resolve(&self) -> Placement {
        resolve(
            self.container,
            self.content,
            self.anchor,
            self.offset_x,
            self.offset_y,
        )
    }
}

/// Compute the top-left coordinates of `content` inside `container`.
pub fn resolve(
    container: Dimensions,
    content: Dimensions,
    anchor: Anchor,
    offset_x: i32,
    offset_y: i32,
) -> Placement {
    let (x_rule, y_rule) = anchor.axis_rules();
    let ox = offset_x as f64;
    let oy = offset_y as f64;

    let x = x_rule.map_or(ox, |rule| {
        rule.apply(container.width as f64, content.width as f64, ox)
    });
    let y = y_rule.map_or(oy, |rule| {
        rule.apply(container.height as f64, content.height as f64, oy)
    });

    Placement::new(x, y)
}
