//! Multiplier → screen-space mapping for the rocket.
//!
//! The rocket launches from the bottom-left corner (inset by a margin that
//! scales with the canvas) and travels toward the top-right corner. Progress
//! along that diagonal is linear up to 10x and then follows a logarithmic
//! tail that approaches, but never reaches, the far corner. Screen
//! coordinates grow rightward and downward.

use std::f64::consts::{FRAC_PI_4, PI};
use std::ops::{Add, AddAssign, Mul, Sub};

/// Distance the rocket keeps from every canvas edge.
pub const EDGE_PADDING: f64 = 20.0;

/// Progress shown at 1.00x so movement is visible as soon as a round starts.
pub const LAUNCH_PROGRESS: f64 = 0.04;

/// Progress reached at [`LINEAR_LIMIT`].
pub const LINEAR_PROGRESS: f64 = 0.85;

/// Multiplier at which the linear segment ends.
pub const LINEAR_LIMIT: f64 = 10.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Angle of this vector in radians.
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Canvas size in the presentation layer's units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Inset of the launch corner: `floor(clamp(60 / min, 0.03, 0.08) * min)`.
    pub fn margin(&self) -> f64 {
        let min = self.width.min(self.height);
        if min <= 0.0 {
            return 0.0;
        }
        ((60.0 / min).clamp(0.03, 0.08) * min).floor()
    }

    /// Where the rocket sits before launch.
    pub fn launch_point(&self) -> Vec2 {
        let margin = self.margin();
        Vec2::new(margin, self.height - margin)
    }

    /// The corner the rocket travels toward.
    pub fn far_point(&self) -> Vec2 {
        let margin = self.margin();
        Vec2::new(self.width - margin, margin)
    }

    /// Clamp a point into the padded canvas.
    pub fn clamp(&self, point: Vec2) -> Vec2 {
        Vec2::new(
            clamp_axis(point.x, EDGE_PADDING, self.width - EDGE_PADDING),
            clamp_axis(point.y, EDGE_PADDING, self.height - EDGE_PADDING),
        )
    }
}

/// Degenerate canvases smaller than twice the padding collapse to the centre.
fn clamp_axis(value: f64, lo: f64, hi: f64) -> f64 {
    if lo > hi {
        (lo + hi) / 2.0
    } else {
        value.clamp(lo, hi)
    }
}

/// A position plus heading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub rotation: f64,
}

/// Fraction of the launch → far-corner diagonal covered at `multiplier`.
pub fn progress(multiplier: f64) -> f64 {
    let m = if multiplier.is_nan() {
        1.0
    } else {
        multiplier.max(1.0)
    };
    if m <= LINEAR_LIMIT {
        LAUNCH_PROGRESS + (m - 1.0) / (LINEAR_LIMIT - 1.0) * (LINEAR_PROGRESS - LAUNCH_PROGRESS)
    } else {
        let tail = 1.0 - 1.0 / (1.0 + (m / LINEAR_LIMIT).ln());
        LINEAR_PROGRESS + (1.0 - LINEAR_PROGRESS) * tail
    }
}

/// Target position and heading for `multiplier` on `bounds`.
pub fn target_pose(multiplier: f64, bounds: &Bounds) -> Pose {
    let start = bounds.launch_point();
    let travel = bounds.far_point() - start;
    let position = bounds.clamp(start + travel * progress(multiplier));
    Pose {
        position,
        rotation: heading(start, position),
    }
}

/// Heading of the net travel from `from` to `to`. The sprite points
/// up-right at rest, hence the quarter-turn offset.
pub fn heading(from: Vec2, to: Vec2) -> f64 {
    (to - from).angle() + FRAC_PI_4
}

/// Wrap an angle into `(-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}
