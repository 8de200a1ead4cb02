//! Planar geometry primitives shared across the FlySwat workspace.

use serde::{Deserialize, Serialize};

/// Free 2D vector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    /// Construct a new vector.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// The zero vector.
    #[must_use]
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Squared Euclidean length.
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Dot product with `other`.
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Unit vector in the same direction, or `None` for degenerate input.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len > 0.0 && len.is_finite() {
            Some(Self::new(self.x / len, self.y / len))
        } else {
            None
        }
    }

    /// Component-wise scale.
    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Clamp the vector's length to `max`, preserving direction.
    #[must_use]
    pub fn clamped_length(self, max: f32) -> Self {
        let len_sq = self.length_squared();
        if max > 0.0 && len_sq > max * max {
            self.scaled(max / len_sq.sqrt())
        } else {
            self
        }
    }

    /// Heading angle in radians, measured from the positive x axis.
    #[must_use]
    pub fn heading(self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Unit vector pointing at `angle` radians.
    #[must_use]
    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    /// Vector rotated counter-clockwise by `angle` radians.
    #[must_use]
    pub fn rotated(self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        self.scaled(rhs)
    }
}

/// Point in the overlay-local coordinate plane.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    /// Construct a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Vector from `self` to `other`.
    #[must_use]
    pub fn vector_to(self, other: Self) -> Vec2 {
        Vec2::new(other.x - self.x, other.y - self.y)
    }

    /// Point displaced by `offset`.
    #[must_use]
    pub fn offset(self, offset: Vec2) -> Self {
        Self::new(self.x + offset.x, self.y + offset.y)
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.vector_to(other).length()
    }

    /// Linear interpolation from `self` toward `other` by `t`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// Axis-aligned rectangle described by its min/max corners.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub min: Point2,
    pub max: Point2,
}

impl Rect {
    /// Construct from min/max corners.
    #[must_use]
    pub const fn new(min: Point2, max: Point2) -> Self {
        Self { min, max }
    }

    /// Construct from an origin corner and extents.
    #[must_use]
    pub const fn from_size(origin: Point2, width: f32, height: f32) -> Self {
        Self {
            min: origin,
            max: Point2::new(origin.x + width, origin.y + height),
        }
    }

    /// Rectangle width.
    #[must_use]
    pub fn width(self) -> f32 {
        self.max.x - self.min.x
    }

    /// Rectangle height.
    #[must_use]
    pub fn height(self) -> f32 {
        self.max.y - self.min.y
    }

    /// Center point.
    #[must_use]
    pub fn center(self) -> Point2 {
        Point2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    /// Length of the diagonal.
    #[must_use]
    pub fn diagonal(self) -> f32 {
        self.min.distance(self.max)
    }

    /// Whether `point` lies inside (inclusive of edges).
    #[must_use]
    pub fn contains(self, point: Point2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Rectangle grown outward by `margin` on every side.
    #[must_use]
    pub fn expanded(self, margin: f32) -> Self {
        Self::new(
            Point2::new(self.min.x - margin, self.min.y - margin),
            Point2::new(self.max.x + margin, self.max.y + margin),
        )
    }

    /// Rectangle shrunk inward by `margin` on every side. Collapses to the
    /// center when the margin exceeds the half-extent.
    #[must_use]
    pub fn inset(self, margin: f32) -> Self {
        let center = self.center();
        Self::new(
            Point2::new(
                (self.min.x + margin).min(center.x),
                (self.min.y + margin).min(center.y),
            ),
            Point2::new(
                (self.max.x - margin).max(center.x),
                (self.max.y - margin).max(center.y),
            ),
        )
    }

    /// Nearest point inside the rectangle to `point`.
    #[must_use]
    pub fn clamp_point(self, point: Point2) -> Point2 {
        Point2::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
        )
    }

    /// Centered sub-rectangle covering `fraction` of each extent.
    #[must_use]
    pub fn central_box(self, fraction: f32) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        let half_w = self.width() * fraction * 0.5;
        let half_h = self.height() * fraction * 0.5;
        let center = self.center();
        Self::new(
            Point2::new(center.x - half_w, center.y - half_h),
            Point2::new(center.x + half_w, center.y + half_h),
        )
    }
}

/// Directional strike/threat volume: a stretchable cone anchored at a vertex.
///
/// Immutable once constructed; each frame derives fresh cones from drag state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThreatCone {
    origin: Point2,
    direction: Vec2,
    radius: f32,
    arc_angle: f32,
    stretch: f32,
}

impl ThreatCone {
    /// Build a cone, normalizing `direction`. Returns `None` when the
    /// direction is degenerate, the radius is non-positive, or the arc angle
    /// falls outside `(0, 2π]`; these are normal transient states, not errors.
    #[must_use]
    pub fn new(
        origin: Point2,
        direction: Vec2,
        radius: f32,
        arc_angle: f32,
        stretch: f32,
    ) -> Option<Self> {
        let direction = direction.normalized()?;
        if !(radius > 0.0 && radius.is_finite()) {
            return None;
        }
        if !(arc_angle > 0.0 && arc_angle <= std::f32::consts::TAU) {
            return None;
        }
        Some(Self {
            origin,
            direction,
            radius,
            arc_angle,
            stretch: stretch.max(0.0),
        })
    }

    /// Cone vertex.
    #[must_use]
    pub const fn origin(&self) -> Point2 {
        self.origin
    }

    /// Unit center-line direction.
    #[must_use]
    pub const fn direction(&self) -> Vec2 {
        self.direction
    }

    /// Maximum reach from the vertex.
    #[must_use]
    pub const fn radius(&self) -> f32 {
        self.radius
    }

    /// Total angular width in radians.
    #[must_use]
    pub const fn arc_angle(&self) -> f32 {
        self.arc_angle
    }

    /// Elongation multiplier; 1.0 is neutral.
    #[must_use]
    pub const fn stretch(&self) -> f32 {
        self.stretch
    }

    /// Cone with the direction flipped 180 degrees.
    #[must_use]
    pub fn mirrored(&self) -> Self {
        Self {
            direction: -self.direction,
            ..*self
        }
    }

    /// Cone with the vertex displaced by `offset`.
    #[must_use]
    pub fn translated(&self, offset: Vec2) -> Self {
        Self {
            origin: self.origin.offset(offset),
            ..*self
        }
    }

    /// Exact containment predicate. The degenerate zero-distance case is
    /// inside by definition; the only numeric guard is the acos domain clamp.
    #[must_use]
    pub fn contains(&self, point: Point2) -> bool {
        let v = self.origin.vector_to(point);
        let distance = v.length();
        if distance == 0.0 {
            return true;
        }
        if distance > self.radius {
            return false;
        }
        let cos_theta = (v.scaled(1.0 / distance)).dot(self.direction).clamp(-1.0, 1.0);
        cos_theta.acos() <= self.arc_angle * 0.5
    }
}
