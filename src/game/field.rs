//! Polygon field generation
//!
//! A match with `P` players plays inside a regular polygon with `2P` edges.
//! Even edges are reflective walls, odd edges are goals, one per player seat,
//! in angular order.

use serde::{Deserialize, Serialize};

use crate::util::Vec2;

use super::collision::{Collider, Segment};
use super::error::GameError;

/// Outer (circumscribed) radius of the field
pub const FIELD_RADIUS: f32 = 410.0;

/// Slack allowed around an edge's bounding box
pub const BOUNDS_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Wall,
    Goal,
}

/// Axis-aligned box, used for the racket travel limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        Self {
            min: Vec2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Vec2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn contains(&self, point: Vec2, tolerance: f32) -> bool {
        point.x >= self.min.x - tolerance
            && point.x <= self.max.x + tolerance
            && point.y >= self.min.y - tolerance
            && point.y <= self.max.y + tolerance
    }
}

/// One side of the polygon
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEdge {
    pub index: usize,
    pub kind: EdgeKind,
    /// First corner of the edge
    pub anchor: Vec2,
    /// Unit tangent from `anchor` to the second corner
    pub direction: Vec2,
    /// Unit normal pointing out of the field
    pub normal: Vec2,
    pub length: f32,
    pub angle_degrees: f32,
    /// Player seat owning this edge (goal edges only)
    pub seat: Option<usize>,
}

impl FieldEdge {
    pub fn end(&self) -> Vec2 {
        self.anchor + self.direction * self.length
    }

    pub fn midpoint(&self) -> Vec2 {
        self.anchor + self.direction * (self.length / 2.0)
    }

    pub fn is_goal(&self) -> bool {
        self.kind == EdgeKind::Goal
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(self.anchor, self.end())
    }
}

impl Collider for FieldEdge {
    fn segment(&self) -> Segment {
        Segment::new(self.anchor, self.end(), self.normal)
    }
}

/// The generated playing field
#[derive(Debug, Clone)]
pub struct Field {
    pub center: Vec2,
    pub radius: f32,
    pub edges: Vec<FieldEdge>,
}

impl Field {
    pub fn build(player_count: usize) -> Result<Self, GameError> {
        Self::with_radius(player_count, FIELD_RADIUS)
    }

    pub fn with_radius(player_count: usize, radius: f32) -> Result<Self, GameError> {
        if player_count == 0 {
            return Err(GameError::Configuration(
                "a field needs at least one player".to_string(),
            ));
        }
        if !(radius > 0.0) {
            return Err(GameError::Configuration(format!(
                "field radius must be positive, got {radius}"
            )));
        }

        let edge_count = player_count * 2;
        let step = 360.0 / edge_count as f32;

        // Two edges do not close a polygon; lay them out as opposite sides of a square.
        let half_angle = std::f32::consts::PI / edge_count.max(4) as f32;
        let half_length = radius * half_angle.sin();
        let apothem = radius * half_angle.cos();

        let center = Vec2::new(radius, radius);
        let base_corner = Vec2::new(-half_length, apothem);

        let edges = (0..edge_count)
            .map(|index| {
                let angle_degrees = index as f32 * step;
                let kind = if index % 2 == 0 {
                    EdgeKind::Wall
                } else {
                    EdgeKind::Goal
                };
                FieldEdge {
                    index,
                    kind,
                    anchor: center + base_corner.rotate_degrees(angle_degrees),
                    direction: Vec2::RIGHT.rotate_degrees(angle_degrees),
                    normal: Vec2::DOWN.rotate_degrees(angle_degrees),
                    length: half_length * 2.0,
                    angle_degrees,
                    seat: (kind == EdgeKind::Goal).then_some(index / 2),
                }
            })
            .collect();

        Ok(Self {
            center,
            radius,
            edges,
        })
    }

    pub fn player_count(&self) -> usize {
        self.edges.len() / 2
    }

    /// Goal edges in seat order
    pub fn goal_edges(&self) -> impl Iterator<Item = &FieldEdge> {
        self.edges.iter().filter(|edge| edge.is_goal())
    }

    pub fn goal_edge(&self, seat: usize) -> Option<&FieldEdge> {
        self.edges.get(seat * 2 + 1)
    }

    /// Whether a point has left the area enclosed by the circumscribed circle
    pub fn is_outside(&self, point: Vec2, margin: f32) -> bool {
        point.distance(self.center) > self.radius + margin
    }
}
