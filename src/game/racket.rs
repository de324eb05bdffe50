//! Paddles sliding along their goal edge

use crate::util::Vec2;

use super::collision::{Collider, Segment};
use super::field::{FieldEdge, BOUNDS_TOLERANCE};

/// Racket length as a share of its goal edge
pub const RACKET_LENGTH_RATIO: f32 = 0.25;

/// Travel speed factor. A full intent moves `edge_length / 100 * RACKET_SPEED`
/// units per second.
pub const RACKET_SPEED: f32 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Racket {
    pub seat: usize,
    /// Current first endpoint
    pub position: Vec2,
    /// Fixed unit orientation, the edge tangent
    pub direction: Vec2,
    pub normal: Vec2,
    pub angle_degrees: f32,
    pub length: f32,
    pub speed: f32,
}

impl Racket {
    /// Racket centred on its goal edge
    pub fn for_edge(edge: &FieldEdge, seat: usize) -> Self {
        let length = edge.length * RACKET_LENGTH_RATIO;
        let start = edge.anchor + edge.direction * ((edge.length - length) / 2.0);
        Self {
            seat,
            position: start,
            direction: edge.direction,
            normal: edge.normal,
            angle_degrees: edge.angle_degrees,
            length,
            speed: RACKET_SPEED,
        }
    }

    pub fn end(&self) -> Vec2 {
        self.position + self.direction * self.length
    }

    pub fn center(&self) -> Vec2 {
        self.position + self.direction * (self.length / 2.0)
    }

    /// Offset produced by `intent_percent` over `dt` seconds on an edge of `edge_length`
    pub fn displacement(&self, intent_percent: f32, edge_length: f32, dt: f32) -> Vec2 {
        let rate = intent_percent / 100.0 * edge_length / 100.0 * self.speed;
        self.direction * (rate * dt)
    }

    /// Try to slide along `edge`. The move is kept only when both ends of the
    /// racket stay inside the edge's bounding box.
    pub fn slide(&mut self, intent_percent: f32, edge: &FieldEdge, dt: f32) -> bool {
        if intent_percent == 0.0 {
            return false;
        }
        let candidate = self.position + self.displacement(intent_percent, edge.length, dt);
        let candidate_end = candidate + self.direction * self.length;
        let bounds = edge.bounds();
        if bounds.contains(candidate, BOUNDS_TOLERANCE)
            && bounds.contains(candidate_end, BOUNDS_TOLERANCE)
        {
            self.position = candidate;
            true
        } else {
            false
        }
    }
}

impl Collider for Racket {
    fn segment(&self) -> Segment {
        Segment::new(self.position, self.end(), self.normal)
    }
}
