//! Ball-vs-segment collision tests
//!
//! Everything a ball can touch is a [`Segment`] with an outward normal. The
//! surfaces are visited in a fixed order (edge index, and for a goal edge its
//! racket before the goal line) so the first hit is deterministic.

use std::iter;

use crate::util::Vec2;

use super::field::Field;
use super::racket::Racket;

/// Extra distance on top of the ball radius that still counts as contact
pub const COLLISION_TOLERANCE: f32 = 0.5;

/// A straight surface with the side the ball must not cross
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Vec2,
    pub end: Vec2,
    pub normal: Vec2,
}

impl Segment {
    pub fn new(start: Vec2, end: Vec2, normal: Vec2) -> Self {
        Self { start, end, normal }
    }

    /// Position of the projection of `point` along the segment, 0 at start and 1 at end
    fn projection(&self, point: Vec2) -> f32 {
        let along = self.end - self.start;
        let len_sq = along.dot(along);
        if len_sq > 0.0 {
            (point - self.start).dot(along) / len_sq
        } else {
            0.0
        }
    }

    pub fn distance_to(&self, point: Vec2) -> f32 {
        let t = self.projection(point).clamp(0.0, 1.0);
        point.distance(self.start + (self.end - self.start) * t)
    }

    /// Whether a ball heading along `direction` moves towards the outer side
    pub fn is_approached_by(&self, direction: Vec2) -> bool {
        direction.dot(self.normal) > 0.0
    }

    /// Circle contact test. A centre that already slipped past the line, while
    /// still within the segment's extent, also counts.
    pub fn touches(&self, center: Vec2, radius: f32) -> bool {
        if self.distance_to(center) <= radius + COLLISION_TOLERANCE {
            return true;
        }
        let t = self.projection(center);
        (0.0..=1.0).contains(&t) && (center - self.start).dot(self.normal) > 0.0
    }
}

/// Anything a ball can collide with
pub trait Collider {
    fn segment(&self) -> Segment;
}

/// Which surface a ball touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Wall { edge: usize },
    Racket { seat: usize },
    Goal { seat: usize },
}

/// Result of a collision scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collision {
    /// Reflected off a wall or racket
    Bounce(Surface),
    /// Crossed an unguarded goal line
    Goal { seat: usize },
}

/// All surfaces of a field in scan order
pub fn surfaces<'a>(
    field: &'a Field,
    rackets: &'a [Racket],
) -> impl Iterator<Item = (Surface, Segment)> + 'a {
    field.edges.iter().flat_map(move |edge| {
        let (guard, own) = match edge.seat {
            Some(seat) => (
                rackets
                    .get(seat)
                    .map(|racket| (Surface::Racket { seat }, racket.segment())),
                (Surface::Goal { seat }, edge.segment()),
            ),
            None => (None, (Surface::Wall { edge: edge.index }, edge.segment())),
        };
        guard.into_iter().chain(iter::once(own))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horizontal() -> Segment {
        Segment::new(Vec2::new(0.0, 0.0), Vec2::new(100.0, 0.0), Vec2::new(0.0, 1.0))
    }

    #[test]
    fn contact_within_radius_and_tolerance() {
        let segment = horizontal();
        assert!(segment.touches(Vec2::new(50.0, -10.4), 10.0));
        assert!(!segment.touches(Vec2::new(50.0, -10.6), 10.0));
    }

    #[test]
    fn tunnelled_centre_counts_inside_extent_only() {
        let segment = horizontal();
        assert!(segment.touches(Vec2::new(50.0, 40.0), 10.0));
        assert!(!segment.touches(Vec2::new(150.0, 40.0), 10.0));
    }

    #[test]
    fn endpoints_use_true_distance() {
        let segment = horizontal();
        assert!((segment.distance_to(Vec2::new(103.0, -4.0)) - 5.0).abs() < 1e-4);
    }

    #[test]
    fn approach_follows_normal() {
        let segment = horizontal();
        assert!(segment.is_approached_by(Vec2::new(0.3, 1.0)));
        assert!(!segment.is_approached_by(Vec2::new(0.3, -1.0)));
    }

    #[test]
    fn scan_order_puts_rackets_before_their_goal() {
        let field = Field::build(2).unwrap();
        let rackets: Vec<Racket> = field
            .goal_edges()
            .filter_map(|edge| edge.seat.map(|seat| Racket::for_edge(edge, seat)))
            .collect();
        let order: Vec<Surface> = surfaces(&field, &rackets).map(|(s, _)| s).collect();
        assert_eq!(
            order,
            vec![
                Surface::Wall { edge: 0 },
                Surface::Racket { seat: 0 },
                Surface::Goal { seat: 0 },
                Surface::Wall { edge: 2 },
                Surface::Racket { seat: 1 },
                Surface::Goal { seat: 1 },
            ]
        );
    }
}
