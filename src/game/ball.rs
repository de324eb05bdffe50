//! Ball motion and collision response

use rand::Rng;

use crate::util::Vec2;

use super::collision::{self, Collision, Surface};
use super::field::Field;
use super::racket::Racket;

pub const BALL_RADIUS: f32 = 10.0;

/// Units per second
pub const BALL_SPEED: f32 = 240.0;

/// Maximum deviation of a serve from the aimed edge midpoint
const SERVE_SPREAD_DEGREES: f32 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    pub position: Vec2,
    /// Unit heading
    pub direction: Vec2,
    pub speed: f32,
    pub radius: f32,
}

impl Ball {
    pub fn new(position: Vec2, direction: Vec2, speed: f32) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            speed,
            radius: BALL_RADIUS,
        }
    }

    /// New ball at the field centre heading roughly at a random edge
    pub fn serve<R: Rng>(field: &Field, rng: &mut R) -> Self {
        let target = field.edges[rng.gen_range(0..field.edges.len())].midpoint();
        let spread = rng.gen_range(-SERVE_SPREAD_DEGREES..=SERVE_SPREAD_DEGREES);
        let heading = (target - field.center).normalize().rotate_degrees(spread);
        Self::new(field.center, heading, BALL_SPEED)
    }

    pub fn velocity(&self) -> Vec2 {
        self.direction * self.speed
    }

    /// Explicit Euler step over `dt` seconds
    pub fn integrate(&mut self, dt: f32) {
        self.position = self.position + self.velocity() * dt;
    }

    /// Scan every surface in order and react to the first contact.
    ///
    /// Walls and rackets reflect the heading and report a bounce; an unguarded
    /// goal line reports its seat and leaves the ball as is.
    pub fn detect_collision(&mut self, field: &Field, rackets: &[Racket]) -> Option<Collision> {
        for (surface, segment) in collision::surfaces(field, rackets) {
            if !segment.is_approached_by(self.direction)
                || !segment.touches(self.position, self.radius)
            {
                continue;
            }
            return match surface {
                Surface::Goal { seat } => Some(Collision::Goal { seat }),
                Surface::Wall { .. } | Surface::Racket { .. } => {
                    self.direction = self.direction.reflect(segment.normal).normalize();
                    Some(Collision::Bounce(surface))
                }
            };
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const EPSILON: f32 = 1e-3;

    fn rackets_for(field: &Field) -> Vec<Racket> {
        field
            .goal_edges()
            .filter_map(|edge| edge.seat.map(|seat| Racket::for_edge(edge, seat)))
            .collect()
    }

    #[test]
    fn integration_is_additive() {
        let mut split = Ball::new(Vec2::new(10.0, 20.0), Vec2::new(0.6, -0.8), 240.0);
        let mut whole = split.clone();
        split.integrate(0.013);
        split.integrate(0.021);
        whole.integrate(0.034);
        assert!(split.position.distance(whole.position) < EPSILON);
    }

    #[test]
    fn wall_reflection_keeps_speed_and_mirrors_angle() {
        let field = Field::build(2).unwrap();
        let wall = &field.edges[0];
        let incoming = Vec2::new(0.5, 1.0).normalize();
        let mut ball = Ball::new(wall.midpoint() - wall.normal * BALL_RADIUS, incoming, 240.0);

        let hit = ball.detect_collision(&field, &rackets_for(&field));
        assert_eq!(hit, Some(Collision::Bounce(Surface::Wall { edge: 0 })));

        assert!((ball.velocity().length() - 240.0).abs() < EPSILON);
        let angle_in = incoming.dot(wall.normal);
        let angle_out = ball.direction.dot(-wall.normal);
        assert!((angle_in - angle_out).abs() < EPSILON);
        assert!((incoming.dot(wall.direction) - ball.direction.dot(wall.direction)).abs() < EPSILON);
    }

    #[test]
    fn racket_blocks_goal() {
        let field = Field::build(2).unwrap();
        let goal = field.goal_edge(1).unwrap();
        let mut ball = Ball::new(goal.midpoint() - goal.normal * BALL_RADIUS, goal.normal, 240.0);

        let hit = ball.detect_collision(&field, &rackets_for(&field));
        assert_eq!(hit, Some(Collision::Bounce(Surface::Racket { seat: 1 })));
        assert!((ball.direction + goal.normal).length() < EPSILON);
    }

    #[test]
    fn unguarded_goal_reports_seat() {
        let field = Field::build(2).unwrap();
        let goal = field.goal_edge(1).unwrap();
        let near_corner = goal.anchor + goal.direction * (BALL_RADIUS * 2.0);
        let mut ball = Ball::new(near_corner - goal.normal * BALL_RADIUS, goal.normal, 240.0);
        let before = ball.clone();

        let hit = ball.detect_collision(&field, &rackets_for(&field));
        assert_eq!(hit, Some(Collision::Goal { seat: 1 }));
        assert_eq!(ball, before);
    }

    #[test]
    fn no_contact_leaves_ball_untouched() {
        let field = Field::build(3).unwrap();
        let mut ball = Ball::new(field.center, Vec2::RIGHT, 240.0);
        let before = ball.clone();
        assert_eq!(ball.detect_collision(&field, &rackets_for(&field)), None);
        assert_eq!(ball, before);
    }

    #[test]
    fn receding_ball_is_ignored() {
        let field = Field::build(2).unwrap();
        let wall = &field.edges[0];
        let mut ball = Ball::new(wall.midpoint() - wall.normal * BALL_RADIUS, -wall.normal, 240.0);
        assert_eq!(ball.detect_collision(&field, &rackets_for(&field)), None);
    }

    #[test]
    fn serve_starts_at_centre_with_unit_heading() {
        let field = Field::build(4).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..50 {
            let ball = Ball::serve(&field, &mut rng);
            assert_eq!(ball.position, field.center);
            assert!((ball.direction.length() - 1.0).abs() < EPSILON);
            assert_eq!(ball.speed, BALL_SPEED);
        }
    }
}
