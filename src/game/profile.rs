//! Per-seat player overlay: identity, score and movement intent

use crate::util::Vec2;

use super::field::FieldEdge;
use super::PlayerId;

/// Distance of the profile badge outside its goal edge
const PROFILE_OFFSET: f32 = 40.0;

/// Bound on a movement intent, in percent of full speed
pub const MAX_INTENT: f32 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub player_id: PlayerId,
    pub avatar: String,
    pub seat: usize,
    pub score: i32,
    /// Signed percent in [-100, 100]
    pub movement: f32,
    pub eliminated: bool,
    /// Where clients draw the badge
    pub anchor: Vec2,
    pub rotation_degrees: f32,
}

impl Profile {
    pub fn new(player_id: PlayerId, avatar: String, edge: &FieldEdge, seat: usize) -> Self {
        Self {
            player_id,
            avatar,
            seat,
            score: 0,
            movement: 0.0,
            eliminated: false,
            anchor: edge.midpoint() + edge.normal * PROFILE_OFFSET,
            rotation_degrees: edge.angle_degrees,
        }
    }

    pub fn set_movement(&mut self, percent: f32) {
        self.movement = if percent.is_finite() {
            percent.clamp(-MAX_INTENT, MAX_INTENT)
        } else {
            0.0
        };
    }

    pub fn concede(&mut self) {
        self.eliminated = true;
        self.movement = 0.0;
    }

    pub fn award_point(&mut self) {
        self.score += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::field::Field;

    fn profile() -> Profile {
        let field = Field::build(2).unwrap();
        Profile::new("alice".into(), "a.png".into(), field.goal_edge(0).unwrap(), 0)
    }

    #[test]
    fn movement_is_clamped() {
        let mut p = profile();
        p.set_movement(250.0);
        assert_eq!(p.movement, 100.0);
        p.set_movement(-101.0);
        assert_eq!(p.movement, -100.0);
        p.set_movement(f32::NAN);
        assert_eq!(p.movement, 0.0);
    }

    #[test]
    fn badge_sits_outside_goal() {
        let field = Field::build(2).unwrap();
        let edge = field.goal_edge(0).unwrap();
        let p = profile();
        assert!(p.anchor.distance(field.center) > edge.midpoint().distance(field.center));
    }

    #[test]
    fn conceding_stops_movement() {
        let mut p = profile();
        p.set_movement(40.0);
        p.concede();
        assert!(p.eliminated);
        assert_eq!(p.movement, 0.0);
    }
}
