use serde::{Deserialize, Serialize};

/// Gamification tiers. Levels are cumulative: a user sits at the smallest
/// level whose divider their point total has not yet passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserLevel {
    One,
    Two,
    Three,
    Four,
    Five,
}

/// Upper point divider of each level, in level order.
pub const LEVEL_DIVIDERS: [f64; 5] = [0.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0];

impl UserLevel {
    fn divider(self) -> f64 {
        LEVEL_DIVIDERS[self as usize]
    }

    fn next(self) -> Option<UserLevel> {
        match self {
            UserLevel::One => Some(UserLevel::Two),
            UserLevel::Two => Some(UserLevel::Three),
            UserLevel::Three => Some(UserLevel::Four),
            UserLevel::Four => Some(UserLevel::Five),
            UserLevel::Five => None,
        }
    }
}

/// Map a cumulative point total to a level. Dividers are inclusive upper
/// bounds: exactly 1000 points is still level Two.
pub fn level_for_points(points: f64) -> UserLevel {
    if points <= UserLevel::One.divider() {
        return UserLevel::One;
    }
    if points <= UserLevel::Two.divider() {
        return UserLevel::Two;
    }
    if points <= UserLevel::Three.divider() {
        return UserLevel::Three;
    }
    if points <= UserLevel::Four.divider() {
        return UserLevel::Four;
    }
    UserLevel::Five
}

/// Point total at which the next level is reached, or 0 at the max level.
pub fn points_of_next_level(points: f64) -> f64 {
    match level_for_points(points).next() {
        Some(next) => next.divider(),
        None => 0.0,
    }
}
